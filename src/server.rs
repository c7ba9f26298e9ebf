//! The server half: dispatching inbound envelopes to registered method handlers, with
//! per-request cooperative cancellation.
//!
//! The dispatcher owns a table of method handlers fixed at construction, three
//! overridable observability hooks, and the in-flight registry mapping request ids to
//! their cancellation tokens. The registry is the only shared mutable state; each
//! operation on it is atomic under a mutex and no lock is held across an await, so a
//! cancellation notification and the owning handler's completion can race safely on a
//! multithreaded host.

use crate::error::{message_for_code, RpcError, SERVER_ERROR_CODE};
use crate::message::{parse_message, ErrorObject, Id, Request, Response, ABORT_REQUEST_METHOD};
use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::*;

/// Error surfaced by a method handler.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// A typed JSON-RPC error the handler deliberately signals. Serialized to the wire
    /// verbatim and not reported to the error hook.
    #[error(transparent)]
    Rpc(#[from] RpcError),
    /// Any other failure. Normalized to an error response and reported to the hook.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HandlerError {
    /// The error object reported on the wire. Typed errors pass through unchanged.
    /// Anything else is normalized: the code and message come from an [`RpcError`]
    /// buried in the chain if there is one, else the default server-error code with
    /// the error's own message, falling back to the canonical message when it has
    /// none.
    fn to_object(&self) -> ErrorObject {
        match self {
            HandlerError::Rpc(error) => error.to_object(),
            HandlerError::Other(error) => {
                if let Some(rpc) = error.downcast_ref::<RpcError>() {
                    return rpc.to_object();
                }
                let message = error.to_string();
                let message = if message.is_empty() {
                    message_for_code(SERVER_ERROR_CODE).to_owned()
                } else {
                    message
                };
                ErrorObject {
                    code: SERVER_ERROR_CODE,
                    message: Some(message),
                    data: None,
                }
            }
        }
    }
}

/// The boxed future every handler settles through.
pub type HandlerFuture = BoxFuture<'static, Result<Value, HandlerError>>;

/// A registered method handler.
///
/// Handlers opt into cooperative cancellation through the [`Handler::abortable`]
/// wrapper; plain handlers run to completion unaffected by cancellation
/// notifications. Synchronous and asynchronous handler bodies are both supported, the
/// former as an async block that never suspends.
pub enum Handler<Ctx> {
    Plain(Box<dyn Fn(Ctx, Option<Value>) -> HandlerFuture + Send + Sync>),
    Abortable(Box<dyn Fn(Ctx, Option<Value>, CancellationToken) -> HandlerFuture + Send + Sync>),
}

impl<Ctx> Handler<Ctx> {
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(Ctx, Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        Handler::Plain(Box::new(move |ctx, params| Box::pin(handler(ctx, params))))
    }

    /// Wrap a handler that receives a cancellation signal. While a request bound to
    /// this handler is in flight, an [`ABORT_REQUEST_METHOD`] notification naming its
    /// id triggers the signal; the handler polls or subscribes to it, there is no
    /// preemption.
    pub fn abortable<F, Fut>(handler: F) -> Self
    where
        F: Fn(Ctx, Option<Value>, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        Handler::Abortable(Box::new(move |ctx, params, signal| {
            Box::pin(handler(ctx, params, signal))
        }))
    }

    fn is_abortable(&self) -> bool {
        matches!(self, Handler::Abortable(_))
    }

    fn invoke(&self, ctx: Ctx, params: Option<Value>, signal: CancellationToken) -> HandlerFuture {
        match self {
            Handler::Plain(handler) => handler(ctx, params),
            Handler::Abortable(handler) => handler(ctx, params, signal),
        }
    }
}

/// Decode a handler's params into a typed value, failing with a typed InvalidParams
/// error when the params are missing or don't match the expected shape.
pub fn params_from_value<P: serde::de::DeserializeOwned>(
    params: Option<Value>,
) -> Result<P, HandlerError> {
    let params = params.ok_or_else(|| RpcError::invalid_params(None))?;
    serde_json::from_value(params).map_err(|error| {
        error!(error = %error, "error deserializing params");
        RpcError::invalid_params(None).into()
    })
}

#[derive(Deserialize)]
struct AbortRequestParams {
    id: Id,
}

type ErrorHook<Ctx> = Box<dyn Fn(&Ctx, &Request, &HandlerError) + Send + Sync>;
type MessageHook<Ctx> = Box<dyn Fn(&Ctx, &Request) + Send + Sync>;

/// Routes inbound envelopes to registered handlers and produces response envelopes,
/// or no response for notifications and cancelled requests.
pub struct RpcDispatcher<Ctx> {
    methods: HashMap<String, Handler<Ctx>>,
    on_handler_error: ErrorHook<Ctx>,
    on_invalid_message: MessageHook<Ctx>,
    on_notification: MessageHook<Ctx>,
    inflight: Mutex<HashMap<Id, CancellationToken>>,
}

impl<Ctx> Default for RpcDispatcher<Ctx> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Ctx> RpcDispatcher<Ctx> {
    pub fn new() -> Self {
        Self {
            methods: HashMap::new(),
            on_handler_error: Box::new(|_ctx, request, error| {
                warn!(request = ?request, error = %error, "unhandled handler error");
            }),
            on_invalid_message: Box::new(|_ctx, request| {
                warn!(request = ?request, "unhandled invalid message");
            }),
            on_notification: Box::new(|_ctx, request| {
                warn!(request = ?request, "unhandled notification");
            }),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Register a handler for `name`. The table is fixed once dispatching starts.
    pub fn method(mut self, name: impl Into<String>, handler: Handler<Ctx>) -> Self {
        self.methods.insert(name.into(), handler);
        self
    }

    /// Observes handler failures that are not typed [`RpcError`]s, and every failure
    /// of a request whose reply was suppressed by cancellation.
    pub fn on_handler_error(
        mut self,
        hook: impl Fn(&Ctx, &Request, &HandlerError) + Send + Sync + 'static,
    ) -> Self {
        self.on_handler_error = Box::new(hook);
        self
    }

    /// Observes invalid envelopes that carry no id and therefore get no reply.
    pub fn on_invalid_message(
        mut self,
        hook: impl Fn(&Ctx, &Request) + Send + Sync + 'static,
    ) -> Self {
        self.on_invalid_message = Box::new(hook);
        self
    }

    /// Fallback for notifications whose method has no registered handler.
    pub fn on_notification(
        mut self,
        hook: impl Fn(&Ctx, &Request) + Send + Sync + 'static,
    ) -> Self {
        self.on_notification = Box::new(hook);
        self
    }

    fn lock_inflight(&self) -> MutexGuard<'_, HashMap<Id, CancellationToken>> {
        self.inflight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self, id: Id, token: CancellationToken) -> InflightGuard<'_, Ctx> {
        self.lock_inflight().insert(id.clone(), token);
        InflightGuard {
            dispatcher: self,
            id,
        }
    }

    /// Trigger the cancellation token registered for the id named by an abort
    /// notification. No live entry (already settled, or the handler never opted into
    /// cancellation) is a silent no-op.
    fn abort_inflight(&self, request: &Request) {
        let Some(params) = request.params.clone() else {
            warn!("abort notification without params");
            return;
        };
        match serde_json::from_value::<AbortRequestParams>(params) {
            Ok(AbortRequestParams { id }) => {
                if let Some(token) = self.lock_inflight().get(&id) {
                    debug!(%id, "cancelling in-flight request");
                    token.cancel();
                }
            }
            Err(error) => warn!(error = %error, "malformed abort notification params"),
        }
    }
}

impl<Ctx> RpcDispatcher<Ctx>
where
    Ctx: Clone,
{
    /// Dispatch one inbound envelope. Returns the response to send back, or `None`
    /// when the envelope does not get one: notifications, unrecoverable invalid
    /// messages, and requests whose reply was suppressed by cancellation.
    #[instrument(skip_all, fields(method = request.method.as_deref().unwrap_or("")))]
    pub async fn dispatch(&self, ctx: &Ctx, request: Request) -> Option<Response> {
        if !request.is_valid() {
            return match request.id.clone() {
                None => {
                    (self.on_invalid_message)(ctx, &request);
                    None
                }
                Some(id) => Some(Response::error(
                    Some(id),
                    RpcError::invalid_request(None).to_object(),
                )),
            };
        }
        // Guarded by is_valid above
        let method = request.method.clone()?;

        match (request.id.clone(), self.methods.get(method.as_str())) {
            (None, _) if method == ABORT_REQUEST_METHOD => {
                self.abort_inflight(&request);
                None
            }
            (None, Some(handler)) => {
                // Invoked for effect only: notifications have no reply channel, so
                // failures are swallowed into the hook
                let signal = CancellationToken::new();
                if let Err(error) = handler
                    .invoke(ctx.clone(), request.params.clone(), signal)
                    .await
                {
                    (self.on_handler_error)(ctx, &request, &error);
                }
                None
            }
            (None, None) => {
                (self.on_notification)(ctx, &request);
                None
            }
            (Some(id), None) => Some(Response::error(
                Some(id),
                RpcError::method_not_found(None).to_object(),
            )),
            (Some(id), Some(handler)) => self.invoke_method(ctx, &request, id, handler).await,
        }
    }

    /// Parse one frame of text and dispatch it. A parse failure produces a ParseError
    /// response addressed to a null id, since the request's own id cannot be
    /// determined.
    pub async fn dispatch_text(&self, ctx: &Ctx, text: &str) -> Option<Response> {
        match parse_message(text) {
            Ok(request) => self.dispatch(ctx, request).await,
            Err(error) => Some(Response::error(None, error.to_object())),
        }
    }

    async fn invoke_method(
        &self,
        ctx: &Ctx,
        request: &Request,
        id: Id,
        handler: &Handler<Ctx>,
    ) -> Option<Response> {
        let signal = CancellationToken::new();
        let registration = handler
            .is_abortable()
            .then(|| self.register(id.clone(), signal.clone()));

        let outcome = handler
            .invoke(ctx.clone(), request.params.clone(), signal.clone())
            .await;

        // Cancellation counts only if it arrived while the entry was live
        let cancelled = registration.is_some() && signal.is_cancelled();
        // Entry removed before any response is surfaced, on every exit path
        drop(registration);

        match outcome {
            Ok(_) if cancelled => {
                debug!(%id, "result discarded; request was cancelled");
                None
            }
            Ok(result) => Some(Response::success(id, result)),
            Err(error) if cancelled => {
                // The hook still sees the raw error; suppressing the reply is a
                // separate decision
                (self.on_handler_error)(ctx, request, &error);
                debug!(%id, "error discarded; request was cancelled");
                None
            }
            Err(error) => {
                if matches!(error, HandlerError::Other(_)) {
                    (self.on_handler_error)(ctx, request, &error);
                }
                Some(Response::error(Some(id), error.to_object()))
            }
        }
    }
}

/// Removes the in-flight registry entry when dropped, so no entry outlives its
/// request's settlement on any exit path.
struct InflightGuard<'a, Ctx> {
    dispatcher: &'a RpcDispatcher<Ctx>,
    id: Id,
}

impl<Ctx> Drop for InflightGuard<'_, Ctx> {
    fn drop(&mut self) {
        self.dispatcher.lock_inflight().remove(&self.id);
    }
}
