//! The client half: correlated requests and fire-and-forget notifications over an
//! abstract bidirectional channel.
//!
//! The channel is modeled by the [`Connection`] trait with a single `send` capability,
//! used identically for requests (which expect a response envelope back) and
//! notifications (whose reply slot is ignored). Everything else, framing, reliability,
//! reconnection, is the transport's problem.

use crate::abort::{abortable, Aborted};
use crate::error::RpcError;
use crate::message::{Id, Request, Response, ResponsePayload, ABORT_REQUEST_METHOD};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::*;
use uuid::Uuid;

/// The abstract bidirectional channel the client talks through.
///
/// `send` resolves with the peer's response envelope for requests, or `None` for
/// notifications. A `None` for a request is a local consistency failure, surfaced by
/// the client as [`ClientError::MissingResponse`].
#[async_trait::async_trait]
pub trait Connection: Send + Sync + 'static {
    async fn send(&self, message: Request) -> anyhow::Result<Option<Response>>;
}

/// Failure modes of a client call.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The caller's cancellation signal fired; the request was abandoned locally.
    #[error("request aborted by caller")]
    Aborted,
    /// The channel reported no response for an envelope that expected one.
    #[error("missing response")]
    MissingResponse,
    /// The peer answered with a JSON-RPC error object.
    #[error(transparent)]
    Rpc(#[from] RpcError),
    /// The channel itself failed to deliver the envelope.
    #[error("transport error: {0}")]
    Transport(#[from] anyhow::Error),
}

impl From<Aborted> for ClientError {
    fn from(_: Aborted) -> Self {
        ClientError::Aborted
    }
}

/// Per-call options.
#[derive(Clone, Debug, Default)]
pub struct RequestOptions {
    /// When triggered after send, the call settles aborted immediately and the peer is
    /// told, best-effort, to stop work on the request.
    pub signal: Option<CancellationToken>,
}

/// A JSON-RPC client issuing correlated requests over a [`Connection`].
pub struct RpcClient<C> {
    connection: Arc<C>,
}

impl<C> Clone for RpcClient<C> {
    fn clone(&self) -> Self {
        Self {
            connection: Arc::clone(&self.connection),
        }
    }
}

impl<C> RpcClient<C>
where
    C: Connection,
{
    pub fn new(connection: C) -> Self {
        Self {
            connection: Arc::new(connection),
        }
    }

    pub fn from_arc(connection: Arc<C>) -> Self {
        Self { connection }
    }

    pub fn connection(&self) -> &C {
        &self.connection
    }

    /// Generate a collision-free opaque id for the next request.
    fn create_id(&self) -> Id {
        Id::String(Uuid::now_v7().to_string())
    }

    /// Invoke `method` on the peer and wait for its result.
    pub async fn request(
        &self,
        method: &str,
        params: impl Into<Option<Value>>,
    ) -> Result<Value, ClientError> {
        self.request_with_options(method, params, RequestOptions::default())
            .await
    }

    /// Invoke `method` on the peer, optionally racing the call against a cancellation
    /// signal.
    ///
    /// A signal that is already triggered settles the call aborted before any envelope
    /// is built; the channel observes zero sends. A signal that triggers after send
    /// settles the call aborted immediately, without waiting on the peer, and fires a
    /// best-effort [`ABORT_REQUEST_METHOD`] notification naming the request's id so
    /// the peer can stop wasted work.
    #[instrument(skip_all, fields(method = %method))]
    pub async fn request_with_options(
        &self,
        method: &str,
        params: impl Into<Option<Value>>,
        options: RequestOptions,
    ) -> Result<Value, ClientError> {
        if let Some(signal) = &options.signal {
            if signal.is_cancelled() {
                return Err(ClientError::Aborted);
            }
        }

        let id = self.create_id();
        let request = Request::call(id.clone(), method, params);

        let outcome = match &options.signal {
            Some(signal) => match abortable(self.connection.send(request), signal).await {
                Ok(outcome) => outcome,
                Err(Aborted) => {
                    self.send_abort(id);
                    return Err(ClientError::Aborted);
                }
            },
            None => self.connection.send(request).await,
        };

        let response = outcome?.ok_or(ClientError::MissingResponse)?;
        match response.payload {
            ResponsePayload::Result(result) => Ok(result),
            ResponsePayload::Error(error) => Err(RpcError::from_object(error).into()),
        }
    }

    /// Fire a notification. Resolves once the channel accepts the send; no reply is
    /// ever inspected.
    pub async fn notify(
        &self,
        method: &str,
        params: impl Into<Option<Value>>,
    ) -> Result<(), ClientError> {
        self.connection
            .send(Request::notification(method, params))
            .await?;
        Ok(())
    }

    /// Best-effort: tell the peer to stop work on `id`. Fired as a detached task so
    /// the aborted caller settles without waiting on the channel; delivery failures
    /// are logged, never surfaced.
    fn send_abort(&self, id: Id) {
        let connection = Arc::clone(&self.connection);
        tokio::spawn(async move {
            let notification = Request::notification(ABORT_REQUEST_METHOD, json!({ "id": &id }));
            if let Err(error) = connection.send(notification).await {
                warn!(%id, error = %error, "abort notification was not delivered");
            }
        });
    }
}
