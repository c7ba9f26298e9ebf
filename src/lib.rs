//! A minimal, transport-agnostic implementation of the JSON-RPC 2.0 message exchange
//! contract: a client issuing correlated requests over an abstract bidirectional
//! channel, and a server-side dispatcher routing inbound envelopes to registered
//! handlers.
//!
//! The physical transport is out of scope on purpose; it is modeled entirely through
//! the [`Connection`] trait's single `send` capability, so the same client and
//! dispatcher work over sockets, pipes, or an in-process queue.
//!
//! The interesting part is the cooperative cancellation protocol. A caller can abandon
//! an in-flight request locally, settling immediately, while the peer is informed
//! through a reserved [`ABORT_REQUEST_METHOD`] notification so it can stop wasted
//! work. The dispatcher guarantees that no stray or duplicate response is ever emitted
//! for an abandoned request, whichever way handler completion and cancellation
//! interleave.

mod abort;
mod client;
mod error;
mod message;
mod server;

pub use abort::*;
pub use client::*;
pub use error::*;
pub use message::*;
pub use server::*;
