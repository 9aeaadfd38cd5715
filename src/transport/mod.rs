//! Transport Abstraction Layer
//!
//! This module provides transport abstractions for JSON-RPC communication.
//! The transport layer sits between the endpoint core and the actual
//! communication channel (stdio, an in-process duplex pair, or whatever a
//! caller supplies).
//!
//! # Architecture
//!
//! The transport layer is built around the [`Transport`] trait, which defines
//! a pull-based interface for sending and receiving whole JSON-RPC messages:
//!
//! ```rust,no_run
//! use mcp_runtime::transport::Transport;
//! use mcp_runtime::protocol::JsonRpcMessage;
//!
//! async fn example_usage<T: Transport>(mut transport: T) -> Result<(), T::Error> {
//!     // Send a message
//!     let notification = JsonRpcMessage::from_notification("ping", None);
//!     transport.send(&notification).await?;
//!
//!     // Receive the next message, if any
//!     if let Some(message) = transport.receive().await? {
//!         println!("{message:?}");
//!     }
//!
//!     transport.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Design Principles
//!
//! - **Pull-based**: `receive()` is called by the endpoint's read loop; the
//!   transport never pushes messages via a callback.
//! - **Message-level, not byte-level**: transports parse/frame their own wire
//!   format internally and hand back a decoded [`JsonRpcMessage`].
//! - **Async-native**: all operations return futures for integration with Tokio.
//! - **Error flexibility**: an associated `Error` type for transport-specific
//!   error handling, convertible into [`TransportError`] at the boundary.
//! - **Thread safety**: all implementations must be `Send + Sync`.
//!
//! # Transports
//!
//! This crate ships two concrete adapters:
//! - [`stdio::StdioTransport`]: line-delimited JSON-RPC over any
//!   `AsyncBufRead + AsyncWrite` pair, defaulting to real stdin/stdout.
//! - [`memory::MemoryTransport`]: an in-process duplex pair built on
//!   `tokio::sync::mpsc`, used for tests and same-process client/server wiring.
//!
//! Concrete network carriers (HTTP, SSE, WebSocket) are not implemented by
//! this crate; callers needing them implement `Transport` themselves.

pub mod error;
pub mod memory;
pub mod stdio;

pub use error::TransportError;

use async_trait::async_trait;

use crate::protocol::JsonRpcMessage;

/// Pull-based transport abstraction for exchanging JSON-RPC messages.
///
/// A `Transport` owns one side of a bidirectional channel. `receive()` is a
/// lazy sequence: each call returns the next inbound message, or `Ok(None)`
/// once the peer has cleanly closed the channel. There is no background
/// task reading on the transport's behalf; the endpoint's read loop drives
/// `receive()` directly.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Error type produced by this transport's I/O operations
    type Error: std::error::Error + Send + Sync + 'static;

    /// Send a single JSON-RPC message to the peer.
    ///
    /// Concurrent calls to `send` from multiple tasks must not interleave
    /// partial writes; implementations serialize access to the underlying
    /// sink (typically behind a `tokio::sync::Mutex`).
    async fn send(&self, message: &JsonRpcMessage) -> Result<(), Self::Error>;

    /// Receive the next JSON-RPC message from the peer.
    ///
    /// Returns `Ok(None)` when the peer has closed the channel cleanly.
    /// A malformed message on the wire is logged and discarded by the
    /// implementation, which keeps reading rather than surfacing an error or
    /// ending the stream; an `Err` here means the underlying I/O itself
    /// failed.
    async fn receive(&self) -> Result<Option<JsonRpcMessage>, Self::Error>;

    /// Close the transport, releasing any underlying resources.
    ///
    /// Idempotent: closing an already-closed transport is not an error.
    async fn close(&self) -> Result<(), Self::Error>;
}
