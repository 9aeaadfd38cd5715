//! Unified error taxonomy
//!
//! Every fallible operation in this crate ultimately returns [`McpError`]. It
//! wraps the narrower error enums produced by each layer (transport,
//! correlation, protocol, dispatch, lifecycle) via `#[from]`, so callers can
//! propagate with `?` without manually mapping between layers.

use thiserror::Error;

use crate::correlation::CorrelationError;
use crate::protocol::errors::ProtocolError;
use crate::protocol::RequestId;
use crate::transport::TransportError;

/// Failure classes specific to dispatching an inbound request or notification.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No handler was registered for this method.
    #[error("method not found: {0}")]
    MethodNotFound(String),

    /// A handler was registered for a capability that was never advertised.
    #[error("capability not negotiated: {0}")]
    CapabilityNotNegotiated(String),

    /// The handler itself returned an application-level failure.
    #[error("handler for {method} failed: {message}")]
    HandlerFailed { method: String, message: String },

    /// The request's params did not match what the handler expected.
    #[error("invalid params for {method}: {message}")]
    InvalidParams { method: String, message: String },

    /// The request was cancelled via `notifications/cancelled` before completion.
    #[error("request {0} was cancelled")]
    Cancelled(RequestId),
}

/// Failure classes arising from the session lifecycle (connect/initialize/close).
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// A method requiring an initialized session was called before `initialize` completed.
    #[error("session is not initialized")]
    NotInitialized,

    /// `initialize` was called a second time on a session already past `Initializing`.
    #[error("session already initialized")]
    AlreadyInitialized,

    /// The peer's protocol version is not one this crate supports.
    #[error("unsupported protocol version: {0}")]
    UnsupportedProtocolVersion(String),

    /// `connect` was called on a transport that is already connected.
    #[error("transport already connected")]
    AlreadyConnected,

    /// The `initialize` handshake did not complete within the configured timeout.
    #[error("initialize handshake timed out")]
    InitializeTimedOut,

    /// The session was closed while this operation was in flight.
    #[error("session closed")]
    Closed,
}

/// Top-level error type returned by endpoint, client, and server operations.
#[derive(Debug, Error)]
pub enum McpError {
    /// Failure at the transport layer (I/O, framing, closed connection).
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Failure decoding or validating a JSON-RPC message.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Failure correlating a request with its response.
    #[error("correlation error: {0}")]
    Correlation(#[from] CorrelationError),

    /// Failure dispatching a request or notification to a handler.
    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// Failure related to session lifecycle state.
    #[error("lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    /// The peer returned a JSON-RPC error object for a request we sent.
    #[error("remote returned error {code}: {message}")]
    Remote { code: i32, message: String },
}

impl McpError {
    /// The JSON-RPC error code this error should be reported as, when it
    /// originates from handling an inbound request (as opposed to a local
    /// failure calling out to the peer).
    pub fn error_code(&self) -> i32 {
        use crate::protocol::constants::error_codes;
        match self {
            McpError::Transport(_) => error_codes::INTERNAL_ERROR,
            McpError::Protocol(_) => error_codes::PARSE_ERROR,
            McpError::Correlation(_) => error_codes::INTERNAL_ERROR,
            McpError::Dispatch(DispatchError::MethodNotFound(_)) => error_codes::METHOD_NOT_FOUND,
            McpError::Dispatch(DispatchError::InvalidParams { .. }) => error_codes::INVALID_PARAMS,
            McpError::Dispatch(DispatchError::Cancelled(_)) => error_codes::REQUEST_CANCELLED,
            McpError::Dispatch(_) => error_codes::INTERNAL_ERROR,
            McpError::Lifecycle(LifecycleError::AlreadyInitialized) => {
                error_codes::INVALID_REQUEST
            }
            McpError::Lifecycle(_) => error_codes::INTERNAL_ERROR,
            McpError::Remote { code, .. } => *code,
        }
    }

    /// Whether retrying the same operation might succeed without intervention
    /// (a transient transport hiccup) as opposed to a structural failure that
    /// will recur until the caller changes something.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            McpError::Transport(TransportError::Timeout { .. })
                | McpError::Correlation(CorrelationError::Timeout { .. })
        )
    }
}

/// Convenient result alias used throughout the crate's public API.
pub type McpResult<T> = Result<T, McpError>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn method_not_found_maps_to_the_jsonrpc_code() {
        let err = McpError::Dispatch(DispatchError::MethodNotFound("foo/bar".to_string()));
        assert_eq!(err.error_code(), -32601);
    }

    #[test]
    fn double_initialize_maps_to_invalid_request() {
        let err = McpError::Lifecycle(LifecycleError::AlreadyInitialized);
        assert_eq!(err.error_code(), -32600);
    }

    #[test]
    fn transport_timeout_is_recoverable_but_closed_is_not() {
        assert!(McpError::Transport(TransportError::timeout(1000)).is_recoverable());
        assert!(!McpError::Transport(TransportError::closed()).is_recoverable());
    }
}
