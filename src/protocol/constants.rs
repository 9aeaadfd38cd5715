//! MCP Protocol Constants
//!
//! This module defines constants for MCP protocol method names and other
//! standardized values to ensure consistency and reduce typos.

/// MCP protocol method names
pub mod methods {
    /// Initialization method
    pub const INITIALIZE: &str = "initialize";
    /// Initialized notification
    pub const INITIALIZED: &str = "notifications/initialized";

    /// Connectivity testing method
    pub const PING: &str = "ping";

    /// Cancellation notification
    pub const CANCELLED: &str = "notifications/cancelled";

    /// Progress notification
    pub const PROGRESS: &str = "notifications/progress";

    /// Resource-related methods
    pub const RESOURCES_LIST: &str = "resources/list";
    pub const RESOURCES_READ: &str = "resources/read";
    pub const RESOURCES_SUBSCRIBE: &str = "resources/subscribe";
    pub const RESOURCES_UNSUBSCRIBE: &str = "resources/unsubscribe";
    pub const RESOURCES_TEMPLATES_LIST: &str = "resources/templates/list";
    pub const RESOURCES_LIST_CHANGED: &str = "notifications/resources/list_changed";
    pub const RESOURCES_UPDATED: &str = "notifications/resources/updated";

    /// Tool-related methods
    pub const TOOLS_LIST: &str = "tools/list";
    pub const TOOLS_CALL: &str = "tools/call";
    pub const TOOLS_LIST_CHANGED: &str = "notifications/tools/list_changed";

    /// Prompt-related methods
    pub const PROMPTS_LIST: &str = "prompts/list";
    pub const PROMPTS_GET: &str = "prompts/get";
    pub const PROMPTS_LIST_CHANGED: &str = "notifications/prompts/list_changed";

    /// Root-related methods
    pub const ROOTS_LIST: &str = "roots/list";
    pub const ROOTS_LIST_CHANGED: &str = "notifications/roots/list_changed";

    /// Sampling
    pub const SAMPLING_CREATE_MESSAGE: &str = "sampling/createMessage";

    /// Argument completion
    pub const COMPLETION_COMPLETE: &str = "completion/complete";

    /// Logging-related methods
    pub const LOGGING_SET_LEVEL: &str = "logging/setLevel";
    pub const LOGGING_MESSAGE: &str = "notifications/message";
}

/// JSON-RPC error codes
pub mod error_codes {
    /// Parse error - Invalid JSON was received by the server
    pub const PARSE_ERROR: i32 = -32700;

    /// Invalid Request - The JSON sent is not a valid Request object
    pub const INVALID_REQUEST: i32 = -32600;

    /// Method not found - The method does not exist / is not available
    pub const METHOD_NOT_FOUND: i32 = -32601;

    /// Invalid params - Invalid method parameter(s)
    pub const INVALID_PARAMS: i32 = -32602;

    /// Internal error - Internal JSON-RPC error
    pub const INTERNAL_ERROR: i32 = -32603;

    /// Server error - Application-specific error (generic floor of the reserved range)
    pub const SERVER_ERROR: i32 = -32000;

    /// Request was cancelled via `notifications/cancelled`
    pub const REQUEST_CANCELLED: i32 = -32800;
}

/// Default values for the runtime
pub mod defaults {
    /// Default client name advertised in `initialize` when none is given
    pub const CLIENT_NAME: &str = "mcp-runtime-client";

    /// Default server name advertised in `initialize` responses
    pub const SERVER_NAME: &str = "mcp-runtime-server";

    /// Protocol version this crate speaks
    pub const PROTOCOL_VERSION: &str = "2025-06-18";

    /// Default timeout, in seconds, for the `initialize` handshake
    pub const INIT_TIMEOUT_SECONDS: u64 = 60;

    /// Default grace period, in seconds, allowed for in-flight requests to drain on close
    pub const DRAIN_TIMEOUT_SECONDS: u64 = 5;

    /// Default maximum retry attempts for transport-level send failures
    pub const MAX_RETRIES: u32 = 3;

    /// Default buffer size for line-framed transports
    pub const BUFFER_SIZE: usize = 8192;
}
