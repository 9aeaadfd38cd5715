//! A Model Context Protocol (MCP) runtime: the JSON-RPC 2.0 plumbing, session
//! lifecycle, and primitive dispatch shared by MCP clients and servers,
//! independent of any particular transport.
//!
//! # Architecture
//!
//! - [`protocol`]: wire types — JSON-RPC envelopes, MCP request/response
//!   structs, method name and error code constants.
//! - [`transport`]: the pull-based [`transport::Transport`] trait plus the
//!   [`transport::stdio::StdioTransport`] and [`transport::memory::MemoryTransport`]
//!   adapters.
//! - [`correlation`]: matches outbound requests to their eventual responses.
//! - [`cancellation`]: propagates `notifications/cancelled` into a running
//!   handler's [`tokio_util::sync::CancellationToken`].
//! - [`endpoint`]: the shared request/response/notification engine both
//!   roles are built on.
//! - [`collections`] and [`primitives`]: name/URI-keyed registries of tools,
//!   prompts, and resources, with change notification.
//! - [`client`]: the `initialize` handshake and typed call surface for
//!   talking to an MCP server.
//! - [`server`]: capability-derived handler installation and composed
//!   collection/provider dispatch for serving MCP requests.
//!
//! # Example
//!
//! ```rust,no_run
//! use mcp_runtime::server::Server;
//! use mcp_runtime::protocol::types::ServerInfo;
//! use mcp_runtime::transport::stdio::StdioTransport;
//!
//! # async fn example() -> mcp_runtime::error::McpResult<()> {
//! let server = Server::builder(ServerInfo {
//!     name: "example-server".to_string(),
//!     version: "0.1.0".to_string(),
//! })
//! .build(StdioTransport::default())
//! .await
//! .expect("failed to build server");
//!
//! server.start().await?;
//! # Ok(())
//! # }
//! ```

pub mod cancellation;
pub mod client;
pub mod collections;
pub mod correlation;
pub mod endpoint;
pub mod error;
pub mod primitives;
pub mod protocol;
pub mod server;
pub mod transport;

pub use client::{Client, ClientBuilder, ClientState};
pub use endpoint::{Endpoint, EndpointConfig};
pub use error::{McpError, McpResult};
pub use server::{Server, ServerBuilder};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The crate version string.
pub fn version() -> &'static str {
    VERSION
}
