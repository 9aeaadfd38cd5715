//! Protocol layer: JSON-RPC 2.0 foundation plus MCP-specific message types.
//!
//! ## Module organization
//!
//! - `message`: JSON-RPC 2.0 message envelopes with trait-based serialization
//! - `types`: MCP protocol-specific types (tools, prompts, resources, capabilities)
//! - `constants`: method names, error codes, and default values
//! - `errors`: protocol-level error types, independent of transport or dispatch

pub mod constants;
pub mod errors;
pub mod message;
pub mod types;

pub use constants::*;
pub use errors::*;
pub use message::*;
pub use types::*;
