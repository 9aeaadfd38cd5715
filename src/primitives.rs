//! Tool, prompt, and resource primitives
//!
//! A primitive pairs a protocol descriptor (the `Tool`/`Prompt`/`Resource`
//! struct a client sees in a `*/list` response) with an invoke function the
//! server runs when the client calls/gets/reads it. `PrimitiveCollection`
//! (see [`crate::collections`]) stores these keyed by name (tools, prompts)
//! or URI (resources). Grounded in the teacher's `ToolProvider`/
//! `PromptProvider`/`ResourceProvider` traits in `integration::server`,
//! narrowed here to a single-item invoke rather than a whole-collection
//! provider, since collection membership is handled separately by
//! `PrimitiveCollection`.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::McpResult;
use crate::protocol::types::{
    CallToolResult, GetPromptResult, Prompt, ReadResourceResult, Resource, Tool,
};

/// Invokes a single registered tool.
#[async_trait]
pub trait ToolInvoke: Send + Sync {
    /// Run the tool with `arguments`, honoring `ct` for cooperative cancellation.
    async fn call(&self, arguments: Value, ct: CancellationToken) -> McpResult<CallToolResult>;
}

#[async_trait]
impl<F, Fut> ToolInvoke for F
where
    F: Fn(Value, CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = McpResult<CallToolResult>> + Send,
{
    async fn call(&self, arguments: Value, ct: CancellationToken) -> McpResult<CallToolResult> {
        (self)(arguments, ct).await
    }
}

/// A tool descriptor paired with its invoke function.
#[derive(Clone)]
pub struct ToolPrimitive {
    /// Descriptor sent to clients in `tools/list`.
    pub descriptor: Tool,
    invoke: Arc<dyn ToolInvoke>,
}

impl ToolPrimitive {
    /// Pair a descriptor with the function that runs it.
    pub fn new(descriptor: Tool, invoke: Arc<dyn ToolInvoke>) -> Self {
        Self { descriptor, invoke }
    }

    /// Run this tool.
    pub async fn call(&self, arguments: Value, ct: CancellationToken) -> McpResult<CallToolResult> {
        self.invoke.call(arguments, ct).await
    }
}

/// Resolves a single registered prompt's messages.
#[async_trait]
pub trait PromptInvoke: Send + Sync {
    /// Render the prompt with `arguments`.
    async fn get(
        &self,
        arguments: std::collections::HashMap<String, String>,
        ct: CancellationToken,
    ) -> McpResult<GetPromptResult>;
}

#[async_trait]
impl<F, Fut> PromptInvoke for F
where
    F: Fn(std::collections::HashMap<String, String>, CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = McpResult<GetPromptResult>> + Send,
{
    async fn get(
        &self,
        arguments: std::collections::HashMap<String, String>,
        ct: CancellationToken,
    ) -> McpResult<GetPromptResult> {
        (self)(arguments, ct).await
    }
}

/// A prompt descriptor paired with its render function.
#[derive(Clone)]
pub struct PromptPrimitive {
    /// Descriptor sent to clients in `prompts/list`.
    pub descriptor: Prompt,
    invoke: Arc<dyn PromptInvoke>,
}

impl PromptPrimitive {
    /// Pair a descriptor with the function that renders it.
    pub fn new(descriptor: Prompt, invoke: Arc<dyn PromptInvoke>) -> Self {
        Self { descriptor, invoke }
    }

    /// Render this prompt.
    pub async fn get(
        &self,
        arguments: std::collections::HashMap<String, String>,
        ct: CancellationToken,
    ) -> McpResult<GetPromptResult> {
        self.invoke.get(arguments, ct).await
    }
}

/// Reads a single registered resource's content.
#[async_trait]
pub trait ResourceRead: Send + Sync {
    /// Read the resource's current content.
    async fn read(&self, ct: CancellationToken) -> McpResult<ReadResourceResult>;
}

#[async_trait]
impl<F, Fut> ResourceRead for F
where
    F: Fn(CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = McpResult<ReadResourceResult>> + Send,
{
    async fn read(&self, ct: CancellationToken) -> McpResult<ReadResourceResult> {
        (self)(ct).await
    }
}

/// A resource descriptor paired with its read function, keyed by URI.
#[derive(Clone)]
pub struct ResourcePrimitive {
    /// Descriptor sent to clients in `resources/list`.
    pub descriptor: Resource,
    invoke: Arc<dyn ResourceRead>,
}

impl ResourcePrimitive {
    /// Pair a descriptor with the function that reads it.
    pub fn new(descriptor: Resource, invoke: Arc<dyn ResourceRead>) -> Self {
        Self { descriptor, invoke }
    }

    /// Read this resource's content.
    pub async fn read(&self, ct: CancellationToken) -> McpResult<ReadResourceResult> {
        self.invoke.read(ct).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::protocol::types::Content;
    use serde_json::json;

    #[tokio::test]
    async fn tool_primitive_runs_its_invoke_function() {
        let tool = ToolPrimitive::new(
            Tool {
                name: "echo".to_string(),
                description: None,
                input_schema: json!({"type": "object"}),
            },
            Arc::new(|args: Value, _ct: CancellationToken| async move {
                Ok(CallToolResult::success(vec![Content::text(args.to_string())]))
            }),
        );

        let result = tool.call(json!({"x": 1}), CancellationToken::new()).await.unwrap();
        assert!(!result.is_error);
        assert_eq!(result.content.len(), 1);
    }
}
