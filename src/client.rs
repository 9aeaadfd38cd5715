//! Client role
//!
//! Drives the requester side of the `initialize`/`notifications/initialized`
//! handshake and exposes typed call methods for every MCP request a client
//! sends. Grounded in the teacher's client-side connection lifecycle
//! (`ConnectionState`/`McpClient` in `integration::client`), rebuilt on the
//! shared pull-based [`Endpoint`] instead of the teacher's transport-owned
//! `MessageHandler`.
//!
//! Like [`crate::server`], declared capabilities are derived from what is
//! wired rather than validated after the fact: `sampling`/`roots` are only
//! advertised, and their request handlers only installed, when a handler was
//! actually supplied to the builder.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::endpoint::{Endpoint, EndpointConfig};
use crate::error::{LifecycleError, McpError, McpResult};
use crate::protocol::constants::methods;
use crate::protocol::types::{
    CallToolRequest, CallToolResult, ClientCapabilities, ClientInfo, CompletionResult,
    CreateMessageRequest, CreateMessageResult, GetPromptRequest, GetPromptResult,
    InitializeRequest, InitializeResponse, ListPromptsResult, ListResourceTemplatesResponse,
    ListResourcesResult, ListRootsResult, ListToolsResult, LogLevel, ProtocolVersion,
    ReadResourceRequest, ReadResourceResult, RootsCapabilities, SamplingCapabilities,
    ServerCapabilities, ServerInfo, SetLoggingRequest, SubscribeResourceRequest,
    UnsubscribeResourceRequest,
};
use crate::transport::Transport;

/// Host-side responder for `sampling/createMessage`: runs the conversation
/// against whatever model backend the client embeds.
#[async_trait]
pub trait SamplingHandler: Send + Sync {
    /// Produce a completion for `request`.
    async fn create_message(&self, request: CreateMessageRequest) -> McpResult<CreateMessageResult>;
}

/// Host-side responder for `roots/list`: exposes the filesystem-like anchors
/// the client is willing to let the server operate on.
#[async_trait]
pub trait RootsProvider: Send + Sync {
    /// List the roots currently exposed.
    async fn list(&self) -> McpResult<ListRootsResult>;
}

/// The client's position in the connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Constructed, `connect` not yet called.
    Idle,
    /// `connect` in progress, handshake not yet sent.
    Connecting,
    /// `initialize` sent, awaiting (or validating) the response.
    Initializing,
    /// Handshake complete; request methods may be called.
    Ready,
    /// The session has been closed.
    Closed,
}

impl ClientState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ClientState::Idle,
            1 => ClientState::Connecting,
            2 => ClientState::Initializing,
            3 => ClientState::Ready,
            _ => ClientState::Closed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ClientState::Idle => 0,
            ClientState::Connecting => 1,
            ClientState::Initializing => 2,
            ClientState::Ready => 3,
            ClientState::Closed => 4,
        }
    }
}

/// Failure building a [`Client`] from a [`ClientBuilder`].
#[derive(Debug, Error)]
pub enum ClientBuildError {
    /// Constructing the shared [`Endpoint`] failed.
    #[error("failed to build endpoint: {0}")]
    Endpoint(#[source] McpError),
}

/// Builder for a [`Client`].
pub struct ClientBuilder {
    client_info: ClientInfo,
    protocol_version: ProtocolVersion,
    endpoint_config: EndpointConfig,
    init_timeout: std::time::Duration,
    sampling_handler: Option<Arc<dyn SamplingHandler>>,
    roots_provider: Option<Arc<dyn RootsProvider>>,
    roots_list_changed: bool,
}

impl ClientBuilder {
    /// Start building a client identified as `client_info`.
    pub fn new(client_info: ClientInfo) -> Self {
        Self {
            client_info,
            protocol_version: ProtocolVersion::current(),
            endpoint_config: EndpointConfig::default(),
            init_timeout: std::time::Duration::from_secs(
                crate::protocol::constants::defaults::INIT_TIMEOUT_SECONDS,
            ),
            sampling_handler: None,
            roots_provider: None,
            roots_list_changed: false,
        }
    }

    /// Override the protocol version sent in `initialize`. Defaults to the
    /// version this crate speaks.
    pub fn protocol_version(mut self, version: ProtocolVersion) -> Self {
        self.protocol_version = version;
        self
    }

    /// Override the endpoint's correlation/drain-timeout configuration.
    pub fn endpoint_config(mut self, config: EndpointConfig) -> Self {
        self.endpoint_config = config;
        self
    }

    /// Override how long `connect` waits for the `initialize` response.
    pub fn init_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.init_timeout = timeout;
        self
    }

    /// Host `sampling/createMessage` via `handler`. Advertises the sampling
    /// capability; a server declaring `sampling` support but finding none
    /// advertised simply will not send the request.
    pub fn with_sampling_handler(mut self, handler: Arc<dyn SamplingHandler>) -> Self {
        self.sampling_handler = Some(handler);
        self
    }

    /// Host `roots/list` via `provider`. `list_changed` advertises whether
    /// this client can emit `notifications/roots/list_changed`.
    pub fn with_roots_provider(mut self, provider: Arc<dyn RootsProvider>, list_changed: bool) -> Self {
        self.roots_provider = Some(provider);
        self.roots_list_changed = list_changed;
        self
    }

    /// Build the client over `transport`, installing handlers for whichever
    /// client-hosted capabilities were wired.
    pub async fn build<T: Transport + 'static>(self, transport: T) -> Result<Client<T>, ClientBuildError> {
        let endpoint = Endpoint::new(transport, self.endpoint_config)
            .await
            .map_err(ClientBuildError::Endpoint)?;

        let capabilities = ClientCapabilities {
            experimental: None,
            sampling: self.sampling_handler.as_ref().map(|_| SamplingCapabilities {}),
            roots: self.roots_provider.as_ref().map(|_| RootsCapabilities {
                list_changed: Some(self.roots_list_changed),
            }),
        };

        let client = Client {
            endpoint: Arc::new(endpoint),
            client_info: self.client_info,
            protocol_version: self.protocol_version,
            capabilities,
            init_timeout: self.init_timeout,
            state: Arc::new(AtomicU8::new(ClientState::Idle.as_u8())),
            server_info: Arc::new(tokio::sync::RwLock::new(None)),
            server_capabilities: Arc::new(tokio::sync::RwLock::new(None)),
            instructions: Arc::new(tokio::sync::RwLock::new(None)),
        };

        client.install_handlers(self.sampling_handler, self.roots_provider);
        Ok(client)
    }
}

/// An MCP client: the requester side of the handshake, plus typed call
/// methods for every outbound MCP request.
pub struct Client<T: Transport> {
    endpoint: Arc<Endpoint<T>>,
    client_info: ClientInfo,
    protocol_version: ProtocolVersion,
    capabilities: ClientCapabilities,
    init_timeout: std::time::Duration,
    state: Arc<AtomicU8>,
    server_info: Arc<tokio::sync::RwLock<Option<ServerInfo>>>,
    server_capabilities: Arc<tokio::sync::RwLock<Option<ServerCapabilities>>>,
    instructions: Arc<tokio::sync::RwLock<Option<String>>>,
}

impl<T: Transport + 'static> Client<T> {
    /// Start building a client identified as `client_info`.
    pub fn builder(client_info: ClientInfo) -> ClientBuilder {
        ClientBuilder::new(client_info)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ClientState {
        ClientState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Capabilities this client advertises, derived from what was wired.
    pub fn capabilities(&self) -> &ClientCapabilities {
        &self.capabilities
    }

    /// The server's declared capabilities, available once `connect` succeeds.
    pub async fn server_capabilities(&self) -> Option<ServerCapabilities> {
        self.server_capabilities.read().await.clone()
    }

    /// The server's self-reported identity, available once `connect` succeeds.
    pub async fn server_info(&self) -> Option<ServerInfo> {
        self.server_info.read().await.clone()
    }

    /// Free-form usage instructions the server returned, if any.
    pub async fn instructions(&self) -> Option<String> {
        self.instructions.read().await.clone()
    }

    fn transition(&self, from: ClientState, to: ClientState) -> McpResult<()> {
        self.state
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(|_| McpError::Lifecycle(LifecycleError::AlreadyConnected))
    }

    /// Run the `initialize` handshake: start the endpoint's read loop, send
    /// `initialize`, verify the server's protocol version matches the one
    /// this client sent, store the server's capabilities/info/instructions,
    /// then send `notifications/initialized`.
    ///
    /// May be called exactly once per client; a second call fails with
    /// [`LifecycleError::AlreadyConnected`].
    pub async fn connect(&self, ct: CancellationToken) -> McpResult<()> {
        self.transition(ClientState::Idle, ClientState::Connecting)?;

        self.endpoint.start().await?;
        self.transition(ClientState::Connecting, ClientState::Initializing)?;

        let request = InitializeRequest::with_version(
            self.protocol_version.clone(),
            self.capabilities.clone(),
            self.client_info.clone(),
        );
        let params = serde_json::to_value(&request).map_err(|e| {
            McpError::Protocol(crate::protocol::errors::ProtocolError::Serialization {
                message: e.to_string(),
            })
        })?;

        let response_value = match tokio::time::timeout(
            self.init_timeout,
            self.endpoint.send_request(methods::INITIALIZE, Some(params), ct.clone()),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                ct.cancel();
                self.state.store(ClientState::Closed.as_u8(), Ordering::SeqCst);
                return Err(McpError::Lifecycle(LifecycleError::InitializeTimedOut));
            }
        };

        let response: InitializeResponse = serde_json::from_value(response_value).map_err(|e| {
            McpError::Protocol(crate::protocol::errors::ProtocolError::Serialization {
                message: e.to_string(),
            })
        })?;

        if response.protocol_version.as_str() != self.protocol_version.as_str() {
            self.state.store(ClientState::Closed.as_u8(), Ordering::SeqCst);
            let _ = self.endpoint.close().await;
            return Err(McpError::Lifecycle(LifecycleError::UnsupportedProtocolVersion(format!(
                "server speaks {}, client requested {}",
                response.protocol_version.as_str(),
                self.protocol_version.as_str(),
            ))));
        }

        *self.server_info.write().await = Some(response.server_info);
        *self.server_capabilities.write().await = Some(response.capabilities);
        *self.instructions.write().await = response.instructions;

        info!("handshake complete");
        self.endpoint
            .send_message(crate::protocol::JsonRpcMessage::Notification(
                crate::protocol::JsonRpcNotification::new(methods::INITIALIZED, None),
            ))
            .await?;

        self.transition(ClientState::Initializing, ClientState::Ready)
    }

    /// Tear the client down.
    pub async fn close(&self) -> McpResult<()> {
        self.state.store(ClientState::Closed.as_u8(), Ordering::SeqCst);
        self.endpoint.close().await
    }

    fn require_ready(&self) -> McpResult<()> {
        if self.state() == ClientState::Ready {
            Ok(())
        } else {
            Err(McpError::Lifecycle(LifecycleError::NotInitialized))
        }
    }

    async fn call<P: serde::Serialize, R: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Option<P>,
        ct: CancellationToken,
    ) -> McpResult<R> {
        self.require_ready()?;
        let params = params
            .map(|p| serde_json::to_value(p))
            .transpose()
            .map_err(|e| {
                McpError::Protocol(crate::protocol::errors::ProtocolError::Serialization {
                    message: e.to_string(),
                })
            })?;
        let value = self.endpoint.send_request(method, params, ct).await?;
        serde_json::from_value(value).map_err(|e| {
            McpError::Protocol(crate::protocol::errors::ProtocolError::Serialization {
                message: e.to_string(),
            })
        })
    }

    /// `ping`.
    pub async fn ping(&self, ct: CancellationToken) -> McpResult<()> {
        self.call::<Value, Value>(methods::PING, None, ct).await?;
        Ok(())
    }

    /// `tools/list`.
    pub async fn list_tools(&self, cursor: Option<String>, ct: CancellationToken) -> McpResult<ListToolsResult> {
        self.call(methods::TOOLS_LIST, Some(serde_json::json!({ "cursor": cursor })), ct).await
    }

    /// `tools/call`.
    pub async fn call_tool(&self, request: CallToolRequest, ct: CancellationToken) -> McpResult<CallToolResult> {
        self.call(methods::TOOLS_CALL, Some(request), ct).await
    }

    /// `prompts/list`.
    pub async fn list_prompts(&self, cursor: Option<String>, ct: CancellationToken) -> McpResult<ListPromptsResult> {
        self.call(methods::PROMPTS_LIST, Some(serde_json::json!({ "cursor": cursor })), ct).await
    }

    /// `prompts/get`.
    pub async fn get_prompt(&self, request: GetPromptRequest, ct: CancellationToken) -> McpResult<GetPromptResult> {
        self.call(methods::PROMPTS_GET, Some(request), ct).await
    }

    /// `resources/list`.
    pub async fn list_resources(&self, cursor: Option<String>, ct: CancellationToken) -> McpResult<ListResourcesResult> {
        self.call(methods::RESOURCES_LIST, Some(serde_json::json!({ "cursor": cursor })), ct).await
    }

    /// `resources/read`.
    pub async fn read_resource(&self, request: ReadResourceRequest, ct: CancellationToken) -> McpResult<ReadResourceResult> {
        self.call(methods::RESOURCES_READ, Some(request), ct).await
    }

    /// `resources/templates/list`.
    pub async fn list_resource_templates(&self, ct: CancellationToken) -> McpResult<ListResourceTemplatesResponse> {
        self.call::<Value, _>(methods::RESOURCES_TEMPLATES_LIST, None, ct).await
    }

    /// `resources/subscribe`.
    pub async fn subscribe_resource(&self, request: SubscribeResourceRequest, ct: CancellationToken) -> McpResult<()> {
        self.call::<_, Value>(methods::RESOURCES_SUBSCRIBE, Some(request), ct).await?;
        Ok(())
    }

    /// `resources/unsubscribe`.
    pub async fn unsubscribe_resource(&self, request: UnsubscribeResourceRequest, ct: CancellationToken) -> McpResult<()> {
        self.call::<_, Value>(methods::RESOURCES_UNSUBSCRIBE, Some(request), ct).await?;
        Ok(())
    }

    /// `completion/complete`.
    pub async fn complete(&self, params: Value, ct: CancellationToken) -> McpResult<CompletionResult> {
        self.call(methods::COMPLETION_COMPLETE, Some(params), ct).await
    }

    /// `logging/setLevel`.
    pub async fn set_log_level(&self, level: LogLevel, ct: CancellationToken) -> McpResult<()> {
        self.call::<_, Value>(methods::LOGGING_SET_LEVEL, Some(SetLoggingRequest::new(level)), ct).await?;
        Ok(())
    }

    fn install_handlers(
        &self,
        sampling_handler: Option<Arc<dyn SamplingHandler>>,
        roots_provider: Option<Arc<dyn RootsProvider>>,
    ) {
        if let Some(handler) = sampling_handler {
            self.endpoint.set_request_handler(
                methods::SAMPLING_CREATE_MESSAGE,
                Arc::new(move |params: Option<Value>, _ct: CancellationToken| {
                    let handler = Arc::clone(&handler);
                    async move {
                        let mut value = params.unwrap_or_else(|| serde_json::json!({}));
                        sanitize_sampling_content(&mut value);
                        let request: CreateMessageRequest = serde_json::from_value(value).map_err(|e| {
                            McpError::Protocol(crate::protocol::errors::ProtocolError::Serialization {
                                message: e.to_string(),
                            })
                        })?;
                        let result = handler.create_message(request).await?;
                        serde_json::to_value(result).map_err(|e| {
                            McpError::Protocol(crate::protocol::errors::ProtocolError::Serialization {
                                message: e.to_string(),
                            })
                        })
                    }
                }),
            );
        }

        if let Some(provider) = roots_provider {
            self.endpoint.set_request_handler(
                methods::ROOTS_LIST,
                Arc::new(move |_params: Option<Value>, _ct: CancellationToken| {
                    let provider = Arc::clone(&provider);
                    async move {
                        let result = provider.list().await?;
                        serde_json::to_value(result).map_err(|e| {
                            McpError::Protocol(crate::protocol::errors::ProtocolError::Serialization {
                                message: e.to_string(),
                            })
                        })
                    }
                }),
            );
        }
    }
}

/// Recognized [`crate::protocol::types::Content`] wire tags. Anything else
/// in a `sampling/createMessage` message is replaced with empty text before
/// strict deserialization, so a future content type this crate does not yet
/// know about degrades to an empty message instead of failing the request.
const KNOWN_CONTENT_TAGS: [&str; 3] = ["text", "image", "resource"];

fn sanitize_sampling_content(params: &mut Value) {
    let Some(messages) = params.get_mut("messages").and_then(|m| m.as_array_mut()) else {
        return;
    };
    for message in messages {
        let Some(content) = message.get_mut("content") else {
            continue;
        };
        let is_known = content
            .get("type")
            .and_then(|t| t.as_str())
            .map(|t| KNOWN_CONTENT_TAGS.contains(&t))
            .unwrap_or(false);
        if !is_known {
            warn!("unrecognized sampling content type, passing through as empty text");
            *content = serde_json::json!({ "type": "text", "text": "" });
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::protocol::types::{Content, SamplingMessage, StopReason};
    use crate::protocol::{JsonRpcMessage, RequestId};
    use crate::transport::memory::MemoryTransport;

    fn client_info() -> ClientInfo {
        ClientInfo {
            name: "test-client".to_string(),
            version: "0.1.0".to_string(),
        }
    }

    async fn respond_to_initialize(server: &MemoryTransport) {
        let incoming = server.receive().await.unwrap().unwrap();
        let JsonRpcMessage::Request(request) = incoming else {
            panic!("expected initialize request");
        };
        assert_eq!(request.method, methods::INITIALIZE);
        let response = InitializeResponse::new(
            ServerCapabilities::default(),
            ServerInfo {
                name: "test-server".to_string(),
                version: "1.0.0".to_string(),
            },
            Some("welcome".to_string()),
        );
        server
            .send(&JsonRpcMessage::from_response(
                Some(serde_json::to_value(response).unwrap()),
                None,
                Some(request.id),
            ))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn connect_completes_the_handshake_and_stores_server_info() {
        let (transport, server) = MemoryTransport::pair();
        let client = Client::builder(client_info()).build(transport).await.unwrap();

        let handshake = tokio::spawn({
            let server = server;
            async move {
                respond_to_initialize(&server).await;
                let initialized = server.receive().await.unwrap().unwrap();
                assert!(matches!(initialized, JsonRpcMessage::Notification(n) if n.method == methods::INITIALIZED));
            }
        });

        client.connect(CancellationToken::new()).await.unwrap();
        handshake.await.unwrap();

        assert_eq!(client.state(), ClientState::Ready);
        assert_eq!(client.server_info().await.unwrap().name, "test-server");
        assert_eq!(client.instructions().await.unwrap(), "welcome");
    }

    #[tokio::test]
    async fn a_second_connect_is_rejected() {
        let (transport, server) = MemoryTransport::pair();
        let client = Client::builder(client_info()).build(transport).await.unwrap();

        tokio::spawn({
            let server = server;
            async move {
                respond_to_initialize(&server).await;
                let _ = server.receive().await.unwrap();
            }
        });

        client.connect(CancellationToken::new()).await.unwrap();
        let err = client.connect(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, McpError::Lifecycle(LifecycleError::AlreadyConnected)));
    }

    #[tokio::test]
    async fn mismatched_protocol_version_fails_and_closes() {
        let (transport, server) = MemoryTransport::pair();
        let client = Client::builder(client_info()).build(transport).await.unwrap();

        tokio::spawn({
            let server = server;
            async move {
                let incoming = server.receive().await.unwrap().unwrap();
                let JsonRpcMessage::Request(request) = incoming else {
                    panic!("expected initialize request");
                };
                let mut response = InitializeResponse::new(
                    ServerCapabilities::default(),
                    ServerInfo { name: "s".to_string(), version: "1".to_string() },
                    None,
                );
                response.protocol_version = ProtocolVersion::new("1999-01-01").unwrap();
                server
                    .send(&JsonRpcMessage::from_response(
                        Some(serde_json::to_value(response).unwrap()),
                        None,
                        Some(request.id),
                    ))
                    .await
                    .unwrap();
            }
        });

        let err = client.connect(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, McpError::Lifecycle(LifecycleError::UnsupportedProtocolVersion(_))));
        assert_eq!(client.state(), ClientState::Closed);
    }

    #[tokio::test]
    async fn calling_a_method_before_ready_fails() {
        let (transport, _server) = MemoryTransport::pair();
        let client = Client::builder(client_info()).build(transport).await.unwrap();
        let err = client.ping(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, McpError::Lifecycle(LifecycleError::NotInitialized)));
    }

    #[tokio::test]
    async fn sampling_handler_answers_create_message_and_declares_the_capability() {
        struct EchoSampler;

        #[async_trait]
        impl SamplingHandler for EchoSampler {
            async fn create_message(&self, request: CreateMessageRequest) -> McpResult<CreateMessageResult> {
                Ok(CreateMessageResult {
                    role: "assistant".to_string(),
                    model: "echo-1".to_string(),
                    stop_reason: Some(StopReason::EndTurn),
                    content: request.messages.into_iter().next().unwrap().content,
                })
            }
        }

        let (client_transport, server) = MemoryTransport::pair();
        let client = Client::builder(client_info())
            .with_sampling_handler(Arc::new(EchoSampler))
            .build(client_transport)
            .await
            .unwrap();

        assert!(client.capabilities().sampling.is_some());

        tokio::spawn({
            let server = server;
            async move {
                respond_to_initialize(&server).await;
                let _ = server.receive().await.unwrap();

                let params = serde_json::json!({
                    "messages": [{"role": "user", "content": {"type": "text", "text": "hi"}}],
                });
                server
                    .send(&JsonRpcMessage::from_request(
                        methods::SAMPLING_CREATE_MESSAGE,
                        Some(params),
                        RequestId::new_number(99),
                    ))
                    .await
                    .unwrap();

                let response = server.receive().await.unwrap().unwrap();
                match response {
                    JsonRpcMessage::Response(resp) => {
                        let result = resp.result.unwrap();
                        assert_eq!(result["stopReason"], "endTurn");
                    }
                    other => panic!("expected response, got {other:?}"),
                }
            }
        });

        client.connect(CancellationToken::new()).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let _ = Content::text("unused");
        let _ = SamplingMessage { role: "user".to_string(), content: Content::text("x") };
    }
}
