//! Server role
//!
//! Installs inbound handlers on an [`Endpoint`] conditioned on which
//! capabilities the server was built with, and drives the responder side of
//! the `initialize`/`notifications/initialized` handshake. Grounded in the
//! teacher's `integration::server` module (`McpServerBuilder`/`McpServer`,
//! `ResourceProvider`/`ToolProvider`/`PromptProvider`), adapted from its
//! single fixed match-on-method dispatcher to per-method handlers registered
//! on the shared [`Endpoint`], and from its push-based `MessageHandler` to
//! the pull-based [`Transport`].
//!
//! Rather than accepting a freestanding `ServerCapabilities` plus separately
//! validating that every declared capability has a backing handler, this
//! module follows the teacher's `McpServerBuilder::build` auto-detection: a
//! capability is advertised if and only if something was wired for it, so
//! "capability declared without a handler" cannot be expressed. The one
//! handler pair the spec calls out by name, resources `subscribe`/
//! `unsubscribe`, is a single `subscribe: bool` passed alongside the
//! resource wiring, which rules out asymmetry the same way.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::collections::PrimitiveCollection;
use crate::endpoint::{Endpoint, EndpointConfig};
use crate::error::{DispatchError, McpError, McpResult};
use crate::primitives::{PromptPrimitive, ResourcePrimitive, ToolPrimitive};
use crate::protocol::constants::methods;
use crate::protocol::errors::ProtocolError;
use crate::protocol::types::{
    CallToolRequest, CallToolResult, ClientCapabilities, CompletionResult, GetPromptRequest,
    GetPromptResult, InitializeRequest, InitializeResponse, ListPromptsRequest, ListPromptsResult,
    ListResourceTemplatesResponse, ListResourcesRequest, ListResourcesResult, ListToolsRequest,
    ListToolsResult, LogLevel, LoggingCapabilities, Prompt, PromptCapabilities, ReadResourceRequest,
    ReadResourceResult, Resource, ResourceCapabilities, ServerCapabilities, ServerInfo,
    SetLoggingRequest, SubscribeResourceRequest, Tool, ToolCapabilities, UnsubscribeResourceRequest,
};
use crate::protocol::{JsonRpcMessage, JsonRpcNotification};
use crate::transport::Transport;

/// User-supplied fallback for tools not hosted directly in the server's
/// [`PrimitiveCollection`]. Grounded in the teacher's `ToolProvider`, widened
/// to a paginated list so it composes with the collection per §4.5.
#[async_trait]
pub trait ToolsProvider: Send + Sync {
    /// List this provider's tools, continuing from `cursor` if given.
    async fn list(&self, cursor: Option<String>) -> McpResult<ListToolsResult>;
    /// Invoke the named tool.
    async fn call(&self, name: &str, arguments: Value) -> McpResult<CallToolResult>;
}

/// User-supplied fallback for prompts not hosted directly in the collection.
#[async_trait]
pub trait PromptsProvider: Send + Sync {
    /// List this provider's prompts, continuing from `cursor` if given.
    async fn list(&self, cursor: Option<String>) -> McpResult<ListPromptsResult>;
    /// Render the named prompt.
    async fn get(&self, name: &str, arguments: HashMap<String, String>) -> McpResult<GetPromptResult>;
}

/// User-supplied fallback for resources not hosted directly in the collection.
#[async_trait]
pub trait ResourcesProvider: Send + Sync {
    /// List this provider's resources, continuing from `cursor` if given.
    async fn list(&self, cursor: Option<String>) -> McpResult<ListResourcesResult>;
    /// Read the resource at `uri`.
    async fn read(&self, uri: &str) -> McpResult<ReadResourceResult>;

    /// List resource templates. Default: none.
    async fn list_templates(&self, _cursor: Option<String>) -> McpResult<ListResourceTemplatesResponse> {
        Ok(ListResourceTemplatesResponse {
            resource_templates: vec![],
            next_cursor: None,
        })
    }

    /// Subscribe to content updates for `uri`. Default: unsupported.
    async fn subscribe(&self, _uri: &str) -> McpResult<()> {
        Err(McpError::Dispatch(DispatchError::CapabilityNotNegotiated(
            "resources/subscribe".to_string(),
        )))
    }

    /// Unsubscribe from content updates for `uri`. Default: unsupported.
    async fn unsubscribe(&self, _uri: &str) -> McpResult<()> {
        Err(McpError::Dispatch(DispatchError::CapabilityNotNegotiated(
            "resources/unsubscribe".to_string(),
        )))
    }
}

/// User-supplied handler for `completion/complete`.
#[async_trait]
pub trait CompletionHandler: Send + Sync {
    /// Produce completion candidates for the given request params.
    async fn complete(&self, params: Option<Value>) -> McpResult<CompletionResult>;
}

/// Failure building a [`Server`] from a [`ServerBuilder`].
#[derive(Debug, Error)]
pub enum ServerBuildError {
    /// Constructing the shared [`Endpoint`] failed.
    #[error("failed to build endpoint: {0}")]
    Endpoint(#[source] McpError),
}

/// Builder for a [`Server`]. Capabilities are derived automatically from
/// what is wired; see the module docs for why this crate resolves §4.4's
/// capability/handler validation this way rather than via a separately
/// declared `ServerCapabilities`.
pub struct ServerBuilder {
    server_info: ServerInfo,
    instructions: Option<String>,
    endpoint_config: EndpointConfig,
    tools: Option<PrimitiveCollection<ToolPrimitive>>,
    tools_provider: Option<Arc<dyn ToolsProvider>>,
    prompts: Option<PrimitiveCollection<PromptPrimitive>>,
    prompts_provider: Option<Arc<dyn PromptsProvider>>,
    resources: Option<PrimitiveCollection<ResourcePrimitive>>,
    resources_provider: Option<Arc<dyn ResourcesProvider>>,
    resources_subscribable: bool,
    completion_handler: Option<Arc<dyn CompletionHandler>>,
    logging: bool,
}

impl ServerBuilder {
    /// Start building a server identified as `server_info`.
    pub fn new(server_info: ServerInfo) -> Self {
        Self {
            server_info,
            instructions: None,
            endpoint_config: EndpointConfig::default(),
            tools: None,
            tools_provider: None,
            prompts: None,
            prompts_provider: None,
            resources: None,
            resources_provider: None,
            resources_subscribable: false,
            completion_handler: None,
            logging: false,
        }
    }

    /// Free-form instructions returned to clients during `initialize`.
    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Override the endpoint's correlation/drain-timeout configuration.
    pub fn endpoint_config(mut self, config: EndpointConfig) -> Self {
        self.endpoint_config = config;
        self
    }

    /// Host a locally-managed, mutable collection of tools.
    pub fn with_tools(mut self, tools: PrimitiveCollection<ToolPrimitive>) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Fall back to `provider` for tools not found in the local collection.
    pub fn with_tools_provider(mut self, provider: Arc<dyn ToolsProvider>) -> Self {
        self.tools_provider = Some(provider);
        self
    }

    /// Host a locally-managed, mutable collection of prompts.
    pub fn with_prompts(mut self, prompts: PrimitiveCollection<PromptPrimitive>) -> Self {
        self.prompts = Some(prompts);
        self
    }

    /// Fall back to `provider` for prompts not found in the local collection.
    pub fn with_prompts_provider(mut self, provider: Arc<dyn PromptsProvider>) -> Self {
        self.prompts_provider = Some(provider);
        self
    }

    /// Host a locally-managed, mutable collection of resources. `subscribable`
    /// advertises `resources/subscribe` and `resources/unsubscribe`.
    pub fn with_resources(mut self, resources: PrimitiveCollection<ResourcePrimitive>, subscribable: bool) -> Self {
        self.resources = Some(resources);
        self.resources_subscribable = self.resources_subscribable || subscribable;
        self
    }

    /// Fall back to `provider` for resources not found in the local collection.
    pub fn with_resources_provider(mut self, provider: Arc<dyn ResourcesProvider>, subscribable: bool) -> Self {
        self.resources_provider = Some(provider);
        self.resources_subscribable = self.resources_subscribable || subscribable;
        self
    }

    /// Install a `completion/complete` handler. Without one, the server
    /// answers with an empty completion result.
    pub fn with_completion_handler(mut self, handler: Arc<dyn CompletionHandler>) -> Self {
        self.completion_handler = Some(handler);
        self
    }

    /// Advertise the logging capability and install `logging/setLevel`.
    pub fn with_logging(mut self) -> Self {
        self.logging = true;
        self
    }

    /// Build the server over `transport`, registering every handler its
    /// wired capabilities require.
    pub async fn build<T: Transport + 'static>(self, transport: T) -> Result<Server<T>, ServerBuildError> {
        let endpoint = Endpoint::new(transport, self.endpoint_config)
            .await
            .map_err(ServerBuildError::Endpoint)?;

        let capabilities = ServerCapabilities {
            experimental: None,
            logging: self.logging.then(LoggingCapabilities::default),
            prompts: (self.prompts.is_some() || self.prompts_provider.is_some())
                .then(PromptCapabilities::default),
            resources: (self.resources.is_some() || self.resources_provider.is_some()).then(|| {
                ResourceCapabilities {
                    subscribe: Some(self.resources_subscribable),
                    list_changed: Some(true),
                }
            }),
            tools: (self.tools.is_some() || self.tools_provider.is_some()).then(ToolCapabilities::default),
        };

        let server = Server {
            endpoint: Arc::new(endpoint),
            server_info: self.server_info,
            instructions: self.instructions,
            capabilities,
            client_capabilities: Arc::new(RwLock::new(None)),
            tools: self.tools,
            tools_provider: self.tools_provider,
            prompts: self.prompts,
            prompts_provider: self.prompts_provider,
            resources: self.resources,
            resources_provider: self.resources_provider,
            resources_subscribable: self.resources_subscribable,
            resource_subscriptions: Arc::new(RwLock::new(HashSet::new())),
            completion_handler: self.completion_handler,
            log_level: Arc::new(RwLock::new(LogLevel::Info)),
            initialized_once: Arc::new(AtomicBool::new(false)),
            change_notifier_installed: Arc::new(AtomicBool::new(false)),
        };

        server.install_handlers().await;
        Ok(server)
    }
}

/// An MCP server: the responder side of the handshake, plus dispatch over
/// tool/prompt/resource collections and optional user-supplied providers.
pub struct Server<T: Transport> {
    endpoint: Arc<Endpoint<T>>,
    server_info: ServerInfo,
    instructions: Option<String>,
    capabilities: ServerCapabilities,
    client_capabilities: Arc<RwLock<Option<ClientCapabilities>>>,
    tools: Option<PrimitiveCollection<ToolPrimitive>>,
    tools_provider: Option<Arc<dyn ToolsProvider>>,
    prompts: Option<PrimitiveCollection<PromptPrimitive>>,
    prompts_provider: Option<Arc<dyn PromptsProvider>>,
    resources: Option<PrimitiveCollection<ResourcePrimitive>>,
    resources_provider: Option<Arc<dyn ResourcesProvider>>,
    resources_subscribable: bool,
    resource_subscriptions: Arc<RwLock<HashSet<String>>>,
    completion_handler: Option<Arc<dyn CompletionHandler>>,
    log_level: Arc<RwLock<LogLevel>>,
    initialized_once: Arc<AtomicBool>,
    change_notifier_installed: Arc<AtomicBool>,
}

impl<T: Transport + 'static> Server<T> {
    /// Start building a server identified as `server_info`.
    pub fn builder(server_info: ServerInfo) -> ServerBuilder {
        ServerBuilder::new(server_info)
    }

    /// Start the endpoint's read loop. Call once, after construction.
    pub async fn start(&self) -> McpResult<()> {
        self.endpoint.start().await
    }

    /// Tear the server down.
    pub async fn close(&self) -> McpResult<()> {
        self.endpoint.close().await
    }

    /// Capabilities this server advertises, derived from what was wired.
    pub fn capabilities(&self) -> &ServerCapabilities {
        &self.capabilities
    }

    /// The client's declared capabilities, available once `initialize` has
    /// been handled.
    pub async fn client_capabilities(&self) -> Option<ClientCapabilities> {
        self.client_capabilities.read().await.clone()
    }

    /// Current minimum severity set via `logging/setLevel`.
    pub async fn log_level(&self) -> LogLevel {
        *self.log_level.read().await
    }

    /// Emit `notifications/message` for a log event at `level`, gated by the
    /// level last set through `logging/setLevel` (default `info`).
    #[instrument(skip(self, data))]
    pub async fn log(&self, level: LogLevel, logger: Option<String>, data: Value) -> McpResult<()> {
        if level < *self.log_level.read().await {
            return Ok(());
        }
        let params = serde_json::json!({ "level": level, "logger": logger, "data": data });
        self.endpoint
            .send_message(JsonRpcMessage::Notification(JsonRpcNotification::new(
                methods::LOGGING_MESSAGE,
                Some(params),
            )))
            .await
    }

    /// Notify the client that the content of a subscribed resource changed.
    /// A no-op if nothing is currently subscribed to `uri`.
    pub async fn notify_resource_updated(&self, uri: &str) -> McpResult<()> {
        if !self.resource_subscriptions.read().await.contains(uri) {
            return Ok(());
        }
        self.endpoint
            .send_message(JsonRpcMessage::Notification(JsonRpcNotification::new(
                methods::RESOURCES_UPDATED,
                Some(serde_json::json!({ "uri": uri })),
            )))
            .await
    }

    async fn install_handlers(&self) {
        self.install_lifecycle_handlers();
        if self.tools.is_some() || self.tools_provider.is_some() {
            self.install_tools_handlers();
        }
        if self.prompts.is_some() || self.prompts_provider.is_some() {
            self.install_prompts_handlers();
        }
        if self.resources.is_some() || self.resources_provider.is_some() {
            self.install_resources_handlers();
        }
        if self.capabilities.logging.is_some() {
            self.install_logging_handler();
        }
        self.install_change_notifier();
    }

    fn install_lifecycle_handlers(&self) {
        let server_info = self.server_info.clone();
        let instructions = self.instructions.clone();
        let capabilities = self.capabilities.clone();
        let client_capabilities = Arc::clone(&self.client_capabilities);
        let initialized_once = Arc::clone(&self.initialized_once);

        self.endpoint.set_request_handler(
            methods::INITIALIZE,
            Arc::new(move |params: Option<Value>, _ct: CancellationToken| {
                let server_info = server_info.clone();
                let instructions = instructions.clone();
                let capabilities = capabilities.clone();
                let client_capabilities = Arc::clone(&client_capabilities);
                let initialized_once = Arc::clone(&initialized_once);
                async move {
                    handle_initialize(
                        params,
                        server_info,
                        instructions,
                        capabilities,
                        client_capabilities,
                        initialized_once,
                    )
                    .await
                }
            }),
        );

        self.endpoint.set_request_handler(
            methods::PING,
            Arc::new(|_params: Option<Value>, _ct: CancellationToken| async {
                Ok(serde_json::json!({}))
            }),
        );

        let completion_handler = self.completion_handler.clone();
        self.endpoint.set_request_handler(
            methods::COMPLETION_COMPLETE,
            Arc::new(move |params: Option<Value>, _ct: CancellationToken| {
                let completion_handler = completion_handler.clone();
                async move {
                    let result = match completion_handler {
                        Some(handler) => handler.complete(params).await?,
                        None => CompletionResult::default(),
                    };
                    to_value(result)
                }
            }),
        );
    }

    fn install_tools_handlers(&self) {
        let tools = self.tools.clone();
        let provider = self.tools_provider.clone();

        self.endpoint.set_request_handler(
            methods::TOOLS_LIST,
            Arc::new(move |params: Option<Value>, _ct: CancellationToken| {
                let tools = tools.clone();
                let provider = provider.clone();
                async move {
                    let request: ListToolsRequest = parse_params(params, methods::TOOLS_LIST)?;
                    to_value(list_tools(tools, provider, request.cursor).await?)
                }
            }),
        );

        let tools = self.tools.clone();
        let provider = self.tools_provider.clone();
        self.endpoint.set_request_handler(
            methods::TOOLS_CALL,
            Arc::new(move |params: Option<Value>, ct: CancellationToken| {
                let tools = tools.clone();
                let provider = provider.clone();
                async move {
                    let request: CallToolRequest = parse_params(params, methods::TOOLS_CALL)?;
                    let result = match tools.as_ref().and_then(|c| c.get(&request.name)) {
                        Some(primitive) => primitive.call(request.arguments, ct).await?,
                        None => match &provider {
                            Some(provider) => provider.call(&request.name, request.arguments).await?,
                            None => {
                                return Err(unknown_primitive("tool/prompt", &request.name));
                            }
                        },
                    };
                    to_value(result)
                }
            }),
        );
    }

    fn install_prompts_handlers(&self) {
        let prompts = self.prompts.clone();
        let provider = self.prompts_provider.clone();

        self.endpoint.set_request_handler(
            methods::PROMPTS_LIST,
            Arc::new(move |params: Option<Value>, _ct: CancellationToken| {
                let prompts = prompts.clone();
                let provider = provider.clone();
                async move {
                    let request: ListPromptsRequest = parse_params(params, methods::PROMPTS_LIST)?;
                    to_value(list_prompts(prompts, provider, request.cursor).await?)
                }
            }),
        );

        let prompts = self.prompts.clone();
        let provider = self.prompts_provider.clone();
        self.endpoint.set_request_handler(
            methods::PROMPTS_GET,
            Arc::new(move |params: Option<Value>, ct: CancellationToken| {
                let prompts = prompts.clone();
                let provider = provider.clone();
                async move {
                    let request: GetPromptRequest = parse_params(params, methods::PROMPTS_GET)?;
                    let result = match prompts.as_ref().and_then(|c| c.get(&request.name)) {
                        Some(primitive) => primitive.get(request.arguments, ct).await?,
                        None => match &provider {
                            Some(provider) => provider.get(&request.name, request.arguments).await?,
                            None => return Err(unknown_primitive("tool/prompt", &request.name)),
                        },
                    };
                    to_value(result)
                }
            }),
        );
    }

    fn install_resources_handlers(&self) {
        let resources = self.resources.clone();
        let provider = self.resources_provider.clone();

        self.endpoint.set_request_handler(
            methods::RESOURCES_LIST,
            Arc::new(move |params: Option<Value>, _ct: CancellationToken| {
                let resources = resources.clone();
                let provider = provider.clone();
                async move {
                    let request: ListResourcesRequest = parse_params(params, methods::RESOURCES_LIST)?;
                    to_value(list_resources(resources, provider, request.cursor).await?)
                }
            }),
        );

        let resources = self.resources.clone();
        let provider = self.resources_provider.clone();
        self.endpoint.set_request_handler(
            methods::RESOURCES_READ,
            Arc::new(move |params: Option<Value>, ct: CancellationToken| {
                let resources = resources.clone();
                let provider = provider.clone();
                async move {
                    let request: ReadResourceRequest = parse_params(params, methods::RESOURCES_READ)?;
                    let uri = request.uri.as_str();
                    let result = match resources.as_ref().and_then(|c| c.get(uri)) {
                        Some(primitive) => primitive.read(ct).await?,
                        None => match &provider {
                            Some(provider) => provider.read(uri).await?,
                            None => return Err(unknown_primitive("resource", uri)),
                        },
                    };
                    to_value(result)
                }
            }),
        );

        let provider = self.resources_provider.clone();
        self.endpoint.set_request_handler(
            methods::RESOURCES_TEMPLATES_LIST,
            Arc::new(move |_params: Option<Value>, _ct: CancellationToken| {
                let provider = provider.clone();
                async move {
                    let response = match &provider {
                        Some(provider) => provider.list_templates(None).await?,
                        None => ListResourceTemplatesResponse {
                            resource_templates: vec![],
                            next_cursor: None,
                        },
                    };
                    to_value(response)
                }
            }),
        );

        if self.resources_subscribable {
            let provider = self.resources_provider.clone();
            let subscriptions = Arc::clone(&self.resource_subscriptions);
            self.endpoint.set_request_handler(
                methods::RESOURCES_SUBSCRIBE,
                Arc::new(move |params: Option<Value>, _ct: CancellationToken| {
                    let provider = provider.clone();
                    let subscriptions = Arc::clone(&subscriptions);
                    async move {
                        let request: SubscribeResourceRequest =
                            parse_params(params, methods::RESOURCES_SUBSCRIBE)?;
                        if let Some(provider) = &provider {
                            provider.subscribe(request.uri.as_str()).await?;
                        }
                        subscriptions.write().await.insert(request.uri.as_str().to_string());
                        Ok(serde_json::json!({}))
                    }
                }),
            );

            let provider = self.resources_provider.clone();
            let subscriptions = Arc::clone(&self.resource_subscriptions);
            self.endpoint.set_request_handler(
                methods::RESOURCES_UNSUBSCRIBE,
                Arc::new(move |params: Option<Value>, _ct: CancellationToken| {
                    let provider = provider.clone();
                    let subscriptions = Arc::clone(&subscriptions);
                    async move {
                        let request: UnsubscribeResourceRequest =
                            parse_params(params, methods::RESOURCES_UNSUBSCRIBE)?;
                        if let Some(provider) = &provider {
                            provider.unsubscribe(request.uri.as_str()).await?;
                        }
                        subscriptions.write().await.remove(request.uri.as_str());
                        Ok(serde_json::json!({}))
                    }
                }),
            );
        }
    }

    fn install_logging_handler(&self) {
        let log_level = Arc::clone(&self.log_level);
        self.endpoint.set_request_handler(
            methods::LOGGING_SET_LEVEL,
            Arc::new(move |params: Option<Value>, _ct: CancellationToken| {
                let log_level = Arc::clone(&log_level);
                async move {
                    let request: SetLoggingRequest = parse_params(params, methods::LOGGING_SET_LEVEL)?;
                    *log_level.write().await = request.level;
                    Ok(serde_json::json!({}))
                }
            }),
        );
    }

    fn install_change_notifier(&self) {
        let endpoint = Arc::clone(&self.endpoint);
        let tools = self.tools.clone();
        let prompts = self.prompts.clone();
        let resources = self.resources.clone();
        let installed = Arc::clone(&self.change_notifier_installed);

        let handler = move |_params: Option<Value>| {
            let endpoint = Arc::clone(&endpoint);
            let tools = tools.clone();
            let prompts = prompts.clone();
            let resources = resources.clone();
            let installed = Arc::clone(&installed);
            async move {
                if installed.swap(true, Ordering::SeqCst) {
                    debug!("notifications/initialized already subscribed to collection changes");
                    return;
                }
                if let Some(tools) = tools {
                    spawn_list_changed_forwarder(Arc::clone(&endpoint), tools.subscribe(), methods::TOOLS_LIST_CHANGED);
                }
                if let Some(prompts) = prompts {
                    spawn_list_changed_forwarder(Arc::clone(&endpoint), prompts.subscribe(), methods::PROMPTS_LIST_CHANGED);
                }
                if let Some(resources) = resources {
                    spawn_list_changed_forwarder(Arc::clone(&endpoint), resources.subscribe(), methods::RESOURCES_LIST_CHANGED);
                }
            }
        };

        let endpoint = Arc::clone(&self.endpoint);
        tokio::spawn(async move {
            endpoint.add_notification_handler(methods::INITIALIZED, Arc::new(handler)).await;
        });
    }
}

fn spawn_list_changed_forwarder<T: Transport + 'static>(
    endpoint: Arc<Endpoint<T>>,
    mut changes: tokio::sync::broadcast::Receiver<crate::collections::Changed>,
    method: &'static str,
) {
    tokio::spawn(async move {
        while changes.recv().await.is_ok() {
            let notification = JsonRpcNotification::new(method, None);
            if let Err(err) = endpoint.send_message(JsonRpcMessage::Notification(notification)).await {
                warn!(%method, error = %err, "failed to emit list_changed notification");
                break;
            }
        }
    });
}

async fn handle_initialize(
    params: Option<Value>,
    server_info: ServerInfo,
    instructions: Option<String>,
    capabilities: ServerCapabilities,
    client_capabilities: Arc<RwLock<Option<ClientCapabilities>>>,
    initialized_once: Arc<AtomicBool>,
) -> McpResult<Value> {
    if initialized_once.swap(true, Ordering::SeqCst) {
        return Err(McpError::Lifecycle(crate::error::LifecycleError::AlreadyInitialized));
    }

    let request: InitializeRequest = parse_params(params, methods::INITIALIZE)?;
    *client_capabilities.write().await = Some(request.capabilities);
    info!(client = %request.client_info.name, "client initialized");

    to_value(InitializeResponse::new(capabilities, server_info, instructions))
}

async fn list_tools(
    tools: Option<PrimitiveCollection<ToolPrimitive>>,
    provider: Option<Arc<dyn ToolsProvider>>,
    cursor: Option<String>,
) -> McpResult<ListToolsResult> {
    if let Some(cursor) = cursor {
        return match provider {
            Some(provider) => provider.list(Some(cursor)).await,
            None => Err(McpError::Dispatch(DispatchError::InvalidParams {
                method: methods::TOOLS_LIST.to_string(),
                message: "unknown cursor".to_string(),
            })),
        };
    }

    let mut items: Vec<Tool> = tools.map(|c| c.list().into_iter().map(|p| p.descriptor).collect()).unwrap_or_default();
    let next_cursor = if let Some(provider) = provider {
        let page = provider.list(None).await?;
        items.extend(page.tools);
        page.next_cursor
    } else {
        None
    };
    Ok(ListToolsResult::with_cursor(items, next_cursor))
}

async fn list_prompts(
    prompts: Option<PrimitiveCollection<PromptPrimitive>>,
    provider: Option<Arc<dyn PromptsProvider>>,
    cursor: Option<String>,
) -> McpResult<ListPromptsResult> {
    if let Some(cursor) = cursor {
        return match provider {
            Some(provider) => provider.list(Some(cursor)).await,
            None => Err(McpError::Dispatch(DispatchError::InvalidParams {
                method: methods::PROMPTS_LIST.to_string(),
                message: "unknown cursor".to_string(),
            })),
        };
    }

    let mut items: Vec<Prompt> =
        prompts.map(|c| c.list().into_iter().map(|p| p.descriptor).collect()).unwrap_or_default();
    let next_cursor = if let Some(provider) = provider {
        let page = provider.list(None).await?;
        items.extend(page.prompts);
        page.next_cursor
    } else {
        None
    };
    Ok(ListPromptsResult::with_cursor(items, next_cursor))
}

async fn list_resources(
    resources: Option<PrimitiveCollection<ResourcePrimitive>>,
    provider: Option<Arc<dyn ResourcesProvider>>,
    cursor: Option<String>,
) -> McpResult<ListResourcesResult> {
    if let Some(cursor) = cursor {
        return match provider {
            Some(provider) => provider.list(Some(cursor)).await,
            None => Err(McpError::Dispatch(DispatchError::InvalidParams {
                method: methods::RESOURCES_LIST.to_string(),
                message: "unknown cursor".to_string(),
            })),
        };
    }

    let mut items: Vec<Resource> =
        resources.map(|c| c.list().into_iter().map(|p| p.descriptor).collect()).unwrap_or_default();
    let next_cursor = if let Some(provider) = provider {
        let page = provider.list(None).await?;
        items.extend(page.resources);
        page.next_cursor
    } else {
        None
    };
    Ok(ListResourcesResult::with_cursor(items, next_cursor))
}

/// `label` is `"tool/prompt"` or `"resource"`, matching the wording
/// required of the composed dispatch fallback.
fn unknown_primitive(label: &str, name: &str) -> McpError {
    McpError::Dispatch(DispatchError::HandlerFailed {
        method: label.to_string(),
        message: format!("Unknown {label} '{name}'"),
    })
}

fn parse_params<D: serde::de::DeserializeOwned>(params: Option<Value>, method: &str) -> McpResult<D> {
    serde_json::from_value(params.unwrap_or_else(|| serde_json::json!({}))).map_err(|e| {
        McpError::Dispatch(DispatchError::InvalidParams {
            method: method.to_string(),
            message: e.to_string(),
        })
    })
}

fn to_value<S: serde::Serialize>(value: S) -> McpResult<Value> {
    serde_json::to_value(value).map_err(|e| {
        McpError::Protocol(ProtocolError::Serialization {
            message: e.to_string(),
        })
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::protocol::types::Content;
    use crate::protocol::{JsonRpcMessage, RequestId};
    use crate::transport::memory::MemoryTransport;

    fn server_info() -> ServerInfo {
        ServerInfo {
            name: "test-server".to_string(),
            version: "0.1.0".to_string(),
        }
    }

    async fn request(client: &MemoryTransport, method: &str, params: Option<Value>, id: i64) -> JsonRpcMessage {
        client
            .send(&JsonRpcMessage::from_request(method, params, RequestId::new_number(id)))
            .await
            .unwrap();
        client.receive().await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn initialize_returns_capabilities_and_rejects_a_second_call() {
        let (client, transport) = MemoryTransport::pair();
        let tools = PrimitiveCollection::new();
        tools.insert(
            "echo",
            ToolPrimitive::new(
                Tool {
                    name: "echo".to_string(),
                    description: None,
                    input_schema: serde_json::json!({"type": "object"}),
                },
                Arc::new(|args: Value, _ct: CancellationToken| async move {
                    Ok(CallToolResult::success(vec![Content::text(args.to_string())]))
                }),
            ),
        );

        let server = Server::builder(server_info())
            .with_tools(tools)
            .build(transport)
            .await
            .unwrap();
        server.start().await.unwrap();

        let init_params = serde_json::json!({
            "protocolVersion": "2025-06-18",
            "capabilities": {},
            "clientInfo": {"name": "c", "version": "1"},
        });
        let response = request(&client, methods::INITIALIZE, Some(init_params.clone()), 1).await;
        match response {
            JsonRpcMessage::Response(resp) => {
                let result = resp.result.unwrap();
                assert_eq!(result["serverInfo"]["name"], "test-server");
                assert!(result["capabilities"]["tools"].is_object());
            }
            other => panic!("expected response, got {other:?}"),
        }

        let second = request(&client, methods::INITIALIZE, Some(init_params), 2).await;
        match second {
            JsonRpcMessage::Response(resp) => {
                assert_eq!(resp.error.unwrap().code, -32600);
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn tools_list_and_call_dispatch_through_the_collection() {
        let (client, transport) = MemoryTransport::pair();
        let tools = PrimitiveCollection::new();
        tools.insert(
            "echo",
            ToolPrimitive::new(
                Tool {
                    name: "echo".to_string(),
                    description: None,
                    input_schema: serde_json::json!({"type": "object"}),
                },
                Arc::new(|args: Value, _ct: CancellationToken| async move {
                    Ok(CallToolResult::success(vec![Content::text(args.to_string())]))
                }),
            ),
        );

        let server = Server::builder(server_info()).with_tools(tools).build(transport).await.unwrap();
        server.start().await.unwrap();

        let list = request(&client, methods::TOOLS_LIST, None, 1).await;
        match list {
            JsonRpcMessage::Response(resp) => {
                let result = resp.result.unwrap();
                assert_eq!(result["tools"].as_array().unwrap().len(), 1);
            }
            other => panic!("expected response, got {other:?}"),
        }

        let call_params = serde_json::json!({"name": "echo", "arguments": {"x": 1}});
        let call = request(&client, methods::TOOLS_CALL, Some(call_params), 2).await;
        match call {
            JsonRpcMessage::Response(resp) => {
                let result = resp.result.unwrap();
                assert_eq!(result["isError"], false);
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn calling_an_unregistered_tool_fails() {
        let (client, transport) = MemoryTransport::pair();
        let server = Server::builder(server_info())
            .with_tools(PrimitiveCollection::new())
            .build(transport)
            .await
            .unwrap();
        server.start().await.unwrap();

        let call_params = serde_json::json!({"name": "missing", "arguments": {}});
        let response = request(&client, methods::TOOLS_CALL, Some(call_params), 1).await;
        match response {
            JsonRpcMessage::Response(resp) => assert!(resp.error.is_some()),
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn a_method_without_a_declared_capability_is_not_found() {
        let (client, transport) = MemoryTransport::pair();
        let server = Server::builder(server_info()).build(transport).await.unwrap();
        server.start().await.unwrap();

        let response = request(&client, methods::TOOLS_LIST, None, 1).await;
        match response {
            JsonRpcMessage::Response(resp) => assert_eq!(resp.error.unwrap().code, -32601),
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn initialized_notification_subscribes_to_collection_changes_at_most_once() {
        let (client, transport) = MemoryTransport::pair();
        let tools = PrimitiveCollection::new();
        let server = Server::builder(server_info()).with_tools(tools.clone()).build(transport).await.unwrap();
        server.start().await.unwrap();

        for _ in 0..2 {
            client
                .send(&JsonRpcMessage::from_notification(methods::INITIALIZED, None))
                .await
                .unwrap();
        }
        // allow the notification handler's spawned subscriber to install
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        tools.insert(
            "a",
            ToolPrimitive::new(
                Tool {
                    name: "a".to_string(),
                    description: None,
                    input_schema: serde_json::json!({"type": "object"}),
                },
                Arc::new(|_args: Value, _ct: CancellationToken| async {
                    Ok(CallToolResult::success(vec![]))
                }),
            ),
        );

        let notified = client.receive().await.unwrap().unwrap();
        match notified {
            JsonRpcMessage::Notification(n) => assert_eq!(n.method, methods::TOOLS_LIST_CHANGED),
            other => panic!("expected notification, got {other:?}"),
        }

        // a single insert must not be reported twice, regardless of the
        // duplicate `initialized` above
        tools.insert(
            "b",
            ToolPrimitive::new(
                Tool {
                    name: "b".to_string(),
                    description: None,
                    input_schema: serde_json::json!({"type": "object"}),
                },
                Arc::new(|_args: Value, _ct: CancellationToken| async {
                    Ok(CallToolResult::success(vec![]))
                }),
            ),
        );
        let second_notification = client.receive().await.unwrap().unwrap();
        match second_notification {
            JsonRpcMessage::Notification(n) => assert_eq!(n.method, methods::TOOLS_LIST_CHANGED),
            other => panic!("expected notification, got {other:?}"),
        }
        let pending = client.receive();
        let timed_out = tokio::time::timeout(std::time::Duration::from_millis(50), pending).await;
        assert!(timed_out.is_err(), "expected no third notification from a duplicate subscription");
    }
}
