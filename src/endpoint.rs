//! Endpoint core
//!
//! The `Endpoint` is the piece shared by both the client and server roles: it
//! owns a transport, correlates outbound requests with their responses,
//! dispatches inbound requests and notifications to registered handlers, and
//! propagates cancellation in both directions. Grounded in the read-loop and
//! handler-dispatch shape of the teacher's `integration::server`/`client`
//! modules, generalized from a single fixed MCP surface to an arbitrary
//! method table, and rebuilt on the pull-based [`Transport`] trait instead of
//! the teacher's `MessageHandler` callback.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::TimeDelta;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, trace, warn};

use crate::cancellation::CancellationTable;
use crate::correlation::{CorrelationConfig, CorrelationError, CorrelationManager};
use crate::error::{DispatchError, LifecycleError, McpError, McpResult};
use crate::protocol::constants::methods;
use crate::protocol::{JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use crate::transport::Transport;

/// Configuration for an [`Endpoint`].
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Correlation table settings (pending-request timeout, cleanup cadence).
    pub correlation: CorrelationConfig,
    /// How long `close()` waits for the read loop to exit on its own before
    /// forcing the transport closed.
    pub drain_timeout: std::time::Duration,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            correlation: CorrelationConfig::default(),
            drain_timeout: std::time::Duration::from_secs(
                crate::protocol::constants::defaults::DRAIN_TIMEOUT_SECONDS,
            ),
        }
    }
}

/// Handles a single inbound request method, producing either a JSON result or
/// a structured error.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Handle the request's params under the given cancellation token.
    async fn handle(&self, params: Option<Value>, ct: CancellationToken) -> McpResult<Value>;
}

#[async_trait]
impl<F, Fut> RequestHandler for F
where
    F: Fn(Option<Value>, CancellationToken) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = McpResult<Value>> + Send,
{
    async fn handle(&self, params: Option<Value>, ct: CancellationToken) -> McpResult<Value> {
        (self)(params, ct).await
    }
}

/// Handles a single inbound notification method.
#[async_trait]
pub trait NotificationHandler: Send + Sync {
    /// Handle the notification's params. Errors are logged, not propagated.
    async fn handle(&self, params: Option<Value>);
}

#[async_trait]
impl<F, Fut> NotificationHandler for F
where
    F: Fn(Option<Value>) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = ()> + Send,
{
    async fn handle(&self, params: Option<Value>) {
        (self)(params).await
    }
}

type NotificationHandlers = RwLock<Vec<Arc<dyn NotificationHandler>>>;

/// Shared request/response engine underlying both client and server roles.
pub struct Endpoint<T: Transport> {
    transport: Arc<T>,
    correlation: Arc<CorrelationManager>,
    cancellation: Arc<CancellationTable>,
    request_handlers: Arc<DashMap<String, Arc<dyn RequestHandler>>>,
    notification_handlers: Arc<DashMap<String, NotificationHandlers>>,
    connected: Arc<AtomicBool>,
    read_loop: Mutex<Option<JoinHandle<()>>>,
    drain_timeout: std::time::Duration,
}

impl<T: Transport + 'static> Endpoint<T> {
    /// Build an endpoint over `transport`. Does not start the read loop; call
    /// [`Endpoint::start`] once handlers are registered.
    pub async fn new(transport: T, config: EndpointConfig) -> McpResult<Self> {
        let correlation = CorrelationManager::new(config.correlation)
            .await
            .map_err(McpError::Correlation)?;

        Ok(Self {
            transport: Arc::new(transport),
            correlation: Arc::new(correlation),
            cancellation: Arc::new(CancellationTable::new()),
            request_handlers: Arc::new(DashMap::new()),
            notification_handlers: Arc::new(DashMap::new()),
            connected: Arc::new(AtomicBool::new(false)),
            read_loop: Mutex::new(None),
            drain_timeout: config.drain_timeout,
        })
    }

    /// Register (or replace) the handler for an inbound request method.
    pub fn set_request_handler(&self, method: impl Into<String>, handler: Arc<dyn RequestHandler>) {
        self.request_handlers.insert(method.into(), handler);
    }

    /// Register an additional handler for an inbound notification method;
    /// multiple handlers for the same method all run, in registration order.
    pub async fn add_notification_handler(
        &self,
        method: impl Into<String>,
        handler: Arc<dyn NotificationHandler>,
    ) {
        let method = method.into();
        let entry = self
            .notification_handlers
            .entry(method)
            .or_insert_with(|| RwLock::new(Vec::new()));
        entry.write().await.push(handler);
    }

    /// Start the read loop. An endpoint may be started exactly once; a second
    /// call fails with [`LifecycleError::AlreadyConnected`].
    pub async fn start(&self) -> McpResult<()> {
        if self
            .connected
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(McpError::Lifecycle(LifecycleError::AlreadyConnected));
        }

        let transport = Arc::clone(&self.transport);
        let correlation = Arc::clone(&self.correlation);
        let cancellation = Arc::clone(&self.cancellation);
        let request_handlers = Arc::clone(&self.request_handlers);
        let notification_handlers = Arc::clone(&self.notification_handlers);

        let handle = tokio::spawn(async move {
            read_loop(
                transport,
                correlation,
                cancellation,
                request_handlers,
                notification_handlers,
            )
            .await;
        });

        *self.read_loop.lock().await = Some(handle);
        Ok(())
    }

    /// Send a request and await its response, honoring `ct` for cancellation.
    ///
    /// On cancellation, sends `notifications/cancelled` for the allocated id
    /// and fails with [`DispatchError::Cancelled`].
    #[instrument(skip(self, params, ct), fields(method = %method))]
    pub async fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
        ct: CancellationToken,
    ) -> McpResult<Value> {
        let (id, receiver) = self
            .correlation
            .register_request(
                Some(TimeDelta::seconds(30)),
                serde_json::json!({"method": method}),
            )
            .await
            .map_err(McpError::Correlation)?;

        let request = JsonRpcRequest::new(method, params, id.clone());
        self.transport
            .send(&JsonRpcMessage::Request(request))
            .await
            .map_err(McpError::Transport)?;

        tokio::select! {
            result = receiver => {
                match result {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(CorrelationError::Timeout { .. })) => {
                        Err(McpError::Lifecycle(LifecycleError::InitializeTimedOut))
                    }
                    Ok(Err(err)) => Err(McpError::Correlation(err)),
                    Err(_) => Err(McpError::Lifecycle(LifecycleError::Closed)),
                }
            }
            _ = ct.cancelled() => {
                let _ = self.correlation.cancel_request(&id).await;
                let params = crate::protocol::types::CancelledParams {
                    request_id: id.clone(),
                    reason: Some("client cancelled".to_string()),
                };
                let cancelled = JsonRpcNotification::new(
                    methods::CANCELLED,
                    serde_json::to_value(params).ok(),
                );
                let _ = self.transport.send(&JsonRpcMessage::Notification(cancelled)).await;
                Err(McpError::Dispatch(DispatchError::Cancelled(id)))
            }
        }
    }

    /// Send a pre-built message (typically a notification) without waiting
    /// for any response.
    pub async fn send_message(&self, message: JsonRpcMessage) -> McpResult<()> {
        self.transport.send(&message).await.map_err(McpError::Transport)
    }

    /// Tear the endpoint down: cancel pending outbound requests and inbound
    /// handler tokens, then close the transport. Waits up to `drain_timeout`
    /// for the read loop to exit on its own first.
    pub async fn close(&self) -> McpResult<()> {
        let handle = self.read_loop.lock().await.take();
        if let Some(handle) = handle {
            if tokio::time::timeout(self.drain_timeout, handle).await.is_err() {
                warn!("read loop did not exit within drain timeout, forcing close");
            }
        }
        self.transport.close().await.map_err(McpError::Transport)
    }
}

async fn read_loop<T: Transport>(
    transport: Arc<T>,
    correlation: Arc<CorrelationManager>,
    cancellation: Arc<CancellationTable>,
    request_handlers: Arc<DashMap<String, Arc<dyn RequestHandler>>>,
    notification_handlers: Arc<DashMap<String, NotificationHandlers>>,
) {
    loop {
        match transport.receive().await {
            Ok(Some(message)) => {
                handle_message(
                    message,
                    &transport,
                    &correlation,
                    &cancellation,
                    &request_handlers,
                    &notification_handlers,
                )
                .await;
            }
            Ok(None) => {
                debug!("transport closed cleanly, exiting read loop");
                break;
            }
            Err(err) => {
                error!(error = %err, "transport read failed, exiting read loop");
                break;
            }
        }
    }

    for id in correlation.get_pending_request_ids().await {
        let _ = correlation.cancel_request(&id).await;
    }
}

async fn handle_message<T: Transport>(
    message: JsonRpcMessage,
    transport: &Arc<T>,
    correlation: &Arc<CorrelationManager>,
    cancellation: &Arc<CancellationTable>,
    request_handlers: &Arc<DashMap<String, Arc<dyn RequestHandler>>>,
    notification_handlers: &Arc<DashMap<String, NotificationHandlers>>,
) {
    match message {
        JsonRpcMessage::Response(response) => handle_response(response, correlation).await,
        JsonRpcMessage::Notification(notification) => {
            handle_notification(notification, cancellation, notification_handlers).await
        }
        JsonRpcMessage::Request(request) => {
            handle_request(request, Arc::clone(transport), Arc::clone(cancellation), Arc::clone(request_handlers))
                .await
        }
    }
}

async fn handle_response(response: JsonRpcResponse, correlation: &Arc<CorrelationManager>) {
    let Some(id) = response.id else {
        warn!("received response with no id, dropping");
        return;
    };

    let outcome = match (response.result, response.error) {
        (Some(result), None) => Ok(result),
        (None, Some(error)) => Err(CorrelationError::Internal {
            message: format!("remote error {}: {}", error.code, error.message),
        }),
        _ => Err(CorrelationError::Internal {
            message: "response had both or neither of result/error".to_string(),
        }),
    };

    if correlation.correlate_response(&id, outcome).await.is_err() {
        warn!(%id, "received response for unknown request id, dropping");
    }
}

async fn handle_notification(
    notification: JsonRpcNotification,
    cancellation: &Arc<CancellationTable>,
    notification_handlers: &Arc<DashMap<String, NotificationHandlers>>,
) {
    if notification.method == methods::CANCELLED {
        if let Some(params) = notification
            .params
            .as_ref()
            .and_then(|p| serde_json::from_value::<crate::protocol::types::CancelledParams>(p.clone()).ok())
        {
            trace!(request_id = %params.request_id, "inbound cancellation received");
            cancellation.cancel(&params.request_id);
        }
        return;
    }

    if let Some(handlers) = notification_handlers.get(&notification.method) {
        for handler in handlers.read().await.iter() {
            handler.handle(notification.params.clone()).await;
        }
    }
}

async fn handle_request<T: Transport>(
    request: JsonRpcRequest,
    transport: Arc<T>,
    cancellation: Arc<CancellationTable>,
    request_handlers: Arc<DashMap<String, Arc<dyn RequestHandler>>>,
) {
    let handler = request_handlers.get(&request.method).map(|h| Arc::clone(h.value()));
    let token = cancellation.register(request.id.clone());

    tokio::spawn(async move {
        let response = match handler {
            None => JsonRpcResponse::error(
                JsonRpcError::new(
                    crate::protocol::constants::error_codes::METHOD_NOT_FOUND,
                    format!("Method not found: {}", request.method),
                ),
                Some(request.id.clone()),
            ),
            Some(handler) => match handler.handle(request.params, token).await {
                Ok(value) => JsonRpcResponse::success(value, request.id.clone()),
                Err(err) => JsonRpcResponse::error(
                    JsonRpcError::new(err.error_code(), err.to_string()),
                    Some(request.id.clone()),
                ),
            },
        };

        cancellation.remove(&request.id);

        if let Err(err) = transport.send(&JsonRpcMessage::Response(response)).await {
            error!(error = %err, "failed to write response");
        }
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::protocol::RequestId;
    use crate::transport::memory::MemoryTransport;

    #[tokio::test]
    async fn unknown_method_yields_method_not_found() {
        let (client, server) = MemoryTransport::pair();
        let endpoint = Endpoint::new(server, EndpointConfig::default()).await.unwrap();
        endpoint.start().await.unwrap();

        let request = JsonRpcMessage::from_request("foo/bar", None, RequestId::new_number(1));
        client.send(&request).await.unwrap();

        let response = client.receive().await.unwrap().unwrap();
        match response {
            JsonRpcMessage::Response(resp) => {
                assert_eq!(resp.error.unwrap().code, -32601);
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn registered_handler_answers_a_request() {
        let (client, server) = MemoryTransport::pair();
        let endpoint = Endpoint::new(server, EndpointConfig::default()).await.unwrap();
        endpoint.set_request_handler(
            "ping",
            Arc::new(|_params: Option<Value>, _ct: CancellationToken| async {
                Ok(serde_json::json!({}))
            }),
        );
        endpoint.start().await.unwrap();

        let request = JsonRpcMessage::from_request("ping", None, RequestId::new_number(1));
        client.send(&request).await.unwrap();

        let response = client.receive().await.unwrap().unwrap();
        match response {
            JsonRpcMessage::Response(resp) => assert!(resp.result.is_some()),
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn double_start_fails() {
        let (_client, server) = MemoryTransport::pair();
        let endpoint = Endpoint::new(server, EndpointConfig::default()).await.unwrap();
        endpoint.start().await.unwrap();
        let err = endpoint.start().await.unwrap_err();
        assert!(matches!(err, McpError::Lifecycle(LifecycleError::AlreadyConnected)));
    }

    #[allow(dead_code)]
    fn assert_handler_map_type(_: &HashMap<String, ()>) {}
}
