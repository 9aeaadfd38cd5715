//! Black-box integration tests: two endpoints wired back-to-back over an
//! in-process duplex transport, exercising the handshake, tool dispatch,
//! cancellation, unknown-method, and list-changed scenarios end to end.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use mcp_runtime::client::{Client, ClientState};
use mcp_runtime::collections::PrimitiveCollection;
use mcp_runtime::error::{DispatchError, LifecycleError, McpError};
use mcp_runtime::primitives::ToolPrimitive;
use mcp_runtime::protocol::constants::methods;
use mcp_runtime::protocol::types::{
    CallToolRequest, CallToolResult, ClientInfo, Content, ServerInfo, Tool,
};
use mcp_runtime::protocol::{JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, RequestId};
use mcp_runtime::server::Server;
use mcp_runtime::transport::memory::MemoryTransport;
use mcp_runtime::transport::Transport;
use tokio_util::sync::CancellationToken;

fn client_info() -> ClientInfo {
    ClientInfo {
        name: "integration-client".to_string(),
        version: "1".to_string(),
    }
}

fn server_info() -> ServerInfo {
    ServerInfo {
        name: "integration-server".to_string(),
        version: "1".to_string(),
    }
}

fn echo_tool(name: &str) -> ToolPrimitive {
    let label = name.to_string();
    ToolPrimitive::new(
        Tool {
            name: name.to_string(),
            description: None,
            input_schema: serde_json::json!({"type": "object"}),
        },
        Arc::new(move |args: serde_json::Value, _ct: CancellationToken| {
            let label = label.clone();
            async move {
                let i = args.get("i").cloned().unwrap_or(serde_json::json!(0));
                Ok(CallToolResult::success(vec![Content::text(format!(
                    "{label} Result {i}"
                ))]))
            }
        }),
    )
}

/// Scenario 1: client sends `initialize`, server replies with its identity,
/// client sends `notifications/initialized`, and the client's view of the
/// server's identity is populated afterward.
#[tokio::test]
async fn handshake_completes_and_exposes_server_info() {
    let (client_transport, server_transport) = MemoryTransport::pair();

    let server = Server::builder(server_info()).build(server_transport).await.unwrap();
    server.start().await.unwrap();

    let client = Client::builder(client_info()).build(client_transport).await.unwrap();
    client.connect(CancellationToken::new()).await.unwrap();

    assert_eq!(client.state(), ClientState::Ready);
    assert_eq!(client.server_info().await.unwrap().name, "integration-server");
}

/// Scenario 2: a registered tool answers `tools/call`, and a mixed collection
/// plus provider surfaces every tool through `tools/list`.
#[tokio::test]
async fn tool_dispatch_lists_and_calls_through_the_collection() {
    let (client_transport, server_transport) = MemoryTransport::pair();

    let tools = PrimitiveCollection::new();
    for i in 1..=10 {
        tools.insert(format!("Method{i}"), echo_tool(&format!("Method{i}")));
    }
    tools.insert("Extra1", echo_tool("Extra1"));
    tools.insert("Extra2", echo_tool("Extra2"));

    let server = Server::builder(server_info()).with_tools(tools).build(server_transport).await.unwrap();
    server.start().await.unwrap();

    let client = Client::builder(client_info()).build(client_transport).await.unwrap();
    client.connect(CancellationToken::new()).await.unwrap();

    let listed = client.list_tools(None, CancellationToken::new()).await.unwrap();
    assert_eq!(listed.tools.len(), 12);

    let result = client
        .call_tool(
            CallToolRequest {
                name: "Method4".to_string(),
                arguments: serde_json::json!({"i": 42}),
            },
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(!result.is_error);
    let text = result.content.first().and_then(|c| c.as_text()).unwrap();
    assert_eq!(text, "Method4 Result 42");
}

/// Scenario 3: a server that echoes back a protocol version the client did
/// not request fails `connect` with a version-mismatch error and leaves the
/// client closed.
#[tokio::test]
async fn version_mismatch_fails_connect_and_closes_the_client() {
    let (client_transport, server_transport) = MemoryTransport::pair();

    tokio::spawn(async move {
        let incoming = server_transport.receive().await.unwrap().unwrap();
        let JsonRpcMessage::Request(request) = incoming else {
            panic!("expected initialize request");
        };
        let response = serde_json::json!({
            "protocolVersion": "1999-01-01",
            "serverInfo": {"name": "old-server", "version": "0.0.1"},
            "capabilities": {},
        });
        server_transport
            .send(&JsonRpcMessage::from_response(Some(response), None, Some(request.id)))
            .await
            .unwrap();
    });

    let client = Client::builder(client_info()).build(client_transport).await.unwrap();
    let err = client.connect(CancellationToken::new()).await.unwrap_err();

    assert!(matches!(err, McpError::Lifecycle(LifecycleError::UnsupportedProtocolVersion(_))));
    assert_eq!(client.state(), ClientState::Closed);
}

/// Scenario 4: cancelling an in-flight `sendRequest` emits
/// `notifications/cancelled` and the handler's cancellation token observes it.
#[tokio::test]
async fn cancelling_a_call_propagates_notifications_cancelled() {
    let (client_transport, server_transport) = MemoryTransport::pair();

    let tools = PrimitiveCollection::new();
    let handler_saw_cancellation = Arc::new(tokio::sync::Notify::new());
    let notify = Arc::clone(&handler_saw_cancellation);
    tools.insert(
        "slow",
        ToolPrimitive::new(
            Tool {
                name: "slow".to_string(),
                description: None,
                input_schema: serde_json::json!({"type": "object"}),
            },
            Arc::new(move |_args: serde_json::Value, ct: CancellationToken| {
                let notify = Arc::clone(&notify);
                async move {
                    ct.cancelled().await;
                    notify.notify_one();
                    Ok(CallToolResult::success(vec![]))
                }
            }),
        ),
    );

    let server = Server::builder(server_info()).with_tools(tools).build(server_transport).await.unwrap();
    server.start().await.unwrap();

    let client = Client::builder(client_info()).build(client_transport).await.unwrap();
    client.connect(CancellationToken::new()).await.unwrap();

    let ct = CancellationToken::new();
    let call_ct = ct.clone();
    let call = tokio::spawn({
        let client = client;
        async move {
            client
                .call_tool(
                    CallToolRequest {
                        name: "slow".to_string(),
                        arguments: serde_json::json!({}),
                    },
                    call_ct,
                )
                .await
        }
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    ct.cancel();

    let result = tokio::time::timeout(Duration::from_millis(200), call)
        .await
        .expect("call task should finish promptly after cancellation")
        .unwrap();

    assert!(matches!(result, Err(McpError::Dispatch(DispatchError::Cancelled(_)))));

    tokio::time::timeout(Duration::from_millis(200), handler_saw_cancellation.notified())
        .await
        .expect("server handler should observe the cancellation within 100ms");
}

/// Scenario 5: an unknown method yields `MethodNotFound` and the session
/// remains usable for subsequent calls.
#[tokio::test]
async fn unknown_method_does_not_poison_the_session() {
    let (client_transport, server_transport) = MemoryTransport::pair();

    let tools = PrimitiveCollection::new();
    tools.insert("echo", echo_tool("echo"));
    let server = Server::builder(server_info()).with_tools(tools).build(server_transport).await.unwrap();
    server.start().await.unwrap();

    client_transport
        .send(&JsonRpcMessage::Request(JsonRpcRequest::new(
            "foo/bar",
            None,
            RequestId::new_number(1),
        )))
        .await
        .unwrap();
    let response = client_transport.receive().await.unwrap().unwrap();
    match response {
        JsonRpcMessage::Response(resp) => assert_eq!(resp.error.unwrap().code, -32601),
        other => panic!("expected response, got {other:?}"),
    }

    client_transport
        .send(&JsonRpcMessage::Request(JsonRpcRequest::new(
            methods::TOOLS_LIST,
            None,
            RequestId::new_number(2),
        )))
        .await
        .unwrap();
    let second = client_transport.receive().await.unwrap().unwrap();
    match second {
        JsonRpcMessage::Response(resp) => assert!(resp.result.is_some()),
        other => panic!("expected response, got {other:?}"),
    }
}

/// Scenario 6: mutating a server's tool collection after the client's
/// `notifications/initialized` emits `notifications/tools/list_changed`.
#[tokio::test]
async fn collection_mutation_emits_list_changed_after_initialized() {
    let (client_transport, server_transport) = MemoryTransport::pair();

    let tools = PrimitiveCollection::new();
    let server = Server::builder(server_info()).with_tools(tools.clone()).build(server_transport).await.unwrap();
    server.start().await.unwrap();

    let init_request = JsonRpcRequest::new(
        methods::INITIALIZE,
        Some(serde_json::json!({
            "protocolVersion": "2025-06-18",
            "capabilities": {},
            "clientInfo": {"name": "c", "version": "1"},
        })),
        RequestId::new_number(1),
    );
    client_transport.send(&JsonRpcMessage::Request(init_request)).await.unwrap();
    let _ = client_transport.receive().await.unwrap().unwrap();

    client_transport
        .send(&JsonRpcMessage::Notification(JsonRpcNotification::new(methods::INITIALIZED, None)))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    tools.insert("new-tool", echo_tool("new-tool"));

    let notification = tokio::time::timeout(Duration::from_millis(200), client_transport.receive())
        .await
        .expect("list_changed should arrive within the next read cycle")
        .unwrap()
        .unwrap();

    match notification {
        JsonRpcMessage::Notification(n) => assert_eq!(n.method, methods::TOOLS_LIST_CHANGED),
        other => panic!("expected notification, got {other:?}"),
    }
}
