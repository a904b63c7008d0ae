//! End-to-end tests for WebSocket upgrades.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use module_gateway::config::GatewayConfig;
use module_gateway::module::{EchoModule, Module};
use module_gateway::{
    GatewayRequest, Handshake, HttpParams, ModuleError, WebSocketConnection, WebSocketHandler,
    WebSocketModule,
};

use common::Events;

mod common;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Records every callback; echoes text and refuses binary (default).
struct Probe {
    events: Events,
}

impl WebSocketModule for Probe {
    fn new_connection(
        &self,
        handshake: &Handshake,
        path: &str,
        params: HttpParams,
        _request: &GatewayRequest,
    ) -> Result<Box<dyn WebSocketHandler>, ModuleError> {
        self.events.push(format!("location:{}", handshake.location));
        self.events.push(format!("path:{}", path));
        self.events.push(format!("params:{}", params));
        Ok(Box::new(ProbeHandler {
            events: self.events.clone(),
        }))
    }
}

/// Refuses every connection.
struct Doorman;

impl WebSocketModule for Doorman {
    fn new_connection(
        &self,
        _handshake: &Handshake,
        _path: &str,
        _params: HttpParams,
        _request: &GatewayRequest,
    ) -> Result<Box<dyn WebSocketHandler>, ModuleError> {
        Err("refused".into())
    }
}

struct ProbeHandler {
    events: Events,
}

impl WebSocketHandler for ProbeHandler {
    fn register(&mut self, _conn: &WebSocketConnection) -> Result<(), ModuleError> {
        self.events.push("register");
        Ok(())
    }

    fn handle_text_message(&mut self, conn: &WebSocketConnection, message: String) -> Result<(), ModuleError> {
        self.events.push(format!("text:{}", message));
        let _ = conn.send_text(message);
        Ok(())
    }

    fn handle_disconnect(&mut self, _conn: &WebSocketConnection) {
        self.events.push("disconnect");
    }

    fn handle_exception(&mut self, conn: &WebSocketConnection, error: module_gateway::ConnectionError) {
        self.events.push(format!("exception:{}", error));
        let _ = conn.close();
    }
}

async fn next_message(ws: &mut Client) -> Message {
    tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timed out waiting for a frame")
        .expect("stream ended")
        .expect("websocket error")
}

#[tokio::test]
async fn echo_module_echoes_text() {
    let gateway = common::start_gateway(GatewayConfig::default()).await;
    gateway.registry.register("echo", Module::dual(EchoModule)).unwrap();

    let (mut ws, response) = connect_async(gateway.ws_url("/echo/room")).await.unwrap();
    assert_eq!(response.status(), 101);

    ws.send(Message::text("hello")).await.unwrap();
    match next_message(&mut ws).await {
        Message::Text(text) => assert_eq!(text.as_str(), "hello"),
        other => panic!("expected text, got {:?}", other),
    }

    ws.close(None).await.unwrap();
    gateway.stop().await;
}

#[tokio::test]
async fn handshake_context_reaches_module() {
    let gateway = common::start_gateway(GatewayConfig::default()).await;
    let events = Events::default();
    gateway
        .registry
        .register("probe", Module::websocket(Probe { events: events.clone() }))
        .unwrap();

    let (mut ws, _) = connect_async(gateway.ws_url("/Probe/lobby?user=ann")).await.unwrap();
    events.wait_for("register").await;

    let seen = events.snapshot();
    assert_eq!(seen[0], format!("location:ws://{}/Probe/lobby?user=ann", gateway.addr));
    assert_eq!(seen[1], "path:/lobby?user=ann");
    assert_eq!(seen[2], "params:{user=ann}");
    assert_eq!(seen[3], "register");

    ws.close(None).await.unwrap();
    events.wait_for("disconnect").await;
    gateway.stop().await;
}

#[tokio::test]
async fn ping_gets_exactly_one_pong() {
    let gateway = common::start_gateway(GatewayConfig::default()).await;
    let events = Events::default();
    gateway
        .registry
        .register("probe", Module::websocket(Probe { events: events.clone() }))
        .unwrap();

    let (mut ws, _) = connect_async(gateway.ws_url("/probe")).await.unwrap();
    ws.send(Message::Ping(b"P".to_vec().into())).await.unwrap();
    ws.send(Message::text("after")).await.unwrap();

    match next_message(&mut ws).await {
        Message::Pong(payload) => assert_eq!(&payload[..], b"P"),
        other => panic!("expected pong, got {:?}", other),
    }
    match next_message(&mut ws).await {
        Message::Text(text) => assert_eq!(text.as_str(), "after"),
        other => panic!("expected text after the single pong, got {:?}", other),
    }
    assert!(!events.snapshot().iter().any(|e| e == "text:P"));

    ws.close(None).await.unwrap();
    events.wait_for("disconnect").await;
    assert_eq!(events.count("disconnect"), 1);
    gateway.stop().await;
}

#[tokio::test]
async fn binary_frame_closes_by_default() {
    let gateway = common::start_gateway(GatewayConfig::default()).await;
    let events = Events::default();
    gateway
        .registry
        .register("probe", Module::websocket(Probe { events: events.clone() }))
        .unwrap();

    let (mut ws, _) = connect_async(gateway.ws_url("/probe")).await.unwrap();
    ws.send(Message::Binary(vec![1u8, 2, 3].into())).await.unwrap();

    assert!(matches!(next_message(&mut ws).await, Message::Close(_)));
    events.wait_for("disconnect").await;

    let seen = events.snapshot();
    assert!(seen
        .iter()
        .any(|e| e == "exception:unsupported message type: binary"));
    assert_eq!(events.count("disconnect"), 1);
    gateway.stop().await;
}

#[tokio::test]
async fn refused_connection_gets_close_frame() {
    let gateway = common::start_gateway(GatewayConfig::default()).await;
    gateway.registry.register("door", Module::websocket(Doorman)).unwrap();

    let (mut ws, response) = connect_async(gateway.ws_url("/door")).await.unwrap();
    assert_eq!(response.status(), 101);
    match next_message(&mut ws).await {
        Message::Close(Some(frame)) => assert_eq!(u16::from(frame.code), 1011),
        other => panic!("expected close frame, got {:?}", other),
    }

    gateway.stop().await;
}

#[tokio::test]
async fn unsupported_version_gets_upgrade_required() {
    let gateway = common::start_gateway(GatewayConfig::default()).await;
    gateway.registry.register("echo", Module::dual(EchoModule)).unwrap();

    let res = common::client()
        .get(gateway.url("/echo"))
        .header("upgrade", "websocket")
        .header("connection", "Upgrade")
        .header("sec-websocket-version", "8")
        .header("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ==")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 426);
    assert_eq!(res.headers()["sec-websocket-version"], "13");

    gateway.stop().await;
}

#[tokio::test]
async fn shutdown_closes_connections_with_going_away() {
    let gateway = common::start_gateway(GatewayConfig::default()).await;
    let events = Events::default();
    gateway
        .registry
        .register("probe", Module::websocket(Probe { events: events.clone() }))
        .unwrap();

    let (mut ws, _) = connect_async(gateway.ws_url("/probe")).await.unwrap();
    events.wait_for("register").await;

    let stopping = tokio::spawn(gateway.stop());
    match next_message(&mut ws).await {
        Message::Close(Some(frame)) => assert_eq!(u16::from(frame.code), 1001),
        other => panic!("expected close frame, got {:?}", other),
    }
    stopping.await.unwrap();
    assert_eq!(events.count("disconnect"), 1);
}
