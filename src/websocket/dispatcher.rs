//! Frame dispatch loop for one upgraded connection.
//!
//! # Responsibilities
//! - Build the module's handler once the handshake has completed
//! - Run `register`, then dispatch frames strictly in arrival order
//! - Write queued outbound frames and complete their handles
//! - Close with 1001 when the server shuts down
//! - Run `handle_disconnect` exactly once on teardown

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::{mpsc, watch};

use crate::error::{ConnectionError, ModuleError};
use crate::http::{GatewayRequest, HttpParams};
use crate::module::{guard_callback, WebSocketModule};
use crate::net::connection::{ConnectionGuard, ConnectionState};
use crate::observability::metrics;
use crate::websocket::connection::{Command, Outbound, WebSocketConnection};
use crate::websocket::{Handshake, WebSocketHandler};

/// Close code sent to peers when the server shuts down.
const GOING_AWAY: u16 = 1001;

/// Close code sent when the module cannot take the connection.
const INTERNAL_ERROR: u16 = 1011;

/// Everything the router resolved before the upgrade completed.
pub(crate) struct ConnectionSetup {
    pub module: Arc<dyn WebSocketModule>,
    pub module_id: String,
    pub remote_addr: SocketAddr,
    pub handshake: Handshake,
    pub path: String,
    pub params: HttpParams,
    pub request: GatewayRequest,
}

enum Flow {
    Continue,
    Stop,
}

/// Serve an upgraded socket until it closes.
pub(crate) async fn serve<S>(
    mut socket: S,
    setup: ConnectionSetup,
    guard: ConnectionGuard,
    closing: watch::Receiver<bool>,
) where
    S: Stream<Item = Result<Message, axum::Error>> + Sink<Message, Error = axum::Error> + Unpin,
{
    let (conn, commands) = WebSocketConnection::new(
        guard.id(),
        setup.module_id.clone(),
        setup.remote_addr,
        setup.handshake.clone(),
    );

    let ConnectionSetup {
        module,
        handshake,
        path,
        params,
        request,
        ..
    } = setup;
    let handler = match guard_callback(|| module.new_connection(&handshake, &path, params, &request)) {
        Ok(handler) => handler,
        Err(e) => {
            tracing::error!(
                connection_id = %conn.id(),
                module = %conn.module_id(),
                error = %e,
                "Module refused WebSocket connection"
            );
            let frame = CloseFrame {
                code: INTERNAL_ERROR,
                reason: "connection refused by module".into(),
            };
            let _ = socket.send(Message::Close(Some(frame))).await;
            let _ = socket.flush().await;
            return;
        }
    };

    tracing::info!(
        connection_id = %conn.id(),
        module = %conn.module_id(),
        remote_addr = %conn.remote_addr(),
        path = %path,
        "WebSocket connection established"
    );
    run(socket, conn, commands, handler, closing).await;
    drop(guard);
}

/// Drive one connection: callbacks, outbound queue and shutdown signal.
pub(crate) async fn run<S>(
    mut socket: S,
    conn: WebSocketConnection,
    mut commands: mpsc::UnboundedReceiver<Command>,
    mut handler: Box<dyn WebSocketHandler>,
    mut closing: watch::Receiver<bool>,
) where
    S: Stream<Item = Result<Message, axum::Error>> + Sink<Message, Error = axum::Error> + Unpin,
{
    conn.advance(ConnectionState::WebSocketActive);
    if let Err(e) = guard_callback(|| handler.register(&conn)) {
        handler.handle_exception(&conn, callback_error(e));
    }

    loop {
        tokio::select! {
            biased;

            Some(command) = commands.recv() => {
                if let Flow::Stop = write_command(&mut socket, command).await {
                    break;
                }
            }

            _ = closing.changed() => {
                tracing::debug!(connection_id = %conn.id(), "Closing WebSocket for shutdown");
                let frame = CloseFrame {
                    code: GOING_AWAY,
                    reason: "server shutting down".into(),
                };
                let _ = socket.send(Message::Close(Some(frame))).await;
                break;
            }

            frame = socket.next() => match frame {
                None => break,
                Some(Err(e)) => {
                    handler.handle_exception(&conn, ConnectionError::Transport(e));
                    break;
                }
                Some(Ok(message)) => match dispatch(&mut socket, handler.as_mut(), &conn, message).await {
                    Ok(Flow::Continue) => {}
                    Ok(Flow::Stop) => break,
                    Err(e) => handler.handle_exception(&conn, e),
                },
            },
        }
    }

    conn.advance(ConnectionState::Closed);
    commands.close();
    while let Ok(command) = commands.try_recv() {
        let _ = command.done.send(Err(ConnectionError::Closed));
    }

    let disconnected = guard_callback(|| {
        handler.handle_disconnect(&conn);
        Ok(())
    });
    if let Err(e) = disconnected {
        tracing::error!(connection_id = %conn.id(), error = %e, "Disconnect callback failed");
    }
    tracing::info!(
        connection_id = %conn.id(),
        module = %conn.module_id(),
        "WebSocket connection closed"
    );
}

/// Errors a callback raised as a [`ConnectionError`] keep their kind.
fn callback_error(error: ModuleError) -> ConnectionError {
    match error.downcast::<ConnectionError>() {
        Ok(error) => *error,
        Err(error) => ConnectionError::Callback(error),
    }
}

async fn write_command<S>(socket: &mut S, command: Command) -> Flow
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    let (message, flow) = match command.outbound {
        Outbound::Frame(message) => (message, Flow::Continue),
        Outbound::Close(frame) => (Message::Close(frame), Flow::Stop),
    };
    let result = socket.send(message).await.map_err(ConnectionError::Transport);
    let failed = result.is_err();
    let _ = command.done.send(result);
    if failed {
        Flow::Stop
    } else {
        flow
    }
}

async fn dispatch<S>(
    socket: &mut S,
    handler: &mut dyn WebSocketHandler,
    conn: &WebSocketConnection,
    message: Message,
) -> Result<Flow, ConnectionError>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    match message {
        Message::Close(frame) => {
            metrics::record_websocket_frame("close");
            // Echo the close frame, then flush any reply the codec queued itself
            let _ = socket.send(Message::Close(frame)).await;
            let _ = socket.flush().await;
            Ok(Flow::Stop)
        }
        Message::Ping(payload) => {
            metrics::record_websocket_frame("ping");
            socket.send(Message::Pong(payload)).await?;
            Ok(Flow::Continue)
        }
        Message::Text(text) => {
            metrics::record_websocket_frame("text");
            guard_callback(|| handler.handle_text_message(conn, text.as_str().to_owned()))
                .map_err(callback_error)?;
            Ok(Flow::Continue)
        }
        Message::Binary(data) => {
            metrics::record_websocket_frame("binary");
            guard_callback(|| handler.handle_binary_message(conn, data))
                .map_err(callback_error)?;
            Ok(Flow::Continue)
        }
        Message::Pong(_) => {
            metrics::record_websocket_frame("pong");
            Err(ConnectionError::UnsupportedMessageType("pong".to_string()))
        }
    }
}
