//! Handle to one upgraded connection.
//!
//! Outbound sends are queued to the connection task and complete once the
//! frame has been written to the socket. Callers may ignore or await the
//! returned [`SendHandle`].

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message};
use tokio::sync::{mpsc, oneshot};

use crate::error::ConnectionError;
use crate::net::connection::{ConnectionId, ConnectionState, StateCell};
use crate::websocket::Handshake;

/// Work queued for the connection task.
#[derive(Debug)]
pub(crate) enum Outbound {
    Frame(Message),
    Close(Option<CloseFrame>),
}

pub(crate) struct Command {
    pub(crate) outbound: Outbound,
    pub(crate) done: oneshot::Sender<Result<(), ConnectionError>>,
}

struct Inner {
    id: ConnectionId,
    module_id: String,
    remote_addr: SocketAddr,
    handshake: Handshake,
    state: StateCell,
    commands: mpsc::UnboundedSender<Command>,
}

/// Cloneable handle for sending on a WebSocket connection.
///
/// Clones may be moved to other tasks; sends from anywhere are serialized
/// by the connection task.
#[derive(Clone)]
pub struct WebSocketConnection {
    inner: Arc<Inner>,
}

impl WebSocketConnection {
    pub(crate) fn new(
        id: ConnectionId,
        module_id: String,
        remote_addr: SocketAddr,
        handshake: Handshake,
    ) -> (Self, mpsc::UnboundedReceiver<Command>) {
        let (commands, rx) = mpsc::unbounded_channel();
        let conn = Self {
            inner: Arc::new(Inner {
                id,
                module_id,
                remote_addr,
                handshake,
                state: StateCell::new(),
                commands,
            }),
        };
        (conn, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    /// Id of the module serving this connection.
    pub fn module_id(&self) -> &str {
        &self.inner.module_id
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.inner.remote_addr
    }

    pub fn handshake(&self) -> &Handshake {
        &self.inner.handshake
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state.get()
    }

    pub(crate) fn advance(&self, next: ConnectionState) -> bool {
        self.inner.state.advance(next)
    }

    /// Send a text frame.
    pub fn send_text(&self, text: impl Into<String>) -> SendHandle {
        self.enqueue(Outbound::Frame(Message::text(text.into())))
    }

    /// Send a text frame from raw bytes, which must be valid UTF-8.
    pub fn send_text_bytes(&self, bytes: impl Into<Bytes>) -> SendHandle {
        match String::from_utf8(bytes.into().to_vec()) {
            Ok(text) => self.send_text(text),
            Err(_) => SendHandle::ready(Err(ConnectionError::InvalidText)),
        }
    }

    /// Send a binary frame.
    pub fn send_binary(&self, data: impl Into<Bytes>) -> SendHandle {
        self.enqueue(Outbound::Frame(Message::Binary(data.into())))
    }

    /// Start the closing handshake with a normal-closure frame.
    pub fn close(&self) -> SendHandle {
        self.enqueue(Outbound::Close(None))
    }

    /// Start the closing handshake with an explicit code and reason.
    pub fn close_with(&self, code: u16, reason: impl Into<String>) -> SendHandle {
        let reason: String = reason.into();
        self.enqueue(Outbound::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })))
    }

    fn enqueue(&self, outbound: Outbound) -> SendHandle {
        if self.state() == ConnectionState::Closed {
            return SendHandle::ready(Err(ConnectionError::Closed));
        }
        let (done, rx) = oneshot::channel();
        match self.inner.commands.send(Command { outbound, done }) {
            Ok(()) => SendHandle { rx },
            Err(_) => SendHandle::ready(Err(ConnectionError::Closed)),
        }
    }
}

impl std::fmt::Debug for WebSocketConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketConnection")
            .field("id", &self.inner.id)
            .field("module_id", &self.inner.module_id)
            .field("remote_addr", &self.inner.remote_addr)
            .field("state", &self.state())
            .finish()
    }
}

/// Completion of an outbound send.
///
/// Dropping the handle does not cancel the send.
pub struct SendHandle {
    rx: oneshot::Receiver<Result<(), ConnectionError>>,
}

impl SendHandle {
    fn ready(result: Result<(), ConnectionError>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Self { rx }
    }
}

impl Future for SendHandle {
    type Output = Result<(), ConnectionError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(ConnectionError::Closed)))
    }
}
