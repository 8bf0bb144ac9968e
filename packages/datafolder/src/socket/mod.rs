//! WebSocket routing.
//!
//! Framing is the transport's job. This module only sees a socket as
//! something that can `send` and `close`, and expects the transport to report
//! incoming traffic through the `Connection` returned when the socket was
//! accepted:
//!
//! - `Connection::Relay`: the socket joined a broadcast path
//! - `Connection::Datafolder`: the socket belongs to a data folder and is
//!   (or will be) handed to its engine
//! - `Connection::Rejected`: the socket was closed on arrival

mod awaiting;
mod relay;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::context::{InboundRequest, Permissions};
use crate::error::SocketError;

pub use awaiting::{AwaitingSocket, AwaitingSockets};
pub use relay::{BroadcastRelay, RelayMember};

/// Close codes used when the service closes a socket itself.
pub mod close_code {
    /// The upgrade request had no usable path.
    pub const BAD_REQUEST: u16 = 400;
    /// The request lacks the `datafolder` permission.
    pub const FORBIDDEN: u16 = 403;
    /// The data folder failed to load.
    pub const INTERNAL_ERROR: u16 = 1011;
    /// The data folder was reloaded before the socket was delivered.
    pub const SERVICE_RESTART: u16 = 1012;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Text(String),
    Binary(Bytes),
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Message::Text(text.to_string())
    }
}

/// Inbound traffic forwarded to an engine-owned socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Message(Message),
    Error(String),
    Close { code: u16, reason: String },
}

/// Outbound half of an accepted socket.
pub trait WebSocket: Send + Sync {
    fn send(&self, message: Message) -> Result<(), SocketError>;
    fn close(&self, code: u16);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SocketId(u64);

impl SocketId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for SocketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ws-{}", self.0)
    }
}

/// An accepted socket with a process-unique identity.
#[derive(Clone)]
pub struct SocketHandle {
    id: SocketId,
    socket: Arc<dyn WebSocket>,
}

impl SocketHandle {
    pub fn new(socket: Arc<dyn WebSocket>) -> Self {
        Self {
            id: SocketId::next(),
            socket,
        }
    }

    pub fn id(&self) -> SocketId {
        self.id
    }

    pub fn send(&self, message: Message) -> Result<(), SocketError> {
        self.socket.send(message)
    }

    pub fn close(&self, code: u16) {
        debug!(socket = %self.id, code, "closing socket");
        self.socket.close(code);
    }
}

impl std::fmt::Debug for SocketHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketHandle").field("id", &self.id).finish()
    }
}

/// A socket upgrade as presented by the transport.
pub struct SocketUpgrade {
    pub request: InboundRequest,
    pub allow: Permissions,
    pub socket: Arc<dyn WebSocket>,
}

/// The service's side of an accepted socket.
#[derive(Debug)]
pub enum Connection {
    Relay(RelayMember),
    Datafolder(FolderMember),
    Rejected,
}

impl Connection {
    /// The transport received `message` on this socket.
    pub fn message(&self, message: Message) {
        match self {
            Connection::Relay(member) => member.message(message),
            Connection::Datafolder(member) => member.message(message),
            Connection::Rejected => {}
        }
    }

    /// The transport reported an error on this socket.
    pub fn error(self, reason: &str) {
        match self {
            Connection::Relay(member) => member.error(reason),
            Connection::Datafolder(member) => member.error(reason),
            Connection::Rejected => {}
        }
    }

    /// The socket closed.
    pub fn closed(self, code: u16, reason: &str) {
        match self {
            Connection::Relay(member) => member.closed(code, reason),
            Connection::Datafolder(member) => member.closed(code, reason),
            Connection::Rejected => {}
        }
    }
}

/// A data folder scoped socket, before or after delivery to its engine.
///
/// Traffic is queued on a channel the engine takes from `ClientConnect`, so
/// nothing the client sends while the folder loads is lost.
#[derive(Debug)]
pub struct FolderMember {
    mount: String,
    id: SocketId,
    incoming: mpsc::UnboundedSender<SocketEvent>,
    awaiting: Arc<AwaitingSockets>,
}

impl FolderMember {
    pub(crate) fn new(
        mount: String,
        id: SocketId,
        incoming: mpsc::UnboundedSender<SocketEvent>,
        awaiting: Arc<AwaitingSockets>,
    ) -> Self {
        Self {
            mount,
            id,
            incoming,
            awaiting,
        }
    }

    pub fn mount(&self) -> &str {
        &self.mount
    }

    /// Queue `event` for the engine. Returns false once nobody reads it.
    fn forward(&self, event: SocketEvent) -> bool {
        match self.incoming.send(event) {
            Ok(()) => true,
            Err(mpsc::error::SendError(event)) => {
                trace!(
                    mount = %self.mount,
                    socket = %self.id,
                    ?event,
                    "engine stopped reading socket"
                );
                false
            }
        }
    }

    fn message(&self, message: Message) {
        self.forward(SocketEvent::Message(message));
    }

    fn error(self, reason: &str) {
        debug!(mount = %self.mount, socket = %self.id, reason, "datafolder socket error");
        if let Some(waiting) = self.awaiting.remove(&self.mount, self.id) {
            waiting.connect.socket.close(close_code::INTERNAL_ERROR);
        }
        self.forward(SocketEvent::Error(reason.to_string()));
    }

    fn closed(self, code: u16, reason: &str) {
        debug!(mount = %self.mount, socket = %self.id, code, reason, "datafolder socket closed");
        self.awaiting.remove(&self.mount, self.id);
        self.forward(SocketEvent::Close {
            code,
            reason: reason.to_string(),
        });
    }
}
