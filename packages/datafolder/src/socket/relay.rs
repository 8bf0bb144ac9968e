//! Broadcast relay for sockets that share a path.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, trace, warn};

use crate::lock;
use crate::socket::{close_code, Message, SocketHandle, SocketId};

/// Path to the sockets currently joined on it.
#[derive(Debug, Default)]
pub struct BroadcastRelay {
    by_path: Mutex<HashMap<String, Vec<SocketHandle>>>,
}

impl BroadcastRelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(self: &Arc<Self>, path: &str, socket: SocketHandle) -> RelayMember {
        debug!(path, socket = %socket.id(), "relay socket joined");
        lock(&self.by_path)
            .entry(path.to_string())
            .or_default()
            .push(socket.clone());
        RelayMember {
            path: path.to_string(),
            socket,
            relay: Arc::clone(self),
        }
    }

    /// Remove a socket from `path`. Returns false if it was not there.
    pub fn leave(&self, path: &str, id: SocketId) -> bool {
        let mut by_path = lock(&self.by_path);
        let Some(sockets) = by_path.get_mut(path) else {
            return false;
        };
        let before = sockets.len();
        sockets.retain(|socket| socket.id() != id);
        let removed = sockets.len() != before;
        if sockets.is_empty() {
            by_path.remove(path);
        }
        removed
    }

    pub fn len(&self, path: &str) -> usize {
        lock(&self.by_path).get(path).map_or(0, Vec::len)
    }

    fn peers(&self, path: &str, sender: SocketId) -> Vec<SocketHandle> {
        lock(&self.by_path)
            .get(path)
            .map(|sockets| {
                sockets
                    .iter()
                    .filter(|socket| socket.id() != sender)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// One socket's membership of a relay path.
#[derive(Debug)]
pub struct RelayMember {
    path: String,
    socket: SocketHandle,
    relay: Arc<BroadcastRelay>,
}

impl RelayMember {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn id(&self) -> SocketId {
        self.socket.id()
    }

    /// Forward `message` to every other socket on the path.
    pub fn message(&self, message: Message) {
        trace!(path = %self.path, socket = %self.socket.id(), ?message, "relay message");
        for peer in self.relay.peers(&self.path, self.socket.id()) {
            if let Err(e) = peer.send(message.clone()) {
                warn!(path = %self.path, socket = %peer.id(), error = %e, "relay send failed");
            }
        }
    }

    /// Transport error: evict and close.
    pub fn error(self, reason: &str) {
        warn!(path = %self.path, socket = %self.socket.id(), reason, "relay socket error");
        self.relay.leave(&self.path, self.socket.id());
        self.socket.close(close_code::INTERNAL_ERROR);
    }

    pub fn closed(self, code: u16, reason: &str) {
        debug!(path = %self.path, socket = %self.socket.id(), code, reason, "relay socket closed");
        self.relay.leave(&self.path, self.socket.id());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::testing::RecordingSocket;
    use crate::socket::WebSocket;

    fn member(
        relay: &Arc<BroadcastRelay>,
        path: &str,
    ) -> (RelayMember, Arc<RecordingSocket>) {
        let socket = Arc::new(RecordingSocket::default());
        let member = relay.join(path, SocketHandle::new(socket.clone()));
        (member, socket)
    }

    #[test]
    fn message_reaches_peers_but_not_sender() {
        let relay = Arc::new(BroadcastRelay::new());
        let (a, sa) = member(&relay, "/chat/room1");
        let (_b, sb) = member(&relay, "/chat/room1");
        let (_c, sc) = member(&relay, "/chat/room2");

        a.message(Message::from("hello"));

        assert!(sa.sent().is_empty());
        assert_eq!(sb.sent(), vec![Message::from("hello")]);
        assert!(sc.sent().is_empty());
    }

    #[test]
    fn closed_member_is_evicted() {
        let relay = Arc::new(BroadcastRelay::new());
        let (a, sa) = member(&relay, "/chat/room1");
        let (_b, sb) = member(&relay, "/chat/room1");
        let a_id = a.id();

        a.closed(1000, "bye");
        assert_eq!(relay.len("/chat/room1"), 1);
        assert!(!relay.leave("/chat/room1", a_id));

        let (c, _sc) = member(&relay, "/chat/room1");
        c.message(Message::from("later"));
        assert!(sa.sent().is_empty());
        assert_eq!(sb.sent(), vec![Message::from("later")]);
    }

    #[test]
    fn error_evicts_and_closes() {
        let relay = Arc::new(BroadcastRelay::new());
        let (a, sa) = member(&relay, "/p");
        let (b, _sb) = member(&relay, "/p");

        a.error("connection reset");
        assert_eq!(sa.closed_with(), Some(1011));
        assert_eq!(relay.len("/p"), 1);

        b.message(Message::from("x"));
        assert!(sa.sent().is_empty());
    }

    #[test]
    fn failing_peer_does_not_stop_the_fan_out() {
        let relay = Arc::new(BroadcastRelay::new());
        let (a, _sa) = member(&relay, "/p");
        let (_b, sb) = member(&relay, "/p");
        let (_c, sc) = member(&relay, "/p");
        sb.close(1006);

        a.message(Message::from("still"));
        assert_eq!(sc.sent(), vec![Message::from("still")]);
    }

    #[test]
    fn empty_paths_are_dropped() {
        let relay = Arc::new(BroadcastRelay::new());
        let (a, _sa) = member(&relay, "/p");
        a.closed(1000, "");
        assert_eq!(relay.len("/p"), 0);
        assert!(lock(&relay.by_path).is_empty());
    }
}
