//! Data folder sockets waiting for their folder to finish loading.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::events::ClientConnect;
use crate::lock;
use crate::socket::SocketId;

/// One socket parked until the folder generation it arrived for flushes.
#[derive(Debug)]
pub struct AwaitingSocket {
    pub generation: u64,
    pub connect: ClientConnect,
}

/// Mount to waiting sockets.
#[derive(Debug, Default)]
pub struct AwaitingSockets {
    by_mount: Mutex<HashMap<String, Vec<AwaitingSocket>>>,
}

impl AwaitingSockets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, mount: &str, socket: AwaitingSocket) {
        lock(&self.by_mount)
            .entry(mount.to_string())
            .or_default()
            .push(socket);
    }

    /// Remove one socket. Returns None if it was already removed.
    pub fn remove(&self, mount: &str, id: SocketId) -> Option<AwaitingSocket> {
        let mut by_mount = lock(&self.by_mount);
        let sockets = by_mount.get_mut(mount)?;
        let index = sockets
            .iter()
            .position(|waiting| waiting.connect.socket.id() == id)?;
        let removed = sockets.remove(index);
        if sockets.is_empty() {
            by_mount.remove(mount);
        }
        Some(removed)
    }

    /// Remove every socket waiting on `mount`, in arrival order.
    pub fn drain_mount(&self, mount: &str) -> Vec<AwaitingSocket> {
        lock(&self.by_mount).remove(mount).unwrap_or_default()
    }

    pub fn len(&self, mount: &str) -> usize {
        lock(&self.by_mount).get(mount).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use wikimount_path::MountPoint;

    use super::*;
    use crate::request::FolderRequest;
    use crate::socket::testing::RecordingSocket;
    use crate::socket::SocketHandle;

    fn waiting(generation: u64) -> AwaitingSocket {
        let request = FolderRequest {
            point: MountPoint {
                mount: "/w".to_string(),
                folder: PathBuf::from("/srv/w"),
            },
            pathname: "/w/ws".to_string(),
        };
        let handle = SocketHandle::new(Arc::new(RecordingSocket::default()));
        let (connect, _tx) = ClientConnect::new(handle, request);
        AwaitingSocket {
            generation,
            connect,
        }
    }

    #[test]
    fn removal_is_idempotent() {
        let table = AwaitingSockets::new();
        let socket = waiting(1);
        let id = socket.connect.socket.id();
        table.push("/w", socket);
        assert_eq!(table.len("/w"), 1);

        assert!(table.remove("/w", id).is_some());
        assert!(table.remove("/w", id).is_none());
        assert_eq!(table.len("/w"), 0);
    }

    #[test]
    fn drain_keeps_arrival_order() {
        let table = AwaitingSockets::new();
        let first = waiting(1);
        let second = waiting(1);
        let ids = [first.connect.socket.id(), second.connect.socket.id()];
        table.push("/w", first);
        table.push("/w", second);
        table.push("/other", waiting(2));

        let drained: Vec<_> = table
            .drain_mount("/w")
            .into_iter()
            .map(|w| w.connect.socket.id())
            .collect();
        assert_eq!(drained, ids);
        assert_eq!(table.len("/w"), 0);
        assert_eq!(table.len("/other"), 1);
    }
}
