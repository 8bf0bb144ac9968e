//! Event emitter scoped to one data folder record.
//!
//! Three signals:
//! - client-connect: a data folder socket is handed to whoever listens
//! - preload-flush: fired once, when the folder's load finished either way
//! - reload: fired on the outgoing record right before a reload replaces it
//!
//! Listeners run outside the emitter's lock, so they may register further
//! listeners or emit again.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::lock;
use crate::request::FolderRequest;
use crate::socket::{SocketEvent, SocketHandle};

/// A data folder socket being handed to its engine.
#[derive(Debug)]
pub struct ClientConnect {
    pub socket: SocketHandle,
    pub request: FolderRequest,

    /// Path after the mount, e.g. `/` or `/ws`.
    pub subpath: String,

    incoming: Mutex<Option<mpsc::UnboundedReceiver<SocketEvent>>>,
}

impl ClientConnect {
    /// Build the event, returning the sender the transport pushes traffic into.
    pub fn new(
        socket: SocketHandle,
        request: FolderRequest,
    ) -> (Self, mpsc::UnboundedSender<SocketEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let subpath = request.subpath().to_string();
        (
            Self {
                socket,
                request,
                subpath,
                incoming: Mutex::new(Some(rx)),
            },
            tx,
        )
    }

    /// Take the stream of inbound traffic. Only the first caller gets it.
    pub fn take_incoming(&self) -> Option<mpsc::UnboundedReceiver<SocketEvent>> {
        lock(&self.incoming).take()
    }
}

type ConnectListener = Arc<dyn Fn(&ClientConnect) + Send + Sync>;
type ReloadListener = Arc<dyn Fn() + Send + Sync>;
type PreloadListener = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct Listeners {
    connect: Vec<ConnectListener>,
    preload: Vec<PreloadListener>,
    reload: Vec<ReloadListener>,
}

#[derive(Default)]
pub struct FolderEvents {
    listeners: Mutex<Listeners>,
}

impl FolderEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_client_connect(&self, listener: impl Fn(&ClientConnect) + Send + Sync + 'static) {
        lock(&self.listeners).connect.push(Arc::new(listener));
    }

    pub fn once_preload(&self, listener: impl FnOnce() + Send + 'static) {
        lock(&self.listeners).preload.push(Box::new(listener));
    }

    pub fn on_reload(&self, listener: impl Fn() + Send + Sync + 'static) {
        lock(&self.listeners).reload.push(Arc::new(listener));
    }

    /// Returns the number of listeners that saw the event.
    pub fn emit_client_connect(&self, event: &ClientConnect) -> usize {
        let listeners = lock(&self.listeners).connect.clone();
        for listener in &listeners {
            listener(event);
        }
        listeners.len()
    }

    /// Run and drop every preload listener.
    pub(crate) fn emit_preload(&self) {
        let listeners = std::mem::take(&mut lock(&self.listeners).preload);
        for listener in listeners {
            listener();
        }
    }

    /// Run the reload listeners, then detach everything from this emitter.
    pub(crate) fn emit_reload(&self) {
        let listeners = std::mem::take(&mut *lock(&self.listeners));
        for listener in &listeners.reload {
            listener();
        }
    }

    pub fn listener_count(&self) -> usize {
        let listeners = lock(&self.listeners);
        listeners.connect.len() + listeners.preload.len() + listeners.reload.len()
    }
}

impl std::fmt::Debug for FolderEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let listeners = lock(&self.listeners);
        f.debug_struct("FolderEvents")
            .field("connect", &listeners.connect.len())
            .field("preload", &listeners.preload.len())
            .field("reload", &listeners.reload.len())
            .finish()
    }
}
