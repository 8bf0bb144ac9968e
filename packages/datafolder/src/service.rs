//! The data folder service.
//!
//! `DataFolderService` owns the mount registry and both socket tables. It is
//! built once at startup and cloned into every request handling site; clones
//! share state.
//!
//! Lifecycle of a mount:
//!
//! ```text
//!   trigger ──► Loading ──load ok──► Ready
//!                  │
//!                  └────load err────► Failed
//!
//!   trigger(force_reload) from any state ──► fresh Loading record
//! ```
//!
//! All registry mutation is check-then-set inside one lock acquisition.
//! Engine code, socket code and event listeners always run with the lock
//! released.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use http::StatusCode;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};
use wikimount_path::{canonicalize, reload_requested, Canonical};

use crate::config::ServiceConfig;
use crate::context::RequestContext;
use crate::engine::WikiEngine;
use crate::error::LoadError;
use crate::events::{ClientConnect, FolderEvents};
use crate::folder::{DataFolder, FolderState, Handler, LoadFailure, ReadyHandler};
use crate::loader::{self, LoadJob};
use crate::lock;
use crate::request::{FolderRequest, TreeTarget};
use crate::socket::{
    close_code, AwaitingSocket, AwaitingSockets, BroadcastRelay, Connection, FolderMember,
    SocketHandle, SocketId, SocketUpgrade,
};

struct Inner {
    config: ServiceConfig,
    engine: Arc<dyn WikiEngine>,
    registry: Mutex<HashMap<String, DataFolder>>,
    generations: AtomicU64,
    awaiting: Arc<AwaitingSockets>,
    relay: Arc<BroadcastRelay>,
    runtime: Option<Handle>,
}

/// What to do with a data folder socket once the registry was consulted.
enum Delivery {
    Wait,
    Now(ClientConnect, Arc<FolderEvents>, u64),
    Refuse(ClientConnect, u16),
}

#[derive(Clone)]
pub struct DataFolderService {
    inner: Arc<Inner>,
}

impl DataFolderService {
    /// Build the service, running loads on the current Tokio runtime if there
    /// is one.
    pub fn new(config: ServiceConfig, engine: Arc<dyn WikiEngine>) -> Self {
        Self::build(config, engine, Handle::try_current().ok())
    }

    /// Build the service, running loads on `runtime`.
    pub fn with_runtime(
        config: ServiceConfig,
        engine: Arc<dyn WikiEngine>,
        runtime: Handle,
    ) -> Self {
        Self::build(config, engine, Some(runtime))
    }

    fn build(config: ServiceConfig, engine: Arc<dyn WikiEngine>, runtime: Option<Handle>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                engine,
                registry: Mutex::new(HashMap::new()),
                generations: AtomicU64::new(0),
                awaiting: Arc::new(AwaitingSockets::new()),
                relay: Arc::new(BroadcastRelay::new()),
                runtime,
            }),
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.inner.config
    }

    /// State of the record at `mount`, if the mount was ever triggered.
    pub fn state(&self, mount: &str) -> Option<FolderState> {
        lock(&self.inner.registry)
            .get(mount)
            .map(|folder| folder.lifecycle.state())
    }

    pub fn mounts(&self) -> Vec<String> {
        let mut mounts: Vec<_> = lock(&self.inner.registry).keys().cloned().collect();
        mounts.sort();
        mounts
    }

    /// Directory backing the record at `mount`.
    pub fn folder(&self, mount: &str) -> Option<PathBuf> {
        lock(&self.inner.registry)
            .get(mount)
            .map(|folder| folder.folder.clone())
    }

    /// Events of the record currently at `mount`.
    pub fn events(&self, mount: &str) -> Option<Arc<FolderEvents>> {
        lock(&self.inner.registry)
            .get(mount)
            .map(|folder| Arc::clone(&folder.events))
    }

    /// Requests buffered at `mount` and not yet handed to a handler.
    pub fn pending_len(&self, mount: &str) -> usize {
        lock(&self.inner.registry)
            .get(mount)
            .map_or(0, |folder| folder.pending.len())
    }

    /// Data folder sockets at `mount` waiting for the load to finish.
    pub fn awaiting_sockets(&self, mount: &str) -> usize {
        self.inner.awaiting.len(mount)
    }

    pub fn relay(&self) -> &Arc<BroadcastRelay> {
        &self.inner.relay
    }

    /// Make sure a record exists for the request's mount.
    ///
    /// Starts a load when the mount has no record, or always when
    /// `force_reload` is set. Returns true if a load was started.
    ///
    /// On reload the fresh record is in the registry before `reload` fires on
    /// the outgoing one, so nothing arriving meanwhile reaches a detached
    /// emitter.
    pub fn trigger(&self, request: &FolderRequest, force_reload: bool) -> bool {
        let mount = request.mount();
        let (generation, events, replaced, orphaned) = {
            let mut registry = lock(&self.inner.registry);
            if !force_reload && registry.contains_key(mount) {
                return false;
            }

            let generation = self.inner.generations.fetch_add(1, Ordering::Relaxed) + 1;
            let mut folder = DataFolder::loading(request.point.folder.clone(), generation);
            let (replaced, orphaned) = match registry.remove(mount) {
                Some(old) => {
                    folder.pending = old.pending;
                    (Some(old.events), self.inner.awaiting.drain_mount(mount))
                }
                None => (None, Vec::new()),
            };
            let events = Arc::clone(&folder.events);
            registry.insert(mount.to_string(), folder);
            (generation, events, replaced, orphaned)
        };

        if let Some(old) = replaced {
            info!(mount, generation, "reloading data folder");
            old.emit_reload();
        }
        for waiting in orphaned {
            waiting.connect.socket.close(close_code::SERVICE_RESTART);
        }
        self.start_load(mount, &request.point.folder, generation, events);
        true
    }

    /// Entry point for HTTP requests the resolver matched to a data folder.
    pub fn handle_request(&self, target: &TreeTarget, ctx: RequestContext) {
        let request = match FolderRequest::new(target, ctx.request.path()) {
            Ok(request) => request,
            Err(e) => {
                warn!(path = ctx.request.path(), error = %e, "cannot compute mount");
                ctx.respond(StatusCode::BAD_REQUEST, e.to_string());
                return;
            }
        };

        let reload = reload_requested(ctx.request.query(), &self.inner.config.reload_param);
        self.trigger(&request, reload);

        let options = self.inner.config.path_options(target.options);
        match canonicalize(
            &request.point,
            &target.resolved,
            &target.stat,
            &request.pathname,
            options,
            reload,
        ) {
            Canonical::Redirect(location) => {
                ctx.redirect(&location);
            }
            Canonical::Delegate => self.dispatch(request.mount(), ctx),
        }
    }

    /// Hand `ctx` to the current handler at `mount`, or queue it.
    pub fn dispatch(&self, mount: &str, ctx: RequestContext) {
        let handler = {
            let mut registry = lock(&self.inner.registry);
            let Some(folder) = registry.get_mut(mount) else {
                warn!(mount, "request for a mount that was never triggered");
                ctx.respond(StatusCode::NOT_FOUND, "Not found");
                return;
            };
            match folder.lifecycle.handler() {
                Some(handler) if !folder.buffers() => handler,
                _ => {
                    folder.pending.push_back(ctx);
                    return;
                }
            }
        };
        handler.serve(ctx);
    }

    /// Entry point for socket upgrades.
    pub fn handle_websocket(&self, target: &TreeTarget, upgrade: SocketUpgrade) -> Connection {
        let socket = SocketHandle::new(upgrade.socket);
        let pathname = upgrade.request.path();
        if pathname.is_empty() {
            socket.close(close_code::BAD_REQUEST);
            return Connection::Rejected;
        }

        if !target.stat.is_datafolder() {
            return Connection::Relay(self.inner.relay.join(pathname, socket));
        }

        if !upgrade.allow.datafolder {
            debug!(path = pathname, "datafolder socket without permission");
            socket.close(close_code::FORBIDDEN);
            return Connection::Rejected;
        }

        let request = match FolderRequest::new(target, pathname) {
            Ok(request) => request,
            Err(e) => {
                warn!(path = pathname, error = %e, "cannot compute mount");
                socket.close(close_code::BAD_REQUEST);
                return Connection::Rejected;
            }
        };
        self.trigger(&request, false);

        let mount = request.mount().to_string();
        let id = socket.id();
        let (connect, incoming) = ClientConnect::new(socket, request);
        let member = FolderMember::new(
            mount.clone(),
            id,
            incoming,
            Arc::clone(&self.inner.awaiting),
        );

        let delivery = {
            let registry = lock(&self.inner.registry);
            match registry.get(&mount) {
                Some(folder) => match folder.lifecycle.state() {
                    FolderState::Loading => {
                        self.inner.awaiting.push(
                            &mount,
                            AwaitingSocket {
                                generation: folder.generation,
                                connect,
                            },
                        );
                        let service = Arc::downgrade(&self.inner);
                        let waiting_on = mount.clone();
                        folder.events.once_preload(move || {
                            if let Some(inner) = service.upgrade() {
                                DataFolderService { inner }.deliver_awaiting(&waiting_on, id);
                            }
                        });
                        Delivery::Wait
                    }
                    FolderState::Ready => {
                        Delivery::Now(connect, Arc::clone(&folder.events), folder.generation)
                    }
                    FolderState::Failed => Delivery::Refuse(connect, close_code::INTERNAL_ERROR),
                },
                None => Delivery::Refuse(connect, close_code::INTERNAL_ERROR),
            }
        };

        if let Delivery::Wait = delivery {
            debug!(%mount, socket = %id, "socket waiting for data folder");
        }
        self.deliver(&mount, delivery);
        Connection::Datafolder(member)
    }

    fn deliver(&self, mount: &str, delivery: Delivery) {
        match delivery {
            Delivery::Wait => {}
            Delivery::Now(connect, events, generation) => {
                debug!(mount, socket = %connect.socket.id(), "ws-client-connect");
                if events.emit_client_connect(&connect) > 0 {
                    return;
                }
                // No listener owns the socket.
                let current = lock(&self.inner.registry)
                    .get(mount)
                    .is_some_and(|folder| folder.generation == generation);
                let code = if current {
                    close_code::INTERNAL_ERROR
                } else {
                    close_code::SERVICE_RESTART
                };
                debug!(
                    mount,
                    socket = %connect.socket.id(),
                    code,
                    "no listener took the socket"
                );
                connect.socket.close(code);
            }
            Delivery::Refuse(connect, code) => connect.socket.close(code),
        }
    }

    fn deliver_awaiting(&self, mount: &str, id: SocketId) {
        let delivery = {
            let registry = lock(&self.inner.registry);
            let Some(waiting) = self.inner.awaiting.remove(mount, id) else {
                return;
            };
            match registry
                .get(mount)
                .filter(|folder| folder.generation == waiting.generation)
            {
                Some(folder) => match folder.lifecycle.state() {
                    FolderState::Ready => {
                        let events = Arc::clone(&folder.events);
                        Delivery::Now(waiting.connect, events, folder.generation)
                    }
                    FolderState::Failed => {
                        Delivery::Refuse(waiting.connect, close_code::INTERNAL_ERROR)
                    }
                    FolderState::Loading => {
                        Delivery::Refuse(waiting.connect, close_code::SERVICE_RESTART)
                    }
                },
                None => Delivery::Refuse(waiting.connect, close_code::SERVICE_RESTART),
            }
        };
        self.deliver(mount, delivery);
    }

    fn start_load(&self, mount: &str, folder: &Path, generation: u64, events: Arc<FolderEvents>) {
        let job = LoadJob {
            mount: mount.to_string(),
            folder: folder.to_path_buf(),
            target: self.inner.config.target.clone(),
            variables: self.inner.config.variables.clone(),
            events,
        };
        let engine = Arc::clone(&self.inner.engine);
        let service = self.clone();
        let mount = mount.to_string();
        let runtime = match self.inner.runtime.clone().or_else(|| Handle::try_current().ok()) {
            Some(runtime) => runtime,
            None => {
                let error = LoadError::Aborted("no Tokio runtime to run the load".to_string());
                self.complete(&mount, generation, Err(error));
                return;
            }
        };
        debug!(%mount, generation, "starting data folder load");

        runtime.spawn(async move {
            let outcome = match tokio::spawn(loader::load(engine, job)).await {
                Ok(outcome) => outcome,
                Err(e) => Err(LoadError::Aborted(e.to_string())),
            };
            service.complete(&mount, generation, outcome);
        });
    }

    /// Swap in the handler a load produced, then replay the queue through it.
    fn complete(
        &self,
        mount: &str,
        generation: u64,
        outcome: Result<Arc<ReadyHandler>, LoadError>,
    ) {
        let handler = match outcome {
            Ok(ready) => Handler::Ready(ready),
            Err(e) => {
                error!(mount, generation, error = %e, "data folder failed to load");
                Handler::Failed(Arc::new(LoadFailure::new(
                    &e,
                    &self.inner.config.reload_param,
                )))
            }
        };

        let (events, backlog) = {
            let mut registry = lock(&self.inner.registry);
            let Some(folder) = registry
                .get_mut(mount)
                .filter(|folder| folder.generation == generation)
            else {
                debug!(mount, generation, "load superseded by a reload");
                return;
            };
            folder.lifecycle = handler.clone().into();
            folder.flushing = true;
            (
                Arc::clone(&folder.events),
                std::mem::take(&mut folder.pending),
            )
        };

        events.emit_preload();
        self.replay(mount, generation, &handler, backlog);
    }

    /// Serve `backlog` in order, then anything queued behind it meanwhile.
    fn replay(
        &self,
        mount: &str,
        generation: u64,
        handler: &Handler,
        mut backlog: VecDeque<RequestContext>,
    ) {
        loop {
            if !backlog.is_empty() {
                debug!(mount, count = backlog.len(), "replaying buffered requests");
            }
            for ctx in backlog.drain(..) {
                handler.serve(ctx);
            }

            let mut registry = lock(&self.inner.registry);
            let Some(folder) = registry
                .get_mut(mount)
                .filter(|folder| folder.generation == generation)
            else {
                return;
            };
            if folder.pending.is_empty() {
                folder.flushing = false;
                return;
            }
            backlog = std::mem::take(&mut folder.pending);
        }
    }
}

impl std::fmt::Debug for DataFolderService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataFolderService")
            .field("mounts", &self.mounts())
            .finish()
    }
}
