//! Lazily booted wiki data folders.
//!
//! A data folder is a directory holding a `tiddlywiki.info` manifest. It is
//! served under a URL mount and booted the first time anything asks for it:
//! - `DataFolderService`: mount registry, request buffering, reload
//! - `CapabilityBridge`: lets the engine authenticate a request through the
//!   outer server's identity without ever holding the outer request
//! - `socket`: WebSocket routing, either to a booted folder or to a plain
//!   broadcast relay
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use wikimount_datafolder::{
//!     DataFolderService, InboundRequest, RequestContext, ResponseSink, ServiceConfig, TreeTarget,
//!     WikiEngine,
//! };
//! use wikimount_path::{ItemType, ResolvedPath, StatPath};
//!
//! async fn serve(engine: Arc<dyn WikiEngine>) {
//!     let service = DataFolderService::new(ServiceConfig::default(), engine);
//!     let target = TreeTarget::new(
//!         ResolvedPath::new(["wiki"], ["foo"]),
//!         StatPath::new("/srv/wikis/foo", 1, ItemType::Datafolder),
//!     );
//!
//!     let (sink, response) = ResponseSink::channel();
//!     let request = InboundRequest::get("/wiki/foo/").unwrap();
//!     service.handle_request(&target, RequestContext::new(request, sink));
//!     let _ = response.await;
//! }
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};

mod bridge;
mod config;
mod context;
mod engine;
mod error;
mod events;
mod folder;
mod loader;
mod manifest;
mod request;
mod service;
pub mod socket;

pub use bridge::{BridgeAuthenticator, CapabilityBridge, CapabilityToken, DelegatedRequest};
pub use config::ServiceConfig;
pub use context::{
    Credentials, HttpResponse, InboundRequest, Permissions, RequestContext, ResponseSink,
};
pub use engine::{
    AuthState, Authenticator, BootSpec, WikiEngine, WikiServer, HOST_TIDDLER_TITLE,
};
pub use error::{BootError, ConfigError, LoadError, SocketError};
pub use events::{ClientConnect, FolderEvents};
pub use folder::{failure_message, FolderState};
pub use manifest::{WikiInfo, MANIFEST_FILE, WIKI_TYPE};
pub use request::{FolderRequest, TreeTarget};
pub use service::DataFolderService;

/// Lock `mutex`, carrying on with the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
