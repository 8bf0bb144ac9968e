//! WikiMount: serve wiki data folders under URL mounts.
//!
//! Re-exports the two layers:
//! - `path`: mount computation and path canonicalization
//! - `datafolder`: the service that boots folders and routes requests and
//!   sockets to them

pub use wikimount_datafolder as datafolder;
pub use wikimount_path as path;

pub use wikimount_datafolder::{
    socket, DataFolderService, FolderState, InboundRequest, LoadError, RequestContext,
    ResponseSink, ServiceConfig, TreeTarget, WikiEngine, WikiServer,
};
pub use wikimount_path::{ItemType, MountPoint, PathOptions, ResolvedPath, StatPath};
