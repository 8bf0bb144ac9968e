//! The seam to the embedded wiki engine.
//!
//! The engine is third-party code. It is booted once per data folder and then
//! serves requests through `WikiServer::request_handler`. It never sees a
//! `RequestContext`; it gets a `DelegatedRequest` and, during its
//! authentication phase, asks the authenticators registered on it.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::bridge::DelegatedRequest;
use crate::context::ResponseSink;
use crate::error::BootError;
use crate::events::FolderEvents;
use crate::manifest::WikiInfo;

/// Title of the tiddler telling the wiki where it is hosted.
pub const HOST_TIDDLER_TITLE: &str = "$:/config/tiddlyweb/host";

/// Everything an engine needs to boot one data folder.
#[derive(Debug, Clone)]
pub struct BootSpec {
    pub mount: String,
    pub folder: PathBuf,

    /// Engine target from the service configuration.
    pub target: String,

    pub manifest: WikiInfo,

    /// Server variables: `path-prefix`, `root-tiddler`, `gzip`, then any
    /// configured overrides.
    pub variables: BTreeMap<String, String>,

    /// Text of the `HOST_TIDDLER_TITLE` tiddler to preload before boot.
    pub host_tiddler: String,
}

impl BootSpec {
    pub fn new(
        mount: &str,
        folder: PathBuf,
        target: &str,
        manifest: WikiInfo,
        overrides: &BTreeMap<String, String>,
    ) -> Self {
        let mut variables = BTreeMap::from([
            ("path-prefix".to_string(), mount.to_string()),
            ("root-tiddler".to_string(), "$:/core/save/all".to_string()),
            ("gzip".to_string(), "yes".to_string()),
        ]);
        variables.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));

        Self {
            mount: mount.to_string(),
            folder,
            target: target.to_string(),
            manifest,
            variables,
            host_tiddler: format!("$protocol$//$host${}/", mount),
        }
    }
}

/// Per-request authentication state owned by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthState {
    /// Whether the wiki lets unauthenticated users in.
    pub allow_anon: bool,

    /// Set by an authenticator that accepted the request.
    pub authenticated_username: Option<String>,
}

/// An authentication hook registered on a booted server.
pub trait Authenticator: Send + Sync {
    /// Returns true if the request may proceed.
    ///
    /// Returning false means the authenticator has already answered the
    /// request through `response`.
    fn authenticate_request(
        &self,
        request: &DelegatedRequest,
        response: &ResponseSink,
        state: &mut AuthState,
    ) -> bool;
}

/// A booted wiki server.
pub trait WikiServer: Send + Sync {
    /// Register `authenticator` ahead of every authenticator already present.
    fn add_authenticator(&self, authenticator: Arc<dyn Authenticator>);

    /// Serve one request.
    ///
    /// Authenticators are consulted before this returns; the capability
    /// behind `request` is discarded afterwards.
    fn request_handler(&self, request: DelegatedRequest, response: ResponseSink);

    /// Called once after boot with the folder's event emitter, so the server
    /// can accept sockets and react to reloads.
    fn attach_events(&self, _events: Arc<FolderEvents>) {}
}

/// Boots data folders.
#[async_trait]
pub trait WikiEngine: Send + Sync {
    async fn boot(&self, spec: BootSpec) -> Result<Arc<dyn WikiServer>, BootError>;
}
