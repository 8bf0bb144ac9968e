//! Boots one data folder.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::bridge::CapabilityBridge;
use crate::engine::{BootSpec, WikiEngine};
use crate::error::LoadError;
use crate::events::FolderEvents;
use crate::folder::ReadyHandler;
use crate::manifest::WikiInfo;

/// Inputs of one load, captured when the folder was triggered.
pub(crate) struct LoadJob {
    pub mount: String,
    pub folder: PathBuf,
    pub target: String,
    pub variables: BTreeMap<String, String>,
    pub events: Arc<FolderEvents>,
}

/// Read the manifest, boot the engine, and wire the bridge into the server.
pub(crate) async fn load(
    engine: Arc<dyn WikiEngine>,
    job: LoadJob,
) -> Result<Arc<ReadyHandler>, LoadError> {
    let started = Instant::now();

    let manifest = WikiInfo::read(&job.folder).await?;
    manifest.require_wiki()?;
    debug!(mount = %job.mount, folder = %job.folder.display(), "manifest read, booting");

    let spec = BootSpec::new(
        &job.mount,
        job.folder.clone(),
        &job.target,
        manifest,
        &job.variables,
    );
    let server = engine.boot(spec).await?;
    info!(
        mount = %job.mount,
        folder = %job.folder.display(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "data folder booted"
    );

    let bridge = Arc::new(CapabilityBridge::new());
    server.add_authenticator(Arc::new(bridge.authenticator()));
    server.attach_events(job.events);

    Ok(Arc::new(ReadyHandler::new(&job.mount, server, bridge)))
}
