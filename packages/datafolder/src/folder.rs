//! The per-mount data folder record and its handlers.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use http::StatusCode;
use tracing::debug;

use crate::bridge::CapabilityBridge;
use crate::context::RequestContext;
use crate::engine::WikiServer;
use crate::error::LoadError;
use crate::events::FolderEvents;

/// Observable lifecycle state of a data folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderState {
    Loading,
    Ready,
    Failed,
}

/// Delegates requests to a booted engine through the capability bridge.
pub(crate) struct ReadyHandler {
    mount: String,
    server: Arc<dyn WikiServer>,
    bridge: Arc<CapabilityBridge>,
}

impl ReadyHandler {
    pub fn new(mount: &str, server: Arc<dyn WikiServer>, bridge: Arc<CapabilityBridge>) -> Self {
        Self {
            mount: mount.to_string(),
            server,
            bridge,
        }
    }

    fn handle(&self, ctx: RequestContext) {
        let (request, response) = self.bridge.delegate(ctx, &self.mount);
        let token = request.token();
        self.server.request_handler(request, response);
        if self.bridge.discard(&token) {
            debug!(mount = %self.mount, "engine served a request without authenticating it");
        }
    }
}

/// Terminal handler of a folder whose load failed.
pub(crate) struct LoadFailure {
    error: String,
    body: String,
}

impl LoadFailure {
    pub fn new(error: &LoadError, reload_param: &str) -> Self {
        Self {
            error: error.to_string(),
            body: failure_message(reload_param),
        }
    }

    pub fn error(&self) -> &str {
        &self.error
    }

    fn respond(&self, ctx: &RequestContext) {
        ctx.respond(StatusCode::INTERNAL_SERVER_ERROR, self.body.clone());
    }
}

/// Body of every response from a failed data folder.
pub fn failure_message(reload_param: &str) -> String {
    format!(
        "The data folder failed to load. The error has been logged to the terminal. \
         To try again, use ?{}=true after making any necessary corrections.",
        reload_param
    )
}

pub(crate) enum Lifecycle {
    /// Requests are buffered in `DataFolder::pending`.
    Loading,
    Ready(Arc<ReadyHandler>),
    Failed(Arc<LoadFailure>),
}

/// A handler that answers requests, available once loading ended.
#[derive(Clone)]
pub(crate) enum Handler {
    Ready(Arc<ReadyHandler>),
    Failed(Arc<LoadFailure>),
}

impl Handler {
    pub fn serve(&self, ctx: RequestContext) {
        match self {
            Handler::Ready(ready) => ready.handle(ctx),
            Handler::Failed(failure) => {
                debug!(
                    path = ctx.request.path(),
                    error = failure.error(),
                    "answering from a failed data folder"
                );
                failure.respond(&ctx)
            }
        }
    }
}

impl Lifecycle {
    pub fn state(&self) -> FolderState {
        match self {
            Lifecycle::Loading => FolderState::Loading,
            Lifecycle::Ready(_) => FolderState::Ready,
            Lifecycle::Failed(_) => FolderState::Failed,
        }
    }

    pub fn handler(&self) -> Option<Handler> {
        match self {
            Lifecycle::Loading => None,
            Lifecycle::Ready(ready) => Some(Handler::Ready(Arc::clone(ready))),
            Lifecycle::Failed(failure) => Some(Handler::Failed(Arc::clone(failure))),
        }
    }
}

impl From<Handler> for Lifecycle {
    fn from(handler: Handler) -> Self {
        match handler {
            Handler::Ready(ready) => Lifecycle::Ready(ready),
            Handler::Failed(failure) => Lifecycle::Failed(failure),
        }
    }
}

/// Registry entry for one mount.
pub(crate) struct DataFolder {
    pub folder: PathBuf,
    pub generation: u64,
    pub lifecycle: Lifecycle,
    pub pending: VecDeque<RequestContext>,

    /// Set while the queue taken at the handler swap is being replayed.
    pub flushing: bool,

    pub events: Arc<FolderEvents>,
}

impl DataFolder {
    pub fn loading(folder: PathBuf, generation: u64) -> Self {
        Self {
            folder,
            generation,
            lifecycle: Lifecycle::Loading,
            pending: VecDeque::new(),
            flushing: false,
            events: Arc::new(FolderEvents::new()),
        }
    }

    /// Whether an arriving request must queue behind earlier ones.
    pub fn buffers(&self) -> bool {
        self.flushing || matches!(self.lifecycle, Lifecycle::Loading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{InboundRequest, ResponseSink};

    #[test]
    fn failure_message_names_reload_param() {
        let message = failure_message("reload");
        assert!(message.contains("?reload=true"));
        assert!(failure_message("refresh").contains("?refresh=true"));
    }

    #[test]
    fn failed_handler_answers_500() {
        let failure = Arc::new(LoadFailure::new(
            &LoadError::UnsupportedType("x".to_string()),
            "reload",
        ));
        assert!(failure.error().contains("unsupported"));

        let (sink, mut rx) = ResponseSink::channel();
        let ctx = RequestContext::new(InboundRequest::get("/w/").unwrap(), sink);
        Handler::Failed(failure).serve(ctx);

        let response = rx.try_recv().unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.body().as_ref(), failure_message("reload").as_bytes());
    }

    #[test]
    fn loading_record_buffers() {
        let mut folder = DataFolder::loading(PathBuf::from("/srv/w"), 1);
        assert_eq!(folder.lifecycle.state(), FolderState::Loading);
        assert!(folder.buffers());
        assert!(folder.lifecycle.handler().is_none());

        let failure = Arc::new(LoadFailure::new(
            &LoadError::Aborted("test".to_string()),
            "reload",
        ));
        folder.lifecycle = Lifecycle::Failed(failure);
        assert!(!folder.buffers());

        folder.flushing = true;
        assert!(folder.buffers());
        assert_eq!(folder.lifecycle.state(), FolderState::Failed);
    }
}
