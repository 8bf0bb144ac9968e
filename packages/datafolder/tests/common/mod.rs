#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use http::StatusCode;
use tempfile::TempDir;
use tokio::sync::{mpsc, oneshot, Semaphore};

use wikimount_datafolder::socket::{Message, SocketEvent, WebSocket};
use wikimount_datafolder::{
    AuthState, Authenticator, BootError, BootSpec, ClientConnect, DelegatedRequest, FolderEvents,
    HttpResponse, InboundRequest, RequestContext, ResponseSink, SocketError, TreeTarget,
    WikiEngine, WikiServer, MANIFEST_FILE,
};
use wikimount_path::{ItemType, ResolvedPath, StatPath};

pub const WIKI_MANIFEST: &str = r#"{"plugins": ["tiddlywiki/tiddlyweb"], "themes": []}"#;

/// A data folder on disk with the given manifest.
pub fn wiki_folder(manifest: &str) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(MANIFEST_FILE), manifest).unwrap();
    dir
}

/// Resolver output for `pathname` below a data folder mounted at `/wiki/<name>`.
pub fn target(folder: &Path, pathname: &str) -> TreeTarget {
    let file: Vec<String> = pathname
        .trim_start_matches("/wiki/")
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(String::from)
        .collect();
    TreeTarget::new(
        ResolvedPath::new(["wiki"], file),
        StatPath::new(folder, 1, ItemType::Datafolder),
    )
}

pub fn request(uri: &str) -> (RequestContext, oneshot::Receiver<HttpResponse>) {
    let (sink, rx) = ResponseSink::channel();
    (RequestContext::new(InboundRequest::get(uri).unwrap(), sink), rx)
}

pub async fn response(rx: oneshot::Receiver<HttpResponse>) -> HttpResponse {
    tokio::time::timeout(Duration::from_secs(5), rx)
        .await
        .expect("timed out waiting for a response")
        .expect("request dropped without a response")
}

pub fn body(response: &HttpResponse) -> String {
    String::from_utf8(response.body().to_vec()).unwrap()
}

pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

/// Test code run from inside the service's call into the engine.
pub type Hook = Box<dyn FnOnce() + Send>;

/// Engine whose boots block until permits are released.
pub struct FakeEngine {
    gate: Semaphore,
    pub boots: AtomicUsize,
    pub allow_anon: bool,
    listens: bool,
    pub specs: Mutex<Vec<BootSpec>>,
    pub servers: Mutex<Vec<Arc<FakeServer>>>,
    fail_with: Mutex<Option<String>>,
    request_hook: Mutex<Option<Hook>>,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Self::build(true, true)
    }

    pub fn private() -> Arc<Self> {
        Self::build(false, true)
    }

    /// Servers that never subscribe to folder events.
    pub fn without_listeners() -> Arc<Self> {
        Self::build(true, false)
    }

    fn build(allow_anon: bool, listens: bool) -> Arc<Self> {
        Arc::new(Self {
            gate: Semaphore::new(0),
            boots: AtomicUsize::new(0),
            allow_anon,
            listens,
            specs: Mutex::new(Vec::new()),
            servers: Mutex::new(Vec::new()),
            fail_with: Mutex::new(None),
            request_hook: Mutex::new(None),
        })
    }

    /// Let `n` pending or future boots finish.
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    pub fn fail_next(&self, message: &str) {
        *self.fail_with.lock().unwrap() = Some(message.to_string());
    }

    /// Run `hook` while the next booted server handles its first request.
    pub fn on_first_request(&self, hook: impl FnOnce() + Send + 'static) {
        *self.request_hook.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn boots(&self) -> usize {
        self.boots.load(Ordering::SeqCst)
    }

    pub fn server(&self, index: usize) -> Arc<FakeServer> {
        Arc::clone(&self.servers.lock().unwrap()[index])
    }
}

#[async_trait]
impl WikiEngine for FakeEngine {
    async fn boot(&self, spec: BootSpec) -> Result<Arc<dyn WikiServer>, BootError> {
        self.boots.fetch_add(1, Ordering::SeqCst);
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| BootError::new(e.to_string()))?;
        permit.forget();

        if let Some(message) = self.fail_with.lock().unwrap().take() {
            return Err(BootError::new(message));
        }

        let server = Arc::new(FakeServer::new(&spec.mount, self.allow_anon, self.listens));
        *server.log.request_hook.lock().unwrap() = self.request_hook.lock().unwrap().take();
        self.specs.lock().unwrap().push(spec);
        self.servers.lock().unwrap().push(Arc::clone(&server));
        Ok(server)
    }
}

/// What a `FakeServer` observed, shared with the listeners it registers.
#[derive(Default)]
pub struct ServerLog {
    pub handled: Mutex<Vec<String>>,
    pub connects: Mutex<Vec<String>>,
    pub incoming: Mutex<Vec<mpsc::UnboundedReceiver<SocketEvent>>>,
    pub reloads: AtomicUsize,
    request_hook: Mutex<Option<Hook>>,
    reload_hook: Mutex<Option<Hook>>,
}

fn run(hook: &Mutex<Option<Hook>>) {
    let hook = hook.lock().unwrap().take();
    if let Some(hook) = hook {
        hook();
    }
}

/// Server that answers `200 <path> <username>` after authentication.
pub struct FakeServer {
    pub mount: String,
    allow_anon: bool,
    listens: bool,
    authenticators: Mutex<Vec<Arc<dyn Authenticator>>>,
    pub log: Arc<ServerLog>,
}

impl FakeServer {
    fn new(mount: &str, allow_anon: bool, listens: bool) -> Self {
        Self {
            mount: mount.to_string(),
            allow_anon,
            listens,
            authenticators: Mutex::new(Vec::new()),
            log: Arc::new(ServerLog::default()),
        }
    }

    pub fn handled(&self) -> Vec<String> {
        self.log.handled.lock().unwrap().clone()
    }

    pub fn connects(&self) -> Vec<String> {
        self.log.connects.lock().unwrap().clone()
    }

    pub fn reloads(&self) -> usize {
        self.log.reloads.load(Ordering::SeqCst)
    }

    /// Run `hook` from inside this server's reload listener.
    pub fn on_reload(&self, hook: impl FnOnce() + Send + 'static) {
        *self.log.reload_hook.lock().unwrap() = Some(Box::new(hook));
    }

    /// Inbound traffic of the `index`th socket delivered to this server.
    pub fn incoming(&self, index: usize) -> mpsc::UnboundedReceiver<SocketEvent> {
        self.log.incoming.lock().unwrap().remove(index)
    }
}

impl WikiServer for FakeServer {
    fn add_authenticator(&self, authenticator: Arc<dyn Authenticator>) {
        self.authenticators.lock().unwrap().insert(0, authenticator);
    }

    fn request_handler(&self, request: DelegatedRequest, response: ResponseSink) {
        let mut state = AuthState {
            allow_anon: self.allow_anon,
            authenticated_username: None,
        };
        let authenticators = self.authenticators.lock().unwrap().clone();
        for authenticator in &authenticators {
            if !authenticator.authenticate_request(&request, &response, &mut state) {
                return;
            }
        }

        self.log.handled.lock().unwrap().push(request.uri.to_string());
        run(&self.log.request_hook);
        let username = state.authenticated_username.as_deref().unwrap_or("anonymous");
        response.respond(StatusCode::OK, format!("{} {}", request.path(), username));
    }

    fn attach_events(&self, events: Arc<FolderEvents>) {
        if !self.listens {
            return;
        }
        let log = Arc::clone(&self.log);
        events.on_client_connect(move |event: &ClientConnect| {
            log.connects.lock().unwrap().push(event.subpath.clone());
            if let Some(incoming) = event.take_incoming() {
                log.incoming.lock().unwrap().push(incoming);
            }
            let _ = event.socket.send(Message::from("welcome"));
        });

        let log = Arc::clone(&self.log);
        events.on_reload(move || {
            log.reloads.fetch_add(1, Ordering::SeqCst);
            run(&log.reload_hook);
        });
    }
}

/// Socket that records what it was sent and how it was closed.
#[derive(Default)]
pub struct FakeSocket {
    sent: Mutex<Vec<Message>>,
    closed: Mutex<Option<u16>>,
}

impl FakeSocket {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> Vec<Message> {
        self.sent.lock().unwrap().clone()
    }

    pub fn closed_with(&self) -> Option<u16> {
        *self.closed.lock().unwrap()
    }
}

impl WebSocket for FakeSocket {
    fn send(&self, message: Message) -> Result<(), SocketError> {
        if self.closed_with().is_some() {
            return Err(SocketError::Closed);
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    fn close(&self, code: u16) {
        *self.closed.lock().unwrap() = Some(code);
    }
}
