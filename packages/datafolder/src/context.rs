//! Per-request context held by the service.
//!
//! `RequestContext` is the authoritative view of an inbound request: the
//! request itself, who sent it, what they may do, and where the answer goes.
//! Engines never see it directly; see `bridge` for what they get instead.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http::header::{CONTENT_TYPE, LOCATION};
use http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use serde::Deserialize;
use tokio::sync::oneshot;
use tracing::debug;

use crate::lock;

/// Response type produced for every request.
pub type HttpResponse = http::Response<Bytes>;

/// An inbound HTTP (or WebSocket upgrade) request.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl InboundRequest {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn get(uri: &str) -> Result<Self, http::uri::InvalidUri> {
        Ok(Self::new(Method::GET, uri.parse()?))
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }
}

/// Identity established by the outer server's own authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub account_key: String,
    pub username: String,
}

/// Capabilities granted to the request by the outer server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Permissions {
    /// May open data folder scoped sockets.
    pub datafolder: bool,
}

/// Where the answer to a request goes.
///
/// Clones share one underlying channel; the first response sent wins and
/// later sends are ignored.
#[derive(Debug, Clone)]
pub struct ResponseSink {
    slot: Arc<Mutex<Option<oneshot::Sender<HttpResponse>>>>,
}

impl ResponseSink {
    pub fn channel() -> (Self, oneshot::Receiver<HttpResponse>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                slot: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    /// Send `response`. Returns false if the request was already answered.
    pub fn send(&self, response: HttpResponse) -> bool {
        match lock(&self.slot).take() {
            Some(tx) => tx.send(response).is_ok(),
            None => false,
        }
    }

    pub fn is_answered(&self) -> bool {
        lock(&self.slot).is_none()
    }

    /// Send a plain-text response.
    pub fn respond(&self, status: StatusCode, body: impl Into<Bytes>) -> bool {
        let mut response = HttpResponse::new(body.into());
        *response.status_mut() = status;
        response.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        self.send(response)
    }

    /// Send a `302 Found` to `location`.
    pub fn redirect(&self, location: &str) -> bool {
        let Ok(value) = HeaderValue::from_str(location) else {
            return self.respond(StatusCode::BAD_REQUEST, "invalid redirect location");
        };
        let mut response = HttpResponse::new(Bytes::new());
        *response.status_mut() = StatusCode::FOUND;
        response.headers_mut().insert(LOCATION, value);
        self.send(response)
    }
}

/// Full context of one inbound request.
#[derive(Debug)]
pub struct RequestContext {
    pub request: InboundRequest,
    pub credentials: Option<Credentials>,
    pub allow: Permissions,
    response: ResponseSink,
}

impl RequestContext {
    pub fn new(request: InboundRequest, response: ResponseSink) -> Self {
        Self {
            request,
            credentials: None,
            allow: Permissions::default(),
            response,
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_permissions(mut self, allow: Permissions) -> Self {
        self.allow = allow;
        self
    }

    pub fn response(&self) -> &ResponseSink {
        &self.response
    }

    pub fn respond(&self, status: StatusCode, body: impl Into<Bytes>) -> bool {
        self.response.respond(status, body)
    }

    pub fn redirect(&self, location: &str) -> bool {
        debug!(path = self.request.path(), location, "redirecting");
        self.response.redirect(location)
    }

    /// Reject the request with `status`, using `reason` as the body.
    pub fn throw_reason(&self, status: StatusCode, reason: &str) -> bool {
        debug!(path = self.request.path(), %status, reason, "request rejected");
        self.response.respond(status, reason.to_string())
    }
}
