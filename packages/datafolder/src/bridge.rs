//! Capability bridge between the service and an engine's authenticators.
//!
//! For every delegated request the bridge mints a `CapabilityToken`, parks
//! the request's `RequestContext` under it, and hands the engine a
//! `DelegatedRequest` that carries only the token. The authenticator the
//! bridge registers on the engine exchanges the token for the context exactly
//! once; after that the token is dead.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http::uri::PathAndQuery;
use http::{HeaderMap, Method, StatusCode, Uri};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::context::{RequestContext, ResponseSink};
use crate::engine::{AuthState, Authenticator};
use crate::lock;

/// Unguessable, single-use handle on a parked `RequestContext`.
///
/// Only this crate can mint one or read it out of a `DelegatedRequest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CapabilityToken(Uuid);

impl CapabilityToken {
    fn mint() -> Self {
        Self(Uuid::new_v4())
    }
}

/// A shallow copy of an inbound request, as presented to the engine.
#[derive(Debug, Clone)]
pub struct DelegatedRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
    token: CapabilityToken,
}

impl DelegatedRequest {
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub(crate) fn token(&self) -> CapabilityToken {
        self.token
    }
}

/// Token to context table for one mount.
#[derive(Debug, Default)]
pub struct CapabilityBridge {
    parked: Mutex<HashMap<CapabilityToken, RequestContext>>,
}

impl CapabilityBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park `ctx` and build the request the engine will see.
    ///
    /// A request for the bare mount root gets a trailing slash, so the
    /// engine always sees its root path in one form.
    pub fn delegate(&self, ctx: RequestContext, mount: &str) -> (DelegatedRequest, ResponseSink) {
        let response = ctx.response().clone();
        let uri = if ctx.request.path() == mount && !mount.ends_with('/') {
            with_trailing_slash(&ctx.request.uri)
        } else {
            ctx.request.uri.clone()
        };

        let token = CapabilityToken::mint();
        let request = DelegatedRequest {
            method: ctx.request.method.clone(),
            uri,
            headers: ctx.request.headers.clone(),
            body: ctx.request.body.clone(),
            token,
        };
        lock(&self.parked).insert(token, ctx);

        (request, response)
    }

    /// Remove and return the context behind `token`.
    pub fn take(&self, token: &CapabilityToken) -> Option<RequestContext> {
        lock(&self.parked).remove(token)
    }

    /// Drop the context behind `token` if nobody took it. Returns true if it
    /// was still parked.
    pub fn discard(&self, token: &CapabilityToken) -> bool {
        self.take(token).is_some()
    }

    pub fn len(&self) -> usize {
        lock(&self.parked).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn authenticator(self: &Arc<Self>) -> BridgeAuthenticator {
        BridgeAuthenticator {
            bridge: Arc::clone(self),
        }
    }
}

fn with_trailing_slash(uri: &Uri) -> Uri {
    let path_and_query = match uri.query() {
        Some(query) => format!("{}/?{}", uri.path(), query),
        None => format!("{}/", uri.path()),
    };
    let Ok(path_and_query) = PathAndQuery::try_from(path_and_query) else {
        return uri.clone();
    };
    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(path_and_query);
    Uri::from_parts(parts).unwrap_or_else(|_| uri.clone())
}

const UNAUTHENTICATED: &str = "Unauthenticated users cannot access this wiki";

/// Authenticator that trusts the identity the outer server established.
pub struct BridgeAuthenticator {
    bridge: Arc<CapabilityBridge>,
}

impl Authenticator for BridgeAuthenticator {
    fn authenticate_request(
        &self,
        request: &DelegatedRequest,
        response: &ResponseSink,
        state: &mut AuthState,
    ) -> bool {
        let Some(ctx) = self.bridge.take(&request.token()) else {
            warn!(path = request.path(), "request context missing or already taken");
            response.respond(StatusCode::FORBIDDEN, UNAUTHENTICATED);
            return false;
        };

        match &ctx.credentials {
            Some(credentials) => {
                debug!(username = %credentials.username, "authenticated");
                state.authenticated_username = Some(credentials.username.clone());
                true
            }
            None if state.allow_anon => true,
            None => {
                ctx.throw_reason(StatusCode::FORBIDDEN, UNAUTHENTICATED);
                false
            }
        }
    }
}
