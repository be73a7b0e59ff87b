// Per-user result slot keyed by a signed session cookie

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, Key, SameSite, SignedCookieJar};
use berrydoc_eye::DetectionResult;
use lru::LruCache;
use parking_lot::Mutex;
use sha2::{Digest, Sha512};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::http::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(value: &str) -> Option<Self> {
        Uuid::parse_str(value).ok().map(Self)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Keyed store holding at most one result per session
pub trait SessionStore: Send + Sync {
    /// Overwrite the session's entry
    fn put(&self, id: &SessionId, result: DetectionResult);

    /// Current entry, left in place
    fn get(&self, id: &SessionId) -> Option<DetectionResult>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-process store; the least recently used session is evicted at capacity
pub struct MemorySessionStore {
    entries: Mutex<LruCache<SessionId, DetectionResult>>,
}

impl MemorySessionStore {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn put(&self, id: &SessionId, result: DetectionResult) {
        self.entries.lock().put(*id, result);
    }

    fn get(&self, id: &SessionId) -> Option<DetectionResult> {
        self.entries.lock().get(id).cloned()
    }

    fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

/// Signs session cookies so clients cannot pick another user's slot
#[derive(Clone)]
pub struct SessionSigner {
    key: Key,
}

impl SessionSigner {
    /// Cookie key derived from the configured secret
    pub fn new(secret: &[u8]) -> Result<Self, String> {
        if secret.is_empty() {
            return Err("Invalid session secret: empty".to_string());
        }
        let key = Key::try_from(Sha512::digest(secret).as_slice())
            .map_err(|e| format!("Invalid session secret: {}", e))?;
        Ok(Self { key })
    }

    /// Session id carried by a correctly signed cookie, if any
    pub fn verify(&self, headers: &HeaderMap, name: &str) -> Option<SessionId> {
        let jar = SignedCookieJar::from_headers(headers, self.key.clone());
        let verified = jar.get(name).and_then(|cookie| SessionId::parse(cookie.value()));

        if verified.is_none() && CookieJar::from_headers(headers).get(name).is_some() {
            warn!("Discarding session cookie with invalid signature");
        }
        verified
    }

    /// Jar that sets the signed cookie for `id`
    pub fn issue(&self, id: &SessionId, config: &SessionConfig) -> SignedCookieJar {
        let cookie = Cookie::build((config.cookie_name.clone(), id.to_string()))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(config.secure_cookie);
        SignedCookieJar::new(self.key.clone()).add(cookie)
    }
}

/// Handle attached to every request by [`session_middleware`]
#[derive(Clone)]
pub struct SessionContext {
    id: SessionId,
    store: Arc<dyn SessionStore>,
    is_new: bool,
}

impl SessionContext {
    pub fn new(id: SessionId, store: Arc<dyn SessionStore>, is_new: bool) -> Self {
        Self { id, store, is_new }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn put(&self, result: DetectionResult) {
        self.store.put(&self.id, result);
    }

    /// Last stored result; reading does not clear it
    pub fn take_or_none(&self) -> Option<DetectionResult> {
        self.store.get(&self.id)
    }
}

/// Resolve or mint the caller's session, and set the cookie for new sessions
pub async fn session_middleware(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let session_config = &state.config.session;

    let (id, is_new) = match state.signer.verify(request.headers(), &session_config.cookie_name) {
        Some(id) => (id, false),
        None => (SessionId::new(), true),
    };

    request
        .extensions_mut()
        .insert(SessionContext::new(id, state.sessions.clone(), is_new));

    let response = next.run(request).await;

    if !is_new {
        return response;
    }
    debug!("Started session {}", id);
    (state.signer.issue(&id, session_config), response).into_response()
}
