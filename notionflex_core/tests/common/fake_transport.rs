//! A deterministic **in‑process stand‑in** for the Notion REST API.
//!
//! *  **From the test’s perspective**
//!    * Decide how each request is answered with a closure over `&ApiRequest`.
//!    * Inspect every request the client sent via `fake.requests()`.
//!
//! *  **Why this exists**: It lets integration tests exercise the *real*
//!    client machinery (rate limiter, retries, normalization, session state)
//!    without opening a socket.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use log::LevelFilter;
use notionflex_core::api::{
    ApiRequest, Method, NotionClient, RateLimitConfig, RateLimiter, RetryPolicy, Transport,
    TransportError,
};
use notionflex_core::storage::MemoryStore;
use notionflex_core::{ApiConfig, ConnectionManager, ProfileStore};
use serde_json::{json, Value};
use tokio::sync::Notify;

type Handler = Box<dyn Fn(&ApiRequest) -> Result<Value, TransportError> + Send + Sync>;

pub struct FakeTransport {
    handler: Handler,
    /// Every request handed to the transport, kept for assertions.
    history: Mutex<Vec<ApiRequest>>,
}

impl FakeTransport {
    pub fn new(
        handler: impl Fn(&ApiRequest) -> Result<Value, TransportError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            history: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.history.lock().unwrap().clone()
    }

    /// How many requests hit `method` + `path`.
    pub fn count(&self, method: Method, path: &str) -> usize {
        self.history
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, request: ApiRequest) -> Result<Value, TransportError> {
        // Record for later assertions …
        self.history.lock().unwrap().push(request.clone());
        // … and answer through the test's handler.
        (self.handler)(&request)
    }
}

/// Holds every request to one path until released, then answers it through
/// the wrapped [`FakeTransport`]. Lets a call outlive the state it started in.
pub struct GatedTransport {
    inner: Arc<FakeTransport>,
    path: String,
    release: Arc<Notify>,
}

impl GatedTransport {
    /// Returns the transport and the handle that lets one held request through.
    pub fn new(inner: Arc<FakeTransport>, path: &str) -> (Arc<Self>, Arc<Notify>) {
        let release = Arc::new(Notify::new());
        let gated = Arc::new(Self {
            inner,
            path: path.to_string(),
            release: release.clone(),
        });
        (gated, release)
    }
}

#[async_trait]
impl Transport for GatedTransport {
    async fn send(&self, request: ApiRequest) -> Result<Value, TransportError> {
        if request.path == self.path {
            self.release.notified().await;
        }
        self.inner.send(request).await
    }
}

/// Logs appear only with `-- --nocapture` or when a test fails.
pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

/// Single attempts and a limiter that never gets in the way.
pub fn fast_config() -> ApiConfig {
    ApiConfig::default()
        .with_retry(RetryPolicy::none())
        .with_rate_limit(RateLimitConfig {
            max_requests: 1000,
            window_ms: 1,
        })
}

pub fn client(transport: Arc<dyn Transport>, config: &ApiConfig) -> NotionClient {
    NotionClient::new(
        transport,
        Arc::new(RateLimiter::from_config(config.rate_limit)),
        config,
    )
}

/// A manager over `transport` with in-memory profile storage.
pub fn manager(transport: Arc<dyn Transport>) -> (ConnectionManager, ProfileStore) {
    let profiles = ProfileStore::new(Arc::new(MemoryStore::new()));
    let manager = ConnectionManager::new(client(transport, &fast_config()), profiles.clone());
    (manager, profiles)
}

pub fn bearer(request: &ApiRequest) -> Option<&str> {
    request
        .header("Authorization")
        .and_then(|h| h.strip_prefix("Bearer "))
}

pub fn bot_user(workspace_name: &str) -> Value {
    json!({
        "object": "user",
        "id": "bot-user-1",
        "type": "bot",
        "bot": {
            "owner": { "type": "workspace", "workspace": true },
            "workspace_name": workspace_name
        }
    })
}

pub fn page_object(id: &str, title: &str) -> Value {
    json!({
        "object": "page",
        "id": id,
        "properties": { "title": { "type": "title", "title": [{ "plain_text": title }] } }
    })
}

pub fn list(results: Vec<Value>, next_cursor: Option<&str>) -> Value {
    json!({
        "object": "list",
        "results": results,
        "has_more": next_cursor.is_some(),
        "next_cursor": next_cursor,
    })
}

pub fn status(status: u16, message: &str) -> TransportError {
    TransportError::Response {
        status,
        body: json!({ "object": "error", "status": status, "message": message }).to_string(),
    }
}

pub fn unauthorized() -> TransportError {
    status(401, "API token is invalid.")
}

pub fn no_response(path: &str) -> TransportError {
    TransportError::NoResponse {
        method: "GET".into(),
        url: format!("https://api.notion.com/v1/{path}"),
        reason: "connection reset by peer".into(),
    }
}

pub const SHORT: Duration = Duration::from_millis(200);
