use std::sync::Arc;

use futures::future::try_join_all;
use log::{debug, info, warn};
use serde_json::{json, Value};

use super::error::NotionError;
use super::rate_limit::RateLimiter;
use super::response::{parse_api_response, NormalizedResponse};
use super::retry::RetryPolicy;
use super::transport::{ApiRequest, HttpTransport, Transport};
use crate::config::ApiConfig;

/// Upper bound on search pages followed by [`NotionClient::search_all`].
pub const MAX_SEARCH_PAGES: usize = 10;
/// Upper bound on child pages followed when listing a block's children.
pub const MAX_CHILDREN_PAGES: usize = 50;
const PAGE_SIZE: u32 = 100;

/// Called before each retry with the failure and the retries left.
pub type RetryObserver = Arc<dyn Fn(&NotionError, u32) + Send + Sync>;

/// The only component that issues network calls.
///
/// Every attempt (retries included) first takes a slot from the shared
/// [`RateLimiter`], then goes through the [`Transport`]. Failures come back
/// as [`NotionError`], successes as [`NormalizedResponse`].
///
/// Cloning is cheap: transport and limiter are shared.
#[derive(Clone)]
pub struct NotionClient {
    transport: Arc<dyn Transport>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    api_version: String,
    on_retry: Option<RetryObserver>,
}

impl NotionClient {
    pub fn new(transport: Arc<dyn Transport>, limiter: Arc<RateLimiter>, config: &ApiConfig) -> Self {
        Self {
            transport,
            limiter,
            retry: config.retry,
            api_version: config.api_version.clone(),
            on_retry: None,
        }
    }

    /// HTTP transport and a fresh limiter, both built from `config`.
    pub fn from_config(config: &ApiConfig) -> Self {
        Self::new(
            Arc::new(HttpTransport::new(config.base_url.clone())),
            Arc::new(RateLimiter::from_config(config.rate_limit)),
            config,
        )
    }

    pub fn with_retry_observer(mut self, observer: RetryObserver) -> Self {
        self.on_retry = Some(observer);
        self
    }

    /// Sends `request` with credentials attached, retrying per policy.
    ///
    /// A blank credential fails with [`NotionError::Configuration`] before
    /// anything reaches the transport.
    pub async fn execute(
        &self,
        credential: &str,
        request: ApiRequest,
        default_message: &str,
    ) -> Result<Option<NormalizedResponse>, NotionError> {
        if credential.trim().is_empty() {
            return Err(NotionError::configuration(
                "Notion API is not configured with a valid integration key",
            ));
        }

        let request = request
            .with_header("Authorization", format!("Bearer {credential}"))
            .with_header("Notion-Version", self.api_version.as_str())
            .with_header("Content-Type", "application/json");
        let transport = &self.transport;
        let limiter = &self.limiter;

        let raw = self
            .retry
            .run(
                || {
                    let request = request.clone();
                    async move {
                        limiter.acquire().await;
                        debug!("{} {}", request.method.as_str(), request.path);
                        transport
                            .send(request)
                            .await
                            .map_err(|err| NotionError::from_transport(&err, default_message))
                    }
                },
                |err, remaining| match &self.on_retry {
                    Some(observer) => observer(err, remaining),
                    None => warn!("{err}; retrying ({remaining} retries left)"),
                },
            )
            .await?;

        Ok(parse_api_response(&raw))
    }

    async fn call(
        &self,
        credential: &str,
        request: ApiRequest,
        default_message: &str,
    ) -> Result<NormalizedResponse, NotionError> {
        Ok(self
            .execute(credential, request, default_message)
            .await?
            .unwrap_or_default())
    }

    /// The user (or bot) the credential belongs to.
    pub async fn current_user(&self, credential: &str) -> Result<NormalizedResponse, NotionError> {
        self.call(credential, ApiRequest::get("users/me"), "Failed to fetch current user")
            .await
    }

    pub async fn search(
        &self,
        credential: &str,
        params: Value,
    ) -> Result<NormalizedResponse, NotionError> {
        self.call(
            credential,
            ApiRequest::post("search", params),
            "Failed to search Notion pages",
        )
        .await
    }

    /// Runs a search and follows `next_cursor` until the listing ends.
    pub async fn search_all(&self, credential: &str, params: Value) -> Result<Vec<Value>, NotionError> {
        let mut params = match params {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        params.insert("page_size".into(), json!(PAGE_SIZE));

        let mut items = Vec::new();
        for _ in 0..MAX_SEARCH_PAGES {
            let page = self.search(credential, Value::Object(params.clone())).await?;
            items.extend(page.items());
            match page.next_cursor() {
                Some(cursor) => {
                    params.insert("start_cursor".into(), json!(cursor));
                }
                None => return Ok(items),
            }
        }
        warn!("Search stopped after {MAX_SEARCH_PAGES} pages; results are truncated");
        Ok(items)
    }

    pub async fn get_page(&self, credential: &str, page_id: &str) -> Result<NormalizedResponse, NotionError> {
        self.call(
            credential,
            ApiRequest::get(format!("pages/{page_id}")),
            &format!("Failed to fetch page {page_id}"),
        )
        .await
    }

    pub async fn create_page(&self, credential: &str, body: Value) -> Result<NormalizedResponse, NotionError> {
        self.call(credential, ApiRequest::post("pages", body), "Failed to create page")
            .await
    }

    pub async fn update_page(
        &self,
        credential: &str,
        page_id: &str,
        body: Value,
    ) -> Result<NormalizedResponse, NotionError> {
        self.call(
            credential,
            ApiRequest::patch(format!("pages/{page_id}"), body),
            &format!("Failed to update page {page_id}"),
        )
        .await
    }

    pub async fn get_block_children(
        &self,
        credential: &str,
        block_id: &str,
        start_cursor: Option<&str>,
    ) -> Result<NormalizedResponse, NotionError> {
        let mut request = ApiRequest::get(format!("blocks/{block_id}/children"))
            .with_query("page_size", PAGE_SIZE.to_string());
        if let Some(cursor) = start_cursor {
            request = request.with_query("start_cursor", cursor);
        }
        self.call(
            credential,
            request,
            &format!("Failed to fetch children of block {block_id}"),
        )
        .await
    }

    /// Every child of a block, across all cursor pages.
    pub async fn get_all_block_children(
        &self,
        credential: &str,
        block_id: &str,
    ) -> Result<Vec<Value>, NotionError> {
        let mut children = Vec::new();
        let mut cursor: Option<String> = None;
        for _ in 0..MAX_CHILDREN_PAGES {
            let page = self
                .get_block_children(credential, block_id, cursor.as_deref())
                .await?;
            children.extend(page.items());
            match page.next_cursor() {
                Some(next) => cursor = Some(next.to_string()),
                None => return Ok(children),
            }
        }
        warn!("Listing children of {block_id} stopped after {MAX_CHILDREN_PAGES} pages");
        Ok(children)
    }

    pub async fn append_block_children(
        &self,
        credential: &str,
        block_id: &str,
        children: Vec<Value>,
    ) -> Result<NormalizedResponse, NotionError> {
        self.call(
            credential,
            ApiRequest::patch(
                format!("blocks/{block_id}/children"),
                json!({ "children": children }),
            ),
            &format!("Failed to append blocks to {block_id}"),
        )
        .await
    }

    pub async fn delete_block(&self, credential: &str, block_id: &str) -> Result<NormalizedResponse, NotionError> {
        self.call(
            credential,
            ApiRequest::delete(format!("blocks/{block_id}")),
            &format!("Failed to delete block {block_id}"),
        )
        .await
    }

    /// Replaces the content of `page_id` with `blocks`.
    ///
    /// Lists the current children, deletes all of them concurrently, then
    /// appends the new set. Not transactional: if the append fails after the
    /// deletes went through, the page is left empty and nothing is restored.
    pub async fn replace_page_content(
        &self,
        credential: &str,
        page_id: &str,
        blocks: Vec<Value>,
    ) -> Result<NormalizedResponse, NotionError> {
        let existing = self.get_all_block_children(credential, page_id).await?;
        let ids: Vec<&str> = existing
            .iter()
            .filter_map(|block| block.get("id").and_then(Value::as_str))
            .collect();

        info!("Clearing {} blocks from page {page_id}", ids.len());
        try_join_all(ids.iter().map(|id| self.delete_block(credential, id))).await?;

        match self.append_block_children(credential, page_id, blocks).await {
            Ok(response) => Ok(response),
            Err(err) => {
                warn!("Append to page {page_id} failed after its content was deleted; the page is now empty");
                Err(err)
            }
        }
    }
}
