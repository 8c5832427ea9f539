//! Crawl retrieval seam and its HTTP gateway implementation.
//!
//! The core never depends on a concrete retrieval mechanism: the
//! [`CrawlerClient`] trait covers profile fetches and paginated listings,
//! and [`HttpCrawlerClient`] implements it against a rendering gateway that
//! performs the authenticated fetches on our behalf.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

use serde::Deserialize;

use crate::config::CrawlerConfig;
use crate::models::{AccountRef, Profile};
use crate::proxy::ProxyPool;

/// Session token environment variable for the retrieval gateway.
pub const SESSION_ENV: &str = "SOCIOGRAPH_SESSION";

/// What went wrong during a crawl operation. The scheduler pattern-matches
/// on the kind to decide job status transitions; nothing here is used for
/// control flow beyond that.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("transient fetch error: {0}")]
    Transient(String),

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("account not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Store(String),
}

impl From<reqwest::Error> for CrawlError {
    fn from(e: reqwest::Error) -> Self {
        CrawlError::Transient(e.to_string())
    }
}

impl From<sqlx::Error> for CrawlError {
    fn from(e: sqlx::Error) -> Self {
        CrawlError::Store(e.to_string())
    }
}

/// A lazy, finite, non-restartable sequence of listing items.
///
/// `next` pulls pages on demand; once it returns `Ok(None)` the sequence is
/// exhausted and stays exhausted. `cursor` exposes the opaque pagination
/// position for checkpointing.
#[async_trait]
pub trait FollowPager: Send {
    async fn next(&mut self) -> Result<Option<AccountRef>, CrawlError>;

    fn cursor(&self) -> Option<&str>;
}

/// Capability interface for profile and follow-listing retrieval.
#[async_trait]
pub trait CrawlerClient: Send + Sync {
    async fn fetch_profile(&self, handle: &str) -> Result<Profile, CrawlError>;

    async fn list_followers(&self, handle: &str) -> Result<Box<dyn FollowPager>, CrawlError>;

    async fn list_following(&self, handle: &str) -> Result<Box<dyn FollowPager>, CrawlError>;
}

struct ClientInner {
    gateway_url: String,
    session_token: Option<String>,
    timeout: Duration,
    // Mutated only from the single pipeline worker; the mutex is the
    // boundary a concurrent deployment would need anyway.
    proxies: Mutex<ProxyPool>,
}

/// [`CrawlerClient`] over a JSON HTTP gateway, with per-request proxy
/// rotation and failure eviction.
#[derive(Clone)]
pub struct HttpCrawlerClient {
    inner: Arc<ClientInner>,
}

#[derive(Deserialize)]
struct ListingPage {
    items: Vec<AccountRef>,
    #[serde(default)]
    next_cursor: Option<String>,
}

impl HttpCrawlerClient {
    pub fn new(config: &CrawlerConfig, proxies: ProxyPool) -> Self {
        let session_token = std::env::var(SESSION_ENV).ok();
        Self {
            inner: Arc::new(ClientInner {
                gateway_url: config.gateway_url.trim_end_matches('/').to_string(),
                session_token,
                timeout: Duration::from_secs(config.timeout_secs),
                proxies: Mutex::new(proxies),
            }),
        }
    }

    fn build_http(&self, proxy: Option<&str>) -> Result<reqwest::Client, CrawlError> {
        let mut builder = reqwest::Client::builder().timeout(self.inner.timeout);
        if let Some(url) = proxy {
            let proxy = reqwest::Proxy::all(url)
                .map_err(|e| CrawlError::Transient(format!("bad proxy url {url}: {e}")))?;
            builder = builder.proxy(proxy);
        }
        builder
            .build()
            .map_err(|e| CrawlError::Transient(e.to_string()))
    }

    async fn get_json(&self, path: &str) -> Result<serde_json::Value, CrawlError> {
        let proxy = self.inner.proxies.lock().unwrap().next_proxy();
        let http = self.build_http(proxy.as_deref())?;

        let url = format!("{}{}", self.inner.gateway_url, path);
        let mut request = http.get(&url);
        if let Some(token) = &self.inner.session_token {
            request = request.bearer_auth(token);
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                // A dead proxy looks like a transport failure; evict it and
                // let the next request rotate onward or go direct.
                if let Some(p) = proxy {
                    self.inner.proxies.lock().unwrap().report_failure(&p);
                }
                return Err(CrawlError::Transient(e.to_string()));
            }
        };

        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| CrawlError::Transient(format!("invalid gateway payload: {e}")));
        }

        let body = response.text().await.unwrap_or_default();
        match status.as_u16() {
            401 | 403 => Err(CrawlError::Auth(format!("{status}: {body}"))),
            404 => Err(CrawlError::NotFound(body)),
            _ => Err(CrawlError::Transient(format!("gateway error {status}: {body}"))),
        }
    }
}

#[async_trait]
impl CrawlerClient for HttpCrawlerClient {
    async fn fetch_profile(&self, handle: &str) -> Result<Profile, CrawlError> {
        let value = self.get_json(&format!("/profiles/{handle}")).await?;
        serde_json::from_value(value)
            .map_err(|e| CrawlError::Transient(format!("invalid profile payload: {e}")))
    }

    async fn list_followers(&self, handle: &str) -> Result<Box<dyn FollowPager>, CrawlError> {
        Ok(Box::new(HttpPager::new(
            self.clone(),
            format!("/profiles/{handle}/followers"),
        )))
    }

    async fn list_following(&self, handle: &str) -> Result<Box<dyn FollowPager>, CrawlError> {
        Ok(Box::new(HttpPager::new(
            self.clone(),
            format!("/profiles/{handle}/following"),
        )))
    }
}

struct HttpPager {
    client: HttpCrawlerClient,
    path: String,
    buffered: VecDeque<AccountRef>,
    cursor: Option<String>,
    exhausted: bool,
}

impl HttpPager {
    fn new(client: HttpCrawlerClient, path: String) -> Self {
        Self {
            client,
            path,
            buffered: VecDeque::new(),
            cursor: None,
            exhausted: false,
        }
    }
}

#[async_trait]
impl FollowPager for HttpPager {
    async fn next(&mut self) -> Result<Option<AccountRef>, CrawlError> {
        loop {
            if let Some(item) = self.buffered.pop_front() {
                return Ok(Some(item));
            }
            if self.exhausted {
                return Ok(None);
            }

            let path = match &self.cursor {
                Some(c) => format!("{}?cursor={}", self.path, c),
                None => self.path.clone(),
            };
            let page: ListingPage = serde_json::from_value(self.client.get_json(&path).await?)
                .map_err(|e| CrawlError::Transient(format!("invalid listing payload: {e}")))?;

            self.cursor = page.next_cursor;
            if self.cursor.is_none() {
                self.exhausted = true;
            }
            self.buffered.extend(page.items);

            if self.buffered.is_empty() && self.exhausted {
                return Ok(None);
            }
        }
    }

    fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }
}
