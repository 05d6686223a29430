//! Prefer-cache and prefer-network strategies.
//!
//! Both strategies store a duplicate of every ok-status network response
//! before handing the original back, so the stored copy and the delivered
//! copy are independent reads of the same payload. A failed cache write is
//! logged and never fails the request.

use reqwest::Url;

use crate::fetch::Transport;
use crate::request::{Request, Response};
use offgrid_core::{CacheStore, Error};

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Cache,
    Network,
    /// The cached index document standing in for an unreachable navigation.
    Fallback,
}

impl ResponseSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseSource::Cache => "cache",
            ResponseSource::Network => "network",
            ResponseSource::Fallback => "fallback",
        }
    }
}

/// A response together with its source.
#[derive(Debug, Clone)]
pub struct Served {
    pub response: Response,
    pub source: ResponseSource,
}

impl Served {
    fn new(response: Response, source: ResponseSource) -> Self {
        Self { response, source }
    }
}

async fn lookup(store: &CacheStore, method: &str, url: &Url) -> Result<Option<Response>, Error> {
    match store.get(method, url.as_str()).await? {
        Some(entry) => Response::from_entry(entry).map(Some),
        None => Ok(None),
    }
}

async fn remember(store: &CacheStore, request: &Request, response: &Response) {
    let entry = response.duplicate().into_entry(request);
    if let Err(e) = store.put(&entry).await {
        tracing::warn!(url = %request.url, error = %e, "failed to update cache");
    }
}

/// Serve the cached index document, if there is one.
pub async fn navigation_fallback(store: &CacheStore, index_url: &Url) -> Result<Option<Served>, Error> {
    Ok(lookup(store, "GET", index_url)
        .await?
        .map(|response| Served::new(response, ResponseSource::Fallback)))
}

/// Answer from the store when possible, otherwise from the network.
///
/// Network failures on a miss are returned to the caller unchanged.
pub async fn prefer_cache(store: &CacheStore, transport: &dyn Transport, request: &Request) -> Result<Served, Error> {
    if let Some(response) = lookup(store, request.method.as_str(), &request.url).await? {
        tracing::debug!(url = %request.url, "cache hit");
        return Ok(Served::new(response, ResponseSource::Cache));
    }

    tracing::debug!(url = %request.url, "cache miss");
    let response = transport.fetch(request).await?;
    if response.ok() {
        remember(store, request, &response).await;
    }
    Ok(Served::new(response, ResponseSource::Network))
}

/// Answer from the network, falling back to the store when it is unreachable.
///
/// Ok-status responses replace the stored entry. Non-ok responses are returned
/// as they are and leave any earlier entry in place. On a network failure the
/// stored entry is served; navigations with no entry get the index document
/// at `index_url`; anything else gets the original failure.
pub async fn prefer_network(
    store: &CacheStore, transport: &dyn Transport, request: &Request, index_url: &Url,
) -> Result<Served, Error> {
    let err = match transport.fetch(request).await {
        Ok(response) => {
            if response.ok() {
                remember(store, request, &response).await;
            }
            return Ok(Served::new(response, ResponseSource::Network));
        }
        Err(err) if err.is_network() => err,
        Err(err) => return Err(err),
    };

    if let Some(response) = lookup(store, request.method.as_str(), &request.url).await? {
        tracing::warn!(url = %request.url, error = %err, "network unavailable, serving cached response");
        return Ok(Served::new(response, ResponseSource::Cache));
    }

    if request.is_navigation()
        && let Some(served) = navigation_fallback(store, index_url).await?
    {
        tracing::warn!(url = %request.url, error = %err, "network unavailable, serving index document");
        return Ok(served);
    }

    Err(err)
}
