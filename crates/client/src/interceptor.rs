//! Per-request entry point.
//!
//! Classifies each request and routes it to the strategy for its category.
//! Nothing is intercepted until the current generation is active; before
//! that, and for non-GET requests, the caller performs the request itself.

use std::sync::Arc;

use reqwest::Url;

use crate::classify::{Classification, ClassifierPolicy, RequestCategory, Strategy, classify};
use crate::fetch::Transport;
use crate::lifecycle::Lifecycle;
use crate::request::Request;
use crate::strategy::{ResponseSource, Served, navigation_fallback, prefer_cache, prefer_network};
use offgrid_core::Error;

/// An intercepted request's response and how it was obtained.
#[derive(Debug, Clone)]
pub struct Intercepted {
    pub classification: Classification,
    pub served: Served,
}

/// Routes requests through the active cache generation.
pub struct Interceptor {
    policy: ClassifierPolicy,
    transport: Arc<dyn Transport>,
    lifecycle: Arc<Lifecycle>,
    index_url: Url,
}

impl Interceptor {
    pub fn new(policy: ClassifierPolicy, transport: Arc<dyn Transport>, lifecycle: Arc<Lifecycle>) -> Result<Self, Error> {
        let index_url = policy
            .origin()
            .join(policy.index_document())
            .map_err(|e| Error::InvalidUrl(format!("{}: {e}", policy.index_document())))?;
        Ok(Self { policy, transport, lifecycle, index_url })
    }

    pub fn policy(&self) -> &ClassifierPolicy {
        &self.policy
    }

    /// Handle one request.
    ///
    /// `Ok(None)` means the request is not intercepted and must go to the
    /// network untouched.
    pub async fn intercept(&self, request: &Request) -> Result<Option<Intercepted>, Error> {
        let Some(classification) = classify(request, &self.policy) else {
            tracing::debug!(method = %request.method, url = %request.url, "not intercepted: non-GET");
            return Ok(None);
        };

        let Some(store) = self.lifecycle.active_store() else {
            tracing::debug!(url = %request.url, state = %self.lifecycle.state(), "not intercepted: no active generation");
            return Ok(None);
        };

        let category = classification.category;
        tracing::debug!(url = %request.url, category = category.as_str(), "intercepted");

        let served = match category.strategy() {
            None => {
                let response = self.transport.fetch(request).await?;
                Served { response, source: ResponseSource::Network }
            }
            Some(Strategy::PreferCache) => {
                match prefer_cache(&store, self.transport.as_ref(), request).await {
                    Ok(served) => served,
                    Err(err) if err.is_network() && category == RequestCategory::Navigation => {
                        match navigation_fallback(&store, &self.index_url).await? {
                            Some(served) => {
                                tracing::warn!(url = %request.url, error = %err, "navigation offline, serving index document");
                                served
                            }
                            None => return Err(err),
                        }
                    }
                    Err(err) => return Err(err),
                }
            }
            Some(Strategy::PreferNetwork) => {
                prefer_network(&store, self.transport.as_ref(), request, &self.index_url).await?
            }
        };

        Ok(Some(Intercepted { classification, served }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Generation;
    use crate::request::{Destination, RequestMode};
    use crate::testing::{ORIGIN, ScriptedTransport, url};
    use offgrid_core::CacheDb;
    use reqwest::Method;

    struct Harness {
        db: CacheDb,
        transport: Arc<ScriptedTransport>,
        lifecycle: Arc<Lifecycle>,
        interceptor: Interceptor,
    }

    async fn harness() -> Harness {
        let db = CacheDb::open_in_memory().await.unwrap();
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond("/", 200, "<html>root</html>");
        transport.respond("/index.html", 200, "<html>index</html>");
        transport.respond("/manifest.json", 200, "{\"name\":\"crm\"}");

        let origin = Url::parse(ORIGIN).unwrap();
        let generation = Generation {
            version: "v1".into(),
            store_name: "offgrid-cache-v1".into(),
            origin: origin.clone(),
            precache: vec!["/".into(), "/index.html".into(), "/manifest.json".into()],
        };
        let lifecycle = Arc::new(Lifecycle::new(db.clone(), transport.clone(), generation));
        let policy = ClassifierPolicy::new(origin, "/index.html", "/api/");
        let interceptor = Interceptor::new(policy, transport.clone(), lifecycle.clone()).unwrap();

        Harness { db, transport, lifecycle, interceptor }
    }

    async fn active() -> Harness {
        let h = harness().await;
        h.lifecycle.install().await.unwrap();
        h.lifecycle.activate().await.unwrap();
        h
    }

    async fn served(h: &Harness, request: &Request) -> Intercepted {
        h.interceptor.intercept(request).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_not_intercepted_before_activation() {
        let h = harness().await;
        assert!(h.interceptor.intercept(&Request::get(url("/"))).await.unwrap().is_none());

        h.lifecycle.install().await.unwrap();
        assert!(h.interceptor.intercept(&Request::get(url("/"))).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_non_get_never_touches_store() {
        let h = active().await;
        let calls_before = h.transport.total_calls();
        let entries_before = h.lifecycle.active_store().unwrap().entry_count().await.unwrap();

        let post = Request::new(Method::POST, url("/api/items")).with_header("Accept", "application/json");
        assert!(h.interceptor.intercept(&post).await.unwrap().is_none());

        assert_eq!(h.transport.total_calls(), calls_before);
        let store = h.lifecycle.active_store().unwrap();
        assert_eq!(store.entry_count().await.unwrap(), entries_before);
        assert!(store.get("POST", url("/api/items").as_str()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_precached_navigation_served_offline() {
        let h = active().await;
        h.transport.set_offline(true);

        let request = Request::get(url("/")).with_mode(RequestMode::Navigate);
        let result = served(&h, &request).await;
        assert_eq!(result.classification.category, RequestCategory::Navigation);
        assert_eq!(result.served.source, ResponseSource::Cache);
        assert_eq!(result.served.response.text(), "<html>root</html>");
    }

    #[tokio::test]
    async fn test_static_asset_fetched_once() {
        let h = active().await;
        h.transport.respond("/style.css", 200, "body{}");
        let request = Request::get(url("/style.css")).with_destination(Destination::Style);

        let first = served(&h, &request).await;
        assert_eq!(first.classification.category, RequestCategory::StaticAsset);
        assert_eq!(first.served.source, ResponseSource::Network);
        assert_eq!(first.served.response.text(), "body{}");

        let second = served(&h, &request).await;
        assert_eq!(second.served.source, ResponseSource::Cache);
        assert_eq!(second.served.response.text(), "body{}");
        assert_eq!(h.transport.calls_to("/style.css"), 1);
    }

    #[tokio::test]
    async fn test_api_is_network_first() {
        let h = active().await;
        let request = Request::get(url("/api/items")).with_header("Accept", "application/json");

        h.transport.respond("/api/items", 200, "[1]");
        served(&h, &request).await;
        h.transport.respond("/api/items", 200, "[1,2]");
        let fresh = served(&h, &request).await;
        assert_eq!(fresh.classification.category, RequestCategory::Api);
        assert_eq!(fresh.served.source, ResponseSource::Network);
        assert_eq!(fresh.served.response.text(), "[1,2]");

        h.transport.set_offline(true);
        let offline = served(&h, &request).await;
        assert_eq!(offline.served.source, ResponseSource::Cache);
        assert_eq!(offline.served.response.text(), "[1,2]");
    }

    #[tokio::test]
    async fn test_offline_api_without_entry_fails() {
        let h = active().await;
        h.transport.fail("/api/items");
        let request = Request::get(url("/api/items")).with_header("Accept", "application/json");

        let result = h.interceptor.intercept(&request).await;
        assert!(matches!(result, Err(Error::Network(_))));
    }

    #[tokio::test]
    async fn test_offline_navigation_falls_back_to_index() {
        let h = active().await;
        h.transport.set_offline(true);

        let request = Request::get(url("/contacts/42")).with_mode(RequestMode::Navigate);
        let result = served(&h, &request).await;
        assert_eq!(result.classification.category, RequestCategory::Navigation);
        assert_eq!(result.served.source, ResponseSource::Fallback);
        assert_eq!(result.served.response.text(), "<html>index</html>");
    }

    #[tokio::test]
    async fn test_offline_static_asset_miss_fails() {
        let h = active().await;
        h.transport.set_offline(true);

        let result = h.interceptor.intercept(&Request::get(url("/logo.png"))).await;
        assert!(matches!(result, Err(Error::Network(_))));
    }

    #[tokio::test]
    async fn test_cross_origin_passthrough_never_cached() {
        let h = active().await;
        let request = Request::get(Url::parse("https://cdn.example.com/lib.js").unwrap());

        let result = served(&h, &request).await;
        assert_eq!(result.classification.category, RequestCategory::Passthrough);
        assert!(!result.classification.same_origin);
        assert_eq!(result.served.source, ResponseSource::Network);

        let store = h.lifecycle.active_store().unwrap();
        assert!(store.get("GET", request.url.as_str()).await.unwrap().is_none());

        h.transport.set_offline(true);
        assert!(matches!(h.interceptor.intercept(&request).await, Err(Error::Network(_))));
    }

    #[tokio::test]
    async fn test_other_category_is_network_first() {
        let h = active().await;
        h.transport.respond("/manifest.json", 200, "{\"name\":\"crm2\"}");

        let result = served(&h, &Request::get(url("/manifest.json"))).await;
        assert_eq!(result.classification.category, RequestCategory::Other);
        assert_eq!(result.served.response.text(), "{\"name\":\"crm2\"}");
    }

    #[tokio::test]
    async fn test_single_store_after_activation() {
        let h = harness().await;
        h.db.open_store("offgrid-cache-v0").await.unwrap();
        h.lifecycle.install().await.unwrap();
        h.lifecycle.activate().await.unwrap();

        assert_eq!(h.db.store_names().await.unwrap(), vec!["offgrid-cache-v1".to_string()]);
    }
}
