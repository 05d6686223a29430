//! Request classification.
//!
//! [`classify`] is a total function over request metadata. Rules are a strict
//! first-match list; navigation is tested before static assets and API routes
//! because `/index.html` or a navigation with `Accept: */*` would otherwise
//! match those too.

use std::sync::LazyLock;

use regex::Regex;
use reqwest::{Method, Url};

use crate::fetch::same_origin;
use crate::request::{Destination, Request};
use offgrid_core::{AppConfig, Error};

static STATIC_EXTENSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\.(?:css|js|png|jpg|jpeg|svg|webp|gif|ico|woff2?|ttf)$").expect("static extension pattern")
});

/// Handling category of an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestCategory {
    /// Cross-origin: always network, never cached.
    Passthrough,
    Navigation,
    StaticAsset,
    Api,
    Other,
}

/// How a category obtains its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    PreferCache,
    PreferNetwork,
}

impl RequestCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestCategory::Passthrough => "passthrough",
            RequestCategory::Navigation => "navigation",
            RequestCategory::StaticAsset => "static-asset",
            RequestCategory::Api => "api",
            RequestCategory::Other => "other",
        }
    }

    /// Strategy used for this category; `None` for passthrough.
    pub fn strategy(&self) -> Option<Strategy> {
        match self {
            RequestCategory::Passthrough => None,
            RequestCategory::Navigation | RequestCategory::StaticAsset => Some(Strategy::PreferCache),
            RequestCategory::Api | RequestCategory::Other => Some(Strategy::PreferNetwork),
        }
    }
}

/// Result of classifying one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub category: RequestCategory,
    pub same_origin: bool,
}

/// The fixed inputs classification depends on besides the request itself.
#[derive(Debug, Clone)]
pub struct ClassifierPolicy {
    origin: Url,
    index_document: String,
    api_prefix: String,
}

impl ClassifierPolicy {
    pub fn new(origin: Url, index_document: impl Into<String>, api_prefix: impl Into<String>) -> Self {
        Self { origin, index_document: index_document.into(), api_prefix: api_prefix.into() }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let origin = Url::parse(&config.origin).map_err(|e| Error::InvalidUrl(format!("origin {}: {e}", config.origin)))?;
        Ok(Self::new(origin, config.index_document.clone(), config.api_prefix.clone()))
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn index_document(&self) -> &str {
        &self.index_document
    }
}

/// Classify a request.
///
/// Returns `None` for non-GET requests, which are never intercepted.
pub fn classify(request: &Request, policy: &ClassifierPolicy) -> Option<Classification> {
    if request.method != Method::GET {
        return None;
    }

    if !same_origin(&request.url, &policy.origin) {
        return Some(Classification { category: RequestCategory::Passthrough, same_origin: false });
    }

    let path = request.url.path();
    let category = if is_navigation(request, path, policy) {
        RequestCategory::Navigation
    } else if is_static_asset(request, path) {
        RequestCategory::StaticAsset
    } else if is_api(request, path, policy) {
        RequestCategory::Api
    } else {
        RequestCategory::Other
    };

    Some(Classification { category, same_origin: true })
}

fn is_navigation(request: &Request, path: &str, policy: &ClassifierPolicy) -> bool {
    request.is_navigation()
        || request.destination == Destination::Document
        || path == "/"
        || path.ends_with(&policy.index_document)
}

fn is_static_asset(request: &Request, path: &str) -> bool {
    matches!(
        request.destination,
        Destination::Style | Destination::Script | Destination::Image | Destination::Font
    ) || STATIC_EXTENSION.is_match(path)
}

fn is_api(request: &Request, path: &str, policy: &ClassifierPolicy) -> bool {
    request.accept().contains("application/json") || path.starts_with(&policy.api_prefix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::RequestMode;

    fn policy() -> ClassifierPolicy {
        ClassifierPolicy::new(Url::parse("http://localhost:8080").unwrap(), "/index.html", "/api/")
    }

    fn get(path: &str) -> Request {
        Request::get(policy().origin().join(path).unwrap())
    }

    fn category(request: &Request) -> RequestCategory {
        classify(request, &policy()).unwrap().category
    }

    #[test]
    fn test_non_get_not_classified() {
        let post = Request::new(Method::POST, policy().origin().join("/api/items").unwrap());
        assert!(classify(&post, &policy()).is_none());

        let head = Request::new(Method::HEAD, policy().origin().join("/style.css").unwrap());
        assert!(classify(&head, &policy()).is_none());
    }

    #[test]
    fn test_cross_origin_is_passthrough() {
        let request = Request::get(Url::parse("https://cdn.example.com/lib.js").unwrap())
            .with_mode(RequestMode::Navigate)
            .with_destination(Destination::Script);
        let classification = classify(&request, &policy()).unwrap();
        assert_eq!(classification.category, RequestCategory::Passthrough);
        assert!(!classification.same_origin);
        assert_eq!(classification.category.strategy(), None);
    }

    #[test]
    fn test_navigation_rules() {
        assert_eq!(category(&get("/")), RequestCategory::Navigation);
        assert_eq!(category(&get("/index.html")), RequestCategory::Navigation);
        assert_eq!(category(&get("/admin/index.html")), RequestCategory::Navigation);
        assert_eq!(category(&get("/contacts").with_mode(RequestMode::Navigate)), RequestCategory::Navigation);
        assert_eq!(category(&get("/contacts").with_destination(Destination::Document)), RequestCategory::Navigation);
    }

    #[test]
    fn test_navigation_wins_over_later_rules() {
        let request = get("/api/report.js")
            .with_mode(RequestMode::Navigate)
            .with_header("Accept", "application/json");
        assert_eq!(category(&request), RequestCategory::Navigation);
    }

    #[test]
    fn test_static_asset_rules() {
        assert_eq!(category(&get("/style.css").with_destination(Destination::Style)), RequestCategory::StaticAsset);
        assert_eq!(category(&get("/icons/icon-192.SVG")), RequestCategory::StaticAsset);
        assert_eq!(category(&get("/fonts/inter.woff2")), RequestCategory::StaticAsset);
        assert_eq!(category(&get("/avatar").with_destination(Destination::Image)), RequestCategory::StaticAsset);
    }

    #[test]
    fn test_static_asset_wins_over_api() {
        assert_eq!(category(&get("/api/bundle.js")), RequestCategory::StaticAsset);
    }

    #[test]
    fn test_api_rules() {
        assert_eq!(category(&get("/api/items")), RequestCategory::Api);
        assert_eq!(
            category(&get("/contacts").with_header("Accept", "application/json, text/plain")),
            RequestCategory::Api
        );
        assert_eq!(category(&get("/api/items")).strategy(), Some(Strategy::PreferNetwork));
    }

    #[test]
    fn test_api_from_second_accept_header() {
        let request = get("/contacts")
            .with_header("Accept", "text/html")
            .with_header("Accept", "application/json");
        assert_eq!(category(&request), RequestCategory::Api);
    }

    #[test]
    fn test_other() {
        assert_eq!(category(&get("/manifest.json")), RequestCategory::Other);
        assert_eq!(category(&get("/sw.jsx")), RequestCategory::Other);
        assert_eq!(category(&get("/apix/items")), RequestCategory::Other);
    }

    #[test]
    fn test_strategies() {
        assert_eq!(RequestCategory::Navigation.strategy(), Some(Strategy::PreferCache));
        assert_eq!(RequestCategory::StaticAsset.strategy(), Some(Strategy::PreferCache));
        assert_eq!(RequestCategory::Other.strategy(), Some(Strategy::PreferNetwork));
    }

    #[test]
    fn test_policy_from_config() {
        let policy = ClassifierPolicy::from_config(&AppConfig::default()).unwrap();
        assert_eq!(policy.origin().as_str(), "http://localhost:8080/");
        assert_eq!(policy.index_document(), "/index.html");
    }
}
