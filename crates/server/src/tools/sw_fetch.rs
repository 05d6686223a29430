//! sw_fetch tool implementation.
//!
//! Routes one request through the interception layer. Requests the layer
//! does not intercept are performed directly on the network, as the host
//! would do.

use std::collections::BTreeMap;

use offgrid_client::fetch::resolve;
use offgrid_client::{Destination, Request, RequestMode, Response};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;
use crate::error::ToolError;
use crate::state::AppState;

/// Input parameters for sw_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SwFetchParams {
    /// Absolute URL, or a path resolved against the application origin.
    pub url: String,

    /// HTTP method (default: GET). Only GET is intercepted.
    #[serde(default = "default_method")]
    pub method: String,

    /// Request mode: "navigate", "same-origin", "no-cors" or "cors" (default).
    #[serde(default)]
    pub mode: Option<String>,

    /// Request destination, e.g. "document", "style", "script", "image", "font".
    #[serde(default)]
    pub destination: Option<String>,

    /// Optional Accept header.
    #[serde(default)]
    pub accept: Option<String>,

    /// Additional request headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

fn default_method() -> String {
    "GET".into()
}

/// Output structure for sw_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SwFetchOutput {
    /// The request URL after resolution.
    pub url: String,
    /// Whether the interception layer handled the request.
    pub intercepted: bool,
    /// Handling category, when intercepted.
    pub category: Option<String>,
    /// "cache", "network" or "fallback".
    pub source: String,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    /// Body decoded as UTF-8 (lossy).
    pub body: String,
    pub body_bytes: usize,
}

impl SwFetchOutput {
    fn new(url: &str, response: &Response, intercepted: bool, category: Option<&str>, source: &str) -> Self {
        let mut headers: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in &response.headers {
            let value = String::from_utf8_lossy(value.as_bytes());
            headers
                .entry(name.as_str().to_string())
                .and_modify(|v| {
                    v.push_str(", ");
                    v.push_str(&value);
                })
                .or_insert_with(|| value.into_owned());
        }

        Self {
            url: url.to_string(),
            intercepted,
            category: category.map(String::from),
            source: source.to_string(),
            status: response.status.as_u16(),
            headers,
            body: response.text(),
            body_bytes: response.body.len(),
        }
    }
}

fn build_request(state: &AppState, params: &SwFetchParams) -> Result<Request, ToolError> {
    let url = resolve(state.interceptor.policy().origin(), &params.url)
        .map_err(|e| ToolError::InvalidInput(format!("url: {e}")))?;
    let mut request = Request::from_parts(&params.method, url).map_err(|e| ToolError::InvalidInput(e.to_string()))?;

    if let Some(mode) = &params.mode {
        request = request.with_mode(mode.parse::<RequestMode>().map_err(|e| ToolError::InvalidInput(e.to_string()))?);
    }
    if let Some(destination) = &params.destination {
        let Ok(destination) = destination.parse::<Destination>();
        request = request.with_destination(destination);
    }
    if let Some(accept) = &params.accept {
        request = request.with_header("accept", accept);
    }
    for (name, value) in &params.headers {
        request = request.with_header(name, value);
    }

    Ok(request)
}

/// Implementation of the sw_fetch tool.
pub async fn fetch_impl(state: &AppState, params: SwFetchParams) -> Result<CallToolResult, McpError> {
    let request = build_request(state, &params)?;
    let url = request.url.to_string();

    let output = match state.interceptor.intercept(&request).await? {
        Some(intercepted) => SwFetchOutput::new(
            &url,
            &intercepted.served.response,
            true,
            Some(intercepted.classification.category.as_str()),
            intercepted.served.source.as_str(),
        ),
        None => {
            let response = state.transport.fetch(&request).await?;
            SwFetchOutput::new(&url, &response, false, None, "network")
        }
    };

    json_result(&output)
}
