//! cache_get tool implementation.
//!
//! Retrieves the entry stored for a URL in the current generation's store.

use std::collections::BTreeMap;

use offgrid_client::fetch::resolve;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ToolError;
use crate::state::AppState;
use crate::tools::json_result;

/// Parameters for the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetParams {
    /// Absolute URL, or a path resolved against the application origin.
    pub url: String,
}

/// Output from the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetOutput {
    pub store: String,
    pub url: String,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    /// Body decoded as UTF-8 (lossy).
    pub body: String,
    pub body_bytes: usize,
    pub stored_at: String,
}

/// Implementation of the cache_get tool.
pub async fn get_impl(state: &AppState, params: CacheGetParams) -> Result<CallToolResult, McpError> {
    let url = resolve(state.interceptor.policy().origin(), &params.url)
        .map_err(|e| ToolError::InvalidInput(format!("url: {e}")))?;
    let name = &state.lifecycle.generation().store_name;

    let Some(store) = state.db.store(name).await? else {
        return Err(ToolError::NotCached(url.to_string()).into());
    };
    let entry = store
        .get("GET", url.as_str())
        .await?
        .ok_or_else(|| ToolError::NotCached(url.to_string()))?;

    let mut headers: BTreeMap<String, String> = BTreeMap::new();
    for (header, value) in entry.headers {
        let value = String::from_utf8_lossy(&value).into_owned();
        headers
            .entry(header)
            .and_modify(|v| {
                v.push_str(", ");
                v.push_str(&value);
            })
            .or_insert(value);
    }

    json_result(&CacheGetOutput {
        store: name.clone(),
        url: entry.url,
        status: entry.status,
        headers,
        body: String::from_utf8_lossy(&entry.body).into_owned(),
        body_bytes: entry.body.len(),
        stored_at: entry.stored_at,
    })
}
