//! cache_list tool implementation.
//!
//! Lists every store in the database and the URLs held by the current one.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::state::AppState;
use crate::tools::json_result;

/// One cache store.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StoreSummary {
    pub name: String,
    pub entries: u64,
    /// Whether this is the store of the configured generation.
    pub current: bool,
}

/// Output from the cache_list tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheListOutput {
    pub stores: Vec<StoreSummary>,
    /// URLs cached in the current store, empty if it does not exist yet.
    pub urls: Vec<String>,
}

/// Implementation of the cache_list tool.
pub async fn list_impl(state: &AppState) -> Result<CallToolResult, McpError> {
    let current = &state.lifecycle.generation().store_name;

    let mut stores = Vec::new();
    let mut urls = Vec::new();
    for name in state.db.store_names().await? {
        // Skip stores deleted by an activation since the names were read.
        let Some(store) = state.db.store(&name).await? else {
            continue;
        };
        let entries = store.entry_count().await?;
        let is_current = &name == current;
        if is_current {
            urls = store.urls().await?;
        }
        stores.push(StoreSummary { name, entries, current: is_current });
    }

    json_result(&CacheListOutput { stores, urls })
}
