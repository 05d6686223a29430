//! MCP tool implementations.
//!
//! This module contains all tools exposed by the offgrid server.

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use serde::Serialize;

use offgrid_core::Error;

pub mod cache;
pub mod lifecycle;
pub mod sw_fetch;

/// Serialize a tool output as pretty JSON text content.
pub(crate) fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize output: {e}")))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

/// Decode the JSON text content of a successful tool call.
#[cfg(test)]
pub(crate) fn output_of<T: serde::de::DeserializeOwned>(result: &CallToolResult) -> T {
    let text = result
        .content
        .first()
        .and_then(|c| c.as_text())
        .map(|c| c.text.clone())
        .expect("Expected text content");
    serde_json::from_str(&text).unwrap()
}
