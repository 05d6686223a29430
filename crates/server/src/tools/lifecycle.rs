//! Lifecycle tools: sw_install, sw_activate and sw_status.
//!
//! These are the host's install and activate triggers. Both are idempotent,
//! so re-running them after a successful bootstrap reports `changed: false`.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;
use crate::state::AppState;

/// The lifecycle tools take no parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct NoParams {}

/// Output from the sw_install tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct InstallOutput {
    pub version: String,
    pub store: String,
    /// Number of precache resources written.
    pub precached: usize,
    /// False when this generation was already installed.
    pub changed: bool,
    pub state: String,
}

/// Output from the sw_activate tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ActivateOutput {
    pub version: String,
    /// Stores deleted during activation.
    pub evicted: Vec<String>,
    /// Clients that switched to this generation.
    pub claimed: usize,
    pub changed: bool,
    pub state: String,
}

/// Output from the sw_status tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StatusOutput {
    pub state: String,
    pub version: String,
    pub store: String,
    pub origin: String,
    /// Number of open clients.
    pub clients: usize,
    pub skip_waiting: bool,
}

pub async fn install_impl(state: &AppState) -> Result<CallToolResult, McpError> {
    let report = state.lifecycle.install().await?;
    json_result(&InstallOutput {
        version: report.version,
        store: report.store,
        precached: report.precached,
        changed: report.changed,
        state: state.lifecycle.state().to_string(),
    })
}

pub async fn activate_impl(state: &AppState) -> Result<CallToolResult, McpError> {
    let report = state.lifecycle.activate().await?;
    json_result(&ActivateOutput {
        version: report.version,
        evicted: report.evicted,
        claimed: report.claimed,
        changed: report.changed,
        state: state.lifecycle.state().to_string(),
    })
}

pub async fn status_impl(state: &AppState) -> Result<CallToolResult, McpError> {
    let generation = state.lifecycle.generation();
    json_result(&StatusOutput {
        state: state.lifecycle.state().to_string(),
        version: generation.version.clone(),
        store: generation.store_name.clone(),
        origin: generation.origin.to_string(),
        clients: state.lifecycle.clients().len(),
        skip_waiting: state.config.skip_waiting && state.lifecycle.skip_waiting_requested(),
    })
}
