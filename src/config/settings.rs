use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// One configuration layer as written in TOML or sent as a JSON override.
///
/// Every field is optional so that layers can be merged; `BridgeSettings`
/// fills whatever is still missing with defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsLayer {
    pub server_url: Option<String>,
    pub debounce_ms: Option<u64>,
    pub request_timeout_ms: Option<u64>,
    pub shutdown_timeout_ms: Option<u64>,
    pub keep_connections_warm: Option<bool>,
    pub cache_dir: Option<PathBuf>,
    pub root_uri: Option<String>,
    pub reconnect: Option<ReconnectLayer>,
    pub formatting: Option<FormattingLayer>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectLayer {
    pub initial_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormattingLayer {
    pub tab_size: Option<u32>,
    pub insert_spaces: Option<bool>,
}

/// Resolved settings handed to the bridge at construction time.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeSettings {
    /// Base url; each language connects to `{server_url}/lsp/{language_id}`
    pub server_url: String,
    /// Quiet period before buffered edits are sent as one didChange
    pub debounce: Duration,
    /// Bound on waiting for a response (including waiting for the connection to open)
    pub request_timeout: Duration,
    /// Bound on the shutdown/exit handshake during teardown
    pub shutdown_timeout: Duration,
    pub reconnect: ReconnectSettings,
    /// Keep a language connection alive after its last document closes
    pub keep_connections_warm: bool,
    pub cache_dir: Option<PathBuf>,
    /// Workspace root announced as `rootUri` in `initialize`
    pub root_uri: Option<String>,
    pub formatting: FormattingSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectSettings {
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormattingSettings {
    pub tab_size: u32,
    pub insert_spaces: bool,
}
