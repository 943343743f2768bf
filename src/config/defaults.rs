//! Default configuration values for the editor bridge.

use super::settings::{
    BridgeSettings, FormattingLayer, FormattingSettings, ReconnectLayer, ReconnectSettings,
    SettingsLayer,
};
use std::time::Duration;

pub const DEFAULT_SERVER_URL: &str = "ws://localhost:3001";
pub const DEFAULT_DEBOUNCE_MS: u64 = 400;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 2_000;
pub const DEFAULT_RECONNECT_INITIAL_MS: u64 = 500;
pub const DEFAULT_RECONNECT_MAX_MS: u64 = 30_000;
pub const DEFAULT_TAB_SIZE: u32 = 4;

/// Returns the lowest-precedence settings layer.
pub fn default_layer() -> SettingsLayer {
    SettingsLayer {
        server_url: Some(DEFAULT_SERVER_URL.to_string()),
        debounce_ms: Some(DEFAULT_DEBOUNCE_MS),
        request_timeout_ms: Some(DEFAULT_REQUEST_TIMEOUT_MS),
        shutdown_timeout_ms: Some(DEFAULT_SHUTDOWN_TIMEOUT_MS),
        keep_connections_warm: Some(false),
        cache_dir: None,
        root_uri: None,
        reconnect: Some(ReconnectLayer {
            initial_delay_ms: Some(DEFAULT_RECONNECT_INITIAL_MS),
            max_delay_ms: Some(DEFAULT_RECONNECT_MAX_MS),
        }),
        formatting: Some(FormattingLayer {
            tab_size: Some(DEFAULT_TAB_SIZE),
            insert_spaces: Some(true),
        }),
    }
}

impl Default for BridgeSettings {
    fn default() -> Self {
        BridgeSettings::from(default_layer())
    }
}

impl From<SettingsLayer> for BridgeSettings {
    fn from(layer: SettingsLayer) -> Self {
        let reconnect = layer.reconnect.unwrap_or_default();
        let formatting = layer.formatting.unwrap_or_default();
        let initial_delay = Duration::from_millis(
            reconnect
                .initial_delay_ms
                .unwrap_or(DEFAULT_RECONNECT_INITIAL_MS),
        );
        let max_delay = Duration::from_millis(
            reconnect.max_delay_ms.unwrap_or(DEFAULT_RECONNECT_MAX_MS),
        );

        Self {
            server_url: layer
                .server_url
                .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string()),
            debounce: Duration::from_millis(layer.debounce_ms.unwrap_or(DEFAULT_DEBOUNCE_MS)),
            request_timeout: Duration::from_millis(
                layer
                    .request_timeout_ms
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS),
            ),
            shutdown_timeout: Duration::from_millis(
                layer
                    .shutdown_timeout_ms
                    .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT_MS),
            ),
            reconnect: ReconnectSettings {
                initial_delay,
                // A max below the initial delay would make backoff shrink
                max_delay: max_delay.max(initial_delay),
            },
            keep_connections_warm: layer.keep_connections_warm.unwrap_or(false),
            cache_dir: layer.cache_dir,
            root_uri: layer.root_uri,
            formatting: FormattingSettings {
                tab_size: formatting.tab_size.unwrap_or(DEFAULT_TAB_SIZE),
                insert_spaces: formatting.insert_spaces.unwrap_or(true),
            },
        }
    }
}
