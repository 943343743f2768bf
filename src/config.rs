pub mod defaults;
pub mod settings;
pub mod user;

pub use settings::{
    BridgeSettings, FormattingLayer, FormattingSettings, ReconnectLayer, ReconnectSettings,
    SettingsLayer,
};

use serde_json::Value;
use std::fs;
use std::path::Path;

/// Name of the project-level configuration file.
pub const PROJECT_CONFIG_FILE: &str = "editor-lsp-bridge.toml";

/// Merge two layers, preferring values from `primary` over `fallback`
pub fn merge_settings(
    fallback: Option<SettingsLayer>,
    primary: Option<SettingsLayer>,
) -> Option<SettingsLayer> {
    match (fallback, primary) {
        (None, None) => None,
        (Some(settings), None) => Some(settings),
        (None, Some(settings)) => Some(settings),
        (Some(fallback), Some(primary)) => Some(SettingsLayer {
            server_url: primary.server_url.or(fallback.server_url),
            debounce_ms: primary.debounce_ms.or(fallback.debounce_ms),
            request_timeout_ms: primary.request_timeout_ms.or(fallback.request_timeout_ms),
            shutdown_timeout_ms: primary.shutdown_timeout_ms.or(fallback.shutdown_timeout_ms),
            keep_connections_warm: primary
                .keep_connections_warm
                .or(fallback.keep_connections_warm),
            cache_dir: primary.cache_dir.or(fallback.cache_dir),
            root_uri: primary.root_uri.or(fallback.root_uri),
            reconnect: merge_reconnect(fallback.reconnect, primary.reconnect),
            formatting: merge_formatting(fallback.formatting, primary.formatting),
        }),
    }
}

fn merge_reconnect(
    fallback: Option<ReconnectLayer>,
    primary: Option<ReconnectLayer>,
) -> Option<ReconnectLayer> {
    match (fallback, primary) {
        (Some(fallback), Some(primary)) => Some(ReconnectLayer {
            initial_delay_ms: primary.initial_delay_ms.or(fallback.initial_delay_ms),
            max_delay_ms: primary.max_delay_ms.or(fallback.max_delay_ms),
        }),
        (fallback, primary) => primary.or(fallback),
    }
}

fn merge_formatting(
    fallback: Option<FormattingLayer>,
    primary: Option<FormattingLayer>,
) -> Option<FormattingLayer> {
    match (fallback, primary) {
        (Some(fallback), Some(primary)) => Some(FormattingLayer {
            tab_size: primary.tab_size.or(fallback.tab_size),
            insert_spaces: primary.insert_spaces.or(fallback.insert_spaces),
        }),
        (fallback, primary) => primary.or(fallback),
    }
}

/// Merge layers in order; later layers override earlier ones.
pub fn merge_all(layers: &[Option<SettingsLayer>]) -> Option<SettingsLayer> {
    layers
        .iter()
        .cloned()
        .fold(None, |acc, layer| merge_settings(acc, layer))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SettingsEventKind {
    Info,
    Warning,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SettingsEvent {
    pub kind: SettingsEventKind,
    pub message: String,
}

impl SettingsEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            kind: SettingsEventKind::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            kind: SettingsEventKind::Warning,
            message: message.into(),
        }
    }
}

#[derive(Debug)]
pub struct SettingsLoadOutcome {
    pub settings: BridgeSettings,
    pub events: Vec<SettingsEvent>,
}

/// Load settings from every layer: defaults < user < project < override.
///
/// Problems in any layer are reported as warning events; the layer is skipped.
pub fn load_settings(
    root_path: Option<&Path>,
    override_settings: Option<Value>,
) -> SettingsLoadOutcome {
    let mut events = Vec::new();

    let defaults = Some(defaults::default_layer());
    let user_config = user::user_config_path()
        .and_then(|path| load_toml_layer(&path, "user config", &mut events));
    let project = root_path.and_then(|root| {
        load_toml_layer(&root.join(PROJECT_CONFIG_FILE), PROJECT_CONFIG_FILE, &mut events)
    });
    let override_layer = override_settings.and_then(|value| parse_override(value, &mut events));

    let merged = merge_all(&[defaults, user_config, project, override_layer]).unwrap_or_default();
    let mut settings = BridgeSettings::from(merged);
    if settings.cache_dir.is_none() {
        settings.cache_dir = user::default_cache_dir();
    }

    SettingsLoadOutcome { settings, events }
}

fn load_toml_layer(
    path: &Path,
    label: &str,
    events: &mut Vec<SettingsEvent>,
) -> Option<SettingsLayer> {
    if !path.exists() {
        return None;
    }

    match fs::read_to_string(path) {
        Ok(contents) => match toml::from_str::<SettingsLayer>(&contents) {
            Ok(layer) => {
                events.push(SettingsEvent::info(format!(
                    "Loaded {} from {}",
                    label,
                    path.display()
                )));
                Some(layer)
            }
            Err(err) => {
                events.push(SettingsEvent::warning(format!(
                    "Failed to parse {}: {}",
                    label, err
                )));
                None
            }
        },
        Err(err) => {
            events.push(SettingsEvent::warning(format!(
                "Failed to read {}: {}",
                label, err
            )));
            None
        }
    }
}

fn parse_override(value: Value, events: &mut Vec<SettingsEvent>) -> Option<SettingsLayer> {
    match serde_json::from_value::<SettingsLayer>(value) {
        Ok(layer) => {
            events.push(SettingsEvent::info("Applied settings override"));
            Some(layer)
        }
        Err(err) => {
            events.push(SettingsEvent::warning(format!(
                "Failed to parse settings override: {}",
                err
            )));
            None
        }
    }
}
