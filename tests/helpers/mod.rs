//! Shared helpers for integration tests.
//!
//! Note: We use `helpers/mod.rs` instead of `helpers.rs` because Cargo
//! auto-discovers top-level `.rs` files in `tests/` as integration tests.

#![allow(dead_code)]

pub mod fake_server;

use std::sync::Arc;
use std::time::Duration;

use editor_lsp_bridge::config::ReconnectSettings;
use editor_lsp_bridge::surface::EditableSurface;
use editor_lsp_bridge::{
    BridgeSettings, ConnectionState, EditorBridge, MemoryConnector, MemorySurface, MetadataCache,
};

use fake_server::FakeServer;

pub const SERVER_URL: &str = "ws://editor.test";

/// Settings with short delays, suitable for paused-clock tests.
pub fn test_settings() -> BridgeSettings {
    BridgeSettings {
        server_url: SERVER_URL.to_string(),
        debounce: Duration::from_millis(400),
        request_timeout: Duration::from_secs(10),
        shutdown_timeout: Duration::from_millis(200),
        reconnect: ReconnectSettings {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(800),
        },
        keep_connections_warm: false,
        cache_dir: None,
        root_uri: Some("file:///project".to_string()),
        ..BridgeSettings::default()
    }
}

/// A bridge over the memory transport plus the handles tests drive it with.
pub struct Harness {
    pub bridge: EditorBridge,
    pub surface: Arc<MemorySurface>,
    pub server: FakeServer,
    pub connector: MemoryConnector,
}

pub fn harness(settings: BridgeSettings, cache: MetadataCache) -> Harness {
    let (connector, accepted) = MemoryConnector::new();
    let surface = Arc::new(MemorySurface::new());
    let bridge = EditorBridge::new(
        settings,
        Arc::clone(&surface) as Arc<dyn EditableSurface>,
        Arc::new(connector.clone()),
        cache,
    )
    .expect("bridge should build inside a runtime");

    Harness {
        bridge,
        surface,
        server: FakeServer::new(accepted),
        connector,
    }
}

/// Wait until the connection of `language_id` reaches `expected`.
pub async fn wait_for_state(bridge: &EditorBridge, language_id: &str, expected: ConnectionState) {
    let connection = bridge
        .connections()
        .get(language_id)
        .unwrap_or_else(|| panic!("no connection for {}", language_id));
    let mut states = connection.subscribe_state();
    tokio::time::timeout(Duration::from_secs(30), states.wait_for(|state| *state == expected))
        .await
        .unwrap_or_else(|_| panic!("{} never reached {:?}", language_id, expected))
        .expect("state channel closed");
}
