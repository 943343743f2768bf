//! User configuration location for the editor bridge.
//!
//! User config location: $XDG_CONFIG_HOME/editor-lsp-bridge/editor-lsp-bridge.toml
//! Fallback: the platform config directory reported by `dirs`.

use std::path::PathBuf;

const APP_DIR: &str = "editor-lsp-bridge";
const CONFIG_FILE: &str = "editor-lsp-bridge.toml";

/// Returns the path to the user configuration file.
///
/// Returns None if neither $XDG_CONFIG_HOME nor a platform config directory is available.
pub fn user_config_path() -> Option<PathBuf> {
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME")
        && !xdg_config.is_empty()
    {
        return Some(PathBuf::from(xdg_config).join(APP_DIR).join(CONFIG_FILE));
    }

    dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
}

/// Default directory for the persisted metadata cache.
pub fn default_cache_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join(APP_DIR))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    #[test]
    #[serial]
    fn user_config_path_uses_xdg_config_home_when_set() {
        let original = env::var("XDG_CONFIG_HOME").ok();

        // SAFETY: serialized with other env-mutating tests via #[serial]
        unsafe {
            env::set_var("XDG_CONFIG_HOME", "/custom/config");
        }

        let path = user_config_path();

        // SAFETY: same as above, restoring original env state
        unsafe {
            match original {
                Some(val) => env::set_var("XDG_CONFIG_HOME", val),
                None => env::remove_var("XDG_CONFIG_HOME"),
            }
        }

        assert_eq!(
            path,
            Some(PathBuf::from(
                "/custom/config/editor-lsp-bridge/editor-lsp-bridge.toml"
            ))
        );
    }
}
