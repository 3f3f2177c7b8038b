//! Application Configuration Constants
//!
//! Centralized configuration for identifiers, timings, and defaults.
//! Runtime-tunable values live in `settings.rs`; these are the fallbacks.

/// Capture stream configuration
pub mod capture {
    /// Default target FPS for the capture stream
    pub const DEFAULT_TARGET_FPS: u32 = 60;

    /// Frames the backend may buffer before older ones are dropped
    pub const DEFAULT_QUEUE_DEPTH: usize = 5;

    /// Log retention period in days
    pub const LOG_RETENTION_DAYS: u32 = 30;
}

/// Landscape change notification
pub mod landscape {
    /// Quiet period before a burst of landscape signals triggers one refresh
    pub const DEBOUNCE_MS: u64 = 150;

    /// Interval at which the inventory watcher re-enumerates shareable content
    pub const INVENTORY_POLL_MS: u64 = 1000;

    /// Capacity of the broadcast channel behind the notifier.
    /// Signals are unit values, so lagging receivers lose nothing meaningful.
    pub const SIGNAL_CHANNEL_CAPACITY: usize = 16;
}

/// Identity of the capturing application itself
pub mod identity {
    /// Bundle identifier of this application; always excluded from capture
    pub const SELF_APP_ID: &str = "com.windowcloak.app";

    /// Environment variable that overrides the self identifier (tests, dev builds)
    pub const SELF_APP_ID_ENV: &str = "WINDOWCLOAK_SELF_APP_ID";

    /// Resolve the self identifier, honoring the environment override.
    pub fn self_app_id() -> String {
        std::env::var(SELF_APP_ID_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| SELF_APP_ID.to_string())
    }
}

/// On-disk locations
pub mod storage {
    use std::path::PathBuf;

    /// Directory name under the platform config dir
    pub const CONFIG_DIR_NAME: &str = "WindowCloak";

    /// Hiding policy file
    pub const POLICY_FILE_NAME: &str = "configuration.json";

    /// Application settings file
    pub const SETTINGS_FILE_NAME: &str = "settings.json";

    /// Environment variable to relocate the config directory
    pub const CONFIG_DIR_ENV: &str = "WINDOWCLOAK_CONFIG_DIR";

    /// Resolve the config directory: `$WINDOWCLOAK_CONFIG_DIR` if set,
    /// otherwise `<platform config dir>/WindowCloak`.
    pub fn config_dir() -> Option<PathBuf> {
        if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV).filter(|v| !v.is_empty()) {
            return Some(PathBuf::from(dir));
        }
        dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME))
    }
}

/// Logging defaults
pub mod logging {
    /// Application name used for the log directory and file prefix
    pub const LOG_DIR_NAME: &str = "WindowCloak";

    pub const LOG_FILE_PREFIX: &str = "windowcloak.log";

    /// Level used when settings carry an unparseable value
    pub const DEFAULT_LEVEL: &str = "Error";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debounce_is_shorter_than_inventory_poll() {
        assert!(landscape::DEBOUNCE_MS < landscape::INVENTORY_POLL_MS);
    }

    #[test]
    fn self_app_id_defaults_to_bundle_id() {
        if std::env::var(identity::SELF_APP_ID_ENV).is_err() {
            assert_eq!(identity::self_app_id(), identity::SELF_APP_ID);
        }
    }
}
