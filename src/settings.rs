use serde::{Deserialize, Serialize};
use std::time::Duration;

use windowcloak_capture::capture::StreamOptions;
use windowcloak_capture::config;

/// Application settings. The hiding policy lives in its own file; these are
/// the knobs around it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    // Capture
    #[serde(default = "default_target_fps")]
    pub target_fps: u32,
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,

    // Landscape tracking
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_inventory_poll_ms")]
    pub inventory_poll_ms: u64,

    // Logging
    #[serde(default = "default_log_level")]
    pub log_level: String, // "Off", "Error", "Warn", "Info", "Debug", "Trace"
    #[serde(default = "default_log_to_file")]
    pub log_to_file: bool,
    #[serde(default = "default_log_retention_days")]
    pub log_retention_days: u32,
}

fn default_target_fps() -> u32 {
    config::capture::DEFAULT_TARGET_FPS
}

fn default_queue_depth() -> usize {
    config::capture::DEFAULT_QUEUE_DEPTH
}

fn default_debounce_ms() -> u64 {
    config::landscape::DEBOUNCE_MS
}

fn default_inventory_poll_ms() -> u64 {
    config::landscape::INVENTORY_POLL_MS
}

fn default_log_level() -> String {
    config::logging::DEFAULT_LEVEL.to_string() // Default: only errors
}

fn default_log_to_file() -> bool {
    true
}

fn default_log_retention_days() -> u32 {
    config::capture::LOG_RETENTION_DAYS
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            target_fps: default_target_fps(),
            queue_depth: default_queue_depth(),
            debounce_ms: default_debounce_ms(),
            inventory_poll_ms: default_inventory_poll_ms(),
            log_level: default_log_level(),
            log_to_file: default_log_to_file(),
            log_retention_days: default_log_retention_days(),
        }
    }
}

impl Settings {
    pub fn stream_options(&self) -> StreamOptions {
        StreamOptions {
            target_fps: self.target_fps,
            queue_depth: self.queue_depth,
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn inventory_poll_interval(&self) -> Duration {
        // A zero interval would make tokio::time::interval panic
        Duration::from_millis(self.inventory_poll_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_config() {
        let settings = Settings::default();
        assert_eq!(settings.target_fps, 60);
        assert_eq!(settings.debounce(), Duration::from_millis(150));
        assert_eq!(settings.log_level, "Error");
        assert!(settings.log_to_file);
    }

    #[test]
    fn missing_fields_use_defaults() {
        let settings: Settings = serde_json::from_str(r#"{"target_fps": 30}"#).unwrap();
        assert_eq!(settings.target_fps, 30);
        assert_eq!(settings.queue_depth, config::capture::DEFAULT_QUEUE_DEPTH);
        assert_eq!(settings.stream_options().target_fps, 30);
    }

    #[test]
    fn zero_poll_interval_is_clamped() {
        let settings = Settings {
            inventory_poll_ms: 0,
            ..Settings::default()
        };
        assert_eq!(settings.inventory_poll_interval(), Duration::from_millis(1));
    }
}
