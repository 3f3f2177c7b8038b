use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::settings::Settings;
use windowcloak_capture::config;

pub fn windowcloak_config_dir() -> Option<PathBuf> {
    config::storage::config_dir()
}

fn merge_json(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_obj), Value::Object(overlay_obj)) => {
            for (k, v) in overlay_obj {
                match base_obj.get_mut(&k) {
                    Some(existing) => merge_json(existing, v),
                    None => {
                        base_obj.insert(k, v);
                    }
                }
            }
        }
        (base_slot, overlay_value) => {
            *base_slot = overlay_value;
        }
    }
}

/// Migrate legacy or hand-edited values into the current Settings schema.
/// - log_level: any case, "warning" -> "Warn"; unknown values removed
/// - numeric fields given as strings -> numbers; unparseable ones removed
/// - non-object documents -> `{}`
pub fn sanitize_settings_json(value: &mut Value) {
    if !value.is_object() {
        *value = serde_json::json!({});
    }
    let Value::Object(obj) = value else {
        return;
    };

    let level = obj
        .get("log_level")
        .map(|v| v.as_str().and_then(|s| s.parse::<crate::logging::LogLevel>().ok()));
    match level {
        Some(Some(parsed)) => {
            obj.insert("log_level".to_string(), Value::String(parsed.to_string()));
        }
        Some(None) => {
            obj.remove("log_level");
        }
        None => {}
    }

    for key in [
        "target_fps",
        "queue_depth",
        "debounce_ms",
        "inventory_poll_ms",
        "log_retention_days",
    ] {
        let replacement = match obj.get(key) {
            Some(Value::Number(n)) if n.is_u64() => continue,
            Some(Value::String(s)) => s.trim().parse::<u64>().ok().map(Value::from),
            Some(_) => None,
            None => continue,
        };
        match replacement {
            Some(v) => {
                obj.insert(key.to_string(), v);
            }
            None => {
                obj.remove(key);
            }
        }
    }
}

/// Write `settings` under `dir`, keeping keys of the existing file that the
/// current schema does not know about
pub fn persist_settings_in(dir: &Path, settings: &Settings) -> Result<(), String> {
    let _ = std::fs::create_dir_all(dir);
    let settings_path = dir.join(config::storage::SETTINGS_FILE_NAME);

    let mut existing_value: Value = match std::fs::read_to_string(&settings_path) {
        Ok(s) => serde_json::from_str(&s).unwrap_or_else(|_| serde_json::json!({})),
        Err(_) => serde_json::json!({}),
    };
    if !existing_value.is_object() {
        existing_value = serde_json::json!({});
    }

    let new_value = serde_json::to_value(settings).map_err(|e| e.to_string())?;
    merge_json(&mut existing_value, new_value);

    let pretty = serde_json::to_string_pretty(&existing_value).map_err(|e| e.to_string())?;
    std::fs::write(settings_path, pretty).map_err(|e| e.to_string())?;
    Ok(())
}

/// Load settings from `dir`, merged onto defaults. Never fails; a missing or
/// broken file yields defaults, and a normalized file is written back.
pub fn load_settings_from_disk(dir: &Path) -> Settings {
    let settings_path = dir.join(config::storage::SETTINGS_FILE_NAME);
    let existed = settings_path.exists();

    let raw = std::fs::read_to_string(&settings_path).unwrap_or_else(|_| "{}".to_string());
    let mut value: Value = serde_json::from_str(&raw).unwrap_or_else(|_| serde_json::json!({}));
    sanitize_settings_json(&mut value);

    // Merge onto current defaults so missing keys don't break deserialization.
    let mut merged =
        serde_json::to_value(Settings::default()).unwrap_or_else(|_| serde_json::json!({}));
    merge_json(&mut merged, value);

    let settings: Settings = serde_json::from_value(merged).unwrap_or_default();

    if existed {
        if let Err(e) = persist_settings_in(dir, &settings) {
            log::warn!("Failed to persist normalized settings: {}", e);
        }
    }

    settings
}

/// Settings from the platform config dir, or defaults
pub fn load_settings() -> Settings {
    match windowcloak_config_dir() {
        Some(dir) => load_settings_from_disk(&dir),
        None => Settings::default(),
    }
}
