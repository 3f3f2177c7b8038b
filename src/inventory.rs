//! Window/app inventory snapshot
//!
//! A point-in-time enumeration of displays, running applications and their
//! windows, as reported by the capture backend. Snapshots are never persisted;
//! each refresh fetches a fresh one and drops it when done.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// OS-scoped window identifier (CGWindowID on macOS). Recycled over time.
pub type WindowId = u32;

/// Window rectangle in screen points
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowBounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl WindowBounds {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }
}

/// A display that can be captured
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayInfo {
    pub id: u32,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

/// A running application
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AppInfo {
    /// Bundle identifier, e.g. "com.google.Chrome"
    pub bundle_id: String,
    /// Display name, e.g. "Google Chrome"
    pub name: String,
    pub pid: i32,
}

impl AppInfo {
    pub fn new(bundle_id: impl Into<String>, name: impl Into<String>, pid: i32) -> Self {
        Self {
            bundle_id: bundle_id.into(),
            name: name.into(),
            pid,
        }
    }
}

/// A window owned by a running application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowInfo {
    pub id: WindowId,
    /// Bundle identifier of the owning application
    pub app_id: String,
    pub title: String,
    pub bounds: WindowBounds,
    pub on_screen: bool,
    /// Stacking layer; 0 for normal application windows
    pub layer: i32,
}

impl WindowInfo {
    pub fn new(id: WindowId, app_id: impl Into<String>, title: impl Into<String>, on_screen: bool) -> Self {
        Self {
            id,
            app_id: app_id.into(),
            title: title.into(),
            bounds: WindowBounds::default(),
            on_screen,
            layer: 0,
        }
    }
}

/// Everything the backend can currently share
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShareableContent {
    pub displays: Vec<DisplayInfo>,
    pub applications: Vec<AppInfo>,
    pub windows: Vec<WindowInfo>,
}

impl ShareableContent {
    /// Windows owned by `app_id`, in enumeration order
    pub fn windows_of<'a>(&'a self, app_id: &'a str) -> impl Iterator<Item = &'a WindowInfo> + 'a {
        self.windows.iter().filter(move |w| w.app_id == app_id)
    }

    /// Ids of every window owned by `app_id`
    pub fn window_ids_of(&self, app_id: &str) -> BTreeSet<WindowId> {
        self.windows_of(app_id).map(|w| w.id).collect()
    }

    pub fn application(&self, bundle_id: &str) -> Option<&AppInfo> {
        self.applications.iter().find(|a| a.bundle_id == bundle_id)
    }

    pub fn display(&self, id: u32) -> Option<&DisplayInfo> {
        self.displays.iter().find(|d| d.id == id)
    }

    /// Cheap equality key used to detect landscape changes between polls.
    /// Titles and bounds are ignored; they change constantly without
    /// affecting the exclusion filter.
    pub fn fingerprint(&self) -> InventoryFingerprint {
        InventoryFingerprint {
            apps: self.applications.iter().map(|a| a.bundle_id.clone()).collect(),
            windows: self
                .windows
                .iter()
                .map(|w| (w.id, w.app_id.clone(), w.on_screen))
                .collect(),
            displays: self.displays.iter().map(|d| (d.id, d.width, d.height)).collect(),
        }
    }
}

/// See [`ShareableContent::fingerprint`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryFingerprint {
    apps: BTreeSet<String>,
    windows: BTreeSet<(WindowId, String, bool)>,
    displays: BTreeSet<(u32, u32, u32)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ShareableContent {
        ShareableContent {
            displays: vec![DisplayInfo { id: 1, width: 2560, height: 1440 }],
            applications: vec![
                AppInfo::new("com.acme.chat", "Chat", 100),
                AppInfo::new("com.acme.notes", "Notes", 200),
            ],
            windows: vec![
                WindowInfo::new(10, "com.acme.chat", "Inbox", true),
                WindowInfo::new(11, "com.acme.chat", "Call", true),
                WindowInfo::new(20, "com.acme.notes", "Todo", true),
            ],
        }
    }

    #[test]
    fn window_ids_are_grouped_by_owner() {
        let content = sample();
        assert_eq!(content.window_ids_of("com.acme.chat"), BTreeSet::from([10, 11]));
        assert!(content.window_ids_of("com.acme.missing").is_empty());
    }

    #[test]
    fn fingerprint_ignores_titles() {
        let a = sample();
        let mut b = sample();
        b.windows[0].title = "Inbox (3)".to_string();
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_tracks_on_screen_flag() {
        let a = sample();
        let mut b = sample();
        b.windows[1].on_screen = false;
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
