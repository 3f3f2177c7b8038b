//! Filter construction engine
//!
//! Turns a hiding [`Policy`] plus a fresh [`ShareableContent`] snapshot into
//! the exclusion filter handed to the capture backend. The backend primitive
//! is "exclude these apps, but allow these windows", so per-window hiding is
//! expressed by excluding the whole app and excepting its still-visible
//! windows.
//!
//! Everything here is a pure function of its inputs.

use serde::Serialize;
use std::collections::BTreeSet;

use crate::inventory::{ShareableContent, WindowId, WindowInfo};
use crate::policy::Policy;

/// Backend-facing exclusion filter
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExclusionFilter {
    /// Bundle identifiers whose windows are omitted from capture
    pub excluded_apps: BTreeSet<String>,
    /// Windows of excluded apps that must nonetheless stay visible
    pub except_windows: Vec<WindowInfo>,
}

impl ExclusionFilter {
    pub fn excludes_app(&self, app_id: &str) -> bool {
        self.excluded_apps.contains(app_id)
    }

    pub fn except_window_ids(&self) -> BTreeSet<WindowId> {
        self.except_windows.iter().map(|w| w.id).collect()
    }

    /// Whether `window` would appear in captured frames
    pub fn allows(&self, window: &WindowInfo) -> bool {
        !self.excludes_app(&window.app_id) || self.except_windows.iter().any(|w| w.id == window.id)
    }
}

/// Build the exclusion filter for `content` under `policy`.
///
/// `self_app_id` is always excluded so the capturing app never shows up in
/// its own output. Window ids in the policy that are missing from `content`
/// are ignored; pruning them is the controller's job.
pub fn build_exclusion_filter(
    content: &ShareableContent,
    policy: &Policy,
    self_app_id: &str,
) -> ExclusionFilter {
    let mut excluded_apps = policy.hidden_applications.clone();
    excluded_apps.insert(self_app_id.to_string());

    let mut except_windows = Vec::new();
    for window in &content.windows {
        if !excluded_apps.contains(&window.app_id) || !window.on_screen {
            continue;
        }
        // Narrowing is never honored for the self app
        if window.app_id == self_app_id {
            continue;
        }
        if let Some(hidden) = policy.hidden_windows_for(&window.app_id) {
            if !hidden.contains(&window.id) {
                except_windows.push(window.clone());
            }
        }
    }

    tracing::trace!(
        excluded = excluded_apps.len(),
        excepted = except_windows.len(),
        "Built exclusion filter"
    );

    ExclusionFilter {
        excluded_apps,
        except_windows,
    }
}

/// Presentation-only filter: on-screen windows of apps that are not fully
/// hidden. An app narrowed to some of its windows stays listed with all of
/// them, so a picker can still offer its hidden windows. Decoupled from the
/// backend filter shape.
pub fn visible_windows(windows: &[WindowInfo], policy: &Policy) -> Vec<WindowInfo> {
    windows
        .iter()
        .filter(|w| w.on_screen && !policy.is_app_fully_hidden(&w.app_id))
        .cloned()
        .collect()
}

/// On-screen windows that end up in captured frames under `policy`, judged
/// per window. Agrees with [`ExclusionFilter::allows`] for every app other
/// than our own.
pub fn captured_windows(windows: &[WindowInfo], policy: &Policy) -> Vec<WindowInfo> {
    windows
        .iter()
        .filter(|w| w.on_screen && !policy.is_window_hidden(&w.app_id, w.id))
        .cloned()
        .collect()
}
