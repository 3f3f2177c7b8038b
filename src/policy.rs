//! Hiding policy model
//!
//! The user's persisted choice of which applications and windows to omit
//! from the capture stream. `Policy` is a plain value: every mutation helper
//! takes `&self` and returns a new instance, so a `Arc<Policy>` handed to a
//! reader can never change underneath it.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::inventory::{ShareableContent, WindowId};

/// Persisted hiding configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Policy {
    /// Bundle identifiers of applications excluded from capture
    pub hidden_applications: BTreeSet<String>,

    /// Per-app subset of hidden windows. A non-empty entry for an app that is
    /// also in `hidden_applications` narrows hiding to just these windows.
    /// Entries for apps not in `hidden_applications` have no effect.
    pub hidden_windows_by_app: BTreeMap<String, BTreeSet<WindowId>>,

    /// Omit the pointer from captured frames
    pub hide_cursor: bool,

    /// Show this application in the Dock and app switcher (not capture-affecting)
    pub show_own_window: bool,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            hidden_applications: BTreeSet::new(),
            hidden_windows_by_app: BTreeMap::new(),
            hide_cursor: false,
            show_own_window: true,
        }
    }
}

/// Result of [`Policy::sanitized_against`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sanitized {
    pub policy: Policy,
    /// True when at least one stale window id was removed
    pub changed: bool,
}

impl Policy {
    pub fn is_app_hidden(&self, app_id: &str) -> bool {
        self.hidden_applications.contains(app_id)
    }

    /// Specific hidden windows of `app_id`, if hiding is narrowed for it
    pub fn hidden_windows_for(&self, app_id: &str) -> Option<&BTreeSet<WindowId>> {
        self.hidden_windows_by_app.get(app_id).filter(|set| !set.is_empty())
    }

    /// Whether `app_id` is hidden in its entirety
    pub fn is_app_fully_hidden(&self, app_id: &str) -> bool {
        self.is_app_hidden(app_id) && self.hidden_windows_for(app_id).is_none()
    }

    /// Effective visibility of one window under this policy
    pub fn is_window_hidden(&self, app_id: &str, window_id: WindowId) -> bool {
        if !self.is_app_hidden(app_id) {
            return false;
        }
        match self.hidden_windows_for(app_id) {
            Some(subset) => subset.contains(&window_id),
            None => true,
        }
    }

    pub fn with_app_hidden(&self, app_id: &str) -> Self {
        let mut next = self.clone();
        next.hidden_applications.insert(app_id.to_string());
        next
    }

    /// Un-hide an app entirely, dropping any per-window narrowing for it
    pub fn with_app_visible(&self, app_id: &str) -> Self {
        let mut next = self.clone();
        next.hidden_applications.remove(app_id);
        next.hidden_windows_by_app.remove(app_id);
        next
    }

    pub fn toggled_app(&self, app_id: &str) -> Self {
        if self.is_app_hidden(app_id) {
            self.with_app_visible(app_id)
        } else {
            self.with_app_hidden(app_id)
        }
    }

    /// Hide one window. The owning app is marked hidden so the entry takes
    /// effect; if the app was previously hidden whole, it stays narrowed to
    /// this window from now on.
    pub fn with_window_hidden(&self, app_id: &str, window_id: WindowId) -> Self {
        let mut next = self.clone();
        next.hidden_applications.insert(app_id.to_string());
        next.hidden_windows_by_app
            .entry(app_id.to_string())
            .or_default()
            .insert(window_id);
        next
    }

    /// Show one window again. When the last narrowed window is removed the
    /// app stops being hidden at all, rather than silently widening to
    /// whole-app hiding.
    pub fn with_window_visible(&self, app_id: &str, window_id: WindowId) -> Self {
        let mut next = self.clone();
        let now_empty = match next.hidden_windows_by_app.get_mut(app_id) {
            Some(set) => {
                set.remove(&window_id);
                set.is_empty()
            }
            None => return next,
        };
        if now_empty {
            next.hidden_windows_by_app.remove(app_id);
            next.hidden_applications.remove(app_id);
        }
        next
    }

    pub fn toggled_window(&self, app_id: &str, window_id: WindowId) -> Self {
        let narrowed = self
            .hidden_windows_for(app_id)
            .map(|set| set.contains(&window_id))
            .unwrap_or(false);
        if narrowed {
            self.with_window_visible(app_id, window_id)
        } else {
            self.with_window_hidden(app_id, window_id)
        }
    }

    pub fn with_hide_cursor(&self, hide_cursor: bool) -> Self {
        Self {
            hide_cursor,
            ..self.clone()
        }
    }

    pub fn with_show_own_window(&self, show_own_window: bool) -> Self {
        Self {
            show_own_window,
            ..self.clone()
        }
    }

    /// Drop window ids that no longer exist for their app in `content`.
    ///
    /// Ids are recycled by the OS, so an id is only kept while the same app
    /// still owns a window with it. This is stricter than keeping every id
    /// present anywhere in the snapshot: an id now owned by a different app
    /// is dropped. Entries that become empty are removed, which is equivalent
    /// to whole-app hiding for a still-hidden app.
    pub fn sanitized_against(&self, content: &ShareableContent) -> Sanitized {
        let mut changed = false;
        let mut pruned = BTreeMap::new();

        for (app_id, ids) in &self.hidden_windows_by_app {
            let live = content.window_ids_of(app_id);
            let kept: BTreeSet<WindowId> = ids.intersection(&live).copied().collect();
            if kept.is_empty() {
                // Removing the entry is a change even if it was already empty
                changed = true;
                continue;
            }
            if kept.len() != ids.len() {
                changed = true;
            }
            pruned.insert(app_id.clone(), kept);
        }

        if !changed {
            return Sanitized {
                policy: self.clone(),
                changed: false,
            };
        }

        Sanitized {
            policy: Policy {
                hidden_windows_by_app: pruned,
                ..self.clone()
            },
            changed: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::{AppInfo, WindowInfo};

    fn content_with(windows: &[(WindowId, &str)]) -> ShareableContent {
        ShareableContent {
            displays: Vec::new(),
            applications: vec![AppInfo::new("X", "X", 1)],
            windows: windows
                .iter()
                .map(|(id, app)| WindowInfo::new(*id, *app, "", true))
                .collect(),
        }
    }

    #[test]
    fn default_policy_hides_nothing() {
        let policy = Policy::default();
        assert!(policy.hidden_applications.is_empty());
        assert!(!policy.hide_cursor);
        assert!(policy.show_own_window);
        assert!(!policy.is_window_hidden("com.acme.chat", 1));
    }

    #[test]
    fn mutation_returns_new_value() {
        let original = Policy::default();
        let hidden = original.with_app_hidden("com.acme.chat");
        assert!(!original.is_app_hidden("com.acme.chat"));
        assert!(hidden.is_app_hidden("com.acme.chat"));
    }

    #[test]
    fn whole_app_hiding_hides_every_window() {
        let policy = Policy::default().with_app_hidden("com.acme.chat");
        assert!(policy.is_app_fully_hidden("com.acme.chat"));
        assert!(policy.is_window_hidden("com.acme.chat", 10));
        assert!(policy.is_window_hidden("com.acme.chat", 11));
    }

    #[test]
    fn per_window_hiding_narrows_to_subset() {
        let policy = Policy::default().with_window_hidden("com.acme.chat", 10);
        assert!(policy.is_app_hidden("com.acme.chat"));
        assert!(!policy.is_app_fully_hidden("com.acme.chat"));
        assert!(policy.is_window_hidden("com.acme.chat", 10));
        assert!(!policy.is_window_hidden("com.acme.chat", 11));
    }

    #[test]
    fn window_entry_without_hidden_app_has_no_effect() {
        let mut policy = Policy::default();
        policy
            .hidden_windows_by_app
            .insert("com.acme.chat".to_string(), BTreeSet::from([10]));
        assert!(!policy.is_window_hidden("com.acme.chat", 10));
    }

    #[test]
    fn showing_last_window_unhides_app() {
        let policy = Policy::default()
            .with_window_hidden("com.acme.chat", 10)
            .with_window_visible("com.acme.chat", 10);
        assert!(!policy.is_app_hidden("com.acme.chat"));
        assert!(policy.hidden_windows_by_app.is_empty());
    }

    #[test]
    fn toggling_app_clears_window_subset() {
        let policy = Policy::default()
            .with_window_hidden("com.acme.chat", 10)
            .toggled_app("com.acme.chat");
        assert!(!policy.is_app_hidden("com.acme.chat"));
        assert!(!policy.hidden_windows_by_app.contains_key("com.acme.chat"));
    }

    #[test]
    fn toggled_window_round_trips() {
        let base = Policy::default().with_window_hidden("com.acme.chat", 10);
        let toggled = base.toggled_window("com.acme.chat", 11);
        assert!(toggled.is_window_hidden("com.acme.chat", 11));
        let back = toggled.toggled_window("com.acme.chat", 11);
        assert_eq!(back, base);
    }

    #[test]
    fn sanitize_keeps_only_live_ids() {
        let mut policy = Policy::default().with_app_hidden("X");
        policy
            .hidden_windows_by_app
            .insert("X".to_string(), BTreeSet::from([1, 2, 3]));

        let content = content_with(&[(2, "X"), (4, "X")]);
        let first = policy.sanitized_against(&content);
        assert!(first.changed);
        assert_eq!(first.policy.hidden_windows_by_app["X"], BTreeSet::from([2]));

        let second = first.policy.sanitized_against(&content);
        assert!(!second.changed);
        assert_eq!(second.policy, first.policy);
    }

    #[test]
    fn sanitize_ignores_ids_owned_by_other_apps() {
        let mut policy = Policy::default().with_app_hidden("X");
        policy
            .hidden_windows_by_app
            .insert("X".to_string(), BTreeSet::from([7]));

        let content = content_with(&[(7, "Y")]);
        let sanitized = policy.sanitized_against(&content);
        assert!(sanitized.changed);
        assert!(!sanitized.policy.hidden_windows_by_app.contains_key("X"));
        assert!(sanitized.policy.is_app_fully_hidden("X"));
    }

    #[test]
    fn sanitize_drops_empty_entries() {
        let mut policy = Policy::default();
        policy
            .hidden_windows_by_app
            .insert("X".to_string(), BTreeSet::new());
        let sanitized = policy.sanitized_against(&content_with(&[]));
        assert!(sanitized.changed);
        assert!(sanitized.policy.hidden_windows_by_app.is_empty());
    }

    #[test]
    fn sanitize_is_noop_without_window_entries() {
        let policy = Policy::default().with_app_hidden("X").with_hide_cursor(true);
        let sanitized = policy.sanitized_against(&content_with(&[(1, "X")]));
        assert!(!sanitized.changed);
        assert_eq!(sanitized.policy, policy);
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let policy = Policy::default().with_window_hidden("X", 3);
        let value = serde_json::to_value(&policy).unwrap();
        assert_eq!(value["hiddenApplications"], serde_json::json!(["X"]));
        assert_eq!(value["hiddenWindowsByApp"]["X"], serde_json::json!([3]));
        assert_eq!(value["hideCursor"], serde_json::json!(false));
        assert_eq!(value["showOwnWindow"], serde_json::json!(true));
    }

    #[test]
    fn missing_fields_decode_to_defaults() {
        let policy: Policy = serde_json::from_str(r#"{"hideCursor": true}"#).unwrap();
        assert!(policy.hide_cursor);
        assert!(policy.show_own_window);
        assert!(policy.hidden_applications.is_empty());
    }
}
