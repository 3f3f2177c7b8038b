use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};

use windowcloak_capture::config;
use windowcloak_capture::policy::Policy;
use windowcloak_capture::policy_store::{ChangeOrigin, JsonFileMedium, PolicyStore};

struct TempDir {
    path: PathBuf,
}

impl TempDir {
    fn new(label: &str) -> Self {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let mut path = std::env::temp_dir();
        path.push(format!("windowcloak_test_{}_{}_{}", label, std::process::id(), nanos));
        fs::create_dir_all(&path).unwrap();
        Self { path }
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

fn policy_path(dir: &Path) -> PathBuf {
    dir.join(config::storage::POLICY_FILE_NAME)
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn missing_file_loads_defaults_without_creating_it() {
    let temp = TempDir::new("policy_missing");
    let store = PolicyStore::open_in(&temp.path);

    assert_eq!(*store.current(), Policy::default());
    assert!(store.try_load().is_ok());
    assert!(!policy_path(&temp.path).exists());
}

#[test]
fn saved_policy_survives_reopen() {
    let temp = TempDir::new("policy_reopen");
    let store = PolicyStore::open_in(&temp.path);
    store
        .update(|p| p.with_window_hidden("com.acme.chat", 10).with_hide_cursor(true))
        .unwrap();
    drop(store);

    let reopened = PolicyStore::open_in(&temp.path);
    let policy = reopened.current();
    assert!(policy.is_window_hidden("com.acme.chat", 10));
    assert!(!policy.is_window_hidden("com.acme.chat", 11));
    assert!(policy.hide_cursor);
}

#[test]
fn file_uses_camel_case_keys() {
    let temp = TempDir::new("policy_keys");
    let store = PolicyStore::open_in(&temp.path);
    store.update(|p| p.with_app_hidden("com.acme.chat")).unwrap();

    let written = read_json(&policy_path(&temp.path));
    assert_eq!(written["hiddenApplications"], json!(["com.acme.chat"]));
    assert_eq!(written["hiddenWindowsByApp"], json!({}));
    assert_eq!(written["hideCursor"], json!(false));
    assert_eq!(written["showOwnWindow"], json!(true));
}

#[test]
fn hand_edited_file_is_normalized_and_extra_keys_kept() {
    let temp = TempDir::new("policy_hand_edited");
    let path = policy_path(&temp.path);
    fs::write(
        &path,
        serde_json::to_string_pretty(&json!({
            "hiddenApplications": ["com.acme.chat", 7],
            "hiddenWindowsByApp": {"com.acme.chat": ["10", 11, "x"]},
            "showDockIcon": false,
            "theme": "dark"
        }))
        .unwrap(),
    )
    .unwrap();

    let store = PolicyStore::open_in(&temp.path);
    let policy = store.current();
    assert_eq!(policy.hidden_applications.len(), 1);
    assert_eq!(
        policy.hidden_windows_for("com.acme.chat").unwrap().iter().copied().collect::<Vec<_>>(),
        vec![10, 11]
    );
    assert!(!policy.show_own_window);

    store.update(|p| p.with_hide_cursor(true)).unwrap();
    let written = read_json(&path);
    assert_eq!(written["theme"], json!("dark"));
    assert_eq!(written["showOwnWindow"], json!(false));
    assert!(written.get("showDockIcon").is_none());
}

#[test]
fn corrupt_file_degrades_to_defaults() {
    let temp = TempDir::new("policy_corrupt");
    fs::write(policy_path(&temp.path), "{ not json").unwrap();

    let store = PolicyStore::open_in(&temp.path);
    assert_eq!(*store.current(), Policy::default());
    assert!(store.try_load().is_err());

    // Saving over a corrupt file replaces it with a valid record
    store.update(|p| p.with_app_hidden("com.acme.notes")).unwrap();
    let reopened = PolicyStore::open_in(&temp.path);
    assert!(reopened.current().is_app_hidden("com.acme.notes"));
}

#[test]
fn save_creates_missing_directories_and_leaves_no_temp_file() {
    let temp = TempDir::new("policy_nested");
    let dir = temp.path.join("nested").join("config");
    let medium = JsonFileMedium::new(policy_path(&dir));
    let store = PolicyStore::new(medium);

    store.save(Policy::default().with_app_hidden("com.acme.chat")).unwrap();

    assert!(policy_path(&dir).exists());
    let leftovers: Vec<_> = fs::read_dir(&dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn load_does_not_notify_but_save_does() {
    let temp = TempDir::new("policy_notify");
    let store = PolicyStore::open_in(&temp.path);
    let mut subscription = store.subscribe();

    store.load();
    assert!(subscription.try_recv().is_none());

    store
        .save_with_origin(Policy::default().with_hide_cursor(true), ChangeOrigin::Sanitizer)
        .unwrap();
    let change = subscription.try_recv().unwrap();
    assert_eq!(change.origin, ChangeOrigin::Sanitizer);
    assert!(change.policy.hide_cursor);
}

#[test]
fn external_edit_is_picked_up_by_load() {
    let temp = TempDir::new("policy_external");
    let store = PolicyStore::open_in(&temp.path);
    assert!(!store.current().is_app_hidden("com.acme.chat"));

    fs::write(
        policy_path(&temp.path),
        r#"{"hiddenApplications": ["com.acme.chat"]}"#,
    )
    .unwrap();
    let loaded = store.load();
    assert!(loaded.is_app_hidden("com.acme.chat"));
    assert!(store.current().is_app_hidden("com.acme.chat"));
}

#[test]
fn pruning_does_not_overwrite_another_writers_edit() {
    let temp = TempDir::new("policy_two_writers");
    let session = PolicyStore::open_in(&temp.path);
    session
        .update(|p| p.with_window_hidden("com.acme.chat", 10).with_window_hidden("com.acme.chat", 99))
        .unwrap();

    let cli = PolicyStore::open_in(&temp.path);
    cli.update(|p| p.with_app_hidden("com.acme.notes")).unwrap();

    // The session still holds its own copy and prunes the closed window
    let held = session.current();
    let pruned = held.with_window_visible("com.acme.chat", 99);
    let outcome = session
        .save_if_current(&held, pruned, ChangeOrigin::Sanitizer)
        .unwrap();
    assert!(outcome.is_none());

    let on_disk = PolicyStore::open_in(&temp.path).current();
    assert!(on_disk.is_app_hidden("com.acme.notes"));
    assert!(on_disk.is_window_hidden("com.acme.chat", 99));

    // After picking up the edit, pruning goes through and keeps it
    let reloaded = session.reload().unwrap().unwrap();
    let pruned = reloaded.with_window_visible("com.acme.chat", 99);
    assert!(session
        .save_if_current(&reloaded, pruned, ChangeOrigin::Sanitizer)
        .unwrap()
        .is_some());
    let on_disk = PolicyStore::open_in(&temp.path).current();
    assert!(on_disk.is_app_hidden("com.acme.notes"));
    assert!(on_disk.is_window_hidden("com.acme.chat", 10));
    assert!(!on_disk.is_window_hidden("com.acme.chat", 99));
}

#[test]
fn reload_reports_external_edits() {
    let temp = TempDir::new("policy_reload");
    let store = PolicyStore::open_in(&temp.path);
    let mut subscription = store.subscribe();

    fs::write(policy_path(&temp.path), r#"{"hideCursor": true}"#).unwrap();
    let reloaded = store.reload().unwrap().unwrap();
    assert!(reloaded.hide_cursor);

    let change = subscription.try_recv().unwrap();
    assert_eq!(change.origin, ChangeOrigin::External);
    assert!(store.reload().unwrap().is_none());
}
