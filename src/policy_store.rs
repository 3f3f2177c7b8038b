//! Policy persistence and change broadcast
//!
//! `PolicyStore` owns the current [`Policy`] value, persists it through a
//! [`PolicyMedium`] and fans every successful save out to independent
//! subscriptions. Each change carries a [`ChangeOrigin`] so consumers can tell
//! user edits apart from the controller's own pruning write-backs.
//!
//! Reads never fail the caller: [`PolicyStore::load`] degrades to the default
//! policy on any read or decode error. Saves report their failures.
//!
//! The medium may be shared with other processes. [`PolicyStore::reload`]
//! (driven periodically by [`MediumPoller`]) publishes edits found there with
//! [`ChangeOrigin::External`].

use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config;
use crate::error::StoreError;
use crate::policy::Policy;

/// Who produced a policy change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// An explicit edit (CLI, settings surface)
    User,
    /// Stale-id pruning written back by the live session controller
    Sanitizer,
    /// Found on the medium by a reload; written by someone else
    External,
}

/// A successfully saved policy
#[derive(Debug, Clone)]
pub struct PolicyChange {
    pub policy: Arc<Policy>,
    pub origin: ChangeOrigin,
}

/// Backing storage for the serialized policy record
pub trait PolicyMedium: Send + Sync {
    /// Current contents, or `None` if nothing has been written yet
    fn read(&self) -> Result<Option<String>, StoreError>;

    /// Replace the contents
    fn write(&self, contents: &str) -> Result<(), StoreError>;

    /// Human-readable location, for logs
    fn describe(&self) -> String;
}

/// JSON file on disk. Writes go to a sibling temp file that is then renamed
/// over the target, so readers see either the old or the new record.
#[derive(Debug, Clone)]
pub struct JsonFileMedium {
    path: PathBuf,
}

impl JsonFileMedium {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl PolicyMedium for JsonFileMedium {
    fn read(&self) -> Result<Option<String>, StoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, contents: &str) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let temp = self.temp_path();
        std::fs::write(&temp, contents)?;
        std::fs::rename(&temp, &self.path)?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-memory medium for tests and ephemeral runs
#[derive(Debug, Default)]
pub struct MemoryMedium {
    contents: Mutex<Option<String>>,
    fail_writes: Mutex<Option<String>>,
}

impl MemoryMedium {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contents(contents: impl Into<String>) -> Self {
        Self {
            contents: Mutex::new(Some(contents.into())),
            fail_writes: Mutex::new(None),
        }
    }

    /// Make every subsequent write fail with `message` (`None` to recover)
    pub fn fail_writes(&self, message: Option<&str>) {
        *self.fail_writes.lock().unwrap() = message.map(str::to_string);
    }

    pub fn contents(&self) -> Option<String> {
        self.contents.lock().unwrap().clone()
    }
}

impl PolicyMedium for MemoryMedium {
    fn read(&self) -> Result<Option<String>, StoreError> {
        Ok(self.contents.lock().unwrap().clone())
    }

    fn write(&self, contents: &str) -> Result<(), StoreError> {
        if let Some(message) = self.fail_writes.lock().unwrap().as_ref() {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                message.clone(),
            )));
        }
        *self.contents.lock().unwrap() = Some(contents.to_string());
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

impl<M: PolicyMedium + ?Sized> PolicyMedium for Arc<M> {
    fn read(&self) -> Result<Option<String>, StoreError> {
        (**self).read()
    }

    fn write(&self, contents: &str) -> Result<(), StoreError> {
        (**self).write(contents)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Independent stream of policy changes. Dropping it unsubscribes.
#[derive(Debug)]
pub struct PolicySubscription {
    rx: mpsc::UnboundedReceiver<PolicyChange>,
}

impl PolicySubscription {
    /// Next change, in save order. `None` once the store is gone.
    pub async fn recv(&mut self) -> Option<PolicyChange> {
        self.rx.recv().await
    }

    /// Next change if one is already queued
    pub fn try_recv(&mut self) -> Option<PolicyChange> {
        self.rx.try_recv().ok()
    }
}

pub struct PolicyStore {
    medium: Box<dyn PolicyMedium>,
    current: Mutex<Arc<Policy>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<PolicyChange>>>,
    // Serializes write + publish so subscribers observe saves in write order
    save_lock: Mutex<()>,
}

impl std::fmt::Debug for PolicyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyStore")
            .field("medium", &self.medium.describe())
            .field("current", &self.current())
            .finish()
    }
}

impl PolicyStore {
    /// Open a store over `medium`, loading whatever it holds
    pub fn new(medium: impl PolicyMedium + 'static) -> Self {
        let store = Self {
            medium: Box::new(medium),
            current: Mutex::new(Arc::new(Policy::default())),
            subscribers: Mutex::new(Vec::new()),
            save_lock: Mutex::new(()),
        };
        store.load();
        store
    }

    /// Store backed by `<dir>/configuration.json`
    pub fn open_in(dir: &Path) -> Self {
        Self::new(JsonFileMedium::new(dir.join(config::storage::POLICY_FILE_NAME)))
    }

    /// Store backed by the policy file in the platform config directory
    pub fn open_default() -> Result<Self, StoreError> {
        let dir = config::storage::config_dir().ok_or(StoreError::NoConfigDir)?;
        Ok(Self::open_in(&dir))
    }

    /// Read and decode the persisted policy, reporting failures
    pub fn try_load(&self) -> Result<Policy, StoreError> {
        let Some(raw) = self.medium.read()? else {
            return Ok(Policy::default());
        };
        decode_policy(&raw)
    }

    /// Reload the persisted policy. Any failure yields the default policy.
    /// The result becomes [`current`](Self::current); subscribers are not
    /// notified.
    pub fn load(&self) -> Arc<Policy> {
        let policy = match self.try_load() {
            Ok(policy) => policy,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    medium = %self.medium.describe(),
                    "Failed to load policy, using defaults"
                );
                Policy::default()
            }
        };
        let policy = Arc::new(policy);
        *self.current.lock().unwrap() = Arc::clone(&policy);
        policy
    }

    /// Where the policy is persisted, for messages
    pub fn describe(&self) -> String {
        self.medium.describe()
    }

    /// Last loaded or saved policy
    pub fn current(&self) -> Arc<Policy> {
        Arc::clone(&self.current.lock().unwrap())
    }

    /// Persist a user-originated policy
    pub fn save(&self, policy: Policy) -> Result<Arc<Policy>, StoreError> {
        self.save_with_origin(policy, ChangeOrigin::User)
    }

    /// Persist `policy` and notify every live subscription. On failure the
    /// current policy is left unchanged and nobody is notified.
    pub fn save_with_origin(
        &self,
        policy: Policy,
        origin: ChangeOrigin,
    ) -> Result<Arc<Policy>, StoreError> {
        let _guard = self.save_lock.lock().unwrap();
        self.write_and_publish(policy, origin)
    }

    /// Save `policy` only if the persisted policy still equals `expected`.
    /// Returns `Ok(None)` when another save got there first, in this process
    /// or in another one writing the same medium.
    pub fn save_if_current(
        &self,
        expected: &Policy,
        policy: Policy,
        origin: ChangeOrigin,
    ) -> Result<Option<Arc<Policy>>, StoreError> {
        let _guard = self.save_lock.lock().unwrap();
        let persisted = match self.try_load() {
            Ok(persisted) => Arc::new(persisted),
            Err(e) => {
                tracing::debug!(error = %e, "Policy unreadable, comparing against last known");
                self.current()
            }
        };
        if *persisted != *expected || *self.current() != *expected {
            return Ok(None);
        }
        self.write_and_publish(policy, origin).map(Some)
    }

    /// Re-read the medium and publish its policy with
    /// [`ChangeOrigin::External`] if it differs from [`current`](Self::current).
    /// Returns the new policy, or `None` when nothing changed.
    pub fn reload(&self) -> Result<Option<Arc<Policy>>, StoreError> {
        let _guard = self.save_lock.lock().unwrap();
        let persisted = self.try_load()?;
        if persisted == *self.current() {
            return Ok(None);
        }
        let policy = Arc::new(persisted);
        *self.current.lock().unwrap() = Arc::clone(&policy);
        self.publish(&policy, ChangeOrigin::External);
        Ok(Some(policy))
    }

    fn write_and_publish(&self, policy: Policy, origin: ChangeOrigin) -> Result<Arc<Policy>, StoreError> {
        let existing = match self.medium.read() {
            Ok(raw) => raw,
            Err(e) => {
                tracing::debug!(error = %e, "Existing policy unreadable, not preserving extra keys");
                None
            }
        };
        let encoded = encode_policy(&policy, existing.as_deref())?;
        self.medium.write(&encoded)?;

        let policy = Arc::new(policy);
        *self.current.lock().unwrap() = Arc::clone(&policy);
        self.publish(&policy, origin);
        Ok(policy)
    }

    fn publish(&self, policy: &Arc<Policy>, origin: ChangeOrigin) {
        let change = PolicyChange {
            policy: Arc::clone(policy),
            origin,
        };
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|tx| tx.send(change.clone()).is_ok());

        tracing::debug!(
            ?origin,
            hidden_apps = policy.hidden_applications.len(),
            subscribers = subscribers.len(),
            "Published policy"
        );
    }

    /// Derive a new policy from the current one and save it. The read and
    /// the write happen under the save lock, so concurrent updates compose.
    pub fn update<F>(&self, f: F) -> Result<Arc<Policy>, StoreError>
    where
        F: FnOnce(&Policy) -> Policy,
    {
        let _guard = self.save_lock.lock().unwrap();
        let next = f(&self.current());
        self.write_and_publish(next, ChangeOrigin::User)
    }

    pub fn subscribe(&self) -> PolicySubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap().push(tx);
        PolicySubscription { rx }
    }

    /// Number of subscriptions that have not been observed as dropped yet
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|tx| !tx.is_closed());
        subscribers.len()
    }
}

/// Periodically [`reload`](PolicyStore::reload)s a store so edits made by
/// other processes reach its subscribers. Dropping it stops polling.
#[derive(Debug)]
pub struct MediumPoller {
    task: JoinHandle<()>,
}

impl MediumPoller {
    /// Must be called inside a tokio runtime
    pub fn spawn(store: Arc<PolicyStore>, interval: Duration) -> Self {
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match store.reload() {
                    Ok(Some(_)) => tracing::info!(medium = %store.describe(), "Policy changed on disk"),
                    Ok(None) => {}
                    Err(e) => tracing::debug!(error = %e, "Policy reload failed"),
                }
            }
        });
        Self { task }
    }
}

impl Drop for MediumPoller {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Decode a persisted policy record, normalising legacy and loosely typed
/// values first.
pub fn decode_policy(raw: &str) -> Result<Policy, StoreError> {
    let mut value: Value =
        serde_json::from_str(raw).map_err(|e| StoreError::Decode(e.to_string()))?;
    normalize_policy_json(&mut value);
    serde_json::from_value(value).map_err(|e| StoreError::Decode(e.to_string()))
}

/// Serialize `policy`, keeping top-level keys of `existing` that the policy
/// record does not own.
fn encode_policy(policy: &Policy, existing: Option<&str>) -> Result<String, StoreError> {
    let new_value = serde_json::to_value(policy).map_err(|e| StoreError::Encode(e.to_string()))?;

    let mut merged = existing
        .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
        .filter(Value::is_object)
        .unwrap_or_else(|| Value::Object(Default::default()));

    if let (Value::Object(base), Value::Object(overlay)) = (&mut merged, new_value) {
        base.remove(LEGACY_OWN_WINDOW_KEY);
        // Policy keys are replaced whole; merging the window map would
        // resurrect pruned ids.
        for (k, v) in overlay {
            base.insert(k, v);
        }
    }

    serde_json::to_string_pretty(&merged).map_err(|e| StoreError::Encode(e.to_string()))
}

const LEGACY_OWN_WINDOW_KEY: &str = "showDockIcon";

/// Bring a loosely typed policy document into the shape `Policy` decodes.
///
/// - non-object documents become `{}`
/// - `showDockIcon` is migrated to `showOwnWindow`
/// - non-string app ids are dropped
/// - window ids given as numeric strings are converted, other ids dropped
/// - fields of the wrong type are removed so their defaults apply
pub fn normalize_policy_json(value: &mut Value) {
    if !value.is_object() {
        *value = Value::Object(Default::default());
    }
    let Value::Object(obj) = value else {
        return;
    };

    if let Some(legacy) = obj.remove(LEGACY_OWN_WINDOW_KEY) {
        if !obj.contains_key("showOwnWindow") {
            obj.insert("showOwnWindow".to_string(), legacy);
        }
    }

    for flag in ["hideCursor", "showOwnWindow"] {
        if obj.get(flag).map_or(false, |v| !v.is_boolean()) {
            obj.remove(flag);
        }
    }

    match obj.get_mut("hiddenApplications") {
        Some(Value::Array(apps)) => apps.retain(Value::is_string),
        Some(_) => {
            obj.remove("hiddenApplications");
        }
        None => {}
    }

    match obj.get_mut("hiddenWindowsByApp") {
        Some(Value::Object(map)) => {
            map.retain(|_, ids| ids.is_array());
            for ids in map.values_mut() {
                if let Value::Array(items) = ids {
                    let normalized: Vec<Value> =
                        items.iter().filter_map(normalize_window_id).collect();
                    *items = normalized;
                }
            }
        }
        Some(_) => {
            obj.remove("hiddenWindowsByApp");
        }
        None => {}
    }
}

fn normalize_window_id(value: &Value) -> Option<Value> {
    let id = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }?;
    u32::try_from(id).ok().map(Value::from)
}
