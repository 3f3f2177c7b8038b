//! Live session controller
//!
//! Owns the active capture session and keeps its exclusion filter current.
//! `start`, `stop` and `refresh` are async and serialized by an operation
//! lock; a refresh that is overtaken by a newer request before it reaches the
//! backend returns [`RefreshOutcome::Superseded`] instead of swapping.
//!
//! Before every filter build the policy is sanitized against the fresh
//! inventory. Pruned policies are used immediately and written back to the
//! store tagged [`ChangeOrigin::Sanitizer`].

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc};

use crate::capture::{
    CaptureBackend, CaptureFrame, CaptureTarget, SessionDelegate, SessionId, StreamConfig,
    StreamOptions,
};
use crate::config;
use crate::error::{CaptureError, SessionError};
use crate::inventory::{DisplayInfo, ShareableContent};
use crate::policy::Policy;
use crate::policy_store::{ChangeOrigin, PolicyStore};
use crate::window_filter::{build_exclusion_filter, ExclusionFilter};

/// Controller lifecycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum SessionState {
    #[default]
    Idle,
    Starting,
    Running,
    Stopping,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value = match self {
            SessionState::Idle => "idle",
            SessionState::Starting => "starting",
            SessionState::Running => "running",
            SessionState::Stopping => "stopping",
        };
        write!(f, "{}", value)
    }
}

/// Notifications for UI and other observers
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    StateChanged(SessionState),
    /// A filter reached the backend, on start or refresh
    FilterApplied {
        generation: u64,
        excluded_apps: usize,
        excepted_windows: usize,
    },
    Failed(SessionError),
}

/// Result of a successful [`LiveSessionController::refresh`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The filter was swapped. `pruned` is set when stale window ids were
    /// dropped from the policy.
    Applied { generation: u64, pruned: bool },
    /// A newer refresh was requested first; nothing was applied
    Superseded,
}

/// Position of a requested refresh; only the newest ticket applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RefreshTicket {
    generation: u64,
}

impl RefreshTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FrameStats {
    pub delivered: u64,
    /// Frames dropped because the consumer fell `queue_depth` frames behind
    pub dropped: u64,
}

pub type FrameReceiver = mpsc::Receiver<CaptureFrame>;

#[derive(Default)]
struct Core {
    state: SessionState,
    session: Option<SessionId>,
    display: Option<DisplayInfo>,
    filter: Option<ExclusionFilter>,
    last_applied: Option<Arc<Policy>>,
    last_error: Option<SessionError>,
    frames_tx: Option<mpsc::Sender<CaptureFrame>>,
    frames_rx: Option<FrameReceiver>,
}

impl Core {
    fn release_session(&mut self) {
        self.session = None;
        self.display = None;
        self.filter = None;
        self.last_applied = None;
        self.frames_tx = None;
        self.frames_rx = None;
    }
}

/// State shared with the backend through a `Weak<dyn SessionDelegate>`
struct Shared {
    core: Mutex<Core>,
    events: broadcast::Sender<ControllerEvent>,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl Shared {
    fn emit(&self, event: ControllerEvent) {
        let _ = self.events.send(event);
    }

    fn set_state(&self, core: &mut Core, state: SessionState) {
        if core.state != state {
            tracing::debug!(from = %core.state, to = %state, "Session state changed");
            core.state = state;
            self.emit(ControllerEvent::StateChanged(state));
        }
    }

    fn fail(&self, core: &mut Core, err: SessionError) {
        core.release_session();
        core.last_error = Some(err.clone());
        self.emit(ControllerEvent::Failed(err));
        self.set_state(core, SessionState::Idle);
    }
}

impl SessionDelegate for Shared {
    fn frame_delivered(&self, session: SessionId, frame: CaptureFrame) {
        let core = self.core.lock().unwrap();
        let current = match core.session {
            Some(id) => id == session,
            // Frames can arrive before start_session returns the id
            None => core.state == SessionState::Starting,
        };
        if !current {
            return;
        }
        let Some(tx) = core.frames_tx.as_ref() else {
            return;
        };
        match tx.try_send(frame) {
            Ok(()) => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }

    fn session_stopped(&self, session: SessionId, error: CaptureError) {
        let mut core = self.core.lock().unwrap();
        if core.session != Some(session) || core.state != SessionState::Running {
            tracing::debug!(session, error = %error, "Ignoring stop notice for inactive session");
            return;
        }
        tracing::error!(session, error = %error, "Capture session stopped by backend");
        self.fail(&mut core, session_failure(error));
    }
}

/// Map a failure of a running session to the user-facing taxonomy
fn session_failure(err: CaptureError) -> SessionError {
    match err {
        CaptureError::PermissionDenied => SessionError::PermissionDenied,
        CaptureError::Backend(msg) => SessionError::Backend(msg),
        other => SessionError::Backend(other.to_string()),
    }
}

fn pick_display(content: &ShareableContent, display_id: Option<u32>) -> Result<DisplayInfo, SessionError> {
    match display_id {
        Some(id) => content
            .display(id)
            .cloned()
            .ok_or_else(|| SessionError::NoTarget(format!("Display {} is not available.", id))),
        None => content
            .displays
            .first()
            .cloned()
            .ok_or_else(|| CaptureError::NoDisplayAvailable.into()),
    }
}

struct OpenedSession {
    session: SessionId,
    display: DisplayInfo,
    filter: ExclusionFilter,
    policy: Arc<Policy>,
    pruned: bool,
}

pub struct LiveSessionController<B: CaptureBackend> {
    backend: Arc<B>,
    store: Option<Arc<PolicyStore>>,
    self_app_id: String,
    options: StreamOptions,
    shared: Arc<Shared>,
    op_lock: tokio::sync::Mutex<()>,
    // Bumped on every refresh/stop request; a refresh only applies while it
    // still holds the latest value
    requested: AtomicU64,
}

impl<B: CaptureBackend> LiveSessionController<B> {
    pub fn new(backend: Arc<B>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            backend,
            store: None,
            self_app_id: config::identity::self_app_id(),
            options: StreamOptions::default(),
            shared: Arc::new(Shared {
                core: Mutex::new(Core::default()),
                events,
                delivered: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
            op_lock: tokio::sync::Mutex::new(()),
            requested: AtomicU64::new(0),
        }
    }

    /// Write pruned policies back to `store`
    pub fn with_store(mut self, store: Arc<PolicyStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_self_app_id(mut self, self_app_id: impl Into<String>) -> Self {
        self.self_app_id = self_app_id.into();
        self
    }

    pub fn with_stream_options(mut self, options: StreamOptions) -> Self {
        self.options = options;
        self
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn self_app_id(&self) -> &str {
        &self.self_app_id
    }

    pub fn state(&self) -> SessionState {
        self.shared.core.lock().unwrap().state
    }

    pub fn last_error(&self) -> Option<SessionError> {
        self.shared.core.lock().unwrap().last_error.clone()
    }

    pub fn active_display(&self) -> Option<DisplayInfo> {
        self.shared.core.lock().unwrap().display.clone()
    }

    /// Filter most recently applied to the running session
    pub fn applied_filter(&self) -> Option<ExclusionFilter> {
        self.shared.core.lock().unwrap().filter.clone()
    }

    /// Sanitized policy behind [`applied_filter`](Self::applied_filter)
    pub fn last_applied_policy(&self) -> Option<Arc<Policy>> {
        self.shared.core.lock().unwrap().last_applied.clone()
    }

    pub fn events(&self) -> broadcast::Receiver<ControllerEvent> {
        self.shared.events.subscribe()
    }

    /// Frame stream of the current session. Available once per session.
    pub fn take_frames(&self) -> Option<FrameReceiver> {
        self.shared.core.lock().unwrap().frames_rx.take()
    }

    pub fn frame_stats(&self) -> FrameStats {
        FrameStats {
            delivered: self.shared.delivered.load(Ordering::Relaxed),
            dropped: self.shared.dropped.load(Ordering::Relaxed),
        }
    }

    /// Start capturing the first available display under `policy`
    pub async fn start(&self, policy: Arc<Policy>) -> Result<(), SessionError> {
        self.start_on(policy, None).await
    }

    /// Start capturing `display_id` (or the first display) under `policy`
    pub async fn start_on(&self, policy: Arc<Policy>, display_id: Option<u32>) -> Result<(), SessionError> {
        {
            let mut core = self.shared.core.lock().unwrap();
            match core.state {
                SessionState::Idle => {}
                SessionState::Starting => return Err(SessionError::StartInProgress),
                SessionState::Running => return Err(SessionError::AlreadyRunning),
                SessionState::Stopping => return Err(SessionError::StopInProgress),
            }
            self.shared.set_state(&mut core, SessionState::Starting);
        }

        let _op = self.op_lock.lock().await;
        let generation = self.requested.load(Ordering::SeqCst);
        self.shared.delivered.store(0, Ordering::Relaxed);
        self.shared.dropped.store(0, Ordering::Relaxed);

        let opened = match self.open_session(&policy, display_id).await {
            Ok(opened) => opened,
            Err(err) => {
                tracing::error!(error = %err, "Failed to start capture");
                let mut core = self.shared.core.lock().unwrap();
                self.shared.fail(&mut core, err.clone());
                return Err(err);
            }
        };

        tracing::info!(
            session = opened.session,
            display = opened.display.id,
            width = opened.display.width,
            height = opened.display.height,
            excluded = opened.filter.excluded_apps.len(),
            excepted = opened.filter.except_windows.len(),
            "Capture started"
        );

        let event = ControllerEvent::FilterApplied {
            generation,
            excluded_apps: opened.filter.excluded_apps.len(),
            excepted_windows: opened.filter.except_windows.len(),
        };
        {
            let mut core = self.shared.core.lock().unwrap();
            core.session = Some(opened.session);
            core.display = Some(opened.display);
            core.filter = Some(opened.filter);
            core.last_applied = Some(Arc::clone(&opened.policy));
            core.last_error = None;
            self.shared.set_state(&mut core, SessionState::Running);
        }
        self.shared.emit(event);

        if opened.pruned {
            self.write_back(&policy, &opened.policy);
        }
        Ok(())
    }

    async fn open_session(
        &self,
        policy: &Policy,
        display_id: Option<u32>,
    ) -> Result<OpenedSession, SessionError> {
        if !self.backend.permission_granted().await {
            return Err(SessionError::PermissionDenied);
        }

        let content = self.backend.shareable_content().await?;
        let display = pick_display(&content, display_id)?;
        let sanitized = policy.sanitized_against(&content);
        let filter = build_exclusion_filter(&content, &sanitized.policy, &self.self_app_id);
        let stream = StreamConfig::for_display(&display, &sanitized.policy, self.options);

        let (tx, rx) = mpsc::channel(stream.queue_depth);
        {
            let mut core = self.shared.core.lock().unwrap();
            core.frames_tx = Some(tx);
            core.frames_rx = Some(rx);
        }

        let delegate: Arc<dyn SessionDelegate> = self.shared.clone();
        let target = CaptureTarget {
            display: display.clone(),
        };
        let session = self
            .backend
            .start_session(&target, &filter, &stream, Arc::downgrade(&delegate))
            .await?;

        Ok(OpenedSession {
            session,
            display,
            filter,
            policy: Arc::new(sanitized.policy),
            pruned: sanitized.changed,
        })
    }

    /// Rebuild the filter from a fresh inventory and swap it into the running
    /// session without restarting it.
    pub async fn refresh(&self, policy: Arc<Policy>) -> Result<RefreshOutcome, SessionError> {
        let ticket = self.request_refresh()?;
        self.refresh_with(ticket, policy).await
    }

    /// Reserve a place in the refresh order. Callers that run the refresh
    /// later (e.g. on a spawned task) take the ticket first so that request
    /// order, not task scheduling order, decides which refresh wins.
    pub fn request_refresh(&self) -> Result<RefreshTicket, SessionError> {
        if self.state() != SessionState::Running {
            return Err(SessionError::NotStarted);
        }
        Ok(RefreshTicket {
            generation: self.requested.fetch_add(1, Ordering::SeqCst) + 1,
        })
    }

    /// Run a refresh reserved by [`request_refresh`](Self::request_refresh).
    /// Returns [`RefreshOutcome::Superseded`] if a newer ticket or a stop was
    /// requested in the meantime.
    pub async fn refresh_with(
        &self,
        ticket: RefreshTicket,
        policy: Arc<Policy>,
    ) -> Result<RefreshOutcome, SessionError> {
        let generation = ticket.generation;
        let _op = self.op_lock.lock().await;
        if self.is_superseded(generation) {
            tracing::debug!(generation, "Refresh superseded before start");
            return Ok(RefreshOutcome::Superseded);
        }

        let (session, display) = {
            let core = self.shared.core.lock().unwrap();
            match (core.state, core.session, core.display.clone()) {
                (SessionState::Running, Some(session), Some(display)) => (session, display),
                _ => return Err(SessionError::NotStarted),
            }
        };

        let content = self.backend.shareable_content().await.map_err(|e| {
            let err = SessionError::from(e);
            tracing::warn!(error = %err, "Inventory fetch failed during refresh");
            err
        })?;
        if self.is_superseded(generation) {
            tracing::debug!(generation, "Refresh superseded after inventory fetch");
            return Ok(RefreshOutcome::Superseded);
        }

        // Pick up resolution changes of the captured display
        let display = content.display(display.id).cloned().unwrap_or(display);
        let sanitized = policy.sanitized_against(&content);
        let filter = build_exclusion_filter(&content, &sanitized.policy, &self.self_app_id);
        let stream = StreamConfig::for_display(&display, &sanitized.policy, self.options);

        if let Err(e) = self.backend.update_session(session, &filter, &stream).await {
            return Err(self.refresh_failed(session, e));
        }

        let event = ControllerEvent::FilterApplied {
            generation,
            excluded_apps: filter.excluded_apps.len(),
            excepted_windows: filter.except_windows.len(),
        };
        let pruned = sanitized.changed;
        let applied = Arc::new(sanitized.policy);
        {
            let mut core = self.shared.core.lock().unwrap();
            if core.session != Some(session) || core.state != SessionState::Running {
                return Err(SessionError::NotStarted);
            }
            core.display = Some(display);
            core.filter = Some(filter);
            core.last_applied = Some(Arc::clone(&applied));
        }
        self.shared.emit(event);
        tracing::debug!(generation, pruned, "Filter refreshed");

        if pruned {
            self.write_back(&policy, &applied);
        }
        Ok(RefreshOutcome::Applied { generation, pruned })
    }

    fn is_superseded(&self, generation: u64) -> bool {
        self.requested.load(Ordering::SeqCst) != generation
    }

    fn refresh_failed(&self, session: SessionId, error: CaptureError) -> SessionError {
        let gone = error == CaptureError::SessionNotFound;
        let err = session_failure(error);
        let mut core = self.shared.core.lock().unwrap();
        if gone && core.session == Some(session) {
            tracing::error!(session, "Capture session vanished during refresh");
            self.shared.fail(&mut core, err.clone());
        } else {
            tracing::warn!(session, error = %err, "Filter update rejected by backend");
            core.last_error = Some(err.clone());
            self.shared.emit(ControllerEvent::Failed(err.clone()));
        }
        err
    }

    /// Persist a pruned policy unless the stored policy has moved on since
    /// `source` was read
    fn write_back(&self, source: &Policy, sanitized: &Arc<Policy>) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        match store.save_if_current(source, (**sanitized).clone(), ChangeOrigin::Sanitizer) {
            Ok(Some(_)) => tracing::info!("Pruned stale window ids from policy"),
            Ok(None) => tracing::debug!("Policy changed since refresh, pruned copy not saved"),
            Err(e) => tracing::warn!(error = %e, "Failed to save pruned policy"),
        }
    }

    /// Tear the running session down
    pub async fn stop(&self) -> Result<(), SessionError> {
        {
            let mut core = self.shared.core.lock().unwrap();
            if core.state != SessionState::Running {
                return Err(SessionError::NotStarted);
            }
            self.shared.set_state(&mut core, SessionState::Stopping);
        }
        // Queued refreshes must not touch the session being stopped
        self.requested.fetch_add(1, Ordering::SeqCst);

        let _op = self.op_lock.lock().await;
        let session = self.shared.core.lock().unwrap().session;
        let result = match session {
            Some(id) => self.backend.stop_session(id).await,
            None => Ok(()),
        };

        let mut core = self.shared.core.lock().unwrap();
        match result {
            Ok(()) | Err(CaptureError::SessionNotFound) => {
                core.release_session();
                self.shared.set_state(&mut core, SessionState::Idle);
                tracing::info!(session = ?session, "Capture stopped");
                Ok(())
            }
            Err(e) => {
                let err = session_failure(e);
                tracing::error!(error = %err, "Backend failed to stop capture");
                self.shared.fail(&mut core, err.clone());
                Err(err)
            }
        }
    }
}
