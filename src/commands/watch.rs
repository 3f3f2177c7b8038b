use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast::error::RecvError;

use crate::app_bootstrap::Environment;
use crate::platform::{screen_capture_permission_granted, SystemInventory};
use windowcloak_capture::capture::{
    CaptureBackend, CaptureTarget, ContentSource, SessionDelegate, SessionId, StreamConfig,
};
use windowcloak_capture::capture_controller::{ControllerEvent, LiveSessionController, SessionState};
use windowcloak_capture::error::CaptureError;
use windowcloak_capture::inventory::ShareableContent;
use windowcloak_capture::policy_store::MediumPoller;
use windowcloak_capture::refresh_loop::spawn_refresh_loop;
use windowcloak_capture::window_filter::ExclusionFilter;

/// Backend that tracks sessions and filters against the real inventory but
/// produces no frames. Lets `watch` drive the controller end to end.
struct PreviewBackend {
    inventory: Arc<SystemInventory>,
    next_session: AtomicU64,
    current: std::sync::Mutex<Option<SessionId>>,
}

impl PreviewBackend {
    fn new(inventory: Arc<SystemInventory>) -> Self {
        Self {
            inventory,
            next_session: AtomicU64::new(1),
            current: std::sync::Mutex::new(None),
        }
    }

    fn check_session(&self, session: SessionId) -> Result<(), CaptureError> {
        match *self.current.lock().unwrap() {
            Some(current) if current == session => Ok(()),
            _ => Err(CaptureError::SessionNotFound),
        }
    }
}

#[async_trait]
impl ContentSource for PreviewBackend {
    async fn shareable_content(&self) -> Result<ShareableContent, CaptureError> {
        self.inventory.shareable_content().await
    }
}

#[async_trait]
impl CaptureBackend for PreviewBackend {
    async fn permission_granted(&self) -> bool {
        screen_capture_permission_granted()
    }

    async fn start_session(
        &self,
        target: &CaptureTarget,
        filter: &ExclusionFilter,
        config: &StreamConfig,
        _delegate: Weak<dyn SessionDelegate>,
    ) -> Result<SessionId, CaptureError> {
        let session = self.next_session.fetch_add(1, Ordering::SeqCst);
        *self.current.lock().unwrap() = Some(session);
        tracing::debug!(
            session,
            display = target.display.id,
            width = config.width,
            height = config.height,
            excluded = filter.excluded_apps.len(),
            "Preview session started"
        );
        Ok(session)
    }

    async fn update_session(
        &self,
        session: SessionId,
        filter: &ExclusionFilter,
        config: &StreamConfig,
    ) -> Result<(), CaptureError> {
        self.check_session(session)?;
        tracing::debug!(
            session,
            excluded = filter.excluded_apps.len(),
            excepted = filter.except_windows.len(),
            shows_cursor = config.shows_cursor,
            "Preview session updated"
        );
        Ok(())
    }

    async fn stop_session(&self, session: SessionId) -> Result<(), CaptureError> {
        self.check_session(session)?;
        *self.current.lock().unwrap() = None;
        Ok(())
    }
}

fn print_filter(generation: u64, filter: Option<ExclusionFilter>) {
    let Some(filter) = filter else {
        return;
    };
    let apps: Vec<&str> = filter.excluded_apps.iter().map(String::as_str).collect();
    let ids: Vec<String> = filter.except_windows.iter().map(|w| w.id.to_string()).collect();
    println!(
        "[{generation}] excluding {} | excepting windows {}",
        if apps.is_empty() { "-".to_string() } else { apps.join(", ") },
        if ids.is_empty() { "-".to_string() } else { ids.join(", ") },
    );
}

/// Run a live session against the host inventory and print every filter
/// swap until Ctrl-C
pub async fn watch(env: &Environment, display: Option<u32>) -> Result<()> {
    let backend = Arc::new(PreviewBackend::new(Arc::clone(&env.inventory)));
    let controller = Arc::new(
        LiveSessionController::new(backend)
            .with_store(Arc::clone(&env.store))
            .with_stream_options(env.settings.stream_options()),
    );
    let mut events = controller.events();

    controller
        .start_on(env.store.current(), display)
        .await
        .context("Failed to start capture session")?;

    // Picks up policy edits made by other windowcloak invocations
    let _poller = MediumPoller::spawn(Arc::clone(&env.store), env.settings.inventory_poll_interval());
    let notifier = env.landscape_notifier();
    let refresh = spawn_refresh_loop(
        Arc::clone(&controller),
        Arc::clone(&env.store),
        &notifier,
        env.settings.debounce(),
    );
    if let Some(display) = controller.active_display() {
        println!(
            "Watching display {} ({}x{}); press Ctrl-C to stop",
            display.id, display.width, display.height
        );
    }

    let mut session_ended = false;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(ControllerEvent::FilterApplied { generation, .. }) => {
                    print_filter(generation, controller.applied_filter());
                }
                Ok(ControllerEvent::StateChanged(state)) => {
                    tracing::debug!(%state, "Controller state");
                    if state == SessionState::Idle {
                        session_ended = true;
                        break;
                    }
                }
                Ok(ControllerEvent::Failed(err)) => {
                    eprintln!("error: {err}");
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Controller events lagged");
                }
                Err(RecvError::Closed) => break,
            },
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                break;
            }
        }
    }

    refresh.shutdown();
    if controller.state() == SessionState::Running {
        controller.stop().await.context("Failed to stop capture session")?;
    }
    match controller.last_error() {
        Some(err) if session_ended => Err(anyhow::Error::new(err).context("Capture session ended")),
        _ => Ok(()),
    }
}
