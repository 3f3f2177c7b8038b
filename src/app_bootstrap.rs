use anyhow::{Context, Result};
use std::sync::Arc;

use crate::platform::SystemInventory;
use crate::settings::Settings;
use crate::{logging, settings_io};
use windowcloak_capture::landscape::{InventoryWatcher, LandscapeNotifier};
use windowcloak_capture::policy_store::PolicyStore;

/// Long-lived collaborators shared by every command
pub(crate) struct Environment {
    pub settings: Settings,
    pub store: Arc<PolicyStore>,
    pub inventory: Arc<SystemInventory>,
}

impl Environment {
    /// Notifier fed by a poller over the host inventory
    pub fn landscape_notifier(&self) -> LandscapeNotifier {
        let notifier = LandscapeNotifier::new();
        notifier.add_source(InventoryWatcher::with_interval(
            Arc::clone(&self.inventory),
            self.settings.inventory_poll_interval(),
        ));
        notifier
    }
}

/// Load settings early to get log level configuration.
pub(crate) fn load_initial_settings_for_logging() -> Settings {
    settings_io::load_settings()
}

/// Initialize logging system.
pub(crate) fn init_logging(initial_settings: &Settings, verbose: bool) {
    let log_level = if verbose {
        logging::LogLevel::Debug
    } else {
        initial_settings
            .log_level
            .parse::<logging::LogLevel>()
            .unwrap_or(logging::LogLevel::Error)
    };

    if let Err(e) = logging::init_logging(log_level, initial_settings.log_to_file) {
        eprintln!("Failed to initialize logging: {}", e);
    } else {
        tracing::info!(
            version = env!("CARGO_PKG_VERSION"),
            platform = std::env::consts::OS,
            arch = std::env::consts::ARCH,
            log_level = %log_level,
            "WindowCloak started"
        );
    }

    // Auto-cleanup old logs in background
    if initial_settings.log_to_file {
        logging::auto_cleanup_old_logs(initial_settings.log_retention_days);
    }
}

/// Log panics through tracing before the default hook runs.
pub(crate) fn install_panic_hook() {
    let default_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        tracing::error!(?panic_info, "Application panic detected");
        log::error!("Application panic detected: {}", panic_info);
        default_panic(panic_info);
    }));
}

/// Open the policy store and the host inventory.
pub(crate) fn build_environment(settings: Settings) -> Result<Environment> {
    let store = PolicyStore::open_default().context("Failed to open policy store")?;
    tracing::debug!(
        target_fps = settings.target_fps,
        queue_depth = settings.queue_depth,
        debounce_ms = settings.debounce_ms,
        inventory_poll_ms = settings.inventory_poll_ms,
        log_level = ?settings.log_level,
        "Settings configuration"
    );
    Ok(Environment {
        settings,
        store: Arc::new(store),
        inventory: Arc::new(SystemInventory::new()),
    })
}
