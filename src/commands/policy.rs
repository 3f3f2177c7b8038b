use anyhow::{bail, Context, Result};

use crate::app_bootstrap::Environment;
use windowcloak_capture::capture::ContentSource;
use windowcloak_capture::inventory::WindowId;
use windowcloak_capture::policy::Policy;

fn save_with<F>(env: &Environment, f: F) -> Result<()>
where
    F: FnOnce(&Policy) -> Policy,
{
    let policy = env
        .store
        .update(f)
        .with_context(|| format!("Failed to save policy to {}", env.store.describe()))?;
    super::print_policy(&policy);
    Ok(())
}

pub fn hide_app(env: &Environment, app_id: &str) -> Result<()> {
    tracing::info!(app_id, "Hiding application");
    save_with(env, |p| p.with_app_hidden(app_id))
}

pub fn unhide_app(env: &Environment, app_id: &str) -> Result<()> {
    tracing::info!(app_id, "Showing application");
    save_with(env, |p| p.with_app_visible(app_id))
}

pub fn toggle_app(env: &Environment, app_id: &str) -> Result<()> {
    tracing::info!(app_id, "Toggling application");
    save_with(env, |p| p.toggled_app(app_id))
}

pub async fn hide_window(env: &Environment, app_id: &str, window_id: WindowId) -> Result<()> {
    check_window_owner(env, app_id, window_id).await?;
    tracing::info!(app_id, window_id, "Hiding window");
    save_with(env, |p| p.with_window_hidden(app_id, window_id))
}

pub fn show_window(env: &Environment, app_id: &str, window_id: WindowId) -> Result<()> {
    tracing::info!(app_id, window_id, "Showing window");
    save_with(env, |p| p.with_window_visible(app_id, window_id))
}

pub fn set_hide_cursor(env: &Environment, hide: bool) -> Result<()> {
    save_with(env, |p| p.with_hide_cursor(hide))
}

pub fn set_show_own_window(env: &Environment, show: bool) -> Result<()> {
    save_with(env, |p| p.with_show_own_window(show))
}

pub fn reset(env: &Environment) -> Result<()> {
    tracing::info!("Resetting policy to defaults");
    let policy = env
        .store
        .save(Policy::default())
        .with_context(|| format!("Failed to save policy to {}", env.store.describe()))?;
    super::print_policy(&policy);
    Ok(())
}

/// Reject ids that belong to another app. Ids that are not open right now
/// are accepted with a warning; the next refresh prunes them.
async fn check_window_owner(env: &Environment, app_id: &str, window_id: WindowId) -> Result<()> {
    let content = env
        .inventory
        .shareable_content()
        .await
        .context("Failed to enumerate windows")?;
    match content.windows.iter().find(|w| w.id == window_id) {
        Some(window) if window.app_id != app_id => {
            bail!("Window {} belongs to {}, not {}", window_id, window.app_id, app_id)
        }
        Some(_) => Ok(()),
        None => {
            tracing::warn!(app_id, window_id, "Window is not open");
            eprintln!("warning: window {window_id} is not open; it will be dropped on the next refresh");
            Ok(())
        }
    }
}
