use anyhow::{Context, Result};

use crate::app_bootstrap::Environment;
use crate::platform::screen_capture_permission_granted;
use crate::settings_io;
use windowcloak_capture::capture::ContentSource;
use windowcloak_capture::config;
use windowcloak_capture::inventory::ShareableContent;
use windowcloak_capture::policy_store::ChangeOrigin;
use windowcloak_capture::window_filter::{build_exclusion_filter, captured_windows};

async fn fetch_content(env: &Environment) -> Result<ShareableContent> {
    env.inventory
        .shareable_content()
        .await
        .context("Failed to enumerate shareable content")
}

pub fn status(env: &Environment) -> Result<()> {
    println!("Policy file: {}", env.store.describe());
    if let Some(dir) = settings_io::windowcloak_config_dir() {
        println!(
            "Settings file: {}",
            dir.join(config::storage::SETTINGS_FILE_NAME).display()
        );
    }
    println!(
        "Screen recording permission: {}",
        if screen_capture_permission_granted() {
            "granted"
        } else {
            "not granted"
        }
    );
    if let Err(e) = env.store.try_load() {
        println!("warning: stored policy is unreadable ({e}); defaults are in effect");
    }
    println!();
    super::print_policy(&env.store.current());
    println!();
    println!(
        "Capture: {} fps, queue depth {}, debounce {} ms",
        env.settings.target_fps, env.settings.queue_depth, env.settings.debounce_ms
    );
    Ok(())
}

/// List running applications and their windows with the effective hiding
/// state of each
pub async fn apps(env: &Environment, include_windowless: bool) -> Result<()> {
    let content = fetch_content(env).await?;
    let policy = env.store.current().sanitized_against(&content).policy;
    let self_app_id = config::identity::self_app_id();

    let mut applications = content.applications.clone();
    applications.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));

    for app in &applications {
        let windows: Vec<_> = content.windows_of(&app.bundle_id).collect();
        if windows.is_empty() && !include_windowless {
            continue;
        }

        let mark = if app.bundle_id == self_app_id {
            "self"
        } else if policy.is_app_fully_hidden(&app.bundle_id) {
            "hidden"
        } else if policy.is_app_hidden(&app.bundle_id) {
            "partial"
        } else {
            ""
        };
        println!("[{:^7}] {} ({})", mark, app.name, app.bundle_id);

        for window in windows {
            let hidden = app.bundle_id == self_app_id
                || policy.is_window_hidden(&window.app_id, window.id);
            let title = if window.title.is_empty() {
                "<untitled>"
            } else {
                window.title.as_str()
            };
            println!(
                "    {} {:>6} {}{}",
                if hidden { "x" } else { " " },
                window.id,
                title,
                if window.on_screen { "" } else { " (off-screen)" }
            );
        }
    }

    let on_screen = content.windows.iter().filter(|w| w.on_screen).count();
    let captured = captured_windows(&content.windows, &policy)
        .into_iter()
        .filter(|w| w.app_id != self_app_id)
        .count();
    println!();
    println!("{captured} of {on_screen} on-screen windows would be captured");
    Ok(())
}

/// Print the exclusion filter the current policy produces right now
pub async fn filter(env: &Environment) -> Result<()> {
    let content = fetch_content(env).await?;
    let sanitized = env.store.current().sanitized_against(&content);
    let filter = build_exclusion_filter(
        &content,
        &sanitized.policy,
        &config::identity::self_app_id(),
    );
    let json = serde_json::to_string_pretty(&filter).context("Failed to encode filter")?;
    println!("{json}");
    if sanitized.changed {
        eprintln!("note: the stored policy references closed windows; run `windowcloak prune`");
    }
    Ok(())
}

/// Remove window ids that no longer exist from the stored policy
pub async fn prune(env: &Environment) -> Result<()> {
    let content = fetch_content(env).await?;
    let current = env.store.current();
    let sanitized = current.sanitized_against(&content);
    if !sanitized.changed {
        println!("Nothing to prune");
        return Ok(());
    }

    let saved = env
        .store
        .save_if_current(&current, sanitized.policy, ChangeOrigin::Sanitizer)
        .with_context(|| format!("Failed to save policy to {}", env.store.describe()))?;
    match saved {
        Some(policy) => {
            tracing::info!("Pruned stale window ids");
            println!("Pruned closed windows from the policy");
            super::print_policy(&policy);
        }
        None => println!("Policy changed while pruning; nothing written"),
    }
    Ok(())
}
