//! Host inventory provider
//!
//! Enumerates displays, running applications and their windows into a
//! [`ShareableContent`] snapshot. macOS uses CGWindowList + NSWorkspace;
//! other platforms report an empty inventory.

use async_trait::async_trait;
use windowcloak_capture::capture::ContentSource;
use windowcloak_capture::error::CaptureError;
use windowcloak_capture::inventory::ShareableContent;

/// System services that never show up as shareable applications
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
const IGNORED_BUNDLE_IDS: &[&str] = &[
    "com.apple.dock",
    "com.apple.controlcenter",
    "com.apple.notificationcenterui",
    "com.apple.WindowServer",
    "com.apple.Spotlight",
    "com.apple.systemuiserver",
    "com.apple.coreservices.uiagent",
];

/// [`ContentSource`] backed by the host window server
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemInventory;

impl SystemInventory {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ContentSource for SystemInventory {
    async fn shareable_content(&self) -> Result<ShareableContent, CaptureError> {
        let joined = tokio::task::spawn_blocking(platform_snapshot)
            .await
            .map_err(|e| CaptureError::Backend(format!("Inventory task failed: {}", e)))?;
        joined.map_err(|e| {
            tracing::warn!(error = %e, "Window enumeration failed");
            CaptureError::NoContentAvailable
        })
    }
}

/// Whether this process may record the screen
pub fn screen_capture_permission_granted() -> bool {
    #[cfg(target_os = "macos")]
    {
        extern "C" {
            fn CGPreflightScreenCaptureAccess() -> bool;
        }
        unsafe { CGPreflightScreenCaptureAccess() }
    }
    #[cfg(not(target_os = "macos"))]
    {
        true
    }
}

#[cfg(not(target_os = "macos"))]
fn platform_snapshot() -> anyhow::Result<ShareableContent> {
    tracing::debug!(os = std::env::consts::OS, "No window enumeration on this platform");
    Ok(ShareableContent::default())
}

#[cfg(target_os = "macos")]
fn platform_snapshot() -> anyhow::Result<ShareableContent> {
    macos::snapshot()
}

// --- macOS implementation -------------------------------------------------

#[cfg(target_os = "macos")]
mod macos {
    use super::IGNORED_BUNDLE_IDS;
    use anyhow::Result;
    use core_foundation::array::{CFArray, CFArrayRef};
    use core_foundation::base::{CFType, TCFType};
    use core_foundation::boolean::CFBoolean;
    use core_foundation::dictionary::{CFDictionary, CFDictionaryRef};
    use core_foundation::number::CFNumber;
    use core_foundation::string::CFString;
    use core_graphics::display::CGDisplay;
    use objc::runtime::Object;
    use objc::{class, msg_send, sel, sel_impl};
    use std::collections::HashMap;
    use windowcloak_capture::inventory::{
        AppInfo, DisplayInfo, ShareableContent, WindowBounds, WindowInfo,
    };

    pub(super) fn snapshot() -> Result<ShareableContent> {
        let displays = displays();
        let applications = running_applications();
        let bundle_by_pid: HashMap<i32, &str> = applications
            .iter()
            .map(|a| (a.pid, a.bundle_id.as_str()))
            .collect();

        let windows = cg_windows()?
            .into_iter()
            .filter_map(|raw| {
                let app_id = bundle_by_pid.get(&raw.owning_pid)?;
                Some(WindowInfo {
                    id: raw.window_id,
                    app_id: app_id.to_string(),
                    title: raw.title,
                    bounds: raw.bounds,
                    on_screen: raw.on_screen,
                    layer: raw.layer,
                })
            })
            .collect::<Vec<_>>();

        log::debug!(
            "[WinEnum] {} displays, {} apps, {} windows",
            displays.len(),
            applications.len(),
            windows.len()
        );

        Ok(ShareableContent {
            displays,
            applications,
            windows,
        })
    }

    fn displays() -> Vec<DisplayInfo> {
        match CGDisplay::active_displays() {
            Ok(ids) => ids
                .into_iter()
                .map(|id| {
                    let display = CGDisplay::new(id);
                    DisplayInfo {
                        id,
                        width: display.pixels_wide() as u32,
                        height: display.pixels_high() as u32,
                    }
                })
                .collect(),
            Err(e) => {
                log::warn!("[WinEnum] CGGetActiveDisplayList failed: {:?}", e);
                Vec::new()
            }
        }
    }

    unsafe fn nsstring_to_string(value: *mut Object) -> Option<String> {
        if value.is_null() {
            return None;
        }
        let cstr: *const std::os::raw::c_char = msg_send![value, UTF8String];
        if cstr.is_null() {
            return None;
        }
        Some(std::ffi::CStr::from_ptr(cstr).to_string_lossy().to_string())
    }

    fn running_applications() -> Vec<AppInfo> {
        let mut apps = Vec::new();
        unsafe {
            let workspace_cls = class!(NSWorkspace);
            let workspace: *mut Object = msg_send![workspace_cls, sharedWorkspace];
            if workspace.is_null() {
                return apps;
            }
            let running_apps: *mut Object = msg_send![workspace, runningApplications];
            if running_apps.is_null() {
                return apps;
            }

            let count: usize = msg_send![running_apps, count];
            for i in 0..count {
                let app: *mut Object = msg_send![running_apps, objectAtIndex: i];
                if app.is_null() {
                    continue;
                }

                let bundle_id: *mut Object = msg_send![app, bundleIdentifier];
                let Some(bundle_id) = nsstring_to_string(bundle_id) else {
                    continue;
                };
                if IGNORED_BUNDLE_IDS.contains(&bundle_id.as_str()) {
                    continue;
                }

                let name: *mut Object = msg_send![app, localizedName];
                let name = nsstring_to_string(name).unwrap_or_else(|| bundle_id.clone());
                let pid: i32 = msg_send![app, processIdentifier];
                apps.push(AppInfo::new(bundle_id, name, pid));
            }
        }
        apps
    }

    struct RawWindow {
        window_id: u32,
        owning_pid: i32,
        title: String,
        bounds: WindowBounds,
        on_screen: bool,
        layer: i32,
    }

    fn find_i64(dict: &CFDictionary, key: &'static str) -> Option<i64> {
        let key = CFString::from_static_string(key);
        dict.find(key.as_CFTypeRef() as *const _).and_then(|val_ref| {
            let number = unsafe { CFNumber::wrap_under_get_rule(val_ref.cast()) };
            number.to_i64()
        })
    }

    fn find_f64(dict: &CFDictionary, key: &'static str) -> Option<f64> {
        let key = CFString::from_static_string(key);
        dict.find(key.as_CFTypeRef() as *const _).and_then(|val_ref| {
            let number = unsafe { CFNumber::wrap_under_get_rule(val_ref.cast()) };
            number.to_f64()
        })
    }

    fn find_string(dict: &CFDictionary, key: &'static str) -> Option<String> {
        let key = CFString::from_static_string(key);
        dict.find(key.as_CFTypeRef() as *const _).map(|val_ref| {
            let value = unsafe { CFString::wrap_under_get_rule(val_ref.cast()) };
            value.to_string()
        })
    }

    fn find_bool(dict: &CFDictionary, key: &'static str) -> Option<bool> {
        let key = CFString::from_static_string(key);
        dict.find(key.as_CFTypeRef() as *const _).map(|val_ref| {
            let value = unsafe { CFType::wrap_under_get_rule(val_ref.cast()) };
            value
                .downcast::<CFBoolean>()
                .map(bool::from)
                .unwrap_or(false)
        })
    }

    fn find_bounds(dict: &CFDictionary) -> WindowBounds {
        let key = CFString::from_static_string("kCGWindowBounds");
        let Some(val_ref) = dict.find(key.as_CFTypeRef() as *const _) else {
            return WindowBounds::default();
        };
        let bounds: CFDictionary =
            unsafe { CFDictionary::wrap_under_get_rule(*val_ref as CFDictionaryRef) };
        WindowBounds::new(
            find_f64(&bounds, "X").unwrap_or(0.0),
            find_f64(&bounds, "Y").unwrap_or(0.0),
            find_f64(&bounds, "Width").unwrap_or(0.0),
            find_f64(&bounds, "Height").unwrap_or(0.0),
        )
    }

    /// Every window the window server knows about, on-screen or not, so the
    /// on-screen flag can be reported per window
    fn cg_windows() -> Result<Vec<RawWindow>> {
        extern "C" {
            fn CGWindowListCopyWindowInfo(option: u32, relativeToWindow: u32) -> CFArrayRef;
        }

        const KCG_WINDOW_LIST_OPTION_ALL: u32 = 0;
        const KCG_WINDOW_LIST_EXCLUDE_DESKTOP_ELEMENTS: u32 = 1 << 4;
        const KCG_WINDOW_SHARING_NONE: i64 = 0;

        let mut windows = Vec::new();
        let window_list = unsafe {
            let list_ref = CGWindowListCopyWindowInfo(
                KCG_WINDOW_LIST_OPTION_ALL | KCG_WINDOW_LIST_EXCLUDE_DESKTOP_ELEMENTS,
                0,
            );
            if list_ref.is_null() {
                anyhow::bail!("CGWindowListCopyWindowInfo returned no window list");
            }
            CFArray::<CFDictionary>::wrap_under_create_rule(list_ref)
        };

        for dict in window_list.iter() {
            let window_id = find_i64(&dict, "kCGWindowNumber").unwrap_or(0) as u32;
            let owning_pid = find_i64(&dict, "kCGWindowOwnerPID").unwrap_or(0) as i32;
            if window_id == 0 || owning_pid == 0 {
                continue;
            }

            let layer = find_i64(&dict, "kCGWindowLayer").unwrap_or(0) as i32;
            if layer != 0 {
                continue;
            }

            let sharing = find_i64(&dict, "kCGWindowSharingState").unwrap_or(1);
            if sharing == KCG_WINDOW_SHARING_NONE {
                continue;
            }

            windows.push(RawWindow {
                window_id,
                owning_pid,
                title: find_string(&dict, "kCGWindowName").unwrap_or_default(),
                bounds: find_bounds(&dict),
                on_screen: find_bool(&dict, "kCGWindowIsOnscreen").unwrap_or(false),
                layer,
            });
        }

        log::debug!("[WinEnum] CGWindowList returned {} normal windows", windows.len());
        Ok(windows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignored_services_include_dock() {
        assert!(IGNORED_BUNDLE_IDS.contains(&"com.apple.dock"));
    }

    #[cfg(not(target_os = "macos"))]
    #[tokio::test]
    async fn non_macos_inventory_is_empty() {
        let content = SystemInventory::new().shareable_content().await.unwrap();
        assert!(content.windows.is_empty());
        assert!(content.displays.is_empty());
        assert!(screen_capture_permission_granted());
    }
}
