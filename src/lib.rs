//! WindowCloak - privacy-preserving screen capture core
//!
//! Filter construction, the persisted hiding policy, landscape change
//! notification and the live session controller. Platform capture backends
//! plug in through the traits in [`capture`].

// Configuration constants
pub mod config;
pub mod error;

// Policy model and persistence
pub mod inventory;
pub mod policy;
pub mod policy_store;

// Filter engine
pub mod window_filter;

// Live capture
pub mod capture;
pub mod capture_controller;
pub mod debounce;
pub mod landscape;
pub mod refresh_loop;

// Re-export commonly used types
pub use capture::{CaptureBackend, CaptureFrame, ContentSource, SessionDelegate, StreamConfig};
pub use capture_controller::{
    ControllerEvent, LiveSessionController, RefreshOutcome, RefreshTicket, SessionState,
};
pub use error::{CaptureError, SessionError, StoreError};
pub use inventory::{AppInfo, DisplayInfo, ShareableContent, WindowId, WindowInfo};
pub use landscape::{InventoryWatcher, LandscapeEvent, LandscapeNotifier};
pub use policy::Policy;
pub use policy_store::{ChangeOrigin, MediumPoller, PolicyChange, PolicyStore};
pub use refresh_loop::{spawn_refresh_loop, RefreshLoopHandle};
pub use window_filter::{build_exclusion_filter, captured_windows, visible_windows, ExclusionFilter};
