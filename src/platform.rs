//! Platform Abstraction Layer
//!
//! Host-specific inventory enumeration and permission checks live here; the
//! library only sees them through the `ContentSource` port.

pub mod window_enumerator;

pub use window_enumerator::{screen_capture_permission_granted, SystemInventory};
