//! Error types for WindowCloak
//!
//! Domain errors are `thiserror` enums with user-facing messages. Application
//! plumbing (CLI, bootstrap, platform enumeration) uses `anyhow` on top.

use thiserror::Error;

/// Errors reported by a capture backend
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CaptureError {
    /// Screen recording permission was denied
    #[error("Screen recording permission denied. Please enable it in System Settings > Privacy & Security > Screen Recording.")]
    PermissionDenied,

    /// No display could be found to capture
    #[error("No display available for capture.")]
    NoDisplayAvailable,

    /// Shareable content could not be enumerated
    #[error("No shareable content available.")]
    NoContentAvailable,

    /// The backend no longer knows the session
    #[error("The capture session no longer exists.")]
    SessionNotFound,

    /// Any other backend failure
    #[error("Capture failed: {0}")]
    Backend(String),
}

/// Errors raised by the live session controller
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// Capture access denied; blocking precondition
    #[error("Screen recording permission required. Grant it in System Settings and restart the app.")]
    PermissionDenied,

    /// Nothing to capture; fatal to the start attempt
    #[error("Nothing to capture: {0}")]
    NoTarget(String),

    /// `start` while a session is running
    #[error("Capture is already running.")]
    AlreadyRunning,

    /// `start` while another start is in flight
    #[error("Capture is already starting.")]
    StartInProgress,

    /// `start` while a stop is in flight
    #[error("Capture is still stopping.")]
    StopInProgress,

    /// `stop`/`refresh` without a running session
    #[error("Capture has not been started.")]
    NotStarted,

    /// Backend failure during start, refresh, stop or an active session
    #[error("Capture failed: {0}")]
    Backend(String),
}

impl From<CaptureError> for SessionError {
    fn from(err: CaptureError) -> Self {
        match err {
            CaptureError::PermissionDenied => SessionError::PermissionDenied,
            CaptureError::NoDisplayAvailable | CaptureError::NoContentAvailable => {
                SessionError::NoTarget(err.to_string())
            }
            CaptureError::SessionNotFound => SessionError::NotStarted,
            CaptureError::Backend(msg) => SessionError::Backend(msg),
        }
    }
}

/// Errors raised while reading or writing persisted state
#[derive(Debug, Error)]
pub enum StoreError {
    /// Platform config directory could not be resolved
    #[error("Could not find a configuration directory.")]
    NoConfigDir,

    /// Underlying read/write failure
    #[error("Could not access configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization failure
    #[error("Could not encode configuration: {0}")]
    Encode(String),

    /// Deserialization failure
    #[error("Could not decode configuration: {0}")]
    Decode(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_error_maps_to_session_permission() {
        let err: SessionError = CaptureError::PermissionDenied.into();
        assert_eq!(err, SessionError::PermissionDenied);
    }

    #[test]
    fn missing_display_maps_to_no_target() {
        let err: SessionError = CaptureError::NoDisplayAvailable.into();
        match err {
            SessionError::NoTarget(msg) => assert!(msg.contains("No display")),
            other => panic!("unexpected mapping: {:?}", other),
        }
    }

    #[test]
    fn backend_message_is_preserved() {
        let err: SessionError = CaptureError::Backend("stream died".to_string()).into();
        assert!(err.to_string().contains("stream died"));
    }

    #[test]
    fn state_errors_are_readable() {
        assert!(SessionError::AlreadyRunning.to_string().contains("already running"));
        assert!(SessionError::NotStarted.to_string().contains("not been started"));
    }

    #[test]
    fn store_error_wraps_io() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only volume");
        let err: StoreError = io.into();
        assert!(err.to_string().contains("read-only volume"));
    }
}
