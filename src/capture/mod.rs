// capture/mod.rs - Capture backend port
//
// The OS capture primitives (stream creation, frame delivery, window/app
// enumeration) live behind these traits. The live session controller drives
// a backend through them; tests drive them with mocks.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Weak;
use std::time::Duration;

use crate::config;
use crate::error::CaptureError;
use crate::inventory::{DisplayInfo, ShareableContent};
use crate::policy::Policy;
use crate::window_filter::ExclusionFilter;

/// Backend-assigned identifier of a running capture session
pub type SessionId = u64;

/// Pixel layout of delivered frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PixelFormat {
    /// 32-bit BGRA, 8 bits per channel
    Bgra8,
}

/// Tunables that shape the stream independently of the policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamOptions {
    pub target_fps: u32,
    pub queue_depth: usize,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            target_fps: config::capture::DEFAULT_TARGET_FPS,
            queue_depth: config::capture::DEFAULT_QUEUE_DEPTH,
        }
    }
}

/// Stream configuration handed to the backend alongside the filter
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamConfig {
    /// Output width in pixels
    pub width: u32,
    /// Output height in pixels
    pub height: u32,
    /// Minimum interval between frames
    pub frame_interval: Duration,
    /// Frames the backend may keep in flight
    pub queue_depth: usize,
    /// Composite the pointer into frames
    pub shows_cursor: bool,
    pub pixel_format: PixelFormat,
}

impl StreamConfig {
    /// Derive the stream configuration for `display` under `policy`
    pub fn for_display(display: &DisplayInfo, policy: &Policy, options: StreamOptions) -> Self {
        let fps = options.target_fps.max(1);
        Self {
            width: display.width,
            height: display.height,
            frame_interval: Duration::from_nanos(1_000_000_000 / fps as u64),
            queue_depth: options.queue_depth.max(1),
            shows_cursor: !policy.hide_cursor,
            pixel_format: PixelFormat::Bgra8,
        }
    }
}

/// What a session captures
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureTarget {
    pub display: DisplayInfo,
}

/// A captured frame
#[derive(Debug, Clone)]
pub struct CaptureFrame {
    /// Pixel data in `pixel_format`
    pub data: Vec<u8>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Bytes per row (may include padding)
    pub stride: u32,
    pub pixel_format: PixelFormat,
}

/// Callbacks a backend makes into the owner of a session.
///
/// The backend receives only a `Weak` reference; once the owner is gone the
/// callbacks are silently dropped. Calls arrive on a backend-owned context
/// and must not block.
pub trait SessionDelegate: Send + Sync {
    /// A new frame is available. Fire-and-forget.
    fn frame_delivered(&self, session: SessionId, frame: CaptureFrame);

    /// The backend stopped the session on its own, e.g. display unplugged
    fn session_stopped(&self, session: SessionId, error: CaptureError);
}

/// Enumerates shareable content
#[async_trait]
pub trait ContentSource: Send + Sync + 'static {
    /// Fresh snapshot of displays, applications and windows
    async fn shareable_content(&self) -> Result<ShareableContent, CaptureError>;
}

/// Platform capture backend
#[async_trait]
pub trait CaptureBackend: ContentSource {
    /// Whether screen capture access is granted
    async fn permission_granted(&self) -> bool;

    /// Create and start a session
    async fn start_session(
        &self,
        target: &CaptureTarget,
        filter: &ExclusionFilter,
        config: &StreamConfig,
        delegate: Weak<dyn SessionDelegate>,
    ) -> Result<SessionId, CaptureError>;

    /// Replace filter and configuration of a running session without
    /// restarting it
    async fn update_session(
        &self,
        session: SessionId,
        filter: &ExclusionFilter,
        config: &StreamConfig,
    ) -> Result<(), CaptureError>;

    /// Tear a session down
    async fn stop_session(&self, session: SessionId) -> Result<(), CaptureError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn display() -> DisplayInfo {
        DisplayInfo {
            id: 1,
            width: 3024,
            height: 1964,
        }
    }

    #[test]
    fn stream_config_follows_cursor_flag() {
        let shown = StreamConfig::for_display(&display(), &Policy::default(), StreamOptions::default());
        assert!(shown.shows_cursor);

        let hidden_policy = Policy::default().with_hide_cursor(true);
        let hidden = StreamConfig::for_display(&display(), &hidden_policy, StreamOptions::default());
        assert!(!hidden.shows_cursor);
    }

    #[test]
    fn stream_config_uses_display_size_and_defaults() {
        let config = StreamConfig::for_display(&display(), &Policy::default(), StreamOptions::default());
        assert_eq!((config.width, config.height), (3024, 1964));
        assert_eq!(config.queue_depth, 5);
        assert_eq!(config.frame_interval, Duration::from_nanos(16_666_666));
        assert_eq!(config.pixel_format, PixelFormat::Bgra8);
    }

    #[test]
    fn stream_config_clamps_zero_options() {
        let options = StreamOptions {
            target_fps: 0,
            queue_depth: 0,
        };
        let config = StreamConfig::for_display(&display(), &Policy::default(), options);
        assert_eq!(config.frame_interval, Duration::from_secs(1));
        assert_eq!(config.queue_depth, 1);
    }
}
