//! Camera Capture Library for the Drowsiness Monitor
//!
//! Provides the frame source abstraction the monitoring session pulls from.
//! Supports:
//! - In-memory replay (tests, dry runs)
//! - Directory replay of still images (recorded sessions)

pub mod frame;
pub mod replay;

pub use frame::VideoFrame;
pub use replay::{DirectorySource, ReplaySource};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Camera error types
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Failed to open frame source: {0}")]
    Open(String),

    #[error("Failed to decode frame: {0}")]
    Decode(String),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Capture timeout")]
    Timeout,

    /// The source has no more frames and will never produce one again.
    #[error("End of stream")]
    EndOfStream,
}

/// A source of frames, polled once per loop iteration by the capture thread.
///
/// Any error other than [`CameraError::EndOfStream`] is treated as a transient
/// failure: the frame is skipped and the source is polled again.
pub trait FrameSource: Send {
    /// Capture the next frame
    fn capture(&mut self) -> Result<VideoFrame, CameraError>;

    /// Human readable name for logs
    fn name(&self) -> &str;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn capture(&mut self) -> Result<VideoFrame, CameraError> {
        (**self).capture()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Camera configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Directory of recorded frames to replay
    pub frames_dir: Option<PathBuf>,
    /// Capture width
    pub width: u32,
    /// Capture height
    pub height: u32,
    /// Target FPS (0 = as fast as the classifier allows)
    pub fps: u32,
    /// Restart from the first frame when the source runs out
    pub looping: bool,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self::desktop()
    }
}

impl CameraConfig {
    /// Desktop webcam session (~30fps)
    pub fn desktop() -> Self {
        Self {
            frames_dir: None,
            width: 640,
            height: 480,
            fps: 30,
            looping: false,
        }
    }

    /// Embedded board session, throttled to 10fps
    pub fn embedded() -> Self {
        Self {
            fps: 10,
            ..Self::desktop()
        }
    }

    /// Interval between frames, if throttled
    pub fn frame_interval(&self) -> Option<std::time::Duration> {
        if self.fps == 0 {
            None
        } else {
            Some(std::time::Duration::from_secs_f64(1.0 / self.fps as f64))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_presets() {
        assert_eq!(CameraConfig::desktop().fps, 30);
        assert_eq!(CameraConfig::embedded().fps, 10);
        assert_eq!(CameraConfig::embedded().width, 640);
    }

    #[test]
    fn test_frame_interval() {
        let config = CameraConfig::embedded();
        assert_eq!(config.frame_interval(), Some(Duration::from_millis(100)));

        let unthrottled = CameraConfig { fps: 0, ..Default::default() };
        assert_eq!(unthrottled.frame_interval(), None);
    }
}
