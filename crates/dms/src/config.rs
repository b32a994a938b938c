//! DMS configuration

use serde::{Deserialize, Serialize};

use crate::DmsError;

/// DMS configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DmsConfig {
    /// Consecutive drowsy frames before the alarm fires
    pub threshold_frames: u32,

    /// Sustained drowsiness window (milliseconds). When set together with
    /// `expected_fps` it overrides `threshold_frames`.
    pub drowsy_window_ms: Option<u64>,

    /// Frame rate the window is converted with
    pub expected_fps: Option<u32>,
}

impl Default for DmsConfig {
    fn default() -> Self {
        Self::desktop()
    }
}

impl DmsConfig {
    /// Desktop session, ~30fps webcam
    pub fn desktop() -> Self {
        Self {
            threshold_frames: 30,
            drowsy_window_ms: None,
            expected_fps: None,
        }
    }

    /// Embedded session throttled to 10fps
    pub fn embedded() -> Self {
        Self {
            threshold_frames: 10,
            ..Self::desktop()
        }
    }

    /// Threshold expressed as a time window at a known frame rate
    pub fn time_based(window_ms: u64, fps: u32) -> Self {
        Self {
            drowsy_window_ms: Some(window_ms),
            expected_fps: Some(fps),
            ..Self::desktop()
        }
    }

    /// Resolve the frame-count threshold the tracker runs with
    pub fn threshold(&self) -> Result<u32, DmsError> {
        match (self.drowsy_window_ms, self.expected_fps) {
            (Some(window_ms), Some(fps)) => {
                if fps == 0 {
                    return Err(DmsError::Config("expected_fps must be positive".into()));
                }
                let frames = window_ms
                    .checked_mul(fps as u64)
                    .ok_or_else(|| {
                        DmsError::Config(format!("drowsy window of {}ms is too long", window_ms))
                    })?
                    .div_ceil(1000)
                    .max(1);
                u32::try_from(frames)
                    .map_err(|_| DmsError::Config(format!("window of {} frames is too long", frames)))
            }
            (Some(_), None) | (None, Some(_)) => Err(DmsError::Config(
                "drowsy_window_ms and expected_fps must be set together".into(),
            )),
            (None, None) => {
                if self.threshold_frames == 0 {
                    Err(DmsError::Config("threshold_frames must be positive".into()))
                } else {
                    Ok(self.threshold_frames)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        assert_eq!(DmsConfig::default().threshold().unwrap(), 30);
        assert_eq!(DmsConfig::embedded().threshold().unwrap(), 10);
    }

    #[test]
    fn test_time_based_threshold() {
        // one second at either rate matches the frame-count presets
        assert_eq!(DmsConfig::time_based(1000, 30).threshold().unwrap(), 30);
        assert_eq!(DmsConfig::time_based(1000, 10).threshold().unwrap(), 10);
        // rounds up
        assert_eq!(DmsConfig::time_based(250, 10).threshold().unwrap(), 3);
        assert_eq!(DmsConfig::time_based(1, 10).threshold().unwrap(), 1);
    }

    #[test]
    fn test_invalid_configs() {
        let zero = DmsConfig {
            threshold_frames: 0,
            ..Default::default()
        };
        assert!(matches!(zero.threshold(), Err(DmsError::Config(_))));

        assert!(DmsConfig::time_based(1000, 0).threshold().is_err());

        let half = DmsConfig {
            drowsy_window_ms: Some(500),
            ..Default::default()
        };
        assert!(half.threshold().is_err());

        let huge = DmsConfig::time_based(u64::MAX / 10, 30);
        assert!(matches!(huge.threshold(), Err(DmsError::Config(_))));

        // fits in u64 but not in a u32 frame count
        let long = DmsConfig::time_based(u64::MAX / 1000, 30);
        assert!(matches!(long.threshold(), Err(DmsError::Config(_))));
    }
}
