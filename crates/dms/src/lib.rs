//! Driver Monitoring System (DMS)
//!
//! Turns camera frames into a debounced driver state:
//! - Per-frame classification (absent / awake / drowsy)
//! - Consecutive-frame drowsiness tracking
//! - Displayed state and alarm edges for the actuators

pub mod analysis;
pub mod config;
pub mod detector;
pub mod state;

pub use analysis::{AlarmEdge, DisplayedState, FrameAnalysis, Observation};
pub use config::DmsConfig;
pub use detector::{Classification, FrameClassifier, FrameLabel, ScriptedClassifier};
pub use state::DrowsinessTracker;

use camera_capture::frame::VideoFrame;
use thiserror::Error;
use tracing::{debug, info};

/// DMS error types
#[derive(Error, Debug)]
pub enum DmsError {
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Image processing failed: {0}")]
    ImageProcessing(String),
}

/// Driver monitoring module: classifier plus drowsiness tracker
pub struct DmsModule {
    classifier: Box<dyn FrameClassifier>,
    tracker: DrowsinessTracker,
}

impl DmsModule {
    /// Create a new DMS module with configuration
    pub fn new(config: &DmsConfig, classifier: Box<dyn FrameClassifier>) -> Result<Self, DmsError> {
        let threshold = config.threshold()?;
        info!(
            "DMS using classifier '{}' with threshold of {} frames",
            classifier.name(),
            threshold
        );

        Ok(Self {
            classifier,
            tracker: DrowsinessTracker::new(threshold),
        })
    }

    /// Analyze a single frame.
    ///
    /// `Ok(None)` means the frame carried no usable label. On error the
    /// tracker has not been touched.
    pub fn analyze(&mut self, frame: &VideoFrame) -> Result<Option<FrameAnalysis>, DmsError> {
        let classification = self.classifier.classify(frame)?;
        debug!(
            "Frame {} classified {} ({:.2})",
            frame.sequence, classification.label, classification.confidence
        );

        Ok(self
            .tracker
            .observe(classification.label)
            .map(|observation| FrameAnalysis {
                label: classification.label,
                confidence: classification.confidence,
                observation,
            }))
    }

    /// Reset driver state (session start / stop)
    pub fn reset_state(&mut self) {
        self.tracker.reset();
    }

    pub fn tracker(&self) -> &DrowsinessTracker {
        &self.tracker
    }
}
