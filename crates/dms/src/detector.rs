//! Frame classification: labels and the classifier seam

use std::collections::VecDeque;

use camera_capture::frame::VideoFrame;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::DmsError;

/// Classifier output category for a single frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameLabel {
    /// No face in view
    Absent,
    Awake,
    Drowsy,
    /// Class index the model knows nothing about
    Unknown,
}

impl FrameLabel {
    /// Map a model class index (0 absent, 1 awake, 2 drowsy)
    pub fn from_class_index(index: usize) -> Self {
        match index {
            0 => FrameLabel::Absent,
            1 => FrameLabel::Awake,
            2 => FrameLabel::Drowsy,
            _ => FrameLabel::Unknown,
        }
    }

    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameLabel::Absent => "absent",
            FrameLabel::Awake => "awake",
            FrameLabel::Drowsy => "drowsy",
            FrameLabel::Unknown => "unknown",
        }
    }

    /// Whether the presence indicator should show a driver.
    /// `None` for labels that carry no presence information.
    pub fn face_present(&self) -> Option<bool> {
        match self {
            FrameLabel::Absent => Some(false),
            FrameLabel::Awake | FrameLabel::Drowsy => Some(true),
            FrameLabel::Unknown => None,
        }
    }
}

impl std::fmt::Display for FrameLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-1 classification of a frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: FrameLabel,
    /// Raw class index reported by the model
    pub class_index: usize,
    /// Confidence score (0.0 to 1.0)
    pub confidence: f32,
}

impl Classification {
    pub fn new(class_index: usize, confidence: f32) -> Self {
        Self {
            label: FrameLabel::from_class_index(class_index),
            class_index,
            confidence,
        }
    }
}

/// Image classifier used by the monitor.
///
/// Called from the capture thread only, once per frame. A returned error
/// means the frame is skipped; it must not be turned into a label.
pub trait FrameClassifier: Send {
    fn classify(&mut self, frame: &VideoFrame) -> Result<Classification, DmsError>;

    /// Human readable name for logs
    fn name(&self) -> &str {
        "classifier"
    }
}

impl<C: FrameClassifier + ?Sized> FrameClassifier for Box<C> {
    fn classify(&mut self, frame: &VideoFrame) -> Result<Classification, DmsError> {
        (**self).classify(frame)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Replays a fixed script of results, ignoring frame content.
/// `None` entries simulate an inference failure.
#[derive(Debug, Clone, Default)]
pub struct ScriptedClassifier {
    script: VecDeque<Option<FrameLabel>>,
}

impl ScriptedClassifier {
    pub fn new(script: impl IntoIterator<Item = Option<FrameLabel>>) -> Self {
        Self {
            script: script.into_iter().collect(),
        }
    }

    pub fn from_labels(labels: impl IntoIterator<Item = FrameLabel>) -> Self {
        Self::new(labels.into_iter().map(Some))
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl FrameClassifier for ScriptedClassifier {
    fn classify(&mut self, frame: &VideoFrame) -> Result<Classification, DmsError> {
        match self.script.pop_front() {
            Some(Some(label)) => {
                debug!("Scripted frame {} -> {}", frame.sequence, label);
                let class_index = match label {
                    FrameLabel::Absent => 0,
                    FrameLabel::Awake => 1,
                    FrameLabel::Drowsy => 2,
                    FrameLabel::Unknown => usize::MAX,
                };
                Ok(Classification {
                    label,
                    class_index,
                    confidence: 1.0,
                })
            }
            Some(None) => Err(DmsError::Inference("scripted failure".into())),
            None => Err(DmsError::Inference("script exhausted".into())),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
