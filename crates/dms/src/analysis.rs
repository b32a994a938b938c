//! DMS per-frame results

use serde::{Deserialize, Serialize};

use crate::detector::FrameLabel;

/// User-facing driver state, distinct from the raw classifier label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisplayedState {
    /// Face not detected
    Absent,
    /// Awake, or drowsy below the alert threshold
    Awake,
    /// Sustained drowsiness, alarm active
    DrowsyAlert,
}

impl DisplayedState {
    /// Derive the displayed state for an observed label.
    ///
    /// Sub-threshold drowsiness is shown as awake. `Unknown` has no
    /// displayed state.
    pub fn for_label(label: FrameLabel, alarm_active: bool) -> Option<Self> {
        match label {
            FrameLabel::Absent => Some(DisplayedState::Absent),
            FrameLabel::Awake => Some(DisplayedState::Awake),
            FrameLabel::Drowsy if alarm_active => Some(DisplayedState::DrowsyAlert),
            FrameLabel::Drowsy => Some(DisplayedState::Awake),
            FrameLabel::Unknown => None,
        }
    }

    /// Operator-facing text
    pub fn message(&self) -> &'static str {
        match self {
            DisplayedState::Absent => "Face not detected",
            DisplayedState::Awake => "Awake",
            DisplayedState::DrowsyAlert => "DROWSY - ALERT",
        }
    }
}

impl std::fmt::Display for DisplayedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// Transition of the alarm signal produced by a single observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlarmEdge {
    /// Threshold reached; start the alarm once for this episode
    Rising,
    /// Episode ended; stop the alarm
    Falling,
}

/// Tracker output for one observed frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub displayed_state: DisplayedState,
    pub alarm_active: bool,
    /// Consecutive drowsy frames after this observation
    pub drowsy_counter: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edge: Option<AlarmEdge>,
}

/// Complete DMS analysis of a frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameAnalysis {
    pub label: FrameLabel,
    pub confidence: f32,
    pub observation: Observation,
}

impl FrameAnalysis {
    /// Presence indicator value, driven by the label alone
    pub fn face_present(&self) -> bool {
        self.label.face_present().unwrap_or(false)
    }
}
