//! Drowsiness state tracking

use tracing::{debug, warn};

use crate::analysis::{AlarmEdge, DisplayedState, Observation};
use crate::detector::FrameLabel;

/// Debounces the per-frame label stream into a stable alarm signal.
///
/// The alarm is active once `threshold` consecutive frames were classified
/// drowsy, and stays active until any other label is observed. Not
/// thread-safe; feed it from a single thread.
#[derive(Debug, Clone)]
pub struct DrowsinessTracker {
    threshold: u32,
    drowsy_counter: u32,
    /// Set once per episode, when the alarm is started
    alert_triggered: bool,
}

impl DrowsinessTracker {
    /// Create a tracker. A zero threshold is raised to 1.
    pub fn new(threshold: u32) -> Self {
        if threshold == 0 {
            warn!("Drowsiness threshold of 0 frames raised to 1");
        }
        Self {
            threshold: threshold.max(1),
            drowsy_counter: 0,
            alert_triggered: false,
        }
    }

    /// Feed one classified frame.
    ///
    /// Returns `None` for `Unknown` labels, which leave the state untouched.
    pub fn observe(&mut self, label: FrameLabel) -> Option<Observation> {
        if label == FrameLabel::Unknown {
            debug!("Skipping unknown label, counter stays at {}", self.drowsy_counter);
            return None;
        }

        let was_active = self.is_alarm_active();

        if label == FrameLabel::Drowsy {
            self.drowsy_counter = self.drowsy_counter.saturating_add(1);
        } else {
            self.drowsy_counter = 0;
            self.alert_triggered = false;
        }

        let alarm_active = self.is_alarm_active();

        let edge = if alarm_active && !self.alert_triggered {
            self.alert_triggered = true;
            Some(AlarmEdge::Rising)
        } else if was_active && !alarm_active {
            Some(AlarmEdge::Falling)
        } else {
            None
        };

        let displayed_state = DisplayedState::for_label(label, alarm_active)?;

        Some(Observation {
            displayed_state,
            alarm_active,
            drowsy_counter: self.drowsy_counter,
            edge,
        })
    }

    /// Back to the session-start state
    pub fn reset(&mut self) {
        self.drowsy_counter = 0;
        self.alert_triggered = false;
    }

    pub fn is_alarm_active(&self) -> bool {
        self.drowsy_counter >= self.threshold
    }

    pub fn drowsy_counter(&self) -> u32 {
        self.drowsy_counter
    }

    pub fn alert_triggered(&self) -> bool {
        self.alert_triggered
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use FrameLabel::*;

    fn run(tracker: &mut DrowsinessTracker, labels: &[FrameLabel]) -> Vec<Observation> {
        labels.iter().filter_map(|&l| tracker.observe(l)).collect()
    }

    #[test]
    fn test_scenario_sustained_drowsiness() {
        let mut tracker = DrowsinessTracker::new(3);
        let out = run(&mut tracker, &[Awake, Drowsy, Drowsy, Drowsy, Drowsy]);

        let states: Vec<_> = out.iter().map(|o| o.displayed_state).collect();
        let alarms: Vec<_> = out.iter().map(|o| o.alarm_active).collect();
        assert_eq!(
            states,
            vec![
                DisplayedState::Awake,
                DisplayedState::Awake,
                DisplayedState::Awake,
                DisplayedState::DrowsyAlert,
                DisplayedState::DrowsyAlert,
            ]
        );
        assert_eq!(alarms, vec![false, false, false, true, true]);
    }

    #[test]
    fn test_scenario_interrupted_run() {
        let mut tracker = DrowsinessTracker::new(3);
        let out = run(&mut tracker, &[Drowsy, Drowsy, Absent, Drowsy, Drowsy, Drowsy]);

        let counters: Vec<_> = out.iter().map(|o| o.drowsy_counter).collect();
        let alarms: Vec<_> = out.iter().map(|o| o.alarm_active).collect();
        assert_eq!(counters, vec![1, 2, 0, 1, 2, 3]);
        assert_eq!(alarms, vec![false, false, false, false, false, true]);
    }

    #[test]
    fn test_absent_clears_alarm() {
        let mut tracker = DrowsinessTracker::new(2);
        run(&mut tracker, &[Drowsy, Drowsy, Drowsy]);
        assert!(tracker.is_alarm_active());

        let obs = tracker.observe(Absent).unwrap();
        assert_eq!(obs.displayed_state, DisplayedState::Absent);
        assert!(!obs.alarm_active);
        assert_eq!(obs.edge, Some(AlarmEdge::Falling));
        assert!(!tracker.alert_triggered());
    }

    #[test]
    fn test_edges_once_per_episode() {
        let mut tracker = DrowsinessTracker::new(2);
        let out = run(&mut tracker, &[Drowsy, Drowsy, Drowsy, Drowsy, Awake, Awake]);
        let edges: Vec<_> = out.iter().map(|o| o.edge).collect();
        assert_eq!(
            edges,
            vec![None, Some(AlarmEdge::Rising), None, None, Some(AlarmEdge::Falling), None]
        );
    }

    #[test]
    fn test_unknown_is_skipped() {
        let mut tracker = DrowsinessTracker::new(3);
        run(&mut tracker, &[Drowsy, Drowsy]);

        assert!(tracker.observe(Unknown).is_none());
        assert_eq!(tracker.drowsy_counter(), 2);

        // the run continues across the skipped frame
        let obs = tracker.observe(Drowsy).unwrap();
        assert!(obs.alarm_active);
        assert_eq!(obs.edge, Some(AlarmEdge::Rising));
    }

    #[test]
    fn test_threshold_of_one() {
        let mut tracker = DrowsinessTracker::new(1);
        assert!(tracker.observe(Drowsy).unwrap().alarm_active);

        let zero = DrowsinessTracker::new(0);
        assert_eq!(zero.threshold(), 1);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut tracker = DrowsinessTracker::new(2);
        run(&mut tracker, &[Drowsy, Drowsy, Drowsy]);

        tracker.reset();
        tracker.reset();
        assert_eq!(tracker.drowsy_counter(), 0);
        assert!(!tracker.alert_triggered());
        assert!(!tracker.is_alarm_active());
    }

    #[test]
    fn test_counter_saturates() {
        let mut tracker = DrowsinessTracker::new(5);
        tracker.drowsy_counter = u32::MAX;
        tracker.alert_triggered = true;
        let obs = tracker.observe(Drowsy).unwrap();
        assert_eq!(obs.drowsy_counter, u32::MAX);
        assert!(obs.alarm_active);
    }

    fn any_label() -> impl Strategy<Value = FrameLabel> {
        prop_oneof![Just(Absent), Just(Awake), Just(Drowsy), Just(Unknown)]
    }

    proptest! {
        #[test]
        fn prop_non_drowsy_resets(
            threshold in 1u32..20,
            labels in prop::collection::vec(any_label(), 0..200),
        ) {
            let mut tracker = DrowsinessTracker::new(threshold);
            for label in labels {
                tracker.observe(label);
                if label == Absent || label == Awake {
                    prop_assert_eq!(tracker.drowsy_counter(), 0);
                    prop_assert!(!tracker.alert_triggered());
                }
            }
        }

        #[test]
        fn prop_threshold_edge(threshold in 1u32..60) {
            let mut tracker = DrowsinessTracker::new(threshold);
            for _ in 1..threshold {
                prop_assert!(!tracker.observe(Drowsy).unwrap().alarm_active);
            }
            let obs = tracker.observe(Drowsy).unwrap();
            prop_assert!(obs.alarm_active);
            prop_assert_eq!(obs.displayed_state, DisplayedState::DrowsyAlert);
        }

        #[test]
        fn prop_alarm_holds_while_drowsy(
            threshold in 1u32..20,
            extra in 0usize..100,
        ) {
            let mut tracker = DrowsinessTracker::new(threshold);
            for _ in 0..threshold {
                tracker.observe(Drowsy);
            }
            for _ in 0..extra {
                let obs = tracker.observe(Drowsy).unwrap();
                prop_assert!(obs.alarm_active);
                prop_assert_eq!(obs.edge, None);
            }
        }

        #[test]
        fn prop_unknown_leaves_state(
            threshold in 1u32..20,
            labels in prop::collection::vec(any_label(), 0..100),
        ) {
            let mut tracker = DrowsinessTracker::new(threshold);
            for label in labels {
                tracker.observe(label);
            }
            let before = (tracker.drowsy_counter(), tracker.alert_triggered());
            prop_assert!(tracker.observe(Unknown).is_none());
            prop_assert_eq!(before, (tracker.drowsy_counter(), tracker.alert_triggered()));
        }

        #[test]
        fn prop_edges_alternate(
            threshold in 1u32..8,
            labels in prop::collection::vec(any_label(), 0..300),
        ) {
            let mut tracker = DrowsinessTracker::new(threshold);
            let mut active = false;
            for label in labels {
                let Some(obs) = tracker.observe(label) else { continue };
                match obs.edge {
                    Some(AlarmEdge::Rising) => {
                        prop_assert!(!active);
                        prop_assert_eq!(obs.drowsy_counter, threshold);
                        active = true;
                    }
                    Some(AlarmEdge::Falling) => {
                        prop_assert!(active);
                        active = false;
                    }
                    None => {}
                }
                prop_assert_eq!(active, obs.alarm_active);
            }
        }
    }
}
