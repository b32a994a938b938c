//! Alarm Manager Implementation

use std::time::Duration;

use dms::{AlarmEdge, DisplayedState, FrameAnalysis};
use tracing::{debug, info, warn};

use crate::actuator::{ActuatorError, ActuatorSink, PresenceIndicator};

/// Applies per-frame DMS results to an actuator sink.
///
/// Only changes reach the sink. A failed call leaves the recorded state as
/// it was, so the next frame retries it.
pub struct AlarmManager {
    sink: Box<dyn ActuatorSink>,
    indicator: Option<PresenceIndicator>,
    alarm_on: bool,
    displayed: Option<DisplayedState>,
    episodes: u64,
    failures: u64,
}

impl AlarmManager {
    /// Create a new alarm manager
    pub fn new(sink: Box<dyn ActuatorSink>) -> Self {
        Self {
            sink,
            indicator: None,
            alarm_on: false,
            displayed: None,
            episodes: 0,
            failures: 0,
        }
    }

    /// Apply one frame's result
    pub fn apply(&mut self, analysis: &FrameAnalysis) {
        let observation = &analysis.observation;

        let indicator = if analysis.face_present() {
            PresenceIndicator::Present
        } else {
            PresenceIndicator::Absent
        };
        self.set_indicator(indicator);

        if observation.edge == Some(AlarmEdge::Rising) {
            self.episodes += 1;
            warn!(
                "Drowsiness alarm triggered after {} frames (episode {})",
                observation.drowsy_counter, self.episodes
            );
        }

        if observation.alarm_active {
            self.start_alarm();
        } else {
            self.stop_alarm();
        }

        if self.displayed != Some(observation.displayed_state) {
            match observation.displayed_state {
                DisplayedState::DrowsyAlert => warn!("Driver state: {}", observation.displayed_state),
                state => info!("Driver state: {}", state),
            }
            self.displayed = Some(observation.displayed_state);
        }
    }

    /// Alarm off and indicators dark, e.g. when the session stops
    pub fn silence(&mut self) {
        self.stop_alarm();
        self.set_indicator(PresenceIndicator::Off);
        self.displayed = None;
    }

    /// Walk every output: green, red, buzzer in turn, then all together.
    ///
    /// Blocks for about five steps. Everything is left off afterwards, also
    /// when a step fails.
    pub fn self_test(&mut self, step: Duration) -> Result<(), ActuatorError> {
        info!("Actuator self-test starting");
        match self.run_self_test(step) {
            Ok(()) => {
                self.indicator = Some(PresenceIndicator::Off);
                self.alarm_on = false;
                self.displayed = None;
                info!("Actuator self-test passed");
                Ok(())
            }
            Err(e) => {
                self.failures += 1;
                warn!("Actuator self-test failed: {}", e);
                // state unknown: force both calls
                self.indicator = None;
                self.alarm_on = true;
                self.silence();
                Err(e)
            }
        }
    }

    fn run_self_test(&mut self, step: Duration) -> Result<(), ActuatorError> {
        for indicator in [PresenceIndicator::Present, PresenceIndicator::Absent] {
            self.sink.set_indicator(indicator)?;
            std::thread::sleep(step);
            self.sink.set_indicator(PresenceIndicator::Off)?;
        }

        self.sink.start_alarm()?;
        std::thread::sleep(step);
        self.sink.stop_alarm()?;

        self.sink.set_indicator(PresenceIndicator::All)?;
        self.sink.start_alarm()?;
        std::thread::sleep(step * 2);
        self.sink.stop_alarm()?;
        self.sink.set_indicator(PresenceIndicator::Off)
    }

    pub fn alarm_on(&self) -> bool {
        self.alarm_on
    }

    pub fn indicator(&self) -> Option<PresenceIndicator> {
        self.indicator
    }

    /// Alarm episodes seen since creation
    pub fn episodes(&self) -> u64 {
        self.episodes
    }

    pub fn actuator_failures(&self) -> u64 {
        self.failures
    }

    fn set_indicator(&mut self, indicator: PresenceIndicator) {
        if self.indicator == Some(indicator) {
            return;
        }
        match self.sink.set_indicator(indicator) {
            Ok(()) => {
                debug!("Indicator -> {:?}", indicator);
                self.indicator = Some(indicator);
            }
            Err(e) => {
                self.failures += 1;
                warn!("Failed to set presence indicator: {}", e);
            }
        }
    }

    fn start_alarm(&mut self) {
        if self.alarm_on {
            return;
        }
        match self.sink.start_alarm() {
            Ok(()) => self.alarm_on = true,
            Err(e) => {
                self.failures += 1;
                warn!("Failed to start alarm: {}", e);
            }
        }
    }

    fn stop_alarm(&mut self) {
        if !self.alarm_on {
            return;
        }
        match self.sink.stop_alarm() {
            Ok(()) => self.alarm_on = false,
            Err(e) => {
                self.failures += 1;
                warn!("Failed to stop alarm: {}", e);
            }
        }
    }
}
