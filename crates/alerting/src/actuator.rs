//! Actuator sinks

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::gpio::{GpioPins, GpioSink};

/// Actuator errors
#[derive(Debug, Error)]
pub enum ActuatorError {
    #[error("GPIO {pin} failed: {source}")]
    Gpio {
        pin: u32,
        #[source]
        source: std::io::Error,
    },
    #[error("Sink unavailable: {0}")]
    Unavailable(String),
}

/// State of the two-colour presence indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceIndicator {
    /// Both lights off (session inactive)
    Off,
    /// Green: a driver is in view
    Present,
    /// Red: no face detected
    Absent,
    /// Both lights on, lamp test only
    All,
}

/// Output device pair: presence indicator plus alarm.
///
/// Implementations may assume the [`crate::AlarmManager`] only calls them on
/// a change of state.
pub trait ActuatorSink: Send {
    fn set_indicator(&mut self, indicator: PresenceIndicator) -> Result<(), ActuatorError>;

    /// Start continuous alarm output
    fn start_alarm(&mut self) -> Result<(), ActuatorError>;

    fn stop_alarm(&mut self) -> Result<(), ActuatorError>;
}

/// Which sink the monitor drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    #[default]
    Log,
    Gpio,
    Memory,
}

/// Actuator configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ActuatorConfig {
    pub kind: SinkKind,
    pub gpio: GpioPins,
}

/// Build the configured sink
pub fn build_sink(config: &ActuatorConfig) -> Result<Box<dyn ActuatorSink>, ActuatorError> {
    info!("Using {:?} actuator sink", config.kind);
    Ok(match config.kind {
        SinkKind::Log => Box::new(LogSink),
        SinkKind::Gpio => Box::new(GpioSink::open(config.gpio.clone())?),
        SinkKind::Memory => Box::new(MemorySink::new()),
    })
}

/// Reports actuator changes through tracing only
#[derive(Debug, Default)]
pub struct LogSink;

impl ActuatorSink for LogSink {
    fn set_indicator(&mut self, indicator: PresenceIndicator) -> Result<(), ActuatorError> {
        info!(indicator = ?indicator, "Presence indicator");
        Ok(())
    }

    fn start_alarm(&mut self) -> Result<(), ActuatorError> {
        warn!("ALARM ON");
        Ok(())
    }

    fn stop_alarm(&mut self) -> Result<(), ActuatorError> {
        info!("Alarm off");
        Ok(())
    }
}

/// Command recorded by [`MemorySink`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorCommand {
    Indicator(PresenceIndicator),
    StartAlarm,
    StopAlarm,
}

/// Records commands in memory. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    commands: Arc<Mutex<Vec<ActuatorCommand>>>,
    failing: Arc<AtomicBool>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the commands received so far
    pub fn commands(&self) -> Vec<ActuatorCommand> {
        self.commands.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Make every following call fail (and not be recorded)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn record(&self, command: ActuatorCommand) -> Result<(), ActuatorError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ActuatorError::Unavailable("memory sink set to fail".into()));
        }
        self.commands
            .lock()
            .map_err(|_| ActuatorError::Unavailable("command log poisoned".into()))?
            .push(command);
        Ok(())
    }
}

impl ActuatorSink for MemorySink {
    fn set_indicator(&mut self, indicator: PresenceIndicator) -> Result<(), ActuatorError> {
        self.record(ActuatorCommand::Indicator(indicator))
    }

    fn start_alarm(&mut self) -> Result<(), ActuatorError> {
        self.record(ActuatorCommand::StartAlarm)
    }

    fn stop_alarm(&mut self) -> Result<(), ActuatorError> {
        self.record(ActuatorCommand::StopAlarm)
    }
}
