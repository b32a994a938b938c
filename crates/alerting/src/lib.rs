//! Alerting System
//!
//! Drives the presence indicator and the drowsiness alarm from per-frame
//! DMS results. Sinks are idempotent behind the [`AlarmManager`].

mod actuator;
mod gpio;
mod manager;

pub use actuator::{
    build_sink, ActuatorCommand, ActuatorConfig, ActuatorError, ActuatorSink, LogSink,
    MemorySink, PresenceIndicator, SinkKind,
};
pub use gpio::{GpioPins, GpioSink};
pub use manager::AlarmManager;
