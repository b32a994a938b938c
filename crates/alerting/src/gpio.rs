//! Linux sysfs GPIO sink: green/red presence LEDs and a buzzer

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::actuator::{ActuatorError, ActuatorSink, PresenceIndicator};

/// GPIO pin assignment (BCM numbering)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GpioPins {
    /// sysfs GPIO root
    pub base_path: PathBuf,
    pub green_led: u32,
    pub red_led: u32,
    pub buzzer: u32,
}

impl Default for GpioPins {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("/sys/class/gpio"),
            green_led: 17,
            red_led: 27,
            buzzer: 22,
        }
    }
}

/// Drives LEDs and buzzer through `/sys/class/gpio`
pub struct GpioSink {
    pins: GpioPins,
}

impl GpioSink {
    /// Export the pins as outputs and switch everything off
    pub fn open(pins: GpioPins) -> Result<Self, ActuatorError> {
        let sink = Self { pins };
        for pin in sink.all_pins() {
            sink.export(pin)?;
            sink.write(pin, false)?;
        }
        info!(
            "GPIO ready: green={} red={} buzzer={}",
            sink.pins.green_led, sink.pins.red_led, sink.pins.buzzer
        );
        Ok(sink)
    }

    fn all_pins(&self) -> [u32; 3] {
        [self.pins.green_led, self.pins.red_led, self.pins.buzzer]
    }

    fn pin_dir(&self, pin: u32) -> PathBuf {
        self.pins.base_path.join(format!("gpio{}", pin))
    }

    fn export(&self, pin: u32) -> Result<(), ActuatorError> {
        let io = |source| ActuatorError::Gpio { pin, source };

        if !self.pin_dir(pin).exists() {
            debug!("Exporting GPIO {}", pin);
            fs::write(self.pins.base_path.join("export"), pin.to_string()).map_err(io)?;
        }
        fs::write(self.pin_dir(pin).join("direction"), "out").map_err(io)
    }

    fn write(&self, pin: u32, on: bool) -> Result<(), ActuatorError> {
        fs::write(self.pin_dir(pin).join("value"), if on { "1" } else { "0" })
            .map_err(|source| ActuatorError::Gpio { pin, source })
    }
}

impl ActuatorSink for GpioSink {
    fn set_indicator(&mut self, indicator: PresenceIndicator) -> Result<(), ActuatorError> {
        let (green, red) = match indicator {
            PresenceIndicator::Off => (false, false),
            PresenceIndicator::Present => (true, false),
            PresenceIndicator::Absent => (false, true),
            PresenceIndicator::All => (true, true),
        };
        self.write(self.pins.green_led, green)?;
        self.write(self.pins.red_led, red)
    }

    fn start_alarm(&mut self) -> Result<(), ActuatorError> {
        self.write(self.pins.buzzer, true)
    }

    fn stop_alarm(&mut self) -> Result<(), ActuatorError> {
        self.write(self.pins.buzzer, false)
    }
}

impl Drop for GpioSink {
    fn drop(&mut self) {
        for pin in self.all_pins() {
            if let Err(e) = self.write(pin, false) {
                warn!("Failed to switch off GPIO {}: {}", pin, e);
            }
        }
    }
}
