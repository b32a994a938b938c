//! Monitoring session: capture thread, actuator task and their lifecycle

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use alerting::{ActuatorError, AlarmManager};
use camera_capture::{CameraError, FrameSource};
use chrono::{DateTime, Utc};
use dms::{AlarmEdge, DmsModule, FrameAnalysis};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Session errors
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session already running")]
    AlreadyRunning,

    #[error("Session not running")]
    NotRunning,

    #[error("Session unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to spawn capture thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Actuator failure: {0}")]
    Actuator(#[from] ActuatorError),
}

/// Collaborators a session runs with; handed back on stop
pub struct SessionParts {
    pub source: Box<dyn FrameSource>,
    pub dms: DmsModule,
    pub alarm: AlarmManager,
}

/// Session tuning
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Minimum time between frames, `None` for unthrottled
    pub frame_interval: Option<Duration>,
    /// Capacity of the capture -> actuator channel
    pub channel_capacity: usize,
    /// How long each actuator self-test step is held
    pub self_test_step: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            frame_interval: None,
            channel_capacity: 32,
            self_test_step: Duration::from_secs(1),
        }
    }
}

/// One observed frame as seen by the actuator side
#[derive(Debug, Clone, Serialize)]
pub struct StatusRecord {
    pub sequence: u64,
    pub timestamp_ns: u64,
    #[serde(flatten)]
    pub analysis: FrameAnalysis,
}

/// Snapshot of the session for the control surface
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionStatus {
    pub running: bool,
    pub session_id: Option<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
    /// Consecutive drowsy frames that raise the alarm
    pub threshold: u32,
    /// Frames reaching the tracker per second, over the last full second
    pub measured_fps: Option<f64>,
    pub frames_observed: u64,
    pub frames_skipped: u64,
    pub alarm_episodes: u64,
    pub alarm_on: bool,
    pub latest: Option<StatusRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SkipReason {
    Capture,
    Classification,
    UnknownLabel,
}

impl SkipReason {
    fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Capture => "capture",
            SkipReason::Classification => "classification",
            SkipReason::UnknownLabel => "unknown_label",
        }
    }
}

/// Message from the capture thread, one per polled frame
#[derive(Debug)]
enum PumpEvent {
    Observed(StatusRecord),
    Skipped(SkipReason),
}

/// Frame rate over fixed windows
#[derive(Debug)]
struct FpsMeter {
    window: Duration,
    started: Instant,
    frames: u32,
}

impl FpsMeter {
    fn new(started: Instant) -> Self {
        Self {
            window: Duration::from_secs(1),
            started,
            frames: 0,
        }
    }

    /// Count a frame; yields the rate each time a window completes
    fn tick(&mut self, now: Instant) -> Option<f64> {
        self.frames += 1;
        let elapsed = now.saturating_duration_since(self.started);
        if elapsed < self.window {
            return None;
        }
        let fps = self.frames as f64 / elapsed.as_secs_f64();
        self.started = now;
        self.frames = 0;
        Some(fps)
    }
}

/// Capture-side half of the collaborators
struct Pump {
    source: Box<dyn FrameSource>,
    dms: DmsModule,
}

struct Running {
    shutdown: Arc<AtomicBool>,
    capture: JoinHandle<Pump>,
    actuators: tokio::task::JoinHandle<AlarmManager>,
}

/// Drowsiness monitoring session.
///
/// Owns the frame source, the DMS module and the alarm manager. While
/// running, frames are captured and classified on a dedicated thread and
/// results flow in order to an actuator task.
pub struct MonitorSession {
    options: SessionOptions,
    idle: Option<SessionParts>,
    running: Option<Running>,
    status: Arc<RwLock<SessionStatus>>,
}

impl MonitorSession {
    pub fn new(parts: SessionParts, options: SessionOptions) -> Self {
        let status = SessionStatus {
            threshold: parts.dms.tracker().threshold(),
            ..Default::default()
        };
        Self {
            options,
            idle: Some(parts),
            running: None,
            status: Arc::new(RwLock::new(status)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub async fn status(&self) -> SessionStatus {
        self.status.read().await.clone()
    }

    /// Shared status, readable without holding the session
    pub fn status_handle(&self) -> Arc<RwLock<SessionStatus>> {
        self.status.clone()
    }

    /// Start pumping frames with a freshly reset tracker
    pub async fn start(&mut self) -> Result<SessionStatus, SessionError> {
        if self.running.is_some() {
            return Err(SessionError::AlreadyRunning);
        }
        let SessionParts {
            source,
            mut dms,
            alarm,
        } = self
            .idle
            .take()
            .ok_or_else(|| SessionError::Unavailable("collaborators lost by a previous session".into()))?;

        dms.reset_state();
        let session_id = Uuid::new_v4();
        let snapshot = {
            let mut status = self.status.write().await;
            *status = SessionStatus {
                running: true,
                session_id: Some(session_id),
                started_at: Some(Utc::now()),
                threshold: dms.tracker().threshold(),
                ..Default::default()
            };
            status.clone()
        };

        let (tx, rx) = mpsc::channel(self.options.channel_capacity);
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = shutdown.clone();
        let interval = self.options.frame_interval;
        let pump = Pump { source, dms };

        let capture = std::thread::Builder::new()
            .name("dms-capture".into())
            .spawn(move || run_capture(pump, tx, flag, interval));

        let capture = match capture {
            Ok(handle) => handle,
            Err(e) => {
                error!("Failed to spawn capture thread: {}", e);
                self.status.write().await.running = false;
                return Err(SessionError::Spawn(e));
            }
        };

        let actuators = tokio::spawn(run_actuators(alarm, rx, self.status.clone()));

        self.running = Some(Running {
            shutdown,
            capture,
            actuators,
        });

        info!(%session_id, "Monitoring session started");
        Ok(snapshot)
    }

    /// Halt the pump, silence the alarm and reset driver state
    pub async fn stop(&mut self) -> Result<SessionStatus, SessionError> {
        let Running {
            shutdown,
            capture,
            actuators,
        } = self.running.take().ok_or(SessionError::NotRunning)?;

        shutdown.store(true, Ordering::SeqCst);

        let pump = match tokio::task::spawn_blocking(move || capture.join()).await {
            Ok(Ok(pump)) => Some(pump),
            Ok(Err(_)) => {
                error!("Capture thread panicked");
                None
            }
            Err(e) => {
                error!("Failed to join capture thread: {}", e);
                None
            }
        };

        // the channel closes with the capture thread, so this drains and ends
        let alarm = match actuators.await {
            Ok(alarm) => Some(alarm),
            Err(e) => {
                error!("Actuator task failed: {}", e);
                None
            }
        };

        let mut alarm_on = false;
        let result = match (pump, alarm) {
            (Some(mut pump), Some(mut alarm)) => {
                pump.dms.reset_state();
                alarm.silence();
                alarm_on = alarm.alarm_on();
                self.idle = Some(SessionParts {
                    source: pump.source,
                    dms: pump.dms,
                    alarm,
                });
                Ok(())
            }
            (_, alarm) => {
                if let Some(mut alarm) = alarm {
                    alarm.silence();
                    alarm_on = alarm.alarm_on();
                }
                Err(SessionError::Unavailable("session worker failed".into()))
            }
        };
        if alarm_on {
            error!("Alarm could not be silenced; actuator still reports it on");
        }

        let snapshot = {
            let mut status = self.status.write().await;
            status.running = false;
            status.alarm_on = alarm_on;
            status.clone()
        };
        metrics::gauge!("dms_drowsy_counter").set(0.0);

        result?;
        info!(
            "Monitoring session stopped after {} frames",
            snapshot.frames_observed
        );
        Ok(snapshot)
    }

    /// Run the actuator self-test. Only while idle.
    pub async fn self_test(&mut self) -> Result<(), SessionError> {
        if self.running.is_some() {
            return Err(SessionError::AlreadyRunning);
        }
        let mut parts = self
            .idle
            .take()
            .ok_or_else(|| SessionError::Unavailable("collaborators lost by a previous session".into()))?;

        let step = self.options.self_test_step;
        let (parts, result) = tokio::task::spawn_blocking(move || {
            let result = parts.alarm.self_test(step);
            (parts, result)
        })
        .await
        .map_err(|e| SessionError::Unavailable(format!("self-test worker failed: {}", e)))?;

        self.status.write().await.alarm_on = parts.alarm.alarm_on();
        self.idle = Some(parts);
        result.map_err(SessionError::from)
    }
}

impl Drop for MonitorSession {
    fn drop(&mut self) {
        if let Some(running) = &self.running {
            running.shutdown.store(true, Ordering::SeqCst);
        }
    }
}

fn run_capture(
    mut pump: Pump,
    tx: mpsc::Sender<PumpEvent>,
    shutdown: Arc<AtomicBool>,
    interval: Option<Duration>,
) -> Pump {
    info!("Capturing from '{}'", pump.source.name());

    while !shutdown.load(Ordering::SeqCst) {
        let started = Instant::now();

        let event = match pump.source.capture() {
            Ok(frame) => match pump.dms.analyze(&frame) {
                Ok(Some(analysis)) => PumpEvent::Observed(StatusRecord {
                    sequence: frame.sequence,
                    timestamp_ns: frame.timestamp_ns,
                    analysis,
                }),
                Ok(None) => PumpEvent::Skipped(SkipReason::UnknownLabel),
                Err(e) => {
                    warn!("Skipping frame {}: {}", frame.sequence, e);
                    PumpEvent::Skipped(SkipReason::Classification)
                }
            },
            Err(CameraError::EndOfStream) => {
                info!("Frame source exhausted");
                break;
            }
            Err(e) => {
                warn!("Capture failed: {}", e);
                PumpEvent::Skipped(SkipReason::Capture)
            }
        };

        if tx.blocking_send(event).is_err() {
            debug!("Actuator task gone, stopping capture");
            break;
        }

        if let Some(interval) = interval {
            let elapsed = started.elapsed();
            if elapsed < interval {
                std::thread::sleep(interval - elapsed);
            }
        }
    }

    pump.dms.reset_state();
    pump
}

async fn run_actuators(
    mut alarm: AlarmManager,
    mut rx: mpsc::Receiver<PumpEvent>,
    status: Arc<RwLock<SessionStatus>>,
) -> AlarmManager {
    let mut meter = FpsMeter::new(Instant::now());

    while let Some(event) = rx.recv().await {
        // failed captures never reached the classifier
        if !matches!(event, PumpEvent::Skipped(SkipReason::Capture)) {
            if let Some(fps) = meter.tick(Instant::now()) {
                metrics::gauge!("dms_measured_fps").set(fps);
                let mut status = status.write().await;
                debug!(
                    "Measured {:.1} fps, alarm after {:.1}s of drowsiness",
                    fps,
                    status.threshold as f64 / fps
                );
                status.measured_fps = Some(fps);
            }
        }

        match event {
            PumpEvent::Observed(record) => {
                alarm.apply(&record.analysis);

                let observation = &record.analysis.observation;
                metrics::counter!("dms_frames_observed_total").increment(1);
                metrics::gauge!("dms_drowsy_counter").set(observation.drowsy_counter as f64);

                let mut status = status.write().await;
                status.frames_observed += 1;
                if observation.edge == Some(AlarmEdge::Rising) {
                    metrics::counter!("dms_alarm_episodes_total").increment(1);
                    status.alarm_episodes += 1;
                }
                status.alarm_on = alarm.alarm_on();
                status.latest = Some(record);
            }
            PumpEvent::Skipped(reason) => {
                metrics::counter!("dms_frames_skipped_total", "reason" => reason.as_str())
                    .increment(1);
                status.write().await.frames_skipped += 1;
            }
        }
    }
    alarm
}
