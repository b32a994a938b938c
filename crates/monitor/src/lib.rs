//! Drowsiness Monitor
//!
//! Runs the capture -> classify -> alarm session and exposes a small REST
//! surface to control and observe it.

use anyhow::Context;
use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::FmtSubscriber;

pub mod config;
mod routes;
pub mod session;

use alerting::{build_sink, AlarmManager};
use camera_capture::{DirectorySource, FrameSource, ReplaySource, VideoFrame};
use dms::DmsModule;
use inference_engine::ClassifierEngine;

pub use crate::config::{AppConfig, LoggingConfig};
pub use session::{MonitorSession, SessionError, SessionOptions, SessionParts, SessionStatus};

/// Application state shared across handlers
pub struct AppState {
    pub session: Mutex<MonitorSession>,
    pub status: Arc<RwLock<SessionStatus>>,
    pub version: String,
    pub start_time: std::time::Instant,
    /// Present when the Prometheus recorder is installed
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(session: MonitorSession, metrics: Option<PrometheusHandle>) -> Self {
        Self {
            status: session.status_handle(),
            session: Mutex::new(session),
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: std::time::Instant::now(),
            metrics,
        }
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub session_running: bool,
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(health_handler))
        .route("/api/v1/status", get(routes::session::get_status))
        .route("/api/v1/session/start", post(routes::session::start))
        .route("/api/v1/session/stop", post(routes::session::stop))
        .route("/api/v1/actuators/self-test", post(routes::session::self_test))
        .route("/metrics", get(routes::metrics::render))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp,
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        session_running: state.status.read().await.running,
    })
}

/// Initialize logging
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let builder = FmtSubscriber::builder()
        .with_max_level(config.max_level()?)
        .with_target(true);

    if config.json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

/// Wire the configured source, classifier and actuators into a session
pub fn build_session(config: &AppConfig) -> anyhow::Result<MonitorSession> {
    let source: Box<dyn FrameSource> = match &config.camera.frames_dir {
        Some(dir) => Box::new(
            DirectorySource::open(dir, config.camera.looping)
                .with_context(|| format!("opening frames in {}", dir.display()))?,
        ),
        None => {
            warn!("No frames directory configured. Replaying a synthetic frame.");
            let frame = VideoFrame::filled(config.camera.width, config.camera.height, [128, 128, 128]);
            Box::new(ReplaySource::new(vec![frame]).looping(true))
        }
    };

    let classifier =
        ClassifierEngine::new(config.classifier.clone()).context("loading classifier")?;
    let dms = DmsModule::new(&config.dms, Box::new(classifier))?;
    let alarm = AlarmManager::new(build_sink(&config.actuators).context("opening actuators")?);

    Ok(MonitorSession::new(
        SessionParts { source, dms, alarm },
        config.session_options(),
    ))
}

/// Run the server until ctrl-c, then stop any active session
pub async fn run_server(config: AppConfig) -> anyhow::Result<()> {
    let metrics = if config.server.metrics {
        Some(PrometheusBuilder::new().install_recorder()?)
    } else {
        None
    };

    let mut session = build_session(&config)?;
    if config.session.autostart {
        session.start().await?;
    }

    let state = Arc::new(AppState::new(session, metrics));
    let app = create_router(state.clone());

    info!("Starting API server on {}", config.server.addr);

    let listener = tokio::net::TcpListener::bind(&config.server.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let mut session = state.session.lock().await;
    if session.is_running() {
        session.stop().await?;
    }
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown requested");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    fn app() -> Router {
        let session = build_session(&AppConfig::default()).unwrap();
        create_router(Arc::new(AppState::new(session, None)))
    }

    async fn call(app: &Router, method: &str, uri: &str) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn test_health() {
        let app = app();
        let (status, body) = call(&app, "GET", "/api/v1/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["session_running"], false);
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let app = app();

        let (status, body) = call(&app, "POST", "/api/v1/session/start").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["running"], true);
        assert_eq!(body["threshold"], 30);
        assert!(body["session_id"].is_string());

        let (status, body) = call(&app, "POST", "/api/v1/session/start").await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "Session already running");

        let (status, body) = call(&app, "GET", "/api/v1/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["running"], true);

        let (status, body) = call(&app, "POST", "/api/v1/session/stop").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["running"], false);
        assert_eq!(body["alarm_on"], false);

        let (status, _) = call(&app, "POST", "/api/v1/session/stop").await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_actuator_self_test() {
        let mut config = AppConfig::default();
        config.session.self_test_step_ms = 0;
        let session = build_session(&config).unwrap();
        let app = create_router(Arc::new(AppState::new(session, None)));

        let (status, body) = call(&app, "POST", "/api/v1/actuators/self-test").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "passed");

        call(&app, "POST", "/api/v1/session/start").await;
        let (status, _) = call(&app, "POST", "/api/v1/actuators/self-test").await;
        assert_eq!(status, StatusCode::CONFLICT);
        call(&app, "POST", "/api/v1/session/stop").await;
    }

    #[tokio::test]
    async fn test_metrics_disabled() {
        let app = app();
        let (status, _) = call(&app, "GET", "/metrics").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
