//! Session Routes

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use crate::session::{SessionError, SessionStatus};
use crate::AppState;

/// Error body for rejected session requests
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        let status = match self {
            SessionError::AlreadyRunning | SessionError::NotRunning => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        warn!("Session request rejected: {}", self);
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// Current session status
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<SessionStatus> {
    Json(state.status.read().await.clone())
}

/// Start monitoring
pub async fn start(State(state): State<Arc<AppState>>) -> Result<Json<SessionStatus>, SessionError> {
    let mut session = state.session.lock().await;
    Ok(Json(session.start().await?))
}

/// Result of an actuator self-test
#[derive(Debug, Serialize)]
pub struct SelfTestResponse {
    pub status: String,
}

/// Cycle the LEDs and buzzer; rejected while a session runs
pub async fn self_test(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SelfTestResponse>, SessionError> {
    let mut session = state.session.lock().await;
    session.self_test().await?;
    Ok(Json(SelfTestResponse {
        status: "passed".to_string(),
    }))
}

/// Stop monitoring and silence the alarm
pub async fn stop(State(state): State<Arc<AppState>>) -> Result<Json<SessionStatus>, SessionError> {
    let mut session = state.session.lock().await;
    Ok(Json(session.stop().await?))
}
