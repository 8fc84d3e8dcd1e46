use super::state::AppState;
use crate::capture::{CaptureStats, Phase};
use crate::error::{CaptureError, StoreError};
use crate::store::RecordingSession;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct UpdateNotesRequest {
    pub notes: String,
}

/// Result of a capture intent
#[derive(Debug, Serialize)]
pub struct CaptureResponse {
    pub phase: Phase,
    pub recording: Option<RecordingSession>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Pipeline failure rendered as an HTTP response
pub struct ApiError(CaptureError);

impl From<CaptureError> for ApiError {
    fn from(err: CaptureError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CaptureError::NoSession | CaptureError::InvalidTransition { .. } => StatusCode::CONFLICT,
            CaptureError::DeviceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            CaptureError::LifecycleCallFailed {
                source: StoreError::Status { status: 404, .. },
                ..
            } => StatusCode::NOT_FOUND,
            CaptureError::LifecycleCallFailed { .. } | CaptureError::UploadFailed { .. } => {
                StatusCode::BAD_GATEWAY
            }
            CaptureError::Encoder(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        warn!("Capture request failed ({}): {}", status, self.0);

        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

fn capture_response(state: &AppState) -> Json<CaptureResponse> {
    Json(CaptureResponse {
        phase: state.pipeline.phase(),
        recording: state.pipeline.recording(),
    })
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /capture/session
/// Create a new recording session on the store and attach it
pub async fn create_session(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let session = state.pipeline.create_and_attach().await?;
    info!("Created recording session {}", session.id);

    Ok((StatusCode::CREATED, Json(session)))
}

/// POST /capture/session/:recording_id
/// Attach an existing recording session
pub async fn attach_session(
    State(state): State<AppState>,
    Path(recording_id): Path<String>,
) -> Result<Json<RecordingSession>, ApiError> {
    let session = state.pipeline.attach_by_id(&recording_id).await?;
    Ok(Json(session))
}

/// DELETE /capture/session
/// Detach the current session, finishing an active recording first
pub async fn detach_session(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.pipeline.detach().await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /capture/start
pub async fn start_capture(State(state): State<AppState>) -> Result<Json<CaptureResponse>, ApiError> {
    state.pipeline.start().await?;
    Ok(capture_response(&state))
}

/// POST /capture/pause
pub async fn pause_capture(State(state): State<AppState>) -> Result<Json<CaptureResponse>, ApiError> {
    state.pipeline.pause().await?;
    Ok(capture_response(&state))
}

/// POST /capture/resume
pub async fn resume_capture(State(state): State<AppState>) -> Result<Json<CaptureResponse>, ApiError> {
    state.pipeline.resume().await?;
    Ok(capture_response(&state))
}

/// POST /capture/finish
/// Finish the recording; retries the finish call if a previous one failed
pub async fn finish_capture(State(state): State<AppState>) -> Result<Json<CaptureResponse>, ApiError> {
    match state.pipeline.phase() {
        Phase::Ending => state.pipeline.retry_finish().await?,
        _ => state.pipeline.finish().await?,
    }
    Ok(capture_response(&state))
}

/// GET /capture/status
/// Answers immediately, even while a pause or finish is draining uploads
pub async fn get_status(State(state): State<AppState>) -> Json<CaptureStats> {
    Json(state.pipeline.stats())
}

/// GET /capture/recording
/// Re-read the attached session from the store
pub async fn get_recording(State(state): State<AppState>) -> Result<Json<RecordingSession>, ApiError> {
    let session = state.pipeline.refresh().await?;
    Ok(Json(session))
}

/// PATCH /capture/notes
pub async fn update_notes(
    State(state): State<AppState>,
    Json(req): Json<UpdateNotesRequest>,
) -> Result<Json<RecordingSession>, ApiError> {
    let session = state.pipeline.update_notes(&req.notes).await?;
    Ok(Json(session))
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
