use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, patch, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Session attachment
        .route(
            "/capture/session",
            post(handlers::create_session).delete(handlers::detach_session),
        )
        .route("/capture/session/:recording_id", post(handlers::attach_session))
        // Capture intents
        .route("/capture/start", post(handlers::start_capture))
        .route("/capture/pause", post(handlers::pause_capture))
        .route("/capture/resume", post(handlers::resume_capture))
        .route("/capture/finish", post(handlers::finish_capture))
        // Queries
        .route("/capture/status", get(handlers::get_status))
        .route("/capture/recording", get(handlers::get_recording))
        .route("/capture/notes", patch(handlers::update_notes))
        // Request logging; the UI runs on another origin
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
