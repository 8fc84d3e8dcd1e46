//! HTTP API server for external control (note-taking UI)
//!
//! This module provides a local REST API over the capture pipeline:
//! - POST /capture/session - Create a recording session and attach it
//! - POST /capture/session/:id - Attach an existing session
//! - DELETE /capture/session - Detach (finishing an active recording first)
//! - POST /capture/start | pause | resume | finish - Capture intents
//! - GET /capture/status - Pipeline snapshot
//! - GET /capture/recording - Latest session snapshot
//! - PATCH /capture/notes - Update session notes
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
