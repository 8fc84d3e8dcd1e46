//! Remote session store
//!
//! The recordings REST API owns session status and chunk storage:
//! - POST /recordings/ - Create a session
//! - GET /recordings/:id - Read a session
//! - POST /recordings/:id/chunks - Upload a chunk (multipart)
//! - PATCH /recordings/:id/pause - Pause a session
//! - POST /recordings/:id/finish - Finish a session (starts transcription)
//! - PATCH /recordings/:id/notes - Update notes

mod client;
mod models;

pub use client::{HttpSessionStore, SessionStore};
pub use models::{AudioChunk, ChunkReceipt, RecordingSession, RecordingStatus};
