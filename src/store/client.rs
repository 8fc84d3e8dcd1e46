use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

use super::models::{AudioChunk, ChunkReceipt, RecordingSession};
use crate::config::StoreConfig;
use crate::error::StoreError;

/// Remote session store operations consumed by the capture pipeline
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    /// Create a new session (`status = active`)
    async fn create_session(&self) -> Result<RecordingSession, StoreError>;

    /// Read the current snapshot of a session
    async fn read_session(&self, id: &str) -> Result<RecordingSession, StoreError>;

    /// Mark a session paused
    async fn pause_session(&self, id: &str) -> Result<RecordingSession, StoreError>;

    /// Mark a session ended; the store starts transcription
    async fn finish_session(&self, id: &str) -> Result<RecordingSession, StoreError>;

    /// Upload one chunk; the store increments `chunk_count` on success
    async fn upload_chunk(&self, chunk: &AudioChunk) -> Result<ChunkReceipt, StoreError>;

    /// Replace the notes of a session
    async fn update_notes(&self, id: &str, notes: &str) -> Result<RecordingSession, StoreError>;
}

#[derive(Serialize)]
struct UpdateNotesRequest<'a> {
    notes: &'a str,
}

/// `SessionStore` backed by the recordings REST API
pub struct HttpSessionStore {
    client: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
}

impl HttpSessionStore {
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        info!("Session store client targeting {}", config.base_url);

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone().filter(|t| !t.is_empty()),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let request = self.client.request(method, url);
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, StoreError> {
        let response = check_status(request.send().await?).await?;
        Ok(response.json().await?)
    }

    /// Check that the store is reachable
    pub async fn health(&self) -> Result<(), StoreError> {
        check_status(self.request(Method::GET, "/health").send().await?).await?;
        Ok(())
    }
}

/// Map non-2xx responses to `StoreError::Status`, keeping the server's detail
async fn check_status(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("detail").map(|d| match d.as_str() {
            Some(s) => s.to_string(),
            None => d.to_string(),
        }))
        .unwrap_or(body);

    Err(StoreError::Status {
        status: status.as_u16(),
        detail,
    })
}

#[async_trait::async_trait]
impl SessionStore for HttpSessionStore {
    async fn create_session(&self) -> Result<RecordingSession, StoreError> {
        let session: RecordingSession = self.send(self.request(Method::POST, "/recordings/")).await?;
        info!("Created recording session {}", session.id);
        Ok(session)
    }

    async fn read_session(&self, id: &str) -> Result<RecordingSession, StoreError> {
        self.send(self.request(Method::GET, &format!("/recordings/{}", id)))
            .await
    }

    async fn pause_session(&self, id: &str) -> Result<RecordingSession, StoreError> {
        self.send(self.request(Method::PATCH, &format!("/recordings/{}/pause", id)))
            .await
    }

    async fn finish_session(&self, id: &str) -> Result<RecordingSession, StoreError> {
        self.send(self.request(Method::POST, &format!("/recordings/{}/finish", id)))
            .await
    }

    async fn upload_chunk(&self, chunk: &AudioChunk) -> Result<ChunkReceipt, StoreError> {
        let part = Part::bytes(chunk.payload.clone())
            .file_name(chunk.file_name())
            .mime_str("audio/wav")?;

        let form = Form::new()
            .text("chunk_index", chunk.chunk_index.to_string())
            .part("audio_chunk", part)
            .text("duration_seconds", format!("{:.3}", chunk.duration_seconds));

        debug!(
            "Uploading chunk {} of {} ({} bytes)",
            chunk.chunk_index,
            chunk.recording_id,
            chunk.payload.len()
        );

        let path = format!("/recordings/{}/chunks", chunk.recording_id);
        self.send(self.request(Method::POST, &path).multipart(form))
            .await
    }

    async fn update_notes(&self, id: &str, notes: &str) -> Result<RecordingSession, StoreError> {
        let path = format!("/recordings/{}/notes", id);
        self.send(self.request(Method::PATCH, &path).json(&UpdateNotesRequest { notes }))
            .await
    }
}
