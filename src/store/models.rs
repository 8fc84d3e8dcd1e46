use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Server-side status of a recording session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingStatus {
    Active,
    Paused,
    Ended,
}

impl fmt::Display for RecordingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Ended => "ended",
        };
        f.write_str(s)
    }
}

/// A recording session as owned by the remote session store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingSession {
    pub id: String,

    #[serde(default)]
    pub user_id: Option<String>,

    pub status: RecordingStatus,

    #[serde(default, with = "timestamp")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, with = "timestamp")]
    pub updated_at: Option<DateTime<Utc>>,

    /// Number of chunks the server has accepted
    #[serde(default)]
    pub chunk_count: u32,

    #[serde(default)]
    pub notes: Option<String>,

    /// Filled in by the server once transcription completes
    #[serde(default)]
    pub transcription_text: Option<String>,

    /// Path of the assembled audio on the server
    #[serde(default)]
    pub audio_file_path: Option<String>,

    #[serde(default)]
    pub llm_provider: Option<String>,
}

impl RecordingSession {
    pub fn is_ended(&self) -> bool {
        self.status == RecordingStatus::Ended
    }
}

/// A segment tagged for transmission to the session store
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub recording_id: String,
    /// 0-based, strictly increasing within one recording
    pub chunk_index: u32,
    pub payload: Vec<u8>,
    /// Approximate duration in seconds
    pub duration_seconds: f64,
}

impl AudioChunk {
    /// Upload file name used by the store
    pub fn file_name(&self) -> String {
        format!("chunk_{}.wav", self.chunk_index)
    }
}

/// Store acknowledgment for an uploaded chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkReceipt {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub chunk_id: Option<String>,
    pub chunk_index: u32,
    #[serde(default)]
    pub file_size: Option<u64>,
}

/// Timestamps with or without a UTC offset
///
/// The store emits naive ISO-8601 timestamps (implicitly UTC); RFC 3339
/// values are accepted as well.
mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => serializer.serialize_str(&ts.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        let Some(raw) = raw else {
            return Ok(None);
        };

        if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
            return Ok(Some(ts.with_timezone(&Utc)));
        }

        NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| Some(naive.and_utc()))
            .map_err(serde::de::Error::custom)
    }
}
