// Data models for transcription requests and their artifacts
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One transcription request: an uploaded recording or MIDI file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub source: RequestSource,
    pub midi_path: String,
    pub midi_sha256: String,
    pub status: RequestStatus,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestSource {
    Audio,
    Midi,
}

impl RequestSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestSource::Audio => "audio",
            RequestSource::Midi => "midi",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "audio" => RequestSource::Audio,
            _ => RequestSource::Midi,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Processing,
    Complete,
    Failed,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Processing => "processing",
            RequestStatus::Complete => "complete",
            RequestStatus::Failed => "failed",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "pending" => RequestStatus::Pending,
            "processing" => RequestStatus::Processing,
            "complete" => RequestStatus::Complete,
            "failed" => RequestStatus::Failed,
            _ => RequestStatus::Pending,
        }
    }
}

/// A MusicXML document produced for a request at one transposition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: Uuid,
    pub request_id: Uuid,
    pub semitones: i32,
    pub created_at: DateTime<Utc>,
    pub path: String,
    pub sha256: String,

    /// Hash of the MIDI the artifact was rendered from
    pub source_sha256: String,
    pub bytes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestWithArtifacts {
    pub request: Request,
    pub artifacts: Vec<Artifact>,
}
