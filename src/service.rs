// Transcription service
// Ties the oracle, the notation pipeline, and persistent state together

use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

use crate::audio::{inspect_upload, AudioError};
use crate::config::{ConfigError, FretscribeConfig};
use crate::events::midi::{write_midi, WriteError};
use crate::events::oracle::{OracleError, OracleGate, PitchOracle};
use crate::pipeline::{
    process_midi, PipelineError, PipelineSettings, PipelineWarning, Stage, TraceEntry, TraceWriter,
};
use crate::state::db::{init_db, DbConnection, DbError};
use crate::state::models::{Artifact, Request, RequestSource, RequestStatus, RequestWithArtifacts};
use crate::state::queries;
use crate::state::storage::{self, StorageError};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Pipeline(#[from] PipelineError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("database error: {0}")]
    Database(#[from] DbError),

    #[error("transcription error: {0}")]
    Oracle(#[from] OracleError),

    #[error("transcription cannot be stored as MIDI: {0}")]
    Encode(#[from] WriteError),

    #[error("audio upload rejected: {0}")]
    Audio(#[from] AudioError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("request {0} not found")]
    NotFound(Uuid),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("background task failed: {0}")]
    Task(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Serializable error body for callers that only want a message
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub message: String,
}

impl<E: std::fmt::Display> From<E> for ErrorResponse {
    fn from(error: E) -> Self {
        ErrorResponse {
            message: error.to_string(),
        }
    }
}

/// A produced (or cached) notation document
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptionResult {
    pub request_id: Uuid,
    pub semitones: i32,
    pub artifact_path: PathBuf,
    pub sha256: String,

    /// True when an existing artifact was returned without re-rendering
    pub cached: bool,

    pub warnings: Vec<PipelineWarning>,

    #[serde(skip)]
    pub xml: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub oracle: String,
    pub oracle_ready: bool,

    /// A transcription currently holds the oracle
    pub oracle_busy: bool,
    pub database: bool,
    pub data_dir: PathBuf,
}

/// Facade over the whole system: one instance per data directory
#[derive(Clone)]
pub struct Transcriber {
    db: DbConnection,
    root: PathBuf,
    settings: PipelineSettings,
    oracle: OracleGate,
}

impl Transcriber {
    pub fn new(
        db: DbConnection,
        root: PathBuf,
        settings: PipelineSettings,
        oracle: OracleGate,
    ) -> ServiceResult<Self> {
        storage::ensure_layout(&root)?;
        Ok(Transcriber {
            db,
            root,
            settings,
            oracle,
        })
    }

    /// Open the data directory named by the config
    pub fn open(config: &FretscribeConfig, oracle: Box<dyn PitchOracle>) -> ServiceResult<Self> {
        let root = config.data_dir()?;
        let db = init_db(&root)?;
        Self::new(db, root, config.pipeline_settings()?, OracleGate::new(oracle))
    }

    pub fn data_dir(&self) -> &Path {
        &self.root
    }

    pub fn db(&self) -> &DbConnection {
        &self.db
    }

    /// Transcribe a recording, then process the resulting MIDI like an upload
    pub async fn process_audio(&self, audio: Vec<u8>) -> ServiceResult<TranscriptionResult> {
        let info = inspect_upload(&audio)?;
        log::info!(
            "Transcribing {} ms of audio ({} Hz, {} ch)",
            info.duration_ms,
            info.sample_rate,
            info.channels
        );

        let raw = self.oracle.transcribe(audio).await?;
        let midi = write_midi(&raw)?;
        let transcribed = TraceEntry::with_data(
            Stage::Transcribe,
            format!("Transcribed with {}", self.oracle.name()),
            serde_json::json!({
                "duration_ms": info.duration_ms,
                "notes": raw.notes.len(),
                "tracks": raw.note_tracks().len(),
            }),
        );

        self.ingest(midi, RequestSource::Audio, Some(transcribed)).await
    }

    /// Store a MIDI upload and produce its untransposed notation
    pub async fn ingest_midi(&self, midi: Vec<u8>) -> ServiceResult<TranscriptionResult> {
        if midi.is_empty() {
            return Err(ServiceError::InvalidInput("empty MIDI upload".to_string()));
        }
        self.ingest(midi, RequestSource::Midi, None).await
    }

    async fn ingest(
        &self,
        midi: Vec<u8>,
        source: RequestSource,
        transcribed: Option<TraceEntry>,
    ) -> ServiceResult<TranscriptionResult> {
        let id = Uuid::new_v4();
        if let Some(entry) = transcribed {
            self.append_trace(&id, &[entry]);
        }
        let (midi_path, midi_sha256) = storage::store_raw_midi(&self.root, &id, &midi)?;
        queries::create_request(
            &self.db,
            id,
            source,
            midi_path.to_string_lossy().into_owned(),
            midi_sha256.clone(),
        )?;
        queries::update_request_status(&self.db, &id, RequestStatus::Processing, None)?;

        match self.render(id, 0, midi, midi_sha256).await {
            Ok(result) => {
                queries::update_request_status(&self.db, &id, RequestStatus::Complete, None)?;
                log::info!("Request {} complete", id);
                Ok(result)
            }
            Err(e) => {
                log::error!("Request {} failed: {}", id, e);
                queries::update_request_status(
                    &self.db,
                    &id,
                    RequestStatus::Failed,
                    Some(&e.to_string()),
                )?;
                Err(e)
            }
        }
    }

    /// Notation for a stored request shifted by `semitones`.
    ///
    /// Always renders from the stored original MIDI. An existing artifact is
    /// reused while the MIDI it came from is unchanged.
    pub async fn transpose(&self, id: Uuid, semitones: i32) -> ServiceResult<TranscriptionResult> {
        let request = self.request(&id)?;
        let midi = storage::read_file(Path::new(&request.midi_path))?;
        let source_sha256 = storage::calculate_sha256(&midi);

        if let Some(artifact) = queries::find_artifact(&self.db, &id, semitones)? {
            if let Some(result) = self.cached(&artifact, &source_sha256)? {
                log::info!("Reusing {} for request {}", artifact.path, id);
                return Ok(result);
            }
        }

        self.render(id, semitones, midi, source_sha256).await
    }

    pub fn request(&self, id: &Uuid) -> ServiceResult<Request> {
        queries::get_request(&self.db, id)?.ok_or(ServiceError::NotFound(*id))
    }

    /// A request together with every artifact rendered for it
    pub fn describe(&self, id: &Uuid) -> ServiceResult<RequestWithArtifacts> {
        queries::get_request_with_artifacts(&self.db, id)?.ok_or(ServiceError::NotFound(*id))
    }

    /// Never waits on an in-flight transcription
    pub async fn health(&self) -> HealthReport {
        let oracle = self.oracle.name().to_string();
        let oracle_ready = self.oracle.is_ready();
        let oracle_busy = self.oracle.is_busy();
        let database = self
            .db
            .lock()
            .query_row("SELECT 1", [], |row| row.get::<_, i32>(0))
            .is_ok();

        HealthReport {
            healthy: oracle_ready && database,
            oracle,
            oracle_ready,
            oracle_busy,
            database,
            data_dir: self.root.clone(),
        }
    }

    /// Cached artifact contents, if the file is intact and its source unchanged
    fn cached(&self, artifact: &Artifact, source_sha256: &str) -> ServiceResult<Option<TranscriptionResult>> {
        if artifact.source_sha256 != source_sha256 {
            log::debug!("Source changed since {} was rendered", artifact.path);
            return Ok(None);
        }

        let path = PathBuf::from(&artifact.path);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if storage::calculate_sha256(&bytes) != artifact.sha256 {
            log::warn!("Artifact {} does not match its recorded hash", artifact.path);
            return Ok(None);
        }

        let xml = String::from_utf8(bytes)
            .map_err(|e| ServiceError::InvalidInput(format!("artifact is not UTF-8: {}", e)))?;

        Ok(Some(TranscriptionResult {
            request_id: artifact.request_id,
            semitones: artifact.semitones,
            artifact_path: path,
            sha256: artifact.sha256.clone(),
            cached: true,
            warnings: Vec::new(),
            xml,
        }))
    }

    /// Run the pipeline off the async runtime and persist the artifact
    async fn render(
        &self,
        id: Uuid,
        semitones: i32,
        midi: Vec<u8>,
        source_sha256: String,
    ) -> ServiceResult<TranscriptionResult> {
        let settings = self.settings.clone();
        let output = tokio::task::spawn_blocking(move || process_midi(&midi, semitones, &settings))
            .await
            .map_err(|e| ServiceError::Task(e.to_string()))??;

        let path = storage::artifact_path(&self.root, &id, semitones);
        let sha256 = storage::write_atomic(&path, output.xml.as_bytes())?;

        if let Err(e) = queries::upsert_artifact(
            &self.db,
            id,
            semitones,
            path.to_string_lossy().into_owned(),
            sha256.clone(),
            source_sha256,
            output.xml.len() as i64,
        ) {
            // No artifact without its row
            storage::remove_if_exists(&path)?;
            return Err(e.into());
        }

        let mut trace = output.trace;
        trace.push(TraceEntry::with_data(
            Stage::Store,
            format!("Stored {}", path.display()),
            serde_json::json!({ "semitones": semitones, "sha256": sha256 }),
        ));
        self.append_trace(&id, &trace);

        Ok(TranscriptionResult {
            request_id: id,
            semitones,
            artifact_path: path,
            sha256,
            cached: false,
            warnings: output.warnings,
            xml: output.xml,
        })
    }

    fn append_trace(&self, id: &Uuid, entries: &[TraceEntry]) {
        let writer = TraceWriter::new(storage::trace_path(&self.root, id));
        if let Err(e) = writer.write_batch(entries) {
            log::warn!("Could not write trace for {}: {}", id, e);
        }
    }
}
