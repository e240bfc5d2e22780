// File system operations for stored MIDI sources and notation artifacts
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to get app data directory")]
    NoAppDataDir,
}

pub type StorageResult<T> = Result<T, StorageError>;

const MIDI_DIR: &str = "midi";
const SCORE_DIR: &str = "scores";
const TRACE_DIR: &str = "traces";

/// Platform data directory for fretscribe
pub fn default_data_dir() -> StorageResult<PathBuf> {
    let data_dir = dirs::data_dir().ok_or(StorageError::NoAppDataDir)?;
    Ok(data_dir.join("fretscribe"))
}

/// Create the directory layout under a data root
pub fn ensure_layout(root: &Path) -> StorageResult<()> {
    for dir in [MIDI_DIR, SCORE_DIR, TRACE_DIR] {
        fs::create_dir_all(root.join(dir))?;
    }
    Ok(())
}

/// File name of the original MIDI for a request
pub fn midi_file_name(id: &Uuid) -> String {
    format!("{}.mid", id)
}

/// File name of the MusicXML artifact for a request and transposition.
/// The untransposed result is `{id}.xml`; others are `{id}_trans{n}.xml`.
pub fn artifact_file_name(id: &Uuid, semitones: i32) -> String {
    if semitones == 0 {
        format!("{}.xml", id)
    } else {
        format!("{}_trans{}.xml", id, semitones)
    }
}

pub fn midi_path(root: &Path, id: &Uuid) -> PathBuf {
    root.join(MIDI_DIR).join(midi_file_name(id))
}

pub fn artifact_path(root: &Path, id: &Uuid, semitones: i32) -> PathBuf {
    root.join(SCORE_DIR).join(artifact_file_name(id, semitones))
}

pub fn trace_path(root: &Path, id: &Uuid) -> PathBuf {
    root.join(TRACE_DIR).join(format!("{}.jsonl", id))
}

/// Write a file by writing a sibling temp file and renaming it over the target.
/// Returns the SHA256 of the written data.
pub fn write_atomic(path: &Path, data: &[u8]) -> StorageResult<String> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = dir.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));

    let result = (|| -> std::io::Result<()> {
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
        fs::rename(&temp_path, path)
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&temp_path);
        return Err(e.into());
    }

    Ok(calculate_sha256(data))
}

/// Store the original MIDI for a request and return its path and SHA256 hash
pub fn store_raw_midi(root: &Path, id: &Uuid, data: &[u8]) -> StorageResult<(PathBuf, String)> {
    let path = midi_path(root, id);
    let hash = write_atomic(&path, data)?;
    Ok((path, hash))
}

/// Read a file from disk
pub fn read_file(path: &Path) -> StorageResult<Vec<u8>> {
    Ok(fs::read(path)?)
}

/// Delete a file, ignoring one that is already gone
pub fn remove_if_exists(path: &Path) -> StorageResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Calculate SHA256 hash of data
pub fn calculate_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
