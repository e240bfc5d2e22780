// Database CRUD operations
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use uuid::Uuid;

use super::db::{DbConnection, DbResult};
use super::models::{Artifact, Request, RequestSource, RequestStatus, RequestWithArtifacts};

fn conversion_error<E>(index: usize, error: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, Box::new(error))
}

fn uuid_at(row: &Row<'_>, index: usize) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(&row.get::<_, String>(index)?).map_err(|e| conversion_error(index, e))
}

fn time_at(row: &Row<'_>, index: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&row.get::<_, String>(index)?)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(index, e))
}

fn request_from_row(row: &Row<'_>) -> rusqlite::Result<Request> {
    Ok(Request {
        id: uuid_at(row, 0)?,
        created_at: time_at(row, 1)?,
        source: RequestSource::from_string(&row.get::<_, String>(2)?),
        midi_path: row.get(3)?,
        midi_sha256: row.get(4)?,
        status: RequestStatus::from_string(&row.get::<_, String>(5)?),
        error: row.get(6)?,
    })
}

fn artifact_from_row(row: &Row<'_>) -> rusqlite::Result<Artifact> {
    Ok(Artifact {
        id: uuid_at(row, 0)?,
        request_id: uuid_at(row, 1)?,
        semitones: row.get(2)?,
        created_at: time_at(row, 3)?,
        path: row.get(4)?,
        sha256: row.get(5)?,
        source_sha256: row.get(6)?,
        bytes: row.get(7)?,
    })
}

// ==================== REQUEST QUERIES ====================

/// Record a new request in the pending state
pub fn create_request(
    db: &DbConnection,
    id: Uuid,
    source: RequestSource,
    midi_path: String,
    midi_sha256: String,
) -> DbResult<Request> {
    let request = Request {
        id,
        created_at: Utc::now(),
        source,
        midi_path,
        midi_sha256,
        status: RequestStatus::Pending,
        error: None,
    };

    let conn = db.lock();
    conn.execute(
        "INSERT INTO requests (id, created_at, source, midi_path, midi_sha256, status, error)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            request.id.to_string(),
            request.created_at.to_rfc3339(),
            request.source.as_str(),
            request.midi_path,
            request.midi_sha256,
            request.status.as_str(),
            request.error,
        ],
    )?;

    Ok(request)
}

/// Get a request by ID
pub fn get_request(db: &DbConnection, id: &Uuid) -> DbResult<Option<Request>> {
    let conn = db.lock();
    let mut stmt = conn.prepare(
        "SELECT id, created_at, source, midi_path, midi_sha256, status, error
         FROM requests WHERE id = ?1",
    )?;

    match stmt.query_row([id.to_string()], request_from_row) {
        Ok(request) => Ok(Some(request)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// List requests, newest first
pub fn list_requests(db: &DbConnection) -> DbResult<Vec<Request>> {
    let conn = db.lock();
    let mut stmt = conn.prepare(
        "SELECT id, created_at, source, midi_path, midi_sha256, status, error
         FROM requests ORDER BY created_at DESC",
    )?;

    let requests = stmt
        .query_map([], request_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(requests)
}

/// Update request status, with an optional failure message
pub fn update_request_status(
    db: &DbConnection,
    id: &Uuid,
    status: RequestStatus,
    error: Option<&str>,
) -> DbResult<()> {
    let conn = db.lock();
    conn.execute(
        "UPDATE requests SET status = ?1, error = ?2 WHERE id = ?3",
        params![status.as_str(), error, id.to_string()],
    )?;
    Ok(())
}

// ==================== ARTIFACT QUERIES ====================

/// Record the artifact for a (request, transposition) pair, replacing any earlier one
pub fn upsert_artifact(
    db: &DbConnection,
    request_id: Uuid,
    semitones: i32,
    path: String,
    sha256: String,
    source_sha256: String,
    bytes: i64,
) -> DbResult<Artifact> {
    let artifact = Artifact {
        id: Uuid::new_v4(),
        request_id,
        semitones,
        created_at: Utc::now(),
        path,
        sha256,
        source_sha256,
        bytes,
    };

    let conn = db.lock();
    conn.execute(
        "INSERT INTO artifacts (id, request_id, semitones, created_at, path, sha256, source_sha256, bytes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT (request_id, semitones) DO UPDATE SET
            id = excluded.id,
            created_at = excluded.created_at,
            path = excluded.path,
            sha256 = excluded.sha256,
            source_sha256 = excluded.source_sha256,
            bytes = excluded.bytes",
        params![
            artifact.id.to_string(),
            artifact.request_id.to_string(),
            artifact.semitones,
            artifact.created_at.to_rfc3339(),
            artifact.path,
            artifact.sha256,
            artifact.source_sha256,
            artifact.bytes,
        ],
    )?;

    Ok(artifact)
}

/// Look up the artifact for a request at one transposition
pub fn find_artifact(
    db: &DbConnection,
    request_id: &Uuid,
    semitones: i32,
) -> DbResult<Option<Artifact>> {
    let conn = db.lock();
    let mut stmt = conn.prepare(
        "SELECT id, request_id, semitones, created_at, path, sha256, source_sha256, bytes
         FROM artifacts WHERE request_id = ?1 AND semitones = ?2",
    )?;

    match stmt.query_row(params![request_id.to_string(), semitones], artifact_from_row) {
        Ok(artifact) => Ok(Some(artifact)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Get all artifacts for a request, ordered by transposition
pub fn get_artifacts_for_request(db: &DbConnection, request_id: &Uuid) -> DbResult<Vec<Artifact>> {
    let conn = db.lock();
    let mut stmt = conn.prepare(
        "SELECT id, request_id, semitones, created_at, path, sha256, source_sha256, bytes
         FROM artifacts WHERE request_id = ?1 ORDER BY semitones",
    )?;

    let artifacts = stmt
        .query_map([request_id.to_string()], artifact_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(artifacts)
}

/// Get a request with all its artifacts
pub fn get_request_with_artifacts(
    db: &DbConnection,
    id: &Uuid,
) -> DbResult<Option<RequestWithArtifacts>> {
    let request = match get_request(db, id)? {
        Some(r) => r,
        None => return Ok(None),
    };

    let artifacts = get_artifacts_for_request(db, id)?;

    Ok(Some(RequestWithArtifacts { request, artifacts }))
}
