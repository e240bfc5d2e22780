// State management module
// SQLite records of requests and artifacts, plus their files on disk

pub mod db;
pub mod models;
pub mod queries;
pub mod storage;

pub use db::{init_db, DbConnection, DbError};
pub use models::{Artifact, Request, RequestSource, RequestStatus, RequestWithArtifacts};
pub use queries::{
    create_request, find_artifact, get_artifacts_for_request, get_request,
    get_request_with_artifacts, list_requests, update_request_status, upsert_artifact,
};
pub use storage::{artifact_file_name, StorageError};
