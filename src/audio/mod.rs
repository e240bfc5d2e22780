// Audio module
// Validation and decoding of uploaded recordings

pub mod ingest;

pub use ingest::{inspect_upload, AudioError, UploadInfo};
