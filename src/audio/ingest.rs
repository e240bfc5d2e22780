// Audio upload validation
// Checks recordings before they reach the transcription backend

use hound::{SampleFormat, WavReader};
use serde::Serialize;
use std::io::Cursor;
use thiserror::Error;

/// Longest recording accepted for transcription
pub const MAX_DURATION_MS: i64 = 10 * 60 * 1000;

/// Shortest recording worth transcribing
pub const MIN_DURATION_MS: i64 = 100;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Failed to read WAV file: {0}")]
    WavReadError(#[from] hound::Error),

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("Recording length of {0} ms is outside the accepted range")]
    BadDuration(i64),
}

/// Header facts about an uploaded recording
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_depth: u16,
    pub frame_count: u32,
    pub duration_ms: i64,
}

/// Validate a WAV upload without decoding its samples
pub fn inspect_upload(data: &[u8]) -> Result<UploadInfo, AudioError> {
    let reader = WavReader::new(Cursor::new(data))?;
    let spec = reader.spec();

    match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Int, 8 | 16 | 24 | 32) | (SampleFormat::Float, 32) => {}
        (format, bits) => {
            return Err(AudioError::UnsupportedFormat(format!("{:?} {}-bit audio", format, bits)));
        }
    }
    if spec.sample_rate == 0 {
        return Err(AudioError::UnsupportedFormat("zero sample rate".to_string()));
    }

    let frame_count = reader.duration();
    let duration_ms = frame_count as i64 * 1000 / spec.sample_rate as i64;
    if !(MIN_DURATION_MS..=MAX_DURATION_MS).contains(&duration_ms) {
        return Err(AudioError::BadDuration(duration_ms));
    }

    Ok(UploadInfo {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        bit_depth: spec.bits_per_sample,
        frame_count,
        duration_ms,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};

    /// 16-bit WAV of `frames` frames at 8 kHz
    pub(crate) fn wav_bytes(frames: u32, channels: u16) -> Vec<u8> {
        let spec = WavSpec {
            channels,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
            for i in 0..frames {
                for ch in 0..channels {
                    let value = if ch == 0 { (i % 100) as i16 * 100 } else { 0 };
                    writer.write_sample(value).unwrap();
                }
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_inspect_valid_upload() {
        let info = inspect_upload(&wav_bytes(8000, 1)).unwrap();
        assert_eq!(info.sample_rate, 8000);
        assert_eq!(info.frame_count, 8000);
        assert_eq!(info.duration_ms, 1000);
    }

    #[test]
    fn test_rejects_too_short() {
        let result = inspect_upload(&wav_bytes(100, 1));
        assert!(matches!(result, Err(AudioError::BadDuration(12))));
    }

    #[test]
    fn test_rejects_non_wav() {
        assert!(matches!(inspect_upload(b"MThd"), Err(AudioError::WavReadError(_))));
    }
}
