use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::format::StreamFormat;

/// Result returned when a recording is finalized.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingResult {
    pub file_path: PathBuf,
    pub format: StreamFormat,
    pub frames: u64,
    /// Bytes of PCM in the data chunk.
    pub data_bytes: u64,
    pub duration_secs: f64,
    pub checksum: String,
    pub metadata: RecordingMetadata,
}

/// Metadata stored alongside a recording.
///
/// Serializable for the JSON sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    pub id: String,
    pub created_at: String,
    pub device_name: String,
    pub file_path: String,
    pub sample_rate: u32,
    pub bit_depth: u16,
    pub channels: u16,
    pub frames: u64,
    pub data_bytes: u64,
    pub duration_secs: f64,
    pub checksum: String,
}

impl RecordingMetadata {
    pub fn new(
        device_name: &str,
        file_path: &str,
        format: &StreamFormat,
        frames: u64,
        data_bytes: u64,
        checksum: &str,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            device_name: device_name.to_string(),
            file_path: file_path.to_string(),
            sample_rate: format.sample_rate,
            bit_depth: format.bit_depth.bits(),
            channels: format.channels,
            frames,
            data_bytes,
            duration_secs: format.frames_to_secs(frames),
            checksum: checksum.to_string(),
        }
    }
}
