use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::error::CaptureError;
use super::format::StreamFormat;

/// Configuration for a recording controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfiguration {
    /// Directory used when `start` is called without a destination path
    /// (default: the system temp directory).
    pub output_directory: PathBuf,

    /// File name prefix for derived paths: `<prefix>_<YYYYmmdd_HHMMSS>.wav`.
    pub file_prefix: String,

    /// Gain applied from the first block (default: 1.0, unity).
    pub initial_gain: f64,

    /// Format used by callers that do not pick one.
    pub default_format: StreamFormat,

    /// Write `<file>.metadata.json` next to each finished recording.
    pub write_metadata_sidecar: bool,
}

impl RecorderConfiguration {
    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.file_prefix.is_empty() {
            return Err(CaptureError::Configuration("file prefix must not be empty".into()));
        }
        validate_gain(self.initial_gain)?;
        self.default_format.validate()
    }
}

impl Default for RecorderConfiguration {
    fn default() -> Self {
        Self {
            output_directory: std::env::temp_dir(),
            file_prefix: "Recording".into(),
            initial_gain: 1.0,
            default_format: StreamFormat::default(),
            write_metadata_sidecar: false,
        }
    }
}

/// Gain must be a finite, non-negative scalar.
pub fn validate_gain(gain: f64) -> Result<(), CaptureError> {
    if !gain.is_finite() || gain < 0.0 {
        return Err(CaptureError::Configuration(format!("invalid gain: {}", gain)));
    }
    Ok(())
}
