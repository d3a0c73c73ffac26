use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use super::error::CaptureError;

/// Recording controller state machine.
///
/// State transitions:
/// ```text
/// idle → recording → stopping → idle
///            ↓ (device / io fault)
///         stopping → idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    Idle,
    Recording,
    Stopping,
}

impl RecordingState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, Self::Recording)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Recording => "recording",
            Self::Stopping => "stopping",
        }
    }
}

impl fmt::Display for RecordingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the controller published after each transition and polled
/// by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingStatus {
    pub state: RecordingState,
    /// Active destination while recording, last finalized file once idle.
    pub path: Option<PathBuf>,
    pub elapsed_frames: u64,
    pub duration_secs: f64,
    /// Fault that ended the last recording from the callback path.
    pub last_error: Option<CaptureError>,
}

impl RecordingStatus {
    pub fn idle() -> Self {
        Self {
            state: RecordingState::Idle,
            path: None,
            elapsed_frames: 0,
            duration_secs: 0.0,
            last_error: None,
        }
    }
}

impl Default for RecordingStatus {
    fn default() -> Self {
        Self::idle()
    }
}

impl fmt::Display for RecordingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.state)?;
        if let Some(path) = &self.path {
            write!(f, " ({})", path.display())?;
        }
        if let Some(err) = &self.last_error {
            write!(f, ": {}", err)?;
        }
        Ok(())
    }
}
