use crate::models::error::CaptureError;
use crate::models::recording_result::RecordingResult;
use crate::models::state::RecordingStatus;

/// Event delegate for recording notifications.
///
/// `on_level_updated` and `on_error` may be called from the device callback
/// thread; the others from whichever thread drove the transition.
/// Implementations should marshal to the UI thread if needed and must not
/// block.
pub trait RecordingDelegate: Send + Sync {
    /// Called after every state transition.
    fn on_status_changed(&self, status: &RecordingStatus);

    /// Called with the level of each processed block.
    fn on_level_updated(&self, level: f32);

    /// Called when a fault ends the recording from the callback path.
    fn on_error(&self, error: &CaptureError);

    /// Called when the file has been finalized.
    fn on_recording_finished(&self, result: &RecordingResult);
}
