use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;
use parking_lot::Mutex;

use crate::models::audio_block::AudioBlock;
use crate::models::device::DeviceDescriptor;
use crate::models::error::CaptureError;
use crate::models::format::StreamFormat;
use crate::models::recording_result::{RecordingMetadata, RecordingResult};
use crate::processing::gain::{apply_gain, GainControl};
use crate::processing::level_meter::{measure_level, LevelMonitor};
use crate::storage::wav_writer::WavStreamWriter;
use crate::traits::capture_delegate::RecordingDelegate;
use crate::traits::capture_provider::{AudioBufferCallback, CaptureProvider, DeviceErrorCallback};

/// Initial scratch capacity; grows to the largest block the device delivers.
const SCRATCH_CAPACITY: usize = 16 * 1024;

/// Shared handles a session publishes into.
#[derive(Clone)]
pub struct SessionHooks {
    pub gain: Arc<GainControl>,
    pub level: Arc<LevelMonitor>,
    pub delegate: Option<Arc<dyn RecordingDelegate>>,
    /// Receives the first fault raised on the callback path.
    pub fault_tx: Option<Sender<CaptureError>>,
}

impl Default for SessionHooks {
    fn default() -> Self {
        Self {
            gain: Arc::new(GainControl::default()),
            level: Arc::new(LevelMonitor::default()),
            delegate: None,
            fault_tx: None,
        }
    }
}

/// Writer plus scratch space, owned by whichever side holds the lock.
struct Pipeline {
    writer: WavStreamWriter,
    scratch: Vec<u8>,
}

impl Pipeline {
    /// gain → append → measure. Returns the block level.
    fn process(&mut self, data: &[u8], gain: f64) -> Result<f32, CaptureError> {
        let depth = self.writer.format().bit_depth;
        self.scratch.clear();
        self.scratch.extend_from_slice(data);

        let mut block = AudioBlock::new(&mut self.scratch, depth)?;
        apply_gain(&mut block, gain);
        self.writer.append(&block)?;
        Ok(measure_level(&block))
    }
}

/// State shared between the session and the device callbacks.
struct SessionShared {
    pipeline: Mutex<Option<Pipeline>>,
    hooks: SessionHooks,
    frames: AtomicU64,
    faulted: AtomicBool,
    fault: Mutex<Option<CaptureError>>,
}

impl SessionShared {
    fn handle_buffer(&self, data: &[u8]) {
        if self.faulted.load(Ordering::Acquire) {
            return;
        }

        let mut guard = self.pipeline.lock();
        // Gone means close already finalized the writer.
        let Some(pipeline) = guard.as_mut() else {
            return;
        };

        let gain = self.hooks.gain.get();
        match pipeline.process(data, gain) {
            Ok(level) => {
                self.frames.store(pipeline.writer.frames(), Ordering::Release);
                drop(guard);
                self.hooks.level.publish(level);
                if let Some(ref delegate) = self.hooks.delegate {
                    delegate.on_level_updated(level);
                }
            }
            Err(e) => {
                drop(guard);
                self.report_fault(e);
            }
        }
    }

    /// SHA-256 of a finalized file. A failure leaves the recording intact:
    /// it is reported as a fault and the checksum is left empty.
    fn checksum_or_report(&self, writer: &WavStreamWriter) -> String {
        match writer.checksum() {
            Ok(checksum) => checksum,
            Err(e) => {
                log::warn!("Failed to checksum {}: {}", writer.file_path().display(), e);
                self.report_fault(e);
                String::new()
            }
        }
    }

    /// Record the first fault and hand it to the supervisor. Later faults
    /// are only logged.
    fn report_fault(&self, error: CaptureError) {
        if self.faulted.swap(true, Ordering::AcqRel) {
            log::debug!("Ignoring further capture fault: {}", error);
            return;
        }

        log::error!("Capture fault: {}", error);
        *self.fault.lock() = Some(error.clone());

        if let Some(ref delegate) = self.hooks.delegate {
            delegate.on_error(&error);
        }
        if let Some(ref tx) = self.hooks.fault_tx {
            if tx.send(error).is_err() {
                log::warn!("Capture fault raised with no supervisor listening");
            }
        }
    }
}

/// One open recording: a started device feeding an open WAV writer.
///
/// Data flow per delivered block:
/// ```text
/// [CaptureProvider] → copy → [gain] → [WavStreamWriter] → [level meter] → LevelMonitor
/// ```
pub struct CaptureSession<P: CaptureProvider> {
    provider: Option<P>,
    shared: Arc<SessionShared>,
    device: DeviceDescriptor,
    format: StreamFormat,
    file_path: PathBuf,
    closed: bool,
}

impl<P: CaptureProvider> CaptureSession<P> {
    /// Open the writer at `file_path` and start `provider` delivering into it.
    ///
    /// `format` must be the format the provider was acquired at.
    pub fn open(
        mut provider: P,
        format: StreamFormat,
        file_path: PathBuf,
        hooks: SessionHooks,
    ) -> Result<Self, CaptureError> {
        format.validate()?;
        if provider.format() != format {
            return Err(CaptureError::Device(format!(
                "device delivers {} but {} was requested",
                provider.format(),
                format
            )));
        }

        let writer = WavStreamWriter::open(&file_path, format)?;
        let shared = Arc::new(SessionShared {
            pipeline: Mutex::new(Some(Pipeline {
                writer,
                scratch: Vec::with_capacity(SCRATCH_CAPACITY),
            })),
            hooks,
            frames: AtomicU64::new(0),
            faulted: AtomicBool::new(false),
            fault: Mutex::new(None),
        });

        let on_buffer: AudioBufferCallback = {
            let shared = Arc::clone(&shared);
            Arc::new(move |data: &[u8]| shared.handle_buffer(data))
        };
        let on_error: DeviceErrorCallback = {
            let shared = Arc::clone(&shared);
            Arc::new(move |error: CaptureError| shared.report_fault(error))
        };

        if let Err(e) = provider.start(on_buffer, on_error) {
            log::error!("Failed to start {}: {}", provider.device_info().name, e);
            discard_file(&shared, &file_path);
            return Err(e);
        }

        let device = provider.device_info();
        log::info!("Capturing {} from '{}' into {}", format, device.name, file_path.display());

        Ok(Self {
            provider: Some(provider),
            shared,
            device,
            format,
            file_path,
            closed: false,
        })
    }

    /// Stop the device, finalize the file, release the device.
    ///
    /// Returns `None` when the session was already closed.
    pub fn close(&mut self) -> Result<Option<RecordingResult>, CaptureError> {
        if self.closed {
            return Ok(None);
        }
        self.closed = true;

        if let Some(provider) = self.provider.as_mut() {
            if let Err(e) = provider.stop() {
                self.shared.report_fault(e);
            }
        }

        let pipeline = self.shared.pipeline.lock().take();
        let result = match pipeline {
            Some(pipeline) => self.finalize(pipeline).map(Some),
            None => Ok(None),
        };

        self.provider = None;
        self.shared.hooks.level.reset();
        result
    }

    fn finalize(&self, mut pipeline: Pipeline) -> Result<RecordingResult, CaptureError> {
        pipeline.writer.close()?;
        let checksum = self.shared.checksum_or_report(&pipeline.writer);

        let frames = pipeline.writer.frames();
        let data_bytes = pipeline.writer.data_bytes();
        self.shared.frames.store(frames, Ordering::Release);

        let metadata = RecordingMetadata::new(
            &self.device.name,
            &self.file_path.to_string_lossy(),
            &self.format,
            frames,
            data_bytes,
            &checksum,
        );
        let duration_secs = self.format.frames_to_secs(frames);

        log::info!(
            "Finalized {} ({} frames, {:.2}s)",
            self.file_path.display(),
            frames,
            duration_secs
        );

        Ok(RecordingResult {
            file_path: self.file_path.clone(),
            format: self.format,
            frames,
            data_bytes,
            duration_secs,
            checksum,
            metadata,
        })
    }

    /// Frames written so far.
    pub fn elapsed_frames(&self) -> u64 {
        self.shared.frames.load(Ordering::Acquire)
    }

    /// First fault raised on the callback path, if any.
    pub fn fault(&self) -> Option<CaptureError> {
        self.shared.fault.lock().clone()
    }

    pub fn is_faulted(&self) -> bool {
        self.shared.faulted.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn device(&self) -> &DeviceDescriptor {
        &self.device
    }

    pub fn format(&self) -> &StreamFormat {
        &self.format
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }
}

impl<P: CaptureProvider> Drop for CaptureSession<P> {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.close() {
                log::warn!("Failed to close capture session on drop: {}", e);
            }
        }
    }
}

/// Close and delete the file of a session whose device never started.
fn discard_file(shared: &SessionShared, file_path: &Path) {
    if let Some(mut pipeline) = shared.pipeline.lock().take() {
        if let Err(e) = pipeline.writer.close() {
            log::warn!("Failed to close unused {}: {}", file_path.display(), e);
        }
    }
    if let Err(e) = fs::remove_file(file_path) {
        log::warn!("Failed to remove unused {}: {}", file_path.display(), e);
    }
}
