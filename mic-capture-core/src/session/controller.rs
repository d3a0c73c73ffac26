use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Mutex, RwLock};

use crate::models::config::RecorderConfiguration;
use crate::models::device::DeviceDescriptor;
use crate::models::error::CaptureError;
use crate::models::format::StreamFormat;
use crate::models::recording_result::RecordingResult;
use crate::models::state::{RecordingState, RecordingStatus};
use crate::processing::gain::GainControl;
use crate::processing::level_meter::LevelMonitor;
use crate::session::capture_session::{CaptureSession, SessionHooks};
use crate::storage::metadata;
use crate::traits::capture_delegate::RecordingDelegate;
use crate::traits::capture_provider::CaptureProvider;
use crate::traits::device_registry::DeviceRegistry;

/// Suffixes tried after `<prefix>_<stamp>.wav` is taken.
const MAX_NAME_SUFFIX: u32 = 1000;

/// Session currently owned by the controller.
struct ActiveRecording<P: CaptureProvider> {
    id: u64,
    session: CaptureSession<P>,
    /// Dropped to release the supervisor.
    shutdown_tx: Sender<()>,
    supervisor: Option<JoinHandle<()>>,
}

/// State shared with the supervisor thread.
struct ControllerCore<P: CaptureProvider> {
    active: Mutex<Option<ActiveRecording<P>>>,
    status: Mutex<RecordingStatus>,
    gain: Arc<GainControl>,
    level: Arc<LevelMonitor>,
    delegate: RwLock<Option<Arc<dyn RecordingDelegate>>>,
    write_sidecar: bool,
    next_id: AtomicU64,
}

impl<P: CaptureProvider + 'static> ControllerCore<P> {
    fn delegate(&self) -> Option<Arc<dyn RecordingDelegate>> {
        self.delegate.read().clone()
    }

    fn notify(&self, status: &RecordingStatus) {
        log::debug!("Recording status: {}", status);
        if let Some(delegate) = self.delegate() {
            delegate.on_status_changed(status);
        }
    }

    fn publish(&self, status: RecordingStatus) {
        *self.status.lock() = status.clone();
        self.notify(&status);
    }

    /// Detach the active recording and publish `Stopping`.
    ///
    /// With `id` set, only that recording is taken; a supervisor whose
    /// recording was already stopped gets `None`.
    fn begin_stop(&self, id: Option<u64>) -> Option<ActiveRecording<P>> {
        let (recording, status) = {
            let mut active = self.active.lock();
            if id.is_some_and(|id| active.as_ref().map(|a| a.id) != Some(id)) {
                return None;
            }
            let recording = active.take()?;

            let frames = recording.session.elapsed_frames();
            let status = RecordingStatus {
                state: RecordingState::Stopping,
                path: Some(recording.session.file_path().to_path_buf()),
                elapsed_frames: frames,
                duration_secs: recording.session.format().frames_to_secs(frames),
                last_error: None,
            };
            *self.status.lock() = status.clone();
            (recording, status)
        };

        self.notify(&status);
        Some(recording)
    }

    /// Close the session, release its supervisor and publish `Idle`.
    fn finish(&self, recording: ActiveRecording<P>, fault: Option<CaptureError>) -> Result<RecordingResult, CaptureError> {
        let ActiveRecording {
            mut session,
            shutdown_tx,
            supervisor,
            ..
        } = recording;

        let closed = session.close();
        let mut last_error = fault.or_else(|| session.fault());
        let path = session.file_path().to_path_buf();
        let format = *session.format();
        let frames = session.elapsed_frames();
        drop(session);

        drop(shutdown_tx);
        if let Some(handle) = supervisor {
            // The supervisor tears down its own recording; it cannot join itself.
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                log::error!("Capture supervisor panicked");
            }
        }
        self.level.reset();

        match closed {
            Ok(Some(result)) => {
                if self.write_sidecar {
                    match metadata::write_metadata(&result.metadata, &result.file_path) {
                        Ok(sidecar) => log::debug!("Wrote {}", sidecar.display()),
                        Err(e) => {
                            log::warn!("Failed to write metadata sidecar: {}", e);
                            last_error.get_or_insert(e);
                        }
                    }
                }

                self.publish(RecordingStatus {
                    state: RecordingState::Idle,
                    path: Some(result.file_path.clone()),
                    elapsed_frames: result.frames,
                    duration_secs: result.duration_secs,
                    last_error,
                });
                if let Some(delegate) = self.delegate() {
                    delegate.on_recording_finished(&result);
                }
                Ok(result)
            }
            Ok(None) => {
                self.publish(RecordingStatus::idle());
                Err(CaptureError::Configuration("recording was already closed".into()))
            }
            Err(e) => {
                log::error!("Failed to finalize {}: {}", path.display(), e);
                self.publish(RecordingStatus {
                    state: RecordingState::Idle,
                    path: Some(path),
                    elapsed_frames: frames,
                    duration_secs: format.frames_to_secs(frames),
                    last_error: Some(e.clone()),
                });
                if let Some(delegate) = self.delegate() {
                    delegate.on_error(&e);
                }
                Err(e)
            }
        }
    }
}

/// Waits for the first fault of recording `id` and runs the stop teardown.
///
/// Exits without action once the recording is stopped by the host.
fn supervise<P: CaptureProvider + 'static>(
    core: Weak<ControllerCore<P>>,
    id: u64,
    fault_rx: Receiver<CaptureError>,
    shutdown_rx: Receiver<()>,
) {
    let fault = crossbeam_channel::select! {
        recv(fault_rx) -> msg => msg.ok(),
        recv(shutdown_rx) -> _ => None,
    };
    let Some(fault) = fault else {
        return;
    };
    let Some(core) = core.upgrade() else {
        return;
    };

    if let Some(recording) = core.begin_stop(Some(id)) {
        log::warn!("Stopping recording after fault: {}", fault);
        if let Err(e) = core.finish(recording, Some(fault)) {
            log::error!("Teardown after fault failed: {}", e);
        }
    }
}

/// Host-facing recorder: device selection, gain, status, start/stop.
///
/// All methods take `&self`; the controller can be shared behind an `Arc`
/// and driven from any thread.
///
/// ```text
/// idle ──start──▶ recording ──stop / fault──▶ stopping ──▶ idle
/// ```
pub struct RecordingController<R: DeviceRegistry> {
    registry: R,
    config: RecorderConfiguration,
    devices: Mutex<Option<Vec<DeviceDescriptor>>>,
    core: Arc<ControllerCore<R::Provider>>,
}

impl<R: DeviceRegistry> RecordingController<R> {
    pub fn new(registry: R, config: RecorderConfiguration) -> Result<Self, CaptureError> {
        config.validate()?;
        let gain = GainControl::new(config.initial_gain)?;

        let core = Arc::new(ControllerCore {
            active: Mutex::new(None),
            status: Mutex::new(RecordingStatus::idle()),
            gain: Arc::new(gain),
            level: Arc::new(LevelMonitor::new()),
            delegate: RwLock::new(None),
            write_sidecar: config.write_metadata_sidecar,
            next_id: AtomicU64::new(1),
        });

        Ok(Self {
            registry,
            config,
            devices: Mutex::new(None),
            core,
        })
    }

    pub fn config(&self) -> &RecorderConfiguration {
        &self.config
    }

    /// Delegate for status and level notifications.
    ///
    /// Level callbacks reach the new delegate from the next recording on.
    pub fn set_delegate(&self, delegate: Arc<dyn RecordingDelegate>) {
        *self.core.delegate.write() = Some(delegate);
    }

    /// Re-enumerate capture devices and cache the list for `start`.
    pub fn enumerate_devices(&self) -> Result<Vec<DeviceDescriptor>, CaptureError> {
        let devices = self.registry.enumerate()?;
        log::debug!("Enumerated {} capture device(s)", devices.len());
        *self.devices.lock() = Some(devices.clone());
        Ok(devices)
    }

    /// Begin recording from the device at `device_index` of the last
    /// enumeration into `path`, or a timestamped file in the configured
    /// output directory. Returns the destination path.
    pub fn start(&self, device_index: usize, format: StreamFormat, path: Option<PathBuf>) -> Result<PathBuf, CaptureError> {
        let mut active = self.core.active.lock();
        if active.is_some() || !self.core.status.lock().state.is_idle() {
            log::warn!("Start requested while a recording is active");
            return Err(CaptureError::AlreadyRecording);
        }

        format.validate()?;
        let device = self.resolve_device(device_index)?;
        let provider = self.registry.open_device(&device, &format)?;
        let (path, derived) = match path {
            Some(path) => (path, false),
            None => (self.reserve_default_path()?, true),
        };

        let (fault_tx, fault_rx) = crossbeam_channel::unbounded();
        let hooks = SessionHooks {
            gain: Arc::clone(&self.core.gain),
            level: Arc::clone(&self.core.level),
            delegate: self.core.delegate(),
            fault_tx: Some(fault_tx),
        };
        let mut session = match CaptureSession::open(provider, format, path.clone(), hooks) {
            Ok(session) => session,
            Err(e) => {
                if derived {
                    release_reserved(&path);
                }
                return Err(e);
            }
        };

        let id = self.core.next_id.fetch_add(1, Ordering::Relaxed);
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(0);
        let core = Arc::downgrade(&self.core);
        let supervisor = match thread::Builder::new()
            .name("capture-supervisor".into())
            .spawn(move || supervise(core, id, fault_rx, shutdown_rx))
        {
            Ok(handle) => handle,
            Err(e) => {
                if let Err(close_err) = session.close() {
                    log::warn!("Failed to close session: {}", close_err);
                }
                return Err(CaptureError::Io(format!("failed to spawn capture supervisor: {}", e)));
            }
        };

        let status = RecordingStatus {
            state: RecordingState::Recording,
            path: Some(path.clone()),
            elapsed_frames: 0,
            duration_secs: 0.0,
            last_error: None,
        };
        *self.core.status.lock() = status.clone();
        *active = Some(ActiveRecording {
            id,
            session,
            shutdown_tx,
            supervisor: Some(supervisor),
        });
        drop(active);

        self.core.notify(&status);
        log::info!("Recording started from '{}' ({})", device.name, format);
        Ok(path)
    }

    /// Stop the active recording and finalize its file.
    pub fn stop(&self) -> Result<RecordingResult, CaptureError> {
        let recording = self
            .core
            .begin_stop(None)
            .ok_or_else(|| CaptureError::Configuration("not recording".into()))?;
        self.core.finish(recording, None)
    }

    /// Set the gain used from the next processed block on.
    pub fn set_gain(&self, gain: f64) -> Result<(), CaptureError> {
        self.core.gain.set(gain)?;
        log::debug!("Gain set to {}", gain);
        Ok(())
    }

    pub fn gain(&self) -> f64 {
        self.core.gain.get()
    }

    /// Level of the most recent block; 0.0 when idle.
    pub fn current_level(&self) -> f32 {
        self.core.level.level()
    }

    pub fn state(&self) -> RecordingState {
        self.core.status.lock().state
    }

    /// Latest status with a live frame count while recording.
    pub fn current_status(&self) -> RecordingStatus {
        let mut status = self.core.status.lock().clone();
        if status.state.is_recording() {
            if let Some(recording) = self.core.active.lock().as_ref() {
                status.elapsed_frames = recording.session.elapsed_frames();
                status.duration_secs = recording.session.format().frames_to_secs(status.elapsed_frames);
            }
        }
        status
    }

    fn resolve_device(&self, device_index: usize) -> Result<DeviceDescriptor, CaptureError> {
        let mut cache = self.devices.lock();
        if cache.is_none() {
            *cache = Some(self.registry.enumerate()?);
        }
        let devices = cache.as_deref().unwrap_or(&[]);
        if devices.is_empty() {
            return Err(CaptureError::Configuration("no capture devices available".into()));
        }

        devices
            .iter()
            .find(|d| d.index == device_index)
            .cloned()
            .ok_or_else(|| CaptureError::Configuration(format!("no capture device at index {}", device_index)))
    }

    /// Create an empty file at the first free
    /// `<output_directory>/<prefix>_<YYYYmmdd_HHMMSS>[_N].wav` (local time)
    /// and return its path. An existing recording is never reused.
    fn reserve_default_path(&self) -> Result<PathBuf, CaptureError> {
        let dir = &self.config.output_directory;
        fs::create_dir_all(dir)
            .map_err(|e| CaptureError::Io(format!("failed to create directory {}: {}", dir.display(), e)))?;

        let stem = format!(
            "{}_{}",
            self.config.file_prefix,
            chrono::Local::now().format("%Y%m%d_%H%M%S")
        );
        for suffix in 0..=MAX_NAME_SUFFIX {
            let name = match suffix {
                0 => format!("{}.wav", stem),
                n => format!("{}_{}.wav", stem, n),
            };
            let candidate = dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&candidate) {
                Ok(_) => return Ok(candidate),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(CaptureError::Io(format!("failed to create {}: {}", candidate.display(), e)));
                }
            }
        }
        Err(CaptureError::Io(format!("no free file name for {} in {}", stem, dir.display())))
    }
}

/// Remove a reserved file whose recording never started.
fn release_reserved(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("Failed to remove unused {}: {}", path.display(), e),
    }
}

impl<R: DeviceRegistry> Drop for RecordingController<R> {
    fn drop(&mut self) {
        if let Some(recording) = self.core.begin_stop(None) {
            log::info!("Stopping active recording on shutdown");
            if let Err(e) = self.core.finish(recording, None) {
                log::warn!("Failed to finalize recording on shutdown: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::format::BitDepth;
    use crate::traits::capture_provider::{AudioBufferCallback, DeviceErrorCallback};

    struct NoProvider;

    impl CaptureProvider for NoProvider {
        fn start(&mut self, _: AudioBufferCallback, _: DeviceErrorCallback) -> Result<(), CaptureError> {
            Ok(())
        }

        fn stop(&mut self) -> Result<(), CaptureError> {
            Ok(())
        }

        fn format(&self) -> StreamFormat {
            StreamFormat::default()
        }

        fn device_info(&self) -> DeviceDescriptor {
            DeviceDescriptor::new(0, "none", true)
        }
    }

    /// Registry with a fixed list whose devices open at the default format.
    struct FixedRegistry(Vec<DeviceDescriptor>);

    impl DeviceRegistry for FixedRegistry {
        type Provider = NoProvider;

        fn enumerate(&self) -> Result<Vec<DeviceDescriptor>, CaptureError> {
            Ok(self.0.clone())
        }

        fn open_device(&self, _: &DeviceDescriptor, _: &StreamFormat) -> Result<NoProvider, CaptureError> {
            Ok(NoProvider)
        }
    }

    fn controller(devices: Vec<DeviceDescriptor>, dir: &std::path::Path) -> RecordingController<FixedRegistry> {
        let config = RecorderConfiguration {
            output_directory: dir.to_path_buf(),
            ..Default::default()
        };
        RecordingController::new(FixedRegistry(devices), config).unwrap()
    }

    #[test]
    fn starts_idle() {
        let dir = tempfile::tempdir().unwrap();
        let c = controller(vec![], dir.path());
        assert_eq!(c.state(), RecordingState::Idle);
        assert_eq!(c.current_status(), RecordingStatus::idle());
        assert_eq!(c.current_level(), 0.0);
        assert_eq!(c.gain(), 1.0);
    }

    #[test]
    fn stop_while_idle_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let c = controller(vec![], dir.path());
        assert!(matches!(c.stop(), Err(CaptureError::Configuration(_))));
        assert_eq!(c.state(), RecordingState::Idle);
    }

    #[test]
    fn start_without_devices_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let c = controller(vec![], dir.path());
        let err = c.start(0, StreamFormat::default(), None).unwrap_err();
        assert!(matches!(err, CaptureError::Configuration(_)));
        assert_eq!(c.state(), RecordingState::Idle);
    }

    #[test]
    fn start_with_unknown_index_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let c = controller(vec![DeviceDescriptor::new(0, "Mic", true)], dir.path());
        assert_eq!(c.enumerate_devices().unwrap().len(), 1);
        assert!(matches!(
            c.start(3, StreamFormat::default(), None),
            Err(CaptureError::Configuration(_))
        ));
    }

    #[test]
    fn invalid_format_is_rejected_before_opening() {
        let dir = tempfile::tempdir().unwrap();
        let c = controller(vec![DeviceDescriptor::new(0, "Mic", true)], dir.path());
        let format = StreamFormat::new(44100, BitDepth::Sixteen, 6);
        assert!(matches!(c.start(0, format, None), Err(CaptureError::Configuration(_))));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn invalid_gain_keeps_previous_value() {
        let dir = tempfile::tempdir().unwrap();
        let c = controller(vec![], dir.path());
        c.set_gain(3.5).unwrap();
        assert!(c.set_gain(-1.0).is_err());
        assert!(c.set_gain(f64::NAN).is_err());
        assert_eq!(c.gain(), 3.5);
    }

    #[test]
    fn default_path_uses_prefix_and_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let c = controller(vec![DeviceDescriptor::new(0, "Mic", true)], dir.path());
        let path = c.start(0, StreamFormat::default(), None).unwrap();

        assert_eq!(path.parent().unwrap(), dir.path());
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        // Recording_YYYYmmdd_HHMMSS.wav
        assert!(name.starts_with("Recording_"));
        assert!(name.ends_with(".wav"));
        assert_eq!(name.len(), "Recording_".len() + 15 + ".wav".len());

        let result = c.stop().unwrap();
        assert_eq!(result.file_path, path);
        assert_eq!(result.frames, 0);
    }

    #[test]
    fn derived_paths_never_reuse_an_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let c = controller(vec![DeviceDescriptor::new(0, "Mic", true)], dir.path());

        let paths: Vec<PathBuf> = (0..3)
            .map(|_| {
                let path = c.start(0, StreamFormat::default(), None).unwrap();
                c.stop().unwrap();
                path
            })
            .collect();

        assert_ne!(paths[0], paths[1]);
        assert_ne!(paths[1], paths[2]);
        assert_ne!(paths[0], paths[2]);
        for path in &paths {
            assert_eq!(std::fs::metadata(path).unwrap().len(), 44);
        }
    }

    #[test]
    fn reserved_file_is_removed_when_start_fails() {
        let dir = tempfile::tempdir().unwrap();
        let c = controller(vec![DeviceDescriptor::new(0, "Mic", true)], dir.path());
        // NoProvider only delivers the default format.
        let format = StreamFormat::new(48000, BitDepth::Sixteen, 1);
        assert!(matches!(c.start(0, format, None), Err(CaptureError::Device(_))));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = RecorderConfiguration {
            initial_gain: -2.0,
            ..Default::default()
        };
        assert!(RecordingController::new(FixedRegistry(vec![]), config).is_err());
    }
}
