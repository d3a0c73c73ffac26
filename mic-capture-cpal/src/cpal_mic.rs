//! cpal microphone capture provider.
//!
//! Opens an input stream at the negotiated format and delivers interleaved
//! little-endian PCM at the requested bit depth via the `AudioBufferCallback`.
//! The stream is built, played and dropped on a dedicated thread because
//! cpal streams are not `Send` on every platform.

use std::thread;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleFormat, SizedSample, StreamConfig};
use crossbeam_channel::Sender;

use mic_capture_core::models::device::DeviceDescriptor;
use mic_capture_core::models::error::CaptureError;
use mic_capture_core::models::format::{BitDepth, StreamFormat};
use mic_capture_core::processing::pcm;
use mic_capture_core::traits::capture_provider::{AudioBufferCallback, CaptureProvider, DeviceErrorCallback};

use crate::device_registry::find_input_device;

/// Microphone capture through cpal.
///
/// Created by `CpalDeviceRegistry::open_device`.
pub struct CpalMicCapture {
    device: DeviceDescriptor,
    format: StreamFormat,
    /// Native sample type requested from the device.
    sample_format: SampleFormat,
    stop_tx: Option<Sender<()>>,
    capture_handle: Option<thread::JoinHandle<()>>,
}

impl CpalMicCapture {
    pub(crate) fn new(device: DeviceDescriptor, format: StreamFormat, sample_format: SampleFormat) -> Self {
        Self {
            device,
            format,
            sample_format,
            stop_tx: None,
            capture_handle: None,
        }
    }

    pub fn sample_format(&self) -> SampleFormat {
        self.sample_format
    }

    pub fn is_running(&self) -> bool {
        self.capture_handle.is_some()
    }
}

impl CaptureProvider for CpalMicCapture {
    fn start(&mut self, on_buffer: AudioBufferCallback, on_error: DeviceErrorCallback) -> Result<(), CaptureError> {
        if self.capture_handle.is_some() {
            return Err(CaptureError::Configuration("mic capture already running".into()));
        }

        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), CaptureError>>(1);
        let device = self.device.clone();
        let format = self.format;
        let sample_format = self.sample_format;

        let handle = thread::Builder::new()
            .name("cpal-mic-capture".into())
            .spawn(move || {
                let stream = match open_stream(&device, format, sample_format, on_buffer, on_error) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                // Returns once stop() drops the sender.
                let _ = stop_rx.recv();
                drop(stream);
                log::debug!("Closed input stream for '{}'", device.name);
            })
            .map_err(|e| CaptureError::Device(format!("failed to spawn mic thread: {}", e)))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.stop_tx = Some(stop_tx);
                self.capture_handle = Some(handle);
                log::info!("Mic capture started on '{}' at {}", self.device.name, self.format);
                Ok(())
            }
            Ok(Err(e)) => {
                join_failed_start(handle, &self.device.name);
                Err(e)
            }
            Err(_) => {
                join_failed_start(handle, &self.device.name);
                Err(CaptureError::Device("mic thread exited during startup".into()))
            }
        }
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        drop(self.stop_tx.take());
        if let Some(handle) = self.capture_handle.take() {
            handle
                .join()
                .map_err(|_| CaptureError::Device("mic capture thread panicked".into()))?;
        }
        Ok(())
    }

    fn format(&self) -> StreamFormat {
        self.format
    }

    fn device_info(&self) -> DeviceDescriptor {
        self.device.clone()
    }
}

impl Drop for CpalMicCapture {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::warn!("Failed to stop mic capture on drop: {}", e);
        }
    }
}

/// Reap a capture thread that failed to start. Returns true if it panicked.
fn join_failed_start(handle: thread::JoinHandle<()>, device_name: &str) -> bool {
    match handle.join() {
        Ok(()) => false,
        Err(_) => {
            log::warn!("Mic capture thread for '{}' panicked during startup", device_name);
            true
        }
    }
}

/// Build and play the input stream. Runs on the capture thread.
fn open_stream(
    device: &DeviceDescriptor,
    format: StreamFormat,
    sample_format: SampleFormat,
    on_buffer: AudioBufferCallback,
    on_error: DeviceErrorCallback,
) -> Result<cpal::Stream, CaptureError> {
    let input = find_input_device(device)?;
    let config = StreamConfig {
        channels: format.channels,
        sample_rate: cpal::SampleRate(format.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };
    let depth = format.bit_depth;
    let err_fn = move |err: cpal::StreamError| {
        on_error(CaptureError::Device(format!("input stream error: {}", err)));
    };

    let stream = match sample_format {
        SampleFormat::U8 => build_input::<u8>(&input, &config, depth, on_buffer, err_fn),
        SampleFormat::I16 => build_input::<i16>(&input, &config, depth, on_buffer, err_fn),
        SampleFormat::I32 => build_input::<i32>(&input, &config, depth, on_buffer, err_fn),
        SampleFormat::F32 => build_input::<f32>(&input, &config, depth, on_buffer, err_fn),
        other => {
            return Err(CaptureError::Device(format!("unsupported sample format {:?}", other)));
        }
    }?;

    stream
        .play()
        .map_err(|e| CaptureError::Device(format!("failed to start stream: {}", e)))?;
    Ok(stream)
}

fn build_input<T>(
    input: &cpal::Device,
    config: &StreamConfig,
    depth: BitDepth,
    on_buffer: AudioBufferCallback,
    err_fn: impl FnMut(cpal::StreamError) + Send + 'static,
) -> Result<cpal::Stream, CaptureError>
where
    T: SizedSample + FullScale,
{
    let mut scratch = Vec::new();
    input
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                encode_block(data, depth, &mut scratch);
                on_buffer(&scratch);
            },
            err_fn,
            None,
        )
        .map_err(|e| CaptureError::Device(format!("failed to build input stream: {}", e)))
}

/// Native sample widened to the full signed 32-bit range.
pub trait FullScale: Copy {
    fn to_full_scale(self) -> i32;
}

impl FullScale for u8 {
    fn to_full_scale(self) -> i32 {
        (self as i32 - 128) << 24
    }
}

impl FullScale for i16 {
    fn to_full_scale(self) -> i32 {
        (self as i32) << 16
    }
}

impl FullScale for i32 {
    fn to_full_scale(self) -> i32 {
        self
    }
}

impl FullScale for f32 {
    fn to_full_scale(self) -> i32 {
        // Float-to-int `as` saturates; NaN maps to 0.
        (self.clamp(-1.0, 1.0) as f64 * 2_147_483_648.0) as i32
    }
}

/// Re-encode native samples as `depth` PCM bytes into `out`.
pub fn encode_block<T: FullScale>(data: &[T], depth: BitDepth, out: &mut Vec<u8>) {
    out.clear();
    out.reserve(data.len() * depth.bytes_per_sample());
    for &sample in data {
        let value = pcm::from_i32_full_scale(sample.to_full_scale(), depth);
        pcm::push_sample(out, depth, value);
    }
}
