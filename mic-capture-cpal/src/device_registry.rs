//! Input device enumeration via the cpal default host.
//!
//! Devices are identified by their ordinal in `Host::input_devices()`.
//! The name is kept alongside so a reordered device list is detected
//! instead of silently recording from the wrong microphone.

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::SampleFormat;

use mic_capture_core::models::device::DeviceDescriptor;
use mic_capture_core::models::error::CaptureError;
use mic_capture_core::models::format::{BitDepth, StreamFormat};
use mic_capture_core::traits::device_registry::DeviceRegistry;

use crate::cpal_mic::CpalMicCapture;

/// Capture devices of the platform's default audio host.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalDeviceRegistry;

impl CpalDeviceRegistry {
    pub fn new() -> Self {
        Self
    }
}

impl DeviceRegistry for CpalDeviceRegistry {
    type Provider = CpalMicCapture;

    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>, CaptureError> {
        let host = cpal::default_host();
        let default_name = host.default_input_device().and_then(|d| d.name().ok());

        let devices = host
            .input_devices()
            .map_err(|e| CaptureError::Device(format!("failed to enumerate input devices: {}", e)))?;

        Ok(devices
            .enumerate()
            .map(|(index, device)| {
                let name = device_name(&device, index);
                let is_default = default_name.as_deref() == Some(name.as_str());
                DeviceDescriptor::new(index, name, is_default)
            })
            .collect())
    }

    fn open_device(&self, device: &DeviceDescriptor, format: &StreamFormat) -> Result<CpalMicCapture, CaptureError> {
        format.validate()?;
        let input = find_input_device(device)?;

        let ranges: Vec<ConfigRange> = input
            .supported_input_configs()
            .map_err(|e| CaptureError::Device(format!("failed to query '{}': {}", device.name, e)))?
            .map(ConfigRange::from)
            .collect();

        let sample_format = select_sample_format(&ranges, format).ok_or_else(|| {
            CaptureError::Device(format!("'{}' cannot capture {}", device.name, format))
        })?;

        log::debug!("Opening '{}' at {} ({:?} samples)", device.name, format, sample_format);
        Ok(CpalMicCapture::new(device.clone(), *format, sample_format))
    }
}

/// Resolve `descriptor` against a fresh enumeration.
pub(crate) fn find_input_device(descriptor: &DeviceDescriptor) -> Result<cpal::Device, CaptureError> {
    let host = cpal::default_host();
    let device = host
        .input_devices()
        .map_err(|e| CaptureError::Device(format!("failed to enumerate input devices: {}", e)))?
        .nth(descriptor.index)
        .ok_or_else(|| CaptureError::Device(format!("'{}' is no longer available", descriptor.name)))?;

    let name = device_name(&device, descriptor.index);
    if name != descriptor.name {
        return Err(CaptureError::Device(format!(
            "device list changed: expected '{}' at index {}, found '{}'",
            descriptor.name, descriptor.index, name
        )));
    }
    Ok(device)
}

fn device_name(device: &cpal::Device, index: usize) -> String {
    device.name().unwrap_or_else(|_| format!("Input device {}", index))
}

/// The parts of a supported config range that format negotiation needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ConfigRange {
    channels: u16,
    min_sample_rate: u32,
    max_sample_rate: u32,
    sample_format: SampleFormat,
}

impl From<cpal::SupportedStreamConfigRange> for ConfigRange {
    fn from(range: cpal::SupportedStreamConfigRange) -> Self {
        Self {
            channels: range.channels(),
            min_sample_rate: range.min_sample_rate().0,
            max_sample_rate: range.max_sample_rate().0,
            sample_format: range.sample_format(),
        }
    }
}

impl ConfigRange {
    fn covers(&self, format: &StreamFormat) -> bool {
        self.channels == format.channels
            && (self.min_sample_rate..=self.max_sample_rate).contains(&format.sample_rate)
    }
}

/// Native sample formats to ask the device for, best first.
fn preferred_sample_formats(depth: BitDepth) -> [SampleFormat; 4] {
    match depth {
        BitDepth::Eight => [SampleFormat::U8, SampleFormat::I16, SampleFormat::F32, SampleFormat::I32],
        BitDepth::Sixteen => [SampleFormat::I16, SampleFormat::F32, SampleFormat::I32, SampleFormat::U8],
        BitDepth::TwentyFour | BitDepth::ThirtyTwo => {
            [SampleFormat::I32, SampleFormat::F32, SampleFormat::I16, SampleFormat::U8]
        }
    }
}

fn select_sample_format(ranges: &[ConfigRange], format: &StreamFormat) -> Option<SampleFormat> {
    preferred_sample_formats(format.bit_depth)
        .into_iter()
        .find(|wanted| {
            ranges
                .iter()
                .any(|r| r.sample_format == *wanted && r.covers(format))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(channels: u16, min: u32, max: u32, sample_format: SampleFormat) -> ConfigRange {
        ConfigRange {
            channels,
            min_sample_rate: min,
            max_sample_rate: max,
            sample_format,
        }
    }

    #[test]
    fn prefers_native_sixteen_bit() {
        let ranges = [
            range(1, 8000, 96000, SampleFormat::F32),
            range(1, 8000, 96000, SampleFormat::I16),
        ];
        assert_eq!(
            select_sample_format(&ranges, &StreamFormat::default()),
            Some(SampleFormat::I16)
        );
    }

    #[test]
    fn falls_back_to_float() {
        let ranges = [range(2, 44100, 48000, SampleFormat::F32)];
        let format = StreamFormat::new(48000, BitDepth::TwentyFour, 2);
        assert_eq!(select_sample_format(&ranges, &format), Some(SampleFormat::F32));
    }

    #[test]
    fn rate_outside_range_is_unsupported() {
        let ranges = [range(1, 44100, 48000, SampleFormat::I16)];
        let format = StreamFormat::new(96000, BitDepth::Sixteen, 1);
        assert_eq!(select_sample_format(&ranges, &format), None);
    }

    #[test]
    fn channel_count_must_match() {
        let ranges = [range(2, 8000, 96000, SampleFormat::I16)];
        assert_eq!(select_sample_format(&ranges, &StreamFormat::default()), None);
    }

    #[test]
    fn unusable_native_formats_are_skipped() {
        let ranges = [range(1, 8000, 96000, SampleFormat::F64)];
        assert_eq!(select_sample_format(&ranges, &StreamFormat::default()), None);
    }

    #[test]
    fn enumerate_does_not_panic() {
        // Depends on the host; only checks that enumeration is well-behaved.
        if let Ok(devices) = CpalDeviceRegistry::new().enumerate() {
            for (i, device) in devices.iter().enumerate() {
                assert_eq!(device.index, i);
            }
        }
    }
}
