use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::CaptureError;

/// Sample rates offered to pickers. Any positive rate is accepted.
pub const COMMON_SAMPLE_RATES: [u32; 6] = [8000, 16000, 22050, 44100, 48000, 96000];

/// PCM bit depth.
///
/// 8-bit samples are unsigned with a 128 offset (WAV convention). All
/// wider depths are signed little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum BitDepth {
    Eight,
    Sixteen,
    TwentyFour,
    ThirtyTwo,
}

impl BitDepth {
    pub const ALL: [BitDepth; 4] = [Self::Eight, Self::Sixteen, Self::TwentyFour, Self::ThirtyTwo];

    pub fn bits(self) -> u16 {
        match self {
            Self::Eight => 8,
            Self::Sixteen => 16,
            Self::TwentyFour => 24,
            Self::ThirtyTwo => 32,
        }
    }

    /// Width of one sample in bytes.
    pub fn bytes_per_sample(self) -> usize {
        self.bits() as usize / 8
    }

    /// Smallest representable sample value.
    pub fn min_value(self) -> i32 {
        match self {
            Self::Eight => i8::MIN as i32,
            Self::Sixteen => i16::MIN as i32,
            Self::TwentyFour => -(1 << 23),
            Self::ThirtyTwo => i32::MIN,
        }
    }

    /// Largest representable sample value.
    pub fn max_value(self) -> i32 {
        match self {
            Self::Eight => i8::MAX as i32,
            Self::Sixteen => i16::MAX as i32,
            Self::TwentyFour => (1 << 23) - 1,
            Self::ThirtyTwo => i32::MAX,
        }
    }

    /// Magnitude of the signed range, used to normalize samples to [-1, 1].
    pub fn full_scale(self) -> f64 {
        -(self.min_value() as f64)
    }
}

impl TryFrom<u16> for BitDepth {
    type Error = CaptureError;

    fn try_from(bits: u16) -> Result<Self, Self::Error> {
        match bits {
            8 => Ok(Self::Eight),
            16 => Ok(Self::Sixteen),
            24 => Ok(Self::TwentyFour),
            32 => Ok(Self::ThirtyTwo),
            other => Err(CaptureError::Configuration(format!("unsupported bit depth: {}", other))),
        }
    }
}

impl From<BitDepth> for u16 {
    fn from(depth: BitDepth) -> Self {
        depth.bits()
    }
}

impl fmt::Display for BitDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-bit", self.bits())
    }
}

/// Format of a capture stream and of the file it is written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamFormat {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    pub bit_depth: BitDepth,
    /// 1 = mono, 2 = stereo interleaved.
    pub channels: u16,
}

impl StreamFormat {
    pub fn new(sample_rate: u32, bit_depth: BitDepth, channels: u16) -> Self {
        Self {
            sample_rate,
            bit_depth,
            channels,
        }
    }

    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.sample_rate == 0 {
            return Err(CaptureError::Configuration("sample rate must be positive".into()));
        }
        if ![1, 2].contains(&self.channels) {
            return Err(CaptureError::Configuration(format!(
                "unsupported channel count: {}",
                self.channels
            )));
        }
        Ok(())
    }

    /// Bytes per frame (one sample per channel).
    pub fn block_align(&self) -> usize {
        self.bit_depth.bytes_per_sample() * self.channels as usize
    }

    pub fn byte_rate(&self) -> u32 {
        self.sample_rate * self.block_align() as u32
    }

    /// Duration in seconds of `frames` frames at this format's rate.
    pub fn frames_to_secs(&self, frames: u64) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        frames as f64 / self.sample_rate as f64
    }
}

impl Default for StreamFormat {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            bit_depth: BitDepth::Sixteen,
            channels: 1,
        }
    }
}

impl fmt::Display for StreamFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let layout = if self.channels == 1 { "mono" } else { "stereo" };
        write!(f, "{} Hz {} {}", self.sample_rate, self.bit_depth, layout)
    }
}
