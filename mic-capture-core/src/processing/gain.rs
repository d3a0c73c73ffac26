//! Linear gain with saturating clamp.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::models::audio_block::AudioBlock;
use crate::models::config::validate_gain;
use crate::models::error::CaptureError;
use crate::processing::pcm;

/// Unity gain.
pub const UNITY_GAIN: f64 = 1.0;

/// Scale every sample of `block` by `gain` in place.
///
/// Each product is pinned to the bit depth's representable range and then
/// truncated toward zero, so overdrive saturates instead of wrapping.
pub fn apply_gain(block: &mut AudioBlock<'_>, gain: f64) {
    if gain == UNITY_GAIN {
        return;
    }

    let depth = block.bit_depth();
    let width = depth.bytes_per_sample();
    let min = depth.min_value() as f64;
    let max = depth.max_value() as f64;

    for chunk in block.as_bytes_mut().chunks_exact_mut(width) {
        let sample = pcm::read_sample(chunk, depth) as f64;
        let amplified = (sample * gain).clamp(min, max);
        pcm::write_sample(chunk, depth, amplified as i32);
    }
}

/// Gain shared between the control plane and the device callback.
///
/// Stored as `f64` bits in one atomic so the callback always reads a whole
/// value.
#[derive(Debug)]
pub struct GainControl {
    bits: AtomicU64,
}

impl GainControl {
    pub fn new(initial: f64) -> Result<Self, CaptureError> {
        validate_gain(initial)?;
        Ok(Self {
            bits: AtomicU64::new(initial.to_bits()),
        })
    }

    pub fn set(&self, gain: f64) -> Result<(), CaptureError> {
        validate_gain(gain)?;
        self.bits.store(gain.to_bits(), Ordering::Release);
        Ok(())
    }

    /// One snapshot of the current gain.
    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }
}

impl Default for GainControl {
    fn default() -> Self {
        Self {
            bits: AtomicU64::new(UNITY_GAIN.to_bits()),
        }
    }
}
