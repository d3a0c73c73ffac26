use std::sync::atomic::{AtomicU32, Ordering};

use crate::models::audio_block::AudioBlock;
use crate::processing::pcm;

/// RMS level of a block, normalized to 0.0–1.0.
///
/// Samples are divided by the magnitude of the signed range (32768 for
/// 16-bit). An empty block measures 0.0.
pub fn measure_level(block: &AudioBlock<'_>) -> f32 {
    let count = block.sample_count();
    if count == 0 {
        return 0.0;
    }

    let depth = block.bit_depth();
    let scale = depth.full_scale();
    let sum_sq: f64 = pcm::samples(block.as_bytes(), depth)
        .map(|s| {
            let normalized = s as f64 / scale;
            normalized * normalized
        })
        .sum();

    ((sum_sq / count as f64).sqrt() as f32).clamp(0.0, 1.0)
}

/// Most recent level, published by the callback and read by the host.
#[derive(Debug)]
pub struct LevelMonitor {
    level_bits: AtomicU32,
}

impl LevelMonitor {
    pub fn new() -> Self {
        Self {
            level_bits: AtomicU32::new(0.0f32.to_bits()),
        }
    }

    pub fn publish(&self, level: f32) {
        self.level_bits.store(level.to_bits(), Ordering::Relaxed);
    }

    pub fn level(&self) -> f32 {
        f32::from_bits(self.level_bits.load(Ordering::Relaxed))
    }

    pub fn reset(&self) {
        self.publish(0.0);
    }
}

impl Default for LevelMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::format::BitDepth;
    use approx::assert_relative_eq;

    fn level_of(samples: &[i16]) -> f32 {
        let mut bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        let block = AudioBlock::new(&mut bytes, BitDepth::Sixteen).unwrap();
        measure_level(&block)
    }

    #[test]
    fn silence_is_exactly_zero() {
        assert_eq!(level_of(&[0; 1024]), 0.0);
    }

    #[test]
    fn empty_block_is_zero() {
        assert_eq!(level_of(&[]), 0.0);
    }

    #[test]
    fn full_scale_square_wave_is_one() {
        let square: Vec<i16> = (0..2048)
            .map(|i| if (i / 32) % 2 == 0 { i16::MAX } else { i16::MIN })
            .collect();
        assert_relative_eq!(level_of(&square), 1.0, epsilon = 1e-4);
    }

    #[test]
    fn half_scale_constant() {
        assert_relative_eq!(level_of(&[16384; 256]), 0.5, epsilon = 1e-6);
    }

    #[test]
    fn twenty_four_bit_uses_its_own_scale() {
        let mut bytes = Vec::new();
        for _ in 0..64 {
            pcm::push_sample(&mut bytes, BitDepth::TwentyFour, 1 << 22);
        }
        let block = AudioBlock::new(&mut bytes, BitDepth::TwentyFour).unwrap();
        assert_relative_eq!(measure_level(&block), 0.5, epsilon = 1e-6);
    }

    #[test]
    fn eight_bit_midpoint_is_silence() {
        let mut bytes = vec![128u8; 100];
        let block = AudioBlock::new(&mut bytes, BitDepth::Eight).unwrap();
        assert_eq!(measure_level(&block), 0.0);
    }

    #[test]
    fn monitor_publishes_latest() {
        let monitor = LevelMonitor::new();
        assert_eq!(monitor.level(), 0.0);
        monitor.publish(0.25);
        monitor.publish(0.75);
        assert_eq!(monitor.level(), 0.75);
        monitor.reset();
        assert_eq!(monitor.level(), 0.0);
    }
}
