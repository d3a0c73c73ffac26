//! Little-endian PCM sample codec shared by the gain and meter stages.
//!
//! Values are signed integers in the depth's own range
//! (`BitDepth::min_value()..=BitDepth::max_value()`). 8-bit samples are
//! stored unsigned with a 128 offset.

use crate::models::format::BitDepth;

/// Decode the sample starting at `bytes[0]`.
///
/// `bytes` must hold at least `depth.bytes_per_sample()` bytes.
#[inline]
pub fn read_sample(bytes: &[u8], depth: BitDepth) -> i32 {
    match depth {
        BitDepth::Eight => bytes[0] as i32 - 128,
        BitDepth::Sixteen => i16::from_le_bytes([bytes[0], bytes[1]]) as i32,
        // Place the 3 bytes in the top of an i32, then arithmetic-shift to sign extend.
        BitDepth::TwentyFour => i32::from_le_bytes([0, bytes[0], bytes[1], bytes[2]]) >> 8,
        BitDepth::ThirtyTwo => i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
    }
}

/// Encode `value` into `bytes[..depth.bytes_per_sample()]`.
///
/// `value` must already be within the depth's range.
#[inline]
pub fn write_sample(bytes: &mut [u8], depth: BitDepth, value: i32) {
    match depth {
        BitDepth::Eight => bytes[0] = (value + 128) as u8,
        BitDepth::Sixteen => bytes[..2].copy_from_slice(&(value as i16).to_le_bytes()),
        BitDepth::TwentyFour => bytes[..3].copy_from_slice(&value.to_le_bytes()[..3]),
        BitDepth::ThirtyTwo => bytes[..4].copy_from_slice(&value.to_le_bytes()),
    }
}

/// Append `value` to `out` in the depth's byte layout.
#[inline]
pub fn push_sample(out: &mut Vec<u8>, depth: BitDepth, value: i32) {
    let mut buf = [0u8; 4];
    let width = depth.bytes_per_sample();
    write_sample(&mut buf, depth, value);
    out.extend_from_slice(&buf[..width]);
}

/// Reduce a full-scale 32-bit sample to `depth` by dropping low bits.
#[inline]
pub fn from_i32_full_scale(value: i32, depth: BitDepth) -> i32 {
    match depth {
        BitDepth::Eight => value >> 24,
        BitDepth::Sixteen => value >> 16,
        BitDepth::TwentyFour => value >> 8,
        BitDepth::ThirtyTwo => value,
    }
}

/// Iterate over the decoded samples of an interleaved byte buffer.
///
/// Trailing bytes that do not form a whole sample are ignored.
pub fn samples(bytes: &[u8], depth: BitDepth) -> impl Iterator<Item = i32> + '_ {
    bytes
        .chunks_exact(depth.bytes_per_sample())
        .map(move |chunk| read_sample(chunk, depth))
}
