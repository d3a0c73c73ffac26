use super::error::CaptureError;
use super::format::BitDepth;

/// A mutable view over one block of interleaved little-endian PCM bytes.
///
/// Borrowed from the callback invocation that produced it. Construction
/// checks that the bytes hold a whole number of samples, so every consumer
/// may assume whole sample units.
#[derive(Debug)]
pub struct AudioBlock<'a> {
    data: &'a mut [u8],
    bit_depth: BitDepth,
}

impl<'a> AudioBlock<'a> {
    pub fn new(data: &'a mut [u8], bit_depth: BitDepth) -> Result<Self, CaptureError> {
        let sample_width = bit_depth.bytes_per_sample();
        if data.len() % sample_width != 0 {
            return Err(CaptureError::MalformedBlock {
                len: data.len(),
                sample_width,
            });
        }
        Ok(Self { data, bit_depth })
    }

    pub fn bit_depth(&self) -> BitDepth {
        self.bit_depth
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        self.data
    }

    /// Byte length of the block.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of samples across all channels.
    pub fn sample_count(&self) -> usize {
        self.data.len() / self.bit_depth.bytes_per_sample()
    }
}
