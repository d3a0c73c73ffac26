use std::fs::{self, File};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::models::audio_block::AudioBlock;
use crate::models::error::CaptureError;
use crate::models::format::StreamFormat;
use crate::processing::wav_format;

const WRITE_BUFFER_CAPACITY: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Open,
    /// A write failed. Appends are refused; close still finalizes.
    Failed,
    Closed,
}

/// Streaming WAV file writer.
///
/// ## File Format
///
/// ```text
/// [44-byte WAV header, data size 0 until close]
/// [raw little-endian PCM data...]
/// ```
///
/// The header is flushed on open so an abandoned file is still a RIFF
/// container. The data length is only known when capture stops, so the size
/// fields are rewritten by `close`.
pub struct WavStreamWriter {
    file_path: PathBuf,
    format: StreamFormat,
    writer: Option<BufWriter<File>>,
    data_bytes: u64,
    state: WriterState,
}

impl WavStreamWriter {
    /// Create the file and write the initial header.
    pub fn open(file_path: impl Into<PathBuf>, format: StreamFormat) -> Result<Self, CaptureError> {
        let file_path = file_path.into();
        format.validate()?;

        if let Some(parent) = file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| CaptureError::Io(format!("failed to create directory {}: {}", parent.display(), e)))?;
        }

        let mut file = File::create(&file_path)
            .map_err(|e| CaptureError::Io(format!("failed to create {}: {}", file_path.display(), e)))?;

        let header = wav_format::generate_wav_header(&format, 0);
        file.write_all(&header)
            .and_then(|_| file.flush())
            .map_err(|e| CaptureError::Io(format!("failed to write header: {}", e)))?;

        log::debug!("Opened {} for {}", file_path.display(), format);

        Ok(Self {
            file_path,
            format,
            writer: Some(BufWriter::with_capacity(WRITE_BUFFER_CAPACITY, file)),
            data_bytes: 0,
            state: WriterState::Open,
        })
    }

    /// Append one block of PCM.
    ///
    /// A failed write leaves the writer in the failed state: this and every
    /// later append returns an error, nothing is retried.
    pub fn append(&mut self, block: &AudioBlock<'_>) -> Result<(), CaptureError> {
        match self.state {
            WriterState::Open => {}
            WriterState::Failed => {
                return Err(CaptureError::Io("writer failed earlier; stream is closed to appends".into()))
            }
            WriterState::Closed => return Err(CaptureError::Io("writer is closed".into())),
        }

        if block.bit_depth() != self.format.bit_depth {
            return Err(CaptureError::Configuration(format!(
                "block is {} but stream is {}",
                block.bit_depth(),
                self.format.bit_depth
            )));
        }

        let len = block.len() as u64;
        if self.data_bytes + len > wav_format::MAX_DATA_BYTES {
            self.state = WriterState::Failed;
            return Err(CaptureError::Io("WAV size limit reached".into()));
        }

        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| CaptureError::Io("writer is closed".into()))?;
        if let Err(e) = writer.write_all(block.as_bytes()) {
            self.state = WriterState::Failed;
            return Err(CaptureError::Io(format!("write failed: {}", e)));
        }

        self.data_bytes += len;
        Ok(())
    }

    /// Flush, rewrite the size fields and sync the file.
    ///
    /// Closing an already closed writer does nothing.
    pub fn close(&mut self) -> Result<(), CaptureError> {
        let Some(writer) = self.writer.take() else {
            self.state = WriterState::Closed;
            return Ok(());
        };
        let failed = self.state == WriterState::Failed;
        self.state = WriterState::Closed;

        let result = if failed {
            self.finalize_after_failure(writer)
        } else {
            writer
                .into_inner()
                .map_err(|e| CaptureError::Io(format!("flush failed: {}", e.error())))
                .and_then(|file| self.finalize(file))
        };

        if let Err(ref e) = result {
            log::error!("Failed to finalize {}: {}", self.file_path.display(), e);
        }
        result
    }

    fn finalize_after_failure(&mut self, mut writer: BufWriter<File>) -> Result<(), CaptureError> {
        if let Err(e) = writer.flush() {
            log::warn!("Dropping buffered audio for {}: {}", self.file_path.display(), e);
        }
        // Trust only what reached the file.
        let (file, _unwritten) = writer.into_parts();
        let on_disk = file.metadata()?.len().saturating_sub(wav_format::WAV_HEADER_SIZE as u64);
        let block_align = self.format.block_align() as u64;
        let kept = self.data_bytes.min(on_disk) / block_align * block_align;

        log::warn!(
            "Finalizing {} after write failure: keeping {} of {} bytes",
            self.file_path.display(),
            kept,
            self.data_bytes
        );

        file.set_len(wav_format::WAV_HEADER_SIZE as u64 + kept)?;
        self.data_bytes = kept;
        self.finalize(file)
    }

    fn finalize(&mut self, mut file: File) -> Result<(), CaptureError> {
        let data_size = self.data_bytes as u32;
        let riff_size = wav_format::riff_chunk_size(data_size);

        file.seek(SeekFrom::Start(wav_format::RIFF_SIZE_OFFSET))?;
        file.write_all(&riff_size.to_le_bytes())?;
        file.seek(SeekFrom::Start(wav_format::DATA_SIZE_OFFSET))?;
        file.write_all(&data_size.to_le_bytes())?;
        file.sync_all()?;

        log::debug!("Finalized {} with {} data bytes", self.file_path.display(), data_size);
        Ok(())
    }

    /// SHA-256 hex digest of the file as it is on disk.
    pub fn checksum(&self) -> Result<String, CaptureError> {
        sha256_file(&self.file_path)
    }

    /// Bytes of PCM accepted so far.
    pub fn data_bytes(&self) -> u64 {
        self.data_bytes
    }

    /// Whole frames accepted so far.
    pub fn frames(&self) -> u64 {
        self.data_bytes / self.format.block_align() as u64
    }

    pub fn format(&self) -> &StreamFormat {
        &self.format
    }

    pub fn is_open(&self) -> bool {
        self.state == WriterState::Open
    }

    pub fn has_failed(&self) -> bool {
        self.state == WriterState::Failed
    }

    /// Path of the output file.
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }
}

impl Drop for WavStreamWriter {
    fn drop(&mut self) {
        if self.writer.is_some() {
            if let Err(e) = self.close() {
                log::warn!("Failed to close {} on drop: {}", self.file_path.display(), e);
            }
        }
    }
}

/// Compute SHA-256 hex digest of a file.
fn sha256_file(path: &Path) -> Result<String, CaptureError> {
    let mut file = File::open(path)
        .map_err(|e| CaptureError::Io(format!("failed to read file for checksum: {}", e)))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex_encode(&hasher.finalize()))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::format::BitDepth;

    fn le_u32(bytes: &[u8], at: usize) -> u32 {
        u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
    }

    fn append_bytes(writer: &mut WavStreamWriter, mut bytes: Vec<u8>) -> Result<(), CaptureError> {
        let depth = writer.format().bit_depth;
        let block = AudioBlock::new(&mut bytes, depth)?;
        writer.append(&block)
    }

    #[test]
    fn header_is_on_disk_before_any_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fresh.wav");
        let _writer = WavStreamWriter::open(&path, StreamFormat::default()).unwrap();

        let file_data = fs::read(&path).unwrap();
        assert_eq!(file_data.len(), 44);
        assert_eq!(&file_data[0..4], b"RIFF");
        assert_eq!(le_u32(&file_data, 40), 0);
    }

    #[test]
    fn write_plain_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.wav");
        let format = StreamFormat::new(48000, BitDepth::Sixteen, 2);

        let mut writer = WavStreamWriter::open(&path, format).unwrap();
        append_bytes(&mut writer, vec![0u8; 16]).unwrap();
        append_bytes(&mut writer, vec![1u8; 8]).unwrap();
        assert_eq!(writer.frames(), 6);
        writer.close().unwrap();

        let file_data = fs::read(&path).unwrap();
        assert_eq!(file_data.len(), 44 + 24);
        assert_eq!(le_u32(&file_data, 40), 24);
        assert_eq!(le_u32(&file_data, 4), 36 + 24);
        assert!(!writer.checksum().unwrap().is_empty());
    }

    #[test]
    fn close_twice_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("twice.wav");

        let mut writer = WavStreamWriter::open(&path, StreamFormat::default()).unwrap();
        append_bytes(&mut writer, vec![7u8; 100]).unwrap();
        writer.close().unwrap();
        let first = fs::read(&path).unwrap();

        writer.close().unwrap();
        assert_eq!(fs::read(&path).unwrap(), first);
        assert_eq!(writer.data_bytes(), 100);
    }

    #[test]
    fn append_after_close_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = WavStreamWriter::open(dir.path().join("closed.wav"), StreamFormat::default()).unwrap();
        writer.close().unwrap();
        assert!(matches!(append_bytes(&mut writer, vec![0u8; 4]), Err(CaptureError::Io(_))));
    }

    #[test]
    fn mismatched_depth_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = WavStreamWriter::open(dir.path().join("depth.wav"), StreamFormat::default()).unwrap();
        let mut bytes = vec![0u8; 6];
        let block = AudioBlock::new(&mut bytes, BitDepth::TwentyFour).unwrap();
        assert!(matches!(writer.append(&block), Err(CaptureError::Configuration(_))));
        assert!(writer.is_open());
    }

    #[test]
    fn creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("take.wav");
        let mut writer = WavStreamWriter::open(&path, StreamFormat::default()).unwrap();
        writer.close().unwrap();
        assert!(path.exists());
    }

    #[test]
    fn unwritable_path_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened as a file.
        let result = WavStreamWriter::open(dir.path(), StreamFormat::default());
        assert!(matches!(result, Err(CaptureError::Io(_))));
    }

    #[test]
    fn readable_by_standard_decoder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hound.wav");
        let format = StreamFormat::new(22050, BitDepth::TwentyFour, 2);

        let mut writer = WavStreamWriter::open(&path, format).unwrap();
        let mut bytes = Vec::new();
        for value in [-8_388_608, -1, 0, 1, 8_388_607, 42] {
            crate::processing::pcm::push_sample(&mut bytes, BitDepth::TwentyFour, value);
        }
        append_bytes(&mut writer, bytes).unwrap();
        writer.close().unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.sample_rate, 22050);
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.bits_per_sample, 24);
        let samples: Vec<i32> = reader.samples::<i32>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![-8_388_608, -1, 0, 1, 8_388_607, 42]);
    }

    #[test]
    fn failure_refuses_appends_and_close_keeps_written_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("limit.wav");
        let mut writer = WavStreamWriter::open(&path, StreamFormat::default()).unwrap();
        append_bytes(&mut writer, vec![3u8; 100]).unwrap();

        // Pretend the container is nearly full.
        writer.data_bytes = wav_format::MAX_DATA_BYTES - 2;
        let err = append_bytes(&mut writer, vec![0u8; 4]).unwrap_err();
        assert!(matches!(err, CaptureError::Io(ref msg) if msg.contains("size limit")));
        assert!(writer.has_failed());

        let again = append_bytes(&mut writer, vec![0u8; 2]).unwrap_err();
        assert!(matches!(again, CaptureError::Io(ref msg) if msg.contains("failed earlier")));

        writer.close().unwrap();
        assert_eq!(writer.data_bytes(), 100);
        let file_data = fs::read(&path).unwrap();
        assert_eq!(file_data.len(), 44 + 100);
        assert_eq!(le_u32(&file_data, 40), 100);

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.len(), 50);
    }
}
