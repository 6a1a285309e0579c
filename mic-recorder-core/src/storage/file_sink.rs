use std::fs::{self, File};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::models::audio_models::PcmFormat;
use crate::models::error::SinkError;
use crate::processing::wav_format::{self, MAX_WAV_DATA_BYTES, WAV_HEADER_SIZE};

/// Streaming WAV file writer.
///
/// ## File Format
///
/// ```text
/// [44-byte WAV header, sizes zero until close]
/// [little-endian interleaved PCM data...]
/// ```
///
/// Single writer: the session hands the sink to the writer thread for the
/// duration of a recording and takes it back to close it.
pub struct FileSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    format: Option<PcmFormat>,
    data_bytes: u64,
}

/// What [`FileSink::close`] leaves behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkSummary {
    pub path: PathBuf,
    /// Format written to the header, after any sample-rate patch.
    pub format: PcmFormat,
    pub data_bytes: u64,
    /// Header plus data, plus the pad byte after an odd-sized data chunk.
    pub file_bytes: u64,
    /// Hex SHA-256 of the finished file.
    pub checksum: String,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: None,
            format: None,
            data_bytes: 0,
        }
    }

    /// Create the file (and its directory) and write a placeholder header.
    pub fn open(&mut self, format: &PcmFormat) -> Result<(), SinkError> {
        if self.writer.is_some() {
            return Ok(());
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                SinkError::OpenFailed(format!("failed to create {}: {}", parent.display(), e))
            })?;
        }

        let file = File::create(&self.path)
            .map_err(|e| SinkError::OpenFailed(format!("{}: {}", self.path.display(), e)))?;
        let mut writer = BufWriter::new(file);

        let header = wav_format::generate_wav_header(format, 0);
        writer
            .write_all(&header)
            .map_err(|e| SinkError::OpenFailed(format!("failed to write header: {}", e)))?;

        self.writer = Some(writer);
        self.format = Some(*format);
        self.data_bytes = 0;
        log::debug!("opened {} ({:?})", self.path.display(), format);
        Ok(())
    }

    /// Append PCM bytes verbatim.
    pub fn write_frames(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
        let writer = self.writer.as_mut().ok_or(SinkError::NotOpen)?;

        let new_total = self.data_bytes + bytes.len() as u64;
        if new_total > MAX_WAV_DATA_BYTES {
            return Err(SinkError::WriteFailed(format!(
                "data would exceed the {} byte WAV limit",
                MAX_WAV_DATA_BYTES
            )));
        }

        writer
            .write_all(bytes)
            .map_err(|e| SinkError::WriteFailed(e.to_string()))?;
        self.data_bytes = new_total;
        Ok(())
    }

    /// Finalize the file: patch header sizes, release the handle, checksum.
    ///
    /// `actual_sample_rate` rewrites the rate fields when the stream ran at a
    /// different rate than the header was opened with.
    pub fn close(&mut self, actual_sample_rate: Option<u32>) -> Result<SinkSummary, SinkError> {
        let mut writer = self.writer.take().ok_or(SinkError::NotOpen)?;
        let mut format = self.format.take().ok_or(SinkError::NotOpen)?;

        let mut header = wav_format::generate_wav_header(&format, 0);
        if let Some(rate) = actual_sample_rate.filter(|&r| r != format.sample_rate) {
            log::warn!(
                "{}: header rate {} Hz patched to negotiated {} Hz",
                self.path.display(),
                format.sample_rate,
                rate
            );
            format.sample_rate = rate;
            wav_format::patch_sample_rate(&mut header, rate, format.channels, format.bit_depth);
        }

        // RIFF chunks are word-aligned: an odd data chunk is followed by a
        // pad byte that the data size does not count.
        let pad = self.data_bytes % 2;
        if pad == 1 {
            writer
                .write_all(&[0])
                .map_err(|e| SinkError::WriteFailed(e.to_string()))?;
        }

        let file_bytes = WAV_HEADER_SIZE as u64 + self.data_bytes + pad;
        wav_format::patch_data_size(&mut header, self.data_bytes);
        wav_format::patch_file_size(&mut header, file_bytes);

        let mut file = writer
            .into_inner()
            .map_err(|e| SinkError::WriteFailed(format!("flush failed: {}", e.error())))?;
        rewrite_header(&mut file, &header).map_err(|e| SinkError::WriteFailed(e.to_string()))?;
        drop(file);

        let checksum = sha256_file(&self.path)?;
        log::debug!(
            "closed {} ({} data bytes)",
            self.path.display(),
            self.data_bytes
        );

        Ok(SinkSummary {
            path: self.path.clone(),
            format,
            data_bytes: self.data_bytes,
            file_bytes,
            checksum,
        })
    }

    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    /// PCM bytes written so far (excluding the header).
    pub fn data_bytes(&self) -> u64 {
        self.data_bytes
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        if self.is_open() {
            if let Err(e) = self.close(None) {
                log::error!("failed to finalize {}: {}", self.path.display(), e);
            }
        }
    }
}

fn rewrite_header(file: &mut File, header: &[u8]) -> io::Result<()> {
    file.seek(SeekFrom::Start(0))?;
    file.write_all(header)?;
    file.flush()
}

/// Compute SHA-256 hex digest of a file.
pub fn sha256_file(path: &Path) -> Result<String, SinkError> {
    let mut file = File::open(path)
        .map_err(|e| SinkError::WriteFailed(format!("failed to read file for checksum: {}", e)))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)
        .map_err(|e| SinkError::WriteFailed(format!("failed to read file for checksum: {}", e)))?;
    Ok(hex_encode(&hasher.finalize()))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
