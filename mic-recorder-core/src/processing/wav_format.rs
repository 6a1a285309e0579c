//! WAV file format utilities.
//!
//! Generates standard 44-byte RIFF WAV headers, patches their size fields
//! after recording completes, and parses them back for inspection.

use crate::models::audio_models::PcmFormat;

/// Size of the standard WAV RIFF header in bytes.
pub const WAV_HEADER_SIZE: usize = 44;

/// Largest data chunk whose RIFF size (`36 + data`) still fits in 32 bits.
pub const MAX_WAV_DATA_BYTES: u64 = u32::MAX as u64 - 36;

/// PCM format code in the `fmt ` chunk.
const WAVE_FORMAT_PCM: u16 = 1;

/// Generate a 44-byte WAV RIFF header.
///
/// Format: PCM (format code 1), little-endian.
///
/// Layout:
/// ```text
/// [0-3]    "RIFF"
/// [4-7]    file size - 8 (36 + data_size)
/// [8-11]   "WAVE"
/// [12-15]  "fmt "
/// [16-19]  16 (PCM format chunk size)
/// [20-21]  1 (PCM format code)
/// [22-23]  channels
/// [24-27]  sample_rate
/// [28-31]  byte_rate = sample_rate * channels * bit_depth / 8
/// [32-33]  block_align = channels * bit_depth / 8
/// [34-35]  bit_depth
/// [36-39]  "data"
/// [40-43]  data_size
/// ```
pub fn generate_wav_header(format: &PcmFormat, data_size: u32) -> [u8; WAV_HEADER_SIZE] {
    let block_align = format.channels * format.bit_depth / 8;
    let byte_rate = format.sample_rate * u32::from(block_align);
    let chunk_size = 36u32.saturating_add(data_size);

    let mut header = [0u8; WAV_HEADER_SIZE];

    // RIFF chunk descriptor
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&chunk_size.to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");

    // fmt sub-chunk
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&WAVE_FORMAT_PCM.to_le_bytes());
    header[22..24].copy_from_slice(&format.channels.to_le_bytes());
    header[24..28].copy_from_slice(&format.sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&format.bit_depth.to_le_bytes());

    // data sub-chunk
    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_size.to_le_bytes());

    header
}

/// Patch the file-size field at offset 4 (RIFF chunk size = file_size - 8).
pub fn patch_file_size(header: &mut [u8], total_file_size: u64) {
    let chunk_size = total_file_size.saturating_sub(8).min(u64::from(u32::MAX)) as u32;
    header[4..8].copy_from_slice(&chunk_size.to_le_bytes());
}

/// Patch the data-size field at offset 40.
pub fn patch_data_size(header: &mut [u8], data_size: u64) {
    let data_size_u32 = data_size.min(u64::from(u32::MAX)) as u32;
    header[40..44].copy_from_slice(&data_size_u32.to_le_bytes());
}

/// Patch sample rate (offset 24), byte rate (offset 28), and block align (offset 32).
///
/// Used when the stream negotiated a different rate than requested.
pub fn patch_sample_rate(header: &mut [u8], sample_rate: u32, channels: u16, bit_depth: u16) {
    let block_align = channels * bit_depth / 8;
    let byte_rate = sample_rate * u32::from(block_align);

    header[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
}

/// Fields read back from a canonical 44-byte PCM header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeaderInfo {
    pub format: PcmFormat,
    pub riff_size: u32,
    pub data_size: u32,
    pub byte_rate: u32,
    pub block_align: u16,
}

/// Parse a header written by [`generate_wav_header`]. Returns `None` if the
/// bytes are not a canonical PCM WAV header.
pub fn parse_wav_header(bytes: &[u8]) -> Option<WavHeaderInfo> {
    let header = bytes.get(..WAV_HEADER_SIZE)?;
    if &header[0..4] != b"RIFF"
        || &header[8..12] != b"WAVE"
        || &header[12..16] != b"fmt "
        || &header[36..40] != b"data"
    {
        return None;
    }

    let u16_at = |i: usize| u16::from_le_bytes([header[i], header[i + 1]]);
    let u32_at =
        |i: usize| u32::from_le_bytes([header[i], header[i + 1], header[i + 2], header[i + 3]]);

    if u32_at(16) != 16 || u16_at(20) != WAVE_FORMAT_PCM {
        return None;
    }

    Some(WavHeaderInfo {
        format: PcmFormat::new(u32_at(24), u16_at(22), u16_at(34)),
        riff_size: u32_at(4),
        data_size: u32_at(40),
        byte_rate: u32_at(28),
        block_align: u16_at(32),
    })
}
