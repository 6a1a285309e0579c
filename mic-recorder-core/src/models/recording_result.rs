use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::audio_models::PcmFormat;
use super::config::{InputPreset, PerformanceMode, SharingMode};

/// Result of a finished recording, whether it was stopped or ended by a fault.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingSummary {
    pub file_path: PathBuf,
    /// Format in the finished header (negotiated rate, if it differed).
    pub format: PcmFormat,
    pub data_bytes: u64,
    /// Header plus data.
    pub file_bytes: u64,
    pub duration_secs: f64,
    pub dropped_frames: u64,
    pub checksum: String,
}

/// Metadata stored alongside a recording as `<file>.metadata.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingMetadata {
    pub id: String,
    pub created_at: String,
    pub file_path: String,
    pub format: PcmFormat,
    pub input_preset: InputPreset,
    pub performance_mode: PerformanceMode,
    pub sharing_mode: SharingMode,
    pub duration_secs: f64,
    pub data_bytes: u64,
    pub dropped_frames: u64,
    pub checksum: String,
}

impl RecordingMetadata {
    pub fn new(
        summary: &RecordingSummary,
        input_preset: InputPreset,
        performance_mode: PerformanceMode,
        sharing_mode: SharingMode,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            file_path: summary.file_path.display().to_string(),
            format: summary.format,
            input_preset,
            performance_mode,
            sharing_mode,
            duration_secs: summary.duration_secs,
            data_bytes: summary.data_bytes,
            dropped_frames: summary.dropped_frames,
            checksum: summary.checksum.clone(),
        }
    }
}
