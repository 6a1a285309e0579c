use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::models::config::{format_code_for_bit_depth, RecordingConfig, ResolvedConfig};
use crate::models::error::ConfigError;

/// Extensions recognized as "this output path already names a file".
pub const RECOGNIZED_EXTENSIONS: [&str; 2] = ["wav", "wave"];

/// Extension used for auto-generated file names.
pub const DEFAULT_EXTENSION: &str = "wav";

/// Turns a requested [`RecordingConfig`] into engine-ready parameters.
///
/// Pure: builds path strings but never touches the filesystem. Two sessions
/// resolved within the same second into the same directory with the same
/// format get the same file name; callers that care must pick explicit paths.
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    default_dir: PathBuf,
}

impl ConfigResolver {
    pub fn new(default_dir: impl Into<PathBuf>) -> Self {
        Self {
            default_dir: default_dir.into(),
        }
    }

    pub fn default_dir(&self) -> &Path {
        &self.default_dir
    }

    pub fn resolve(&self, requested: &RecordingConfig) -> Result<ResolvedConfig, ConfigError> {
        self.resolve_at(requested, Utc::now())
    }

    /// Like [`resolve`](Self::resolve) with an explicit timestamp for auto-generated names.
    pub fn resolve_at(
        &self,
        requested: &RecordingConfig,
        now: DateTime<Utc>,
    ) -> Result<ResolvedConfig, ConfigError> {
        requested.validate()?;

        let format_code =
            format_code_for_bit_depth(requested.bit_depth).ok_or(ConfigError::OutOfRange {
                field: "bit depth",
                value: i64::from(requested.bit_depth),
            })?;

        Ok(ResolvedConfig {
            requested: requested.clone(),
            format: requested.pcm_format(),
            input_preset_code: requested.input_preset.native_code(),
            format_code,
            performance_mode_code: requested.performance_mode.native_code(),
            sharing_mode_code: requested.sharing_mode.native_code(),
            output_path: self.output_path(requested, now),
        })
    }

    fn output_path(&self, requested: &RecordingConfig, now: DateTime<Utc>) -> PathBuf {
        let raw = requested.output_path.trim();
        if raw.is_empty() {
            return self.default_dir.join(auto_file_name(requested, now));
        }
        if names_audio_file(raw) {
            return PathBuf::from(raw);
        }
        let dir = raw.trim_end_matches(['/', '\\']);
        let dir = if dir.is_empty() { &raw[..1] } else { dir };
        Path::new(dir).join(auto_file_name(requested, now))
    }
}

impl Default for ConfigResolver {
    fn default() -> Self {
        Self::new(".")
    }
}

/// Whether `path` ends in a file name with a recognized audio extension.
pub fn names_audio_file(path: &str) -> bool {
    if path.ends_with(['/', '\\']) {
        return false;
    }
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            RECOGNIZED_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

/// `rec_<yyyyMMdd_HHmmss>_<rate/1000>k_<mono|Nch>_<bits>bit.wav`
pub fn auto_file_name(config: &RecordingConfig, now: DateTime<Utc>) -> String {
    let channels = if config.channel_count == 1 {
        "mono".to_string()
    } else {
        format!("{}ch", config.channel_count)
    };
    format!(
        "rec_{}_{}k_{}_{}bit.{}",
        now.format("%Y%m%d_%H%M%S"),
        config.sample_rate_hz / 1000,
        channels,
        config.bit_depth,
        DEFAULT_EXTENSION
    )
}
