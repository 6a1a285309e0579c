use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::audio_models::PcmFormat;
use super::error::ConfigError;

pub const MIN_SAMPLE_RATE: u32 = 8000;
pub const MAX_SAMPLE_RATE: u32 = 192_000;
pub const MIN_CHANNEL_COUNT: u16 = 1;
pub const MAX_CHANNEL_COUNT: u16 = 16;
pub const SUPPORTED_BIT_DEPTHS: [u16; 3] = [16, 24, 32];

/// Smallest ring buffer the engine will allocate, in milliseconds of audio.
pub const MIN_RING_BUFFER_MS: u32 = 200;

/// Native sample format codes understood by the hardware stream API.
pub mod format_code {
    pub const PCM_I16: i32 = 1;
    pub const PCM_I24_PACKED: i32 = 3;
    pub const PCM_I32: i32 = 4;
}

/// Defines a symbolic preset enum with its wire names and native codes.
///
/// Names are matched case-insensitively, with or without the platform prefix
/// (`VOICE_RECOGNITION` and `AAUDIO_INPUT_PRESET_VOICE_RECOGNITION` are the same).
macro_rules! symbolic_enum {
    (
        $(#[$meta:meta])*
        $name:ident, field = $field:literal, prefix = $prefix:literal, default = $default:ident,
        { $($variant:ident => ($wire:literal, $code:literal)),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(from = "String", into = "&'static str")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Canonical wire name, e.g. `"LOW_LATENCY"`.
            pub fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $wire),+
                }
            }

            /// Integer code the hardware stream API expects.
            pub fn native_code(self) -> i32 {
                match self {
                    $(Self::$variant => $code),+
                }
            }

            /// Strict lookup by symbolic name.
            pub fn from_name(name: &str) -> Result<Self, ConfigError> {
                let trimmed = name.trim();
                let short = trimmed
                    .get(..$prefix.len())
                    .filter(|head| head.eq_ignore_ascii_case($prefix))
                    .map_or(trimmed, |_| &trimmed[$prefix.len()..]);
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.name().eq_ignore_ascii_case(short))
                    .ok_or_else(|| ConfigError::UnrecognizedEnum {
                        field: $field,
                        value: name.to_string(),
                    })
            }

            /// Lenient lookup: unknown names fall back to the default with a warning.
            pub fn from_name_or_default(name: &str) -> Self {
                Self::from_name(name).unwrap_or_else(|e| {
                    log::warn!("{}; using {}", e, Self::$default.name());
                    Self::$default
                })
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::$default
            }
        }

        impl From<String> for $name {
            fn from(name: String) -> Self {
                Self::from_name_or_default(&name)
            }
        }

        impl From<$name> for &'static str {
            fn from(value: $name) -> Self {
                value.name()
            }
        }
    };
}

symbolic_enum! {
    /// Capture use-case hint. Processing it implies (AGC, noise suppression)
    /// happens on the platform side, never here.
    InputPreset, field = "input preset", prefix = "AAUDIO_INPUT_PRESET_", default = Generic,
    {
        Generic => ("GENERIC", 1),
        Camcorder => ("CAMCORDER", 5),
        VoiceRecognition => ("VOICE_RECOGNITION", 6),
        VoiceCommunication => ("VOICE_COMMUNICATION", 7),
        Unprocessed => ("UNPROCESSED", 9),
        VoicePerformance => ("VOICE_PERFORMANCE", 10),
        SystemEchoReference => ("SYSTEM_ECHO_REFERENCE", 1997),
        SystemHotword => ("SYSTEM_HOTWORD", 1999),
    }
}

symbolic_enum! {
    /// Trades power consumption for scheduling latency.
    PerformanceMode, field = "performance mode", prefix = "AAUDIO_PERFORMANCE_MODE_", default = LowLatency,
    {
        None => ("NONE", 10),
        PowerSaving => ("POWER_SAVING", 11),
        LowLatency => ("LOW_LATENCY", 12),
    }
}

symbolic_enum! {
    /// Whether the device is reserved for this stream or mixed with other clients.
    SharingMode, field = "sharing mode", prefix = "AAUDIO_SHARING_MODE_", default = Shared,
    {
        Exclusive => ("EXCLUSIVE", 0),
        Shared => ("SHARED", 1),
    }
}

/// Native format code for a PCM bit depth, if supported.
pub fn format_code_for_bit_depth(bit_depth: u16) -> Option<i32> {
    match bit_depth {
        16 => Some(format_code::PCM_I16),
        24 => Some(format_code::PCM_I24_PACKED),
        32 => Some(format_code::PCM_I32),
        _ => None,
    }
}

/// A recording request, as decoded from an external descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RecordingConfig {
    pub input_preset: InputPreset,

    /// Valid range: 8000..=192000.
    pub sample_rate_hz: u32,

    /// Valid range: 1..=16.
    pub channel_count: u16,

    /// Valid values: 16, 24, 32.
    #[serde(alias = "format")]
    pub bit_depth: u16,

    pub performance_mode: PerformanceMode,

    pub sharing_mode: SharingMode,

    /// Empty (auto-generate), a directory, or a full `.wav` file path.
    pub output_path: String,
}

impl RecordingConfig {
    /// Hard validation of the numeric fields.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&self.sample_rate_hz) {
            return Err(ConfigError::OutOfRange {
                field: "sample rate",
                value: i64::from(self.sample_rate_hz),
            });
        }
        if !(MIN_CHANNEL_COUNT..=MAX_CHANNEL_COUNT).contains(&self.channel_count) {
            return Err(ConfigError::OutOfRange {
                field: "channel count",
                value: i64::from(self.channel_count),
            });
        }
        if !SUPPORTED_BIT_DEPTHS.contains(&self.bit_depth) {
            return Err(ConfigError::OutOfRange {
                field: "bit depth",
                value: i64::from(self.bit_depth),
            });
        }
        Ok(())
    }

    pub fn pcm_format(&self) -> PcmFormat {
        PcmFormat::new(self.sample_rate_hz, self.channel_count, self.bit_depth)
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            input_preset: InputPreset::Generic,
            sample_rate_hz: 48000,
            channel_count: 1,
            bit_depth: 16,
            performance_mode: PerformanceMode::LowLatency,
            sharing_mode: SharingMode::Shared,
            output_path: String::new(),
        }
    }
}

/// A validated configuration with everything the engine needs to open a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    /// The request this was resolved from.
    pub requested: RecordingConfig,
    pub format: PcmFormat,
    pub input_preset_code: i32,
    pub format_code: i32,
    pub performance_mode_code: i32,
    pub sharing_mode_code: i32,
    pub output_path: PathBuf,
}

/// Engine-wide settings that are not part of a recording request.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOptions {
    /// Directory for auto-named recordings (default: `.`).
    pub default_dir: PathBuf,

    /// Ring buffer depth in milliseconds; clamped to at least [`MIN_RING_BUFFER_MS`].
    pub ring_buffer_ms: u32,

    /// How long the writer sleeps when the ring buffer is empty.
    pub writer_poll_interval: Duration,

    /// Data bytes after which the recording is ended with an error (default: 1 GiB).
    pub max_data_bytes: u64,

    /// Write a `<file>.metadata.json` sidecar after each recording.
    pub write_metadata: bool,
}

impl EngineOptions {
    pub fn ring_buffer_ms(&self) -> u32 {
        self.ring_buffer_ms.max(MIN_RING_BUFFER_MS)
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            default_dir: PathBuf::from("."),
            ring_buffer_ms: 500,
            writer_poll_interval: Duration::from_millis(10),
            max_data_bytes: 1024 * 1024 * 1024,
            write_metadata: false,
        }
    }
}
