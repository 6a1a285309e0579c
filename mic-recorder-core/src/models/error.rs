use thiserror::Error;

use super::state::EngineState;

/// Rejections produced while resolving a [`RecordingConfig`](super::config::RecordingConfig).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: i64 },

    /// Only produced by strict parsing; the lenient path logs and defaults instead.
    #[error("unrecognized {field}: {value:?}")]
    UnrecognizedEnum { field: &'static str, value: String },
}

/// Failures of the WAV file sink.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("failed to open recording file: {0}")]
    OpenFailed(String),

    #[error("failed to write recording file: {0}")]
    WriteFailed(String),

    #[error("recording file is not open")]
    NotOpen,
}

/// Failures reported by a hardware stream backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("failed to open input stream: {0}")]
    OpenFailed(String),

    #[error("failed to start input stream: {0}")]
    StartFailed(String),

    #[error("failed to stop input stream: {0}")]
    StopFailed(String),

    #[error("input stream disconnected: {0}")]
    Disconnected(String),

    #[error("stream negotiated {actual_channels}ch/{actual_bits}bit, requested {requested_channels}ch/{requested_bits}bit")]
    FormatMismatch {
        requested_channels: u16,
        requested_bits: u16,
        actual_channels: u16,
        actual_bits: u16,
    },
}

/// Errors surfaced by the capture engine's command surface.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: EngineState,
    },

    #[error("failed to spawn {0} thread")]
    ThreadSpawn(&'static str),
}
