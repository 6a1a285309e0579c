//! # mic-recorder-cpal
//!
//! Cross-platform hardware backend for mic-recorder, built on `cpal`.
//!
//! Provides:
//! - `CpalBackend`: implements `StreamBackend` for the default host's input devices
//! - `DeviceEnumerator`: input device listing and lookup by name
//!
//! ## Usage
//! ```ignore
//! use mic_recorder_core::{CaptureSession, RecordingConfig};
//! use mic_recorder_cpal::CpalBackend;
//!
//! let session = CaptureSession::new(CpalBackend::default_device());
//! session.try_init()?;
//! session.try_configure(RecordingConfig::default())?;
//! session.try_start()?;
//! ```

pub mod cpal_input;
pub mod device_enumerator;
pub mod sample_convert;

pub use cpal_input::{CpalBackend, CpalStream};
pub use device_enumerator::{DeviceEnumerator, InputDevice};
