use std::sync::Arc;

use crate::models::audio_models::PcmFormat;
use crate::models::config::ResolvedConfig;
use crate::models::error::StreamError;

/// Callback invoked on the real-time thread with interleaved little-endian PCM.
///
/// Runs at buffer-period granularity. It must not block, allocate, log, or
/// take a lock the control thread can hold.
pub type FrameCallback = Box<dyn FnMut(&[u8]) + Send + 'static>;

/// Callback invoked when the stream fails after it was opened (device
/// unplugged, route change, driver teardown). May fire on any backend thread.
pub type StreamErrorCallback = Arc<dyn Fn(StreamError) + Send + Sync + 'static>;

/// Everything a backend needs to open an input stream. Plain data, so it can
/// cross into whatever thread or FFI layer the backend uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamParams {
    pub input_preset_code: i32,
    pub format_code: i32,
    pub performance_mode_code: i32,
    pub sharing_mode_code: i32,
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_depth: u16,
}

impl StreamParams {
    pub fn from_resolved(resolved: &ResolvedConfig) -> Self {
        Self {
            input_preset_code: resolved.input_preset_code,
            format_code: resolved.format_code,
            performance_mode_code: resolved.performance_mode_code,
            sharing_mode_code: resolved.sharing_mode_code,
            sample_rate: resolved.format.sample_rate,
            channels: resolved.format.channels,
            bit_depth: resolved.format.bit_depth,
        }
    }

    pub fn format(&self) -> PcmFormat {
        PcmFormat::new(self.sample_rate, self.channels, self.bit_depth)
    }
}

/// An opened input stream. Dropping it closes the stream.
pub trait HardwareStream: Send {
    /// Begin delivering frames to the callback.
    fn start(&mut self) -> Result<(), StreamError>;

    /// Stop delivering frames. After this returns the frame callback is not
    /// running and will not run again.
    fn stop(&mut self) -> Result<(), StreamError>;

    /// The format the device actually agreed to.
    fn negotiated_format(&self) -> PcmFormat;
}

/// Interface for platform-specific input stream providers.
///
/// Implemented by:
/// - `MockBackend` (this crate, hardware-free)
/// - `CpalBackend` (`mic-recorder-cpal`)
pub trait StreamBackend: Send + Sync {
    type Stream: HardwareStream;

    /// Open (but do not start) an input stream.
    fn open_stream(
        &self,
        params: StreamParams,
        on_frames: FrameCallback,
        on_error: StreamErrorCallback,
    ) -> Result<Self::Stream, StreamError>;
}
