use serde::{Deserialize, Serialize};

/// Linear PCM layout: little-endian samples, interleaved channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_depth: u16,
}

impl PcmFormat {
    pub fn new(sample_rate: u32, channels: u16, bit_depth: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bit_depth,
        }
    }

    pub fn bytes_per_sample(&self) -> usize {
        usize::from(self.bit_depth / 8)
    }

    /// One sample per channel.
    pub fn frame_bytes(&self) -> usize {
        self.bytes_per_sample() * usize::from(self.channels)
    }

    pub fn byte_rate(&self) -> u64 {
        u64::from(self.sample_rate) * self.frame_bytes() as u64
    }

    /// Bytes holding `millis` of audio, rounded up to whole frames.
    pub fn bytes_for_millis(&self, millis: u32) -> usize {
        let frames = (u64::from(self.sample_rate) * u64::from(millis)).div_ceil(1000);
        frames as usize * self.frame_bytes()
    }

    pub fn duration_secs(&self, data_bytes: u64) -> f64 {
        let rate = self.byte_rate();
        if rate == 0 {
            return 0.0;
        }
        data_bytes as f64 / rate as f64
    }
}

/// Counters for debugging a capture session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionDiagnostics {
    /// Real-time callback invocations.
    pub callback_count: u64,
    /// Bytes the hardware delivered to the callback.
    pub bytes_captured: u64,
    /// Bytes the writer appended to the sink.
    pub bytes_written: u64,
    /// Frames dropped because the ring buffer was full.
    pub dropped_frames: u64,
}
