//! Conversion from cpal's native sample types to packed little-endian PCM.
//!
//! Every input sample is first widened to a full-scale `i32`, then the top
//! 16, 24 or 32 bits are written out. Integer inputs keep their exact value;
//! float input is clamped to `[-1.0, 1.0]`.

/// A cpal sample type the capture callback knows how to pack.
pub trait InputSample: cpal::SizedSample + Send + 'static {
    fn to_full_scale(self) -> i32;
}

impl InputSample for i16 {
    fn to_full_scale(self) -> i32 {
        i32::from(self) << 16
    }
}

impl InputSample for u16 {
    fn to_full_scale(self) -> i32 {
        (i32::from(self) - 32768) << 16
    }
}

impl InputSample for i32 {
    fn to_full_scale(self) -> i32 {
        self
    }
}

impl InputSample for f32 {
    fn to_full_scale(self) -> i32 {
        if self.is_nan() {
            return 0;
        }
        (f64::from(self.clamp(-1.0, 1.0)) * f64::from(i32::MAX)).round() as i32
    }
}

/// Append `input` to `out` as interleaved `bit_depth`-bit little-endian PCM.
///
/// `out` is not cleared; the caller reuses one buffer across callbacks.
pub fn pack_samples<T: InputSample>(input: &[T], bit_depth: u16, out: &mut Vec<u8>) {
    match bit_depth {
        16 => {
            for &s in input {
                out.extend_from_slice(&((s.to_full_scale() >> 16) as i16).to_le_bytes());
            }
        }
        24 => {
            for &s in input {
                out.extend_from_slice(&(s.to_full_scale() >> 8).to_le_bytes()[..3]);
            }
        }
        _ => {
            for &s in input {
                out.extend_from_slice(&s.to_full_scale().to_le_bytes());
            }
        }
    }
}

/// Pack `input` through `scratch` without ever growing it, handing each
/// packed run of whole frames to `emit`. `scratch` must be able to hold at
/// least one frame.
pub fn pack_chunked<T: InputSample>(
    input: &[T],
    bit_depth: u16,
    channels: u16,
    scratch: &mut Vec<u8>,
    mut emit: impl FnMut(&[u8]),
) {
    let channels = usize::from(channels.max(1));
    let frame_bytes = channels * usize::from(bit_depth / 8);
    let frames_per_chunk = (scratch.capacity() / frame_bytes.max(1)).max(1);

    for chunk in input.chunks(frames_per_chunk * channels) {
        scratch.clear();
        pack_samples(chunk, bit_depth, scratch);
        emit(scratch.as_slice());
    }
}
