//! Lock-free single-producer/single-consumer byte ring for captured frames.
//!
//! The producer half lives in the real-time stream callback, the consumer half
//! in the writer thread. Both sides only touch the atomic cursors inside
//! `ringbuf::HeapRb`; there is no mutex anywhere on this path.
//!
//! Overflow behavior: new frames that do not fit are dropped and counted.
//! The buffer never grows and the producer never waits.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use crate::models::audio_models::PcmFormat;

/// Overflow counters shared by both halves and the session.
#[derive(Debug, Default)]
pub struct RingStats {
    dropped_frames: AtomicU64,
}

impl RingStats {
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }
}

/// Creates a ring holding `capacity_bytes` (rounded up to whole frames, at
/// least one frame) of `frame_bytes`-sized frames.
pub fn frame_ring(capacity_bytes: usize, frame_bytes: usize) -> (FrameProducer, FrameConsumer) {
    let frame_bytes = frame_bytes.max(1);
    let capacity = capacity_bytes.div_ceil(frame_bytes).max(1) * frame_bytes;
    let (producer, consumer) = HeapRb::<u8>::new(capacity).split();
    let stats = Arc::new(RingStats::default());

    (
        FrameProducer {
            inner: producer,
            frame_bytes,
            stats: Arc::clone(&stats),
        },
        FrameConsumer {
            inner: consumer,
            frame_bytes,
            capacity,
            stats,
        },
    )
}

/// Creates a ring deep enough for `millis` of audio in `format`.
pub fn frame_ring_for(format: &PcmFormat, millis: u32) -> (FrameProducer, FrameConsumer) {
    frame_ring(format.bytes_for_millis(millis), format.frame_bytes())
}

/// Real-time half. Never blocks, never allocates.
pub struct FrameProducer {
    inner: HeapProd<u8>,
    frame_bytes: usize,
    stats: Arc<RingStats>,
}

impl FrameProducer {
    /// Queue as many whole frames of `bytes` as fit; returns the bytes accepted.
    ///
    /// Frames that do not fit are dropped and added to the drop counter. A
    /// trailing partial frame is discarded.
    pub fn write(&mut self, bytes: &[u8]) -> usize {
        let whole = bytes.len() - bytes.len() % self.frame_bytes;
        let room = self.inner.vacant_len() - self.inner.vacant_len() % self.frame_bytes;
        let accepted = whole.min(room);

        if accepted > 0 {
            let pushed = self.inner.push_slice(&bytes[..accepted]);
            debug_assert_eq!(pushed, accepted);
        }

        let dropped = (whole - accepted) / self.frame_bytes;
        if dropped > 0 {
            self.stats
                .dropped_frames
                .fetch_add(dropped as u64, Ordering::Relaxed);
        }
        accepted
    }

    pub fn frame_bytes(&self) -> usize {
        self.frame_bytes
    }

    pub fn stats(&self) -> Arc<RingStats> {
        Arc::clone(&self.stats)
    }
}

/// Writer-thread half.
pub struct FrameConsumer {
    inner: HeapCons<u8>,
    frame_bytes: usize,
    capacity: usize,
    stats: Arc<RingStats>,
}

impl FrameConsumer {
    /// Read whole frames into `buf`; returns the bytes copied.
    pub fn read_into(&mut self, buf: &mut [u8]) -> usize {
        let want = buf.len() - buf.len() % self.frame_bytes;
        let have = self.available();
        let n = want.min(have);
        if n == 0 {
            return 0;
        }
        self.inner.pop_slice(&mut buf[..n])
    }

    /// Read and remove up to `max_bytes` (whole frames only).
    pub fn read(&mut self, max_bytes: usize) -> Vec<u8> {
        let mut out = vec![0u8; max_bytes.min(self.available())];
        let n = self.read_into(&mut out);
        out.truncate(n);
        out
    }

    /// Whole-frame bytes ready to read.
    pub fn available(&self) -> usize {
        let occupied = self.inner.occupied_len();
        occupied - occupied % self.frame_bytes
    }

    pub fn is_empty(&self) -> bool {
        self.available() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn frame_bytes(&self) -> usize {
        self.frame_bytes
    }

    pub fn dropped_frames(&self) -> u64 {
        self.stats.dropped_frames()
    }

    pub fn stats(&self) -> Arc<RingStats> {
        Arc::clone(&self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn basic_write_read() {
        let (mut tx, mut rx) = frame_ring(16, 2);
        assert_eq!(tx.write(&[1, 2, 3, 4, 5, 6]), 6);

        assert_eq!(rx.available(), 6);
        assert_eq!(rx.read(6), vec![1, 2, 3, 4, 5, 6]);
        assert!(rx.is_empty());
    }

    #[test]
    fn reads_whole_frames_only() {
        let (mut tx, mut rx) = frame_ring(16, 4);
        tx.write(&[1, 2, 3, 4, 5, 6, 7, 8]);

        // 6 bytes requested -> one 4-byte frame
        assert_eq!(rx.read(6), vec![1, 2, 3, 4]);
        assert_eq!(rx.available(), 4);
    }

    #[test]
    fn capacity_rounds_up_to_frames() {
        let (_tx, rx) = frame_ring(10, 4);
        assert_eq!(rx.capacity(), 12);

        let (_tx, rx) = frame_ring(0, 6);
        assert_eq!(rx.capacity(), 6);
    }

    #[test]
    fn overflow_drops_newest_frames() {
        let (mut tx, mut rx) = frame_ring(8, 2);
        assert_eq!(tx.write(&[1, 1, 2, 2, 3, 3]), 6);
        // Room for one more frame; two frames are dropped.
        assert_eq!(tx.write(&[4, 4, 5, 5, 6, 6]), 2);

        assert_eq!(rx.dropped_frames(), 2);
        assert_eq!(rx.read(8), vec![1, 1, 2, 2, 3, 3, 4, 4]);
    }

    #[test]
    fn partial_trailing_frame_is_discarded() {
        let (mut tx, mut rx) = frame_ring(8, 2);
        assert_eq!(tx.write(&[1, 2, 3]), 2);
        assert_eq!(rx.read(8), vec![1, 2]);
        assert_eq!(rx.dropped_frames(), 0);
    }

    #[test]
    fn wraparound_preserves_order() {
        let (mut tx, mut rx) = frame_ring(6, 2);
        tx.write(&[1, 1, 2, 2]);
        assert_eq!(rx.read(2), vec![1, 1]);

        tx.write(&[3, 3, 4, 4]); // wraps
        assert_eq!(rx.available(), 6);
        assert_eq!(rx.read(6), vec![2, 2, 3, 3, 4, 4]);
    }

    #[test]
    fn for_format_sizes_by_duration() {
        let format = PcmFormat::new(48000, 2, 16);
        let (_tx, rx) = frame_ring_for(&format, 200);
        assert_eq!(rx.capacity(), 48 * 200 * 4);
        assert_eq!(rx.frame_bytes(), 4);
    }

    #[test]
    fn empty_operations() {
        let (mut tx, mut rx) = frame_ring(8, 2);
        assert_eq!(tx.write(&[]), 0);
        assert!(rx.read(8).is_empty());
        assert_eq!(rx.read_into(&mut [0u8; 1]), 0);
    }

    /// A producer much faster than the consumer: frames get dropped but the
    /// ones that arrive are intact, in order, and the accounting adds up.
    #[test]
    fn concurrent_overflow_keeps_cursors_consistent() {
        const FRAME: usize = 4;
        const FRAMES: u32 = 50_048;
        const CHUNK: u32 = 64;

        let (mut tx, mut rx) = frame_ring(1024, FRAME);
        let capacity = rx.capacity();

        let producer = thread::spawn(move || {
            let mut chunk = [0u8; CHUNK as usize * FRAME];
            let mut accepted = 0u64;
            let mut next = 0u32;
            while next < FRAMES {
                for (i, frame) in chunk.chunks_exact_mut(FRAME).enumerate() {
                    frame.copy_from_slice(&(next + i as u32).to_le_bytes());
                }
                accepted += tx.write(&chunk) as u64;
                next += CHUNK;
            }
            accepted
        });

        let mut received = 0u64;
        let mut last: Option<u32> = None;
        let mut buf = [0u8; 96];
        let mut drain = |rx: &mut FrameConsumer| -> usize {
            let available = rx.available();
            assert!(available <= capacity);
            assert_eq!(available % FRAME, 0);

            let n = rx.read_into(&mut buf);
            assert_eq!(n % FRAME, 0);
            for frame in buf[..n].chunks_exact(FRAME) {
                let value = u32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]);
                if let Some(prev) = last {
                    assert!(value > prev, "frame {value} after {prev}");
                }
                assert!(value < FRAMES);
                last = Some(value);
                received += 1;
            }
            n
        };

        while !producer.is_finished() {
            drain(&mut rx);
            thread::sleep(Duration::from_micros(20));
        }
        let accepted_bytes = producer.join().unwrap();
        while drain(&mut rx) > 0 {}
        drop(drain);

        assert_eq!(received * FRAME as u64, accepted_bytes);
        assert_eq!(received + rx.dropped_frames(), u64::from(FRAMES));
        assert!(rx.dropped_frames() > 0);
    }
}
