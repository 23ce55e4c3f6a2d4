//! Fixed-capacity byte ring between producers and the render loop.

use ringbuf::traits::{Consumer, Observer, Producer};
use ringbuf::HeapRb;

use crate::{OverflowPolicy, RenderError};

/// Result of a successful [`RenderBuffer::write()`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteOutcome {
    /// Bytes of the write that were buffered.
    pub written: usize,
    /// Previously buffered bytes discarded to make room.
    pub dropped: usize,
}

/// FIFO byte buffer holding PCM audio waiting to be rendered.
///
/// The buffer is not synchronized itself; the engine guards it with a single
/// mutex that producers and the render thread take only for the copy.
/// Trimming under [`OverflowPolicy::Truncate`] and [`OverflowPolicy::DropOldest`]
/// cuts at frame boundaries of the producer's byte stream, so a partial frame
/// left by an earlier write is completed before anything is cut.
///
/// # Example
///
/// ```
/// use stream_render::{OverflowPolicy, RenderBuffer};
///
/// let mut buffer = RenderBuffer::new(16, 4, OverflowPolicy::Reject);
/// buffer.write(&[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
///
/// let mut out = [0u8; 4];
/// buffer.read(&mut out);
/// assert_eq!(out, [1, 2, 3, 4]);
/// assert_eq!(buffer.available_read(), 4);
/// ```
pub struct RenderBuffer {
    ring: HeapRb<u8>,
    frame_size: usize,
    policy: OverflowPolicy,
    /// Offset of the write position within the current frame.
    phase: usize,
}

impl RenderBuffer {
    /// Creates an empty buffer holding up to `capacity` bytes.
    ///
    /// `frame_size` is the alignment used when a write has to be trimmed.
    pub fn new(capacity: usize, frame_size: usize, policy: OverflowPolicy) -> Self {
        let frame_size = frame_size.max(1);
        Self {
            ring: HeapRb::new(capacity.max(frame_size)),
            frame_size,
            policy,
            phase: 0,
        }
    }

    /// Total capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.ring.capacity().get()
    }

    /// Bytes currently buffered.
    pub fn available_read(&self) -> usize {
        self.ring.occupied_len()
    }

    /// Bytes that can be written without overflowing.
    pub fn available_write(&self) -> usize {
        self.ring.vacant_len()
    }

    /// Returns the configured overflow policy.
    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Appends `data`, applying the overflow policy if it does not fit.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::BufferOverflow`] under [`OverflowPolicy::Reject`]
    /// when `data` is larger than the free space. Nothing is written in that case.
    pub fn write(&mut self, data: &[u8]) -> Result<WriteOutcome, RenderError> {
        let available = self.available_write();
        if data.len() <= available {
            let written = self.ring.push_slice(data);
            self.advance_phase(written);
            return Ok(WriteOutcome {
                written,
                dropped: 0,
            });
        }

        match self.policy {
            OverflowPolicy::Reject => Err(RenderError::BufferOverflow {
                requested: data.len(),
                available,
            }),
            OverflowPolicy::Truncate => {
                // Stop at the last frame boundary that fits.
                let fits = self
                    .align_down(self.phase + available)
                    .saturating_sub(self.phase);
                let written = self.ring.push_slice(&data[..fits]);
                self.advance_phase(written);
                Ok(WriteOutcome {
                    written,
                    dropped: 0,
                })
            }
            OverflowPolicy::DropOldest => {
                // Keep the newest bytes that start on a frame boundary and fit.
                let end_phase = (self.phase + data.len()) % self.frame_size;
                let retain = self.align_down(self.capacity() - end_phase) + end_phase;
                let keep = data.len().min(retain);
                let data = &data[data.len() - keep..];

                let skip = self.available_read() - (retain - keep);
                let dropped = self.ring.skip(skip);
                let written = self.ring.push_slice(data);
                self.phase = end_phase;
                Ok(WriteOutcome { written, dropped })
            }
        }
    }

    /// Copies `dest.len()` bytes out in FIFO order and advances the read position.
    ///
    /// Callers must not ask for more than [`available_read()`](Self::available_read);
    /// the number of bytes actually copied is returned.
    pub fn read(&mut self, dest: &mut [u8]) -> usize {
        debug_assert!(dest.len() <= self.available_read());
        self.ring.pop_slice(dest)
    }

    /// Discards all buffered audio.
    pub fn reset(&mut self) {
        self.ring.clear();
        self.phase = 0;
    }

    fn align_down(&self, bytes: usize) -> usize {
        bytes - bytes % self.frame_size
    }

    fn advance_phase(&mut self, written: usize) {
        self.phase = (self.phase + written) % self.frame_size;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(range: std::ops::Range<u8>) -> Vec<u8> {
        range.collect()
    }

    #[test]
    fn test_write_then_read_fifo() {
        let mut buffer = RenderBuffer::new(16, 4, OverflowPolicy::Reject);
        buffer.write(&bytes(0..6)).unwrap();
        buffer.write(&bytes(6..10)).unwrap();

        let mut out = vec![0u8; 10];
        assert_eq!(buffer.read(&mut out), 10);
        assert_eq!(out, bytes(0..10));
        assert_eq!(buffer.available_read(), 0);
    }

    #[test]
    fn test_wrap_around() {
        let mut buffer = RenderBuffer::new(8, 1, OverflowPolicy::Reject);
        buffer.write(&bytes(0..6)).unwrap();
        let mut out = vec![0u8; 5];
        buffer.read(&mut out);

        // Write position wraps past the end of storage
        buffer.write(&bytes(10..16)).unwrap();
        assert_eq!(buffer.available_read(), 7);

        let mut out = vec![0u8; 7];
        buffer.read(&mut out);
        assert_eq!(out, vec![5, 10, 11, 12, 13, 14, 15]);
    }

    #[test]
    fn test_reject_policy_writes_nothing() {
        let mut buffer = RenderBuffer::new(8, 4, OverflowPolicy::Reject);
        buffer.write(&bytes(0..4)).unwrap();

        let result = buffer.write(&bytes(0..8));
        assert!(matches!(
            result,
            Err(RenderError::BufferOverflow {
                requested: 8,
                available: 4
            })
        ));
        assert_eq!(buffer.available_read(), 4);
    }

    #[test]
    fn test_truncate_policy_keeps_whole_frames() {
        let mut buffer = RenderBuffer::new(10, 4, OverflowPolicy::Truncate);
        let outcome = buffer.write(&bytes(0..12)).unwrap();
        // 10 bytes free, but only two whole 4-byte frames fit
        assert_eq!(outcome.written, 8);
        assert_eq!(outcome.dropped, 0);
        assert_eq!(buffer.available_read(), 8);
    }

    #[test]
    fn test_drop_oldest_policy() {
        let mut buffer = RenderBuffer::new(8, 4, OverflowPolicy::DropOldest);
        buffer.write(&bytes(0..8)).unwrap();

        let outcome = buffer.write(&bytes(8..12)).unwrap();
        assert_eq!(outcome.written, 4);
        assert_eq!(outcome.dropped, 4);

        let mut out = vec![0u8; 8];
        buffer.read(&mut out);
        assert_eq!(out, bytes(4..12));
    }

    #[test]
    fn test_drop_oldest_larger_than_capacity() {
        let mut buffer = RenderBuffer::new(8, 4, OverflowPolicy::DropOldest);
        buffer.write(&bytes(0..4)).unwrap();

        let outcome = buffer.write(&bytes(10..22)).unwrap();
        assert_eq!(outcome.written, 8);
        assert_eq!(outcome.dropped, 4);

        let mut out = vec![0u8; 8];
        buffer.read(&mut out);
        assert_eq!(out, bytes(14..22));
    }

    #[test]
    fn test_truncate_completes_partial_frame() {
        let mut buffer = RenderBuffer::new(8, 4, OverflowPolicy::Truncate);
        buffer.write(&[1, 2, 3]).unwrap();

        let outcome = buffer.write(&[4, 5, 6, 7, 8, 9, 10, 11]).unwrap();
        // Finishes the open frame and one more, nothing past a boundary
        assert_eq!(outcome.written, 5);
        assert_eq!(buffer.available_read(), 8);

        let mut out = vec![0u8; 8];
        buffer.read(&mut out);
        assert_eq!(out, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_truncate_fills_open_frame_exactly() {
        let mut buffer = RenderBuffer::new(8, 4, OverflowPolicy::Truncate);
        buffer.write(&[1, 2, 3, 4, 5]).unwrap();

        // The three free bytes close the open frame
        let outcome = buffer.write(&[6, 7, 8, 9, 10, 11, 12]).unwrap();
        assert_eq!(outcome.written, 3);
        assert_eq!(buffer.available_read(), 8);

        let outcome = buffer.write(&[13, 14]).unwrap();
        assert_eq!(outcome.written, 0);
        assert_eq!(buffer.available_read(), 8);
    }

    #[test]
    fn test_drop_oldest_keeps_frame_boundaries_after_partial_write() {
        let mut buffer = RenderBuffer::new(8, 4, OverflowPolicy::DropOldest);
        buffer.write(&[1, 2, 3]).unwrap();

        let outcome = buffer.write(&[4, 5, 6, 7, 8, 9, 10, 11, 12]).unwrap();
        assert_eq!(outcome.dropped, 3);
        assert_eq!(outcome.written, 8);

        let mut out = vec![0u8; 8];
        buffer.read(&mut out);
        assert_eq!(out, vec![5, 6, 7, 8, 9, 10, 11, 12]);
    }

    #[test]
    fn test_drop_oldest_leaves_open_frame_at_the_end() {
        let mut buffer = RenderBuffer::new(8, 4, OverflowPolicy::DropOldest);
        buffer.write(&[1, 2, 3, 4, 5, 6, 7]).unwrap();

        let outcome = buffer.write(&[8, 9, 10, 11, 12, 13]).unwrap();
        assert_eq!(outcome.dropped, 7);
        assert_eq!(buffer.available_read(), 5);

        let mut out = vec![0u8; 5];
        buffer.read(&mut out);
        // One whole frame, then the first byte of the next
        assert_eq!(out, vec![9, 10, 11, 12, 13]);
    }

    #[test]
    fn test_reset_empties_buffer() {
        let mut buffer = RenderBuffer::new(32, 4, OverflowPolicy::Reject);
        buffer.write(&bytes(0..20)).unwrap();
        buffer.reset();
        assert_eq!(buffer.available_read(), 0);
        assert_eq!(buffer.available_write(), 32);
    }

    #[test]
    fn test_available_never_exceeds_capacity() {
        let mut buffer = RenderBuffer::new(12, 4, OverflowPolicy::DropOldest);
        for _ in 0..10 {
            buffer.write(&bytes(0..8)).unwrap();
            assert!(buffer.available_read() <= buffer.capacity());
        }
    }

    #[test]
    fn test_zero_capacity_is_clamped_to_one_frame() {
        let buffer = RenderBuffer::new(0, 4, OverflowPolicy::Reject);
        assert_eq!(buffer.capacity(), 4);
    }
}
