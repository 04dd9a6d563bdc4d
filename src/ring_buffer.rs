// SPDX-License-Identifier: GPL-3.0-only

//! Per-layer circular frame store (§4.2)
//!
//! A `RingBuffer` holds the most recent `capacity` frames captured for a
//! layer. Writes past capacity drop the oldest stored frame; reads address
//! frames by a logical index (`0` = oldest currently stored) that is stable
//! across overflow, not by physical slot.

use crate::errors::RingBufferError;
use crate::frame::Frame;
use gstreamer as gst;
use std::time::Duration;
use tracing::warn;

/// Outcome of a single `write()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The buffer had spare capacity; no frame was evicted.
    Stored,
    /// The buffer was full; the oldest frame was evicted to make room.
    Overflowed,
    /// The frame's caps did not match the caps fixed at the first write;
    /// the frame was dropped without being stored.
    CapsMismatch,
    /// The buffer is sealed; the frame was dropped without being stored.
    Sealed,
}

/// A fixed-capacity circular store of frames for one layer.
///
/// Not `Clone`: a `RingBuffer` is captured-into and read-from through a
/// single shared owner (`SharedRingBuffer`, an `Arc<Mutex<RingBuffer>>`),
/// matching how the rest of the engine treats per-layer capture state.
#[derive(Debug)]
pub struct RingBuffer {
    slots: Vec<Option<Frame>>,
    capacity: usize,
    /// Physical index the next `write()` will land on.
    write_index: usize,
    /// Number of frames currently stored (saturates at `capacity`).
    count: usize,
    /// Total frames ever accepted (stored or evicted) or rejected for caps
    /// mismatch. `total_written == count + overflow_count +
    /// frames_dropped_due_to_caps` at all times.
    total_written: u64,
    /// Number of writes that evicted an existing frame.
    overflow_count: u64,
    /// Number of writes rejected because their caps did not match the caps
    /// fixed at the first write.
    frames_dropped_due_to_caps: u64,
    /// Caps fixed from the first frame ever written; `None` until then.
    caps: Option<gst::Caps>,
    /// Set once `seal()` has been called; further writes are rejected.
    sealed: bool,
    default_frame_duration: Duration,
}

impl RingBuffer {
    /// Creates an empty ring buffer able to hold `capacity` frames.
    ///
    /// Returns [`RingBufferError::InvalidCapacity`] for `capacity == 0`: a
    /// zero-capacity buffer can never hold a frame to loop, so it is
    /// rejected at construction rather than allowed to silently drop every
    /// write (§8 universal invariants).
    pub fn create(capacity: usize, default_frame_duration: Duration) -> Result<Self, RingBufferError> {
        if capacity == 0 {
            return Err(RingBufferError::InvalidCapacity);
        }
        Ok(Self {
            slots: vec![None; capacity],
            capacity,
            write_index: 0,
            count: 0,
            total_written: 0,
            overflow_count: 0,
            frames_dropped_due_to_caps: 0,
            caps: None,
            sealed: false,
            default_frame_duration,
        })
    }

    /// Appends a frame, evicting the oldest stored frame if already full.
    ///
    /// No-op beyond bookkeeping if called after `seal()`: the capture side
    /// is expected to stop producing once a layer transitions out of
    /// `Capturing`, but a late write racing the transition must not corrupt
    /// the sealed contents a cursor may already be reading.
    ///
    /// The caps descriptor is fixed from the first frame ever written; a
    /// later frame with different caps is rejected and dropped rather than
    /// stored, since a cursor reading the buffer must see one consistent
    /// format throughout.
    pub fn write(&mut self, frame: Frame) -> WriteOutcome {
        if self.sealed {
            warn!("write rejected: ring buffer already sealed");
            return WriteOutcome::Sealed;
        }

        match &self.caps {
            None => self.caps = Some(frame.caps().clone()),
            Some(caps) if caps != frame.caps() => {
                self.frames_dropped_due_to_caps += 1;
                self.total_written += 1;
                warn!(caps = ?frame.caps(), expected = ?caps, "write rejected: caps mismatch");
                return WriteOutcome::CapsMismatch;
            }
            Some(_) => {}
        }

        let outcome = if self.count == self.capacity {
            WriteOutcome::Overflowed
        } else {
            WriteOutcome::Stored
        };
        self.slots[self.write_index] = Some(frame);
        self.write_index = (self.write_index + 1) % self.capacity;
        if self.count < self.capacity {
            self.count += 1;
        } else {
            self.overflow_count += 1;
        }
        self.total_written += 1;
        outcome
    }

    /// Reads the frame at logical index `k` (`0` = oldest stored), or
    /// `None` if `k >= count()`.
    pub fn read(&self, k: usize) -> Option<&Frame> {
        if k >= self.count {
            return None;
        }
        let oldest_physical = if self.count < self.capacity {
            0
        } else {
            self.write_index
        };
        let physical = (oldest_physical + k) % self.capacity;
        self.slots[physical].as_ref()
    }

    /// Marks the buffer closed to further writes. Idempotent.
    ///
    /// Acquiring the mutex that wraps a `RingBuffer` (see
    /// [`crate::recording::SharedRingBuffer`]) after this call establishes
    /// the happens-before relationship a reading `PalindromeCursor` needs
    /// with respect to the frames written before sealing.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Number of frames currently stored (`<= capacity`).
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    pub fn overflow_count(&self) -> u64 {
        self.overflow_count
    }

    /// Number of writes rejected for a caps mismatch against the caps fixed
    /// at the first write.
    pub fn frames_dropped_due_to_caps(&self) -> u64 {
        self.frames_dropped_due_to_caps
    }

    /// Caps fixed from the first frame written, if any frame has been
    /// written yet.
    pub fn caps(&self) -> Option<&gst::Caps> {
        self.caps.as_ref()
    }

    /// Cumulative duration of all currently stored frames.
    pub fn duration(&self) -> Duration {
        let mut total = Duration::ZERO;
        for k in 0..self.count {
            if let Some(frame) = self.read(k) {
                total += frame.duration_or(self.default_frame_duration);
            }
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gstreamer as gst;

    fn init() {
        let _ = gst::init();
    }

    fn frame_with_pts(pts_ns: u64) -> Frame {
        let mut buffer = gst::Buffer::with_size(4).unwrap();
        {
            let buf_mut = buffer.make_mut();
            buf_mut.set_pts(Some(gst::ClockTime::from_nseconds(pts_ns)));
        }
        let caps = gst::Caps::builder("video/x-raw").build();
        Frame::new(buffer, caps)
    }

    #[test]
    fn test_create_rejects_zero_capacity() {
        assert_eq!(
            RingBuffer::create(0, Duration::from_millis(33)).unwrap_err(),
            RingBufferError::InvalidCapacity
        );
    }

    #[test]
    fn test_write_below_capacity_never_overflows() {
        init();
        let mut rb = RingBuffer::create(4, Duration::from_millis(33)).unwrap();
        for i in 0..3 {
            assert_eq!(rb.write(frame_with_pts(i)), WriteOutcome::Stored);
        }
        assert_eq!(rb.count(), 3);
        assert_eq!(rb.overflow_count(), 0);
    }

    #[test]
    fn test_write_past_capacity_evicts_oldest() {
        init();
        let mut rb = RingBuffer::create(3, Duration::from_millis(33)).unwrap();
        rb.write(frame_with_pts(0));
        rb.write(frame_with_pts(1));
        rb.write(frame_with_pts(2));
        assert_eq!(rb.read(0).unwrap().pts(), Some(gst::ClockTime::from_nseconds(0)));

        let outcome = rb.write(frame_with_pts(3));
        assert_eq!(outcome, WriteOutcome::Overflowed);
        assert_eq!(rb.count(), 3);
        assert_eq!(rb.overflow_count(), 1);
        // Oldest (pts=0) was evicted; logical index 0 is now pts=1.
        assert_eq!(rb.read(0).unwrap().pts(), Some(gst::ClockTime::from_nseconds(1)));
        assert_eq!(rb.read(2).unwrap().pts(), Some(gst::ClockTime::from_nseconds(3)));
    }

    #[test]
    fn test_logical_index_out_of_range_returns_none() {
        init();
        let mut rb = RingBuffer::create(4, Duration::from_millis(33)).unwrap();
        rb.write(frame_with_pts(0));
        assert!(rb.read(1).is_none());
    }

    #[test]
    fn test_write_after_seal_does_not_grow_count() {
        init();
        let mut rb = RingBuffer::create(4, Duration::from_millis(33)).unwrap();
        rb.write(frame_with_pts(0));
        rb.seal();
        let outcome = rb.write(frame_with_pts(1));
        assert_eq!(outcome, WriteOutcome::Sealed);
        assert_eq!(rb.count(), 1);
        assert_eq!(rb.read(0).unwrap().pts(), Some(gst::ClockTime::from_nseconds(0)));
    }

    #[test]
    fn test_mismatched_caps_are_rejected_and_counted() {
        init();
        let mut rb = RingBuffer::create(4, Duration::from_millis(33)).unwrap();
        rb.write(frame_with_pts(0));
        assert_eq!(rb.caps().unwrap().structure(0).unwrap().name(), "video/x-raw");

        let mut buffer = gst::Buffer::with_size(4).unwrap();
        buffer.make_mut().set_pts(Some(gst::ClockTime::from_nseconds(1)));
        let other_caps = gst::Caps::builder("video/x-h264").build();
        let mismatched = Frame::new(buffer, other_caps);

        let outcome = rb.write(mismatched);
        assert_eq!(outcome, WriteOutcome::CapsMismatch);
        assert_eq!(rb.count(), 1);
        assert_eq!(rb.frames_dropped_due_to_caps(), 1);
        assert_eq!(rb.total_written(), 2);
        assert_eq!(rb.total_written(), rb.count() as u64 + rb.overflow_count() + rb.frames_dropped_due_to_caps());
    }

    #[test]
    fn test_duration_sums_stored_frames() {
        init();
        let mut rb = RingBuffer::create(4, Duration::from_millis(33)).unwrap();
        rb.write(frame_with_pts(0));
        rb.write(frame_with_pts(1));
        assert_eq!(rb.duration(), Duration::from_millis(66));
    }
}
