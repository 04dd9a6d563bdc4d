// SPDX-License-Identifier: GPL-3.0-only

//! The [`Frame`] value type (§4.1)
//!
//! A `Frame` wraps a `gstreamer::Buffer` — already a reference-counted,
//! copy-on-write handle to the underlying memory — so cloning a `Frame` is
//! the cheap, shared-storage clone the design calls for. Construction is
//! infallible given a valid buffer and caps.

use gstreamer as gst;
use gstreamer::prelude::*;
use std::time::Duration;

/// An immutable, cheaply-clonable video frame.
#[derive(Debug, Clone)]
pub struct Frame {
    buffer: gst::Buffer,
    caps: gst::Caps,
}

impl Frame {
    /// Wraps a buffer and its negotiated caps into a `Frame`.
    ///
    /// PTS/DTS/duration all come from the buffer itself; raw frames carry
    /// `dts == pts` by convention, which callers are expected to have set
    /// when constructing the buffer upstream (e.g. in the record sink's
    /// appsink callback).
    pub fn new(buffer: gst::Buffer, caps: gst::Caps) -> Self {
        Self { buffer, caps }
    }

    /// Presentation timestamp, producer clock. `None` if the source never
    /// stamped the buffer.
    pub fn pts(&self) -> Option<gst::ClockTime> {
        self.buffer.pts()
    }

    /// Decode timestamp. Equal to `pts()` for raw, undecoded frames.
    pub fn dts(&self) -> Option<gst::ClockTime> {
        self.buffer.dts()
    }

    /// Frame duration, falling back to `default_frame_duration` when the
    /// buffer carries none (per §4.2, this is what the ring buffer uses to
    /// keep its cumulative duration meaningful for frames missing metadata).
    pub fn duration_or(&self, default_frame_duration: Duration) -> Duration {
        match self.buffer.duration() {
            Some(d) => Duration::from_nanos(d.nseconds()),
            None => default_frame_duration,
        }
    }

    /// The negotiated caps this frame was produced under.
    pub fn caps(&self) -> &gst::Caps {
        &self.caps
    }

    /// Size of the underlying buffer, in bytes.
    pub fn size_bytes(&self) -> usize {
        self.buffer.size()
    }

    /// Borrows the underlying GStreamer buffer (e.g. to push downstream).
    pub fn buffer(&self) -> &gst::Buffer {
        &self.buffer
    }

    /// Returns a copy of this frame with `pts`/`dts` overwritten and
    /// `duration` set, leaving the underlying memory untouched (the
    /// retimestamp is a cheap, copy-on-write metadata mutation on the
    /// buffer's clone).
    ///
    /// Used by playback branches to produce the monotonically increasing
    /// output PTS required by §4.3; original PTS values are discarded.
    pub fn retimestamped(&self, pts: gst::ClockTime, duration: gst::ClockTime) -> Frame {
        let mut buffer = self.buffer.clone();
        {
            let buf_mut = buffer.make_mut();
            buf_mut.set_pts(Some(pts));
            buf_mut.set_dts(Some(pts));
            buf_mut.set_duration(Some(duration));
        }
        Frame {
            buffer,
            caps: self.caps.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init() {
        let _ = gst::init();
    }

    fn test_frame(pts_ns: u64) -> Frame {
        let mut buffer = gst::Buffer::with_size(16).unwrap();
        {
            let buf_mut = buffer.make_mut();
            buf_mut.set_pts(Some(gst::ClockTime::from_nseconds(pts_ns)));
        }
        let caps = gst::Caps::builder("video/x-raw").field("format", "NV12").build();
        Frame::new(buffer, caps)
    }

    #[test]
    fn test_clone_is_cheap_and_shares_storage() {
        init();
        let frame = test_frame(0);
        let clone = frame.clone();
        assert_eq!(frame.pts(), clone.pts());
        assert_eq!(frame.size_bytes(), clone.size_bytes());
    }

    #[test]
    fn test_duration_or_falls_back_when_missing() {
        init();
        let frame = test_frame(0);
        let fallback = Duration::from_millis(33);
        assert_eq!(frame.duration_or(fallback), fallback);
    }

    #[test]
    fn test_retimestamped_overwrites_pts_and_leaves_caps() {
        init();
        let frame = test_frame(1000);
        let new_pts = gst::ClockTime::from_nseconds(5_000_000);
        let dur = gst::ClockTime::from_nseconds(33_333_333);
        let retimed = frame.retimestamped(new_pts, dur);
        assert_eq!(retimed.pts(), Some(new_pts));
        assert_eq!(retimed.dts(), Some(new_pts));
        assert_eq!(retimed.caps(), frame.caps());
    }
}
