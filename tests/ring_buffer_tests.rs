// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for ring buffer + palindrome cursor interaction,
//! covering a long hold that overflows capacity and the resulting loop.

use gstreamer as gst;
use palindeck::frame::Frame;
use palindeck::palindrome::PalindromeCursor;
use palindeck::ring_buffer::RingBuffer;
use std::time::Duration;

fn frame_with_pts(pts_ns: u64) -> Frame {
    let _ = gst::init();
    let mut buffer = gst::Buffer::with_size(4).unwrap();
    {
        let buf_mut = buffer.make_mut();
        buf_mut.set_pts(Some(gst::ClockTime::from_nseconds(pts_ns)));
    }
    Frame::new(buffer, gst::Caps::builder("video/x-raw").build())
}

#[test]
fn test_long_hold_past_capacity_loops_over_only_the_retained_window() {
    let mut rb = RingBuffer::create(5, Duration::from_millis(33)).unwrap();
    // Hold for 12 frames against a 5-frame capacity: only the last 5 survive.
    for i in 0..12u64 {
        rb.write(frame_with_pts(i * 1000));
    }
    assert_eq!(rb.count(), 5);
    assert_eq!(rb.overflow_count(), 7);
    // Oldest retained is frame 7 (0-indexed), newest is frame 11.
    assert_eq!(rb.read(0).unwrap().pts(), Some(gst::ClockTime::from_nseconds(7000)));
    assert_eq!(rb.read(4).unwrap().pts(), Some(gst::ClockTime::from_nseconds(11000)));

    rb.seal();
    let mut cursor = PalindromeCursor::create(rb.count());
    let mut visited = Vec::new();
    for _ in 0..10 {
        let idx = cursor.peek().unwrap();
        visited.push(rb.read(idx).unwrap().pts().unwrap().nseconds());
        cursor.advance();
    }
    assert_eq!(visited, vec![7000, 8000, 9000, 10000, 11000, 10000, 9000, 8000, 7000, 8000]);
    for pair in visited.windows(2) {
        assert_ne!(pair[0], pair[1], "consecutive emitted frames must differ");
    }
}

#[test]
fn test_sub_frame_hold_produces_a_single_frame_loop() {
    let mut rb = RingBuffer::create(60, Duration::from_millis(33)).unwrap();
    rb.write(frame_with_pts(0));
    rb.seal();

    let mut cursor = PalindromeCursor::create(rb.count());
    assert_eq!(rb.count(), 1);
    for _ in 0..4 {
        assert_eq!(cursor.peek(), Some(0));
        cursor.advance();
    }
}

#[test]
fn test_writes_after_seal_do_not_disturb_a_cursor_mid_traversal() {
    let mut rb = RingBuffer::create(4, Duration::from_millis(33)).unwrap();
    rb.write(frame_with_pts(0));
    rb.write(frame_with_pts(1000));
    rb.seal();

    let mut cursor = PalindromeCursor::create(rb.count());
    let first = rb.read(cursor.peek().unwrap()).unwrap().pts();
    rb.write(frame_with_pts(9999)); // rejected, buffer already sealed
    cursor.advance();
    assert_eq!(first, Some(gst::ClockTime::from_nseconds(0)));
    assert_eq!(rb.count(), 2);
}
