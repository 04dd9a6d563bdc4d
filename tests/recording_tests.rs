// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the recording state machine against a fake graph,
//! covering the seed scenarios a layer's capture lifecycle must satisfy.

use gstreamer as gst;
use palindeck::errors::EngineResult;
use palindeck::frame::Frame;
use palindeck::media_graph::GraphOps;
use palindeck::recording::{RecordingStateMachine, SharedRingBuffer};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn synthetic_frame() -> Frame {
    let _ = gst::init();
    let buffer = gst::Buffer::with_size(4).unwrap();
    let caps = gst::Caps::builder("video/x-raw").build();
    Frame::new(buffer, caps)
}

/// A fake media graph whose attached record branches, like a real capture
/// branch, write one synthetic frame into the ring immediately (simulating
/// at least one frame arriving from the camera during the hold) unless
/// `simulate_capture` is false.
struct FakeGraph {
    record_attached: Mutex<Vec<u8>>,
    playback_attached: Mutex<Vec<u8>>,
    simulate_capture: bool,
}

impl FakeGraph {
    fn new() -> Self {
        Self {
            record_attached: Mutex::new(Vec::new()),
            playback_attached: Mutex::new(Vec::new()),
            simulate_capture: true,
        }
    }

    fn new_no_capture() -> Self {
        Self {
            simulate_capture: false,
            ..Self::new()
        }
    }
}

impl GraphOps for FakeGraph {
    fn attach_record_branch(&self, layer: u8, ring: SharedRingBuffer) -> EngineResult<()> {
        self.record_attached.lock().unwrap().push(layer);
        if self.simulate_capture {
            ring.lock().unwrap().write(synthetic_frame());
        }
        Ok(())
    }

    fn detach_record_branch(&self, layer: u8) -> EngineResult<()> {
        self.record_attached.lock().unwrap().retain(|&l| l != layer);
        Ok(())
    }

    fn attach_or_replace_playback_branch(&self, layer: u8, _ring: SharedRingBuffer) -> EngineResult<()> {
        self.playback_attached.lock().unwrap().push(layer);
        Ok(())
    }
}

fn machine(min_hold: Duration) -> (Arc<RecordingStateMachine>, Arc<FakeGraph>) {
    let graph = Arc::new(FakeGraph::new());
    let sm = Arc::new(RecordingStateMachine::new(
        graph.clone() as Arc<dyn GraphOps>,
        50,
        120,
        Duration::from_millis(33),
        min_hold,
    ));
    (sm, graph)
}

fn machine_no_capture(min_hold: Duration) -> (Arc<RecordingStateMachine>, Arc<FakeGraph>) {
    let graph = Arc::new(FakeGraph::new_no_capture());
    let sm = Arc::new(RecordingStateMachine::new(
        graph.clone() as Arc<dyn GraphOps>,
        50,
        120,
        Duration::from_millis(33),
        min_hold,
    ));
    (sm, graph)
}

#[test]
fn test_tap_on_layer_zero_attaches_record_then_playback() {
    let (sm, graph) = machine(Duration::ZERO);
    sm.on_key_down(0).unwrap();
    assert_eq!(*graph.record_attached.lock().unwrap(), vec![0]);

    sm.on_key_up(0).unwrap();
    assert!(graph.record_attached.lock().unwrap().is_empty());
    assert_eq!(*graph.playback_attached.lock().unwrap(), vec![0]);
}

#[test]
fn test_replacing_the_loop_on_the_same_layer_reattaches_playback() {
    let (sm, graph) = machine(Duration::ZERO);
    sm.on_key_down(3).unwrap();
    sm.on_key_up(3).unwrap();
    sm.on_key_down(3).unwrap();
    sm.on_key_up(3).unwrap();

    assert_eq!(*graph.playback_attached.lock().unwrap(), vec![3, 3]);
}

#[test]
fn test_modifier_layer_fan_out_is_independent_per_layer() {
    let (sm, graph) = machine(Duration::ZERO);
    for offset in [0u8, 10, 20, 30, 40] {
        let layer = offset + 2; // same physical key, five modifier tiers
        sm.on_key_down(layer).unwrap();
        assert!(sm.is_capturing(layer));
    }
    for offset in [0u8, 10, 20, 30, 40] {
        sm.on_key_up(offset + 2).unwrap();
    }
    let mut attached = graph.playback_attached.lock().unwrap().clone();
    attached.sort_unstable();
    assert_eq!(attached, vec![2, 12, 22, 32, 42]);
}

#[test]
fn test_sub_floor_hold_finalizes_synchronously_with_floored_duration() {
    let (sm, graph) = machine(Duration::from_millis(80));
    sm.on_key_down(5).unwrap();
    sm.on_key_up(5).unwrap();
    // Finalize completes inline within on_key_up; the floor only changes
    // the *reported* duration, not whether/when sealing happens.
    assert!(!sm.is_capturing(5));
    assert_eq!(sm.last_duration(5), Some(Duration::from_millis(80)));
    assert_eq!(*graph.playback_attached.lock().unwrap(), vec![5]);
}

#[test]
fn test_sub_frame_hold_with_nothing_captured_seals_empty_and_skips_playback() {
    let (sm, graph) = machine_no_capture(Duration::ZERO);
    sm.on_key_down(6).unwrap();
    sm.on_key_up(6).unwrap();
    assert!(!sm.is_capturing(6));
    assert!(sm.last_duration(6).is_some());
    assert!(graph.playback_attached.lock().unwrap().is_empty());
}

#[test]
fn test_key_up_without_matching_key_down_is_a_no_op() {
    let (sm, graph) = machine(Duration::ZERO);
    sm.on_key_up(7).unwrap();
    assert!(graph.record_attached.lock().unwrap().is_empty());
    assert!(graph.playback_attached.lock().unwrap().is_empty());
}
