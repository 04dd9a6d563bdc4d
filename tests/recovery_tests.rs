// SPDX-License-Identifier: GPL-3.0-only

//! Integration test for the recovery controller's bus watch lifecycle
//! against a real (but minimal) pipeline.

use gstreamer as gst;
use gstreamer::prelude::*;
use palindeck::metrics::EngineMetrics;
use palindeck::recovery::ErrorRecoveryController;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_recovery_controller_survives_a_clean_eos_without_firing_unrecoverable() {
    gst::init().unwrap();

    let pipeline = gst::Pipeline::builder().name("recovery-test").build();
    let src = gst::ElementFactory::make("fakesrc")
        .property("num-buffers", 1i32)
        .build()
        .unwrap();
    let sink = gst::ElementFactory::make("fakesink").build().unwrap();
    pipeline.add_many([&src, &sink]).unwrap();
    src.link(&sink).unwrap();

    let fired = Arc::new(AtomicBool::new(false));
    let fired_clone = fired.clone();
    let _controller = ErrorRecoveryController::install(
        pipeline.clone(),
        gst::ClockTime::from_seconds(2),
        Arc::new(EngineMetrics::new()),
        move |_err| {
            fired_clone.store(true, Ordering::SeqCst);
        },
    );

    pipeline.set_state(gst::State::Playing).unwrap();
    let (_result, _state, _pending) = pipeline.state(gst::ClockTime::from_seconds(2));

    std::thread::sleep(Duration::from_millis(200));
    pipeline.set_state(gst::State::Null).unwrap();

    assert!(!fired.load(Ordering::SeqCst), "a clean run should never invoke the unrecoverable callback");
}
