// SPDX-License-Identifier: GPL-3.0-only

//! Appsink-backed record branches.
//!
//! Each layer's record branch is `tee.` -> queue -> appsink, with the
//! appsink's `new-sample` callback appending every pulled sample to the
//! layer's `SharedRingBuffer`. Mirrors the teacher's `pipewire/pipeline.rs`
//! appsink callback: pull the sample, map the buffer, log every Nth frame
//! rather than every frame.
//!
//! Detaching follows §4.5's block -> drain -> unlink -> release protocol:
//! a blocking probe on the branch's tee pad stops new buffers from
//! entering the branch, an EOS sent into the queue flushes whatever it
//! already holds through the appsink (and so into the ring buffer) ahead
//! of the EOS, and only once that EOS is observed (or a bounded wait
//! elapses) are the pads unlinked and the elements torn down.

use crate::constants::FRAME_LOG_INTERVAL;
use crate::errors::GraphError;
use crate::frame::Frame;
use crate::media_graph::branch::RecordBranch;
use crate::media_graph::watchdog::sync_and_wait;
use crate::metrics::EngineMetrics;
use crate::recording::SharedRingBuffer;
use crate::ring_buffer::WriteOutcome;
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Builds and links a record branch onto `tee`, returning the elements so
/// the controller can tear them down again on detach.
pub(crate) fn attach(
    pipeline: &gst::Pipeline,
    tee: &gst::Element,
    layer: u8,
    ring: SharedRingBuffer,
    metrics: Arc<EngineMetrics>,
    state_change_timeout: gst::ClockTime,
) -> Result<RecordBranch, GraphError> {
    let queue = gst::ElementFactory::make("queue")
        .name(format!("record-queue-{layer}"))
        .build()
        .map_err(|_| GraphError::ElementCreationFailed("queue".into()))?;
    let appsink = gst::ElementFactory::make("appsink")
        .name(format!("record-sink-{layer}"))
        .build()
        .map_err(|_| GraphError::ElementCreationFailed("appsink".into()))?;
    appsink.set_property("sync", false);
    appsink.set_property("drop", true);

    pipeline
        .add_many([&queue, &appsink])
        .map_err(|_| GraphError::ElementCreationFailed("failed to add record branch".into()))?;

    let tee_pad = tee
        .request_pad_simple("src_%u")
        .ok_or_else(|| GraphError::PadRequestFailed(format!("tee pad for layer {layer}")))?;
    let queue_sink = queue
        .static_pad("sink")
        .ok_or_else(|| GraphError::PadRequestFailed("record queue sink pad".into()))?;
    tee_pad
        .link(&queue_sink)
        .map_err(|_| GraphError::PadLinkFailed(format!("tee -> record queue for layer {layer}")))?;
    queue
        .link(&appsink)
        .map_err(|_| GraphError::PadLinkFailed(format!("record queue -> appsink for layer {layer}")))?;

    let appsink = appsink
        .dynamic_cast::<gst_app::AppSink>()
        .map_err(|_| GraphError::ElementCreationFailed("failed to cast appsink element".into()))?;

    let frame_counter = Arc::new(AtomicU64::new(0));
    let eos_received = Arc::new(AtomicBool::new(false));
    let eos_flag = eos_received.clone();
    let sink_clone = appsink.clone();
    appsink.set_callbacks(
        gst_app::AppSinkCallbacks::builder()
            .eos(move |_appsink| {
                debug!(layer, "record appsink observed EOS, drain complete");
                eos_flag.store(true, Ordering::SeqCst);
            })
            .new_sample(move |_appsink| {
                let frame_num = frame_counter.fetch_add(1, Ordering::Relaxed);
                let sample = match sink_clone.pull_sample() {
                    Ok(sample) => sample,
                    Err(_) => return Err(gst::FlowError::Eos),
                };
                let buffer = sample.buffer().ok_or_else(|| {
                    warn!(layer, "record sample with no buffer");
                    gst::FlowError::Error
                })?;
                let caps = sample.caps().ok_or_else(|| {
                    warn!(layer, "record sample with no caps");
                    gst::FlowError::Error
                })?;

                let frame = Frame::new(buffer.to_owned(), caps.to_owned());
                let outcome = ring.lock().unwrap().write(frame);
                match outcome {
                    WriteOutcome::Stored => metrics.record_frame_captured(),
                    WriteOutcome::Overflowed => {
                        metrics.record_frame_captured();
                        metrics.record_frame_dropped_overflow();
                    }
                    WriteOutcome::CapsMismatch | WriteOutcome::Sealed => {}
                }
                if frame_num % FRAME_LOG_INTERVAL == 0 {
                    debug!(layer, frame = frame_num, ?outcome, "record frame captured");
                }
                Ok(gst::FlowSuccess::Ok)
            })
            .build(),
    );

    sync_and_wait(&queue, state_change_timeout, &format!("record queue for layer {layer}"))?;
    sync_and_wait(
        appsink.upcast_ref(),
        state_change_timeout,
        &format!("record appsink for layer {layer}"),
    )?;

    Ok(RecordBranch {
        queue,
        appsink: appsink.upcast(),
        tee_pad,
        eos_received,
    })
}

/// Blocks `branch`'s tee pad, flushes anything already queued into the ring
/// buffer via the appsink, then unlinks and removes the branch's elements,
/// releasing the tee's request pad.
///
/// Blocking is confirmed (bounded by `drain_timeout`) before EOS is sent, so
/// no buffer can cross the tee pad after this call starts; draining is then
/// bounded by the same timeout before the branch is torn down regardless,
/// since a drain that never completes must not hang the control thread
/// (§5 Cancellation and timeouts).
pub(crate) fn detach(
    pipeline: &gst::Pipeline,
    tee: &gst::Element,
    branch: RecordBranch,
    drain_timeout: gst::ClockTime,
) -> Result<(), GraphError> {
    let drain_timeout = Duration::from_nanos(drain_timeout.nseconds());
    let deadline = Instant::now() + drain_timeout;

    let (blocked_tx, blocked_rx) = mpsc::channel();
    let probe_id = branch.tee_pad.add_probe(gst::PadProbeType::BLOCK_DOWNSTREAM, move |_pad, _info| {
        let _ = blocked_tx.send(());
        gst::PadProbeReturn::Ok
    });
    if blocked_rx.recv_timeout(deadline.saturating_duration_since(Instant::now())).is_err() {
        warn!("tee pad did not report blocked within drain timeout; proceeding with detach anyway");
    }

    if let Some(queue_sink) = branch.queue.static_pad("sink") {
        queue_sink.send_event(gst::event::Eos::new());
    }
    while !branch.eos_received.load(Ordering::SeqCst) {
        if Instant::now() >= deadline {
            warn!("timed out waiting for record branch to drain pending buffers before detach");
            break;
        }
        std::thread::sleep(Duration::from_millis(5));
    }

    if let (Some(probe_id), Some(queue_sink)) = (probe_id, branch.queue.static_pad("sink")) {
        branch.tee_pad.remove_probe(probe_id);
        let _ = branch.tee_pad.unlink(&queue_sink);
    }

    let _ = branch.queue.set_state(gst::State::Null);
    let _ = branch.appsink.set_state(gst::State::Null);
    tee.release_request_pad(&branch.tee_pad);
    pipeline
        .remove_many([&branch.queue, &branch.appsink])
        .map_err(|_| GraphError::StateChangeFailed("failed to remove record branch elements".into()))?;
    Ok(())
}
