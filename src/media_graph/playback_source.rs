// SPDX-License-Identifier: GPL-3.0-only

//! Appsrc-backed playback branches.
//!
//! Each layer's playback branch is appsrc -> queue -> videoconvert, feeding
//! a dedicated sink pad on that layer's `input-selector`. A pump thread
//! walks a [`PalindromeCursor`] over the layer's sealed ring buffer and
//! pushes retimestamped frames into the appsrc at the configured output
//! framerate. The thread lifecycle (stop flag + join handle) follows the
//! same shape as the teacher's `CaptureLoopController`, adapted here as a
//! private loop rather than a shared abstraction since a playback pump's
//! stop condition (branch replaced or layer detached) differs from a
//! capture loop's.

use crate::errors::GraphError;
use crate::media_graph::branch::PlaybackBranch;
use crate::media_graph::watchdog::sync_and_wait;
use crate::palindrome::PalindromeCursor;
use crate::recording::SharedRingBuffer;
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Builds a playback branch feeding a fresh sink pad on `selector`, starts
/// its pump thread, but does not yet make it the selector's active pad —
/// the caller performs that atomic switch once the branch is synced to
/// `Playing`.
///
/// The appsrc's `caps` property is set from the caps fixed on `ring` at its
/// first write, so the `videoconvert` -> `input-selector` -> compositor
/// chain downstream has something to negotiate against instead of the
/// pushed buffers arriving with no format at all — the same correction the
/// teacher applies in `VideoRecorder`'s appsrc callback.
pub(crate) fn attach(
    pipeline: &gst::Pipeline,
    selector: &gst::Element,
    layer: u8,
    ring: SharedRingBuffer,
    output_framerate: u32,
    state_change_timeout: gst::ClockTime,
) -> Result<PlaybackBranch, GraphError> {
    let appsrc = gst::ElementFactory::make("appsrc")
        .name(format!("playback-src-{layer}"))
        .build()
        .map_err(|_| GraphError::ElementCreationFailed("appsrc".into()))?;
    appsrc.set_property("is-live", true);
    appsrc.set_property("format", gst::Format::Time);

    let ring_caps = ring
        .lock()
        .unwrap()
        .caps()
        .cloned()
        .ok_or_else(|| GraphError::CapsMismatch(format!("no caps fixed yet on layer {layer}'s ring buffer")))?;
    appsrc.set_property("caps", &ring_caps);

    let queue = gst::ElementFactory::make("queue")
        .name(format!("playback-queue-{layer}"))
        .build()
        .map_err(|_| GraphError::ElementCreationFailed("queue".into()))?;
    let convert = gst::ElementFactory::make("videoconvert")
        .name(format!("playback-convert-{layer}"))
        .build()
        .map_err(|_| GraphError::ElementCreationFailed("videoconvert".into()))?;

    pipeline
        .add_many([&appsrc, &queue, &convert])
        .map_err(|_| GraphError::ElementCreationFailed("failed to add playback branch".into()))?;
    appsrc
        .link(&queue)
        .map_err(|_| GraphError::PadLinkFailed(format!("appsrc -> queue for layer {layer}")))?;
    queue
        .link(&convert)
        .map_err(|_| GraphError::PadLinkFailed(format!("queue -> videoconvert for layer {layer}")))?;

    let selector_pad = selector
        .request_pad_simple("sink_%u")
        .ok_or_else(|| GraphError::PadRequestFailed(format!("input-selector pad for layer {layer}")))?;
    convert
        .static_pad("src")
        .ok_or_else(|| GraphError::PadRequestFailed("playback convert src pad".into()))?
        .link(&selector_pad)
        .map_err(|_| GraphError::PadLinkFailed(format!("videoconvert -> input-selector for layer {layer}")))?;

    sync_and_wait(&appsrc, state_change_timeout, &format!("playback appsrc for layer {layer}"))?;
    sync_and_wait(&queue, state_change_timeout, &format!("playback queue for layer {layer}"))?;
    sync_and_wait(
        &convert,
        state_change_timeout,
        &format!("playback videoconvert for layer {layer}"),
    )?;

    let appsrc_typed = appsrc
        .clone()
        .dynamic_cast::<gst_app::AppSrc>()
        .map_err(|_| GraphError::ElementCreationFailed("failed to cast appsrc element".into()))?;
    let stop_pump = Arc::new(AtomicBool::new(false));
    let pump_handle = spawn_pump(appsrc_typed, ring, layer, output_framerate, stop_pump.clone());

    Ok(PlaybackBranch {
        appsrc,
        queue,
        convert,
        selector_pad,
        stop_pump,
        pump_handle: Some(pump_handle),
    })
}

fn spawn_pump(
    appsrc: gst_app::AppSrc,
    ring: SharedRingBuffer,
    layer: u8,
    output_framerate: u32,
    stop_pump: Arc<AtomicBool>,
) -> std::thread::JoinHandle<()> {
    let frame_interval = Duration::from_nanos(1_000_000_000 / output_framerate.max(1) as u64);
    std::thread::spawn(move || {
        info!(layer, "playback pump thread started");

        let count = ring.lock().unwrap().count();
        let mut cursor = PalindromeCursor::create(count);
        if !cursor.is_active() {
            warn!(layer, "playback branch started with an empty ring buffer");
            return;
        }

        let mut elapsed = gst::ClockTime::ZERO;
        let gst_frame_interval = gst::ClockTime::from_nseconds(frame_interval.as_nanos() as u64);

        loop {
            if stop_pump.load(Ordering::SeqCst) {
                debug!(layer, "playback pump stop signal received");
                break;
            }

            let pushed = {
                let buffer = ring.lock().unwrap();
                cursor.peek().and_then(|idx| buffer.read(idx)).map(|frame| {
                    frame.retimestamped(elapsed, gst_frame_interval)
                })
            };

            match pushed {
                Some(frame) => {
                    if appsrc.push_buffer(frame.buffer().clone()).is_err() {
                        debug!(layer, "appsrc push failed, stopping pump (branch likely replaced)");
                        break;
                    }
                    elapsed += gst_frame_interval;
                    cursor.advance();
                }
                None => break,
            }

            std::thread::sleep(frame_interval);
        }

        debug!(layer, "playback pump thread exiting");
    })
}

/// Signals a playback branch's pump thread to stop and joins it, then tears
/// down its elements and releases the selector pad.
pub(crate) fn detach(
    pipeline: &gst::Pipeline,
    selector: &gst::Element,
    mut branch: PlaybackBranch,
) -> Result<(), GraphError> {
    branch.stop_pump.store(true, Ordering::SeqCst);
    if let Some(handle) = branch.pump_handle.take() {
        let _ = handle.join();
    }
    let _ = branch.appsrc.set_state(gst::State::Null);
    let _ = branch.queue.set_state(gst::State::Null);
    let _ = branch.convert.set_state(gst::State::Null);
    selector.release_request_pad(&branch.selector_pad);
    pipeline
        .remove_many([&branch.appsrc, &branch.queue, &branch.convert])
        .map_err(|_| GraphError::StateChangeFailed("failed to remove playback branch elements".into()))?;
    Ok(())
}
