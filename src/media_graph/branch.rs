// SPDX-License-Identifier: GPL-3.0-only

//! Per-layer branch bookkeeping.

use gstreamer as gst;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Whether a layer currently has a record or playback branch attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchState {
    Detached,
    RecordAttached,
    PlaybackAttached,
}

/// Elements making up one layer's record branch: `tee.` -> queue -> appsink.
pub(crate) struct RecordBranch {
    pub(crate) queue: gst::Element,
    pub(crate) appsink: gst::Element,
    /// The `tee` request pad feeding `queue`, released on detach.
    pub(crate) tee_pad: gst::Pad,
    /// Set by the appsink's `eos` callback; detach waits on this (bounded)
    /// after sending EOS into the branch, so buffers already queued between
    /// the tee and the appsink are drained into the ring buffer before the
    /// branch's elements are torn down.
    pub(crate) eos_received: Arc<AtomicBool>,
}

/// Elements making up one layer's playback branch: appsrc -> queue ->
/// (videoconvert/videoscale) -> input-selector sink pad.
///
/// `input_selector_pad` is the fixed sink pad this layer's compositor cell
/// is permanently wired to; replacing a branch means linking a new appsrc
/// chain into a fresh pad on the same `input-selector`, then atomically
/// switching `active-pad` to it, rather than re-linking the compositor.
pub(crate) struct PlaybackBranch {
    pub(crate) appsrc: gst::Element,
    pub(crate) queue: gst::Element,
    pub(crate) convert: gst::Element,
    pub(crate) selector_pad: gst::Pad,
    pub(crate) stop_pump: std::sync::Arc<std::sync::atomic::AtomicBool>,
    pub(crate) pump_handle: Option<std::thread::JoinHandle<()>>,
}
