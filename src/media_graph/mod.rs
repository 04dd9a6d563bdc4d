// SPDX-License-Identifier: GPL-3.0-only

//! Pipeline construction and live mutation (§4.5)
//!
//! The media graph is one GStreamer `Pipeline` built once at `initialize()`
//! time: a live source feeding a `tee`, one `input-selector` per loop layer
//! feeding a fixed compositor sink pad, and a single output sink. Record and
//! playback branches attach to and detach from this fixed skeleton at
//! runtime; the skeleton itself never changes shape after `initialize()`.

mod branch;
mod builder;
mod controller;
mod playback_source;
mod record_sink;
mod watchdog;

pub use branch::BranchState;
pub use builder::GraphBuilder;
pub use controller::MediaGraphController;

use crate::errors::EngineResult;
use crate::recording::SharedRingBuffer;

/// The narrow contract [`crate::recording::RecordingStateMachine`] needs
/// from the media graph, so tests can drive the state machine against a
/// fake graph without constructing real GStreamer elements (doing so
/// requires plugins this crate cannot guarantee are installed in every
/// environment that runs its test suite).
pub trait GraphOps: Send + Sync {
    /// Attaches a record branch (appsink-backed) for `layer`, appending
    /// every captured frame to `ring`.
    ///
    /// Returns [`crate::errors::GraphError::AlreadyAttached`] if `layer`
    /// already has a record branch attached.
    fn attach_record_branch(&self, layer: u8, ring: SharedRingBuffer) -> EngineResult<()>;

    /// Detaches `layer`'s record branch, releasing its tee request pad.
    ///
    /// Returns [`crate::errors::GraphError::NotAttached`] if `layer` has no
    /// record branch attached.
    fn detach_record_branch(&self, layer: u8) -> EngineResult<()>;

    /// Attaches a playback branch (appsrc-backed, palindrome-driven) for
    /// `layer`'s compositor cell, atomically replacing any branch already
    /// feeding that cell.
    ///
    /// The compositor renders either the previous branch or the new one on
    /// every output frame, never both and never neither, for the entire
    /// replacement.
    fn attach_or_replace_playback_branch(&self, layer: u8, ring: SharedRingBuffer) -> EngineResult<()>;
}
