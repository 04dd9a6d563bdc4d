// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the looping engine
//!
//! Follows the taxonomy in the design's error handling section: per-operation
//! errors return a structured kind to the caller, while pipeline-wide errors
//! are delivered through [`crate::recovery::ErrorRecoveryController`]'s
//! callback. Nothing here uses `thiserror`; conversions are implemented by
//! hand, matching the rest of this crate's error enums.

use std::fmt;

/// Result type alias used throughout the engine.
pub type EngineResult<T> = Result<T, EngineError>;

/// Top-level engine error.
#[derive(Debug, Clone)]
pub enum EngineError {
    /// A ring buffer operation rejected a frame or a bad capacity.
    RingBuffer(RingBufferError),
    /// A media graph construction or mutation failed.
    Graph(GraphError),
    /// A pipeline state change could not be completed or recovered.
    StateChangeFailed(String),
    /// The state-change watchdog expired before a terminal state was reached.
    StateChangeDeadlock,
    /// A categorised bus error that recovery could not resolve.
    BusError(BusErrorCategory, String),
    /// All recovery strategies failed; caller must shut down.
    Unrecoverable(String),
    /// Generic error with message, for glue code.
    Other(String),
}

/// Bus-error categories, classified from the error message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusErrorCategory {
    /// "not found" / "not available" in the error text.
    ElementMissing,
    /// "negotiation" / "caps" in the error text.
    Negotiation,
    /// "resource" / "memory" / "allocation" in the error text.
    Resource,
    /// Watchdog timer expired before a terminal state was reached.
    StateChangeDeadlock,
    /// Any other bus-delivered error.
    BusError,
}

impl fmt::Display for BusErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusErrorCategory::ElementMissing => write!(f, "element missing"),
            BusErrorCategory::Negotiation => write!(f, "negotiation failure"),
            BusErrorCategory::Resource => write!(f, "resource exhaustion"),
            BusErrorCategory::StateChangeDeadlock => write!(f, "state-change deadlock"),
            BusErrorCategory::BusError => write!(f, "uncategorised bus error"),
        }
    }
}

/// RingBuffer-specific errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RingBufferError {
    /// `create()` was called with `capacity == 0`.
    InvalidCapacity,
}

/// Media-graph construction/mutation errors.
#[derive(Debug, Clone)]
pub enum GraphError {
    /// GStreamer element creation failed (e.g. missing plugin).
    ElementCreationFailed(String),
    /// Requesting or releasing a pad failed.
    PadRequestFailed(String),
    /// Linking two pads/elements failed.
    PadLinkFailed(String),
    /// A branch state change did not complete successfully.
    StateChangeFailed(String),
    /// A branch's state-change watchdog expired before it reached its
    /// target state; distinct from [`GraphError::StateChangeFailed`] so
    /// callers can route it to [`crate::recovery::ErrorRecoveryController`]'s
    /// deadlock handling instead of a plain per-operation failure.
    StateChangeDeadlock(String),
    /// The layer already has an attached branch of the requested kind.
    AlreadyAttached(u8),
    /// The layer has no attached branch of the requested kind.
    NotAttached(u8),
    /// Negotiated caps for a new branch do not match the graph's expectation.
    CapsMismatch(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::RingBuffer(e) => write!(f, "ring buffer error: {}", e),
            EngineError::Graph(e) => write!(f, "media graph error: {}", e),
            EngineError::StateChangeFailed(msg) => write!(f, "state change failed: {}", msg),
            EngineError::StateChangeDeadlock => write!(f, "state-change watchdog expired"),
            EngineError::BusError(cat, msg) => write!(f, "bus error ({}): {}", cat, msg),
            EngineError::Unrecoverable(msg) => write!(f, "unrecoverable: {}", msg),
            EngineError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for RingBufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RingBufferError::InvalidCapacity => write!(f, "capacity must be non-zero"),
        }
    }
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphError::ElementCreationFailed(msg) => write!(f, "element creation failed: {}", msg),
            GraphError::PadRequestFailed(msg) => write!(f, "pad request failed: {}", msg),
            GraphError::PadLinkFailed(msg) => write!(f, "pad link failed: {}", msg),
            GraphError::StateChangeFailed(msg) => write!(f, "state change failed: {}", msg),
            GraphError::StateChangeDeadlock(msg) => write!(f, "state-change watchdog expired: {}", msg),
            GraphError::AlreadyAttached(layer) => {
                write!(f, "layer {} already has an attached branch", layer)
            }
            GraphError::NotAttached(layer) => write!(f, "layer {} has no attached branch", layer),
            GraphError::CapsMismatch(msg) => write!(f, "caps mismatch: {}", msg),
        }
    }
}

impl std::error::Error for EngineError {}
impl std::error::Error for RingBufferError {}
impl std::error::Error for GraphError {}

impl From<RingBufferError> for EngineError {
    fn from(err: RingBufferError) -> Self {
        EngineError::RingBuffer(err)
    }
}

impl From<GraphError> for EngineError {
    fn from(err: GraphError) -> Self {
        EngineError::Graph(err)
    }
}

impl From<String> for EngineError {
    fn from(msg: String) -> Self {
        EngineError::Other(msg)
    }
}

impl From<&str> for EngineError {
    fn from(msg: &str) -> Self {
        EngineError::Other(msg.to_string())
    }
}
