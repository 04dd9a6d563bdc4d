// SPDX-License-Identifier: GPL-3.0-only

//! Engine-wide counters
//!
//! Plain `AtomicU64` counters updated from callback contexts, the same
//! shape as the teacher's `FRAME_COUNTER`/`DECODE_TIME_US`/`SEND_TIME_US`
//! statics in `pipewire/pipeline.rs`, but instance-owned rather than
//! process-global since this engine can run more than one graph.

use std::sync::atomic::{AtomicU64, Ordering};

/// A point-in-time read of [`EngineMetrics`]' counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub frames_captured: u64,
    pub frames_dropped_overflow: u64,
    pub recovery_attempts: u64,
    pub recovery_successes: u64,
}

/// Engine-wide counters, cheap to update from any callback thread.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    frames_captured: AtomicU64,
    frames_dropped_overflow: AtomicU64,
    recovery_attempts: AtomicU64,
    recovery_successes: AtomicU64,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_frame_captured(&self) {
        self.frames_captured.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_dropped_overflow(&self) {
        self.frames_dropped_overflow.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_recovery_attempt(&self) {
        self.recovery_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_recovery_success(&self) {
        self.recovery_successes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            frames_dropped_overflow: self.frames_dropped_overflow.load(Ordering::Relaxed),
            recovery_attempts: self.recovery_attempts.load(Ordering::Relaxed),
            recovery_successes: self.recovery_successes.load(Ordering::Relaxed),
        }
    }
}
