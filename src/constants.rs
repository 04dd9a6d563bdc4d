// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants
//!
//! Defaults for the fixed 50-layer model (five modifier tiers × ten physical
//! keys). See [`crate::config::EngineConfig`] for the runtime-overridable
//! surface these back.

use std::time::Duration;

/// Number of independently addressable recording/playback layers.
///
/// The source material fluctuates between a 10-layer and a 50-layer design;
/// this crate fixes the model at 50 (five modifier tiers × ten physical keys).
pub const LAYER_COUNT: usize = 50;

/// Offsets added to a physical key's base index (0..10) for each modifier
/// tier, owned by the input layer (not the core) but documented here since
/// layer indices the core accepts are computed from this pattern.
pub const MODIFIER_OFFSETS: [u8; 5] = [0, 10, 20, 30, 40];

/// Default per-layer ring buffer capacity: ≈2 seconds at 30 fps.
pub const DEFAULT_RING_CAPACITY_FRAMES: usize = 60;

/// Default floor on captured duration: one frame at 30 fps.
pub const DEFAULT_MIN_HOLD_DURATION: Duration = Duration::from_nanos(33_333_333);

/// Default fallback frame duration when source frames lack duration metadata:
/// one input frame at 30 fps.
pub const DEFAULT_FRAME_DURATION: Duration = Duration::from_nanos(33_333_333);

/// Default watchdog timeout for pipeline state changes.
pub const DEFAULT_STATE_CHANGE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default negotiated output framerate used for playback retimestamping.
pub const DEFAULT_OUTPUT_FRAMERATE: u32 = 120;

/// How often per-frame debug logs are sampled (every Nth frame) on
/// frame-rate-sensitive callback paths.
pub const FRAME_LOG_INTERVAL: u64 = 60;
