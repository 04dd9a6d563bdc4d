// SPDX-License-Identifier: GPL-3.0-only

//! A low-latency, palindrome-looping video compositor engine.
//!
//! Captures short clips from a live camera feed on key-down/key-up and
//! plays each back as an endless forward-then-backward loop composited
//! alongside the live feed, across up to [`constants::LAYER_COUNT`]
//! independently addressable layers.
//!
//! # Architecture
//!
//! - [`frame`]: the cheaply-clonable [`frame::Frame`] value type
//! - [`ring_buffer`]: per-layer circular frame storage
//! - [`palindrome`]: forward/reverse traversal over a sealed buffer
//! - [`recording`]: per-layer capture lifecycle state machine
//! - [`media_graph`]: pipeline construction and live branch attach/detach
//! - [`recovery`]: bus-error categorisation and the recovery ladder
//! - [`metrics`]: engine-wide counters
//! - [`config`]: runtime configuration surface
//! - [`engine`]: top-level wiring exposed to a host application

pub mod config;
pub mod constants;
pub mod engine;
pub mod errors;
pub mod frame;
pub mod media_graph;
pub mod metrics;
pub mod palindrome;
pub mod recording;
pub mod recovery;
pub mod ring_buffer;

pub use config::EngineConfig;
pub use engine::Engine;
pub use errors::{EngineError, EngineResult};
