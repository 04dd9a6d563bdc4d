// SPDX-License-Identifier: GPL-3.0-only

//! Top-level engine wiring (§6 External Interfaces)
//!
//! [`Engine`] is the single entry point a host (the CLI in [`crate::main`],
//! or an embedding application) talks to: it owns the media graph, the
//! recording state machine, the recovery controller, and the engine-wide
//! metrics, and exposes exactly the key-event and lifecycle surface the
//! input layer needs.

use crate::config::EngineConfig;
use crate::constants;
use crate::errors::{EngineError, EngineResult};
use crate::media_graph::{GraphOps, MediaGraphController};
use crate::metrics::{EngineMetrics, MetricsSnapshot};
use crate::recording::RecordingStateMachine;
use crate::recovery::ErrorRecoveryController;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};

/// Owns one running media graph and everything driving it.
pub struct Engine {
    graph: Arc<MediaGraphController>,
    recording: Arc<RecordingStateMachine>,
    #[allow(dead_code)]
    recovery: Arc<ErrorRecoveryController>,
    metrics: Arc<EngineMetrics>,
    quit_requested: Arc<AtomicBool>,
}

impl Engine {
    /// Validates `config`, builds the pipeline, and brings it to `Playing`.
    pub fn start(config: EngineConfig) -> EngineResult<Self> {
        config.validate().map_err(EngineError::Other)?;

        let metrics = Arc::new(EngineMetrics::new());
        let graph = Arc::new(MediaGraphController::initialize(&config, metrics.clone())?);
        let quit_requested = Arc::new(AtomicBool::new(false));

        let quit_on_unrecoverable = quit_requested.clone();
        let recovery_metrics = metrics.clone();
        let recovery = ErrorRecoveryController::install(
            graph.pipeline(),
            graph.state_change_timeout(),
            recovery_metrics,
            move |err| {
                error!(error = %err, "recovery ladder exhausted, requesting shutdown");
                quit_on_unrecoverable.store(true, Ordering::SeqCst);
            },
        );
        graph.attach_recovery(recovery.clone());

        let graph_ops: Arc<dyn GraphOps> = graph.clone();
        let recording = Arc::new(RecordingStateMachine::new(
            graph_ops,
            constants::LAYER_COUNT,
            config.ring_capacity_frames,
            config.default_frame_duration_ns,
            config.min_hold_duration_ns,
        ));

        info!("engine started");
        Ok(Self {
            graph,
            recording,
            recovery,
            metrics,
            quit_requested,
        })
    }

    /// Key-down for `layer` (0..[`constants::LAYER_COUNT`]): begins capture.
    pub fn on_key_down(&self, layer: u8) -> EngineResult<()> {
        self.recording.on_key_down(layer)
    }

    /// Key-up for `layer`: ends capture (subject to the minimum-hold floor)
    /// and seeds playback from what was captured.
    pub fn on_key_up(&self, layer: u8) -> EngineResult<()> {
        self.recording.on_key_up(layer)
    }

    pub fn is_capturing(&self, layer: u8) -> bool {
        self.recording.is_capturing(layer)
    }

    pub fn allocate_next_layer(&self) -> Option<u8> {
        self.recording.allocate_next_layer()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Requests the host's run loop to exit; does not itself block.
    pub fn request_quit(&self) {
        self.quit_requested.store(true, Ordering::SeqCst);
    }

    pub fn quit_requested(&self) -> bool {
        self.quit_requested.load(Ordering::Relaxed)
    }

    /// Drains and stops the pipeline. Safe to call more than once.
    pub fn shutdown(&self) {
        self.graph.shutdown();
    }
}
