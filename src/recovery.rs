// SPDX-License-Identifier: GPL-3.0-only

//! Bus-error categorization and the progressive recovery ladder (§4.6)
//!
//! Continuously watches the pipeline bus the way
//! `angkira-rpi-webrtc-streamer`'s `setup_bus_monitoring` does with
//! `bus.add_watch`, rather than the teacher's one-shot
//! `timed_pop_filtered` (which only waits for a single EOS/error and
//! returns — not a fit for monitoring a pipeline that runs indefinitely).
//! Every `Error` message is classified, then worked through a three-rung
//! ladder: revert to the last known-good state, force `Ready`, force
//! `Null`. Each rung is attempted with the same state-change watchdog the
//! rest of the engine uses.

use crate::errors::{BusErrorCategory, EngineError};
use crate::metrics::EngineMetrics;
use gstreamer as gst;
use gstreamer::glib;
use gstreamer::prelude::*;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

/// One rung of the recovery ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStrategy {
    /// Re-request the last state the pipeline successfully reached.
    RevertToPrevious,
    /// Force the pipeline to `Ready`, releasing most resources.
    ForceReady,
    /// Force the pipeline to `Null`; the caller must reinitialize.
    ForceNull,
}

fn classify(message: &str) -> BusErrorCategory {
    let lower = message.to_lowercase();
    if lower.contains("not found") || lower.contains("not available") {
        BusErrorCategory::ElementMissing
    } else if lower.contains("negotiation") || lower.contains("caps") {
        BusErrorCategory::Negotiation
    } else if lower.contains("resource") || lower.contains("memory") || lower.contains("allocation") {
        BusErrorCategory::Resource
    } else {
        BusErrorCategory::BusError
    }
}

fn state_to_u8(state: gst::State) -> u8 {
    match state {
        gst::State::VoidPending => 0,
        gst::State::Null => 1,
        gst::State::Ready => 2,
        gst::State::Paused => 3,
        gst::State::Playing => 4,
    }
}

fn u8_to_state(value: u8) -> gst::State {
    match value {
        1 => gst::State::Null,
        2 => gst::State::Ready,
        3 => gst::State::Paused,
        4 => gst::State::Playing,
        _ => gst::State::Null,
    }
}

/// Monitors the pipeline bus and drives the recovery ladder on errors.
pub struct ErrorRecoveryController {
    pipeline: gst::Pipeline,
    state_change_timeout: gst::ClockTime,
    last_good_state: Arc<AtomicU8>,
    metrics: Arc<EngineMetrics>,
    on_unrecoverable: Mutex<Option<Box<dyn Fn(EngineError) + Send + Sync>>>,
    bus_watch: Mutex<Option<gst::bus::BusWatchGuard>>,
}

impl ErrorRecoveryController {
    /// Starts watching `pipeline`'s bus. `on_unrecoverable` is invoked once
    /// if every rung of the ladder fails.
    pub fn install(
        pipeline: gst::Pipeline,
        state_change_timeout: gst::ClockTime,
        metrics: Arc<EngineMetrics>,
        on_unrecoverable: impl Fn(EngineError) + Send + Sync + 'static,
    ) -> Arc<Self> {
        let controller = Arc::new(Self {
            pipeline: pipeline.clone(),
            state_change_timeout,
            last_good_state: Arc::new(AtomicU8::new(state_to_u8(gst::State::Null))),
            metrics,
            on_unrecoverable: Mutex::new(Some(Box::new(on_unrecoverable))),
            bus_watch: Mutex::new(None),
        });

        let bus = pipeline.bus().expect("pipeline always has a bus");
        let watcher = controller.clone();
        let watch = bus
            .add_watch(move |_bus, msg| {
                watcher.handle_message(msg);
                glib::ControlFlow::Continue
            })
            .expect("adding a bus watch should not fail on a freshly built pipeline");
        *controller.bus_watch.lock().unwrap() = Some(watch);

        controller
    }

    fn handle_message(&self, msg: &gst::Message) {
        match msg.view() {
            gst::MessageView::Error(err) => {
                let category = classify(&err.error().to_string());
                error!(?category, error = %err.error(), debug = ?err.debug(), "pipeline bus error");
                self.recover(category, err.error().to_string());
            }
            gst::MessageView::Warning(warning) => {
                warn!(error = %warning.error(), "pipeline bus warning");
            }
            gst::MessageView::StateChanged(sc) => {
                if sc
                    .src()
                    .and_then(|s| s.downcast_ref::<gst::Pipeline>())
                    .is_some()
                    && matches!(sc.current(), gst::State::Paused | gst::State::Playing)
                {
                    self.last_good_state.store(state_to_u8(sc.current()), Ordering::Relaxed);
                }
            }
            _ => {}
        }
    }

    /// Works through the recovery ladder for a categorised error, whether
    /// it arrived as a bus message or (via [`Self::handle_deadlock`]) as a
    /// state-change watchdog expiry.
    fn recover(&self, category: BusErrorCategory, message: String) {
        let ladder = [
            RecoveryStrategy::RevertToPrevious,
            RecoveryStrategy::ForceReady,
            RecoveryStrategy::ForceNull,
        ];

        for strategy in ladder {
            info!(?strategy, ?category, "attempting recovery strategy");
            self.metrics.record_recovery_attempt();
            if self.attempt(strategy) {
                info!(?strategy, "recovery succeeded");
                self.metrics.record_recovery_success();
                return;
            }
            warn!(?strategy, "recovery strategy did not reach target state");
        }

        error!(?category, "exhausted recovery ladder, reporting unrecoverable");
        if let Some(callback) = self.on_unrecoverable.lock().unwrap().take() {
            callback(EngineError::Unrecoverable(format!("{}: {}", category, message)));
        }
    }

    /// Entry point for a state-change watchdog expiry (§4.6,
    /// `StateChangeDeadlock`), as opposed to a bus-delivered error: there is
    /// no bus message text to run through [`classify`], so this drives the
    /// same ladder directly with the `StateChangeDeadlock` category.
    pub(crate) fn handle_deadlock(&self, context: impl Into<String>) {
        let context = context.into();
        warn!(%context, "state-change watchdog expired, entering recovery ladder");
        self.recover(BusErrorCategory::StateChangeDeadlock, context);
    }

    fn attempt(&self, strategy: RecoveryStrategy) -> bool {
        let target = match strategy {
            RecoveryStrategy::RevertToPrevious => {
                u8_to_state(self.last_good_state.load(Ordering::Relaxed))
            }
            RecoveryStrategy::ForceReady => gst::State::Ready,
            RecoveryStrategy::ForceNull => gst::State::Null,
        };

        if self.pipeline.set_state(target).is_err() {
            return false;
        }
        let (result, state, _pending) = self.pipeline.state(self.state_change_timeout);
        result.is_ok() && state == target
    }
}

impl Drop for ErrorRecoveryController {
    fn drop(&mut self) {
        if let Some(watch) = self.bus_watch.lock().unwrap().take() {
            drop(watch);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_element_missing() {
        assert_eq!(classify("no element \"v4l2src\" not found"), BusErrorCategory::ElementMissing);
    }

    #[test]
    fn test_classify_negotiation() {
        assert_eq!(classify("caps negotiation failed between pads"), BusErrorCategory::Negotiation);
    }

    #[test]
    fn test_classify_resource() {
        assert_eq!(classify("could not allocate resource: out of memory"), BusErrorCategory::Resource);
    }

    #[test]
    fn test_classify_falls_back_to_bus_error() {
        assert_eq!(classify("something unexpected happened"), BusErrorCategory::BusError);
    }

    #[test]
    fn test_state_roundtrip() {
        for state in [gst::State::Null, gst::State::Ready, gst::State::Paused, gst::State::Playing] {
            assert_eq!(u8_to_state(state_to_u8(state)), state);
        }
    }

    #[test]
    fn test_handle_deadlock_drives_the_ladder_and_reaches_null() {
        gst::init().unwrap();

        let pipeline = gst::Pipeline::builder().name("deadlock-test").build();
        let src = gst::ElementFactory::make("fakesrc").build().unwrap();
        let sink = gst::ElementFactory::make("fakesink").build().unwrap();
        pipeline.add_many([&src, &sink]).unwrap();
        src.link(&sink).unwrap();
        pipeline.set_state(gst::State::Playing).unwrap();
        let _ = pipeline.state(gst::ClockTime::from_seconds(2));

        let metrics = Arc::new(EngineMetrics::new());
        let controller = ErrorRecoveryController::install(
            pipeline.clone(),
            gst::ClockTime::from_mseconds(500),
            metrics.clone(),
            |_err| {},
        );

        // No bus text here at all — a watchdog expiry is reported straight
        // from the caller, not discovered by classifying a message.
        controller.handle_deadlock("simulated attach watchdog expiry");

        assert!(
            metrics.snapshot().recovery_attempts >= 1,
            "handle_deadlock must drive at least one rung of the ladder"
        );

        pipeline.set_state(gst::State::Null).unwrap();
    }
}
