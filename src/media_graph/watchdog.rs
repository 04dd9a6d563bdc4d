// SPDX-License-Identifier: GPL-3.0-only

//! Bounded state-change waits shared by the branch builders.
//!
//! `sync_state_with_parent` only requests the change; it does not wait for
//! it to land. Branch attach/detach used to trust it blindly, which meant a
//! wedged element (missing plugin resources, a driver stuck mid-open) could
//! hang the calling thread forever. `sync_and_wait` requests the change and
//! then bounds the wait the same way [`super::controller::MediaGraphController`]'s
//! own `set_state_watched` bounds the pipeline-level one, surfacing a
//! [`GraphError::StateChangeDeadlock`] instead of blocking past the
//! configured watchdog.

use crate::errors::GraphError;
use gstreamer as gst;
use gstreamer::prelude::*;

/// Calls `sync_state_with_parent` on `element`, then waits up to `timeout`
/// for the element to actually reach that state, returning
/// [`GraphError::StateChangeDeadlock`] if it doesn't.
pub(crate) fn sync_and_wait(element: &gst::Element, timeout: gst::ClockTime, context: &str) -> Result<(), GraphError> {
    element
        .sync_state_with_parent()
        .map_err(|_| GraphError::StateChangeFailed(context.to_string()))?;
    let (result, _state, _pending) = element.state(timeout);
    result.map_err(|_| GraphError::StateChangeDeadlock(context.to_string()))?;
    Ok(())
}
