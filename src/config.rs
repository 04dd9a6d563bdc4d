// SPDX-License-Identifier: GPL-3.0-only

//! Engine configuration
//!
//! All options here are set once at [`crate::engine::Engine::start`] and do
//! not change at runtime — there is no GUI configuration surface (a
//! Non-goal); a host embedding this engine supplies an [`EngineConfig`]
//! built from its own CLI flags or config file.

use crate::constants;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Geometry and stacking for a single composited cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub z_order: u32,
    pub alpha: f64,
}

impl Cell {
    pub fn new(x: i32, y: i32, width: i32, height: i32, z_order: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            z_order,
            alpha: 1.0,
        }
    }
}

/// Fixed grid layout: one live cell plus up to 50 loop cells.
///
/// Set once at `initialize` time (§6 External Interfaces); cell count,
/// positions, and sizes do not change at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridLayout {
    pub live_cell: Cell,
    pub loop_cells: Vec<Cell>,
}

impl GridLayout {
    /// Returns the cell bound to loop layer `layer`.
    ///
    /// # Panics
    /// Panics if `layer >= loop_cells.len()`; callers are expected to bound
    /// `layer` to `0..LAYER_COUNT` before constructing a `GridLayout`.
    pub fn cell_for_layer(&self, layer: u8) -> &Cell {
        &self.loop_cells[layer as usize]
    }
}

impl Default for GridLayout {
    /// A 10×5 tiling of loop cells (matching the ten-key × five-modifier
    /// model) occupying the lower 40% of a 1920×1080 canvas, with the live
    /// feed filling the remaining area above it.
    fn default() -> Self {
        const COLS: i32 = 10;
        const ROWS: i32 = 5;
        const CANVAS_W: i32 = 1920;
        const CANVAS_H: i32 = 1080;
        const STRIP_H: i32 = CANVAS_H * 2 / 5;

        let cell_w = CANVAS_W / COLS;
        let cell_h = STRIP_H / ROWS;
        let mut loop_cells = Vec::with_capacity(constants::LAYER_COUNT);
        for row in 0..ROWS {
            for col in 0..COLS {
                let layer = (row * COLS + col) as u32;
                loop_cells.push(Cell::new(
                    col * cell_w,
                    CANVAS_H - STRIP_H + row * cell_h,
                    cell_w,
                    cell_h,
                    layer + 1,
                ));
            }
        }

        Self {
            live_cell: Cell::new(0, 0, CANVAS_W, CANVAS_H - STRIP_H, 0),
            loop_cells,
        }
    }
}

/// Describes the camera source the graph negotiates with at `initialize`.
///
/// The camera source itself is an external collaborator (§1 Explicitly out
/// of scope); this only carries the handful of parameters the graph needs to
/// build a matching source element.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSpec {
    /// GStreamer device path/name, or `None` for the system default.
    pub device: Option<String>,
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
}

impl Default for SourceSpec {
    fn default() -> Self {
        Self {
            device: None,
            width: 1280,
            height: 720,
            framerate: 30,
        }
    }
}

/// Describes the output sink (window/view) the composited stream is handed
/// to. The sink itself is an external collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSinkSpec {
    /// Name of a GStreamer video sink element (e.g. `"autovideosink"`,
    /// `"appsink"` for a sink owned by an embedding window toolkit).
    pub sink_element: String,
}

impl Default for OutputSinkSpec {
    fn default() -> Self {
        Self {
            sink_element: "autovideosink".to_string(),
        }
    }
}

/// Full configuration surface (§6 External Interfaces).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Per-layer RingBuffer capacity, in frames.
    pub ring_capacity_frames: usize,
    /// Floor on captured duration.
    #[serde(with = "duration_nanos")]
    pub min_hold_duration_ns: Duration,
    /// Cell geometry for live + 50 loop cells.
    pub grid_layout: GridLayout,
    /// Watchdog for state changes.
    #[serde(with = "duration_nanos")]
    pub state_change_timeout_ns: Duration,
    /// Fallback frame duration when source frames lack duration metadata.
    #[serde(with = "duration_nanos")]
    pub default_frame_duration_ns: Duration,
    /// Negotiated output framerate for retimestamping.
    pub output_framerate: u32,
    /// Camera source descriptor.
    pub source: SourceSpec,
    /// Output sink descriptor.
    pub output_sink: OutputSinkSpec,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ring_capacity_frames: constants::DEFAULT_RING_CAPACITY_FRAMES,
            min_hold_duration_ns: constants::DEFAULT_MIN_HOLD_DURATION,
            grid_layout: GridLayout::default(),
            state_change_timeout_ns: constants::DEFAULT_STATE_CHANGE_TIMEOUT,
            default_frame_duration_ns: constants::DEFAULT_FRAME_DURATION,
            output_framerate: constants::DEFAULT_OUTPUT_FRAMERATE,
            source: SourceSpec::default(),
            output_sink: OutputSinkSpec::default(),
        }
    }
}

impl EngineConfig {
    /// Validates the configuration once at startup.
    ///
    /// There is no runtime reconfiguration surface: a config that fails
    /// validation should cause the caller to abort before `Engine::start`.
    pub fn validate(&self) -> Result<(), String> {
        if self.ring_capacity_frames == 0 {
            return Err("ring_capacity_frames must be non-zero".to_string());
        }
        if self.grid_layout.loop_cells.len() != constants::LAYER_COUNT {
            return Err(format!(
                "grid_layout must have exactly {} loop cells, found {}",
                constants::LAYER_COUNT,
                self.grid_layout.loop_cells.len()
            ));
        }
        if self.output_framerate == 0 {
            return Err("output_framerate must be non-zero".to_string());
        }
        Ok(())
    }
}

/// (De)serialises a `Duration` as whole nanoseconds, since `EngineConfig` is
/// often round-tripped through JSON config files.
mod duration_nanos {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_nanos() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let nanos = u64::deserialize(d)?;
        Ok(Duration::from_nanos(nanos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.ring_capacity_frames, 60);
        assert_eq!(config.output_framerate, 120);
    }

    #[test]
    fn test_grid_layout_has_fifty_loop_cells() {
        let grid = GridLayout::default();
        assert_eq!(grid.loop_cells.len(), constants::LAYER_COUNT);
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let mut config = EngineConfig::default();
        config.ring_capacity_frames = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_wrong_cell_count() {
        let mut config = EngineConfig::default();
        config.grid_layout.loop_cells.pop();
        assert!(config.validate().is_err());
    }
}
