// SPDX-License-Identifier: GPL-3.0-only

//! Staged pipeline construction.
//!
//! Each stage consumes `self` and returns the next stage, so a graph can
//! only be built source-first, tee-second, compositor-third, sink-last —
//! the order GStreamer itself requires pads to exist in before they can be
//! linked. Mirrors the way the teacher's recorder builds up `source ->
//! videoconvert -> videoscale -> capsfilter -> tee` and links branches off
//! the tee one at a time, but generalised into reusable stage types instead
//! of one long constructor.

use crate::config::{EngineConfig, GridLayout};
use crate::errors::GraphError;
use gstreamer as gst;
use gstreamer::prelude::*;
use std::marker::PhantomData;

pub struct Start;
pub struct WithSource;
pub struct WithTee;
pub struct WithCompositor;

fn make(factory: &str, name: &str) -> Result<gst::Element, GraphError> {
    gst::ElementFactory::make(factory)
        .name(name)
        .build()
        .map_err(|_| GraphError::ElementCreationFailed(factory.to_string()))
}

fn link(a: &gst::Element, b: &gst::Element) -> Result<(), GraphError> {
    a.link(b)
        .map_err(|_| GraphError::PadLinkFailed(format!("{} -> {}", a.name(), b.name())))
}

/// Output of a completed build: the pipeline plus the handles the
/// controller needs to attach/detach branches at runtime.
pub struct GraphParts {
    pub pipeline: gst::Pipeline,
    pub tee: gst::Element,
    pub compositor: gst::Element,
    /// One `input-selector` per loop layer, index == layer.
    pub input_selectors: Vec<gst::Element>,
}

/// A pipeline under construction, typestated by which stage has completed.
pub struct GraphBuilder<Stage> {
    pipeline: gst::Pipeline,
    source_tail: Option<gst::Element>,
    tee: Option<gst::Element>,
    compositor: Option<gst::Element>,
    input_selectors: Vec<gst::Element>,
    _stage: PhantomData<Stage>,
}

impl GraphBuilder<Start> {
    pub fn new(name: &str) -> Result<Self, GraphError> {
        let pipeline = gst::Pipeline::builder().name(name).build();
        Ok(Self {
            pipeline,
            source_tail: None,
            tee: None,
            compositor: None,
            input_selectors: Vec::new(),
            _stage: PhantomData,
        })
    }

    /// Builds the live camera source chain: device source -> videoconvert ->
    /// videoscale -> capsfilter, negotiated to `config.source`'s dimensions
    /// and framerate.
    pub fn with_source(self, config: &EngineConfig) -> Result<GraphBuilder<WithSource>, GraphError> {
        let src = match &config.source.device {
            Some(device) => {
                let el = make("v4l2src", "camera-source")?;
                el.set_property("device", device);
                el
            }
            None => make("videotestsrc", "camera-source")?,
        };
        let convert = make("videoconvert", "source-convert")?;
        let scale = make("videoscale", "source-scale")?;
        let capsfilter = make("capsfilter", "source-caps")?;
        let caps = gst::Caps::builder("video/x-raw")
            .field("width", config.source.width as i32)
            .field("height", config.source.height as i32)
            .field(
                "framerate",
                gst::Fraction::new(config.source.framerate as i32, 1),
            )
            .build();
        capsfilter.set_property("caps", &caps);

        self.pipeline
            .add_many([&src, &convert, &scale, &capsfilter])
            .map_err(|_| GraphError::ElementCreationFailed("failed to add source chain".into()))?;
        link(&src, &convert)?;
        link(&convert, &scale)?;
        link(&scale, &capsfilter)?;

        Ok(GraphBuilder {
            pipeline: self.pipeline,
            source_tail: Some(capsfilter),
            tee: None,
            compositor: None,
            input_selectors: Vec::new(),
            _stage: PhantomData,
        })
    }
}

impl GraphBuilder<WithSource> {
    /// Adds the `tee` that fans the live source out to a live-preview
    /// compositor cell and to every layer's record branches.
    pub fn with_tee(self) -> Result<GraphBuilder<WithTee>, GraphError> {
        let tee = make("tee", "source-tee")?;
        tee.set_property("allow-not-linked", true);
        self.pipeline
            .add(&tee)
            .map_err(|_| GraphError::ElementCreationFailed("failed to add tee".into()))?;
        let source_tail = self
            .source_tail
            .expect("WithSource stage always carries a source tail");
        link(&source_tail, &tee)?;

        Ok(GraphBuilder {
            pipeline: self.pipeline,
            source_tail: None,
            tee: Some(tee),
            compositor: None,
            input_selectors: Vec::new(),
            _stage: PhantomData,
        })
    }
}

impl GraphBuilder<WithTee> {
    /// Builds the compositor: one cell fed live from the tee, plus one cell
    /// per loop layer fed through that layer's dedicated `input-selector` —
    /// the element whose `active-pad` property is switched atomically
    /// whenever a layer's playback branch is replaced.
    pub fn with_compositor(
        self,
        layer_count: usize,
        grid: &GridLayout,
    ) -> Result<GraphBuilder<WithCompositor>, GraphError> {
        let tee = self.tee.clone().expect("WithTee stage always carries a tee");
        let compositor = make("compositor", "output-compositor")?;
        self.pipeline
            .add(&compositor)
            .map_err(|_| GraphError::ElementCreationFailed("failed to add compositor".into()))?;

        // Live-preview cell: tee -> queue -> videoconvert -> compositor pad.
        let live_queue = make("queue", "live-queue")?;
        let live_convert = make("videoconvert", "live-convert")?;
        self.pipeline
            .add_many([&live_queue, &live_convert])
            .map_err(|_| GraphError::ElementCreationFailed("failed to add live-preview chain".into()))?;
        link(&tee, &live_queue)?;
        link(&live_queue, &live_convert)?;

        let live_pad = compositor
            .request_pad_simple("sink_%u")
            .ok_or_else(|| GraphError::PadRequestFailed("compositor live pad".into()))?;
        live_convert
            .static_pad("src")
            .ok_or_else(|| GraphError::PadRequestFailed("live-convert src pad".into()))?
            .link(&live_pad)
            .map_err(|_| GraphError::PadLinkFailed("live-convert -> compositor".into()))?;
        set_cell_properties(&live_pad, &grid.live_cell);

        // One input-selector per loop layer, pre-wired to a fixed
        // compositor cell so replacing a layer's active branch never
        // requires re-linking the compositor itself.
        let mut input_selectors = Vec::with_capacity(layer_count);
        for layer in 0..layer_count {
            let selector = make("input-selector", &format!("selector-{layer}"))?;
            let selector_convert = make("videoconvert", &format!("selector-convert-{layer}"))?;
            self.pipeline
                .add_many([&selector, &selector_convert])
                .map_err(|_| GraphError::ElementCreationFailed("failed to add selector chain".into()))?;
            link(&selector, &selector_convert)?;

            let cell_pad = compositor
                .request_pad_simple("sink_%u")
                .ok_or_else(|| GraphError::PadRequestFailed(format!("compositor pad for layer {layer}")))?;
            selector_convert
                .static_pad("src")
                .ok_or_else(|| GraphError::PadRequestFailed(format!("selector-convert src pad for layer {layer}")))?
                .link(&cell_pad)
                .map_err(|_| GraphError::PadLinkFailed(format!("selector-convert -> compositor for layer {layer}")))?;
            set_cell_properties(&cell_pad, grid.cell_for_layer(layer as u8));

            input_selectors.push(selector);
        }

        Ok(GraphBuilder {
            pipeline: self.pipeline,
            source_tail: None,
            tee: Some(tee),
            compositor: Some(compositor),
            input_selectors,
            _stage: PhantomData,
        })
    }
}

impl GraphBuilder<WithCompositor> {
    /// Adds the final output sink and returns the completed [`GraphParts`].
    pub fn with_sink(self, sink_element: &str) -> Result<GraphParts, GraphError> {
        let compositor = self
            .compositor
            .clone()
            .expect("WithCompositor stage always carries a compositor");
        let sink = make(sink_element, "output-sink")?;
        self.pipeline
            .add(&sink)
            .map_err(|_| GraphError::ElementCreationFailed("failed to add output sink".into()))?;
        link(&compositor, &sink)?;

        Ok(GraphParts {
            pipeline: self.pipeline,
            tee: self.tee.expect("WithCompositor stage always carries a tee"),
            compositor,
            input_selectors: self.input_selectors,
        })
    }
}

fn set_cell_properties(pad: &gst::Pad, cell: &crate::config::Cell) {
    pad.set_property("xpos", cell.x);
    pad.set_property("ypos", cell.y);
    pad.set_property("width", cell.width);
    pad.set_property("height", cell.height);
    pad.set_property("zorder", cell.z_order);
    pad.set_property("alpha", cell.alpha);
}
