// SPDX-License-Identifier: GPL-3.0-only

//! GStreamer implementation of the engine and serving-layer traits
//!
//! Enabled with the `gst` cargo feature. Elements, pipelines, caps and pads
//! map one-to-one onto their GStreamer objects; property strings go through
//! GStreamer's own value deserialisation, so enum nicks, booleans, numbers
//! and caps all accept what `gst-launch-1.0` accepts.

pub mod bus;
pub mod server;

pub use server::GstRtspServer;

use super::{ElementState, EngineError, EngineResult, MediaEngine};
use crate::constants::naming;
use gstreamer as gst;
use gstreamer::glib;
use gstreamer::prelude::*;
use std::str::FromStr;
use tracing::{debug, info};

impl From<ElementState> for gst::State {
    fn from(state: ElementState) -> Self {
        match state {
            ElementState::Null => gst::State::Null,
            ElementState::Ready => gst::State::Ready,
            ElementState::Paused => gst::State::Paused,
            ElementState::Playing => gst::State::Playing,
        }
    }
}

impl From<gst::State> for ElementState {
    fn from(state: gst::State) -> Self {
        match state {
            gst::State::Ready => ElementState::Ready,
            gst::State::Paused => ElementState::Paused,
            gst::State::Playing => ElementState::Playing,
            _ => ElementState::Null,
        }
    }
}

/// Engine backed by the GStreamer runtime
#[derive(Debug)]
pub struct GstEngine {
    _private: (),
}

impl GstEngine {
    /// Initialise GStreamer
    ///
    /// Unless `GST_DEBUG` is set, GStreamer's own log threshold is lowered to
    /// warnings so its output does not drown the application log.
    pub fn init() -> EngineResult<Self> {
        if std::env::var_os("GST_DEBUG").is_none() {
            gst::log::set_default_threshold(gst::DebugLevel::Warning);
        }
        gst::init().map_err(|e| EngineError::Other(format!("failed to initialize GStreamer: {}", e)))?;
        info!(version = %gst::version_string(), "GStreamer initialized");
        Ok(Self { _private: () })
    }

    /// Classify a failed element link after the fact
    fn link_failure(src: &gst::Element, dst: &gst::Element, filter: Option<&gst::Caps>) -> EngineError {
        let (Some(src_parent), Some(dst_parent)) = (src.parent(), dst.parent()) else {
            return EngineError::NotLinkable("both elements must be in a pipeline".to_string());
        };
        if src_parent != dst_parent {
            return EngineError::NotLinkable("elements are in different pipelines".to_string());
        }

        let Some(sink_pad) = dst.static_pad("sink") else {
            return EngineError::NotLinkable(format!("{} has no sink pad", dst.name()));
        };
        if sink_pad.is_linked() {
            return EngineError::NotLinkable("sink pad is already linked".to_string());
        }
        let Some(src_pad) = src.static_pad("src") else {
            return EngineError::NotLinkable(format!("{} has no free source pad", src.name()));
        };
        if src_pad.is_linked() {
            return EngineError::NotLinkable("source pad is already linked".to_string());
        }

        let output = src_pad.query_caps(filter);
        if !output.can_intersect(&sink_pad.query_caps(None)) {
            return EngineError::IncompatibleFormats;
        }
        EngineError::NotLinkable(format!("cannot link {} to {}", src.name(), dst.name()))
    }
}

impl MediaEngine for GstEngine {
    type Element = gst::Element;
    type Pipeline = gst::Pipeline;
    type Caps = gst::Caps;
    type Pad = gst::Pad;

    fn backend_name(&self) -> &'static str {
        "gstreamer"
    }

    fn make_element(&self, name: &str, type_name: &str) -> EngineResult<gst::Element> {
        gst::ElementFactory::make(type_name)
            .name(name)
            .build()
            .map_err(|_| EngineError::NoSuchFactory(type_name.to_string()))
    }

    fn set_property(&self, element: &gst::Element, key: &str, value: &str) -> EngineResult<()> {
        let pspec = element
            .find_property(key)
            .ok_or_else(|| EngineError::NoSuchProperty(key.to_string()))?;
        if !pspec.flags().contains(glib::ParamFlags::WRITABLE) {
            return Err(EngineError::InvalidValue {
                property: key.to_string(),
                reason: "property is read-only".to_string(),
            });
        }
        let parsed = glib::Value::deserialize(value, pspec.value_type()).map_err(|e| {
            EngineError::InvalidValue {
                property: key.to_string(),
                reason: e.to_string(),
            }
        })?;
        element.set_property_from_value(key, &parsed);
        debug!(element = %element.name(), property = key, value, "Property set");
        Ok(())
    }

    fn is_splitter(&self, element: &gst::Element) -> bool {
        element.pad_template_list().iter().any(|template| {
            template.direction() == gst::PadDirection::Src
                && template.presence() == gst::PadPresence::Request
        })
    }

    fn parse_caps(&self, expression: &str) -> EngineResult<gst::Caps> {
        gst::Caps::from_str(expression).map_err(|e| EngineError::InvalidCaps(e.to_string()))
    }

    fn assign_caps(&self, element: &gst::Element, caps: &gst::Caps) -> EngineResult<()> {
        if element.find_property(naming::CAPS_PROPERTY).is_none() {
            return Err(EngineError::NoSuchProperty(naming::CAPS_PROPERTY.to_string()));
        }
        element.set_property(naming::CAPS_PROPERTY, caps.copy());
        Ok(())
    }

    fn make_pipeline(&self, name: &str) -> EngineResult<gst::Pipeline> {
        Ok(gst::Pipeline::with_name(name))
    }

    fn add_to_pipeline(&self, pipeline: &gst::Pipeline, element: &gst::Element) -> EngineResult<()> {
        if let Some(parent) = element.parent() {
            return Err(EngineError::AlreadyParented(parent.name().to_string()));
        }
        pipeline
            .add(element)
            .map_err(|e| EngineError::Other(e.to_string()))
    }

    fn remove_from_pipeline(&self, pipeline: &gst::Pipeline, element: &gst::Element) -> EngineResult<()> {
        pipeline
            .remove(element)
            .map_err(|e| EngineError::NotParented(e.to_string()))
    }

    fn link(&self, src: &gst::Element, dst: &gst::Element, filter: Option<&gst::Caps>) -> EngineResult<()> {
        let linked = match filter {
            Some(caps) => src.link_filtered(dst, caps),
            None => src.link(dst),
        };
        linked.map_err(|_| Self::link_failure(src, dst, filter))
    }

    fn unlink(&self, src: &gst::Element, dst: &gst::Element) {
        for pad in src.src_pads() {
            let Some(peer) = pad.peer() else {
                continue;
            };
            if peer.parent_element().as_ref() != Some(dst) {
                continue;
            }
            let _ = pad.unlink(&peer);
            let requested = pad
                .pad_template()
                .is_some_and(|template| template.presence() == gst::PadPresence::Request);
            if requested {
                src.release_request_pad(&pad);
            }
        }
    }

    fn request_src_pad(&self, element: &gst::Element) -> EngineResult<gst::Pad> {
        element
            .request_pad_simple("src_%u")
            .ok_or(EngineError::NoPadTemplate)
    }

    fn link_pad(&self, pad: &gst::Pad, dst: &gst::Element) -> EngineResult<()> {
        let sink = dst
            .static_pad("sink")
            .ok_or_else(|| EngineError::NotLinkable(format!("{} has no sink pad", dst.name())))?;
        pad.link(&sink).map(|_| ()).map_err(|e| match e {
            gst::PadLinkError::Noformat => EngineError::IncompatibleFormats,
            other => EngineError::NotLinkable(format!("{:?}", other)),
        })
    }

    fn release_src_pad(&self, element: &gst::Element, pad: gst::Pad) {
        element.release_request_pad(&pad);
    }

    fn set_element_state(&self, element: &gst::Element, state: ElementState) -> EngineResult<()> {
        element
            .set_state(state.into())
            .map(|_| ())
            .map_err(|e| EngineError::StateChange(e.to_string()))
    }

    fn sync_state_with_parent(&self, element: &gst::Element) -> EngineResult<()> {
        element
            .sync_state_with_parent()
            .map_err(|e| EngineError::StateChange(e.to_string()))
    }

    fn set_pipeline_state(&self, pipeline: &gst::Pipeline, state: ElementState) -> EngineResult<()> {
        pipeline
            .set_state(state.into())
            .map(|_| ())
            .map_err(|e| EngineError::StateChange(e.to_string()))
    }
}
