// SPDX-License-Identifier: GPL-3.0-only

//! Media engine and serving-layer abstraction
//!
//! The topology never talks to a media framework directly. Everything it
//! needs from one (creating elements, coercing properties, parsing caps,
//! bin membership, linking, state) goes through [`MediaEngine`], and the
//! streaming bridge talks to the RTSP serving layer through [`MediaServer`]
//! and [`MediaFactory`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐      ┌──────────────────────┐
//! │  Topology (graph)   │      │  RtspServer (bridge) │
//! └──────────┬──────────┘      └───────┬───────┬──────┘
//!            │                         │       │ MediaFactory
//!            ▼                         ▼       ▼
//! ┌─────────────────────┐      ┌──────────────────────┐
//! │  MediaEngine trait  │      │  MediaServer trait   │
//! └──────────┬──────────┘      └──────────┬───────────┘
//!            │                            │
//!     ┌──────┴──────┐              ┌──────┴──────┐
//!     ▼             ▼              ▼             ▼
//! ┌────────┐   ┌─────────┐    ┌────────┐   ┌─────────┐
//! │ DryRun │   │GStreamer│    │ DryRun │   │GStreamer│
//! └────────┘   └─────────┘    └────────┘   └─────────┘
//! ```

pub mod dry_run;
#[cfg(feature = "gst")]
pub mod gst;
pub mod types;

pub use types::*;

use crate::errors::TopologyResult;
use std::fmt::Debug;
use std::sync::Arc;

/// Capabilities the topology requires from a media engine
///
/// Handles are cheap reference-counted values owned by the engine; the
/// topology keeps them in its registries and hands them back on every call.
pub trait MediaEngine: Send + Sync + 'static {
    /// A processing element
    type Element: Clone + Debug + Send + Sync + 'static;
    /// An independently schedulable container of elements
    type Pipeline: Clone + PartialEq + Debug + Send + Sync + 'static;
    /// A parsed format constraint
    type Caps: Clone + PartialEq + Debug + Send + Sync + 'static;
    /// A requested output pad
    type Pad: Debug + Send + Sync + 'static;

    /// Short backend identifier for logs
    fn backend_name(&self) -> &'static str;

    // ===== Elements =====

    /// Instantiate an element of `type_name` named `name`
    fn make_element(&self, name: &str, type_name: &str) -> EngineResult<Self::Element>;

    /// Apply a string value to a property, coercing it to the property type
    fn set_property(&self, element: &Self::Element, key: &str, value: &str) -> EngineResult<()>;

    /// Whether the element hands out request source pads (tee-like)
    fn is_splitter(&self, element: &Self::Element) -> bool;

    // ===== Caps =====

    /// Parse a caps expression
    fn parse_caps(&self, expression: &str) -> EngineResult<Self::Caps>;

    /// Constrain an element to (a copy of) `caps`
    fn assign_caps(&self, element: &Self::Element, caps: &Self::Caps) -> EngineResult<()>;

    // ===== Pipelines =====

    fn make_pipeline(&self, name: &str) -> EngineResult<Self::Pipeline>;

    /// Add an element to a pipeline; fails if it already has a parent
    fn add_to_pipeline(
        &self,
        pipeline: &Self::Pipeline,
        element: &Self::Element,
    ) -> EngineResult<()>;

    /// Remove an element from a pipeline, unlinking all of its pads
    fn remove_from_pipeline(
        &self,
        pipeline: &Self::Pipeline,
        element: &Self::Element,
    ) -> EngineResult<()>;

    // ===== Linking =====

    /// Link `src` to `dst`, optionally forcing the negotiated format
    fn link(
        &self,
        src: &Self::Element,
        dst: &Self::Element,
        filter: Option<&Self::Caps>,
    ) -> EngineResult<()>;

    /// Undo a link, releasing a request pad on `src` if one was used
    fn unlink(&self, src: &Self::Element, dst: &Self::Element);

    /// Request a new source pad from a splitter
    fn request_src_pad(&self, element: &Self::Element) -> EngineResult<Self::Pad>;

    /// Link a requested pad to the fixed input of `dst`
    fn link_pad(&self, pad: &Self::Pad, dst: &Self::Element) -> EngineResult<()>;

    /// Hand a requested pad back to its element
    fn release_src_pad(&self, element: &Self::Element, pad: Self::Pad);

    // ===== State =====

    fn set_element_state(&self, element: &Self::Element, state: ElementState)
    -> EngineResult<()>;

    /// Bring an element to the state of the pipeline it was added to
    fn sync_state_with_parent(&self, element: &Self::Element) -> EngineResult<()>;

    fn set_pipeline_state(
        &self,
        pipeline: &Self::Pipeline,
        state: ElementState,
    ) -> EngineResult<()>;
}

/// Strategy the serving layer consults when a viewer requests a path
///
/// Implemented by the streaming bridge and injected into the serving layer
/// at mount time.
pub trait MediaFactory<E: MediaEngine>: Send + Sync {
    /// The servable pipeline behind `path`
    fn resolve_pipeline(&self, path: &str) -> TopologyResult<E::Pipeline>;

    /// The concrete running instance for `path`, built on first request and
    /// shared afterwards
    fn materialize_pipeline(&self, path: &str) -> TopologyResult<E::Pipeline>;

    /// Notification that the instance serving `path` changed state
    fn media_state_changed(&self, path: &str, state: MediaState);
}

/// The external streaming server the bridge exposes pipelines through
pub trait MediaServer<E: MediaEngine>: Send + Sync {
    /// Route requests for `path` to `factory`
    fn mount(&self, path: &str, factory: Arc<dyn MediaFactory<E>>) -> TopologyResult<()>;

    /// Remove a route
    fn unmount(&self, path: &str);

    /// Begin accepting viewers
    fn start(&self) -> TopologyResult<()>;

    /// Drop expired viewer sessions, returning how many were removed
    fn cleanup_sessions(&self) -> usize;

    /// Stop accepting viewers and release the server's event loop
    fn stop(&self);
}
