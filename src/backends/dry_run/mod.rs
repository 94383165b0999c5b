// SPDX-License-Identifier: GPL-3.0-only

//! In-process media engine that validates without running anything
//!
//! The dry-run engine models what the topology depends on: an element
//! catalog with typed properties, caps parsing and intersection, pad
//! availability, single-parent bin membership and element state. Every call
//! is appended to an operation log, which `simulate` prints and the tests
//! count.
//!
//! Like a bin in a real framework, a pipeline keeps its children alive: an
//! element is forgotten once its last handle is gone and it has no parent,
//! or when the pipeline holding it is dropped.

pub mod caps;
pub mod catalog;
pub mod server;

pub use caps::Caps;
pub use server::DryRunServer;

use super::{ElementState, EngineError, EngineResult, MediaEngine};
use crate::constants::naming;
use catalog::{ElementSpec, SrcPads};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::trace;

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

fn next_serial() -> u64 {
    NEXT_SERIAL.fetch_add(1, Ordering::Relaxed)
}

type SharedState = Arc<Mutex<EngineState>>;

#[derive(Debug)]
struct ElementKey {
    serial: u64,
    name: String,
    spec: &'static ElementSpec,
    state: Weak<Mutex<EngineState>>,
}

impl Drop for ElementKey {
    fn drop(&mut self) {
        let Some(state) = self.state.upgrade() else {
            return;
        };
        let Ok(mut state) = state.lock() else {
            return;
        };
        state.release_handle(self.serial);
    }
}

/// Element handle; equality is identity
#[derive(Clone)]
pub struct DryElement(Arc<ElementKey>);

impl DryElement {
    /// Name the element was created with
    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn type_name(&self) -> &'static str {
        self.0.spec.type_name
    }
}

impl PartialEq for DryElement {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for DryElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DryElement({}:{})", self.0.name, self.0.spec.type_name)
    }
}

#[derive(Debug)]
struct PipelineKey {
    serial: u64,
    name: String,
    state: Weak<Mutex<EngineState>>,
}

impl Drop for PipelineKey {
    fn drop(&mut self) {
        let Some(state) = self.state.upgrade() else {
            return;
        };
        let Ok(mut state) = state.lock() else {
            return;
        };
        state.forget_pipeline(self.serial);
    }
}

/// Pipeline handle; equality is identity
#[derive(Clone)]
pub struct DryPipeline(Arc<PipelineKey>);

impl DryPipeline {
    pub fn name(&self) -> &str {
        &self.0.name
    }
}

impl PartialEq for DryPipeline {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for DryPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DryPipeline({}#{})", self.0.name, self.0.serial)
    }
}

/// A requested source pad
#[derive(Debug)]
pub struct DryPad {
    element: u64,
    name: String,
}

impl DryPad {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// One recorded engine call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineOp {
    MakeElement { name: String, type_name: String },
    SetProperty { element: String, key: String, value: String },
    AssignCaps { element: String, caps: String },
    MakePipeline { name: String },
    AddToPipeline { pipeline: String, element: String },
    RemoveFromPipeline { pipeline: String, element: String },
    Link { src: String, dst: String },
    RequestPad { element: String, pad: String },
    LinkPad { element: String, pad: String, dst: String },
    ReleasePad { element: String, pad: String },
    Unlink { src: String, dst: String },
    SetElementState { element: String, state: ElementState },
    SyncStateWithParent { element: String, state: ElementState },
    SetPipelineState { pipeline: String, state: ElementState },
}

impl fmt::Display for EngineOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineOp::MakeElement { name, type_name } => write!(f, "make {} ({})", name, type_name),
            EngineOp::SetProperty { element, key, value } => {
                write!(f, "set {}.{}={}", element, key, value)
            }
            EngineOp::AssignCaps { element, caps } => write!(f, "caps {} <- {}", element, caps),
            EngineOp::MakePipeline { name } => write!(f, "pipeline {}", name),
            EngineOp::AddToPipeline { pipeline, element } => write!(f, "add {} to {}", element, pipeline),
            EngineOp::RemoveFromPipeline { pipeline, element } => {
                write!(f, "remove {} from {}", element, pipeline)
            }
            EngineOp::Link { src, dst } => write!(f, "link {} -> {}", src, dst),
            EngineOp::RequestPad { element, pad } => write!(f, "request {}.{}", element, pad),
            EngineOp::LinkPad { element, pad, dst } => write!(f, "link {}.{} -> {}", element, pad, dst),
            EngineOp::ReleasePad { element, pad } => write!(f, "release {}.{}", element, pad),
            EngineOp::Unlink { src, dst } => write!(f, "unlink {} -> {}", src, dst),
            EngineOp::SetElementState { element, state } => write!(f, "state {} {}", element, state),
            EngineOp::SyncStateWithParent { element, state } => {
                write!(f, "sync {} ({})", element, state)
            }
            EngineOp::SetPipelineState { pipeline, state } => write!(f, "state {} {}", pipeline, state),
        }
    }
}

#[derive(Debug)]
struct ElementData {
    name: String,
    spec: &'static ElementSpec,
    properties: BTreeMap<String, String>,
    caps: Option<Caps>,
    parent: Option<u64>,
    state: ElementState,
    /// Downstream peers keyed by source pad name
    src_links: BTreeMap<String, u64>,
    /// Request pads handed out and not released
    request_pads: Vec<String>,
    next_pad: u32,
    sink_peer: Option<u64>,
    /// Every handle is gone; only the parent keeps it alive
    orphaned: bool,
}

impl ElementData {
    fn output_caps(&self) -> Option<Caps> {
        let template = self.spec.src_format()?.caps();
        Some(match &self.caps {
            Some(constraint) => template.intersect(constraint).unwrap_or_else(|| constraint.clone()),
            None => template,
        })
    }

    fn input_caps(&self) -> Option<Caps> {
        let format = self.spec.sink?;
        let template = format.caps();
        Some(match (&self.caps, format) {
            (Some(constraint), catalog::Format::Any) => constraint.clone(),
            _ => template,
        })
    }
}

#[derive(Debug)]
struct PipelineData {
    name: String,
    state: ElementState,
    children: Vec<u64>,
}

#[derive(Debug, Default)]
struct EngineState {
    elements: HashMap<u64, ElementData>,
    pipelines: HashMap<u64, PipelineData>,
    operations: Vec<EngineOp>,
}

impl EngineState {
    fn element(&self, serial: u64) -> &ElementData {
        &self.elements[&serial]
    }

    fn element_mut(&mut self, serial: u64) -> &mut ElementData {
        self.elements
            .get_mut(&serial)
            .unwrap_or_else(|| panic!("dry-run element #{} is not registered", serial))
    }

    fn element_name(&self, serial: u64) -> String {
        self.elements
            .get(&serial)
            .map(|data| data.name.clone())
            .unwrap_or_else(|| format!("#{}", serial))
    }

    fn pipeline_name(&self, serial: u64) -> String {
        self.pipelines
            .get(&serial)
            .map(|data| data.name.clone())
            .unwrap_or_else(|| format!("#{}", serial))
    }

    /// Checks shared by element and pad links
    fn check_link(
        &self,
        src: u64,
        dst: u64,
        filter: Option<&Caps>,
        via_request_pad: bool,
    ) -> EngineResult<()> {
        let src_data = self.element(src);
        let dst_data = self.element(dst);

        match (src_data.parent, dst_data.parent) {
            (Some(a), Some(b)) if a == b => {}
            (None, _) | (_, None) => {
                return Err(EngineError::NotLinkable(
                    "both elements must be in a pipeline".to_string(),
                ));
            }
            _ => {
                return Err(EngineError::NotLinkable(
                    "elements are in different pipelines".to_string(),
                ));
            }
        }

        match src_data.spec.src {
            SrcPads::None => {
                return Err(EngineError::NotLinkable(format!(
                    "{} has no source pad",
                    src_data.spec.type_name
                )));
            }
            SrcPads::Always(_) if !src_data.src_links.is_empty() && !via_request_pad => {
                return Err(EngineError::NotLinkable("source pad is already linked".to_string()));
            }
            _ => {}
        }

        if dst_data.spec.sink.is_none() {
            return Err(EngineError::NotLinkable(format!(
                "{} has no sink pad",
                dst_data.spec.type_name
            )));
        }
        if dst_data.sink_peer.is_some() {
            return Err(EngineError::NotLinkable("sink pad is already linked".to_string()));
        }

        let output = src_data.output_caps().unwrap_or_default();
        let input = dst_data.input_caps().unwrap_or_default();
        let compatible = match filter {
            Some(filter) => output
                .intersect(filter)
                .is_some_and(|narrowed| narrowed.can_intersect(&input)),
            None => output.can_intersect(&input),
        };
        if !compatible {
            return Err(EngineError::IncompatibleFormats);
        }
        Ok(())
    }

    fn connect(&mut self, src: u64, pad: String, dst: u64) {
        self.element_mut(src).src_links.insert(pad, dst);
        self.element_mut(dst).sink_peer = Some(src);
    }

    fn disconnect(&mut self, src: u64, dst: u64) -> bool {
        let src_data = self.element_mut(src);
        let Some(pad) = src_data
            .src_links
            .iter()
            .find(|(_, peer)| **peer == dst)
            .map(|(pad, _)| pad.clone())
        else {
            return false;
        };
        src_data.src_links.remove(&pad);
        let released = src_data.spec.is_splitter();
        if released {
            src_data.request_pads.retain(|p| *p != pad);
        }
        self.element_mut(dst).sink_peer = None;
        if released {
            let element = self.element_name(src);
            self.operations.push(EngineOp::ReleasePad { element, pad });
        }
        true
    }

    /// The last handle to an element was dropped
    fn release_handle(&mut self, serial: u64) {
        let Some(data) = self.elements.get_mut(&serial) else {
            return;
        };
        if data.parent.is_some() {
            data.orphaned = true;
        } else {
            self.forget_element(serial);
        }
    }

    fn forget_element(&mut self, serial: u64) {
        let downstream: Vec<u64> = match self.elements.get(&serial) {
            Some(data) => data.src_links.values().copied().collect(),
            None => return,
        };
        for peer in downstream {
            self.disconnect(serial, peer);
        }
        if let Some(upstream) = self.elements.get(&serial).and_then(|data| data.sink_peer)
            && self.elements.contains_key(&upstream)
        {
            self.disconnect(upstream, serial);
        }
        if let Some(data) = self.elements.remove(&serial)
            && let Some(parent) = data.parent
            && let Some(pipeline) = self.pipelines.get_mut(&parent)
        {
            pipeline.children.retain(|child| *child != serial);
        }
    }

    /// A dropped pipeline unparents its children and frees the orphaned ones
    fn forget_pipeline(&mut self, serial: u64) {
        let Some(pipeline) = self.pipelines.remove(&serial) else {
            return;
        };
        for child in pipeline.children {
            let orphaned = match self.elements.get_mut(&child) {
                Some(data) => {
                    data.parent = None;
                    data.orphaned
                }
                None => continue,
            };
            if orphaned {
                self.forget_element(child);
            }
        }
    }
}

/// The dry-run engine
#[derive(Debug, Default)]
pub struct DryRunEngine {
    state: SharedState,
}

impl DryRunEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// All calls recorded so far, oldest first
    pub fn operations(&self) -> Vec<EngineOp> {
        self.state.lock().unwrap().operations.clone()
    }

    /// Number of recorded calls matching `predicate`
    pub fn count_operations(&self, predicate: impl Fn(&EngineOp) -> bool) -> usize {
        self.state
            .lock()
            .unwrap()
            .operations
            .iter()
            .filter(|op| predicate(op))
            .count()
    }

    pub fn clear_operations(&self) {
        self.state.lock().unwrap().operations.clear();
    }

    /// Elements still alive, either held by a handle or by a pipeline
    pub fn element_count(&self) -> usize {
        self.state.lock().unwrap().elements.len()
    }

    pub fn element_state(&self, element: &DryElement) -> ElementState {
        self.state.lock().unwrap().element(element.0.serial).state
    }

    /// Name of the pipeline the element belongs to
    pub fn parent_of(&self, element: &DryElement) -> Option<String> {
        let state = self.state.lock().unwrap();
        state
            .element(element.0.serial)
            .parent
            .map(|serial| state.pipeline_name(serial))
    }

    /// Normalised value of a property that was set
    pub fn property(&self, element: &DryElement, key: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .element(element.0.serial)
            .properties
            .get(key)
            .cloned()
    }

    /// Format constraint currently applied to the element
    pub fn element_caps(&self, element: &DryElement) -> Option<Caps> {
        self.state.lock().unwrap().element(element.0.serial).caps.clone()
    }

    pub fn is_linked(&self, src: &DryElement, dst: &DryElement) -> bool {
        self.state
            .lock()
            .unwrap()
            .element(src.0.serial)
            .src_links
            .values()
            .any(|peer| *peer == dst.0.serial)
    }

    /// Request pads currently held by the element
    pub fn request_pads(&self, element: &DryElement) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .element(element.0.serial)
            .request_pads
            .clone()
    }

    pub fn pipeline_state(&self, pipeline: &DryPipeline) -> ElementState {
        self.state.lock().unwrap().pipelines[&pipeline.0.serial].state
    }

    /// Names of the elements in a pipeline, in insertion order
    pub fn children(&self, pipeline: &DryPipeline) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.pipelines[&pipeline.0.serial]
            .children
            .iter()
            .map(|serial| state.element_name(*serial))
            .collect()
    }
}

impl MediaEngine for DryRunEngine {
    type Element = DryElement;
    type Pipeline = DryPipeline;
    type Caps = Caps;
    type Pad = DryPad;

    fn backend_name(&self) -> &'static str {
        "dry-run"
    }

    fn make_element(&self, name: &str, type_name: &str) -> EngineResult<DryElement> {
        let spec = catalog::lookup(type_name)
            .ok_or_else(|| EngineError::NoSuchFactory(type_name.to_string()))?;
        let serial = next_serial();
        let mut state = self.state.lock().unwrap();
        state.elements.insert(
            serial,
            ElementData {
                name: name.to_string(),
                spec,
                properties: BTreeMap::new(),
                caps: None,
                parent: None,
                state: ElementState::Null,
                src_links: BTreeMap::new(),
                request_pads: Vec::new(),
                next_pad: 0,
                sink_peer: None,
                orphaned: false,
            },
        );
        state.operations.push(EngineOp::MakeElement {
            name: name.to_string(),
            type_name: type_name.to_string(),
        });
        trace!(element = %name, element_type = %type_name, "dry-run: element created");
        Ok(DryElement(Arc::new(ElementKey {
            serial,
            name: name.to_string(),
            spec,
            state: Arc::downgrade(&self.state),
        })))
    }

    fn set_property(&self, element: &DryElement, key: &str, value: &str) -> EngineResult<()> {
        let kind = element
            .0
            .spec
            .property(key)
            .ok_or_else(|| EngineError::NoSuchProperty(key.to_string()))?;
        let normalised = catalog::coerce(kind, value).map_err(|reason| EngineError::InvalidValue {
            property: key.to_string(),
            reason,
        })?;

        let mut state = self.state.lock().unwrap();
        let data = state.element_mut(element.0.serial);
        if kind == catalog::PropKind::Caps {
            data.caps = normalised.parse().ok();
        }
        if key == "name" {
            data.name = normalised.clone();
        }
        data.properties.insert(key.to_string(), normalised.clone());
        state.operations.push(EngineOp::SetProperty {
            element: element.name().to_string(),
            key: key.to_string(),
            value: normalised,
        });
        Ok(())
    }

    fn is_splitter(&self, element: &DryElement) -> bool {
        element.0.spec.is_splitter()
    }

    fn parse_caps(&self, expression: &str) -> EngineResult<Caps> {
        expression.parse().map_err(EngineError::InvalidCaps)
    }

    fn assign_caps(&self, element: &DryElement, caps: &Caps) -> EngineResult<()> {
        if element.0.spec.property(naming::CAPS_PROPERTY).is_none() {
            return Err(EngineError::NoSuchProperty(naming::CAPS_PROPERTY.to_string()));
        }
        let mut state = self.state.lock().unwrap();
        let data = state.element_mut(element.0.serial);
        data.caps = Some(caps.clone());
        data.properties.insert(naming::CAPS_PROPERTY.to_string(), caps.to_string());
        state.operations.push(EngineOp::AssignCaps {
            element: element.name().to_string(),
            caps: caps.to_string(),
        });
        Ok(())
    }

    fn make_pipeline(&self, name: &str) -> EngineResult<DryPipeline> {
        let serial = next_serial();
        let mut state = self.state.lock().unwrap();
        state.pipelines.insert(
            serial,
            PipelineData {
                name: name.to_string(),
                state: ElementState::Null,
                children: Vec::new(),
            },
        );
        state.operations.push(EngineOp::MakePipeline {
            name: name.to_string(),
        });
        Ok(DryPipeline(Arc::new(PipelineKey {
            serial,
            name: name.to_string(),
            state: Arc::downgrade(&self.state),
        })))
    }

    fn add_to_pipeline(&self, pipeline: &DryPipeline, element: &DryElement) -> EngineResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(parent) = state.element(element.0.serial).parent {
            return Err(EngineError::AlreadyParented(state.pipeline_name(parent)));
        }
        state.element_mut(element.0.serial).parent = Some(pipeline.0.serial);
        if let Some(data) = state.pipelines.get_mut(&pipeline.0.serial) {
            data.children.push(element.0.serial);
        }
        state.operations.push(EngineOp::AddToPipeline {
            pipeline: pipeline.name().to_string(),
            element: element.name().to_string(),
        });
        Ok(())
    }

    fn remove_from_pipeline(&self, pipeline: &DryPipeline, element: &DryElement) -> EngineResult<()> {
        let mut state = self.state.lock().unwrap();
        let serial = element.0.serial;
        if state.element(serial).parent != Some(pipeline.0.serial) {
            return Err(EngineError::NotParented(format!(
                "{} is not in {}",
                element.name(),
                pipeline.name()
            )));
        }

        // Removing from a bin unlinks every pad
        let downstream: Vec<u64> = state.element(serial).src_links.values().copied().collect();
        for peer in downstream {
            state.disconnect(serial, peer);
        }
        if let Some(upstream) = state.element(serial).sink_peer {
            state.disconnect(upstream, serial);
        }

        state.element_mut(serial).parent = None;
        if let Some(data) = state.pipelines.get_mut(&pipeline.0.serial) {
            data.children.retain(|child| *child != serial);
        }
        state.operations.push(EngineOp::RemoveFromPipeline {
            pipeline: pipeline.name().to_string(),
            element: element.name().to_string(),
        });
        Ok(())
    }

    fn link(&self, src: &DryElement, dst: &DryElement, filter: Option<&Caps>) -> EngineResult<()> {
        let mut state = self.state.lock().unwrap();
        let (src_serial, dst_serial) = (src.0.serial, dst.0.serial);
        state.check_link(src_serial, dst_serial, filter, false)?;

        let pad = if src.0.spec.is_splitter() {
            let data = state.element_mut(src_serial);
            let pad = format!("src_{}", data.next_pad);
            data.next_pad += 1;
            data.request_pads.push(pad.clone());
            pad
        } else {
            "src".to_string()
        };
        state.connect(src_serial, pad, dst_serial);
        state.operations.push(EngineOp::Link {
            src: src.name().to_string(),
            dst: dst.name().to_string(),
        });
        Ok(())
    }

    fn unlink(&self, src: &DryElement, dst: &DryElement) {
        let mut state = self.state.lock().unwrap();
        if state.disconnect(src.0.serial, dst.0.serial) {
            state.operations.push(EngineOp::Unlink {
                src: src.name().to_string(),
                dst: dst.name().to_string(),
            });
        }
    }

    fn request_src_pad(&self, element: &DryElement) -> EngineResult<DryPad> {
        if !element.0.spec.is_splitter() {
            return Err(EngineError::NoPadTemplate);
        }
        let mut state = self.state.lock().unwrap();
        let data = state.element_mut(element.0.serial);
        let name = format!("src_{}", data.next_pad);
        data.next_pad += 1;
        data.request_pads.push(name.clone());
        state.operations.push(EngineOp::RequestPad {
            element: element.name().to_string(),
            pad: name.clone(),
        });
        Ok(DryPad {
            element: element.0.serial,
            name,
        })
    }

    fn link_pad(&self, pad: &DryPad, dst: &DryElement) -> EngineResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.element(pad.element).src_links.contains_key(&pad.name) {
            return Err(EngineError::NotLinkable(format!("{} is already linked", pad.name)));
        }
        state.check_link(pad.element, dst.0.serial, None, true)?;
        state.connect(pad.element, pad.name.clone(), dst.0.serial);
        let element = state.element_name(pad.element);
        state.operations.push(EngineOp::LinkPad {
            element,
            pad: pad.name.clone(),
            dst: dst.name().to_string(),
        });
        Ok(())
    }

    fn release_src_pad(&self, element: &DryElement, pad: DryPad) {
        let mut state = self.state.lock().unwrap();
        let data = state.element_mut(element.0.serial);
        data.request_pads.retain(|p| *p != pad.name);
        data.src_links.remove(&pad.name);
        state.operations.push(EngineOp::ReleasePad {
            element: element.name().to_string(),
            pad: pad.name,
        });
    }

    fn set_element_state(&self, element: &DryElement, target: ElementState) -> EngineResult<()> {
        let mut state = self.state.lock().unwrap();
        state.element_mut(element.0.serial).state = target;
        state.operations.push(EngineOp::SetElementState {
            element: element.name().to_string(),
            state: target,
        });
        Ok(())
    }

    fn sync_state_with_parent(&self, element: &DryElement) -> EngineResult<()> {
        let mut state = self.state.lock().unwrap();
        let parent = state.element(element.0.serial).parent.ok_or_else(|| {
            EngineError::StateChange(format!("{} has no parent", element.name()))
        })?;
        let target = state.pipelines[&parent].state;
        state.element_mut(element.0.serial).state = target;
        state.operations.push(EngineOp::SyncStateWithParent {
            element: element.name().to_string(),
            state: target,
        });
        Ok(())
    }

    fn set_pipeline_state(&self, pipeline: &DryPipeline, target: ElementState) -> EngineResult<()> {
        let mut state = self.state.lock().unwrap();
        let children = match state.pipelines.get_mut(&pipeline.0.serial) {
            Some(data) => {
                data.state = target;
                data.children.clone()
            }
            None => return Err(EngineError::StateChange(format!("unknown pipeline {}", pipeline.name()))),
        };
        for child in children {
            state.element_mut(child).state = target;
        }
        state.operations.push(EngineOp::SetPipelineState {
            pipeline: pipeline.name().to_string(),
            state: target,
        });
        Ok(())
    }
}
