// SPDX-License-Identifier: GPL-3.0-only

//! Named processing graph
//!
//! [`Topology`] owns every node, cap, pipeline and gateway tunnel by name and
//! validates each operation against its registries before touching the
//! engine. The implementation is split by concern:
//!
//! - `nodes`: node registry
//! - `caps`: capability registry
//! - `graph`: pipelines, bin membership and links
//! - `fanout`: request-pad links out of splitters
//! - `gateway`: cross-pipeline tunnels
//! - `snapshot`: comparable structural view

mod caps;
mod fanout;
mod gateway;
mod graph;
mod nodes;
mod snapshot;

pub use caps::Capability;
pub use gateway::{AttachMode, Connection, Tunnel};
pub use graph::{Edge, PipelineEntry};
pub use nodes::Node;
pub use snapshot::{NodeSnapshot, PipelineSnapshot, TopologySnapshot};

use crate::backends::{ElementState, EngineError, MediaEngine};
use crate::constants::gateway::DEFAULT_MAX_TUNNELS;
use crate::errors::TopologyError;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

/// The media graph
pub struct Topology<E: MediaEngine> {
    engine: Arc<E>,
    nodes: BTreeMap<String, Node<E>>,
    caps: BTreeMap<String, Capability<E>>,
    pipelines: BTreeMap<String, PipelineEntry<E>>,
    tunnels: BTreeMap<String, Tunnel>,
    /// Connections waiting for their servable destination to be built
    deferred: BTreeMap<String, Connection>,
    /// Sender-side nodes of released tunnels, reused when they reopen
    retained: BTreeSet<String>,
    max_tunnels: usize,
}

impl<E: MediaEngine> Topology<E> {
    pub fn new(engine: Arc<E>) -> Self {
        Self::with_max_tunnels(engine, DEFAULT_MAX_TUNNELS)
    }

    /// Create a topology allowing at most `max_tunnels` open tunnels
    pub fn with_max_tunnels(engine: Arc<E>, max_tunnels: usize) -> Self {
        Self {
            engine,
            nodes: BTreeMap::new(),
            caps: BTreeMap::new(),
            pipelines: BTreeMap::new(),
            tunnels: BTreeMap::new(),
            deferred: BTreeMap::new(),
            retained: BTreeSet::new(),
            max_tunnels,
        }
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    pub fn max_tunnels(&self) -> usize {
        self.max_tunnels
    }
}

impl<E: MediaEngine> Drop for Topology<E> {
    fn drop(&mut self) {
        // Servable pipelines belong to the serving layer by now
        for (name, entry) in &self.pipelines {
            if entry.servable {
                continue;
            }
            debug!(pipeline = %name, "Destroying pipeline");
            let _ = self.engine.set_pipeline_state(&entry.pipeline, ElementState::Null);
        }
    }
}

/// Classify an engine link failure
fn link_error(src: &str, dst: &str, err: EngineError) -> TopologyError {
    match err {
        EngineError::IncompatibleFormats => TopologyError::IncompatibleFormats {
            src: src.to_string(),
            dst: dst.to_string(),
        },
        EngineError::NoPadTemplate => TopologyError::NoPadTemplate(src.to_string()),
        other => TopologyError::LinkRejected {
            src: src.to_string(),
            dst: dst.to_string(),
            reason: other.to_string(),
        },
    }
}

fn state_error(target: &str, state: ElementState, err: EngineError) -> TopologyError {
    TopologyError::StateChange {
        target: target.to_string(),
        state: state.to_string(),
        reason: err.to_string(),
    }
}

fn engine_error(target: &str, err: EngineError) -> TopologyError {
    TopologyError::Engine {
        target: target.to_string(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::backends::dry_run::DryRunEngine;

    pub fn topology() -> Topology<DryRunEngine> {
        Topology::new(Arc::new(DryRunEngine::new()))
    }

    /// Pipeline `name` holding `nodes` (name, type), unlinked
    pub fn pipeline_with(topology: &mut Topology<DryRunEngine>, name: &str, nodes: &[(&str, &str)]) {
        topology.create_pipeline(name).unwrap();
        for (node, type_name) in nodes {
            topology.create_element(node, type_name).unwrap();
            topology.add_element_to_bin(node, name).unwrap();
        }
    }
}
