// SPDX-License-Identifier: GPL-3.0-only

//! Pipelines, bin membership and links

use super::{Topology, engine_error, link_error, state_error};
use crate::backends::{ElementState, EngineError, MediaEngine};
use crate::errors::{TopologyError, TopologyResult};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// A directed link between two nodes of one pipeline
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Edge {
    pub src: String,
    pub dst: String,
    /// Cap forced on the link
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cap: Option<String>,
}

/// A registered pipeline and what the topology knows about it
pub struct PipelineEntry<E: MediaEngine> {
    pub(super) pipeline: E::Pipeline,
    pub(super) nodes: BTreeSet<String>,
    pub(super) edges: Vec<Edge>,
    pub(super) servable: bool,
}

impl<E: MediaEngine> PipelineEntry<E> {
    pub fn pipeline(&self) -> &E::Pipeline {
        &self.pipeline
    }

    /// Member node names in order
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(String::as_str)
    }

    /// Links in creation order
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn is_servable(&self) -> bool {
        self.servable
    }
}

impl<E: MediaEngine> Topology<E> {
    /// Create an empty pipeline
    pub fn create_pipeline(&mut self, name: &str) -> TopologyResult<()> {
        if self.pipelines.contains_key(name) {
            return Err(TopologyError::DuplicateName {
                kind: "pipeline",
                name: name.to_string(),
            });
        }
        let pipeline = self
            .engine
            .make_pipeline(name)
            .map_err(|e| engine_error(name, e))?;

        debug!(pipeline = %name, "Created pipeline");
        self.pipelines.insert(
            name.to_string(),
            PipelineEntry {
                pipeline,
                nodes: BTreeSet::new(),
                edges: Vec::new(),
                servable: false,
            },
        );
        Ok(())
    }

    /// Make `node` a member of `pipe`
    pub fn add_element_to_bin(&mut self, node: &str, pipe: &str) -> TopologyResult<()> {
        let entry = self
            .nodes
            .get_mut(node)
            .ok_or_else(|| TopologyError::UnknownNode(node.to_string()))?;
        let target = self
            .pipelines
            .get_mut(pipe)
            .ok_or_else(|| TopologyError::UnknownPipeline(pipe.to_string()))?;

        if let Some(owner) = &entry.pipeline {
            return Err(TopologyError::AlreadyOwned {
                node: node.to_string(),
                pipeline: owner.clone(),
            });
        }

        self.engine
            .add_to_pipeline(&target.pipeline, &entry.element)
            .map_err(|e| match e {
                EngineError::AlreadyParented(owner) => TopologyError::AlreadyOwned {
                    node: node.to_string(),
                    pipeline: owner,
                },
                other => engine_error(node, other),
            })?;

        entry.pipeline = Some(pipe.to_string());
        target.nodes.insert(node.to_string());
        Ok(())
    }

    /// Link `src` to `dst`
    ///
    /// A splitting `src` hands out a fresh request pad for every link.
    pub fn connect_elements(&mut self, src: &str, dst: &str) -> TopologyResult<()> {
        self.connect(src, dst, None)
    }

    /// Link `src` to `dst` through a registered cap
    pub fn connect_elements_filtered(&mut self, src: &str, dst: &str, cap: &str) -> TopologyResult<()> {
        self.connect(src, dst, Some(cap))
    }

    fn connect(&mut self, src: &str, dst: &str, cap: Option<&str>) -> TopologyResult<()> {
        let src_node = self.node(src)?;
        let dst_node = self.node(dst)?;
        let filter = match cap {
            Some(name) => Some(self.cap(name)?.clone()),
            None => None,
        };

        let pipe = match (src_node.pipeline(), dst_node.pipeline()) {
            (Some(a), Some(b)) if a == b => a.to_string(),
            (Some(a), Some(b)) => {
                return Err(TopologyError::LinkRejected {
                    src: src.to_string(),
                    dst: dst.to_string(),
                    reason: format!("link crosses pipelines \"{}\" and \"{}\"", a, b),
                });
            }
            (None, _) | (_, None) => {
                let loose = if src_node.pipeline().is_none() { src } else { dst };
                return Err(TopologyError::LinkRejected {
                    src: src.to_string(),
                    dst: dst.to_string(),
                    reason: format!("\"{}\" is not in a pipeline", loose),
                });
            }
        };

        if filter.is_none() && self.engine.is_splitter(&src_node.element) {
            self.link_to_tee(src, dst)?;
        } else {
            self.engine
                .link(&src_node.element, &dst_node.element, filter.as_ref())
                .map_err(|e| link_error(src, dst, e))?;
        }

        if let Some(entry) = self.pipelines.get_mut(&pipe) {
            entry.edges.push(Edge {
                src: src.to_string(),
                dst: dst.to_string(),
                cap: cap.map(str::to_string),
            });
        }
        Ok(())
    }

    pub fn pipeline(&self, name: &str) -> TopologyResult<&E::Pipeline> {
        self.pipeline_entry(name).map(PipelineEntry::pipeline)
    }

    pub fn pipeline_entry(&self, name: &str) -> TopologyResult<&PipelineEntry<E>> {
        self.pipelines
            .get(name)
            .ok_or_else(|| TopologyError::UnknownPipeline(name.to_string()))
    }

    pub fn contains_pipeline(&self, name: &str) -> bool {
        self.pipelines.contains_key(name)
    }

    /// Registered pipeline names in order
    pub fn pipeline_names(&self) -> impl Iterator<Item = &str> {
        self.pipelines.keys().map(String::as_str)
    }

    /// Flag a pipeline as exposed through the streaming bridge
    pub fn mark_servable(&mut self, name: &str) -> TopologyResult<()> {
        let entry = self
            .pipelines
            .get_mut(name)
            .ok_or_else(|| TopologyError::UnknownPipeline(name.to_string()))?;
        if entry.servable {
            return Err(TopologyError::AlreadyRegistered(name.to_string()));
        }
        entry.servable = true;
        debug!(pipeline = %name, "Marked servable");
        Ok(())
    }

    pub fn is_servable(&self, name: &str) -> bool {
        self.pipelines.get(name).is_some_and(|entry| entry.servable)
    }

    /// Servable pipelines by name
    pub fn servable_pipes(&self) -> BTreeMap<String, E::Pipeline> {
        self.pipelines
            .iter()
            .filter(|(_, entry)| entry.servable)
            .map(|(name, entry)| (name.clone(), entry.pipeline.clone()))
            .collect()
    }

    /// Set every capture pipeline playing
    pub fn start_pipelines(&self) -> TopologyResult<()> {
        for (name, entry) in self.pipelines.iter().filter(|(_, entry)| !entry.servable) {
            self.engine
                .set_pipeline_state(&entry.pipeline, ElementState::Playing)
                .map_err(|e| state_error(name, ElementState::Playing, e))?;
            info!(pipeline = %name, "Pipeline started");
        }
        Ok(())
    }

    /// Stop a pipeline and forget it together with its nodes
    ///
    /// Tunnels into or out of the pipeline are disconnected first and
    /// deferred connections naming it are dropped.
    pub fn destroy_pipeline(&mut self, name: &str) -> TopologyResult<()> {
        if !self.pipelines.contains_key(name) {
            return Err(TopologyError::UnknownPipeline(name.to_string()));
        }

        let touching: Vec<String> = self
            .tunnels
            .values()
            .filter(|tunnel| tunnel.name == name || tunnel.source_pipe == name)
            .map(|tunnel| tunnel.name.clone())
            .collect();
        for tunnel in touching {
            self.disconnect_pipe(&tunnel)?;
        }
        let dropped: Vec<String> = self
            .deferred
            .values()
            .filter(|connection| connection.destination == name || connection.source_pipe == name)
            .map(|connection| connection.destination.clone())
            .collect();
        for destination in dropped {
            self.deferred.remove(&destination);
            self.discard_retained(&destination);
        }

        let Some(entry) = self.pipelines.remove(name) else {
            return Ok(());
        };
        if let Err(e) = self.engine.set_pipeline_state(&entry.pipeline, ElementState::Null) {
            tracing::warn!(pipeline = %name, error = %e, "Failed to stop pipeline");
        }
        for node in &entry.nodes {
            self.nodes.remove(node);
        }
        info!(pipeline = %name, nodes = entry.nodes.len(), "Pipeline destroyed");
        Ok(())
    }
}
