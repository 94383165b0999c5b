// SPDX-License-Identifier: GPL-3.0-only

//! Structural view of a topology
//!
//! Two topologies built from the same description produce equal snapshots,
//! whatever engine handles they hold.

use super::{Connection, Edge, Topology, Tunnel};
use crate::backends::MediaEngine;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeSnapshot {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cap: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineSnapshot {
    pub name: String,
    pub servable: bool,
    pub nodes: Vec<String>,
    pub edges: Vec<Edge>,
}

/// Ordered, comparable copy of everything the registries hold
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopologySnapshot {
    pub caps: BTreeMap<String, String>,
    pub nodes: Vec<NodeSnapshot>,
    pub pipelines: Vec<PipelineSnapshot>,
    pub tunnels: Vec<Tunnel>,
    pub deferred: Vec<Connection>,
}

impl TopologySnapshot {
    pub fn pipeline(&self, name: &str) -> Option<&PipelineSnapshot> {
        self.pipelines.iter().find(|pipeline| pipeline.name == name)
    }

    pub fn node(&self, name: &str) -> Option<&NodeSnapshot> {
        self.nodes.iter().find(|node| node.name == name)
    }

    pub fn edge_count(&self) -> usize {
        self.pipelines.iter().map(|pipeline| pipeline.edges.len()).sum()
    }
}

impl<E: MediaEngine> Topology<E> {
    pub fn snapshot(&self) -> TopologySnapshot {
        TopologySnapshot {
            caps: self
                .caps
                .iter()
                .map(|(name, cap)| (name.clone(), cap.expression.clone()))
                .collect(),
            nodes: self
                .nodes
                .iter()
                .map(|(name, node)| NodeSnapshot {
                    name: name.clone(),
                    type_name: node.type_name.clone(),
                    pipeline: node.pipeline.clone(),
                    cap: node.cap.clone(),
                    properties: node.properties.clone(),
                })
                .collect(),
            pipelines: self
                .pipelines
                .iter()
                .map(|(name, entry)| PipelineSnapshot {
                    name: name.clone(),
                    servable: entry.servable,
                    nodes: entry.nodes.iter().cloned().collect(),
                    edges: entry.edges.clone(),
                })
                .collect(),
            tunnels: self.tunnels.values().cloned().collect(),
            deferred: self.deferred.values().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{pipeline_with, topology};

    #[test]
    fn test_snapshot_is_ordered() {
        let mut topology = topology();
        pipeline_with(&mut topology, "b", &[("z", "queue"), ("a", "queue")]);
        topology.create_pipeline("a").unwrap();
        topology.create_cap("vga", "video/x-raw,width=640").unwrap();

        let snapshot = topology.snapshot();
        let names: Vec<&str> = snapshot.pipelines.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(snapshot.pipeline("b").unwrap().nodes, vec!["a", "z"]);
        assert_eq!(snapshot.node("z").unwrap().pipeline.as_deref(), Some("b"));
        assert_eq!(snapshot.caps["vga"], "video/x-raw,width=640");
        assert_eq!(snapshot.edge_count(), 0);
    }
}
