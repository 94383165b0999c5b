// SPDX-License-Identifier: GPL-3.0-only

//! Node registry

use super::Topology;
use crate::backends::{EngineError, MediaEngine};
use crate::errors::{TopologyError, TopologyResult};
use std::collections::BTreeMap;
use tracing::debug;

/// A named processing element
pub struct Node<E: MediaEngine> {
    pub(super) type_name: String,
    pub(super) element: E::Element,
    pub(super) properties: BTreeMap<String, String>,
    pub(super) cap: Option<String>,
    pub(super) pipeline: Option<String>,
}

impl<E: MediaEngine> Node<E> {
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn element(&self) -> &E::Element {
        &self.element
    }

    /// Properties applied so far, as given
    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    /// Name of the assigned cap
    pub fn cap(&self) -> Option<&str> {
        self.cap.as_deref()
    }

    /// Name of the owning pipeline
    pub fn pipeline(&self) -> Option<&str> {
        self.pipeline.as_deref()
    }
}

impl<E: MediaEngine> Topology<E> {
    /// Create and register a node of `type_name`
    pub fn create_element(&mut self, name: &str, type_name: &str) -> TopologyResult<()> {
        if self.nodes.contains_key(name) {
            return Err(TopologyError::DuplicateName {
                kind: "node",
                name: name.to_string(),
            });
        }
        let element = self.engine.make_element(name, type_name).map_err(|_| {
            TopologyError::UnsupportedType {
                node: name.to_string(),
                type_name: type_name.to_string(),
            }
        })?;

        debug!(node = %name, element_type = %type_name, "Created node");
        self.nodes.insert(
            name.to_string(),
            Node {
                type_name: type_name.to_string(),
                element,
                properties: BTreeMap::new(),
                cap: None,
                pipeline: None,
            },
        );
        Ok(())
    }

    /// Apply a property value with the engine's coercion
    pub fn set_property(&mut self, name: &str, key: &str, value: &str) -> TopologyResult<()> {
        let node = self
            .nodes
            .get_mut(name)
            .ok_or_else(|| TopologyError::UnknownNode(name.to_string()))?;

        self.engine
            .set_property(&node.element, key, value)
            .map_err(|e| {
                let reason = match e {
                    EngineError::NoSuchProperty(_) => "no such property".to_string(),
                    EngineError::InvalidValue { reason, .. } => reason,
                    other => other.to_string(),
                };
                TopologyError::InvalidProperty {
                    node: name.to_string(),
                    property: key.to_string(),
                    value: value.to_string(),
                    reason,
                }
            })?;
        node.properties.insert(key.to_string(), value.to_string());
        Ok(())
    }

    /// The engine element behind a node
    pub fn element(&self, name: &str) -> TopologyResult<&E::Element> {
        self.node(name).map(|node| &node.element)
    }

    pub fn node(&self, name: &str) -> TopologyResult<&Node<E>> {
        self.nodes
            .get(name)
            .ok_or_else(|| TopologyError::UnknownNode(name.to_string()))
    }

    pub fn contains_node(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Registered node names in order
    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    /// Drop a node from the registry, taking it out of its pipeline first
    pub(super) fn discard_node(&mut self, name: &str) {
        self.unbin(name);
        self.nodes.remove(name);
    }

    /// Take a node out of its pipeline, keeping it registered
    pub(super) fn unbin(&mut self, name: &str) {
        let Some(node) = self.nodes.get_mut(name) else {
            return;
        };
        let Some(pipe) = node.pipeline.take() else {
            return;
        };
        if let Some(entry) = self.pipelines.get_mut(&pipe) {
            let _ = self.engine.remove_from_pipeline(&entry.pipeline, &node.element);
            entry.nodes.remove(name);
            entry.edges.retain(|edge| edge.src != name && edge.dst != name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::topology;
    use super::*;

    #[test]
    fn test_duplicate_node() {
        let mut topology = topology();
        topology.create_element("tee0", "tee").unwrap();
        assert_eq!(
            topology.create_element("tee0", "queue").unwrap_err(),
            TopologyError::DuplicateName {
                kind: "node",
                name: "tee0".into()
            }
        );
        assert_eq!(topology.node("tee0").unwrap().type_name(), "tee");
    }

    #[test]
    fn test_unsupported_type() {
        let mut topology = topology();
        assert_eq!(
            topology.create_element("x", "flux-capacitor").unwrap_err(),
            TopologyError::UnsupportedType {
                node: "x".into(),
                type_name: "flux-capacitor".into()
            }
        );
        assert!(!topology.contains_node("x"));
    }

    #[test]
    fn test_set_property() {
        let mut topology = topology();
        topology.create_element("src", "videotestsrc").unwrap();
        topology.set_property("src", "pattern", "ball").unwrap();
        assert_eq!(
            topology.node("src").unwrap().properties().get("pattern").map(String::as_str),
            Some("ball")
        );

        assert_eq!(
            topology.set_property("nope", "pattern", "ball").unwrap_err(),
            TopologyError::UnknownNode("nope".into())
        );
        assert!(matches!(
            topology.set_property("src", "pattern", "plaid"),
            Err(TopologyError::InvalidProperty { .. })
        ));
        assert!(matches!(
            topology.set_property("src", "bogus", "1"),
            Err(TopologyError::InvalidProperty { reason, .. }) if reason == "no such property"
        ));
    }

    #[test]
    fn test_get_element() {
        let mut topology = topology();
        topology.create_element("q", "queue").unwrap();
        assert_eq!(topology.element("q").unwrap().name(), "q");
        assert_eq!(
            topology.element("p").unwrap_err(),
            TopologyError::UnknownNode("p".into())
        );
    }
}
