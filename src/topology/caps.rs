// SPDX-License-Identifier: GPL-3.0-only

//! Capability registry

use super::{Topology, engine_error};
use crate::backends::{EngineError, MediaEngine};
use crate::errors::{TopologyError, TopologyResult};
use tracing::debug;

/// A named, immutable format constraint
pub struct Capability<E: MediaEngine> {
    pub(super) expression: String,
    pub(super) caps: E::Caps,
}

impl<E: MediaEngine> Capability<E> {
    /// Expression the cap was created from
    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn caps(&self) -> &E::Caps {
        &self.caps
    }
}

impl<E: MediaEngine> Topology<E> {
    /// Parse and register a cap
    pub fn create_cap(&mut self, name: &str, expression: &str) -> TopologyResult<()> {
        if self.caps.contains_key(name) {
            return Err(TopologyError::DuplicateName {
                kind: "cap",
                name: name.to_string(),
            });
        }
        let caps = self.engine.parse_caps(expression).map_err(|e| {
            let reason = match e {
                EngineError::InvalidCaps(reason) => reason,
                other => other.to_string(),
            };
            TopologyError::InvalidExpression {
                cap: name.to_string(),
                expression: expression.to_string(),
                reason,
            }
        })?;

        debug!(cap = %name, expression, "Created cap");
        self.caps.insert(
            name.to_string(),
            Capability {
                expression: expression.to_string(),
                caps,
            },
        );
        Ok(())
    }

    /// Constrain a node to a copy of a registered cap
    pub fn assign_cap(&mut self, node_name: &str, cap_name: &str) -> TopologyResult<()> {
        let node = self
            .nodes
            .get_mut(node_name)
            .ok_or_else(|| TopologyError::UnknownNode(node_name.to_string()))?;
        let cap = self
            .caps
            .get(cap_name)
            .ok_or_else(|| TopologyError::UnknownCap(cap_name.to_string()))?;

        let copy = cap.caps.clone();
        self.engine
            .assign_caps(&node.element, &copy)
            .map_err(|e| engine_error(node_name, e))?;
        node.cap = Some(cap_name.to_string());
        Ok(())
    }

    pub fn cap(&self, name: &str) -> TopologyResult<&E::Caps> {
        self.capability(name).map(Capability::caps)
    }

    pub fn capability(&self, name: &str) -> TopologyResult<&Capability<E>> {
        self.caps
            .get(name)
            .ok_or_else(|| TopologyError::UnknownCap(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::topology;
    use super::*;

    #[test]
    fn test_create_and_get_cap() {
        let mut topology = topology();
        topology
            .create_cap("main_caps", "video/x-raw,width=640,height=480")
            .unwrap();
        let caps = topology.cap("main_caps").unwrap();
        assert_eq!(caps.field("width"), Some("640"));
        assert_eq!(
            topology.capability("main_caps").unwrap().expression(),
            "video/x-raw,width=640,height=480"
        );
        assert_eq!(
            topology.cap("other").unwrap_err(),
            TopologyError::UnknownCap("other".into())
        );
    }

    #[test]
    fn test_invalid_expression() {
        let mut topology = topology();
        assert!(matches!(
            topology.create_cap("bad", "not caps at all"),
            Err(TopologyError::InvalidExpression { cap, .. }) if cap == "bad"
        ));
        assert!(topology.cap("bad").is_err());
    }

    #[test]
    fn test_duplicate_cap() {
        let mut topology = topology();
        topology.create_cap("c", "video/x-raw").unwrap();
        assert!(matches!(
            topology.create_cap("c", "video/x-h264"),
            Err(TopologyError::DuplicateName { kind: "cap", .. })
        ));
    }

    #[test]
    fn test_assign_cap_copies() {
        let mut topology = topology();
        topology.create_cap("vga", "video/x-raw,width=640").unwrap();
        topology.create_element("a", "capsfilter").unwrap();
        topology.create_element("b", "capsfilter").unwrap();
        topology.assign_cap("a", "vga").unwrap();
        topology.assign_cap("b", "vga").unwrap();

        let engine = topology.engine().clone();
        let a = topology.element("a").unwrap().clone();
        let b = topology.element("b").unwrap().clone();
        assert_eq!(engine.element_caps(&a), engine.element_caps(&b));
        assert_eq!(topology.node("a").unwrap().cap(), Some("vga"));

        // Narrowing one node leaves the other and the registry untouched
        engine.set_property(&a, "caps", "video/x-raw,width=320").unwrap();
        assert_eq!(
            engine.element_caps(&b).unwrap().field("width"),
            Some("640")
        );
        assert_eq!(topology.cap("vga").unwrap().field("width"), Some("640"));
    }

    #[test]
    fn test_assign_cap_unknowns() {
        let mut topology = topology();
        topology.create_cap("vga", "video/x-raw").unwrap();
        topology.create_element("a", "capsfilter").unwrap();
        assert_eq!(
            topology.assign_cap("z", "vga").unwrap_err(),
            TopologyError::UnknownNode("z".into())
        );
        assert_eq!(
            topology.assign_cap("a", "z").unwrap_err(),
            TopologyError::UnknownCap("z".into())
        );
    }
}
