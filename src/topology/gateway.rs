// SPDX-License-Identifier: GPL-3.0-only

//! Cross-pipeline gateway tunnels
//!
//! A tunnel bridges an exit node of a source pipeline into an entry node of
//! a destination pipeline through a sender/receiver pair sharing a channel:
//!
//! ```text
//!  source pipeline                          destination pipeline
//!  exit ─▶ gatequeue_<t> ─▶ intersink_<t> ┄┄ intersrc_<t> ─▶ entry
//!          └──────── sender side ────────┘    receiver side
//! ```
//!
//! The tunnel is named after its destination pipeline. The receiver side is
//! wired when the tunnel is opened; the sender side is wired either at the
//! same time ([`AttachMode::Immediate`]) or later through
//! [`Topology::attach_tunnel`] and unwired again with
//! [`Topology::detach_tunnel`].
//!
//! [`Topology::release_tunnel`] closes a tunnel whose destination went idle:
//! the receiver is dropped, the sender and buffer are kept out of any
//! pipeline and the connection goes back to the deferred set, so the tunnel
//! no longer counts against the limit. [`Topology::open_deferred`] reopens it
//! with the retained nodes.

use super::{Topology, link_error, state_error};
use crate::backends::{ElementState, MediaEngine};
use crate::constants::{element_types, naming};
use crate::errors::{TopologyError, TopologyResult};
use serde::Serialize;
use tracing::{debug, info, warn};

/// When the sender side of a new tunnel is wired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachMode {
    /// Wire both sides now
    Immediate,
    /// Wire the receiver side only
    OnDemand,
}

/// A requested tunnel: `exit` of `source_pipe` feeds `entry` of
/// `destination`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Connection {
    pub destination: String,
    pub entry: String,
    pub source_pipe: String,
    pub exit: String,
}

/// An open tunnel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tunnel {
    /// Destination pipeline name
    pub name: String,
    pub channel: String,
    pub source_pipe: String,
    pub exit: String,
    pub entry: String,
    pub sender: String,
    pub buffer: String,
    pub receiver: String,
    /// Whether the sender side is wired into the source pipeline
    pub attached: bool,
}

impl<E: MediaEngine> Topology<E> {
    /// Open a tunnel into the pipeline `tunnel`
    ///
    /// On failure nothing is registered and every node created on the way is
    /// discarded.
    pub fn connect_pipe(
        &mut self,
        tunnel: &str,
        entry: &str,
        source_pipe: &str,
        exit: &str,
        mode: AttachMode,
    ) -> TopologyResult<()> {
        if !self.pipelines.contains_key(tunnel) {
            return Err(TopologyError::NotAPipeline(tunnel.to_string()));
        }
        if self.tunnels.len() >= self.max_tunnels {
            return Err(TopologyError::ResourceExhausted {
                limit: self.max_tunnels,
            });
        }
        if self.tunnels.contains_key(tunnel) {
            return Err(TopologyError::DuplicateName {
                kind: "tunnel",
                name: tunnel.to_string(),
            });
        }
        if !self.pipelines.contains_key(source_pipe) {
            return Err(TopologyError::UnknownPipeline(source_pipe.to_string()));
        }
        self.expect_member(entry, tunnel)?;
        self.expect_member(exit, source_pipe)?;

        let mut record = Tunnel {
            name: tunnel.to_string(),
            channel: naming::channel(tunnel),
            source_pipe: source_pipe.to_string(),
            exit: exit.to_string(),
            entry: entry.to_string(),
            sender: naming::sender(tunnel),
            buffer: naming::buffer(tunnel),
            receiver: naming::receiver(tunnel),
            attached: false,
        };

        let mut created = Vec::with_capacity(3);
        let opened = self.open_tunnel(&record, &mut created);
        let opened = opened.and_then(|()| match mode {
            AttachMode::Immediate => self.wire_sender(&record),
            AttachMode::OnDemand => Ok(()),
        });
        if let Err(e) = opened {
            warn!(tunnel, error = %e, "Failed to open gateway tunnel");
            if let Some(receiver) = self.nodes.get(&record.receiver)
                && let Some(entry_node) = self.nodes.get(entry)
            {
                self.engine.unlink(&receiver.element, &entry_node.element);
            }
            for node in created.iter().rev() {
                if let Ok(element) = self.element(node) {
                    let _ = self.engine.set_element_state(element, ElementState::Null);
                }
                self.discard_node(node);
            }
            return Err(e);
        }

        record.attached = mode == AttachMode::Immediate;
        self.deferred.remove(tunnel);
        self.retained.remove(&record.sender);
        self.retained.remove(&record.buffer);
        info!(
            tunnel,
            source = %source_pipe,
            exit,
            entry,
            attached = record.attached,
            "Gateway tunnel opened"
        );
        self.tunnels.insert(tunnel.to_string(), record);
        Ok(())
    }

    /// Create the missing nodes and wire the receiver side
    fn open_tunnel(&mut self, tunnel: &Tunnel, created: &mut Vec<String>) -> TopologyResult<()> {
        for (name, type_name) in [
            (&tunnel.sender, element_types::INTER_SINK),
            (&tunnel.buffer, element_types::QUEUE),
            (&tunnel.receiver, element_types::INTER_SRC),
        ] {
            if self.retained.contains(name) && self.nodes.contains_key(name) {
                continue;
            }
            self.create_element(name, type_name)?;
            created.push(name.clone());
        }

        self.set_property(&tunnel.sender, naming::CHANNEL_PROPERTY, &tunnel.channel)?;
        self.set_property(&tunnel.receiver, naming::CHANNEL_PROPERTY, &tunnel.channel)?;

        self.add_element_to_bin(&tunnel.receiver, &tunnel.name)?;
        let receiver = self.element(&tunnel.receiver)?;
        let entry = self.element(&tunnel.entry)?;
        self.engine
            .link(receiver, entry, None)
            .map_err(|e| link_error(&tunnel.receiver, &tunnel.entry, e))?;
        // The destination may already be running
        self.engine
            .sync_state_with_parent(receiver)
            .map_err(|e| state_error(&tunnel.receiver, ElementState::Playing, e))
    }

    /// Add the sender side to the running source pipeline and link it
    ///
    /// Leaves the source pipeline as it was on failure.
    fn wire_sender(&mut self, tunnel: &Tunnel) -> TopologyResult<()> {
        self.add_element_to_bin(&tunnel.buffer, &tunnel.source_pipe)?;
        if let Err(e) = self.add_element_to_bin(&tunnel.sender, &tunnel.source_pipe) {
            self.unbin(&tunnel.buffer);
            return Err(e);
        }

        if let Err(e) = self.link_sender(tunnel) {
            for name in [&tunnel.buffer, &tunnel.sender] {
                self.unbin(name);
                if let Ok(element) = self.element(name) {
                    let _ = self.engine.set_element_state(element, ElementState::Null);
                }
            }
            return Err(e);
        }
        Ok(())
    }

    fn link_sender(&self, tunnel: &Tunnel) -> TopologyResult<()> {
        let buffer = self.element(&tunnel.buffer)?;
        let sender = self.element(&tunnel.sender)?;
        let exit = self.element(&tunnel.exit)?;

        for (name, element) in [(&tunnel.buffer, buffer), (&tunnel.sender, sender)] {
            self.engine
                .sync_state_with_parent(element)
                .map_err(|e| state_error(name, ElementState::Playing, e))?;
        }

        self.engine
            .link(buffer, sender, None)
            .map_err(|e| link_error(&tunnel.buffer, &tunnel.sender, e))?;

        if self.engine.is_splitter(exit) {
            self.link_to_tee(&tunnel.exit, &tunnel.buffer)
        } else {
            self.engine
                .link(exit, buffer, None)
                .map_err(|e| link_error(&tunnel.exit, &tunnel.buffer, e))
        }
    }

    /// Wire the sender side of an open tunnel into its source pipeline
    ///
    /// Does nothing if it is already wired.
    pub fn attach_tunnel(&mut self, name: &str) -> TopologyResult<()> {
        let tunnel = self
            .tunnels
            .get(name)
            .ok_or_else(|| TopologyError::UnknownTunnel(name.to_string()))?
            .clone();
        if tunnel.attached {
            return Ok(());
        }
        self.wire_sender(&tunnel)?;
        if let Some(record) = self.tunnels.get_mut(name) {
            record.attached = true;
        }
        debug!(tunnel = %name, source = %tunnel.source_pipe, "Gateway sender attached");
        Ok(())
    }

    /// Unwire the sender side of a tunnel, keeping its nodes registered
    ///
    /// Does nothing if it is not wired.
    pub fn detach_tunnel(&mut self, name: &str) -> TopologyResult<()> {
        let tunnel = self
            .tunnels
            .get(name)
            .ok_or_else(|| TopologyError::UnknownTunnel(name.to_string()))?
            .clone();
        if !tunnel.attached {
            return Ok(());
        }

        self.unlink_from(&tunnel.exit, &tunnel.buffer)?;
        for node in [&tunnel.buffer, &tunnel.sender] {
            let element = self.element(node)?;
            self.engine
                .set_element_state(element, ElementState::Null)
                .map_err(|e| state_error(node, ElementState::Null, e))?;
        }
        self.unbin(&tunnel.buffer);
        self.unbin(&tunnel.sender);

        if let Some(record) = self.tunnels.get_mut(name) {
            record.attached = false;
        }
        debug!(tunnel = %name, source = %tunnel.source_pipe, "Gateway sender detached");
        Ok(())
    }

    /// Close a tunnel and drop all three of its nodes
    pub fn disconnect_pipe(&mut self, name: &str) -> TopologyResult<()> {
        let tunnel = self.close_receiver(name)?;
        for node in [&tunnel.buffer, &tunnel.sender] {
            self.discard_node(node);
        }
        info!(tunnel = %name, "Gateway tunnel closed");
        Ok(())
    }

    /// Close a tunnel whose destination went idle
    ///
    /// The receiver is dropped and the sender side is unwired but kept for
    /// [`Topology::open_deferred`], which reopens the tunnel from the
    /// connection put back into the deferred set.
    pub fn release_tunnel(&mut self, name: &str) -> TopologyResult<()> {
        let tunnel = self.close_receiver(name)?;
        self.retained.insert(tunnel.sender.clone());
        self.retained.insert(tunnel.buffer.clone());
        self.deferred.insert(
            name.to_string(),
            Connection {
                destination: tunnel.name,
                entry: tunnel.entry,
                source_pipe: tunnel.source_pipe,
                exit: tunnel.exit,
            },
        );
        info!(tunnel = %name, "Gateway tunnel released");
        Ok(())
    }

    /// Open the deferred connection into `destination`
    pub fn open_deferred(&mut self, destination: &str, mode: AttachMode) -> TopologyResult<()> {
        let connection = self
            .deferred
            .get(destination)
            .cloned()
            .ok_or_else(|| TopologyError::UnknownTunnel(destination.to_string()))?;
        self.connect_pipe(
            &connection.destination,
            &connection.entry,
            &connection.source_pipe,
            &connection.exit,
            mode,
        )
    }

    /// Drop the sender-side nodes kept by [`Topology::release_tunnel`]
    pub fn discard_retained(&mut self, name: &str) {
        for node in [naming::buffer(name), naming::sender(name)] {
            if self.retained.remove(&node) {
                self.discard_node(&node);
            }
        }
    }

    /// Detach the sender side, drop the receiver and unregister the tunnel
    fn close_receiver(&mut self, name: &str) -> TopologyResult<Tunnel> {
        let tunnel = self
            .tunnels
            .get(name)
            .cloned()
            .ok_or_else(|| TopologyError::UnknownTunnel(name.to_string()))?;
        if tunnel.attached {
            self.detach_tunnel(name)?;
        }

        if let (Ok(receiver), Ok(entry)) = (self.element(&tunnel.receiver), self.element(&tunnel.entry)) {
            self.engine.unlink(receiver, entry);
            let _ = self.engine.set_element_state(receiver, ElementState::Null);
        }
        self.discard_node(&tunnel.receiver);
        self.tunnels.remove(name);
        Ok(tunnel)
    }

    /// Record a connection to be opened once `destination` is first served
    pub fn defer_connection(
        &mut self,
        destination: &str,
        entry: &str,
        source_pipe: &str,
        exit: &str,
    ) -> TopologyResult<()> {
        if !self.pipelines.contains_key(destination) {
            return Err(TopologyError::NotAPipeline(destination.to_string()));
        }
        if !self.pipelines.contains_key(source_pipe) {
            return Err(TopologyError::UnknownPipeline(source_pipe.to_string()));
        }
        self.expect_member(entry, destination)?;
        self.expect_member(exit, source_pipe)?;
        if self.deferred.contains_key(destination) || self.tunnels.contains_key(destination) {
            return Err(TopologyError::DuplicateName {
                kind: "connection",
                name: destination.to_string(),
            });
        }

        self.deferred.insert(
            destination.to_string(),
            Connection {
                destination: destination.to_string(),
                entry: entry.to_string(),
                source_pipe: source_pipe.to_string(),
                exit: exit.to_string(),
            },
        );
        debug!(destination, source = %source_pipe, "Connection deferred");
        Ok(())
    }

    /// The deferred connection into `destination`, if any
    pub fn deferred(&self, destination: &str) -> Option<&Connection> {
        self.deferred.get(destination)
    }

    pub fn tunnel(&self, name: &str) -> Option<&Tunnel> {
        self.tunnels.get(name)
    }

    pub fn tunnel_count(&self) -> usize {
        self.tunnels.len()
    }

    fn expect_member(&self, node: &str, pipe: &str) -> TopologyResult<()> {
        match self.node(node)?.pipeline() {
            Some(owner) if owner == pipe => Ok(()),
            _ => Err(TopologyError::LinkRejected {
                src: node.to_string(),
                dst: pipe.to_string(),
                reason: format!("\"{}\" is not in pipeline \"{}\"", node, pipe),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{pipeline_with, topology};
    use super::*;
    use crate::backends::dry_run::{DryRunEngine, EngineOp};
    use std::sync::Arc;

    fn lazy_scenario() -> Topology<DryRunEngine> {
        let mut topology = topology();
        pipeline_with(&mut topology, "main", &[("src", "fakesrc"), ("tee", "tee")]);
        topology.connect_elements("src", "tee").unwrap();
        pipeline_with(
            &mut topology,
            "cam",
            &[("q", "queue"), ("enc", "fakeenc"), ("pay", "fakepay")],
        );
        topology.connect_elements("q", "enc").unwrap();
        topology.connect_elements("enc", "pay").unwrap();
        topology.mark_servable("cam").unwrap();
        topology
    }

    #[test]
    fn test_not_a_pipeline_comes_first() {
        let mut topology = Topology::with_max_tunnels(Arc::new(DryRunEngine::new()), 0);
        topology.create_pipeline("main").unwrap();
        assert_eq!(
            topology
                .connect_pipe("ghost", "q", "main", "tee", AttachMode::Immediate)
                .unwrap_err(),
            TopologyError::NotAPipeline("ghost".into())
        );
        topology.create_pipeline("cam").unwrap();
        assert_eq!(
            topology
                .connect_pipe("cam", "q", "main", "tee", AttachMode::Immediate)
                .unwrap_err(),
            TopologyError::ResourceExhausted { limit: 0 }
        );
    }

    #[test]
    fn test_immediate_tunnel() {
        let mut topology = lazy_scenario();
        topology
            .connect_pipe("cam", "q", "main", "tee", AttachMode::Immediate)
            .unwrap();

        let tunnel = topology.tunnel("cam").unwrap().clone();
        assert!(tunnel.attached);
        assert_eq!(tunnel.channel, "gateway_cam");
        assert_eq!(topology.node("intersink_cam").unwrap().pipeline(), Some("main"));
        assert_eq!(topology.node("gatequeue_cam").unwrap().pipeline(), Some("main"));
        assert_eq!(topology.node("intersrc_cam").unwrap().pipeline(), Some("cam"));

        let engine = topology.engine().clone();
        let sender = topology.element("intersink_cam").unwrap().clone();
        let receiver = topology.element("intersrc_cam").unwrap().clone();
        assert_eq!(engine.property(&sender, "channel").as_deref(), Some("gateway_cam"));
        assert_eq!(engine.property(&receiver, "channel").as_deref(), Some("gateway_cam"));
    }

    #[test]
    fn test_on_demand_then_attach_detach() {
        let mut topology = lazy_scenario();
        topology
            .connect_pipe("cam", "q", "main", "tee", AttachMode::OnDemand)
            .unwrap();
        assert_eq!(topology.node("intersink_cam").unwrap().pipeline(), None);
        assert_eq!(topology.node("intersrc_cam").unwrap().pipeline(), Some("cam"));

        topology.attach_tunnel("cam").unwrap();
        topology.attach_tunnel("cam").unwrap();
        let engine = topology.engine().clone();
        let added = engine.count_operations(|op| {
            matches!(op, EngineOp::AddToPipeline { element, .. } if element == "intersink_cam")
        });
        assert_eq!(added, 1);

        topology.detach_tunnel("cam").unwrap();
        topology.detach_tunnel("cam").unwrap();
        assert_eq!(topology.node("intersink_cam").unwrap().pipeline(), None);
        assert!(topology.contains_node("gatequeue_cam"));
        let tee = topology.element("tee").unwrap().clone();
        assert!(engine.request_pads(&tee).is_empty());

        // Re-attaching reuses the retained nodes
        topology.attach_tunnel("cam").unwrap();
        assert!(topology.tunnel("cam").unwrap().attached);
    }

    #[test]
    fn test_attach_follows_running_pipeline() {
        let mut topology = lazy_scenario();
        topology
            .connect_pipe("cam", "q", "main", "tee", AttachMode::OnDemand)
            .unwrap();
        topology.start_pipelines().unwrap();
        topology.attach_tunnel("cam").unwrap();

        let engine = topology.engine().clone();
        let sender = topology.element("intersink_cam").unwrap().clone();
        assert_eq!(engine.element_state(&sender), ElementState::Playing);

        topology.detach_tunnel("cam").unwrap();
        assert_eq!(engine.element_state(&sender), ElementState::Null);
    }

    #[test]
    fn test_failed_open_leaves_nothing() {
        let mut topology = lazy_scenario();
        // An entry with an upstream peer cannot take the receiver
        topology.create_element("feeder", "fakesrc").unwrap();
        topology.add_element_to_bin("feeder", "cam").unwrap();
        topology.connect_elements("feeder", "q").unwrap();

        let before = topology.snapshot();
        assert!(matches!(
            topology.connect_pipe("cam", "q", "main", "tee", AttachMode::Immediate),
            Err(TopologyError::LinkRejected { .. })
        ));
        assert_eq!(topology.snapshot(), before);
        assert!(!topology.contains_node("intersink_cam"));
        assert!(!topology.contains_node("intersrc_cam"));
        assert!(topology.tunnel("cam").is_none());
    }

    #[test]
    fn test_disconnect_pipe() {
        let mut topology = lazy_scenario();
        topology
            .connect_pipe("cam", "q", "main", "tee", AttachMode::Immediate)
            .unwrap();
        topology.disconnect_pipe("cam").unwrap();
        assert!(topology.tunnel("cam").is_none());
        for node in ["intersink_cam", "gatequeue_cam", "intersrc_cam"] {
            assert!(!topology.contains_node(node));
        }
        assert_eq!(
            topology.disconnect_pipe("cam").unwrap_err(),
            TopologyError::UnknownTunnel("cam".into())
        );
        // The entry is free again
        topology
            .connect_pipe("cam", "q", "main", "tee", AttachMode::OnDemand)
            .unwrap();
    }

    #[test]
    fn test_defer_connection() {
        let mut topology = lazy_scenario();
        topology.defer_connection("cam", "q", "main", "tee").unwrap();
        assert!(matches!(
            topology.defer_connection("cam", "q", "main", "tee"),
            Err(TopologyError::DuplicateName { kind: "connection", .. })
        ));
        assert_eq!(
            topology.defer_connection("cam", "zz", "main", "tee").unwrap_err(),
            TopologyError::UnknownNode("zz".into())
        );
        assert_eq!(topology.tunnel_count(), 0);

        topology
            .connect_pipe("cam", "q", "main", "tee", AttachMode::OnDemand)
            .unwrap();
        assert!(topology.deferred("cam").is_none());
    }

    #[test]
    fn test_release_then_reopen() {
        let mut topology = Topology::with_max_tunnels(Arc::new(DryRunEngine::new()), 1);
        pipeline_with(&mut topology, "main", &[("src", "fakesrc"), ("tee", "tee")]);
        topology.connect_elements("src", "tee").unwrap();
        pipeline_with(&mut topology, "a", &[("qa", "queue")]);
        pipeline_with(&mut topology, "b", &[("qb", "queue")]);
        topology.defer_connection("a", "qa", "main", "tee").unwrap();
        topology.defer_connection("b", "qb", "main", "tee").unwrap();
        topology.start_pipelines().unwrap();
        let engine = topology.engine().clone();

        topology.open_deferred("a", AttachMode::Immediate).unwrap();
        assert_eq!(
            topology.open_deferred("b", AttachMode::Immediate).unwrap_err(),
            TopologyError::ResourceExhausted { limit: 1 }
        );

        topology.release_tunnel("a").unwrap();
        assert_eq!(topology.tunnel_count(), 0);
        assert!(topology.deferred("a").is_some());
        assert!(!topology.contains_node("intersrc_a"));
        assert_eq!(topology.node("intersink_a").unwrap().pipeline(), None);
        assert_eq!(topology.node("gatequeue_a").unwrap().pipeline(), None);
        let tee = topology.element("tee").unwrap().clone();
        assert!(engine.request_pads(&tee).is_empty());

        // The freed slot serves the other destination
        topology.open_deferred("b", AttachMode::Immediate).unwrap();
        topology.release_tunnel("b").unwrap();

        // Reopening reuses the retained sender side
        let made_before = engine.count_operations(|op| {
            matches!(op, EngineOp::MakeElement { name, .. } if name == "intersink_a")
        });
        topology.open_deferred("a", AttachMode::OnDemand).unwrap();
        let made_after = engine.count_operations(|op| {
            matches!(op, EngineOp::MakeElement { name, .. } if name == "intersink_a")
        });
        assert_eq!(made_before, made_after);
        let receiver = topology.element("intersrc_a").unwrap().clone();
        assert_eq!(engine.element_state(&receiver), ElementState::Playing);
        topology.attach_tunnel("a").unwrap();
        assert!(topology.tunnel("a").unwrap().attached);

        assert_eq!(
            topology.open_deferred("ghost", AttachMode::Immediate).unwrap_err(),
            TopologyError::UnknownTunnel("ghost".into())
        );
    }

    #[test]
    fn test_discard_retained() {
        let mut topology = lazy_scenario();
        topology.defer_connection("cam", "q", "main", "tee").unwrap();
        topology.open_deferred("cam", AttachMode::Immediate).unwrap();
        topology.release_tunnel("cam").unwrap();
        let engine = topology.engine().clone();
        let alive = engine.element_count();

        topology.discard_retained("cam");
        assert!(!topology.contains_node("intersink_cam"));
        assert!(!topology.contains_node("gatequeue_cam"));
        assert_eq!(engine.element_count(), alive - 2);
        // The connection stays deferred and reopens from scratch
        topology.open_deferred("cam", AttachMode::Immediate).unwrap();
        assert!(topology.tunnel("cam").unwrap().attached);
    }
}
