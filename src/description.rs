// SPDX-License-Identifier: GPL-3.0-only

//! Declarative topology descriptions
//!
//! A description is a JSON document:
//!
//! ```json
//! {
//!   "caps":  { "main_caps": "video/x-raw,width=640,height=480" },
//!   "pipes": {
//!     "main": {
//!       "src":   { "type": "videotestsrc", "pattern": "ball", "is-live": true },
//!       "scale": { "type": "videoscale" },
//!       "tee":   { "type": "tee" }
//!     },
//!     "cam": {
//!       "q":   { "type": "queue" },
//!       "vga": { "type": "capsfilter", "filter": "main_caps" },
//!       "enc": { "type": "x264enc" }
//!     }
//!   },
//!   "rtsp": ["cam"],
//!   "connections": { "cam": { "first_elem": "q", "src_pipe": "main", "src_last_elem": "tee" } },
//!   "links": [["scale", "tee"], ["q", "vga", "enc"]],
//!   "filtered_links": [["src", "scale", "main_caps"]]
//! }
//! ```
//!
//! Sections are applied in a fixed order: caps, pipes (creating each node,
//! setting its properties and filter and adding it to its pipe), rtsp,
//! connections, links and finally filtered links. Connections into a
//! servable pipe are deferred until the pipe is first served; the others are
//! opened immediately.

use crate::backends::MediaEngine;
use crate::errors::LoadError;
use crate::topology::{AttachMode, Topology};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

/// A property value as written in the description
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Text(String),
    Number(serde_json::Number),
    Flag(bool),
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Text(text) => write!(f, "{}", text),
            PropertyValue::Number(number) => write!(f, "{}", number),
            PropertyValue::Flag(flag) => write!(f, "{}", flag),
        }
    }
}

/// One node of a pipe; every key besides `type` and `filter` is a property
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NodeSpec {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(flatten)]
    pub properties: BTreeMap<String, PropertyValue>,
}

/// A tunnel request keyed by its destination pipe
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionSpec {
    pub first_elem: String,
    pub src_pipe: String,
    pub src_last_elem: String,
}

/// Raw document; sections whose entries need attributable errors are kept
/// as JSON values until [`Description::parse`] checks them
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDescription {
    #[serde(default)]
    caps: BTreeMap<String, String>,
    #[serde(default)]
    pipes: BTreeMap<String, BTreeMap<String, Value>>,
    #[serde(default)]
    rtsp: Vec<String>,
    #[serde(default)]
    connections: BTreeMap<String, Value>,
    #[serde(default)]
    links: Vec<Value>,
    #[serde(default)]
    filtered_links: Vec<Value>,
}

/// A validated description
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Description {
    pub caps: BTreeMap<String, String>,
    pub pipes: BTreeMap<String, BTreeMap<String, NodeSpec>>,
    pub rtsp: Vec<String>,
    pub connections: BTreeMap<String, ConnectionSpec>,
    pub links: Vec<Vec<String>>,
    pub filtered_links: Vec<(String, String, String)>,
}

impl Description {
    /// Parse and shape-check a JSON description
    pub fn parse(json: &str) -> Result<Self, LoadError> {
        let raw: RawDescription = serde_json::from_str(json)?;

        let mut pipes = BTreeMap::new();
        for (pipe, nodes) in raw.pipes {
            let mut specs = BTreeMap::new();
            for (node, value) in nodes {
                let spec: NodeSpec = serde_json::from_value(value).map_err(|e| {
                    LoadError::Invalid(format!("node \"{}\" in pipe \"{}\": {}", node, pipe, e))
                })?;
                specs.insert(node, spec);
            }
            pipes.insert(pipe, specs);
        }

        let mut connections = BTreeMap::new();
        for (pipe, value) in raw.connections {
            let spec: ConnectionSpec = serde_json::from_value(value).map_err(|e| {
                LoadError::Invalid(format!("connection into \"{}\": {}", pipe, e))
            })?;
            connections.insert(pipe, spec);
        }

        let mut links = Vec::with_capacity(raw.links.len());
        for (index, value) in raw.links.into_iter().enumerate() {
            let chain: Vec<String> = serde_json::from_value(value).map_err(|e| {
                LoadError::Invalid(format!("link #{}: expected an array of node names ({})", index, e))
            })?;
            links.push(chain);
        }

        let mut filtered_links = Vec::with_capacity(raw.filtered_links.len());
        for (index, value) in raw.filtered_links.into_iter().enumerate() {
            let (src, dst, cap): (String, String, String) = serde_json::from_value(value).map_err(|e| {
                LoadError::Invalid(format!(
                    "filtered link #{}: expected [source, destination, cap] ({})",
                    index, e
                ))
            })?;
            filtered_links.push((src, dst, cap));
        }

        Ok(Self {
            caps: raw.caps,
            pipes,
            rtsp: raw.rtsp,
            connections,
            links,
            filtered_links,
        })
    }

    /// Build the described graph into `topology`
    pub fn apply<E: MediaEngine>(&self, topology: &mut Topology<E>) -> Result<(), LoadError> {
        for (name, expression) in &self.caps {
            topology.create_cap(name, expression)?;
        }

        for (pipe, nodes) in &self.pipes {
            topology.create_pipeline(pipe)?;
            for (node, spec) in nodes {
                topology.create_element(node, &spec.type_name)?;
                for (key, value) in &spec.properties {
                    topology.set_property(node, key, &value.to_string())?;
                }
                if let Some(cap) = &spec.filter {
                    topology.assign_cap(node, cap)?;
                }
                topology.add_element_to_bin(node, pipe)?;
            }
            debug!(pipeline = %pipe, nodes = nodes.len(), "Pipe loaded");
        }

        for pipe in &self.rtsp {
            topology.mark_servable(pipe)?;
        }

        for (destination, connection) in &self.connections {
            if topology.is_servable(destination) {
                topology.defer_connection(
                    destination,
                    &connection.first_elem,
                    &connection.src_pipe,
                    &connection.src_last_elem,
                )?;
            } else {
                topology.connect_pipe(
                    destination,
                    &connection.first_elem,
                    &connection.src_pipe,
                    &connection.src_last_elem,
                    AttachMode::Immediate,
                )?;
            }
        }

        for chain in &self.links {
            for pair in chain.windows(2) {
                topology.connect_elements(&pair[0], &pair[1])?;
            }
        }

        for (src, dst, cap) in &self.filtered_links {
            topology.connect_elements_filtered(src, dst, cap)?;
        }

        info!(
            caps = self.caps.len(),
            pipes = self.pipes.len(),
            servable = self.rtsp.len(),
            connections = self.connections.len(),
            "Topology loaded"
        );
        Ok(())
    }
}

/// Parse `json` and build it into `topology`
pub fn load_str<E: MediaEngine>(json: &str, topology: &mut Topology<E>) -> Result<(), LoadError> {
    Description::parse(json)?.apply(topology)
}

/// Read a description file and build it into `topology`
pub fn load_file<E: MediaEngine>(path: &Path, topology: &mut Topology<E>) -> Result<(), LoadError> {
    let json = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), "Read topology description");
    load_str(&json, topology)
}
