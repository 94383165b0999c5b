// SPDX-License-Identifier: MPL-2.0

//! rtsp-topology - declarative media graphs served over RTSP on demand
//!
//! A JSON description names capabilities, pipelines of typed nodes, the
//! links between them and the tunnels joining one pipeline to another. A
//! subset of pipelines is flagged servable: those are exposed as RTSP paths
//! and only built, and tunnelled into the capture graph, while somebody is
//! watching.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: media engine and serving layer abstraction, with a
//!   dry-run implementation and a GStreamer one (feature `gst`)
//! - [`topology`]: node and cap registries, graph builder, fan-out and
//!   cross-pipeline gateway
//! - [`description`]: JSON topology descriptions
//! - [`server`]: streaming bridge from servable pipelines to RTSP paths
//! - [`config`]: user configuration handling
//!
//! # Example
//!
//! ```
//! use rtsp_topology::backends::dry_run::DryRunEngine;
//! use rtsp_topology::{Topology, description};
//! use std::sync::Arc;
//!
//! let mut topology = Topology::new(Arc::new(DryRunEngine::new()));
//! description::load_str(
//!     r#"{ "pipes": { "main": { "src": { "type": "videotestsrc" },
//!                               "sink": { "type": "fakesink" } } },
//!          "links": [["src", "sink"]] }"#,
//!     &mut topology,
//! )
//! .unwrap();
//! assert_eq!(topology.snapshot().edge_count(), 1);
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod description;
pub mod errors;
pub mod server;
pub mod topology;

// Re-export commonly used types
pub use config::Config;
pub use description::Description;
pub use errors::{ConfigError, LoadError, TopologyError, TopologyResult};
pub use server::{PathPhase, RtspServer};
pub use topology::{AttachMode, Topology, TopologySnapshot};
