// SPDX-License-Identifier: GPL-3.0-only

//! Error types for topology construction, loading and serving

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using TopologyError
pub type TopologyResult<T> = Result<T, TopologyError>;

/// Errors reported synchronously by the registries, the graph builder,
/// the gateway and the streaming bridge.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    /// A node, cap or pipeline with this name already exists
    #[error("{kind} \"{name}\" already exists")]
    DuplicateName { kind: &'static str, name: String },

    #[error("unknown node \"{0}\"")]
    UnknownNode(String),

    #[error("unknown pipeline \"{0}\"")]
    UnknownPipeline(String),

    #[error("unknown cap \"{0}\"")]
    UnknownCap(String),

    #[error("unknown gateway tunnel \"{0}\"")]
    UnknownTunnel(String),

    /// The engine has no element factory for the requested type
    #[error("node \"{node}\": unsupported element type \"{type_name}\"")]
    UnsupportedType { node: String, type_name: String },

    /// The engine rejected a caps expression
    #[error("cap \"{cap}\": invalid expression \"{expression}\" ({reason})")]
    InvalidExpression {
        cap: String,
        expression: String,
        reason: String,
    },

    /// The engine could not apply a property value
    #[error("node \"{node}\": cannot set \"{property}\" to \"{value}\" ({reason})")]
    InvalidProperty {
        node: String,
        property: String,
        value: String,
        reason: String,
    },

    /// The node already belongs to a pipeline
    #[error("node \"{node}\" is already owned by pipeline \"{pipeline}\"")]
    AlreadyOwned { node: String, pipeline: String },

    #[error("cannot link \"{src}\" to \"{dst}\": {reason}")]
    LinkRejected {
        src: String,
        dst: String,
        reason: String,
    },

    #[error("cannot link \"{src}\" to \"{dst}\": no common format")]
    IncompatibleFormats { src: String, dst: String },

    /// Fan-out attempted on a node without request output pads
    #[error("node \"{0}\" has no request output pad template")]
    NoPadTemplate(String),

    /// The tunnel destination does not name a pipeline
    #[error("\"{0}\" is not a pipeline")]
    NotAPipeline(String),

    #[error("gateway tunnel limit reached ({limit} open)")]
    ResourceExhausted { limit: usize },

    #[error("\"{0}\" is already registered")]
    AlreadyRegistered(String),

    #[error("no stream is registered at \"{0}\"")]
    UnknownPath(String),

    #[error("\"{target}\" failed to change state to {state}: {reason}")]
    StateChange {
        target: String,
        state: String,
        reason: String,
    },

    /// Engine failure with no more specific classification
    #[error("\"{target}\": {reason}")]
    Engine { target: String, reason: String },

    /// Serving layer failure (mounting, attaching the server)
    #[error("server error: {0}")]
    Server(String),
}

/// Errors raised while reading and applying a topology description
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse topology description: {0}")]
    Parse(#[from] serde_json::Error),

    /// The description is well-formed JSON but structurally wrong
    #[error("invalid topology description: {0}")]
    Invalid(String),

    #[error(transparent)]
    Topology(#[from] TopologyError),
}

/// Errors raised while reading the application configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_offender() {
        let err = TopologyError::DuplicateName {
            kind: "node",
            name: "tee0".into(),
        };
        assert_eq!(err.to_string(), "node \"tee0\" already exists");

        let err = TopologyError::IncompatibleFormats {
            src: "enc".into(),
            dst: "sink".into(),
        };
        assert!(err.to_string().contains("\"enc\""));
        assert!(err.to_string().contains("\"sink\""));
    }

    #[test]
    fn test_topology_error_converts_into_load_error() {
        let err: LoadError = TopologyError::UnknownCap("main_caps".into()).into();
        assert_eq!(err.to_string(), "unknown cap \"main_caps\"");
    }
}
