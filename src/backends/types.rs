// SPDX-License-Identifier: GPL-3.0-only

//! Shared types for engine and serving-layer backends

use std::fmt;
use thiserror::Error;

/// Result type for engine calls
pub type EngineResult<T> = Result<T, EngineError>;

/// Execution state of an element or pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ElementState {
    /// Inert: no resources held
    #[default]
    Null,
    Ready,
    Paused,
    Playing,
}

impl fmt::Display for ElementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementState::Null => write!(f, "NULL"),
            ElementState::Ready => write!(f, "READY"),
            ElementState::Paused => write!(f, "PAUSED"),
            ElementState::Playing => write!(f, "PLAYING"),
        }
    }
}

/// Viewer-facing state of a served media instance, as reported by the
/// serving layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaState {
    /// At least one viewer is being served
    Presenting,
    /// No viewer is left; the instance was stopped
    Inert,
    /// Transitional states (preparing, paused) the bridge does not act on
    Transitional,
}

impl MediaState {
    /// Map an element state reported by the serving layer
    pub fn from_element_state(state: ElementState) -> Self {
        match state {
            ElementState::Playing => MediaState::Presenting,
            ElementState::Null | ElementState::Ready => MediaState::Inert,
            ElementState::Paused => MediaState::Transitional,
        }
    }
}

/// Errors reported by a media engine backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// No element factory for the type
    #[error("no element factory \"{0}\"")]
    NoSuchFactory(String),
    /// Element does not expose the property
    #[error("no property \"{0}\"")]
    NoSuchProperty(String),
    /// Value could not be coerced to the property type
    #[error("invalid value for \"{property}\": {reason}")]
    InvalidValue { property: String, reason: String },
    #[error("invalid caps: {0}")]
    InvalidCaps(String),
    /// Element already has a parent bin
    #[error("already in \"{0}\"")]
    AlreadyParented(String),
    /// Element is not a child of the bin
    #[error("not a child: {0}")]
    NotParented(String),
    /// Negotiation found no common format
    #[error("no common format")]
    IncompatibleFormats,
    /// Structural link refusal (missing pad, already linked, hierarchy)
    #[error("{0}")]
    NotLinkable(String),
    /// Element has no request source pad template
    #[error("no request pad template")]
    NoPadTemplate,
    #[error("state change failed: {0}")]
    StateChange(String),
    /// Anything else the backend reports
    #[error("{0}")]
    Other(String),
}
