// SPDX-License-Identifier: GPL-3.0-only

//! Per-path serving state

use crate::backends::{ElementState, MediaEngine, MediaState};
use crate::constants::naming;
use crate::errors::{TopologyError, TopologyResult};
use crate::topology::{AttachMode, Topology};
use std::fmt;
use std::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Lifecycle phase of a served path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathPhase {
    /// No instance has been built
    Unbuilt,
    /// Instance built, no tunnel feeding it
    Idle,
    /// Viewers are watching; the tunnel is fully wired
    Active,
}

impl fmt::Display for PathPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathPhase::Unbuilt => write!(f, "unbuilt"),
            PathPhase::Idle => write!(f, "idle"),
            PathPhase::Active => write!(f, "active"),
        }
    }
}

/// What the bridge knows about one path
pub(crate) struct Binding<E: MediaEngine> {
    pipe: String,
    pipeline: E::Pipeline,
    instance: Option<E::Pipeline>,
    phase: PathPhase,
}

impl<E: MediaEngine> Binding<E> {
    pub fn new(pipe: &str, pipeline: E::Pipeline) -> Self {
        Self {
            pipe: pipe.to_string(),
            pipeline,
            instance: None,
            phase: PathPhase::Unbuilt,
        }
    }

    pub fn pipeline(&self) -> &E::Pipeline {
        &self.pipeline
    }

    pub fn instance(&self) -> Option<&E::Pipeline> {
        self.instance.as_ref()
    }

    pub fn phase(&self) -> PathPhase {
        self.phase
    }

    /// The shared instance, built on first call
    ///
    /// Building it also opens the deferred tunnel into the pipe, receiver
    /// side only. A full tunnel table leaves the connection deferred until
    /// the stream goes live.
    pub fn materialize(&mut self, topology: &Mutex<Topology<E>>) -> TopologyResult<E::Pipeline> {
        if let Some(instance) = &self.instance {
            return Ok(instance.clone());
        }

        let mut topology = topology.lock().unwrap();
        let name = naming::instance(&self.pipe);
        let instance = topology
            .engine()
            .make_pipeline(&name)
            .map_err(|e| TopologyError::Engine {
                target: name.clone(),
                reason: e.to_string(),
            })?;

        if topology.deferred(&self.pipe).is_some() {
            match topology.open_deferred(&self.pipe, AttachMode::OnDemand) {
                Ok(()) => {}
                Err(TopologyError::ResourceExhausted { limit }) => {
                    warn!(pipe = %self.pipe, limit, "Tunnel limit reached, connection stays deferred");
                }
                Err(e) => return Err(e),
            }
        }

        info!(pipe = %self.pipe, instance = %name, "Media instance built");
        self.instance = Some(instance.clone());
        self.phase = PathPhase::Idle;
        Ok(instance)
    }

    /// React to a state notification from the serving layer
    pub fn media_state_changed(&mut self, state: MediaState, topology: &Mutex<Topology<E>>) {
        match (self.phase, state) {
            (PathPhase::Idle, MediaState::Presenting) => {
                let result = {
                    let mut topology = topology.lock().unwrap();
                    if topology.tunnel(&self.pipe).is_some() {
                        topology.attach_tunnel(&self.pipe)
                    } else if topology.deferred(&self.pipe).is_some() {
                        topology.open_deferred(&self.pipe, AttachMode::Immediate)
                    } else {
                        Ok(())
                    }
                };
                match result {
                    Ok(()) => {
                        self.phase = PathPhase::Active;
                        info!(pipe = %self.pipe, "Stream active");
                    }
                    Err(e) => error!(pipe = %self.pipe, error = %e, "Failed to attach gateway"),
                }
            }
            (PathPhase::Active, MediaState::Inert) => {
                let result = {
                    let mut topology = topology.lock().unwrap();
                    if topology.tunnel(&self.pipe).is_some() {
                        topology.release_tunnel(&self.pipe)
                    } else {
                        Ok(())
                    }
                };
                match result {
                    Ok(()) => {
                        self.phase = PathPhase::Idle;
                        info!(pipe = %self.pipe, "Stream idle");
                    }
                    Err(e) => error!(pipe = %self.pipe, error = %e, "Failed to release gateway"),
                }
            }
            (PathPhase::Unbuilt, _) => {
                warn!(pipe = %self.pipe, ?state, "State change before the media was built");
            }
            (phase, state) => {
                debug!(pipe = %self.pipe, %phase, ?state, "Ignoring state change");
            }
        }
    }

    /// Tear the path back down to [`PathPhase::Unbuilt`]
    pub fn shutdown(&mut self, topology: &Mutex<Topology<E>>) {
        let mut topology = topology.lock().unwrap();
        if topology.tunnel(&self.pipe).is_some()
            && let Err(e) = topology.release_tunnel(&self.pipe)
        {
            error!(pipe = %self.pipe, error = %e, "Failed to close gateway");
        }
        topology.discard_retained(&self.pipe);
        if let Some(instance) = self.instance.take()
            && let Err(e) = topology.engine().set_pipeline_state(&instance, ElementState::Null)
        {
            warn!(pipe = %self.pipe, error = %e, "Failed to stop media instance");
        }
        self.phase = PathPhase::Unbuilt;
    }
}
