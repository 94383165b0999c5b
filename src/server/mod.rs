// SPDX-License-Identifier: GPL-3.0-only

//! Streaming bridge
//!
//! [`RtspServer`] exposes every servable pipeline of a [`Topology`] at
//! `/<pipe>` on a [`MediaServer`]. Nothing is built at registration time:
//! the first viewer of a path builds the shared instance and opens the
//! gateway tunnel into it, the stream going live attaches the tunnel's
//! sender side to the capture graph and the last viewer leaving closes the
//! tunnel again. The sender side is kept aside for the next viewer, and the
//! closed tunnel frees its slot for other paths.
//!
//! ```text
//!              first request           Presenting
//!   Unbuilt ─────────────────▶ Idle ─────────────▶ Active
//!      ▲                        ▲                    │
//!      │ shutdown               └────── Inert ───────┘
//! ```
//!
//! Each path is guarded by its own lock. The topology lock is always taken
//! inside a path lock, never the other way round.

mod binding;
mod sessions;

pub use binding::PathPhase;

use crate::backends::{MediaEngine, MediaFactory, MediaServer, MediaState};
use crate::constants::{naming, server::SESSION_CLEANUP_INTERVAL};
use crate::errors::{TopologyError, TopologyResult};
use crate::topology::Topology;
use binding::Binding;
use sessions::Maintenance;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tracing::{info, warn};

type SharedBinding<E> = Arc<Mutex<Binding<E>>>;

/// Path table handed to the serving layer as its media factory
struct Bridge<E: MediaEngine> {
    topology: Arc<Mutex<Topology<E>>>,
    bindings: RwLock<BTreeMap<String, SharedBinding<E>>>,
}

impl<E: MediaEngine> Bridge<E> {
    fn binding(&self, path: &str) -> TopologyResult<SharedBinding<E>> {
        self.bindings
            .read()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| TopologyError::UnknownPath(path.to_string()))
    }
}

impl<E: MediaEngine> MediaFactory<E> for Bridge<E> {
    fn resolve_pipeline(&self, path: &str) -> TopologyResult<E::Pipeline> {
        let binding = self.binding(path)?;
        let pipeline = binding.lock().unwrap().pipeline().clone();
        Ok(pipeline)
    }

    fn materialize_pipeline(&self, path: &str) -> TopologyResult<E::Pipeline> {
        let binding = self.binding(path)?;
        let mut binding = binding.lock().unwrap();
        binding.materialize(&self.topology)
    }

    fn media_state_changed(&self, path: &str, state: MediaState) {
        match self.binding(path) {
            Ok(binding) => {
                binding
                    .lock()
                    .unwrap()
                    .media_state_changed(state, &self.topology);
            }
            Err(_) => warn!(path, ?state, "State change for an unregistered path"),
        }
    }
}

/// Serves the servable pipelines of a topology through a [`MediaServer`]
pub struct RtspServer<E: MediaEngine, S: MediaServer<E> + 'static> {
    bridge: Arc<Bridge<E>>,
    server: Arc<S>,
    maintenance: Mutex<Option<Maintenance>>,
    cleanup_interval: Duration,
}

impl<E: MediaEngine, S: MediaServer<E> + 'static> RtspServer<E, S> {
    pub fn new(topology: Arc<Mutex<Topology<E>>>, server: Arc<S>) -> Self {
        Self {
            bridge: Arc::new(Bridge {
                topology,
                bindings: RwLock::new(BTreeMap::new()),
            }),
            server,
            maintenance: Mutex::new(None),
            cleanup_interval: SESSION_CLEANUP_INTERVAL,
        }
    }

    /// Sweep expired sessions every `interval` instead of the default
    ///
    /// A zero interval is rejected and the default kept.
    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        if interval.is_zero() {
            warn!(
                default = ?SESSION_CLEANUP_INTERVAL,
                "Session cleanup interval must be positive, keeping the default"
            );
            return self;
        }
        self.cleanup_interval = interval;
        self
    }

    pub fn topology(&self) -> &Arc<Mutex<Topology<E>>> {
        &self.bridge.topology
    }

    pub fn server(&self) -> &Arc<S> {
        &self.server
    }

    /// Register `/<name>` for every pipeline in `pipes`
    ///
    /// The whole batch is checked first; when any path is taken nothing is
    /// mounted.
    pub fn register_rtsp_pipes(&self, pipes: &BTreeMap<String, E::Pipeline>) -> TopologyResult<()> {
        let mut bindings = self.bridge.bindings.write().unwrap();
        if let Some(path) = pipes
            .keys()
            .map(|name| naming::stream_path(name))
            .find(|path| bindings.contains_key(path))
        {
            return Err(TopologyError::AlreadyRegistered(path));
        }

        for (name, pipeline) in pipes {
            let path = naming::stream_path(name);
            let factory: Arc<dyn MediaFactory<E>> = self.bridge.clone();
            self.server.mount(&path, factory)?;
            bindings.insert(
                path.clone(),
                Arc::new(Mutex::new(Binding::new(name, pipeline.clone()))),
            );
            info!(path = %path, pipeline = %name, "Stream registered");
        }
        Ok(())
    }

    /// Register every pipeline the topology flags as servable
    pub fn register_servable(&self) -> TopologyResult<()> {
        let pipes = self.bridge.topology.lock().unwrap().servable_pipes();
        self.register_rtsp_pipes(&pipes)
    }

    /// Start the serving layer and, inside a tokio runtime, the session sweep
    pub fn start(&self) -> TopologyResult<()> {
        self.server.start()?;
        if tokio::runtime::Handle::try_current().is_err() {
            warn!("No tokio runtime, expired sessions will not be swept");
            return Ok(());
        }
        let mut maintenance = self.maintenance.lock().unwrap();
        if maintenance.is_none() {
            *maintenance = Some(Maintenance::spawn::<E, S>(
                Arc::clone(&self.server),
                self.cleanup_interval,
            ));
        }
        Ok(())
    }

    /// Stop serving and return every path to [`PathPhase::Unbuilt`]
    pub async fn shutdown(&self) {
        let maintenance = self.maintenance.lock().unwrap().take();
        if let Some(maintenance) = maintenance {
            maintenance.stop().await;
        }
        self.server.stop();

        let bindings: Vec<(String, SharedBinding<E>)> = self
            .bridge
            .bindings
            .read()
            .unwrap()
            .iter()
            .map(|(path, binding)| (path.clone(), Arc::clone(binding)))
            .collect();
        for (path, binding) in bindings {
            binding.lock().unwrap().shutdown(&self.bridge.topology);
            self.server.unmount(&path);
        }
        info!("Streaming bridge shut down");
    }

    /// Phase of a registered path
    pub fn path_state(&self, path: &str) -> Option<PathPhase> {
        let binding = self.bridge.binding(path).ok()?;
        let phase = binding.lock().unwrap().phase();
        Some(phase)
    }

    /// Registered paths in order
    pub fn paths(&self) -> Vec<String> {
        self.bridge.bindings.read().unwrap().keys().cloned().collect()
    }

    /// The shared instance serving `path`, if built
    pub fn instance(&self, path: &str) -> Option<E::Pipeline> {
        let binding = self.bridge.binding(path).ok()?;
        let instance = binding.lock().unwrap().instance().cloned();
        instance
    }
}

impl<E: MediaEngine, S: MediaServer<E> + 'static> Drop for RtspServer<E, S> {
    fn drop(&mut self) {
        if let Some(maintenance) = self.maintenance.lock().unwrap().take() {
            maintenance.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::dry_run::{DryRunEngine, DryRunServer};
    use crate::topology::test_support::{pipeline_with, topology};

    fn bridge() -> RtspServer<DryRunEngine, DryRunServer> {
        let mut topology = topology();
        pipeline_with(&mut topology, "cam", &[("enc", "fakeenc")]);
        topology.mark_servable("cam").unwrap();
        RtspServer::new(Arc::new(Mutex::new(topology)), Arc::new(DryRunServer::new()))
    }

    #[test]
    fn test_registration_is_lazy() {
        let rtsp = bridge();
        rtsp.register_servable().unwrap();
        assert_eq!(rtsp.paths(), vec!["/cam"]);
        assert_eq!(rtsp.server().mounted_paths(), vec!["/cam"]);
        assert_eq!(rtsp.path_state("/cam"), Some(PathPhase::Unbuilt));
        assert!(rtsp.instance("/cam").is_none());
    }

    #[test]
    fn test_duplicate_batch_mounts_nothing() {
        let rtsp = bridge();
        rtsp.register_servable().unwrap();

        let engine = Arc::clone(rtsp.topology().lock().unwrap().engine());
        let mut batch = BTreeMap::new();
        batch.insert("aaa".to_string(), engine.make_pipeline("aaa").unwrap());
        batch.insert("cam".to_string(), engine.make_pipeline("cam2").unwrap());

        assert_eq!(
            rtsp.register_rtsp_pipes(&batch).unwrap_err(),
            TopologyError::AlreadyRegistered("/cam".into())
        );
        assert_eq!(rtsp.paths(), vec!["/cam"]);
        assert_eq!(rtsp.server().mounted_paths(), vec!["/cam"]);
    }

    #[test]
    fn test_unknown_path() {
        let rtsp = bridge();
        assert_eq!(
            rtsp.bridge.resolve_pipeline("/nope").unwrap_err(),
            TopologyError::UnknownPath("/nope".into())
        );
        assert!(rtsp.path_state("/nope").is_none());
        // Logged and ignored
        rtsp.bridge.media_state_changed("/nope", MediaState::Presenting);
    }

    #[test]
    fn test_cleanup_interval() {
        let rtsp = bridge().with_cleanup_interval(Duration::ZERO);
        assert_eq!(rtsp.cleanup_interval, SESSION_CLEANUP_INTERVAL);

        let rtsp = bridge().with_cleanup_interval(Duration::from_secs(2));
        assert_eq!(rtsp.cleanup_interval, Duration::from_secs(2));
    }

    #[test]
    fn test_pipe_without_connection_still_cycles() {
        let rtsp = bridge();
        rtsp.register_servable().unwrap();
        rtsp.start().unwrap();

        rtsp.server().connect("/cam").unwrap();
        assert_eq!(rtsp.path_state("/cam"), Some(PathPhase::Active));
        rtsp.server().disconnect("/cam").unwrap();
        assert_eq!(rtsp.path_state("/cam"), Some(PathPhase::Idle));
    }
}
