// SPDX-License-Identifier: GPL-3.0-only

//! In-process stand-in for the RTSP serving layer
//!
//! Viewers are simulated with [`DryRunServer::connect`] and
//! [`DryRunServer::disconnect`]. The first viewer of a path moves its media to
//! [`MediaState::Presenting`] and the last one leaving moves it to
//! [`MediaState::Inert`], the same notifications a real server emits.

use super::{DryPipeline, DryRunEngine};
use crate::backends::{MediaFactory, MediaServer, MediaState};
use crate::errors::{TopologyError, TopologyResult};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

struct Mount {
    factory: Arc<dyn MediaFactory<DryRunEngine>>,
    viewers: usize,
}

/// Simulated RTSP server
#[derive(Default)]
pub struct DryRunServer {
    mounts: Mutex<BTreeMap<String, Mount>>,
    running: AtomicBool,
    /// Sessions that ended and wait for the next sweep
    expired: AtomicUsize,
    sweeps: AtomicUsize,
}

impl DryRunServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Mounted paths in order
    pub fn mounted_paths(&self) -> Vec<String> {
        self.mounts.lock().unwrap().keys().cloned().collect()
    }

    /// Connected viewers on a path
    pub fn viewers(&self, path: &str) -> usize {
        self.mounts
            .lock()
            .unwrap()
            .get(path)
            .map(|mount| mount.viewers)
            .unwrap_or(0)
    }

    /// Number of session sweeps performed
    pub fn sweeps(&self) -> usize {
        self.sweeps.load(Ordering::SeqCst)
    }

    /// Simulate a viewer opening `path`
    ///
    /// Returns the instance the factory handed out for the viewer.
    pub fn connect(&self, path: &str) -> TopologyResult<DryPipeline> {
        if !self.is_running() {
            return Err(TopologyError::Server("server is not running".to_string()));
        }
        let factory = self.factory(path)?;

        factory.resolve_pipeline(path)?;
        let instance = factory.materialize_pipeline(path)?;

        let first = {
            let mut mounts = self.mounts.lock().unwrap();
            let mount = mounts
                .get_mut(path)
                .ok_or_else(|| TopologyError::UnknownPath(path.to_string()))?;
            mount.viewers += 1;
            mount.viewers == 1
        };
        debug!(path, "dry-run: viewer connected");
        if first {
            factory.media_state_changed(path, MediaState::Presenting);
        }
        Ok(instance)
    }

    /// Simulate a viewer leaving `path`
    pub fn disconnect(&self, path: &str) -> TopologyResult<()> {
        let factory = self.factory(path)?;
        let last = {
            let mut mounts = self.mounts.lock().unwrap();
            let mount = mounts
                .get_mut(path)
                .ok_or_else(|| TopologyError::UnknownPath(path.to_string()))?;
            if mount.viewers == 0 {
                return Err(TopologyError::Server(format!("no viewer on {}", path)));
            }
            mount.viewers -= 1;
            mount.viewers == 0
        };
        self.expired.fetch_add(1, Ordering::SeqCst);
        debug!(path, "dry-run: viewer disconnected");
        if last {
            factory.media_state_changed(path, MediaState::Inert);
        }
        Ok(())
    }

    /// Deliver a raw state notification, bypassing viewer accounting
    pub fn notify(&self, path: &str, state: MediaState) -> TopologyResult<()> {
        self.factory(path)?.media_state_changed(path, state);
        Ok(())
    }

    fn factory(&self, path: &str) -> TopologyResult<Arc<dyn MediaFactory<DryRunEngine>>> {
        self.mounts
            .lock()
            .unwrap()
            .get(path)
            .map(|mount| Arc::clone(&mount.factory))
            .ok_or_else(|| TopologyError::UnknownPath(path.to_string()))
    }
}

impl MediaServer<DryRunEngine> for DryRunServer {
    fn mount(&self, path: &str, factory: Arc<dyn MediaFactory<DryRunEngine>>) -> TopologyResult<()> {
        let mut mounts = self.mounts.lock().unwrap();
        if mounts.contains_key(path) {
            return Err(TopologyError::AlreadyRegistered(path.to_string()));
        }
        mounts.insert(path.to_string(), Mount { factory, viewers: 0 });
        debug!(path, "dry-run: mounted");
        Ok(())
    }

    fn unmount(&self, path: &str) {
        self.mounts.lock().unwrap().remove(path);
    }

    fn start(&self) -> TopologyResult<()> {
        self.running.store(true, Ordering::SeqCst);
        info!("dry-run server started");
        Ok(())
    }

    fn cleanup_sessions(&self) -> usize {
        self.sweeps.fetch_add(1, Ordering::SeqCst);
        self.expired.swap(0, Ordering::SeqCst)
    }

    fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("dry-run server stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MediaEngine;

    /// Factory handing out one pipeline and recording notifications
    struct Recorder {
        pipeline: DryPipeline,
        states: Mutex<Vec<MediaState>>,
    }

    impl MediaFactory<DryRunEngine> for Recorder {
        fn resolve_pipeline(&self, _path: &str) -> TopologyResult<DryPipeline> {
            Ok(self.pipeline.clone())
        }

        fn materialize_pipeline(&self, _path: &str) -> TopologyResult<DryPipeline> {
            Ok(self.pipeline.clone())
        }

        fn media_state_changed(&self, _path: &str, state: MediaState) {
            self.states.lock().unwrap().push(state);
        }
    }

    fn recorder() -> Arc<Recorder> {
        let engine = DryRunEngine::new();
        Arc::new(Recorder {
            pipeline: engine.make_pipeline("cam").unwrap(),
            states: Mutex::new(Vec::new()),
        })
    }

    #[test]
    fn test_duplicate_mount() {
        let server = DryRunServer::new();
        server.mount("/cam", recorder()).unwrap();
        assert_eq!(
            server.mount("/cam", recorder()).unwrap_err(),
            TopologyError::AlreadyRegistered("/cam".into())
        );
    }

    #[test]
    fn test_connect_requires_running_server() {
        let server = DryRunServer::new();
        server.mount("/cam", recorder()).unwrap();
        assert!(matches!(server.connect("/cam"), Err(TopologyError::Server(_))));
    }

    #[test]
    fn test_first_and_last_viewer_notify() {
        let server = DryRunServer::new();
        let factory = recorder();
        server.mount("/cam", factory.clone()).unwrap();
        server.start().unwrap();

        server.connect("/cam").unwrap();
        server.connect("/cam").unwrap();
        assert_eq!(server.viewers("/cam"), 2);
        server.disconnect("/cam").unwrap();
        server.disconnect("/cam").unwrap();

        assert_eq!(
            *factory.states.lock().unwrap(),
            vec![MediaState::Presenting, MediaState::Inert]
        );
        assert_eq!(server.cleanup_sessions(), 2);
        assert_eq!(server.cleanup_sessions(), 0);
    }

    #[test]
    fn test_unknown_path() {
        let server = DryRunServer::new();
        server.start().unwrap();
        assert_eq!(
            server.connect("/nope").unwrap_err(),
            TopologyError::UnknownPath("/nope".into())
        );
    }
}
