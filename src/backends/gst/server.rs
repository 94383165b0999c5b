// SPDX-License-Identifier: GPL-3.0-only

//! RTSP serving layer on top of `gstreamer-rtsp-server`
//!
//! Each mounted path gets a custom media factory that hands construction
//! back to the streaming bridge:
//!
//! - `create_element` returns the servable pipeline registered for the path
//! - `create_pipeline` asks the bridge for the shared instance, marks the
//!   media reusable and forwards its state changes to the bridge
//!
//! The server is attached to a private GLib main context whose loop runs on
//! a dedicated thread, joined in [`GstRtspServer::stop`].

use super::GstEngine;
use crate::backends::{ElementState, MediaFactory, MediaServer, MediaState};
use crate::errors::{TopologyError, TopologyResult};
use gstreamer as gst;
use gstreamer::glib;
use gstreamer_rtsp as gst_rtsp;
use gstreamer_rtsp_server as gst_rtsp_server;
use gstreamer_rtsp_server::prelude::*;
use gstreamer_rtsp_server::subclass::prelude::*;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::JoinHandle;
use tracing::{debug, error, info};

mod imp {
    use super::*;

    pub struct Route {
        pub path: String,
        pub bridge: Arc<dyn MediaFactory<GstEngine>>,
    }

    #[derive(Default)]
    pub struct TopologyMediaFactory {
        pub route: OnceLock<Route>,
    }

    #[glib::object_subclass]
    impl ObjectSubclass for TopologyMediaFactory {
        const NAME: &'static str = "RtspTopologyMediaFactory";
        type Type = super::TopologyMediaFactory;
        type ParentType = gst_rtsp_server::RTSPMediaFactory;
    }

    impl ObjectImpl for TopologyMediaFactory {}

    impl RTSPMediaFactoryImpl for TopologyMediaFactory {
        fn create_element(&self, url: &gst_rtsp::RTSPUrl) -> Option<gst::Element> {
            let route = self.route.get()?;
            match route.bridge.resolve_pipeline(&route.path) {
                Ok(pipeline) => {
                    info!(
                        url = %url.request_uri(),
                        path = %route.path,
                        pipeline = %pipeline.name(),
                        "Created media from servable pipeline"
                    );
                    Some(pipeline.upcast())
                }
                Err(e) => {
                    error!(path = %route.path, error = %e, "Failed to resolve pipeline");
                    None
                }
            }
        }

        fn create_pipeline(&self, media: &gst_rtsp_server::RTSPMedia) -> Option<gst::Pipeline> {
            let route = self.route.get()?;
            let pipeline = match route.bridge.materialize_pipeline(&route.path) {
                Ok(pipeline) => pipeline,
                Err(e) => {
                    error!(path = %route.path, error = %e, "Failed to build media pipeline");
                    return None;
                }
            };

            let element = media.element();
            if element.parent().is_none()
                && let Err(e) = pipeline.add(&element)
            {
                error!(path = %route.path, error = %e, "Failed to add media element");
                return None;
            }

            media.take_pipeline(pipeline.clone());
            // The instance outlives its viewers; it is torn down by the bridge
            media.set_reusable(true);

            let path = route.path.clone();
            let bridge = Arc::clone(&route.bridge);
            media.connect_new_state(move |_, raw| {
                let state = MediaState::from_element_state(state_from_raw(raw));
                bridge.media_state_changed(&path, state);
            });

            Some(pipeline)
        }
    }
}

glib::wrapper! {
    pub struct TopologyMediaFactory(ObjectSubclass<imp::TopologyMediaFactory>)
        @extends gst_rtsp_server::RTSPMediaFactory;
}

impl TopologyMediaFactory {
    fn new(path: &str, bridge: Arc<dyn MediaFactory<GstEngine>>) -> Self {
        let factory: Self = glib::Object::new();
        let _ = factory.imp().route.set(imp::Route {
            path: path.to_string(),
            bridge,
        });
        // One running instance for every viewer of the path
        factory.set_shared(true);
        factory
    }
}

/// `GstState` as carried by the media `new-state` signal
fn state_from_raw(raw: i32) -> ElementState {
    match raw {
        2 => ElementState::Ready,
        3 => ElementState::Paused,
        4 => ElementState::Playing,
        _ => ElementState::Null,
    }
}

/// RTSP server driven by a GLib main loop on its own thread
pub struct GstRtspServer {
    server: gst_rtsp_server::RTSPServer,
    context: glib::MainContext,
    main_loop: glib::MainLoop,
    mounted: Mutex<BTreeSet<String>>,
    source: Mutex<Option<glib::SourceId>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl GstRtspServer {
    pub fn new(address: &str, port: u16) -> Self {
        let server = gst_rtsp_server::RTSPServer::new();
        server.set_address(address);
        server.set_service(&port.to_string());

        let context = glib::MainContext::new();
        let main_loop = glib::MainLoop::new(Some(&context), false);

        Self {
            server,
            context,
            main_loop,
            mounted: Mutex::new(BTreeSet::new()),
            source: Mutex::new(None),
            thread: Mutex::new(None),
        }
    }

    /// Port the server is bound to, once started
    pub fn bound_port(&self) -> i32 {
        self.server.bound_port()
    }
}

impl MediaServer<GstEngine> for GstRtspServer {
    fn mount(&self, path: &str, factory: Arc<dyn MediaFactory<GstEngine>>) -> TopologyResult<()> {
        let mut mounted = self.mounted.lock().unwrap();
        if mounted.contains(path) {
            return Err(TopologyError::AlreadyRegistered(path.to_string()));
        }
        let mounts = self
            .server
            .mount_points()
            .ok_or_else(|| TopologyError::Server("server has no mount points".to_string()))?;
        mounts.add_factory(path, TopologyMediaFactory::new(path, factory));
        mounted.insert(path.to_string());
        debug!(path, "Mounted media factory");
        Ok(())
    }

    fn unmount(&self, path: &str) {
        if self.mounted.lock().unwrap().remove(path)
            && let Some(mounts) = self.server.mount_points()
        {
            mounts.remove_factory(path);
        }
    }

    fn start(&self) -> TopologyResult<()> {
        let mut source = self.source.lock().unwrap();
        if source.is_some() {
            return Ok(());
        }
        let id = self
            .server
            .attach(Some(&self.context))
            .map_err(|e| TopologyError::Server(format!("failed to attach the server: {}", e)))?;
        *source = Some(id);

        let context = self.context.clone();
        let main_loop = self.main_loop.clone();
        let handle = std::thread::Builder::new()
            .name("rtsp-main-loop".to_string())
            .spawn(move || {
                let _guard = match context.acquire() {
                    Ok(guard) => guard,
                    Err(e) => {
                        error!(error = %e, "Failed to acquire GLib main context on RTSP thread");
                        return;
                    }
                };
                main_loop.run();
                debug!("RTSP main loop exited");
            })
            .map_err(|e| TopologyError::Server(format!("failed to spawn main loop: {}", e)))?;
        *self.thread.lock().unwrap() = Some(handle);

        info!(
            address = %self.server.address().unwrap_or_default(),
            service = %self.server.service().unwrap_or_default(),
            "RTSP server started"
        );
        Ok(())
    }

    fn cleanup_sessions(&self) -> usize {
        self.server
            .session_pool()
            .map(|pool| pool.cleanup() as usize)
            .unwrap_or(0)
    }

    fn stop(&self) {
        if let Some(id) = self.source.lock().unwrap().take() {
            id.remove();
        }
        self.main_loop.quit();
        if let Some(handle) = self.thread.lock().unwrap().take()
            && handle.join().is_err()
        {
            error!("RTSP main loop thread panicked");
        }
        info!("RTSP server stopped");
    }
}

impl Drop for GstRtspServer {
    fn drop(&mut self) {
        if self.thread.lock().unwrap().is_some() {
            self.stop();
        }
    }
}
