// SPDX-License-Identifier: GPL-3.0-only

//! Pipeline bus logging
//!
//! Runtime errors never surface as return values; they arrive on the
//! pipeline bus and end up in the log.

use futures::StreamExt;
use gstreamer as gst;
use gstreamer::prelude::*;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Log every message posted on `pipeline`'s bus from a tokio task
///
/// Returns `None` when the pipeline has no bus.
pub fn spawn_bus_logger(pipeline: &gst::Pipeline) -> Option<JoinHandle<()>> {
    let bus = pipeline.bus()?;
    let name = pipeline.name().to_string();
    let mut messages = bus.stream();

    Some(tokio::spawn(async move {
        while let Some(msg) = messages.next().await {
            log_message(&name, &msg);
        }
        debug!(pipeline = %name, "Bus logger finished");
    }))
}

fn log_message(pipeline: &str, msg: &gst::Message) {
    match msg.view() {
        gst::MessageView::Error(err) => {
            error!(
                pipeline,
                error = %err.error(),
                debug = ?err.debug(),
                source = ?err.src().map(|s| s.name()),
                "GStreamer error"
            );
        }
        gst::MessageView::Warning(warn_msg) => {
            warn!(
                pipeline,
                warning = %warn_msg.error(),
                debug = ?warn_msg.debug(),
                source = ?warn_msg.src().map(|s| s.name()),
                "GStreamer warning"
            );
        }
        gst::MessageView::Info(info_msg) => {
            info!(
                pipeline,
                message = %info_msg.error(),
                source = ?info_msg.src().map(|s| s.name()),
                "GStreamer info"
            );
        }
        gst::MessageView::Eos(_) => {
            info!(pipeline, "End of stream");
        }
        gst::MessageView::StateChanged(change) => {
            // Children report too; only the pipeline itself is interesting
            if change.src().is_some_and(|s| s.name() == pipeline) {
                info!(
                    pipeline,
                    old = ?change.old(),
                    current = ?change.current(),
                    "Pipeline state changed"
                );
            }
        }
        gst::MessageView::StreamStatus(status) => {
            let (kind, owner) = status.get();
            debug!(pipeline, kind = ?kind, owner = %owner.name(), "Stream status");
        }
        _ => {}
    }
}
