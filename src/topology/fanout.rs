// SPDX-License-Identifier: GPL-3.0-only

//! Fan-out through request pads

use super::{Topology, link_error};
use crate::backends::MediaEngine;
use crate::errors::{TopologyError, TopologyResult};
use tracing::debug;

impl<E: MediaEngine> Topology<E> {
    /// Attach `consumer` to a new output pad of the splitter `tee`
    ///
    /// The requested pad is released again if the link fails.
    pub fn link_to_tee(&self, tee: &str, consumer: &str) -> TopologyResult<()> {
        let tee_element = self.element(tee)?;
        let consumer_element = self.element(consumer)?;

        let pad = self
            .engine
            .request_src_pad(tee_element)
            .map_err(|_| TopologyError::NoPadTemplate(tee.to_string()))?;

        if let Err(e) = self.engine.link_pad(&pad, consumer_element) {
            self.engine.release_src_pad(tee_element, pad);
            return Err(link_error(tee, consumer, e));
        }
        debug!(tee, consumer, "Linked branch to tee");
        Ok(())
    }

    /// Undo a link from `src` to `dst`, releasing a request pad if one was
    /// used, and forget the recorded edge
    pub fn unlink_from(&mut self, src: &str, dst: &str) -> TopologyResult<()> {
        let src_element = self.element(src)?;
        let dst_element = self.element(dst)?;
        self.engine.unlink(src_element, dst_element);

        let pipe = self.node(src)?.pipeline().map(str::to_string);
        if let Some(entry) = pipe.and_then(|pipe| self.pipelines.get_mut(&pipe)) {
            entry.edges.retain(|edge| edge.src != src || edge.dst != dst);
        }
        Ok(())
    }
}
