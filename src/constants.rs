// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

/// Application name used for the config directory and the default log target
pub const APP_NAME: &str = "rtsp-topology";

/// Config file name inside the application config directory
pub const CONFIG_FILE: &str = "config.toml";

/// Element type names the topology relies on
pub mod element_types {
    /// Buffering element placed ahead of a gateway sender
    pub const QUEUE: &str = "queue";

    /// Gateway sender (lives in the source pipeline)
    pub const INTER_SINK: &str = "intervideosink";

    /// Gateway receiver (lives in the destination pipeline)
    pub const INTER_SRC: &str = "intervideosrc";
}

/// Naming rules for nodes and paths derived from other names
pub mod naming {
    /// Prefix of a gateway sender node
    pub const SENDER_PREFIX: &str = "intersink_";

    /// Prefix of a gateway buffer node
    pub const BUFFER_PREFIX: &str = "gatequeue_";

    /// Prefix of a gateway receiver node
    pub const RECEIVER_PREFIX: &str = "intersrc_";

    /// Prefix of the channel shared by a sender/receiver pair
    pub const CHANNEL_PREFIX: &str = "gateway_";

    /// Prefix of a concrete serving instance built for a path
    pub const INSTANCE_PREFIX: &str = "e_";

    /// Property carrying the gateway channel name
    pub const CHANNEL_PROPERTY: &str = "channel";

    /// Property carrying a format constraint
    pub const CAPS_PROPERTY: &str = "caps";

    /// Sender node name for a tunnel
    pub fn sender(tunnel: &str) -> String {
        format!("{SENDER_PREFIX}{tunnel}")
    }

    /// Buffer node name for a tunnel
    pub fn buffer(tunnel: &str) -> String {
        format!("{BUFFER_PREFIX}{tunnel}")
    }

    /// Receiver node name for a tunnel
    pub fn receiver(tunnel: &str) -> String {
        format!("{RECEIVER_PREFIX}{tunnel}")
    }

    /// Channel identifier shared by both ends of a tunnel
    pub fn channel(tunnel: &str) -> String {
        format!("{CHANNEL_PREFIX}{tunnel}")
    }

    /// Name of the concrete instance built for a servable pipeline
    pub fn instance(pipe: &str) -> String {
        format!("{INSTANCE_PREFIX}{pipe}")
    }

    /// Stream path for a servable pipeline
    pub fn stream_path(pipe: &str) -> String {
        format!("/{pipe}")
    }
}

/// Gateway limits
pub mod gateway {
    /// Default maximum number of concurrently open tunnels
    pub const DEFAULT_MAX_TUNNELS: usize = 8;
}

/// Streaming server defaults
pub mod server {
    use super::Duration;

    /// Default RTSP service port
    pub const DEFAULT_PORT: u16 = 8554;

    /// Default bind address
    pub const DEFAULT_ADDRESS: &str = "0.0.0.0";

    /// Interval between expired session sweeps
    pub const SESSION_CLEANUP_INTERVAL: Duration = Duration::from_secs(2);
}

/// Logging defaults
pub mod logging {
    /// Filter used when neither RUST_LOG nor the config sets one
    pub const DEFAULT_FILTER: &str = "warn";
}
