// SPDX-License-Identifier: MPL-2.0

//! Integration tests for configuration module

use rtsp_topology::constants::{gateway, server};
use rtsp_topology::{Config, ConfigError};
use std::io::Write;

#[test]
fn test_config_default() {
    // Test that default config can be created
    let config = Config::default();

    // Check sensible defaults
    assert_eq!(config.server.port, server::DEFAULT_PORT);
    assert_eq!(config.server.address, server::DEFAULT_ADDRESS);
    assert_eq!(config.gateway.max_tunnels, gateway::DEFAULT_MAX_TUNNELS);
    assert_eq!(config.log_filter, "warn");
}

#[test]
fn test_missing_file_gives_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load(&dir.path().join("config.toml")).unwrap();
    assert_eq!(config, Config::default());
}

#[test]
fn test_load_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"log_filter = "rtsp_topology=debug"

[server]
address = "127.0.0.1"
port = 8600
session_cleanup_secs = 5

[gateway]
max_tunnels = 3"#
    )
    .unwrap();

    let config = Config::load_or_default(Some(file.path())).unwrap();
    assert_eq!(config.log_filter, "rtsp_topology=debug");
    assert_eq!(config.server.address, "127.0.0.1");
    assert_eq!(config.server.port, 8600);
    assert_eq!(config.server.session_cleanup_interval().as_secs(), 5);
    assert_eq!(config.gateway.max_tunnels, 3);
}

#[test]
fn test_malformed_file_names_the_path() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[server\nport = 1").unwrap();

    match Config::load(file.path()) {
        Err(ConfigError::Parse { path, .. }) => assert_eq!(path, file.path()),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_default_path() {
    // Not every platform has a config dir
    if let Some(path) = rtsp_topology::config::default_path() {
        assert!(path.ends_with("rtsp-topology/config.toml"));
    }
}
