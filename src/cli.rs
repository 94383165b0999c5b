// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! This module provides command-line functionality for:
//! - Checking a topology description against the dry-run engine
//! - Simulating viewers on every stream
//! - Serving a topology over RTSP (feature `gst`)

use anyhow::Context;
use rtsp_topology::backends::MediaEngine;
use rtsp_topology::backends::dry_run::{DryRunEngine, DryRunServer, EngineOp};
use rtsp_topology::{Config, RtspServer, Topology, TopologySnapshot, description};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Load `file` into a topology over `engine`
fn load<E: MediaEngine>(file: &Path, config: &Config, engine: Arc<E>) -> anyhow::Result<Topology<E>> {
    let mut topology = Topology::with_max_tunnels(engine, config.gateway.max_tunnels);
    description::load_file(file, &mut topology)
        .with_context(|| format!("failed to load {}", file.display()))?;
    Ok(topology)
}

/// Validate a description and print the resulting structure
pub fn check(file: &Path, config: &Config, json: bool) -> anyhow::Result<()> {
    let topology = load(file, config, Arc::new(DryRunEngine::new()))?;
    let snapshot = topology.snapshot();

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        print_summary(&snapshot);
    }
    Ok(())
}

fn print_summary(snapshot: &TopologySnapshot) {
    if !snapshot.caps.is_empty() {
        println!("Caps:");
        for (name, expression) in &snapshot.caps {
            println!("  {} = {}", name, expression);
        }
        println!();
    }

    println!("Pipelines:");
    for pipeline in &snapshot.pipelines {
        let marker = if pipeline.servable { " [rtsp]" } else { "" };
        println!(
            "  {}{} ({} nodes, {} links)",
            pipeline.name,
            marker,
            pipeline.nodes.len(),
            pipeline.edges.len()
        );
        for edge in &pipeline.edges {
            match &edge.cap {
                Some(cap) => println!("      {} -> {} [{}]", edge.src, edge.dst, cap),
                None => println!("      {} -> {}", edge.src, edge.dst),
            }
        }
    }

    if !snapshot.tunnels.is_empty() {
        println!();
        println!("Tunnels:");
        for tunnel in &snapshot.tunnels {
            println!(
                "  {}.{} => {}.{} (channel {})",
                tunnel.source_pipe, tunnel.exit, tunnel.name, tunnel.entry, tunnel.channel
            );
        }
    }

    if !snapshot.deferred.is_empty() {
        println!();
        println!("On first viewer:");
        for connection in &snapshot.deferred {
            println!(
                "  {}.{} => {}.{}",
                connection.source_pipe, connection.exit, connection.destination, connection.entry
            );
        }
    }
}

/// Drive one viewer through every stream and print the engine calls made
pub async fn simulate(file: &Path, config: &Config) -> anyhow::Result<()> {
    let engine = Arc::new(DryRunEngine::new());
    let topology = load(file, config, Arc::clone(&engine))?;
    topology.start_pipelines()?;
    println!("Loaded with {} engine calls", engine.operations().len());

    let server = Arc::new(DryRunServer::new());
    let rtsp = RtspServer::new(Arc::new(Mutex::new(topology)), Arc::clone(&server))
        .with_cleanup_interval(config.server.session_cleanup_interval());
    rtsp.register_servable()?;
    rtsp.start()?;

    let paths = rtsp.paths();
    if paths.is_empty() {
        println!("No servable pipelines");
    }
    for path in paths {
        println!();
        println!("{}", path);

        engine.clear_operations();
        server.connect(&path)?;
        print_operations("viewer connected", &engine.operations());

        engine.clear_operations();
        server.disconnect(&path)?;
        print_operations("viewer left", &engine.operations());

        if let Some(phase) = rtsp.path_state(&path) {
            println!("  now {}", phase);
        }
    }

    rtsp.shutdown().await;
    Ok(())
}

fn print_operations(title: &str, operations: &[EngineOp]) {
    println!("  {}:", title);
    if operations.is_empty() {
        println!("    (nothing)");
    }
    for operation in operations {
        println!("    {}", operation);
    }
}

/// Run the capture pipelines and serve every servable one until Ctrl-C
#[cfg(feature = "gst")]
pub async fn serve(file: &Path, config: &Config, port: Option<u16>) -> anyhow::Result<()> {
    use rtsp_topology::backends::gst::{GstEngine, GstRtspServer, bus::spawn_bus_logger};

    let engine = Arc::new(GstEngine::init()?);
    let topology = load(file, config, engine)?;

    let bus_loggers: Vec<_> = topology
        .pipeline_names()
        .filter(|name| !topology.is_servable(name))
        .filter_map(|name| topology.pipeline(name).ok())
        .filter_map(spawn_bus_logger)
        .collect();
    topology.start_pipelines()?;

    let port = port.unwrap_or(config.server.port);
    let server = Arc::new(GstRtspServer::new(&config.server.address, port));
    let rtsp = RtspServer::new(Arc::new(Mutex::new(topology)), Arc::clone(&server))
        .with_cleanup_interval(config.server.session_cleanup_interval());
    rtsp.register_servable()?;
    rtsp.start()?;

    for path in rtsp.paths() {
        println!("rtsp://{}:{}{}", config.server.address, server.bound_port(), path);
    }
    println!("Press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    println!();
    rtsp.shutdown().await;
    for logger in bus_loggers {
        logger.abort();
    }
    Ok(())
}
