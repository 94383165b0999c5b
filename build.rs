// SPDX-License-Identifier: MPL-2.0

use std::env;
use std::process::Command;

/// Packagers pin the reported version with this variable
const VERSION_OVERRIDE: &str = "RTSP_TOPOLOGY_VERSION";

fn main() {
    println!("cargo::rerun-if-env-changed={VERSION_OVERRIDE}");
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-changed=.git/refs/tags");

    let version = env::var(VERSION_OVERRIDE)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .or_else(describe)
        .unwrap_or_else(|| env::var("CARGO_PKG_VERSION").unwrap_or_default());
    println!("cargo::rustc-env=GIT_VERSION={version}");
}

/// `v0.3.0-4-g1a2b3c4-dirty` → `0.3.0-4-g1a2b3c4-dirty`, none outside a
/// checkout
fn describe() -> Option<String> {
    let output = Command::new("git")
        .args(["describe", "--tags", "--dirty", "--match", "v[0-9]*"])
        .output()
        .ok()
        .filter(|output| output.status.success())?;
    let described = String::from_utf8(output.stdout).ok()?;
    let described = described.trim();
    let version = described.strip_prefix('v').unwrap_or(described);
    (!version.is_empty()).then(|| version.to_string())
}
