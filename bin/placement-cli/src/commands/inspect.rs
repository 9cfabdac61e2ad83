// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `placement-rt inspect` command: display the entities a manifest declares.
//!
//! Builds the empty-weight graph on the host and prints each entity's kind,
//! shape, dtype, size and current placement.

use super::{human_bytes, truncate};
use model_ir::{ModelGraph, ModelLoader};
use std::path::PathBuf;
use tensor_core::DeviceSet;

pub fn execute(manifest: PathBuf) -> anyhow::Result<()> {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║           placement-rt · Model Inspector            ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();

    let devices = DeviceSet::host_only();
    let graph = ModelLoader::load(&manifest, false, &devices).map_err(|e| {
        anyhow::anyhow!("failed to load manifest '{}': {e}", manifest.display())
    })?;

    // ── Summary ────────────────────────────────────────────────
    println!("  Model: {}", graph.name());
    println!(
        "  Entities: {} ({} parameters, {} buffers)",
        graph.len(),
        graph.parameters().len(),
        graph.buffers().len(),
    );
    println!("  Placeholders: {}", graph.meta_count());
    println!("  Declared size: {}", human_bytes(graph.total_bytes()));
    println!();

    // ── Per-Entity Detail ──────────────────────────────────────
    println!(
        "  {:<36} {:<10} {:<16} {:<6} {:>12} {:>8}",
        "Name", "Kind", "Shape", "DType", "Size", "Place",
    );
    println!("  {}", "-".repeat(92));

    for (kind, name, tensor) in graph.entities() {
        println!(
            "  {:<36} {:<10} {:<16} {:<6} {:>12} {:>8}",
            truncate(name, 36),
            kind.to_string(),
            truncate(&tensor.shape().to_string(), 16),
            tensor.dtype().to_string(),
            human_bytes(tensor.size_bytes()),
            tensor.placement().to_string(),
        );
    }
    println!();
    Ok(())
}
