// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `placement-rt dispatch` command: initialize a model with empty weights and
//! place it across the configured devices.
//!
//! ```text
//! manifest → init_empty → [checkpoint] → dispatch → report
//! ```

use super::{human_bytes, truncate};
use model_ir::{ModelGraph, ModelLoader};
use runtime::{Checkpoint, DeviceMap, DispatchConfig, DispatchReport, OffloadIndex};
use std::path::PathBuf;

pub fn execute(
    config: Option<PathBuf>,
    manifest: PathBuf,
    device: Option<String>,
    checkpoint: Option<PathBuf>,
    include_buffers: bool,
) -> anyhow::Result<()> {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║            placement-rt · Model Dispatch            ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();

    // ── Configuration ──────────────────────────────────────────
    let config = match &config {
        Some(path) => DispatchConfig::from_file(path)?,
        None => DispatchConfig::default(),
    };
    let devices = config.build_devices()?;
    let map = match device {
        Some(spec) => DeviceMap::uniform(spec),
        None => config.device_map()?,
    };

    println!("  Config:");
    println!("   Manifest:      {}", manifest.display());
    println!("   Materializers: {}", config.materializers.join(", "));
    println!("   Ordinal kind:  {}", config.ordinal_kind);
    for (id, memory) in devices.iter() {
        println!("   Device {:<7} budget {}", id.to_string(), memory.pool().budget());
    }
    for (key, spec) in map.specs() {
        println!("   Map {:<24} → {}", format!("'{key}'"), spec);
    }
    println!();

    // ── Empty-Weight Graph ─────────────────────────────────────
    println!("  [1/2] Initializing graph with empty weights...");
    let mut graph = ModelLoader::load(&manifest, include_buffers, &devices).map_err(|e| {
        anyhow::anyhow!("failed to load manifest '{}': {e}", manifest.display())
    })?;
    println!("        {}", graph.summary());
    println!();

    // ── Dispatch ───────────────────────────────────────────────
    println!("  [2/2] Dispatching...");
    let mut offloaded = OffloadIndex::new();
    let report = {
        let mut dispatcher = config.dispatcher(&devices)?.with_offload(&mut offloaded);
        match &checkpoint {
            Some(path) => {
                let ckpt = Checkpoint::open(path)?;
                dispatcher.load_checkpoint_and_dispatch(&mut graph, &ckpt, &map)?
            }
            None => dispatcher.dispatch(&mut graph, &map)?,
        }
    };
    println!("        {}", report.summary());
    println!();

    print_entities(&report);

    if !offloaded.is_empty() {
        tracing::warn!("{} entities left on disk", offloaded.len());
        println!("  Offloaded ({}):", offloaded.len());
        for name in offloaded.names() {
            println!("   {name}");
        }
        println!();
    }

    // ── Device Usage ───────────────────────────────────────────
    println!("  Device usage:");
    for (id, memory) in devices.iter() {
        let pool = memory.pool();
        println!(
            "   {:<8} {:>12} live · {}",
            id.to_string(),
            human_bytes(pool.allocated_bytes()),
            pool.stats().summary(),
        );
    }
    println!();

    if graph.has_meta_tensors() {
        println!("  {} entities remain placeholders.", graph.meta_count());
        println!();
    }
    Ok(())
}

fn print_entities(report: &DispatchReport) {
    println!(
        "  {:<36} {:<8} {:<8} {:<13} {:>12}",
        "Name", "From", "To", "Action", "Allocated",
    );
    println!("  {}", "-".repeat(82));
    for entity in &report.entities {
        println!(
            "  {:<36} {:<8} {:<8} {:<13} {:>12}",
            truncate(&entity.name, 36),
            entity.from,
            entity.to,
            entity.action.to_string(),
            human_bytes(entity.bytes),
        );
    }
    println!();
}
