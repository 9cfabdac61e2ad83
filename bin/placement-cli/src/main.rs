// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # placement-rt
//!
//! Command-line interface for the placement runtime.
//!
//! ## Usage
//! ```bash
//! # Show the entities a manifest declares
//! placement-rt inspect --manifest ./models/gpt2-small/model.json
//!
//! # Build an empty-weight graph and place it on one device
//! placement-rt dispatch --manifest ./models/gpt2-small --device cuda:0
//!
//! # Place it according to a TOML config, filling values from a checkpoint
//! placement-rt --config placement.toml dispatch \
//!     --manifest ./models/gpt2-small --checkpoint ./models/gpt2-small/model.safetensors
//! ```

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "placement-rt",
    about = "Places placeholder-initialized models across devices",
    version,
    author
)]
struct Cli {
    /// Path to a TOML dispatch configuration.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (repeat for more: -v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the entity table of a model manifest.
    Inspect {
        /// Path to `model.json` or the directory holding it.
        #[arg(short, long)]
        manifest: PathBuf,
    },

    /// Build an empty-weight graph from a manifest and dispatch it.
    Dispatch {
        /// Path to `model.json` or the directory holding it.
        #[arg(short, long)]
        manifest: PathBuf,

        /// Send every entity to this device (e.g., "cpu", "cuda:0", "0").
        /// Overrides the config's device map.
        #[arg(short, long)]
        device: Option<String>,

        /// SafeTensors file whose values are installed during dispatch.
        #[arg(long)]
        checkpoint: Option<PathBuf>,

        /// Also create buffers as placeholders instead of host tensors.
        #[arg(long)]
        include_buffers: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing/logging based on verbosity.
    commands::init_tracing(cli.verbose);

    match cli.command {
        Commands::Inspect { manifest } => commands::inspect::execute(manifest),
        Commands::Dispatch {
            manifest,
            device,
            checkpoint,
            include_buffers,
        } => commands::dispatch::execute(cli.config, manifest, device, checkpoint, include_buffers),
    }
}
