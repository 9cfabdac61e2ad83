// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # model-ir
//!
//! The model-side view the placement runtime works against.
//!
//! - [`ModelGraph`] — the trait the dispatcher consumes: ordered parameters
//!   and buffers, lookup by name, and `rebind`.
//! - [`GraphStore`] — an in-memory graph that rejects rebinds changing shape
//!   or dtype.
//! - [`ModelManifest`] — the JSON descriptor listing every entity.
//! - [`ModelLoader`] — builds a graph from a manifest with empty weights.
//!
//! # Example
//! ```no_run
//! use model_ir::{ModelGraph, ModelLoader};
//! use std::path::Path;
//! use tensor_core::DeviceSet;
//!
//! let devices = DeviceSet::host_only();
//! let graph = ModelLoader::load(Path::new("./models/gpt2-small"), true, &devices).unwrap();
//! println!("{}", graph.summary());
//! for (kind, name, tensor) in graph.entities() {
//!     println!("  {kind} {name} {}", tensor.shape());
//! }
//! ```

mod error;
pub mod graph;
mod loader;
mod manifest;

pub use error::ModelError;
pub use graph::{EntityKind, GraphStore, ModelGraph};
pub use loader::{ModelLoader, MANIFEST_FILE};
pub use manifest::{ManifestEntity, ModelManifest};
