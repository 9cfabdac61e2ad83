// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Building graphs from manifests without touching weight data.
//!
//! [`ModelLoader::init_empty`] is the "empty weights" initialization pass:
//! every parameter becomes a placeholder on the meta device, so a model of
//! any size is constructed instantly and with no allocation. Buffers are
//! placeholders too when `include_buffers` is set; otherwise they are
//! allocated zero-filled on the host, since they are usually small and
//! often not present in checkpoints.

use crate::{GraphStore, ModelError, ModelManifest};
use std::path::Path;
use tensor_core::{DeviceId, DeviceSet, TensorHandle};

/// Default manifest filename inside a model directory.
pub const MANIFEST_FILE: &str = "model.json";

/// Builds [`GraphStore`]s from manifests.
///
/// # Example
/// ```no_run
/// use model_ir::ModelLoader;
/// use std::path::Path;
/// use tensor_core::DeviceSet;
///
/// let devices = DeviceSet::host_only();
/// let graph = ModelLoader::load(Path::new("./models/gpt2-small"), false, &devices).unwrap();
/// println!("{}", graph.summary());
/// ```
pub struct ModelLoader;

impl ModelLoader {
    /// Reads `model.json` from `path` (a directory or the file itself) and
    /// runs [`init_empty`](Self::init_empty).
    pub fn load(path: &Path, include_buffers: bool, devices: &DeviceSet) -> Result<GraphStore, ModelError> {
        let manifest_path = if path.is_dir() {
            path.join(MANIFEST_FILE)
        } else {
            path.to_path_buf()
        };
        let manifest = ModelManifest::from_file(&manifest_path)?;
        Self::init_empty(&manifest, include_buffers, devices)
    }

    /// Validates `manifest` and builds a graph whose parameters are all
    /// placeholders.
    ///
    /// `devices` is only consulted for host buffers when `include_buffers`
    /// is `false`.
    pub fn init_empty(
        manifest: &ModelManifest,
        include_buffers: bool,
        devices: &DeviceSet,
    ) -> Result<GraphStore, ModelError> {
        manifest.validate()?;

        let mut graph = GraphStore::new(manifest.name.clone());
        for entity in &manifest.parameters {
            let dtype = entity.dtype()?;
            graph.add_parameter(TensorHandle::meta(entity.name.clone(), entity.shape.clone(), dtype))?;
        }
        for entity in &manifest.buffers {
            let dtype = entity.dtype()?;
            let tensor = if include_buffers {
                TensorHandle::meta(entity.name.clone(), entity.shape.clone(), dtype)
            } else {
                TensorHandle::zeros(
                    entity.name.clone(),
                    entity.shape.clone(),
                    dtype,
                    DeviceId::cpu(),
                    devices,
                )?
            };
            graph.add_buffer(tensor)?;
        }

        tracing::info!(
            "initialized '{}' with empty weights: {} placeholders of {} entities",
            manifest.name,
            graph.meta_count(),
            graph.len(),
        );
        Ok(graph)
    }
}
