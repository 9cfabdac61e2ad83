// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! JSON model manifest parsing.
//!
//! The manifest (`model.json`) declares every parameter and buffer of a
//! model by name, shape and dtype. It carries no weight data.
//!
//! # Format
//! ```json
//! {
//!   "name": "gpt2-tiny",
//!   "parameters": [
//!     { "name": "wte.weight", "shape": [512, 64], "dtype": "f32" },
//!     { "name": "h.0.attn.c_attn.weight", "shape": [64, 192], "dtype": "f32" }
//!   ],
//!   "buffers": [
//!     { "name": "h.0.attn.bias", "shape": [1, 1, 128, 128], "dtype": "i8" }
//!   ]
//! }
//! ```

use crate::ModelError;
use std::collections::HashSet;
use std::path::Path;
use tensor_core::{DType, Shape};

/// Top-level model manifest, deserialized from `model.json`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ModelManifest {
    /// Human-readable model name (e.g., `"gpt2-small"`).
    pub name: String,
    /// Learned weights, in graph order.
    #[serde(default)]
    pub parameters: Vec<ManifestEntity>,
    /// Non-learned state, in graph order.
    #[serde(default)]
    pub buffers: Vec<ManifestEntity>,
}

/// One declared tensor.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ManifestEntity {
    /// Dotted module path (e.g., `"h.0.mlp.c_fc.weight"`).
    pub name: String,
    pub shape: Shape,
    /// Dtype string; accepts `f32`, `float32`, `f16`, `bf16`, `i8` and the
    /// other aliases of [`DType::from_str_loose`].
    #[serde(default = "default_dtype")]
    pub dtype: String,
}

fn default_dtype() -> String {
    "f32".to_string()
}

impl ManifestEntity {
    /// Parses the dtype string.
    pub fn dtype(&self) -> Result<DType, ModelError> {
        DType::from_str_loose(&self.dtype).ok_or_else(|| ModelError::InvalidEntity {
            name: self.name.clone(),
            detail: format!("unsupported dtype '{}'", self.dtype),
        })
    }
}

impl ModelManifest {
    /// Loads a manifest from a JSON file path.
    pub fn from_file(path: &Path) -> Result<Self, ModelError> {
        let content = std::fs::read_to_string(path)?;
        let manifest: Self = serde_json::from_str(&content)?;
        Ok(manifest)
    }

    /// Parses a manifest from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        let manifest: Self = serde_json::from_str(json)?;
        Ok(manifest)
    }

    /// Validates that the manifest is internally consistent.
    ///
    /// Checks:
    /// - Every name is non-empty and unique across parameters and buffers.
    /// - Every dtype string is recognised.
    /// - No entity's byte size overflows `usize`.
    pub fn validate(&self) -> Result<(), ModelError> {
        let mut seen = HashSet::new();
        for entity in self.entities() {
            if entity.name.trim().is_empty() {
                return Err(ModelError::InvalidEntity {
                    name: entity.name.clone(),
                    detail: "empty entity name".into(),
                });
            }
            if !seen.insert(entity.name.as_str()) {
                return Err(ModelError::DuplicateEntity {
                    name: entity.name.clone(),
                });
            }
            let dtype = entity.dtype()?;
            if entity.shape.checked_size_bytes(dtype).is_none() {
                return Err(ModelError::InvalidEntity {
                    name: entity.name.clone(),
                    detail: format!("shape {} overflows addressable memory", entity.shape),
                });
            }
        }

        if self.parameters.is_empty() && self.buffers.is_empty() {
            tracing::warn!("manifest '{}' declares no entities", self.name);
        }
        Ok(())
    }

    /// Parameters then buffers.
    pub fn entities(&self) -> impl Iterator<Item = &ManifestEntity> {
        self.parameters.iter().chain(&self.buffers)
    }

    /// Total declared bytes. Call after [`validate`](Self::validate); entities
    /// with unknown dtypes are skipped.
    pub fn total_bytes(&self) -> usize {
        self.entities()
            .filter_map(|e| e.dtype().ok().map(|d| e.shape.size_bytes(d)))
            .sum()
    }
}
