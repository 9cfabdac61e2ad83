// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for manifests and model graphs.

use tensor_core::{DType, Shape};

/// Errors that can occur when building or mutating a model graph.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// The model manifest file could not be read.
    #[error("failed to read manifest: {0}")]
    ManifestReadError(#[from] std::io::Error),

    /// The manifest JSON is malformed.
    #[error("failed to parse manifest: {0}")]
    ManifestParseError(#[from] serde_json::Error),

    /// Two entities share a name. Names are unique across parameters and
    /// buffers.
    #[error("duplicate entity name '{name}'")]
    DuplicateEntity { name: String },

    /// A rebind named an entity the graph does not contain.
    #[error("unknown entity '{name}'")]
    UnknownEntity { name: String },

    /// A rebind tried to change an entity's shape or dtype.
    #[error("entity '{name}' is {expected_shape} {expected_dtype}, rebind supplied {actual_shape} {actual_dtype}")]
    IdentityMismatch {
        name: String,
        expected_shape: Shape,
        expected_dtype: DType,
        actual_shape: Shape,
        actual_dtype: DType,
    },

    /// A manifest entry is unusable (bad dtype, empty name, overflowing size).
    #[error("invalid entity '{name}': {detail}")]
    InvalidEntity { name: String, detail: String },

    /// Allocating storage for a non-placeholder entity failed.
    #[error(transparent)]
    Tensor(#[from] tensor_core::TensorError),
}
