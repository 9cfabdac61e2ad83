// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for tensor handles, device identities and device memory.

use crate::{DeviceId, Shape};

/// Errors raised by `tensor-core`.
#[derive(Debug, thiserror::Error)]
pub enum TensorError {
    /// A device token could not be canonicalized.
    #[error("unknown device identity '{token}': {reason}")]
    UnknownDevice { token: String, reason: String },

    /// A read was attempted on a placeholder tensor.
    #[error("tensor '{name}' is a placeholder on the meta device and has no storage")]
    NoStorage { name: String },

    /// Storage was supplied for a meta placement.
    #[error("tensor '{name}' cannot own storage on the meta device")]
    StorageOnMeta { name: String },

    /// Storage length does not match `shape.size_bytes(dtype)`.
    #[error("tensor '{name}' with shape {shape} needs {expected} bytes, got {actual}")]
    BufferSizeMismatch {
        name: String,
        shape: Shape,
        expected: usize,
        actual: usize,
    },

    /// The requested typed view does not match the tensor's dtype.
    #[error("tensor '{name}' holds {actual}, not {requested}")]
    DTypeMismatch {
        name: String,
        requested: crate::DType,
        actual: crate::DType,
    },

    /// A canonical device is not registered in the [`crate::DeviceSet`].
    #[error("device {device} is not available")]
    DeviceUnavailable { device: DeviceId },

    /// The device's pool refused the allocation.
    #[error("allocation on {device} failed: {source}")]
    Allocation {
        device: DeviceId,
        #[source]
        source: memory_manager::MemoryError,
    },
}
