// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for relocation, dispatch and checkpoint loading.

use memory_manager::MemoryError;
use tensor_core::{DType, DeviceId, Shape, TensorError};

/// Errors raised while relocating a single tensor.
#[derive(Debug, thiserror::Error)]
pub enum RelocationError {
    /// The requested transition is not defined (for example concrete to
    /// meta, anything to disk, or an explicit value aimed at meta).
    #[error("cannot relocate '{name}' from {from} to {to}: {reason}")]
    UnsupportedPlacement {
        name: String,
        from: String,
        to: String,
        reason: &'static str,
    },

    /// Storage could not be obtained on the target device.
    #[error("cannot allocate {size_bytes} bytes for '{name}' on {device}: {detail}")]
    AllocationFailure {
        name: String,
        device: DeviceId,
        size_bytes: usize,
        detail: String,
        #[source]
        source: Option<MemoryError>,
    },

    /// The target could not be canonicalized.
    #[error("unknown device identity '{spec}'")]
    UnknownDeviceIdentity {
        spec: String,
        #[source]
        source: TensorError,
    },

    /// The target is canonical but not registered in the device set.
    #[error("device {device} is not available")]
    DeviceUnavailable { device: DeviceId },

    /// An explicit value does not match the declared shape and dtype.
    #[error("value for '{name}' has {actual} bytes, expected {expected}")]
    ValueSizeMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    /// The tensor itself refused the operation (no storage to read, storage
    /// aimed at meta, or a dtype it does not hold).
    #[error("tensor '{name}' rejected the relocation: {source}")]
    InvalidTensor {
        name: String,
        #[source]
        source: TensorError,
    },
}

impl RelocationError {
    /// Maps a `tensor-core` failure raised while placing `name`.
    pub(crate) fn from_tensor(name: &str, size_bytes: usize, err: TensorError) -> Self {
        match err {
            TensorError::DeviceUnavailable { device } => Self::DeviceUnavailable { device },
            TensorError::Allocation { device, source } => Self::AllocationFailure {
                name: name.to_string(),
                device,
                size_bytes,
                detail: source.to_string(),
                source: Some(source),
            },
            TensorError::BufferSizeMismatch {
                expected, actual, ..
            } => Self::ValueSizeMismatch {
                name: name.to_string(),
                expected,
                actual,
            },
            TensorError::UnknownDevice { token, reason } => Self::UnknownDeviceIdentity {
                spec: token.clone(),
                source: TensorError::UnknownDevice { token, reason },
            },
            err @ (TensorError::NoStorage { .. }
            | TensorError::StorageOnMeta { .. }
            | TensorError::DTypeMismatch { .. }) => Self::InvalidTensor {
                name: name.to_string(),
                source: err,
            },
        }
    }
}

/// Errors raised by a model dispatch. Relocation failures carry the name of
/// the entity that failed; entities relocated before it stay relocated.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Relocating one entity failed.
    #[error("dispatch failed at '{name}': {source}")]
    Entity {
        name: String,
        #[source]
        source: RelocationError,
    },

    /// A device map entry does not name a valid device.
    #[error("invalid device map entry '{key}': {source}")]
    InvalidDeviceMap {
        key: String,
        #[source]
        source: TensorError,
    },

    /// Every entity targets disk; use a dedicated offload pass instead.
    #[error("the whole model is mapped to disk; offload it directly instead of dispatching")]
    WholeModelToDisk,

    /// Disk targets were requested with no offload component attached.
    #[error("{} entities are mapped to disk but no offload component is attached: {}", .entities.len(), .entities.join(", "))]
    MissingOffload { entities: Vec<String> },

    /// The offload component rejected an entity.
    #[error("offloading '{name}' failed: {source}")]
    Offload {
        name: String,
        #[source]
        source: OffloadError,
    },

    /// The bulk path found the target pool too small before moving anything.
    #[error("device {device} cannot hold the model: {required_bytes} bytes required, {available_bytes} available")]
    InsufficientCapacity {
        device: DeviceId,
        required_bytes: usize,
        available_bytes: usize,
    },

    /// The graph refused a relocated tensor.
    #[error("rebinding '{name}' failed: {source}")]
    Rebind {
        name: String,
        #[source]
        source: model_ir::ModelError,
    },
}

/// Errors raised by a [`DiskOffload`](crate::DiskOffload) component.
#[derive(Debug, thiserror::Error)]
pub enum OffloadError {
    /// The entity was handed over once already.
    #[error("'{name}' is already offloaded")]
    AlreadyOffloaded { name: String },

    /// Writing offload state failed.
    #[error("offload I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The offload index could not be encoded.
    #[error("cannot encode offload index: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Errors raised while reading a SafeTensors checkpoint.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// The file could not be opened or mapped.
    #[error("cannot read checkpoint '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid SafeTensors.
    #[error("failed to parse checkpoint: {0}")]
    Parse(String),

    /// A checkpoint tensor disagrees with the graph entity of the same name.
    #[error("checkpoint tensor '{name}' is {actual_shape} {actual_dtype}, model expects {expected_shape} {expected_dtype}")]
    Mismatch {
        name: String,
        expected_shape: Shape,
        expected_dtype: DType,
        actual_shape: Shape,
        actual_dtype: DType,
    },

    /// The checkpoint stores a dtype the runtime has no equivalent for.
    #[error("checkpoint tensor '{name}' has unsupported dtype {dtype}")]
    UnsupportedDType { name: String, dtype: String },
}

/// Top-level error for callers that drive the whole runtime.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Relocation(#[from] RelocationError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    /// Model loading failed.
    #[error("model error: {0}")]
    ModelError(#[from] model_ir::ModelError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),
}
