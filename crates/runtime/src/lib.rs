// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # runtime
//!
//! Tensor relocation and model dispatch across device placements.
//!
//! The runtime takes:
//! - A [`ModelGraph`](model_ir::ModelGraph) from `model-ir`, typically built
//!   with empty weights so most entities are placeholders.
//! - A [`DeviceSet`](tensor_core::DeviceSet) describing the available devices
//!   and their memory budgets.
//! - A [`DeviceMap`] saying where each entity should go.
//!
//! and places every parameter and buffer accordingly. Placeholders are
//! materialized on their target instead of copied; concrete tensors are
//! copied; disk targets go to a [`DiskOffload`] component.
//!
//! # Components
//! - [`TensorRelocator`] — moves one tensor; owns the materializer list.
//! - [`ModelDispatcher`] — walks a whole graph, bulk or per entity.
//! - [`Checkpoint`] — memory-mapped SafeTensors values to install.
//! - [`DispatchConfig`] — TOML configuration for all of the above.

mod checkpoint;
mod config;
mod device_map;
mod dispatcher;
mod error;
mod metrics;
mod offload;
mod relocator;

pub use checkpoint::{Checkpoint, CheckpointEntry};
pub use config::{DeviceConfig, DispatchConfig};
pub use device_map::DeviceMap;
pub use dispatcher::ModelDispatcher;
pub use error::{CheckpointError, DispatchError, OffloadError, RelocationError, RuntimeError};
pub use metrics::{DispatchPath, DispatchReport, EntityAction, EntityRecord};
pub use offload::{DiskOffload, OffloadEntry, OffloadIndex};
pub use relocator::{
    default_materializers, materializer_by_name, EmptyLike, Materializer, TensorRelocator,
    Uninitialized,
};
