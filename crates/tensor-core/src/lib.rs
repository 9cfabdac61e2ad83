// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # tensor-core
//!
//! Tensor handles and device placements for the placement runtime.
//!
//! This crate provides:
//! - [`TensorHandle`] — a named tensor with declared [`Shape`] and [`DType`],
//!   a [`Placement`], and storage only when the placement is concrete.
//! - [`DeviceSpec`] — every accepted spelling of a device, with one
//!   canonicalization function producing a [`Destination`].
//! - [`DeviceId`] / [`DeviceKind`] — canonical concrete devices.
//! - [`DeviceSet`] — the caller-owned registry of per-device memory pools.
//!
//! # Design Goals
//! - Placeholders can never be read: reads on meta handles are errors.
//! - Placement comparisons use canonical values, never surface syntax.
//! - Clean error types via `thiserror`.

mod device;
mod devices;
mod dtype;
mod error;
mod placement;
mod shape;
mod tensor;

pub use device::{DeviceId, DeviceKind, DeviceSpec};
pub use devices::{DeviceMemory, DeviceSet};
pub use dtype::DType;
pub use error::TensorError;
pub use placement::{Destination, Placement};
pub use shape::Shape;
pub use tensor::{f32_to_bytes, TensorHandle};
