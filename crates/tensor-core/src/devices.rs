// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The explicit registry of device memory.
//!
//! A [`DeviceSet`] maps each canonical [`DeviceId`] to its own
//! [`MemoryPool`] and records whether the device exposes an
//! allocate-without-initializing primitive. It is built by the caller and
//! passed in; nothing consults a process-wide device table.

use crate::{DeviceId, TensorError};
use memory_manager::{BufferGuard, MemoryBudget, MemoryPool};
use std::collections::BTreeMap;

/// Memory and allocation capabilities of one device.
#[derive(Debug)]
pub struct DeviceMemory {
    pool: MemoryPool,
    uninit_alloc: bool,
}

impl DeviceMemory {
    pub fn new(budget: MemoryBudget, uninit_alloc: bool) -> Self {
        Self {
            pool: MemoryPool::new(budget),
            uninit_alloc,
        }
    }

    pub fn pool(&self) -> &MemoryPool {
        &self.pool
    }

    /// Whether the device can hand out storage without zeroing it first.
    pub fn supports_uninit(&self) -> bool {
        self.uninit_alloc
    }
}

/// Registry of the concrete devices available to a dispatch.
///
/// # Example
/// ```
/// use memory_manager::MemoryBudget;
/// use tensor_core::{DeviceId, DeviceSet};
///
/// let devices = DeviceSet::new()
///     .with_device(DeviceId::cpu(), MemoryBudget::from_gb(4), true)
///     .with_device(DeviceId::cuda(0), MemoryBudget::from_gb(1), false);
///
/// let buf = devices.allocate(&DeviceId::cuda(0), 64).unwrap();
/// assert_eq!(buf.size_bytes(), 64);
/// assert!(devices.allocate_uninit(&DeviceId::cuda(0), 64).unwrap().is_none());
/// ```
#[derive(Debug, Default)]
pub struct DeviceSet {
    devices: BTreeMap<DeviceId, DeviceMemory>,
}

impl DeviceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// A set holding only an unlimited host device.
    pub fn host_only() -> Self {
        Self::new().with_device(DeviceId::cpu(), MemoryBudget::unlimited(), true)
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with_device(mut self, device: DeviceId, budget: MemoryBudget, uninit_alloc: bool) -> Self {
        self.insert(device, budget, uninit_alloc);
        self
    }

    /// Registers `device`, replacing any previous registration.
    pub fn insert(&mut self, device: DeviceId, budget: MemoryBudget, uninit_alloc: bool) {
        tracing::debug!(
            "registering device {} (budget {}, uninit alloc: {})",
            device,
            budget,
            uninit_alloc,
        );
        self.devices
            .insert(device, DeviceMemory::new(budget, uninit_alloc));
    }

    pub fn contains(&self, device: &DeviceId) -> bool {
        self.devices.contains_key(device)
    }

    /// Looks up a device, failing with `DeviceUnavailable` if unregistered.
    pub fn get(&self, device: &DeviceId) -> Result<&DeviceMemory, TensorError> {
        self.devices
            .get(device)
            .ok_or(TensorError::DeviceUnavailable { device: *device })
    }

    /// Allocates zero-filled storage on `device`.
    pub fn allocate(&self, device: &DeviceId, size_bytes: usize) -> Result<BufferGuard, TensorError> {
        self.get(device)?
            .pool
            .allocate(size_bytes)
            .map_err(|source| TensorError::Allocation {
                device: *device,
                source,
            })
    }

    /// Allocates storage without initializing it, or returns `Ok(None)` if
    /// the device does not expose that primitive.
    pub fn allocate_uninit(
        &self,
        device: &DeviceId,
        size_bytes: usize,
    ) -> Result<Option<BufferGuard>, TensorError> {
        let memory = self.get(device)?;
        if !memory.uninit_alloc {
            return Ok(None);
        }
        memory
            .pool
            .allocate_uninit(size_bytes)
            .map(Some)
            .map_err(|source| TensorError::Allocation {
                device: *device,
                source,
            })
    }

    /// Iterates registered devices in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (&DeviceId, &DeviceMemory)> {
        self.devices.iter()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
