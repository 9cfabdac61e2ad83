// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Single-tensor relocation between placements.
//!
//! [`TensorRelocator::relocate`] is the one place that decides what moving a
//! tensor means:
//!
//! ```text
//!  from \ to   │ meta              │ concrete
//! ─────────────┼───────────────────┼──────────────────────────────
//!  meta        │ placeholder copy  │ materialize (never copies)
//!  concrete    │ unsupported       │ allocate + byte copy
//! ```
//!
//! With an explicit value the source placement is irrelevant: the value is
//! written into fresh storage on a concrete target, and any other target is
//! rejected. Disk is never a relocation target.
//!
//! # Materialization
//! Placeholders have nothing to copy, so relocation to a concrete device
//! allocates storage of the declared footprint instead. The strategy is
//! picked from an ordered list of [`Materializer`]s; the first one that
//! applies to the target device wins. An allocation failure from the chosen
//! strategy is final.

use crate::RelocationError;
use memory_manager::{BufferGuard, MemoryError};
use std::fmt;
use tensor_core::{
    DeviceId, DeviceKind, DeviceMemory, DeviceSet, DeviceSpec, Destination, Placement, TensorHandle,
};

// ── Materializers ──────────────────────────────────────────────────

/// A way of obtaining storage for a placeholder on a concrete device.
pub trait Materializer: fmt::Debug + Send + Sync {
    /// Name used in configuration and logs.
    fn name(&self) -> &str;

    /// Whether this strategy can run on `device`.
    fn applies(&self, device: &DeviceMemory) -> bool;

    /// Allocates `size_bytes` on `device`. Contents are unspecified unless
    /// the strategy says otherwise.
    fn allocate(&self, device: &DeviceMemory, size_bytes: usize) -> Result<BufferGuard, MemoryError>;
}

/// Allocates without a zeroing pass. Applies only to devices that expose an
/// uninitialized-allocation primitive.
#[derive(Debug, Clone, Default)]
pub struct Uninitialized;

impl Materializer for Uninitialized {
    fn name(&self) -> &str {
        "uninitialized"
    }

    fn applies(&self, device: &DeviceMemory) -> bool {
        device.supports_uninit()
    }

    fn allocate(&self, device: &DeviceMemory, size_bytes: usize) -> Result<BufferGuard, MemoryError> {
        device.pool().allocate_uninit(size_bytes)
    }
}

/// Allocates zero-filled storage shaped like the placeholder. Applies
/// everywhere.
#[derive(Debug, Clone, Default)]
pub struct EmptyLike;

impl Materializer for EmptyLike {
    fn name(&self) -> &str {
        "empty-like"
    }

    fn applies(&self, _device: &DeviceMemory) -> bool {
        true
    }

    fn allocate(&self, device: &DeviceMemory, size_bytes: usize) -> Result<BufferGuard, MemoryError> {
        device.pool().allocate(size_bytes)
    }
}

/// The default preference list: `[Uninitialized, EmptyLike]`.
pub fn default_materializers() -> Vec<Box<dyn Materializer>> {
    vec![Box::new(Uninitialized), Box::new(EmptyLike)]
}

/// Looks a materializer up by its configuration name.
pub fn materializer_by_name(name: &str) -> Option<Box<dyn Materializer>> {
    match name.trim().to_lowercase().as_str() {
        "uninitialized" | "uninit" => Some(Box::new(Uninitialized)),
        "empty-like" | "empty_like" | "empty" => Some(Box::new(EmptyLike)),
        _ => None,
    }
}

// ── TensorRelocator ────────────────────────────────────────────────

/// Moves single tensors between placements on a [`DeviceSet`].
///
/// The relocator never mutates a graph; it returns a new handle and leaves
/// rebinding to the caller.
///
/// # Example
/// ```
/// use runtime::TensorRelocator;
/// use tensor_core::{DType, DeviceSet, Shape, TensorHandle};
///
/// let devices = DeviceSet::host_only();
/// let relocator = TensorRelocator::new(&devices);
///
/// let w = TensorHandle::meta("w", Shape::matrix(4, 4), DType::F32);
/// let w = relocator.relocate(&w, &"cpu".into(), None).unwrap();
/// assert!(!w.is_meta());
/// assert_eq!(w.as_bytes().unwrap().len(), 64);
/// ```
#[derive(Debug)]
pub struct TensorRelocator<'d> {
    devices: &'d DeviceSet,
    materializers: Vec<Box<dyn Materializer>>,
    ordinal_kind: DeviceKind,
}

impl<'d> TensorRelocator<'d> {
    /// Creates a relocator with the default materializers and `cuda` as the
    /// family for bare ordinals.
    pub fn new(devices: &'d DeviceSet) -> Self {
        Self {
            devices,
            materializers: default_materializers(),
            ordinal_kind: DeviceKind::Cuda,
        }
    }

    /// Replaces the materializer preference list.
    pub fn with_materializers(mut self, materializers: Vec<Box<dyn Materializer>>) -> Self {
        self.materializers = materializers;
        self
    }

    /// Sets the device family bare ordinals refer to.
    pub fn with_ordinal_kind(mut self, kind: DeviceKind) -> Self {
        self.ordinal_kind = kind;
        self
    }

    pub fn devices(&self) -> &'d DeviceSet {
        self.devices
    }

    pub fn ordinal_kind(&self) -> DeviceKind {
        self.ordinal_kind
    }

    /// Names of the configured materializers, in preference order.
    pub fn materializer_names(&self) -> Vec<&str> {
        self.materializers.iter().map(|m| m.name()).collect()
    }

    /// Canonicalizes `target` with this relocator's ordinal family.
    pub fn canonicalize(&self, target: &DeviceSpec) -> Result<Destination, RelocationError> {
        target
            .canonicalize(self.ordinal_kind)
            .map_err(|source| RelocationError::UnknownDeviceIdentity {
                spec: target.to_string(),
                source,
            })
    }

    /// Relocates `tensor` to `target`.
    ///
    /// `explicit_value` is raw little-endian bytes in the tensor's dtype;
    /// when given, it becomes the new contents.
    pub fn relocate(
        &self,
        tensor: &TensorHandle,
        target: &DeviceSpec,
        explicit_value: Option<&[u8]>,
    ) -> Result<TensorHandle, RelocationError> {
        match self.canonicalize(target)? {
            Destination::Tensor(placement) => self.relocate_to(tensor, &placement, explicit_value),
            Destination::Disk => Err(unsupported(
                tensor,
                "disk",
                "disk is handled by the offload component, not by relocation",
            )),
        }
    }

    /// Relocates `tensor` to an already-canonical placement.
    pub fn relocate_to(
        &self,
        tensor: &TensorHandle,
        target: &Placement,
        explicit_value: Option<&[u8]>,
    ) -> Result<TensorHandle, RelocationError> {
        if let Some(value) = explicit_value {
            return self.install(tensor, target, value);
        }

        match (tensor.placement(), target) {
            (Placement::Meta, Placement::Meta) => Ok(tensor.placeholder()),
            (Placement::Meta, Placement::Concrete { device, .. }) => {
                self.materialize(tensor, *device, target)
            }
            (Placement::Concrete { .. }, Placement::Meta) => Err(unsupported(
                tensor,
                "meta",
                "moving a concrete tensor to meta would discard its data",
            )),
            (Placement::Concrete { .. }, Placement::Concrete { device, .. }) => {
                self.copy(tensor, *device, target)
            }
        }
    }

    /// Allocates storage for a placeholder using the first applicable
    /// materializer.
    fn materialize(
        &self,
        tensor: &TensorHandle,
        device: DeviceId,
        target: &Placement,
    ) -> Result<TensorHandle, RelocationError> {
        let size = storage_size(tensor, device)?;
        let memory = self.device(tensor, device)?;

        let strategy = self
            .materializers
            .iter()
            .find(|m| m.applies(memory))
            .ok_or_else(|| RelocationError::AllocationFailure {
                name: tensor.name().to_string(),
                device,
                size_bytes: size,
                detail: "no applicable materializer".into(),
                source: None,
            })?;

        let storage = strategy
            .allocate(memory, size)
            .map_err(|source| RelocationError::AllocationFailure {
                name: tensor.name().to_string(),
                device,
                size_bytes: size,
                detail: source.to_string(),
                source: Some(source),
            })?;

        tracing::debug!(
            "materialized '{}' ({} bytes) on {} via {}",
            tensor.name(),
            size,
            target,
            strategy.name(),
        );
        self.wrap(tensor, target, storage)
    }

    /// Copies concrete storage to another (or the same) device.
    fn copy(
        &self,
        tensor: &TensorHandle,
        device: DeviceId,
        target: &Placement,
    ) -> Result<TensorHandle, RelocationError> {
        let source = tensor
            .as_bytes()
            .map_err(|e| RelocationError::from_tensor(tensor.name(), tensor.size_bytes(), e))?;
        let mut storage = self.allocate_for_overwrite(tensor, device)?;
        storage.as_mut_slice().copy_from_slice(source);

        tracing::debug!(
            "copied '{}' ({} bytes) from {} to {}",
            tensor.name(),
            source.len(),
            tensor.placement(),
            target,
        );
        self.wrap(tensor, target, storage)
    }

    /// Writes an explicit value into fresh storage on `target`.
    fn install(
        &self,
        tensor: &TensorHandle,
        target: &Placement,
        value: &[u8],
    ) -> Result<TensorHandle, RelocationError> {
        let device = match target {
            Placement::Meta => {
                return Err(unsupported(
                    tensor,
                    "meta",
                    "an explicit value cannot be stored on the meta device",
                ))
            }
            Placement::Concrete { device, .. } => *device,
        };

        let expected = storage_size(tensor, device)?;
        if value.len() != expected {
            return Err(RelocationError::ValueSizeMismatch {
                name: tensor.name().to_string(),
                expected,
                actual: value.len(),
            });
        }

        let mut storage = self.allocate_for_overwrite(tensor, device)?;
        storage.as_mut_slice().copy_from_slice(value);

        tracing::debug!("installed value for '{}' on {}", tensor.name(), target);
        self.wrap(tensor, target, storage)
    }

    /// Storage whose every byte the caller is about to overwrite: skips
    /// zeroing when the device allows it.
    fn allocate_for_overwrite(
        &self,
        tensor: &TensorHandle,
        device: DeviceId,
    ) -> Result<BufferGuard, RelocationError> {
        let size = storage_size(tensor, device)?;
        let fast = self
            .devices
            .allocate_uninit(&device, size)
            .map_err(|e| RelocationError::from_tensor(tensor.name(), size, e))?;
        match fast {
            Some(storage) => Ok(storage),
            None => self
                .devices
                .allocate(&device, size)
                .map_err(|e| RelocationError::from_tensor(tensor.name(), size, e)),
        }
    }

    fn device(&self, tensor: &TensorHandle, device: DeviceId) -> Result<&'d DeviceMemory, RelocationError> {
        self.devices
            .get(&device)
            .map_err(|e| RelocationError::from_tensor(tensor.name(), tensor.size_bytes(), e))
    }

    fn wrap(
        &self,
        tensor: &TensorHandle,
        target: &Placement,
        storage: BufferGuard,
    ) -> Result<TensorHandle, RelocationError> {
        TensorHandle::materialized(
            tensor.name(),
            tensor.shape().clone(),
            tensor.dtype(),
            target.clone(),
            storage,
        )
        .map_err(|e| RelocationError::from_tensor(tensor.name(), tensor.size_bytes(), e))
    }
}

/// Bytes of storage `tensor` needs. A declared shape whose size overflows
/// `usize` can never be allocated.
fn storage_size(tensor: &TensorHandle, device: DeviceId) -> Result<usize, RelocationError> {
    tensor
        .shape()
        .checked_size_bytes(tensor.dtype())
        .ok_or_else(|| RelocationError::AllocationFailure {
            name: tensor.name().to_string(),
            device,
            size_bytes: usize::MAX,
            detail: format!("declared size of shape {} overflows usize", tensor.shape()),
            source: None,
        })
}

fn unsupported(tensor: &TensorHandle, to: &str, reason: &'static str) -> RelocationError {
    RelocationError::UnsupportedPlacement {
        name: tensor.name().to_string(),
        from: tensor.placement().to_string(),
        to: to.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memory_manager::MemoryBudget;
    use tensor_core::{DType, Shape};

    fn devices() -> DeviceSet {
        DeviceSet::new()
            .with_device(DeviceId::cpu(), MemoryBudget::from_mb(1), true)
            .with_device(DeviceId::cuda(0), MemoryBudget::from_bytes(256), false)
    }

    fn meta_w() -> TensorHandle {
        TensorHandle::meta("w", Shape::matrix(4, 4), DType::F32)
    }

    #[test]
    fn test_meta_to_cpu_materializes() {
        let devices = devices();
        let r = TensorRelocator::new(&devices);
        let out = r.relocate(&meta_w(), &"cpu".into(), None).unwrap();
        assert_eq!(out.placement(), &Placement::concrete(DeviceId::cpu()));
        assert_eq!(out.shape(), &Shape::matrix(4, 4));
        assert_eq!(out.dtype(), DType::F32);
        assert_eq!(out.as_bytes().unwrap().len(), 64);

        let stats = devices.get(&DeviceId::cpu()).unwrap().pool().stats();
        assert_eq!(stats.uninitialized, 1);
    }

    #[test]
    fn test_materialize_falls_through_to_empty_like() {
        let devices = devices();
        let r = TensorRelocator::new(&devices);
        let out = r.relocate(&meta_w(), &0usize.into(), None).unwrap();
        assert_eq!(out.placement(), &Placement::concrete(DeviceId::cuda(0)));
        assert_eq!(out.as_bytes().unwrap(), &[0u8; 64]);
        let stats = devices.get(&DeviceId::cuda(0)).unwrap().pool().stats();
        assert_eq!(stats.uninitialized, 0);
    }

    #[test]
    fn test_no_applicable_materializer() {
        let devices = devices();
        let r = TensorRelocator::new(&devices).with_materializers(vec![Box::new(Uninitialized)]);
        let err = r.relocate(&meta_w(), &"cuda:0".into(), None).unwrap_err();
        match err {
            RelocationError::AllocationFailure { detail, source, .. } => {
                assert_eq!(detail, "no applicable materializer");
                assert!(source.is_none());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_oom_does_not_fall_back() {
        let devices = devices();
        let r = TensorRelocator::new(&devices);
        let big = TensorHandle::meta("big", Shape::vector(128), DType::F32);
        let err = r.relocate(&big, &"cuda:0".into(), None).unwrap_err();
        assert!(matches!(
            err,
            RelocationError::AllocationFailure { source: Some(_), size_bytes: 512, .. }
        ));
    }

    #[test]
    fn test_meta_to_meta_allocates_nothing() {
        let devices = devices();
        let r = TensorRelocator::new(&devices);
        let out = r.relocate(&meta_w(), &"meta".into(), None).unwrap();
        assert!(out.is_meta());
        assert!(out.same_identity(&meta_w()));
        assert_eq!(out.name(), "w");
        for (_, memory) in devices.iter() {
            assert_eq!(memory.pool().stats().allocations, 0);
        }
    }

    #[test]
    fn test_concrete_copy_preserves_values() {
        let devices = devices();
        let r = TensorRelocator::new(&devices);
        let src = TensorHandle::from_f32("b", Shape::vector(4), &[1.0, -2.0, 3.5, 0.25], DeviceId::cpu(), &devices)
            .unwrap();
        let out = r.relocate(&src, &"cuda:0".into(), None).unwrap();
        assert_eq!(out.to_f32_vec().unwrap(), vec![1.0, -2.0, 3.5, 0.25]);
        assert_eq!(out.placement().device(), Some(DeviceId::cuda(0)));
        // Source untouched.
        assert_eq!(src.placement().device(), Some(DeviceId::cpu()));
    }

    #[test]
    fn test_concrete_to_meta_unsupported() {
        let devices = devices();
        let r = TensorRelocator::new(&devices);
        let src = TensorHandle::zeros("b", Shape::vector(4), DType::F32, DeviceId::cpu(), &devices).unwrap();
        let err = r.relocate(&src, &"meta".into(), None).unwrap_err();
        assert!(matches!(err, RelocationError::UnsupportedPlacement { .. }));
    }

    #[test]
    fn test_explicit_value_to_meta_unsupported() {
        let devices = devices();
        let r = TensorRelocator::new(&devices);
        let value = vec![0u8; 64];
        let err = r.relocate(&meta_w(), &"meta".into(), Some(&value)).unwrap_err();
        assert!(matches!(err, RelocationError::UnsupportedPlacement { .. }));

        let src = TensorHandle::zeros("w", Shape::matrix(4, 4), DType::F32, DeviceId::cpu(), &devices).unwrap();
        let err = r.relocate(&src, &"meta".into(), Some(&value)).unwrap_err();
        assert!(matches!(err, RelocationError::UnsupportedPlacement { ref to, .. } if to == "meta"));
        assert!(src.has_storage());
    }

    #[test]
    fn test_overflowing_shape_is_an_allocation_failure() {
        let devices = devices();
        let r = TensorRelocator::new(&devices);
        let huge = TensorHandle::meta("huge", Shape::new(vec![usize::MAX, 2]), DType::F32);

        let err = r.relocate(&huge, &"cpu".into(), None).unwrap_err();
        match err {
            RelocationError::AllocationFailure { name, detail, source, .. } => {
                assert_eq!(name, "huge");
                assert!(detail.contains("overflows"));
                assert!(source.is_none());
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = r.relocate(&huge, &"cpu".into(), Some(&[0u8; 4])).unwrap_err();
        assert!(matches!(err, RelocationError::AllocationFailure { .. }));
        assert_eq!(devices.get(&DeviceId::cpu()).unwrap().pool().allocated_bytes(), 0);
    }

    #[test]
    fn test_explicit_value_installed() {
        let devices = devices();
        let r = TensorRelocator::new(&devices);
        let values: Vec<f32> = (0..16).map(|i| i as f32).collect();
        let bytes = tensor_core::f32_to_bytes(&values);
        let out = r.relocate(&meta_w(), &"cpu".into(), Some(&bytes)).unwrap();
        assert_eq!(out.to_f32_vec().unwrap(), values);
    }

    #[test]
    fn test_explicit_value_wrong_size() {
        let devices = devices();
        let r = TensorRelocator::new(&devices);
        let err = r.relocate(&meta_w(), &"cpu".into(), Some(&[0u8; 10])).unwrap_err();
        assert!(matches!(
            err,
            RelocationError::ValueSizeMismatch { expected: 64, actual: 10, .. }
        ));
    }

    #[test]
    fn test_disk_is_not_a_relocation_target() {
        let devices = devices();
        let r = TensorRelocator::new(&devices);
        let err = r.relocate(&meta_w(), &"disk".into(), None).unwrap_err();
        assert!(matches!(err, RelocationError::UnsupportedPlacement { .. }));
    }

    #[test]
    fn test_unknown_and_unavailable_devices() {
        let devices = devices();
        let r = TensorRelocator::new(&devices);
        let err = r.relocate(&meta_w(), &"tpu:0".into(), None).unwrap_err();
        assert!(matches!(err, RelocationError::UnknownDeviceIdentity { .. }));

        let err = r.relocate(&meta_w(), &"cuda:7".into(), None).unwrap_err();
        assert!(matches!(err, RelocationError::DeviceUnavailable { .. }));
    }

    #[test]
    fn test_pinning_carried_to_result() {
        let devices = devices();
        let r = TensorRelocator::new(&devices);
        let pinned = Placement::Concrete {
            device: DeviceId::cpu(),
            pinned: true,
        };
        let out = r.relocate(&meta_w(), &pinned.clone().into(), None).unwrap();
        assert_eq!(out.placement(), &pinned);
    }

    #[test]
    fn test_ordinal_kind_is_configurable() {
        let devices = DeviceSet::new().with_device(
            DeviceId::new(DeviceKind::Npu, 1).unwrap(),
            MemoryBudget::from_mb(1),
            false,
        );
        let r = TensorRelocator::new(&devices).with_ordinal_kind(DeviceKind::Npu);
        let out = r.relocate(&meta_w(), &1usize.into(), None).unwrap();
        assert_eq!(out.placement().to_string(), "npu:1");
    }

    #[test]
    fn test_materializer_lookup() {
        assert_eq!(materializer_by_name("Uninitialized").unwrap().name(), "uninitialized");
        assert_eq!(materializer_by_name("empty_like").unwrap().name(), "empty-like");
        assert!(materializer_by_name("random").is_none());
        let names: Vec<_> = default_materializers().iter().map(|m| m.name().to_string()).collect();
        assert_eq!(names, vec!["uninitialized", "empty-like"]);
    }
}
