// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Named tensor handles that may or may not own storage.

use crate::{DType, DeviceId, DeviceSet, Placement, Shape, TensorError};
use memory_manager::BufferGuard;

/// A named tensor: declared shape and dtype, a placement, and storage iff the
/// placement is concrete.
///
/// # Storage Invariant
/// A `Meta` handle never has storage and every read returns
/// [`TensorError::NoStorage`]. A concrete handle's storage is exactly
/// `shape.size_bytes(dtype)` long. Both are enforced by the constructors;
/// there is no way to build a handle that breaks them.
///
/// Storage is a [`BufferGuard`], so dropping a handle returns its memory to
/// the device pool it came from.
#[derive(Debug)]
pub struct TensorHandle {
    name: String,
    shape: Shape,
    dtype: DType,
    placement: Placement,
    storage: Option<BufferGuard>,
}

impl TensorHandle {
    /// Creates a placeholder on the meta device.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::{DType, Shape, TensorHandle};
    /// let w = TensorHandle::meta("w", Shape::matrix(4, 4), DType::F32);
    /// assert!(w.is_meta());
    /// assert!(w.as_bytes().is_err());
    /// ```
    pub fn meta(name: impl Into<String>, shape: Shape, dtype: DType) -> Self {
        Self {
            name: name.into(),
            shape,
            dtype,
            placement: Placement::Meta,
            storage: None,
        }
    }

    /// Wraps existing storage. `placement` must be concrete and the storage
    /// length must match the declared shape and dtype.
    pub fn materialized(
        name: impl Into<String>,
        shape: Shape,
        dtype: DType,
        placement: Placement,
        storage: BufferGuard,
    ) -> Result<Self, TensorError> {
        let name = name.into();
        if placement.is_meta() {
            return Err(TensorError::StorageOnMeta { name });
        }
        let expected = shape.size_bytes(dtype);
        if storage.size_bytes() != expected {
            return Err(TensorError::BufferSizeMismatch {
                name,
                shape,
                expected,
                actual: storage.size_bytes(),
            });
        }
        Ok(Self {
            name,
            shape,
            dtype,
            placement,
            storage: Some(storage),
        })
    }

    /// Allocates a zero-filled tensor on `device`.
    pub fn zeros(
        name: impl Into<String>,
        shape: Shape,
        dtype: DType,
        device: DeviceId,
        devices: &DeviceSet,
    ) -> Result<Self, TensorError> {
        let storage = devices.allocate(&device, shape.size_bytes(dtype))?;
        Self::materialized(name, shape, dtype, Placement::concrete(device), storage)
    }

    /// Allocates an `f32` tensor on `device` holding `values`.
    pub fn from_f32(
        name: impl Into<String>,
        shape: Shape,
        values: &[f32],
        device: DeviceId,
        devices: &DeviceSet,
    ) -> Result<Self, TensorError> {
        let name = name.into();
        let bytes = f32_to_bytes(values);
        let expected = shape.size_bytes(DType::F32);
        if bytes.len() != expected {
            return Err(TensorError::BufferSizeMismatch {
                name,
                shape,
                expected,
                actual: bytes.len(),
            });
        }
        let mut storage = devices.allocate(&device, expected)?;
        storage.as_mut_slice().copy_from_slice(&bytes);
        Self::materialized(name, shape, DType::F32, Placement::concrete(device), storage)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn placement(&self) -> &Placement {
        &self.placement
    }

    pub fn is_meta(&self) -> bool {
        self.placement.is_meta()
    }

    /// Returns `true` if this handle owns storage.
    pub fn has_storage(&self) -> bool {
        self.storage.is_some()
    }

    /// Declared footprint in bytes, whether or not storage exists.
    pub fn size_bytes(&self) -> usize {
        self.shape.size_bytes(self.dtype)
    }

    /// Returns `true` if `other` declares the same shape and dtype.
    pub fn same_identity(&self, other: &TensorHandle) -> bool {
        self.shape == other.shape && self.dtype == other.dtype
    }

    /// A storage-less copy of this handle's identity on the meta device.
    pub fn placeholder(&self) -> Self {
        Self::meta(self.name.clone(), self.shape.clone(), self.dtype)
    }

    /// Returns the raw little-endian bytes.
    pub fn as_bytes(&self) -> Result<&[u8], TensorError> {
        self.storage
            .as_ref()
            .map(BufferGuard::as_slice)
            .ok_or_else(|| TensorError::NoStorage {
                name: self.name.clone(),
            })
    }

    /// Returns the raw bytes mutably, for callers populating materialized
    /// storage.
    pub fn as_bytes_mut(&mut self) -> Result<&mut [u8], TensorError> {
        match self.storage.as_mut() {
            Some(storage) => Ok(storage.as_mut_slice()),
            None => Err(TensorError::NoStorage {
                name: self.name.clone(),
            }),
        }
    }

    /// Decodes the storage as `f32` values.
    pub fn to_f32_vec(&self) -> Result<Vec<f32>, TensorError> {
        if self.dtype != DType::F32 {
            return Err(TensorError::DTypeMismatch {
                name: self.name.clone(),
                requested: DType::F32,
                actual: self.dtype,
            });
        }
        Ok(self
            .as_bytes()?
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }
}

/// Encodes `f32` values as little-endian bytes.
pub fn f32_to_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use memory_manager::MemoryBudget;

    fn devices() -> DeviceSet {
        DeviceSet::new().with_device(DeviceId::cpu(), MemoryBudget::from_mb(1), true)
    }

    #[test]
    fn test_meta_has_no_storage() {
        let t = TensorHandle::meta("w", Shape::matrix(4, 4), DType::F32);
        assert!(t.is_meta());
        assert!(!t.has_storage());
        assert_eq!(t.size_bytes(), 64);
        assert!(matches!(t.as_bytes(), Err(TensorError::NoStorage { .. })));
        assert!(matches!(t.to_f32_vec(), Err(TensorError::NoStorage { .. })));
    }

    #[test]
    fn test_meta_rejects_mutable_reads() {
        let mut t = TensorHandle::meta("w", Shape::vector(2), DType::F32);
        assert!(t.as_bytes_mut().is_err());
    }

    #[test]
    fn test_from_f32_roundtrip() {
        let devices = devices();
        let t = TensorHandle::from_f32("b", Shape::vector(3), &[1.0, 2.0, 3.0], DeviceId::cpu(), &devices)
            .unwrap();
        assert_eq!(t.placement(), &Placement::concrete(DeviceId::cpu()));
        assert_eq!(t.to_f32_vec().unwrap(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_from_f32_size_mismatch() {
        let devices = devices();
        let err = TensorHandle::from_f32("b", Shape::vector(4), &[1.0], DeviceId::cpu(), &devices)
            .unwrap_err();
        assert!(matches!(err, TensorError::BufferSizeMismatch { expected: 16, actual: 4, .. }));
    }

    #[test]
    fn test_materialized_rejects_meta_placement() {
        let devices = devices();
        let storage = devices.allocate(&DeviceId::cpu(), 4).unwrap();
        let err = TensorHandle::materialized("x", Shape::scalar(), DType::F32, Placement::Meta, storage)
            .unwrap_err();
        assert!(matches!(err, TensorError::StorageOnMeta { .. }));
    }

    #[test]
    fn test_dtype_mismatch_on_typed_read() {
        let devices = devices();
        let t = TensorHandle::zeros("q", Shape::vector(8), DType::I8, DeviceId::cpu(), &devices).unwrap();
        assert!(matches!(t.to_f32_vec(), Err(TensorError::DTypeMismatch { .. })));
        assert_eq!(t.as_bytes().unwrap(), &[0u8; 8]);
    }

    #[test]
    fn test_drop_returns_storage() {
        let devices = devices();
        let t = TensorHandle::zeros("z", Shape::matrix(16, 16), DType::F32, DeviceId::cpu(), &devices)
            .unwrap();
        let pool = devices.get(&DeviceId::cpu()).unwrap().pool();
        assert_eq!(pool.allocated_bytes(), 1024);
        drop(t);
        assert_eq!(pool.allocated_bytes(), 0);
    }

    #[test]
    fn test_placeholder_keeps_identity() {
        let devices = devices();
        let t = TensorHandle::zeros("z", Shape::vector(2), DType::BF16, DeviceId::cpu(), &devices).unwrap();
        let p = t.placeholder();
        assert!(p.is_meta());
        assert_eq!(p.name(), "z");
        assert!(p.same_identity(&t));
    }
}
