// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! SafeTensors checkpoints as a source of explicit values.
//!
//! The file is memory-mapped and its header parsed once; tensor payloads are
//! sliced out of the mapping on demand and handed to the relocator as raw
//! little-endian bytes.

use crate::CheckpointError;
use std::collections::BTreeMap;
use std::ops::Range;
use std::path::Path;
use tensor_core::{DType, Shape, TensorHandle};

enum Backing {
    Mapped(memmap2::Mmap),
    Owned(Vec<u8>),
}

impl Backing {
    fn bytes(&self) -> &[u8] {
        match self {
            Self::Mapped(m) => &m[..],
            Self::Owned(v) => v.as_slice(),
        }
    }
}

/// Header information for one checkpoint tensor.
#[derive(Debug, Clone)]
pub struct CheckpointEntry {
    shape: Shape,
    dtype: Option<DType>,
    raw_dtype: String,
    range: Range<usize>,
}

impl CheckpointEntry {
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// The dtype, if the runtime supports it.
    pub fn dtype(&self) -> Option<DType> {
        self.dtype
    }

    /// The dtype as spelled in the file header.
    pub fn raw_dtype(&self) -> &str {
        &self.raw_dtype
    }

    pub fn size_bytes(&self) -> usize {
        self.range.len()
    }
}

/// An opened SafeTensors checkpoint.
pub struct Checkpoint {
    source: String,
    backing: Backing,
    entries: BTreeMap<String, CheckpointEntry>,
}

impl Checkpoint {
    /// Memory-maps and indexes a `.safetensors` file.
    pub fn open(path: &Path) -> Result<Self, CheckpointError> {
        let io_err = |source| CheckpointError::Io {
            path: path.display().to_string(),
            source,
        };
        let file = std::fs::File::open(path).map_err(io_err)?;
        // The mapping is read-only and the file is not modified while the
        // checkpoint is alive.
        let mmap = unsafe { memmap2::Mmap::map(&file) }.map_err(io_err)?;

        let checkpoint = Self::index(path.display().to_string(), Backing::Mapped(mmap))?;
        tracing::info!(
            "checkpoint: mmap'd {} ({} tensors, {:.2} MB)",
            checkpoint.source,
            checkpoint.len(),
            checkpoint.backing.bytes().len() as f64 / (1024.0 * 1024.0),
        );
        Ok(checkpoint)
    }

    /// Indexes an in-memory SafeTensors buffer.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, CheckpointError> {
        Self::index("<memory>".to_string(), Backing::Owned(bytes))
    }

    fn index(source: String, backing: Backing) -> Result<Self, CheckpointError> {
        let entries = {
            let bytes = backing.bytes();
            let tensors = safetensors::SafeTensors::deserialize(bytes)
                .map_err(|e| CheckpointError::Parse(format!("SafeTensors parse error: {e}")))?;

            let base = bytes.as_ptr() as usize;
            let mut entries = BTreeMap::new();
            for (name, view) in tensors.tensors() {
                let data = view.data();
                let start = data.as_ptr() as usize - base;
                entries.insert(
                    name,
                    CheckpointEntry {
                        shape: Shape::new(view.shape().to_vec()),
                        dtype: convert_dtype(view.dtype()),
                        raw_dtype: format!("{:?}", view.dtype()),
                        range: start..start + data.len(),
                    },
                );
            }
            entries
        };

        Ok(Self {
            source,
            backing,
            entries,
        })
    }

    /// Where the checkpoint was read from.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Tensor names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn entry(&self, name: &str) -> Option<&CheckpointEntry> {
        self.entries.get(name)
    }

    /// Raw bytes of `name`, unchecked.
    pub fn data(&self, name: &str) -> Option<&[u8]> {
        self.entries
            .get(name)
            .map(|e| &self.backing.bytes()[e.range.clone()])
    }

    /// Returns the value for `tensor` if the checkpoint holds one, after
    /// checking that its dtype and shape match the tensor's.
    pub fn value_for(&self, tensor: &TensorHandle) -> Result<Option<&[u8]>, CheckpointError> {
        let Some(entry) = self.entries.get(tensor.name()) else {
            return Ok(None);
        };
        let dtype = entry.dtype.ok_or_else(|| CheckpointError::UnsupportedDType {
            name: tensor.name().to_string(),
            dtype: entry.raw_dtype.clone(),
        })?;
        if dtype != tensor.dtype() || &entry.shape != tensor.shape() {
            return Err(CheckpointError::Mismatch {
                name: tensor.name().to_string(),
                expected_shape: tensor.shape().clone(),
                expected_dtype: tensor.dtype(),
                actual_shape: entry.shape.clone(),
                actual_dtype: dtype,
            });
        }
        Ok(Some(&self.backing.bytes()[entry.range.clone()]))
    }
}

impl std::fmt::Debug for Checkpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Checkpoint")
            .field("source", &self.source)
            .field("tensors", &self.entries.len())
            .finish()
    }
}

/// Converts a SafeTensors `Dtype` to our [`DType`].
fn convert_dtype(st_dtype: safetensors::Dtype) -> Option<DType> {
    match st_dtype {
        safetensors::Dtype::F32 => Some(DType::F32),
        safetensors::Dtype::F16 => Some(DType::F16),
        safetensors::Dtype::BF16 => Some(DType::BF16),
        safetensors::Dtype::I8 => Some(DType::I8),
        _ => None,
    }
}
