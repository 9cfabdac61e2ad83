// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The disk-offload seam.
//!
//! Writing weights to disk and streaming them back is an external concern.
//! The dispatcher only recognizes disk targets and hands those entities to a
//! [`DiskOffload`] implementation.

use std::collections::BTreeMap;
use std::path::Path;
use crate::OffloadError;
use tensor_core::{DType, Shape, TensorHandle};

/// Receives entities mapped to disk.
pub trait DiskOffload {
    /// Takes responsibility for `tensor`. An error aborts the dispatch at
    /// this entity.
    fn offload(&mut self, name: &str, tensor: &TensorHandle) -> Result<(), OffloadError>;
}

/// One offloaded entity as recorded in an [`OffloadIndex`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct OffloadEntry {
    pub shape: Shape,
    pub dtype: DType,
    /// Whether the tensor had storage when it was offloaded.
    pub had_data: bool,
}

/// A [`DiskOffload`] that only records what was offloaded, in the layout of
/// an `index.json` offload index.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct OffloadIndex {
    entries: BTreeMap<String, OffloadEntry>,
}

impl OffloadIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&OffloadEntry> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Serializes the index as pretty JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.entries)
    }

    /// Writes `index.json` into `dir`.
    pub fn save(&self, dir: &Path) -> Result<(), OffloadError> {
        let json = self.to_json()?;
        std::fs::write(dir.join("index.json"), json)?;
        Ok(())
    }
}

impl DiskOffload for OffloadIndex {
    fn offload(&mut self, name: &str, tensor: &TensorHandle) -> Result<(), OffloadError> {
        if self.entries.contains_key(name) {
            return Err(OffloadError::AlreadyOffloaded {
                name: name.to_string(),
            });
        }
        self.entries.insert(
            name.to_string(),
            OffloadEntry {
                shape: tensor.shape().clone(),
                dtype: tensor.dtype(),
                had_data: tensor.has_storage(),
            },
        );
        Ok(())
    }
}
