// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The model graph interface and its in-memory implementation.
//!
//! A model graph is an ordered collection of named tensors split into
//! **parameters** (learned weights) and **buffers** (non-learned state such
//! as running statistics or position tables). Names are dotted module paths,
//! for example `"h.0.attn.c_attn.weight"`.
//!
//! The dispatcher only ever needs four things from a graph: enumerate
//! parameters, enumerate buffers, look a tensor up by name, and rebind a
//! name to a new tensor. That is the [`ModelGraph`] trait. [`GraphStore`] is
//! the concrete store used by the loader, the CLI and the tests.

use crate::ModelError;
use std::collections::HashMap;
use std::fmt;
use tensor_core::TensorHandle;

// ── Entity kinds ───────────────────────────────────────────────────

/// Whether a named tensor is a parameter or a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Parameter,
    Buffer,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parameter => f.write_str("parameter"),
            Self::Buffer => f.write_str("buffer"),
        }
    }
}

// ── ModelGraph trait ───────────────────────────────────────────────

/// The graph interface consumed by the dispatcher.
///
/// Implementations must enumerate entities in a stable order and must
/// reject rebinds that change an entity's shape or dtype.
pub trait ModelGraph {
    /// Parameters in graph order.
    fn parameters(&self) -> Vec<(&str, &TensorHandle)>;

    /// Buffers in graph order.
    fn buffers(&self) -> Vec<(&str, &TensorHandle)>;

    /// Looks up a parameter or buffer by name.
    fn tensor(&self, name: &str) -> Option<&TensorHandle>;

    /// Replaces the tensor bound to `name`. The previous handle is dropped,
    /// returning its storage to its device pool.
    fn rebind(&mut self, name: &str, tensor: TensorHandle) -> Result<(), ModelError>;

    /// Every entity, parameters first, tagged with its kind.
    fn entities(&self) -> Vec<(EntityKind, &str, &TensorHandle)> {
        let params = self
            .parameters()
            .into_iter()
            .map(|(n, t)| (EntityKind::Parameter, n, t));
        let bufs = self
            .buffers()
            .into_iter()
            .map(|(n, t)| (EntityKind::Buffer, n, t));
        params.chain(bufs).collect()
    }

    /// Returns `true` if any parameter or buffer is a placeholder.
    fn has_meta_tensors(&self) -> bool {
        self.entities().iter().any(|(_, _, t)| t.is_meta())
    }

    /// Total declared bytes of every entity.
    fn total_bytes(&self) -> usize {
        self.entities().iter().map(|(_, _, t)| t.size_bytes()).sum()
    }
}

// ── GraphStore ─────────────────────────────────────────────────────

/// In-memory [`ModelGraph`].
///
/// # Example
/// ```
/// use model_ir::{GraphStore, ModelGraph};
/// use tensor_core::{DType, Shape, TensorHandle};
///
/// let mut graph = GraphStore::new("tiny");
/// graph.add_parameter(TensorHandle::meta("w", Shape::matrix(4, 4), DType::F32)).unwrap();
/// assert!(graph.has_meta_tensors());
/// ```
#[derive(Debug, Default)]
pub struct GraphStore {
    name: String,
    parameters: Vec<TensorHandle>,
    buffers: Vec<TensorHandle>,
    index: HashMap<String, (EntityKind, usize)>,
}

impl GraphStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Appends a parameter. Fails if the name is already taken.
    pub fn add_parameter(&mut self, tensor: TensorHandle) -> Result<(), ModelError> {
        self.add(EntityKind::Parameter, tensor)
    }

    /// Appends a buffer. Fails if the name is already taken.
    pub fn add_buffer(&mut self, tensor: TensorHandle) -> Result<(), ModelError> {
        self.add(EntityKind::Buffer, tensor)
    }

    fn add(&mut self, kind: EntityKind, tensor: TensorHandle) -> Result<(), ModelError> {
        if self.index.contains_key(tensor.name()) {
            return Err(ModelError::DuplicateEntity {
                name: tensor.name().to_string(),
            });
        }
        let list = match kind {
            EntityKind::Parameter => &mut self.parameters,
            EntityKind::Buffer => &mut self.buffers,
        };
        self.index
            .insert(tensor.name().to_string(), (kind, list.len()));
        list.push(tensor);
        Ok(())
    }

    /// Number of parameters plus buffers.
    pub fn len(&self) -> usize {
        self.parameters.len() + self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the kind of the entity called `name`.
    pub fn kind_of(&self, name: &str) -> Option<EntityKind> {
        self.index.get(name).map(|(kind, _)| *kind)
    }

    /// Counts entities whose placement is meta.
    pub fn meta_count(&self) -> usize {
        self.parameters
            .iter()
            .chain(&self.buffers)
            .filter(|t| t.is_meta())
            .count()
    }

    /// Returns a one-line description of the graph.
    pub fn summary(&self) -> String {
        let total_mb = self.total_bytes() as f64 / (1024.0 * 1024.0);
        format!(
            "Model '{}': {} parameters, {} buffers, {:.2} MB declared, {} placeholders",
            self.name,
            self.parameters.len(),
            self.buffers.len(),
            total_mb,
            self.meta_count(),
        )
    }
}

impl ModelGraph for GraphStore {
    fn parameters(&self) -> Vec<(&str, &TensorHandle)> {
        self.parameters.iter().map(|t| (t.name(), t)).collect()
    }

    fn buffers(&self) -> Vec<(&str, &TensorHandle)> {
        self.buffers.iter().map(|t| (t.name(), t)).collect()
    }

    fn tensor(&self, name: &str) -> Option<&TensorHandle> {
        let (kind, i) = self.index.get(name)?;
        match kind {
            EntityKind::Parameter => self.parameters.get(*i),
            EntityKind::Buffer => self.buffers.get(*i),
        }
    }

    fn rebind(&mut self, name: &str, tensor: TensorHandle) -> Result<(), ModelError> {
        let (kind, i) = *self.index.get(name).ok_or_else(|| ModelError::UnknownEntity {
            name: name.to_string(),
        })?;
        let slot = match kind {
            EntityKind::Parameter => &mut self.parameters[i],
            EntityKind::Buffer => &mut self.buffers[i],
        };

        if tensor.name() != name {
            return Err(ModelError::InvalidEntity {
                name: name.to_string(),
                detail: format!("rebind supplied a tensor named '{}'", tensor.name()),
            });
        }
        if !slot.same_identity(&tensor) {
            return Err(ModelError::IdentityMismatch {
                name: name.to_string(),
                expected_shape: slot.shape().clone(),
                expected_dtype: slot.dtype(),
                actual_shape: tensor.shape().clone(),
                actual_dtype: tensor.dtype(),
            });
        }

        tracing::trace!("rebinding {} '{}' to {}", kind, name, tensor.placement());
        *slot = tensor;
        Ok(())
    }
}

impl fmt::Display for GraphStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "GraphStore '{}' ({} entities):", self.name, self.len())?;
        for (kind, name, t) in self.entities() {
            writeln!(
                f,
                "  {:<9} {} {} {} on {}",
                kind,
                name,
                t.shape(),
                t.dtype(),
                t.placement()
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memory_manager::MemoryBudget;
    use tensor_core::{DType, DeviceId, DeviceSet, Shape};

    /// Helper: a two-parameter, one-buffer graph of placeholders.
    fn make_graph() -> GraphStore {
        let mut g = GraphStore::new("test");
        g.add_parameter(TensorHandle::meta("h.0.weight", Shape::matrix(4, 4), DType::F32))
            .unwrap();
        g.add_parameter(TensorHandle::meta("h.0.bias", Shape::vector(4), DType::F32))
            .unwrap();
        g.add_buffer(TensorHandle::meta("pos", Shape::vector(8), DType::I8))
            .unwrap();
        g
    }

    fn devices() -> DeviceSet {
        DeviceSet::new().with_device(DeviceId::cpu(), MemoryBudget::from_mb(1), true)
    }

    #[test]
    fn test_order_is_parameters_then_buffers() {
        let g = make_graph();
        let names: Vec<_> = g.entities().iter().map(|(_, n, _)| n.to_string()).collect();
        assert_eq!(names, vec!["h.0.weight", "h.0.bias", "pos"]);
        assert_eq!(g.kind_of("pos"), Some(EntityKind::Buffer));
    }

    #[test]
    fn test_duplicate_across_kinds() {
        let mut g = make_graph();
        let err = g
            .add_buffer(TensorHandle::meta("h.0.bias", Shape::vector(4), DType::F32))
            .unwrap_err();
        assert!(matches!(err, ModelError::DuplicateEntity { .. }));
    }

    #[test]
    fn test_rebind_replaces_tensor() {
        let devices = devices();
        let mut g = make_graph();
        let bias = TensorHandle::zeros("h.0.bias", Shape::vector(4), DType::F32, DeviceId::cpu(), &devices)
            .unwrap();
        g.rebind("h.0.bias", bias).unwrap();
        assert!(!g.tensor("h.0.bias").unwrap().is_meta());
        assert_eq!(g.meta_count(), 2);
        assert!(g.has_meta_tensors());
    }

    #[test]
    fn test_rebind_unknown_name() {
        let mut g = make_graph();
        let err = g
            .rebind("nope", TensorHandle::meta("nope", Shape::scalar(), DType::F32))
            .unwrap_err();
        assert!(matches!(err, ModelError::UnknownEntity { .. }));
    }

    #[test]
    fn test_rebind_rejects_shape_change() {
        let mut g = make_graph();
        let err = g
            .rebind("h.0.bias", TensorHandle::meta("h.0.bias", Shape::vector(5), DType::F32))
            .unwrap_err();
        assert!(matches!(err, ModelError::IdentityMismatch { .. }));
        // Original binding untouched.
        assert_eq!(g.tensor("h.0.bias").unwrap().shape(), &Shape::vector(4));
    }

    #[test]
    fn test_rebind_rejects_dtype_change() {
        let mut g = make_graph();
        let err = g
            .rebind("pos", TensorHandle::meta("pos", Shape::vector(8), DType::F32))
            .unwrap_err();
        assert!(matches!(err, ModelError::IdentityMismatch { .. }));
    }

    #[test]
    fn test_rebind_drops_old_storage() {
        let devices = devices();
        let mut g = GraphStore::new("t");
        g.add_parameter(
            TensorHandle::zeros("w", Shape::vector(256), DType::F32, DeviceId::cpu(), &devices).unwrap(),
        )
        .unwrap();
        let pool = devices.get(&DeviceId::cpu()).unwrap().pool();
        assert_eq!(pool.allocated_bytes(), 1024);
        let placeholder = g.tensor("w").unwrap().placeholder();
        g.rebind("w", placeholder).unwrap();
        assert_eq!(pool.allocated_bytes(), 0);
    }

    #[test]
    fn test_total_bytes_and_summary() {
        let g = make_graph();
        assert_eq!(g.total_bytes(), 64 + 16 + 8);
        let s = g.summary();
        assert!(s.contains("2 parameters"));
        assert!(s.contains("3 placeholders"));
    }

    #[test]
    fn test_display() {
        let display = format!("{}", make_graph());
        assert!(display.contains("h.0.weight"));
        assert!(display.contains("buffer"));
        assert!(display.contains("meta"));
    }
}
