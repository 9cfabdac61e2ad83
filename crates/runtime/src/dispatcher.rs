// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Whole-model dispatch across devices.
//!
//! # Algorithm
//! ```text
//!  validate map ──► scan for placeholders ──┬─► bulk path        (uniform map,
//!                                           │   capacity check    no placeholders)
//!                                           │
//!                                           └─► per-entity path  (otherwise)
//!                                                 disk   → offload component
//!                                                 equal  → unchanged
//!                                                 else   → relocate + rebind
//! ```
//!
//! Both paths move entities through the same [`TensorRelocator`], so they
//! agree on what a placeholder is and how it is materialized. The first
//! failure stops the walk; entities moved before it stay moved.

use crate::{
    Checkpoint, DeviceMap, DiskOffload, DispatchError, DispatchPath, DispatchReport, EntityAction,
    RelocationError, RuntimeError, TensorRelocator,
};
use model_ir::ModelGraph;
use std::time::Instant;
use tensor_core::{DeviceSet, Destination, Placement, TensorHandle};

/// Places every parameter and buffer of a model according to a
/// [`DeviceMap`].
///
/// The dispatcher holds no graph between calls; each `dispatch` borrows the
/// graph mutably for its duration.
///
/// # Example
/// ```
/// use model_ir::{GraphStore, ModelGraph};
/// use runtime::{DeviceMap, ModelDispatcher};
/// use tensor_core::{DType, DeviceSet, Shape, TensorHandle};
///
/// let devices = DeviceSet::host_only();
/// let mut graph = GraphStore::new("tiny");
/// graph.add_parameter(TensorHandle::meta("w", Shape::matrix(4, 4), DType::F32)).unwrap();
///
/// let mut dispatcher = ModelDispatcher::new(&devices);
/// let report = dispatcher.dispatch(&mut graph, &DeviceMap::uniform("cpu")).unwrap();
/// assert_eq!(report.materialized, 1);
/// assert!(!graph.has_meta_tensors());
/// ```
pub struct ModelDispatcher<'a> {
    relocator: TensorRelocator<'a>,
    offload: Option<&'a mut dyn DiskOffload>,
    bulk_fast_path: bool,
}

impl<'a> ModelDispatcher<'a> {
    /// A dispatcher with a default relocator over `devices`, no offload
    /// component and the bulk path enabled.
    pub fn new(devices: &'a DeviceSet) -> Self {
        Self::with_relocator(TensorRelocator::new(devices))
    }

    pub fn with_relocator(relocator: TensorRelocator<'a>) -> Self {
        Self {
            relocator,
            offload: None,
            bulk_fast_path: true,
        }
    }

    /// Attaches the component that receives disk-mapped entities.
    pub fn with_offload(mut self, offload: &'a mut dyn DiskOffload) -> Self {
        self.offload = Some(offload);
        self
    }

    /// Enables or disables the bulk path. When disabled every dispatch walks
    /// entity by entity.
    pub fn bulk_fast_path(mut self, enabled: bool) -> Self {
        self.bulk_fast_path = enabled;
        self
    }

    pub fn relocator(&self) -> &TensorRelocator<'a> {
        &self.relocator
    }

    /// Places every entity of `graph` according to `map`.
    pub fn dispatch<G: ModelGraph>(
        &mut self,
        graph: &mut G,
        map: &DeviceMap,
    ) -> Result<DispatchReport, DispatchError> {
        let start = Instant::now();
        let targets = self.resolve_targets(graph, map)?;

        let has_meta = graph.has_meta_tensors();
        let bulk_target = match (map.uniform_target(), targets.first()) {
            (Some(_), Some((_, Destination::Tensor(placement))))
                if self.bulk_fast_path && !has_meta =>
            {
                Some(placement.clone())
            }
            _ => None,
        };

        let mut report = match &bulk_target {
            Some(placement) => {
                tracing::info!(
                    "dispatching {} entities to {} (bulk path)",
                    targets.len(),
                    placement
                );
                self.check_capacity(graph, placement)?;
                DispatchReport::new(DispatchPath::Bulk)
            }
            None => {
                tracing::info!(
                    "dispatching {} entities (per-entity path, placeholders present: {})",
                    targets.len(),
                    has_meta,
                );
                DispatchReport::new(DispatchPath::PerEntity)
            }
        };

        for (name, destination) in &targets {
            self.place(graph, name, destination, None, &mut report)?;
        }

        report.finalise(start.elapsed());
        tracing::info!("{}", report.summary());
        Ok(report)
    }

    /// Dispatches `graph`, installing values from `checkpoint` for every
    /// entity it holds. Entities the checkpoint lacks are placed as in
    /// [`dispatch`](Self::dispatch).
    pub fn load_checkpoint_and_dispatch<G: ModelGraph>(
        &mut self,
        graph: &mut G,
        checkpoint: &Checkpoint,
        map: &DeviceMap,
    ) -> Result<DispatchReport, RuntimeError> {
        let start = Instant::now();
        let targets = self.resolve_targets(graph, map)?;
        let mut report = DispatchReport::new(DispatchPath::Checkpoint);

        tracing::info!(
            "dispatching {} entities with values from {} ({} tensors)",
            targets.len(),
            checkpoint.source(),
            checkpoint.len(),
        );

        for (name, destination) in &targets {
            let value = match graph.tensor(name) {
                Some(tensor) => checkpoint.value_for(tensor)?,
                None => None,
            };
            self.place(graph, name, destination, value, &mut report)?;
        }

        let unused: Vec<&str> = checkpoint
            .names()
            .filter(|n| graph.tensor(n).is_none())
            .collect();
        if !unused.is_empty() {
            tracing::warn!(
                "{} checkpoint tensors match no entity: {}",
                unused.len(),
                unused.join(", ")
            );
        }

        report.finalise(start.elapsed());
        tracing::info!("{}", report.summary());
        Ok(report)
    }

    // ── Steps ──────────────────────────────────────────────────────

    /// Canonicalizes the map and resolves every entity's destination, in
    /// graph order. Nothing is moved if this fails.
    fn resolve_targets<G: ModelGraph>(
        &self,
        graph: &G,
        map: &DeviceMap,
    ) -> Result<Vec<(String, Destination)>, DispatchError> {
        let ordinal_kind = self.relocator.ordinal_kind();
        for (key, spec) in map.specs() {
            spec.canonicalize(ordinal_kind)
                .map_err(|source| DispatchError::InvalidDeviceMap {
                    key: key.to_string(),
                    source,
                })?;
        }

        let mut targets = Vec::new();
        for (_, name, _) in graph.entities() {
            let destination = map
                .resolve(name)
                .canonicalize(ordinal_kind)
                .map_err(|source| DispatchError::InvalidDeviceMap {
                    key: name.to_string(),
                    source,
                })?;
            targets.push((name.to_string(), destination));
        }

        let uniform_disk = matches!(
            map.uniform_target().map(|s| s.canonicalize(ordinal_kind)),
            Some(Ok(Destination::Disk))
        );
        let all_disk = !targets.is_empty() && targets.iter().all(|(_, d)| *d == Destination::Disk);
        if uniform_disk || all_disk {
            return Err(DispatchError::WholeModelToDisk);
        }

        if self.offload.is_none() {
            let on_disk: Vec<String> = targets
                .iter()
                .filter(|(_, d)| *d == Destination::Disk)
                .map(|(n, _)| n.clone())
                .collect();
            if !on_disk.is_empty() {
                return Err(DispatchError::MissingOffload { entities: on_disk });
            }
        }

        Ok(targets)
    }

    /// Fails before anything moves if the target pool cannot hold every
    /// entity that is not already there.
    fn check_capacity<G: ModelGraph>(&self, graph: &G, target: &Placement) -> Result<(), DispatchError> {
        let Some(device) = target.device() else {
            return Ok(());
        };
        // Unregistered devices surface per entity as `DeviceUnavailable`.
        let Ok(memory) = self.relocator.devices().get(&device) else {
            return Ok(());
        };

        let required = graph
            .entities()
            .iter()
            .filter(|(_, _, t)| t.placement() != target)
            .fold(0usize, |acc, (_, _, t)| acc.saturating_add(t.size_bytes()));
        if !memory.pool().can_fit(required) {
            return Err(DispatchError::InsufficientCapacity {
                device,
                required_bytes: required,
                available_bytes: memory.pool().available_bytes(),
            });
        }
        Ok(())
    }

    /// Places one entity and records what happened.
    fn place<G: ModelGraph>(
        &mut self,
        graph: &mut G,
        name: &str,
        destination: &Destination,
        value: Option<&[u8]>,
        report: &mut DispatchReport,
    ) -> Result<(), DispatchError> {
        let current = graph.tensor(name).ok_or_else(|| DispatchError::Rebind {
            name: name.to_string(),
            source: model_ir::ModelError::UnknownEntity {
                name: name.to_string(),
            },
        })?;
        let from = current.placement().clone();

        let target = match destination {
            Destination::Disk => {
                self.offload_entity(graph, name)?;
                report.record(name, &from, "disk", EntityAction::Offloaded, 0);
                return Ok(());
            }
            Destination::Tensor(target) => target,
        };

        if value.is_none() && &from == target {
            tracing::debug!("'{}' already on {}", name, target);
            report.record(name, &from, target, EntityAction::Unchanged, 0);
            return Ok(());
        }

        let moved = self
            .relocator
            .relocate_to(current, target, value)
            .map_err(|source| entity_error(name, source))?;
        let action = match (value, &from) {
            (Some(_), _) => EntityAction::Loaded,
            (None, Placement::Meta) if target.is_meta() => EntityAction::Unchanged,
            (None, Placement::Meta) => EntityAction::Materialized,
            (None, Placement::Concrete { .. }) => EntityAction::Copied,
        };
        let bytes = if moved.has_storage() { moved.size_bytes() } else { 0 };

        tracing::debug!("{} '{}': {} -> {}", action, name, from, target);
        replace(graph, name, moved)?;
        report.record(name, &from, target, action, bytes);
        Ok(())
    }

    /// Hands an entity to the offload component and leaves a placeholder in
    /// the graph.
    fn offload_entity<G: ModelGraph>(&mut self, graph: &mut G, name: &str) -> Result<(), DispatchError> {
        let Some(offload) = self.offload.as_deref_mut() else {
            return Err(DispatchError::MissingOffload {
                entities: vec![name.to_string()],
            });
        };
        let Some(tensor) = graph.tensor(name) else {
            return Ok(());
        };

        offload
            .offload(name, tensor)
            .map_err(|source| DispatchError::Offload {
                name: name.to_string(),
                source,
            })?;
        tracing::warn!("'{}' offloaded to disk", name);

        if !tensor.is_meta() {
            let placeholder = tensor.placeholder();
            replace(graph, name, placeholder)?;
        }
        Ok(())
    }
}

fn replace<G: ModelGraph>(graph: &mut G, name: &str, tensor: TensorHandle) -> Result<(), DispatchError> {
    graph
        .rebind(name, tensor)
        .map_err(|source| DispatchError::Rebind {
            name: name.to_string(),
            source,
        })
}

fn entity_error(name: &str, source: RelocationError) -> DispatchError {
    tracing::debug!("relocating '{}' failed: {}", name, source);
    DispatchError::Entity {
        name: name.to_string(),
        source,
    }
}
