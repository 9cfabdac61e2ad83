// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Integration tests: end-to-end placement pipeline.
//!
//! These tests exercise the complete flow from manifest parsing →
//! empty-weight initialization → dispatch, proving that the four library
//! crates compose correctly.

use memory_manager::MemoryBudget;
use model_ir::{GraphStore, ModelGraph, ModelLoader, ModelManifest};
use runtime::{
    Checkpoint, DeviceMap, DispatchConfig, DispatchError, DispatchPath, ModelDispatcher,
    OffloadIndex, RelocationError, RuntimeError, TensorRelocator,
};
use std::io::Write;
use tensor_core::{
    f32_to_bytes, DType, DeviceId, DeviceKind, DeviceSet, DeviceSpec, Destination, Placement,
    Shape, TensorHandle,
};

// ── Helpers ────────────────────────────────────────────────────

/// A small transformer-like manifest: embeddings, `blocks` blocks and a
/// head, plus one buffer.
fn synthetic_manifest(blocks: usize, hidden: usize) -> ModelManifest {
    let mut parameters = vec![serde_json::json!({ "name": "wte.weight", "shape": [32, hidden] })];
    for b in 0..blocks {
        parameters.push(serde_json::json!({ "name": format!("h.{b}.attn.weight"), "shape": [hidden, hidden] }));
        parameters.push(serde_json::json!({ "name": format!("h.{b}.mlp.weight"), "shape": [hidden, hidden * 4] }));
    }
    parameters.push(serde_json::json!({ "name": "lm_head.weight", "shape": [hidden, 32] }));

    let json = serde_json::json!({
        "name": "synthetic",
        "parameters": parameters,
        "buffers": [{ "name": "position_ids", "shape": [16], "dtype": "f32" }],
    });
    ModelManifest::from_json(&json.to_string()).unwrap()
}

fn cpu() -> Placement {
    Placement::concrete(DeviceId::cpu())
}

fn cuda(i: usize) -> Placement {
    Placement::concrete(DeviceId::cuda(i))
}

/// Host plus one small accelerator.
fn host_and_cuda(cuda_budget: MemoryBudget) -> DeviceSet {
    DeviceSet::host_only().with_device(DeviceId::cuda(0), cuda_budget, false)
}

/// Encodes tensors in SafeTensors layout.
fn safetensors_bytes(tensors: &[(&str, Vec<usize>, Vec<f32>)]) -> Vec<u8> {
    let mut header = serde_json::Map::new();
    let mut data = Vec::new();
    for (name, shape, values) in tensors {
        let start = data.len();
        data.extend_from_slice(&f32_to_bytes(values));
        header.insert(
            name.to_string(),
            serde_json::json!({ "dtype": "F32", "shape": shape, "data_offsets": [start, data.len()] }),
        );
    }
    let mut header = serde_json::to_vec(&header).unwrap();
    while header.len() % 8 != 0 {
        header.push(b' ');
    }
    let mut out = (header.len() as u64).to_le_bytes().to_vec();
    out.extend_from_slice(&header);
    out.extend_from_slice(&data);
    out
}

// ── Scenarios ──────────────────────────────────────────────────

#[test]
fn test_placeholder_weight_to_cpu() {
    let devices = DeviceSet::host_only();
    let mut graph = GraphStore::new("single");
    graph
        .add_parameter(TensorHandle::meta("w", Shape::matrix(4, 4), DType::F32))
        .unwrap();

    let report = ModelDispatcher::new(&devices)
        .dispatch(&mut graph, &DeviceMap::uniform("cpu"))
        .unwrap();

    let w = graph.tensor("w").unwrap();
    assert_eq!(w.placement(), &cpu());
    assert!(w.has_storage());
    assert_eq!(w.shape(), &Shape::matrix(4, 4));
    assert_eq!(w.dtype(), DType::F32);
    assert_eq!(report.path, DispatchPath::PerEntity);
    assert_eq!(report.materialized, 1);
    assert_eq!(report.bytes_allocated, 64);
}

#[test]
fn test_allocation_failure_keeps_earlier_entities() {
    let devices = host_and_cuda(MemoryBudget::from_bytes(1024));
    let mut graph = GraphStore::new("two");
    graph
        .add_parameter(TensorHandle::meta("a", Shape::vector(128), DType::F32))
        .unwrap();
    graph
        .add_parameter(TensorHandle::meta("b", Shape::vector(160), DType::F32))
        .unwrap();

    let err = ModelDispatcher::new(&devices)
        .dispatch(&mut graph, &DeviceMap::uniform(0usize))
        .unwrap_err();

    match err {
        DispatchError::Entity { name, source } => {
            assert_eq!(name, "b");
            assert!(matches!(source, RelocationError::AllocationFailure { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(graph.tensor("a").unwrap().placement(), &cuda(0));
    assert!(graph.tensor("b").unwrap().is_meta());
}

#[test]
fn test_explicit_value_to_meta_is_unsupported() {
    let devices = DeviceSet::host_only();
    let relocator = TensorRelocator::new(&devices);
    let t = TensorHandle::meta("w", Shape::vector(2), DType::F32);
    let value = f32_to_bytes(&[1.0, 2.0]);

    let err = relocator
        .relocate(&t, &DeviceSpec::from("meta"), Some(&value))
        .unwrap_err();
    assert!(matches!(err, RelocationError::UnsupportedPlacement { .. }));

    let concrete = TensorHandle::zeros("w", Shape::vector(2), DType::F32, DeviceId::cpu(), &devices).unwrap();
    let err = relocator
        .relocate(&concrete, &DeviceSpec::from("meta"), Some(&value))
        .unwrap_err();
    assert!(matches!(err, RelocationError::UnsupportedPlacement { .. }));
    assert_eq!(concrete.to_f32_vec().unwrap(), vec![0.0, 0.0]);
}

#[test]
fn test_canonical_forms_agree() {
    let devices = host_and_cuda(MemoryBudget::unlimited());
    let relocator = TensorRelocator::new(&devices);
    let expected = Destination::Tensor(cuda(0));

    for spec in [
        DeviceSpec::from(0usize),
        DeviceSpec::from("cuda:0"),
        DeviceSpec::from(DeviceId::cuda(0)),
    ] {
        assert_eq!(relocator.canonicalize(&spec).unwrap(), expected);
    }
    assert_eq!(
        relocator.canonicalize(&DeviceSpec::from("meta")).unwrap(),
        Destination::Tensor(Placement::Meta)
    );

    // Relocating with any spelling lands on the same placement.
    let t = TensorHandle::meta("w", Shape::vector(4), DType::F32);
    let by_ordinal = relocator.relocate(&t, &0usize.into(), None).unwrap();
    let by_name = relocator.relocate(&t, &"cuda:0".into(), None).unwrap();
    assert_eq!(by_ordinal.placement(), by_name.placement());
}

#[test]
fn test_unknown_device_identity() {
    let devices = DeviceSet::host_only();
    let relocator = TensorRelocator::new(&devices);
    let t = TensorHandle::meta("w", Shape::vector(4), DType::F32);
    let err = relocator.relocate(&t, &"gpu-ish".into(), None).unwrap_err();
    assert!(matches!(err, RelocationError::UnknownDeviceIdentity { .. }));
}

#[test]
fn test_copy_across_devices_preserves_values() {
    let devices = host_and_cuda(MemoryBudget::unlimited());
    let relocator = TensorRelocator::new(&devices);
    let t = TensorHandle::from_f32("w", Shape::matrix(2, 2), &[1.0, -2.0, 3.5, 0.0], DeviceId::cpu(), &devices)
        .unwrap();

    let moved = relocator.relocate(&t, &"cuda:0".into(), None).unwrap();
    assert_eq!(moved.placement(), &cuda(0));
    assert_eq!(moved.to_f32_vec().unwrap(), vec![1.0, -2.0, 3.5, 0.0]);
    // Source untouched.
    assert_eq!(t.placement(), &cpu());
}

#[test]
fn test_manifest_to_device_map() {
    let devices = host_and_cuda(MemoryBudget::unlimited());
    let manifest = synthetic_manifest(2, 8);
    let mut graph = ModelLoader::init_empty(&manifest, false, &devices).unwrap();
    assert_eq!(graph.meta_count(), 6);

    let map = DeviceMap::per_entity("cpu")
        .with_entry("h", 0usize)
        .with_entry("h.1.mlp", "cpu");
    let report = ModelDispatcher::new(&devices).dispatch(&mut graph, &map).unwrap();

    assert!(!graph.has_meta_tensors());
    assert_eq!(graph.tensor("wte.weight").unwrap().placement(), &cpu());
    assert_eq!(graph.tensor("h.0.attn.weight").unwrap().placement(), &cuda(0));
    assert_eq!(graph.tensor("h.1.attn.weight").unwrap().placement(), &cuda(0));
    assert_eq!(graph.tensor("h.1.mlp.weight").unwrap().placement(), &cpu());
    assert_eq!(graph.tensor("lm_head.weight").unwrap().placement(), &cpu());
    // The host buffer was already on the fallback device.
    assert_eq!(report.unchanged, 1);
    assert_eq!(report.materialized, 6);
}

#[test]
fn test_buffers_as_placeholders() {
    let devices = DeviceSet::host_only();
    let manifest = synthetic_manifest(1, 4);
    let mut graph = ModelLoader::init_empty(&manifest, true, &devices).unwrap();
    assert!(graph.tensor("position_ids").unwrap().is_meta());

    let report = ModelDispatcher::new(&devices)
        .dispatch(&mut graph, &DeviceMap::uniform("cpu"))
        .unwrap();
    assert_eq!(report.materialized, graph.len());
}

#[test]
fn test_disk_entities_go_to_offload() {
    let devices = DeviceSet::host_only();
    let manifest = synthetic_manifest(2, 4);
    let mut graph = ModelLoader::init_empty(&manifest, false, &devices).unwrap();
    let mut index = OffloadIndex::new();

    let map = DeviceMap::per_entity("cpu").with_entry("h.1", "disk");
    let report = {
        let mut dispatcher = ModelDispatcher::new(&devices).with_offload(&mut index);
        dispatcher.dispatch(&mut graph, &map).unwrap()
    };

    assert_eq!(report.offloaded, 2);
    assert_eq!(index.names().collect::<Vec<_>>(), vec!["h.1.attn.weight", "h.1.mlp.weight"]);
    assert!(graph.tensor("h.1.attn.weight").unwrap().is_meta());
    assert_eq!(graph.tensor("h.0.attn.weight").unwrap().placement(), &cpu());

    let dir = tempfile::tempdir().unwrap();
    index.save(dir.path()).unwrap();
    assert!(dir.path().join("index.json").exists());
}

#[test]
fn test_whole_model_to_disk_is_rejected() {
    let devices = DeviceSet::host_only();
    let mut graph = ModelLoader::init_empty(&synthetic_manifest(1, 4), true, &devices).unwrap();
    let mut index = OffloadIndex::new();
    let mut dispatcher = ModelDispatcher::new(&devices).with_offload(&mut index);

    let err = dispatcher
        .dispatch(&mut graph, &DeviceMap::uniform("disk"))
        .unwrap_err();
    assert!(matches!(err, DispatchError::WholeModelToDisk));
}

#[test]
fn test_bulk_capacity_check_moves_nothing() {
    let devices = host_and_cuda(MemoryBudget::from_bytes(256));
    let mut graph = GraphStore::new("concrete");
    for name in ["x", "y"] {
        graph
            .add_parameter(TensorHandle::zeros(name, Shape::vector(48), DType::F32, DeviceId::cpu(), &devices).unwrap())
            .unwrap();
    }

    let err = ModelDispatcher::new(&devices)
        .dispatch(&mut graph, &DeviceMap::uniform("cuda:0"))
        .unwrap_err();
    assert!(matches!(err, DispatchError::InsufficientCapacity { .. }));
    assert_eq!(graph.tensor("x").unwrap().placement(), &cpu());
    assert_eq!(graph.tensor("y").unwrap().placement(), &cpu());
}

#[test]
fn test_checkpoint_values_are_installed() {
    let devices = host_and_cuda(MemoryBudget::unlimited());
    let mut graph = GraphStore::new("ckpt");
    graph
        .add_parameter(TensorHandle::meta("w", Shape::matrix(2, 2), DType::F32))
        .unwrap();
    graph
        .add_parameter(TensorHandle::meta("bias", Shape::vector(2), DType::F32))
        .unwrap();

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&safetensors_bytes(&[
        ("w", vec![2, 2], vec![0.5, 1.5, 2.5, 3.5]),
        ("unused", vec![1], vec![9.0]),
    ]))
    .unwrap();
    file.flush().unwrap();
    let checkpoint = Checkpoint::open(file.path()).unwrap();

    let report = ModelDispatcher::new(&devices)
        .load_checkpoint_and_dispatch(&mut graph, &checkpoint, &DeviceMap::uniform(0usize))
        .unwrap();

    assert_eq!(report.path, DispatchPath::Checkpoint);
    assert_eq!(report.loaded, 1);
    assert_eq!(report.materialized, 1);
    let w = graph.tensor("w").unwrap();
    assert_eq!(w.placement(), &cuda(0));
    assert_eq!(w.to_f32_vec().unwrap(), vec![0.5, 1.5, 2.5, 3.5]);
    assert!(graph.tensor("bias").unwrap().has_storage());
}

#[test]
fn test_checkpoint_shape_mismatch() {
    let devices = DeviceSet::host_only();
    let mut graph = GraphStore::new("ckpt");
    graph
        .add_parameter(TensorHandle::meta("w", Shape::vector(3), DType::F32))
        .unwrap();
    let checkpoint =
        Checkpoint::from_bytes(safetensors_bytes(&[("w", vec![2], vec![1.0, 2.0])])).unwrap();

    let err = ModelDispatcher::new(&devices)
        .load_checkpoint_and_dispatch(&mut graph, &checkpoint, &DeviceMap::uniform("cpu"))
        .unwrap_err();
    assert!(matches!(err, RuntimeError::Checkpoint(_)));
    assert!(graph.tensor("w").unwrap().is_meta());
}

#[test]
fn test_config_driven_dispatch() {
    let config = DispatchConfig::from_toml(
        r#"
fallback_device = "cpu"
materializers = ["empty-like"]

[devices.cpu]
uninit_alloc = true

[devices."cuda:0"]
budget = "1M"

[device_map]
"h" = 0
"#,
    )
    .unwrap();
    assert_eq!(config.ordinal_kind().unwrap(), DeviceKind::Cuda);

    let devices = config.build_devices().unwrap();
    let map = config.device_map().unwrap();
    let mut graph = ModelLoader::init_empty(&synthetic_manifest(1, 8), false, &devices).unwrap();

    let report = config
        .dispatcher(&devices)
        .unwrap()
        .dispatch(&mut graph, &map)
        .unwrap();

    assert_eq!(report.materialized, 4);
    assert_eq!(graph.tensor("h.0.mlp.weight").unwrap().placement(), &cuda(0));
    assert_eq!(graph.tensor("wte.weight").unwrap().placement(), &cpu());

    let pool = devices.get(&DeviceId::cuda(0)).unwrap().pool();
    assert_eq!(pool.allocated_bytes(), (8 * 8 + 8 * 32) * 4);
}

#[test]
fn test_release_on_rebind() {
    let devices = host_and_cuda(MemoryBudget::unlimited());
    let mut graph = GraphStore::new("moves");
    graph
        .add_parameter(TensorHandle::meta("w", Shape::vector(64), DType::F32))
        .unwrap();

    let mut dispatcher = ModelDispatcher::new(&devices);
    dispatcher.dispatch(&mut graph, &DeviceMap::uniform("cpu")).unwrap();
    dispatcher.dispatch(&mut graph, &DeviceMap::uniform("cuda:0")).unwrap();

    let cpu_pool = devices.get(&DeviceId::cpu()).unwrap().pool();
    let cuda_pool = devices.get(&DeviceId::cuda(0)).unwrap().pool();
    assert_eq!(cpu_pool.allocated_bytes(), 0);
    assert_eq!(cuda_pool.allocated_bytes(), 256);
}
