// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Dispatch configuration loaded from TOML files or constructed programmatically.
//!
//! # TOML Format
//! ```toml
//! fallback_device = "cpu"
//! ordinal_kind = "cuda"
//! bulk_fast_path = true
//! materializers = ["uninitialized", "empty-like"]
//!
//! [devices.cpu]
//! budget = "4G"
//! uninit_alloc = true
//!
//! [devices."cuda:0"]
//! budget = "1G"
//!
//! [device_map]
//! "" = "cuda:0"
//! "lm_head" = "cpu"
//! ```
//!
//! Setting `uniform_device` instead of `[device_map]` sends every entity to
//! one device.

use crate::relocator::materializer_by_name;
use crate::{DeviceMap, Materializer, ModelDispatcher, RuntimeError, TensorRelocator};
use memory_manager::MemoryBudget;
use std::collections::BTreeMap;
use std::path::Path;
use tensor_core::{DeviceId, DeviceKind, DeviceSet, DeviceSpec};

/// Memory settings for one device.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DeviceConfig {
    /// Human-readable budget (e.g., `"512M"`). Unlimited when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<String>,
    /// Whether the device can allocate without zeroing.
    #[serde(default)]
    pub uninit_alloc: bool,
}

/// Configuration for the placement runtime.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DispatchConfig {
    /// Target for entities no device-map key covers.
    #[serde(default = "default_fallback")]
    pub fallback_device: DeviceSpec,
    /// Device family that bare integer ordinals refer to.
    #[serde(default = "default_ordinal_kind")]
    pub ordinal_kind: String,
    /// Whether a uniform map over a placeholder-free model may take the
    /// bulk path.
    #[serde(default = "default_true")]
    pub bulk_fast_path: bool,
    /// Materializer names in preference order.
    #[serde(default = "default_materializers")]
    pub materializers: Vec<String>,
    /// Send everything to one device. Mutually exclusive with `device_map`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uniform_device: Option<DeviceSpec>,
    /// Registered devices, keyed by device string.
    #[serde(default)]
    pub devices: BTreeMap<String, DeviceConfig>,
    /// Prefix-keyed placement map.
    #[serde(default)]
    pub device_map: BTreeMap<String, DeviceSpec>,
}

fn default_fallback() -> DeviceSpec {
    DeviceSpec::from("cpu")
}

fn default_ordinal_kind() -> String {
    "cuda".to_string()
}

fn default_true() -> bool {
    true
}

fn default_materializers() -> Vec<String> {
    vec!["uninitialized".to_string(), "empty-like".to_string()]
}

impl DispatchConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, RuntimeError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RuntimeError::ConfigError(format!("cannot read config '{}': {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, RuntimeError> {
        toml::from_str(toml_str)
            .map_err(|e| RuntimeError::ConfigError(format!("TOML parse error: {e}")))
    }

    /// Serialises configuration to TOML.
    pub fn to_toml(&self) -> Result<String, RuntimeError> {
        toml::to_string_pretty(self)
            .map_err(|e| RuntimeError::ConfigError(format!("TOML serialise error: {e}")))
    }

    /// Parses `ordinal_kind`.
    pub fn ordinal_kind(&self) -> Result<DeviceKind, RuntimeError> {
        DeviceKind::from_str_loose(&self.ordinal_kind).ok_or_else(|| {
            RuntimeError::ConfigError(format!("unknown ordinal kind '{}'", self.ordinal_kind))
        })
    }

    /// Builds the device registry. With no `[devices]` table, an unlimited
    /// host device is registered.
    pub fn build_devices(&self) -> Result<DeviceSet, RuntimeError> {
        if self.devices.is_empty() {
            return Ok(DeviceSet::host_only());
        }

        let mut set = DeviceSet::new();
        for (key, device) in &self.devices {
            let id = DeviceId::parse(key)
                .map_err(|e| RuntimeError::ConfigError(format!("invalid device '{key}': {e}")))?;
            let budget = match &device.budget {
                Some(b) => MemoryBudget::parse(b)
                    .map_err(|e| RuntimeError::ConfigError(format!("invalid budget for '{key}': {e}")))?,
                None => MemoryBudget::unlimited(),
            };
            set.insert(id, budget, device.uninit_alloc);
        }
        Ok(set)
    }

    /// Builds the device map.
    pub fn device_map(&self) -> Result<DeviceMap, RuntimeError> {
        match &self.uniform_device {
            Some(_) if !self.device_map.is_empty() => Err(RuntimeError::ConfigError(
                "set either 'uniform_device' or '[device_map]', not both".into(),
            )),
            Some(spec) => Ok(DeviceMap::Uniform(spec.clone())),
            None if self.device_map.is_empty() => Ok(DeviceMap::Uniform(self.fallback_device.clone())),
            None => Ok(DeviceMap::PerEntity {
                entries: self.device_map.clone(),
                fallback: self.fallback_device.clone(),
            }),
        }
    }

    /// Creates the materializers named in `materializers`.
    pub fn materializers(&self) -> Result<Vec<Box<dyn Materializer>>, RuntimeError> {
        self.materializers
            .iter()
            .map(|name| {
                materializer_by_name(name).ok_or_else(|| {
                    RuntimeError::ConfigError(format!(
                        "unknown materializer '{name}'; expected 'uninitialized' or 'empty-like'"
                    ))
                })
            })
            .collect()
    }

    /// Creates a dispatcher over `devices` configured by this file.
    pub fn dispatcher<'a>(&self, devices: &'a DeviceSet) -> Result<ModelDispatcher<'a>, RuntimeError> {
        let relocator = TensorRelocator::new(devices)
            .with_materializers(self.materializers()?)
            .with_ordinal_kind(self.ordinal_kind()?);
        Ok(ModelDispatcher::with_relocator(relocator).bulk_fast_path(self.bulk_fast_path))
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            fallback_device: default_fallback(),
            ordinal_kind: default_ordinal_kind(),
            bulk_fast_path: true,
            materializers: default_materializers(),
            uniform_device: None,
            devices: BTreeMap::new(),
            device_map: BTreeMap::new(),
        }
    }
}
