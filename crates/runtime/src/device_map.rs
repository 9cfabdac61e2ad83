// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Entity-name to device mapping.
//!
//! A per-entity map is keyed by dotted module prefixes. An entity resolves
//! to the longest key that equals its name or is a whole-segment prefix of
//! it, so `"h.0"` covers `"h.0.attn.weight"` but not `"h.01.weight"`. The
//! empty key covers everything. Names no key covers use the fallback.

use std::collections::BTreeMap;
use tensor_core::DeviceSpec;

/// Where each entity of a model should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceMap {
    /// Every entity goes to the same device.
    Uniform(DeviceSpec),
    /// Entities are routed by name prefix.
    PerEntity {
        entries: BTreeMap<String, DeviceSpec>,
        fallback: DeviceSpec,
    },
}

impl DeviceMap {
    pub fn uniform(spec: impl Into<DeviceSpec>) -> Self {
        Self::Uniform(spec.into())
    }

    /// An empty per-entity map that sends everything to `fallback`.
    pub fn per_entity(fallback: impl Into<DeviceSpec>) -> Self {
        Self::PerEntity {
            entries: BTreeMap::new(),
            fallback: fallback.into(),
        }
    }

    /// Adds or replaces a prefix entry. On a uniform map the entry turns it
    /// into a per-entity map with the old target as fallback.
    pub fn with_entry(self, prefix: impl Into<String>, spec: impl Into<DeviceSpec>) -> Self {
        let (mut entries, fallback) = match self {
            Self::Uniform(fallback) => (BTreeMap::new(), fallback),
            Self::PerEntity { entries, fallback } => (entries, fallback),
        };
        entries.insert(prefix.into(), spec.into());
        Self::PerEntity { entries, fallback }
    }

    /// The single target of a uniform map.
    pub fn uniform_target(&self) -> Option<&DeviceSpec> {
        match self {
            Self::Uniform(spec) => Some(spec),
            Self::PerEntity { .. } => None,
        }
    }

    /// Resolves `name` to its device spec.
    pub fn resolve(&self, name: &str) -> &DeviceSpec {
        match self {
            Self::Uniform(spec) => spec,
            Self::PerEntity { entries, fallback } => entries
                .iter()
                .filter(|(prefix, _)| covers(prefix, name))
                .max_by_key(|(prefix, _)| prefix.len())
                .map(|(_, spec)| spec)
                .unwrap_or(fallback),
        }
    }

    /// Every spec in the map with the key it appears under. The uniform
    /// target and the fallback are listed under `"*"`.
    pub fn specs(&self) -> Vec<(&str, &DeviceSpec)> {
        match self {
            Self::Uniform(spec) => vec![("*", spec)],
            Self::PerEntity { entries, fallback } => entries
                .iter()
                .map(|(k, v)| (k.as_str(), v))
                .chain(std::iter::once(("*", fallback)))
                .collect(),
        }
    }
}

fn covers(prefix: &str, name: &str) -> bool {
    prefix.is_empty()
        || name == prefix
        || (name.starts_with(prefix) && name.as_bytes().get(prefix.len()) == Some(&b'.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(s: &str) -> DeviceSpec {
        DeviceSpec::from(s)
    }

    #[test]
    fn test_uniform_resolves_everything() {
        let m = DeviceMap::uniform("cuda:0");
        assert_eq!(m.resolve("anything.at.all"), &spec("cuda:0"));
        assert_eq!(m.uniform_target(), Some(&spec("cuda:0")));
    }

    #[test]
    fn test_prefix_respects_segments() {
        let m = DeviceMap::per_entity("cpu").with_entry("h.0", "cuda:0");
        assert_eq!(m.resolve("h.0.attn.weight"), &spec("cuda:0"));
        assert_eq!(m.resolve("h.0"), &spec("cuda:0"));
        assert_eq!(m.resolve("h.01.weight"), &spec("cpu"));
        assert_eq!(m.resolve("xh.0.weight"), &spec("cpu"));
    }

    #[test]
    fn test_longest_prefix_wins() {
        let m = DeviceMap::per_entity("cpu")
            .with_entry("", "cuda:0")
            .with_entry("h", "cuda:1")
            .with_entry("h.1.mlp", "disk");
        assert_eq!(m.resolve("wte.weight"), &spec("cuda:0"));
        assert_eq!(m.resolve("h.1.attn.bias"), &spec("cuda:1"));
        assert_eq!(m.resolve("h.1.mlp.c_fc.weight"), &spec("disk"));
    }

    #[test]
    fn test_with_entry_on_uniform_keeps_fallback() {
        let m = DeviceMap::uniform("cuda:0").with_entry("lm_head", "cpu");
        assert!(m.uniform_target().is_none());
        assert_eq!(m.resolve("lm_head.weight"), &spec("cpu"));
        assert_eq!(m.resolve("wte.weight"), &spec("cuda:0"));
    }

    #[test]
    fn test_specs_lists_fallback() {
        let m = DeviceMap::per_entity("cpu").with_entry("a", 0usize);
        let keys: Vec<_> = m.specs().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "*"]);
    }
}
