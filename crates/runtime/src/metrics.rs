// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Dispatch reporting.
//!
//! [`DispatchReport`] records what happened to every entity during one
//! dispatch, along with aggregate counts, bytes allocated and wall-clock
//! time.

use std::fmt;
use std::time::Duration;

/// Which walk the dispatcher took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DispatchPath {
    /// Uniform map with no placeholders: capacity checked up front.
    Bulk,
    /// Entity-by-entity resolution against the device map.
    PerEntity,
    /// Per-entity walk installing checkpoint values.
    Checkpoint,
}

impl fmt::Display for DispatchPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bulk => f.write_str("bulk"),
            Self::PerEntity => f.write_str("per-entity"),
            Self::Checkpoint => f.write_str("checkpoint"),
        }
    }
}

/// What happened to one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityAction {
    /// A placeholder received fresh storage.
    Materialized,
    /// Concrete storage was copied to another placement.
    Copied,
    /// An explicit value was written to the target.
    Loaded,
    /// Already on the target.
    Unchanged,
    /// Handed to the offload component.
    Offloaded,
}

impl fmt::Display for EntityAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Materialized => "materialized",
            Self::Copied => "copied",
            Self::Loaded => "loaded",
            Self::Unchanged => "unchanged",
            Self::Offloaded => "offloaded",
        };
        f.write_str(s)
    }
}

/// One entity's record.
#[derive(Debug, Clone, serde::Serialize)]
pub struct EntityRecord {
    pub name: String,
    pub from: String,
    pub to: String,
    pub action: EntityAction,
    /// Bytes newly allocated for this entity.
    pub bytes: usize,
}

/// Outcome of a successful dispatch.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DispatchReport {
    pub path: DispatchPath,
    pub materialized: usize,
    pub copied: usize,
    pub loaded: usize,
    pub unchanged: usize,
    pub offloaded: usize,
    pub bytes_allocated: usize,
    pub duration: Duration,
    pub entities: Vec<EntityRecord>,
}

impl DispatchReport {
    pub fn new(path: DispatchPath) -> Self {
        Self {
            path,
            materialized: 0,
            copied: 0,
            loaded: 0,
            unchanged: 0,
            offloaded: 0,
            bytes_allocated: 0,
            duration: Duration::ZERO,
            entities: Vec::new(),
        }
    }

    /// Records one entity and updates the counters.
    pub fn record(
        &mut self,
        name: &str,
        from: impl fmt::Display,
        to: impl fmt::Display,
        action: EntityAction,
        bytes: usize,
    ) {
        match action {
            EntityAction::Materialized => self.materialized += 1,
            EntityAction::Copied => self.copied += 1,
            EntityAction::Loaded => self.loaded += 1,
            EntityAction::Unchanged => self.unchanged += 1,
            EntityAction::Offloaded => self.offloaded += 1,
        }
        self.bytes_allocated += bytes;
        self.entities.push(EntityRecord {
            name: name.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            action,
            bytes,
        });
    }

    pub fn finalise(&mut self, duration: Duration) {
        self.duration = duration;
    }

    /// Number of entities visited.
    pub fn total(&self) -> usize {
        self.entities.len()
    }

    /// Returns a human-readable summary suitable for CLI output.
    pub fn summary(&self) -> String {
        format!(
            "Dispatch ({}): {} entities in {:.2}ms, {} materialized, {} copied, \
             {} loaded, {} unchanged, {} offloaded, {:.2} MB allocated",
            self.path,
            self.total(),
            self.duration.as_secs_f64() * 1000.0,
            self.materialized,
            self.copied,
            self.loaded,
            self.unchanged,
            self.offloaded,
            self.bytes_allocated as f64 / (1024.0 * 1024.0),
        )
    }
}
