// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Per-device allocation counters.
//!
//! Every [`MemoryPool`](crate::MemoryPool) keeps one [`AllocationStats`].
//! The placement runtime reads them to report how much storage a dispatch
//! created on each device and how often materialization skipped zeroing.

/// Counters for one device pool.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct AllocationStats {
    /// Successful allocations.
    pub allocations: u64,
    /// Allocations served by a recycled buffer.
    pub reused: u64,
    /// Allocations that needed a new buffer.
    pub fresh: u64,
    /// Allocations handed out without a zeroing pass.
    pub uninitialized: u64,
    /// Requests refused because the budget was exhausted.
    pub rejected: u64,
    /// Buffers returned to the pool.
    pub releases: u64,
    /// High-water mark of live bytes.
    pub peak_bytes: usize,
    /// Sum of all successful request sizes.
    pub bytes_served: u64,
}

impl AllocationStats {
    pub(crate) fn record_allocation(&mut self, size: usize, reused: bool, zeroed: bool) {
        self.allocations += 1;
        self.bytes_served += size as u64;
        if reused {
            self.reused += 1;
        } else {
            self.fresh += 1;
        }
        if !zeroed {
            self.uninitialized += 1;
        }
    }

    pub(crate) fn record_rejection(&mut self) {
        self.rejected += 1;
    }

    pub(crate) fn record_release(&mut self) {
        self.releases += 1;
    }

    /// Raises the high-water mark to `live_bytes` if it is higher.
    pub(crate) fn observe(&mut self, live_bytes: usize) {
        self.peak_bytes = self.peak_bytes.max(live_bytes);
    }

    /// Allocations currently outstanding.
    pub fn live(&self) -> u64 {
        self.allocations.saturating_sub(self.releases)
    }

    /// One-line summary for CLI output.
    pub fn summary(&self) -> String {
        format!(
            "{} allocations ({} reused, {} uninitialized), {} live, {} rejected, peak {:.2} MB",
            self.allocations,
            self.reused,
            self.uninitialized,
            self.live(),
            self.rejected,
            self.peak_bytes as f64 / (1024.0 * 1024.0),
        )
    }
}
