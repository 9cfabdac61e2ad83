// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Arena-style memory pool with budget enforcement.
//!
//! The [`MemoryPool`] is the allocator behind one device. It:
//!
//! 1. Enforces a hard memory ceiling: allocations that would exceed the
//!    budget return `Err(OutOfMemory)`.
//! 2. Keeps a free list of returned buffers, binned by size class.
//! 3. Offers two allocation primitives. [`MemoryPool::allocate`] hands out
//!    zero-filled storage. [`MemoryPool::allocate_uninit`] skips the zeroing
//!    pass, so a recycled buffer keeps whatever bytes it held before.
//! 4. Tracks allocation statistics.
//!
//! # Thread Safety
//! `MemoryPool` is `Send + Sync`; all interior mutability is behind a
//! `Mutex` or an atomic.
//!
//! # Size Classes
//! Returned buffers are binned by size class (the next power of two, at
//! least [`MIN_SIZE_CLASS`]). A request is served from the free list when a
//! buffer of the same class is available.

use crate::{AllocationStats, BufferGuard, MemoryBudget, MemoryError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Minimum size class: 4 KB. Anything smaller is rounded up.
pub const MIN_SIZE_CLASS: usize = 4096;

/// Pool state shared between the pool and its guards.
pub struct PoolInner {
    budget: MemoryBudget,
    /// Live bytes (handed out, not yet returned).
    allocated_bytes: AtomicUsize,
    /// size_class → recycled buffers.
    free_buffers: Mutex<HashMap<usize, Vec<Vec<u8>>>>,
    stats: Mutex<AllocationStats>,
}

impl PoolInner {
    /// Called by `BufferGuard::drop` to return a buffer to the free list.
    pub(crate) fn return_buffer(&self, buffer: Vec<u8>, size_bytes: usize) {
        self.allocated_bytes.fetch_sub(size_bytes, Ordering::Release);

        if let Ok(mut stats) = self.stats.lock() {
            stats.record_release();
        }

        let size_class = size_class_for(size_bytes);
        if let Ok(mut free) = self.free_buffers.lock() {
            free.entry(size_class).or_default().push(buffer);
        }
    }
}

/// The allocator behind a single device.
///
/// # Example
/// ```
/// use memory_manager::{MemoryPool, MemoryBudget};
///
/// let pool = MemoryPool::new(MemoryBudget::from_mb(64));
/// let guard = pool.allocate(1024 * 1024).unwrap();
/// assert_eq!(pool.allocated_bytes(), 1024 * 1024);
///
/// drop(guard);
/// assert_eq!(pool.allocated_bytes(), 0);
/// ```
pub struct MemoryPool {
    inner: Arc<PoolInner>,
}

impl MemoryPool {
    /// Creates a new memory pool with the given budget.
    pub fn new(budget: MemoryBudget) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                budget,
                allocated_bytes: AtomicUsize::new(0),
                free_buffers: Mutex::new(HashMap::new()),
                stats: Mutex::new(AllocationStats::default()),
            }),
        }
    }

    /// Allocates `size_bytes` of zero-filled storage.
    ///
    /// A zero-byte request yields an empty guard without touching the
    /// budget or the statistics.
    pub fn allocate(&self, size_bytes: usize) -> Result<BufferGuard, MemoryError> {
        self.allocate_inner(size_bytes, true)
    }

    /// Allocates `size_bytes` without initializing the contents.
    ///
    /// Recycled buffers are handed out as-is; callers must treat the
    /// contents as unspecified and overwrite them before reading.
    pub fn allocate_uninit(&self, size_bytes: usize) -> Result<BufferGuard, MemoryError> {
        self.allocate_inner(size_bytes, false)
    }

    fn allocate_inner(&self, size_bytes: usize, zeroed: bool) -> Result<BufferGuard, MemoryError> {
        if size_bytes == 0 {
            return Ok(BufferGuard::new(Vec::new(), Arc::clone(&self.inner), 0));
        }

        let current = self.inner.allocated_bytes.load(Ordering::Acquire);
        let budget = self.inner.budget.as_bytes();

        // A Vec cannot hold more than isize::MAX bytes, even on an unlimited pool.
        if size_bytes > isize::MAX as usize || current.saturating_add(size_bytes) > budget {
            if let Ok(mut stats) = self.inner.stats.lock() {
                stats.record_rejection();
            }
            tracing::debug!(
                "pool rejected {} bytes: {} of {} in use",
                size_bytes,
                current,
                self.inner.budget,
            );
            return Err(MemoryError::OutOfMemory {
                requested_bytes: size_bytes,
                available_bytes: budget.saturating_sub(current),
                budget_bytes: budget,
            });
        }

        let recycled = self.take_recycled(size_bytes);
        let is_hit = recycled.is_some();
        let data = match recycled {
            Some(mut buf) => {
                if zeroed {
                    buf[..size_bytes].fill(0);
                }
                buf
            }
            None => vec![0u8; size_bytes],
        };

        self.inner
            .allocated_bytes
            .fetch_add(size_bytes, Ordering::Release);

        if let Ok(mut stats) = self.inner.stats.lock() {
            stats.record_allocation(size_bytes, is_hit, zeroed);
            stats.observe(self.inner.allocated_bytes.load(Ordering::Acquire));
        }

        Ok(BufferGuard::new(data, Arc::clone(&self.inner), size_bytes))
    }

    /// Pops a free-list buffer of the right size class, grown to at least
    /// `size_bytes`.
    fn take_recycled(&self, size_bytes: usize) -> Option<Vec<u8>> {
        let size_class = size_class_for(size_bytes);
        let mut free = self.inner.free_buffers.lock().ok()?;
        let mut buf = free.get_mut(&size_class)?.pop()?;
        if buf.len() < size_bytes {
            buf.resize(size_bytes, 0);
        }
        Some(buf)
    }

    /// Returns `true` if `size_bytes` more could be allocated right now.
    pub fn can_fit(&self, size_bytes: usize) -> bool {
        size_bytes <= self.available_bytes()
    }

    /// Returns the number of bytes currently allocated.
    pub fn allocated_bytes(&self) -> usize {
        self.inner.allocated_bytes.load(Ordering::Acquire)
    }

    /// Returns the number of bytes remaining before hitting the budget.
    pub fn available_bytes(&self) -> usize {
        self.inner
            .budget
            .as_bytes()
            .saturating_sub(self.allocated_bytes())
    }

    /// Returns the memory budget.
    pub fn budget(&self) -> MemoryBudget {
        self.inner.budget
    }

    /// Returns a snapshot of allocation statistics.
    pub fn stats(&self) -> AllocationStats {
        self.inner
            .stats
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}

/// Smallest power of two that is ≥ `size` and ≥ `MIN_SIZE_CLASS`.
fn size_class_for(size: usize) -> usize {
    size.max(MIN_SIZE_CLASS).next_power_of_two()
}

impl std::fmt::Debug for MemoryPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryPool")
            .field("budget", &self.inner.budget)
            .field("allocated_bytes", &self.allocated_bytes())
            .field("available_bytes", &self.available_bytes())
            .finish()
    }
}
