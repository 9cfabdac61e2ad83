// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # memory-manager
//!
//! Budget-enforced buffer pools that stand in for a device allocator.
//! Every concrete device known to the placement runtime owns one
//! [`MemoryPool`]; tensor storage is a [`BufferGuard`] handed out by it.
//!
//! # Key Components
//!
//! - [`MemoryBudget`] — a hard memory ceiling with human-readable parsing
//!   (`"512M"`, `"1G"`, etc.).
//! - [`MemoryPool`] — the allocator: enforces the budget, keeps a free list
//!   binned by size class, and exposes two primitives:
//!   [`allocate`](MemoryPool::allocate) (zero-filled) and
//!   [`allocate_uninit`](MemoryPool::allocate_uninit) (contents unspecified,
//!   skips the zeroing pass).
//! - [`BufferGuard`] — an RAII wrapper around allocated storage. Dropping the
//!   guard returns the buffer to its pool.
//! - [`AllocationStats`] — cumulative allocator metrics.
//!
//! # Ownership Model
//!
//! ```text
//! MemoryPool::allocate(size)
//!       │
//!       ▼
//!   BufferGuard  ◄─── owns Vec<u8>, holds Arc<PoolInner>
//!       │
//!       │  drop()
//!       ▼
//!   PoolInner::return_buffer()  ──► free list
//! ```
//!
//! # Example
//! ```
//! use memory_manager::{MemoryPool, MemoryBudget};
//!
//! let pool = MemoryPool::new(MemoryBudget::from_mb(64));
//!
//! let a = pool.allocate(1024 * 1024).unwrap();
//! let b = pool.allocate_uninit(512 * 1024).unwrap();
//! assert_eq!(pool.allocated_bytes(), 1024 * 1024 + 512 * 1024);
//!
//! drop(a);
//! assert_eq!(pool.allocated_bytes(), 512 * 1024);
//! # drop(b);
//! ```

mod budget;
mod error;
mod guard;
pub mod pool;
mod stats;

pub use budget::MemoryBudget;
pub use error::MemoryError;
pub use guard::BufferGuard;
pub use pool::MemoryPool;
pub use stats::AllocationStats;
