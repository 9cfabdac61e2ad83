// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! RAII storage guard that returns memory to its pool on drop.
//!
//! A [`BufferGuard`] is the backing storage of a materialized tensor. When
//! the tensor handle owning it is superseded or dropped, the guard returns
//! the buffer to the free list of the pool it came from and decrements that
//! pool's allocated-bytes counter.

use crate::pool::PoolInner;
use std::sync::Arc;

/// Storage handed out by a [`MemoryPool`](crate::MemoryPool).
///
/// Zero-length guards are valid (tensors with a zero-sized dimension) and
/// never touch the pool's accounting.
pub struct BufferGuard {
    /// Wrapped in `Option` so `drop()` can move the buffer out.
    data: Option<Vec<u8>>,
    pool: Arc<PoolInner>,
    size_bytes: usize,
}

impl BufferGuard {
    pub(crate) fn new(data: Vec<u8>, pool: Arc<PoolInner>, size_bytes: usize) -> Self {
        Self {
            data: Some(data),
            pool,
            size_bytes,
        }
    }

    /// Returns an immutable view of the buffer (exactly `size_bytes` long).
    pub fn as_slice(&self) -> &[u8] {
        match &self.data {
            Some(data) => &data[..self.size_bytes],
            None => &[],
        }
    }

    /// Returns a mutable view of the buffer (exactly `size_bytes` long).
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        let size = self.size_bytes;
        match &mut self.data {
            Some(data) => &mut data[..size],
            None => &mut [],
        }
    }

    /// Returns the size of this allocation in bytes.
    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }
}

impl Drop for BufferGuard {
    fn drop(&mut self) {
        if let Some(buffer) = self.data.take() {
            if self.size_bytes > 0 {
                self.pool.return_buffer(buffer, self.size_bytes);
            }
        }
    }
}

impl std::fmt::Debug for BufferGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferGuard")
            .field("size_bytes", &self.size_bytes)
            .field("has_data", &self.data.is_some())
            .finish()
    }
}
