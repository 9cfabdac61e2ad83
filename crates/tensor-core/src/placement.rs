// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Where a tensor's storage lives.

use crate::DeviceId;
use std::fmt;

/// The placement of a tensor.
///
/// `Meta` tensors are placeholders: they carry a shape and dtype but no
/// storage. `Concrete` tensors own storage on `device`. Placements compare
/// by canonical value, so two placements are equal exactly when they name
/// the same device with the same pinning.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    Meta,
    Concrete {
        device: DeviceId,
        /// Page-locked host memory or a fixed device address. Carried
        /// through relocation untouched.
        #[serde(default)]
        pinned: bool,
    },
}

impl Placement {
    /// An unpinned concrete placement on `device`.
    pub fn concrete(device: DeviceId) -> Self {
        Self::Concrete {
            device,
            pinned: false,
        }
    }

    pub fn is_meta(&self) -> bool {
        matches!(self, Self::Meta)
    }

    /// Returns the device for concrete placements.
    pub fn device(&self) -> Option<DeviceId> {
        match self {
            Self::Meta => None,
            Self::Concrete { device, .. } => Some(*device),
        }
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Meta => f.write_str("meta"),
            Self::Concrete {
                device,
                pinned: false,
            } => write!(f, "{device}"),
            Self::Concrete {
                device,
                pinned: true,
            } => write!(f, "{device} (pinned)"),
        }
    }
}

/// The canonical outcome of resolving a device spec.
///
/// `Disk` is not a tensor placement: disk-targeted entities are handed to an
/// offload component and never relocated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Destination {
    Tensor(Placement),
    Disk,
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tensor(p) => write!(f, "{p}"),
            Self::Disk => f.write_str("disk"),
        }
    }
}
