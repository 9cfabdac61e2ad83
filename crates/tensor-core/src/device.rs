// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Device identities and their canonical form.
//!
//! Device maps and callers name devices in several ways: a bare ordinal
//! (`0`), a string (`"cuda:0"`, `"cuda"`, `"cpu"`, `"meta"`, `"disk"`), or a
//! [`Placement`] that is already canonical. [`DeviceSpec::canonicalize`] is
//! the single function that turns any of these into a [`Destination`];
//! everything past that boundary compares canonical values only.
//!
//! ```text
//! 0 ─────────┐
//! "cuda:0" ──┼──► canonicalize(ordinal_kind = cuda) ──► Tensor(Concrete cuda:0)
//! cuda:0 ────┘
//! "meta" ───────► Tensor(Meta)
//! "disk" ───────► Disk
//! ```

use crate::{Destination, Placement, TensorError};
use std::fmt;

/// A concrete device family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Cpu,
    Cuda,
    Mps,
    Npu,
    Xpu,
    Mlu,
    Musa,
    Sdaa,
}

impl DeviceKind {
    /// Parses a family name (case-insensitive).
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "cpu" => Some(Self::Cpu),
            "cuda" => Some(Self::Cuda),
            "mps" => Some(Self::Mps),
            "npu" => Some(Self::Npu),
            "xpu" => Some(Self::Xpu),
            "mlu" => Some(Self::Mlu),
            "musa" => Some(Self::Musa),
            "sdaa" => Some(Self::Sdaa),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Cuda => "cuda",
            Self::Mps => "mps",
            Self::Npu => "npu",
            Self::Xpu => "xpu",
            Self::Mlu => "mlu",
            Self::Musa => "musa",
            Self::Sdaa => "sdaa",
        }
    }

    /// Host and Apple-silicon devices have exactly one instance.
    pub fn is_singleton(self) -> bool {
        matches!(self, Self::Cpu | Self::Mps)
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A canonical concrete device: family plus ordinal.
///
/// Singleton families (`cpu`, `mps`) always carry ordinal 0 and display
/// without it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceId {
    kind: DeviceKind,
    index: usize,
}

impl DeviceId {
    /// Returns `None` for a non-zero ordinal on a singleton family.
    pub fn new(kind: DeviceKind, index: usize) -> Option<Self> {
        if kind.is_singleton() && index != 0 {
            return None;
        }
        Some(Self { kind, index })
    }

    pub fn cpu() -> Self {
        Self {
            kind: DeviceKind::Cpu,
            index: 0,
        }
    }

    pub fn cuda(index: usize) -> Self {
        Self {
            kind: DeviceKind::Cuda,
            index,
        }
    }

    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Parses `"<kind>"` or `"<kind>:<ordinal>"`. A bare kind means ordinal 0.
    pub fn parse(token: &str) -> Result<Self, TensorError> {
        let unknown = |reason: &str| TensorError::UnknownDevice {
            token: token.to_string(),
            reason: reason.to_string(),
        };

        let normalized = token.trim().to_lowercase();
        let (kind_str, index_str) = match normalized.split_once(':') {
            Some((k, i)) => (k, Some(i)),
            None => (normalized.as_str(), None),
        };

        let kind = DeviceKind::from_str_loose(kind_str)
            .ok_or_else(|| unknown("unrecognised device family"))?;
        let index = match index_str {
            Some(i) => i
                .trim()
                .parse::<usize>()
                .map_err(|_| unknown("device ordinal is not a non-negative integer"))?,
            None => 0,
        };

        Self::new(kind, index).ok_or_else(|| unknown("device family has a single instance"))
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind.is_singleton() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}:{}", self.kind, self.index)
        }
    }
}

impl TryFrom<String> for DeviceId {
    type Error = TensorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DeviceId> for String {
    fn from(id: DeviceId) -> Self {
        id.to_string()
    }
}

/// Any accepted surface form of a device identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSpec {
    /// A bare ordinal, resolved against the configured ordinal family.
    Ordinal(usize),
    /// A device string such as `"cuda:1"`, `"cpu"`, `"meta"` or `"disk"`.
    Name(String),
    /// An already-canonical placement.
    Canonical(Placement),
}

impl DeviceSpec {
    /// Resolves this spec to a canonical [`Destination`].
    ///
    /// `ordinal_kind` is the family that bare ordinals refer to (typically
    /// `cuda`). Unrecognised tokens are an error; nothing is coerced to a
    /// default device.
    pub fn canonicalize(&self, ordinal_kind: DeviceKind) -> Result<Destination, TensorError> {
        match self {
            Self::Ordinal(index) => ordinal(*index, ordinal_kind, &index.to_string()),
            Self::Canonical(placement) => Ok(Destination::Tensor(placement.clone())),
            Self::Name(token) => {
                let normalized = token.trim().to_lowercase();
                match normalized.as_str() {
                    "meta" => Ok(Destination::Tensor(Placement::Meta)),
                    "disk" => Ok(Destination::Disk),
                    digits if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) => {
                        let index = digits.parse::<usize>().map_err(|_| TensorError::UnknownDevice {
                            token: token.clone(),
                            reason: "device ordinal out of range".into(),
                        })?;
                        ordinal(index, ordinal_kind, token)
                    }
                    _ => Ok(Destination::Tensor(Placement::concrete(DeviceId::parse(token)?))),
                }
            }
        }
    }
}

fn ordinal(index: usize, kind: DeviceKind, token: &str) -> Result<Destination, TensorError> {
    DeviceId::new(kind, index)
        .map(|id| Destination::Tensor(Placement::concrete(id)))
        .ok_or_else(|| TensorError::UnknownDevice {
            token: token.to_string(),
            reason: format!("ordinal {index} is not valid for device family {kind}"),
        })
}

impl fmt::Display for DeviceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ordinal(i) => write!(f, "{i}"),
            Self::Name(s) => f.write_str(s),
            Self::Canonical(p) => write!(f, "{p}"),
        }
    }
}

impl From<usize> for DeviceSpec {
    fn from(index: usize) -> Self {
        Self::Ordinal(index)
    }
}

impl From<&str> for DeviceSpec {
    fn from(token: &str) -> Self {
        Self::Name(token.to_string())
    }
}

impl From<String> for DeviceSpec {
    fn from(token: String) -> Self {
        Self::Name(token)
    }
}

impl From<DeviceId> for DeviceSpec {
    fn from(id: DeviceId) -> Self {
        Self::Canonical(Placement::concrete(id))
    }
}

impl From<Placement> for DeviceSpec {
    fn from(placement: Placement) -> Self {
        Self::Canonical(placement)
    }
}

// Serialized as an integer or a string; unpinned canonical placements are
// written in their display form, which parses back to the same destination.
// A pinned placement has no string form and is written as the tagged
// placement itself.
impl serde::Serialize for DeviceSpec {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Ordinal(i) => serializer.serialize_u64(*i as u64),
            Self::Name(s) => serializer.serialize_str(s),
            Self::Canonical(Placement::Meta) => serializer.serialize_str("meta"),
            Self::Canonical(Placement::Concrete {
                device,
                pinned: false,
            }) => serializer.serialize_str(&device.to_string()),
            Self::Canonical(placement) => serde::Serialize::serialize(placement, serializer),
        }
    }
}

impl<'de> serde::Deserialize<'de> for DeviceSpec {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(serde::Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Ordinal(usize),
            Name(String),
            Canonical(Placement),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Ordinal(i) => Self::Ordinal(i),
            Raw::Name(s) => Self::Name(s),
            Raw::Canonical(p) => Self::Canonical(p),
        })
    }
}
