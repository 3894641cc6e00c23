//! Backend and device identifiers
//!
//! Tags are the serialization-surviving half of backend identity: a live
//! capability handle is never persisted, only the tag it was registered
//! under, and a handle is re-acquired from the registry by tag on reload.

use serde::{Deserialize, Serialize};

/// Opaque identifier for a backend instance and its element type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BackendTag(u64);

impl BackendTag {
    /// Create from a raw value
    #[must_use]
    pub fn from_raw(tag: u64) -> Self {
        Self(tag)
    }

    /// Get the raw value
    #[must_use]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for BackendTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "backend:{:04x}", self.0)
    }
}

/// Ordinal of the device a backend drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(u32);

impl DeviceId {
    /// Create from a raw ordinal
    #[must_use]
    pub fn from_raw(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw ordinal
    #[must_use]
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "device:{}", self.0)
    }
}
