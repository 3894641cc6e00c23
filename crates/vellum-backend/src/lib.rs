//! # vellum-backend: backend capability handles and registry
//!
//! The seam between host buffers and device memory:
//! - **Capability handles**: a [`BackendHandle`] owns one element type on
//!   one device and performs allocation, host↔device copies, and
//!   device-to-device peer copies
//! - **Opaque allocations**: [`DeviceBuffer`] handles share their allocation
//!   on clone and release it exactly once, when the last clone drops
//! - **Tag registry**: a process-wide map from [`BackendTag`] to live
//!   handles, letting deserialized buffers re-acquire a capability from the
//!   identifier that survived persistence
//! - **Emulated backend**: a reference implementation backed by a private
//!   host-side memory space, with transfer counters for tests
//!
//! Handles are injected into buffers at construction; the registry is only
//! consulted at startup and on post-deserialization rebinding.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod emulated;
pub mod error;
pub mod handle;
pub mod registry;
pub mod tag;

pub use emulated::{BackendStats, BackendStatsSnapshot, EmulatedBackend};
pub use error::{BackendError, Result};
pub use handle::{BackendHandle, DeviceBuffer};
pub use registry::{is_registered, lookup_backend, register_backend};
pub use tag::{BackendTag, DeviceId};
