//! # vellum-dual: dual-residency numeric buffers
//!
//! The buffer layer tensor code allocates through when accelerator
//! execution is in play:
//! - **Lazy device mirrors**: device memory is allocated on first device
//!   access, sized to the buffer's window, never at construction
//! - **Flagged synchronization**: two modification flags track the
//!   authoritative residency; every access hook synchronizes the stale side
//!   at most once per dirty transition
//! - **Strided extraction**: dense sub-matrix gather out of a row-major
//!   matrix view, residency-preserving
//! - **Persistence**: device handles are omitted from the serialized form
//!   and re-acquired from the backend registry by tag on reload
//!
//! Buffers are single-writer-timeline objects: partition work across
//! distinct buffers (via [`MirroredBuffer::slice`]) rather than sharing one
//! buffer across threads.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod mirror;

pub use error::{MirrorError, Result, SyncDirection};
pub use mirror::MirroredBuffer;
