//! # vellum-buf: typed, windowed host buffers
//!
//! Host-resident numeric buffers for the vellum runtime:
//! - **Shared backing stores**: one contiguous allocation, reference-counted
//!   across every view that windows into it
//! - **Zero-copy views**: slicing and shallow copies never duplicate data
//! - **Window-relative addressing**: all indices validate against the view,
//!   never the raw store
//! - **Closed element-type set**: fixed-width floats and integers with
//!   explicit, checked cross-type conversion
//!
//! Device residency is layered on top by `vellum-dual`; this crate knows
//! nothing about accelerators.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod element;
pub mod error;
pub mod host;
pub mod store;

pub use element::{Dtype, Element, convert_slice};
pub use error::{BufferError, Result};
pub use host::HostBuffer;
pub use store::{BackingStore, Window};
