//! Error types for dual-residency buffers

use vellum_backend::{BackendError, BackendTag, DeviceId};
use vellum_buf::BufferError;

/// Result type for mirrored buffer operations
pub type Result<T> = std::result::Result<T, MirrorError>;

/// Direction of a host/device synchronization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDirection {
    /// Host copy into device memory
    HostToDevice,
    /// Device memory into host copy
    DeviceToHost,
}

impl std::fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HostToDevice => f.write_str("host to device"),
            Self::DeviceToHost => f.write_str("device to host"),
        }
    }
}

/// Dual-residency buffer errors
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    /// Both residencies are marked modified at once
    ///
    /// Two divergent, un-reconciled versions of the same logical data
    /// exist. This is a logic defect, not a transient fault: no correct
    /// reconciliation is possible without knowing which side is
    /// authoritative, so the error propagates instead of picking a side.
    #[error("cannot synchronise {direction}: both host and device copies are marked modified")]
    SyncConflict {
        /// Synchronization that detected the conflict
        direction: SyncDirection,
    },

    /// Device operation requested with no live backend bound
    ///
    /// Happens after deserialization until a backend is re-bound from the
    /// registry for the persisted tag.
    #[error("no backend bound for {tag}; rebind a live backend before device access")]
    ContextUnavailable {
        /// Tag the buffer was created under
        tag: BackendTag,
    },

    /// Rebound backend drives a different device than the persisted one
    #[error("backend {tag} drives {actual}, but this buffer was persisted on {persisted}")]
    DeviceMismatch {
        /// Tag the buffer was created under
        tag: BackendTag,
        /// Device recorded at serialization time
        persisted: DeviceId,
        /// Device of the handle found in the registry
        actual: DeviceId,
    },

    /// Row/column ranges do not describe a sub-matrix of this buffer
    #[error(
        "stacked range rows {row_start}..={row_finish} cols {col_start}..={col_finish} \
         invalid for a {total_rows}x{total_cols} matrix over {buffer_len} elements"
    )]
    InvalidStackedRange {
        /// Declared matrix rows
        total_rows: usize,
        /// Declared matrix columns
        total_cols: usize,
        /// First row to extract
        row_start: usize,
        /// Last row to extract (inclusive)
        row_finish: usize,
        /// First column to extract
        col_start: usize,
        /// Last column to extract (inclusive)
        col_finish: usize,
        /// Window length of the source buffer
        buffer_len: usize,
    },

    /// Host buffer error
    #[error(transparent)]
    Buffer(#[from] BufferError),

    /// Backend or device memory error
    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_conflict_display() {
        let err = MirrorError::SyncConflict {
            direction: SyncDirection::DeviceToHost,
        };
        assert!(err.to_string().contains("device to host"));
        assert!(err.to_string().contains("both"));
    }

    #[test]
    fn test_context_unavailable_display() {
        let err = MirrorError::ContextUnavailable {
            tag: BackendTag::from_raw(5),
        };
        assert!(err.to_string().contains("backend:0005"));
    }

    #[test]
    fn test_buffer_error_passes_through() {
        let err: MirrorError = BufferError::index(3, 2).into();
        assert!(err.to_string().contains("index 3"));
    }
}
