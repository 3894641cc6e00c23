//! Error types for backend and device memory operations

use vellum_buf::Dtype;

use crate::tag::{BackendTag, DeviceId};

/// Result type for backend operations
pub type Result<T> = std::result::Result<T, BackendError>;

/// Backend and device memory errors
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// No backend registered under the tag
    #[error("no backend registered for tag {tag}")]
    UnknownTag {
        /// The unregistered tag
        tag: BackendTag,
    },

    /// Backend registered under the tag serves a different element type
    #[error("backend {tag} serves {registered} elements, requested {requested}")]
    ElementMismatch {
        /// The looked-up tag
        tag: BackendTag,
        /// Dtype the backend was registered with
        registered: Dtype,
        /// Dtype the caller requested
        requested: Dtype,
    },

    /// Device buffer handle belongs to a different backend or device
    #[error("device buffer {buffer_id} does not belong to device {device}")]
    ForeignBuffer {
        /// Id of the offending buffer
        buffer_id: u64,
        /// Device that rejected it
        device: DeviceId,
    },

    /// Host/device copy size does not match the device allocation
    #[error("copy of {requested} elements does not fit device allocation of {capacity}")]
    CopyOutOfBounds {
        /// Elements requested to copy
        requested: usize,
        /// Allocation capacity in elements
        capacity: usize,
    },

    /// Device allocation failed
    #[error("device allocation of {len} elements failed on {device}: {reason}")]
    AllocationFailed {
        /// Requested length in elements
        len: usize,
        /// Target device
        device: DeviceId,
        /// Backend-specific reason
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_tag_display() {
        let err = BackendError::UnknownTag {
            tag: BackendTag::from_raw(7),
        };
        assert!(err.to_string().contains("backend:0007"));
    }

    #[test]
    fn test_element_mismatch_display() {
        let err = BackendError::ElementMismatch {
            tag: BackendTag::from_raw(1),
            registered: Dtype::F32,
            requested: Dtype::F64,
        };
        let msg = err.to_string();
        assert!(msg.contains("float32"));
        assert!(msg.contains("float64"));
    }

    #[test]
    fn test_copy_out_of_bounds_display() {
        let err = BackendError::CopyOutOfBounds {
            requested: 10,
            capacity: 4,
        };
        assert!(err.to_string().contains("10"));
        assert!(err.to_string().contains('4'));
    }
}
