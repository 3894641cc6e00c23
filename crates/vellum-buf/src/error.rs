//! Error types for host buffer operations

use crate::element::Dtype;

/// Result type for buffer operations
pub type Result<T> = std::result::Result<T, BufferError>;

/// Host buffer errors
///
/// All variants are configuration errors in the sense of the layer's error
/// taxonomy: they are surfaced immediately to the caller and never retried.
#[derive(Debug, thiserror::Error)]
pub enum BufferError {
    /// Window placement exceeds the backing store capacity
    #[error("window out of bounds: offset {offset} + length {length} exceeds capacity {capacity}")]
    WindowOutOfBounds {
        /// Requested window offset
        offset: usize,
        /// Requested window length
        length: usize,
        /// Backing store capacity
        capacity: usize,
    },

    /// Window-relative index exceeds the window length
    #[error("index {index} out of bounds for buffer of length {length}")]
    IndexOutOfBounds {
        /// Offending index
        index: usize,
        /// Window length
        length: usize,
    },

    /// Bulk range exceeds the window
    #[error("range at {start} of length {length} out of bounds for buffer of length {buffer_length}")]
    RangeOutOfBounds {
        /// Range start (window-relative)
        start: usize,
        /// Range length
        length: usize,
        /// Window length
        buffer_length: usize,
    },

    /// Source slice length does not match the destination range
    #[error("length mismatch: source has {source_len} elements, destination range has {destination}")]
    LengthMismatch {
        /// Source element count
        source_len: usize,
        /// Destination element count
        destination: usize,
    },

    /// Element type conversion is not representable
    #[error("cannot convert {value} from {from} to {to}: not representable")]
    Unrepresentable {
        /// Offending value (as f64)
        value: f64,
        /// Source dtype
        from: Dtype,
        /// Target dtype
        to: Dtype,
    },
}

impl BufferError {
    /// Create an index error
    #[inline]
    pub fn index(index: usize, length: usize) -> Self {
        Self::IndexOutOfBounds { index, length }
    }

    /// Create a window error
    #[inline]
    pub fn window(offset: usize, length: usize, capacity: usize) -> Self {
        Self::WindowOutOfBounds {
            offset,
            length,
            capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_error_display() {
        let err = BufferError::window(8, 16, 20);
        let msg = err.to_string();
        assert!(msg.contains('8'));
        assert!(msg.contains("16"));
        assert!(msg.contains("20"));
    }

    #[test]
    fn test_index_error_display() {
        let err = BufferError::index(5, 3);
        assert!(err.to_string().contains("index 5"));
        assert!(err.to_string().contains("length 3"));
    }

    #[test]
    fn test_unrepresentable_error_display() {
        let err = BufferError::Unrepresentable {
            value: f64::NAN,
            from: Dtype::F64,
            to: Dtype::I32,
        };
        let msg = err.to_string();
        assert!(msg.contains("float64"));
        assert!(msg.contains("int32"));
    }
}
