//! Shared backing store and window descriptor
//!
//! A backing store is a single contiguous allocation shared by every buffer
//! that windows into it. It is never resized in place: growing means
//! allocating a new store. The store is freed when the last referencing
//! buffer drops.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{BufferError, Result};

/// Shared ownership handle over a contiguous element array
///
/// Cloning shares the allocation; shallow buffer copies are clones of this
/// handle paired with their own window.
#[derive(Debug)]
pub struct BackingStore<T> {
    cells: Arc<RwLock<Vec<T>>>,
}

impl<T> BackingStore<T> {
    /// Wrap an owned array in a shared store
    pub fn new(cells: Vec<T>) -> Self {
        Self {
            cells: Arc::new(RwLock::new(cells)),
        }
    }

    /// Capacity of the store in elements
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.cells.read().len()
    }

    /// Whether two handles reference the same allocation
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.cells, &other.cells)
    }

    /// Run a closure over the raw cells, read-only
    pub fn with<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        f(&self.cells.read())
    }

    /// Run a closure over the raw cells, mutably
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut [T]) -> R) -> R {
        f(&mut self.cells.write())
    }
}

impl<T> Clone for BackingStore<T> {
    fn clone(&self) -> Self {
        Self {
            cells: Arc::clone(&self.cells),
        }
    }
}

impl<T: Clone> BackingStore<T> {
    /// Copy a window's contents out into an owned array
    #[must_use]
    pub fn snapshot(&self, window: Window) -> Vec<T> {
        self.with(|cells| cells[window.offset()..window.end()].to_vec())
    }
}

/// An (offset, length) sub-range into a backing store
///
/// A window defines a buffer's visible contents without copying. Every index
/// a buffer accepts is relative to its window, never to the raw store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    offset: usize,
    len: usize,
}

impl Window {
    /// Create a window validated against a store capacity
    pub fn new(offset: usize, len: usize, capacity: usize) -> Result<Self> {
        let end = offset
            .checked_add(len)
            .ok_or(BufferError::window(offset, len, capacity))?;
        if end > capacity {
            return Err(BufferError::window(offset, len, capacity));
        }
        Ok(Self { offset, len })
    }

    /// Window covering an entire store
    #[must_use]
    pub fn full(capacity: usize) -> Self {
        Self {
            offset: 0,
            len: capacity,
        }
    }

    /// Store-absolute start of the window
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Number of visible elements
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the window is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Store-absolute end of the window (exclusive)
    #[must_use]
    pub fn end(&self) -> usize {
        self.offset + self.len
    }

    /// Map a window-relative index to a store-absolute one
    pub fn resolve(&self, index: usize) -> Result<usize> {
        if index >= self.len {
            return Err(BufferError::index(index, self.len));
        }
        Ok(self.offset + index)
    }

    /// Narrow to a window-relative sub-range
    pub fn narrow(&self, start: usize, len: usize) -> Result<Self> {
        let end = start.checked_add(len).ok_or(BufferError::RangeOutOfBounds {
            start,
            length: len,
            buffer_length: self.len,
        })?;
        if end > self.len {
            return Err(BufferError::RangeOutOfBounds {
                start,
                length: len,
                buffer_length: self.len,
            });
        }
        Ok(Self {
            offset: self.offset + start,
            len,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_validation() {
        assert!(Window::new(0, 10, 10).is_ok());
        assert!(Window::new(5, 5, 10).is_ok());
        assert!(Window::new(5, 6, 10).is_err());
        assert!(Window::new(11, 0, 10).is_err());
    }

    #[test]
    fn test_window_resolve() {
        let window = Window::new(3, 4, 10).unwrap();
        assert_eq!(window.resolve(0).unwrap(), 3);
        assert_eq!(window.resolve(3).unwrap(), 6);
        assert!(window.resolve(4).is_err());
    }

    #[test]
    fn test_window_narrow() {
        let window = Window::new(2, 6, 10).unwrap();
        let narrowed = window.narrow(1, 3).unwrap();
        assert_eq!(narrowed.offset(), 3);
        assert_eq!(narrowed.len(), 3);
        assert!(window.narrow(4, 3).is_err());
    }

    #[test]
    fn test_store_sharing() {
        let store = BackingStore::new(vec![1, 2, 3]);
        let alias = store.clone();
        alias.with_mut(|cells| cells[0] = 9);
        assert_eq!(store.with(|cells| cells[0]), 9);
        assert!(store.ptr_eq(&alias));
        assert!(!store.ptr_eq(&BackingStore::new(vec![1])));
    }

    #[test]
    fn test_store_snapshot() {
        let store = BackingStore::new(vec![10, 20, 30, 40]);
        let window = Window::new(1, 2, 4).unwrap();
        assert_eq!(store.snapshot(window), vec![20, 30]);
    }
}
