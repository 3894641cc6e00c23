//! Host-resident buffer: a typed window over a shared backing store

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::element::{Dtype, Element, convert_slice};
use crate::error::{BufferError, Result};
use crate::store::{BackingStore, Window};

/// A typed, windowed, host-resident buffer
///
/// A `HostBuffer` is a view: the backing store is shared by every buffer
/// windowing into it, and all index arguments are window-relative. Cloning
/// produces a shallow copy (same store, same window), so writes through one
/// clone are observed by the others; [`HostBuffer::deep_copy`] breaks the
/// aliasing.
#[derive(Debug)]
pub struct HostBuffer<T: Element> {
    store: BackingStore<T>,
    window: Window,
}

impl<T: Element> HostBuffer<T> {
    /// Build a buffer owning the supplied data, windowing all of it
    pub fn from_vec(data: Vec<T>) -> Self {
        let window = Window::full(data.len());
        Self {
            store: BackingStore::new(data),
            window,
        }
    }

    /// Build a buffer owning the supplied data, windowing a sub-range of it
    ///
    /// Fails if `offset + len` exceeds the data length.
    pub fn from_vec_windowed(data: Vec<T>, offset: usize, len: usize) -> Result<Self> {
        let window = Window::new(offset, len, data.len())?;
        Ok(Self {
            store: BackingStore::new(data),
            window,
        })
    }

    /// Freshly allocated buffer of `len` zeroed elements
    pub fn zeroed(len: usize) -> Self {
        debug!(len, dtype = %T::DTYPE, "allocating zeroed host buffer");
        Self::from_vec(vec![T::zero(); len])
    }

    /// Element dtype of this buffer
    #[must_use]
    pub fn dtype(&self) -> Dtype {
        T::DTYPE
    }

    /// Number of visible elements
    #[must_use]
    pub fn len(&self) -> usize {
        self.window.len()
    }

    /// Whether the window is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Store-absolute offset of the window
    #[must_use]
    pub fn offset(&self) -> usize {
        self.window.offset()
    }

    /// Whether two buffers share the same backing store
    #[must_use]
    pub fn aliases(&self, other: &Self) -> bool {
        self.store.ptr_eq(&other.store)
    }

    /// Read one element at a window-relative index
    pub fn get(&self, index: usize) -> Result<T> {
        let absolute = self.window.resolve(index)?;
        Ok(self.store.with(|cells| cells[absolute]))
    }

    /// Write one element at a window-relative index
    pub fn set(&self, index: usize, value: T) -> Result<()> {
        let absolute = self.window.resolve(index)?;
        self.store.with_mut(|cells| cells[absolute] = value);
        Ok(())
    }

    /// Copy a window-relative sub-range out into an owned array
    pub fn get_range(&self, start: usize, len: usize) -> Result<Vec<T>> {
        let range = self.window.narrow(start, len)?;
        Ok(self.store.snapshot(range))
    }

    /// Overwrite a window-relative sub-range from a slice
    ///
    /// The slice length fixes the range length; the range must fit the
    /// window.
    pub fn set_range(&self, start: usize, values: &[T]) -> Result<()> {
        let range = self.window.narrow(start, values.len())?;
        self.store.with_mut(|cells| {
            cells[range.offset()..range.end()].copy_from_slice(values);
        });
        Ok(())
    }

    /// Copy the full window contents out into an owned array
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.store.snapshot(self.window)
    }

    /// Run a closure over the window contents without copying
    pub fn with_slice<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        let window = self.window;
        self.store
            .with(|cells| f(&cells[window.offset()..window.end()]))
    }

    /// Run a closure over the window contents, mutably, without copying
    pub fn with_slice_mut<R>(&self, f: impl FnOnce(&mut [T]) -> R) -> R {
        let window = self.window;
        self.store
            .with_mut(|cells| f(&mut cells[window.offset()..window.end()]))
    }

    /// O(1) shallow view narrowed to a window-relative sub-range
    ///
    /// The returned buffer shares this buffer's store; no data is copied.
    pub fn slice(&self, start: usize, len: usize) -> Result<Self> {
        let window = self.window.narrow(start, len)?;
        Ok(Self {
            store: self.store.clone(),
            window,
        })
    }

    /// New view sharing the store and the full current window
    #[must_use]
    pub fn shallow_copy(&self) -> Self {
        self.clone()
    }

    /// Independent buffer holding a copy of the window contents
    ///
    /// The copy's window starts at offset 0 of its own fresh store.
    #[must_use]
    pub fn deep_copy(&self) -> Self {
        Self::from_vec(self.to_vec())
    }

    /// Convert a window-relative sub-range into a buffer of another kind
    ///
    /// Element widths may differ, so the result never aliases this buffer:
    /// a new store is always materialized. The conversion is value-checked
    /// per [`convert_slice`].
    pub fn reinterpret_as<U: Element>(&self, start: usize, len: usize) -> Result<HostBuffer<U>> {
        let range = self.window.narrow(start, len)?;
        debug!(
            from = %T::DTYPE,
            to = %U::DTYPE,
            len,
            "converting host buffer sub-range"
        );
        let converted: Vec<U> = self
            .store
            .with(|cells| convert_slice(&cells[range.offset()..range.end()]))?;
        Ok(HostBuffer::from_vec(converted))
    }

    /// Overwrite the full window from another buffer's window
    ///
    /// Fails with a length mismatch if the windows differ in size.
    pub fn copy_from(&self, other: &Self) -> Result<()> {
        if other.len() != self.len() {
            return Err(BufferError::LengthMismatch {
                source_len: other.len(),
                destination: self.len(),
            });
        }
        self.set_range(0, &other.to_vec())
    }
}

impl<T: Element> Clone for HostBuffer<T> {
    /// Shallow copy: shares the backing store
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            window: self.window,
        }
    }
}

impl<T: Element> PartialEq for HostBuffer<T> {
    /// Window-contents equality, not aliasing equality
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.to_vec() == other.to_vec()
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename = "HostBuffer")]
struct HostBufferRepr<T> {
    data: Vec<T>,
}

impl<T: Element> Serialize for HostBuffer<T> {
    /// Persists only the window contents; views are compacted on the way out
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        HostBufferRepr { data: self.to_vec() }.serialize(serializer)
    }
}

impl<'de, T: Element> Deserialize<'de> for HostBuffer<T> {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let repr = HostBufferRepr::<T>::deserialize(deserializer)?;
        Ok(Self::from_vec(repr.data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> HostBuffer<f64> {
        HostBuffer::from_vec(vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0])
    }

    #[test]
    fn test_windowed_construction() {
        let buf = HostBuffer::from_vec_windowed(vec![1, 2, 3, 4], 1, 2).unwrap();
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.offset(), 1);
        assert_eq!(buf.to_vec(), vec![2, 3]);
    }

    #[test]
    fn test_windowed_construction_rejects_overflow() {
        let result = HostBuffer::from_vec_windowed(vec![1, 2, 3, 4], 3, 2);
        assert!(matches!(
            result,
            Err(BufferError::WindowOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_zeroed() {
        let buf: HostBuffer<i32> = HostBuffer::zeroed(5);
        assert_eq!(buf.to_vec(), vec![0; 5]);
    }

    #[test]
    fn test_get_set_window_relative() {
        let buf = sample().slice(2, 3).unwrap();
        assert_eq!(buf.get(0).unwrap(), 2.0);
        buf.set(1, 99.0).unwrap();
        assert_eq!(buf.get(1).unwrap(), 99.0);
        assert!(buf.get(3).is_err());
        assert!(buf.set(3, 0.0).is_err());
    }

    #[test]
    fn test_slice_matches_parent() {
        let parent = sample();
        let child = parent.slice(1, 4).unwrap();
        for k in 0..child.len() {
            assert_eq!(child.get(k).unwrap(), parent.get(1 + k).unwrap());
        }
        assert!(parent.slice(4, 3).is_err());
    }

    #[test]
    fn test_shallow_copy_aliases() {
        let buf = sample();
        let view = buf.shallow_copy();
        buf.set(2, -7.0).unwrap();
        assert_eq!(view.get(2).unwrap(), -7.0);
        assert!(buf.aliases(&view));
    }

    #[test]
    fn test_deep_copy_does_not_alias() {
        let buf = sample();
        let copy = buf.deep_copy();
        buf.set(0, 42.0).unwrap();
        assert_eq!(copy.get(0).unwrap(), 0.0);
        assert!(!buf.aliases(&copy));
        assert_eq!(copy.offset(), 0);
    }

    #[test]
    fn test_deep_copy_of_slice_compacts() {
        let buf = sample();
        let copy = buf.slice(3, 2).unwrap().deep_copy();
        assert_eq!(copy.to_vec(), vec![3.0, 4.0]);
        assert_eq!(copy.offset(), 0);
    }

    #[test]
    fn test_bulk_range_access() {
        let buf = sample();
        assert_eq!(buf.get_range(1, 3).unwrap(), vec![1.0, 2.0, 3.0]);
        buf.set_range(4, &[40.0, 50.0]).unwrap();
        assert_eq!(buf.get(5).unwrap(), 50.0);
        assert!(buf.get_range(4, 3).is_err());
        assert!(buf.set_range(5, &[0.0, 0.0]).is_err());
    }

    #[test]
    fn test_reinterpret_materializes_new_store() {
        let buf = sample();
        let ints = buf.reinterpret_as::<i32>(1, 3).unwrap();
        assert_eq!(ints.to_vec(), vec![1, 2, 3]);
        // the converted buffer must not observe later writes to the source
        buf.set(1, 100.0).unwrap();
        assert_eq!(ints.get(0).unwrap(), 1);
    }

    #[test]
    fn test_copy_from_length_check() {
        let dst: HostBuffer<f64> = HostBuffer::zeroed(3);
        let src = HostBuffer::from_vec(vec![7.0, 8.0, 9.0]);
        dst.copy_from(&src).unwrap();
        assert_eq!(dst.to_vec(), vec![7.0, 8.0, 9.0]);

        let short = HostBuffer::from_vec(vec![1.0]);
        assert!(matches!(
            dst.copy_from(&short),
            Err(BufferError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_serde_compacts_view() {
        let buf = sample().slice(1, 3).unwrap();
        let json = serde_json::to_string(&buf).unwrap();
        let restored: HostBuffer<f64> = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.to_vec(), vec![1.0, 2.0, 3.0]);
        assert_eq!(restored.offset(), 0);
    }
}
