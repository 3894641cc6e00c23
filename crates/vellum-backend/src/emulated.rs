//! In-process emulated backend
//!
//! Reference implementation of [`BackendHandle`] that keeps "device" memory
//! in separate host allocations. Every transfer is a real copy between two
//! distinct memory spaces, so the synchronization protocol above this crate
//! is exercised exactly as it would be against an accelerator, and the
//! transfer counters let tests assert that a copy happened at most once.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::{debug, trace};
use vellum_buf::Element;

use crate::error::{BackendError, Result};
use crate::handle::{BackendHandle, DeviceBuffer};
use crate::tag::{BackendTag, DeviceId};

/// Transfer counters for one emulated backend
#[derive(Debug, Default)]
pub struct BackendStats {
    allocations: AtomicU64,
    uploads: AtomicU64,
    downloads: AtomicU64,
    peer_copies: AtomicU64,
}

/// Point-in-time copy of [`BackendStats`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BackendStatsSnapshot {
    /// Device allocations performed
    pub allocations: u64,
    /// Host-to-device copies performed
    pub uploads: u64,
    /// Device-to-host copies performed
    pub downloads: u64,
    /// Device-to-device copies performed
    pub peer_copies: u64,
}

impl BackendStats {
    fn snapshot(&self) -> BackendStatsSnapshot {
        BackendStatsSnapshot {
            allocations: self.allocations.load(Ordering::Relaxed),
            uploads: self.uploads.load(Ordering::Relaxed),
            downloads: self.downloads.load(Ordering::Relaxed),
            peer_copies: self.peer_copies.load(Ordering::Relaxed),
        }
    }
}

struct EmulatedMemory<T> {
    cells: RwLock<Vec<T>>,
}

/// Emulated backend over a private host-side memory space
pub struct EmulatedBackend<T: Element> {
    tag: BackendTag,
    device: DeviceId,
    stats: BackendStats,
    _elements: std::marker::PhantomData<fn() -> T>,
}

impl<T: Element> EmulatedBackend<T> {
    /// Create a backend for the given tag and device ordinal
    pub fn new(tag: BackendTag, device: DeviceId) -> Self {
        debug!(%tag, %device, dtype = %T::DTYPE, "creating emulated backend");
        Self {
            tag,
            device,
            stats: BackendStats::default(),
            _elements: std::marker::PhantomData,
        }
    }

    /// Current transfer counters
    #[must_use]
    pub fn stats(&self) -> BackendStatsSnapshot {
        self.stats.snapshot()
    }

    fn memory<'a>(&self, buffer: &'a DeviceBuffer<T>) -> Result<&'a EmulatedMemory<T>> {
        if buffer.device() != self.device {
            return Err(BackendError::ForeignBuffer {
                buffer_id: buffer.id(),
                device: self.device,
            });
        }
        buffer
            .payload()
            .downcast_ref::<EmulatedMemory<T>>()
            .ok_or(BackendError::ForeignBuffer {
                buffer_id: buffer.id(),
                device: self.device,
            })
    }

    /// Write one element directly in device memory
    ///
    /// Stands in for a kernel that mutates device memory outside the
    /// buffer layer's knowledge; callers are responsible for flagging the
    /// modification on the owning buffer.
    pub fn poke(&self, buffer: &DeviceBuffer<T>, index: usize, value: T) -> Result<()> {
        let memory = self.memory(buffer)?;
        let mut cells = memory.cells.write();
        if index >= cells.len() {
            return Err(BackendError::CopyOutOfBounds {
                requested: index + 1,
                capacity: cells.len(),
            });
        }
        cells[index] = value;
        Ok(())
    }

    /// Read one element directly from device memory
    pub fn peek(&self, buffer: &DeviceBuffer<T>, index: usize) -> Result<T> {
        let memory = self.memory(buffer)?;
        let cells = memory.cells.read();
        if index >= cells.len() {
            return Err(BackendError::CopyOutOfBounds {
                requested: index + 1,
                capacity: cells.len(),
            });
        }
        Ok(cells[index])
    }
}

impl<T: Element> BackendHandle<T> for EmulatedBackend<T> {
    fn tag(&self) -> BackendTag {
        self.tag
    }

    fn device_id(&self) -> DeviceId {
        self.device
    }

    fn alloc(&self, len: usize) -> Result<DeviceBuffer<T>> {
        self.stats.allocations.fetch_add(1, Ordering::Relaxed);
        debug!(device = %self.device, len, "allocating emulated device memory");
        let payload = Arc::new(EmulatedMemory {
            cells: RwLock::new(vec![T::zero(); len]),
        });
        Ok(DeviceBuffer::from_payload(self.device, len, payload))
    }

    fn upload(&self, dst: &DeviceBuffer<T>, src: &[T]) -> Result<()> {
        if src.len() != dst.len() {
            return Err(BackendError::CopyOutOfBounds {
                requested: src.len(),
                capacity: dst.len(),
            });
        }
        let memory = self.memory(dst)?;
        memory.cells.write().copy_from_slice(src);
        self.stats.uploads.fetch_add(1, Ordering::Relaxed);
        trace!(buffer = dst.id(), len = src.len(), "host to device copy");
        Ok(())
    }

    fn download(&self, src: &DeviceBuffer<T>, dst: &mut [T]) -> Result<()> {
        if dst.len() != src.len() {
            return Err(BackendError::CopyOutOfBounds {
                requested: dst.len(),
                capacity: src.len(),
            });
        }
        let memory = self.memory(src)?;
        dst.copy_from_slice(&memory.cells.read());
        self.stats.downloads.fetch_add(1, Ordering::Relaxed);
        trace!(buffer = src.id(), len = dst.len(), "device to host copy");
        Ok(())
    }

    fn peer_copy(&self, src: &DeviceBuffer<T>, dst: &DeviceBuffer<T>) -> Result<()> {
        if src.len() != dst.len() {
            return Err(BackendError::CopyOutOfBounds {
                requested: src.len(),
                capacity: dst.len(),
            });
        }
        if src.shares_allocation(dst) {
            return Ok(());
        }
        let src_memory = self.memory(src)?;
        let dst_memory = self.memory(dst)?;
        dst_memory
            .cells
            .write()
            .copy_from_slice(&src_memory.cells.read());
        self.stats.peer_copies.fetch_add(1, Ordering::Relaxed);
        trace!(src = src.id(), dst = dst.id(), "device to device copy");
        Ok(())
    }
}

impl<T: Element> std::fmt::Debug for EmulatedBackend<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmulatedBackend")
            .field("tag", &self.tag)
            .field("device", &self.device)
            .field("dtype", &T::DTYPE)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> EmulatedBackend<f32> {
        EmulatedBackend::new(BackendTag::from_raw(0xE000), DeviceId::from_raw(0))
    }

    #[test]
    fn test_alloc_upload_download_roundtrip() {
        let backend = backend();
        let buffer = backend.alloc(4).unwrap();

        backend.upload(&buffer, &[1.0, 2.0, 3.0, 4.0]).unwrap();
        let mut out = vec![0.0; 4];
        backend.download(&buffer, &mut out).unwrap();
        assert_eq!(out, vec![1.0, 2.0, 3.0, 4.0]);

        let stats = backend.stats();
        assert_eq!(stats.allocations, 1);
        assert_eq!(stats.uploads, 1);
        assert_eq!(stats.downloads, 1);
    }

    #[test]
    fn test_upload_length_mismatch() {
        let backend = backend();
        let buffer = backend.alloc(4).unwrap();
        let result = backend.upload(&buffer, &[1.0, 2.0]);
        assert!(matches!(
            result,
            Err(BackendError::CopyOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_peer_copy() {
        let backend = backend();
        let a = backend.alloc(3).unwrap();
        let b = backend.alloc(3).unwrap();
        backend.upload(&a, &[5.0, 6.0, 7.0]).unwrap();

        backend.peer_copy(&a, &b).unwrap();
        let mut out = vec![0.0; 3];
        backend.download(&b, &mut out).unwrap();
        assert_eq!(out, vec![5.0, 6.0, 7.0]);
        assert_eq!(backend.stats().peer_copies, 1);
    }

    #[test]
    fn test_peer_copy_self_is_noop() {
        let backend = backend();
        let a = backend.alloc(2).unwrap();
        let alias = a.clone();
        backend.peer_copy(&a, &alias).unwrap();
        assert_eq!(backend.stats().peer_copies, 0);
    }

    #[test]
    fn test_foreign_buffer_rejected() {
        let backend = backend();
        let other = EmulatedBackend::<f32>::new(
            BackendTag::from_raw(0xE001),
            DeviceId::from_raw(1),
        );
        let buffer = other.alloc(2).unwrap();
        let result = backend.upload(&buffer, &[0.0, 0.0]);
        assert!(matches!(result, Err(BackendError::ForeignBuffer { .. })));
    }

    #[test]
    fn test_poke_and_peek() {
        let backend = backend();
        let buffer = backend.alloc(2).unwrap();
        backend.poke(&buffer, 1, 8.5).unwrap();
        assert_eq!(backend.peek(&buffer, 1).unwrap(), 8.5);
        assert!(backend.poke(&buffer, 2, 0.0).is_err());
        assert!(backend.peek(&buffer, 9).is_err());
    }

    #[test]
    fn test_cloned_handle_shares_allocation() {
        let backend = backend();
        let buffer = backend.alloc(2).unwrap();
        let alias = buffer.clone();
        backend.poke(&buffer, 0, 3.0).unwrap();
        assert_eq!(backend.peek(&alias, 0).unwrap(), 3.0);
        assert!(buffer.shares_allocation(&alias));
    }
}
