//! Backend capability trait and device allocation handles

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use vellum_buf::Element;

use crate::error::Result;
use crate::tag::{BackendTag, DeviceId};

/// Handle to one device-resident allocation
///
/// The handle is opaque: the payload is backend-specific and only the
/// backend that allocated it can operate on it. Cloning shares the
/// allocation (shallow copies of a mirrored buffer hold clones of one
/// handle), and the allocation is released exactly once, when the last
/// clone drops.
pub struct DeviceBuffer<T: Element> {
    id: u64,
    device: DeviceId,
    len: usize,
    payload: Arc<dyn Any + Send + Sync>,
    _elements: std::marker::PhantomData<fn() -> T>,
}

impl<T: Element> DeviceBuffer<T> {
    /// Wrap a backend-specific payload in a handle
    ///
    /// Called by backend implementations from [`BackendHandle::alloc`];
    /// buffer ids only need to be unique per device.
    pub fn from_payload(
        device: DeviceId,
        len: usize,
        payload: Arc<dyn Any + Send + Sync>,
    ) -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            device,
            len,
            payload,
            _elements: std::marker::PhantomData,
        }
    }

    /// Unique id of this allocation
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Device the allocation lives on
    #[must_use]
    pub fn device(&self) -> DeviceId {
        self.device
    }

    /// Allocation capacity in elements
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the allocation is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Backend-specific payload for downcasting by the owning backend
    #[must_use]
    pub fn payload(&self) -> &Arc<dyn Any + Send + Sync> {
        &self.payload
    }

    /// Whether two handles reference the same allocation
    #[must_use]
    pub fn shares_allocation(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.payload, &other.payload)
    }
}

impl<T: Element> Clone for DeviceBuffer<T> {
    /// Shares the allocation; does not copy device memory
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            device: self.device,
            len: self.len,
            payload: Arc::clone(&self.payload),
            _elements: std::marker::PhantomData,
        }
    }
}

impl<T: Element> std::fmt::Debug for DeviceBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("id", &self.id)
            .field("device", &self.device)
            .field("len", &self.len)
            .field("dtype", &T::DTYPE)
            .finish()
    }
}

/// Capability object for one backend instance
///
/// A backend owns one element type on one device, identified together by
/// its [`BackendTag`]. Buffers hold an injected `Arc<dyn BackendHandle<T>>`
/// rather than re-querying global state per operation; the tag is only used
/// to re-acquire a live handle from the registry after deserialization.
///
/// All operations are blocking and complete before returning.
pub trait BackendHandle<T: Element>: Send + Sync + 'static {
    /// Tag this backend is registered under
    fn tag(&self) -> BackendTag;

    /// Device this backend drives
    fn device_id(&self) -> DeviceId;

    /// Allocate device memory for `len` elements (contents unspecified)
    fn alloc(&self, len: usize) -> Result<DeviceBuffer<T>>;

    /// Copy host elements into a device allocation
    ///
    /// `src` must exactly fill the allocation.
    fn upload(&self, dst: &DeviceBuffer<T>, src: &[T]) -> Result<()>;

    /// Copy a device allocation into host memory
    ///
    /// `dst` must exactly match the allocation length.
    fn download(&self, src: &DeviceBuffer<T>, dst: &mut [T]) -> Result<()>;

    /// Device-to-device copy between two equally sized allocations
    fn peer_copy(&self, src: &DeviceBuffer<T>, dst: &DeviceBuffer<T>) -> Result<()>;

    /// Allocate a host-side staging array for buffer construction
    fn alloc_host_array(&self, len: usize) -> Vec<T> {
        vec![T::zero(); len]
    }
}
