//! Dual-residency buffer and its synchronization protocol
//!
//! A [`MirroredBuffer`] is a host buffer with an optional device-resident
//! mirror. Two modification flags track which residency is authoritative;
//! every host access routes through an access hook that synchronizes the
//! stale side first, so each dirty transition copies exactly once and a
//! caller never observes stale data.
//!
//! The protocol assumes a single logical writer timeline per buffer
//! (partition work across distinct buffers for parallelism); both flags set
//! at once is a logic defect surfaced as [`MirrorError::SyncConflict`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use vellum_backend::{BackendHandle, BackendTag, DeviceBuffer, DeviceId, lookup_backend};
use vellum_buf::{Dtype, Element, HostBuffer};

use crate::error::{MirrorError, Result, SyncDirection};

/// A typed buffer resident on the host and, lazily, on a device
///
/// Construction never touches the device: device memory is allocated sized
/// to the window on the first device-requiring access. The backend is an
/// injected capability; only its tag and device ordinal survive
/// serialization, and [`MirroredBuffer::after_deserialize`] re-acquires a
/// live handle from the registry before any further device access.
#[derive(Serialize, Deserialize)]
#[serde(bound(serialize = "T: Element", deserialize = "T: Element"))]
pub struct MirroredBuffer<T: Element> {
    host: HostBuffer<T>,
    tag: BackendTag,
    device_id: DeviceId,
    #[serde(skip)]
    backend: Option<Arc<dyn BackendHandle<T>>>,
    #[serde(skip)]
    device: Option<DeviceBuffer<T>>,
    #[serde(skip)]
    host_modified: bool,
    #[serde(skip)]
    device_modified: bool,
}

impl<T: Element> MirroredBuffer<T> {
    /// Wrap a host buffer with an injected backend capability
    pub fn new(host: HostBuffer<T>, backend: Arc<dyn BackendHandle<T>>) -> Self {
        Self {
            tag: backend.tag(),
            device_id: backend.device_id(),
            host,
            backend: Some(backend),
            device: None,
            host_modified: false,
            device_modified: false,
        }
    }

    /// Buffer over owned data, windowing all of it
    pub fn from_vec(data: Vec<T>, backend: Arc<dyn BackendHandle<T>>) -> Self {
        Self::new(HostBuffer::from_vec(data), backend)
    }

    /// Buffer over a sub-window of owned data
    pub fn from_vec_windowed(
        data: Vec<T>,
        offset: usize,
        len: usize,
        backend: Arc<dyn BackendHandle<T>>,
    ) -> Result<Self> {
        Ok(Self::new(
            HostBuffer::from_vec_windowed(data, offset, len)?,
            backend,
        ))
    }

    /// Freshly allocated zeroed buffer
    pub fn zeroed(len: usize, backend: Arc<dyn BackendHandle<T>>) -> Self {
        Self::new(HostBuffer::zeroed(len), backend)
    }

    fn with_parts(&self, host: HostBuffer<T>) -> Self {
        Self {
            host,
            tag: self.tag,
            device_id: self.device_id,
            backend: self.backend.clone(),
            device: None,
            host_modified: false,
            device_modified: false,
        }
    }

    /// Number of visible elements
    #[must_use]
    pub fn len(&self) -> usize {
        self.host.len()
    }

    /// Whether the window is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.host.is_empty()
    }

    /// Element dtype
    #[must_use]
    pub fn dtype(&self) -> Dtype {
        self.host.dtype()
    }

    /// Tag of the owning backend
    #[must_use]
    pub fn tag(&self) -> BackendTag {
        self.tag
    }

    /// Device this buffer mirrors onto
    #[must_use]
    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }

    /// Whether device memory has been allocated for this buffer
    #[must_use]
    pub fn is_device_resident(&self) -> bool {
        self.device.is_some()
    }

    /// Whether the host copy holds unsynchronized writes
    #[must_use]
    pub fn host_modified(&self) -> bool {
        self.host_modified
    }

    /// Whether the device copy holds unsynchronized writes
    #[must_use]
    pub fn device_modified(&self) -> bool {
        self.device_modified
    }

    /// Whether two buffers share the same host backing store
    #[must_use]
    pub fn aliases(&self, other: &Self) -> bool {
        self.host.aliases(&other.host)
    }

    fn backend(&self) -> Result<&Arc<dyn BackendHandle<T>>> {
        self.backend
            .as_ref()
            .ok_or(MirrorError::ContextUnavailable { tag: self.tag })
    }

    // ------------------------------------------------------------------
    // Access hooks
    // ------------------------------------------------------------------

    /// Hook run before any operation that reads host data
    pub fn on_read_access(&mut self) -> Result<()> {
        self.sync_device_to_host()
    }

    /// Hook run before any operation that writes host data
    pub fn on_write_access(&mut self) -> Result<()> {
        self.sync_device_to_host()?;
        self.host_modified = true;
        Ok(())
    }

    /// Hook run before any operation that reads and writes host data
    pub fn on_read_write_access(&mut self) -> Result<()> {
        self.on_write_access()
    }

    /// Flag an out-of-band device-side write
    ///
    /// For backends that write device memory outside this layer's
    /// knowledge (kernel launches against [`MirroredBuffer::device_buffer`]).
    pub fn mark_device_modified(&mut self) {
        self.device_modified = true;
    }

    /// Flag an out-of-band host-side write
    pub fn mark_host_modified(&mut self) {
        self.host_modified = true;
    }

    // ------------------------------------------------------------------
    // Synchronization
    // ------------------------------------------------------------------

    /// Copy device memory into the host window iff the device is dirty
    ///
    /// Idempotent: a second call with no intervening device write is a
    /// no-op. Both flags set is a fatal [`MirrorError::SyncConflict`].
    pub fn sync_device_to_host(&mut self) -> Result<()> {
        if !self.device_modified {
            return Ok(());
        }
        if self.host_modified {
            return Err(MirrorError::SyncConflict {
                direction: SyncDirection::DeviceToHost,
            });
        }
        self.copy_device_to_host()?;
        self.device_modified = false;
        Ok(())
    }

    /// Copy the host window into device memory iff the host is dirty
    pub fn sync_host_to_device(&mut self) -> Result<()> {
        if !self.host_modified {
            return Ok(());
        }
        if self.device_modified {
            return Err(MirrorError::SyncConflict {
                direction: SyncDirection::HostToDevice,
            });
        }
        self.copy_host_to_device()?;
        self.host_modified = false;
        Ok(())
    }

    fn init_device(&mut self, copy_host: bool) -> Result<()> {
        let backend = Arc::clone(self.backend()?);
        let device = backend.alloc(self.host.len())?;
        debug!(
            tag = %self.tag,
            device = %self.device_id,
            len = self.host.len(),
            "allocated device mirror"
        );
        if copy_host {
            self.host.with_slice(|cells| backend.upload(&device, cells))?;
            self.host_modified = false;
        }
        self.device = Some(device);
        Ok(())
    }

    fn copy_host_to_device(&mut self) -> Result<()> {
        if self.device.is_none() {
            // first device touch: allocation already performs the upload
            return self.init_device(true);
        }
        let backend = Arc::clone(self.backend()?);
        let device = self
            .device
            .as_ref()
            .ok_or(MirrorError::ContextUnavailable { tag: self.tag })?;
        self.host.with_slice(|cells| backend.upload(device, cells))?;
        trace!(tag = %self.tag, len = self.host.len(), "synchronised host to device");
        Ok(())
    }

    fn copy_device_to_host(&mut self) -> Result<()> {
        if self.device.is_none() {
            return self.init_device(true);
        }
        let backend = Arc::clone(self.backend()?);
        let device = self
            .device
            .as_ref()
            .ok_or(MirrorError::ContextUnavailable { tag: self.tag })?;
        self.host
            .with_slice_mut(|cells| backend.download(device, cells))?;
        trace!(tag = %self.tag, len = self.host.len(), "synchronised device to host");
        Ok(())
    }

    /// Device-resident representation of this buffer
    ///
    /// Triggers lazy allocation on first call, then pushes any pending host
    /// writes. The returned handle is what device kernels operate on;
    /// callers that write through it must
    /// [`MirroredBuffer::mark_device_modified`].
    pub fn device_buffer(&mut self) -> Result<&DeviceBuffer<T>> {
        if self.device.is_none() {
            self.init_device(true)?;
        }
        self.sync_host_to_device()?;
        self.device
            .as_ref()
            .ok_or(MirrorError::ContextUnavailable { tag: self.tag })
    }

    /// Drop this buffer's device handle
    ///
    /// Pending device writes are flushed to the host first, so no data is
    /// lost. Other shallow copies sharing the allocation keep it alive; the
    /// device memory frees when the last sharer detaches or drops. The next
    /// device access on this buffer re-runs the lazy allocation path.
    pub fn detach_device(&mut self) -> Result<()> {
        self.sync_device_to_host()?;
        if self.device.take().is_some() {
            trace!(tag = %self.tag, "detached device mirror");
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Host access (all window-relative, all routed through hooks)
    // ------------------------------------------------------------------

    /// Read one element
    pub fn get(&mut self, index: usize) -> Result<T> {
        self.on_read_access()?;
        Ok(self.host.get(index)?)
    }

    /// Write one element
    pub fn set(&mut self, index: usize, value: T) -> Result<()> {
        self.on_write_access()?;
        Ok(self.host.set(index, value)?)
    }

    /// Copy a sub-range out into an owned array
    pub fn get_range(&mut self, start: usize, len: usize) -> Result<Vec<T>> {
        self.on_read_access()?;
        Ok(self.host.get_range(start, len)?)
    }

    /// Overwrite a sub-range from a slice
    pub fn set_range(&mut self, start: usize, values: &[T]) -> Result<()> {
        self.on_write_access()?;
        Ok(self.host.set_range(start, values)?)
    }

    /// Copy the full window contents out into an owned array
    pub fn to_vec(&mut self) -> Result<Vec<T>> {
        self.on_read_access()?;
        Ok(self.host.to_vec())
    }

    // ------------------------------------------------------------------
    // Views and copies
    // ------------------------------------------------------------------

    /// O(1) view narrowed to a sub-range, sharing the host store
    ///
    /// The view starts host-only: its device mirror, if ever needed, is
    /// allocated lazily and sized to the narrowed window. Writes through
    /// the view alias the parent's host data.
    pub fn slice(&mut self, start: usize, len: usize) -> Result<Self> {
        self.on_read_access()?;
        Ok(self.with_parts(self.host.slice(start, len)?))
    }

    /// Convert a sub-range into a buffer of another element kind
    ///
    /// The conversion materializes a new store (element widths may differ).
    /// The result keeps this buffer's tag; it binds the tag's backend for
    /// the target kind if one is registered, and stays host-only otherwise.
    pub fn reinterpret_as<U: Element>(
        &mut self,
        start: usize,
        len: usize,
    ) -> Result<MirroredBuffer<U>> {
        self.on_read_access()?;
        let host = self.host.reinterpret_as::<U>(start, len)?;
        Ok(MirroredBuffer {
            host,
            tag: self.tag,
            device_id: self.device_id,
            backend: lookup_backend::<U>(self.tag).ok(),
            device: None,
            host_modified: false,
            device_modified: false,
        })
    }

    /// New view sharing the host store and the same device allocation
    ///
    /// Both copies see each other's writes on both residencies; the device
    /// allocation frees once, when the last sharer drops or detaches.
    #[must_use]
    pub fn shallow_copy(&self) -> Self {
        Self {
            host: self.host.shallow_copy(),
            tag: self.tag,
            device_id: self.device_id,
            backend: self.backend.clone(),
            device: self.device.clone(),
            host_modified: self.host_modified,
            device_modified: self.device_modified,
        }
    }

    /// Independent buffer with its own store and, if warranted, device memory
    ///
    /// When the device mirror exists and is authoritative (host not dirty),
    /// the copy goes device-to-device and is marked device-authoritative,
    /// skipping the host round trip entirely. Otherwise the host window is
    /// block-copied.
    pub fn deep_copy(&self) -> Result<Self> {
        if let Some(device) = &self.device {
            if !self.host_modified {
                let backend = Arc::clone(self.backend()?);
                let staging = backend.alloc_host_array(self.host.len());
                let mut copy = Self::new(HostBuffer::from_vec(staging), backend);
                copy.init_device(false)?;
                let copy_device = copy
                    .device
                    .as_ref()
                    .ok_or(MirrorError::ContextUnavailable { tag: self.tag })?;
                copy.backend()?.peer_copy(device, copy_device)?;
                copy.device_modified = true;
                debug!(tag = %self.tag, len = self.host.len(), "deep copy via peer copy");
                return Ok(copy);
            }
        }
        Ok(self.with_parts(self.host.deep_copy()))
    }

    /// Extract a dense sub-matrix of a row-major matrix view
    ///
    /// The buffer is interpreted as a `total_rows` x `total_cols` row-major
    /// matrix; rows `row_start..=row_finish` and columns
    /// `col_start..=col_finish` are gathered into a new, densely packed
    /// buffer. Columns are a sub-range of the wider row stride, so rows are
    /// not contiguous in the source and are copied one row-segment at a
    /// time. A device-resident source is synchronized to the host first,
    /// and the result is pushed back to the device afterwards, so a sliced
    /// buffer inherits its parent's residency.
    pub fn stacked(
        &mut self,
        total_rows: usize,
        total_cols: usize,
        row_start: usize,
        row_finish: usize,
        col_start: usize,
        col_finish: usize,
    ) -> Result<Self> {
        let matrix_len = total_rows.checked_mul(total_cols);
        let valid = total_cols > 0
            && row_start <= row_finish
            && col_start <= col_finish
            && row_finish < total_rows
            && col_finish < total_cols
            && matrix_len.is_some_and(|len| len <= self.host.len());
        if !valid {
            return Err(MirrorError::InvalidStackedRange {
                total_rows,
                total_cols,
                row_start,
                row_finish,
                col_start,
                col_finish,
                buffer_len: self.host.len(),
            });
        }

        let was_device_resident = self.device.is_some();
        if was_device_resident {
            self.sync_device_to_host()?;
        }

        let col_len = col_finish - col_start + 1;
        let rows = row_finish - row_start + 1;
        let mut packed = match &self.backend {
            Some(backend) => backend.alloc_host_array(rows * col_len),
            None => vec![T::zero(); rows * col_len],
        };
        self.host.with_slice(|cells| {
            for (out_row, row) in (row_start..=row_finish).enumerate() {
                let src = row * total_cols + col_start;
                packed[out_row * col_len..(out_row + 1) * col_len]
                    .copy_from_slice(&cells[src..src + col_len]);
            }
        });

        let mut result = self.with_parts(HostBuffer::from_vec(packed));
        if was_device_resident {
            result.init_device(true)?;
        }
        Ok(result)
    }

    // ------------------------------------------------------------------
    // Persistence hooks
    // ------------------------------------------------------------------

    /// Hook to run before serializing this buffer
    ///
    /// Currently nothing to do: device handles are simply omitted from the
    /// persisted form. Reserved for flushing.
    pub fn before_serialize(&self) -> Result<()> {
        Ok(())
    }

    /// Re-bind a live backend after deserialization
    ///
    /// The persisted tag is looked up in the registry and the handle's
    /// device is checked against the persisted device ordinal. No copy
    /// happens here: the next device access re-runs the lazy allocation
    /// path. Host access works without any backend bound.
    pub fn after_deserialize(&mut self) -> Result<()> {
        let handle = lookup_backend::<T>(self.tag)?;
        self.rebind(handle)
    }

    /// Inject a live backend handle into a deserialized buffer
    ///
    /// The handle must drive the device this buffer was persisted on.
    pub fn rebind(&mut self, handle: Arc<dyn BackendHandle<T>>) -> Result<()> {
        if handle.device_id() != self.device_id {
            return Err(MirrorError::DeviceMismatch {
                tag: self.tag,
                persisted: self.device_id,
                actual: handle.device_id(),
            });
        }
        debug!(tag = %self.tag, device = %self.device_id, "rebound backend after deserialization");
        self.backend = Some(handle);
        Ok(())
    }
}

impl<T: Element> Clone for MirroredBuffer<T> {
    /// Shallow copy: shares the host store and the device allocation
    fn clone(&self) -> Self {
        self.shallow_copy()
    }
}

impl<T: Element> std::fmt::Debug for MirroredBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MirroredBuffer")
            .field("len", &self.len())
            .field("dtype", &self.dtype())
            .field("tag", &self.tag)
            .field("device_id", &self.device_id)
            .field("device_resident", &self.is_device_resident())
            .field("host_modified", &self.host_modified)
            .field("device_modified", &self.device_modified)
            .finish()
    }
}
