//! Process-wide backend registry
//!
//! Maps backend tags to live capability handles. A tag names a backend
//! instance; the instance registers one handle per element type it serves,
//! so lookups are keyed by tag and dtype together. Populated once per
//! backend instantiation at startup and read for the lifetime of the
//! process; entries are never removed, since device resources are reclaimed
//! by the owning runtime at process exit.

use std::any::Any;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use tracing::debug;
use vellum_buf::{Dtype, Element};

use crate::error::{BackendError, Result};
use crate::handle::BackendHandle;
use crate::tag::BackendTag;

// each entry holds an Arc<dyn BackendHandle<T>> for the keyed dtype
type Entry = Box<dyn Any + Send + Sync>;

fn registry() -> &'static DashMap<(BackendTag, Dtype), Entry> {
    static REGISTRY: OnceLock<DashMap<(BackendTag, Dtype), Entry>> = OnceLock::new();
    REGISTRY.get_or_init(DashMap::new)
}

/// Register a backend handle under its own tag
///
/// Re-registering a (tag, dtype) pair replaces the previous handle; this
/// happens when a backend is re-instantiated in the same process (for
/// example when a deserialized session rebuilds its device contexts).
pub fn register_backend<T: Element>(handle: Arc<dyn BackendHandle<T>>) {
    let tag = handle.tag();
    let device = handle.device_id();
    registry().insert((tag, T::DTYPE), Box::new(handle));
    debug!(%tag, %device, dtype = %T::DTYPE, "registered backend");
}

/// Look up the backend handle registered under a tag for an element type
///
/// Fails with [`BackendError::UnknownTag`] when nothing is registered under
/// the tag at all, and with [`BackendError::ElementMismatch`] when the tag
/// exists but does not serve the requested element type.
pub fn lookup_backend<T: Element>(tag: BackendTag) -> Result<Arc<dyn BackendHandle<T>>> {
    if let Some(entry) = registry().get(&(tag, T::DTYPE)) {
        if let Some(handle) = entry.downcast_ref::<Arc<dyn BackendHandle<T>>>() {
            return Ok(Arc::clone(handle));
        }
    }
    match registered_dtype(tag) {
        Some(registered) => Err(BackendError::ElementMismatch {
            tag,
            registered,
            requested: T::DTYPE,
        }),
        None => Err(BackendError::UnknownTag { tag }),
    }
}

/// Whether any handle is registered under the tag
#[must_use]
pub fn is_registered(tag: BackendTag) -> bool {
    registered_dtype(tag).is_some()
}

fn registered_dtype(tag: BackendTag) -> Option<Dtype> {
    registry()
        .iter()
        .find(|entry| entry.key().0 == tag)
        .map(|entry| entry.key().1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulated::EmulatedBackend;
    use crate::tag::DeviceId;

    // registry state is process-global: each test uses its own tag range

    #[test]
    fn test_register_and_lookup() {
        let tag = BackendTag::from_raw(0x9000);
        let backend: Arc<dyn BackendHandle<f32>> =
            Arc::new(EmulatedBackend::new(tag, DeviceId::from_raw(0)));
        register_backend(backend);

        assert!(is_registered(tag));
        let found = lookup_backend::<f32>(tag).unwrap();
        assert_eq!(found.tag(), tag);
    }

    #[test]
    fn test_lookup_unknown_tag() {
        let tag = BackendTag::from_raw(0x9001);
        assert!(!is_registered(tag));
        let result = lookup_backend::<f32>(tag);
        assert!(matches!(result, Err(BackendError::UnknownTag { .. })));
    }

    #[test]
    fn test_lookup_wrong_element_type() {
        let tag = BackendTag::from_raw(0x9002);
        let backend: Arc<dyn BackendHandle<f64>> =
            Arc::new(EmulatedBackend::new(tag, DeviceId::from_raw(0)));
        register_backend(backend);

        let result = lookup_backend::<i32>(tag);
        assert!(matches!(
            result,
            Err(BackendError::ElementMismatch { .. })
        ));
    }

    #[test]
    fn test_one_tag_serves_multiple_dtypes() {
        let tag = BackendTag::from_raw(0x9003);
        let floats: Arc<dyn BackendHandle<f32>> =
            Arc::new(EmulatedBackend::new(tag, DeviceId::from_raw(0)));
        let ints: Arc<dyn BackendHandle<i32>> =
            Arc::new(EmulatedBackend::new(tag, DeviceId::from_raw(0)));
        register_backend(floats);
        register_backend(ints);

        assert!(lookup_backend::<f32>(tag).is_ok());
        assert!(lookup_backend::<i32>(tag).is_ok());
    }
}
