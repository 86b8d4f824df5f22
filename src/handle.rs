//! Ownership of a single native handle.
//!
//! A [`NativeHandle`] holds one non-null pointer behind a mutex. Every native
//! call goes through a [`HandleGuard`] obtained from [`NativeHandle::acquire`],
//! which keeps the mutex held for the duration of the call. Release takes the
//! same mutex and clears the slot before unlocking, so a release racing with
//! an in-flight call waits for it, and every later call observes
//! [`Error::Closed`].

use std::fmt;
use std::ptr::NonNull;

use parking_lot::{Mutex, MutexGuard};

use crate::error::{Error, Result};

/// Destroy function for a handle of kind `T`.
pub(crate) type FreeFn<T> = unsafe fn(*mut T);

pub(crate) struct NativeHandle<T> {
    slot: Mutex<Option<NonNull<T>>>,
    free: FreeFn<T>,
    kind: &'static str,
}

impl<T> NativeHandle<T> {
    /// Wrap a pointer returned by a native creation function.
    ///
    /// Returns `None` for a null pointer; nothing is freed in that case.
    ///
    /// # Safety
    ///
    /// A non-null `ptr` must be a live handle that nobody else frees, and
    /// `free` must be its destroy function.
    pub(crate) unsafe fn from_raw(ptr: *mut T, free: FreeFn<T>, kind: &'static str) -> Option<Self> {
        let ptr = NonNull::new(ptr)?;
        tracing::trace!(kind, "native handle acquired");
        Some(Self {
            slot: Mutex::new(Some(ptr)),
            free,
            kind,
        })
    }

    /// Lock the handle for one native call.
    pub(crate) fn acquire(&self) -> Result<HandleGuard<'_, T>> {
        let guard = self.slot.lock();
        match *guard {
            Some(ptr) => Ok(HandleGuard { ptr, _guard: guard }),
            None => Err(Error::Closed),
        }
    }

    /// Free the handle. Returns `true` only for the call that actually freed it.
    pub(crate) fn release(&self) -> bool {
        let mut guard = self.slot.lock();
        let Some(ptr) = guard.take() else {
            return false;
        };
        unsafe { (self.free)(ptr.as_ptr()) };
        drop(guard);
        tracing::debug!(kind = self.kind, "native handle released");
        true
    }

    pub(crate) fn is_released(&self) -> bool {
        self.slot.lock().is_none()
    }

    pub(crate) fn kind(&self) -> &'static str {
        self.kind
    }
}

impl<T> Drop for NativeHandle<T> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<T> fmt::Debug for NativeHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeHandle")
            .field("kind", &self.kind())
            .field("released", &self.is_released())
            .finish()
    }
}

// The pointer is only dereferenced by the native library, under the mutex.
unsafe impl<T> Send for NativeHandle<T> {}
unsafe impl<T> Sync for NativeHandle<T> {}

/// Scoped access to a live handle; the handle cannot be released while a
/// guard exists.
pub(crate) struct HandleGuard<'a, T> {
    ptr: NonNull<T>,
    _guard: MutexGuard<'a, Option<NonNull<T>>>,
}

impl<T> HandleGuard<'_, T> {
    pub(crate) fn as_ptr(&self) -> *mut T {
        self.ptr.as_ptr()
    }
}
