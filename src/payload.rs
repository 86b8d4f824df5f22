//! Payload buffers owned by the native library.

use std::fmt;
use std::marker::PhantomData;
use std::ptr;

use crate::error::{Error, Result};
use crate::ffi::{self, NativeLibrary, RawPayload};
use crate::handle::{HandleGuard, NativeHandle};
use crate::DefaultLibrary;

/// A request or response payload: data bytes plus optional metadata bytes.
///
/// The bytes live in a native buffer; accessors copy them out. The buffer is
/// freed by [`Payload::release`] or on drop, whichever comes first.
///
/// # Example
///
/// ```no_run
/// use rsocket_bridge::Payload;
///
/// let payload: Payload = Payload::from_text("ping", Some("route.echo"))?;
/// assert_eq!(payload.data()?, b"ping");
/// assert_eq!(payload.metadata_string()?, "route.echo");
/// # Ok::<(), rsocket_bridge::Error>(())
/// ```
pub struct Payload<N: NativeLibrary = DefaultLibrary> {
    handle: NativeHandle<RawPayload>,
    _library: PhantomData<N>,
}

impl<N: NativeLibrary> Payload<N> {
    /// Create a payload from text.
    ///
    /// Empty metadata (`Some("")`) is treated the same as no metadata.
    pub fn from_text(data: &str, metadata: Option<&str>) -> Result<Self> {
        let data_c = ffi::c_string("payload data", data)?;
        let metadata_c = metadata
            .filter(|m| !m.is_empty())
            .map(|m| ffi::c_string("payload metadata", m))
            .transpose()?;

        let raw = unsafe {
            N::payload_create_from_string(
                data_c.as_ptr(),
                metadata_c.as_ref().map(|m| m.as_ptr()).unwrap_or(ptr::null()),
            )
        };
        unsafe { Self::from_raw(raw) }.ok_or(Error::NullHandle("payload"))
    }

    /// Create a payload from raw bytes.
    ///
    /// Empty `data` is a zero-length buffer. `Some(&[])` metadata is passed as
    /// a zero-length buffer and `None` as no buffer at all; whether the two
    /// differ is up to the native library.
    pub fn from_bytes(data: &[u8], metadata: Option<&[u8]>) -> Result<Self> {
        let data_ptr = if data.is_empty() {
            ptr::null()
        } else {
            data.as_ptr()
        };
        let (metadata_ptr, metadata_len) = match metadata {
            Some(m) => (m.as_ptr(), m.len()),
            None => (ptr::null(), 0),
        };

        let raw = unsafe { N::payload_create(data_ptr, data.len(), metadata_ptr, metadata_len) };
        unsafe { Self::from_raw(raw) }.ok_or(Error::NullHandle("payload"))
    }

    /// Take ownership of a native payload. `None` for null.
    ///
    /// # Safety
    ///
    /// A non-null `raw` must be a live payload produced by `N` that nobody
    /// else frees.
    pub(crate) unsafe fn from_raw(raw: *mut RawPayload) -> Option<Self> {
        NativeHandle::from_raw(raw, N::payload_free, "payload").map(|handle| Self {
            handle,
            _library: PhantomData,
        })
    }

    pub(crate) fn acquire(&self) -> Result<HandleGuard<'_, RawPayload>> {
        self.handle.acquire()
    }

    /// Length of the data in bytes.
    pub fn data_len(&self) -> Result<usize> {
        let guard = self.handle.acquire()?;
        Ok(unsafe { N::payload_get_data_length(guard.as_ptr()) })
    }

    /// Length of the metadata in bytes (0 when absent).
    pub fn metadata_len(&self) -> Result<usize> {
        let guard = self.handle.acquire()?;
        Ok(unsafe { N::payload_get_metadata_length(guard.as_ptr()) })
    }

    /// Copy the data out.
    pub fn data(&self) -> Result<Vec<u8>> {
        let guard = self.handle.acquire()?;
        let raw = guard.as_ptr();
        unsafe {
            copy_out(
                N::payload_get_data_length(raw),
                |buf, len| N::payload_copy_data(raw, buf, len),
            )
        }
    }

    /// Copy the metadata out. Absent metadata yields an empty vector.
    pub fn metadata(&self) -> Result<Vec<u8>> {
        let guard = self.handle.acquire()?;
        let raw = guard.as_ptr();
        unsafe {
            copy_out(
                N::payload_get_metadata_length(raw),
                |buf, len| N::payload_copy_metadata(raw, buf, len),
            )
        }
    }

    /// The data decoded as UTF-8; invalid sequences become U+FFFD.
    pub fn data_string(&self) -> Result<String> {
        Ok(String::from_utf8_lossy(&self.data()?).into_owned())
    }

    /// The metadata decoded as UTF-8; invalid sequences become U+FFFD.
    pub fn metadata_string(&self) -> Result<String> {
        Ok(String::from_utf8_lossy(&self.metadata()?).into_owned())
    }

    /// Free the native buffer now. Later calls are no-ops.
    pub fn release(&self) {
        self.handle.release();
    }

    /// Whether the native buffer has been freed.
    pub fn is_released(&self) -> bool {
        self.handle.is_released()
    }
}

/// Copy `len` bytes out through `copy`, skipping the call for empty buffers.
unsafe fn copy_out(len: usize, copy: impl FnOnce(*mut u8, usize) -> usize) -> Result<Vec<u8>> {
    if len == 0 {
        return Ok(Vec::new());
    }
    let mut buffer = vec![0u8; len];
    let copied = copy(buffer.as_mut_ptr(), buffer.len());
    buffer.truncate(copied.min(len));
    Ok(buffer)
}

impl<N: NativeLibrary> fmt::Debug for Payload<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload")
            .field("handle", &self.handle)
            .finish()
    }
}

#[cfg(all(test, feature = "loopback"))]
mod tests {
    use super::*;
    use crate::loopback::Loopback;

    type TestPayload = Payload<Loopback>;

    #[test]
    fn test_bytes_round_trip() {
        let data: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        let payload = TestPayload::from_bytes(&data, None).unwrap();
        assert_eq!(payload.data_len().unwrap(), 4096);
        assert_eq!(payload.data().unwrap(), data);
        assert_eq!(payload.metadata().unwrap(), Vec::<u8>::new());
        assert_eq!(payload.metadata_len().unwrap(), 0);
    }

    #[test]
    fn test_empty_metadata_is_zero_length() {
        let payload = TestPayload::from_bytes(b"data", Some(&[])).unwrap();
        assert!(payload.metadata().unwrap().is_empty());

        let payload = TestPayload::from_bytes(&[], Some(b"meta")).unwrap();
        assert!(payload.data().unwrap().is_empty());
        assert_eq!(payload.metadata().unwrap(), b"meta");
    }

    #[test]
    fn test_text_payload() {
        let payload = TestPayload::from_text("hello", Some("meta")).unwrap();
        assert_eq!(payload.data_string().unwrap(), "hello");
        assert_eq!(payload.metadata_string().unwrap(), "meta");

        let payload = TestPayload::from_text("hello", Some("")).unwrap();
        assert_eq!(payload.metadata_len().unwrap(), 0);
    }

    #[test]
    fn test_text_with_nul_is_rejected() {
        let err = TestPayload::from_text("he\0llo", None).unwrap_err();
        assert!(err.is_invalid_argument());
        let err = TestPayload::from_text("hello", Some("m\0")).unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn test_invalid_utf8_is_lossy() {
        let payload = TestPayload::from_bytes(&[0x66, 0xff, 0x6f], Some(&[0xc3])).unwrap();
        assert_eq!(payload.data_string().unwrap(), "f\u{fffd}o");
        assert_eq!(payload.metadata_string().unwrap(), "\u{fffd}");
    }

    #[test]
    fn test_released_payload() {
        let payload = TestPayload::from_text("bye", None).unwrap();
        assert!(!payload.is_released());
        payload.release();
        payload.release();
        assert!(payload.is_released());
        assert!(payload.data().unwrap_err().is_closed());
        assert!(payload.metadata_string().unwrap_err().is_closed());
    }
}
