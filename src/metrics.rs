//! Performance counters kept by the native library.

use std::fmt;
use std::marker::PhantomData;

use crate::error::{Error, Result};
use crate::ffi::{NativeLibrary, RawMetrics};
use crate::handle::NativeHandle;
use crate::types::MetricsSnapshot;
use crate::DefaultLibrary;

/// Monotonic request/response counters.
///
/// # Example
///
/// ```no_run
/// use rsocket_bridge::Metrics;
///
/// let metrics: Metrics = Metrics::new()?;
/// metrics.record_request(128)?;
/// metrics.record_response(256)?;
/// assert_eq!(metrics.request_count()?, 1);
/// # Ok::<(), rsocket_bridge::Error>(())
/// ```
pub struct Metrics<N: NativeLibrary = DefaultLibrary> {
    handle: NativeHandle<RawMetrics>,
    _library: PhantomData<N>,
}

impl<N: NativeLibrary> Metrics<N> {
    /// Create a fresh counters block.
    pub fn new() -> Result<Self> {
        let raw = unsafe { N::metrics_create() };
        let handle = unsafe { NativeHandle::from_raw(raw, N::metrics_free, "metrics") }
            .ok_or(Error::NullHandle("metrics"))?;
        Ok(Self {
            handle,
            _library: PhantomData,
        })
    }

    /// Record a sent request of `bytes_sent` bytes.
    pub fn record_request(&self, bytes_sent: usize) -> Result<()> {
        let guard = self.handle.acquire()?;
        unsafe { N::metrics_record_request(guard.as_ptr(), bytes_sent) };
        Ok(())
    }

    /// Record a received response of `bytes_received` bytes.
    pub fn record_response(&self, bytes_received: usize) -> Result<()> {
        let guard = self.handle.acquire()?;
        unsafe { N::metrics_record_response(guard.as_ptr(), bytes_received) };
        Ok(())
    }

    /// Record a failed request.
    pub fn record_error(&self) -> Result<()> {
        let guard = self.handle.acquire()?;
        unsafe { N::metrics_record_error(guard.as_ptr()) };
        Ok(())
    }

    /// Requests recorded so far.
    pub fn request_count(&self) -> Result<u64> {
        self.read(|m| unsafe { N::metrics_get_request_count(m) })
    }

    /// Responses recorded so far.
    pub fn response_count(&self) -> Result<u64> {
        self.read(|m| unsafe { N::metrics_get_response_count(m) })
    }

    /// Errors recorded so far.
    pub fn error_count(&self) -> Result<u64> {
        self.read(|m| unsafe { N::metrics_get_error_count(m) })
    }

    /// Bytes recorded by [`Metrics::record_request`] so far.
    pub fn bytes_sent(&self) -> Result<u64> {
        self.read(|m| unsafe { N::metrics_get_bytes_sent(m) })
    }

    /// Bytes recorded by [`Metrics::record_response`] so far.
    pub fn bytes_received(&self) -> Result<u64> {
        self.read(|m| unsafe { N::metrics_get_bytes_received(m) })
    }

    /// Seconds since the counters were created.
    pub fn uptime_seconds(&self) -> Result<u64> {
        self.read(|m| unsafe { N::metrics_get_uptime_seconds(m) })
    }

    /// Read every counter under one lock.
    pub fn snapshot(&self) -> Result<MetricsSnapshot> {
        let guard = self.handle.acquire()?;
        let m = guard.as_ptr() as *const RawMetrics;
        unsafe {
            Ok(MetricsSnapshot {
                request_count: N::metrics_get_request_count(m),
                response_count: N::metrics_get_response_count(m),
                error_count: N::metrics_get_error_count(m),
                bytes_sent: N::metrics_get_bytes_sent(m),
                bytes_received: N::metrics_get_bytes_received(m),
                uptime_seconds: N::metrics_get_uptime_seconds(m),
            })
        }
    }

    /// Free the counters now. Later calls are no-ops.
    pub fn release(&self) {
        self.handle.release();
    }

    fn read(&self, get: impl FnOnce(*const RawMetrics) -> u64) -> Result<u64> {
        let guard = self.handle.acquire()?;
        Ok(get(guard.as_ptr() as *const RawMetrics))
    }
}

impl<N: NativeLibrary> fmt::Debug for Metrics<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metrics")
            .field("handle", &self.handle)
            .finish()
    }
}
