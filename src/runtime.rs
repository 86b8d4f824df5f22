//! Library-wide native functions, for any [`NativeLibrary`].
//!
//! The crate root re-exposes these for [`DefaultLibrary`](crate::DefaultLibrary).

use crate::bridge;
use crate::error::{Error, Result};
use crate::ffi::{self, NativeLibrary, NATIVE_TRUE, STATUS_OK};
use crate::types::{Config, Transport};

/// Initialize the native library with configuration from the environment.
pub fn init<N: NativeLibrary>() -> Result<()> {
    init_with::<N>(&Config::from_env())
}

/// Initialize the native library.
///
/// Fixes the capacity of the completion registry if no request has been
/// issued yet. Safe to call more than once.
pub fn init_with<N: NativeLibrary>(config: &Config) -> Result<()> {
    bridge::configure(config);

    let code = unsafe { N::init() };
    if code != STATUS_OK {
        return Err(Error::Initialization(format!(
            "init failed with code {}",
            code
        )));
    }

    tracing::debug!(
        max_pending_calls = bridge::max_pending_calls(),
        "native library initialized"
    );
    Ok(())
}

/// Version string reported by the native library.
pub fn version<N: NativeLibrary>() -> String {
    unsafe { ffi::take_string::<N>(N::get_version()) }
}

/// Transports the native library supports. Names this crate does not know
/// are skipped.
pub fn supported_transports<N: NativeLibrary>() -> Vec<Transport> {
    let list = unsafe { ffi::take_string::<N>(N::get_supported_transports()) };
    list.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .filter_map(|name| match name.parse::<Transport>() {
            Ok(transport) => Some(transport),
            Err(_) => {
                tracing::debug!(name, "skipping unknown transport");
                None
            }
        })
        .collect()
}

/// Whether the native library accepts `addr` as a stream-socket address.
pub fn validate_tcp_address<N: NativeLibrary>(addr: &str) -> bool {
    let Ok(addr) = ffi::c_string("address", addr) else {
        return false;
    };
    unsafe { N::validate_tcp_address(addr.as_ptr()) == NATIVE_TRUE }
}

/// Whether the native library accepts `url` as a web-socket URL.
pub fn validate_websocket_url<N: NativeLibrary>(url: &str) -> bool {
    let Ok(url) = ffi::c_string("url", url) else {
        return false;
    };
    unsafe { N::validate_websocket_url(url.as_ptr()) == NATIVE_TRUE }
}
