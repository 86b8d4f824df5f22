//! Error conversion utilities for FFI.

use std::ffi::CStr;

use super::library::NativeLibrary;
use super::raw::{RawError, StatusCode, STATUS_OK};
use crate::error::Error;

/// Convert a native error to a Rust error and free the native error.
///
/// # Safety
///
/// `err` must be null or an error produced by `N` that nobody else frees.
pub unsafe fn error_from_native<N: NativeLibrary>(err: *mut RawError) -> Error {
    if err.is_null() {
        return Error::RequestFailed {
            code: super::raw::STATUS_FAILED,
            message: "null error pointer".to_string(),
        };
    }

    let err_ref = &*err;
    let code = err_ref.code;

    // Extract before freeing
    let message = if err_ref.message.is_null() {
        "unknown error".to_string()
    } else {
        CStr::from_ptr(err_ref.message)
            .to_string_lossy()
            .into_owned()
    };

    N::error_free(err);

    Error::RequestFailed { code, message }
}

/// Map a request status code to a Result.
pub fn check_request(code: StatusCode) -> crate::Result<()> {
    if code == STATUS_OK {
        Ok(())
    } else {
        Err(Error::RequestRejected { code })
    }
}
