//! Raw C types shared with the native library.
//!
//! Users should prefer the safe Rust wrappers in the parent modules.

use std::os::raw::{c_char, c_int, c_void};

use super::handles::RawPayload;

/// Status code returned by native functions.
pub type StatusCode = c_int;

/// Success.
pub const STATUS_OK: StatusCode = 0;
/// Generic failure, used by the native library for every rejection.
pub const STATUS_FAILED: StatusCode = -1;

/// Truthy value of `client_is_connected` and the validators.
pub const NATIVE_TRUE: c_int = 1;

/// Error produced by the native library for a failed request.
///
/// Freed with `error_free`, exactly once, only when one was produced.
#[repr(C)]
pub struct RawError {
    pub code: c_int,
    pub message: *const c_char,
}

/// Completion entry point the native library invokes once per accepted
/// request: `(response, error, caller_context)`.
pub type ResponseCallback =
    unsafe extern "C" fn(response: *mut RawPayload, error: *mut RawError, context: *mut c_void);
