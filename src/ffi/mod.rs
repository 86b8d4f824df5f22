//! FFI bindings to the native RSocket library.
//!
//! This module contains the low-level C surface. Users should prefer the
//! safe Rust wrappers in the parent modules.

pub mod error;
pub mod handles;
pub mod library;
#[cfg(feature = "linked")]
pub mod linked;
pub mod raw;

pub use error::{check_request, error_from_native};
pub use handles::*;
pub use library::NativeLibrary;
#[cfg(feature = "linked")]
pub use linked::Linked;
pub use raw::*;

use std::ffi::{CStr, CString};
use std::os::raw::c_char;

use crate::error::{Error, Result};

/// Take ownership of a native string, copy it out and free it.
///
/// # Safety
///
/// `ptr` must be null or a string produced by `N` that nobody else frees.
pub unsafe fn take_string<N: NativeLibrary>(ptr: *mut c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    let s = CStr::from_ptr(ptr).to_string_lossy().into_owned();
    N::free_string(ptr);
    s
}

/// Build a C string for an argument, rejecting interior NUL bytes.
pub fn c_string(what: &str, value: &str) -> Result<CString> {
    CString::new(value)
        .map_err(|_| Error::InvalidArgument(format!("{} contains a null byte", what)))
}
