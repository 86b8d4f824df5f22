//! Opaque handle types for objects owned by the native library.
//!
//! Each kind is a distinct zero-sized `#[repr(C)]` type so that pointers to
//! different kinds never coerce into one another.

/// Macro to define an opaque native handle type.
macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[repr(C)]
        pub struct $name {
            _private: [u8; 0],
            _pinned: core::marker::PhantomData<(*mut u8, core::marker::PhantomPinned)>,
        }
    };
}

define_handle!(
    /// A client connection owned by the native library.
    RawClient
);
define_handle!(
    /// A payload buffer owned by the native library.
    RawPayload
);
define_handle!(
    /// A performance counters block owned by the native library.
    RawMetrics
);
