//! The native function surface as a Rust trait.

use std::os::raw::{c_char, c_int, c_void};

use super::handles::{RawClient, RawMetrics, RawPayload};
use super::raw::{RawError, ResponseCallback};

/// The C-ABI surface of a native RSocket transport library.
///
/// Every method maps one-to-one onto an exported C function. Implementors are
/// zero-sized marker types; the safe wrappers are generic over them so that
/// each library gets its own monomorphized completion trampoline.
///
/// # Safety
///
/// Implementors promise the contract the safe layer relies on:
///
/// - creation functions return either null or a handle that stays valid until
///   the matching `*_free` function is called on it;
/// - `client_request_response` returning [`STATUS_OK`](super::STATUS_OK)
///   means the callback will be invoked exactly once with the supplied
///   context; any other return value means it will never be invoked;
/// - the callback is not invoked synchronously from inside
///   `client_request_response` on the calling thread;
/// - a response payload and an error passed to the callback are owned by the
///   receiver;
/// - a payload passed to `client_request_response` or
///   `client_fire_and_forget` is not retained past the call's return;
/// - a failed connect leaves the client handle valid and destroyable.
pub unsafe trait NativeLibrary: Send + Sync + 'static {
    unsafe fn init() -> c_int;
    unsafe fn get_version() -> *mut c_char;
    unsafe fn get_supported_transports() -> *mut c_char;
    unsafe fn free_string(s: *mut c_char);
    unsafe fn validate_tcp_address(addr: *const c_char) -> c_int;
    unsafe fn validate_websocket_url(url: *const c_char) -> c_int;

    unsafe fn client_create() -> *mut RawClient;
    unsafe fn client_connect_tcp(client: *mut RawClient, addr: *const c_char) -> c_int;
    unsafe fn client_connect_websocket(client: *mut RawClient, url: *const c_char) -> c_int;
    unsafe fn client_is_connected(client: *const RawClient) -> c_int;
    unsafe fn client_request_response(
        client: *mut RawClient,
        payload: *mut RawPayload,
        callback: ResponseCallback,
        context: *mut c_void,
    ) -> c_int;
    unsafe fn client_fire_and_forget(client: *mut RawClient, payload: *mut RawPayload) -> c_int;
    unsafe fn client_free(client: *mut RawClient);

    unsafe fn payload_create_from_string(
        data: *const c_char,
        metadata: *const c_char,
    ) -> *mut RawPayload;
    unsafe fn payload_create(
        data: *const u8,
        data_len: usize,
        metadata: *const u8,
        metadata_len: usize,
    ) -> *mut RawPayload;
    unsafe fn payload_get_data_length(payload: *const RawPayload) -> usize;
    unsafe fn payload_get_metadata_length(payload: *const RawPayload) -> usize;
    unsafe fn payload_copy_data(payload: *const RawPayload, buf: *mut u8, len: usize) -> usize;
    unsafe fn payload_copy_metadata(payload: *const RawPayload, buf: *mut u8, len: usize)
        -> usize;
    unsafe fn payload_free(payload: *mut RawPayload);

    unsafe fn metrics_create() -> *mut RawMetrics;
    unsafe fn metrics_record_request(metrics: *mut RawMetrics, bytes_sent: usize);
    unsafe fn metrics_record_response(metrics: *mut RawMetrics, bytes_received: usize);
    unsafe fn metrics_record_error(metrics: *mut RawMetrics);
    unsafe fn metrics_get_request_count(metrics: *const RawMetrics) -> u64;
    unsafe fn metrics_get_response_count(metrics: *const RawMetrics) -> u64;
    unsafe fn metrics_get_error_count(metrics: *const RawMetrics) -> u64;
    unsafe fn metrics_get_bytes_sent(metrics: *const RawMetrics) -> u64;
    unsafe fn metrics_get_bytes_received(metrics: *const RawMetrics) -> u64;
    unsafe fn metrics_get_uptime_seconds(metrics: *const RawMetrics) -> u64;
    unsafe fn metrics_free(metrics: *mut RawMetrics);

    unsafe fn error_free(error: *mut RawError);
}
