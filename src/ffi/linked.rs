//! Bindings to the real native library, resolved at link time.

use std::os::raw::{c_char, c_int, c_void};

use super::handles::{RawClient, RawMetrics, RawPayload};
use super::library::NativeLibrary;
use super::raw::{RawError, ResponseCallback};

extern "C" {
    fn rsocket_go_init() -> c_int;
    fn rsocket_go_get_version() -> *mut c_char;
    fn rsocket_go_get_supported_transports() -> *mut c_char;
    fn rsocket_go_free_string(s: *mut c_char);
    fn rsocket_go_validate_tcp_address(addr: *const c_char) -> c_int;
    fn rsocket_go_validate_websocket_url(url: *const c_char) -> c_int;

    fn rsocket_go_client_create() -> *mut RawClient;
    fn rsocket_go_client_connect_tcp(client: *mut RawClient, addr: *const c_char) -> c_int;
    fn rsocket_go_client_connect_websocket(client: *mut RawClient, url: *const c_char) -> c_int;
    fn rsocket_go_client_is_connected(client: *const RawClient) -> c_int;
    fn rsocket_go_client_request_response(
        client: *mut RawClient,
        payload: *mut RawPayload,
        callback: ResponseCallback,
        user_data: *mut c_void,
    ) -> c_int;
    fn rsocket_go_client_fire_and_forget(client: *mut RawClient, payload: *mut RawPayload)
        -> c_int;
    fn rsocket_go_client_free(client: *mut RawClient);

    fn rsocket_go_payload_create_from_string(
        data: *const c_char,
        metadata: *const c_char,
    ) -> *mut RawPayload;
    fn rsocket_go_payload_create(
        data: *const u8,
        data_len: usize,
        metadata: *const u8,
        metadata_len: usize,
    ) -> *mut RawPayload;
    fn rsocket_go_payload_get_data_length(payload: *const RawPayload) -> usize;
    fn rsocket_go_payload_get_metadata_length(payload: *const RawPayload) -> usize;
    fn rsocket_go_payload_copy_data(payload: *const RawPayload, buf: *mut u8, len: usize) -> usize;
    fn rsocket_go_payload_copy_metadata(
        payload: *const RawPayload,
        buf: *mut u8,
        len: usize,
    ) -> usize;
    fn rsocket_go_payload_free(payload: *mut RawPayload);

    fn rsocket_go_performance_metrics_create() -> *mut RawMetrics;
    fn rsocket_go_performance_metrics_record_request(metrics: *mut RawMetrics, bytes_sent: usize);
    fn rsocket_go_performance_metrics_record_response(
        metrics: *mut RawMetrics,
        bytes_received: usize,
    );
    fn rsocket_go_performance_metrics_record_error(metrics: *mut RawMetrics);
    fn rsocket_go_performance_metrics_get_request_count(metrics: *const RawMetrics) -> u64;
    fn rsocket_go_performance_metrics_get_response_count(metrics: *const RawMetrics) -> u64;
    fn rsocket_go_performance_metrics_get_error_count(metrics: *const RawMetrics) -> u64;
    fn rsocket_go_performance_metrics_get_bytes_sent(metrics: *const RawMetrics) -> u64;
    fn rsocket_go_performance_metrics_get_bytes_received(metrics: *const RawMetrics) -> u64;
    fn rsocket_go_performance_metrics_get_uptime_seconds(metrics: *const RawMetrics) -> u64;
    fn rsocket_go_performance_metrics_free(metrics: *mut RawMetrics);

    fn rsocket_go_error_free(error: *mut RawError);
}

/// The native library linked into the final binary (see `build.rs`).
pub struct Linked;

unsafe impl NativeLibrary for Linked {
    unsafe fn init() -> c_int {
        rsocket_go_init()
    }

    unsafe fn get_version() -> *mut c_char {
        rsocket_go_get_version()
    }

    unsafe fn get_supported_transports() -> *mut c_char {
        rsocket_go_get_supported_transports()
    }

    unsafe fn free_string(s: *mut c_char) {
        rsocket_go_free_string(s)
    }

    unsafe fn validate_tcp_address(addr: *const c_char) -> c_int {
        rsocket_go_validate_tcp_address(addr)
    }

    unsafe fn validate_websocket_url(url: *const c_char) -> c_int {
        rsocket_go_validate_websocket_url(url)
    }

    unsafe fn client_create() -> *mut RawClient {
        rsocket_go_client_create()
    }

    unsafe fn client_connect_tcp(client: *mut RawClient, addr: *const c_char) -> c_int {
        rsocket_go_client_connect_tcp(client, addr)
    }

    unsafe fn client_connect_websocket(client: *mut RawClient, url: *const c_char) -> c_int {
        rsocket_go_client_connect_websocket(client, url)
    }

    unsafe fn client_is_connected(client: *const RawClient) -> c_int {
        rsocket_go_client_is_connected(client)
    }

    unsafe fn client_request_response(
        client: *mut RawClient,
        payload: *mut RawPayload,
        callback: ResponseCallback,
        context: *mut c_void,
    ) -> c_int {
        rsocket_go_client_request_response(client, payload, callback, context)
    }

    unsafe fn client_fire_and_forget(client: *mut RawClient, payload: *mut RawPayload) -> c_int {
        rsocket_go_client_fire_and_forget(client, payload)
    }

    unsafe fn client_free(client: *mut RawClient) {
        rsocket_go_client_free(client)
    }

    unsafe fn payload_create_from_string(
        data: *const c_char,
        metadata: *const c_char,
    ) -> *mut RawPayload {
        rsocket_go_payload_create_from_string(data, metadata)
    }

    unsafe fn payload_create(
        data: *const u8,
        data_len: usize,
        metadata: *const u8,
        metadata_len: usize,
    ) -> *mut RawPayload {
        rsocket_go_payload_create(data, data_len, metadata, metadata_len)
    }

    unsafe fn payload_get_data_length(payload: *const RawPayload) -> usize {
        rsocket_go_payload_get_data_length(payload)
    }

    unsafe fn payload_get_metadata_length(payload: *const RawPayload) -> usize {
        rsocket_go_payload_get_metadata_length(payload)
    }

    unsafe fn payload_copy_data(payload: *const RawPayload, buf: *mut u8, len: usize) -> usize {
        rsocket_go_payload_copy_data(payload, buf, len)
    }

    unsafe fn payload_copy_metadata(
        payload: *const RawPayload,
        buf: *mut u8,
        len: usize,
    ) -> usize {
        rsocket_go_payload_copy_metadata(payload, buf, len)
    }

    unsafe fn payload_free(payload: *mut RawPayload) {
        rsocket_go_payload_free(payload)
    }

    unsafe fn metrics_create() -> *mut RawMetrics {
        rsocket_go_performance_metrics_create()
    }

    unsafe fn metrics_record_request(metrics: *mut RawMetrics, bytes_sent: usize) {
        rsocket_go_performance_metrics_record_request(metrics, bytes_sent)
    }

    unsafe fn metrics_record_response(metrics: *mut RawMetrics, bytes_received: usize) {
        rsocket_go_performance_metrics_record_response(metrics, bytes_received)
    }

    unsafe fn metrics_record_error(metrics: *mut RawMetrics) {
        rsocket_go_performance_metrics_record_error(metrics)
    }

    unsafe fn metrics_get_request_count(metrics: *const RawMetrics) -> u64 {
        rsocket_go_performance_metrics_get_request_count(metrics)
    }

    unsafe fn metrics_get_response_count(metrics: *const RawMetrics) -> u64 {
        rsocket_go_performance_metrics_get_response_count(metrics)
    }

    unsafe fn metrics_get_error_count(metrics: *const RawMetrics) -> u64 {
        rsocket_go_performance_metrics_get_error_count(metrics)
    }

    unsafe fn metrics_get_bytes_sent(metrics: *const RawMetrics) -> u64 {
        rsocket_go_performance_metrics_get_bytes_sent(metrics)
    }

    unsafe fn metrics_get_bytes_received(metrics: *const RawMetrics) -> u64 {
        rsocket_go_performance_metrics_get_bytes_received(metrics)
    }

    unsafe fn metrics_get_uptime_seconds(metrics: *const RawMetrics) -> u64 {
        rsocket_go_performance_metrics_get_uptime_seconds(metrics)
    }

    unsafe fn metrics_free(metrics: *mut RawMetrics) {
        rsocket_go_performance_metrics_free(metrics)
    }

    unsafe fn error_free(error: *mut RawError) {
        rsocket_go_error_free(error)
    }
}
