//! In-process implementation of the native surface.
//!
//! [`Loopback`] stands in for the native transport library in tests and local
//! development. Requests never leave the process: a small pool of worker
//! threads answers them, so completions arrive on foreign threads exactly as
//! they would from the real library.
//!
//! The [`Behavior`] parameter decides which calls succeed and what a request
//! is answered with. The default, [`Echo`], admits everything and sends every
//! request back unchanged.
//!
//! Every handle handed out is tracked. A call on a handle that was freed or
//! never issued is not executed; it is counted instead and reported by
//! [`handle_violations`].

use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::marker::PhantomData;
use std::net::SocketAddr;
use std::os::raw::{c_char, c_int, c_void};
use std::ptr;
use std::slice;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use parking_lot::{Mutex, MutexGuard};

use crate::ffi::{
    NativeLibrary, RawClient, RawError, RawMetrics, RawPayload, ResponseCallback, NATIVE_TRUE,
    STATUS_FAILED, STATUS_OK,
};
use crate::types::Transport;

const WORKERS: usize = 4;
const NATIVE_FALSE: c_int = 0;
const SUPPORTED_TRANSPORTS: &str = "tcp,websocket";

/// Kind of a handle issued by the loopback library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    Client,
    Payload,
    Metrics,
    Error,
    String,
}

/// A native call a [`Behavior`] may refuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeCall {
    Init,
    ClientCreate,
    Connect(Transport),
    RequestResponse,
    FireAndForget,
    PayloadCreate,
    MetricsCreate,
}

/// How a request is answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Send the request back unchanged.
    Echo,
    /// Answer with the given payload.
    Data {
        data: Vec<u8>,
        metadata: Option<Vec<u8>>,
    },
    /// Complete with neither a payload nor an error.
    Empty,
    /// Complete with an error.
    Error { code: i32, message: String },
}

/// Failure injection and reply policy for [`Loopback`].
pub trait Behavior: Send + Sync + 'static {
    /// Whether `call` succeeds. Refused creations return null, everything
    /// else returns a failure code.
    fn admit(_call: NativeCall) -> bool {
        true
    }

    /// Answer to an accepted request.
    fn reply(_data: &[u8], _metadata: Option<&[u8]>) -> Reply {
        Reply::Echo
    }

    /// How long a worker waits before completing a request.
    fn delay() -> Duration {
        Duration::ZERO
    }

    /// Called after a handle of this library has been freed.
    fn freed(_kind: HandleKind) {}
}

/// Admits everything and echoes every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct Echo;

impl Behavior for Echo {}

/// The loopback native library, parameterized by its [`Behavior`].
pub struct Loopback<B: Behavior = Echo>(PhantomData<B>);

struct LoopClient {
    connected: AtomicBool,
}

struct LoopPayload {
    data: Vec<u8>,
    metadata: Option<Vec<u8>>,
}

struct LoopMetrics {
    requests: AtomicU64,
    responses: AtomicU64,
    errors: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    created: Instant,
}

type Live = HashMap<usize, HandleKind>;

static VIOLATIONS: AtomicU64 = AtomicU64::new(0);

fn live() -> MutexGuard<'static, Live> {
    static LIVE: OnceLock<Mutex<Live>> = OnceLock::new();
    LIVE.get_or_init(|| Mutex::new(HashMap::new())).lock()
}

/// Calls made on freed or unknown handles, plus double frees, since process
/// start.
pub fn handle_violations() -> u64 {
    VIOLATIONS.load(Ordering::SeqCst)
}

/// Handles of every kind currently allocated.
pub fn live_handles() -> usize {
    live().len()
}

fn violation(kind: HandleKind, addr: usize, what: &'static str) {
    VIOLATIONS.fetch_add(1, Ordering::SeqCst);
    tracing::warn!(?kind, addr, what, "call on a dead or foreign handle");
}

fn check(live: &Live, addr: usize, kind: HandleKind) -> bool {
    if live.get(&addr) == Some(&kind) {
        return true;
    }
    violation(kind, addr, "use");
    false
}

fn track<T>(value: T, kind: HandleKind) -> *mut T {
    let ptr = Box::into_raw(Box::new(value));
    live().insert(ptr as usize, kind);
    ptr
}

/// Forget a tracked handle. `false` when it was not live as `kind`.
fn untrack(live: &mut Live, addr: usize, kind: HandleKind) -> bool {
    if live.get(&addr) != Some(&kind) {
        violation(kind, addr, "free");
        return false;
    }
    live.remove(&addr);
    true
}

fn new_string(value: &str) -> *mut c_char {
    match CString::new(value) {
        Ok(s) => {
            let ptr = s.into_raw();
            live().insert(ptr as usize, HandleKind::String);
            ptr
        }
        Err(_) => ptr::null_mut(),
    }
}

fn new_payload(data: Vec<u8>, metadata: Option<Vec<u8>>) -> *mut RawPayload {
    track(LoopPayload { data, metadata }, HandleKind::Payload).cast()
}

fn new_error(code: i32, message: &str) -> *mut RawError {
    let message = CString::new(message.replace('\0', " "))
        .map(|m| m.into_raw() as *const c_char)
        .unwrap_or(ptr::null());
    track(RawError { code, message }, HandleKind::Error)
}

/// Turn a reply into the pointers handed to a completion callback.
fn complete(reply: Reply) -> (*mut RawPayload, *mut RawError) {
    match reply {
        // Resolved against the request before a reply is queued.
        Reply::Echo | Reply::Empty => (ptr::null_mut(), ptr::null_mut()),
        Reply::Data { data, metadata } => (new_payload(data, metadata), ptr::null_mut()),
        Reply::Error { code, message } => (ptr::null_mut(), new_error(code, &message)),
    }
}

type Task = Box<dyn FnOnce() + Send>;

/// Worker pool answering requests; `None` if no worker could be started.
fn workers() -> Option<&'static Sender<Task>> {
    static POOL: OnceLock<Option<Sender<Task>>> = OnceLock::new();
    POOL.get_or_init(|| {
        let (tx, rx) = crossbeam_channel::unbounded::<Task>();
        let mut started = 0;
        for i in 0..WORKERS {
            let rx = rx.clone();
            let spawned = thread::Builder::new()
                .name(format!("loopback-worker-{}", i))
                .spawn(move || {
                    for task in rx.iter() {
                        task();
                    }
                });
            match spawned {
                Ok(_) => started += 1,
                Err(e) => tracing::error!(error = %e, "failed to start loopback worker"),
            }
        }
        (started > 0).then_some(tx)
    })
    .as_ref()
}

unsafe fn read_str<'a>(s: *const c_char) -> Option<&'a str> {
    if s.is_null() {
        return None;
    }
    CStr::from_ptr(s).to_str().ok()
}

fn is_tcp_address(addr: &str) -> bool {
    addr.parse::<SocketAddr>().is_ok()
}

fn is_websocket_url(url: &str) -> bool {
    url.starts_with("ws://") || url.starts_with("wss://")
}

fn flag(value: bool) -> c_int {
    if value {
        NATIVE_TRUE
    } else {
        NATIVE_FALSE
    }
}

impl<B: Behavior> Loopback<B> {
    unsafe fn connect(client: *mut RawClient, transport: Transport, valid: bool) -> c_int {
        let live = live();
        if !check(&live, client as usize, HandleKind::Client) {
            return STATUS_FAILED;
        }
        if !valid || !B::admit(NativeCall::Connect(transport)) {
            return STATUS_FAILED;
        }
        let client = &*(client as *const LoopClient);
        client.connected.store(true, Ordering::SeqCst);
        STATUS_OK
    }

    unsafe fn free_handle<T>(ptr: *mut T, kind: HandleKind) {
        if ptr.is_null() {
            return;
        }
        let freed = {
            let mut live = live();
            if untrack(&mut live, ptr as usize, kind) {
                drop(Box::from_raw(ptr));
                true
            } else {
                false
            }
        };
        if freed {
            B::freed(kind);
        }
    }

    unsafe fn metrics_update(metrics: *mut RawMetrics, update: impl FnOnce(&LoopMetrics)) {
        let live = live();
        if check(&live, metrics as usize, HandleKind::Metrics) {
            update(&*(metrics as *const LoopMetrics));
        }
    }

    unsafe fn metrics_read(metrics: *const RawMetrics, read: impl FnOnce(&LoopMetrics) -> u64) -> u64 {
        let live = live();
        if !check(&live, metrics as usize, HandleKind::Metrics) {
            return 0;
        }
        read(&*(metrics as *const LoopMetrics))
    }

    unsafe fn copy_field(
        payload: *const RawPayload,
        buf: *mut u8,
        len: usize,
        field: impl FnOnce(&LoopPayload) -> &[u8],
    ) -> usize {
        let live = live();
        if buf.is_null() || !check(&live, payload as usize, HandleKind::Payload) {
            return 0;
        }
        let bytes = field(&*(payload as *const LoopPayload));
        let n = bytes.len().min(len);
        ptr::copy_nonoverlapping(bytes.as_ptr(), buf, n);
        n
    }

    unsafe fn field_len(payload: *const RawPayload, field: impl FnOnce(&LoopPayload) -> usize) -> usize {
        let live = live();
        if !check(&live, payload as usize, HandleKind::Payload) {
            return 0;
        }
        field(&*(payload as *const LoopPayload))
    }
}

unsafe impl<B: Behavior> NativeLibrary for Loopback<B> {
    unsafe fn init() -> c_int {
        if B::admit(NativeCall::Init) {
            STATUS_OK
        } else {
            STATUS_FAILED
        }
    }

    unsafe fn get_version() -> *mut c_char {
        new_string(env!("CARGO_PKG_VERSION"))
    }

    unsafe fn get_supported_transports() -> *mut c_char {
        new_string(SUPPORTED_TRANSPORTS)
    }

    unsafe fn free_string(s: *mut c_char) {
        if s.is_null() {
            return;
        }
        let freed = {
            let mut live = live();
            if untrack(&mut live, s as usize, HandleKind::String) {
                drop(CString::from_raw(s));
                true
            } else {
                false
            }
        };
        if freed {
            B::freed(HandleKind::String);
        }
    }

    unsafe fn validate_tcp_address(addr: *const c_char) -> c_int {
        flag(read_str(addr).is_some_and(is_tcp_address))
    }

    unsafe fn validate_websocket_url(url: *const c_char) -> c_int {
        flag(read_str(url).is_some_and(is_websocket_url))
    }

    unsafe fn client_create() -> *mut RawClient {
        if !B::admit(NativeCall::ClientCreate) {
            return ptr::null_mut();
        }
        let client = LoopClient {
            connected: AtomicBool::new(false),
        };
        track(client, HandleKind::Client).cast()
    }

    unsafe fn client_connect_tcp(client: *mut RawClient, addr: *const c_char) -> c_int {
        let valid = read_str(addr).is_some_and(is_tcp_address);
        Self::connect(client, Transport::Tcp, valid)
    }

    unsafe fn client_connect_websocket(client: *mut RawClient, url: *const c_char) -> c_int {
        let valid = read_str(url).is_some_and(is_websocket_url);
        Self::connect(client, Transport::WebSocket, valid)
    }

    unsafe fn client_is_connected(client: *const RawClient) -> c_int {
        let live = live();
        if !check(&live, client as usize, HandleKind::Client) {
            return NATIVE_FALSE;
        }
        let client = &*(client as *const LoopClient);
        flag(client.connected.load(Ordering::SeqCst))
    }

    unsafe fn client_request_response(
        client: *mut RawClient,
        payload: *mut RawPayload,
        callback: ResponseCallback,
        context: *mut c_void,
    ) -> c_int {
        let reply = {
            let live = live();
            if !check(&live, client as usize, HandleKind::Client)
                || !check(&live, payload as usize, HandleKind::Payload)
            {
                return STATUS_FAILED;
            }
            let client = &*(client as *const LoopClient);
            if !client.connected.load(Ordering::SeqCst) || !B::admit(NativeCall::RequestResponse) {
                return STATUS_FAILED;
            }
            // The request payload is not retained past this call.
            let request = &*(payload as *const LoopPayload);
            match B::reply(&request.data, request.metadata.as_deref()) {
                Reply::Echo => Reply::Data {
                    data: request.data.clone(),
                    metadata: request.metadata.clone(),
                },
                other => other,
            }
        };

        let Some(pool) = workers() else {
            return STATUS_FAILED;
        };

        let context = context as usize;
        let delay = B::delay();
        let task: Task = Box::new(move || {
            if !delay.is_zero() {
                thread::sleep(delay);
            }
            let (response, error) = complete(reply);
            unsafe { callback(response, error, context as *mut c_void) };
        });

        match pool.send(task) {
            Ok(()) => STATUS_OK,
            Err(_) => STATUS_FAILED,
        }
    }

    unsafe fn client_fire_and_forget(client: *mut RawClient, payload: *mut RawPayload) -> c_int {
        let live = live();
        if !check(&live, client as usize, HandleKind::Client)
            || !check(&live, payload as usize, HandleKind::Payload)
        {
            return STATUS_FAILED;
        }
        let client = &*(client as *const LoopClient);
        if !client.connected.load(Ordering::SeqCst) || !B::admit(NativeCall::FireAndForget) {
            return STATUS_FAILED;
        }
        STATUS_OK
    }

    unsafe fn client_free(client: *mut RawClient) {
        Self::free_handle(client.cast::<LoopClient>(), HandleKind::Client);
    }

    unsafe fn payload_create_from_string(
        data: *const c_char,
        metadata: *const c_char,
    ) -> *mut RawPayload {
        if data.is_null() || !B::admit(NativeCall::PayloadCreate) {
            return ptr::null_mut();
        }
        let data = CStr::from_ptr(data).to_bytes().to_vec();
        let metadata = (!metadata.is_null()).then(|| CStr::from_ptr(metadata).to_bytes().to_vec());
        new_payload(data, metadata)
    }

    unsafe fn payload_create(
        data: *const u8,
        data_len: usize,
        metadata: *const u8,
        metadata_len: usize,
    ) -> *mut RawPayload {
        if !B::admit(NativeCall::PayloadCreate) {
            return ptr::null_mut();
        }
        let data = if data.is_null() {
            if data_len != 0 {
                return ptr::null_mut();
            }
            Vec::new()
        } else {
            slice::from_raw_parts(data, data_len).to_vec()
        };
        let metadata = (!metadata.is_null()).then(|| slice::from_raw_parts(metadata, metadata_len).to_vec());
        new_payload(data, metadata)
    }

    unsafe fn payload_get_data_length(payload: *const RawPayload) -> usize {
        Self::field_len(payload, |p| p.data.len())
    }

    unsafe fn payload_get_metadata_length(payload: *const RawPayload) -> usize {
        Self::field_len(payload, |p| p.metadata.as_ref().map_or(0, Vec::len))
    }

    unsafe fn payload_copy_data(payload: *const RawPayload, buf: *mut u8, len: usize) -> usize {
        Self::copy_field(payload, buf, len, |p| p.data.as_slice())
    }

    unsafe fn payload_copy_metadata(payload: *const RawPayload, buf: *mut u8, len: usize) -> usize {
        Self::copy_field(payload, buf, len, |p| p.metadata.as_deref().unwrap_or(&[]))
    }

    unsafe fn payload_free(payload: *mut RawPayload) {
        Self::free_handle(payload.cast::<LoopPayload>(), HandleKind::Payload);
    }

    unsafe fn metrics_create() -> *mut RawMetrics {
        if !B::admit(NativeCall::MetricsCreate) {
            return ptr::null_mut();
        }
        let metrics = LoopMetrics {
            requests: AtomicU64::new(0),
            responses: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            created: Instant::now(),
        };
        track(metrics, HandleKind::Metrics).cast()
    }

    unsafe fn metrics_record_request(metrics: *mut RawMetrics, bytes_sent: usize) {
        Self::metrics_update(metrics, |m| {
            m.requests.fetch_add(1, Ordering::Relaxed);
            m.bytes_sent.fetch_add(bytes_sent as u64, Ordering::Relaxed);
        });
    }

    unsafe fn metrics_record_response(metrics: *mut RawMetrics, bytes_received: usize) {
        Self::metrics_update(metrics, |m| {
            m.responses.fetch_add(1, Ordering::Relaxed);
            m.bytes_received.fetch_add(bytes_received as u64, Ordering::Relaxed);
        });
    }

    unsafe fn metrics_record_error(metrics: *mut RawMetrics) {
        Self::metrics_update(metrics, |m| {
            m.errors.fetch_add(1, Ordering::Relaxed);
        });
    }

    unsafe fn metrics_get_request_count(metrics: *const RawMetrics) -> u64 {
        Self::metrics_read(metrics, |m| m.requests.load(Ordering::Relaxed))
    }

    unsafe fn metrics_get_response_count(metrics: *const RawMetrics) -> u64 {
        Self::metrics_read(metrics, |m| m.responses.load(Ordering::Relaxed))
    }

    unsafe fn metrics_get_error_count(metrics: *const RawMetrics) -> u64 {
        Self::metrics_read(metrics, |m| m.errors.load(Ordering::Relaxed))
    }

    unsafe fn metrics_get_bytes_sent(metrics: *const RawMetrics) -> u64 {
        Self::metrics_read(metrics, |m| m.bytes_sent.load(Ordering::Relaxed))
    }

    unsafe fn metrics_get_bytes_received(metrics: *const RawMetrics) -> u64 {
        Self::metrics_read(metrics, |m| m.bytes_received.load(Ordering::Relaxed))
    }

    unsafe fn metrics_get_uptime_seconds(metrics: *const RawMetrics) -> u64 {
        Self::metrics_read(metrics, |m| m.created.elapsed().as_secs())
    }

    unsafe fn metrics_free(metrics: *mut RawMetrics) {
        Self::free_handle(metrics.cast::<LoopMetrics>(), HandleKind::Metrics);
    }

    unsafe fn error_free(error: *mut RawError) {
        if error.is_null() {
            return;
        }
        let freed = {
            let mut live = live();
            if untrack(&mut live, error as usize, HandleKind::Error) {
                let error = Box::from_raw(error);
                if !error.message.is_null() {
                    drop(CString::from_raw(error.message as *mut c_char));
                }
                true
            } else {
                false
            }
        };
        if freed {
            B::freed(HandleKind::Error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{self, response_trampoline, CallId, RawCompletion};
    use crate::error::Error;
    use std::sync::atomic::AtomicUsize;

    struct CountOrphans;
    static ORPHAN_PAYLOADS: AtomicUsize = AtomicUsize::new(0);
    static ORPHAN_ERRORS: AtomicUsize = AtomicUsize::new(0);

    impl Behavior for CountOrphans {
        fn freed(kind: HandleKind) {
            match kind {
                HandleKind::Payload => ORPHAN_PAYLOADS.fetch_add(1, Ordering::SeqCst),
                HandleKind::Error => ORPHAN_ERRORS.fetch_add(1, Ordering::SeqCst),
                _ => 0,
            };
        }
    }

    struct CountErrorWins;
    static ERROR_WINS_PAYLOADS: AtomicUsize = AtomicUsize::new(0);
    static ERROR_WINS_ERRORS: AtomicUsize = AtomicUsize::new(0);

    impl Behavior for CountErrorWins {
        fn freed(kind: HandleKind) {
            match kind {
                HandleKind::Payload => ERROR_WINS_PAYLOADS.fetch_add(1, Ordering::SeqCst),
                HandleKind::Error => ERROR_WINS_ERRORS.fetch_add(1, Ordering::SeqCst),
                _ => 0,
            };
        }
    }

    fn payload_and_error(code: i32) -> (*mut RawPayload, *mut RawError) {
        let (response, _) = complete(Reply::Data {
            data: b"late".to_vec(),
            metadata: None,
        });
        let (_, error) = complete(Reply::Error {
            code,
            message: "boom".to_string(),
        });
        (response, error)
    }

    #[test]
    fn test_orphaned_completion_is_freed() {
        type L = Loopback<CountOrphans>;

        // Slot index far beyond any registry capacity.
        let unknown = CallId::from_raw(usize::MAX).unwrap();
        let (response, error) = payload_and_error(7);
        unsafe { response_trampoline::<L>(response, error, unknown.into_context()) };

        let (response, error) = payload_and_error(8);
        unsafe { response_trampoline::<L>(response, error, ptr::null_mut()) };

        assert_eq!(ORPHAN_PAYLOADS.load(Ordering::SeqCst), 2);
        assert_eq!(ORPHAN_ERRORS.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_error_wins_over_response() {
        type L = Loopback<CountErrorWins>;

        let (tx, rx) = crossbeam_channel::bounded(1);
        let id = bridge::registry()
            .store(Box::new(move |completion: RawCompletion| {
                let result = unsafe { completion.into_result::<L>() };
                tx.send(result.map(|p| p.is_some())).unwrap();
            }))
            .unwrap();

        let (response, error) = payload_and_error(42);
        unsafe { response_trampoline::<L>(response, error, id.into_context()) };

        match rx.recv().unwrap() {
            Err(Error::RequestFailed { code, message }) => {
                assert_eq!(code, 42);
                assert_eq!(message, "boom");
            }
            other => panic!("expected a request failure, got {other:?}"),
        }
        assert_eq!(ERROR_WINS_PAYLOADS.load(Ordering::SeqCst), 1);
        assert_eq!(ERROR_WINS_ERRORS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_foreign_handle_is_not_touched() {
        type L = Loopback;

        // A stack address can never collide with a live heap handle.
        let mut foreign = 0u64;
        let client = (&mut foreign as *mut u64).cast::<RawClient>();

        let before = handle_violations();
        unsafe {
            assert_eq!(L::client_is_connected(client), NATIVE_FALSE);
            L::client_free(client);
        }
        assert!(handle_violations() >= before + 2);
        assert_eq!(foreign, 0);
    }

    #[test]
    fn test_validators() {
        assert!(is_tcp_address("127.0.0.1:7878"));
        assert!(is_tcp_address("[::1]:80"));
        assert!(!is_tcp_address("invalid"));
        assert!(!is_tcp_address("localhost:80"));
        assert!(is_websocket_url("ws://localhost:8080"));
        assert!(is_websocket_url("wss://example.com/socket"));
        assert!(!is_websocket_url("http://localhost"));
    }
}
