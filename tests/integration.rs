//! Handle lifecycle and completion bridge tests.
//!
//! These tests run against the in-process loopback library, which counts any
//! call made on a handle that was already freed. Every test here expects that
//! count to stay at zero.

#![cfg(feature = "loopback")]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rsocket_bridge::loopback::{self, Behavior, Echo, HandleKind, Loopback, NativeCall};
use rsocket_bridge::{Client, ConnectionState, Error, Metrics, Payload};

const WAIT: Duration = Duration::from_secs(10);

fn assert_no_violations() {
    assert_eq!(
        loopback::handle_violations(),
        0,
        "a native call was issued on a freed handle"
    );
}

fn wait_until(what: &str, done: impl Fn() -> bool) {
    let deadline = Instant::now() + WAIT;
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        thread::sleep(Duration::from_millis(5));
    }
}

struct NoClients;

impl Behavior for NoClients {
    fn admit(call: NativeCall) -> bool {
        !matches!(
            call,
            NativeCall::ClientCreate | NativeCall::PayloadCreate | NativeCall::MetricsCreate
        )
    }
}

#[test]
fn test_null_creation_is_an_error() {
    let err = Client::<Loopback<NoClients>>::new().expect_err("client_create returns null");
    assert!(
        matches!(err, Error::NullHandle("client")),
        "expected a null client handle error, got {:?}",
        err
    );

    let err = Payload::<Loopback<NoClients>>::from_text("x", None).unwrap_err();
    assert!(matches!(err, Error::NullHandle("payload")));

    let err = Payload::<Loopback<NoClients>>::from_bytes(b"x", None).unwrap_err();
    assert!(matches!(err, Error::NullHandle("payload")));

    let err = Metrics::<Loopback<NoClients>>::new().unwrap_err();
    assert!(matches!(err, Error::NullHandle("metrics")));
}

struct CountSends;
static SENDS: AtomicUsize = AtomicUsize::new(0);

impl Behavior for CountSends {
    fn admit(call: NativeCall) -> bool {
        if matches!(call, NativeCall::FireAndForget | NativeCall::RequestResponse) {
            SENDS.fetch_add(1, Ordering::SeqCst);
        }
        true
    }
}

#[test]
fn test_released_payload_is_rejected_before_native() {
    type L = Loopback<CountSends>;

    let client = Client::<L>::new().unwrap();
    client.connect_tcp("127.0.0.1:7878").unwrap();
    let payload = Payload::<L>::from_text("gone", None).unwrap();
    payload.release();

    let err = client.fire_and_forget(&payload).unwrap_err();
    assert!(err.is_invalid_argument(), "got {:?}", err);

    let err = client
        .request_response(&payload, |_| panic!("handler must not run"))
        .unwrap_err();
    assert!(err.is_invalid_argument(), "got {:?}", err);

    assert_eq!(SENDS.load(Ordering::SeqCst), 0, "native layer was reached");
    assert_no_violations();
}

struct CountFrees;
static CLIENT_FREES: AtomicUsize = AtomicUsize::new(0);
static PAYLOAD_FREES: AtomicUsize = AtomicUsize::new(0);
static METRICS_FREES: AtomicUsize = AtomicUsize::new(0);

impl Behavior for CountFrees {
    fn freed(kind: HandleKind) {
        let counter = match kind {
            HandleKind::Client => &CLIENT_FREES,
            HandleKind::Payload => &PAYLOAD_FREES,
            HandleKind::Metrics => &METRICS_FREES,
            _ => return,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_each_handle_freed_exactly_once() {
    type L = Loopback<CountFrees>;

    let client = Client::<L>::new().unwrap();
    client.connect_tcp("127.0.0.1:7878").unwrap();
    let request = Payload::<L>::from_bytes(b"once", Some(b"meta")).unwrap();
    let metrics = Metrics::<L>::new().unwrap();

    // The response payload is dropped by the blocking helper's caller.
    let response = client.request_response_blocking(&request, WAIT).unwrap();
    assert!(response.is_some());
    drop(response);
    assert_eq!(PAYLOAD_FREES.load(Ordering::SeqCst), 1);

    client.close();
    request.release();
    metrics.release();
    drop(client);
    drop(request);
    drop(metrics);

    assert_eq!(CLIENT_FREES.load(Ordering::SeqCst), 1);
    assert_eq!(PAYLOAD_FREES.load(Ordering::SeqCst), 2);
    assert_eq!(METRICS_FREES.load(Ordering::SeqCst), 1);
    assert_no_violations();
}

struct RefuseRequests;

impl Behavior for RefuseRequests {
    fn admit(call: NativeCall) -> bool {
        call != NativeCall::RequestResponse
    }
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[test]
fn test_rejected_request_drops_handler() {
    type L = Loopback<RefuseRequests>;

    let client = Client::<L>::new().unwrap();
    client.connect_tcp("127.0.0.1:7878").unwrap();
    let payload = Payload::<L>::from_text("no", None).unwrap();

    let dropped = Arc::new(AtomicBool::new(false));
    let invoked = Arc::new(AtomicBool::new(false));
    let flag = DropFlag(dropped.clone());
    let ran = invoked.clone();

    let err = client
        .request_response(&payload, move |_| {
            let _flag = &flag;
            ran.store(true, Ordering::SeqCst);
        })
        .unwrap_err();

    assert!(err.is_rejected(), "expected a rejection, got {:?}", err);
    assert!(dropped.load(Ordering::SeqCst), "handler was not released");
    assert!(!invoked.load(Ordering::SeqCst), "handler ran for a rejected call");
    assert_no_violations();
}

#[test]
fn test_panicking_handler_is_contained() {
    let client = Client::<Loopback>::new().unwrap();
    client.connect_tcp("127.0.0.1:7878").unwrap();
    let payload = Payload::<Loopback>::from_text("boom", None).unwrap();

    client
        .request_response(&payload, |_| panic!("handler panic"))
        .unwrap();

    // Later completions are still delivered.
    let response = client.request_response_blocking(&payload, WAIT).unwrap();
    assert_eq!(response.unwrap().data_string().unwrap(), "boom");
    assert_no_violations();
}

struct Jittery;

impl Behavior for Jittery {
    fn delay() -> Duration {
        Duration::from_millis(1)
    }
}

#[test]
fn test_release_races_in_flight_calls() {
    type L = Loopback<Jittery>;

    let client = Arc::new(Client::<L>::new().unwrap());
    client.connect_tcp("127.0.0.1:7878").unwrap();
    let payload = Arc::new(Payload::<L>::from_text("race", Some("meta")).unwrap());

    let accepted = Arc::new(AtomicUsize::new(0));
    let completed = Arc::new(AtomicUsize::new(0));

    let issuers: Vec<_> = (0..8)
        .map(|_| {
            let client = client.clone();
            let payload = payload.clone();
            let accepted = accepted.clone();
            let completed = completed.clone();
            thread::spawn(move || {
                for _ in 0..200 {
                    let completed = completed.clone();
                    let sent = client.request_response(&payload, move |response| {
                        if let Ok(Some(p)) = response {
                            let _ = p.data();
                        }
                        completed.fetch_add(1, Ordering::SeqCst);
                    });
                    match sent {
                        Ok(()) => {
                            accepted.fetch_add(1, Ordering::SeqCst);
                        }
                        Err(Error::Closed) | Err(Error::InvalidArgument(_)) => {}
                        Err(other) => panic!("unexpected error: {:?}", other),
                    }
                    let _ = client.fire_and_forget(&payload);
                    let _ = client.is_connected();
                    let _ = payload.data_len();
                }
            })
        })
        .collect();

    let releaser = {
        let client = client.clone();
        let payload = payload.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(5));
            payload.release();
            client.close();
        })
    };

    for issuer in issuers {
        issuer.join().unwrap();
    }
    releaser.join().unwrap();

    assert!(payload.is_released());
    assert_eq!(client.state(), ConnectionState::Closed);

    let accepted = accepted.load(Ordering::SeqCst);
    wait_until("in-flight completions", || {
        completed.load(Ordering::SeqCst) == accepted
    });
    assert_eq!(completed.load(Ordering::SeqCst), accepted);
    assert_no_violations();
}

#[test]
fn test_drop_wrappers_with_calls_in_flight() {
    let completed = Arc::new(AtomicUsize::new(0));
    {
        let client = Client::<Loopback<Jittery>>::new().unwrap();
        client.connect_tcp("127.0.0.1:7878").unwrap();
        for i in 0..50 {
            let payload = Payload::<Loopback<Jittery>>::from_text(&i.to_string(), None).unwrap();
            let completed = completed.clone();
            client
                .request_response(&payload, move |response| {
                    assert!(response.is_ok());
                    completed.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
            // Payload dropped here, before its response arrives.
        }
        // Client dropped here.
    }
    wait_until("completions after drop", || {
        completed.load(Ordering::SeqCst) == 50
    });
    assert_no_violations();
}

#[test]
fn test_default_echo_is_the_default_behavior() {
    let client = Client::<Loopback<Echo>>::new().unwrap();
    client.connect_websocket("wss://127.0.0.1:7879/rs").unwrap();
    let payload = Payload::<Loopback<Echo>>::from_bytes(&[], None).unwrap();
    let response = client.request_response_blocking(&payload, WAIT).unwrap();
    let response = response.expect("echo of an empty payload is still a payload");
    assert!(response.data().unwrap().is_empty());
    assert!(response.metadata().unwrap().is_empty());
}
