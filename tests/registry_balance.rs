//! Completion registry accounting.
//!
//! Kept in its own test binary: it configures the process-wide registry and
//! reads its global counters, which other tests would disturb.

#![cfg(feature = "loopback")]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rsocket_bridge::loopback::{Behavior, Loopback};
use rsocket_bridge::{pending_calls, runtime, Client, Config, Error, Payload};

struct Held;

impl Behavior for Held {
    fn delay() -> Duration {
        Duration::from_millis(200)
    }
}

type L = Loopback<Held>;

fn wait_for_idle() {
    let deadline = Instant::now() + Duration::from_secs(10);
    while pending_calls() != 0 {
        assert!(Instant::now() < deadline, "calls still pending: {}", pending_calls());
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn test_registry_capacity_and_balance() {
    runtime::init_with::<L>(&Config { max_pending_calls: 4 }).expect("init should succeed");
    assert_eq!(rsocket_bridge::max_pending_calls(), 4);
    assert_eq!(pending_calls(), 0);

    let client = Client::<L>::new().unwrap();
    client.connect_tcp("127.0.0.1:7878").unwrap();
    let payload = Payload::<L>::from_text("held", None).unwrap();
    let completed = Arc::new(AtomicUsize::new(0));

    for _ in 0..4 {
        let completed = completed.clone();
        client
            .request_response(&payload, move |_| {
                completed.fetch_add(1, Ordering::SeqCst);
            })
            .expect("within capacity");
    }
    assert_eq!(pending_calls(), 4);

    let err = client
        .request_response(&payload, |_| panic!("handler must not run"))
        .expect_err("registry is full");
    assert!(
        matches!(err, Error::TooManyPending { capacity: 4 }),
        "expected TooManyPending, got {:?}",
        err
    );
    assert_eq!(pending_calls(), 4, "a refused call leaves nothing behind");

    wait_for_idle();
    assert_eq!(completed.load(Ordering::SeqCst), 4);

    // Slots are reused once calls complete.
    for round in 0..10 {
        let response = client
            .request_response_blocking(&payload, Duration::from_secs(10))
            .unwrap_or_else(|e| panic!("round {} failed: {:?}", round, e));
        assert!(response.is_some());
        assert_eq!(pending_calls(), 0);
    }

    // A rejected call is cleaned up synchronously.
    client.close();
    let unconnected = Client::<L>::new().unwrap();
    let err = unconnected
        .request_response(&payload, |_| panic!("handler must not run"))
        .unwrap_err();
    assert!(err.is_rejected());
    assert_eq!(pending_calls(), 0);
}
