//! Rust bindings for the RSocket native transport library.
//!
//! This crate provides a safe Rust interface over the library's C surface:
//! client connections over stream sockets or web-socket framing,
//! request-response and fire-and-forget interactions, payload buffers, and
//! performance counters.
//!
//! Request-response completions arrive on a thread owned by the native
//! library. Each completion is routed back to the closure that issued the
//! request, exactly once. Native handles are freed exactly once, either by an
//! explicit `close`/`release` or on drop, and never while a call that uses
//! them is in flight.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use rsocket_bridge::{Client, Payload};
//!
//! fn main() -> rsocket_bridge::Result<()> {
//!     // Initialize the library
//!     rsocket_bridge::init()?;
//!     println!("native library {}", rsocket_bridge::version());
//!
//!     // Connect
//!     let client: Client = Client::new()?;
//!     client.connect_tcp("127.0.0.1:7878")?;
//!
//!     // Asynchronous request-response
//!     let request = Payload::from_text("ping", Some("route.echo"))?;
//!     client.request_response(&request, |response| match response {
//!         Ok(Some(payload)) => println!("reply: {}", payload.data_string().unwrap_or_default()),
//!         Ok(None) => println!("empty reply"),
//!         Err(e) => eprintln!("request failed: {e}"),
//!     })?;
//!
//!     // Or wait for the answer
//!     let reply = client.request_response_blocking(&request, Duration::from_secs(5))?;
//!     println!("{:?}", reply);
//!
//!     client.close();
//!     Ok(())
//! }
//! ```
//!
//! # Native library
//!
//! No native library is selected by default; a dependent enables one feature:
//!
//! - `linked` binds `librsocket_rust_go` (see `build.rs` for the environment
//!   variables that locate it). This is what applications use.
//! - `loopback` answers every request in-process without any network. The
//!   test suite runs against it. It never replaces `linked` when both are on.
//!
//! ```toml
//! [dependencies]
//! rsocket-bridge = { version = "0.1", features = ["linked"] }
//! ```

pub mod bridge;
pub mod client;
pub mod error;
pub mod ffi;
mod handle;
#[cfg(feature = "loopback")]
pub mod loopback;
pub mod metrics;
pub mod payload;
pub mod runtime;
pub mod types;

// Re-export main types at the crate root
pub use bridge::{max_pending_calls, pending_calls, CallId};
pub use client::{Client, Response};
pub use error::{Error, Result};
pub use ffi::NativeLibrary;
pub use metrics::Metrics;
pub use payload::Payload;
pub use types::{Config, ConnectionState, MetricsSnapshot, Transport};

/// Native library used when no type parameter is given.
#[cfg(feature = "linked")]
pub type DefaultLibrary = ffi::Linked;

/// Native library used when no type parameter is given.
#[cfg(all(feature = "loopback", not(feature = "linked")))]
pub type DefaultLibrary = loopback::Loopback;

#[cfg(not(any(feature = "linked", feature = "loopback")))]
compile_error!("enable the `linked` or the `loopback` feature to select a native library");

/// Initialize the library.
///
/// Must be called before any other function. Safe to call multiple times.
/// Reads [`Config::from_env`].
pub fn init() -> Result<()> {
    runtime::init::<DefaultLibrary>()
}

/// Initialize the library with an explicit configuration.
pub fn init_with_config(config: &Config) -> Result<()> {
    runtime::init_with::<DefaultLibrary>(config)
}

/// Get the native library version string.
pub fn version() -> String {
    runtime::version::<DefaultLibrary>()
}

/// Transports the native library supports.
pub fn supported_transports() -> Vec<Transport> {
    runtime::supported_transports::<DefaultLibrary>()
}

/// Check a stream-socket address such as `"127.0.0.1:7878"`.
pub fn validate_tcp_address(addr: &str) -> bool {
    runtime::validate_tcp_address::<DefaultLibrary>(addr)
}

/// Check a web-socket URL such as `"ws://127.0.0.1:7879"`.
pub fn validate_websocket_url(url: &str) -> bool {
    runtime::validate_websocket_url::<DefaultLibrary>(url)
}
