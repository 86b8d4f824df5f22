//! RSocket client connections.

use std::fmt;
use std::marker::PhantomData;
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;
use parking_lot::Mutex;

use crate::bridge::{self, RawCompletion};
use crate::error::{Error, Result};
use crate::ffi::{self, NativeLibrary, RawClient, ResponseCallback, STATUS_OK};
use crate::handle::NativeHandle;
use crate::payload::Payload;
use crate::types::{ConnectionState, Transport};
use crate::DefaultLibrary;

/// Outcome delivered to a request-response handler.
///
/// `Ok(None)` means the peer completed the request without a payload.
pub type Response<N = DefaultLibrary> = Result<Option<Payload<N>>>;

/// A client connection driven by the native library.
///
/// All operations on one client are serialized on its lock; distinct clients
/// run independently. The native connection is freed by [`Client::close`] or
/// on drop.
///
/// # Example
///
/// ```no_run
/// use rsocket_bridge::{Client, Payload};
///
/// rsocket_bridge::init()?;
///
/// let client: Client = Client::new()?;
/// client.connect_tcp("127.0.0.1:7878")?;
///
/// let request = Payload::from_text("ping", None)?;
/// client.request_response(&request, |response| match response {
///     Ok(Some(payload)) => println!("got {}", payload.data_string().unwrap_or_default()),
///     Ok(None) => println!("empty response"),
///     Err(e) => eprintln!("request failed: {e}"),
/// })?;
///
/// client.fire_and_forget(&Payload::from_text("log line", None)?)?;
/// # Ok::<(), rsocket_bridge::Error>(())
/// ```
pub struct Client<N: NativeLibrary = DefaultLibrary> {
    handle: NativeHandle<RawClient>,
    // Only touched while the handle guard is held.
    state: Mutex<ConnectionState>,
    _library: PhantomData<N>,
}

impl<N: NativeLibrary> Client<N> {
    /// Create an unconnected client.
    pub fn new() -> Result<Self> {
        let raw = unsafe { N::client_create() };
        let handle = unsafe { NativeHandle::from_raw(raw, N::client_free, "client") }
            .ok_or(Error::NullHandle("client"))?;
        Ok(Self {
            handle,
            state: Mutex::new(ConnectionState::Unconnected),
            _library: PhantomData,
        })
    }

    /// Connect over stream sockets, e.g. `"127.0.0.1:7878"`.
    pub fn connect_tcp(&self, address: &str) -> Result<()> {
        self.connect(Transport::Tcp, address)
    }

    /// Connect over web-socket framing, e.g. `"ws://127.0.0.1:7879"`.
    pub fn connect_websocket(&self, url: &str) -> Result<()> {
        self.connect(Transport::WebSocket, url)
    }

    /// Connect over `transport`.
    ///
    /// A failed attempt leaves the client unconnected and usable for another
    /// attempt. A closed client cannot reconnect.
    pub fn connect(&self, transport: Transport, address: &str) -> Result<()> {
        let guard = self.handle.acquire()?;
        let mut state = self.state.lock();

        if let ConnectionState::Connected(current) = *state {
            return Err(Error::AlreadyConnected(current));
        }

        if !transport.is_connectable() {
            return Err(Error::UnsupportedTransport(transport));
        }

        let address_c = ffi::c_string("address", address)?;
        let code = unsafe {
            if transport == Transport::WebSocket {
                N::client_connect_websocket(guard.as_ptr(), address_c.as_ptr())
            } else {
                N::client_connect_tcp(guard.as_ptr(), address_c.as_ptr())
            }
        };

        if code != STATUS_OK {
            tracing::debug!(%transport, address, code, "connect failed");
            return Err(Error::Connection {
                transport,
                address: address.to_string(),
                code,
            });
        }

        *state = ConnectionState::Connected(transport);
        tracing::debug!(%transport, address, "client connected");
        Ok(())
    }

    /// Whether the native connection is up. `false` once closed.
    pub fn is_connected(&self) -> bool {
        match self.handle.acquire() {
            Ok(guard) => unsafe { N::client_is_connected(guard.as_ptr()) == ffi::NATIVE_TRUE },
            Err(_) => false,
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        match self.handle.acquire() {
            Ok(_guard) => *self.state.lock(),
            Err(_) => ConnectionState::Closed,
        }
    }

    /// Transport of the established connection, if any.
    pub fn transport(&self) -> Option<Transport> {
        match self.state() {
            ConnectionState::Connected(transport) => Some(transport),
            _ => None,
        }
    }

    /// Send a request; `handler` runs exactly once with the response, on a
    /// thread chosen by the native library.
    ///
    /// Returns as soon as the native library has accepted or rejected the
    /// request. On any error returned here the handler is dropped without
    /// being called. Completions of concurrent requests arrive in no
    /// particular order.
    pub fn request_response<F>(&self, payload: &Payload<N>, handler: F) -> Result<()>
    where
        F: FnOnce(Response<N>) + Send + 'static,
    {
        let client = self.handle.acquire()?;
        let request = payload
            .acquire()
            .map_err(|_| Error::InvalidArgument("payload has been released".to_string()))?;

        let registry = bridge::registry();
        let id = registry.store(Box::new(move |completion: RawCompletion| {
            handler(unsafe { completion.into_result::<N>() })
        }))?;

        let trampoline: ResponseCallback = bridge::response_trampoline::<N>;
        let code = unsafe {
            N::client_request_response(
                client.as_ptr(),
                request.as_ptr(),
                trampoline,
                id.into_context(),
            )
        };

        if code != STATUS_OK {
            // Never reaches the trampoline; the handler is dropped uncalled.
            drop(registry.take(id));
            tracing::debug!(call_id = %id, code, "request rejected");
            return Err(Error::RequestRejected { code });
        }

        tracing::trace!(call_id = %id, "request accepted");
        Ok(())
    }

    /// Send a request and block until its response arrives or `timeout`
    /// elapses.
    ///
    /// A response arriving after the timeout is dropped and its payload freed.
    pub fn request_response_blocking(
        &self,
        payload: &Payload<N>,
        timeout: Duration,
    ) -> Result<Option<Payload<N>>> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.request_response(payload, move |response| {
            let _ = tx.send(response);
        })?;

        match rx.recv_timeout(timeout) {
            Ok(response) => response,
            Err(RecvTimeoutError::Timeout) => Err(Error::Timeout),
            // The handler was dropped without running, which the native
            // contract rules out for accepted calls.
            Err(RecvTimeoutError::Disconnected) => Err(Error::RequestFailed {
                code: ffi::STATUS_FAILED,
                message: "completion dropped without a response".to_string(),
            }),
        }
    }

    /// Send a payload without waiting for or receiving any response.
    pub fn fire_and_forget(&self, payload: &Payload<N>) -> Result<()> {
        let client = self.handle.acquire()?;
        let request = payload
            .acquire()
            .map_err(|_| Error::InvalidArgument("payload has been released".to_string()))?;

        let code = unsafe { N::client_fire_and_forget(client.as_ptr(), request.as_ptr()) };
        ffi::check_request(code)
    }

    /// Close the connection and free the native client. Later calls are
    /// no-ops; every other operation then fails with [`Error::Closed`].
    pub fn close(&self) {
        if self.handle.release() {
            *self.state.lock() = ConnectionState::Closed;
        }
    }
}

impl<N: NativeLibrary> fmt::Debug for Client<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("state", &self.state())
            .finish()
    }
}
