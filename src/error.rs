//! Error types for the rsocket-bridge crate.

use thiserror::Error;

use crate::types::Transport;

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for bridge operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The native library failed to initialize. Not recoverable.
    #[error("native library failed to initialize: {0}")]
    Initialization(String),

    /// The native connect call reported failure.
    #[error("failed to connect via {transport} to {address} (code {code})")]
    Connection {
        /// Transport the connect was attempted on.
        transport: Transport,
        /// Address or URL passed to the native layer.
        address: String,
        /// Status code returned by the native layer.
        code: i32,
    },

    /// The handle behind this value was already released.
    #[error("already closed")]
    Closed,

    /// A required input was empty, released, or malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The native layer refused to accept a request.
    #[error("request rejected by native layer (code {code})")]
    RequestRejected {
        /// Status code returned by the native layer.
        code: i32,
    },

    /// The native layer completed a request with an error.
    #[error("request failed (code {code}): {message}")]
    RequestFailed {
        /// Error code reported by the native layer.
        code: i32,
        /// Error message reported by the native layer.
        message: String,
    },

    /// A native creation function returned a null handle.
    #[error("native library returned a null {0} handle")]
    NullHandle(&'static str),

    /// Too many requests are awaiting completion.
    #[error("too many pending requests (capacity {capacity})")]
    TooManyPending {
        /// Capacity of the completion registry.
        capacity: usize,
    },

    /// The client already holds a connection.
    #[error("client already connected via {0}")]
    AlreadyConnected(Transport),

    /// The native library has no connect entry point for this transport.
    #[error("transport {0} has no native connect function")]
    UnsupportedTransport(Transport),

    /// A blocking request did not complete in time.
    #[error("timeout")]
    Timeout,
}

impl Error {
    /// Check if this is a closed-handle error.
    pub fn is_closed(&self) -> bool {
        matches!(self, Error::Closed)
    }

    /// Check if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout)
    }

    /// Check if the native layer rejected the request synchronously.
    pub fn is_rejected(&self) -> bool {
        matches!(self, Error::RequestRejected { .. })
    }

    /// Check if this is a connection error.
    pub fn is_connection(&self) -> bool {
        matches!(self, Error::Connection { .. })
    }

    /// Check if this is an invalid argument error.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Error::InvalidArgument(_))
    }
}
