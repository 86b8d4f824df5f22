//! Type definitions and enums.

use std::fmt;
use std::str::FromStr;

/// Wire transport offered by the native library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    /// Plain stream sockets.
    Tcp,
    /// Web-socket framing.
    WebSocket,
    /// UDP-based multiplexed transport.
    Quic,
    /// Peer-addressed transport.
    Iroh,
}

impl Transport {
    /// Name used by the native library for this transport.
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Tcp => "tcp",
            Transport::WebSocket => "websocket",
            Transport::Quic => "quic",
            Transport::Iroh => "iroh",
        }
    }

    /// Whether the native surface has a connect function for this transport.
    pub fn is_connectable(&self) -> bool {
        matches!(self, Transport::Tcp | Transport::WebSocket)
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Transport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tcp" => Ok(Transport::Tcp),
            "websocket" | "ws" => Ok(Transport::WebSocket),
            "quic" => Ok(Transport::Quic),
            "iroh" => Ok(Transport::Iroh),
            other => Err(format!("unknown transport: {}", other)),
        }
    }
}

/// Connection state of a [`Client`](crate::Client).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Created, no connect has succeeded yet.
    #[default]
    Unconnected,
    /// Connected over the given transport.
    Connected(Transport),
    /// Released. Terminal.
    Closed,
}

/// Bridge configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Maximum number of request-response calls awaiting completion at once,
    /// process-wide (default: 16384).
    pub max_pending_calls: usize,
}

impl Config {
    /// Environment variable overriding [`Config::max_pending_calls`].
    pub const MAX_PENDING_ENV: &'static str = "RSOCKET_BRIDGE_MAX_PENDING";

    /// Default configuration with overrides from the environment.
    ///
    /// Unparsable or zero values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(max) = std::env::var(Self::MAX_PENDING_ENV)
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|&v| v > 0)
        {
            config.max_pending_calls = max;
        }
        config
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_pending_calls: crate::bridge::DEFAULT_MAX_PENDING,
        }
    }
}

/// Counter values read from a [`Metrics`](crate::Metrics) block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    /// Requests recorded.
    pub request_count: u64,
    /// Responses recorded.
    pub response_count: u64,
    /// Errors recorded.
    pub error_count: u64,
    /// Bytes sent.
    pub bytes_sent: u64,
    /// Bytes received.
    pub bytes_received: u64,
    /// Seconds since the counters were created.
    pub uptime_seconds: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_parse() {
        assert_eq!("tcp".parse::<Transport>().unwrap(), Transport::Tcp);
        assert_eq!(" WebSocket ".parse::<Transport>().unwrap(), Transport::WebSocket);
        assert_eq!("ws".parse::<Transport>().unwrap(), Transport::WebSocket);
        assert_eq!("quic".parse::<Transport>().unwrap(), Transport::Quic);
        assert_eq!("iroh".parse::<Transport>().unwrap(), Transport::Iroh);
        assert!("carrier-pigeon".parse::<Transport>().is_err());
        assert!("quinn".parse::<Transport>().is_err());
        assert!("p2p".parse::<Transport>().is_err());
    }

    #[test]
    fn test_transport_connectable() {
        assert!(Transport::Tcp.is_connectable());
        assert!(Transport::WebSocket.is_connectable());
        assert!(!Transport::Quic.is_connectable());
        assert!(!Transport::Iroh.is_connectable());
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.max_pending_calls, crate::bridge::DEFAULT_MAX_PENDING);
    }
}
