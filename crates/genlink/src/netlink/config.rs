//! Connection configuration.

use std::time::Duration;

/// Default receive buffer size, large enough for any single generic
/// netlink reply the kernel sends without MSG_PEEK sizing.
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 32768;

/// Settings applied when a connection opens its socket.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use genlink::netlink::Config;
///
/// let config = Config::new()
///     .recv_timeout(Duration::from_secs(2))
///     .seq_check(false);
/// assert_eq!(config.recv_timeout, Some(Duration::from_secs(2)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Config {
    /// How long a receive may block. `None` blocks until a message arrives.
    pub recv_timeout: Option<Duration>,
    /// Size of the buffer a single datagram is read into.
    pub recv_buffer_size: usize,
    /// Reject frames whose sequence number differs from the last request.
    pub seq_check: bool,
    /// Ask the kernel for extended ACK reports.
    pub ext_ack: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            recv_timeout: None,
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
            seq_check: true,
            ext_ack: true,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recv_timeout(mut self, timeout: Duration) -> Self {
        self.recv_timeout = Some(timeout);
        self
    }

    pub fn recv_buffer_size(mut self, size: usize) -> Self {
        self.recv_buffer_size = size;
        self
    }

    pub fn seq_check(mut self, enabled: bool) -> Self {
        self.seq_check = enabled;
        self
    }

    pub fn ext_ack(mut self, enabled: bool) -> Self {
        self.ext_ack = enabled;
        self
    }
}
