use std::time::Duration;

use gsectl_transport::DEFAULT_CONNECT_TIMEOUT;

/// Default bound on the multiplexer's readiness wait.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Default bound on delivering one command frame to one connection.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Configuration for the console multiplexer.
#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    /// Longest the loop sleeps before revisiting the queue and shutdown token.
    pub poll_timeout: Duration,
    /// Timeout for `input add` / `output add` connects.
    pub connect_timeout: Duration,
    /// Timeout for each frame write and for the flush on close.
    pub write_timeout: Duration,
    /// Bytes requested per socket read.
    pub read_chunk_size: usize,
    /// Capacity of the operator request queue.
    pub queue_capacity: usize,
    /// Capacity of the connection event channel.
    pub event_capacity: usize,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            read_chunk_size: 1024,
            queue_capacity: 64,
            event_capacity: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_bound_every_wait() {
        let config = ConsoleConfig::default();
        assert_eq!(config.poll_timeout, Duration::from_secs(1));
        assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
        assert_eq!(config.write_timeout, DEFAULT_WRITE_TIMEOUT);
        assert!(config.read_chunk_size >= 137, "one read should fit an ECU frame");
        assert!(config.queue_capacity > 0 && config.event_capacity > 0);
    }
}
