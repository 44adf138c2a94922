//! Transmit pacing for the outbound fragment stream.
//!
//! The sender sleeps after each datagram in proportion to the bytes
//! just written, which holds the long-run rate near the configured
//! limit. Per-datagram granularity oversleeps for tiny datagrams;
//! that drift is acceptable on a link with no real-time budget.

use std::thread;
use std::time::Duration;

/// Byte-rate limiter. A limit of zero disables pacing entirely.
#[derive(Debug, Clone, Copy)]
pub struct Pacer {
    max_bytes_per_second: u64,
}

impl Pacer {
    /// Create a pacer capped at `max_bytes_per_second` (0 = unlimited).
    pub fn new(max_bytes_per_second: u64) -> Self {
        Self {
            max_bytes_per_second,
        }
    }

    /// The configured limit in bytes per second.
    pub fn limit(&self) -> u64 {
        self.max_bytes_per_second
    }

    /// How long to sleep after emitting `bytes`, if at all.
    pub fn delay_for(&self, bytes: usize) -> Option<Duration> {
        if self.max_bytes_per_second == 0 || bytes == 0 {
            return None;
        }
        Some(Duration::from_secs_f64(
            bytes as f64 / self.max_bytes_per_second as f64,
        ))
    }

    /// Block the current thread for the pacing delay.
    pub fn pace(&self, bytes: usize) {
        if let Some(delay) = self.delay_for(bytes) {
            thread::sleep(delay);
        }
    }
}
