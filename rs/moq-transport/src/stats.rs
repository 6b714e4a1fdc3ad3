//! Lightweight application-level statistics hooks.
//!
//! Counts object payload bytes only; transport overhead and retransmissions are not visible here.

/// A sink for application-level accounting.
///
/// Implementations should be fast and non-blocking (e.g., atomics).
pub trait Stats: Send + Sync + 'static {
	/// Record object payload bytes received from the peer.
	fn add_rx_bytes(&self, bytes: u64);

	/// Record object payload bytes sent to the peer.
	fn add_tx_bytes(&self, bytes: u64);

	/// Record an object stream or datagram that was dropped because it named no live track.
	fn add_dropped_object(&self) {}
}

/// Default stats sink that does nothing.
#[derive(Default)]
pub struct NoopStats;

impl Stats for NoopStats {
	fn add_rx_bytes(&self, _bytes: u64) {}
	fn add_tx_bytes(&self, _bytes: u64) {}
}
