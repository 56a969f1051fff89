//! # Player Metrics
//!
//! The player reports a handful of lifecycle and throughput events to a
//! collector supplied at construction. Every method defaults to a no-op so
//! implementors only override what they record.

/// Receives lifecycle and throughput events from a running player.
pub trait PlayerMetricsCollector: Send + Sync {
    /// Called once when the player is constructed.
    fn player_constructed(&self) {}

    /// Called every time a connection to the server opens.
    fn connected(&self) {}

    /// Called every time a connection to the server closes.
    fn disconnected(&self) {}

    /// Called with the payload size of every successfully decoded message.
    fn record_bytes_received(&self, _bytes: usize) {}

    /// Called when the consumer closes the player.
    fn close(&self) {}
}

/// A collector that records nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetricsCollector;

impl PlayerMetricsCollector for NoopMetricsCollector {}
