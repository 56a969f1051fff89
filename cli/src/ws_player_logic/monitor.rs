use lib_player::PlayerMetricsCollector;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::interval;

/// Counts connection and throughput events reported by the player.
#[derive(Debug, Default)]
pub struct ThroughputMetrics {
    connects: AtomicU64,
    disconnects: AtomicU64,
    messages: AtomicU64,
    bytes: AtomicU64,
}

/// Counter values at one point in time.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ThroughputSample {
    pub connects: u64,
    pub disconnects: u64,
    pub messages: u64,
    pub bytes: u64,
}

impl ThroughputMetrics {
    pub fn sample(&self) -> ThroughputSample {
        ThroughputSample {
            connects: self.connects.load(Ordering::Relaxed),
            disconnects: self.disconnects.load(Ordering::Relaxed),
            messages: self.messages.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }
}

impl PlayerMetricsCollector for ThroughputMetrics {
    fn player_constructed(&self) {
        log::debug!("Player constructed");
    }

    fn connected(&self) {
        self.connects.fetch_add(1, Ordering::Relaxed);
    }

    fn disconnected(&self) {
        self.disconnects.fetch_add(1, Ordering::Relaxed);
    }

    fn record_bytes_received(&self, bytes: usize) {
        self.messages.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    fn close(&self) {
        log::info!("Player closed. Totals: {}", describe(self.sample(), ThroughputSample::default(), None));
    }
}

/// Formats the change between two samples.
pub fn describe(now: ThroughputSample, previous: ThroughputSample, period: Option<Duration>) -> String {
    let messages = now.messages.saturating_sub(previous.messages);
    let bytes = now.bytes.saturating_sub(previous.bytes);
    let mut text = format!(
        "{} messages, {} bytes, {} connects, {} disconnects",
        messages, bytes, now.connects, now.disconnects
    );
    if let Some(period) = period.filter(|p| !p.is_zero()) {
        let rate = messages as f64 / period.as_secs_f64();
        text.push_str(&format!(" ({:.1} msg/s)", rate));
    }
    text
}

pub async fn run(metrics: Arc<ThroughputMetrics>, period: Duration, mut shutdown: broadcast::Receiver<()>) {
    let mut check_interval = interval(period);
    // The first tick completes immediately
    check_interval.tick().await;
    let mut previous = metrics.sample();

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                log::info!("Monitor received shutdown signal.");
                break;
            }
            _ = check_interval.tick() => {
                let now = metrics.sample();
                if now.messages == previous.messages {
                    log::warn!("No messages in the last {:?}", period);
                } else {
                    log::info!("Throughput: {}", describe(now, previous, Some(period)));
                }
                previous = now;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_messages_and_bytes() {
        let metrics = ThroughputMetrics::default();
        metrics.connected();
        metrics.record_bytes_received(10);
        metrics.record_bytes_received(5);
        metrics.disconnected();

        assert_eq!(
            metrics.sample(),
            ThroughputSample {
                connects: 1,
                disconnects: 1,
                messages: 2,
                bytes: 15,
            }
        );
    }

    #[test]
    fn describes_the_delta_between_samples() {
        let previous = ThroughputSample {
            messages: 10,
            bytes: 100,
            ..Default::default()
        };
        let now = ThroughputSample {
            connects: 1,
            messages: 30,
            bytes: 300,
            ..Default::default()
        };

        assert_eq!(
            describe(now, previous, Some(Duration::from_secs(10))),
            "20 messages, 200 bytes, 1 connects, 0 disconnects (2.0 msg/s)"
        );
        assert_eq!(describe(now, previous, None), "20 messages, 200 bytes, 1 connects, 0 disconnects");
    }

    #[tokio::test(start_paused = true)]
    async fn stops_on_shutdown() {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(run(
            Arc::new(ThroughputMetrics::default()),
            Duration::from_secs(1),
            shutdown_rx,
        ));
        tokio::time::sleep(Duration::from_secs(3)).await;
        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
