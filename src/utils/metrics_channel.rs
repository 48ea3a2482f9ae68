use std::sync::OnceLock;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::utils::metrics;

/// Buffered messages before `try_send` starts dropping updates
const CHANNEL_CAPACITY: usize = 10_000;

/// Message type for the metrics channel
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MetricsMessage {
    Counter { name: String, value: u64 },
    Timer { name: String, duration_nanos: u64 },
}

// Global channel sender
static METRICS_SENDER: OnceLock<mpsc::Sender<MetricsMessage>> = OnceLock::new();

/// Open the channel and spawn the task draining it into the registry.
///
/// Must be called from within a tokio runtime. Later calls are no-ops.
pub fn init_metrics_channel() {
    if METRICS_SENDER.get().is_some() {
        return;
    }

    let (tx, rx) = mpsc::channel::<MetricsMessage>(CHANNEL_CAPACITY);
    if METRICS_SENDER.set(tx).is_ok() {
        tokio::spawn(process_metrics_messages(rx));
    }
}

async fn process_metrics_messages(mut rx: mpsc::Receiver<MetricsMessage>) {
    while let Some(message) = rx.recv().await {
        let result = match &message {
            MetricsMessage::Counter { name, value } => metrics::add_to_counter(name, *value).await,
            MetricsMessage::Timer {
                name,
                duration_nanos,
            } => metrics::record_timer(name, Duration::from_nanos(*duration_nanos)).await,
        };

        if let Err(e) = result {
            crate::debug!("Dropped metrics update {:?}: {}", message, e);
        }
    }
}

// Updates sent before init, or while the buffer is full, are dropped
fn send(message: MetricsMessage) {
    if let Some(sender) = METRICS_SENDER.get() {
        let _ = sender.try_send(message);
    }
}

/// Increment a counter without awaiting
pub fn increment_counter(name: &str) {
    add_to_counter(name, 1);
}

pub fn add_to_counter(name: &str, value: u64) {
    send(MetricsMessage::Counter {
        name: name.to_string(),
        value,
    });
}

/// Record a duration without awaiting
pub fn record_timer(name: &str, duration: Duration) {
    send(MetricsMessage::Timer {
        name: name.to_string(),
        duration_nanos: duration.as_nanos() as u64,
    });
}

/// Records the elapsed time under `name` when dropped
pub struct TimerGuard {
    name: String,
    start: Instant,
}

impl TimerGuard {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for TimerGuard {
    fn drop(&mut self) {
        record_timer(&self.name, self.start.elapsed());
    }
}

/// Convenience function to start a timer
pub fn start_timer(name: &str) -> TimerGuard {
    TimerGuard::new(name)
}
