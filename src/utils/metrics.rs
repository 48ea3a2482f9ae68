use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;
use warp::Filter;

/// Metrics errors
#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("Metrics not initialized")]
    NotInitialized,

    #[error("Counter not found: {0}")]
    CounterNotFound(String),

    #[error("Timer not found: {0}")]
    TimerNotFound(String),

    #[error("Server error: {0}")]
    ServerError(#[from] warp::Error),
}

/// Result type for metrics operations
pub type MetricsResult<T> = Result<T, MetricsError>;

/// Counters registered at startup, with their descriptions
pub const RECONCILE_COUNTERS: &[(&str, &str)] = &[
    ("rules_rejected", "Rule records skipped because they failed validation"),
    ("reconcile_cycles", "Reconciliation cycles started"),
    ("reconcile_frozen", "Cycles skipped inside the end-of-day freeze"),
    ("reconcile_installs", "Block rules added or replaced on the router"),
    ("reconcile_removals", "Block rules removed from the router"),
    ("reconcile_unchanged", "Devices whose remote rule already matched"),
    ("reconcile_failures", "Devices whose reconciliation failed"),
    ("window_cache_hits", "Rule snapshots served from the window cache"),
    ("window_cache_misses", "Rule snapshots that had to be resolved"),
];

/// Timers registered at startup, with their descriptions
pub const RECONCILE_TIMERS: &[(&str, &str)] = &[(
    "reconcile_cycle",
    "Wall time of one reconciliation cycle over all devices",
)];

/// Atomic counter for metrics
#[derive(Debug)]
struct Counter {
    value: AtomicU64,
    description: String,
}

impl Counter {
    fn new(description: &str) -> Self {
        Self {
            value: AtomicU64::new(0),
            description: description.to_string(),
        }
    }

    fn add(&self, value: u64) {
        self.value.fetch_add(value, Ordering::Relaxed);
    }

    fn value(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Timer for measuring durations
#[derive(Debug)]
struct Timer {
    count: AtomicU64,
    sum: AtomicU64, // in nanoseconds
    min: AtomicU64, // in nanoseconds
    max: AtomicU64, // in nanoseconds
    description: String,
}

impl Timer {
    fn new(description: &str) -> Self {
        Self {
            count: AtomicU64::new(0),
            sum: AtomicU64::new(0),
            min: AtomicU64::new(u64::MAX),
            max: AtomicU64::new(0),
            description: description.to_string(),
        }
    }

    fn record(&self, duration: Duration) {
        let nanos = duration.as_nanos() as u64;

        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum.fetch_add(nanos, Ordering::Relaxed);
        self.min.fetch_min(nanos, Ordering::Relaxed);
        self.max.fetch_max(nanos, Ordering::Relaxed);
    }

    fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    fn sum(&self) -> Duration {
        Duration::from_nanos(self.sum.load(Ordering::Relaxed))
    }

    fn min(&self) -> Duration {
        match self.min.load(Ordering::Relaxed) {
            u64::MAX => Duration::ZERO,
            min => Duration::from_nanos(min),
        }
    }

    fn max(&self) -> Duration {
        Duration::from_nanos(self.max.load(Ordering::Relaxed))
    }

    fn avg(&self) -> Duration {
        let count = self.count();
        if count == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(self.sum.load(Ordering::Relaxed) / count)
        }
    }
}

/// Metrics registry
pub struct MetricsRegistry {
    counters: RwLock<HashMap<String, Arc<Counter>>>,
    timers: RwLock<HashMap<String, Arc<Timer>>>,
    enabled: AtomicBool,
}

impl MetricsRegistry {
    pub fn new(enabled: bool) -> Self {
        Self {
            counters: RwLock::new(HashMap::new()),
            timers: RwLock::new(HashMap::new()),
            enabled: AtomicBool::new(enabled),
        }
    }

    pub async fn register_counter(&self, name: &str, description: &str) {
        self.counters
            .write()
            .await
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Counter::new(description)));
    }

    pub async fn register_timer(&self, name: &str, description: &str) {
        self.timers
            .write()
            .await
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Timer::new(description)));
    }

    async fn get_counter(&self, name: &str) -> MetricsResult<Arc<Counter>> {
        self.counters
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| MetricsError::CounterNotFound(name.to_string()))
    }

    async fn get_timer(&self, name: &str) -> MetricsResult<Arc<Timer>> {
        self.timers
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| MetricsError::TimerNotFound(name.to_string()))
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Add to a registered counter; unknown names are an error
    pub async fn add_to_counter(&self, name: &str, value: u64) -> MetricsResult<()> {
        if self.is_enabled() {
            self.get_counter(name).await?.add(value);
        }
        Ok(())
    }

    /// Record into a registered timer; unknown names are an error
    pub async fn record_timer(&self, name: &str, duration: Duration) -> MetricsResult<()> {
        if self.is_enabled() {
            self.get_timer(name).await?.record(duration);
        }
        Ok(())
    }

    /// Current value of a counter
    pub async fn counter_value(&self, name: &str) -> MetricsResult<u64> {
        Ok(self.get_counter(name).await?.value())
    }

    /// Snapshot every metric, sorted by name
    pub async fn collect_metrics(&self) -> Metrics {
        let mut counters: Vec<CounterMetric> = self
            .counters
            .read()
            .await
            .iter()
            .map(|(name, counter)| CounterMetric {
                name: name.clone(),
                value: counter.value(),
                description: counter.description.clone(),
            })
            .collect();
        counters.sort_by(|a, b| a.name.cmp(&b.name));

        let mut timers: Vec<TimerMetric> = self
            .timers
            .read()
            .await
            .iter()
            .map(|(name, timer)| TimerMetric {
                name: name.clone(),
                count: timer.count(),
                sum_ms: timer.sum().as_millis() as u64,
                min_ms: timer.min().as_millis() as u64,
                max_ms: timer.max().as_millis() as u64,
                avg_ms: timer.avg().as_millis() as u64,
                description: timer.description.clone(),
            })
            .collect();
        timers.sort_by(|a, b| a.name.cmp(&b.name));

        Metrics { counters, timers }
    }
}

/// Counter metric for JSON serialization
#[derive(Serialize, Debug)]
pub struct CounterMetric {
    pub name: String,
    pub value: u64,
    pub description: String,
}

/// Timer metric for JSON serialization
#[derive(Serialize, Debug)]
pub struct TimerMetric {
    pub name: String,
    pub count: u64,
    pub sum_ms: u64,
    pub min_ms: u64,
    pub max_ms: u64,
    pub avg_ms: u64,
    pub description: String,
}

/// Complete metrics structure for JSON serialization
#[derive(Serialize, Debug)]
pub struct Metrics {
    pub counters: Vec<CounterMetric>,
    pub timers: Vec<TimerMetric>,
}

/// Global metrics registry
static METRICS: OnceLock<Arc<MetricsRegistry>> = OnceLock::new();

/// Initialize the metrics system; the first registry installed wins
pub fn init(enabled: bool) -> Arc<MetricsRegistry> {
    METRICS
        .get_or_init(|| Arc::new(MetricsRegistry::new(enabled)))
        .clone()
}

/// Get the global metrics registry
pub fn registry() -> MetricsResult<Arc<MetricsRegistry>> {
    METRICS.get().cloned().ok_or(MetricsError::NotInitialized)
}

/// Register every counter and timer the reconciler reports
pub async fn register_reconcile_metrics(registry: &MetricsRegistry) {
    for (name, description) in RECONCILE_COUNTERS {
        registry.register_counter(name, description).await;
    }
    for (name, description) in RECONCILE_TIMERS {
        registry.register_timer(name, description).await;
    }
}

/// Start the metrics HTTP server with `/metrics` and `/health`
pub async fn start_server(addr: SocketAddr) -> MetricsResult<()> {
    let registry = registry()?;

    let metrics_route = warp::path("metrics").and(warp::get()).and_then(move || {
        let registry = registry.clone();
        async move {
            let metrics = registry.collect_metrics().await;
            Ok::<_, warp::Rejection>(warp::reply::json(&metrics))
        }
    });

    let health_route = warp::path("health").and(warp::get()).map(|| "OK");

    let routes = metrics_route.or(health_route);

    // bind up front so an address in use is reported to the caller
    let (bound, server) = warp::serve(routes).try_bind_ephemeral(addr)?;

    crate::info!("Metrics server listening on {}", bound);
    tokio::spawn(server);

    Ok(())
}

/// Increment a counter on the global registry
pub async fn increment_counter(name: &str) -> MetricsResult<()> {
    add_to_counter(name, 1).await
}

pub async fn add_to_counter(name: &str, value: u64) -> MetricsResult<()> {
    registry()?.add_to_counter(name, value).await
}

/// Record a duration on the global registry.
///
/// Only recorded when metrics are enabled and the timer was registered.
pub async fn record_timer(name: &str, duration: Duration) -> MetricsResult<()> {
    registry()?.record_timer(name, duration).await
}
