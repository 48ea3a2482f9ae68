use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::{Id, JoinSet};

use crate::filter::engine::WindowCache;
use crate::filter::locator::locate_schedule;
use crate::filter::normalizer::normalize_records;
use crate::models::device::MacAddress;
use crate::reconcile::reconciler::{reconcile, ReconcileOutcome};
use crate::reconcile::{ReconcileError, ReconcileResult};
use crate::router::gateway::RemoteRuleGateway;
use crate::router::source::{RuleSource, SourceResult};
use crate::utils::clock::{is_frozen, Clock};
use crate::utils::metrics_channel::{increment_counter, start_timer};
use crate::{error, info};

/// A device whose reconciliation failed this cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFailure {
    pub mac: MacAddress,
    pub error: String,
}

/// Summary of one cycle over all configured devices
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub at: DateTime<FixedOffset>,

    /// The whole cycle was skipped for the end-of-day freeze
    pub frozen: bool,

    /// Per-device outcomes, ordered by MAC
    pub outcomes: Vec<(MacAddress, ReconcileOutcome)>,

    pub failures: Vec<DeviceFailure>,
}

impl CycleReport {
    fn new(at: DateTime<FixedOffset>) -> Self {
        Self {
            at,
            frozen: false,
            outcomes: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn installs(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, ReconcileOutcome::Installed(_)))
            .count()
    }
}

/// Reconciles a fixed set of devices against one router
pub struct ReconcileRunner {
    source: Arc<dyn RuleSource>,
    gateway: Arc<dyn RemoteRuleGateway>,
    clock: Arc<dyn Clock>,
    macs: Vec<MacAddress>,
    cache: Arc<Mutex<WindowCache>>,
}

impl ReconcileRunner {
    /// Duplicate MACs are reconciled once
    pub fn new(
        source: Arc<dyn RuleSource>,
        gateway: Arc<dyn RemoteRuleGateway>,
        clock: Arc<dyn Clock>,
        macs: impl IntoIterator<Item = MacAddress>,
    ) -> Self {
        let macs: BTreeSet<MacAddress> = macs.into_iter().collect();

        Self {
            source,
            gateway,
            clock,
            macs: macs.into_iter().collect(),
            cache: Arc::new(Mutex::new(WindowCache::default())),
        }
    }

    pub fn macs(&self) -> &[MacAddress] {
        &self.macs
    }

    /// One cycle at the clock's current instant
    pub async fn run_cycle(&self) -> CycleReport {
        self.run_cycle_at(self.clock.now()).await
    }

    /// One cycle at `now`; every device sees the same instant
    pub async fn run_cycle_at(&self, now: DateTime<FixedOffset>) -> CycleReport {
        let _timer = start_timer("reconcile_cycle");
        increment_counter("reconcile_cycles");
        let mut report = CycleReport::new(now);

        if is_frozen(&now) {
            info!("Skipping reconcile cycle at {} (end-of-day freeze)", now);
            increment_counter("reconcile_frozen");
            report.frozen = true;
            return report;
        }

        self.reconcile_all(now, &mut report).await;

        report.outcomes.sort_by(|a, b| a.0.cmp(&b.0));
        report.failures.sort_by(|a, b| a.mac.cmp(&b.mac));

        info!(
            "Reconcile cycle at {}: {} devices, {} installs, {} failures",
            now,
            self.macs.len(),
            report.installs(),
            report.failures.len()
        );
        report
    }

    /// Read every device's rules in one pass, then reconcile them concurrently
    async fn reconcile_all(&self, now: DateTime<FixedOffset>, report: &mut CycleReport) {
        let all_records = match self.source.records_for_each(&self.macs).await {
            Ok(all_records) => all_records,
            Err(e) => {
                let error = ReconcileError::from(e).to_string();
                for mac in &self.macs {
                    record_failure(report, mac.clone(), error.clone());
                }
                return;
            }
        };

        let mut tasks = JoinSet::new();
        let mut task_macs: HashMap<Id, MacAddress> = HashMap::new();

        for (mac, records) in all_records {
            let task_mac = mac.clone();
            let gateway = self.gateway.clone();
            let cache = self.cache.clone();

            let handle = tasks.spawn(async move {
                let result = reconcile_device(&task_mac, records, now, gateway.as_ref(), &cache).await;
                (task_mac, result)
            });
            task_macs.insert(handle.id(), mac);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((_, (mac, Ok(outcome)))) => {
                    record_outcome(&outcome);
                    report.outcomes.push((mac, outcome));
                }
                Ok((_, (mac, Err(e)))) => record_failure(report, mac, e.to_string()),
                Err(e) => match task_macs.remove(&e.id()) {
                    Some(mac) => record_failure(report, mac, format!("reconcile task aborted: {}", e)),
                    None => {
                        error!("Reconcile task {} aborted: {}", e.id(), e);
                        increment_counter("reconcile_failures");
                    }
                },
            }
        }
    }
}

async fn reconcile_device(
    mac: &MacAddress,
    records: SourceResult<Vec<Value>>,
    now: DateTime<FixedOffset>,
    gateway: &dyn RemoteRuleGateway,
    cache: &Mutex<WindowCache>,
) -> ReconcileResult<ReconcileOutcome> {
    let rules = normalize_records(&records?).rules;
    let windows = cache.lock().await.windows_for(&rules);
    let schedule = locate_schedule(&windows, &now);
    Ok(reconcile(mac, &schedule, &now, gateway).await?)
}

fn record_outcome(outcome: &ReconcileOutcome) {
    match outcome {
        ReconcileOutcome::Installed(_) => increment_counter("reconcile_installs"),
        ReconcileOutcome::Removed => increment_counter("reconcile_removals"),
        ReconcileOutcome::Unchanged | ReconcileOutcome::NothingToRemove => {
            increment_counter("reconcile_unchanged")
        }
        ReconcileOutcome::Frozen => increment_counter("reconcile_frozen"),
    }
}

fn record_failure(report: &mut CycleReport, mac: MacAddress, error: String) {
    error!("Reconcile failed for {}: {}", mac, error);
    increment_counter("reconcile_failures");
    report.failures.push(DeviceFailure { mac, error });
}
