//! Scrape orchestration: bounded fan-out over the gauge list, fan-in to an
//! immutable snapshot.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::fetcher::{FailureReason, FetchGauge, FetchOutcome};
use crate::gauges::GaugeTarget;

/// One gauge's row in a snapshot: identity, resolved display labels, and the
/// terminal outcome of its fetch.
#[derive(Debug, Clone)]
pub struct SnapshotEntry {
    pub gauge_id: String,
    pub friendly_name: String,
    pub location_name: String,
    pub outcome: FetchOutcome,
}

impl SnapshotEntry {
    fn new(target: &GaugeTarget, outcome: FetchOutcome) -> Self {
        Self {
            gauge_id: target.id.clone(),
            friendly_name: target.friendly_name().to_string(),
            location_name: target.location_name().to_string(),
            outcome,
        }
    }
}

/// Immutable result of one scrape cycle.
///
/// Keys of `entries` are exactly the gauge ids of the cycle that produced
/// it, and `success_count + failure_count == gauge_count == entries.len()`.
/// A snapshot is built once, published whole, and replaced (never merged) by
/// the next cycle.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub entries: HashMap<String, SnapshotEntry>,
    pub gauge_count: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub scrape_duration_seconds: f64,
}

impl Snapshot {
    /// The zero snapshot served before the first cycle ever completes.
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
            gauge_count: 0,
            success_count: 0,
            failure_count: 0,
            scrape_duration_seconds: 0.0,
        }
    }

    /// Outcome for a gauge id, if it was part of the producing cycle.
    pub fn outcome(&self, gauge_id: &str) -> Option<&FetchOutcome> {
        self.entries.get(gauge_id).map(|e| &e.outcome)
    }

    fn from_entries(entries: HashMap<String, SnapshotEntry>, duration_seconds: f64) -> Self {
        let success_count = entries.values().filter(|e| e.outcome.is_success()).count();
        Self {
            gauge_count: entries.len(),
            success_count,
            failure_count: entries.len() - success_count,
            scrape_duration_seconds: duration_seconds,
            entries,
        }
    }
}

/// Runs one scrape cycle: fetches every configured gauge through a bounded
/// worker pool and aggregates all outcomes into a [`Snapshot`].
pub struct Scraper {
    fetcher: Arc<dyn FetchGauge>,
    max_workers: usize,
}

impl Scraper {
    pub fn new(fetcher: Arc<dyn FetchGauge>, max_workers: usize) -> Self {
        Self {
            fetcher,
            max_workers,
        }
    }

    /// Fetch all targets and aggregate.
    ///
    /// At most `min(max_workers, targets.len())` fetches are in flight at
    /// once. A failing gauge never cancels or aborts the others; the
    /// returned snapshot has exactly one entry per input target. Duration is
    /// wall-clock from cycle start to aggregation completion, retries
    /// included.
    pub async fn run_cycle(&self, targets: &[GaugeTarget]) -> Snapshot {
        let start = Instant::now();

        if targets.is_empty() {
            return Snapshot::from_entries(HashMap::new(), start.elapsed().as_secs_f64());
        }

        let permits = self.max_workers.min(targets.len()).max(1);
        let semaphore = Arc::new(Semaphore::new(permits));
        let mut workers = JoinSet::new();

        for target in targets.iter().cloned() {
            let fetcher = self.fetcher.clone();
            let semaphore = semaphore.clone();

            workers.spawn(async move {
                // Permit held for the whole fetch, retries and backoff
                // included.
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("scrape semaphore closed");
                let outcome = fetcher.fetch_value(&target).await;
                (target, outcome)
            });
        }

        let mut entries: HashMap<String, SnapshotEntry> = HashMap::with_capacity(targets.len());

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((target, outcome)) => {
                    entries.insert(target.id.clone(), SnapshotEntry::new(&target, outcome));
                }
                Err(e) => {
                    tracing::error!(error = %e, "Scrape worker task failed");
                }
            }
        }

        // A worker that died (panicked fetcher) left its target without an
        // outcome; the snapshot still has to cover every input target.
        for target in targets {
            if !entries.contains_key(&target.id) {
                entries.insert(
                    target.id.clone(),
                    SnapshotEntry::new(
                        target,
                        FetchOutcome::Failure(FailureReason::Internal(
                            "worker task failed".to_string(),
                        )),
                    ),
                );
            }
        }

        let snapshot = Snapshot::from_entries(entries, start.elapsed().as_secs_f64());

        tracing::info!(
            gauges = snapshot.gauge_count,
            successes = snapshot.success_count,
            failures = snapshot.failure_count,
            duration_secs = snapshot.scrape_duration_seconds,
            "Scrape cycle complete"
        );

        snapshot
    }
}
