//! Periodic reconciliation of every subscription.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Result;
use common::Platform;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

use crate::{Outcome, Reconciler};

/// Tally of a sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Number of subscriptions visited.
    pub processed: usize,
    /// Number of passes which failed.
    pub failed: usize,
    /// Outcomes by name.
    pub outcomes: BTreeMap<&'static str, usize>,
}

impl SweepReport {
    fn record(&mut self, outcome: &Outcome) {
        self.processed += 1;
        *self.outcomes.entry(outcome.as_str()).or_default() += 1;
    }

    fn merge(&mut self, other: SweepReport) {
        self.processed += other.processed;
        self.failed += other.failed;

        for (name, count) in other.outcomes {
            *self.outcomes.entry(name).or_default() += count;
        }
    }

    /// Number of passes with the given outcome.
    pub fn count(&self, outcome: &str) -> usize {
        self.outcomes.get(outcome).copied().unwrap_or_default()
    }
}

/// Reconcile every subscription of a platform, one at a time.
///
/// A failing subscription is logged and does not stop the sweep.
#[tracing::instrument(skip(reconciler), fields(platform = platform.as_str()))]
pub async fn sweep_platform(reconciler: &Reconciler, platform: Platform) -> Result<SweepReport> {
    let subscriptions = reconciler.store().list_by_platform(platform).await?;
    tracing::info!("Processing {} subscriptions", subscriptions.len());

    let mut report = SweepReport::default();

    for s in subscriptions {
        match reconciler.reconcile(&s.id).await {
            Ok(outcome) => report.record(&outcome),
            Err(e) => {
                report.processed += 1;
                report.failed += 1;
                common::log_error!(e, "{}: reconciliation failed", s.id);
            }
        }
    }

    tracing::info!(
        processed = report.processed,
        failed = report.failed,
        "Finished processing subscriptions"
    );

    Ok(report)
}

/// Sweep every configured platform concurrently.
pub async fn sweep_all(reconciler: &Reconciler) -> SweepReport {
    let mut tasks = JoinSet::new();

    for platform in reconciler.sources().platforms() {
        let reconciler = reconciler.clone();

        tasks.spawn(async move {
            let result = sweep_platform(&reconciler, platform).await;
            (platform, result)
        });
    }

    let mut report = SweepReport::default();

    while let Some(result) = tasks.join_next().await {
        match result {
            Ok((_, Ok(r))) => report.merge(r),
            Ok((platform, Err(e))) => {
                common::log_error!(e, "{}: failed to list subscriptions", platform);
            }
            Err(e) => {
                tracing::error!("Sweep task panicked: {}", e);
            }
        }
    }

    report
}

/// Sweep on a fixed interval, starting immediately.
///
/// Every tick is spawned so a slow sweep never delays the next one.
pub async fn run(reconciler: Reconciler, interval: Duration) -> Result<()> {
    let mut interval = tokio::time::interval(interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        tracing::trace!("Starting sweep");

        let reconciler = reconciler.clone();

        tokio::spawn(async move {
            let report = sweep_all(&reconciler).await;
            tracing::debug!(?report, "Sweep finished");
        });
    }
}
