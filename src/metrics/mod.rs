//! Anomaly metrics
//!
//! The pipeline reports every extraction anomaly to a [`MetricsSink`]. The
//! sink is fire-and-forget: reporting cannot fail a crawl.

use crate::extract::AnomalyKind;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Receives anomaly counts
pub trait MetricsSink: Send + Sync {
    fn increment_anomaly_count(&self, kind: AnomalyKind);
}

/// Emits each increment as a structured tracing event
///
/// Events use the `sumi_harvest::metrics` target so a subscriber can route
/// them separately from ordinary logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMetrics;

impl MetricsSink for TracingMetrics {
    fn increment_anomaly_count(&self, kind: AnomalyKind) {
        tracing::info!(
            target: "sumi_harvest::metrics",
            anomaly = kind.as_str(),
            "anomaly recorded"
        );
    }
}

/// Counts anomalies in memory
#[derive(Debug, Default)]
pub struct AnomalyCounter {
    counts: Mutex<BTreeMap<AnomalyKind, u64>>,
}

impl AnomalyCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, kind: AnomalyKind) -> u64 {
        self.snapshot().get(&kind).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.snapshot().values().sum()
    }

    pub fn snapshot(&self) -> BTreeMap<AnomalyKind, u64> {
        self.counts
            .lock()
            .map(|counts| counts.clone())
            .unwrap_or_default()
    }
}

impl MetricsSink for AnomalyCounter {
    fn increment_anomaly_count(&self, kind: AnomalyKind) {
        if let Ok(mut counts) = self.counts.lock() {
            *counts.entry(kind).or_insert(0) += 1;
        }
    }
}
