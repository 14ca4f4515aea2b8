use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use super::{CallResult, CallStatus};

/// Summary of one phase: one sequential run or one concurrency level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseStats {
    /// Wall time of the whole phase, not the sum of call times
    #[serde(rename = "total_time")]
    pub total_elapsed_seconds: f64,
    pub total_results: usize,
    #[serde(rename = "statuses")]
    pub status_histogram: BTreeMap<CallStatus, usize>,
    /// Call outcomes in the order the calls were issued
    pub results: Vec<CallResult>,
}

impl PhaseStats {
    /// Folds a phase's outcomes into its summary.
    pub fn aggregate(results: Vec<CallResult>, wall_time: Duration) -> Self {
        let mut status_histogram = BTreeMap::new();
        let mut total_results = 0;
        for result in &results {
            total_results += result.result_count;
            *status_histogram.entry(result.status.clone()).or_insert(0) += 1;
        }
        Self {
            total_elapsed_seconds: wall_time.as_secs_f64(),
            total_results,
            status_histogram,
            results,
        }
    }

    pub fn calls(&self) -> usize {
        self.results.len()
    }

    pub fn count_of(&self, status: &CallStatus) -> usize {
        self.status_histogram.get(status).copied().unwrap_or(0)
    }

    /// Calls per second over the phase wall time
    pub fn throughput(&self) -> f64 {
        if self.total_elapsed_seconds > 0.0 {
            self.results.len() as f64 / self.total_elapsed_seconds
        } else {
            0.0
        }
    }

    pub fn mean_latency_seconds(&self) -> Option<f64> {
        if self.results.is_empty() {
            return None;
        }
        let sum: f64 = self.results.iter().map(|r| r.elapsed_seconds).sum();
        Some(sum / self.results.len() as f64)
    }
}
