use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{Mode, PhaseStats};

/// Phases of one endpoint keyed by batch size or concurrency level
pub type EndpointPhases = BTreeMap<usize, PhaseStats>;

/// Every completed phase of a run.
///
/// Only ever extended: a phase entry, once recorded, is not replaced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunRegistry {
    #[serde(default)]
    pub sequential: BTreeMap<String, EndpointPhases>,
    #[serde(default)]
    pub concurrent: BTreeMap<String, EndpointPhases>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn mode_mut(&mut self, mode: Mode) -> &mut BTreeMap<String, EndpointPhases> {
        match mode {
            Mode::Sequential => &mut self.sequential,
            Mode::Concurrent => &mut self.concurrent,
        }
    }

    pub fn mode(&self, mode: Mode) -> &BTreeMap<String, EndpointPhases> {
        match mode {
            Mode::Sequential => &self.sequential,
            Mode::Concurrent => &self.concurrent,
        }
    }

    /// Records a phase. Returns `false` and leaves the registry untouched if
    /// that phase was already recorded.
    pub fn record(&mut self, mode: Mode, endpoint: &str, variant: usize, stats: PhaseStats) -> bool {
        let phases = self.mode_mut(mode).entry(endpoint.to_string()).or_default();
        if phases.contains_key(&variant) {
            return false;
        }
        phases.insert(variant, stats);
        true
    }

    pub fn get(&self, mode: Mode, endpoint: &str, variant: usize) -> Option<&PhaseStats> {
        self.mode(mode).get(endpoint).and_then(|p| p.get(&variant))
    }

    pub fn phase_count(&self) -> usize {
        self.sequential.values().map(BTreeMap::len).sum::<usize>()
            + self.concurrent.values().map(BTreeMap::len).sum::<usize>()
    }
}
