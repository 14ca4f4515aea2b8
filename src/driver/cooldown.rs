use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::clock::Clock;
use crate::domain::ProtocolKind;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CooldownSettings {
    /// After each concurrent phase against a direct provider
    pub direct: Duration,
    /// After each concurrent phase against a synchronous aggregator
    pub aggregator: Duration,
    /// After each concurrent phase against an asynchronous aggregator
    pub async_job: Duration,
    /// Between an endpoint's sequential and concurrent sweeps
    pub after_sequential: Duration,
    /// Between two endpoints in the serialized topology
    pub between_endpoints: Duration,
}

/// Inserts rest periods between phases so the target can recover
#[derive(Clone)]
pub struct Cooldown {
    settings: CooldownSettings,
    clock: Arc<dyn Clock>,
}

impl Cooldown {
    pub fn new(settings: CooldownSettings, clock: Arc<dyn Clock>) -> Self {
        Self { settings, clock }
    }

    pub fn after_concurrent_phase(&self, kind: ProtocolKind) -> Duration {
        match kind {
            ProtocolKind::Direct => self.settings.direct,
            ProtocolKind::SyncAggregate => self.settings.aggregator,
            ProtocolKind::AsyncJob => self.settings.async_job,
        }
    }

    pub async fn after_phase(&self, endpoint: &str, kind: ProtocolKind) {
        self.wait(endpoint, "phase", self.after_concurrent_phase(kind)).await;
    }

    pub async fn after_sequential(&self, endpoint: &str) {
        self.wait(endpoint, "sequential sweep", self.settings.after_sequential).await;
    }

    pub async fn between_endpoints(&self, endpoint: &str) {
        self.wait(endpoint, "endpoint", self.settings.between_endpoints).await;
    }

    async fn wait(&self, endpoint: &str, after: &str, delay: Duration) {
        if delay.is_zero() {
            return;
        }
        info!(%endpoint, after, delay_s = delay.as_secs_f64(), "cooling down");
        self.clock.sleep(delay).await;
    }
}
