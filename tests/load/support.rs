use serde_json::{json, Value};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use wiremock::{Match, Request};

use translator_stress::{
    Clock, Cooldown, CooldownSettings, HttpExecutor, HttpSettings, LoadDriver, ManualClock,
    PhaseStats, PollerSettings, ResultSink, SweepSettings,
};

/// Matches direct-provider queries whose batch contains any of the given ids
pub struct BatchContains(pub HashSet<String>);

impl Match for BatchContains {
    fn matches(&self, request: &Request) -> bool {
        serde_json::from_slice::<Value>(&request.body)
            .ok()
            .and_then(|body| {
                body.pointer("/message/query_graph/nodes/f/ids")
                    .and_then(Value::as_array)
                    .map(|ids| {
                        ids.iter()
                            .filter_map(Value::as_str)
                            .any(|id| self.0.contains(id))
                    })
            })
            .unwrap_or(false)
    }
}

pub fn trapi(results: usize) -> Value {
    let results: Vec<Value> = (0..results).map(|i| json!({"score": i})).collect();
    json!({"message": {"results": results}})
}

pub fn merged(results: usize) -> Value {
    let results: Vec<Value> = (0..results).map(|i| json!({"score": i})).collect();
    json!({"fields": {"data": {"message": {"results": results}}}})
}

pub fn pool(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("MONDO:{i:07}")).collect()
}

pub fn scratch_output() -> PathBuf {
    std::env::temp_dir()
        .join(format!("translator-stress-it-{}", uuid::Uuid::new_v4()))
        .join("stress_tests.json")
}

pub fn executor(timeout: Duration, clock: &ManualClock) -> Arc<HttpExecutor> {
    Arc::new(HttpExecutor::new(
        HttpSettings {
            timeout,
            ..HttpSettings::default()
        },
        PollerSettings {
            poll_interval: Duration::from_secs(10),
            max_query_time: Duration::from_secs(120),
        },
        Arc::new(clock.clone()),
    ))
}

pub async fn driver(
    timeout: Duration,
    sweep: SweepSettings,
    identifiers: Vec<String>,
) -> (LoadDriver, ManualClock) {
    let clock = ManualClock::new();
    let shared: Arc<dyn Clock> = Arc::new(clock.clone());
    let sink = Arc::new(ResultSink::create(scratch_output()).await.unwrap());
    let cooldown = Cooldown::new(
        CooldownSettings {
            direct: Duration::from_secs(1),
            aggregator: Duration::from_secs(30),
            async_job: Duration::from_secs(300),
            after_sequential: Duration::ZERO,
            between_endpoints: Duration::ZERO,
        },
        Arc::clone(&shared),
    );
    let driver = LoadDriver::new(
        executor(timeout, &clock),
        sink,
        cooldown,
        shared,
        sweep,
        identifiers,
    );
    (driver, clock)
}

/// Histogram and totals agree with the recorded calls
pub fn assert_consistent(stats: &PhaseStats) {
    assert_eq!(stats.status_histogram.values().sum::<usize>(), stats.results.len());
    assert_eq!(
        stats.results.iter().map(|r| r.result_count).sum::<usize>(),
        stats.total_results
    );
}
