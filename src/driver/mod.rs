pub mod cooldown;

use futures::future::join_all;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::client::CallExecutor;
use crate::clock::Clock;
use crate::domain::{CallResult, CallStatus, Endpoint, Mode, PhaseStats, ProtocolKind, Topology};
use crate::error::{DriverError, FatalError};
use crate::query::template_batch;
use crate::sink::ResultSink;

pub use cooldown::{Cooldown, CooldownSettings};

#[derive(Debug, Clone, PartialEq)]
pub struct SweepSettings {
    /// Calls in an aggregator's sequential baseline
    pub sequential_calls: usize,
    /// Simultaneous calls per aggregator concurrent phase
    pub concurrency_levels: Vec<usize>,
    /// Identifiers per call for direct providers
    pub batch_sizes: Vec<usize>,
    pub topology: Topology,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            sequential_calls: 15,
            concurrency_levels: vec![10, 50, 100, 1000],
            batch_sizes: vec![1, 10, 100, 1000],
            topology: Topology::Serialized,
        }
    }
}

/// One phase to run: the calls it issues and the key it is recorded under
#[derive(Debug, Clone, PartialEq)]
pub struct PhasePlan {
    pub mode: Mode,
    pub variant: usize,
    /// Identifiers of each call; empty for the fixed aggregator query
    pub calls: Vec<Vec<String>>,
}

/// Splits the pool into `ceil(len / batch_size)` consecutive batches
pub fn batches(identifiers: &[String], batch_size: usize) -> Vec<Vec<String>> {
    identifiers
        .chunks(batch_size.max(1))
        .map(<[String]>::to_vec)
        .collect()
}

/// Every phase of one endpoint, sequential sweep first.
///
/// Direct providers sweep batch size over a fixed identifier pool and run
/// all batches of a size at once in the concurrent phase. A provider with its
/// own query template ignores the pool: each batch-size phase repeats the
/// template's leading ids `sequential_calls` times. Aggregators sweep
/// concurrency level against one fixed query.
pub fn plan_endpoint(endpoint: &Endpoint, sweep: &SweepSettings, identifiers: &[String]) -> Vec<PhasePlan> {
    let mut plans = Vec::new();
    match (endpoint.kind, &endpoint.overrides.query) {
        (ProtocolKind::Direct, template) => {
            for mode in [Mode::Sequential, Mode::Concurrent] {
                for &size in &sweep.batch_sizes {
                    let calls = match template {
                        Some(template) => vec![template_batch(template, size); sweep.sequential_calls],
                        None => batches(identifiers, size),
                    };
                    plans.push(PhasePlan {
                        mode,
                        variant: size,
                        calls,
                    });
                }
            }
        }
        (ProtocolKind::SyncAggregate | ProtocolKind::AsyncJob, _) => {
            plans.push(PhasePlan {
                mode: Mode::Sequential,
                variant: sweep.sequential_calls,
                calls: vec![Vec::new(); sweep.sequential_calls],
            });
            for &level in &sweep.concurrency_levels {
                plans.push(PhasePlan {
                    mode: Mode::Concurrent,
                    variant: level,
                    calls: vec![Vec::new(); level],
                });
            }
        }
    }
    plans
}

/// Drives sweeps against a set of endpoints and records every phase
pub struct LoadDriver {
    executor: Arc<dyn CallExecutor>,
    sink: Arc<ResultSink>,
    cooldown: Cooldown,
    clock: Arc<dyn Clock>,
    sweep: SweepSettings,
    identifiers: Arc<Vec<String>>,
}

impl LoadDriver {
    pub fn new(
        executor: Arc<dyn CallExecutor>,
        sink: Arc<ResultSink>,
        cooldown: Cooldown,
        clock: Arc<dyn Clock>,
        sweep: SweepSettings,
        identifiers: Vec<String>,
    ) -> Self {
        Self {
            executor,
            sink,
            cooldown,
            clock,
            sweep,
            identifiers: Arc::new(identifiers),
        }
    }

    pub fn sink(&self) -> &ResultSink {
        &self.sink
    }

    /// Runs every endpoint in the configured topology.
    ///
    /// In the parallel topology a failing endpoint does not stop the others;
    /// the first error is returned once all sweeps have ended.
    pub async fn run(&self, endpoints: &[Endpoint]) -> Result<(), DriverError> {
        info!(
            endpoints = endpoints.len(),
            identifiers = self.identifiers.len(),
            topology = %self.sweep.topology,
            "starting run"
        );
        match self.sweep.topology {
            Topology::Serialized => {
                for (i, endpoint) in endpoints.iter().enumerate() {
                    if i > 0 {
                        self.cooldown.between_endpoints(&endpoint.id).await;
                    }
                    self.run_endpoint(endpoint).await?;
                }
                Ok(())
            }
            Topology::Parallel => {
                let outcomes = join_all(endpoints.iter().map(|ep| self.run_endpoint(ep))).await;
                let mut first = None;
                for (endpoint, outcome) in endpoints.iter().zip(outcomes) {
                    if let Err(e) = outcome {
                        error!(endpoint = %endpoint.id, error = %e, "endpoint sweep halted");
                        first.get_or_insert(e);
                    }
                }
                first.map_or(Ok(()), Err)
            }
        }
    }

    /// Full sequential-then-concurrent sweep of one endpoint
    pub async fn run_endpoint(&self, endpoint: &Endpoint) -> Result<(), DriverError> {
        let endpoint = Arc::new(endpoint.clone());
        let plans = plan_endpoint(&endpoint, &self.sweep, &self.identifiers);
        let mut previous = None;

        for plan in plans {
            if previous == Some(Mode::Sequential) && plan.mode == Mode::Concurrent {
                self.cooldown.after_sequential(&endpoint.id).await;
            }
            previous = Some(plan.mode);

            let calls = plan.calls.len();
            info!(endpoint = %endpoint.id, mode = %plan.mode, variant = plan.variant, calls, "phase starting");
            let outcome = match plan.mode {
                Mode::Sequential => self.run_sequential(&endpoint, plan.calls).await,
                Mode::Concurrent => self.run_concurrent(&endpoint, plan.calls).await,
            };

            let stats = match outcome {
                Ok(stats) => stats,
                Err(fatal) => return Err(self.halt(fatal).await),
            };
            info!(
                endpoint = %endpoint.id,
                mode = %plan.mode,
                variant = plan.variant,
                calls,
                total_results = stats.total_results,
                elapsed_s = stats.total_elapsed_seconds,
                "phase finished"
            );
            self.sink
                .record(plan.mode, &endpoint.id, plan.variant, stats)
                .await
                .map_err(DriverError::Sink)?;

            if plan.mode == Mode::Concurrent {
                self.cooldown.after_phase(&endpoint.id, endpoint.kind).await;
            }
        }
        Ok(())
    }

    /// Calls one at a time; an application error stops the phase at once.
    pub async fn run_sequential(&self, endpoint: &Endpoint, calls: Vec<Vec<String>>) -> Result<PhaseStats, FatalError> {
        let start = self.clock.now();
        let mut results = Vec::with_capacity(calls.len());
        for identifiers in &calls {
            results.push(self.executor.execute(endpoint, identifiers).await?);
        }
        Ok(PhaseStats::aggregate(results, self.clock.since(start)))
    }

    /// Launches every call at once and waits for all of them.
    ///
    /// A call that fails, even fatally, never cancels its siblings; the phase
    /// only reports the application error after the barrier.
    pub async fn run_concurrent(&self, endpoint: &Arc<Endpoint>, calls: Vec<Vec<String>>) -> Result<PhaseStats, FatalError> {
        let start = self.clock.now();
        let sizes: Vec<usize> = calls.iter().map(Vec::len).collect();
        let handles = calls.into_iter().map(|identifiers| {
            let executor = Arc::clone(&self.executor);
            let endpoint = Arc::clone(endpoint);
            tokio::spawn(async move { executor.execute(&endpoint, &identifiers).await })
        });
        let settled = join_all(handles).await;
        let wall = self.clock.since(start);

        let mut fatal = None;
        let mut results = Vec::with_capacity(settled.len());
        for (outcome, size) in settled.into_iter().zip(sizes) {
            match outcome {
                Ok(Ok(result)) => results.push(result),
                Ok(Err(e)) => {
                    fatal.get_or_insert(e);
                }
                Err(join) => {
                    warn!(endpoint = %endpoint.id, error = %join, "call task aborted");
                    let mut result = CallResult::fault(CallStatus::label("aborted"), wall);
                    result.batch_size = size;
                    results.push(result);
                }
            }
        }
        match fatal {
            Some(e) => Err(e),
            None => Ok(PhaseStats::aggregate(results, wall)),
        }
    }

    async fn halt(&self, fatal: FatalError) -> DriverError {
        error!(endpoint = fatal.endpoint(), error = %fatal, "halting sweep");
        match self.sink.write_diagnostic(&fatal).await {
            Ok(_) => DriverError::Fatal(fatal),
            Err(e) => DriverError::Sink(e.context(fatal.to_string())),
        }
    }
}
