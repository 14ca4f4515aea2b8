//! Submit/poll/merge driver for asynchronous aggregators.
//!
//! ```text
//! POST {base}/submit                 -> {"pk": <job id>}
//! GET  {base}/messages/{pk}?trace=y  -> {"status": ..., "merged_version": ...}
//! GET  {base}/messages/{merged}      -> {"fields": {"data": {"message": {"results": [...]}}}}
//! ```

use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use super::{count_results, CallOutcome};
use crate::clock::Clock;
use crate::domain::{CallStatus, JobState, JobStatusReport};
use crate::error::CallError;

/// Result path inside a merged job message
pub const MERGED_RESULTS_PATH: &str = "/fields/data/message/results";

#[derive(Debug, Clone, PartialEq)]
pub struct PollerSettings {
    /// Wait before each status poll
    pub poll_interval: Duration,
    /// Wall-clock budget for the whole job, submission included
    pub max_query_time: Duration,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            max_query_time: Duration::from_secs(3600),
        }
    }
}

pub struct JobPoller<'a> {
    client: &'a reqwest::Client,
    settings: &'a PollerSettings,
    clock: &'a dyn Clock,
}

impl<'a> JobPoller<'a> {
    pub fn new(client: &'a reqwest::Client, settings: &'a PollerSettings, clock: &'a dyn Clock) -> Self {
        Self {
            client,
            settings,
            clock,
        }
    }

    /// Runs one job to completion, failure or budget expiry.
    ///
    /// A call that ends without a terminal state, by a fault or by budget
    /// expiry, reports the last status seen: the submission's HTTP code until
    /// a poll has answered, the job label afterwards.
    pub async fn run(&self, base: &str, payload: &Value) -> CallOutcome {
        let start = self.clock.now();

        let mut submitted = CallStatus::timeout();
        let mut job = match self.submit(base, payload, &mut submitted).await {
            Ok(job) => job,
            Err(e) => {
                debug!(base, kind = e.kind(), error = %e, "job submission failed");
                return CallOutcome::failed(submitted);
            }
        };
        debug!(base, pk = job.parent_id(), "job submitted");

        loop {
            self.clock.sleep(self.settings.poll_interval).await;
            if self.clock.since(start) > self.settings.max_query_time {
                warn!(
                    base,
                    pk = job.parent_id(),
                    last_status = job.last_label().unwrap_or("none"),
                    budget_s = self.settings.max_query_time.as_secs_f64(),
                    "job did not finish within its budget"
                );
                return CallOutcome::failed(last_status(&job, &submitted));
            }

            let report = match self.poll(base, job.parent_id()).await {
                Ok(report) => report,
                Err(e) => {
                    debug!(base, pk = job.parent_id(), kind = e.kind(), error = %e, "job poll failed");
                    return CallOutcome::failed(last_status(&job, &submitted));
                }
            };
            if job.observe(report) {
                debug!(base, pk = job.parent_id(), status = ?job.status(), "job advanced");
            }
            if job.is_terminal() {
                return self.resolve(base, &job).await;
            }
        }
    }

    async fn submit(
        &self,
        base: &str,
        payload: &Value,
        status: &mut CallStatus,
    ) -> Result<JobState, CallError> {
        let resp = self
            .client
            .post(format!("{base}/submit"))
            .json(payload)
            .send()
            .await?;
        let code = resp.status();
        *status = CallStatus::Http(code.as_u16());
        if !code.is_success() {
            return Err(CallError::Http(code.as_u16()));
        }
        let body: Value = resp.json().await?;
        match body.get("pk") {
            Some(Value::String(pk)) if !pk.is_empty() => Ok(JobState::submitted(pk.clone())),
            Some(Value::Number(pk)) => Ok(JobState::submitted(pk.to_string())),
            _ => Err(CallError::Malformed("submission response has no pk".into())),
        }
    }

    async fn poll(&self, base: &str, pk: &str) -> Result<JobStatusReport, CallError> {
        let resp = self
            .client
            .get(format!("{base}/messages/{pk}"))
            .query(&[("trace", "y")])
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json::<JobStatusReport>().await?)
    }

    async fn resolve(&self, base: &str, job: &JobState) -> CallOutcome {
        let status = job.reported_status();
        let Some(merged) = job.merged_id() else {
            warn!(base, pk = job.parent_id(), %status, "job finished without a merged message");
            return CallOutcome::failed(status);
        };

        match self.fetch_merged(base, merged).await {
            Ok(count) => CallOutcome::answered(status, count),
            Err(e) => {
                debug!(base, merged, kind = e.kind(), error = %e, "merged message fetch failed");
                CallOutcome::failed(status)
            }
        }
    }

    async fn fetch_merged(&self, base: &str, merged: &str) -> Result<usize, CallError> {
        let body: Value = self
            .client
            .get(format!("{base}/messages/{merged}"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(count_results(&body, MERGED_RESULTS_PATH))
    }
}

fn last_status(job: &JobState, submitted: &CallStatus) -> CallStatus {
    if job.last_label().is_some() {
        job.reported_status()
    } else {
        submitted.clone()
    }
}
