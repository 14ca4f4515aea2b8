pub mod poller;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::clock::Clock;
use crate::domain::{CallResult, CallStatus, Endpoint, ProtocolKind};
use crate::error::{CallError, FatalError};
use crate::query::{build_payload, payload_identifiers};

pub use poller::{JobPoller, PollerSettings};

/// Result path of a TRAPI response
pub const RESULTS_PATH: &str = "/message/results";

/// Runs one call against an endpoint.
///
/// Implementations never fail for network, protocol or parsing faults; those
/// come back as a [`CallResult`] with zero results. The only error is a
/// [`FatalError`], which the driver must not record as a sample.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CallExecutor: Send + Sync {
    async fn execute(&self, endpoint: &Endpoint, identifiers: &[String]) -> Result<CallResult, FatalError>;
}

#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(600),
            user_agent: concat!("translator-stress/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl HttpSettings {
    /// A fresh client; every call opens and drops its own
    pub fn build_client(&self) -> reqwest::Result<reqwest::Client> {
        let mut headers = HeaderMap::new();
        if let Ok(agent) = HeaderValue::from_str(&self.user_agent) {
            headers.insert(USER_AGENT, agent);
        }
        reqwest::Client::builder()
            .timeout(self.timeout)
            .default_headers(headers)
            .build()
    }
}

/// Final status and result count of one call, before timing is attached
#[derive(Debug, Clone, PartialEq)]
pub struct CallOutcome {
    pub status: CallStatus,
    pub result_count: usize,
}

impl CallOutcome {
    pub fn answered(status: CallStatus, result_count: usize) -> Self {
        Self {
            status,
            result_count,
        }
    }

    pub fn failed(status: CallStatus) -> Self {
        Self::answered(status, 0)
    }
}

/// Length of the array at `pointer`; absent or null counts as zero
pub fn count_results(body: &Value, pointer: &str) -> usize {
    body.pointer(pointer)
        .and_then(Value::as_array)
        .map(Vec::len)
        .unwrap_or(0)
}

/// Application-level error embedded in a 200 response, if any
fn embedded_errors(body: &Value) -> Option<&Value> {
    body.pointer("/message/errors").filter(|errors| match errors {
        Value::Null => false,
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        _ => true,
    })
}

/// Call executor speaking HTTP, dispatching on the endpoint's protocol kind
pub struct HttpExecutor {
    http: HttpSettings,
    poller: PollerSettings,
    clock: Arc<dyn Clock>,
}

impl HttpExecutor {
    pub fn new(http: HttpSettings, poller: PollerSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            http,
            poller,
            clock,
        }
    }

    async fn post_once(&self, endpoint: &Endpoint, payload: &Value) -> Result<CallOutcome, FatalError> {
        let client = match self.http.build_client() {
            Ok(client) => client,
            Err(e) => {
                warn!(endpoint = %endpoint.id, error = %e, "could not build HTTP client");
                return Ok(CallOutcome::failed(CallStatus::timeout()));
            }
        };

        let mut status = CallStatus::timeout();
        match self.try_post(&client, endpoint, payload, &mut status).await {
            Ok(count) => Ok(CallOutcome::answered(status, count)),
            Err(CallError::Application(body)) if endpoint.kind == ProtocolKind::Direct => {
                error!(endpoint = %endpoint.id, "provider embedded an application error in its response");
                Err(FatalError::Application {
                    endpoint: endpoint.id.clone(),
                    body,
                })
            }
            Err(e) => {
                debug!(endpoint = %endpoint.id, kind = e.kind(), error = %e, %status, "call failed");
                Ok(CallOutcome::failed(status))
            }
        }
    }

    /// `status` is updated as soon as a response line arrives so faults after
    /// that point are reported with the HTTP code rather than the sentinel.
    async fn try_post(
        &self,
        client: &reqwest::Client,
        endpoint: &Endpoint,
        payload: &Value,
        status: &mut CallStatus,
    ) -> Result<usize, CallError> {
        let resp = client.post(&endpoint.url).json(payload).send().await?;
        let code = resp.status();
        *status = CallStatus::Http(code.as_u16());
        if !code.is_success() {
            return Err(CallError::Http(code.as_u16()));
        }

        let text = resp.text().await?;
        let body: Value =
            serde_json::from_str(&text).map_err(|e| CallError::Malformed(e.to_string()))?;

        if embedded_errors(&body).is_some() {
            if endpoint.kind == ProtocolKind::Direct {
                return Err(CallError::Application(text));
            }
            warn!(endpoint = %endpoint.id, "aggregator response carries application errors");
        }

        Ok(count_results(&body, RESULTS_PATH))
    }

    async fn run_job(&self, endpoint: &Endpoint, payload: &Value) -> CallOutcome {
        let client = match self.http.build_client() {
            Ok(client) => client,
            Err(e) => {
                warn!(endpoint = %endpoint.id, error = %e, "could not build HTTP client");
                return CallOutcome::failed(CallStatus::timeout());
            }
        };
        JobPoller::new(&client, &self.poller, self.clock.as_ref())
            .run(endpoint.base_url(), payload)
            .await
    }
}

#[async_trait]
impl CallExecutor for HttpExecutor {
    async fn execute(&self, endpoint: &Endpoint, identifiers: &[String]) -> Result<CallResult, FatalError> {
        let payload = build_payload(endpoint, identifiers);
        let start = self.clock.now();

        let outcome = match endpoint.kind {
            ProtocolKind::Direct | ProtocolKind::SyncAggregate => {
                self.post_once(endpoint, &payload).await?
            }
            ProtocolKind::AsyncJob => self.run_job(endpoint, &payload).await,
        };

        let elapsed = self.clock.since(start);
        debug!(
            endpoint = %endpoint.id,
            status = %outcome.status,
            results = outcome.result_count,
            elapsed_s = elapsed.as_secs_f64(),
            "call finished"
        );
        let result = CallResult::new(outcome.status, outcome.result_count, elapsed);
        Ok(match endpoint.kind {
            ProtocolKind::Direct => result.with_batch(&payload_identifiers(&payload), true),
            ProtocolKind::SyncAggregate | ProtocolKind::AsyncJob => result.with_batch(identifiers, false),
        })
    }
}
