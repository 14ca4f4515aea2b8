use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::time::Duration;
use strum::{Display, EnumString};

// ============================================================================
// Endpoint Types
// ============================================================================

/// How a service answers a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProtocolKind {
    /// Knowledge provider: one query in, one answer out
    Direct,
    /// Aggregator that fans out internally but answers synchronously
    SyncAggregate,
    /// Aggregator speaking the submit/poll/merge job protocol
    AsyncJob,
}

impl ProtocolKind {
    pub fn is_aggregator(&self) -> bool {
        !matches!(self, ProtocolKind::Direct)
    }
}

/// Per-endpoint adjustments to the outbound query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryOverrides {
    /// Edge predicates replacing the default "treats" predicate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicates: Option<Vec<String>>,
    /// Full query template; node `ids` lists are truncated to the batch size
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<serde_json::Value>,
}

/// A service under test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: String,
    pub url: String,
    pub kind: ProtocolKind,
    #[serde(default)]
    pub overrides: QueryOverrides,
}

impl Endpoint {
    pub fn new(id: impl Into<String>, url: impl Into<String>, kind: ProtocolKind) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            kind,
            overrides: QueryOverrides::default(),
        }
    }

    pub fn with_overrides(mut self, overrides: QueryOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Direct providers without a query template draw their batches from the
    /// shared identifier pool
    pub fn uses_identifier_pool(&self) -> bool {
        self.kind == ProtocolKind::Direct && self.overrides.query.is_none()
    }

    /// Base URL without a trailing slash, for composing job protocol paths
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }
}

// ============================================================================
// Call Outcome Types
// ============================================================================

/// Outcome label of a single call.
///
/// Serialized as a bare integer for HTTP codes and as a string otherwise, so
/// the output document reads `200`, `500`, `"timeout"` or `"Done"`.
///
/// Histogram keys are always strings on the wire, so a digit-only key reads
/// back as a code. Labels are job states and sentinels, never bare numbers;
/// a label like `"404"` does not survive a round trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CallStatus {
    Http(u16),
    Label(String),
}

impl CallStatus {
    pub const TIMEOUT: &'static str = "timeout";

    /// Sentinel for calls that never obtained a response
    pub fn timeout() -> Self {
        CallStatus::Label(Self::TIMEOUT.to_string())
    }

    pub fn label(label: impl Into<String>) -> Self {
        CallStatus::Label(label.into())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, CallStatus::Label(l) if l == Self::TIMEOUT)
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallStatus::Http(code) => write!(f, "{code}"),
            CallStatus::Label(label) => f.write_str(label),
        }
    }
}

impl From<u16> for CallStatus {
    fn from(code: u16) -> Self {
        CallStatus::Http(code)
    }
}

impl From<&str> for CallStatus {
    fn from(label: &str) -> Self {
        CallStatus::Label(label.to_string())
    }
}

impl Serialize for CallStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CallStatus::Http(code) => serializer.serialize_u16(*code),
            CallStatus::Label(label) => serializer.serialize_str(label),
        }
    }
}

impl<'de> Deserialize<'de> for CallStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(CallStatusVisitor)
    }
}

struct CallStatusVisitor;

impl<'de> Visitor<'de> for CallStatusVisitor {
    type Value = CallStatus;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an HTTP status code or a status label")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<CallStatus, E> {
        u16::try_from(v)
            .map(CallStatus::Http)
            .map_err(|_| E::custom(format!("status code out of range: {v}")))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<CallStatus, E> {
        u16::try_from(v)
            .map(CallStatus::Http)
            .map_err(|_| E::custom(format!("status code out of range: {v}")))
    }

    // Map keys always arrive as strings; numeric keys are status codes.
    fn visit_str<E: de::Error>(self, v: &str) -> Result<CallStatus, E> {
        if !v.is_empty() && v.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(code) = v.parse::<u16>() {
                return Ok(CallStatus::Http(code));
            }
        }
        Ok(CallStatus::Label(v.to_string()))
    }
}

/// One completed or faulted call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallResult {
    pub status: CallStatus,
    #[serde(rename = "num_results")]
    pub result_count: usize,
    #[serde(rename = "response_time")]
    pub elapsed_seconds: f64,
    #[serde(rename = "num_curies")]
    pub batch_size: usize,
    #[serde(rename = "curies", default, skip_serializing_if = "Vec::is_empty")]
    pub identifiers: Vec<String>,
}

impl CallResult {
    pub fn new(status: impl Into<CallStatus>, result_count: usize, elapsed: Duration) -> Self {
        Self {
            status: status.into(),
            result_count,
            elapsed_seconds: elapsed.as_secs_f64(),
            batch_size: 0,
            identifiers: Vec::new(),
        }
    }

    /// A call that produced no usable answer
    pub fn fault(status: CallStatus, elapsed: Duration) -> Self {
        Self::new(status, 0, elapsed)
    }

    pub fn with_batch(mut self, identifiers: &[String], record_identifiers: bool) -> Self {
        self.batch_size = identifiers.len();
        if record_identifiers {
            self.identifiers = identifiers.to_vec();
        }
        self
    }
}

// ============================================================================
// Run Shape Types
// ============================================================================

/// Execution mode of a phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Mode {
    Sequential,
    Concurrent,
}

/// How endpoint sweeps are scheduled relative to each other
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Topology {
    /// One endpoint's full sweep finishes before the next starts
    #[default]
    Serialized,
    /// Every endpoint's sweep runs at the same time
    Parallel,
}
