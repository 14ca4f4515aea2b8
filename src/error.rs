use thiserror::Error;

/// Why a single call produced no usable answer.
///
/// Never leaves the executor: every variant is folded into a
/// [`CallResult`](crate::domain::CallResult) with zero results.
#[derive(Debug, Error)]
pub enum CallError {
    #[error("no response within the request timeout")]
    Timeout,

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("HTTP {0}")]
    Http(u16),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("service reported an application error")]
    Application(String),
}

impl From<reqwest::Error> for CallError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CallError::Timeout
        } else if let Some(status) = err.status() {
            CallError::Http(status.as_u16())
        } else if err.is_decode() {
            CallError::Malformed(err.to_string())
        } else {
            CallError::Transport(err.to_string())
        }
    }
}

impl CallError {
    pub fn kind(&self) -> &'static str {
        match self {
            CallError::Timeout => "timeout",
            CallError::Transport(_) => "transport",
            CallError::Http(_) => "http",
            CallError::Malformed(_) => "malformed",
            CallError::Application(_) => "application",
        }
    }
}

/// Conditions that stop a sweep instead of being recorded as a sample
#[derive(Debug, Clone, Error)]
pub enum FatalError {
    #[error("{endpoint} answered with an application error")]
    Application { endpoint: String, body: String },
}

impl FatalError {
    pub fn endpoint(&self) -> &str {
        match self {
            FatalError::Application { endpoint, .. } => endpoint,
        }
    }
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    Fatal(#[from] FatalError),

    #[error("result sink failed: {0:#}")]
    Sink(anyhow::Error),
}

impl DriverError {
    pub fn is_fatal_application(&self) -> bool {
        matches!(self, DriverError::Fatal(FatalError::Application { .. }))
    }
}
