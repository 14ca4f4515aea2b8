pub mod catalog;
pub mod client;
pub mod clock;
pub mod config;
pub mod domain;
pub mod driver;
pub mod error;
pub mod query;
pub mod sink;
pub mod telemetry;

pub use client::{CallExecutor, HttpExecutor, HttpSettings, PollerSettings};
pub use clock::{Clock, ManualClock, TokioClock};
pub use config::Config;
pub use domain::{CallResult, CallStatus, Endpoint, Mode, PhaseStats, ProtocolKind, RunRegistry, Topology};
pub use driver::{Cooldown, CooldownSettings, LoadDriver, SweepSettings};
pub use error::{CallError, DriverError, FatalError};
pub use sink::ResultSink;
