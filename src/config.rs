use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use validator::{Validate, ValidationError};

use crate::client::{HttpSettings, PollerSettings};
use crate::domain::Topology;
use crate::driver::{CooldownSettings, SweepSettings};

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";
pub const ENV_PREFIX: &str = "STRESS__";

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct Config {
    #[validate(nested)]
    pub catalog: CatalogConfig,
    #[validate(nested)]
    pub http: HttpConfig,
    #[validate(nested)]
    pub poller: PollerConfig,
    #[validate(nested)]
    pub sweep: SweepConfig,
    pub cooldown: CooldownConfig,
    #[validate(nested)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CatalogConfig {
    pub endpoints_file: PathBuf,
    /// Required when any endpoint is a direct provider
    pub identifiers_file: Option<PathBuf>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            endpoints_file: PathBuf::from("endpoints.json"),
            identifiers_file: Some(PathBuf::from("curie_list.json")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct HttpConfig {
    #[validate(range(min = 1))]
    pub timeout_secs: u64,
    #[validate(length(min = 1))]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        let defaults = HttpSettings::default();
        Self {
            timeout_secs: defaults.timeout.as_secs(),
            user_agent: defaults.user_agent,
        }
    }
}

impl HttpConfig {
    pub fn settings(&self) -> HttpSettings {
        HttpSettings {
            timeout: Duration::from_secs(self.timeout_secs),
            user_agent: self.user_agent.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "budget_covers_interval"))]
pub struct PollerConfig {
    pub poll_interval_secs: u64,
    #[validate(range(min = 1))]
    pub max_query_time_secs: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 10,
            max_query_time_secs: 3600,
        }
    }
}

impl PollerConfig {
    pub fn settings(&self) -> PollerSettings {
        PollerSettings {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            max_query_time: Duration::from_secs(self.max_query_time_secs),
        }
    }
}

fn budget_covers_interval(poller: &PollerConfig) -> Result<(), ValidationError> {
    if poller.max_query_time_secs < poller.poll_interval_secs {
        return Err(ValidationError::new("max_query_time_shorter_than_poll_interval"));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SweepConfig {
    pub sequential_calls: usize,
    #[validate(custom(function = "distinct_levels"))]
    pub concurrency_levels: Vec<usize>,
    #[validate(length(min = 1), custom(function = "distinct_positive"))]
    pub batch_sizes: Vec<usize>,
    pub topology: Topology,
}

impl Default for SweepConfig {
    fn default() -> Self {
        let defaults = SweepSettings::default();
        Self {
            sequential_calls: defaults.sequential_calls,
            concurrency_levels: defaults.concurrency_levels,
            batch_sizes: defaults.batch_sizes,
            topology: defaults.topology,
        }
    }
}

impl SweepConfig {
    pub fn settings(&self) -> SweepSettings {
        SweepSettings {
            sequential_calls: self.sequential_calls,
            concurrency_levels: self.concurrency_levels.clone(),
            batch_sizes: self.batch_sizes.clone(),
            topology: self.topology,
        }
    }
}

// Each variant is a registry key, so repeats would collide.
fn distinct_levels(values: &Vec<usize>) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    if values.iter().all(|v| seen.insert(*v)) {
        Ok(())
    } else {
        Err(ValidationError::new("duplicate_variant"))
    }
}

fn distinct_positive(values: &Vec<usize>) -> Result<(), ValidationError> {
    if values.contains(&0) {
        return Err(ValidationError::new("zero_batch_size"));
    }
    distinct_levels(values)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CooldownConfig {
    pub direct_secs: u64,
    pub aggregator_secs: u64,
    pub async_secs: u64,
    pub after_sequential_secs: u64,
    pub between_endpoints_secs: u64,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            direct_secs: 0,
            aggregator_secs: 30,
            async_secs: 300,
            after_sequential_secs: 0,
            between_endpoints_secs: 0,
        }
    }
}

impl CooldownConfig {
    pub fn settings(&self) -> CooldownSettings {
        CooldownSettings {
            direct: Duration::from_secs(self.direct_secs),
            aggregator: Duration::from_secs(self.aggregator_secs),
            async_job: Duration::from_secs(self.async_secs),
            after_sequential: Duration::from_secs(self.after_sequential_secs),
            between_endpoints: Duration::from_secs(self.between_endpoints_secs),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct OutputConfig {
    pub dir: PathBuf,
    #[validate(length(min = 1))]
    pub prefix: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("results"),
            prefix: "stress_tests".to_string(),
        }
    }
}

impl Config {
    /// Defaults, then the TOML file, then `STRESS__`-prefixed environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();
        let file = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
        let figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));
        Self::from_figment(figment)
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let cfg: Config = figment.extract().context("loading configuration")?;
        cfg.validate().context("invalid configuration")?;
        Ok(cfg)
    }
}
