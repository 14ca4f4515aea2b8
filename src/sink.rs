//! Incremental persistence of the run document.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::domain::{Mode, PhaseStats, RunRegistry};
use crate::error::FatalError;

/// Owns the run registry and the file it is mirrored to.
///
/// Every recorded phase rewrites the whole document through a temporary file
/// and a rename, under one lock, so concurrent endpoint sweeps never
/// interleave writes and readers never see a half-written file.
pub struct ResultSink {
    path: PathBuf,
    registry: Mutex<RunRegistry>,
}

impl ResultSink {
    /// `{dir}/{prefix}_{YYYY_MM_DD_HH_MM_SS}.json`
    pub fn output_path(dir: &Path, prefix: &str, started: DateTime<Local>) -> PathBuf {
        dir.join(format!("{prefix}_{}.json", started.format("%Y_%m_%d_%H_%M_%S")))
    }

    /// Creates the output directory and writes the empty document.
    pub async fn create(path: PathBuf) -> Result<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("creating output directory {}", dir.display()))?;
        }
        let sink = Self {
            path,
            registry: Mutex::new(RunRegistry::new()),
        };
        {
            let registry = sink.registry.lock().await;
            sink.write(&registry).await?;
        }
        info!(path = %sink.path.display(), "writing results");
        Ok(sink)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Adds a phase to the registry and persists the full document.
    pub async fn record(&self, mode: Mode, endpoint: &str, variant: usize, stats: PhaseStats) -> Result<()> {
        let mut registry = self.registry.lock().await;
        if !registry.record(mode, endpoint, variant, stats) {
            anyhow::bail!("phase {mode}/{endpoint}/{variant} was already recorded");
        }
        self.write(&registry).await
    }

    pub async fn snapshot(&self) -> RunRegistry {
        self.registry.lock().await.clone()
    }

    /// Writes the offending response next to the results and returns its path.
    pub async fn write_diagnostic(&self, fatal: &FatalError) -> Result<PathBuf> {
        let FatalError::Application { endpoint, body } = fatal;
        let stem = self
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("results");
        let safe_endpoint: String = endpoint
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        let path = self.path.with_file_name(format!("{stem}_fatal_{safe_endpoint}.json"));

        // keep the body byte-for-byte unless it parses, then pretty-print it
        let contents = match serde_json::from_str::<serde_json::Value>(body) {
            Ok(value) => serde_json::to_string_pretty(&value)?,
            Err(_) => body.clone(),
        };
        tokio::fs::write(&path, contents)
            .await
            .with_context(|| format!("writing diagnostic {}", path.display()))?;
        error!(%endpoint, path = %path.display(), "saved response carrying an application error");
        Ok(path)
    }

    async fn write(&self, registry: &RunRegistry) -> Result<()> {
        let json = serde_json::to_vec_pretty(registry).context("serializing run document")?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }
}

/// Reads a run document back from disk
pub async fn load(path: &Path) -> Result<RunRegistry> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("parsing {}", path.display()))
}
