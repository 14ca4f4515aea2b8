//! Endpoint registry and identifier pool files.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::domain::{Endpoint, ProtocolKind, QueryOverrides};

/// One entry of the endpoints file, keyed by infores id
#[derive(Debug, Deserialize)]
struct EndpointEntry {
    url: String,
    #[serde(default = "default_kind")]
    kind: ProtocolKind,
    #[serde(flatten)]
    overrides: QueryOverrides,
}

fn default_kind() -> ProtocolKind {
    ProtocolKind::Direct
}

/// Parses `{"infores:x": {"url": ..., "kind": ..., "predicates": [...]}}`.
///
/// Endpoints come back sorted by id so runs are reproducible.
pub fn parse_endpoints(json: &str) -> Result<Vec<Endpoint>> {
    let entries: BTreeMap<String, EndpointEntry> =
        serde_json::from_str(json).context("endpoints file is not a map of endpoint entries")?;
    entries
        .into_iter()
        .map(|(id, entry)| {
            if entry.url.trim().is_empty() {
                anyhow::bail!("endpoint {id} has an empty url");
            }
            Ok(Endpoint {
                id,
                url: entry.url,
                kind: entry.kind,
                overrides: entry.overrides,
            })
        })
        .collect()
}

pub fn parse_identifiers(json: &str) -> Result<Vec<String>> {
    serde_json::from_str(json).context("identifiers file is not a list of strings")
}

pub async fn load_endpoints(path: &Path) -> Result<Vec<Endpoint>> {
    let json = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading endpoints from {}", path.display()))?;
    parse_endpoints(&json).with_context(|| format!("in {}", path.display()))
}

pub async fn load_identifiers(path: &Path) -> Result<Vec<String>> {
    let json = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading identifiers from {}", path.display()))?;
    parse_identifiers(&json).with_context(|| format!("in {}", path.display()))
}
