//! Outbound TRAPI query payloads.

use serde_json::{json, Value};

use crate::domain::{Endpoint, ProtocolKind, QueryOverrides};

const DEFAULT_PREDICATE: &str = "biolink:treats_or_applied_or_studied_to_treat";

/// Payload for one call against `endpoint` covering `identifiers`.
///
/// Direct providers get a batch lookup over the identifiers, or their own
/// template narrowed to them. Aggregators get their template, or the fixed
/// treats query, with caching bypassed.
pub fn build_payload(endpoint: &Endpoint, identifiers: &[String]) -> Value {
    match (endpoint.kind, &endpoint.overrides.query) {
        (ProtocolKind::Direct, Some(template)) => from_template(template, Some(identifiers)),
        (ProtocolKind::Direct, None) => provider_query(identifiers, &endpoint.overrides),
        (_, Some(template)) => from_template(template, None),
        (_, None) => aggregator_query(),
    }
}

/// One-hop lookup: which chemicals relate to the given identifiers
pub fn provider_query(identifiers: &[String], overrides: &QueryOverrides) -> Value {
    let predicates = overrides
        .predicates
        .clone()
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| vec![DEFAULT_PREDICATE.to_string()]);

    json!({
        "message": {
            "query_graph": {
                "nodes": {
                    "chemical": {
                        "categories": ["biolink:ChemicalEntity"],
                        "set_interpretation": "BATCH",
                    },
                    "f": {
                        "ids": identifiers,
                        "set_interpretation": "BATCH",
                    },
                },
                "edges": {
                    "edge_1": {
                        "subject": "chemical",
                        "object": "f",
                        "predicates": predicates,
                    },
                },
            },
        },
    })
}

/// Creative-mode query: what treats type 2 diabetes
pub fn aggregator_query() -> Value {
    json!({
        "message": {
            "query_graph": {
                "nodes": {
                    "ON": {
                        "categories": ["biolink:Disease"],
                        "ids": ["MONDO:0005301"],
                    },
                    "SN": {
                        "categories": ["biolink:ChemicalEntity"],
                    },
                },
                "edges": {
                    "t_edge": {
                        "object": "ON",
                        "subject": "SN",
                        "predicates": ["biolink:treats"],
                        "knowledge_type": "inferred",
                    },
                },
            },
        },
        "bypass_cache": true,
    })
}

fn node_ids(query: &Value) -> impl Iterator<Item = &Vec<Value>> {
    query
        .pointer("/message/query_graph/nodes")
        .and_then(Value::as_object)
        .into_iter()
        .flat_map(|nodes| nodes.values())
        .filter_map(|node| node.get("ids").and_then(Value::as_array))
}

/// Identifiers a template sends at `batch_size`: the first `batch_size` ids
/// of every node, in node order
pub fn template_batch(template: &Value, batch_size: usize) -> Vec<String> {
    let mut batch: Vec<String> = Vec::new();
    for ids in node_ids(template) {
        for id in ids.iter().take(batch_size).filter_map(Value::as_str) {
            if !batch.iter().any(|b| b == id) {
                batch.push(id.to_string());
            }
        }
    }
    batch
}

/// Applies a per-endpoint query template with caching bypassed.
///
/// With `identifiers`, every node keeps only the ids among them.
pub fn from_template(template: &Value, identifiers: Option<&[String]>) -> Value {
    let mut query = template.clone();
    let nodes = query
        .pointer_mut("/message/query_graph/nodes")
        .and_then(Value::as_object_mut);
    if let (Some(keep), Some(nodes)) = (identifiers, nodes) {
        for node in nodes.values_mut() {
            if let Some(ids) = node.get_mut("ids").and_then(Value::as_array_mut) {
                ids.retain(|id| id.as_str().is_some_and(|id| keep.iter().any(|k| k == id)));
            }
        }
    }
    if let Some(obj) = query.as_object_mut() {
        obj.insert("bypass_cache".to_string(), Value::Bool(true));
    }
    query
}

/// Every identifier a payload's query graph carries, in node order
pub fn payload_identifiers(payload: &Value) -> Vec<String> {
    node_ids(payload)
        .flatten()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect()
}
