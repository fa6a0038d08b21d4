//! Flow pack definitions, loaded once from JSON and never mutated.

use serde::{Deserialize, Serialize};

/// Applicability predicate for a flow pack.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowAppliesIf {
    /// Keywords whose presence in the intent scores the pack up.
    pub keywords_any: Vec<String>,
    /// Accepted status values; non-empty means restricted applicability.
    pub status_any: Vec<String>,
    /// Accepted program stages; non-empty means restricted applicability.
    pub program_stage_any: Vec<String>,
}

/// One step node inside a flow pack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowNode {
    pub node_id: String,
    pub node_type: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub required_fields: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

fn default_disclaimer() -> String {
    "Workflow preparation assistant only. Not legal advice.".to_string()
}

/// A catalog-defined procedure: required entities, steps, dependencies,
/// micro-check ids, and routing metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowPack {
    pub flow_id: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub applies_if: FlowAppliesIf,
    #[serde(default)]
    pub required_entities: Vec<String>,
    #[serde(default)]
    pub step_nodes: Vec<FlowNode>,
    #[serde(default)]
    pub doc_requirements: Vec<String>,
    /// Labels from the pack's common-confusion list; scoring elevates the
    /// confusion multiplier when the associated field is unset.
    #[serde(default)]
    pub common_confusions: Vec<String>,
    #[serde(default)]
    pub micro_checks: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub handoff_rules: Vec<String>,
    /// Entities whose absence drives escalation risk. Empty means the
    /// generic default (status_type, program_stage) applies.
    #[serde(default)]
    pub critical_entities: Vec<String>,
    #[serde(default = "default_disclaimer")]
    pub disclaimer: String,
}

impl FlowPack {
    /// Critical entity set, falling back to the generic default.
    pub fn critical_entities(&self) -> Vec<&str> {
        if self.critical_entities.is_empty() {
            vec!["status_type", "program_stage"]
        } else {
            self.critical_entities.iter().map(String::as_str).collect()
        }
    }
}
