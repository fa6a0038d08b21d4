//! Configuration types.

use std::path::PathBuf;

/// Tunables for the router, scoring, and adaptation controller.
///
/// Thresholds live here rather than inline so the rule table in
/// `pipeline::adaptation` stays auditable rule-by-rule.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Minimum router score for a pack to stay in the candidate list.
    pub router_score_threshold: f64,
    /// Top-two score gap below which `top_flows_close` is flagged.
    pub router_close_margin: f64,
    /// Top score below which `low_confidence_route` is flagged.
    pub router_confidence_floor: f64,
    /// Top score below which a multi-candidate ranking still needs a
    /// disambiguation prompt.
    pub disambiguation_floor: f64,
    /// How many refreshes a user-selected mode stays pinned.
    pub mode_lock_refreshes: u8,
    /// Escalation risk at/above which advisor mode overrides everything,
    /// including an active mode lock.
    pub risk_override_threshold: u8,
    /// Understanding below this switches to explain mode.
    pub understanding_floor: u8,
    /// Completeness below this (with enough missing items) switches to
    /// doc-prep mode.
    pub doc_prep_completeness_floor: u8,
    /// Minimum missing-item count for the doc-prep rule.
    pub doc_prep_missing_min: usize,
    /// Completeness below this keeps checklist mode.
    pub checklist_completeness_floor: u8,
    /// Clarity at/above this (with completeness high) switches to timeline.
    pub timeline_clarity_floor: u8,
    /// Citations retrieved per flow selection.
    pub citation_top_k: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            router_score_threshold: 0.6,
            router_close_margin: 1.1,
            router_confidence_floor: 2.0,
            disambiguation_floor: 2.3,
            mode_lock_refreshes: 3,
            risk_override_threshold: 85,
            understanding_floor: 55,
            doc_prep_completeness_floor: 45,
            doc_prep_missing_min: 3,
            checklist_completeness_floor: 72,
            timeline_clarity_floor: 74,
            citation_top_k: 5,
        }
    }
}

/// Server configuration, derived from the environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port for the REST API.
    pub port: u16,
    /// Directory containing flow pack JSON files.
    pub flows_dir: PathBuf,
    /// Path to the shared micro-check bank.
    pub checks_path: PathBuf,
    /// Path to the knowledge chunk corpus.
    pub knowledge_path: PathBuf,
}

impl ServerConfig {
    /// Build from `VISAFLOW_*` environment variables with local defaults.
    pub fn from_env() -> Self {
        let port = std::env::var("VISAFLOW_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8080);
        let data_dir = std::env::var("VISAFLOW_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data"));

        Self {
            port,
            flows_dir: data_dir.join("flows"),
            checks_path: data_dir.join("shared/micro_checks.json"),
            knowledge_path: data_dir.join("knowledge_chunks.json"),
        }
    }
}
