//! Flow ranking — scores every catalog pack against extracted entities and
//! intent text, producing a ranked candidate list plus ambiguity flags.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::catalog::store::CatalogSnapshot;
use crate::catalog::{CAP_GAP_FLOW, CPT_FLOW, FALLBACK_FLOW, OPT_FLOW};
use crate::config::EngineConfig;
use crate::router::entities::{
    explicit_stage, extract_entities, normalize_value, status_matches,
};
use crate::session::model::{AmbiguityFlag, FlowCandidate};

/// Per-hit weight for keyword overlap.
const KEYWORD_WEIGHT: f64 = 1.4;
/// Weight for a status applicability match, and the mismatch penalty when
/// the pack declares a restricted status set.
const STATUS_MATCH: f64 = 1.8;
const STAGE_MATCH: f64 = 1.6;
const APPLICABILITY_MISMATCH: f64 = -0.6;
/// Hand-authored boosts for known signals.
const EXPLICIT_CPT_BOOST: f64 = 0.9;
const TRANSITION_STATUS_BOOST: f64 = 1.1;
const TRANSITION_PETITION_BOOST: f64 = 2.2;
const SPECIFIC_FLOW_HINT: f64 = 0.9;
/// When CPT and OPT are both mentioned, the generic orientation flow is
/// inflated and the two specific flows suppressed.
const OVERLAP_FALLBACK_BOOST: f64 = 3.0;
const OVERLAP_SPECIFIC_PENALTY: f64 = -1.2;
/// Score assigned to a synthesized fallback candidate.
const FALLBACK_SCORE: f64 = 0.2;

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-zA-Z0-9\-_/]{2,}").unwrap());

/// Router output: ranked candidates, sorted flag set, extracted entities.
#[derive(Debug, Clone)]
pub struct RankOutcome {
    pub candidates: Vec<FlowCandidate>,
    pub ambiguity_flags: Vec<AmbiguityFlag>,
    pub entities: BTreeMap<String, String>,
}

/// Rank every pack in the snapshot against the intent and field map.
///
/// Deterministic: the sort is stable, so equal scores keep catalog order.
pub fn rank(
    snapshot: &CatalogSnapshot,
    intent: &str,
    fields: &BTreeMap<String, String>,
    config: &EngineConfig,
) -> RankOutcome {
    let entities = extract_entities(intent, fields);
    let text = intent.to_lowercase();
    let tokens = tokenize(intent);
    let cpt_opt_both_mentioned = text.contains("cpt") && text.contains("opt");

    let mut candidates: Vec<FlowCandidate> = Vec::new();
    let mut flags: BTreeSet<AmbiguityFlag> = BTreeSet::new();

    for pack in snapshot.list() {
        let mut score = 0.0;
        let mut reasons: Vec<String> = Vec::new();

        let hits = keyword_hits(&text, &tokens, &pack.applies_if.keywords_any);
        if !hits.is_empty() {
            score += KEYWORD_WEIGHT * hits.len() as f64;
            reasons.push(format!("keywords: {}", hits[..hits.len().min(3)].join(", ")));
        }

        if let Some(status) = entities.get("status_type") {
            if !pack.applies_if.status_any.is_empty() {
                if status_matches(status, &pack.applies_if.status_any) {
                    score += STATUS_MATCH;
                    reasons.push("status match".into());
                    if pack.flow_id == CPT_FLOW && normalize_value(status) == "cpt" {
                        score += EXPLICIT_CPT_BOOST;
                        reasons.push("explicit CPT status".into());
                    }
                    if pack.flow_id == CAP_GAP_FLOW
                        && matches!(normalize_value(status).as_str(), "h1b" | "cap_gap")
                    {
                        score += TRANSITION_STATUS_BOOST;
                        reasons.push("transition status signal".into());
                    }
                } else {
                    score += APPLICABILITY_MISMATCH;
                }
            }
        }

        let stage = entities.get("program_stage").map(String::as_str);
        if let Some(stage) = stage {
            if !pack.applies_if.program_stage_any.is_empty() {
                let accepted: BTreeSet<String> = pack
                    .applies_if
                    .program_stage_any
                    .iter()
                    .map(|v| normalize_value(v))
                    .collect();
                if accepted.contains(&normalize_value(stage)) {
                    score += STAGE_MATCH;
                    reasons.push("program stage match".into());
                } else {
                    score += APPLICABILITY_MISMATCH;
                }
            }
        }

        if pack.flow_id == CAP_GAP_FLOW
            && (text.contains("h-1b")
                || text.contains("h1b")
                || text.contains("cap gap")
                || text.contains("cap-gap")
                || entities.contains_key("petition_status"))
        {
            score += TRANSITION_PETITION_BOOST;
            reasons.push("transition petition signal".into());
        }

        if pack.flow_id == CPT_FLOW && (text.contains("internship") || stage == Some("enrolled")) {
            score += SPECIFIC_FLOW_HINT;
        }

        if pack.flow_id == OPT_FLOW
            && (text.contains("opt") || matches!(stage, Some("graduating" | "graduated")))
        {
            score += SPECIFIC_FLOW_HINT;
        }

        if cpt_opt_both_mentioned {
            if pack.flow_id == FALLBACK_FLOW {
                score += OVERLAP_FALLBACK_BOOST;
                reasons.push("explicit CPT/OPT ambiguity".into());
            }
            if pack.flow_id == CPT_FLOW || pack.flow_id == OPT_FLOW {
                score += OVERLAP_SPECIFIC_PENALTY;
            }
        }

        if score >= config.router_score_threshold {
            let reason = if reasons.is_empty() {
                "general intent fit".to_string()
            } else {
                reasons[..reasons.len().min(2)].join("; ")
            };
            candidates.push(FlowCandidate {
                flow_id: pack.flow_id.clone(),
                title: pack.title.clone(),
                score: (score * 100.0).round() / 100.0,
                reason,
            });
        }
    }

    // Stable sort: ties keep catalog order.
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    if candidates.is_empty() {
        if let Some(fallback) = snapshot.get_or_fallback(FALLBACK_FLOW) {
            candidates.push(FlowCandidate {
                flow_id: fallback.flow_id.clone(),
                title: fallback.title.clone(),
                score: FALLBACK_SCORE,
                reason: "fallback orientation flow".into(),
            });
            flags.insert(AmbiguityFlag::NoDirectMatch);
        }
    }

    if candidates.len() >= 2
        && (candidates[0].score - candidates[1].score) < config.router_close_margin
    {
        flags.insert(AmbiguityFlag::TopFlowsClose);
    }

    let top3: BTreeSet<&str> = candidates
        .iter()
        .take(3)
        .map(|c| c.flow_id.as_str())
        .collect();
    if top3.contains(CPT_FLOW)
        && top3.contains(OPT_FLOW)
        && explicit_stage(intent, fields).is_none()
    {
        flags.insert(AmbiguityFlag::CptOptOverlap);
    }

    if candidates
        .first()
        .is_some_and(|top| top.score < config.router_confidence_floor)
    {
        flags.insert(AmbiguityFlag::LowConfidenceRoute);
    }

    if !entities.contains_key("program_stage") {
        flags.insert(AmbiguityFlag::ProgramStageUnclear);
    }
    if !entities.contains_key("status_type") {
        flags.insert(AmbiguityFlag::StatusUnclear);
    }

    debug!(
        top = candidates.first().map(|c| c.flow_id.as_str()).unwrap_or("-"),
        candidates = candidates.len(),
        flags = flags.len(),
        "Ranked flows"
    );

    RankOutcome {
        candidates,
        ambiguity_flags: flags.into_iter().collect(),
        entities,
    }
}

fn tokenize(text: &str) -> BTreeSet<String> {
    TOKEN_RE
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

fn keyword_hits(text: &str, tokens: &BTreeSet<String>, keywords: &[String]) -> Vec<String> {
    let mut hits = Vec::new();
    for raw in keywords {
        let keyword = raw.trim().to_lowercase();
        if keyword.is_empty() {
            continue;
        }
        let matched = if keyword.contains(' ') {
            text.contains(&keyword)
        } else {
            tokens.contains(&keyword)
        };
        if matched {
            hits.push(raw.clone());
        }
    }
    hits
}
