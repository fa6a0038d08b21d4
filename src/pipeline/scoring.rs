//! Scoring engine — four bounded readiness metrics derived from session
//! history, field completeness, workflow progress, and micro-check results.
//!
//! Pure and idempotent over session state: safe to call after every event
//! without accumulating drift. Never fails for any reachable state.

use chrono::NaiveDate;

use crate::catalog::model::FlowPack;
use crate::catalog::{CAP_GAP_FLOW, CPT_FLOW, OPT_FLOW, STEM_OPT_FLOW};
use crate::session::model::{
    Familiarity, InterfaceMode, ScoreCard, SessionState, StepStatus,
};

/// Per-flow confusion weights keyed by common-confusion label. The label's
/// weight applies while its associated field is unset (or, for pathway
/// confusion, while a disambiguation prompt is active).
const FLOW_CONFUSION_WEIGHTS: &[(&str, &str, f64)] = &[
    (CPT_FLOW, "employer_details", 1.3),
    (CPT_FLOW, "approval_before_work", 1.4),
    (OPT_FLOW, "timing_window", 1.4),
    (OPT_FLOW, "pathway_confusion", 1.2),
    (STEM_OPT_FLOW, "employer_compliance", 1.5),
    (CAP_GAP_FLOW, "status_bridge", 1.8),
    (CAP_GAP_FLOW, "petition_state", 1.7),
];

/// Recompute all four metrics for the session's currently selected pack.
pub fn recompute_scores(session: &SessionState, pack: &FlowPack) -> ScoreCard {
    let confusion_count = session
        .events
        .iter()
        .filter(|e| e.event.is_confusion_signal())
        .count() as i64;
    let field_updates = session
        .events
        .iter()
        .filter(|e| e.event.label() == "field_update")
        .count() as i64;

    let checks_total = session.check_results.len() as i64;
    let checks_correct = session
        .check_results
        .values()
        .filter(|r| r.is_correct)
        .count() as i64;

    let multiplier = confusion_multiplier(&pack.flow_id, session);

    let understanding = compute_understanding(
        session,
        confusion_count,
        field_updates,
        checks_correct,
        multiplier,
    );
    let clarity = compute_clarity(session, pack, confusion_count, multiplier);
    let completeness = compute_completeness(session, checks_total, checks_correct);
    let escalation_risk = compute_escalation_risk(
        session,
        pack,
        confusion_count,
        checks_total,
        checks_correct,
        understanding,
    );

    ScoreCard {
        understanding: clamp(understanding),
        clarity: clamp(clarity),
        completeness: clamp(completeness),
        escalation_risk: clamp(escalation_risk),
    }
}

fn compute_understanding(
    session: &SessionState,
    confusion_count: i64,
    field_updates: i64,
    checks_correct: i64,
    multiplier: f64,
) -> i64 {
    let base = match session.profile.familiarity {
        Familiarity::New => 64,
        Familiarity::Intermediate => 74,
        Familiarity::Advanced => 82,
    };

    let mut understanding = base;
    understanding -= ((confusion_count * 5) as f64 * multiplier).min(40.0) as i64;
    understanding += (checks_correct * 7).min(22);
    understanding += (field_updates / 2).min(10);
    if session.disambiguation.is_some() {
        understanding -= 6;
    }
    understanding
}

fn compute_clarity(
    session: &SessionState,
    pack: &FlowPack,
    confusion_count: i64,
    multiplier: f64,
) -> i64 {
    let preference_bonus = if session.current_mode == session.profile.preferred_mode {
        9
    } else if session.current_mode == InterfaceMode::Explain
        && session.profile.familiarity == Familiarity::New
    {
        8
    } else {
        0
    };

    let mut clarity = 66 + preference_bonus;
    clarity -= ((confusion_count * 3) as f64 * multiplier).min(28.0) as i64;

    clarity += match session.current_mode {
        InterfaceMode::Explain => 8,
        InterfaceMode::Timeline => 4,
        InterfaceMode::Transition if pack.flow_id == CAP_GAP_FLOW => 5,
        _ => 0,
    };

    clarity -= 2 * session.ambiguity_flags.len() as i64;
    clarity -= 3 * missing_critical_count(session, pack);
    clarity
}

fn compute_completeness(session: &SessionState, checks_total: i64, checks_correct: i64) -> i64 {
    let required_count = session.required_entities.len().max(1) as f64;
    let filled = session
        .required_entities
        .iter()
        .filter(|entity| session.field(entity).is_some())
        .count() as f64;

    let total_steps = session.workflow.len().max(1) as f64;
    let completed_steps = session
        .workflow
        .iter()
        .filter(|s| s.status == StepStatus::Complete)
        .count() as f64;

    let mut completeness =
        ((filled / required_count) * 72.0 + (completed_steps / total_steps) * 28.0) as i64;
    if checks_total > 0 && checks_correct == checks_total {
        completeness += 4;
    }
    completeness
}

fn compute_escalation_risk(
    session: &SessionState,
    pack: &FlowPack,
    confusion_count: i64,
    checks_total: i64,
    checks_correct: i64,
    understanding: i64,
) -> i64 {
    let mut risk = 15;
    risk += (confusion_count * 5).min(30);
    risk += (session.missing_items.len() as i64 * 3).min(30);

    if checks_total > 0 && checks_correct < checks_total {
        risk += 10;
    }

    if pack.flow_id == CAP_GAP_FLOW {
        if session.field("petition_status").is_none() {
            risk += 20;
        }
        if session.field("work_end_date").is_none() {
            risk += 10;
        }
    }
    if pack.flow_id == CPT_FLOW && session.field("employer_name").is_none() {
        risk += 10;
    }

    if understanding < 45 {
        risk += 10;
    }

    risk += structural_conflict_penalty(session, pack);
    risk
}

/// Structural conflicts: the selected pack contradicted by the resolved
/// stage, or an employment end date earlier than the start date.
fn structural_conflict_penalty(session: &SessionState, pack: &FlowPack) -> i64 {
    let mut penalty = 0;

    if !pack.applies_if.program_stage_any.is_empty()
        && let Some(stage) = session.field("program_stage")
    {
        let stage = crate::router::entities::normalize_value(stage);
        let accepted = pack
            .applies_if
            .program_stage_any
            .iter()
            .any(|v| crate::router::entities::normalize_value(v) == stage);
        if !accepted {
            penalty += 8;
        }
    }

    if let (Some(start), Some(end)) = (
        session.field("work_start_date").and_then(parse_date),
        session.field("work_end_date").and_then(parse_date),
    ) && end < start
    {
        penalty += 10;
    }

    penalty
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(value, "%m/%d/%Y"))
        .ok()
}

fn missing_critical_count(session: &SessionState, pack: &FlowPack) -> i64 {
    pack.critical_entities()
        .iter()
        .filter(|field| session.field(field).is_none())
        .count() as i64
}

fn confusion_multiplier(flow_id: &str, session: &SessionState) -> f64 {
    let mut multiplier: f64 = 1.0;
    for &(flow, label, weight) in FLOW_CONFUSION_WEIGHTS {
        if flow != flow_id {
            continue;
        }
        let applies = match label {
            "employer_details" => session.field("employer_name").is_none(),
            "approval_before_work" => session.field("work_start_date").is_none(),
            "timing_window" => session.field("graduation_date").is_none(),
            "pathway_confusion" => session.disambiguation.is_some(),
            "employer_compliance" => session.field("employment_offer").is_none(),
            "status_bridge" => session.field("status_type").is_none(),
            "petition_state" => session.field("petition_status").is_none(),
            _ => false,
        };
        if applies {
            multiplier = multiplier.max(weight);
        }
    }
    multiplier
}

fn clamp(value: i64) -> u8 {
    value.clamp(0, 100) as u8
}
