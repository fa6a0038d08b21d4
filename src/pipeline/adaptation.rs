//! Adaptation controller — priority-ordered mode selection with a lock
//! window for explicit user mode choices.
//!
//! The decision logic is an explicit ordered rule table, not nested
//! conditionals, so priority stays auditable and testable rule-by-rule.
//! The controller is total: it always returns a mode and never fails.

use tracing::info;

use crate::catalog::CAP_GAP_FLOW;
use crate::config::EngineConfig;
use crate::session::model::{
    AdaptationEvent, InterfaceMode, SessionEvent, SessionState, UiMutation,
};

/// Inputs a rule predicate may inspect.
struct RuleContext<'a> {
    session: &'a SessionState,
}

impl RuleContext<'_> {
    fn scores(&self) -> &crate::session::model::ScoreCard {
        &self.session.scores
    }
}

/// One row of the decision table.
struct ModeRule {
    target: InterfaceMode,
    reason: &'static str,
    ui_changes: &'static [&'static str],
    applies: fn(&RuleContext, &EngineConfig) -> bool,
}

/// Priority-ordered rules, first match wins. The lock handling in
/// `compute_adaptation` runs before this table.
const MODE_RULES: &[ModeRule] = &[
    ModeRule {
        target: InterfaceMode::Advisor,
        reason: "Escalation risk is high; switched to advisor mode.",
        ui_changes: &["Pinned escalation checklist", "Elevated handoff questions"],
        applies: |ctx, config| {
            ctx.scores().escalation_risk >= config.risk_override_threshold
        },
    },
    ModeRule {
        target: InterfaceMode::Transition,
        reason: "Transition flow needs petition-state clarity; switched to transition mode.",
        ui_changes: &["Expanded bridge timeline", "Highlighted petition dependencies"],
        applies: |ctx, _| {
            ctx.session.selected_flow_id == CAP_GAP_FLOW
                && ctx.session.field("petition_status").is_none()
        },
    },
    ModeRule {
        target: InterfaceMode::Explain,
        reason: "Understanding dropped; switched to explain mode.",
        ui_changes: &["Expanded plain-language hints", "Promoted micro-check guidance"],
        applies: |ctx, config| ctx.scores().understanding < config.understanding_floor,
    },
    ModeRule {
        target: InterfaceMode::DocPrep,
        reason: "Readiness is low with multiple missing entities; switched to doc prep mode.",
        ui_changes: &[
            "Pinned missing required entities",
            "Grouped required steps by dependency",
        ],
        applies: |ctx, config| {
            ctx.scores().completeness < config.doc_prep_completeness_floor
                && ctx.session.missing_items.len() >= config.doc_prep_missing_min
        },
    },
    ModeRule {
        target: InterfaceMode::Checklist,
        reason: "Completeness still low; prioritized checklist mode.",
        ui_changes: &["Sorted unresolved steps first"],
        applies: |ctx, config| {
            ctx.scores().completeness < config.checklist_completeness_floor
        },
    },
    ModeRule {
        target: InterfaceMode::Timeline,
        reason: "Clarity and completeness are stable; switched to timeline mode.",
        ui_changes: &["Expanded date-dependent planning steps"],
        applies: |ctx, config| {
            ctx.scores().clarity >= config.timeline_clarity_floor
                && ctx.scores().completeness >= config.checklist_completeness_floor
        },
    },
];

/// Decide the target mode for the current score vector and flow context.
///
/// An explicit mode-change trigger pins the chosen mode for the next
/// `mode_lock_refreshes` refreshes; only extreme escalation risk can
/// override the lock. Appends to the adaptation log only when the mode
/// actually changes.
pub fn compute_adaptation(
    session: &mut SessionState,
    trigger: Option<&SessionEvent>,
    config: &EngineConfig,
) -> UiMutation {
    let previous_mode = session.current_mode;

    // Rule 1: explicit user selection starts the lock window.
    if let Some(SessionEvent::ModeChange { mode }) = trigger
        && let Ok(mode) = mode.parse::<InterfaceMode>()
    {
        session.mode_lock_remaining = config.mode_lock_refreshes;
        if mode != previous_mode {
            session.current_mode = mode;
            log_change(
                session,
                previous_mode,
                mode,
                "Mode locked to user selection for the next few interactions.",
                &["Pinned user-selected mode"],
            );
        }
        return UiMutation {
            new_mode: mode,
            reason: "Mode locked to user selection for the next few interactions.".into(),
            ui_changes: vec!["Pinned user-selected mode".into()],
        };
    }

    // Rule 2: the lock suppresses automatic switching unless risk crosses
    // the override threshold.
    if session.mode_lock_remaining > 0 {
        session.mode_lock_remaining -= 1;
        if session.scores.escalation_risk < config.risk_override_threshold {
            return UiMutation {
                new_mode: previous_mode,
                reason: "Respecting user-selected mode while continuing to update scores and checklist."
                    .into(),
                ui_changes: vec![],
            };
        }
    }

    let ctx = RuleContext { session };
    let decision = MODE_RULES.iter().find(|rule| (rule.applies)(&ctx, config));

    let Some(rule) = decision else {
        return UiMutation {
            new_mode: previous_mode,
            reason: "No mode change needed.".into(),
            ui_changes: vec![],
        };
    };

    let target = rule.target;
    session.current_mode = target;
    if target != previous_mode {
        log_change(session, previous_mode, target, rule.reason, rule.ui_changes);
    }

    UiMutation {
        new_mode: target,
        reason: rule.reason.into(),
        ui_changes: rule.ui_changes.iter().map(|s| s.to_string()).collect(),
    }
}

fn log_change(
    session: &mut SessionState,
    from: InterfaceMode,
    to: InterfaceMode,
    reason: &str,
    ui_changes: &[&str],
) {
    info!(session_id = %session.session_id, %from, %to, reason, "Mode changed");
    session.adaptation_log.push(AdaptationEvent {
        reason: reason.into(),
        from_mode: from,
        to_mode: to,
        ui_changes: ui_changes.iter().map(|s| s.to_string()).collect(),
        created_at: chrono::Utc::now(),
    });
}
