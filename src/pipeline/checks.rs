//! Micro-check assembly and evaluation.
//!
//! Checks come from three places: the pack's referenced bank checks, a
//! generated missing-entity check, and a generated disambiguation check
//! when a card is active. Evaluation is by exact option string match.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::warn;

use crate::error::PipelineError;
use crate::session::model::{MicroCheck, MicroCheckRequest, MicroCheckResult, SessionState};

pub const MISSING_ITEM_CHECK_ID: &str = "missing_item_check";
pub const DISAMBIGUATION_CHECK_ID: &str = "flow_disambiguation_check";

/// Assemble the session's current micro-check set.
///
/// Bank checks are taken in the pack's declared order; ids the bank does
/// not know are skipped with a warning rather than failing the refresh.
pub fn build_micro_checks(
    session: &SessionState,
    bank: &Arc<BTreeMap<String, MicroCheck>>,
) -> Vec<MicroCheck> {
    let mut checks = Vec::new();

    for check_id in &session.active_check_ids {
        match bank.get(check_id) {
            Some(check) => checks.push(check.clone()),
            None => {
                warn!(check_id, "Referenced micro-check missing from bank");
            }
        }
    }

    checks.push(missing_item_check(session));
    if let Some(check) = disambiguation_check(session) {
        checks.push(check);
    }

    checks
}

/// Generated check asking which entity still needs to be provided.
fn missing_item_check(session: &SessionState) -> MicroCheck {
    let target = session
        .missing_items
        .first()
        .map(String::as_str)
        .unwrap_or("status_type");

    let mut options = vec![target.to_string()];
    for decoy in ["ui_theme_color", "profile_avatar", "notification_sound"] {
        options.push(decoy.to_string());
    }

    MicroCheck {
        check_id: MISSING_ITEM_CHECK_ID.into(),
        prompt: "Which piece of information does this workflow still need from you?".into(),
        options,
        correct_option: target.to_string(),
        explanation: format!(
            "The workflow cannot derive remaining steps until `{target}` is provided."
        ),
    }
}

/// Generated check mirroring the active disambiguation card, so the user
/// can confirm the routing choice as a comprehension exercise.
fn disambiguation_check(session: &SessionState) -> Option<MicroCheck> {
    let card = session.disambiguation.as_ref()?;
    let top = card.options.first()?;

    Some(MicroCheck {
        check_id: DISAMBIGUATION_CHECK_ID.into(),
        prompt: format!(
            "Based on what you described, which flow looks like the best match? ({})",
            card.prompt
        ),
        options: card.options.clone(),
        correct_option: top.clone(),
        explanation: "The top-ranked flow matched the most signals in your description.".into(),
    })
}

/// Grade an answer against the session's current check set.
pub fn evaluate_micro_check(
    session: &SessionState,
    request: &MicroCheckRequest,
) -> Result<MicroCheckResult, PipelineError> {
    let check = session
        .available_checks
        .iter()
        .find(|c| c.check_id == request.check_id)
        .ok_or_else(|| PipelineError::CheckNotFound(request.check_id.clone()))?;

    let is_correct = request.selected_option == check.correct_option;
    let feedback = if is_correct {
        format!("Correct. {}", check.explanation)
    } else {
        format!("Not quite. {}", check.explanation)
    };

    Ok(MicroCheckResult {
        check_id: check.check_id.clone(),
        selected_option: request.selected_option.clone(),
        is_correct,
        feedback,
    })
}
