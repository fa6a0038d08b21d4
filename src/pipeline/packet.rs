//! Advisor handoff packet — a human-readable markdown brief assembled
//! from session state, built on demand and cached on the session.

use chrono::Utc;

use crate::catalog::CAP_GAP_FLOW;
use crate::catalog::model::FlowPack;
use crate::session::model::{SessionState, StepStatus};

const CANDIDATE_LIMIT: usize = 4;
const CITATION_LIMIT: usize = 6;
const ESCALATION_QUESTION_RISK: u8 = 65;

/// Render the advisor packet for the session's current state.
pub fn build_advisor_packet(session: &SessionState, pack: &FlowPack) -> String {
    let mut out = String::new();
    let push_line = |out: &mut String, line: &str| {
        out.push_str(line);
        out.push('\n');
    };

    push_line(&mut out, "# Advisor Handoff Packet");
    push_line(&mut out, "");
    push_line(
        &mut out,
        &format!("Generated: {}", Utc::now().format("%Y-%m-%d %H:%M UTC")),
    );
    push_line(&mut out, &format!("Session: {}", session.session_id));
    push_line(&mut out, &format!("> {}", pack.disclaimer));
    push_line(&mut out, "");

    push_line(&mut out, "## Selected Flow");
    push_line(
        &mut out,
        &format!("- {} ({})", session.selected_flow_title, session.selected_flow_id),
    );
    for candidate in session.candidate_flows.iter().take(CANDIDATE_LIMIT) {
        push_line(
            &mut out,
            &format!(
                "- candidate: {} score={:.2} ({})",
                candidate.flow_id, candidate.score, candidate.reason
            ),
        );
    }
    push_line(&mut out, "");

    push_line(&mut out, "## Stated Intent");
    push_line(&mut out, &format!("- {}", session.intent));
    if !session.ambiguity_flags.is_empty() {
        let flags: Vec<String> = session
            .ambiguity_flags
            .iter()
            .map(|f| f.to_string())
            .collect();
        push_line(&mut out, &format!("- ambiguity: {}", flags.join(", ")));
    }
    push_line(&mut out, "");

    push_line(&mut out, "## Readiness Scores");
    push_line(
        &mut out,
        &format!("- understanding: {}", session.scores.understanding),
    );
    push_line(&mut out, &format!("- clarity: {}", session.scores.clarity));
    push_line(
        &mut out,
        &format!("- completeness: {}", session.scores.completeness),
    );
    push_line(
        &mut out,
        &format!("- escalation_risk: {}", session.scores.escalation_risk),
    );
    push_line(&mut out, "");

    push_line(&mut out, "## Progress");
    let completed: Vec<&str> = session
        .workflow
        .iter()
        .filter(|s| s.status == StepStatus::Complete)
        .map(|s| s.title.as_str())
        .collect();
    let remaining: Vec<&str> = session
        .workflow
        .iter()
        .filter(|s| s.status != StepStatus::Complete)
        .map(|s| s.title.as_str())
        .collect();
    push_line(
        &mut out,
        &format!(
            "- completed ({}): {}",
            completed.len(),
            join_or_none(&completed)
        ),
    );
    push_line(
        &mut out,
        &format!(
            "- remaining ({}): {}",
            remaining.len(),
            join_or_none(&remaining)
        ),
    );
    if !session.missing_items.is_empty() {
        push_line(
            &mut out,
            &format!("- missing entities: {}", session.missing_items.join(", ")),
        );
    }
    push_line(&mut out, "");

    push_line(&mut out, "## Suggested Advisor Questions");
    for question in advisor_questions(session) {
        push_line(&mut out, &format!("- {question}"));
    }

    if !session.citations.is_empty() {
        push_line(&mut out, "");
        push_line(&mut out, "## Sources Consulted");
        for citation in session.citations.iter().take(CITATION_LIMIT) {
            push_line(
                &mut out,
                &format!("- [{}]({}) — {}", citation.title, citation.url, citation.snippet),
            );
        }
    }

    out
}

fn join_or_none(items: &[&str]) -> String {
    if items.is_empty() {
        "none".into()
    } else {
        items.join("; ")
    }
}

/// Questions the user should bring to a human advisor, derived from flow
/// context and what is still unresolved.
fn advisor_questions(session: &SessionState) -> Vec<String> {
    let mut questions = vec![
        "Can you confirm which workflow applies to my situation?".to_string(),
        "Which of my remaining steps has the earliest hard deadline?".to_string(),
    ];

    if session.selected_flow_id == CAP_GAP_FLOW {
        questions.push(
            "What does my current petition state mean for my authorization to keep working?"
                .to_string(),
        );
    }
    if session.scores.escalation_risk >= ESCALATION_QUESTION_RISK {
        questions.push(
            "Given how much is unresolved, should I schedule a dedicated appointment?"
                .to_string(),
        );
    }
    if session.field("employer_name").is_none()
        && session.required_entities.iter().any(|e| e == "employer_name")
    {
        questions
            .push("What employer details do I need before the next step can proceed?".to_string());
    }
    if session.field("petition_status").is_none()
        && session
            .required_entities
            .iter()
            .any(|e| e == "petition_status")
    {
        questions.push("How do I find out the current state of the petition?".to_string());
    }

    questions
}
