//! Pipeline orchestration — the canonical refresh every session mutation
//! runs through.
//!
//! Refresh order is fixed: seed fields from intent, rank flows, apply the
//! selected pack, derive workflow status, maintain disambiguation, rebuild
//! micro-checks, score, then adapt the mode. Every entry point ends with
//! the same sequence so session state can never go stale piecemeal.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::catalog::model::FlowPack;
use crate::catalog::store::{CatalogSnapshot, CatalogStore, CheckBank};
use crate::config::EngineConfig;
use crate::error::{CatalogError, Result, ValidationError};
use crate::knowledge::KnowledgeBase;
use crate::pipeline::adaptation::compute_adaptation;
use crate::pipeline::checks::{build_micro_checks, evaluate_micro_check};
use crate::pipeline::packet::build_advisor_packet;
use crate::pipeline::scoring::recompute_scores;
use crate::pipeline::workflow::{
    build_case_graph, compute_missing_items, graph_to_workflow, mark_step,
    refresh_step_statuses, sync_graph_from_workflow,
};
use crate::router::entities::seed_fields;
use crate::router::rank::rank;
use crate::session::model::{
    AmbiguityFlag, DisambiguationCard, MicroCheckRequest, MicroCheckResult, SessionEvent,
    SessionState, StartSessionRequest, UiMutation, UserEvent,
};

const INTENT_MIN_CHARS: usize = 10;
const INTENT_MAX_CHARS: usize = 5000;

/// Stateless orchestrator over the catalog, check bank, and knowledge base.
/// Session state lives in the store; the engine only transforms it.
pub struct PipelineEngine {
    catalog: Arc<CatalogStore>,
    checks: Arc<CheckBank>,
    knowledge: Arc<KnowledgeBase>,
    config: EngineConfig,
}

impl PipelineEngine {
    pub fn new(
        catalog: Arc<CatalogStore>,
        checks: Arc<CheckBank>,
        knowledge: Arc<KnowledgeBase>,
        config: EngineConfig,
    ) -> Self {
        Self {
            catalog,
            checks,
            knowledge,
            config,
        }
    }

    /// Validate the request and run the initial refresh. The initial mode
    /// decision is returned alongside the session so callers can surface
    /// its reason and UI hints the same way later refreshes do.
    pub fn start_session(
        &self,
        request: StartSessionRequest,
    ) -> Result<(SessionState, UiMutation)> {
        let intent = request.intent.trim().to_string();
        let got = intent.chars().count();
        if !(INTENT_MIN_CHARS..=INTENT_MAX_CHARS).contains(&got) {
            return Err(ValidationError::IntentLength {
                min: INTENT_MIN_CHARS,
                max: INTENT_MAX_CHARS,
                got,
            }
            .into());
        }
        if !(1..=5).contains(&request.profile.stress_level) {
            return Err(ValidationError::InvalidField {
                field: "stress_level".into(),
                message: format!("must be 1..=5, got {}", request.profile.stress_level),
            }
            .into());
        }

        let mut session = SessionState::new(intent, request.profile);
        let mutation = self.refresh(&mut session, None)?;
        info!(
            session_id = %session.session_id,
            flow = %session.selected_flow_id,
            mode = %session.current_mode,
            "Session started"
        );
        Ok((session, mutation))
    }

    /// Record an event, apply its direct mutation, and refresh.
    pub fn apply_event(
        &self,
        session: &mut SessionState,
        event: SessionEvent,
    ) -> Result<UiMutation> {
        session.events.push(UserEvent::now(event.clone()));

        match &event {
            SessionEvent::FieldUpdate { field, value } => {
                let field = field.trim();
                if !field.is_empty() {
                    session
                        .fields
                        .insert(field.to_string(), value.trim().to_string());
                }
            }
            SessionEvent::MarkStep { step_id } => {
                mark_step(&mut session.workflow, step_id, true);
            }
            SessionEvent::UnmarkStep { step_id } | SessionEvent::StepReopen { step_id } => {
                mark_step(&mut session.workflow, step_id, false);
            }
            SessionEvent::SelectFlow { flow_id } => {
                session.selected_flow_id = flow_id.clone();
                session.flow_locked = true;
                session.disambiguation = None;
            }
            // Mode changes are handled by the adaptation step; the rest
            // only matter as history for scoring.
            SessionEvent::ModeChange { .. }
            | SessionEvent::Inactivity
            | SessionEvent::AskHelp => {}
        }

        self.refresh(session, Some(&event))
    }

    /// Grade a micro-check answer, record it, and refresh.
    pub fn apply_micro_check(
        &self,
        session: &mut SessionState,
        request: &MicroCheckRequest,
    ) -> Result<MicroCheckResult> {
        let result = evaluate_micro_check(session, request)?;
        session
            .check_results
            .insert(result.check_id.clone(), result.clone());
        self.refresh(session, None)?;
        Ok(result)
    }

    /// Render and cache the advisor packet for the current state.
    pub fn build_packet(&self, session: &mut SessionState) -> Result<String> {
        let snapshot = self.catalog.snapshot();
        let pack = resolve_pack(&snapshot, &session.selected_flow_id)?;
        let packet = build_advisor_packet(session, pack);
        session.packet_markdown = Some(packet.clone());
        session.updated_at = Utc::now();
        Ok(packet)
    }

    /// The canonical refresh: every mutation path funnels through here.
    fn refresh(
        &self,
        session: &mut SessionState,
        trigger: Option<&SessionEvent>,
    ) -> Result<UiMutation> {
        // Entities the intent states directly become fields unless the
        // user already set them.
        for (key, value) in seed_fields(&session.intent) {
            session.fields.entry(key).or_insert(value);
        }

        let snapshot = self.catalog.snapshot();
        let outcome = rank(&snapshot, &session.intent, &session.fields, &self.config);
        session.candidate_flows = outcome.candidates;
        session.ambiguity_flags = outcome.ambiguity_flags;

        if !session.flow_locked
            && let Some(top) = session.candidate_flows.first()
        {
            session.selected_flow_id = top.flow_id.clone();
        }
        let pack = resolve_pack(&snapshot, &session.selected_flow_id)?;
        self.apply_pack_state(session, pack);

        session.missing_items =
            compute_missing_items(&session.required_entities, &session.fields);
        refresh_step_statuses(&mut session.workflow, &session.fields);
        sync_graph_from_workflow(&mut session.case_graph, &session.workflow);

        session.disambiguation = self.disambiguation_card(session);
        session.available_checks = build_micro_checks(session, &self.checks.snapshot());

        session.scores = recompute_scores(session, pack);
        let mutation = compute_adaptation(session, trigger, &self.config);

        session.updated_at = Utc::now();
        debug!(
            session_id = %session.session_id,
            flow = %session.selected_flow_id,
            mode = %session.current_mode,
            risk = session.scores.escalation_risk,
            "Refreshed session"
        );
        Ok(mutation)
    }

    /// Apply the selected pack: entities, check ids, and (when the flow
    /// actually changed) a rebuilt workflow plus fresh citations.
    fn apply_pack_state(&self, session: &mut SessionState, pack: &FlowPack) {
        session.selected_flow_id = pack.flow_id.clone();
        session.selected_flow_title = pack.title.clone();
        session.required_entities = pack.required_entities.clone();
        session.active_check_ids = pack.micro_checks.clone();

        // Required entities always exist in the field map; empty means
        // unset. Values from a previous flow are never dropped.
        for entity in &pack.required_entities {
            session.fields.entry(entity.clone()).or_default();
        }

        if session.case_graph.flow_id == pack.flow_id {
            return;
        }

        // Preserve explicit completion across a flow switch where step
        // ids coincide.
        let previously_marked: Vec<String> = session
            .workflow
            .iter()
            .filter(|s| s.explicitly_complete)
            .map(|s| s.step_id.clone())
            .collect();

        session.case_graph = build_case_graph(pack);
        session.workflow = graph_to_workflow(&session.case_graph);
        for step_id in previously_marked {
            mark_step(&mut session.workflow, &step_id, true);
        }

        let mut query = format!("{} {}", session.intent, pack.title);
        for confusion in pack.common_confusions.iter().take(2) {
            query.push(' ');
            query.push_str(confusion);
        }
        session.citations =
            self.knowledge
                .retrieve(&query, self.config.citation_top_k, &pack.flow_id);
    }

    /// A disambiguation card is shown while routing is genuinely uncertain
    /// and the user has not pinned a flow.
    fn disambiguation_card(&self, session: &SessionState) -> Option<DisambiguationCard> {
        if session.flow_locked {
            return None;
        }
        let flagged = session.ambiguity_flags.iter().any(|f| {
            matches!(
                f,
                AmbiguityFlag::TopFlowsClose
                    | AmbiguityFlag::CptOptOverlap
                    | AmbiguityFlag::NoDirectMatch
            )
        });
        let weak_top = session.candidate_flows.len() >= 2
            && session
                .candidate_flows
                .first()
                .is_some_and(|top| top.score < self.config.disambiguation_floor);
        if !flagged && !weak_top {
            return None;
        }

        let options: Vec<String> = session
            .candidate_flows
            .iter()
            .take(3)
            .map(|c| format!("{} | {}", c.flow_id, c.title))
            .collect();
        if options.is_empty() {
            return None;
        }
        Some(DisambiguationCard {
            prompt: "Your input maps to multiple flows. Which one matches your situation best?"
                .into(),
            options,
        })
    }
}

fn resolve_pack<'a>(
    snapshot: &'a CatalogSnapshot,
    flow_id: &str,
) -> Result<&'a FlowPack> {
    // Only an empty catalog can fail here, and load rejects that; this
    // guards reloads that raced an empty directory.
    snapshot.get_or_fallback(flow_id).ok_or_else(|| {
        CatalogError::Empty {
            dir: "<snapshot>".into(),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::model::{FlowAppliesIf, FlowNode};
    use crate::catalog::{CAP_GAP_FLOW, CPT_FLOW, FALLBACK_FLOW, OPT_FLOW};
    use crate::session::model::{InterfaceMode, SessionProfile, StepStatus};

    fn node(node_id: &str, required: &[&str], deps: &[&str]) -> FlowNode {
        FlowNode {
            node_id: node_id.into(),
            node_type: "structured_form".into(),
            title: format!("Step {node_id}"),
            description: String::new(),
            required_fields: required.iter().map(|s| s.to_string()).collect(),
            dependencies: deps.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn pack(
        flow_id: &str,
        title: &str,
        keywords: &[&str],
        statuses: &[&str],
        stages: &[&str],
        required: &[&str],
        nodes: Vec<FlowNode>,
    ) -> FlowPack {
        FlowPack {
            flow_id: flow_id.into(),
            title: title.into(),
            description: "test pack".into(),
            applies_if: FlowAppliesIf {
                keywords_any: keywords.iter().map(|s| s.to_string()).collect(),
                status_any: statuses.iter().map(|s| s.to_string()).collect(),
                program_stage_any: stages.iter().map(|s| s.to_string()).collect(),
            },
            required_entities: required.iter().map(|s| s.to_string()).collect(),
            step_nodes: nodes,
            doc_requirements: Vec::new(),
            common_confusions: Vec::new(),
            micro_checks: Vec::new(),
            warnings: Vec::new(),
            handoff_rules: Vec::new(),
            critical_entities: Vec::new(),
            disclaimer: String::new(),
        }
    }

    fn engine() -> PipelineEngine {
        let packs = vec![
            pack(
                FALLBACK_FLOW,
                "F-1 Work Basics",
                &["work", "employment", "cpt", "opt", "authorization"],
                &["f1"],
                &["enrolled", "graduating", "graduated"],
                &["status_type", "program_stage"],
                vec![node("confirm_status", &["status_type"], &[]), node(
                    "confirm_stage",
                    &["program_stage"],
                    &["confirm_status"],
                )],
            ),
            pack(
                CPT_FLOW,
                "CPT Preparation",
                &["cpt", "curricular practical training", "internship"],
                &["cpt", "f1"],
                &["enrolled"],
                &["status_type", "program_stage", "employer_name"],
                vec![node("confirm_enrollment", &["program_stage"], &[])],
            ),
            pack(
                OPT_FLOW,
                "OPT Initial Preparation",
                &["opt", "optional practical training", "ead"],
                &["f1", "opt"],
                &["graduating", "graduated"],
                &["status_type", "program_stage", "graduation_date"],
                vec![node("confirm_graduation", &["graduation_date"], &[])],
            ),
            pack(
                CAP_GAP_FLOW,
                "Cap-Gap Transition Preparation",
                &["cap gap", "h-1b", "petition", "transition"],
                &["h1b", "cap_gap", "opt", "stem_opt"],
                &["working", "graduated"],
                &["status_type", "petition_status", "work_end_date"],
                vec![node("confirm_petition", &["petition_status"], &[])],
            ),
        ];
        PipelineEngine::new(
            Arc::new(CatalogStore::from_packs(packs).unwrap()),
            Arc::new(CheckBank::from_checks(vec![])),
            Arc::new(KnowledgeBase::from_chunks(vec![])),
            EngineConfig::default(),
        )
    }

    fn start(engine: &PipelineEngine, intent: &str) -> SessionState {
        engine
            .start_session(StartSessionRequest {
                intent: intent.into(),
                profile: SessionProfile::default(),
            })
            .unwrap()
            .0
    }

    #[test]
    fn short_intent_is_rejected() {
        let err = engine()
            .start_session(StartSessionRequest {
                intent: "help".into(),
                profile: SessionProfile::default(),
            })
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::Validation(ValidationError::IntentLength { got: 4, .. })
        ));
    }

    #[test]
    fn out_of_range_stress_is_rejected() {
        let mut profile = SessionProfile::default();
        profile.stress_level = 9;
        let err = engine()
            .start_session(StartSessionRequest {
                intent: "need help with work authorization".into(),
                profile,
            })
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::Validation(ValidationError::InvalidField { .. })
        ));
    }

    #[test]
    fn start_returns_the_initial_mode_decision() {
        let engine = engine();
        let (session, mutation) = engine
            .start_session(StartSessionRequest {
                intent: "I have an H-1B petition filed and my F-1 status ends soon, need cap-gap help"
                    .into(),
                profile: SessionProfile::default(),
            })
            .unwrap();
        assert_eq!(mutation.new_mode, session.current_mode);
        assert_eq!(mutation.new_mode, InterfaceMode::Transition);
        assert!(!mutation.reason.is_empty());
        assert!(!mutation.ui_changes.is_empty());
    }

    #[test]
    fn cap_gap_intent_lands_in_transition_mode() {
        let engine = engine();
        let session = start(
            &engine,
            "I have an H-1B petition filed and my F-1 status ends soon, need cap-gap help",
        );
        assert_eq!(session.selected_flow_id, CAP_GAP_FLOW);
        // Petition state stays a routing inference until confirmed, so the
        // transition rule fires.
        assert!(session.field("petition_status").is_none());
        assert_eq!(session.current_mode, InterfaceMode::Transition);
        assert!(session.missing_items.contains(&"petition_status".to_string()));
    }

    #[test]
    fn overlap_intent_offers_disambiguation() {
        let engine = engine();
        let session = start(
            &engine,
            "I'm on CPT and also doing OPT, not sure which applies",
        );
        assert!(
            session
                .ambiguity_flags
                .contains(&AmbiguityFlag::CptOptOverlap)
        );
        let card = session.disambiguation.as_ref().unwrap();
        assert!(card.options.len() >= 2);
        assert!(card.options.iter().any(|o| o.starts_with(CPT_FLOW)));
        assert!(card.options.iter().any(|o| o.starts_with(OPT_FLOW)));
        // The generated disambiguation check mirrors the card.
        assert!(
            session
                .available_checks
                .iter()
                .any(|c| c.check_id == "flow_disambiguation_check")
        );
    }

    #[test]
    fn select_flow_locks_routing_and_clears_disambiguation() {
        let engine = engine();
        let mut session = start(
            &engine,
            "I'm on CPT and also doing OPT, not sure which applies",
        );
        assert!(session.disambiguation.is_some());

        engine
            .apply_event(
                &mut session,
                SessionEvent::SelectFlow {
                    flow_id: CPT_FLOW.into(),
                },
            )
            .unwrap();
        assert_eq!(session.selected_flow_id, CPT_FLOW);
        assert!(session.flow_locked);
        assert!(session.disambiguation.is_none());

        // Later refreshes keep the pinned flow even though the router
        // still prefers the generic one.
        engine
            .apply_event(&mut session, SessionEvent::AskHelp)
            .unwrap();
        assert_eq!(session.selected_flow_id, CPT_FLOW);
    }

    #[test]
    fn direct_intent_seeds_fields_and_reaches_timeline() {
        let engine = engine();
        let session = start(
            &engine,
            "I'm an enrolled F-1 student needing work authorization help",
        );
        assert_eq!(session.selected_flow_id, FALLBACK_FLOW);
        assert_eq!(session.field("status_type"), Some("f1"));
        assert_eq!(session.field("program_stage"), Some("enrolled"));
        assert!(session.missing_items.is_empty());
        assert_eq!(session.scores.completeness, 100);
        assert_eq!(session.current_mode, InterfaceMode::Timeline);
        // Stable: another refresh keeps the mode.
        let mut session = session;
        engine
            .apply_event(&mut session, SessionEvent::Inactivity)
            .unwrap();
        assert_eq!(session.current_mode, InterfaceMode::Timeline);
    }

    #[test]
    fn field_updates_drive_step_completion() {
        let engine = engine();
        let mut session = start(&engine, "need help with employment paperwork soon");
        assert_eq!(session.selected_flow_id, FALLBACK_FLOW);
        assert_eq!(session.workflow[0].status, StepStatus::Pending);
        assert_eq!(session.workflow[1].status, StepStatus::Blocked);

        engine
            .apply_event(
                &mut session,
                SessionEvent::FieldUpdate {
                    field: "status_type".into(),
                    value: "f1".into(),
                },
            )
            .unwrap();
        assert_eq!(session.workflow[0].status, StepStatus::Complete);
        assert_eq!(session.workflow[1].status, StepStatus::Pending);
        assert!(!session.missing_items.contains(&"status_type".to_string()));
    }

    #[test]
    fn mode_change_event_locks_mode() {
        let engine = engine();
        let mut session = start(&engine, "need help with employment paperwork soon");
        let mutation = engine
            .apply_event(
                &mut session,
                SessionEvent::ModeChange {
                    mode: "explain".into(),
                },
            )
            .unwrap();
        assert_eq!(mutation.new_mode, InterfaceMode::Explain);
        assert_eq!(session.mode_lock_remaining, 3);

        engine
            .apply_event(&mut session, SessionEvent::Inactivity)
            .unwrap();
        assert_eq!(session.current_mode, InterfaceMode::Explain);
        assert_eq!(session.mode_lock_remaining, 2);
    }

    #[test]
    fn micro_check_results_feed_scores() {
        let engine = engine();
        let mut session = start(&engine, "need help with employment paperwork soon");
        let target = session.missing_items[0].clone();

        let result = engine
            .apply_micro_check(
                &mut session,
                &MicroCheckRequest {
                    check_id: "missing_item_check".into(),
                    selected_option: target,
                },
            )
            .unwrap();
        assert!(result.is_correct);
        assert!(session.check_results.contains_key("missing_item_check"));

        let err = engine
            .apply_micro_check(
                &mut session,
                &MicroCheckRequest {
                    check_id: "unknown".into(),
                    selected_option: "x".into(),
                },
            )
            .unwrap_err();
        assert!(matches!(err, crate::error::Error::Pipeline(_)));
    }

    #[test]
    fn packet_is_cached_on_session() {
        let engine = engine();
        let mut session = start(
            &engine,
            "I have an H-1B petition filed and my F-1 status ends soon, need cap-gap help",
        );
        let packet = engine.build_packet(&mut session).unwrap();
        assert!(packet.contains("Cap-Gap Transition Preparation"));
        assert_eq!(session.packet_markdown.as_deref(), Some(packet.as_str()));
    }

    #[test]
    fn unknown_selected_flow_falls_back() {
        let engine = engine();
        let mut session = start(&engine, "need help with employment paperwork soon");
        engine
            .apply_event(
                &mut session,
                SessionEvent::SelectFlow {
                    flow_id: "does_not_exist".into(),
                },
            )
            .unwrap();
        assert_eq!(session.selected_flow_id, FALLBACK_FLOW);
    }
}
