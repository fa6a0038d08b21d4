//! Session model — modes, events, scores, workflow state, and wire types.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Presentation mode ────────────────────────────────────────────────

/// Presentation mode the adaptation controller targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceMode {
    Checklist,
    Timeline,
    Explain,
    DocPrep,
    Transition,
    Advisor,
}

impl Default for InterfaceMode {
    fn default() -> Self {
        Self::Checklist
    }
}

impl std::fmt::Display for InterfaceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Checklist => "checklist",
            Self::Timeline => "timeline",
            Self::Explain => "explain",
            Self::DocPrep => "doc_prep",
            Self::Transition => "transition",
            Self::Advisor => "advisor",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for InterfaceMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "checklist" => Ok(Self::Checklist),
            "timeline" => Ok(Self::Timeline),
            "explain" => Ok(Self::Explain),
            "doc_prep" => Ok(Self::DocPrep),
            "transition" => Ok(Self::Transition),
            "advisor" => Ok(Self::Advisor),
            _ => Err(format!("Unknown mode: {}", s)),
        }
    }
}

// ── Step status ──────────────────────────────────────────────────────

/// Derived status of a workflow step.
///
/// Never stored independently of its inputs: every refresh re-derives it
/// from field fill state, the explicit completion overlay, and dependency
/// completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Complete,
    Blocked,
}

impl Default for StepStatus {
    fn default() -> Self {
        Self::Pending
    }
}

// ── Ambiguity flags ──────────────────────────────────────────────────

/// Routing-uncertainty tags emitted by the flow router.
///
/// `Ord` gives the sorted, deduplicated flag set the router reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguityFlag {
    /// Two specific overlapping flows ranked together while the stage
    /// entity that would separate them is unresolved.
    CptOptOverlap,
    /// Top candidate scored below the confidence floor.
    LowConfidenceRoute,
    /// No pack cleared the score threshold; a fallback was synthesized.
    NoDirectMatch,
    /// Program stage could not be resolved from text or fields.
    ProgramStageUnclear,
    /// Status type could not be resolved from text or fields.
    StatusUnclear,
    /// Top two candidates scored within the close margin.
    TopFlowsClose,
}

impl std::fmt::Display for AmbiguityFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::CptOptOverlap => "cpt_opt_overlap",
            Self::LowConfidenceRoute => "low_confidence_route",
            Self::NoDirectMatch => "no_direct_match",
            Self::ProgramStageUnclear => "program_stage_unclear",
            Self::StatusUnclear => "status_unclear",
            Self::TopFlowsClose => "top_flows_close",
        };
        write!(f, "{s}")
    }
}

// ── Profile ──────────────────────────────────────────────────────────

/// How familiar the user is with the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Familiarity {
    New,
    Intermediate,
    Advanced,
}

impl Default for Familiarity {
    fn default() -> Self {
        Self::New
    }
}

/// Who is driving the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionRole {
    Student,
    Caregiver,
    AdvisorHelper,
}

impl Default for SessionRole {
    fn default() -> Self {
        Self::Student
    }
}

/// User profile captured at session start.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionProfile {
    pub familiarity: Familiarity,
    pub preferred_mode: InterfaceMode,
    /// Self-reported stress, 1..=5.
    pub stress_level: u8,
    pub role: SessionRole,
}

impl Default for SessionProfile {
    fn default() -> Self {
        Self {
            familiarity: Familiarity::New,
            preferred_mode: InterfaceMode::Checklist,
            stress_level: 3,
            role: SessionRole::Student,
        }
    }
}

// ── Workflow / graph ─────────────────────────────────────────────────

/// A step in the linear workflow view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub step_id: String,
    pub title: String,
    pub description: String,
    pub node_type: String,
    #[serde(default)]
    pub required_fields: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub status: StepStatus,
    /// Explicit user completion overlay. Cleared by unmark/reopen;
    /// field-derived completion still applies afterwards.
    #[serde(default)]
    pub explicitly_complete: bool,
}

/// A node in the dependency-graph view (display projection).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseGraphNode {
    pub node_id: String,
    pub node_type: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub required_fields: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub status: StepStatus,
}

/// A dependency edge between graph nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseGraphEdge {
    pub edge_id: String,
    pub from_node: String,
    pub to_node: String,
    pub edge_type: String,
}

/// Read-only graph projection of the workflow.
///
/// The workflow is authoritative; refresh propagates step status into the
/// graph, never the reverse.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaseGraph {
    pub flow_id: String,
    pub nodes: Vec<CaseGraphNode>,
    pub edges: Vec<CaseGraphEdge>,
}

// ── Router output ────────────────────────────────────────────────────

/// A ranked flow candidate from the router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowCandidate {
    pub flow_id: String,
    pub title: String,
    pub score: f64,
    pub reason: String,
}

/// Prompt offered when routing is ambiguous.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisambiguationCard {
    pub prompt: String,
    pub options: Vec<String>,
}

// ── Scores ───────────────────────────────────────────────────────────

/// The four bounded readiness metrics, each clamped to 0..=100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreCard {
    pub understanding: u8,
    pub clarity: u8,
    pub completeness: u8,
    pub escalation_risk: u8,
}

impl Default for ScoreCard {
    fn default() -> Self {
        Self {
            understanding: 70,
            clarity: 70,
            completeness: 0,
            escalation_risk: 15,
        }
    }
}

// ── Events ───────────────────────────────────────────────────────────

/// A user action against a session.
///
/// Unknown mode strings in `ModeChange` are deliberately left as strings:
/// an unrecognized mode is absorbed as a no-op, never a validation error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "payload", rename_all = "snake_case")]
pub enum SessionEvent {
    FieldUpdate { field: String, value: String },
    MarkStep { step_id: String },
    UnmarkStep { step_id: String },
    StepReopen { step_id: String },
    ModeChange { mode: String },
    SelectFlow { flow_id: String },
    Inactivity,
    AskHelp,
}

impl SessionEvent {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::FieldUpdate { .. } => "field_update",
            Self::MarkStep { .. } => "mark_step",
            Self::UnmarkStep { .. } => "unmark_step",
            Self::StepReopen { .. } => "step_reopen",
            Self::ModeChange { .. } => "mode_change",
            Self::SelectFlow { .. } => "select_flow",
            Self::Inactivity => "inactivity",
            Self::AskHelp => "ask_help",
        }
    }

    /// Whether this event counts toward the confusion signal in scoring.
    pub fn is_confusion_signal(&self) -> bool {
        matches!(
            self,
            Self::Inactivity | Self::StepReopen { .. } | Self::AskHelp
        )
    }
}

/// Append-only event log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserEvent {
    #[serde(flatten)]
    pub event: SessionEvent,
    pub created_at: DateTime<Utc>,
}

impl UserEvent {
    pub fn now(event: SessionEvent) -> Self {
        Self {
            event,
            created_at: Utc::now(),
        }
    }
}

/// Append-only adaptation log entry — written only on genuine mode change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptationEvent {
    pub reason: String,
    pub from_mode: InterfaceMode,
    pub to_mode: InterfaceMode,
    pub ui_changes: Vec<String>,
    pub created_at: DateTime<Utc>,
}

// ── Micro-checks ─────────────────────────────────────────────────────

/// A small comprehension check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MicroCheck {
    pub check_id: String,
    pub prompt: String,
    pub options: Vec<String>,
    pub correct_option: String,
    pub explanation: String,
}

/// Result of answering a micro-check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MicroCheckResult {
    pub check_id: String,
    pub selected_option: String,
    pub is_correct: bool,
    pub feedback: String,
}

// ── Session state ────────────────────────────────────────────────────

/// Full mutable state of one guidance session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    pub intent: String,
    pub profile: SessionProfile,

    pub selected_flow_id: String,
    pub selected_flow_title: String,
    /// Set when the user explicitly selects a flow; suppresses further
    /// disambiguation prompts.
    pub flow_locked: bool,
    pub candidate_flows: Vec<FlowCandidate>,
    pub ambiguity_flags: Vec<AmbiguityFlag>,
    pub disambiguation: Option<DisambiguationCard>,

    pub current_mode: InterfaceMode,
    /// Remaining refreshes during which automatic mode switching is
    /// suppressed after an explicit user mode selection.
    pub mode_lock_remaining: u8,

    pub case_graph: CaseGraph,
    pub workflow: Vec<WorkflowStep>,

    pub required_entities: Vec<String>,
    /// Entity name → value; empty string means unset. Append/overwrite
    /// only — switching flows merges new entities but never drops values.
    pub fields: BTreeMap<String, String>,
    pub missing_items: Vec<String>,

    pub scores: ScoreCard,
    pub citations: Vec<Citation>,

    pub active_check_ids: Vec<String>,
    pub available_checks: Vec<MicroCheck>,
    pub check_results: BTreeMap<String, MicroCheckResult>,

    pub events: Vec<UserEvent>,
    pub adaptation_log: Vec<AdaptationEvent>,

    pub packet_markdown: Option<String>,
}

impl SessionState {
    /// Create a fresh session around an intent and profile.
    pub fn new(intent: String, profile: SessionProfile) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            current_mode: profile.preferred_mode,
            intent,
            profile,
            selected_flow_id: String::new(),
            selected_flow_title: String::new(),
            flow_locked: false,
            candidate_flows: Vec::new(),
            ambiguity_flags: Vec::new(),
            disambiguation: None,
            mode_lock_remaining: 0,
            case_graph: CaseGraph::default(),
            workflow: Vec::new(),
            required_entities: Vec::new(),
            fields: BTreeMap::new(),
            missing_items: Vec::new(),
            scores: ScoreCard::default(),
            citations: Vec::new(),
            active_check_ids: Vec::new(),
            available_checks: Vec::new(),
            check_results: BTreeMap::new(),
            events: Vec::new(),
            adaptation_log: Vec::new(),
            packet_markdown: None,
        }
    }

    /// Look up a field, treating whitespace-only values as unset.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

// ── Citations ────────────────────────────────────────────────────────

/// A supporting source citation attached to the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub source_id: String,
    pub title: String,
    pub url: String,
    pub snippet: String,
}

// ── Wire types ───────────────────────────────────────────────────────

/// Request to start a new session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartSessionRequest {
    pub intent: String,
    #[serde(default)]
    pub profile: SessionProfile,
}

/// Mode decision returned after every pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiMutation {
    pub new_mode: InterfaceMode,
    pub ui_changes: Vec<String>,
    pub reason: String,
}

/// Request to answer a micro-check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MicroCheckRequest {
    pub check_id: String,
    pub selected_option: String,
}
