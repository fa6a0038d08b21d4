//! Immutable procedure catalog: flow packs and the shared micro-check bank.

pub mod model;
pub mod store;

pub use model::{FlowAppliesIf, FlowNode, FlowPack};
pub use store::{CatalogSnapshot, CatalogStore, CheckBank};

/// Designated fallback flow when nothing else applies.
pub const FALLBACK_FLOW: &str = "f1_work_basics";
/// The two specific flows that commonly overlap in free-text intent.
pub const CPT_FLOW: &str = "cpt_prep";
pub const OPT_FLOW: &str = "opt_initial_prep";
/// The transition-type flow whose defining field is `petition_status`.
pub const CAP_GAP_FLOW: &str = "cap_gap_transition_prep";
pub const STEM_OPT_FLOW: &str = "opt_stem_prep";
