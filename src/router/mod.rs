//! Flow routing: entity extraction and candidate ranking.

pub mod entities;
pub mod rank;

pub use entities::{explicit_stage, extract_entities, seed_fields};
pub use rank::{RankOutcome, rank};
