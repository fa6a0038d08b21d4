//! The closed-loop refresh pipeline: workflow status derivation, scoring,
//! adaptation, micro-checks, and the advisor packet.

pub mod adaptation;
pub mod checks;
pub mod engine;
pub mod packet;
pub mod scoring;
pub mod workflow;

pub use engine::PipelineEngine;
