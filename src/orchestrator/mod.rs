//! Orchestrator module for the daily interpretation cycle
//! Sequences the snapshot and the four text stages, isolating stage failures

pub mod cycle;
pub mod stages;

// Re-export main orchestrator
pub use cycle::{CycleError, CycleEvent, CycleReport, CycleState, DailyCycleOrchestrator, StageTrace};
pub use stages::StageKind;
