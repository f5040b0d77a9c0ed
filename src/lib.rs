// Market Interpreter - daily market snapshot and interpretation pipeline
// Computes bounded statistical signals for a cross-asset basket plus macro rates,
// then runs them through grounding, hypothesis, validation and synthesis stages.

#![deny(clippy::unwrap_used)]

pub mod cli;
pub mod config;
pub mod data;
pub mod llm;
pub mod orchestrator;

// Re-export commonly used items
pub use config::Config;
pub use data::{MarketSnapshot, SnapshotEngine, SnapshotProvider};
pub use orchestrator::{CycleError, CycleReport, DailyCycleOrchestrator};
