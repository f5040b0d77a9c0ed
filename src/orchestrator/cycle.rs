//! Daily cycle orchestrator
//! Runs the four stages strictly in order: snapshot → grounding → hypothesis → validation → synthesis

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info};

use super::stages::StageKind;
use crate::{
    config::{Config, StageModels},
    data::{SnapshotEngine, SnapshotProvider},
    llm::{GenerationRequest, LLMClient, TextGenerator},
};

/// Linear cycle states; no branches, no loops back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Grounding,
    Hypothesis,
    Validation,
    Synthesis,
    Done,
}

impl CycleState {
    pub fn next(self) -> Self {
        match self {
            CycleState::Idle => CycleState::Grounding,
            CycleState::Grounding => CycleState::Hypothesis,
            CycleState::Hypothesis => CycleState::Validation,
            CycleState::Validation => CycleState::Synthesis,
            CycleState::Synthesis | CycleState::Done => CycleState::Done,
        }
    }

    /// Stage executed while in this state
    pub fn stage(self) -> Option<StageKind> {
        match self {
            CycleState::Grounding => Some(StageKind::RealityAnalyzer),
            CycleState::Hypothesis => Some(StageKind::Intuition),
            CycleState::Validation => Some(StageKind::Reasoning),
            CycleState::Synthesis => Some(StageKind::CioSynthesizer),
            CycleState::Idle | CycleState::Done => None,
        }
    }
}

/// Progress notifications for callers that want to show intermediate output
#[derive(Debug, Clone, PartialEq)]
pub enum CycleEvent {
    StageStarted { stage: StageKind },
    StageCompleted { stage: StageKind, output: String },
    CycleFailed { stage: StageKind, reason: String },
}

#[derive(Error, Debug)]
pub enum CycleError {
    #[error("Cycle failed at stage {index} ({stage}): {reason}")]
    StageFailed {
        index: usize,
        stage: StageKind,
        reason: String,
    },
}

impl CycleError {
    fn stage_failed(stage: StageKind, reason: impl Into<String>) -> Self {
        CycleError::StageFailed {
            index: stage.index(),
            stage,
            reason: reason.into(),
        }
    }

    pub fn stage(&self) -> StageKind {
        match self {
            CycleError::StageFailed { stage, .. } => *stage,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StageTrace {
    pub stage: StageKind,
    pub model: String,
    pub output_chars: usize,
    pub elapsed_ms: u128,
}

/// Outcome of a completed cycle
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    /// Final synthesis output, exactly as produced
    pub memo: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stages: Vec<StageTrace>,
}

/// What the next stage consumes
enum StageInput {
    /// Grounding has not run yet; it fetches the snapshot itself
    Trigger(Option<Vec<String>>),
    Text(String),
}

pub struct DailyCycleOrchestrator {
    snapshots: Arc<dyn SnapshotProvider>,
    generator: Arc<dyn TextGenerator>,
    stages: StageModels,
    events: Option<UnboundedSender<CycleEvent>>,
}

impl DailyCycleOrchestrator {
    pub fn new(
        snapshots: Arc<dyn SnapshotProvider>,
        generator: Arc<dyn TextGenerator>,
        stages: StageModels,
    ) -> Self {
        Self {
            snapshots,
            generator,
            stages,
            events: None,
        }
    }

    /// Wire the production engine and Ollama client from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        info!("Initializing daily cycle orchestrator");

        let engine = SnapshotEngine::from_config(config)?;
        let llm_client = LLMClient::from_config(config)?;

        Ok(Self::new(
            Arc::new(engine),
            Arc::new(llm_client),
            config.stages.clone(),
        ))
    }

    pub fn with_events(mut self, events: UnboundedSender<CycleEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Run one full cycle. Either every stage completes and the synthesis
    /// text is returned, or the first failing stage is reported.
    pub async fn run_daily_cycle(
        &self,
        identifiers: Option<Vec<String>>,
    ) -> Result<CycleReport, CycleError> {
        info!("🌅 Starting daily cycle");
        let started_at = Utc::now();

        let mut state = CycleState::Idle.next();
        let mut payload = StageInput::Trigger(identifiers);
        let mut traces = Vec::with_capacity(StageKind::ALL.len());

        while let Some(stage) = state.stage() {
            self.emit(CycleEvent::StageStarted { stage });

            let result = match payload {
                StageInput::Trigger(identifiers) => {
                    match self.ground(stage, identifiers).await {
                        Ok(snapshot_text) => self.run_stage(stage, snapshot_text).await,
                        Err(e) => Err(e),
                    }
                }
                StageInput::Text(text) => self.run_stage(stage, text).await,
            };

            let (output, trace) = match result {
                Ok(done) => done,
                Err(e) => {
                    error!("Daily cycle failed: {}", e);
                    self.emit(CycleEvent::CycleFailed {
                        stage,
                        reason: e.to_string(),
                    });
                    return Err(e);
                }
            };

            self.emit(CycleEvent::StageCompleted {
                stage,
                output: output.clone(),
            });
            traces.push(trace);
            payload = StageInput::Text(output);
            state = state.next();
        }

        let memo = match payload {
            StageInput::Text(memo) => memo,
            StageInput::Trigger(_) => {
                return Err(CycleError::stage_failed(
                    StageKind::RealityAnalyzer,
                    "pipeline ran no stages",
                ))
            }
        };

        info!("✅ Daily cycle complete ({} stages)", traces.len());
        Ok(CycleReport {
            memo,
            started_at,
            finished_at: Utc::now(),
            stages: traces,
        })
    }

    /// Grounding's tool call: build the snapshot and render it for the stage
    async fn ground(
        &self,
        stage: StageKind,
        identifiers: Option<Vec<String>>,
    ) -> Result<String, CycleError> {
        info!("📊 Fetching market snapshot...");
        let snapshot = self.snapshots.get_market_snapshot(identifiers).await;
        snapshot
            .render()
            .map_err(|e| CycleError::stage_failed(stage, format!("failed to render snapshot: {}", e)))
    }

    async fn run_stage(
        &self,
        stage: StageKind,
        input: String,
    ) -> Result<(String, StageTrace), CycleError> {
        let params = self
            .stages
            .get(stage)
            .ok_or_else(|| CycleError::stage_failed(stage, "no model configured for stage"))?;

        info!(
            stage = stage.as_str(),
            model = %params.model,
            "💡 Running stage {}/{}",
            stage.index(),
            StageKind::ALL.len()
        );

        let started = Instant::now();
        let response = self
            .generator
            .generate(GenerationRequest {
                model: params.model.clone(),
                temperature: params.temperature,
                instructions: stage.instructions().to_string(),
                input,
            })
            .await
            .map_err(|e| CycleError::stage_failed(stage, format!("{:#}", e)))?;

        if response.content.trim().is_empty() {
            return Err(CycleError::stage_failed(stage, "stage produced no output"));
        }

        let trace = StageTrace {
            stage,
            model: response.model.clone(),
            output_chars: response.content.len(),
            elapsed_ms: started.elapsed().as_millis(),
        };

        Ok((response.content, trace))
    }

    fn emit(&self, event: CycleEvent) {
        if let Some(events) = &self.events {
            // A dropped receiver only means nobody is watching
            let _ = events.send(event);
        }
    }
}
