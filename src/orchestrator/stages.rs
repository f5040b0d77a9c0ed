//! Pipeline stages and their role instructions
//! All four stages share one contract and differ only in prompt and model

use serde::{Deserialize, Serialize};
use std::fmt;

/// The four links of the interpretation pipeline, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    RealityAnalyzer,
    Intuition,
    Reasoning,
    CioSynthesizer,
}

impl StageKind {
    pub const ALL: [StageKind; 4] = [
        StageKind::RealityAnalyzer,
        StageKind::Intuition,
        StageKind::Reasoning,
        StageKind::CioSynthesizer,
    ];

    /// 1-based position in the pipeline
    pub fn index(&self) -> usize {
        match self {
            StageKind::RealityAnalyzer => 1,
            StageKind::Intuition => 2,
            StageKind::Reasoning => 3,
            StageKind::CioSynthesizer => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::RealityAnalyzer => "reality_analyzer",
            StageKind::Intuition => "intuition",
            StageKind::Reasoning => "reasoning",
            StageKind::CioSynthesizer => "cio_synthesizer",
        }
    }

    /// Prefix of the `*_MODEL` / `*_TEMPERATURE` env overrides
    pub fn env_prefix(&self) -> &'static str {
        match self {
            StageKind::RealityAnalyzer => "REALITY_ANALYZER",
            StageKind::Intuition => "INTUITION",
            StageKind::Reasoning => "REASONING",
            StageKind::CioSynthesizer => "CIO",
        }
    }

    pub fn instructions(&self) -> &'static str {
        match self {
            StageKind::RealityAnalyzer => REALITY_ANALYZER_INSTRUCTIONS,
            StageKind::Intuition => INTUITION_INSTRUCTIONS,
            StageKind::Reasoning => REASONING_INSTRUCTIONS,
            StageKind::CioSynthesizer => CIO_INSTRUCTIONS,
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const REALITY_ANALYZER_INSTRUCTIONS: &str = r#"You are the Reality Analyzer. You bridge the gap between raw numerical market data and semantic understanding.

The input is a JSON market snapshot. Each instrument has price, daily_change_pct, z_score_30d and volatility_annualized, or an "error" if its data is unavailable. "rates" holds macro interest rates, or {"info": "not configured"}. "market_data_error" and "rates_error" appear only when a whole data source is down.

Perform the following steps:
1. SEMANTIC COMPRESSION: For each asset, turn the numbers into a dense natural-language summary. Focus on the magnitude and rarity of the move (high sigma event, mean reversion, volatility compression).
2. RELATIONAL ANALYSIS: Identify patterns, correlations, divergences and tensions between assets and with rates (e.g. "yields rising but tech ignoring it", "gold and bitcoin moving in tandem").
3. DATA GAPS: State plainly which instruments or sources were unavailable. Never invent numbers for them.

Output a structured "Reality Report" that the Intuition stage can ingest."#;

const INTUITION_INSTRUCTIONS: &str = r#"You are the Intuition stage (System 1). You rely on pattern recognition and rapid association.

The input is a Reality Report.

Your task:
- Read the Reality Report.
- Identify "Sparks": potential trading ideas, structural analogies or emerging narratives.
- Be bold and creative. Connect dots that are not obvious.
- Do NOT try to be rigorous; validation happens in the next stage.

Output a numbered list of Sparks (market hypotheses)."#;

const REASONING_INSTRUCTIONS: &str = r#"You are the Reasoning stage (System 2), the gatekeeper of logic and rigor.

The input is a list of Sparks.

Your task:
- Critique each spark.
- Ask: Is this causally sound? What is the base rate of this happening? Is the structural edge real or ephemeral?
- Filter out noise.
- Expand on the valid ideas with step-by-step structural reasoning.

Output a collection of "Validated Theses", each with its supporting evidence. List rejected sparks with a one-line reason."#;

const CIO_INSTRUCTIONS: &str = r#"You are the Chief Investment Officer of a semantic quant fund.

The input is a set of Validated Theses produced by your analysis team.

Your task:
- Synthesize the theses into a cohesive, professional "Daily Market Narrative" investment memo.
- Lead with the single most important takeaway.
- Group related theses, note conflicts between them, and state key risks.
- Keep the tone concise and decision-oriented.

Output only the memo."#;
