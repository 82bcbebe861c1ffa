pub mod judge;
pub mod ragas;

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

use crate::{error::AppError, types::AnswerMetrics};

pub use judge::LlmJudgeScorer;
pub use ragas::RagasScorer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScorerKind {
    Ragas,
    LlmJudge,
}

impl ScorerKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Ragas => "ragas",
            Self::LlmJudge => "llm_judge",
        }
    }
}

impl fmt::Display for ScorerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Everything an external scorer is sent for one generated answer.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ScoringRequest<'a> {
    pub question: &'a str,
    pub answer: &'a str,
    pub context: &'a [String],
    pub expected_answer: &'a str,
    pub retrieved_chunks: &'a [String],
    pub expected_chunks: &'a [String],
}

/// An external service that grades a generated answer.
#[async_trait]
pub trait AnswerScorer: Send + Sync {
    fn kind(&self) -> ScorerKind;

    async fn score(&self, request: &ScoringRequest<'_>) -> Result<AnswerMetrics, AppError>;
}
