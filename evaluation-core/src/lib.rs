pub mod citation;
pub mod config;
pub mod dataset;
pub mod error;
pub mod evaluator;
pub mod metrics;
pub mod scorers;
pub mod scoring;
pub mod types;

pub use citation::CitationMetrics;
pub use config::{get_config, EvaluationConfig};
pub use dataset::{Difficulty, EvaluationDataset, Sample, SampleSelection, SelectedSamples};
pub use error::AppError;
pub use evaluator::{EvaluationOptions, EvaluationRequest, Evaluator};
pub use metrics::{Cutoff, RetrievalMetrics};
pub use scorers::{AnswerScorer, LlmJudgeScorer, RagasScorer, ScorerKind, ScoringRequest};
pub use scoring::{AbsentAnswerPolicy, ScoreComponents, ScorePolicy, ScoreWeights};
pub use types::{
    AnswerMetrics, EvaluationResult, FlatRecord, PerformanceCounters, PerformanceMetrics,
    TokenPricing,
};
