use std::{sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    citation::CitationMetrics,
    config::EvaluationConfig,
    error::AppError,
    metrics::{Cutoff, RetrievalMetrics},
    scorers::{AnswerScorer, LlmJudgeScorer, RagasScorer, ScoringRequest},
    scoring::{ScoreComponents, ScorePolicy},
    types::{AnswerMetrics, EvaluationResult, PerformanceCounters, PerformanceMetrics, TokenPricing},
};

pub const DEFAULT_SCORER_TIMEOUT: Duration = Duration::from_secs(60);

/// One generated answer together with its ground truth.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRequest {
    pub question: String,
    pub answer: String,
    pub retrieved_chunks: Vec<String>,
    /// Chunks the answer cites. When absent the retrieved chunks stand in.
    #[serde(default)]
    pub cited_chunks: Option<Vec<String>>,
    #[serde(default)]
    pub context: Vec<String>,
    pub expected_answer: String,
    pub expected_chunks: Vec<String>,
    #[serde(default)]
    pub performance: PerformanceCounters,
}

impl EvaluationRequest {
    fn cited(&self) -> &[String] {
        self.cited_chunks
            .as_deref()
            .unwrap_or(self.retrieved_chunks.as_slice())
    }

    pub fn scoring_request(&self) -> ScoringRequest<'_> {
        ScoringRequest {
            question: &self.question,
            answer: &self.answer,
            context: &self.context,
            expected_answer: &self.expected_answer,
            retrieved_chunks: &self.retrieved_chunks,
            expected_chunks: &self.expected_chunks,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvaluationOptions {
    pub use_ragas: bool,
    pub use_llm_judge: bool,
}

impl EvaluationOptions {
    pub fn all() -> Self {
        Self {
            use_ragas: true,
            use_llm_judge: true,
        }
    }
}

/// Combines retrieval, citation and answer-quality signals into one result.
///
/// An `Evaluator` holds no mutable state, so a single instance can be shared
/// across concurrent `evaluate` calls.
#[derive(Clone)]
pub struct Evaluator {
    cutoff: Cutoff,
    policy: ScorePolicy,
    pricing: TokenPricing,
    ragas: Option<Arc<dyn AnswerScorer>>,
    judge: Option<Arc<dyn AnswerScorer>>,
    scorer_timeout: Duration,
}

impl Evaluator {
    pub fn new(cutoff: Cutoff) -> Self {
        Self {
            cutoff,
            policy: ScorePolicy::default(),
            pricing: TokenPricing::default(),
            ragas: None,
            judge: None,
            scorer_timeout: DEFAULT_SCORER_TIMEOUT,
        }
    }

    pub fn from_config(config: &EvaluationConfig) -> Result<Self, AppError> {
        config.validate()?;
        let timeout = Duration::from_secs(config.scorer_timeout_secs);

        let mut evaluator = Self::new(config.k)
            .with_policy(config.score_policy())
            .with_pricing(config.pricing)
            .with_timeout(timeout);

        if let Some(url) = config.ragas_url() {
            let scorer = RagasScorer::new(url, config.ragas_api_key.clone(), timeout)?;
            evaluator = evaluator.with_ragas(Arc::new(scorer));
        }
        if let Some(api_key) = config.openai_api_key() {
            let scorer = LlmJudgeScorer::from_credentials(
                api_key,
                &config.openai_base_url,
                config.judge_model.clone(),
            );
            evaluator = evaluator.with_judge(Arc::new(scorer));
        }

        info!(
            k = evaluator.cutoff.get(),
            ragas = evaluator.ragas.is_some(),
            llm_judge = evaluator.judge.is_some(),
            absent_answer = %evaluator.policy.absent_answer,
            "Evaluator configured"
        );
        Ok(evaluator)
    }

    #[must_use]
    pub fn with_policy(mut self, policy: ScorePolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_pricing(mut self, pricing: TokenPricing) -> Self {
        self.pricing = pricing;
        self
    }

    #[must_use]
    pub fn with_ragas(mut self, scorer: Arc<dyn AnswerScorer>) -> Self {
        self.ragas = Some(scorer);
        self
    }

    #[must_use]
    pub fn with_judge(mut self, scorer: Arc<dyn AnswerScorer>) -> Self {
        self.judge = Some(scorer);
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.scorer_timeout = timeout;
        self
    }

    pub fn cutoff(&self) -> Cutoff {
        self.cutoff
    }

    pub fn policy(&self) -> &ScorePolicy {
        &self.policy
    }

    pub fn has_ragas(&self) -> bool {
        self.ragas.is_some()
    }

    pub fn has_judge(&self) -> bool {
        self.judge.is_some()
    }

    pub async fn evaluate(
        &self,
        request: &EvaluationRequest,
        options: EvaluationOptions,
    ) -> EvaluationResult {
        let retrieval = RetrievalMetrics::compute(
            &request.retrieved_chunks,
            &request.expected_chunks,
            self.cutoff,
        );
        let citation = CitationMetrics::compute(request.cited(), &request.expected_chunks);

        let scoring_request = request.scoring_request();
        let ragas = self.ragas.as_ref().filter(|_| options.use_ragas);
        let judge = self.judge.as_ref().filter(|_| options.use_llm_judge);
        let (ragas, llm_judge) = tokio::join!(
            self.run_scorer(ragas, &scoring_request),
            self.run_scorer(judge, &scoring_request),
        );

        let performance = PerformanceMetrics::from_counters(&request.performance, &self.pricing);

        let mut result = EvaluationResult {
            question: request.question.clone(),
            k: self.cutoff.get(),
            retrieval,
            citation,
            ragas,
            llm_judge,
            performance,
            overall_score: 0.0,
        };
        result.overall_score = self.policy.overall_score(ScoreComponents {
            retrieval: result.retrieval.mean(),
            citation: result.citation.mean(),
            answer: result.answer_metrics().map(|metrics| metrics.mean()),
        });

        debug!(
            question = %result.question,
            overall_score = result.overall_score,
            "Evaluated answer"
        );
        result
    }

    async fn run_scorer(
        &self,
        scorer: Option<&Arc<dyn AnswerScorer>>,
        request: &ScoringRequest<'_>,
    ) -> Option<AnswerMetrics> {
        let scorer = scorer?;
        match tokio::time::timeout(self.scorer_timeout, scorer.score(request)).await {
            Ok(Ok(metrics)) => Some(metrics),
            Ok(Err(err)) => {
                warn!(scorer = %scorer.kind(), error = %err, "Answer scorer failed");
                None
            }
            Err(_) => {
                warn!(
                    scorer = %scorer.kind(),
                    timeout_ms = u64::try_from(self.scorer_timeout.as_millis()).unwrap_or(u64::MAX),
                    "Answer scorer timed out"
                );
                None
            }
        }
    }
}
