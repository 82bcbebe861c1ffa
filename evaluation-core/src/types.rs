use serde::{Deserialize, Serialize};

use crate::{
    citation::CitationMetrics, error::AppError, metrics::RetrievalMetrics, scoring::clamp_unit,
};

/// Qualitative answer scores supplied by an external scorer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnswerMetrics {
    pub relevance: f64,
    pub completeness: f64,
    pub coherence: f64,
}

impl AnswerMetrics {
    /// Clamps each dimension into [0, 1]; non-finite input is rejected.
    pub fn new(relevance: f64, completeness: f64, coherence: f64) -> Result<Self, AppError> {
        for (label, value) in [
            ("relevance", relevance),
            ("completeness", completeness),
            ("coherence", coherence),
        ] {
            if !value.is_finite() {
                return Err(AppError::Validation(format!(
                    "answer {label} score must be finite (got {value})"
                )));
            }
        }
        Ok(Self {
            relevance: clamp_unit(relevance),
            completeness: clamp_unit(completeness),
            coherence: clamp_unit(coherence),
        })
    }

    pub fn mean(&self) -> f64 {
        (self.relevance + self.completeness + self.coherence) / 3.0
    }
}

/// Raw counters captured while the RAG application answered a question.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceCounters {
    pub retrieval_latency_ms: u64,
    pub llm_latency_ms: u64,
    pub embedding_tokens: u64,
    pub llm_input_tokens: u64,
    pub llm_output_tokens: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
}

/// USD prices per million tokens, used when a run carries no explicit cost.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenPricing {
    pub embedding_per_million: f64,
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl Default for TokenPricing {
    fn default() -> Self {
        Self {
            embedding_per_million: 0.02,
            input_per_million: 0.15,
            output_per_million: 0.60,
        }
    }
}

impl TokenPricing {
    pub fn estimate(&self, counters: &PerformanceCounters) -> f64 {
        const PER: f64 = 1_000_000.0;
        let cost = (counters.embedding_tokens as f64 * self.embedding_per_million
            + counters.llm_input_tokens as f64 * self.input_per_million
            + counters.llm_output_tokens as f64 * self.output_per_million)
            / PER;
        if cost.is_finite() {
            cost.max(0.0)
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub retrieval_latency_ms: u64,
    pub llm_latency_ms: u64,
    pub embedding_tokens: u64,
    pub llm_input_tokens: u64,
    pub llm_output_tokens: u64,
    pub cost_usd: f64,
}

impl PerformanceMetrics {
    pub fn from_counters(counters: &PerformanceCounters, pricing: &TokenPricing) -> Self {
        let cost_usd = counters
            .cost_usd
            .filter(|cost| cost.is_finite() && *cost >= 0.0)
            .unwrap_or_else(|| pricing.estimate(counters));
        Self {
            retrieval_latency_ms: counters.retrieval_latency_ms,
            llm_latency_ms: counters.llm_latency_ms,
            embedding_tokens: counters.embedding_tokens,
            llm_input_tokens: counters.llm_input_tokens,
            llm_output_tokens: counters.llm_output_tokens,
            cost_usd,
        }
    }

    pub fn total_latency_ms(&self) -> u64 {
        self.retrieval_latency_ms.saturating_add(self.llm_latency_ms)
    }

    pub fn total_tokens(&self) -> u64 {
        self.embedding_tokens
            .saturating_add(self.llm_input_tokens)
            .saturating_add(self.llm_output_tokens)
    }
}

/// Finished evaluation of one query. Serialises as a flat record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "FlatRecord", from = "FlatRecord")]
pub struct EvaluationResult {
    pub question: String,
    pub k: usize,
    pub retrieval: RetrievalMetrics,
    pub citation: CitationMetrics,
    pub ragas: Option<AnswerMetrics>,
    pub llm_judge: Option<AnswerMetrics>,
    pub performance: PerformanceMetrics,
    pub overall_score: f64,
}

impl EvaluationResult {
    /// Per-dimension mean across the scorers that produced a result.
    pub fn answer_metrics(&self) -> Option<AnswerMetrics> {
        let present: Vec<&AnswerMetrics> = self.ragas.iter().chain(self.llm_judge.iter()).collect();
        if present.is_empty() {
            return None;
        }
        let count = present.len() as f64;
        Some(AnswerMetrics {
            relevance: present.iter().map(|m| m.relevance).sum::<f64>() / count,
            completeness: present.iter().map(|m| m.completeness).sum::<f64>() / count,
            coherence: present.iter().map(|m| m.coherence).sum::<f64>() / count,
        })
    }

    pub fn to_record(&self) -> FlatRecord {
        FlatRecord::from(self.clone())
    }
}

/// Plain key/value shape used for baseline files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatRecord {
    pub question: String,
    pub k: usize,
    pub ndcg_at_k: f64,
    pub precision_at_k: f64,
    pub recall_at_k: f64,
    pub mrr: f64,
    pub citation_accuracy: f64,
    pub citation_precision: f64,
    pub citation_recall: f64,
    pub ragas_relevance: Option<f64>,
    pub ragas_completeness: Option<f64>,
    pub ragas_coherence: Option<f64>,
    pub judge_relevance: Option<f64>,
    pub judge_completeness: Option<f64>,
    pub judge_coherence: Option<f64>,
    pub retrieval_latency_ms: u64,
    pub llm_latency_ms: u64,
    pub embedding_tokens: u64,
    pub llm_input_tokens: u64,
    pub llm_output_tokens: u64,
    pub cost_usd: f64,
    pub overall_score: f64,
}

fn split_answer(metrics: Option<AnswerMetrics>) -> (Option<f64>, Option<f64>, Option<f64>) {
    match metrics {
        Some(m) => (Some(m.relevance), Some(m.completeness), Some(m.coherence)),
        None => (None, None, None),
    }
}

fn join_answer(
    relevance: Option<f64>,
    completeness: Option<f64>,
    coherence: Option<f64>,
) -> Option<AnswerMetrics> {
    Some(AnswerMetrics {
        relevance: relevance?,
        completeness: completeness?,
        coherence: coherence?,
    })
}

impl From<EvaluationResult> for FlatRecord {
    fn from(result: EvaluationResult) -> Self {
        let (ragas_relevance, ragas_completeness, ragas_coherence) = split_answer(result.ragas);
        let (judge_relevance, judge_completeness, judge_coherence) =
            split_answer(result.llm_judge);
        Self {
            question: result.question,
            k: result.k,
            ndcg_at_k: result.retrieval.ndcg_at_k,
            precision_at_k: result.retrieval.precision_at_k,
            recall_at_k: result.retrieval.recall_at_k,
            mrr: result.retrieval.mrr,
            citation_accuracy: result.citation.accuracy,
            citation_precision: result.citation.precision,
            citation_recall: result.citation.recall,
            ragas_relevance,
            ragas_completeness,
            ragas_coherence,
            judge_relevance,
            judge_completeness,
            judge_coherence,
            retrieval_latency_ms: result.performance.retrieval_latency_ms,
            llm_latency_ms: result.performance.llm_latency_ms,
            embedding_tokens: result.performance.embedding_tokens,
            llm_input_tokens: result.performance.llm_input_tokens,
            llm_output_tokens: result.performance.llm_output_tokens,
            cost_usd: result.performance.cost_usd,
            overall_score: result.overall_score,
        }
    }
}

impl From<FlatRecord> for EvaluationResult {
    fn from(record: FlatRecord) -> Self {
        Self {
            question: record.question,
            k: record.k,
            retrieval: RetrievalMetrics {
                ndcg_at_k: record.ndcg_at_k,
                precision_at_k: record.precision_at_k,
                recall_at_k: record.recall_at_k,
                mrr: record.mrr,
            },
            citation: CitationMetrics {
                accuracy: record.citation_accuracy,
                precision: record.citation_precision,
                recall: record.citation_recall,
            },
            ragas: join_answer(
                record.ragas_relevance,
                record.ragas_completeness,
                record.ragas_coherence,
            ),
            llm_judge: join_answer(
                record.judge_relevance,
                record.judge_completeness,
                record.judge_coherence,
            ),
            performance: PerformanceMetrics {
                retrieval_latency_ms: record.retrieval_latency_ms,
                llm_latency_ms: record.llm_latency_ms,
                embedding_tokens: record.embedding_tokens,
                llm_input_tokens: record.llm_input_tokens,
                llm_output_tokens: record.llm_output_tokens,
                cost_usd: record.cost_usd,
            },
            overall_score: record.overall_score,
        }
    }
}
