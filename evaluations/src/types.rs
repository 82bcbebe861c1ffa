use chrono::{DateTime, SecondsFormat, Utc};
use evaluation_core::{
    AbsentAnswerPolicy, Difficulty, EvaluationResult, SampleSelection, ScoreWeights,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct BatchSummary {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_label: Option<String>,
    pub dataset_label: String,
    pub dataset_path: String,
    pub runs_path: String,
    pub k: usize,
    pub absent_answer_policy: AbsentAnswerPolicy,
    pub weights: ScoreWeights,
    pub dataset_samples: usize,
    pub selection: SampleSelection,
    pub window_samples: usize,
    pub evaluated_cases: usize,
    pub skipped_cases: usize,
    pub average_score: f64,
    pub metrics: MetricAverages,
    pub ragas: ScorerCoverage,
    pub llm_judge: ScorerCoverage,
    pub performance: PerformanceTotals,
    pub by_difficulty: Vec<DifficultyBreakdown>,
    pub concurrency: usize,
    pub duration_ms: u128,
    pub stage_timings: EvaluationStageTimings,
    #[serde(skip)]
    pub cases: Vec<CaseOutcome>,
}

/// A scored case together with the dataset labels it was drawn from.
#[derive(Debug, Clone)]
pub struct CaseOutcome {
    pub difficulty: Difficulty,
    pub source_document: String,
    pub result: EvaluationResult,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricAverages {
    pub ndcg_at_k: f64,
    pub precision_at_k: f64,
    pub recall_at_k: f64,
    pub mrr: f64,
    pub citation_accuracy: f64,
    pub citation_precision: f64,
    pub citation_recall: f64,
}

impl MetricAverages {
    pub fn from_results<'a, I>(results: I) -> Self
    where
        I: IntoIterator<Item = &'a EvaluationResult>,
    {
        let mut totals = Self::default();
        let mut count = 0usize;
        for result in results {
            count += 1;
            totals.ndcg_at_k += result.retrieval.ndcg_at_k;
            totals.precision_at_k += result.retrieval.precision_at_k;
            totals.recall_at_k += result.retrieval.recall_at_k;
            totals.mrr += result.retrieval.mrr;
            totals.citation_accuracy += result.citation.accuracy;
            totals.citation_precision += result.citation.precision;
            totals.citation_recall += result.citation.recall;
        }
        if count == 0 {
            return totals;
        }
        let n = count as f64;
        Self {
            ndcg_at_k: totals.ndcg_at_k / n,
            precision_at_k: totals.precision_at_k / n,
            recall_at_k: totals.recall_at_k / n,
            mrr: totals.mrr / n,
            citation_accuracy: totals.citation_accuracy / n,
            citation_precision: totals.citation_precision / n,
            citation_recall: totals.citation_recall / n,
        }
    }
}

/// How many cases an answer scorer actually graded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScorerCoverage {
    pub requested: bool,
    pub scored: usize,
    pub missing: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average: Option<f64>,
}

impl ScorerCoverage {
    pub fn from_scores<I>(requested: bool, scores: I) -> Self
    where
        I: IntoIterator<Item = Option<f64>>,
    {
        let mut scored = 0usize;
        let mut missing = 0usize;
        let mut sum = 0.0;
        for score in scores {
            match score {
                Some(value) => {
                    scored += 1;
                    sum += value;
                }
                None => missing += 1,
            }
        }
        Self {
            requested,
            scored,
            missing: if requested { missing } else { 0 },
            average: (scored > 0).then(|| sum / scored as f64),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifficultyBreakdown {
    pub difficulty: Difficulty,
    pub cases: usize,
    pub average_score: f64,
}

pub fn difficulty_breakdown(cases: &[CaseOutcome]) -> Vec<DifficultyBreakdown> {
    Difficulty::ALL
        .into_iter()
        .filter_map(|difficulty| {
            let scores: Vec<f64> = cases
                .iter()
                .filter(|case| case.difficulty == difficulty)
                .map(|case| case.result.overall_score)
                .collect();
            if scores.is_empty() {
                return None;
            }
            Some(DifficultyBreakdown {
                difficulty,
                cases: scores.len(),
                average_score: scores.iter().sum::<f64>() / scores.len() as f64,
            })
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceTotals {
    pub latency_ms: LatencyStats,
    pub retrieval_latency_ms: LatencyStats,
    pub llm_latency_ms: LatencyStats,
    pub embedding_tokens: u64,
    pub llm_input_tokens: u64,
    pub llm_output_tokens: u64,
    pub total_tokens: u64,
    pub total_cost_usd: f64,
}

impl PerformanceTotals {
    pub fn from_results(results: &[&EvaluationResult]) -> Self {
        let collect = |selector: fn(&EvaluationResult) -> u64| -> Vec<u128> {
            results
                .iter()
                .map(|result| u128::from(selector(result)))
                .collect()
        };

        let mut totals = Self {
            latency_ms: compute_latency_stats(&collect(|r| r.performance.total_latency_ms())),
            retrieval_latency_ms: compute_latency_stats(&collect(|r| {
                r.performance.retrieval_latency_ms
            })),
            llm_latency_ms: compute_latency_stats(&collect(|r| r.performance.llm_latency_ms)),
            ..Self::default()
        };
        for result in results {
            let perf = &result.performance;
            totals.embedding_tokens = totals.embedding_tokens.saturating_add(perf.embedding_tokens);
            totals.llm_input_tokens = totals.llm_input_tokens.saturating_add(perf.llm_input_tokens);
            totals.llm_output_tokens =
                totals.llm_output_tokens.saturating_add(perf.llm_output_tokens);
            totals.total_tokens = totals.total_tokens.saturating_add(perf.total_tokens());
            totals.total_cost_usd += perf.cost_usd;
        }
        totals
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub avg: f64,
    pub p50: u128,
    pub p95: u128,
}

pub fn compute_latency_stats(latencies: &[u128]) -> LatencyStats {
    if latencies.is_empty() {
        return LatencyStats::default();
    }
    let mut sorted = latencies.to_vec();
    sorted.sort_unstable();
    let sum: u128 = sorted.iter().copied().sum();
    let avg = sum as f64 / (sorted.len() as f64);
    let p50 = percentile(&sorted, 0.50);
    let p95 = percentile(&sorted, 0.95);
    LatencyStats { avg, p50, p95 }
}

fn percentile(sorted: &[u128], fraction: f64) -> u128 {
    let Some(last) = sorted.len().checked_sub(1) else {
        return 0;
    };
    let clamped = fraction.clamp(0.0, 1.0);
    let idx = (clamped * last as f64).round() as usize;
    sorted.get(idx.min(last)).copied().unwrap_or_default()
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationStageTimings {
    pub load_inputs_ms: u128,
    pub evaluate_cases_ms: u128,
    pub summarize_ms: u128,
    pub finalize_ms: u128,
}

pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
}
