use std::time::Instant;

use chrono::Utc;
use evaluation_core::EvaluationResult;
use tracing::info;
use uuid::Uuid;

use crate::types::{
    difficulty_breakdown, BatchSummary, MetricAverages, PerformanceTotals, ScorerCoverage,
};

use super::super::{
    context::{EvalStage, EvaluationContext},
    state::{CasesEvaluated, EvaluationMachine, Summarized},
};
use super::{map_guard_error, StageResult};

pub(crate) async fn summarize(
    machine: EvaluationMachine<(), CasesEvaluated>,
    ctx: &mut EvaluationContext<'_>,
) -> StageResult<Summarized> {
    let stage = EvalStage::Summarize;
    info!(
        evaluation_stage = stage.label(),
        "starting evaluation stage"
    );
    let started = Instant::now();

    let cases = std::mem::take(&mut ctx.outcomes);
    let duration_ms = ctx
        .evaluation_start
        .take()
        .map(|start| start.elapsed().as_millis())
        .unwrap_or_default();
    let config = ctx.config();
    let evaluator = ctx.evaluator()?;
    let policy = *evaluator.policy();

    let results: Vec<&EvaluationResult> = cases.iter().map(|case| &case.result).collect();
    let evaluated_cases = results.len();
    let average_score = if evaluated_cases == 0 {
        0.0
    } else {
        results.iter().map(|result| result.overall_score).sum::<f64>() / evaluated_cases as f64
    };

    let metrics = MetricAverages::from_results(results.iter().copied());
    let ragas = ScorerCoverage::from_scores(
        ctx.options.use_ragas,
        results.iter().map(|result| result.ragas.map(|m| m.mean())),
    );
    let llm_judge = ScorerCoverage::from_scores(
        ctx.options.use_llm_judge,
        results.iter().map(|result| result.llm_judge.map(|m| m.mean())),
    );
    let performance = PerformanceTotals::from_results(&results);
    let by_difficulty = difficulty_breakdown(&cases);

    let dataset_label = config
        .dataset
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("dataset")
        .to_string();

    ctx.summary = Some(BatchSummary {
        run_id: Uuid::new_v4(),
        generated_at: Utc::now(),
        run_label: config.label.clone(),
        dataset_label,
        dataset_path: config.dataset.display().to_string(),
        runs_path: config.runs.display().to_string(),
        k: evaluator.cutoff().get(),
        absent_answer_policy: policy.absent_answer,
        weights: policy.weights,
        dataset_samples: ctx.dataset.as_ref().map_or(0, |dataset| dataset.len()),
        selection: config.selection(),
        window_samples: ctx.window_samples,
        evaluated_cases,
        skipped_cases: ctx.skipped_cases,
        average_score,
        metrics,
        ragas,
        llm_judge,
        performance,
        by_difficulty,
        concurrency: config.concurrency.max(1),
        duration_ms,
        stage_timings: ctx.stage_timings.clone(),
        cases,
    });

    let elapsed = started.elapsed();
    ctx.record_stage_duration(stage, elapsed);
    info!(
        evaluation_stage = stage.label(),
        duration_ms = elapsed.as_millis(),
        "completed evaluation stage"
    );

    machine
        .summarize()
        .map_err(|(_, guard)| map_guard_error("summarize", guard))
}
