use std::time::Instant;

use futures::stream::{self, StreamExt};
use tracing::{debug, info};

use crate::types::CaseOutcome;

use super::super::{
    context::{EvalStage, EvaluationContext},
    state::{CasesEvaluated, EvaluationMachine, InputsLoaded},
};
use super::{map_guard_error, StageResult};

pub(crate) async fn evaluate_cases(
    machine: EvaluationMachine<(), InputsLoaded>,
    ctx: &mut EvaluationContext<'_>,
) -> StageResult<CasesEvaluated> {
    let stage = EvalStage::EvaluateCases;
    info!(
        evaluation_stage = stage.label(),
        "starting evaluation stage"
    );
    let started = Instant::now();

    let evaluator = ctx.evaluator()?;
    let options = ctx.options;
    let concurrency = ctx.config().concurrency.max(1);
    let cases = std::mem::take(&mut ctx.cases);
    let total_cases = cases.len();

    info!(
        total_cases,
        max_concurrent_cases = concurrency,
        use_ragas = options.use_ragas,
        use_llm_judge = options.use_llm_judge,
        "Starting case evaluation"
    );

    ctx.evaluation_start = Some(Instant::now());

    // `buffered` keeps dataset order while running up to `concurrency` cases.
    let outcomes: Vec<CaseOutcome> = stream::iter(cases.into_iter().enumerate())
        .map(|(idx, case)| {
            let evaluator = evaluator.clone();
            async move {
                let request = case.to_request();
                let result = evaluator.evaluate(&request, options).await;
                debug!(
                    case = idx + 1,
                    total = total_cases,
                    overall_score = result.overall_score,
                    "Case evaluated"
                );
                CaseOutcome {
                    difficulty: case.sample.difficulty,
                    source_document: case.sample.source_document,
                    result,
                }
            }
        })
        .buffered(concurrency)
        .collect()
        .await;

    ctx.outcomes = outcomes;

    let elapsed = started.elapsed();
    ctx.record_stage_duration(stage, elapsed);
    info!(
        evaluation_stage = stage.label(),
        duration_ms = elapsed.as_millis(),
        "completed evaluation stage"
    );

    machine
        .evaluate_cases()
        .map_err(|(_, guard)| map_guard_error("evaluate_cases", guard))
}
