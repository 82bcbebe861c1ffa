use std::time::Instant;

use tracing::{info, warn};

use super::super::{
    context::{EvalStage, EvaluationContext},
    state::{Completed, EvaluationMachine, Summarized},
};
use super::{map_guard_error, StageResult};

pub(crate) async fn finalize(
    machine: EvaluationMachine<(), Summarized>,
    ctx: &mut EvaluationContext<'_>,
) -> StageResult<Completed> {
    let stage = EvalStage::Finalize;
    info!(
        evaluation_stage = stage.label(),
        "starting evaluation stage"
    );
    let started = Instant::now();

    if let Some(summary) = ctx.summary.as_ref() {
        for (label, coverage) in [("ragas", &summary.ragas), ("llm_judge", &summary.llm_judge)] {
            if coverage.requested && coverage.missing > 0 {
                warn!(
                    scorer = label,
                    missing = coverage.missing,
                    scored = coverage.scored,
                    "Answer scorer did not grade every case"
                );
            }
        }
        info!(
            evaluated_cases = summary.evaluated_cases,
            skipped_cases = summary.skipped_cases,
            average_score = summary.average_score,
            total_cost_usd = summary.performance.total_cost_usd,
            dataset = summary.dataset_label.as_str(),
            "Evaluation complete"
        );
    }

    let elapsed = started.elapsed();
    ctx.record_stage_duration(stage, elapsed);
    info!(
        evaluation_stage = stage.label(),
        duration_ms = elapsed.as_millis(),
        "completed evaluation stage"
    );

    let timings = ctx.stage_timings.clone();
    if let Some(summary) = ctx.summary.as_mut() {
        summary.stage_timings = timings;
    }

    machine
        .finalize()
        .map_err(|(_, guard)| map_guard_error("finalize", guard))
}
