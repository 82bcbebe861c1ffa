use std::{sync::Arc, time::Instant};

use anyhow::{anyhow, Context};
use evaluation_core::{EvaluationDataset, EvaluationOptions, Evaluator};
use tracing::info;

use crate::runs;

use super::super::{
    context::{EvalStage, EvaluationContext},
    state::{EvaluationMachine, InputsLoaded, Ready},
};
use super::{map_guard_error, StageResult};

pub(crate) async fn load_inputs(
    machine: EvaluationMachine<(), Ready>,
    ctx: &mut EvaluationContext<'_>,
) -> StageResult<InputsLoaded> {
    let stage = EvalStage::LoadInputs;
    info!(
        evaluation_stage = stage.label(),
        "starting evaluation stage"
    );
    let started = Instant::now();

    let config = ctx.config();
    let settings = ctx.settings();

    let mut evaluation_settings = settings.clone();
    if let Some(cutoff) = config.cutoff {
        evaluation_settings.k = cutoff;
    }
    if let Some(policy) = config.scorers.absent_answer_policy {
        evaluation_settings.absent_answer_policy = policy;
    }
    let evaluator = Evaluator::from_config(&evaluation_settings)
        .context("building evaluator from configuration")?;

    if config.scorers.ragas && !evaluator.has_ragas() {
        return Err(anyhow!(
            "--ragas requires RAGAS_URL (or ragas_url in config) to be set"
        ));
    }
    if config.scorers.llm_judge && !evaluator.has_judge() {
        return Err(anyhow!(
            "--llm-judge requires OPENAI_API_KEY (or openai_api_key in config) to be set"
        ));
    }

    let dataset = EvaluationDataset::load(&config.dataset)
        .with_context(|| format!("loading dataset from {}", config.dataset.display()))?;

    let documents = dataset.documents();
    if let Some(document) = config.document.as_deref() {
        if !documents.contains(document) {
            return Err(anyhow!(
                "--document '{document}' does not appear in {}; known documents: {}",
                config.dataset.display(),
                documents.iter().copied().collect::<Vec<_>>().join(", ")
            ));
        }
    }

    let selected = dataset.select(&config.selection());
    let window = selected.samples;

    let captured = runs::load_runs(&config.runs)
        .with_context(|| format!("loading captured runs from {}", config.runs.display()))?;
    let paired = runs::pair_cases(window.iter().copied(), captured);

    if paired.cases.is_empty() {
        return Err(anyhow!(
            "none of the {} selected samples has a captured run in {}",
            window.len(),
            config.runs.display()
        ));
    }

    info!(
        dataset_samples = dataset.len(),
        dataset_documents = documents.len(),
        difficulty_counts = ?dataset.difficulty_counts(),
        filtered_samples = selected.matched,
        window_samples = window.len(),
        paired_cases = paired.cases.len(),
        skipped_cases = paired.skipped,
        duplicate_runs = paired.duplicate_runs,
        k = evaluator.cutoff().get(),
        "Inputs loaded"
    );

    ctx.window_samples = window.len();
    ctx.skipped_cases = paired.skipped;
    ctx.cases = paired.cases;
    ctx.options = EvaluationOptions {
        use_ragas: config.scorers.ragas,
        use_llm_judge: config.scorers.llm_judge,
    };
    ctx.evaluator = Some(Arc::new(evaluator));
    ctx.dataset = Some(dataset);

    let elapsed = started.elapsed();
    ctx.record_stage_duration(stage, elapsed);
    info!(
        evaluation_stage = stage.label(),
        duration_ms = elapsed.as_millis(),
        "completed evaluation stage"
    );

    machine
        .load_inputs()
        .map_err(|(_, guard)| map_guard_error("load_inputs", guard))
}
