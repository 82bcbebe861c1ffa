mod context;
mod stages;
mod state;

use anyhow::Result;
use evaluation_core::EvaluationConfig;

use crate::{args::Config, types::BatchSummary};

use context::EvaluationContext;

pub async fn run_evaluation(config: &Config, settings: &EvaluationConfig) -> Result<BatchSummary> {
    let mut ctx = EvaluationContext::new(config, settings);
    let machine = state::ready();

    let machine = stages::load_inputs(machine, &mut ctx).await?;
    let machine = stages::evaluate_cases(machine, &mut ctx).await?;
    let machine = stages::summarize(machine, &mut ctx).await?;
    let machine = stages::finalize(machine, &mut ctx).await?;

    drop(machine);

    ctx.into_summary()
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use clap::Parser;
    use evaluation_core::Difficulty;

    use super::*;

    fn data_path(name: &str) -> String {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("data")
            .join(name)
            .display()
            .to_string()
    }

    fn config(extra: &[&str]) -> Config {
        let dataset = data_path("golden_dataset.json");
        let runs = data_path("captured_runs.jsonl");
        let mut args = vec!["evaluations", "--dataset", dataset.as_str(), "--runs", runs.as_str()];
        args.extend_from_slice(extra);
        let mut config = Config::try_parse_from(args).expect("arguments parse");
        config.finalize().expect("arguments finalize");
        config
    }

    #[tokio::test]
    async fn runs_every_stage_over_bundled_data() {
        let summary = run_evaluation(&config(&["--concurrency", "2"]), &EvaluationConfig::default())
            .await
            .expect("pipeline completes");

        assert_eq!(summary.dataset_label, "golden_dataset");
        assert_eq!(summary.dataset_samples, 5);
        assert_eq!(summary.evaluated_cases, 4);
        assert_eq!(summary.skipped_cases, 1);
        assert_eq!(summary.k, 5);
        assert_eq!(summary.cases.len(), 4);
        assert!(summary.cases[0].result.question.starts_with("How long"));
        assert!((0.0..=100.0).contains(&summary.average_score));
        assert!(summary.ragas.scored == 0 && !summary.ragas.requested);
        assert!(summary.performance.total_tokens > 0);
        assert!(summary.by_difficulty.iter().any(|entry| entry.difficulty == Difficulty::Hard));
    }

    #[tokio::test]
    async fn filters_and_cutoff_override_apply() {
        let summary = run_evaluation(
            &config(&["--document", "shipping.md", "--k", "2"]),
            &EvaluationConfig::default(),
        )
        .await
        .expect("pipeline completes");

        assert_eq!(summary.window_samples, 2);
        assert_eq!(summary.selection.document.as_deref(), Some("shipping.md"));
        assert_eq!(summary.evaluated_cases, 1);
        assert_eq!(summary.skipped_cases, 1);
        assert_eq!(summary.k, 2);
        assert!((summary.metrics.recall_at_k - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn unknown_document_filter_is_rejected() {
        let err = run_evaluation(
            &config(&["--document", "missing.pdf"]),
            &EvaluationConfig::default(),
        )
        .await
        .expect_err("unknown document");
        assert!(format!("{err:#}").contains("known documents"));
    }

    #[tokio::test]
    async fn requesting_an_unconfigured_scorer_fails() {
        let result = run_evaluation(&config(&["--llm-judge"]), &EvaluationConfig::default()).await;
        assert!(result.is_err());
    }
}
