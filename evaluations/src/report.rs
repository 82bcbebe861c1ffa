use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use evaluation_core::{AbsentAnswerPolicy, FlatRecord, SampleSelection, ScoreWeights};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::{
    args,
    types::{format_timestamp, BatchSummary, CaseOutcome, LatencyStats, ScorerCoverage},
};

#[derive(Debug)]
pub struct ReportPaths {
    pub json: PathBuf,
    pub markdown: PathBuf,
}

#[derive(Debug)]
pub struct ReportOutcome {
    pub paths: ReportPaths,
    pub history_path: PathBuf,
    pub delta: Option<HistoryDelta>,
}

/// Baseline file: aggregate score, the run summary and one flat record per case.
#[derive(Debug, Serialize)]
pub struct BaselineReport<'a> {
    pub timestamp: String,
    pub average_score: f64,
    pub summary: &'a BatchSummary,
    pub results: Vec<FlatRecord>,
}

impl<'a> BaselineReport<'a> {
    pub fn from_summary(summary: &'a BatchSummary) -> Self {
        Self {
            timestamp: format_timestamp(&summary.generated_at),
            average_score: summary.average_score,
            summary,
            results: summary
                .cases
                .iter()
                .map(|case| case.result.to_record())
                .collect(),
        }
    }
}

pub fn write_reports(
    summary: &BatchSummary,
    report_dir: &Path,
    sample: usize,
) -> Result<ReportOutcome> {
    let dataset_dir = dataset_report_dir(report_dir, &summary.dataset_label);
    fs::create_dir_all(&dataset_dir).with_context(|| {
        format!(
            "creating dataset report directory {}",
            dataset_dir.display()
        )
    })?;

    let stem = build_report_stem(summary);
    let report = BaselineReport::from_summary(summary);

    let json_path = dataset_dir.join(format!("{stem}.json"));
    let json_blob = serde_json::to_string_pretty(&report).context("serialising JSON report")?;
    args::ensure_parent(&json_path)?;
    fs::write(&json_path, &json_blob)
        .with_context(|| format!("writing JSON report to {}", json_path.display()))?;

    let md_path = dataset_dir.join(format!("{stem}.md"));
    let markdown = render_markdown(summary, sample);
    fs::write(&md_path, &markdown)
        .with_context(|| format!("writing Markdown report to {}", md_path.display()))?;

    let latest_json = dataset_dir.join("latest.json");
    fs::write(&latest_json, json_blob)
        .with_context(|| format!("writing latest JSON report to {}", latest_json.display()))?;
    let latest_md = dataset_dir.join("latest.md");
    fs::write(&latest_md, markdown)
        .with_context(|| format!("writing latest Markdown report to {}", latest_md.display()))?;

    let (history_path, delta) = record_history(summary, &dataset_dir)?;

    Ok(ReportOutcome {
        paths: ReportPaths {
            json: json_path,
            markdown: md_path,
        },
        history_path,
        delta,
    })
}

fn render_markdown(summary: &BatchSummary, sample: usize) -> String {
    let mut md = String::new();
    md.push_str(&format!("# RAG Evaluation (k={})\n\n", summary.k));

    md.push_str("## Overview\n\n");
    md.push_str("| Metric | Value |\n| --- | --- |\n");
    md.push_str(&format!(
        "| Generated | {} |\n",
        format_timestamp(&summary.generated_at)
    ));
    md.push_str(&format!("| Run ID | `{}` |\n", summary.run_id));
    md.push_str(&format!(
        "| Run Label | {} |\n",
        summary.run_label.as_deref().unwrap_or("-")
    ));
    md.push_str(&format!(
        "| Dataset | {} (`{}`) |\n",
        summary.dataset_label, summary.dataset_path
    ));
    md.push_str(&format!("| Captured Runs | `{}` |\n", summary.runs_path));
    md.push_str(&format!(
        "| Filter (document/difficulty) | {} / {} |\n",
        summary.selection.document.as_deref().unwrap_or("all"),
        summary
            .selection
            .difficulty
            .map_or("all", |difficulty| difficulty.label())
    ));
    md.push_str(&format!(
        "| Window (offset/samples) | {}/{} of {} |\n",
        summary.selection.offset, summary.window_samples, summary.dataset_samples
    ));
    md.push_str(&format!(
        "| Cases Evaluated / Skipped | {}/{} |\n",
        summary.evaluated_cases, summary.skipped_cases
    ));
    md.push_str(&format!(
        "| Weights (retrieval/citation/answer) | {:.2} / {:.2} / {:.2} |\n",
        summary.weights.retrieval, summary.weights.citation, summary.weights.answer
    ));
    md.push_str(&format!(
        "| Absent Answer Policy | `{}` |\n",
        summary.absent_answer_policy
    ));
    md.push_str(&format!(
        "| **Average Score** | **{:.2}** |\n",
        summary.average_score
    ));

    let metrics = &summary.metrics;
    md.push_str("\n## Retrieval & Citation\n\n");
    md.push_str("| Metric | Value |\n| --- | --- |\n");
    md.push_str(&format!("| NDCG@{} | {:.3} |\n", summary.k, metrics.ndcg_at_k));
    md.push_str(&format!(
        "| Precision@{} | {:.3} |\n",
        summary.k, metrics.precision_at_k
    ));
    md.push_str(&format!("| Recall@{} | {:.3} |\n", summary.k, metrics.recall_at_k));
    md.push_str(&format!("| MRR | {:.3} |\n", metrics.mrr));
    md.push_str(&format!(
        "| Citation Accuracy | {:.3} |\n",
        metrics.citation_accuracy
    ));
    md.push_str(&format!(
        "| Citation Precision / Recall | {:.3} / {:.3} |\n",
        metrics.citation_precision, metrics.citation_recall
    ));

    if summary.ragas.requested || summary.llm_judge.requested {
        md.push_str("\n## Answer Scorers\n\n");
        md.push_str("| Scorer | Requested | Scored | Missing | Average |\n");
        md.push_str("| --- | --- | --- | --- | --- |\n");
        write_scorer_row(&mut md, "Automated metrics", &summary.ragas);
        write_scorer_row(&mut md, "LLM judge", &summary.llm_judge);
    }

    let perf = &summary.performance;
    md.push_str("\n## Performance\n\n");
    md.push_str("| Metric | Avg (ms) | P50 (ms) | P95 (ms) |\n| --- | --- | --- | --- |\n");
    write_latency_row(&mut md, "Total", &perf.latency_ms);
    write_latency_row(&mut md, "Retrieval", &perf.retrieval_latency_ms);
    write_latency_row(&mut md, "LLM", &perf.llm_latency_ms);
    md.push_str(&format!(
        "\nTokens: {} (embedding {}, input {}, output {}) | Cost: ${:.4} | Concurrency: {} | Duration: {} ms\n",
        perf.total_tokens,
        perf.embedding_tokens,
        perf.llm_input_tokens,
        perf.llm_output_tokens,
        perf.total_cost_usd,
        summary.concurrency,
        summary.duration_ms,
    ));

    if !summary.by_difficulty.is_empty() {
        md.push_str("\n## By Difficulty\n\n");
        md.push_str("| Difficulty | Cases | Average Score |\n| --- | --- | --- |\n");
        for entry in &summary.by_difficulty {
            md.push_str(&format!(
                "| {} | {} | {:.2} |\n",
                entry.difficulty, entry.cases, entry.average_score
            ));
        }
    }

    let lowest = lowest_scoring(&summary.cases, sample);
    if !lowest.is_empty() {
        md.push_str("\n## Lowest Scoring Cases (sample)\n\n");
        md.push_str("| Question | Document | Difficulty | Score | Recall | Answer |\n");
        md.push_str("| --- | --- | --- | --- | --- | --- |\n");
        for case in lowest {
            let answer = case
                .result
                .answer_metrics()
                .map_or_else(|| "-".to_string(), |m| format!("{:.2}", m.mean()));
            md.push_str(&format!(
                "| {} | `{}` | {} | {:.2} | {:.2} | {} |\n",
                escape_cell(&case.result.question),
                case.source_document,
                case.difficulty,
                case.result.overall_score,
                case.result.retrieval.recall_at_k,
                answer
            ));
        }
    }

    md
}

fn write_scorer_row(buf: &mut String, label: &str, coverage: &ScorerCoverage) {
    let average = coverage
        .average
        .map_or_else(|| "-".to_string(), |value| format!("{value:.3}"));
    buf.push_str(&format!(
        "| {} | {} | {} | {} | {} |\n",
        label,
        bool_badge(coverage.requested),
        coverage.scored,
        coverage.missing,
        average
    ));
}

fn write_latency_row(buf: &mut String, label: &str, stats: &LatencyStats) {
    buf.push_str(&format!(
        "| {} | {:.1} | {} | {} |\n",
        label, stats.avg, stats.p50, stats.p95
    ));
}

fn bool_badge(value: bool) -> &'static str {
    if value {
        "✅"
    } else {
        "⚪"
    }
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

fn lowest_scoring(cases: &[CaseOutcome], sample: usize) -> Vec<&CaseOutcome> {
    let mut sorted: Vec<&CaseOutcome> = cases.iter().collect();
    sorted.sort_by(|a, b| a.result.overall_score.total_cmp(&b.result.overall_score));
    sorted.truncate(sample);
    sorted
}

fn build_report_stem(summary: &BatchSummary) -> String {
    let timestamp = summary.generated_at.format("%Y%m%dT%H%M%S");
    let dataset_component = sanitize_component(&summary.dataset_label);
    match summary.run_label.as_deref().map(sanitize_component) {
        Some(label) => format!(
            "overall_at_{}_{}_{}_{}",
            summary.k, dataset_component, timestamp, label
        ),
        None => format!("overall_at_{}_{}_{}", summary.k, dataset_component, timestamp),
    }
}

fn sanitize_component(input: &str) -> String {
    input
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '_' })
        .collect()
}

pub fn dataset_report_dir(report_dir: &Path, dataset_label: &str) -> PathBuf {
    report_dir.join(sanitize_component(dataset_label))
}

#[derive(Debug, Serialize, Deserialize)]
struct HistoryEntry {
    generated_at: String,
    run_id: Uuid,
    run_label: Option<String>,
    dataset_label: String,
    k: usize,
    #[serde(default)]
    absent_answer_policy: Option<AbsentAnswerPolicy>,
    #[serde(default)]
    weights: Option<ScoreWeights>,
    #[serde(default)]
    selection: Option<SampleSelection>,
    evaluated_cases: usize,
    skipped_cases: usize,
    average_score: f64,
    ndcg_at_k: f64,
    recall_at_k: f64,
    mrr: f64,
    #[serde(default)]
    citation_precision: f64,
    #[serde(default)]
    citation_recall: f64,
    latency_ms: LatencyStats,
    #[serde(default)]
    total_cost_usd: f64,
    delta: Option<HistoryDelta>,
}

impl HistoryEntry {
    /// Scored under the same cutoff, policy and sample selection as `summary`.
    /// Entries written without these settings never match.
    fn is_comparable_to(&self, summary: &BatchSummary) -> bool {
        self.k == summary.k
            && self.absent_answer_policy == Some(summary.absent_answer_policy)
            && self.weights == Some(summary.weights)
            && self.selection.as_ref() == Some(&summary.selection)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryDelta {
    pub average_score: f64,
    pub ndcg_at_k: f64,
    pub recall_at_k: f64,
    pub latency_avg_ms: f64,
    pub total_cost_usd: f64,
}

fn record_history(
    summary: &BatchSummary,
    report_dir: &Path,
) -> Result<(PathBuf, Option<HistoryDelta>)> {
    let path = report_dir.join("evaluations.json");
    let mut entries: Vec<HistoryEntry> = if path.exists() {
        let contents = fs::read(&path)
            .with_context(|| format!("reading evaluation log {}", path.display()))?;
        match serde_json::from_slice(&contents) {
            Ok(entries) => entries,
            Err(err) => {
                let timestamp = Utc::now().format("%Y%m%dT%H%M%S");
                let backup_path =
                    report_dir.join(format!("evaluations.json.corrupted.{timestamp}"));
                warn!(
                    path = %path.display(),
                    backup = %backup_path.display(),
                    error = %err,
                    "Evaluation history file is corrupted; backing up and starting fresh"
                );
                if let Err(e) = fs::rename(&path, &backup_path) {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to backup corrupted evaluation history"
                    );
                }
                Vec::new()
            }
        }
    } else {
        Vec::new()
    };

    let delta = entries
        .iter()
        .rev()
        .find(|prev| prev.is_comparable_to(summary))
        .map(|prev| HistoryDelta {
            average_score: summary.average_score - prev.average_score,
            ndcg_at_k: summary.metrics.ndcg_at_k - prev.ndcg_at_k,
            recall_at_k: summary.metrics.recall_at_k - prev.recall_at_k,
            latency_avg_ms: summary.performance.latency_ms.avg - prev.latency_ms.avg,
            total_cost_usd: summary.performance.total_cost_usd - prev.total_cost_usd,
        });

    entries.push(HistoryEntry {
        generated_at: format_timestamp(&summary.generated_at),
        run_id: summary.run_id,
        run_label: summary.run_label.clone(),
        dataset_label: summary.dataset_label.clone(),
        k: summary.k,
        absent_answer_policy: Some(summary.absent_answer_policy),
        weights: Some(summary.weights),
        selection: Some(summary.selection.clone()),
        evaluated_cases: summary.evaluated_cases,
        skipped_cases: summary.skipped_cases,
        average_score: summary.average_score,
        ndcg_at_k: summary.metrics.ndcg_at_k,
        recall_at_k: summary.metrics.recall_at_k,
        mrr: summary.metrics.mrr,
        citation_precision: summary.metrics.citation_precision,
        citation_recall: summary.metrics.citation_recall,
        latency_ms: summary.performance.latency_ms.clone(),
        total_cost_usd: summary.performance.total_cost_usd,
        delta: delta.clone(),
    });

    let blob = serde_json::to_vec_pretty(&entries).context("serialising evaluation log")?;
    fs::write(&path, blob).with_context(|| format!("writing evaluation log {}", path.display()))?;
    Ok((path, delta))
}

/// Fails when the average score fell by more than `max_regression` points.
/// Without a previous run there is nothing to compare against.
pub fn check_regression(delta: Option<&HistoryDelta>, max_regression: Option<f64>) -> Result<()> {
    let (Some(delta), Some(max)) = (delta, max_regression) else {
        return Ok(());
    };
    if -delta.average_score > max {
        return Err(anyhow!(
            "average score regressed by {:.2} points (allowed {max:.2})",
            -delta.average_score
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        difficulty_breakdown, tests::outcome, EvaluationStageTimings, MetricAverages,
        PerformanceTotals,
    };
    use chrono::Utc;
    use evaluation_core::Difficulty;

    fn sample_summary(average_score: f64, requested_judge: bool) -> BatchSummary {
        let cases = vec![
            outcome(Difficulty::Easy, 90.0),
            outcome(Difficulty::Hard, 20.0),
        ];
        let results: Vec<_> = cases.iter().map(|case| &case.result).collect();
        let metrics = MetricAverages::from_results(results.iter().copied());
        let performance = PerformanceTotals::from_results(&results);
        let by_difficulty = difficulty_breakdown(&cases);
        BatchSummary {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            run_label: Some("nightly run".into()),
            dataset_label: "golden dataset".into(),
            dataset_path: "data/golden_dataset.json".into(),
            runs_path: "data/captured_runs.jsonl".into(),
            k: 5,
            absent_answer_policy: AbsentAnswerPolicy::Exclude,
            weights: ScoreWeights::default(),
            dataset_samples: 3,
            selection: SampleSelection::default(),
            window_samples: 3,
            evaluated_cases: cases.len(),
            skipped_cases: 1,
            average_score,
            metrics,
            ragas: ScorerCoverage::default(),
            llm_judge: ScorerCoverage::from_scores(requested_judge, [Some(0.75), Some(0.75)]),
            performance,
            by_difficulty,
            concurrency: 2,
            duration_ms: 100,
            stage_timings: EvaluationStageTimings::default(),
            cases,
        }
    }

    #[test]
    fn markdown_includes_scorer_section_when_requested() {
        let md = render_markdown(&sample_summary(55.0, true), 5);
        assert!(md.contains("## Answer Scorers"));
        assert!(md.contains("| LLM judge | ✅ | 2 | 0 | 0.750 |"));
        assert!(md.contains("**55.00**"));
        assert!(md.contains("## By Difficulty"));
    }

    #[test]
    fn markdown_hides_scorer_section_when_not_requested() {
        let md = render_markdown(&sample_summary(55.0, false), 5);
        assert!(!md.contains("Answer Scorers"));
        assert!(!md.contains("\\n"));
    }

    #[test]
    fn lowest_scoring_cases_come_first() {
        let summary = sample_summary(55.0, false);
        let lowest = lowest_scoring(&summary.cases, 1);
        assert_eq!(lowest.len(), 1);
        assert_eq!(lowest[0].difficulty, Difficulty::Hard);
    }

    #[test]
    fn baseline_json_contains_flat_records() {
        let summary = sample_summary(55.0, true);
        let report = BaselineReport::from_summary(&summary);
        let value = serde_json::to_value(&report).expect("serialise");
        assert_eq!(value["average_score"], 55.0);
        assert_eq!(value["results"].as_array().map(Vec::len), Some(2));
        assert!(value["results"][0].get("ndcg_at_k").is_some());
        assert!(value["results"][0].get("judge_relevance").is_some());
        assert!(value["summary"].get("cases").is_none());
    }

    #[test]
    fn writes_reports_latest_pointers_and_history_delta() {
        let dir = tempfile::tempdir().expect("temp dir");

        let first = write_reports(&sample_summary(60.0, false), dir.path(), 5).expect("first");
        assert!(first.delta.is_none());
        assert!(first.paths.json.exists());
        assert!(first.paths.markdown.exists());

        let second = write_reports(&sample_summary(50.0, false), dir.path(), 5).expect("second");
        let delta = second.delta.expect("delta against first run");
        assert!((delta.average_score + 10.0).abs() < 1e-9);

        let dataset_dir = dataset_report_dir(dir.path(), "golden dataset");
        assert!(dataset_dir.join("latest.json").exists());
        assert!(dataset_dir.join("latest.md").exists());

        let history: Vec<HistoryEntry> =
            serde_json::from_slice(&fs::read(&second.history_path).expect("read history"))
                .expect("history parses");
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn history_delta_skips_runs_with_other_settings() {
        let dir = tempfile::tempdir().expect("temp dir");

        write_reports(&sample_summary(60.0, false), dir.path(), 5).expect("baseline");

        let mut narrow = sample_summary(10.0, false);
        narrow.k = 2;
        let narrow = write_reports(&narrow, dir.path(), 5).expect("k=2 run");
        assert!(narrow.delta.is_none());

        let mut filtered = sample_summary(20.0, false);
        filtered.selection.document = Some("shipping.md".into());
        let filtered = write_reports(&filtered, dir.path(), 5).expect("filtered run");
        assert!(filtered.delta.is_none());

        let mut zero_fill = sample_summary(30.0, false);
        zero_fill.absent_answer_policy = AbsentAnswerPolicy::ZeroFill;
        let zero_fill = write_reports(&zero_fill, dir.path(), 5).expect("zero-fill run");
        assert!(zero_fill.delta.is_none());

        let rerun = write_reports(&sample_summary(55.0, false), dir.path(), 5).expect("rerun");
        let delta = rerun.delta.expect("compared with the first k=5 run");
        assert!((delta.average_score + 5.0).abs() < 1e-9);
        assert!(check_regression(Some(&delta), Some(10.0)).is_ok());
    }

    #[test]
    fn entries_without_recorded_settings_are_not_compared() {
        let dir = tempfile::tempdir().expect("temp dir");
        let dataset_dir = dataset_report_dir(dir.path(), "golden dataset");
        fs::create_dir_all(&dataset_dir).expect("dataset dir");
        let legacy = serde_json::json!([{
            "generated_at": "2024-01-01T00:00:00Z",
            "run_id": Uuid::new_v4(),
            "run_label": null,
            "dataset_label": "golden dataset",
            "k": 5,
            "evaluated_cases": 2,
            "skipped_cases": 0,
            "average_score": 90.0,
            "ndcg_at_k": 1.0,
            "recall_at_k": 1.0,
            "mrr": 1.0,
            "latency_ms": { "avg": 1.0, "p50": 1, "p95": 1 },
            "delta": null
        }]);
        fs::write(
            dataset_dir.join("evaluations.json"),
            serde_json::to_vec(&legacy).expect("legacy blob"),
        )
        .expect("write legacy history");

        let outcome = write_reports(&sample_summary(40.0, false), dir.path(), 5).expect("write");
        assert!(outcome.delta.is_none());

        let history: Vec<HistoryEntry> =
            serde_json::from_slice(&fs::read(&outcome.history_path).expect("read history"))
                .expect("history parses");
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn corrupted_history_is_backed_up() {
        let dir = tempfile::tempdir().expect("temp dir");
        let dataset_dir = dataset_report_dir(dir.path(), "golden dataset");
        fs::create_dir_all(&dataset_dir).expect("dataset dir");
        fs::write(dataset_dir.join("evaluations.json"), "not json").expect("write");

        let outcome = write_reports(&sample_summary(60.0, false), dir.path(), 5).expect("write");
        assert!(outcome.delta.is_none());

        let backups = fs::read_dir(&dataset_dir)
            .expect("list")
            .filter_map(Result::ok)
            .filter(|entry| {
                entry
                    .file_name()
                    .to_string_lossy()
                    .starts_with("evaluations.json.corrupted.")
            })
            .count();
        assert_eq!(backups, 1);
    }

    #[test]
    fn regression_gate_compares_against_threshold() {
        let delta = |average_score| HistoryDelta {
            average_score,
            ndcg_at_k: 0.0,
            recall_at_k: 0.0,
            latency_avg_ms: 0.0,
            total_cost_usd: 0.0,
        };
        assert!(check_regression(Some(&delta(-5.0)), Some(2.0)).is_err());
        assert!(check_regression(Some(&delta(-1.5)), Some(2.0)).is_ok());
        assert!(check_regression(Some(&delta(3.0)), Some(0.0)).is_ok());
        assert!(check_regression(None, Some(0.0)).is_ok());
        assert!(check_regression(Some(&delta(-50.0)), None).is_ok());
    }

    #[test]
    fn stem_includes_k_dataset_and_label() {
        let stem = build_report_stem(&sample_summary(50.0, false));
        assert!(stem.starts_with("overall_at_5_golden_dataset_"));
        assert!(stem.ends_with("_nightly_run"));
    }
}
