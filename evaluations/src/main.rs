mod args;
mod perf;
mod pipeline;
mod report;
mod runs;
mod types;

use anyhow::Context;
use tokio::runtime::Builder;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> anyhow::Result<()> {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let _ = fmt()
        .with_env_filter(EnvFilter::try_new(&filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();

    let worker_threads = std::thread::available_parallelism()?.get();
    let runtime = Builder::new_multi_thread()
        .enable_all()
        .worker_threads(worker_threads)
        .thread_name("eval-scoring-worker")
        .build()
        .context("failed to create tokio runtime")?;

    info!(worker_threads, "Started multi-threaded tokio runtime");

    runtime.block_on(async_main())
}

async fn async_main() -> anyhow::Result<()> {
    let parsed = args::parse()?;
    let config = parsed.config;

    let settings = evaluation_core::get_config().context("loading evaluation configuration")?;

    info!(
        dataset = %config.dataset.display(),
        runs = %config.runs.display(),
        "Running RAG evaluation"
    );
    let summary = pipeline::run_evaluation(&config, &settings)
        .await
        .context("running RAG evaluation")?;

    let report = report::write_reports(&summary, config.report_dir.as_path(), config.summary_sample)
        .with_context(|| format!("writing reports to {}", config.report_dir.display()))?;

    let delta_note = report
        .delta
        .as_ref()
        .map(|delta| format!(" (Δ {:+.2})", delta.average_score))
        .unwrap_or_default();

    println!(
        "[{}] Average score@{k}: {score:.2}{delta_note} over {cases} cases ({skipped} skipped) → JSON: {json} | Markdown: {md} | History: {history}",
        summary.dataset_label,
        k = summary.k,
        score = summary.average_score,
        delta_note = delta_note,
        cases = summary.evaluated_cases,
        skipped = summary.skipped_cases,
        json = report.paths.json.display(),
        md = report.paths.markdown.display(),
        history = report.history_path.display(),
    );

    if config.perf_log_console {
        perf::print_console_summary(&summary);
    }

    report::check_regression(report.delta.as_ref(), config.max_regression)
        .context("regression gate")?;

    Ok(())
}
