use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser};
use evaluation_core::{AbsentAnswerPolicy, Cutoff, Difficulty, SampleSelection};

fn workspace_root() -> PathBuf {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    manifest_dir.parent().unwrap_or(&manifest_dir).to_path_buf()
}

fn default_dataset_path() -> PathBuf {
    workspace_root().join("evaluations/data/golden_dataset.json")
}

fn default_runs_path() -> PathBuf {
    workspace_root().join("evaluations/data/captured_runs.jsonl")
}

fn default_report_dir() -> PathBuf {
    workspace_root().join("evaluations/reports")
}

#[derive(Debug, Clone, Default, Args)]
pub struct ScorerArgs {
    /// Request answer metrics from the automated-metric service (needs RAGAS_URL)
    #[arg(long)]
    pub ragas: bool,

    /// Request answer metrics from the LLM judge (needs OPENAI_API_KEY)
    #[arg(long = "llm-judge")]
    pub llm_judge: bool,

    /// How a missing answer score affects the overall score: exclude or zero_fill
    #[arg(long = "absent-answer-policy", env = "EVAL_ABSENT_ANSWER_POLICY")]
    pub absent_answer_policy_arg: Option<String>,

    #[arg(skip)]
    pub absent_answer_policy: Option<AbsentAnswerPolicy>,
}

#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about = "Benchmark captured RAG answers against a golden dataset",
    long_about = None
)]
pub struct Config {
    /// Golden dataset JSON file
    #[arg(long, env = "EVAL_DATASET", default_value_os_t = default_dataset_path())]
    pub dataset: PathBuf,

    /// Captured runs JSONL file, one answered question per line
    #[arg(long, env = "EVAL_RUNS", default_value_os_t = default_runs_path())]
    pub runs: PathBuf,

    /// Directory to write evaluation reports
    #[arg(long, env = "EVAL_REPORT_DIR", default_value_os_t = default_report_dir())]
    pub report_dir: PathBuf,

    /// Rank cutoff k; overrides the configured value
    #[arg(long)]
    pub k: Option<usize>,

    #[command(flatten)]
    pub scorers: ScorerArgs,

    /// Number of cases evaluated at the same time
    #[arg(long, default_value_t = 4)]
    pub concurrency: usize,

    /// Only evaluate samples drawn from this source document
    #[arg(long)]
    pub document: Option<String>,

    /// Only evaluate samples of this difficulty: easy, medium or hard
    #[arg(long = "difficulty")]
    pub difficulty_arg: Option<String>,

    /// Skip this many samples before evaluating
    #[arg(long, default_value_t = 0)]
    pub offset: usize,

    /// Evaluate at most this many samples (0 = all)
    #[arg(long = "limit", default_value_t = 0)]
    pub limit_arg: usize,

    /// Number of lowest-scoring cases to surface in the Markdown summary
    #[arg(long, default_value_t = 5)]
    pub sample: usize,

    /// Annotate the run; label is stored in JSON/Markdown reports
    #[arg(long)]
    pub label: Option<String>,

    /// Fail when the average score drops by more than this many points versus the previous run
    #[arg(long, env = "EVAL_MAX_REGRESSION")]
    pub max_regression: Option<f64>,

    /// Print latency, token and cost totals to stdout after the run
    #[arg(long, alias = "perf-log")]
    pub perf_log_console: bool,

    // Computed fields (not arguments)
    #[arg(skip)]
    pub cutoff: Option<Cutoff>,
    #[arg(skip)]
    pub difficulty: Option<Difficulty>,
    #[arg(skip)]
    pub limit: Option<usize>,
    #[arg(skip)]
    pub summary_sample: usize,
}

impl Config {
    pub fn finalize(&mut self) -> Result<()> {
        self.limit = (self.limit_arg > 0).then_some(self.limit_arg);
        self.summary_sample = self.sample.max(1);

        if let Some(k) = self.k {
            let cutoff = Cutoff::new(k).map_err(|_| anyhow!("--k must be greater than zero"))?;
            self.cutoff = Some(cutoff);
        }

        if let Some(raw) = &self.difficulty_arg {
            self.difficulty = Some(
                raw.parse::<Difficulty>()
                    .map_err(|err| anyhow!("--difficulty: {err}"))?,
            );
        }

        if let Some(raw) = &self.scorers.absent_answer_policy_arg {
            self.scorers.absent_answer_policy = Some(
                raw.parse::<AbsentAnswerPolicy>()
                    .map_err(|err| anyhow!("--absent-answer-policy: {err}"))?,
            );
        }

        if self.concurrency == 0 {
            return Err(anyhow!("--concurrency must be greater than zero"));
        }

        if let Some(document) = &self.document {
            if document.trim().is_empty() {
                return Err(anyhow!("--document requires a non-empty document name"));
            }
        }

        if let Some(max) = self.max_regression {
            if max < 0.0 || !max.is_finite() {
                return Err(anyhow!(
                    "--max-regression must be a non-negative, finite number (got {max})"
                ));
            }
        }

        if let Some(label) = &self.label {
            if label.trim().is_empty() {
                self.label = None;
            }
        }

        Ok(())
    }

    pub fn selection(&self) -> SampleSelection {
        SampleSelection {
            document: self.document.clone(),
            difficulty: self.difficulty,
            offset: self.offset,
            limit: self.limit,
        }
    }
}

pub struct ParsedArgs {
    pub config: Config,
}

pub fn parse() -> Result<ParsedArgs> {
    let mut config = Config::parse();
    config.finalize()?;
    Ok(ParsedArgs { config })
}

pub fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating parent directory for {}", path.display()))?;
    }
    Ok(())
}
