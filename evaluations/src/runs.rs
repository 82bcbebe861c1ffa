use std::{collections::HashMap, fs, path::Path};

use anyhow::{anyhow, Context, Result};
use evaluation_core::{EvaluationRequest, PerformanceCounters, Sample};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// One answered question as captured from the RAG application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedRun {
    pub question: String,
    pub answer: String,
    pub retrieved_chunks: Vec<String>,
    #[serde(default)]
    pub context: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cited_chunks: Option<Vec<String>>,
    #[serde(default)]
    pub performance: PerformanceCounters,
}

/// A dataset sample matched with the run that answered it.
#[derive(Debug, Clone)]
pub struct PairedCase {
    pub sample: Sample,
    pub run: CapturedRun,
}

impl PairedCase {
    pub fn to_request(&self) -> EvaluationRequest {
        EvaluationRequest {
            question: self.sample.question.clone(),
            answer: self.run.answer.clone(),
            retrieved_chunks: self.run.retrieved_chunks.clone(),
            cited_chunks: self.run.cited_chunks.clone(),
            context: self.run.context.clone(),
            expected_answer: self.sample.expected_answer.clone(),
            expected_chunks: self.sample.expected_chunks.clone(),
            performance: self.run.performance,
        }
    }
}

#[derive(Debug, Default)]
pub struct PairingOutcome {
    pub cases: Vec<PairedCase>,
    pub skipped: usize,
    pub duplicate_runs: usize,
}

/// Lowercases and collapses whitespace so cosmetic differences still pair.
pub fn normalize_question(question: &str) -> String {
    question
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

pub fn parse_runs(raw: &str) -> Result<Vec<CapturedRun>> {
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str::<CapturedRun>(line)
                .with_context(|| format!("parsing captured run on line {}", idx + 1))
        })
        .collect()
}

pub fn load_runs(path: &Path) -> Result<Vec<CapturedRun>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading captured runs from {}", path.display()))?;
    let runs = parse_runs(&raw)?;
    if runs.is_empty() {
        return Err(anyhow!("no captured runs found in {}", path.display()));
    }
    debug!(path = %path.display(), runs = runs.len(), "Loaded captured runs");
    Ok(runs)
}

/// Pairs samples with runs in sample order. When a question was captured
/// more than once the last run wins.
pub fn pair_cases<'a, I>(samples: I, runs: Vec<CapturedRun>) -> PairingOutcome
where
    I: IntoIterator<Item = &'a Sample>,
{
    let mut outcome = PairingOutcome::default();
    let mut index: HashMap<String, CapturedRun> = HashMap::with_capacity(runs.len());
    for run in runs {
        if index.insert(normalize_question(&run.question), run).is_some() {
            outcome.duplicate_runs += 1;
        }
    }
    if outcome.duplicate_runs > 0 {
        warn!(
            duplicates = outcome.duplicate_runs,
            "Captured runs contain repeated questions; keeping the last run for each"
        );
    }

    for sample in samples {
        match index.get(&normalize_question(&sample.question)) {
            Some(run) => outcome.cases.push(PairedCase {
                sample: sample.clone(),
                run: run.clone(),
            }),
            None => {
                debug!(question = %sample.question, "No captured run for sample");
                outcome.skipped += 1;
            }
        }
    }
    outcome
}
