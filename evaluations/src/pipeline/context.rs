use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use evaluation_core::{EvaluationConfig, EvaluationDataset, EvaluationOptions, Evaluator};

use crate::{
    args::Config,
    runs::PairedCase,
    types::{BatchSummary, CaseOutcome, EvaluationStageTimings},
};

pub(super) struct EvaluationContext<'a> {
    config: &'a Config,
    settings: &'a EvaluationConfig,
    pub stage_timings: EvaluationStageTimings,
    pub dataset: Option<EvaluationDataset>,
    pub evaluator: Option<Arc<Evaluator>>,
    pub options: EvaluationOptions,
    pub cases: Vec<PairedCase>,
    pub window_samples: usize,
    pub skipped_cases: usize,
    pub evaluation_start: Option<Instant>,
    pub outcomes: Vec<CaseOutcome>,
    pub summary: Option<BatchSummary>,
}

impl<'a> EvaluationContext<'a> {
    pub fn new(config: &'a Config, settings: &'a EvaluationConfig) -> Self {
        Self {
            config,
            settings,
            stage_timings: EvaluationStageTimings::default(),
            dataset: None,
            evaluator: None,
            options: EvaluationOptions::default(),
            cases: Vec::new(),
            window_samples: 0,
            skipped_cases: 0,
            evaluation_start: None,
            outcomes: Vec::new(),
            summary: None,
        }
    }

    pub fn config(&self) -> &'a Config {
        self.config
    }

    pub fn settings(&self) -> &'a EvaluationConfig {
        self.settings
    }

    pub fn evaluator(&self) -> Result<Arc<Evaluator>> {
        self.evaluator
            .clone()
            .context("evaluator has not been initialised")
    }

    pub fn record_stage_duration(&mut self, stage: EvalStage, duration: Duration) {
        let elapsed = duration.as_millis();
        match stage {
            EvalStage::LoadInputs => self.stage_timings.load_inputs_ms += elapsed,
            EvalStage::EvaluateCases => self.stage_timings.evaluate_cases_ms += elapsed,
            EvalStage::Summarize => self.stage_timings.summarize_ms += elapsed,
            EvalStage::Finalize => self.stage_timings.finalize_ms += elapsed,
        }
    }

    pub fn into_summary(self) -> Result<BatchSummary> {
        self.summary.context("evaluation summary missing")
    }
}

#[derive(Copy, Clone)]
pub(super) enum EvalStage {
    LoadInputs,
    EvaluateCases,
    Summarize,
    Finalize,
}

impl EvalStage {
    pub fn label(self) -> &'static str {
        match self {
            EvalStage::LoadInputs => "load-inputs",
            EvalStage::EvaluateCases => "evaluate-cases",
            EvalStage::Summarize => "summarize",
            EvalStage::Finalize => "finalize",
        }
    }
}
