use config::{Config, Environment, File};
use serde::Deserialize;

use crate::{
    error::AppError,
    metrics::Cutoff,
    scoring::{AbsentAnswerPolicy, ScorePolicy, ScoreWeights},
    types::TokenPricing,
};

#[derive(Clone, Deserialize, Debug)]
pub struct EvaluationConfig {
    #[serde(default)]
    pub openai_api_key: Option<String>,
    #[serde(default = "default_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_judge_model")]
    pub judge_model: String,
    #[serde(default)]
    pub ragas_url: Option<String>,
    #[serde(default)]
    pub ragas_api_key: Option<String>,
    #[serde(default = "default_scorer_timeout_secs")]
    pub scorer_timeout_secs: u64,
    #[serde(default)]
    pub k: Cutoff,
    #[serde(default)]
    pub score_weights: ScoreWeights,
    #[serde(default)]
    pub absent_answer_policy: AbsentAnswerPolicy,
    #[serde(default)]
    pub pricing: TokenPricing,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_judge_model() -> String {
    crate::scorers::judge::DEFAULT_JUDGE_MODEL.to_string()
}

fn default_scorer_timeout_secs() -> u64 {
    60
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_base_url: default_base_url(),
            judge_model: default_judge_model(),
            ragas_url: None,
            ragas_api_key: None,
            scorer_timeout_secs: default_scorer_timeout_secs(),
            k: Cutoff::default(),
            score_weights: ScoreWeights::default(),
            absent_answer_policy: AbsentAnswerPolicy::default(),
            pricing: TokenPricing::default(),
        }
    }
}

impl EvaluationConfig {
    pub fn score_policy(&self) -> ScorePolicy {
        ScorePolicy {
            weights: self.score_weights,
            absent_answer: self.absent_answer_policy,
        }
    }

    /// API key, if one was configured and is not blank.
    pub fn openai_api_key(&self) -> Option<&str> {
        non_blank(self.openai_api_key.as_deref())
    }

    pub fn ragas_url(&self) -> Option<&str> {
        non_blank(self.ragas_url.as_deref())
    }

    pub fn validate(&self) -> Result<(), AppError> {
        self.score_weights.validate()?;
        if self.scorer_timeout_secs == 0 {
            return Err(AppError::Validation(
                "scorer_timeout_secs must be greater than zero".into(),
            ));
        }
        if self.openai_base_url.trim().is_empty() {
            return Err(AppError::Validation("openai_base_url must not be empty".into()));
        }
        if self.judge_model.trim().is_empty() {
            return Err(AppError::Validation("judge_model must not be empty".into()));
        }
        for (label, price) in [
            ("embedding_per_million", self.pricing.embedding_per_million),
            ("input_per_million", self.pricing.input_per_million),
            ("output_per_million", self.pricing.output_per_million),
        ] {
            if !price.is_finite() || price < 0.0 {
                return Err(AppError::Validation(format!(
                    "pricing.{label} must be a finite, non-negative number (got {price})"
                )));
            }
        }
        Ok(())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.trim().is_empty())
}

/// Loads `config.{toml,yaml,json}` when present, then overlays environment
/// variables. Nested keys use `__`, e.g. `SCORE_WEIGHTS__ANSWER=0.5`.
pub fn get_config() -> Result<EvaluationConfig, AppError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default().separator("__"))
        .build()?;

    let parsed: EvaluationConfig = config.try_deserialize()?;
    parsed.validate()?;
    Ok(parsed)
}
