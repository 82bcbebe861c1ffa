use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub fn clamp_unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// Weights used for the overall score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub retrieval: f64,
    pub citation: f64,
    pub answer: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            retrieval: 0.4,
            citation: 0.2,
            answer: 0.4,
        }
    }
}

impl ScoreWeights {
    pub fn validate(&self) -> Result<(), AppError> {
        for (label, weight) in [
            ("retrieval", self.retrieval),
            ("citation", self.citation),
            ("answer", self.answer),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(AppError::Validation(format!(
                    "{label} weight must be a non-negative, finite number (got {weight})"
                )));
            }
        }
        if self.retrieval + self.citation + self.answer <= 0.0 {
            return Err(AppError::Validation(
                "at least one score weight must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// How a missing answer score is folded into the overall score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbsentAnswerPolicy {
    /// Drop the answer component and renormalise the remaining weights.
    #[default]
    Exclude,
    /// Keep the answer weight and count the component as zero.
    ZeroFill,
}

impl fmt::Display for AbsentAnswerPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exclude => f.write_str("exclude"),
            Self::ZeroFill => f.write_str("zero_fill"),
        }
    }
}

impl std::str::FromStr for AbsentAnswerPolicy {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().replace('-', "_").as_str() {
            "exclude" => Ok(Self::Exclude),
            "zero_fill" | "zero" => Ok(Self::ZeroFill),
            other => Err(AppError::Validation(format!(
                "unknown absent answer policy '{other}'. Expected 'exclude' or 'zero_fill'."
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScorePolicy {
    #[serde(default)]
    pub weights: ScoreWeights,
    #[serde(default)]
    pub absent_answer: AbsentAnswerPolicy,
}

/// Normalised sub-scores, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreComponents {
    pub retrieval: f64,
    pub citation: f64,
    pub answer: Option<f64>,
}

impl ScorePolicy {
    /// Weighted mean of the components scaled to [0, 100].
    pub fn overall_score(&self, components: ScoreComponents) -> f64 {
        let weights = self.weights;
        let mut weighted = weights.retrieval * clamp_unit(components.retrieval)
            + weights.citation * clamp_unit(components.citation);
        let mut total_weight = weights.retrieval + weights.citation;

        match (components.answer, self.absent_answer) {
            (Some(answer), _) => {
                weighted += weights.answer * clamp_unit(answer);
                total_weight += weights.answer;
            }
            (None, AbsentAnswerPolicy::ZeroFill) => total_weight += weights.answer,
            (None, AbsentAnswerPolicy::Exclude) => {}
        }

        if total_weight <= 0.0 || !total_weight.is_finite() {
            return 0.0;
        }
        (100.0 * weighted / total_weight).clamp(0.0, 100.0)
    }
}
