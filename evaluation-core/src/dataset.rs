//! Labelled question/answer/evidence samples loaded once per run.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt, fs,
    ops::Range,
    path::Path,
};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub const ALL: [Self; 3] = [Self::Easy, Self::Medium, Self::Hard];

    pub fn label(self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for Difficulty {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Self::Easy),
            "medium" => Ok(Self::Medium),
            "hard" => Ok(Self::Hard),
            other => Err(AppError::Validation(format!(
                "unknown difficulty '{other}'. Expected 'easy', 'medium', or 'hard'."
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub question: String,
    pub expected_answer: String,
    pub expected_chunks: Vec<String>,
    pub source_document: String,
    pub difficulty: Difficulty,
}

impl Sample {
    fn validate(&self, index: usize) -> Result<(), AppError> {
        if self.question.trim().is_empty() {
            return Err(AppError::Validation(format!(
                "sample {index} has an empty question"
            )));
        }
        if self.expected_chunks.is_empty() {
            return Err(AppError::Validation(format!(
                "sample {index} has no expected_chunks"
            )));
        }
        if self.expected_chunks.iter().any(|id| id.trim().is_empty()) {
            return Err(AppError::Validation(format!(
                "sample {index} contains a blank expected chunk id"
            )));
        }
        if self.source_document.trim().is_empty() {
            return Err(AppError::Validation(format!(
                "sample {index} has an empty source_document"
            )));
        }
        Ok(())
    }
}

/// Document/difficulty filter followed by an offset/limit window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleSelection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
    #[serde(default)]
    pub offset: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct SelectedSamples<'a> {
    /// Samples passing the filters, before windowing.
    pub matched: usize,
    pub samples: Vec<&'a Sample>,
}

fn window_range(len: usize, offset: usize, limit: Option<usize>) -> Range<usize> {
    let start = offset.min(len);
    let end = limit.map_or(len, |limit| start.saturating_add(limit).min(len));
    start..end
}

/// Immutable, validated collection of samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationDataset {
    samples: Vec<Sample>,
}

impl EvaluationDataset {
    pub fn new(samples: Vec<Sample>) -> Result<Self, AppError> {
        for (index, sample) in samples.iter().enumerate() {
            sample.validate(index)?;
        }
        Ok(Self { samples })
    }

    pub fn from_json_str(raw: &str) -> Result<Self, AppError> {
        let samples: Vec<Sample> = serde_json::from_str(raw)?;
        Self::new(samples)
    }

    pub fn load(path: &Path) -> Result<Self, AppError> {
        let raw = fs::read_to_string(path).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                AppError::NotFound(format!("dataset file {}", path.display()))
            } else {
                AppError::Io(err)
            }
        })?;
        let dataset = Self::from_json_str(&raw)?;
        debug!(
            path = %path.display(),
            samples = dataset.len(),
            "Loaded evaluation dataset"
        );
        Ok(dataset)
    }

    pub fn to_json_pretty(&self) -> Result<String, AppError> {
        Ok(serde_json::to_string_pretty(&self.samples)?)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Sample> {
        self.samples.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Sample> {
        self.samples.iter()
    }

    pub fn by_document(&self, source_document: &str) -> Vec<&Sample> {
        self.samples
            .iter()
            .filter(|sample| sample.source_document == source_document)
            .collect()
    }

    pub fn by_difficulty(&self, difficulty: Difficulty) -> Vec<&Sample> {
        self.samples
            .iter()
            .filter(|sample| sample.difficulty == difficulty)
            .collect()
    }

    /// Contiguous slice starting at `offset`; `None` means "to the end".
    /// Out-of-range bounds are clamped rather than rejected.
    pub fn window(&self, offset: usize, limit: Option<usize>) -> &[Sample] {
        self.samples
            .get(window_range(self.samples.len(), offset, limit))
            .unwrap_or_default()
    }

    /// Applies the filters in dataset order, then windows the matches.
    pub fn select(&self, selection: &SampleSelection) -> SelectedSamples<'_> {
        let matched = match (selection.document.as_deref(), selection.difficulty) {
            (Some(document), difficulty) => {
                let mut samples = self.by_document(document);
                if let Some(difficulty) = difficulty {
                    samples.retain(|sample| sample.difficulty == difficulty);
                }
                samples
            }
            (None, Some(difficulty)) => self.by_difficulty(difficulty),
            (None, None) => self.samples.iter().collect(),
        };
        let samples = matched
            .get(window_range(matched.len(), selection.offset, selection.limit))
            .map(<[&Sample]>::to_vec)
            .unwrap_or_default();
        SelectedSamples {
            matched: matched.len(),
            samples,
        }
    }

    pub fn documents(&self) -> BTreeSet<&str> {
        self.samples
            .iter()
            .map(|sample| sample.source_document.as_str())
            .collect()
    }

    pub fn difficulty_counts(&self) -> BTreeMap<Difficulty, usize> {
        let mut counts = BTreeMap::new();
        for sample in &self.samples {
            *counts.entry(sample.difficulty).or_insert(0usize) += 1;
        }
        counts
    }
}

impl<'a> IntoIterator for &'a EvaluationDataset {
    type Item = &'a Sample;
    type IntoIter = std::slice::Iter<'a, Sample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const FIXTURE: &str = r#"[
        {
            "question": "What is the refund window?",
            "expected_answer": "30 days",
            "expected_chunks": ["policy-1", "policy-2"],
            "source_document": "refund_policy.pdf",
            "difficulty": "easy"
        },
        {
            "question": "Who approves exceptions?",
            "expected_answer": "The regional manager",
            "expected_chunks": ["policy-7"],
            "source_document": "refund_policy.pdf",
            "difficulty": "hard"
        },
        {
            "question": "How are shipping fees calculated?",
            "expected_answer": "By weight and zone",
            "expected_chunks": ["shipping-3"],
            "source_document": "shipping.md",
            "difficulty": "medium"
        }
    ]"#;

    fn dataset() -> EvaluationDataset {
        EvaluationDataset::from_json_str(FIXTURE).expect("fixture parses")
    }

    #[test]
    fn filters_by_document_and_difficulty() {
        let dataset = dataset();
        assert_eq!(dataset.len(), 3);

        let refunds = dataset.by_document("refund_policy.pdf");
        assert_eq!(refunds.len(), 2);
        assert!(dataset.by_document("missing.pdf").is_empty());

        let hard = dataset.by_difficulty(Difficulty::Hard);
        assert_eq!(hard.len(), 1);
        assert_eq!(hard[0].expected_chunks, vec!["policy-7".to_string()]);

        let documents: Vec<_> = dataset.documents().into_iter().collect();
        assert_eq!(documents, vec!["refund_policy.pdf", "shipping.md"]);

        let counts = dataset.difficulty_counts();
        assert_eq!(counts.get(&Difficulty::Easy), Some(&1));
        assert_eq!(counts.get(&Difficulty::Medium), Some(&1));
    }

    #[test]
    fn window_clamps_bounds() {
        let dataset = dataset();
        assert_eq!(dataset.window(0, None).len(), 3);
        assert_eq!(dataset.window(1, Some(1)).len(), 1);
        assert_eq!(
            dataset.window(1, Some(1))[0].question,
            "Who approves exceptions?"
        );
        assert_eq!(dataset.window(2, Some(10)).len(), 1);
        assert!(dataset.window(7, Some(2)).is_empty());
    }

    #[test]
    fn select_filters_before_windowing() {
        let dataset = dataset();

        let refunds = dataset.select(&SampleSelection {
            document: Some("refund_policy.pdf".into()),
            offset: 1,
            ..SampleSelection::default()
        });
        assert_eq!(refunds.matched, 2);
        assert_eq!(refunds.samples.len(), 1);
        assert_eq!(refunds.samples[0].question, "Who approves exceptions?");

        let hard_refunds = dataset.select(&SampleSelection {
            document: Some("refund_policy.pdf".into()),
            difficulty: Some(Difficulty::Hard),
            ..SampleSelection::default()
        });
        assert_eq!(hard_refunds.matched, 1);

        let medium = dataset.select(&SampleSelection {
            difficulty: Some(Difficulty::Medium),
            limit: Some(5),
            ..SampleSelection::default()
        });
        assert_eq!(medium.samples.len(), 1);
        assert_eq!(medium.samples[0].source_document, "shipping.md");

        let everything = dataset.select(&SampleSelection {
            offset: 1,
            limit: Some(1),
            ..SampleSelection::default()
        });
        assert_eq!(everything.matched, 3);
        assert_eq!(everything.samples.len(), 1);
        assert_eq!(everything.samples[0].question, dataset.window(1, Some(1))[0].question);

        let past_end = dataset.select(&SampleSelection {
            offset: 10,
            ..SampleSelection::default()
        });
        assert_eq!(past_end.matched, 3);
        assert!(past_end.samples.is_empty());
    }

    #[test]
    fn empty_expected_chunks_are_rejected() {
        let raw = r#"[{
            "question": "q",
            "expected_answer": "a",
            "expected_chunks": [],
            "source_document": "doc",
            "difficulty": "easy"
        }]"#;
        let err = EvaluationDataset::from_json_str(raw).expect_err("must fail");
        assert!(matches!(err, AppError::Validation(msg) if msg.contains("sample 0")));
    }

    #[test]
    fn missing_fields_and_bad_difficulty_fail_to_parse() {
        let missing = r#"[{ "question": "q", "expected_answer": "a", "source_document": "d", "difficulty": "easy" }]"#;
        assert!(matches!(
            EvaluationDataset::from_json_str(missing),
            Err(AppError::Serde(_))
        ));

        let bad_difficulty = r#"[{
            "question": "q",
            "expected_answer": "a",
            "expected_chunks": ["c"],
            "source_document": "d",
            "difficulty": "impossible"
        }]"#;
        assert!(EvaluationDataset::from_json_str(bad_difficulty).is_err());
    }

    #[test]
    fn load_and_reserialise_preserves_every_field() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(FIXTURE.as_bytes()).expect("write fixture");

        let loaded = EvaluationDataset::load(file.path()).expect("load");
        let rendered = loaded.to_json_pretty().expect("serialise");
        let reloaded = EvaluationDataset::from_json_str(&rendered).expect("reload");
        assert_eq!(loaded, reloaded);
        assert_eq!(reloaded.get(0).map(|s| s.difficulty), Some(Difficulty::Easy));
    }

    #[test]
    fn missing_file_is_reported_as_not_found() {
        let dir = tempfile::tempdir().expect("temp dir");
        let err = EvaluationDataset::load(&dir.path().join("nope.json")).expect_err("missing");
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn difficulty_parses_case_insensitively() {
        assert_eq!("Hard".parse::<Difficulty>().ok(), Some(Difficulty::Hard));
        assert!("extreme".parse::<Difficulty>().is_err());
    }
}
