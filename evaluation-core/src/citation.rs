use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Overlap between the chunks an answer cited and the expected evidence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CitationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
}

impl CitationMetrics {
    pub fn compute<C, E>(cited: &[C], expected: &[E]) -> Self
    where
        C: AsRef<str>,
        E: AsRef<str>,
    {
        let cited: HashSet<&str> = cited.iter().map(AsRef::as_ref).collect();
        let expected: HashSet<&str> = expected.iter().map(AsRef::as_ref).collect();
        let overlap = cited.intersection(&expected).count() as f64;

        let precision = if cited.is_empty() {
            0.0
        } else {
            overlap / cited.len() as f64
        };
        let recall = if expected.is_empty() {
            0.0
        } else {
            overlap / expected.len() as f64
        };

        Self {
            accuracy: precision,
            precision,
            recall,
        }
    }

    pub fn mean(&self) -> f64 {
        (self.precision + self.recall) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_overlap() {
        let metrics = CitationMetrics::compute(&["c1", "c3"], &["c1", "c2"]);
        assert!((metrics.accuracy - 0.5).abs() < f64::EPSILON);
        assert!((metrics.precision - 0.5).abs() < f64::EPSILON);
        assert!((metrics.recall - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_inputs_score_zero() {
        let none: [&str; 0] = [];
        let no_citations = CitationMetrics::compute(&none, &["c1"]);
        assert_eq!(no_citations.precision, 0.0);
        assert_eq!(no_citations.recall, 0.0);

        let no_expected = CitationMetrics::compute(&["c1"], &none);
        assert_eq!(no_expected.precision, 0.0);
        assert_eq!(no_expected.recall, 0.0);
    }

    #[test]
    fn repeated_citations_count_once() {
        let metrics = CitationMetrics::compute(&["c1", "c1", "c2"], &["c1", "c2", "c4", "c5"]);
        assert!((metrics.precision - 1.0).abs() < f64::EPSILON);
        assert!((metrics.recall - 0.5).abs() < f64::EPSILON);
    }
}
