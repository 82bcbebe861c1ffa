//! Ranking-quality metrics over a retrieved id sequence and an expected id set.
//!
//! Relevance is binary: an identifier is relevant when it appears in the
//! expected set. A retrieved identifier only counts at its first occurrence.

use std::{collections::HashSet, fmt, num::NonZeroUsize};

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// A validated rank cutoff (`k > 0`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct Cutoff(NonZeroUsize);

impl Cutoff {
    pub fn new(k: usize) -> Result<Self, AppError> {
        NonZeroUsize::new(k)
            .map(Self)
            .ok_or_else(|| AppError::Validation("cutoff k must be greater than zero".into()))
    }

    pub const fn get(self) -> usize {
        self.0.get()
    }
}

impl Default for Cutoff {
    fn default() -> Self {
        Self(NonZeroUsize::MIN.saturating_add(4))
    }
}

impl TryFrom<usize> for Cutoff {
    type Error = AppError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Cutoff> for usize {
    fn from(value: Cutoff) -> Self {
        value.get()
    }
}

impl fmt::Display for Cutoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}

/// Borrowed view of the expected identifiers.
pub fn expected_set<S: AsRef<str>>(expected: &[S]) -> HashSet<&str> {
    expected.iter().map(AsRef::as_ref).collect()
}

/// Distinct relevant hits among the first `k` retrieved identifiers, as
/// (1-indexed position, id) pairs.
fn relevant_hits<'a, S: AsRef<str>>(
    retrieved: &'a [S],
    expected: &HashSet<&str>,
    k: usize,
) -> Vec<(usize, &'a str)> {
    let mut seen = HashSet::new();
    retrieved
        .iter()
        .take(k)
        .enumerate()
        .filter_map(|(idx, id)| {
            let id = id.as_ref();
            if seen.insert(id) && expected.contains(id) {
                Some((idx + 1, id))
            } else {
                None
            }
        })
        .collect()
}

pub fn precision_at_k<S: AsRef<str>>(
    retrieved: &[S],
    expected: &HashSet<&str>,
    cutoff: Cutoff,
) -> f64 {
    let k = cutoff.get();
    relevant_hits(retrieved, expected, k).len() as f64 / k as f64
}

/// Returns 0 when nothing is expected.
pub fn recall_at_k<S: AsRef<str>>(
    retrieved: &[S],
    expected: &HashSet<&str>,
    cutoff: Cutoff,
) -> f64 {
    if expected.is_empty() {
        return 0.0;
    }
    relevant_hits(retrieved, expected, cutoff.get()).len() as f64 / expected.len() as f64
}

/// NDCG@k with binary gains. Defined as 0 when the ideal DCG is 0.
pub fn ndcg_at_k<S: AsRef<str>>(retrieved: &[S], expected: &HashSet<&str>, cutoff: Cutoff) -> f64 {
    let k = cutoff.get();
    let dcg: f64 = relevant_hits(retrieved, expected, k)
        .into_iter()
        .map(|(position, _)| discount(position))
        .sum();

    let ideal_hits = k.min(expected.len());
    let idcg: f64 = (1..=ideal_hits).map(discount).sum();

    if idcg <= 0.0 {
        0.0
    } else {
        (dcg / idcg).clamp(0.0, 1.0)
    }
}

/// Reciprocal rank of the first relevant identifier over the full sequence.
pub fn mrr<S: AsRef<str>>(retrieved: &[S], expected: &HashSet<&str>) -> f64 {
    retrieved
        .iter()
        .position(|id| expected.contains(id.as_ref()))
        .map_or(0.0, |idx| 1.0 / (idx + 1) as f64)
}

#[inline]
fn discount(position: usize) -> f64 {
    1.0 / ((position + 1) as f64).log2()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetrievalMetrics {
    pub ndcg_at_k: f64,
    pub precision_at_k: f64,
    pub recall_at_k: f64,
    pub mrr: f64,
}

impl RetrievalMetrics {
    pub fn compute<S, E>(retrieved: &[S], expected: &[E], cutoff: Cutoff) -> Self
    where
        S: AsRef<str>,
        E: AsRef<str>,
    {
        let expected = expected_set(expected);
        Self {
            ndcg_at_k: ndcg_at_k(retrieved, &expected, cutoff),
            precision_at_k: precision_at_k(retrieved, &expected, cutoff),
            recall_at_k: recall_at_k(retrieved, &expected, cutoff),
            mrr: mrr(retrieved, &expected),
        }
    }

    /// Unweighted mean of the four metrics.
    pub fn mean(&self) -> f64 {
        (self.ndcg_at_k + self.precision_at_k + self.recall_at_k + self.mrr) / 4.0
    }
}
