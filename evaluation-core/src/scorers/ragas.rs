use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::{AnswerScorer, ScorerKind, ScoringRequest};
use crate::{error::AppError, types::AnswerMetrics};

/// Response of the automated-metric service. RAGAS metric names are accepted
/// as aliases for the three answer dimensions.
#[derive(Debug, Deserialize)]
struct RagasResponse {
    #[serde(alias = "answer_relevancy")]
    relevance: f64,
    #[serde(alias = "context_recall")]
    completeness: f64,
    #[serde(alias = "faithfulness")]
    coherence: f64,
}

/// Client for an HTTP automated-metric service.
#[derive(Debug, Clone)]
pub struct RagasScorer {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl RagasScorer {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let endpoint = endpoint.into();
        if endpoint.trim().is_empty() {
            return Err(AppError::Validation(
                "automated metric endpoint must not be empty".into(),
            ));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            api_key: api_key.filter(|key| !key.trim().is_empty()),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl AnswerScorer for RagasScorer {
    fn kind(&self) -> ScorerKind {
        ScorerKind::Ragas
    }

    #[instrument(skip_all, fields(endpoint = %self.endpoint))]
    async fn score(&self, request: &ScoringRequest<'_>) -> Result<AnswerMetrics, AppError> {
        let mut builder = self.client.post(&self.endpoint).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?.error_for_status()?;
        let body: RagasResponse = response.json().await?;
        debug!(
            relevance = body.relevance,
            completeness = body.completeness,
            coherence = body.coherence,
            "Automated metric service responded"
        );

        AnswerMetrics::new(body.relevance, body.completeness, body.coherence)
    }
}
