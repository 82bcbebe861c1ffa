use std::sync::Arc;

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs, ResponseFormat,
        ResponseFormatJsonSchema,
    },
    Client,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument};

use super::{AnswerScorer, ScorerKind, ScoringRequest};
use crate::{error::AppError, types::AnswerMetrics};

pub const DEFAULT_JUDGE_MODEL: &str = "gpt-4o-mini";

const JUDGE_SYSTEM_PROMPT: &str = "You grade answers produced by a retrieval-augmented assistant. \
Score the answer against the question, the retrieved context and the reference answer. \
Every score is a number between 0 and 1. \
relevance: does the answer address the question. \
completeness: does it cover everything the reference answer covers. \
coherence: is it consistent, well-formed and supported by the context.";

#[derive(Debug, Deserialize)]
pub struct JudgeVerdict {
    pub relevance: f64,
    pub completeness: f64,
    pub coherence: f64,
    pub reasoning: String,
}

impl JudgeVerdict {
    pub fn metrics(&self) -> Result<AnswerMetrics, AppError> {
        AnswerMetrics::new(self.relevance, self.completeness, self.coherence)
    }
}

pub fn judge_response_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "relevance": { "type": "number" },
            "completeness": { "type": "number" },
            "coherence": { "type": "number" },
            "reasoning": { "type": "string" }
        },
        "required": ["relevance", "completeness", "coherence", "reasoning"],
        "additionalProperties": false
    })
}

pub fn create_judge_message(request: &ScoringRequest<'_>) -> String {
    let context = request
        .context
        .iter()
        .enumerate()
        .map(|(idx, passage)| format!("[{}] {passage}", idx + 1))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        r"
        Question:
        ==================
        {question}

        Retrieved Context:
        ==================
        {context}

        Reference Answer:
        ==================
        {expected}

        Answer To Grade:
        ==================
        {answer}
        ",
        question = request.question,
        expected = request.expected_answer,
        answer = request.answer,
    )
}

pub fn create_judge_request(
    user_message: String,
    model: &str,
) -> Result<CreateChatCompletionRequest, OpenAIError> {
    let response_format = ResponseFormat::JsonSchema {
        json_schema: ResponseFormatJsonSchema {
            description: Some("RAG answer quality judge".into()),
            name: "answer_quality_verdict".into(),
            schema: Some(judge_response_schema()),
            strict: Some(true),
        },
    };

    CreateChatCompletionRequestArgs::default()
        .model(model)
        .temperature(0.0)
        .messages([
            ChatCompletionRequestSystemMessage::from(JUDGE_SYSTEM_PROMPT).into(),
            ChatCompletionRequestUserMessage::from(user_message).into(),
        ])
        .response_format(response_format)
        .build()
}

pub fn parse_judge_content(content: Option<&str>) -> Result<JudgeVerdict, AppError> {
    let content = content.ok_or(AppError::LLMParsing(
        "No content found in judge response".into(),
    ))?;
    serde_json::from_str(content).map_err(|e| {
        AppError::LLMParsing(format!("Failed to parse judge response into verdict: {e}"))
    })
}

/// LLM-as-judge scorer backed by an OpenAI-compatible chat endpoint.
#[derive(Clone)]
pub struct LlmJudgeScorer {
    client: Arc<Client<OpenAIConfig>>,
    model: String,
}

impl LlmJudgeScorer {
    pub fn new(client: Arc<Client<OpenAIConfig>>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    pub fn from_credentials(api_key: &str, base_url: &str, model: impl Into<String>) -> Self {
        let config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(base_url);
        Self::new(Arc::new(Client::with_config(config)), model)
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl AnswerScorer for LlmJudgeScorer {
    fn kind(&self) -> ScorerKind {
        ScorerKind::LlmJudge
    }

    #[instrument(skip_all, fields(model = %self.model))]
    async fn score(&self, request: &ScoringRequest<'_>) -> Result<AnswerMetrics, AppError> {
        let chat_request = create_judge_request(create_judge_message(request), &self.model)?;
        let response = self.client.chat().create(chat_request).await?;
        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_deref());
        let verdict = parse_judge_content(content)?;
        let metrics = verdict.metrics()?;
        debug!(
            relevance = metrics.relevance,
            completeness = metrics.completeness,
            coherence = metrics.coherence,
            reasoning = %verdict.reasoning,
            "Judge verdict received"
        );
        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        evaluator::{EvaluationOptions, EvaluationRequest, Evaluator},
        metrics::Cutoff,
    };
    use axum::{http::StatusCode, routing::post, Json, Router};
    use tokio::net::TcpListener;

    async fn spawn_chat_service(content: &'static str) -> String {
        let router = Router::new().route(
            "/chat/completions",
            post(move |Json(body): Json<Value>| async move {
                if body["response_format"]["type"] != "json_schema" {
                    return (StatusCode::BAD_REQUEST, Json(json!({ "error": "schema" })));
                }
                let reply = json!({
                    "id": "chatcmpl-judge",
                    "object": "chat.completion",
                    "created": 1_700_000_000,
                    "model": body["model"],
                    "choices": [{
                        "index": 0,
                        "message": { "role": "assistant", "content": content },
                        "finish_reason": "stop"
                    }],
                    "usage": { "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15 }
                });
                (StatusCode::OK, Json(reply))
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind listener");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, router).await.ok();
        });
        format!("http://{addr}")
    }

    fn graded_request() -> EvaluationRequest {
        EvaluationRequest {
            question: "What is the refund window?".into(),
            answer: "30 days".into(),
            retrieved_chunks: vec!["policy-1".into(), "policy-2".into()],
            expected_answer: "Refunds are accepted within 30 days.".into(),
            expected_chunks: vec!["policy-1".into(), "policy-2".into()],
            ..EvaluationRequest::default()
        }
    }

    fn judged_evaluator(base_url: &str) -> Evaluator {
        let scorer = LlmJudgeScorer::from_credentials("test-key", base_url, "judge-model");
        Evaluator::new(Cutoff::new(2).expect("valid cutoff")).with_judge(Arc::new(scorer))
    }

    #[tokio::test]
    async fn judge_verdict_flows_through_the_evaluator() {
        let base_url = spawn_chat_service(
            r#"{"relevance": 1.0, "completeness": 0.5, "coherence": 0.75, "reasoning": "close"}"#,
        )
        .await;

        let result = judged_evaluator(&base_url)
            .evaluate(&graded_request(), EvaluationOptions::all())
            .await;

        let judge = result.llm_judge.expect("judge scored the answer");
        assert!((judge.relevance - 1.0).abs() < 1e-9);
        assert!((judge.completeness - 0.5).abs() < 1e-9);
        assert!((judge.coherence - 0.75).abs() < 1e-9);
        assert!(result.ragas.is_none());
        assert!(result.overall_score < 100.0);
    }

    #[tokio::test]
    async fn unparsable_judge_content_leaves_answer_metrics_absent() {
        let base_url = spawn_chat_service("I think the answer is fine.").await;
        let scorer = LlmJudgeScorer::from_credentials("test-key", &base_url, "judge-model");
        let request = graded_request();

        let err = scorer
            .score(&request.scoring_request())
            .await
            .expect_err("non-JSON verdict");
        assert!(matches!(err, AppError::LLMParsing(_)));

        let result = judged_evaluator(&base_url)
            .evaluate(&request, EvaluationOptions::all())
            .await;
        assert!(result.llm_judge.is_none());
        assert!((result.overall_score - 100.0).abs() < 1e-9);
    }

    #[test]
    fn parses_verdict_and_clamps_scores() {
        let content = r#"{"relevance": 0.8, "completeness": 1.5, "coherence": 0.6, "reasoning": "ok"}"#;
        let verdict = parse_judge_content(Some(content)).expect("valid verdict");
        assert_eq!(verdict.reasoning, "ok");
        let metrics = verdict.metrics().expect("finite scores");
        assert!((metrics.relevance - 0.8).abs() < 1e-9);
        assert!((metrics.completeness - 1.0).abs() < 1e-9);
        assert!((metrics.coherence - 0.6).abs() < 1e-9);
    }

    #[test]
    fn missing_or_malformed_content_is_a_parsing_error() {
        assert!(matches!(
            parse_judge_content(None),
            Err(AppError::LLMParsing(_))
        ));
        assert!(matches!(
            parse_judge_content(Some("not json")),
            Err(AppError::LLMParsing(_))
        ));
        assert!(matches!(
            parse_judge_content(Some(r#"{"relevance": 0.5}"#)),
            Err(AppError::LLMParsing(_))
        ));
    }

    #[test]
    fn message_contains_every_input() {
        let context = vec!["alpha passage".to_string(), "beta passage".to_string()];
        let chunks = vec!["c1".to_string()];
        let request = ScoringRequest {
            question: "What is alpha?",
            answer: "Alpha is first.",
            context: &context,
            expected_answer: "The first letter.",
            retrieved_chunks: &chunks,
            expected_chunks: &chunks,
        };
        let message = create_judge_message(&request);
        assert!(message.contains("What is alpha?"));
        assert!(message.contains("[2] beta passage"));
        assert!(message.contains("The first letter."));
        assert!(message.contains("Alpha is first."));
    }

    #[test]
    fn request_uses_strict_schema_and_model() {
        let request = create_judge_request("grade this".into(), "judge-model").expect("request");
        assert_eq!(request.model, "judge-model");
        assert_eq!(request.messages.len(), 2);
        assert!(matches!(
            request.response_format,
            Some(ResponseFormat::JsonSchema { .. })
        ));
    }
}
