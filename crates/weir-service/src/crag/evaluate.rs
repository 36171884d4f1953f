use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use weir_domain::{SearchResult, Verdict};
use weir_providers::{HttpClient, llm::LlmClient};

use crate::{Error, Result};

const DEFAULT_CORRECT_THRESHOLD: f64 = 0.7;
const DEFAULT_INCORRECT_THRESHOLD: f64 = 0.3;

/// Scores (query, context) relevance in `[0, 1]` and yields a verdict.
///
/// Unlike the rest of post-processing, evaluator errors propagate so the
/// orchestrator can honor the configured fail mode.
#[async_trait]
pub trait Evaluator: Send + Sync {
	async fn evaluate(&self, query: &str, context: &str) -> Result<(f64, Verdict)>;
}

/// Concatenates the first `limit` candidate contents for evaluation.
pub fn extract_content(results: &[SearchResult], limit: usize) -> String {
	let limit = if limit == 0 || limit > results.len() { results.len() } else { limit };
	let mut out = String::new();

	for result in &results[..limit] {
		out.push_str(&result.document.content);
		out.push_str("\n\n");
	}

	out
}

/// External evaluation service:
/// request `{query, context}`, response `{score, verdict}`. Verdicts other
/// than `correct`/`incorrect` map to ambiguous.
pub struct HttpEvaluator {
	pub endpoint: String,
	pub client: Arc<HttpClient>,
}

#[derive(Debug, Deserialize)]
struct EvaluationResponse {
	#[serde(default)]
	score: f64,
	#[serde(default)]
	verdict: String,
}

#[async_trait]
impl Evaluator for HttpEvaluator {
	async fn evaluate(&self, query: &str, context: &str) -> Result<(f64, Verdict)> {
		let body = serde_json::json!({ "query": query, "context": context });
		let request = self
			.client
			.post(&self.endpoint)
			.json(&body)
			.build()
			.map_err(weir_providers::Error::from)?;
		let response = self.client.execute(request).await?;

		if !response.status().is_success() {
			return Err(Error::evaluator(format!(
				"evaluator returned status {}",
				response.status().as_u16()
			)));
		}

		let parsed: EvaluationResponse =
			response.json().await.map_err(weir_providers::Error::from)?;

		Ok((parsed.score, Verdict::parse_lenient(&parsed.verdict)))
	}
}

const EVALUATOR_SYSTEM_PROMPT: &str = "You are an expert at evaluating document relevance.
Rate how relevant the given document is to the query on a scale from 0 to 1.
0 means completely irrelevant, 1 means perfectly relevant.
Provide ONLY the score as a float between 0 and 1.";

/// LLM-backed evaluation: parses a single float and maps it through the
/// correct/incorrect thresholds.
pub struct LlmEvaluator {
	llm: Arc<dyn LlmClient>,
	correct_threshold: f64,
	incorrect_threshold: f64,
	score_pattern: Regex,
}
impl LlmEvaluator {
	pub fn new(llm: Arc<dyn LlmClient>, correct_threshold: f64, incorrect_threshold: f64) -> Self {
		let score_pattern = Regex::new(r"(\d+(\.\d+)?)")
			.unwrap_or_else(|_| unreachable!("pattern is static"));

		Self {
			llm,
			correct_threshold: if correct_threshold == 0.0 {
				DEFAULT_CORRECT_THRESHOLD
			} else {
				correct_threshold
			},
			incorrect_threshold: if incorrect_threshold == 0.0 {
				DEFAULT_INCORRECT_THRESHOLD
			} else {
				incorrect_threshold
			},
			score_pattern,
		}
	}

	fn parse_score(&self, response: &str) -> f64 {
		let parsed = self
			.score_pattern
			.captures(response)
			.and_then(|captures| captures.get(1))
			.and_then(|m| m.as_str().parse::<f64>().ok());

		match parsed {
			Some(score) if (0.0..=1.0).contains(&score) => score,
			Some(score) => {
				tracing::warn!(score, "Evaluator score out of range, using 0.5.");

				0.5
			},
			None => {
				tracing::warn!(response = %response.trim(), "Could not parse evaluator score, using 0.5.");

				0.5
			},
		}
	}
}
#[async_trait]
impl Evaluator for LlmEvaluator {
	async fn evaluate(&self, query: &str, context: &str) -> Result<(f64, Verdict)> {
		let prompt =
			format!("{EVALUATOR_SYSTEM_PROMPT}\n\nQuery: {query}\n\nDocument: {context}");
		let response = self
			.llm
			.complete(&prompt)
			.await
			.map_err(|err| Error::evaluator(err.to_string()))?;
		let score = self.parse_score(&response);
		let verdict = if score >= self.correct_threshold {
			Verdict::Correct
		} else if score < self.incorrect_threshold {
			Verdict::Incorrect
		} else {
			Verdict::Ambiguous
		};

		tracing::info!(score, verdict = verdict.as_str(), "Evaluation complete.");

		Ok((score, verdict))
	}
}
