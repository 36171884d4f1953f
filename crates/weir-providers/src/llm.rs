use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use weir_config::LlmProviderConfig;

use crate::{Error, HttpClient, Result};

/// Single-turn completion against a language model.
///
/// Used by the LLM reranker, the LLM compressors, the CRAG evaluator, and
/// the planner. The model itself is an external collaborator.
#[async_trait]
pub trait LlmClient: Send + Sync {
	async fn complete(&self, prompt: &str) -> Result<String>;
}

/// OpenAI-compatible chat-completions client.
pub struct HttpLlmClient {
	cfg: LlmProviderConfig,
	client: Arc<HttpClient>,
}
impl HttpLlmClient {
	pub fn new(cfg: LlmProviderConfig, client: Arc<HttpClient>) -> Self {
		Self { cfg, client }
	}
}
#[async_trait]
impl LlmClient for HttpLlmClient {
	async fn complete(&self, prompt: &str) -> Result<String> {
		let url = format!("{}{}", self.cfg.api_base, self.cfg.path);
		let body = serde_json::json!({
			"model": self.cfg.model,
			"temperature": self.cfg.temperature,
			"messages": [{ "role": "user", "content": prompt }],
		});
		let request = self
			.client
			.post(&url)
			.headers(crate::auth_headers(&self.cfg.api_key, &self.cfg.default_headers)?)
			.json(&body)
			.build()?;
		let response = self.client.execute(request).await?;

		if !response.status().is_success() {
			return Err(Error::UnexpectedStatus { status: response.status().as_u16(), url });
		}

		let json: Value = response.json().await?;

		parse_completion(json)
	}
}

fn parse_completion(json: Value) -> Result<String> {
	json.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|message| message.get("content"))
		.and_then(|content| content.as_str())
		.map(str::to_string)
		.ok_or_else(|| Error::invalid_response("Completion response is missing message content."))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_choice_content() {
		let json = serde_json::json!({
			"choices": [{ "message": { "content": "0.85" } }]
		});

		assert_eq!(parse_completion(json).expect("fixture must parse"), "0.85");
	}

	#[test]
	fn missing_choices_is_an_error() {
		assert!(parse_completion(serde_json::json!({ "usage": {} })).is_err());
	}
}
