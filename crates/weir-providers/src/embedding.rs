use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use weir_config::EmbeddingProviderConfig;

use crate::{Error, HttpClient, Result};

/// Turns text into a dense embedding.
#[async_trait]
pub trait Embedder: Send + Sync {
	async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// OpenAI-compatible `/embeddings` client.
pub struct HttpEmbedder {
	cfg: EmbeddingProviderConfig,
	client: Arc<HttpClient>,
}
impl HttpEmbedder {
	pub fn new(cfg: EmbeddingProviderConfig, client: Arc<HttpClient>) -> Self {
		Self { cfg, client }
	}
}
#[async_trait]
impl Embedder for HttpEmbedder {
	async fn embed(&self, text: &str) -> Result<Vec<f32>> {
		let url = format!("{}{}", self.cfg.api_base, self.cfg.path);
		let body = serde_json::json!({
			"model": self.cfg.model,
			"input": [text],
			"dimensions": self.cfg.dimensions,
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
		let mut vectors = parse_embedding_response(json)?;

		if vectors.is_empty() {
			return Err(Error::invalid_response("Embedding response contained no vectors."));
		}

		Ok(vectors.swap_remove(0))
	}
}

fn parse_embedding_response(json: Value) -> Result<Vec<Vec<f32>>> {
	let data = json
		.get("data")
		.and_then(|v| v.as_array())
		.ok_or_else(|| Error::invalid_response("Embedding response is missing data array."))?;
	let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());

	for (fallback_index, item) in data.iter().enumerate() {
		let index = item
			.get("index")
			.and_then(|v| v.as_u64())
			.map(|v| v as usize)
			.unwrap_or(fallback_index);
		let embedding = item
			.get("embedding")
			.and_then(|v| v.as_array())
			.ok_or_else(|| Error::invalid_response("Embedding item missing embedding array."))?;
		let mut vector = Vec::with_capacity(embedding.len());

		for value in embedding {
			let number = value
				.as_f64()
				.ok_or_else(|| Error::invalid_response("Embedding value must be numeric."))?;

			vector.push(number as f32);
		}

		indexed.push((index, vector));
	}

	indexed.sort_by_key(|(index, _)| *index);

	Ok(indexed.into_iter().map(|(_, vector)| vector).collect())
}
