use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use weir_config::RerankConfig;
use weir_domain::SearchResult;
use weir_providers::{HttpClient, llm::LlmClient};

use crate::sort::stable_sort_desc;

/// Reorders candidates by relevance to the query.
///
/// Rerankers never fail the pipeline: any upstream error passes the input
/// through, truncated to `top_n` when set.
#[async_trait]
pub trait Reranker: Send + Sync {
	async fn rerank(
		&self,
		query: &str,
		input: Vec<SearchResult>,
		top_n: usize,
	) -> Vec<SearchResult>;
}

/// Builds a reranker from configuration.
///
/// `llm` selects the LLM scorer (requires a client), `keyword` the local
/// lexical scorer, `model` the cross-encoder service; anything else is the
/// plain HTTP contract.
pub fn new_reranker(
	cfg: &RerankConfig,
	llm: Option<Arc<dyn LlmClient>>,
	client: Arc<HttpClient>,
) -> Option<Arc<dyn Reranker>> {
	match cfg.provider.as_str() {
		"llm" => llm.map(|llm| Arc::new(LlmReranker::new(llm)) as Arc<dyn Reranker>),
		"keyword" => Some(Arc::new(KeywordReranker::default())),
		"model" => Some(Arc::new(ModelReranker {
			endpoint: cfg.endpoint.clone(),
			model: cfg.model.clone(),
			api_key: cfg.api_key.clone(),
			client,
		})),
		_ => Some(Arc::new(HttpReranker { endpoint: cfg.endpoint.clone(), client })),
	}
}

fn passthrough(mut input: Vec<SearchResult>, top_n: usize) -> Vec<SearchResult> {
	if top_n > 0 && input.len() > top_n {
		input.truncate(top_n);
	}

	input
}

/// Reranking over the plain HTTP contract:
/// request `{query, candidates: [{id, text}], top_n}`, response
/// `{ranking: [{id, score}]}`.
pub struct HttpReranker {
	pub endpoint: String,
	pub client: Arc<HttpClient>,
}

#[derive(Debug, Deserialize)]
struct RankingResponse {
	#[serde(default)]
	ranking: Vec<RankedId>,
}

#[derive(Debug, Deserialize)]
struct RankedId {
	id: String,
	score: f64,
}

impl HttpReranker {
	async fn try_rerank(
		&self,
		query: &str,
		input: &[SearchResult],
		top_n: usize,
	) -> Option<Vec<SearchResult>> {
		let mut by_id: HashMap<&str, usize> = HashMap::with_capacity(input.len());
		let candidates: Vec<serde_json::Value> = input
			.iter()
			.enumerate()
			.map(|(at, result)| {
				by_id.insert(result.document.id.as_str(), at);

				serde_json::json!({ "id": result.document.id, "text": result.document.content })
			})
			.collect();
		let body = serde_json::json!({ "query": query, "candidates": candidates, "top_n": top_n });
		let request = self.client.post(&self.endpoint).json(&body).build().ok()?;
		let response = self.client.execute(request).await.ok()?;
		let parsed: RankingResponse = response.json().await.ok()?;

		if parsed.ranking.is_empty() {
			return None;
		}

		let mut out = Vec::with_capacity(parsed.ranking.len());

		for ranked in parsed.ranking {
			if let Some(at) = by_id.get(ranked.id.as_str()) {
				let mut result = input[*at].clone();

				result.score = ranked.score;
				out.push(result);
			}
		}

		stable_sort_desc(&mut out);

		Some(passthrough(out, top_n))
	}
}
#[async_trait]
impl Reranker for HttpReranker {
	async fn rerank(
		&self,
		query: &str,
		input: Vec<SearchResult>,
		top_n: usize,
	) -> Vec<SearchResult> {
		if self.endpoint.is_empty() {
			return passthrough(input, top_n);
		}

		match self.try_rerank(query, &input, top_n).await {
			Some(out) => out,
			None => {
				tracing::warn!("HTTP reranker degraded to passthrough.");

				passthrough(input, top_n)
			},
		}
	}
}

const LLM_RERANK_SYSTEM_PROMPT: &str = "You are an expert at evaluating document relevance for search queries.
Your task is to rate documents on a scale from 0 to 10 based on how well they answer the given query.

Guidelines:
- Score 0-2: Document is completely irrelevant
- Score 3-5: Document has some relevant information but doesn't directly answer the query
- Score 6-8: Document is relevant and partially answers the query
- Score 9-10: Document is highly relevant and directly answers the query

You MUST respond with ONLY a single integer score between 0 and 10. Do not include ANY other text.";

/// Scores each document 0-10 with an LLM.
///
/// A failed or unparseable call scores the document at ten times its
/// original score so it keeps a comparable position.
pub struct LlmReranker {
	llm: Arc<dyn LlmClient>,
	score_pattern: Regex,
}
impl LlmReranker {
	pub fn new(llm: Arc<dyn LlmClient>) -> Self {
		let score_pattern =
			Regex::new(r"\b(10|[0-9])\b").unwrap_or_else(|_| unreachable!("pattern is static"));

		Self { llm, score_pattern }
	}

	fn parse_score(&self, response: &str) -> Option<f64> {
		self.score_pattern
			.captures(response.trim())
			.and_then(|captures| captures.get(1))
			.and_then(|m| m.as_str().parse().ok())
	}
}
#[async_trait]
impl Reranker for LlmReranker {
	async fn rerank(
		&self,
		query: &str,
		input: Vec<SearchResult>,
		top_n: usize,
	) -> Vec<SearchResult> {
		let mut scored = Vec::with_capacity(input.len());

		for mut result in input {
			let prompt = format!(
				"{LLM_RERANK_SYSTEM_PROMPT}\n\nQuery: {query}\nDocument:\n{}\n\nRate this document's relevance to the query on a scale from 0 to 10:",
				result.document.content
			);

			result.score = match self.llm.complete(&prompt).await {
				Ok(response) => match self.parse_score(&response) {
					Some(score) => score,
					None => {
						tracing::warn!(
							response = %response.trim(),
							"Could not extract a rerank score, keeping scaled original.",
						);

						result.score * 10.0
					},
				},
				Err(err) => {
					tracing::warn!("LLM rerank call failed: {err}, keeping scaled original.");

					result.score * 10.0
				},
			};

			scored.push(result);
		}

		stable_sort_desc(&mut scored);

		passthrough(scored, top_n)
	}
}

/// Local lexical reranker.
///
/// Query tokens longer than `min_keyword_length` earn a document 0.1 for
/// presence, another 0.1 when the first occurrence falls in the first
/// quarter of the text, and up to 0.2 from occurrence frequency, on top of
/// the weighted original score.
pub struct KeywordReranker {
	pub min_keyword_length: usize,
	pub base_score_weight: f64,
}
impl Default for KeywordReranker {
	fn default() -> Self {
		Self { min_keyword_length: 3, base_score_weight: 0.5 }
	}
}
#[async_trait]
impl Reranker for KeywordReranker {
	async fn rerank(
		&self,
		query: &str,
		input: Vec<SearchResult>,
		top_n: usize,
	) -> Vec<SearchResult> {
		let min_len = if self.min_keyword_length == 0 { 3 } else { self.min_keyword_length };
		let base_weight =
			if self.base_score_weight == 0.0 { 0.5 } else { self.base_score_weight };
		let keywords: Vec<String> = query
			.split_whitespace()
			.filter(|word| word.len() > min_len)
			.map(str::to_lowercase)
			.collect();
		let mut scored = Vec::with_capacity(input.len());

		for mut result in input {
			let text = result.document.content.to_lowercase();
			let mut keyword_score = 0.0;

			for keyword in &keywords {
				if let Some(first) = text.find(keyword.as_str()) {
					keyword_score += 0.1;

					if first < text.len() / 4 {
						keyword_score += 0.1;
					}

					let frequency = text.matches(keyword.as_str()).count() as f64;

					keyword_score += (0.05 * frequency).min(0.2);
				}
			}

			result.score = result.score * base_weight + keyword_score;
			scored.push(result);
		}

		stable_sort_desc(&mut scored);

		passthrough(scored, top_n)
	}
}

/// Cross-encoder model service (BGE-reranker, Cohere rerank, ...):
/// request `{query, documents, model, top_n}`, response
/// `{results: [{index, relevance_score}]}`.
pub struct ModelReranker {
	pub endpoint: String,
	pub model: String,
	pub api_key: String,
	pub client: Arc<HttpClient>,
}

#[derive(Debug, Deserialize)]
struct ModelRankingResponse {
	#[serde(default)]
	results: Vec<ModelRankedIndex>,
}

#[derive(Debug, Deserialize)]
struct ModelRankedIndex {
	index: usize,
	relevance_score: f64,
}

impl ModelReranker {
	async fn try_rerank(
		&self,
		query: &str,
		input: &[SearchResult],
		top_n: usize,
	) -> Option<Vec<SearchResult>> {
		let documents: Vec<&str> =
			input.iter().map(|result| result.document.content.as_str()).collect();
		let body = serde_json::json!({
			"query": query,
			"documents": documents,
			"model": self.model,
			"top_n": top_n,
		});
		let mut builder = self.client.post(&self.endpoint).json(&body);

		if !self.api_key.is_empty() {
			builder = builder.header("Authorization", format!("Bearer {}", self.api_key));
		}

		let request = builder.build().ok()?;
		let response = self.client.execute(request).await.ok()?;

		if !response.status().is_success() {
			tracing::warn!(
				status = response.status().as_u16(),
				"Cross-encoder reranker returned an error status.",
			);

			return None;
		}

		let parsed: ModelRankingResponse = response.json().await.ok()?;

		if parsed.results.is_empty() {
			return None;
		}

		let mut out = Vec::with_capacity(parsed.results.len());

		for ranked in parsed.results {
			if let Some(original) = input.get(ranked.index) {
				let mut result = original.clone();

				result.score = ranked.relevance_score;
				out.push(result);
			}
		}

		stable_sort_desc(&mut out);

		Some(passthrough(out, top_n))
	}
}
#[async_trait]
impl Reranker for ModelReranker {
	async fn rerank(
		&self,
		query: &str,
		input: Vec<SearchResult>,
		top_n: usize,
	) -> Vec<SearchResult> {
		if self.endpoint.is_empty() {
			return passthrough(input, top_n);
		}

		match self.try_rerank(query, &input, top_n).await {
			Some(out) => out,
			None => {
				tracing::warn!("Cross-encoder reranker degraded to passthrough.");

				passthrough(input, top_n)
			},
		}
	}
}
