use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use weir_domain::SearchResult;
use weir_providers::{HttpClient, llm::LlmClient};

/// Shrinks document content ahead of prompt assembly.
///
/// Compression never fails the pipeline: on any upstream error the original
/// content is kept, per document.
#[async_trait]
pub trait Compressor: Send + Sync {
	/// Compresses one text; returns the compressed text and the reduction
	/// percentage (clamped at zero).
	async fn compress(&self, text: &str, query: &str) -> (String, f64);

	async fn batch_compress(
		&self,
		results: Vec<SearchResult>,
		query: &str,
	) -> Vec<SearchResult> {
		let mut out = Vec::with_capacity(results.len());

		for mut result in results {
			let (compressed, _) = self.compress(&result.document.content, query).await;

			if !compressed.is_empty() {
				result.document.content = compressed;
			}

			out.push(result);
		}

		out
	}
}

/// Builds a compressor from the configured method.
///
/// Methods that need an LLM or an endpoint fall back to truncation when the
/// dependency is missing; unknown methods do the same.
pub fn new_compressor(
	method: &str,
	target_ratio: f64,
	llm: Option<Arc<dyn LlmClient>>,
	endpoint: &str,
	headers: HashMap<String, String>,
	client: Arc<HttpClient>,
) -> Arc<dyn Compressor> {
	let target_ratio = if target_ratio == 0.0 { 0.7 } else { target_ratio };
	let truncate = || Arc::new(TruncateCompressor { target_ratio }) as Arc<dyn Compressor>;

	match method.to_lowercase().as_str() {
		"http" | "llmlingua" | "llm-lingua" => {
			if endpoint.is_empty() {
				tracing::warn!("HTTP compression requires an endpoint, using truncate.");

				return truncate();
			}

			Arc::new(HttpCompressor {
				endpoint: endpoint.to_string(),
				headers,
				target_ratio,
				client,
			})
		},
		"selective" => match llm {
			Some(llm) => Arc::new(LlmCompressor::new(llm, CompressMode::Selective)),
			None => {
				tracing::warn!("Selective compression requires an LLM, using truncate.");

				truncate()
			},
		},
		"summary" => match llm {
			Some(llm) => Arc::new(LlmCompressor::new(llm, CompressMode::Summary)),
			None => {
				tracing::warn!("Summary compression requires an LLM, using truncate.");

				truncate()
			},
		},
		"extraction" => match llm {
			Some(llm) => Arc::new(LlmCompressor::new(llm, CompressMode::Extraction)),
			None => {
				tracing::warn!("Extraction compression requires an LLM, using truncate.");

				truncate()
			},
		},
		"truncate" | "" => truncate(),
		other => {
			tracing::warn!(method = other, "Unknown compression method, using truncate.");

			truncate()
		},
	}
}

/// Reduction percentage `(before - after) / before * 100`, never negative.
pub fn compression_ratio(original: &str, compressed: &str) -> f64 {
	if original.is_empty() {
		return 0.0;
	}

	let reduction =
		(original.len() as f64 - compressed.len() as f64) / original.len() as f64 * 100.0;

	reduction.max(0.0)
}

/// Keeps the first `len * target_ratio` whitespace tokens.
pub fn compress_text(text: &str, target_ratio: f64) -> String {
	if target_ratio <= 0.0 || target_ratio >= 1.0 {
		return text.to_string();
	}

	let tokens: Vec<&str> = text.split_whitespace().collect();

	if tokens.is_empty() {
		return text.to_string();
	}

	let keep = ((tokens.len() as f64 * target_ratio) as usize).max(1);

	if keep >= tokens.len() {
		return text.to_string();
	}

	tokens[..keep].join(" ")
}

/// Query-agnostic truncation to a target token ratio.
pub struct TruncateCompressor {
	pub target_ratio: f64,
}
#[async_trait]
impl Compressor for TruncateCompressor {
	async fn compress(&self, text: &str, _query: &str) -> (String, f64) {
		let compressed = compress_text(text, self.target_ratio);
		let ratio = compression_ratio(text, &compressed);

		(compressed, ratio)
	}
}

/// LLM compression flavor; each mode has its own system prompt.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CompressMode {
	/// Keep only the sentences relevant to the query, verbatim.
	Selective,
	/// Summarize the chunk around the query.
	Summary,
	/// Quote the exact relevant sentences, one per line.
	Extraction,
}
impl CompressMode {
	fn system_prompt(self) -> &'static str {
		match self {
			Self::Selective => {
				"You are an expert at information filtering.
Your task is to analyze a document chunk and extract ONLY the sentences or paragraphs that are directly relevant to the user's query. Remove all irrelevant content.

Your output should:
1. ONLY include text that helps answer the query
2. Preserve the exact wording of relevant sentences (do not paraphrase)
3. Maintain the original order of the text
4. Include ALL relevant content, even if it seems redundant
5. EXCLUDE any text that isn't relevant to the query

Format your response as plain text with no additional comments."
			},
			Self::Summary => {
				"You are an expert at summarization.
Your task is to create a concise summary of the provided chunk that focuses ONLY on information relevant to the user's query.

Your output should:
1. Be brief but comprehensive regarding query-relevant information
2. Focus exclusively on information related to the query
3. Omit irrelevant details
4. Be written in a neutral, factual tone

Format your response as plain text with no additional comments."
			},
			Self::Extraction => {
				"You are an expert at information extraction.
Your task is to extract ONLY the exact sentences from the document chunk that contain information relevant to answering the user's query.

Your output should:
1. Include ONLY direct quotes of relevant sentences from the original text
2. Preserve the original wording (do not modify the text)
3. Include ONLY sentences that directly relate to the query
4. Separate extracted sentences with newlines
5. Do not add any commentary or additional text

Format your response as plain text with no additional comments."
			},
		}
	}

	fn instruction(self) -> &'static str {
		match self {
			Self::Selective => "Extract only the content relevant to answering this query.",
			Self::Summary => {
				"Create a concise summary focusing only on information relevant to the query."
			},
			Self::Extraction => {
				"Extract only the exact sentences that are relevant to answering this query."
			},
		}
	}
}

/// LLM-backed compression (selective, summary, or extraction).
pub struct LlmCompressor {
	llm: Arc<dyn LlmClient>,
	mode: CompressMode,
}
impl LlmCompressor {
	pub fn new(llm: Arc<dyn LlmClient>, mode: CompressMode) -> Self {
		Self { llm, mode }
	}
}
#[async_trait]
impl Compressor for LlmCompressor {
	async fn compress(&self, text: &str, query: &str) -> (String, f64) {
		let prompt = format!(
			"{}\n\nQuery: {query}\n\nDocument Chunk:\n{text}\n\n{}",
			self.mode.system_prompt(),
			self.mode.instruction()
		);

		match self.llm.complete(&prompt).await {
			Ok(response) => {
				let compressed = response.trim();

				if compressed.is_empty() {
					tracing::warn!("Compression produced empty output, keeping original.");

					(text.to_string(), 0.0)
				} else {
					(compressed.to_string(), compression_ratio(text, compressed))
				}
			},
			Err(err) => {
				tracing::warn!("LLM compression failed: {err}, keeping original.");

				(text.to_string(), 0.0)
			},
		}
	}
}

/// External compression service (e.g. LLMLingua):
/// request `{query, target_ratio, documents: [{id, text, metadata}]}`,
/// response `{documents: [{id, text, metadata, score}]}`. Documents missing
/// from the response are dropped.
pub struct HttpCompressor {
	pub endpoint: String,
	pub headers: HashMap<String, String>,
	pub target_ratio: f64,
	pub client: Arc<HttpClient>,
}

#[derive(Debug, Deserialize)]
struct CompressResponse {
	#[serde(default)]
	documents: Vec<CompressedDocument>,
}

#[derive(Debug, Deserialize)]
struct CompressedDocument {
	id: String,
	#[serde(default)]
	text: String,
	#[serde(default)]
	metadata: Option<Map<String, Value>>,
	#[serde(default)]
	score: f64,
}

impl HttpCompressor {
	async fn try_batch(
		&self,
		results: &[SearchResult],
		query: &str,
	) -> Option<Vec<SearchResult>> {
		let mut by_id: HashMap<String, usize> = HashMap::with_capacity(results.len());
		let documents: Vec<Value> = results
			.iter()
			.enumerate()
			.map(|(at, result)| {
				let id = if result.document.id.is_empty() {
					format!("compress-{at}")
				} else {
					result.document.id.clone()
				};

				by_id.insert(id.clone(), at);

				serde_json::json!({
					"id": id,
					"text": result.document.content,
					"metadata": result.document.metadata,
				})
			})
			.collect();
		let body = serde_json::json!({
			"query": query,
			"target_ratio": self.target_ratio,
			"documents": documents,
		});
		let mut builder = self.client.post(&self.endpoint).json(&body);

		for (name, value) in &self.headers {
			builder = builder.header(name, value);
		}

		let request = builder.build().ok()?;
		let response = self.client.execute(request).await.ok()?;

		if !response.status().is_success() {
			tracing::warn!(
				status = response.status().as_u16(),
				"External compressor returned an error status.",
			);

			return None;
		}

		let parsed: CompressResponse = response.json().await.ok()?;

		if parsed.documents.is_empty() {
			return None;
		}

		let mut out = Vec::with_capacity(parsed.documents.len());

		for compressed in parsed.documents {
			let Some(at) = by_id.get(&compressed.id) else { continue };
			let mut result = results[*at].clone();

			if !compressed.text.is_empty() {
				result.document.content = compressed.text;
			}
			if let Some(metadata) = compressed.metadata {
				for (key, value) in metadata {
					result.document.metadata.insert(key, value);
				}
			}
			if compressed.score != 0.0 {
				result.score = compressed.score;
			}

			out.push(result);
		}

		if out.is_empty() { None } else { Some(out) }
	}
}
#[async_trait]
impl Compressor for HttpCompressor {
	async fn compress(&self, text: &str, query: &str) -> (String, f64) {
		if self.endpoint.is_empty() || text.is_empty() {
			return (text.to_string(), 0.0);
		}

		let single = vec![SearchResult::new(
			weir_domain::Document::new("compress-single", text),
			0.0,
		)];
		let compressed = self.batch_compress(single, query).await;
		let out = compressed
			.first()
			.map(|result| result.document.content.clone())
			.unwrap_or_default();

		if out.is_empty() {
			return (text.to_string(), 0.0);
		}

		let ratio = compression_ratio(text, &out);

		(out, ratio)
	}

	async fn batch_compress(
		&self,
		results: Vec<SearchResult>,
		query: &str,
	) -> Vec<SearchResult> {
		if self.endpoint.is_empty() || results.is_empty() {
			return results;
		}

		match self.try_batch(&results, query).await {
			Some(out) => out,
			None => {
				tracing::warn!("External compressor degraded to passthrough.");

				results
			},
		}
	}
}
