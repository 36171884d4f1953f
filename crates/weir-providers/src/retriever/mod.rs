//! Uniform retriever contract over heterogeneous search backends.

mod bm25;
mod path;
mod vector;
mod web;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use weir_domain::{Document, SearchResult};

use crate::Result;

pub use bm25::Bm25Retriever;
pub use path::PathRetriever;
pub use vector::VectorRetriever;
pub use web::{WebSearchRetriever, WebSearcher};

/// A ranked-search backend.
///
/// Implementations are long-lived, created once at startup, and stateless
/// per call. Every document they return carries
/// `metadata.retriever_type = kind()`.
#[async_trait]
pub trait Retriever: Send + Sync {
	/// Stable type key: `vector`, `bm25`, `path`, or `web`.
	fn kind(&self) -> &'static str;

	async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>>;
}

/// Stamps the retriever type onto every result.
pub fn annotate(results: &mut [SearchResult], kind: &str) {
	for result in results {
		result.document.set_retriever_type(kind);
	}
}

#[derive(Debug, Deserialize)]
pub(crate) struct EsSearchResponse {
	pub hits: EsHits,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EsHits {
	#[serde(default)]
	pub hits: Vec<EsHit>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EsHit {
	#[serde(rename = "_id")]
	pub id: String,
	#[serde(rename = "_score", default)]
	pub score: f64,
	#[serde(rename = "_source", default)]
	pub source: Map<String, Value>,
}

/// Converts Elasticsearch hits into search results.
///
/// `content` falls back to `title` when the source document has no content
/// field; the whole `_source` object becomes the document metadata.
pub(crate) fn results_from_hits(hits: Vec<EsHit>) -> Vec<SearchResult> {
	let mut out = Vec::with_capacity(hits.len());

	for hit in hits {
		let content = hit
			.source
			.get("content")
			.and_then(Value::as_str)
			.or_else(|| hit.source.get("title").and_then(Value::as_str))
			.unwrap_or_default()
			.to_string();
		let document =
			Document { id: hit.id, content, metadata: hit.source, ..Default::default() };

		out.push(SearchResult::new(document, hit.score));
	}

	out
}

pub(crate) fn join_search_url(endpoint: &str, index: &str) -> String {
	format!("{}/{}/_search", endpoint.trim_end_matches('/'), index)
}
