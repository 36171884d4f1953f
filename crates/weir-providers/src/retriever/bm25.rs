use std::sync::Arc;

use async_trait::async_trait;
use weir_domain::SearchResult;

use crate::{
	Error, HttpClient, Result,
	retriever::{EsSearchResponse, Retriever, annotate, join_search_url, results_from_hits},
};

/// Sparse retrieval over an Elasticsearch-style full-text index.
///
/// Issues a `multi_match` over content (boosted), title, and metadata
/// fields.
pub struct Bm25Retriever {
	pub endpoint: String,
	pub index: String,
	pub client: Arc<HttpClient>,
	/// Hard cap on the requested size; 0 means uncapped.
	pub max_top_k: usize,
}
#[async_trait]
impl Retriever for Bm25Retriever {
	fn kind(&self) -> &'static str {
		"bm25"
	}

	async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>> {
		if self.endpoint.is_empty() || self.index.is_empty() {
			return Ok(Vec::new());
		}

		let mut top_k = if top_k > 0 { top_k } else { 10 };

		if self.max_top_k > 0 && self.max_top_k < top_k {
			top_k = self.max_top_k;
		}

		let body = serde_json::json!({
			"size": top_k,
			"query": {
				"multi_match": {
					"query": query,
					"fields": ["content^2", "title", "metadata.*"],
				}
			}
		});
		let url = join_search_url(&self.endpoint, &self.index);
		let request = self.client.post(&url).json(&body).build()?;
		let response = self.client.execute(request).await?;

		if !response.status().is_success() {
			return Err(Error::UnexpectedStatus { status: response.status().as_u16(), url });
		}

		let parsed: EsSearchResponse = response.json().await?;
		let mut results = results_from_hits(parsed.hits.hits);

		annotate(&mut results, self.kind());

		Ok(results)
	}
}
