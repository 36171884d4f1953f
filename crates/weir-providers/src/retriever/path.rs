use std::sync::Arc;

use async_trait::async_trait;
use weir_domain::SearchResult;

use crate::{
	Error, HttpClient, Result,
	retriever::{EsSearchResponse, Retriever, annotate, join_search_url, results_from_hits},
};

const DEFAULT_PATH_FIELD: &str = "know_path";

/// Sparse retrieval targeting a hierarchical path field.
///
/// Same backend as [`super::Bm25Retriever`] but boosts the designated path
/// field (2.0) and its metadata form (1.5) over plain content (0.5); at
/// least one clause must match.
pub struct PathRetriever {
	pub endpoint: String,
	pub index: String,
	pub client: Arc<HttpClient>,
	pub max_top_k: usize,
	/// Field holding the document path, e.g. `know_path` or `file_path`.
	pub path_field: String,
}
#[async_trait]
impl Retriever for PathRetriever {
	fn kind(&self) -> &'static str {
		"path"
	}

	async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>> {
		if self.endpoint.is_empty() || self.index.is_empty() {
			return Ok(Vec::new());
		}

		let mut top_k = if top_k > 0 { top_k } else { 10 };

		if self.max_top_k > 0 && self.max_top_k < top_k {
			top_k = self.max_top_k;
		}

		let path_field =
			if self.path_field.is_empty() { DEFAULT_PATH_FIELD } else { self.path_field.as_str() };
		let body = serde_json::json!({
			"size": top_k,
			"query": {
				"bool": {
					"should": [
						match_clause(path_field, query, 2.0),
						match_clause(&metadata_field(path_field), query, 1.5),
						match_clause("content", query, 0.5),
					],
					"minimum_should_match": 1,
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

fn match_clause(field: &str, query: &str, boost: f64) -> serde_json::Value {
	let mut inner = serde_json::Map::new();

	inner.insert(field.to_string(), serde_json::json!({ "query": query, "boost": boost }));

	serde_json::json!({ "match": inner })
}

fn metadata_field(field: &str) -> String {
	let field = field.trim();

	if field.is_empty() {
		return format!("metadata.{DEFAULT_PATH_FIELD}");
	}
	if field.starts_with("metadata.") {
		return field.to_string();
	}

	format!("metadata.{field}")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn metadata_field_is_prefixed_once() {
		assert_eq!(metadata_field("know_path"), "metadata.know_path");
		assert_eq!(metadata_field("metadata.know_path"), "metadata.know_path");
		assert_eq!(metadata_field(""), "metadata.know_path");
	}
}
