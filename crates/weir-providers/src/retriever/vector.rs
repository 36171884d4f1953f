use std::sync::Arc;

use async_trait::async_trait;
use weir_domain::SearchResult;

use crate::{
	Result,
	embedding::Embedder,
	retriever::{Retriever, annotate},
	store::{SearchOptions, VectorStore},
};

/// Dense retrieval: embed the query, then search the vector store.
pub struct VectorRetriever {
	embedder: Arc<dyn Embedder>,
	store: Arc<dyn VectorStore>,
	default_top_k: usize,
	threshold: f64,
}
impl VectorRetriever {
	pub fn new(
		embedder: Arc<dyn Embedder>,
		store: Arc<dyn VectorStore>,
		default_top_k: usize,
		threshold: f64,
	) -> Self {
		Self { embedder, store, default_top_k, threshold }
	}
}
#[async_trait]
impl Retriever for VectorRetriever {
	fn kind(&self) -> &'static str {
		"vector"
	}

	async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>> {
		let top_k = if top_k > 0 {
			top_k
		} else if self.default_top_k > 0 {
			self.default_top_k
		} else {
			10
		};
		let vector = self.embedder.embed(query).await?;
		let options = SearchOptions { top_k, threshold: self.threshold };
		let mut results = self.store.search(&vector, &options).await?;

		annotate(&mut results, self.kind());

		Ok(results)
	}
}
