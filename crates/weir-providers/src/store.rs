use async_trait::async_trait;
use weir_domain::SearchResult;

use crate::Result;

/// Options for one vector search call.
#[derive(Clone, Copy, Debug, Default)]
pub struct SearchOptions {
	pub top_k: usize,
	/// Minimum similarity score; results below it are not returned.
	pub threshold: f64,
}

/// A dense vector index.
///
/// The concrete backend lives outside this crate; implementations are
/// injected at pipeline assembly time.
#[async_trait]
pub trait VectorStore: Send + Sync {
	async fn search(&self, vector: &[f32], options: &SearchOptions) -> Result<Vec<SearchResult>>;
}
