//! Deterministic in-process fakes for pipeline tests.
//!
//! Everything here is synchronous under the hood and safe to share across
//! tasks; tests construct fixed result sets and assert on the exact output
//! of the pipeline stages.

use std::sync::{
	Mutex,
	atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use weir_domain::{Document, SearchResult};
use weir_providers::{
	Error, Result,
	embedding::Embedder,
	llm::LlmClient,
	retriever::{Retriever, annotate},
	store::{SearchOptions, VectorStore},
};

/// Builds a document with content derived from the id.
pub fn doc(id: &str, content: &str) -> Document {
	Document::new(id, content)
}

/// Builds a scored search result.
pub fn scored(id: &str, content: &str, score: f64) -> SearchResult {
	SearchResult::new(Document::new(id, content), score)
}

/// An embedder that returns the same vector for every input.
pub struct StaticEmbedder {
	vector: Vec<f32>,
}
impl StaticEmbedder {
	pub fn new(vector: Vec<f32>) -> Self {
		Self { vector }
	}
}
#[async_trait]
impl Embedder for StaticEmbedder {
	async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
		Ok(self.vector.clone())
	}
}

/// A vector store over a fixed corpus, scored by dot product.
pub struct InMemoryVectorStore {
	entries: Vec<(Document, Vec<f32>)>,
}
impl InMemoryVectorStore {
	pub fn new(entries: Vec<(Document, Vec<f32>)>) -> Self {
		Self { entries }
	}
}
#[async_trait]
impl VectorStore for InMemoryVectorStore {
	async fn search(&self, vector: &[f32], options: &SearchOptions) -> Result<Vec<SearchResult>> {
		let mut results: Vec<SearchResult> = self
			.entries
			.iter()
			.map(|(document, embedding)| {
				let score = embedding
					.iter()
					.zip(vector)
					.map(|(a, b)| f64::from(*a) * f64::from(*b))
					.sum();

				SearchResult::new(document.clone(), score)
			})
			.filter(|result| result.score >= options.threshold)
			.collect();

		results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

		if options.top_k > 0 && results.len() > options.top_k {
			results.truncate(options.top_k);
		}

		Ok(results)
	}
}

/// A retriever that serves a fixed ranked list and counts its calls.
pub struct StaticRetriever {
	kind: &'static str,
	results: Vec<SearchResult>,
	fail: bool,
	calls: AtomicUsize,
}
impl StaticRetriever {
	pub fn new(kind: &'static str, results: Vec<SearchResult>) -> Self {
		Self { kind, results, fail: false, calls: AtomicUsize::new(0) }
	}

	/// A retriever whose every search fails.
	pub fn failing(kind: &'static str) -> Self {
		Self { kind, results: Vec::new(), fail: true, calls: AtomicUsize::new(0) }
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}
#[async_trait]
impl Retriever for StaticRetriever {
	fn kind(&self) -> &'static str {
		self.kind
	}

	async fn search(&self, _query: &str, top_k: usize) -> Result<Vec<SearchResult>> {
		self.calls.fetch_add(1, Ordering::SeqCst);

		if self.fail {
			return Err(Error::not_configured("static retriever configured to fail"));
		}

		let mut results = self.results.clone();

		if top_k > 0 && results.len() > top_k {
			results.truncate(top_k);
		}

		annotate(&mut results, self.kind);

		Ok(results)
	}
}

/// An LLM that replays scripted responses in order, repeating the last one.
pub struct ScriptedLlm {
	responses: Mutex<Vec<String>>,
	cursor: AtomicUsize,
	calls: AtomicUsize,
}
impl ScriptedLlm {
	pub fn new(responses: Vec<&str>) -> Self {
		Self {
			responses: Mutex::new(responses.into_iter().map(str::to_string).collect()),
			cursor: AtomicUsize::new(0),
			calls: AtomicUsize::new(0),
		}
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}
#[async_trait]
impl LlmClient for ScriptedLlm {
	async fn complete(&self, _prompt: &str) -> Result<String> {
		self.calls.fetch_add(1, Ordering::SeqCst);

		let responses = self.responses.lock().unwrap_or_else(|err| err.into_inner());

		if responses.is_empty() {
			return Err(Error::not_configured("scripted llm has no responses"));
		}

		let at = self.cursor.fetch_add(1, Ordering::SeqCst).min(responses.len() - 1);

		Ok(responses[at].clone())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn static_retriever_truncates_and_annotates() {
		let retriever = StaticRetriever::new(
			"vector",
			vec![scored("a", "", 0.9), scored("b", "", 0.8), scored("c", "", 0.7)],
		);
		let results = retriever.search("q", 2).await.expect("static search succeeds");

		assert_eq!(results.len(), 2);
		assert!(results.iter().all(|r| r.document.retriever_type() == Some("vector")));
		assert_eq!(retriever.calls(), 1);
	}

	#[tokio::test]
	async fn in_memory_store_ranks_by_dot_product() {
		let store = InMemoryVectorStore::new(vec![
			(doc("near", "near"), vec![1.0, 0.0]),
			(doc("far", "far"), vec![0.0, 1.0]),
		]);
		let results = store
			.search(&[1.0, 0.1], &SearchOptions { top_k: 2, threshold: 0.0 })
			.await
			.expect("store search succeeds");

		assert_eq!(results[0].document.id, "near");
	}

	#[tokio::test]
	async fn scripted_llm_replays_in_order() {
		let llm = ScriptedLlm::new(vec!["first", "second"]);

		assert_eq!(llm.complete("x").await.expect("scripted llm answers"), "first");
		assert_eq!(llm.complete("x").await.expect("scripted llm answers"), "second");
		assert_eq!(llm.complete("x").await.expect("scripted llm answers"), "second");
	}
}
