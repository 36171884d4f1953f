use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use weir_domain::{META_RETRIEVER_PROVIDER, SearchResult};

use crate::{
	FusionParams, FusionStrategy, Result, RetrieverResult,
	types::{lookup_usize, sort_by_score_desc},
};

/// Max-merge fusion: each document keeps its highest score across lists.
///
/// Used as a convenience strategy and as a scale-preserving fallback.
pub struct SimpleStrategy {
	top_k: usize,
}
impl SimpleStrategy {
	pub fn new(top_k: usize) -> Self {
		Self { top_k }
	}
}
#[async_trait]
impl FusionStrategy for SimpleStrategy {
	fn name(&self) -> &str {
		"simple"
	}

	async fn fuse(
		&self,
		inputs: &[RetrieverResult],
		params: &FusionParams,
	) -> Result<Vec<SearchResult>> {
		if inputs.is_empty() {
			return Ok(Vec::new());
		}

		let mut top_k = self.top_k;

		for key in ["topk", "top_k"] {
			let value = lookup_usize(params, key);

			if value > 0 {
				top_k = value;
			}
		}

		let mut order: Vec<SearchResult> = Vec::new();
		let mut index: HashMap<String, usize> = HashMap::new();

		for input in inputs {
			for item in &input.results {
				if item.document.id.is_empty() {
					continue;
				}

				let mut candidate = item.clone();

				candidate.document.set_retriever_type(&input.retriever);

				if !input.provider.is_empty() {
					candidate.document.set_metadata(
						META_RETRIEVER_PROVIDER,
						Value::String(input.provider.clone()),
					);
				}

				match index.get(&candidate.document.id) {
					Some(at) => {
						if candidate.score > order[*at].score {
							order[*at] = candidate;
						}
					},
					None => {
						index.insert(candidate.document.id.clone(), order.len());
						order.push(candidate);
					},
				}
			}
		}

		sort_by_score_desc(&mut order);

		if top_k > 0 && order.len() > top_k {
			order.truncate(top_k);
		}

		Ok(order)
	}
}

#[cfg(test)]
mod tests {
	use weir_domain::Document;

	use super::*;

	fn input(retriever: &str, results: Vec<SearchResult>) -> RetrieverResult {
		RetrieverResult { retriever: retriever.to_string(), results, ..Default::default() }
	}

	fn result(id: &str, score: f64) -> SearchResult {
		SearchResult::new(Document::new(id, ""), score)
	}

	#[tokio::test]
	async fn keeps_the_highest_score_per_document() {
		let strategy = SimpleStrategy::new(0);
		let inputs = vec![
			input("vector", vec![result("shared", 0.4)]),
			input("bm25", vec![result("shared", 0.9)]),
		];
		let fused = strategy.fuse(&inputs, &FusionParams::new()).await.expect("simple never fails");

		assert_eq!(fused.len(), 1);
		assert!((fused[0].score - 0.9).abs() < 1e-12);
		assert_eq!(fused[0].document.retriever_type(), Some("bm25"));
	}

	#[tokio::test]
	async fn top_k_param_truncates_output() {
		let strategy = SimpleStrategy::new(0);
		let inputs =
			vec![input("vector", vec![result("a", 0.9), result("b", 0.8), result("c", 0.7)])];
		let mut params = FusionParams::new();

		params.insert("top_k".to_string(), Value::from(2));

		let fused = strategy.fuse(&inputs, &params).await.expect("simple never fails");

		assert_eq!(fused.len(), 2);
	}
}
