use async_trait::async_trait;
use weir_domain::SearchResult;

use crate::{FusionParams, FusionStrategy, Result, RetrieverResult, rrf::RrfStrategy};

/// Normalizes each input list's scores to `[0, 1]` before delegating to a
/// base strategy, so retrievers with wildly different score scales compare
/// fairly. A constant-score list normalizes to 1.0 everywhere.
pub struct DistributionStrategy {
	base: Box<dyn FusionStrategy>,
	name: String,
}
impl DistributionStrategy {
	pub fn new(base: Box<dyn FusionStrategy>) -> Self {
		let name = format!("distribution_{}", base.name());

		Self { base, name }
	}
}
impl Default for DistributionStrategy {
	fn default() -> Self {
		Self::new(Box::new(RrfStrategy::new(0)))
	}
}
#[async_trait]
impl FusionStrategy for DistributionStrategy {
	fn name(&self) -> &str {
		&self.name
	}

	async fn fuse(
		&self,
		inputs: &[RetrieverResult],
		params: &FusionParams,
	) -> Result<Vec<SearchResult>> {
		if inputs.is_empty() {
			return Ok(Vec::new());
		}

		let normalized: Vec<RetrieverResult> = inputs
			.iter()
			.filter(|input| !input.results.is_empty())
			.map(|input| {
				let mut normalized = input.clone();

				normalize_scores(&mut normalized.results);

				normalized
			})
			.collect();

		self.base.fuse(&normalized, params).await
	}
}

fn normalize_scores(results: &mut [SearchResult]) {
	let mut min = results[0].score;
	let mut max = results[0].score;

	for item in results.iter() {
		min = min.min(item.score);
		max = max.max(item.score);
	}

	let range = max - min;

	for item in results.iter_mut() {
		item.score = if range > 0.0 { (item.score - min) / range } else { 1.0 };
	}
}

#[cfg(test)]
mod tests {
	use weir_domain::Document;

	use super::*;
	use crate::simple::SimpleStrategy;

	fn input(retriever: &str, results: Vec<SearchResult>) -> RetrieverResult {
		RetrieverResult { retriever: retriever.to_string(), results, ..Default::default() }
	}

	fn result(id: &str, score: f64) -> SearchResult {
		SearchResult::new(Document::new(id, ""), score)
	}

	#[tokio::test]
	async fn scores_normalize_to_the_unit_interval() {
		// Simple max-merge exposes the normalized scores directly.
		let strategy = DistributionStrategy::new(Box::new(SimpleStrategy::new(0)));
		let inputs =
			vec![input("bm25", vec![result("a", 10.0), result("b", 5.0), result("c", 0.0)])];
		let fused =
			strategy.fuse(&inputs, &FusionParams::new()).await.expect("distribution never fails");
		let score_of = |id: &str| {
			fused.iter().find(|r| r.document.id == id).map(|r| r.score).expect("doc must exist")
		};

		assert!((score_of("a") - 1.0).abs() < 1e-12);
		assert!((score_of("b") - 0.5).abs() < 1e-12);
		assert!((score_of("c") - 0.0).abs() < 1e-12);
	}

	#[tokio::test]
	async fn constant_lists_normalize_to_one() {
		let strategy = DistributionStrategy::new(Box::new(SimpleStrategy::new(0)));
		let inputs = vec![input("bm25", vec![result("a", 7.0), result("b", 7.0)])];
		let fused =
			strategy.fuse(&inputs, &FusionParams::new()).await.expect("distribution never fails");

		assert!(fused.iter().all(|r| (r.score - 1.0).abs() < 1e-12));
	}

	#[test]
	fn name_reflects_the_base_strategy() {
		assert_eq!(DistributionStrategy::default().name(), "distribution_rrf");
	}
}
