use std::collections::HashMap;

use async_trait::async_trait;
use weir_domain::SearchResult;

use crate::{
	FusionParams, FusionStrategy, Result, RetrieverResult,
	types::{parse_weight_vec, sort_by_score_desc},
};

/// Linear combination keyed by input index.
///
/// The weight vector is normalized so its entries sum to one; inputs past
/// the end of the vector weigh 1.0 before normalization.
pub struct LinearStrategy {
	weights: Vec<f64>,
}
impl LinearStrategy {
	pub fn new(weights: Vec<f64>) -> Self {
		Self { weights: if weights.is_empty() { vec![1.0] } else { weights } }
	}
}
#[async_trait]
impl FusionStrategy for LinearStrategy {
	fn name(&self) -> &str {
		"linear"
	}

	async fn fuse(
		&self,
		inputs: &[RetrieverResult],
		params: &FusionParams,
	) -> Result<Vec<SearchResult>> {
		if inputs.is_empty() {
			return Ok(Vec::new());
		}

		let weights = match parse_weight_vec(params.get("weights")) {
			Some(overrides) if !overrides.is_empty() => overrides,
			_ => self.weights.clone(),
		};
		let mut total: f64 = weights.iter().sum();

		if total == 0.0 {
			total = 1.0;
		}

		let mut order: Vec<SearchResult> = Vec::new();
		let mut index: HashMap<String, usize> = HashMap::new();

		for (list_index, input) in inputs.iter().enumerate() {
			if input.results.is_empty() {
				continue;
			}

			let weight = weights.get(list_index).copied().unwrap_or(1.0) / total;

			for item in &input.results {
				if item.document.id.is_empty() {
					continue;
				}

				let contribution = item.score * weight;

				match index.get(&item.document.id) {
					Some(at) => order[*at].score += contribution,
					None => {
						let mut document = item.document.clone();

						document.set_retriever_type(&input.retriever);
						index.insert(document.id.clone(), order.len());
						order.push(SearchResult::new(document, contribution));
					},
				}
			}
		}

		sort_by_score_desc(&mut order);

		Ok(order)
	}
}
