use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use weir_domain::{META_RETRIEVER_PROVIDER, SearchResult};

use crate::{
	FusionParams, FusionStrategy, Result, RetrieverResult,
	types::{lookup_str, parse_weight_map, sort_by_score_desc},
};

/// Score fusion with per-retriever weights.
///
/// Weight lookup order per input list: the retriever key, then
/// `retriever:provider`, then `list_<index>`, then 1.0. Contributions are
/// averaged per document by default; param `accumulate = "sum"` switches to
/// plain summation, which favors documents present in many strong lists.
pub struct WeightedStrategy {
	weights: HashMap<String, f64>,
}
impl WeightedStrategy {
	pub fn new(weights: HashMap<String, f64>) -> Self {
		Self { weights }
	}
}
#[async_trait]
impl FusionStrategy for WeightedStrategy {
	fn name(&self) -> &str {
		"weighted"
	}

	async fn fuse(
		&self,
		inputs: &[RetrieverResult],
		params: &FusionParams,
	) -> Result<Vec<SearchResult>> {
		if inputs.is_empty() {
			return Ok(Vec::new());
		}

		let mut weights = self.weights.clone();

		if let Some(overrides) = parse_weight_map(params.get("weights")) {
			weights.extend(overrides);
		}

		let sum_mode = lookup_str(params, "accumulate") == Some("sum");

		struct Agg {
			result: SearchResult,
			count: usize,
		}

		let mut order: Vec<Agg> = Vec::new();
		let mut index: HashMap<String, usize> = HashMap::new();

		for (list_index, input) in inputs.iter().enumerate() {
			if input.results.is_empty() {
				continue;
			}

			let weight = resolve_weight(&weights, input, list_index);

			for item in &input.results {
				if item.document.id.is_empty() {
					continue;
				}

				let contribution = item.score * weight;

				match index.get(&item.document.id) {
					Some(at) => {
						let entry = &mut order[*at];

						entry.result.score += contribution;
						entry.count += 1;
					},
					None => {
						let mut document = item.document.clone();

						document.set_retriever_type(&input.retriever);

						if !input.provider.is_empty() {
							document.set_metadata(
								META_RETRIEVER_PROVIDER,
								Value::String(input.provider.clone()),
							);
						}

						index.insert(document.id.clone(), order.len());
						order.push(Agg {
							result: SearchResult::new(document, contribution),
							count: 1,
						});
					},
				}
			}
		}

		let mut out: Vec<SearchResult> = order
			.into_iter()
			.map(|agg| {
				let mut result = agg.result;

				if !sum_mode && agg.count > 0 {
					result.score /= agg.count as f64;
				}

				result
			})
			.collect();

		sort_by_score_desc(&mut out);

		Ok(out)
	}
}

fn resolve_weight(weights: &HashMap<String, f64>, input: &RetrieverResult, index: usize) -> f64 {
	if let Some(weight) = weights.get(&input.retriever) {
		return *weight;
	}
	if !input.provider.is_empty()
		&& let Some(weight) = weights.get(&format!("{}:{}", input.retriever, input.provider))
	{
		return *weight;
	}
	if let Some(weight) = weights.get(&format!("list_{index}")) {
		return *weight;
	}

	1.0
}
