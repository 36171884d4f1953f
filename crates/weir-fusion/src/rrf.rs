//! Reciprocal Rank Fusion.
//!
//! A document at 1-based rank `r` in one list contributes `1 / (k + r)`;
//! contributions are summed per document id, which naturally boosts
//! documents that several retrievers agree on. `k = 60` is the standard
//! constant from the literature.

use std::collections::HashMap;

use async_trait::async_trait;
use weir_domain::SearchResult;

use crate::{
	FusionParams, FusionStrategy, Result, RetrieverResult,
	types::{lookup_usize, sort_by_score_desc},
};

pub const DEFAULT_RRF_K: usize = 60;

pub struct RrfStrategy {
	k: usize,
}
impl RrfStrategy {
	pub fn new(k: usize) -> Self {
		Self { k: if k == 0 { DEFAULT_RRF_K } else { k } }
	}
}
#[async_trait]
impl FusionStrategy for RrfStrategy {
	fn name(&self) -> &str {
		"rrf"
	}

	async fn fuse(
		&self,
		inputs: &[RetrieverResult],
		params: &FusionParams,
	) -> Result<Vec<SearchResult>> {
		let k = match lookup_usize(params, "k") {
			0 => self.k,
			override_k => override_k,
		};
		let lists: Vec<&[SearchResult]> = inputs
			.iter()
			.filter(|input| !input.results.is_empty())
			.map(|input| input.results.as_slice())
			.collect();

		Ok(rrf_score(&lists, k))
	}
}

/// Computes RRF over ranked lists.
///
/// Documents with empty ids are dropped; the first occurrence of a document
/// supplies its content and metadata. Output is sorted by fused score
/// descending, ties keeping first-insertion order.
pub fn rrf_score(lists: &[&[SearchResult]], k: usize) -> Vec<SearchResult> {
	let k = if k == 0 { DEFAULT_RRF_K } else { k };
	let mut order: Vec<SearchResult> = Vec::new();
	let mut index: HashMap<String, usize> = HashMap::new();

	for list in lists {
		for (rank, item) in list.iter().enumerate() {
			let id = item.document.id.as_str();

			if id.is_empty() {
				continue;
			}

			let contribution = 1.0 / (k as f64 + rank as f64 + 1.0);

			match index.get(id) {
				Some(at) => order[*at].score += contribution,
				None => {
					index.insert(id.to_string(), order.len());
					order.push(SearchResult::new(item.document.clone(), contribution));
				},
			}
		}
	}

	sort_by_score_desc(&mut order);

	order
}
