use std::{cmp::Ordering, collections::HashMap};

use async_trait::async_trait;
use serde_json::{Map, Value};
use weir_domain::SearchResult;

use crate::Result;

/// Strategy-specific parameters, as sanitized by the factory.
pub type FusionParams = Map<String, Value>;

/// The ranked output of a single retriever for one query.
#[derive(Clone, Debug, Default)]
pub struct RetrieverResult {
	/// Raw query string used for this retrieval call.
	pub query: String,
	/// Logical retriever key, e.g. `vector` or `bm25`.
	pub retriever: String,
	/// Optional identifier for the concrete backend instance.
	pub provider: String,
	pub results: Vec<SearchResult>,
	/// Per-retriever annotations (cascade stage, mode, ...).
	pub attributes: Map<String, Value>,
}

/// Merges multiple ranked lists into one.
///
/// Strategy output is strictly ordered by descending fused score with
/// unique document ids; documents with empty ids are dropped. Ties keep
/// insertion order, which makes fusion deterministic given the same inputs.
#[async_trait]
pub trait FusionStrategy: Send + Sync {
	fn name(&self) -> &str;

	async fn fuse(
		&self,
		inputs: &[RetrieverResult],
		params: &FusionParams,
	) -> Result<Vec<SearchResult>>;

	/// Runtime metadata (e.g. the active weights version); `None` for
	/// strategies without any.
	fn metadata(&self) -> Option<FusionParams> {
		None
	}
}

/// Stable sort by score descending; equal scores keep their current order.
pub(crate) fn sort_by_score_desc(results: &mut [SearchResult]) {
	results.sort_by(|a, b| cmp_score_desc(a.score, b.score));
}

pub(crate) fn cmp_score_desc(a: f64, b: f64) -> Ordering {
	match (a.is_nan(), b.is_nan()) {
		(true, true) => Ordering::Equal,
		(true, false) => Ordering::Greater,
		(false, true) => Ordering::Less,
		(false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
	}
}

pub(crate) fn lookup_usize(params: &FusionParams, key: &str) -> usize {
	match params.get(key) {
		Some(Value::Number(number)) => {
			number.as_u64().or_else(|| number.as_f64().map(|f| f as u64)).unwrap_or(0) as usize
		},
		Some(Value::String(raw)) => raw.parse().unwrap_or(0),
		_ => 0,
	}
}

pub(crate) fn lookup_str<'a>(params: &'a FusionParams, key: &str) -> Option<&'a str> {
	params.get(key).and_then(Value::as_str).filter(|raw| !raw.is_empty())
}

/// Parses a `{name: weight}` map; numeric strings are accepted.
pub(crate) fn parse_weight_map(value: Option<&Value>) -> Option<HashMap<String, f64>> {
	let object = value?.as_object()?;
	let mut out = HashMap::with_capacity(object.len());

	for (key, value) in object {
		if let Some(weight) = value_as_f64(value) {
			out.insert(key.clone(), weight);
		}
	}

	Some(out)
}

/// Parses a weight vector; numeric strings are accepted.
pub(crate) fn parse_weight_vec(value: Option<&Value>) -> Option<Vec<f64>> {
	let array = value?.as_array()?;

	Some(array.iter().filter_map(value_as_f64).collect())
}

fn value_as_f64(value: &Value) -> Option<f64> {
	match value {
		Value::Number(number) => number.as_f64(),
		Value::String(raw) => raw.parse().ok(),
		_ => None,
	}
}
