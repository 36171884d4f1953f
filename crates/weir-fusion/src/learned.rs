use std::{
	sync::{Arc, RwLock},
	time::Duration,
};

use async_trait::async_trait;
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use weir_domain::{SearchResult, fnv1a_32};

use crate::{
	FusionParams, FusionStrategy, Result, RetrieverResult,
	types::lookup_usize,
	weighted::WeightedStrategy,
	weights::{WeightSnapshot, WeightsLoader},
};

const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_millis(10);

/// Fusion with externally learned weights and graceful degradation.
///
/// Weights come from a [`WeightsLoader`] under a tight per-call timeout;
/// any failure falls back to the configured strategy. A canary rollout is
/// supported via `traffic_percent`: queries hash-split on
/// `fnv1a(query_id) mod 100` so the same query id lands on the same side
/// consistently.
pub struct LearnedStrategy {
	loader: Arc<WeightsLoader>,
	fallback: Box<dyn FusionStrategy>,
	timeout: Duration,
	metadata: RwLock<FusionParams>,
}
impl LearnedStrategy {
	pub fn new(
		loader: Arc<WeightsLoader>,
		fallback: Box<dyn FusionStrategy>,
		timeout: Duration,
	) -> Self {
		Self {
			loader,
			fallback,
			timeout: if timeout.is_zero() { DEFAULT_LOAD_TIMEOUT } else { timeout },
			metadata: RwLock::new(FusionParams::new()),
		}
	}

	fn should_activate(&self, params: &FusionParams, inputs: &[RetrieverResult]) -> bool {
		let percent = lookup_usize(params, "traffic_percent");

		if percent == 0 || percent >= 100 {
			return true;
		}

		let seed = params
			.get("query_id")
			.and_then(Value::as_str)
			.filter(|raw| !raw.is_empty())
			.or_else(|| params.get("query").and_then(Value::as_str).filter(|raw| !raw.is_empty()))
			.map(str::to_string)
			.or_else(|| inputs.first().map(|input| input.query.clone()));
		let Some(seed) = seed.filter(|seed| !seed.is_empty()) else { return true };

		((fnv1a_32(&seed) % 100) as usize) < percent
	}

	fn store_metadata(&self, snapshot: &WeightSnapshot) {
		let mut metadata = FusionParams::new();

		metadata.insert("weights_version".to_string(), Value::from(snapshot.version.clone()));
		metadata.insert("weights_bias".to_string(), Value::from(snapshot.bias));
		metadata.insert("weights_uri".to_string(), Value::from(self.loader.uri().to_string()));
		metadata.insert("strategy".to_string(), Value::from("learned"));

		if let Ok(fetched_at) = snapshot.fetched_at.format(&Rfc3339) {
			metadata.insert("fetched_at".to_string(), Value::from(fetched_at));
		}

		if let Ok(mut slot) = self.metadata.write() {
			*slot = metadata;
		}
	}
}
#[async_trait]
impl FusionStrategy for LearnedStrategy {
	fn name(&self) -> &str {
		"learned"
	}

	async fn fuse(
		&self,
		inputs: &[RetrieverResult],
		params: &FusionParams,
	) -> Result<Vec<SearchResult>> {
		if !self.should_activate(params, inputs) {
			tracing::info!("Learned fusion skipped by traffic control.");

			return self.fallback.fuse(inputs, params).await;
		}

		let timeout = match lookup_usize(params, "timeout_ms") {
			0 => self.timeout,
			ms => Duration::from_millis(ms as u64),
		};
		let snapshot = match tokio::time::timeout(timeout, self.loader.get()).await {
			Ok(Ok(snapshot)) => snapshot,
			Ok(Err(err)) => {
				tracing::warn!(
					fallback = self.fallback.name(),
					"Learned weights unavailable: {err}.",
				);

				return self.fallback.fuse(inputs, params).await;
			},
			Err(_) => {
				tracing::warn!(
					fallback = self.fallback.name(),
					"Learned weights load timed out.",
				);

				return self.fallback.fuse(inputs, params).await;
			},
		};
		let weighted = WeightedStrategy::new(snapshot.weights.clone());
		let mut results = match weighted.fuse(inputs, params).await {
			Ok(results) => results,
			Err(err) => {
				tracing::warn!(
					fallback = self.fallback.name(),
					"Weighted fusion failed: {err}.",
				);

				return self.fallback.fuse(inputs, params).await;
			},
		};

		if snapshot.bias != 0.0 {
			for result in &mut results {
				result.score += snapshot.bias;
			}
		}

		self.store_metadata(&snapshot);

		Ok(results)
	}

	fn metadata(&self) -> Option<FusionParams> {
		self.metadata.read().ok().map(|metadata| metadata.clone())
	}
}

#[cfg(test)]
mod tests {
	use std::env;

	use weir_domain::Document;

	use super::*;
	use crate::rrf::RrfStrategy;

	fn write_temp_weights(name: &str, contents: &str) -> std::path::PathBuf {
		let path = env::temp_dir().join(name);

		std::fs::write(&path, contents).expect("temp file must write");

		path
	}

	fn inputs() -> Vec<RetrieverResult> {
		vec![RetrieverResult {
			query: "test".to_string(),
			retriever: "vector".to_string(),
			results: vec![SearchResult::new(Document::new("a", ""), 1.0)],
			..Default::default()
		}]
	}

	fn learned_over(path: &std::path::Path) -> LearnedStrategy {
		let loader = Arc::new(
			WeightsLoader::new(path.to_string_lossy().to_string(), Duration::from_secs(60))
				.expect("loader must build"),
		);

		LearnedStrategy::new(loader, Box::new(RrfStrategy::new(60)), Duration::from_secs(1))
	}

	#[tokio::test]
	async fn applies_weights_and_bias_and_exposes_metadata() {
		let path = write_temp_weights(
			"weir_learned_ok.json",
			r#"{"version":"2024-06","weights":{"vector":2.0},"bias":0.1}"#,
		);
		let strategy = learned_over(&path);
		let results =
			strategy.fuse(&inputs(), &FusionParams::new()).await.expect("learned must fuse");

		assert!((results[0].score - 2.1).abs() < 1e-12);

		let metadata = strategy.metadata().expect("metadata must be populated");

		assert_eq!(metadata.get("weights_version").and_then(Value::as_str), Some("2024-06"));

		let _ = std::fs::remove_file(path);
	}

	#[tokio::test]
	async fn loader_failure_falls_back() {
		let loader = Arc::new(
			WeightsLoader::new("/nonexistent/weir-weights.json", Duration::from_secs(60))
				.expect("loader must build"),
		);
		let strategy =
			LearnedStrategy::new(loader, Box::new(RrfStrategy::new(60)), Duration::from_secs(1));
		let results =
			strategy.fuse(&inputs(), &FusionParams::new()).await.expect("fallback must fuse");

		// RRF output, not weighted: rank 1 of a single list.
		assert!((results[0].score - 1.0 / 61.0).abs() < 1e-12);
	}

	#[tokio::test]
	async fn canary_split_is_deterministic() {
		let path = write_temp_weights(
			"weir_learned_canary.json",
			r#"{"version":"v1","weights":{"vector":2.0}}"#,
		);
		let strategy = learned_over(&path);
		let mut params = FusionParams::new();

		params.insert("traffic_percent".to_string(), Value::from(50));
		params.insert("query_id".to_string(), Value::from("user-1"));

		let included = (fnv1a_32("user-1") % 100) < 50;
		let results = strategy.fuse(&inputs(), &params).await.expect("learned must fuse");

		if included {
			assert!((results[0].score - 2.0).abs() < 1e-12);
		} else {
			assert!((results[0].score - 1.0 / 61.0).abs() < 1e-12);
		}

		// The same id yields the same side every time.
		let again = strategy.fuse(&inputs(), &params).await.expect("learned must fuse");

		assert_eq!(results[0].score, again[0].score);

		let _ = std::fs::remove_file(path);
	}

	#[tokio::test]
	async fn full_rollout_ignores_the_hash() {
		let path = write_temp_weights(
			"weir_learned_full.json",
			r#"{"version":"v1","weights":{"vector":3.0}}"#,
		);
		let strategy = learned_over(&path);
		let mut params = FusionParams::new();

		params.insert("traffic_percent".to_string(), Value::from(100));
		params.insert("query_id".to_string(), Value::from("anyone"));

		let results = strategy.fuse(&inputs(), &params).await.expect("learned must fuse");

		assert!((results[0].score - 3.0).abs() < 1e-12);

		let _ = std::fs::remove_file(path);
	}
}
