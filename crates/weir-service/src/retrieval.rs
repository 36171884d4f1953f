//! Retrieval orchestration: retriever selection, cascade or parallel
//! fan-out, and fusion.

use std::{
	collections::HashMap,
	sync::{Arc, RwLock},
	time::{Duration, Instant},
};

use serde_json::Value;
use tokio::task::JoinSet;
use weir_config::RetrievalProfile;
use weir_domain::{
	META_CASCADE_STAGE, RetrievalMetrics, RetrieverStats, SearchResult,
};
use weir_fusion::{FusionParams, FusionStrategy, RetrieverResult, RrfStrategy};
use weir_providers::{hyde::HydeClient, retriever::Retriever};

use crate::sort::stable_sort_desc;

const DEFAULT_FANOUT_TIMEOUT: Duration = Duration::from_millis(300);

struct FusionState {
	strategy: Arc<dyn FusionStrategy>,
	params: FusionParams,
}

/// Fans a query set out over the active retrievers and fuses the results.
///
/// Immutable after construction except for the fusion strategy, which is
/// replaced atomically behind a lock.
pub struct RetrievalProvider {
	retrievers: Vec<Arc<dyn Retriever>>,
	retriever_map: HashMap<String, Arc<dyn Retriever>>,
	rrf_k: usize,
	fusion: RwLock<FusionState>,
	hyde: HydeClient,
}
impl RetrievalProvider {
	pub fn new(
		retrievers: Vec<Arc<dyn Retriever>>,
		retriever_map: HashMap<String, Arc<dyn Retriever>>,
		rrf_k: usize,
		hyde: HydeClient,
	) -> Self {
		let rrf_k = if rrf_k == 0 { 60 } else { rrf_k };
		let mut params = FusionParams::new();

		params.insert("k".to_string(), Value::from(rrf_k));

		Self {
			retrievers,
			retriever_map,
			rrf_k,
			fusion: RwLock::new(FusionState {
				strategy: Arc::new(RrfStrategy::new(rrf_k)),
				params,
			}),
			hyde,
		}
	}

	/// Replaces the fusion strategy and its canonical params.
	pub fn set_fusion_strategy(&self, strategy: Arc<dyn FusionStrategy>, params: FusionParams) {
		if let Ok(mut state) = self.fusion.write() {
			state.strategy = strategy;
			state.params = params;
		}
	}

	/// Runs retrieval for one query set under the given profile.
	pub async fn retrieve(
		&self,
		queries: &[String],
		profile: &RetrievalProfile,
		metrics: &mut RetrievalMetrics,
	) -> Vec<SearchResult> {
		if self.retrievers.is_empty() {
			tracing::warn!("No retrievers available.");

			return Vec::new();
		}

		let active = self.select_retrievers(profile);

		if active.is_empty() {
			tracing::warn!("No active retrievers for profile.");

			return Vec::new();
		}

		metrics.retrievers_used = active.iter().map(|r| r.kind().to_string()).collect();

		let cascade = if profile.cascade.enable {
			self.run_cascade(queries, profile, metrics).await
		} else {
			None
		};
		let (inputs, raw_count) = match cascade {
			Some(inputs) => {
				let count = inputs.iter().map(|input| input.results.len()).sum();

				(inputs, count)
			},
			None => self.parallel_retrieve(queries, &active, profile, metrics).await,
		};

		metrics.total_retrieved = raw_count;

		let fused = self.fuse(&inputs, queries, profile, metrics).await;

		tracing::info!(total = raw_count, fused = fused.len(), "Retrieval complete.");

		fused
	}

	fn select_retrievers(&self, profile: &RetrievalProfile) -> Vec<Arc<dyn Retriever>> {
		if profile.retrievers.is_empty() {
			return self.retrievers.clone();
		}

		let mut selected: Vec<Arc<dyn Retriever>> = Vec::with_capacity(profile.retrievers.len());

		for key in &profile.retrievers {
			let Some(retriever) = self.find_retriever(key) else {
				tracing::warn!(key = %key, "Unknown retriever key skipped.");

				continue;
			};
			let duplicate = selected.iter().any(|existing| Arc::ptr_eq(existing, &retriever));

			if !duplicate {
				selected.push(retriever);
			}
		}

		selected
	}

	/// Looks a retriever up by exact key, then by the bare type before a
	/// `:provider` suffix, then by type match.
	fn find_retriever(&self, key: &str) -> Option<Arc<dyn Retriever>> {
		let key = key.trim().to_lowercase();

		if key.is_empty() {
			return None;
		}
		if let Some(retriever) = self.retriever_map.get(&key) {
			return Some(retriever.clone());
		}
		if let Some((base, _)) = key.split_once(':')
			&& let Some(retriever) = self.retriever_map.get(base)
		{
			return Some(retriever.clone());
		}

		self.retrievers.iter().find(|retriever| retriever.kind() == key).cloned()
	}

	/// Two-stage cascade; `None` means fall back to parallel fan-out.
	async fn run_cascade(
		&self,
		queries: &[String],
		profile: &RetrievalProfile,
		metrics: &mut RetrievalMetrics,
	) -> Option<Vec<RetrieverResult>> {
		let query = queries.first()?;
		let stage1_cfg = &profile.cascade.stage1;

		if stage1_cfg.retriever.is_empty() {
			tracing::warn!("Cascade enabled but stage1 retriever missing.");

			return None;
		}

		let Some(stage1) = self.find_retriever(&stage1_cfg.retriever) else {
			tracing::warn!(retriever = %stage1_cfg.retriever, "Cascade stage1 retriever not found.");

			return None;
		};
		let mut stage1_top_k = if stage1_cfg.top_k > 0 {
			stage1_cfg.top_k
		} else if profile.top_k > 0 {
			profile.top_k
		} else {
			10
		};

		if let Some(budget) = variant_top_k(profile, stage1.kind())
			&& budget > 0
		{
			stage1_top_k = budget;
		}

		let latency_budget = if profile.cascade.latency_budget_ms > 0 {
			profile.cascade.latency_budget_ms
		} else {
			profile.latency_budget_ms
		};
		let begin = Instant::now();

		// Seed queries: the original plus optional HYDE expansions.
		let mut seed_queries = vec![query.clone()];

		match self.hyde.generate_seeds(&profile.hyde, query).await {
			Ok(seeds) if !seeds.is_empty() => {
				metrics.add_retrieval_phase("hyde");

				let max_seeds =
					if profile.hyde.max_seeds > 0 { profile.hyde.max_seeds } else { seeds.len() };

				seed_queries.extend(seeds.into_iter().take(max_seeds));
			},
			Ok(_) => {},
			Err(err) => tracing::warn!("HYDE seed generation failed: {err}."),
		}

		metrics.add_retrieval_phase("cascade_stage1");

		let mut stage1_by_id: HashMap<String, SearchResult> = HashMap::new();

		for seed in &seed_queries {
			let start = Instant::now();

			match stage1.search(seed, stage1_top_k).await {
				Ok(results) => {
					metrics.add_retriever_stats(stats_of(
						stage1.kind(),
						&results,
						start.elapsed().as_millis() as i64,
					));

					for mut result in results {
						if result.document.id.is_empty() {
							continue;
						}

						result
							.document
							.set_metadata(META_CASCADE_STAGE, Value::from("stage1"));

						match stage1_by_id.get(&result.document.id) {
							Some(existing) if existing.score >= result.score => {},
							_ => {
								stage1_by_id.insert(result.document.id.clone(), result);
							},
						}
					}
				},
				Err(err) => {
					tracing::warn!(
						retriever = stage1.kind(),
						seed = %seed,
						"Cascade stage1 search failed: {err}.",
					);
				},
			}
		}

		if stage1_by_id.is_empty() {
			tracing::warn!("Cascade stage1 returned no documents.");

			return None;
		}

		let mut stage1_results: Vec<SearchResult> = stage1_by_id.values().cloned().collect();

		stable_sort_desc(&mut stage1_results);

		let mut stage1_attributes = serde_json::Map::new();

		stage1_attributes.insert("cascade_stage".to_string(), Value::from("stage1"));

		let stage1_input = RetrieverResult {
			query: query.clone(),
			retriever: stage1.kind().to_string(),
			results: stage1_results,
			attributes: stage1_attributes,
			..Default::default()
		};

		if latency_budget > 0 && begin.elapsed() >= Duration::from_millis(latency_budget) {
			tracing::warn!(budget_ms = latency_budget, "Cascade budget exhausted after stage1.");

			return Some(vec![stage1_input]);
		}

		let mut inputs = vec![stage1_input];
		let Some(stage2) = self.find_retriever(&profile.cascade.stage2.retriever) else {
			return Some(inputs);
		};

		metrics.add_retrieval_phase("cascade_stage2");

		let stage2_cfg = &profile.cascade.stage2;
		let mut stage2_top_k = if stage2_cfg.top_k > 0 {
			stage2_cfg.top_k
		} else if profile.top_k > 0 {
			profile.top_k
		} else {
			inputs[0].results.len().max(10)
		};

		if let Some(budget) = variant_top_k(profile, stage2.kind())
			&& budget > 0
		{
			stage2_top_k = budget;
		}

		let start = Instant::now();

		match stage2.search(query, stage2_top_k).await {
			Ok(results) => {
				metrics.add_retriever_stats(stats_of(
					stage2.kind(),
					&results,
					start.elapsed().as_millis() as i64,
				));

				let mode = if stage2_cfg.mode.is_empty() {
					"rescore".to_string()
				} else {
					stage2_cfg.mode.to_lowercase()
				};
				let stage2_results =
					filter_cascade_results(results, &stage1_by_id, &mode);

				if !stage2_results.is_empty() {
					let mut attributes = serde_json::Map::new();

					attributes.insert("cascade_stage".to_string(), Value::from("stage2"));
					attributes.insert("mode".to_string(), Value::from(mode));
					inputs.push(RetrieverResult {
						query: query.clone(),
						retriever: stage2.kind().to_string(),
						results: stage2_results,
						attributes,
						..Default::default()
					});
				}
			},
			Err(err) => {
				tracing::warn!(retriever = stage2.kind(), "Cascade stage2 failed: {err}.");
			},
		}

		Some(inputs)
	}

	/// Concurrent (query, retriever) fan-out.
	///
	/// `max_fanout` caps the total task count by truncating the query list;
	/// each task runs under a per-retriever timeout and a failed or
	/// timed-out task simply contributes no results.
	async fn parallel_retrieve(
		&self,
		queries: &[String],
		active: &[Arc<dyn Retriever>],
		profile: &RetrievalProfile,
		metrics: &mut RetrievalMetrics,
	) -> (Vec<RetrieverResult>, usize) {
		let mut queries: Vec<String> = queries.to_vec();

		if profile.max_fanout > 0 && queries.len() * active.len() > profile.max_fanout {
			let max_queries = (profile.max_fanout / active.len()).max(1);

			if queries.len() > max_queries {
				queries.truncate(max_queries);
				tracing::info!(
					queries = max_queries,
					max_fanout = profile.max_fanout,
					"Fan-out limited the query list.",
				);
			}
		}

		let per_retriever_k = if profile.per_retriever_top_k > 0 {
			profile.per_retriever_top_k
		} else {
			profile.top_k
		};
		let task_timeout = if profile.latency_budget_ms > 0 {
			Duration::from_millis((profile.latency_budget_ms / 3).max(50))
		} else {
			DEFAULT_FANOUT_TIMEOUT
		};
		let mut tasks: JoinSet<(String, String, i64, Option<Vec<SearchResult>>)> = JoinSet::new();

		for query in &queries {
			for retriever in active {
				let retriever = retriever.clone();
				let query = query.clone();
				let mut top_k = per_retriever_k;

				if let Some(budget) = variant_top_k(profile, retriever.kind())
					&& budget > 0
				{
					top_k = budget;
				}
				if top_k == 0 {
					top_k = if profile.top_k > 0 { profile.top_k } else { 10 };
				}

				tasks.spawn(async move {
					let kind = retriever.kind().to_string();
					let start = Instant::now();
					let outcome =
						tokio::time::timeout(task_timeout, retriever.search(&query, top_k)).await;
					let latency = start.elapsed().as_millis() as i64;

					match outcome {
						Ok(Ok(results)) => (kind, query, latency, Some(results)),
						Ok(Err(err)) => {
							tracing::warn!(retriever = %kind, query = %query, "Search failed: {err}.");

							(kind, query, latency, None)
						},
						Err(_) => {
							tracing::warn!(retriever = %kind, query = %query, "Search timed out.");

							(kind, query, latency, None)
						},
					}
				});
			}
		}

		let mut grouped: HashMap<String, RetrieverResult> = HashMap::new();
		let mut total = 0_usize;

		while let Some(joined) = tasks.join_next().await {
			let Ok((kind, query, latency, results)) = joined else { continue };
			let Some(results) = results else { continue };

			metrics.add_retriever_stats(stats_of(&kind, &results, latency));
			total += results.len();

			let entry = grouped.entry(kind.clone()).or_insert_with(|| RetrieverResult {
				query,
				retriever: kind,
				..Default::default()
			});

			entry.results.extend(results);
		}

		let mut inputs: Vec<RetrieverResult> = grouped.into_values().collect();

		// Stable input order keeps fusion deterministic across runs.
		inputs.sort_by(|a, b| a.retriever.cmp(&b.retriever));

		(inputs, total)
	}

	/// Fuses the grouped inputs, falling back to RRF on strategy failure,
	/// then applies the score threshold and truncates to `top_k`.
	async fn fuse(
		&self,
		inputs: &[RetrieverResult],
		queries: &[String],
		profile: &RetrievalProfile,
		metrics: &mut RetrievalMetrics,
	) -> Vec<SearchResult> {
		if inputs.iter().all(|input| input.results.is_empty()) {
			return Vec::new();
		}

		let (strategy, mut params) = {
			let state = self.fusion.read().unwrap_or_else(|poisoned| poisoned.into_inner());

			(state.strategy.clone(), state.params.clone())
		};

		params.insert("profile_top_k".to_string(), Value::from(profile.top_k));

		if let Some(query) = queries.first() {
			params.insert("query".to_string(), Value::from(query.clone()));
			params
				.entry("query_id".to_string())
				.or_insert_with(|| Value::from(query.clone()));
		}

		let start = Instant::now();
		let (mut fused, method) = match strategy.fuse(inputs, &params).await {
			Ok(fused) => (fused, strategy.name().to_string()),
			Err(err) => {
				tracing::warn!(
					strategy = strategy.name(),
					"Fusion failed: {err}, falling back to RRF.",
				);

				let fallback = RrfStrategy::new(self.rrf_k);
				let fused = fallback.fuse(inputs, &params).await.unwrap_or_default();

				(fused, fallback.name().to_string())
			},
		};
		let latency_ms = start.elapsed().as_millis() as i64;

		if profile.threshold > 0.0 {
			fused.retain(|result| result.score >= profile.threshold);
		}
		if profile.top_k > 0 && fused.len() > profile.top_k {
			fused.truncate(profile.top_k);
		}

		let weights_version = strategy
			.metadata()
			.and_then(|metadata| {
				metadata.get("weights_version").and_then(Value::as_str).map(str::to_string)
			})
			.unwrap_or_default();

		metrics.record_fusion(&method, fused.len(), latency_ms, &weights_version);

		fused
	}
}

fn stats_of(kind: &str, results: &[SearchResult], latency_ms: i64) -> RetrieverStats {
	let top_score = results.first().map(|result| result.score).unwrap_or_default();
	let avg_score = if results.is_empty() {
		0.0
	} else {
		results.iter().map(|result| result.score).sum::<f64>() / results.len() as f64
	};

	RetrieverStats {
		kind: kind.to_string(),
		latency_ms,
		result_count: results.len(),
		avg_score,
		top_score,
	}
}

/// Intersects stage-2 results with stage 1 (`rescore`) or keeps them all
/// (`refine`); either way they are stamped as stage 2.
fn filter_cascade_results(
	results: Vec<SearchResult>,
	stage1: &HashMap<String, SearchResult>,
	mode: &str,
) -> Vec<SearchResult> {
	let mut out = Vec::with_capacity(results.len());

	for mut result in results {
		if mode != "refine" {
			if result.document.id.is_empty() || !stage1.contains_key(&result.document.id) {
				continue;
			}
		}

		result.document.set_metadata(META_CASCADE_STAGE, Value::from("stage2"));
		out.push(result);
	}

	out
}

/// Maps a retriever type onto its variant budget key.
fn variant_key(kind: &str) -> &str {
	match kind {
		"vector" => "dense",
		"bm25" | "path" => "sparse",
		other => other,
	}
}

fn variant_top_k(profile: &RetrievalProfile, kind: &str) -> Option<usize> {
	if profile.variant_budgets.is_empty() {
		return None;
	}

	profile.variant_budgets.get(variant_key(&kind.to_lowercase())).copied()
}

#[cfg(test)]
mod tests {
	use weir_providers::{HttpClient, HttpOptions};
	use weir_testkit::{StaticRetriever, scored};

	use super::*;

	fn hyde() -> HydeClient {
		HydeClient::new(Arc::new(
			HttpClient::new(HttpOptions::default()).expect("client must build"),
		))
	}

	fn provider_with(
		entries: Vec<(&str, Arc<dyn Retriever>)>,
	) -> RetrievalProvider {
		let retrievers: Vec<Arc<dyn Retriever>> =
			entries.iter().map(|(_, retriever)| retriever.clone()).collect();
		let map: HashMap<String, Arc<dyn Retriever>> = entries
			.into_iter()
			.map(|(key, retriever)| (key.to_string(), retriever))
			.collect();

		RetrievalProvider::new(retrievers, map, 60, hyde())
	}

	fn base_profile() -> RetrievalProfile {
		RetrievalProfile {
			name: "test".to_string(),
			retrievers: vec!["vector".to_string(), "bm25".to_string()],
			top_k: 10,
			per_retriever_top_k: 10,
			threshold: 0.0,
			..Default::default()
		}
	}

	#[tokio::test]
	async fn fan_out_groups_results_by_retriever() {
		let provider = provider_with(vec![
			(
				"vector",
				Arc::new(StaticRetriever::new("vector", vec![scored("a", "", 0.9)])) as Arc<_>,
			),
			(
				"bm25",
				Arc::new(StaticRetriever::new("bm25", vec![scored("b", "", 3.0)])) as Arc<_>,
			),
		]);
		let mut metrics = RetrievalMetrics::new("q", "query");
		let results = provider
			.retrieve(&["query".to_string()], &base_profile(), &mut metrics)
			.await;

		assert_eq!(results.len(), 2);
		assert_eq!(metrics.retrievers_used.len(), 2);
		assert_eq!(metrics.total_retrieved, 2);
		assert!(metrics.retriever_metrics.contains_key("vector"));
		assert!(metrics.retriever_metrics.contains_key("bm25"));
		assert_eq!(metrics.fusion_method, "rrf");
	}

	#[tokio::test]
	async fn failing_retriever_contributes_nothing() {
		let provider = provider_with(vec![
			(
				"vector",
				Arc::new(StaticRetriever::new("vector", vec![scored("a", "", 0.9)])) as Arc<_>,
			),
			("bm25", Arc::new(StaticRetriever::failing("bm25")) as Arc<_>),
		]);
		let mut metrics = RetrievalMetrics::new("q", "query");
		let results = provider
			.retrieve(&["query".to_string()], &base_profile(), &mut metrics)
			.await;

		assert_eq!(results.len(), 1);
		assert_eq!(results[0].document.id, "a");
	}

	#[tokio::test]
	async fn unknown_keys_are_skipped_silently() {
		let provider = provider_with(vec![(
			"vector",
			Arc::new(StaticRetriever::new("vector", vec![scored("a", "", 0.9)])) as Arc<_>,
		)]);
		let mut profile = base_profile();

		profile.retrievers = vec!["vector".to_string(), "graph".to_string()];

		let mut metrics = RetrievalMetrics::new("q", "query");
		let results = provider
			.retrieve(&["query".to_string()], &profile, &mut metrics)
			.await;

		assert_eq!(metrics.retrievers_used, vec!["vector".to_string()]);
		assert_eq!(results.len(), 1);
	}

	#[tokio::test]
	async fn compound_keys_resolve_to_the_bare_type() {
		let provider = provider_with(vec![(
			"vector",
			Arc::new(StaticRetriever::new("vector", vec![scored("a", "", 0.9)])) as Arc<_>,
		)]);
		let mut profile = base_profile();

		profile.retrievers = vec!["vector:milvus".to_string()];

		let mut metrics = RetrievalMetrics::new("q", "query");
		let results = provider
			.retrieve(&["query".to_string()], &profile, &mut metrics)
			.await;

		assert_eq!(results.len(), 1);
	}

	#[tokio::test]
	async fn max_fanout_truncates_the_query_list() {
		let vector = Arc::new(StaticRetriever::new("vector", vec![scored("a", "", 0.9)]));
		let provider = provider_with(vec![("vector", vector.clone() as Arc<_>)]);
		let mut profile = base_profile();

		profile.retrievers = vec!["vector".to_string()];
		profile.max_fanout = 2;

		let queries: Vec<String> =
			(0..5).map(|at| format!("query {at}")).collect();
		let mut metrics = RetrievalMetrics::new("q", "query");
		let _ = provider.retrieve(&queries, &profile, &mut metrics).await;

		// max_fanout 2 over one retriever allows two queries.
		assert_eq!(vector.calls(), 2);
	}

	#[tokio::test]
	async fn variant_budgets_cap_per_retriever_top_k() {
		let vector = Arc::new(StaticRetriever::new(
			"vector",
			vec![scored("a", "", 0.9), scored("b", "", 0.8), scored("c", "", 0.7)],
		));
		let provider = provider_with(vec![("vector", vector as Arc<_>)]);
		let mut profile = base_profile();

		profile.retrievers = vec!["vector".to_string()];
		profile.variant_budgets.insert("dense".to_string(), 1);

		let mut metrics = RetrievalMetrics::new("q", "query");
		let results = provider
			.retrieve(&["query".to_string()], &profile, &mut metrics)
			.await;

		assert_eq!(results.len(), 1);
	}

	#[tokio::test]
	async fn threshold_and_top_k_shape_the_fused_output() {
		let provider = provider_with(vec![(
			"vector",
			Arc::new(StaticRetriever::new(
				"vector",
				vec![scored("a", "", 0.9), scored("b", "", 0.8), scored("c", "", 0.7)],
			)) as Arc<_>,
		)]);
		let mut profile = base_profile();

		profile.retrievers = vec!["vector".to_string()];
		// RRF scores for ranks 1..3 at k=60: ~0.0164, ~0.0161, ~0.0159.
		profile.threshold = 0.016;
		profile.top_k = 1;

		let mut metrics = RetrievalMetrics::new("q", "query");
		let results = provider
			.retrieve(&["query".to_string()], &profile, &mut metrics)
			.await;

		assert_eq!(results.len(), 1);
		assert_eq!(results[0].document.id, "a");
	}

	#[tokio::test]
	async fn cascade_rescore_intersects_with_stage1() {
		let stage1 = Arc::new(StaticRetriever::new(
			"bm25",
			vec![scored("a", "", 3.0), scored("b", "", 2.0)],
		));
		let stage2 = Arc::new(StaticRetriever::new(
			"vector",
			vec![scored("b", "", 0.9), scored("z", "", 0.8)],
		));
		let provider = provider_with(vec![
			("bm25", stage1 as Arc<_>),
			("vector", stage2 as Arc<_>),
		]);
		let mut profile = base_profile();

		profile.cascade.enable = true;
		profile.cascade.stage1.retriever = "bm25".to_string();
		profile.cascade.stage1.top_k = 10;
		profile.cascade.stage2.retriever = "vector".to_string();
		profile.cascade.stage2.mode = "rescore".to_string();

		let mut metrics = RetrievalMetrics::new("q", "query");
		let results = provider
			.retrieve(&["query".to_string()], &profile, &mut metrics)
			.await;

		// Stage 2 contributes only the intersection ("b"); "z" is dropped.
		assert!(results.iter().all(|result| result.document.id != "z"));
		assert!(metrics.retrieval_phases.contains(&"cascade_stage1".to_string()));
		assert!(metrics.retrieval_phases.contains(&"cascade_stage2".to_string()));

		let stage2_doc = results
			.iter()
			.find(|result| result.document.id == "b")
			.expect("intersection must survive");

		assert_eq!(
			stage2_doc.document.metadata.get(META_CASCADE_STAGE).and_then(Value::as_str),
			Some("stage2")
		);
	}

	#[tokio::test]
	async fn cascade_refine_keeps_stage2_results() {
		let stage1 = Arc::new(StaticRetriever::new("bm25", vec![scored("a", "", 3.0)]));
		let stage2 = Arc::new(StaticRetriever::new("vector", vec![scored("z", "", 0.8)]));
		let provider = provider_with(vec![
			("bm25", stage1 as Arc<_>),
			("vector", stage2 as Arc<_>),
		]);
		let mut profile = base_profile();

		profile.cascade.enable = true;
		profile.cascade.stage1.retriever = "bm25".to_string();
		profile.cascade.stage2.retriever = "vector".to_string();
		profile.cascade.stage2.mode = "refine".to_string();

		let mut metrics = RetrievalMetrics::new("q", "query");
		let results = provider
			.retrieve(&["query".to_string()], &profile, &mut metrics)
			.await;

		assert!(results.iter().any(|result| result.document.id == "z"));
	}

	#[tokio::test]
	async fn cascade_without_stage1_falls_back_to_fanout() {
		let vector = Arc::new(StaticRetriever::new("vector", vec![scored("a", "", 0.9)]));
		let provider = provider_with(vec![("vector", vector as Arc<_>)]);
		let mut profile = base_profile();

		profile.retrievers = vec!["vector".to_string()];
		profile.cascade.enable = true;

		let mut metrics = RetrievalMetrics::new("q", "query");
		let results = provider
			.retrieve(&["query".to_string()], &profile, &mut metrics)
			.await;

		assert_eq!(results.len(), 1);
	}
}
