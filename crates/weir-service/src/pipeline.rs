//! The pipeline orchestrator: profile selection, routing, gating, cache,
//! planning, retrieval, post-processing, corrective evaluation, and the
//! per-query metrics record.

use std::{
	collections::HashMap,
	sync::{Arc, Mutex},
	time::{Duration, Instant},
};

use serde_json::Value;
use weir_config::{Config, RetrievalProfile};
use weir_domain::{CacheKeyParts, RetrievalMetrics, SearchResult, Verdict, cache_key};
use weir_fusion::FusionParams;
use weir_providers::{
	HttpClient,
	embedding::Embedder,
	hyde::HydeClient,
	llm::LlmClient,
	retriever::{
		Bm25Retriever, PathRetriever, Retriever, VectorRetriever, WebSearchRetriever, WebSearcher,
	},
	store::VectorStore,
};

use crate::{
	Error, Result,
	cache::ResultCache,
	crag::{
		ActionContext, Evaluator, HttpEvaluator, KnowledgeRefiner, LlmEvaluator, QueryRewriter,
		ambiguous_action, correct_action, extract_content, incorrect_action,
	},
	feedback::FeedbackManager,
	gating::GatingProvider,
	post::{Compressor, Reranker, new_compressor, new_reranker},
	pre::{InMemorySessionStore, PreRetrievePlanner, SessionStore},
	profile::ProfileProvider,
	retrieval::RetrievalProvider,
	router::{Router, new_router},
};

const DEFAULT_CACHE_CAPACITY: usize = 500;
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(120);
const CRAG_CONTEXT_LIMIT: usize = 5;

/// Assembles a [`Pipeline`] from configuration plus injected collaborators.
///
/// The embedding model, the vector store, and the LLM are external; tests
/// inject fakes for them or register whole retrievers directly.
pub struct PipelineBuilder {
	cfg: Config,
	embedder: Option<Arc<dyn Embedder>>,
	store: Option<Arc<dyn VectorStore>>,
	llm: Option<Arc<dyn LlmClient>>,
	extra_retrievers: Vec<(Vec<String>, Arc<dyn Retriever>)>,
	evaluator: Option<Arc<dyn Evaluator>>,
	reranker: Option<Arc<dyn Reranker>>,
	compressor: Option<Arc<dyn Compressor>>,
	web_searcher: Option<Arc<WebSearcher>>,
	session_store: Option<Arc<dyn SessionStore>>,
}
impl PipelineBuilder {
	pub fn new(cfg: Config) -> Self {
		Self {
			cfg,
			embedder: None,
			store: None,
			llm: None,
			extra_retrievers: Vec::new(),
			evaluator: None,
			reranker: None,
			compressor: None,
			web_searcher: None,
			session_store: None,
		}
	}

	pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
		self.embedder = Some(embedder);

		self
	}

	pub fn with_vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
		self.store = Some(store);

		self
	}

	pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
		self.llm = Some(llm);

		self
	}

	/// Registers a retriever under the given lookup keys.
	pub fn with_retriever(mut self, keys: &[&str], retriever: Arc<dyn Retriever>) -> Self {
		self.extra_retrievers
			.push((keys.iter().map(|key| key.to_lowercase()).collect(), retriever));

		self
	}

	pub fn with_evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
		self.evaluator = Some(evaluator);

		self
	}

	pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
		self.reranker = Some(reranker);

		self
	}

	pub fn with_compressor(mut self, compressor: Arc<dyn Compressor>) -> Self {
		self.compressor = Some(compressor);

		self
	}

	pub fn with_web_searcher(mut self, searcher: WebSearcher) -> Self {
		self.web_searcher = Some(Arc::new(searcher));

		self
	}

	pub fn with_session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
		self.session_store = Some(store);

		self
	}

	pub fn build(self) -> Result<Pipeline> {
		let cfg = self.cfg;
		let http = Arc::new(HttpClient::from_config(cfg.pipeline.http.as_ref())?);
		let mut retrievers: Vec<Arc<dyn Retriever>> = Vec::new();
		let mut retriever_map: HashMap<String, Arc<dyn Retriever>> = HashMap::new();
		let register =
			|map: &mut HashMap<String, Arc<dyn Retriever>>,
			 retriever: &Arc<dyn Retriever>,
			 keys: Vec<String>| {
				for key in keys {
					let key = key.trim().to_lowercase();

					if !key.is_empty() {
						map.insert(key, retriever.clone());
					}
				}
			};

		if let (Some(embedder), Some(store)) = (self.embedder, self.store) {
			let vector: Arc<dyn Retriever> = Arc::new(VectorRetriever::new(
				embedder,
				store,
				cfg.retrieval.top_k,
				cfg.retrieval.threshold,
			));

			retrievers.push(vector.clone());
			register(&mut retriever_map, &vector, vec!["vector".to_string()]);
		}

		let mut config_web_searcher = None;

		for rc in &cfg.pipeline.retrievers {
			let params = &rc.params;
			let max_top_k = params
				.get("top_k")
				.and_then(|raw| raw.parse().ok())
				.unwrap_or(0);
			let keys = vec![
				rc.kind.clone(),
				if rc.provider.is_empty() {
					String::new()
				} else {
					format!("{}:{}", rc.kind, rc.provider)
				},
				params.get("name").cloned().unwrap_or_default(),
			];

			match rc.kind.as_str() {
				"bm25" => {
					let retriever: Arc<dyn Retriever> = Arc::new(Bm25Retriever {
						endpoint: params.get("endpoint").cloned().unwrap_or_default(),
						index: params.get("index").cloned().unwrap_or_default(),
						client: http.clone(),
						max_top_k,
					});

					retrievers.push(retriever.clone());
					register(&mut retriever_map, &retriever, keys);
				},
				"path" => {
					let retriever: Arc<dyn Retriever> = Arc::new(PathRetriever {
						endpoint: params.get("endpoint").cloned().unwrap_or_default(),
						index: params.get("index").cloned().unwrap_or_default(),
						client: http.clone(),
						max_top_k,
						path_field: params.get("path_field").cloned().unwrap_or_default(),
					});

					retrievers.push(retriever.clone());
					register(&mut retriever_map, &retriever, keys);
				},
				"web" => {
					let searcher = WebSearcher {
						provider: rc.provider.clone(),
						endpoint: params.get("endpoint").cloned().unwrap_or_default(),
						api_key: params.get("api_key").cloned().unwrap_or_default(),
						client: http.clone(),
					};

					if config_web_searcher.is_none() {
						config_web_searcher = Some(Arc::new(WebSearcher {
							provider: rc.provider.clone(),
							endpoint: params.get("endpoint").cloned().unwrap_or_default(),
							api_key: params.get("api_key").cloned().unwrap_or_default(),
							client: http.clone(),
						}));
					}

					let retriever: Arc<dyn Retriever> =
						Arc::new(WebSearchRetriever::new(searcher, max_top_k));

					retrievers.push(retriever.clone());
					register(&mut retriever_map, &retriever, keys);
				},
				"vector" => {
					// Extra registration names for the built-in vector
					// retriever.
					if let Some(vector) = retriever_map.get("vector").cloned() {
						register(&mut retriever_map, &vector, keys);
					}
				},
				other => {
					tracing::warn!(kind = other, "Unknown retriever type ignored.");
				},
			}
		}

		for (keys, retriever) in self.extra_retrievers {
			retrievers.push(retriever.clone());
			register(&mut retriever_map, &retriever, keys);
		}

		let rrf_k = if cfg.pipeline.rrf_k == 0 { 60 } else { cfg.pipeline.rrf_k };
		let retrieval = RetrievalProvider::new(
			retrievers,
			retriever_map.clone(),
			rrf_k,
			HydeClient::new(http.clone()),
		);

		if let Some(fusion_cfg) = cfg.pipeline.fusion.as_ref() {
			let strategy_name = if fusion_cfg.enable_learned {
				"learned"
			} else if fusion_cfg.strategy.is_empty() {
				"rrf"
			} else {
				fusion_cfg.strategy.as_str()
			};
			let mut params: FusionParams = fusion_cfg.params.clone();

			if !fusion_cfg.weights_uri.is_empty() {
				params.insert("weights_uri".to_string(), Value::from(fusion_cfg.weights_uri.clone()));
			}
			if !fusion_cfg.fallback.is_empty() {
				params.insert("fallback".to_string(), Value::from(fusion_cfg.fallback.clone()));
			}
			if fusion_cfg.timeout_ms > 0 {
				params.insert("timeout_ms".to_string(), Value::from(fusion_cfg.timeout_ms));
			}
			if fusion_cfg.refresh_seconds > 0 {
				params
					.insert("refresh_seconds".to_string(), Value::from(fusion_cfg.refresh_seconds));
			}
			if fusion_cfg.traffic_percent > 0 {
				params
					.insert("traffic_percent".to_string(), Value::from(fusion_cfg.traffic_percent));
			}

			match weir_fusion::new_strategy(strategy_name, &params) {
				Ok((strategy, sanitized)) => {
					retrieval.set_fusion_strategy(Arc::from(strategy), sanitized);
				},
				Err(err) => {
					tracing::warn!("Fusion strategy init failed, keeping RRF: {err}.");
				},
			}
		}

		let feedback = cfg
			.pipeline
			.feedback
			.as_ref()
			.map(|feedback_cfg| Arc::new(FeedbackManager::new(feedback_cfg.clone())));
		let mut gating = GatingProvider::new(retriever_map.get("vector").cloned());

		if let (Some(manager), Some(feedback_cfg)) = (feedback.as_ref(), cfg.pipeline.feedback.as_ref())
		{
			gating = gating.with_feedback(manager.clone(), feedback_cfg.clone());
		}

		let router: Option<Box<dyn Router>> = cfg
			.pipeline
			.router
			.as_ref()
			.filter(|router_cfg| router_cfg.enable)
			.map(|router_cfg| new_router(router_cfg, http.clone()));
		let mut cache = None;
		let mut cache_mode = String::new();

		if let Some(cache_cfg) = cfg.pipeline.cache.as_ref()
			&& let Some(l1) = cache_cfg.l1.as_ref()
			&& l1.enable
		{
			let capacity = if l1.max_entries > 0 { l1.max_entries } else { DEFAULT_CACHE_CAPACITY };
			let ttl = if l1.ttl_seconds > 0 {
				Duration::from_secs(l1.ttl_seconds)
			} else {
				DEFAULT_CACHE_TTL
			};

			cache = Some(ResultCache::new(capacity, ttl));
			cache_mode = if l1.mode.is_empty() { "post".to_string() } else { l1.mode.clone() };

			if cache_mode != "post" {
				tracing::info!(mode = %cache_mode, "Unsupported cache mode, defaulting to post.");

				cache_mode = "post".to_string();
			}
		}

		let reranker = self.reranker.or_else(|| {
			cfg.pipeline
				.post
				.as_ref()
				.filter(|post| post.rerank.enable)
				.and_then(|post| new_reranker(&post.rerank, self.llm.clone(), http.clone()))
		});
		let compressor = self.compressor.or_else(|| {
			cfg.pipeline.post.as_ref().filter(|post| post.compress.enable).map(|post| {
				new_compressor(
					&post.compress.method,
					post.compress.target_ratio,
					self.llm.clone(),
					&post.compress.endpoint,
					post.compress.headers.clone(),
					http.clone(),
				)
			})
		});
		let evaluator = self.evaluator.or_else(|| {
			let crag = cfg.pipeline.crag.as_ref()?;

			match crag.evaluator.provider.as_str() {
				"http" if !crag.evaluator.endpoint.is_empty() => {
					Some(Arc::new(HttpEvaluator {
						endpoint: crag.evaluator.endpoint.clone(),
						client: http.clone(),
					}) as Arc<dyn Evaluator>)
				},
				"llm" => self.llm.clone().map(|llm| {
					Arc::new(LlmEvaluator::new(llm, crag.evaluator.correct, crag.evaluator.incorrect))
						as Arc<dyn Evaluator>
				}),
				_ => None,
			}
		});
		let (refiner, query_rewriter) = match (self.llm.as_ref(), cfg.pipeline.crag.as_ref()) {
			(Some(llm), Some(_)) => (
				Some(KnowledgeRefiner::new(llm.clone())),
				Some(QueryRewriter::new(llm.clone())),
			),
			_ => (None, None),
		};
		let web_searcher = self.web_searcher.or(config_web_searcher);
		let planner = if cfg.pipeline.enable_pre {
			cfg.pipeline.pre_retrieve.as_ref().map(|pre_cfg| {
				let sessions = self.session_store.unwrap_or_else(|| {
					Arc::new(InMemorySessionStore::new(pre_cfg.memory.last_n_rounds))
				});

				PreRetrievePlanner::new(pre_cfg.clone(), self.llm.clone(), sessions)
			})
		} else {
			None
		};
		let profile_provider = ProfileProvider::new(cfg.pipeline.retrieval_profiles.clone());

		Ok(Pipeline {
			index_version: cfg.index_version.clone(),
			cfg,
			profile_provider,
			retrieval,
			gating,
			router,
			reranker,
			compressor,
			evaluator,
			refiner,
			query_rewriter,
			web_searcher,
			feedback,
			cache,
			cache_mode,
			planner,
			fusion_version_seen: Mutex::new(String::new()),
		})
	}
}

/// Drives one query end-to-end across every pipeline stage.
pub struct Pipeline {
	cfg: Config,
	index_version: String,
	profile_provider: ProfileProvider,
	retrieval: RetrievalProvider,
	gating: GatingProvider,
	router: Option<Box<dyn Router>>,
	reranker: Option<Arc<dyn Reranker>>,
	compressor: Option<Arc<dyn Compressor>>,
	evaluator: Option<Arc<dyn Evaluator>>,
	refiner: Option<KnowledgeRefiner>,
	query_rewriter: Option<QueryRewriter>,
	web_searcher: Option<Arc<WebSearcher>>,
	feedback: Option<Arc<FeedbackManager>>,
	cache: Option<ResultCache>,
	cache_mode: String,
	planner: Option<PreRetrievePlanner>,
	fusion_version_seen: Mutex<String>,
}
impl Pipeline {
	pub fn builder(cfg: Config) -> PipelineBuilder {
		PipelineBuilder::new(cfg)
	}

	/// Runs the full pipeline for one query.
	///
	/// Returns the final ranked list; an empty list is the caller's signal
	/// to fall back to baseline search. Only a failing evaluator under
	/// `fail_mode = "closed"` surfaces as an error.
	pub async fn run(&self, query: &str) -> Result<Vec<SearchResult>> {
		self.run_with_session(query, "").await
	}

	pub async fn run_with_session(
		&self,
		query: &str,
		session_id: &str,
	) -> Result<Vec<SearchResult>> {
		let started = Instant::now();
		let mut metrics = RetrievalMetrics::new(uuid::Uuid::new_v4().to_string(), query);

		// Profile selection.
		let mut profile = self.profile_provider.select_default();
		let mut profile_source = "default";

		if !self.cfg.pipeline.default_profile.is_empty()
			&& let Some(selected) =
				self.profile_provider.select_by_name(&self.cfg.pipeline.default_profile)
		{
			profile = selected;
			profile_source = "default_profile";
		}

		profile = self.profile_provider.normalize(profile);

		// Router overlay.
		if let Some(router) = self.router.as_ref() {
			metrics.router_enabled = true;

			if let Some(router_cfg) = self.cfg.pipeline.router.as_ref() {
				metrics.router_provider = router_cfg.provider.clone();
			}

			match router.route(query).await {
				Ok(decision) => {
					metrics.router_profile = decision.profile_name.clone();
					metrics.router_variants = decision
						.variant_budgets
						.iter()
						.map(|(variant, budget)| (variant.clone(), budget.top_k))
						.collect();
					profile_source = "router";

					if !decision.profile_name.is_empty()
						&& let Some(selected) =
							self.profile_provider.select_by_name(&decision.profile_name)
					{
						profile = selected;
						profile_source = "router_profile";
					}

					profile = crate::router::apply_decision(&decision, profile);
					profile = self.profile_provider.normalize(profile);
				},
				Err(err) => {
					metrics.router_error = err.to_string();
				},
			}
		}

		// Gating.
		if profile.vector_gate > 0.0 || profile.vector_low_gate > 0.0 {
			metrics.gating_enabled = true;

			let decision = self.gating.evaluate(query, &profile, &mut metrics).await;

			if decision.should_suppress_web {
				metrics.add_skipped_retriever("web");
			}

			profile = self.gating.apply_decision(&decision, profile);
			profile = self.profile_provider.normalize(profile);
		}

		metrics.record_profile_selection(&profile.name, profile_source);

		if metrics.router_variants.is_empty() && !profile.variant_budgets.is_empty() {
			metrics.router_variants = profile.variant_budgets.clone();
		}

		// Cache probe.
		let cache_key = self.cache_key_for(query, &profile);

		if let (Some(cache), Some(key)) = (self.cache.as_ref(), cache_key.as_ref())
			&& let Some(cached) = cache.get(key)
		{
			tracing::info!(profile = %profile.name, "L1 cache hit.");
			metrics.success = true;
			metrics.total_latency_ms = started.elapsed().as_millis() as i64;
			metrics.emit();

			return Ok(cached);
		}

		// Pre-retrieve planning.
		let mut queries = vec![query.to_string()];
		let mut effective_query = query.to_string();

		if let Some(planner) = self.planner.as_ref() {
			let plan_started = Instant::now();
			let plan = planner.plan(query, session_id).await;

			metrics.pre_enabled = true;
			metrics.pre_latency_ms = plan_started.elapsed().as_millis() as i64;

			let dense = plan.dense_queries();

			if !dense.is_empty() {
				metrics.sub_queries_count = dense.len();
				queries = dense;
			}
			if !plan.aligned_query.is_empty() {
				effective_query = plan.aligned_query.clone();
			}
		}

		// Retrieval.
		let mut results = self.retrieval.retrieve(&queries, &profile, &mut metrics).await;

		// Fusion-weights version change purges the cache.
		if !metrics.fusion_weights_version.is_empty() {
			let mut seen =
				self.fusion_version_seen.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

			if *seen != metrics.fusion_weights_version {
				if let Some(cache) = self.cache.as_ref()
					&& !seen.is_empty()
				{
					tracing::info!(
						version = %metrics.fusion_weights_version,
						"Fusion weights changed, purging the result cache.",
					);
					cache.purge();
				}

				*seen = metrics.fusion_weights_version.clone();
			}
		}

		// Reranking.
		if !results.is_empty()
			&& self.cfg.pipeline.enable_post
			&& let Some(reranker) = self.reranker.as_ref()
			&& self.cfg.pipeline.post.as_ref().is_some_and(|post| post.rerank.enable)
		{
			let configured =
				self.cfg.pipeline.post.as_ref().map(|post| post.rerank.top_n).unwrap_or(0);
			let top_n = if configured == 0 || configured > results.len() {
				results.len()
			} else {
				configured
			};
			let reranked = reranker.rerank(&effective_query, results.clone(), top_n).await;

			if !reranked.is_empty() {
				results = reranked;
			}

			metrics.rerank_enabled = true;
			metrics.rerank_result_count = results.len();
		}

		// Compression.
		if !results.is_empty()
			&& self.cfg.pipeline.enable_post
			&& let Some(compressor) = self.compressor.as_ref()
			&& self.cfg.pipeline.post.as_ref().is_some_and(|post| post.compress.enable)
		{
			results = compressor.batch_compress(results, &effective_query).await;
			metrics.compress_enabled = true;
		}

		// Corrective evaluation.
		if !results.is_empty()
			&& self.cfg.pipeline.enable_crag
			&& let Some(evaluator) = self.evaluator.as_ref()
		{
			let context = extract_content(&results, CRAG_CONTEXT_LIMIT);

			match evaluator.evaluate(&effective_query, &context).await {
				Ok((score, verdict)) => {
					if let Some(feedback) = self.feedback.as_ref() {
						feedback.record(&profile.name, verdict, score);
					}

					let action_ctx = ActionContext {
						query: &effective_query,
						refiner: self.refiner.as_ref(),
						web_searcher: self.web_searcher.as_deref(),
						query_rewriter: self.query_rewriter.as_ref(),
					};

					results = match verdict {
						Verdict::Correct => correct_action(&action_ctx, results).await,
						Verdict::Incorrect => incorrect_action(&action_ctx).await,
						Verdict::Ambiguous | Verdict::Unknown => {
							ambiguous_action(&action_ctx, results, Vec::new()).await
						},
					};
					metrics.crag_enabled = true;
					metrics.crag_verdict = verdict.as_str().to_string();
				},
				Err(err) => {
					let fail_mode = self
						.cfg
						.pipeline
						.crag
						.as_ref()
						.map(|crag| crag.fail_mode.as_str())
						.unwrap_or("open");

					if fail_mode == "closed" {
						metrics.success = false;
						metrics.error_msg = err.to_string();
						metrics.total_latency_ms = started.elapsed().as_millis() as i64;
						metrics.emit();

						return Err(Error::evaluator(err.to_string()));
					}

					tracing::warn!("Evaluator failed in open mode, keeping fused results: {err}.");
					metrics.error_msg = err.to_string();
				},
			}
		}

		// Cache publish.
		if let (Some(cache), Some(key)) = (self.cache.as_ref(), cache_key)
			&& !results.is_empty()
		{
			cache.set(key, results.clone(), None);
		}

		metrics.success = !results.is_empty();
		metrics.total_latency_ms = started.elapsed().as_millis() as i64;
		metrics.emit();

		Ok(results)
	}

	fn cache_key_for(&self, query: &str, profile: &RetrievalProfile) -> Option<String> {
		if self.cache.is_none() || self.cache_mode != "post" {
			return None;
		}

		let rerank_top_n = self
			.cfg
			.pipeline
			.post
			.as_ref()
			.map(|post| post.rerank.top_n)
			.unwrap_or(0);
		let fusion_version = self
			.fusion_version_seen
			.lock()
			.map(|seen| seen.clone())
			.unwrap_or_default();

		Some(cache_key(&CacheKeyParts {
			query,
			profile_name: &profile.name,
			index_version: &self.index_version,
			top_k: profile.top_k,
			rerank_top_n,
			variant_budgets: &profile.variant_budgets,
			fusion_weights_version: &fusion_version,
		}))
	}
}
