use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Root configuration for one pipeline deployment.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
	/// Version tag of the backing index, folded into the cache key.
	pub index_version: String,
	pub retrieval: RetrievalDefaults,
	pub providers: ProvidersConfig,
	pub pipeline: PipelineConfig,
}

/// Baseline knobs used where no profile has spoken yet.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct RetrievalDefaults {
	pub top_k: usize,
	pub threshold: f64,
}
impl Default for RetrievalDefaults {
	fn default() -> Self {
		Self { top_k: 10, threshold: 0.5 }
	}
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ProvidersConfig {
	pub embedding: Option<EmbeddingProviderConfig>,
	pub llm: Option<LlmProviderConfig>,
}

/// OpenAI-compatible embedding endpoint.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct EmbeddingProviderConfig {
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	pub default_headers: Map<String, Value>,
}

/// OpenAI-compatible chat-completion endpoint used by LLM-backed stages.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LlmProviderConfig {
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f64,
	pub timeout_ms: u64,
	pub default_headers: Map<String, Value>,
}

/// Pipeline stage toggles and per-component sub-configs.
///
/// Everything defaults to disabled so a bare config stays safe on the hot
/// path.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
	pub enable_pre: bool,
	pub enable_hybrid: bool,
	pub enable_post: bool,
	pub enable_crag: bool,

	/// RRF fusion constant; 0 means the default of 60.
	pub rrf_k: usize,

	pub fusion: Option<FusionConfig>,
	pub router: Option<RouterConfig>,
	pub pre_retrieve: Option<PreRetrieveConfig>,
	pub retrievers: Vec<RetrieverConfig>,
	pub retrieval_profiles: Vec<RetrievalProfile>,
	pub default_profile: String,
	pub post: Option<PostConfig>,
	pub crag: Option<CragConfig>,
	pub session: Option<SessionConfig>,
	pub http: Option<HttpClientConfig>,
	pub feedback: Option<FeedbackConfig>,
	pub cache: Option<CacheConfig>,
}

/// Registers one retrieval backend instance.
///
/// `kind` examples: `vector`, `bm25`, `path`, `web`.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RetrieverConfig {
	#[serde(rename = "type")]
	pub kind: String,
	pub provider: String,
	/// Backend-specific knobs, e.g. `endpoint`, `index`, `api_key`, `name`.
	pub params: HashMap<String, String>,
}

/// The strategy knob set applied to one query.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RetrievalProfile {
	pub name: String,
	pub intent: String,
	pub retrievers: Vec<String>,
	pub top_k: usize,
	pub threshold: f64,
	pub use_web: bool,
	pub latency_budget_ms: u64,
	/// Caps concurrent retriever fan-out for this profile; 0 means no cap.
	pub max_fanout: usize,
	/// Suppress web when the vector preflight top-1 score reaches this.
	pub vector_gate: f64,
	/// Force web when the vector preflight top-1 score falls below this.
	pub vector_low_gate: f64,
	pub force_web_on_low: bool,
	/// Per-retriever top-k cap; 0 means use `top_k`.
	pub per_retriever_top_k: usize,
	pub cascade: CascadeConfig,
	pub hyde: HydeConfig,
	/// Per-variant (`dense`/`sparse`/`web`/`hyde`) top-k budgets.
	pub variant_budgets: BTreeMap<String, usize>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CascadeConfig {
	pub enable: bool,
	pub latency_budget_ms: u64,
	pub stage1: CascadeStageConfig,
	pub stage2: CascadeStageConfig,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CascadeStageConfig {
	pub retriever: String,
	pub top_k: usize,
	/// `rescore` (intersect with stage 1) or `refine` (keep everything).
	pub mode: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct HydeConfig {
	pub enable: bool,
	/// `pre` (seeds come from the planner) or `http`.
	pub provider: String,
	pub endpoint: String,
	pub max_seeds: usize,
	pub timeout_ms: u64,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct FeedbackConfig {
	pub window: usize,
	pub thresholds: FeedbackThresholds,
	pub adjustments: FeedbackAdjustments,
	pub cooldown_seconds: u64,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct FeedbackThresholds {
	pub incorrect: usize,
	pub ambiguous: usize,
	pub confident: usize,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct FeedbackAdjustments {
	pub topk_step: usize,
	pub topk_max: usize,
	pub enable_force_web_on_low: bool,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
	pub l1: Option<CacheLayerConfig>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheLayerConfig {
	pub enable: bool,
	pub max_entries: usize,
	pub ttl_seconds: u64,
	/// Only `post` (cache the post-pipeline result list) is supported.
	pub mode: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PostConfig {
	pub rerank: RerankConfig,
	pub compress: CompressConfig,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RerankConfig {
	pub enable: bool,
	/// `http` (default), `llm`, `keyword`, or `model`.
	pub provider: String,
	pub endpoint: String,
	pub top_n: usize,
	pub model: String,
	pub api_key: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CompressConfig {
	pub enable: bool,
	/// `truncate` (default), `selective`, `summary`, `extraction`, or `http`.
	pub method: String,
	pub target_ratio: f64,
	pub endpoint: String,
	pub headers: HashMap<String, String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CragConfig {
	pub evaluator: EvaluatorConfig,
	/// `open` (default) keeps fused results when the evaluator fails;
	/// `closed` propagates the error.
	pub fail_mode: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct EvaluatorConfig {
	/// `http` or `llm`.
	pub provider: String,
	pub endpoint: String,
	pub correct: f64,
	pub incorrect: f64,
}

/// Session persistence for the planner's memory-intake stage.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
	/// Only `inmemory` is supported here.
	pub store: String,
	pub ttl_seconds: u64,
}

/// Common options for every outbound HTTP call.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpClientConfig {
	pub timeout_ms: u64,
	pub retry: usize,
	pub backoff_min_ms: u64,
	pub backoff_max_ms: u64,
	pub host_allowlist: Vec<String>,
	pub max_consecutive_failures: u32,
	pub circuit_open_seconds: u64,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct FusionConfig {
	/// `rrf` (default), `weighted`, `linear`, `distribution`, or `simple`.
	pub strategy: String,
	pub params: Map<String, Value>,
	/// Switches the pipeline to the learned strategy regardless of
	/// `strategy`.
	pub enable_learned: bool,
	pub fallback: String,
	pub weights_uri: String,
	pub timeout_ms: u64,
	/// Canary percentage in (0, 100); 0 or 100 means full rollout.
	pub traffic_percent: u32,
	pub refresh_seconds: u64,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RouterConfig {
	/// `rule` (default), `http`, or `hybrid`.
	pub provider: String,
	pub endpoint: String,
	pub enable: bool,
	pub rules: Vec<RouterRule>,
}

/// Intent-keyed routing overlay.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RouterRule {
	pub intent: String,
	pub profile: String,
	/// Variants to enable: `dense`, `sparse`, `web`, `hyde`.
	pub enable: Vec<String>,
	pub budgets: BTreeMap<String, usize>,
}

/// Pre-retrieve planner configuration; every stage can be disabled on its
/// own.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PreRetrieveConfig {
	pub service: PreServiceConfig,
	pub memory: MemoryIntakeConfig,
	pub alignment: AlignmentConfig,
	pub planning: PlanningConfig,
	pub expansion: ExpansionConfig,
	pub hyde: HydeStageConfig,
}

/// Optional external preprocessor endpoint.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PreServiceConfig {
	/// `http` or `grpc`; empty disables the external service.
	pub provider: String,
	pub endpoint: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct MemoryIntakeConfig {
	pub enabled: bool,
	pub last_n_rounds: usize,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AlignmentConfig {
	pub enabled: bool,
	pub resolve_pronouns: bool,
	pub normalize_time: bool,
	pub anchor_score_threshold: f64,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PlanningConfig {
	pub enabled: bool,
	pub enable_decomposition: bool,
	pub max_sub_queries: usize,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ExpansionConfig {
	pub enabled: bool,
	pub max_terms: usize,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct HydeStageConfig {
	pub enabled: bool,
	pub min_query_length: usize,
	pub generated_doc_length: usize,
	pub enable_perplexity_check: bool,
	pub enable_nli_guardrail: bool,
}
