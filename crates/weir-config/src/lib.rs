//! Configuration surface for the weir retrieval pipeline.
//!
//! Configuration is declarative TOML deserialized into [`Config`]. Loading
//! normalizes a few fields and then validates the whole tree; a config that
//! passes [`validate`] cannot produce input errors at query time.

mod error;
mod types;

use std::{collections::HashSet, fs, path::Path};

pub use error::{Error, Result};
pub use types::{
	AlignmentConfig, CacheConfig, CacheLayerConfig, CascadeConfig, CascadeStageConfig,
	CompressConfig, Config, CragConfig, EmbeddingProviderConfig, EvaluatorConfig, ExpansionConfig,
	FeedbackAdjustments, FeedbackConfig, FeedbackThresholds, FusionConfig, HttpClientConfig,
	HydeConfig, HydeStageConfig, LlmProviderConfig, MemoryIntakeConfig, PipelineConfig,
	PlanningConfig, PostConfig, PreRetrieveConfig, PreServiceConfig, ProvidersConfig, RerankConfig,
	RetrievalDefaults, RetrievalProfile, RetrieverConfig, RouterConfig, RouterRule, SessionConfig,
};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|source| Error::ReadConfig { path: path.to_path_buf(), source })?;
	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|source| Error::ParseConfig { path: path.to_path_buf(), source: source.into() })?;

	normalize(&mut cfg);
	validate(&cfg)?;

	Ok(cfg)
}

fn normalize(cfg: &mut Config) {
	if cfg.index_version.trim().is_empty() {
		cfg.index_version = "v1".to_string();
	}
	if cfg.pipeline.rrf_k == 0 {
		cfg.pipeline.rrf_k = 60;
	}

	for profile in &mut cfg.pipeline.retrieval_profiles {
		for key in &mut profile.retrievers {
			*key = normalize_key(key);
		}
	}
}

pub fn validate(cfg: &Config) -> Result<()> {
	validate_profiles(&cfg.pipeline)?;
	validate_retriever_references(&cfg.pipeline)?;
	validate_retrievers(&cfg.pipeline)?;
	validate_post(&cfg.pipeline)?;
	validate_crag(&cfg.pipeline)?;
	validate_fusion(&cfg.pipeline)?;
	validate_pre(&cfg.pipeline)?;
	validate_misc(&cfg.pipeline)?;

	Ok(())
}

fn validate_profiles(pipeline: &PipelineConfig) -> Result<()> {
	let mut seen = HashSet::new();

	for profile in &pipeline.retrieval_profiles {
		if profile.name.trim().is_empty() {
			return Err(Error::validation("Retrieval profile name must be non-empty."));
		}
		if !seen.insert(profile.name.to_lowercase()) {
			return Err(Error::validation(format!(
				"Duplicate retrieval profile name: {}.",
				profile.name
			)));
		}
		if !(0.0..=1.0).contains(&profile.threshold) {
			return Err(Error::validation(format!(
				"Profile {} threshold must be in [0, 1], got {}.",
				profile.name, profile.threshold
			)));
		}
		if !(0.0..=1.0).contains(&profile.vector_gate) {
			return Err(Error::validation(format!(
				"Profile {} vector_gate must be in [0, 1], got {}.",
				profile.name, profile.vector_gate
			)));
		}
		if !(0.0..=1.0).contains(&profile.vector_low_gate) {
			return Err(Error::validation(format!(
				"Profile {} vector_low_gate must be in [0, 1], got {}.",
				profile.name, profile.vector_low_gate
			)));
		}
		if profile.vector_gate > 0.0
			&& profile.vector_low_gate > 0.0
			&& profile.vector_low_gate >= profile.vector_gate
		{
			return Err(Error::validation(format!(
				"Profile {} vector_low_gate ({}) must be less than vector_gate ({}).",
				profile.name, profile.vector_low_gate, profile.vector_gate
			)));
		}
		if profile.cascade.enable && profile.cascade.stage1.retriever.trim().is_empty() {
			return Err(Error::validation(format!(
				"Profile {} cascade requires a stage1 retriever.",
				profile.name
			)));
		}
	}

	Ok(())
}

fn validate_retriever_references(pipeline: &PipelineConfig) -> Result<()> {
	// The vector retriever is always wired from the embedding + store pair.
	let mut allowed: HashSet<String> = HashSet::from(["vector".to_string()]);

	for retriever in &pipeline.retrievers {
		if !retriever.kind.is_empty() {
			allowed.insert(normalize_key(&retriever.kind));
		}
		if !retriever.kind.is_empty() && !retriever.provider.is_empty() {
			allowed.insert(normalize_key(&format!("{}:{}", retriever.kind, retriever.provider)));
		}
		if let Some(name) = retriever.params.get("name")
			&& !name.is_empty()
		{
			allowed.insert(normalize_key(name));
		}
	}

	for profile in &pipeline.retrieval_profiles {
		for reference in &profile.retrievers {
			if !allowed.contains(&normalize_key(reference)) {
				return Err(Error::validation(format!(
					"Profile {} references unknown retriever: {reference}.",
					profile.name
				)));
			}
		}
	}

	Ok(())
}

fn validate_retrievers(pipeline: &PipelineConfig) -> Result<()> {
	for (index, retriever) in pipeline.retrievers.iter().enumerate() {
		if retriever.kind.trim().is_empty() {
			return Err(Error::validation(format!("Retriever [{index}] type is required.")));
		}

		match retriever.kind.as_str() {
			"bm25" | "path" => {
				if retriever.params.get("endpoint").is_none_or(|endpoint| endpoint.is_empty()) {
					return Err(Error::validation(format!(
						"Retriever [{index}] ({}) requires an endpoint parameter.",
						retriever.kind
					)));
				}
			},
			"web" => {
				let has_endpoint = retriever.params.get("endpoint").is_some_and(|e| !e.is_empty());

				if !has_endpoint && retriever.provider.is_empty() {
					return Err(Error::validation(format!(
						"Retriever [{index}] (web) requires either an endpoint or a provider.",
					)));
				}
			},
			_ => {},
		}
	}

	Ok(())
}

fn validate_post(pipeline: &PipelineConfig) -> Result<()> {
	let Some(post) = pipeline.post.as_ref() else { return Ok(()) };

	if post.rerank.enable
		&& matches!(post.rerank.provider.as_str(), "" | "http" | "model")
		&& post.rerank.endpoint.is_empty()
	{
		return Err(Error::validation(
			"post.rerank.endpoint is required when the rerank provider is http or model.",
		));
	}
	if post.compress.enable && !(0.0..=1.0).contains(&post.compress.target_ratio) {
		return Err(Error::validation(format!(
			"post.compress.target_ratio must be in [0, 1], got {}.",
			post.compress.target_ratio
		)));
	}
	if post.compress.enable
		&& post.compress.method == "http"
		&& post.compress.endpoint.is_empty()
	{
		return Err(Error::validation(
			"post.compress.endpoint is required when the compress method is http.",
		));
	}

	Ok(())
}

fn validate_crag(pipeline: &PipelineConfig) -> Result<()> {
	let Some(crag) = pipeline.crag.as_ref() else { return Ok(()) };

	if !pipeline.enable_crag {
		return Ok(());
	}

	if crag.evaluator.provider == "http" && crag.evaluator.endpoint.is_empty() {
		return Err(Error::validation(
			"crag.evaluator.endpoint is required when the evaluator provider is http.",
		));
	}
	if !(0.0..=1.0).contains(&crag.evaluator.correct) {
		return Err(Error::validation(format!(
			"crag.evaluator.correct must be in [0, 1], got {}.",
			crag.evaluator.correct
		)));
	}
	if !(0.0..=1.0).contains(&crag.evaluator.incorrect) {
		return Err(Error::validation(format!(
			"crag.evaluator.incorrect must be in [0, 1], got {}.",
			crag.evaluator.incorrect
		)));
	}
	if !matches!(crag.fail_mode.as_str(), "" | "open" | "closed") {
		return Err(Error::validation(format!(
			"crag.fail_mode must be open or closed, got {}.",
			crag.fail_mode
		)));
	}

	Ok(())
}

fn validate_fusion(pipeline: &PipelineConfig) -> Result<()> {
	let Some(fusion) = pipeline.fusion.as_ref() else { return Ok(()) };

	if fusion.traffic_percent > 100 {
		return Err(Error::validation(format!(
			"fusion.traffic_percent must be at most 100, got {}.",
			fusion.traffic_percent
		)));
	}
	if fusion.enable_learned && fusion.weights_uri.is_empty() {
		return Err(Error::validation(
			"fusion.weights_uri is required when learned fusion is enabled.",
		));
	}

	Ok(())
}

fn validate_pre(pipeline: &PipelineConfig) -> Result<()> {
	let Some(pre) = pipeline.pre_retrieve.as_ref() else { return Ok(()) };

	if !pre.service.provider.is_empty()
		&& !matches!(pre.service.provider.as_str(), "http" | "grpc")
	{
		return Err(Error::validation(format!(
			"pre_retrieve.service.provider must be http or grpc, got {}.",
			pre.service.provider
		)));
	}

	Ok(())
}

fn validate_misc(pipeline: &PipelineConfig) -> Result<()> {
	if let Some(session) = pipeline.session.as_ref()
		&& !matches!(session.store.as_str(), "" | "inmemory")
	{
		return Err(Error::validation(format!(
			"session.store must be inmemory, got {}.",
			session.store
		)));
	}
	if let Some(cache) = pipeline.cache.as_ref()
		&& let Some(l1) = cache.l1.as_ref()
		&& !matches!(l1.mode.as_str(), "" | "post")
	{
		return Err(Error::validation(format!("cache.l1.mode must be post, got {}.", l1.mode)));
	}

	Ok(())
}

fn normalize_key(key: &str) -> String {
	key.chars().filter(|ch| !ch.is_whitespace()).collect::<String>().to_lowercase()
}
