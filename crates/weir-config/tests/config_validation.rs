use weir_config::{
	CascadeStageConfig, Config, CragConfig, FusionConfig, PostConfig, PreRetrieveConfig,
	RetrievalProfile, RetrieverConfig, SessionConfig,
};

fn sample_config() -> Config {
	let mut cfg = Config::default();

	cfg.index_version = "v1".to_string();
	cfg.pipeline.rrf_k = 60;
	cfg.pipeline.retrievers = vec![
		RetrieverConfig {
			kind: "bm25".to_string(),
			provider: "elasticsearch".to_string(),
			params: [("endpoint".to_string(), "http://es:9200".to_string())].into(),
		},
		RetrieverConfig {
			kind: "web".to_string(),
			provider: "duckduckgo".to_string(),
			params: Default::default(),
		},
	];
	cfg.pipeline.retrieval_profiles = vec![RetrievalProfile {
		name: "default".to_string(),
		retrievers: vec!["vector".to_string(), "bm25".to_string()],
		top_k: 10,
		threshold: 0.5,
		..Default::default()
	}];
	cfg.pipeline.default_profile = "default".to_string();

	cfg
}

#[test]
fn sample_config_validates() {
	assert!(weir_config::validate(&sample_config()).is_ok());
}

#[test]
fn duplicate_profile_names_are_rejected() {
	let mut cfg = sample_config();
	let duplicate = cfg.pipeline.retrieval_profiles[0].clone();

	cfg.pipeline.retrieval_profiles.push(duplicate);

	assert!(weir_config::validate(&cfg).is_err());
}

#[test]
fn unknown_retriever_reference_is_rejected() {
	let mut cfg = sample_config();

	cfg.pipeline.retrieval_profiles[0].retrievers.push("graph".to_string());

	assert!(weir_config::validate(&cfg).is_err());
}

#[test]
fn retriever_reference_by_type_provider_and_name_resolves() {
	let mut cfg = sample_config();

	cfg.pipeline.retrievers[0].params.insert("name".to_string(), "kb-sparse".to_string());
	cfg.pipeline.retrieval_profiles[0].retrievers = vec![
		"vector".to_string(),
		"bm25:elasticsearch".to_string(),
		"kb-sparse".to_string(),
	];

	assert!(weir_config::validate(&cfg).is_ok());
}

#[test]
fn threshold_outside_unit_interval_is_rejected() {
	let mut cfg = sample_config();

	cfg.pipeline.retrieval_profiles[0].threshold = 1.2;

	assert!(weir_config::validate(&cfg).is_err());
}

#[test]
fn low_gate_must_stay_below_high_gate() {
	let mut cfg = sample_config();

	cfg.pipeline.retrieval_profiles[0].vector_gate = 0.6;
	cfg.pipeline.retrieval_profiles[0].vector_low_gate = 0.6;

	assert!(weir_config::validate(&cfg).is_err());

	cfg.pipeline.retrieval_profiles[0].vector_low_gate = 0.4;

	assert!(weir_config::validate(&cfg).is_ok());
}

#[test]
fn bm25_retriever_requires_endpoint() {
	let mut cfg = sample_config();

	cfg.pipeline.retrievers[0].params.remove("endpoint");

	assert!(weir_config::validate(&cfg).is_err());
}

#[test]
fn web_retriever_requires_endpoint_or_provider() {
	let mut cfg = sample_config();

	cfg.pipeline.retrievers[1].provider = String::new();

	assert!(weir_config::validate(&cfg).is_err());
}

#[test]
fn pre_service_provider_must_be_http_or_grpc() {
	let mut cfg = sample_config();
	let mut pre = PreRetrieveConfig::default();

	pre.service.provider = "thrift".to_string();
	cfg.pipeline.pre_retrieve = Some(pre);

	assert!(weir_config::validate(&cfg).is_err());

	let pre = cfg.pipeline.pre_retrieve.as_mut().expect("pre_retrieve was just set");

	pre.service.provider = "http".to_string();

	assert!(weir_config::validate(&cfg).is_ok());
}

#[test]
fn http_rerank_requires_endpoint() {
	let mut cfg = sample_config();
	let mut post = PostConfig::default();

	post.rerank.enable = true;
	post.rerank.provider = "http".to_string();
	cfg.pipeline.post = Some(post);

	assert!(weir_config::validate(&cfg).is_err());
}

#[test]
fn keyword_rerank_needs_no_endpoint() {
	let mut cfg = sample_config();
	let mut post = PostConfig::default();

	post.rerank.enable = true;
	post.rerank.provider = "keyword".to_string();
	cfg.pipeline.post = Some(post);

	assert!(weir_config::validate(&cfg).is_ok());
}

#[test]
fn crag_http_evaluator_requires_endpoint_only_when_enabled() {
	let mut cfg = sample_config();
	let mut crag = CragConfig::default();

	crag.evaluator.provider = "http".to_string();
	cfg.pipeline.crag = Some(crag);

	assert!(weir_config::validate(&cfg).is_ok());

	cfg.pipeline.enable_crag = true;

	assert!(weir_config::validate(&cfg).is_err());
}

#[test]
fn learned_fusion_requires_weights_uri() {
	let mut cfg = sample_config();

	cfg.pipeline.fusion = Some(FusionConfig { enable_learned: true, ..Default::default() });

	assert!(weir_config::validate(&cfg).is_err());
}

#[test]
fn traffic_percent_above_100_is_rejected() {
	let mut cfg = sample_config();

	cfg.pipeline.fusion = Some(FusionConfig { traffic_percent: 120, ..Default::default() });

	assert!(weir_config::validate(&cfg).is_err());
}

#[test]
fn cascade_requires_stage1_retriever() {
	let mut cfg = sample_config();

	cfg.pipeline.retrieval_profiles[0].cascade.enable = true;
	cfg.pipeline.retrieval_profiles[0].cascade.stage1 = CascadeStageConfig::default();

	assert!(weir_config::validate(&cfg).is_err());
}

#[test]
fn redis_session_store_is_rejected() {
	let mut cfg = sample_config();

	cfg.pipeline.session =
		Some(SessionConfig { store: "redis".to_string(), ..Default::default() });

	assert!(weir_config::validate(&cfg).is_err());
}

#[test]
fn toml_round_trip_parses() {
	let raw = r#"
index_version = "kb-2024-06"

[pipeline]
enable_hybrid = true
rrf_k = 60
default_profile = "default"

[[pipeline.retrievers]]
type = "bm25"
provider = "elasticsearch"
params = { endpoint = "http://es:9200", index = "chunks" }

[[pipeline.retrieval_profiles]]
name = "default"
retrievers = ["vector", "bm25"]
top_k = 10
threshold = 0.5

[pipeline.http]
timeout_ms = 1200
host_allowlist = ["*.internal", "es"]
"#;
	let cfg: Config = toml::from_str(raw).expect("sample TOML must parse");

	assert_eq!(cfg.index_version, "kb-2024-06");
	assert!(cfg.pipeline.enable_hybrid);
	assert_eq!(cfg.pipeline.retrievers[0].kind, "bm25");
	assert_eq!(
		cfg.pipeline.http.as_ref().map(|http| http.host_allowlist.len()),
		Some(2)
	);
	assert!(weir_config::validate(&cfg).is_ok());
}
