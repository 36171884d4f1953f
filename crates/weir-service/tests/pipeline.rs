//! End-to-end pipeline scenarios over deterministic fakes.

use std::sync::Arc;

use async_trait::async_trait;
use weir_config::{CacheConfig, CacheLayerConfig, Config, CragConfig, RetrievalProfile};
use weir_domain::Verdict;
use weir_service::{Error, Pipeline, crag::Evaluator};
use weir_testkit::{InMemoryVectorStore, ScriptedLlm, StaticEmbedder, StaticRetriever, doc, scored};

struct StaticEvaluator {
	score: f64,
	verdict: Verdict,
	fail: bool,
}
#[async_trait]
impl Evaluator for StaticEvaluator {
	async fn evaluate(&self, _query: &str, _context: &str) -> weir_service::Result<(f64, Verdict)> {
		if self.fail {
			return Err(Error::Evaluator { message: "scripted failure".to_string() });
		}

		Ok((self.score, self.verdict))
	}
}

fn gated_config() -> Config {
	let mut cfg = Config::default();

	cfg.index_version = "v1".to_string();
	cfg.pipeline.enable_hybrid = true;
	cfg.pipeline.rrf_k = 60;
	// RRF-fused scores live around 1/61, so the threshold sits well below
	// that.
	cfg.pipeline.retrieval_profiles = vec![RetrievalProfile {
		name: "gated".to_string(),
		retrievers: vec!["vector".to_string(), "web".to_string()],
		top_k: 10,
		threshold: 0.01,
		use_web: true,
		vector_gate: 0.85,
		vector_low_gate: 0.4,
		force_web_on_low: true,
		..Default::default()
	}];
	cfg.pipeline.default_profile = "gated".to_string();

	cfg
}

fn vector_with_score(score: f64) -> Arc<StaticRetriever> {
	Arc::new(StaticRetriever::new(
		"vector",
		vec![
			scored("vec-1", "What is Kubernetes? An orchestrator.", score),
			scored("vec-2", "Kubernetes schedules containers.", score - 0.05),
		],
	))
}

fn web_retriever() -> Arc<StaticRetriever> {
	Arc::new(StaticRetriever::new(
		"web",
		vec![scored("https://web-1", "A web snippet.", 0.0)],
	))
}

#[tokio::test]
async fn high_vector_score_suppresses_web() {
	let vector = vector_with_score(0.92);
	let web = web_retriever();
	let pipeline = Pipeline::builder(gated_config())
		.with_retriever(&["vector"], vector.clone())
		.with_retriever(&["web"], web.clone())
		.build()
		.expect("pipeline must build");
	let results = pipeline.run("What is Kubernetes?").await.expect("pipeline run succeeds");

	assert!(!results.is_empty());
	assert!(
		results.iter().all(|r| r.document.retriever_type() == Some("vector")),
		"only vector documents expected after suppression"
	);
	// Preflight plus the main retrieval pass.
	assert_eq!(vector.calls(), 2);
	assert_eq!(web.calls(), 0);
}

#[tokio::test]
async fn low_vector_score_forces_web_in() {
	let vector = vector_with_score(0.2);
	let web = web_retriever();
	let mut cfg = gated_config();

	// Web starts out of the profile so gating has to force it in.
	cfg.pipeline.retrieval_profiles[0].retrievers = vec!["vector".to_string()];
	cfg.pipeline.retrieval_profiles[0].use_web = false;

	let pipeline = Pipeline::builder(cfg)
		.with_retriever(&["vector"], vector)
		.with_retriever(&["web"], web.clone())
		.build()
		.expect("pipeline must build");
	let results = pipeline.run("What is Kubernetes?").await.expect("pipeline run succeeds");
	let kinds: std::collections::HashSet<&str> =
		results.iter().filter_map(|r| r.document.retriever_type()).collect();

	assert!(kinds.contains("vector"));
	assert!(kinds.contains("web"));
	assert_eq!(web.calls(), 1);
}

#[tokio::test]
async fn crag_correct_verdict_refines_in_place() {
	let mut cfg = gated_config();

	cfg.pipeline.retrieval_profiles[0].vector_gate = 0.0;
	cfg.pipeline.retrieval_profiles[0].vector_low_gate = 0.0;
	cfg.pipeline.enable_crag = true;
	cfg.pipeline.crag = Some(CragConfig::default());

	let llm = Arc::new(ScriptedLlm::new(vec!["- key fact"]));
	let pipeline = Pipeline::builder(cfg)
		.with_retriever(&["vector"], vector_with_score(0.9))
		.with_retriever(&["web"], web_retriever())
		.with_llm(llm)
		.with_evaluator(Arc::new(StaticEvaluator {
			score: 0.9,
			verdict: Verdict::Correct,
			fail: false,
		}))
		.build()
		.expect("pipeline must build");
	let results = pipeline.run("What is Kubernetes?").await.expect("pipeline run succeeds");
	let scores: Vec<f64> = results.iter().map(|r| r.score).collect();

	assert!(!results.is_empty());
	assert!(results.iter().all(|r| r.document.content == "- key fact"));
	// Scores are untouched by the corrective pass.
	assert!(scores.windows(2).all(|w| w[0] >= w[1]));
}

#[tokio::test]
async fn crag_incorrect_without_web_empties_the_results() {
	let mut cfg = gated_config();

	cfg.pipeline.retrieval_profiles[0].vector_gate = 0.0;
	cfg.pipeline.retrieval_profiles[0].vector_low_gate = 0.0;
	cfg.pipeline.enable_crag = true;
	cfg.pipeline.crag = Some(CragConfig::default());

	let pipeline = Pipeline::builder(cfg)
		.with_retriever(&["vector"], vector_with_score(0.9))
		.with_evaluator(Arc::new(StaticEvaluator {
			score: 0.1,
			verdict: Verdict::Incorrect,
			fail: false,
		}))
		.build()
		.expect("pipeline must build");
	let results = pipeline.run("unanswerable").await.expect("pipeline run succeeds");

	assert!(results.is_empty());
}

#[tokio::test]
async fn evaluator_failure_honors_fail_mode() {
	let mut cfg = gated_config();

	cfg.pipeline.retrieval_profiles[0].vector_gate = 0.0;
	cfg.pipeline.retrieval_profiles[0].vector_low_gate = 0.0;
	cfg.pipeline.enable_crag = true;
	cfg.pipeline.crag = Some(CragConfig { fail_mode: "open".to_string(), ..Default::default() });

	let failing = || {
		Arc::new(StaticEvaluator { score: 0.0, verdict: Verdict::Ambiguous, fail: true })
	};
	let pipeline = Pipeline::builder(cfg.clone())
		.with_retriever(&["vector"], vector_with_score(0.9))
		.with_evaluator(failing())
		.build()
		.expect("pipeline must build");
	let results = pipeline.run("query").await.expect("open mode keeps results");

	assert!(!results.is_empty());

	cfg.pipeline.crag = Some(CragConfig { fail_mode: "closed".to_string(), ..Default::default() });

	let pipeline = Pipeline::builder(cfg)
		.with_retriever(&["vector"], vector_with_score(0.9))
		.with_evaluator(failing())
		.build()
		.expect("pipeline must build");

	assert!(pipeline.run("query").await.is_err());
}

#[tokio::test]
async fn cache_serves_repeat_queries_without_retrieval() {
	let mut cfg = gated_config();

	cfg.pipeline.retrieval_profiles[0].vector_gate = 0.0;
	cfg.pipeline.retrieval_profiles[0].vector_low_gate = 0.0;
	cfg.pipeline.cache = Some(CacheConfig {
		l1: Some(CacheLayerConfig {
			enable: true,
			max_entries: 16,
			ttl_seconds: 60,
			mode: "post".to_string(),
		}),
	});

	let vector = vector_with_score(0.9);
	let pipeline = Pipeline::builder(cfg)
		.with_retriever(&["vector"], vector.clone())
		.build()
		.expect("pipeline must build");
	let first = pipeline.run("Hello").await.expect("pipeline run succeeds");

	assert_eq!(vector.calls(), 1);

	// Same query modulo case and whitespace: served from cache.
	let mut second = pipeline.run("  hello ").await.expect("pipeline run succeeds");

	assert_eq!(vector.calls(), 1);
	assert_eq!(first, second);

	// Mutating the returned copy cannot poison the cache.
	second[0].document.content = "mutated".to_string();

	let third = pipeline.run("hello").await.expect("pipeline run succeeds");

	assert_eq!(third[0].document.content, first[0].document.content);
}

#[tokio::test]
async fn vector_retrieval_wires_from_embedder_and_store() {
	let mut cfg = gated_config();

	cfg.pipeline.retrieval_profiles[0].vector_gate = 0.0;
	cfg.pipeline.retrieval_profiles[0].vector_low_gate = 0.0;
	cfg.pipeline.retrieval_profiles[0].retrievers = vec!["vector".to_string()];

	let store = InMemoryVectorStore::new(vec![
		(doc("near", "a close document"), vec![1.0, 0.0]),
		(doc("far", "a distant document"), vec![0.0, 1.0]),
	]);
	let pipeline = Pipeline::builder(cfg)
		.with_embedder(Arc::new(StaticEmbedder::new(vec![1.0, 0.1])))
		.with_vector_store(Arc::new(store))
		.build()
		.expect("pipeline must build");
	let results = pipeline.run("close things").await.expect("pipeline run succeeds");

	// The store's similarity threshold filters the distant document.
	assert_eq!(results.len(), 1);
	assert_eq!(results[0].document.id, "near");
	assert_eq!(results[0].document.retriever_type(), Some("vector"));
}

#[tokio::test]
async fn learned_fusion_applies_weights_and_bias_end_to_end() {
	let weights_path = std::env::temp_dir().join("weir_pipeline_learned.json");

	std::fs::write(
		&weights_path,
		r#"{"version":"2024-06","weights":{"vector":2.0},"bias":0.1}"#,
	)
	.expect("weights file must write");

	let mut cfg = gated_config();

	cfg.pipeline.retrieval_profiles[0].vector_gate = 0.0;
	cfg.pipeline.retrieval_profiles[0].vector_low_gate = 0.0;
	cfg.pipeline.fusion = Some(weir_config::FusionConfig {
		enable_learned: true,
		weights_uri: weights_path.to_string_lossy().to_string(),
		timeout_ms: 1_000,
		..Default::default()
	});

	let vector = Arc::new(StaticRetriever::new(
		"vector",
		vec![scored("a", "first", 0.4), scored("b", "second", 0.35)],
	));
	let pipeline = Pipeline::builder(cfg)
		.with_retriever(&["vector"], vector)
		.build()
		.expect("pipeline must build");
	let results = pipeline.run("query").await.expect("pipeline run succeeds");

	// Weighted fusion doubles the scores, then the bias shifts them.
	assert_eq!(results[0].document.id, "a");
	assert!((results[0].score - 0.9).abs() < 1e-9);
	assert!((results[1].score - 0.8).abs() < 1e-9);

	let _ = std::fs::remove_file(weights_path);
}

#[tokio::test]
async fn router_rebuilds_the_retriever_set() {
	let mut cfg = gated_config();

	cfg.pipeline.retrieval_profiles[0].vector_gate = 0.0;
	cfg.pipeline.retrieval_profiles[0].vector_low_gate = 0.0;
	cfg.pipeline.router = Some(weir_config::RouterConfig {
		provider: "rule".to_string(),
		enable: true,
		..Default::default()
	});

	let vector = vector_with_score(0.9);
	let bm25 = Arc::new(StaticRetriever::new("bm25", vec![scored("sparse-1", "text", 2.0)]));
	let pipeline = Pipeline::builder(cfg)
		.with_retriever(&["vector"], vector)
		.with_retriever(&["bm25"], bm25.clone())
		.build()
		.expect("pipeline must build");

	// A comparison query routes to vector + bm25.
	let results =
		pipeline.run("compare kubernetes and nomad schedulers").await.expect("run succeeds");
	let kinds: std::collections::HashSet<&str> =
		results.iter().filter_map(|r| r.document.retriever_type()).collect();

	assert!(kinds.contains("bm25"));
	assert_eq!(bm25.calls(), 1);
}
