use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use time::OffsetDateTime;

/// Per-retriever statistics folded into the query metrics record.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RetrieverStats {
	#[serde(rename = "type")]
	pub kind: String,
	pub latency_ms: i64,
	pub result_count: usize,
	pub avg_score: f64,
	pub top_score: f64,
}

/// One structured record per query.
///
/// Pipeline stages write into the record as they run; the orchestrator emits
/// it exactly once at the end via [`RetrievalMetrics::emit`]. There is no
/// cross-query aggregation here.
#[derive(Clone, Debug, Serialize)]
pub struct RetrievalMetrics {
	pub query_id: String,
	pub query: String,
	#[serde(with = "time::serde::rfc3339")]
	pub timestamp: OffsetDateTime,

	pub profile_name: String,
	#[serde(skip_serializing_if = "String::is_empty")]
	pub profile_source: String,
	#[serde(skip_serializing_if = "String::is_empty")]
	pub intent: String,
	pub retrievers_used: Vec<String>,
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub retrievers_skipped: Vec<String>,

	pub pre_enabled: bool,
	#[serde(skip_serializing_if = "is_zero_i64")]
	pub pre_latency_ms: i64,
	#[serde(skip_serializing_if = "is_zero")]
	pub sub_queries_count: usize,

	pub retriever_metrics: HashMap<String, RetrieverStats>,
	pub total_retrieved: usize,
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub retrieval_phases: Vec<String>,

	pub fusion_method: String,
	pub fusion_result_count: usize,
	#[serde(skip_serializing_if = "is_zero_i64")]
	pub fusion_latency_ms: i64,
	#[serde(skip_serializing_if = "String::is_empty")]
	pub fusion_weights_version: String,

	pub rerank_enabled: bool,
	#[serde(skip_serializing_if = "is_zero")]
	pub rerank_result_count: usize,
	pub compress_enabled: bool,

	pub crag_enabled: bool,
	#[serde(skip_serializing_if = "String::is_empty")]
	pub crag_verdict: String,

	pub router_enabled: bool,
	#[serde(skip_serializing_if = "String::is_empty")]
	pub router_provider: String,
	#[serde(skip_serializing_if = "String::is_empty")]
	pub router_profile: String,
	#[serde(skip_serializing_if = "String::is_empty")]
	pub router_error: String,
	#[serde(skip_serializing_if = "BTreeMap::is_empty")]
	pub router_variants: BTreeMap<String, usize>,

	pub gating_enabled: bool,
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub gating_decisions: Vec<String>,

	pub total_latency_ms: i64,
	pub success: bool,
	#[serde(skip_serializing_if = "String::is_empty")]
	pub error_msg: String,
}
impl RetrievalMetrics {
	pub fn new(query_id: impl Into<String>, query: impl Into<String>) -> Self {
		Self {
			query_id: query_id.into(),
			query: query.into(),
			timestamp: OffsetDateTime::now_utc(),
			profile_name: String::new(),
			profile_source: String::new(),
			intent: String::new(),
			retrievers_used: Vec::new(),
			retrievers_skipped: Vec::new(),
			pre_enabled: false,
			pre_latency_ms: 0,
			sub_queries_count: 0,
			retriever_metrics: HashMap::new(),
			total_retrieved: 0,
			retrieval_phases: Vec::new(),
			fusion_method: String::new(),
			fusion_result_count: 0,
			fusion_latency_ms: 0,
			fusion_weights_version: String::new(),
			rerank_enabled: false,
			rerank_result_count: 0,
			compress_enabled: false,
			crag_enabled: false,
			crag_verdict: String::new(),
			router_enabled: false,
			router_provider: String::new(),
			router_profile: String::new(),
			router_error: String::new(),
			router_variants: BTreeMap::new(),
			gating_enabled: false,
			gating_decisions: Vec::new(),
			total_latency_ms: 0,
			success: false,
			error_msg: String::new(),
		}
	}

	/// Adds or merges stats for one retriever type.
	///
	/// When the same retriever ran more than once (multiple sub-queries),
	/// latencies and average scores are averaged, result counts summed, and
	/// the top score kept at its maximum.
	pub fn add_retriever_stats(&mut self, stats: RetrieverStats) {
		match self.retriever_metrics.get_mut(&stats.kind) {
			Some(existing) => {
				existing.latency_ms = (existing.latency_ms + stats.latency_ms) / 2;
				existing.result_count += stats.result_count;
				existing.avg_score = (existing.avg_score + stats.avg_score) / 2.0;

				if stats.top_score > existing.top_score {
					existing.top_score = stats.top_score;
				}
			},
			None => {
				self.retriever_metrics.insert(stats.kind.clone(), stats);
			},
		}
	}

	pub fn add_gating_decision(&mut self, decision: impl Into<String>) {
		self.gating_decisions.push(decision.into());
	}

	pub fn add_retrieval_phase(&mut self, phase: impl Into<String>) {
		self.retrieval_phases.push(phase.into());
	}

	pub fn add_skipped_retriever(&mut self, kind: impl Into<String>) {
		self.retrievers_skipped.push(kind.into());
	}

	pub fn record_profile_selection(&mut self, name: &str, source: &str) {
		self.profile_name = name.to_string();
		self.profile_source = source.to_string();
	}

	pub fn record_fusion(
		&mut self,
		method: &str,
		result_count: usize,
		latency_ms: i64,
		weights_version: &str,
	) {
		self.fusion_method = method.to_string();
		self.fusion_result_count = result_count;
		self.fusion_latency_ms = latency_ms;
		self.fusion_weights_version = weights_version.to_string();
	}

	/// Emits the record as one JSON line.
	pub fn emit(&self) {
		match serde_json::to_string(self) {
			Ok(json) => tracing::info!(target: "weir::metrics", "{json}"),
			Err(err) => tracing::warn!("Failed to serialize metrics record: {err}."),
		}
	}
}

fn is_zero(value: &usize) -> bool {
	*value == 0
}

fn is_zero_i64(value: &i64) -> bool {
	*value == 0
}
