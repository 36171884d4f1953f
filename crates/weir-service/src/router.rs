//! Query routing: rule-based, HTTP-backed, or hybrid.
//!
//! Routing failures never surface to the caller; every path degrades to the
//! rule-based router, which is a pure function of the query string.

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use weir_config::{RetrievalProfile, RouterConfig, RouterRule};
use weir_providers::HttpClient;

use crate::Result;

const TEMPORAL_KEYWORDS: &[&str] = &[
	"latest", "newest", "recent", "current", "today", "now", "2024", "2025", "最新", "最近",
	"当前", "今天", "现在",
];
const COMPARISON_KEYWORDS: &[&str] = &[
	"compare", "difference", "versus", "vs", "better", "best", "比较", "区别", "对比", "哪个好",
];
const OPEN_ENDED_KEYWORDS: &[&str] = &[
	"explain", "how", "why", "what is", "tell me about", "解释", "如何", "为什么", "什么是",
	"介绍",
];

/// The routing verdict for one query.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct RoutingDecision {
	pub need_web: bool,
	pub need_vector: bool,
	pub need_bm25: bool,
	/// `factoid`, `comparison`, `temporal`, `open-ended`, `complex`, ...
	pub query_type: String,
	pub confidence: f64,
	#[serde(skip_serializing_if = "String::is_empty")]
	pub reason: String,
	pub suggested_top_k: usize,
	#[serde(skip_serializing_if = "String::is_empty")]
	pub profile_name: String,
	#[serde(skip_serializing_if = "BTreeMap::is_empty")]
	pub variant_budgets: BTreeMap<String, VariantBudget>,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct VariantBudget {
	pub enable: bool,
	pub top_k: usize,
}

#[async_trait]
pub trait Router: Send + Sync {
	async fn route(&self, query: &str) -> Result<RoutingDecision>;
}

/// Builds a router from configuration; unknown providers map to rules.
pub fn new_router(cfg: &RouterConfig, client: Arc<HttpClient>) -> Box<dyn Router> {
	match cfg.provider.as_str() {
		"http" if !cfg.endpoint.is_empty() => {
			Box::new(HttpRouter::new(cfg.endpoint.clone(), client, cfg.rules.clone()))
		},
		"hybrid" => {
			let primary: Option<Box<dyn Router>> = if cfg.endpoint.is_empty() {
				None
			} else {
				Some(Box::new(HttpRouter::new(cfg.endpoint.clone(), client, cfg.rules.clone())))
			};

			Box::new(HybridRouter::new(primary, Box::new(RuleRouter::new(cfg.rules.clone()))))
		},
		_ => Box::new(RuleRouter::new(cfg.rules.clone())),
	}
}

/// Rule-based routing over query token classes.
pub struct RuleRouter {
	rules: Vec<RouterRule>,
}
impl RuleRouter {
	pub fn new(rules: Vec<RouterRule>) -> Self {
		Self { rules }
	}
}
#[async_trait]
impl Router for RuleRouter {
	async fn route(&self, query: &str) -> Result<RoutingDecision> {
		let mut decision = rule_decision(query);

		apply_rules(&mut decision, &self.rules);
		tracing::info!(
			web = decision.need_web,
			vector = decision.need_vector,
			bm25 = decision.need_bm25,
			query_type = %decision.query_type,
			"Rule-based routing decision.",
		);

		Ok(decision)
	}
}

/// Pure rule-based decision for one query string.
pub fn rule_decision(query: &str) -> RoutingDecision {
	let mut decision = RoutingDecision {
		need_vector: true,
		query_type: "factoid".to_string(),
		confidence: 0.6,
		suggested_top_k: 10,
		..Default::default()
	};
	let lowered = query.to_lowercase();
	let token_count = query.split_whitespace().count();

	if TEMPORAL_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
		decision.need_web = true;
		decision.query_type = "temporal".to_string();
		decision.reason = "detected temporal keywords requiring up-to-date information".to_string();
		decision.suggested_top_k = 15;
	}

	if COMPARISON_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
		decision.need_bm25 = true;
		decision.query_type = "comparison".to_string();
		decision.reason = "detected comparison requiring keyword matching".to_string();
		decision.suggested_top_k = 12;
	}

	if OPEN_ENDED_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
		decision.need_bm25 = true;
		decision.query_type = "open-ended".to_string();
		decision.reason = "open-ended query benefits from hybrid retrieval".to_string();
		decision.suggested_top_k = 15;
	}

	if token_count >= 16 {
		decision.need_bm25 = true;
		decision.query_type = "complex".to_string();
		decision.reason = "long query suggesting complex information need".to_string();
		decision.suggested_top_k = 20;
	}

	if token_count <= 3 && decision.query_type == "factoid" {
		decision.reason = "short factoid query, vector retrieval sufficient".to_string();
		decision.suggested_top_k = 5;
	}

	if (query.contains('?') || query.contains('？')) && !decision.need_bm25 {
		decision.need_bm25 = true;
		decision.suggested_top_k += 3;
	}

	decision
}

/// Overlays the first matching rule onto a decision.
///
/// A rule with an empty intent matches every query type. The rule's profile
/// (falling back to its intent) fixes the profile name, and its variant
/// budgets replace the decision's, toggling the corresponding needs.
fn apply_rules(decision: &mut RoutingDecision, rules: &[RouterRule]) {
	for rule in rules {
		if !rule.intent.is_empty() && !rule.intent.eq_ignore_ascii_case(&decision.query_type) {
			continue;
		}

		if !rule.profile.is_empty() {
			decision.profile_name = rule.profile.clone();
		} else if !rule.intent.is_empty() {
			decision.profile_name = rule.intent.clone();
		}

		if let Some(budgets) = build_variant_budgets(rule) {
			for (variant, budget) in &budgets {
				if !budget.enable {
					continue;
				}

				match variant.as_str() {
					"dense" => decision.need_vector = true,
					"sparse" => decision.need_bm25 = true,
					"web" => decision.need_web = true,
					// HYDE signals downstream seed generation only.
					_ => {},
				}
			}

			decision.variant_budgets = budgets;
		}

		return;
	}
}

fn build_variant_budgets(rule: &RouterRule) -> Option<BTreeMap<String, VariantBudget>> {
	let enabled: Vec<String> = rule
		.enable
		.iter()
		.map(|variant| normalize_variant(variant))
		.filter(|variant| !variant.is_empty())
		.collect();

	if enabled.is_empty() && rule.budgets.is_empty() {
		return None;
	}

	let mut budgets = BTreeMap::new();

	for (variant, top_k) in &rule.budgets {
		let key = normalize_variant(variant);

		if key.is_empty() {
			continue;
		}

		budgets.insert(
			key.clone(),
			VariantBudget { enable: enabled.is_empty() || enabled.contains(&key), top_k: *top_k },
		);
	}

	for variant in enabled {
		budgets
			.entry(variant)
			.and_modify(|budget| budget.enable = true)
			.or_insert(VariantBudget { enable: true, top_k: 0 });
	}

	if budgets.is_empty() { None } else { Some(budgets) }
}

fn normalize_variant(variant: &str) -> String {
	variant.trim().to_lowercase()
}

/// Routes through an external HTTP service, degrading to rules on any
/// failure (transport, status, or decode).
pub struct HttpRouter {
	endpoint: String,
	client: Arc<HttpClient>,
	rules: Vec<RouterRule>,
}
impl HttpRouter {
	pub fn new(endpoint: String, client: Arc<HttpClient>, rules: Vec<RouterRule>) -> Self {
		Self { endpoint, client, rules }
	}

	async fn route_http(&self, query: &str) -> Result<RoutingDecision> {
		let request = self
			.client
			.post(&self.endpoint)
			.json(&serde_json::json!({ "query": query }))
			.build()
			.map_err(weir_providers::Error::from)?;
		let response = self.client.execute(request).await?;

		if !response.status().is_success() {
			return Err(weir_providers::Error::UnexpectedStatus {
				status: response.status().as_u16(),
				url: self.endpoint.clone(),
			}
			.into());
		}

		let decision: RoutingDecision =
			response.json().await.map_err(weir_providers::Error::from)?;

		Ok(decision)
	}
}
#[async_trait]
impl Router for HttpRouter {
	async fn route(&self, query: &str) -> Result<RoutingDecision> {
		match self.route_http(query).await {
			Ok(decision) => {
				tracing::info!(
					web = decision.need_web,
					vector = decision.need_vector,
					bm25 = decision.need_bm25,
					query_type = %decision.query_type,
					confidence = decision.confidence,
					"Routing decision from HTTP service.",
				);

				Ok(decision)
			},
			Err(err) => {
				tracing::warn!("Router HTTP call failed, using rule fallback: {err}.");

				RuleRouter::new(self.rules.clone()).route(query).await
			},
		}
	}
}

/// Ordered router: primary first, rule fallback second.
pub struct HybridRouter {
	primary: Option<Box<dyn Router>>,
	fallback: Box<dyn Router>,
}
impl HybridRouter {
	pub fn new(primary: Option<Box<dyn Router>>, fallback: Box<dyn Router>) -> Self {
		Self { primary, fallback }
	}
}
#[async_trait]
impl Router for HybridRouter {
	async fn route(&self, query: &str) -> Result<RoutingDecision> {
		if let Some(primary) = self.primary.as_ref() {
			if let Ok(decision) = primary.route(query).await {
				return Ok(decision);
			}

			tracing::warn!("Primary router failed, using fallback.");
		}

		self.fallback.route(query).await
	}
}

/// Rebuilds a profile's retriever set from a routing decision.
///
/// Applying the same decision twice yields the same profile.
pub fn apply_decision(decision: &RoutingDecision, mut profile: RetrievalProfile) -> RetrievalProfile {
	profile.retrievers = Vec::new();

	if decision.need_vector {
		profile.retrievers.push("vector".to_string());
	}
	if decision.need_bm25 {
		profile.retrievers.push("bm25".to_string());
	}
	if decision.need_web {
		profile.retrievers.push("web".to_string());
		profile.use_web = true;
	} else {
		profile.use_web = false;
	}

	if (1..=100).contains(&decision.suggested_top_k) {
		profile.top_k = decision.suggested_top_k;
	}

	if !decision.variant_budgets.is_empty() {
		profile.variant_budgets.clear();

		for (variant, budget) in &decision.variant_budgets {
			if !budget.enable {
				continue;
			}

			let key = normalize_variant(variant);

			profile.variant_budgets.insert(key.clone(), budget.top_k);

			match key.as_str() {
				"dense" => {
					ensure_retriever(&mut profile.retrievers, "vector");

					if budget.top_k > 0
						&& (profile.per_retriever_top_k == 0
							|| budget.top_k < profile.per_retriever_top_k)
					{
						profile.per_retriever_top_k = budget.top_k;
					}
				},
				"sparse" => ensure_retriever(&mut profile.retrievers, "bm25"),
				"hyde" => {
					profile.hyde.enable = true;

					if budget.top_k > 0 {
						profile.hyde.max_seeds = budget.top_k;
					}
				},
				"web" => {
					profile.use_web = true;
					ensure_retriever(&mut profile.retrievers, "web");
				},
				_ => {},
			}
		}
	}

	profile
}

fn ensure_retriever(retrievers: &mut Vec<String>, kind: &str) {
	let present = retrievers.iter().any(|key| key.to_lowercase().contains(kind));

	if !present {
		retrievers.push(kind.to_string());
	}
}
