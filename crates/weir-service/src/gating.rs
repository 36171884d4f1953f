//! Two-phase vector gating.
//!
//! A cheap vector preflight decides whether web search is worth its latency:
//! a high top-1 score suppresses web, a low one forces it. Feedback trends
//! then nudge `top_k` and the retriever set between cooldowns.

use std::{sync::Arc, time::Duration};

use weir_config::{FeedbackConfig, RetrievalProfile};
use weir_domain::{RetrievalMetrics, RetrieverStats};
use weir_providers::retriever::Retriever;

use crate::feedback::FeedbackManager;

const PREFLIGHT_LIMIT: usize = 5;
const TOP_K_FLOOR: usize = 3;
const DEFAULT_TOP_K_STEP: usize = 2;

/// Outcome of the gating preflight.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GateDecision {
	pub should_suppress_web: bool,
	pub should_force_web: bool,
	pub top_score: f64,
	pub reason: String,
}

pub struct GatingProvider {
	vector: Option<Arc<dyn Retriever>>,
	feedback: Option<Arc<FeedbackManager>>,
	feedback_cfg: FeedbackConfig,
}
impl GatingProvider {
	pub fn new(vector: Option<Arc<dyn Retriever>>) -> Self {
		Self { vector, feedback: None, feedback_cfg: FeedbackConfig::default() }
	}

	pub fn with_feedback(mut self, manager: Arc<FeedbackManager>, cfg: FeedbackConfig) -> Self {
		self.feedback = Some(manager);
		self.feedback_cfg = cfg;

		self
	}

	/// Runs the vector preflight and derives a decision.
	pub async fn evaluate(
		&self,
		query: &str,
		profile: &RetrievalProfile,
		metrics: &mut RetrievalMetrics,
	) -> GateDecision {
		let Some(vector) = self.vector.as_ref() else {
			return GateDecision { reason: "no_vector_retriever".to_string(), ..Default::default() };
		};

		if profile.vector_gate <= 0.0 && profile.vector_low_gate <= 0.0 {
			return GateDecision { reason: "gating_disabled".to_string(), ..Default::default() };
		}

		let limit = PREFLIGHT_LIMIT.min(profile.top_k.max(1));
		let start = std::time::Instant::now();
		let preflight = vector.search(query, limit).await;
		let latency_ms = start.elapsed().as_millis() as i64;
		let results = match preflight {
			Ok(results) if !results.is_empty() => results,
			Ok(_) => {
				tracing::warn!("Vector preflight returned no documents.");

				return GateDecision {
					reason: "preflight_failed".to_string(),
					..Default::default()
				};
			},
			Err(err) => {
				tracing::warn!("Vector preflight failed: {err}.");

				return GateDecision {
					reason: "preflight_failed".to_string(),
					..Default::default()
				};
			},
		};
		let top_score = results[0].score;

		metrics.add_retriever_stats(RetrieverStats {
			kind: "vector_preflight".to_string(),
			latency_ms,
			result_count: results.len(),
			avg_score: 0.0,
			top_score,
		});
		tracing::info!(
			top_score,
			gate = profile.vector_gate,
			low_gate = profile.vector_low_gate,
			"Vector preflight complete.",
		);

		let mut decision = GateDecision { top_score, ..Default::default() };

		if profile.vector_gate > 0.0
			&& top_score >= profile.vector_gate
			&& (profile.use_web || contains_retriever(&profile.retrievers, "web"))
		{
			decision.should_suppress_web = true;
			decision.reason = format!(
				"suppress_web:score={top_score:.4}>=gate={:.4}",
				profile.vector_gate
			);
		}

		if profile.vector_low_gate > 0.0 && top_score < profile.vector_low_gate {
			if profile.force_web_on_low {
				if !profile.use_web && !contains_retriever(&profile.retrievers, "web") {
					decision.should_force_web = true;
					decision.reason = format!(
						"force_web:score={top_score:.4}<low_gate={:.4}",
						profile.vector_low_gate
					);
				}
			} else {
				decision.reason = format!(
					"low_score:score={top_score:.4}<low_gate={:.4},no_force",
					profile.vector_low_gate
				);
			}
		}

		if decision.reason.is_empty() {
			decision.reason = format!("neutral:score={top_score:.4}");
		}

		metrics.add_gating_decision(decision.reason.clone());
		tracing::info!(reason = %decision.reason, "Gating decision.");

		decision
	}

	/// Applies the decision to the profile, then the feedback adjustments.
	pub fn apply_decision(
		&self,
		decision: &GateDecision,
		mut profile: RetrievalProfile,
	) -> RetrievalProfile {
		if decision.should_suppress_web {
			profile.use_web = false;
			profile
				.retrievers
				.retain(|key| !key.to_lowercase().contains("web"));
		}

		if decision.should_force_web {
			profile.use_web = true;

			if !contains_retriever(&profile.retrievers, "web") {
				profile.retrievers.push("web".to_string());
			}
		}

		self.apply_feedback_adjustments(profile)
	}

	/// Mutates `top_k` and the retriever set from recent verdict trends.
	///
	/// Runs only outside the cooldown. Consecutive incorrect or ambiguous
	/// verdicts past their thresholds widen `top_k` by one step (capped);
	/// enough consecutive confident verdicts narrow it down to a floor of
	/// three.
	fn apply_feedback_adjustments(&self, mut profile: RetrievalProfile) -> RetrievalProfile {
		let Some(feedback) = self.feedback.as_ref() else { return profile };
		let key = if profile.name.is_empty() { "default" } else { profile.name.as_str() };
		let cooldown = Duration::from_secs(self.feedback_cfg.cooldown_seconds);

		if feedback.in_cooldown(key, cooldown) {
			return profile;
		}

		let trend = feedback.trend(key, self.feedback_cfg.window);

		if trend.total == 0 {
			return profile;
		}

		let step = if self.feedback_cfg.adjustments.topk_step > 0 {
			self.feedback_cfg.adjustments.topk_step
		} else {
			DEFAULT_TOP_K_STEP
		};
		let thresholds = &self.feedback_cfg.thresholds;
		let mut adjusted = false;
		let low_quality = (thresholds.incorrect > 0
			&& trend.consecutive_incorrect >= thresholds.incorrect)
			|| (thresholds.ambiguous > 0 && trend.consecutive_ambiguous >= thresholds.ambiguous);

		if thresholds.incorrect > 0 && trend.consecutive_incorrect >= thresholds.incorrect {
			profile.top_k += step;
			adjusted = true;
			tracing::info!(
				consecutive = trend.consecutive_incorrect,
				"Feedback widened top_k after incorrect verdicts.",
			);
		} else if thresholds.ambiguous > 0 && trend.consecutive_ambiguous >= thresholds.ambiguous {
			profile.top_k += step;
			adjusted = true;
			tracing::info!(
				consecutive = trend.consecutive_ambiguous,
				"Feedback widened top_k after ambiguous verdicts.",
			);
		} else if thresholds.confident > 0
			&& trend.consecutive_confident >= thresholds.confident
			&& profile.top_k > step
		{
			profile.top_k = (profile.top_k - step).max(TOP_K_FLOOR);
			adjusted = true;
			tracing::info!(
				consecutive = trend.consecutive_confident,
				"Feedback narrowed top_k after confident verdicts.",
			);
		}

		if adjusted {
			let max = self.feedback_cfg.adjustments.topk_max;

			if max > 0 && profile.top_k > max {
				profile.top_k = max;
			}
			if profile.top_k == 0 {
				profile.top_k = 1;
			}
			if profile.per_retriever_top_k > profile.top_k || profile.per_retriever_top_k == 0 {
				profile.per_retriever_top_k = profile.top_k;
			}
			if self.feedback_cfg.adjustments.enable_force_web_on_low && low_quality {
				if !contains_retriever(&profile.retrievers, "web") {
					profile.retrievers.push("web".to_string());
				}

				profile.use_web = true;
			}

			feedback.mark_adjustment(key);
		}

		profile
	}
}

fn contains_retriever(retrievers: &[String], kind: &str) -> bool {
	retrievers.iter().any(|key| key.to_lowercase().contains(kind))
}
