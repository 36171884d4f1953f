use serde_json::Value;
use weir_domain::{META_REFINED, SearchResult};
use weir_providers::retriever::WebSearcher;

use crate::crag::{KnowledgeRefiner, QueryRewriter};

const WEB_FALLBACK_RESULTS: usize = 3;

/// Dependencies available to corrective actions; all optional.
pub struct ActionContext<'a> {
	pub query: &'a str,
	pub refiner: Option<&'a KnowledgeRefiner>,
	pub web_searcher: Option<&'a WebSearcher>,
	pub query_rewriter: Option<&'a QueryRewriter>,
}

/// High relevance: keep the candidates, optionally refining each document's
/// content in place.
pub async fn correct_action(
	ctx: &ActionContext<'_>,
	cands: Vec<SearchResult>,
) -> Vec<SearchResult> {
	tracing::info!(count = cands.len(), "Corrective action: accept.");

	let Some(refiner) = ctx.refiner else { return cands };
	let mut refined = Vec::with_capacity(cands.len());

	for mut result in cands {
		let content = refiner.refine(&result.document.content).await;

		if !content.is_empty() {
			result.document.content = content;
		}

		refined.push(result);
	}

	refined
}

/// Low relevance: replace the candidates with fresh web results.
///
/// Without a web searcher this returns an empty list, handing the fallback
/// decision to the caller.
pub async fn incorrect_action(ctx: &ActionContext<'_>) -> Vec<SearchResult> {
	tracing::info!("Corrective action: replace via web search.");

	let Some(searcher) = ctx.web_searcher else {
		tracing::warn!("Web search unavailable for corrective replacement.");

		return Vec::new();
	};

	if ctx.query.is_empty() {
		return Vec::new();
	}

	let query = match ctx.query_rewriter {
		Some(rewriter) => rewriter.rewrite(ctx.query).await,
		None => ctx.query.to_string(),
	};
	let results = match searcher.search(&query, WEB_FALLBACK_RESULTS).await {
		Ok(results) => results,
		Err(err) => {
			tracing::warn!("Corrective web search failed: {err}.");

			return Vec::new();
		},
	};
	let Some(refiner) = ctx.refiner else { return results };
	let mut refined = Vec::with_capacity(results.len());

	for mut result in results {
		let content = refiner.refine(&result.document.content).await;

		if !content.is_empty() {
			result.document.content = content;
		}

		refined.push(result);
	}

	refined
}

/// Medium relevance: blend internal candidates with external web results.
///
/// When no external results are supplied they are fetched as in
/// [`incorrect_action`]; if none can be obtained the internal candidates
/// pass through [`correct_action`]. Refined documents are marked with
/// `metadata.refined = true`.
pub async fn ambiguous_action(
	ctx: &ActionContext<'_>,
	internal: Vec<SearchResult>,
	mut external: Vec<SearchResult>,
) -> Vec<SearchResult> {
	tracing::info!(
		internal = internal.len(),
		external = external.len(),
		"Corrective action: blend.",
	);

	if external.is_empty()
		&& let Some(searcher) = ctx.web_searcher
		&& !ctx.query.is_empty()
	{
		let query = match ctx.query_rewriter {
			Some(rewriter) => rewriter.rewrite(ctx.query).await,
			None => ctx.query.to_string(),
		};

		match searcher.search(&query, WEB_FALLBACK_RESULTS).await {
			Ok(results) => external = results,
			Err(err) => tracing::warn!("Blending web search failed: {err}."),
		}
	}

	if external.is_empty() {
		if ctx.refiner.is_some() {
			return correct_action(ctx, internal).await;
		}

		return internal;
	}

	let mut combined = Vec::with_capacity(internal.len() + external.len());

	match ctx.refiner {
		Some(refiner) => {
			for mut result in internal.into_iter().chain(external) {
				let content = refiner.refine(&result.document.content).await;

				if !content.is_empty() {
					result.document.content = content;
					result.document.set_metadata(META_REFINED, Value::Bool(true));
				}

				combined.push(result);
			}
		},
		None => {
			combined.extend(internal);
			combined.extend(external);
		},
	}

	combined
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use weir_testkit::{ScriptedLlm, scored};

	use super::*;

	fn no_deps(query: &str) -> ActionContext<'_> {
		ActionContext { query, refiner: None, web_searcher: None, query_rewriter: None }
	}

	#[tokio::test]
	async fn correct_action_is_passthrough_without_a_refiner() {
		let cands = vec![scored("a", "first", 0.9), scored("b", "second", 0.8)];
		let out = correct_action(&no_deps("q"), cands.clone()).await;

		assert_eq!(out, cands);
	}

	#[tokio::test]
	async fn correct_action_refines_content_but_keeps_scores() {
		let llm = Arc::new(ScriptedLlm::new(vec!["- bullet"]));
		let refiner = KnowledgeRefiner::new(llm);
		let ctx = ActionContext {
			query: "q",
			refiner: Some(&refiner),
			web_searcher: None,
			query_rewriter: None,
		};
		let cands = vec![scored("a", "first", 0.9), scored("b", "second", 0.8)];
		let out = correct_action(&ctx, cands).await;

		assert_eq!(out.len(), 2);
		assert!(out.iter().all(|result| result.document.content == "- bullet"));
		assert!((out[0].score - 0.9).abs() < 1e-12);
		assert!((out[1].score - 0.8).abs() < 1e-12);
	}

	#[tokio::test]
	async fn incorrect_action_without_web_returns_empty() {
		assert!(incorrect_action(&no_deps("q")).await.is_empty());
	}

	#[tokio::test]
	async fn ambiguous_action_falls_back_to_internal() {
		let internal = vec![scored("a", "first", 0.9)];
		let out = ambiguous_action(&no_deps("q"), internal.clone(), Vec::new()).await;

		assert_eq!(out, internal);
	}

	#[tokio::test]
	async fn ambiguous_action_combines_and_marks_refined() {
		let llm = Arc::new(ScriptedLlm::new(vec!["- refined"]));
		let refiner = KnowledgeRefiner::new(llm);
		let ctx = ActionContext {
			query: "q",
			refiner: Some(&refiner),
			web_searcher: None,
			query_rewriter: None,
		};
		let internal = vec![scored("a", "internal", 0.9)];
		let external = vec![scored("https://x", "external", 0.0)];
		let out = ambiguous_action(&ctx, internal, external).await;

		assert_eq!(out.len(), 2);
		assert!(out.iter().all(|result| {
			result.document.metadata.get(META_REFINED).and_then(Value::as_bool) == Some(true)
		}));
	}
}
