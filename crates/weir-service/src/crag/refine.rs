use std::sync::Arc;

use weir_providers::llm::LlmClient;

const REWRITE_SYSTEM_PROMPT: &str = "You are an expert at creating effective search queries.
Rewrite the given query to make it more suitable for a web search engine.
Focus on keywords and facts, remove unnecessary words, and make it concise.";

const REFINE_SYSTEM_PROMPT: &str = "Extract the key information from the following text as a set of clear, concise bullet points.
Focus on the most relevant facts and important details.
Format your response as a bulleted list with each point on a new line starting with \"- \".";

/// Rewrites queries into web-search-friendly form.
pub struct QueryRewriter {
	llm: Arc<dyn LlmClient>,
}
impl QueryRewriter {
	pub fn new(llm: Arc<dyn LlmClient>) -> Self {
		Self { llm }
	}

	/// Returns the rewritten query, or the original when the call fails or
	/// produces nothing.
	pub async fn rewrite(&self, original: &str) -> String {
		let prompt =
			format!("{REWRITE_SYSTEM_PROMPT}\n\nOriginal query: {original}\n\nRewritten query:");

		match self.llm.complete(&prompt).await {
			Ok(response) => {
				let rewritten = response.trim();

				if rewritten.is_empty() {
					original.to_string()
				} else {
					tracing::info!(original, rewritten, "Query rewritten for web search.");

					rewritten.to_string()
				}
			},
			Err(err) => {
				tracing::warn!("Query rewrite failed: {err}, using original.");

				original.to_string()
			},
		}
	}
}

/// Distills document content into bullet points.
pub struct KnowledgeRefiner {
	llm: Arc<dyn LlmClient>,
}
impl KnowledgeRefiner {
	pub fn new(llm: Arc<dyn LlmClient>) -> Self {
		Self { llm }
	}

	/// Returns the refined text, or the original when the call fails or
	/// produces nothing.
	pub async fn refine(&self, text: &str) -> String {
		let prompt = format!("{REFINE_SYSTEM_PROMPT}\n\nText to refine:\n\n{text}");

		match self.llm.complete(&prompt).await {
			Ok(response) => {
				let refined = response.trim();

				if refined.is_empty() {
					text.to_string()
				} else {
					tracing::info!(
						original_chars = text.len(),
						refined_chars = refined.len(),
						"Knowledge refined.",
					);

					refined.to_string()
				}
			},
			Err(err) => {
				tracing::warn!("Knowledge refinement failed: {err}, using original.");

				text.to_string()
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use weir_testkit::ScriptedLlm;

	use super::*;

	#[tokio::test]
	async fn rewrite_keeps_the_original_on_empty_output() {
		let rewriter = QueryRewriter::new(Arc::new(ScriptedLlm::new(vec!["  "])));

		assert_eq!(rewriter.rewrite("original query").await, "original query");
	}

	#[tokio::test]
	async fn rewrite_uses_the_llm_output() {
		let rewriter = QueryRewriter::new(Arc::new(ScriptedLlm::new(vec!["k8s pod scheduling"])));

		assert_eq!(
			rewriter.rewrite("how does kubernetes schedule pods?").await,
			"k8s pod scheduling"
		);
	}

	#[tokio::test]
	async fn refine_returns_bullets() {
		let refiner = KnowledgeRefiner::new(Arc::new(ScriptedLlm::new(vec!["- fact one\n- fact two"])));

		assert_eq!(refiner.refine("long source text").await, "- fact one\n- fact two");
	}
}
