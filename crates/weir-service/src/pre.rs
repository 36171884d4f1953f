//! Pre-retrieve planning: memory intake, context alignment, query planning,
//! expansion, and HYDE drafting.
//!
//! Every stage can be disabled on its own; a failing stage logs and
//! preserves the upstream state, so planning never blocks retrieval.

use std::{
	collections::{HashMap, VecDeque},
	sync::{Arc, Mutex},
	time::Instant,
};

use async_trait::async_trait;
use weir_config::PreRetrieveConfig;
use weir_providers::llm::LlmClient;

const DEFAULT_LAST_ROUNDS: usize = 3;
const DEFAULT_MAX_SUB_QUERIES: usize = 3;
const DEFAULT_MIN_QUERY_LENGTH: usize = 10;
const DEFAULT_DOC_LENGTH: usize = 120;

/// One prior question/answer exchange.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConversationRound {
	pub question: String,
	pub answer: String,
}

/// Session history consulted during memory intake.
#[async_trait]
pub trait SessionStore: Send + Sync {
	async fn last_rounds(&self, session_id: &str, n: usize) -> Vec<ConversationRound>;
	async fn doc_ids(&self, session_id: &str) -> Vec<String>;
	async fn save_round(&self, session_id: &str, round: ConversationRound);
}

#[derive(Default)]
struct SessionState {
	rounds: VecDeque<ConversationRound>,
	doc_ids: Vec<String>,
}

/// Bounded in-memory session store.
pub struct InMemorySessionStore {
	max_rounds: usize,
	inner: Mutex<HashMap<String, SessionState>>,
}
impl InMemorySessionStore {
	pub fn new(max_rounds: usize) -> Self {
		Self {
			max_rounds: if max_rounds == 0 { DEFAULT_LAST_ROUNDS } else { max_rounds },
			inner: Mutex::new(HashMap::new()),
		}
	}
}
#[async_trait]
impl SessionStore for InMemorySessionStore {
	async fn last_rounds(&self, session_id: &str, n: usize) -> Vec<ConversationRound> {
		let inner = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
		let Some(state) = inner.get(session_id) else { return Vec::new() };
		let n = if n == 0 { state.rounds.len() } else { n };

		state.rounds.iter().rev().take(n).rev().cloned().collect()
	}

	async fn doc_ids(&self, session_id: &str) -> Vec<String> {
		let inner = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

		inner.get(session_id).map(|state| state.doc_ids.clone()).unwrap_or_default()
	}

	async fn save_round(&self, session_id: &str, round: ConversationRound) {
		let mut inner = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
		let state = inner.entry(session_id.to_string()).or_default();

		state.rounds.push_back(round);

		while state.rounds.len() > self.max_rounds {
			state.rounds.pop_front();
		}
	}
}

/// Whether a query likely spans one document or several.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Cardinality {
	Single,
	Multi,
	#[default]
	Unknown,
}

/// One plannable sub-query with channel-specific rewrites.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PlanNode {
	pub id: String,
	pub query: String,
	pub sparse_rewrite: String,
	pub dense_rewrite: String,
}

/// A term added for sparse retrieval.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExpansionTerm {
	pub term: String,
	pub weight: f64,
	/// `llm`, `taxonomy`, or `synonym`.
	pub source: String,
}

/// A HYDE draft with its heuristic quality score.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HydeDraft {
	pub text: String,
	pub quality_score: f64,
}

/// The planner's complete output for one query.
#[derive(Clone, Debug, Default)]
pub struct QueryPlan {
	pub aligned_query: String,
	pub alignment_ops: Vec<String>,
	pub cardinality: Cardinality,
	pub nodes: Vec<PlanNode>,
	pub expansions: HashMap<String, Vec<ExpansionTerm>>,
	pub hyde_drafts: HashMap<String, HydeDraft>,
	pub processing_ms: i64,
}
impl QueryPlan {
	/// Dense rewrites in node order, for use as the retrieval query list.
	pub fn dense_queries(&self) -> Vec<String> {
		let mut seen = std::collections::HashSet::new();
		let mut out = Vec::with_capacity(self.nodes.len());

		for node in &self.nodes {
			let rewrite = node.dense_rewrite.trim();

			if rewrite.is_empty() {
				continue;
			}
			if seen.insert(rewrite.to_lowercase()) {
				out.push(rewrite.to_string());
			}
		}

		out
	}
}

pub struct PreRetrievePlanner {
	cfg: PreRetrieveConfig,
	llm: Option<Arc<dyn LlmClient>>,
	sessions: Arc<dyn SessionStore>,
	taxonomy: HashMap<&'static str, Vec<&'static str>>,
	synonyms: HashMap<&'static str, Vec<&'static str>>,
}
impl PreRetrievePlanner {
	pub fn new(
		cfg: PreRetrieveConfig,
		llm: Option<Arc<dyn LlmClient>>,
		sessions: Arc<dyn SessionStore>,
	) -> Self {
		Self {
			cfg,
			llm,
			sessions,
			taxonomy: HashMap::from([
				("kubernetes", vec!["k8s", "container", "orchestration", "pod", "deployment"]),
				("database", vec!["sql", "nosql", "data", "storage", "query"]),
			]),
			synonyms: HashMap::from([
				("kubernetes", vec!["k8s"]),
				("k8s", vec!["kubernetes"]),
				("database", vec!["db", "datastore"]),
			]),
		}
	}

	pub async fn plan(&self, query: &str, session_id: &str) -> QueryPlan {
		let start = Instant::now();
		let rounds = if self.cfg.memory.enabled && !session_id.is_empty() {
			let n = if self.cfg.memory.last_n_rounds > 0 {
				self.cfg.memory.last_n_rounds
			} else {
				DEFAULT_LAST_ROUNDS
			};

			self.sessions.last_rounds(session_id, n).await
		} else {
			Vec::new()
		};
		let (aligned_query, alignment_ops) = self.align(query, &rounds).await;
		let (cardinality, sub_queries) = self.decompose(&aligned_query).await;
		let mut nodes = Vec::with_capacity(sub_queries.len());

		for (at, sub_query) in sub_queries.iter().enumerate() {
			let (sparse_rewrite, dense_rewrite) = if self.cfg.planning.enabled {
				self.channel_rewrite(sub_query).await
			} else {
				(sub_query.clone(), sub_query.clone())
			};

			nodes.push(PlanNode {
				id: format!("node_{at}"),
				query: sub_query.clone(),
				sparse_rewrite,
				dense_rewrite,
			});
		}

		let mut plan = QueryPlan {
			aligned_query,
			alignment_ops,
			cardinality,
			nodes,
			..Default::default()
		};

		if self.cfg.expansion.enabled {
			plan.expansions = self.expand(&plan.nodes).await;
		}
		if self.cfg.hyde.enabled {
			plan.hyde_drafts = self.draft_hyde(&plan.nodes).await;
		}

		plan.processing_ms = start.elapsed().as_millis() as i64;

		plan
	}

	/// Pronoun resolution and time normalization against recent rounds.
	async fn align(
		&self,
		query: &str,
		rounds: &[ConversationRound],
	) -> (String, Vec<String>) {
		let mut aligned = query.to_string();
		let mut ops = Vec::new();

		if !self.cfg.alignment.enabled || rounds.is_empty() {
			return (aligned, ops);
		}

		let Some(llm) = self.llm.as_ref() else { return (aligned, ops) };

		if self.cfg.alignment.resolve_pronouns {
			let mut history = String::new();

			for (at, round) in rounds.iter().enumerate() {
				history.push_str(&format!(
					"Q{}: {}\nA{}: {}\n",
					at + 1,
					round.question,
					at + 1,
					round.answer
				));
			}

			let prompt = format!(
				"Based on the conversation history, resolve any pronouns or ambiguous references in the current query to make it self-contained.\n\nConversation History:\n{history}\n\nCurrent Query: {aligned}\n\nPlease rewrite the query to be self-contained without pronouns or unclear references. Only output the rewritten query, no explanations.\n\nRewritten Query:"
			);

			if let Ok(resolved) = llm.complete(&prompt).await {
				let resolved = resolved.trim();

				if !resolved.is_empty() && resolved != aligned {
					aligned = resolved.to_string();
					ops.push("pronoun_resolution".to_string());
				}
			}
		}

		if self.cfg.alignment.normalize_time {
			let prompt = format!(
				"Normalize any relative time expressions in the query to absolute or standardized forms.\n\nQuery: {aligned}\n\nIf there are relative time expressions (like \"yesterday\", \"last week\", \"recently\"), convert them to more specific or absolute forms. If there are no time expressions, return the original query unchanged.\n\nOnly output the normalized query, no explanations.\n\nNormalized Query:"
			);

			if let Ok(normalized) = llm.complete(&prompt).await {
				let normalized = normalized.trim();

				if !normalized.is_empty() && normalized != aligned {
					aligned = normalized.to_string();
					ops.push("time_normalization".to_string());
				}
			}
		}

		(aligned, ops)
	}

	/// Cardinality classification plus optional decomposition.
	async fn decompose(&self, query: &str) -> (Cardinality, Vec<String>) {
		if !self.cfg.planning.enabled {
			return (Cardinality::Single, vec![query.to_string()]);
		}

		let mut cardinality = heuristic_cardinality(query);

		if let Some(llm) = self.llm.as_ref() {
			let prompt = format!(
				"Analyze the query and determine if it requires information from a single document or multiple documents.\n\nQuery: {query}\n\nConsider:\n- Does it contain conjunctions like \"and\", \"or\", \"compare\"?\n- Does it ask for multiple entities or concepts?\n- Is it a comparison question?\n\nAnswer with only one word: \"single\" or \"multi\"\n\nAnswer:"
			);

			if let Ok(answer) = llm.complete(&prompt).await {
				let answer = answer.trim().to_lowercase();

				if answer.contains("multi") {
					cardinality = Cardinality::Multi;
				} else if answer.contains("single") {
					cardinality = Cardinality::Single;
				}
			}
		}

		if cardinality != Cardinality::Multi || !self.cfg.planning.enable_decomposition {
			return (cardinality, vec![query.to_string()]);
		}

		let Some(llm) = self.llm.as_ref() else {
			return (cardinality, vec![query.to_string()]);
		};
		let prompt = format!(
			"Decompose the complex query into 1-3 independent sub-queries that can be searched separately.\n\nQuery: {query}\n\nRequirements:\n- Each sub-query should be self-contained\n- Sub-queries should be independent and can be executed in parallel\n- If the query is simple and cannot be decomposed, return only the original query\n\nOutput format (one sub-query per line):\n1. [first sub-query]\n2. [second sub-query]\n3. [third sub-query]\n\nSub-queries:"
		);
		let sub_queries = match llm.complete(&prompt).await {
			Ok(response) => parse_numbered_lines(&response),
			Err(err) => {
				tracing::warn!("Query decomposition failed: {err}.");

				Vec::new()
			},
		};

		if sub_queries.is_empty() {
			return (Cardinality::Single, vec![query.to_string()]);
		}

		let max = if self.cfg.planning.max_sub_queries > 0 {
			self.cfg.planning.max_sub_queries
		} else {
			DEFAULT_MAX_SUB_QUERIES
		};

		(cardinality, sub_queries.into_iter().take(max).collect())
	}

	/// Sparse and dense rewrites for one sub-query.
	async fn channel_rewrite(&self, query: &str) -> (String, String) {
		let Some(llm) = self.llm.as_ref() else {
			return (query.to_string(), query.to_string());
		};
		let sparse_prompt = format!(
			"Rewrite the query for sparse retrieval (BM25/keyword search):\n- Use explicit keywords and terms\n- Expand abbreviations\n- Include synonyms where appropriate\n- Make it keyword-rich for lexical matching\n\nOriginal Query: {query}\n\nSparse Rewrite:"
		);
		let sparse = match llm.complete(&sparse_prompt).await {
			Ok(rewrite) if !rewrite.trim().is_empty() => rewrite.trim().to_string(),
			_ => query.to_string(),
		};
		let dense_prompt = format!(
			"Rewrite the query for dense retrieval (semantic search):\n- Make it semantically clear and concise\n- Focus on the core intent\n- Remove redundant words\n- Optimize for semantic similarity\n\nOriginal Query: {query}\n\nDense Rewrite:"
		);
		let dense = match llm.complete(&dense_prompt).await {
			Ok(rewrite) if !rewrite.trim().is_empty() => rewrite.trim().to_string(),
			_ => query.to_string(),
		};

		(sparse, dense)
	}

	/// LLM, taxonomy, and synonym expansion terms, capped by `max_terms`.
	async fn expand(&self, nodes: &[PlanNode]) -> HashMap<String, Vec<ExpansionTerm>> {
		let mut expansions = HashMap::with_capacity(nodes.len());

		for node in nodes {
			let mut terms = Vec::new();

			if let Some(llm) = self.llm.as_ref() {
				let prompt = format!(
					"Generate 3-6 expansion terms for sparse retrieval (BM25) of the following query.\n\nQuery: {}\n\nRequirements:\n- Include related keywords and terminology\n- Include domain-specific terms\n- Include potential synonyms or variants\n- Avoid stopwords and overly generic terms\n\nOutput format (one term per line with weight 0.5-1.0):\nterm1 | weight | facet\nterm2 | weight | facet\n\nExpansion Terms:",
					node.sparse_rewrite
				);

				if let Ok(response) = llm.complete(&prompt).await {
					terms.extend(parse_expansion_terms(&response));
				}
			}

			for word in node.query.split_whitespace() {
				let word = word.to_lowercase();

				if let Some(related) = self.taxonomy.get(word.as_str()) {
					terms.extend(related.iter().map(|term| ExpansionTerm {
						term: (*term).to_string(),
						weight: 0.6,
						source: "taxonomy".to_string(),
					}));
				}
				if let Some(synonyms) = self.synonyms.get(word.as_str()) {
					terms.extend(synonyms.iter().map(|term| ExpansionTerm {
						term: (*term).to_string(),
						weight: 0.8,
						source: "synonym".to_string(),
					}));
				}
			}

			if self.cfg.expansion.max_terms > 0 && terms.len() > self.cfg.expansion.max_terms {
				terms.truncate(self.cfg.expansion.max_terms);
			}

			expansions.insert(node.id.clone(), terms);
		}

		expansions
	}

	/// Hypothetical-document drafts for short queries, with guardrails.
	async fn draft_hyde(&self, nodes: &[PlanNode]) -> HashMap<String, HydeDraft> {
		let Some(llm) = self.llm.as_ref() else { return HashMap::new() };
		let min_query_length = if self.cfg.hyde.min_query_length > 0 {
			self.cfg.hyde.min_query_length
		} else {
			DEFAULT_MIN_QUERY_LENGTH
		};
		let target_length = if self.cfg.hyde.generated_doc_length > 0 {
			self.cfg.hyde.generated_doc_length
		} else {
			DEFAULT_DOC_LENGTH
		};
		let mut drafts = HashMap::new();

		for node in nodes {
			let short = node.query.len() < min_query_length
				|| node.query.split_whitespace().count() < 5;

			if !short {
				continue;
			}

			let prompt = format!(
				"Generate a hypothetical document passage that would be highly relevant to answering the following query.\n\nQuery: {}\n\nRequirements:\n- The passage should be {target_length}-150 words\n- Write as if it's an excerpt from a relevant document\n- Include specific details and terminology\n- Make it informative and directly relevant to the query\n- Do not include phrases like \"This document discusses...\" - write the content directly\n\nHypothetical Document:",
				node.dense_rewrite
			);
			let text = match llm.complete(&prompt).await {
				Ok(text) => text.trim().to_string(),
				Err(err) => {
					tracing::warn!(node = %node.id, "HYDE draft failed: {err}.");

					continue;
				},
			};
			let quality_score = hyde_quality_score(&text, &node.query);

			if self.cfg.hyde.enable_perplexity_check && quality_score < 0.4 {
				continue;
			}
			if self.cfg.hyde.enable_nli_guardrail {
				let words = text.split_whitespace().count();

				if !(30..=300).contains(&words) {
					continue;
				}
			}

			drafts.insert(node.id.clone(), HydeDraft { text, quality_score });
		}

		drafts
	}
}

/// Length-band and keyword-coverage quality heuristic.
fn hyde_quality_score(text: &str, query: &str) -> f64 {
	let mut score = 0.5;
	let words = text.split_whitespace().count();

	if (50..=200).contains(&words) {
		score += 0.2;
	}

	let lowered = text.to_lowercase();
	let query_words: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
	let matched = query_words
		.iter()
		.filter(|word| word.len() > 3 && lowered.contains(word.as_str()))
		.count();

	if !query_words.is_empty() {
		score += matched as f64 / query_words.len() as f64 * 0.3;
	}

	score
}

fn heuristic_cardinality(query: &str) -> Cardinality {
	let lowered = query.to_lowercase();
	let multi = lowered.contains(" and ")
		|| lowered.contains(" or ")
		|| lowered.contains("compare")
		|| lowered.contains(" versus ")
		|| lowered.contains(" vs ");

	if multi { Cardinality::Multi } else { Cardinality::Single }
}

/// Parses `1. sub-query` style lines, tolerating plain lines.
fn parse_numbered_lines(response: &str) -> Vec<String> {
	let mut out = Vec::new();

	for line in response.lines() {
		let mut line = line.trim();

		if line.is_empty() {
			continue;
		}

		let bytes = line.as_bytes();

		if line.len() > 3 && bytes[0].is_ascii_digit() && bytes[1] == b'.' {
			line = line[2..].trim();
		}

		if !line.is_empty() {
			out.push(line.to_string());
		}
	}

	out
}

/// Parses `term | weight | facet` lines from the expansion prompt.
fn parse_expansion_terms(response: &str) -> Vec<ExpansionTerm> {
	let mut out = Vec::new();

	for line in response.lines() {
		let line = line.trim();

		if line.is_empty() || line.starts_with("//") || line.starts_with('#') {
			continue;
		}

		let parts: Vec<&str> = line.split('|').collect();

		if parts.len() < 2 {
			continue;
		}

		let term = parts[0].trim();

		if term.is_empty() {
			continue;
		}

		let weight = parts[1].trim().parse().unwrap_or(0.7);

		out.push(ExpansionTerm {
			term: term.to_string(),
			weight,
			source: "llm".to_string(),
		});
	}

	out
}
