use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

/// Metadata key identifying which retriever produced a document.
pub const META_RETRIEVER_TYPE: &str = "retriever_type";
/// Metadata key identifying the concrete backend instance, when known.
pub const META_RETRIEVER_PROVIDER: &str = "retriever_provider";
/// Metadata key marking which cascade stage emitted a document.
pub const META_CASCADE_STAGE: &str = "cascade_stage";
/// Metadata key set when a document's content was rewritten by the refiner.
pub const META_REFINED: &str = "refined";
pub const META_SOURCE: &str = "source";
pub const META_TITLE: &str = "title";
pub const META_URL: &str = "url";

/// A retrievable chunk of text with a stable identity.
///
/// `id` must be unique per chunk and non-empty by the time fusion runs;
/// fusion strategies silently drop documents with empty ids. `metadata` is
/// always present (possibly empty) and carries at least
/// [`META_RETRIEVER_TYPE`] once a retriever has touched the document.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Document {
	pub id: String,
	#[serde(default)]
	pub content: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub vector: Option<Vec<f32>>,
	#[serde(default)]
	pub metadata: Map<String, Value>,
	#[serde(
		default,
		with = "time::serde::rfc3339::option",
		skip_serializing_if = "Option::is_none"
	)]
	pub created_at: Option<OffsetDateTime>,
}
impl Document {
	pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
		Self { id: id.into(), content: content.into(), ..Default::default() }
	}

	/// Returns the retriever type recorded in metadata, if any.
	pub fn retriever_type(&self) -> Option<&str> {
		self.metadata.get(META_RETRIEVER_TYPE).and_then(Value::as_str)
	}

	/// Records which retriever produced this document.
	pub fn set_retriever_type(&mut self, kind: &str) {
		self.metadata.insert(META_RETRIEVER_TYPE.to_string(), Value::String(kind.to_string()));
	}

	pub fn set_metadata(&mut self, key: &str, value: impl Into<Value>) {
		self.metadata.insert(key.to_string(), value.into());
	}
}

/// A document paired with a score.
///
/// The score is retriever-local until fusion replaces it with a fused score;
/// the reranker overwrites it again with a relevance score. Corrective
/// actions may reorder results without rewriting scores.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct SearchResult {
	pub document: Document,
	pub score: f64,
}
impl SearchResult {
	pub fn new(document: Document, score: f64) -> Self {
		Self { document, score }
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn clone_is_a_deep_copy() {
		let mut doc = Document::new("d1", "hello");

		doc.vector = Some(vec![0.1, 0.2]);
		doc.set_metadata("title", "greeting");

		let mut cloned = doc.clone();

		cloned.set_metadata("title", "changed");

		if let Some(vector) = cloned.vector.as_mut() {
			vector[0] = 9.0;
		}

		assert_eq!(doc.metadata.get("title").and_then(Value::as_str), Some("greeting"));
		assert_eq!(doc.vector.as_deref(), Some(&[0.1_f32, 0.2][..]));
	}

	#[test]
	fn retriever_type_round_trips() {
		let mut doc = Document::new("d1", "text");

		assert_eq!(doc.retriever_type(), None);

		doc.set_retriever_type("vector");

		assert_eq!(doc.retriever_type(), Some("vector"));
	}

	#[test]
	fn serializes_without_empty_optionals() {
		let doc = Document::new("d1", "text");
		let json = serde_json::to_value(&doc).expect("document must serialize");

		assert!(json.get("vector").is_none());
		assert!(json.get("created_at").is_none());
	}
}
