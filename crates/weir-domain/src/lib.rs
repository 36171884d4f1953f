//! Core data model for the weir retrieval pipeline.
//!
//! This crate defines the shared value types (documents, search results,
//! verdicts, metrics records) and the pure helpers (trend analysis, cache-key
//! fingerprints) used by every other crate in the workspace. It performs no
//! I/O and holds no mutable state.

pub mod document;
pub mod fingerprint;
pub mod metrics;
pub mod verdict;

pub use document::{
	Document, META_CASCADE_STAGE, META_REFINED, META_RETRIEVER_PROVIDER, META_RETRIEVER_TYPE,
	META_SOURCE, META_TITLE, META_URL, SearchResult,
};
pub use fingerprint::{CacheKeyParts, budgets_signature, cache_key, fnv1a_32};
pub use metrics::{RetrievalMetrics, RetrieverStats};
pub use verdict::{Trend, Verdict, VerdictRecord, trend_of};
