//! Post-processing: reranking and context compression.

mod compress;
mod rerank;

pub use compress::{
	CompressMode, Compressor, HttpCompressor, LlmCompressor, TruncateCompressor, compress_text,
	compression_ratio, new_compressor,
};
pub use rerank::{
	HttpReranker, KeywordReranker, LlmReranker, ModelReranker, Reranker, new_reranker,
};
