use std::{collections::BTreeMap, fmt::Write};

use sha1::{Digest, Sha1};

/// 32-bit FNV-1a hash, used for deterministic traffic splitting.
pub fn fnv1a_32(input: &str) -> u32 {
	const OFFSET_BASIS: u32 = 0x811C_9DC5;
	const PRIME: u32 = 0x0100_0193;

	let mut hash = OFFSET_BASIS;

	for byte in input.as_bytes() {
		hash ^= u32::from(*byte);
		hash = hash.wrapping_mul(PRIME);
	}

	hash
}

/// Deterministic `key=value;` signature over variant budgets.
///
/// Keys are emitted in sorted order so the same budgets always produce the
/// same signature regardless of insertion order. An empty map signs as `-`.
pub fn budgets_signature(budgets: &BTreeMap<String, usize>) -> String {
	if budgets.is_empty() {
		return "-".to_string();
	}

	let mut out = String::new();

	for (key, value) in budgets {
		let _ = write!(out, "{key}={value};");
	}

	out
}

/// Inputs that determine whether two queries may share a cached result.
#[derive(Clone, Debug)]
pub struct CacheKeyParts<'a> {
	pub query: &'a str,
	pub profile_name: &'a str,
	pub index_version: &'a str,
	pub top_k: usize,
	pub rerank_top_n: usize,
	pub variant_budgets: &'a BTreeMap<String, usize>,
	pub fusion_weights_version: &'a str,
}

/// Builds the L1 cache key: SHA-1 hex over the normalized query plus every
/// knob that changes the shape of the published result list.
pub fn cache_key(parts: &CacheKeyParts<'_>) -> String {
	let normalized = parts.query.trim().to_lowercase();
	let base = format!(
		"{normalized}|{}|{}|{}|{}|{}|{}",
		parts.profile_name,
		parts.index_version,
		parts.top_k,
		parts.rerank_top_n,
		budgets_signature(parts.variant_budgets),
		parts.fusion_weights_version,
	);
	let digest = Sha1::digest(base.as_bytes());
	let mut out = String::with_capacity(digest.len() * 2);

	for byte in digest {
		let _ = write!(out, "{byte:02x}");
	}

	out
}
