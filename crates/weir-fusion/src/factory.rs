use std::{sync::Arc, time::Duration};

use serde_json::Value;

use crate::{
	DistributionStrategy, Error, FusionParams, FusionStrategy, LearnedStrategy, LinearStrategy,
	Result, RrfStrategy, SimpleStrategy, WeightedStrategy, WeightsLoader,
	types::{lookup_str, lookup_usize, parse_weight_map, parse_weight_vec},
};

/// Builds a strategy by name, returning it together with the sanitized
/// parameter map the retrieval provider should carry.
///
/// An empty name means `rrf`; unknown names are an error so the caller can
/// fall back explicitly.
pub fn new_strategy(
	name: &str,
	params: &FusionParams,
) -> Result<(Box<dyn FusionStrategy>, FusionParams)> {
	let normalized = name.trim().to_lowercase();
	let normalized = if normalized.is_empty() { "rrf" } else { normalized.as_str() };

	match normalized {
		"rrf" => {
			let k = match lookup_usize(params, "k") {
				0 => 60,
				k => k,
			};
			let mut sanitized = FusionParams::new();

			sanitized.insert("k".to_string(), Value::from(k));

			Ok((Box::new(RrfStrategy::new(k)), sanitized))
		},
		"weighted" => {
			let weights = parse_weight_map(params.get("weights")).unwrap_or_default();
			let mut sanitized = FusionParams::new();

			sanitized.insert(
				"weights".to_string(),
				Value::Object(
					weights.iter().map(|(k, v)| (k.clone(), Value::from(*v))).collect(),
				),
			);

			if let Some(mode) = lookup_str(params, "accumulate") {
				sanitized.insert("accumulate".to_string(), Value::from(mode));
			}

			Ok((Box::new(WeightedStrategy::new(weights)), sanitized))
		},
		"linear" => {
			let weights = parse_weight_vec(params.get("weights")).unwrap_or_default();
			let mut sanitized = FusionParams::new();

			sanitized.insert(
				"weights".to_string(),
				Value::Array(weights.iter().map(|w| Value::from(*w)).collect()),
			);

			Ok((Box::new(LinearStrategy::new(weights)), sanitized))
		},
		"simple" => {
			let top_k = lookup_usize(params, "top_k");
			let mut sanitized = FusionParams::new();

			sanitized.insert("top_k".to_string(), Value::from(top_k));

			Ok((Box::new(SimpleStrategy::new(top_k)), sanitized))
		},
		"distribution" => {
			let base_name = lookup_str(params, "base").unwrap_or("rrf");
			let (base, _) = new_strategy(base_name, params)?;

			Ok((Box::new(DistributionStrategy::new(base)), params.clone()))
		},
		"learned" => {
			let uri = lookup_str(params, "weights_uri").ok_or(Error::MissingWeightsUri)?;
			let timeout = Duration::from_millis(lookup_usize(params, "timeout_ms") as u64);
			let ttl = Duration::from_secs(lookup_usize(params, "refresh_seconds") as u64);
			let fallback_name = lookup_str(params, "fallback").unwrap_or("rrf");
			let (fallback, fallback_params) = new_strategy(fallback_name, params)?;
			let loader = Arc::new(WeightsLoader::new(uri, ttl)?);
			let strategy = LearnedStrategy::new(loader, fallback, timeout);
			let mut sanitized = FusionParams::new();

			sanitized.insert("weights_uri".to_string(), Value::from(uri));
			sanitized.insert(
				"timeout_ms".to_string(),
				Value::from(if timeout.is_zero() { 10 } else { timeout.as_millis() as u64 }),
			);
			sanitized.insert(
				"refresh_seconds".to_string(),
				Value::from(if ttl.is_zero() { 60 } else { ttl.as_secs() }),
			);
			sanitized.insert("fallback".to_string(), Value::from(fallback_name));

			for (key, value) in fallback_params {
				sanitized.insert(format!("fallback_{key}"), value);
			}

			let percent = lookup_usize(params, "traffic_percent");

			if percent > 0 {
				sanitized.insert("traffic_percent".to_string(), Value::from(percent));
			}

			Ok((Box::new(strategy), sanitized))
		},
		other => Err(Error::UnknownStrategy { name: other.to_string() }),
	}
}
