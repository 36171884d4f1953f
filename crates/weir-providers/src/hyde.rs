use std::{sync::Arc, time::Duration};

use serde::Deserialize;
use weir_config::HydeConfig;

use crate::{Error, HttpClient, Result};

const DEFAULT_HYDE_TIMEOUT: Duration = Duration::from_millis(150);

/// Client for HYDE seed generation.
///
/// With provider `pre` (or empty) seeds come from the planner upstream and
/// this client is a no-op; with provider `http` it posts the query to the
/// configured endpoint under a tight per-call timeout.
pub struct HydeClient {
	client: Arc<HttpClient>,
}
impl HydeClient {
	pub fn new(client: Arc<HttpClient>) -> Self {
		Self { client }
	}

	pub async fn generate_seeds(&self, cfg: &HydeConfig, query: &str) -> Result<Vec<String>> {
		if !cfg.enable || query.trim().is_empty() {
			return Ok(Vec::new());
		}

		match cfg.provider.trim() {
			"" | "pre" => Ok(Vec::new()),
			"http" => self.generate_http(cfg, query).await,
			other => {
				tracing::warn!(provider = other, "Unknown HYDE provider, skipping seeds.");

				Ok(Vec::new())
			},
		}
	}

	async fn generate_http(&self, cfg: &HydeConfig, query: &str) -> Result<Vec<String>> {
		let endpoint = cfg.endpoint.trim();

		if endpoint.is_empty() {
			return Err(Error::not_configured("HYDE endpoint is required."));
		}

		let timeout = if cfg.timeout_ms > 0 {
			Duration::from_millis(cfg.timeout_ms)
		} else {
			DEFAULT_HYDE_TIMEOUT
		};
		let request = self
			.client
			.post(endpoint)
			.timeout(timeout)
			.json(&serde_json::json!({ "query": query }))
			.build()?;
		let response = self.client.execute(request).await?;

		if !response.status().is_success() {
			return Err(Error::UnexpectedStatus {
				status: response.status().as_u16(),
				url: endpoint.to_string(),
			});
		}

		let parsed: SeedResponse = response.json().await?;
		let mut seeds = parsed.seeds;

		if cfg.max_seeds > 0 && seeds.len() > cfg.max_seeds {
			seeds.truncate(cfg.max_seeds);
		}

		Ok(seeds)
	}
}

#[derive(Debug, Deserialize)]
struct SeedResponse {
	#[serde(default)]
	seeds: Vec<String>,
}
