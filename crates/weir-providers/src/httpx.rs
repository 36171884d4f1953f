//! Shared outbound HTTP client.
//!
//! Every external call in the pipeline funnels through [`HttpClient`], which
//! layers a host allow-list, bounded retries with jittered backoff, and a
//! consecutive-failure circuit breaker on top of `reqwest`.

use std::{
	sync::atomic::{AtomicI64, AtomicU32, Ordering},
	time::{Duration, SystemTime, UNIX_EPOCH},
};

use rand::Rng;
use weir_config::HttpClientConfig;

use crate::{Error, Result};

const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1_200);
const DEFAULT_RETRY: usize = 1;
const DEFAULT_BACKOFF_MIN: Duration = Duration::from_millis(100);
const DEFAULT_BACKOFF_MAX: Duration = Duration::from_millis(800);
const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 5;
const DEFAULT_CIRCUIT_OPEN: Duration = Duration::from_secs(5);

#[derive(Clone, Debug)]
pub struct HttpOptions {
	pub timeout: Duration,
	pub retry: usize,
	pub backoff_min: Duration,
	pub backoff_max: Duration,
	pub host_allowlist: Vec<String>,
	pub max_consecutive_failures: u32,
	pub circuit_open: Duration,
}
impl Default for HttpOptions {
	fn default() -> Self {
		Self {
			timeout: DEFAULT_TIMEOUT,
			retry: DEFAULT_RETRY,
			backoff_min: DEFAULT_BACKOFF_MIN,
			backoff_max: DEFAULT_BACKOFF_MAX,
			host_allowlist: Vec::new(),
			max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
			circuit_open: DEFAULT_CIRCUIT_OPEN,
		}
	}
}
impl HttpOptions {
	pub fn from_config(cfg: Option<&HttpClientConfig>) -> Self {
		let mut options = Self::default();
		let Some(cfg) = cfg else { return options };

		if cfg.timeout_ms > 0 {
			options.timeout = Duration::from_millis(cfg.timeout_ms);
		}
		if cfg.retry > 0 {
			options.retry = cfg.retry;
		}
		if cfg.backoff_min_ms > 0 {
			options.backoff_min = Duration::from_millis(cfg.backoff_min_ms);
		}
		if cfg.backoff_max_ms > 0 {
			options.backoff_max = Duration::from_millis(cfg.backoff_max_ms);
		}
		if cfg.max_consecutive_failures > 0 {
			options.max_consecutive_failures = cfg.max_consecutive_failures;
		}
		if cfg.circuit_open_seconds > 0 {
			options.circuit_open = Duration::from_secs(cfg.circuit_open_seconds);
		}

		options.host_allowlist = cfg.host_allowlist.clone();

		options
	}
}

/// Outbound HTTP client with retries, allow-listing, and a circuit breaker.
///
/// The circuit state is per-client and monotonic: the open-until deadline
/// only moves forward, and the consecutive-failure counter resets on open or
/// on any success.
pub struct HttpClient {
	inner: reqwest::Client,
	options: HttpOptions,
	consecutive_failures: AtomicU32,
	open_until_unix_ms: AtomicI64,
}
impl HttpClient {
	pub fn new(options: HttpOptions) -> Result<Self> {
		let inner = reqwest::Client::builder()
			.timeout(options.timeout)
			.min_tls_version(reqwest::tls::Version::TLS_1_2)
			.build()?;

		Ok(Self {
			inner,
			options,
			consecutive_failures: AtomicU32::new(0),
			open_until_unix_ms: AtomicI64::new(0),
		})
	}

	pub fn from_config(cfg: Option<&HttpClientConfig>) -> Result<Self> {
		Self::new(HttpOptions::from_config(cfg))
	}

	pub fn options(&self) -> &HttpOptions {
		&self.options
	}

	pub fn get(&self, url: &str) -> reqwest::RequestBuilder {
		self.inner.get(url)
	}

	pub fn post(&self, url: &str) -> reqwest::RequestBuilder {
		self.inner.post(url)
	}

	/// Executes a request under the client's policy.
	///
	/// An attempt counts as successful when the response status is in
	/// `[200, 500)`; the response is returned as-is and status handling is
	/// left to the caller. Transport errors and 5xx responses are retried
	/// `retry` more times with a uniformly random sleep in
	/// `[backoff_min, backoff_max)` between attempts.
	pub async fn execute(&self, request: reqwest::Request) -> Result<reqwest::Response> {
		let url = request.url().clone();

		if !self.host_allowed(&url) {
			tracing::warn!(url = %url, "Blocked outbound request to disallowed host.");

			return Err(Error::HostNotAllowed {
				host: url.host_str().unwrap_or_default().to_string(),
			});
		}
		if self.circuit_open() {
			return Err(Error::CircuitOpen);
		}

		let mut request = Some(request);
		let mut last_error = Error::CircuitOpen;

		for attempt in 0..=self.options.retry {
			let Some(current) = request.take() else { break };

			// A request with a streaming body cannot be cloned; it gets a
			// single attempt.
			request = current.try_clone();

			match self.inner.execute(current).await {
				Ok(response) if response.status().as_u16() < 500 => {
					self.consecutive_failures.store(0, Ordering::Relaxed);

					return Ok(response);
				},
				Ok(response) => {
					tracing::warn!(
						url = %url,
						status = response.status().as_u16(),
						attempt = attempt + 1,
						attempts = self.options.retry + 1,
						"Outbound request returned a server error.",
					);
					self.record_failure();

					last_error = Error::UnexpectedStatus {
						status: response.status().as_u16(),
						url: url.to_string(),
					};
				},
				Err(err) => {
					tracing::warn!(
						url = %url,
						attempt = attempt + 1,
						attempts = self.options.retry + 1,
						"Outbound request failed: {err}.",
					);
					self.record_failure();

					last_error = Error::Reqwest(err);
				},
			}

			if attempt < self.options.retry {
				tokio::time::sleep(self.backoff_jitter()).await;
			}
		}

		Err(last_error)
	}

	fn host_allowed(&self, url: &reqwest::Url) -> bool {
		if self.options.host_allowlist.is_empty() {
			return true;
		}

		let Some(host) = url.host_str() else { return false };

		self.options.host_allowlist.iter().any(|pattern| match_host(pattern, host))
	}

	fn circuit_open(&self) -> bool {
		self.open_until_unix_ms.load(Ordering::Relaxed) > unix_ms()
	}

	fn record_failure(&self) {
		let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;

		if failures >= self.options.max_consecutive_failures {
			let open_until = unix_ms() + self.options.circuit_open.as_millis() as i64;

			self.open_until_unix_ms.fetch_max(open_until, Ordering::Relaxed);
			self.consecutive_failures.store(0, Ordering::Relaxed);
			tracing::warn!(open_for = ?self.options.circuit_open, "Outbound circuit opened.");
		}
	}

	fn backoff_jitter(&self) -> Duration {
		let min = self.options.backoff_min.as_millis() as u64;
		let max = self.options.backoff_max.as_millis() as u64;

		if max <= min {
			return self.options.backoff_min;
		}

		Duration::from_millis(rand::thread_rng().gen_range(min..max))
	}
}

/// Matches a host against one allow-list pattern.
///
/// `*` matches any host; `*.suffix` matches both the bare suffix and any
/// subdomain of it; anything else must match exactly (case-insensitive).
fn match_host(pattern: &str, host: &str) -> bool {
	if pattern == "*" {
		return true;
	}
	if pattern.eq_ignore_ascii_case(host) {
		return true;
	}
	if let Some(suffix) = pattern.strip_prefix("*.") {
		let host = host.to_ascii_lowercase();
		let suffix = suffix.to_ascii_lowercase();

		return host == suffix || host.ends_with(&format!(".{suffix}"));
	}

	false
}

fn unix_ms() -> i64 {
	SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn wildcard_matches_any_host() {
		assert!(match_host("*", "example.com"));
		assert!(match_host("*", "localhost"));
	}

	#[test]
	fn suffix_pattern_matches_subdomains_and_bare_suffix() {
		assert!(match_host("*.example.com", "api.example.com"));
		assert!(match_host("*.example.com", "example.com"));
		assert!(!match_host("*.example.com", "badexample.com"));
	}

	#[test]
	fn exact_pattern_is_case_insensitive() {
		assert!(match_host("ES", "es"));
		assert!(!match_host("es", "es2"));
	}

	#[test]
	fn options_default_to_spec_values() {
		let options = HttpOptions::default();

		assert_eq!(options.timeout, Duration::from_millis(1_200));
		assert_eq!(options.retry, 1);
		assert_eq!(options.backoff_min, Duration::from_millis(100));
		assert_eq!(options.backoff_max, Duration::from_millis(800));
		assert_eq!(options.max_consecutive_failures, 5);
		assert_eq!(options.circuit_open, Duration::from_secs(5));
	}

	#[test]
	fn zero_config_fields_keep_defaults() {
		let cfg = HttpClientConfig { retry: 2, ..Default::default() };
		let options = HttpOptions::from_config(Some(&cfg));

		assert_eq!(options.retry, 2);
		assert_eq!(options.timeout, Duration::from_millis(1_200));
	}
}
