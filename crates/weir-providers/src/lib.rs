//! Outbound adapters for the weir retrieval pipeline.
//!
//! This crate owns everything that leaves the process: the shared
//! [`HttpClient`] policy wrapper, the retriever adapters (vector, bm25,
//! path, web), and the thin clients for embedding, chat-completion, web
//! search, and HYDE seed generation. Adapter contracts are deliberately
//! uniform so the retrieval provider can treat backends interchangeably.

mod error;

pub mod embedding;
pub mod httpx;
pub mod hyde;
pub mod llm;
pub mod retriever;
pub mod store;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName};
use serde_json::{Map, Value};

pub use error::{Error, Result};
pub use httpx::{HttpClient, HttpOptions};

/// Builds auth headers for bearer-token providers, merging any statically
/// configured default headers. Header values must be strings.
pub fn auth_headers(api_key: &str, default_headers: &Map<String, Value>) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();

	if !api_key.is_empty() {
		let value = format!("Bearer {api_key}")
			.parse()
			.map_err(|_| Error::invalid_response("API key is not a valid header value."))?;

		headers.insert(AUTHORIZATION, value);
	}

	for (key, value) in default_headers {
		let Some(raw) = value.as_str() else {
			return Err(Error::invalid_response("Default header values must be strings."));
		};
		let name = HeaderName::from_bytes(key.as_bytes())
			.map_err(|_| Error::invalid_response(format!("Invalid header name: {key}.")))?;
		let value = raw
			.parse()
			.map_err(|_| Error::invalid_response(format!("Invalid header value for {key}.")))?;

		headers.insert(name, value);
	}

	Ok(headers)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn bearer_header_is_set_when_key_present() {
		let headers = auth_headers("secret", &Map::new()).expect("headers must build");

		assert_eq!(headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()), Some("Bearer secret"));
	}

	#[test]
	fn empty_key_omits_authorization() {
		let headers = auth_headers("", &Map::new()).expect("headers must build");

		assert!(headers.get(AUTHORIZATION).is_none());
	}

	#[test]
	fn non_string_default_header_is_rejected() {
		let mut defaults = Map::new();

		defaults.insert("x-tenant".to_string(), Value::from(42));

		assert!(auth_headers("key", &defaults).is_err());
	}
}
