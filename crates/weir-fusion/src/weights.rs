use std::{collections::HashMap, sync::Arc, time::Duration};

use serde::Deserialize;
use serde_json::{Map, Value};
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::{Error, Result};

const DEFAULT_TTL: Duration = Duration::from_secs(60);
const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// A learned-fusion weight set as fetched from its source.
#[derive(Clone, Debug)]
pub struct WeightSnapshot {
	pub version: String,
	pub weights: HashMap<String, f64>,
	pub bias: f64,
	/// Full decoded document, kept for logging only.
	pub raw: Map<String, Value>,
	pub fetched_at: OffsetDateTime,
}

#[derive(Debug, Default, Deserialize)]
struct WeightsDocument {
	#[serde(default)]
	version: String,
	#[serde(default)]
	weights: HashMap<String, f64>,
	#[serde(default)]
	bias: f64,
}

/// Fetches and caches weight documents from `file://path`, a bare path, or
/// `http(s)://...`.
///
/// The cached snapshot is shared behind a read-write lock; reloads are
/// double-checked so concurrent readers never fetch twice.
pub struct WeightsLoader {
	uri: String,
	ttl: Duration,
	client: reqwest::Client,
	cached: RwLock<Option<Arc<WeightSnapshot>>>,
}
impl WeightsLoader {
	pub fn new(uri: impl Into<String>, ttl: Duration) -> Result<Self> {
		let uri = uri.into();

		if uri.is_empty() {
			return Err(Error::MissingWeightsUri);
		}

		Ok(Self {
			uri,
			ttl: if ttl.is_zero() { DEFAULT_TTL } else { ttl },
			client: reqwest::Client::builder().timeout(FETCH_TIMEOUT).build()?,
			cached: RwLock::new(None),
		})
	}

	pub fn uri(&self) -> &str {
		&self.uri
	}

	/// Returns the cached snapshot when fresh, reloading otherwise.
	pub async fn get(&self) -> Result<Arc<WeightSnapshot>> {
		{
			let cached = self.cached.read().await;

			if let Some(snapshot) = cached.as_ref()
				&& self.is_fresh(snapshot)
			{
				return Ok(snapshot.clone());
			}
		}

		let mut cached = self.cached.write().await;

		if let Some(snapshot) = cached.as_ref()
			&& self.is_fresh(snapshot)
		{
			return Ok(snapshot.clone());
		}

		let snapshot = Arc::new(self.load_once().await?);

		*cached = Some(snapshot.clone());

		Ok(snapshot)
	}

	fn is_fresh(&self, snapshot: &WeightSnapshot) -> bool {
		let age = OffsetDateTime::now_utc() - snapshot.fetched_at;

		age.whole_milliseconds() < self.ttl.as_millis() as i128
	}

	async fn load_once(&self) -> Result<WeightSnapshot> {
		let data = self.read_uri().await?;

		if data.is_empty() {
			return Err(Error::EmptyWeights);
		}

		let raw: Value = serde_json::from_slice(&data)?;
		let document: WeightsDocument = serde_json::from_value(raw.clone())?;

		Ok(WeightSnapshot {
			version: document.version,
			weights: document.weights,
			bias: document.bias,
			raw: raw.as_object().cloned().unwrap_or_default(),
			fetched_at: OffsetDateTime::now_utc(),
		})
	}

	async fn read_uri(&self) -> Result<Vec<u8>> {
		if let Some(path) = self.uri.strip_prefix("file://") {
			return Ok(tokio::fs::read(path).await?);
		}

		match self.uri.split_once("://") {
			None => Ok(tokio::fs::read(&self.uri).await?),
			Some(("http" | "https", _)) => {
				let response = self.client.get(&self.uri).send().await?;

				if !response.status().is_success() {
					return Err(Error::UnexpectedStatus { status: response.status().as_u16() });
				}

				Ok(response.bytes().await?.to_vec())
			},
			Some((scheme, _)) => Err(Error::UnsupportedScheme { scheme: scheme.to_string() }),
		}
	}
}

#[cfg(test)]
mod tests {
	use std::env;

	use super::*;

	fn write_temp_weights(name: &str, contents: &str) -> std::path::PathBuf {
		let path = env::temp_dir().join(name);

		std::fs::write(&path, contents).expect("temp file must write");

		path
	}

	#[test]
	fn empty_uri_is_rejected() {
		assert!(matches!(WeightsLoader::new("", DEFAULT_TTL), Err(Error::MissingWeightsUri)));
	}

	#[tokio::test]
	async fn loads_from_a_bare_path_and_caches() {
		let path = write_temp_weights(
			"weir_weights_bare.json",
			r#"{"version":"v7","weights":{"vector":0.7},"bias":0.05,"note":"extra"}"#,
		);
		let loader = WeightsLoader::new(path.to_string_lossy().to_string(), DEFAULT_TTL)
			.expect("loader must build");
		let snapshot = loader.get().await.expect("weights must load");

		assert_eq!(snapshot.version, "v7");
		assert_eq!(snapshot.weights["vector"], 0.7);
		assert!((snapshot.bias - 0.05).abs() < 1e-12);
		assert!(snapshot.raw.contains_key("note"));

		// Within the TTL the snapshot is served from cache even if the file
		// changes underneath.
		std::fs::write(&path, r#"{"version":"v8","weights":{}}"#).expect("temp file must write");

		let cached = loader.get().await.expect("cache must serve");

		assert_eq!(cached.version, "v7");

		let _ = std::fs::remove_file(path);
	}

	#[tokio::test]
	async fn file_scheme_is_supported() {
		let path = write_temp_weights("weir_weights_scheme.json", r#"{"version":"v1"}"#);
		let uri = format!("file://{}", path.to_string_lossy());
		let loader = WeightsLoader::new(uri, DEFAULT_TTL).expect("loader must build");

		assert_eq!(loader.get().await.expect("weights must load").version, "v1");

		let _ = std::fs::remove_file(path);
	}

	#[tokio::test]
	async fn empty_document_is_an_error() {
		let path = write_temp_weights("weir_weights_empty.json", "");
		let loader = WeightsLoader::new(path.to_string_lossy().to_string(), DEFAULT_TTL)
			.expect("loader must build");

		assert!(matches!(loader.get().await, Err(Error::EmptyWeights)));

		let _ = std::fs::remove_file(path);
	}

	#[tokio::test]
	async fn unknown_scheme_is_rejected() {
		let loader = WeightsLoader::new("s3://bucket/weights.json", DEFAULT_TTL)
			.expect("loader must build");

		assert!(matches!(loader.get().await, Err(Error::UnsupportedScheme { .. })));
	}
}
