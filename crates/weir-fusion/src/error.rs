pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("unsupported fusion strategy: {name}")]
	UnknownStrategy { name: String },
	#[error("learned fusion requires weights_uri")]
	MissingWeightsUri,
	#[error("weights document is empty")]
	EmptyWeights,
	#[error("unsupported weights uri scheme: {scheme}")]
	UnsupportedScheme { scheme: String },
	#[error("unexpected status {status} fetching weights")]
	UnexpectedStatus { status: u16 },
	#[error("timed out loading weights")]
	WeightsTimeout,
	#[error(transparent)]
	Io(#[from] std::io::Error),
	#[error(transparent)]
	Reqwest(#[from] reqwest::Error),
	#[error(transparent)]
	SerdeJson(#[from] serde_json::Error),
}
