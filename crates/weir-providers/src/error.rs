pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Reqwest(#[from] reqwest::Error),
	#[error(transparent)]
	SerdeJson(#[from] serde_json::Error),
	#[error("host not allowed: {host}")]
	HostNotAllowed { host: String },
	#[error("circuit open")]
	CircuitOpen,
	#[error("unexpected status {status} from {url}")]
	UnexpectedStatus { status: u16, url: String },
	#[error("{message}")]
	InvalidResponse { message: String },
	#[error("{message}")]
	NotConfigured { message: String },
}
impl Error {
	pub fn invalid_response(message: impl Into<String>) -> Self {
		Self::InvalidResponse { message: message.into() }
	}

	pub fn not_configured(message: impl Into<String>) -> Self {
		Self::NotConfigured { message: message.into() }
	}
}
