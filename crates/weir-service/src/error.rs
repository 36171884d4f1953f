pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Provider(#[from] weir_providers::Error),
	#[error(transparent)]
	Fusion(#[from] weir_fusion::Error),
	#[error("evaluator failed: {message}")]
	Evaluator { message: String },
	#[error("{message}")]
	Assembly { message: String },
}
impl Error {
	pub fn assembly(message: impl Into<String>) -> Self {
		Self::Assembly { message: message.into() }
	}

	pub fn evaluator(message: impl Into<String>) -> Self {
		Self::Evaluator { message: message.into() }
	}
}
