pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid query: {message}")]
	InvalidQuery { message: String },
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Retrieval unavailable: {message}")]
	RetrievalUnavailable { message: String },
	#[error("Catalog error: {message}")]
	Catalog { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Configuration error: {message}")]
	Config { message: String },
}
impl From<assay_providers::Error> for Error {
	fn from(err: assay_providers::Error) -> Self {
		Self::Provider { message: err.to_string() }
	}
}
impl From<assay_catalog::Error> for Error {
	fn from(err: assay_catalog::Error) -> Self {
		Self::Catalog { message: err.to_string() }
	}
}
