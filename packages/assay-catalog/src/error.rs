use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Failed to read catalog at {path:?}: {source}")]
	ReadCatalog {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
	#[error("Failed to parse catalog record at line {line}: {source}")]
	ParseRecord {
		line: usize,
		#[source]
		source: serde_json::Error,
	},
	#[error("Invalid catalog record: {message}")]
	InvalidRecord { message: String },
	#[error("Catalog invariant violated: {message}")]
	Invariant { message: String },
	#[error("Query vector has {found} dimensions; the catalog uses {expected}.")]
	Dimension { expected: usize, found: usize },
	#[error("Vector index is out of sync with the catalog: {message}")]
	StaleIndex { message: String },
	#[error(transparent)]
	Qdrant(#[from] Box<qdrant_client::QdrantError>),
}
impl From<qdrant_client::QdrantError> for Error {
	fn from(err: qdrant_client::QdrantError) -> Self {
		Self::Qdrant(Box::new(err))
	}
}
