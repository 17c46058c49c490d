pub mod ingest;
pub mod memory;
pub mod qdrant;
pub mod snapshot;

mod error;

pub use error::{Error, Result};
pub use ingest::FileCatalog;
pub use snapshot::{CatalogSnapshot, CatalogStore};

/// A nearest-neighbour hit addressed by corpus ordinal.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Hit {
	pub ordinal: usize,
	pub score: f32,
}
