use std::sync::{Arc, RwLock};

use ahash::AHashMap;
use time::OffsetDateTime;

use crate::{Error, Result};
use assay_domain::catalog::CatalogItem;

/// An immutable, validated corpus. Requests hold an `Arc` to one snapshot for their whole
/// lifetime, so a reload never changes the corpus under an in-flight query.
#[derive(Debug)]
pub struct CatalogSnapshot {
	items: Vec<CatalogItem>,
	norms: Vec<f32>,
	by_identifier: AHashMap<String, usize>,
	dimension: usize,
	fingerprint: String,
	loaded_at: OffsetDateTime,
}
impl CatalogSnapshot {
	pub fn build(items: Vec<CatalogItem>) -> Result<Self> {
		let Some(first) = items.first() else {
			return Err(Error::Invariant { message: "Catalog has no items.".to_string() });
		};
		let dimension = first.embedding.len();

		if dimension == 0 {
			return Err(Error::Invariant {
				message: format!("Item {:?} has no embedding.", first.identifier),
			});
		}

		let mut by_identifier = AHashMap::with_capacity(items.len());
		let mut norms = Vec::with_capacity(items.len());
		let mut hasher = blake3::Hasher::new();

		for (ordinal, item) in items.iter().enumerate() {
			if by_identifier.insert(item.identifier.clone(), ordinal).is_some() {
				return Err(Error::Invariant {
					message: format!("Identifier {:?} appears more than once.", item.identifier),
				});
			}
			if item.test_types.is_empty() {
				return Err(Error::Invariant {
					message: format!("Item {:?} has no test types.", item.identifier),
				});
			}
			if item.embedding.len() != dimension {
				return Err(Error::Invariant {
					message: format!(
						"Item {:?} has a {}-dimensional embedding; expected {dimension}.",
						item.identifier,
						item.embedding.len()
					),
				});
			}
			if item.embedding.iter().any(|value| !value.is_finite()) {
				return Err(Error::Invariant {
					message: format!("Item {:?} has a non-finite embedding value.", item.identifier),
				});
			}

			hasher.update(item.identifier.as_bytes());
			hasher.update(&[0]);

			for value in &item.embedding {
				hasher.update(&value.to_le_bytes());
			}
			for test_type in &item.test_types {
				hasher.update(&[test_type.code() as u8]);
			}

			norms.push(item.embedding.iter().map(|value| value * value).sum::<f32>().sqrt());
		}

		Ok(Self {
			items,
			norms,
			by_identifier,
			dimension,
			fingerprint: hasher.finalize().to_hex().to_string(),
			loaded_at: OffsetDateTime::now_utc(),
		})
	}

	pub fn items(&self) -> &[CatalogItem] {
		&self.items
	}

	pub fn get(&self, ordinal: usize) -> Option<&CatalogItem> {
		self.items.get(ordinal)
	}

	pub fn ordinal_of(&self, identifier: &str) -> Option<usize> {
		self.by_identifier.get(identifier).copied()
	}

	pub fn len(&self) -> usize {
		self.items.len()
	}

	pub fn is_empty(&self) -> bool {
		self.items.is_empty()
	}

	pub fn dimension(&self) -> usize {
		self.dimension
	}

	pub fn fingerprint(&self) -> &str {
		&self.fingerprint
	}

	pub fn loaded_at(&self) -> OffsetDateTime {
		self.loaded_at
	}

	pub(crate) fn norm(&self, ordinal: usize) -> f32 {
		self.norms.get(ordinal).copied().unwrap_or(0.0)
	}
}

/// Holder for the current snapshot. The lock only guards the `Arc` itself.
#[derive(Debug, Default)]
pub struct CatalogStore {
	current: RwLock<Option<Arc<CatalogSnapshot>>>,
}
impl CatalogStore {
	pub fn new(snapshot: CatalogSnapshot) -> Self {
		Self { current: RwLock::new(Some(Arc::new(snapshot))) }
	}

	pub fn current(&self) -> Option<Arc<CatalogSnapshot>> {
		self.current.read().unwrap_or_else(|err| err.into_inner()).clone()
	}

	/// Installs `snapshot` and returns the one it replaced.
	pub fn swap(&self, snapshot: impl Into<Arc<CatalogSnapshot>>) -> Option<Arc<CatalogSnapshot>> {
		let next = snapshot.into();
		let mut current = self.current.write().unwrap_or_else(|err| err.into_inner());

		current.replace(next)
	}
}
