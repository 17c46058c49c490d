use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;

use crate::{AssayService, Error, Result};
use assay_catalog::CatalogSnapshot;
use assay_domain::catalog::CatalogItem;

const EMBED_BATCH: usize = 64;

#[derive(Clone, Debug, Serialize)]
pub struct ReloadReport {
	pub item_count: usize,
	/// Items that arrived without a vector and were embedded during the reload.
	pub embedded_count: usize,
	pub fingerprint: String,
	pub previous_fingerprint: Option<String>,
	#[serde(with = "time::serde::rfc3339")]
	pub loaded_at: OffsetDateTime,
}

impl AssayService {
	/// Loads the configured catalog source and swaps it in.
	pub async fn reload_catalog(&self) -> Result<ReloadReport> {
		let Some(source) = self.source.as_ref() else {
			return Err(Error::Catalog { message: "No catalog source is configured.".to_string() });
		};
		let items = source.load_corpus().await.map_err(|err| match err {
			Error::Catalog { .. } => err,
			other => Error::Catalog { message: other.to_string() },
		})?;

		self.install_catalog(items).await
	}

	/// Embeds items lacking vectors, validates the corpus, syncs the index and installs the
	/// result as one immutable snapshot. On any error the previous snapshot stays in place.
	/// Installs run one at a time.
	pub async fn install_catalog(&self, mut items: Vec<CatalogItem>) -> Result<ReloadReport> {
		let _install = self.reload_lock.lock().await;
		let embedded_count = self.embed_missing(&mut items).await?;
		let snapshot = Arc::new(CatalogSnapshot::build(items)?);
		let expected = self.cfg.index.vector_dim as usize;

		if snapshot.dimension() != expected {
			return Err(Error::Catalog {
				message: format!(
					"Catalog embeddings have {} dimensions; index.vector_dim is {expected}.",
					snapshot.dimension()
				),
			});
		}

		self.index.sync(&snapshot).await.map_err(|err| Error::Catalog {
			message: format!("Index sync failed: {err}"),
		})?;

		let item_count = snapshot.len();
		let fingerprint = snapshot.fingerprint().to_string();
		let loaded_at = snapshot.loaded_at();
		let previous = self.catalog.swap(snapshot.clone());
		let previous_fingerprint =
			previous.as_ref().map(|previous| previous.fingerprint().to_string());

		tracing::info!(
			items = item_count,
			embedded = embedded_count,
			fingerprint = %fingerprint,
			previous = previous_fingerprint.as_deref().unwrap_or("none"),
			"Catalog swapped."
		);

		if let Err(err) = self.index.prune(&snapshot, previous.as_deref()).await {
			tracing::warn!(error = %err, "Index pruning failed. Older index data is kept.");
		}

		Ok(ReloadReport { item_count, embedded_count, fingerprint, previous_fingerprint, loaded_at })
	}

	async fn embed_missing(&self, items: &mut [CatalogItem]) -> Result<usize> {
		let missing = items
			.iter()
			.enumerate()
			.filter(|(_, item)| item.embedding.is_empty())
			.map(|(idx, _)| idx)
			.collect::<Vec<_>>();

		for batch in missing.chunks(EMBED_BATCH) {
			let texts = batch.iter().map(|&idx| items[idx].document_text()).collect::<Vec<_>>();
			let vectors = self
				.providers
				.embedding
				.embed(&self.cfg.providers.embedding, &texts)
				.await
				.map_err(|err| Error::Catalog { message: format!("Catalog embedding failed: {err}") })?;

			if vectors.len() != batch.len() {
				return Err(Error::Catalog {
					message: format!(
						"Embedding provider returned {} vectors for {} catalog items.",
						vectors.len(),
						batch.len()
					),
				});
			}

			for (&idx, vector) in batch.iter().zip(vectors) {
				items[idx].embedding = vector;
			}
		}

		Ok(missing.len())
	}
}
