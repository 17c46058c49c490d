use std::collections::{HashMap, HashSet};

use qdrant_client::{
	Payload, Qdrant,
	qdrant::{
		CountPointsBuilder, CreateCollectionBuilder, Distance, PointStruct, Query,
		QueryPointsBuilder, ScoredPoint, UpsertPointsBuilder, Value, VectorParamsBuilder,
		point_id::PointIdOptions, value::Kind,
	},
};

use crate::{CatalogSnapshot, Error, Hit, Result, memory};

const UPSERT_BATCH: usize = 256;
const FINGERPRINT_SUFFIX_LEN: usize = 12;

/// Remote cosine index. Each snapshot gets its own collection, named by the configured base and
/// a fingerprint prefix, so building a new snapshot never touches the one being queried. Point
/// ids are corpus ordinals and every payload carries the full fingerprint.
pub struct QdrantIndex {
	pub client: Qdrant,
	pub collection: String,
}
impl QdrantIndex {
	pub fn new(cfg: &assay_config::Qdrant) -> Result<Self> {
		let client = Qdrant::from_url(&cfg.url).build()?;

		Ok(Self { client, collection: cfg.collection.clone() })
	}

	/// Collection holding the points of the snapshot with `fingerprint`.
	pub fn collection_for(&self, fingerprint: &str) -> String {
		collection_name(&self.collection, fingerprint)
	}

	/// Builds the collection for `snapshot`. Collections of other snapshots are left alone, and a
	/// complete collection for the same fingerprint is reused.
	pub async fn sync(&self, snapshot: &CatalogSnapshot) -> Result<()> {
		let collection = self.collection_for(snapshot.fingerprint());

		if self.client.collection_exists(collection.clone()).await? {
			let count = self
				.client
				.count(CountPointsBuilder::new(collection.clone()).exact(true))
				.await?
				.result
				.map(|result| result.count)
				.unwrap_or(0);

			if count == snapshot.len() as u64 {
				tracing::info!(%collection, points = count, "Qdrant collection already built.");

				return Ok(());
			}

			tracing::warn!(
				%collection,
				points = count,
				expected = snapshot.len(),
				"Qdrant collection is incomplete. Rebuilding."
			);

			self.client.delete_collection(collection.clone()).await?;
		}

		self.client
			.create_collection(
				CreateCollectionBuilder::new(collection.clone()).vectors_config(
					VectorParamsBuilder::new(snapshot.dimension() as u64, Distance::Cosine),
				),
			)
			.await?;

		let points = snapshot
			.items()
			.iter()
			.enumerate()
			.map(|(ordinal, item)| {
				let mut payload = Payload::new();

				payload.insert("identifier", item.identifier.clone());
				payload.insert("fingerprint", snapshot.fingerprint().to_string());

				PointStruct::new(ordinal as u64, item.embedding.clone(), payload)
			})
			.collect::<Vec<_>>();

		for batch in points.chunks(UPSERT_BATCH) {
			self.client
				.upsert_points(
					UpsertPointsBuilder::new(collection.clone(), batch.to_vec()).wait(true),
				)
				.await?;
		}

		tracing::info!(
			%collection,
			points = points.len(),
			fingerprint = snapshot.fingerprint(),
			"Qdrant collection built."
		);

		Ok(())
	}

	/// Deletes snapshot collections under the configured base except those for `keep`.
	/// Returns the deleted collection names.
	pub async fn prune(&self, keep: &[&str]) -> Result<Vec<String>> {
		let keep =
			keep.iter().map(|fingerprint| self.collection_for(fingerprint)).collect::<HashSet<_>>();
		let existing = self.client.list_collections().await?;
		let stale = stale_collections(
			&self.collection,
			existing.collections.into_iter().map(|collection| collection.name),
			&keep,
		);

		for collection in &stale {
			self.client.delete_collection(collection.clone()).await?;

			tracing::info!(%collection, "Qdrant collection dropped.");
		}

		Ok(stale)
	}

	pub async fn nearest(
		&self,
		snapshot: &CatalogSnapshot,
		vector: &[f32],
		k: usize,
	) -> Result<Vec<Hit>> {
		if vector.len() != snapshot.dimension() {
			return Err(Error::Dimension { expected: snapshot.dimension(), found: vector.len() });
		}

		let k = k.min(snapshot.len());
		let search = QueryPointsBuilder::new(self.collection_for(snapshot.fingerprint()))
			.query(Query::new_nearest(vector.to_vec()))
			.with_payload(true)
			.limit(k as u64);
		let response = self.client.query(search).await?;
		let mut hits = response
			.result
			.iter()
			.map(|point| hit_from_point(point, snapshot))
			.collect::<Result<Vec<_>>>()?;

		hits.sort_by(memory::compare_hits);

		Ok(hits)
	}
}

fn hit_from_point(point: &ScoredPoint, snapshot: &CatalogSnapshot) -> Result<Hit> {
	let ordinal = match point.id.as_ref().and_then(|id| id.point_id_options.as_ref()) {
		Some(PointIdOptions::Num(ordinal)) => *ordinal as usize,
		_ =>
			return Err(Error::StaleIndex { message: "Point id is not a corpus ordinal.".to_string() }),
	};

	if payload_string(&point.payload, "fingerprint").as_deref() != Some(snapshot.fingerprint()) {
		return Err(Error::StaleIndex {
			message: format!("Point {ordinal} belongs to another catalog snapshot."),
		});
	}

	let expected = snapshot.get(ordinal).map(|item| item.identifier.as_str());

	if expected.is_none() || payload_string(&point.payload, "identifier").as_deref() != expected {
		return Err(Error::StaleIndex {
			message: format!("Point {ordinal} does not match the catalog item at that ordinal."),
		});
	}

	Ok(Hit { ordinal, score: point.score })
}

fn payload_string(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
	let value = payload.get(key)?;

	match &value.kind {
		Some(Kind::StringValue(text)) => Some(text.to_string()),
		_ => None,
	}
}

fn collection_name(base: &str, fingerprint: &str) -> String {
	let suffix = fingerprint.get(..FINGERPRINT_SUFFIX_LEN).unwrap_or(fingerprint);

	format!("{base}_{suffix}")
}

/// Snapshot collections of `base` that are not in `keep`. Names that merely share the prefix are
/// not snapshot collections and are never returned.
fn stale_collections(
	base: &str,
	names: impl IntoIterator<Item = String>,
	keep: &HashSet<String>,
) -> Vec<String> {
	let mut stale = names
		.into_iter()
		.filter(|name| {
			name.strip_prefix(base).and_then(|rest| rest.strip_prefix('_')).is_some_and(|suffix| {
				suffix.len() == FINGERPRINT_SUFFIX_LEN
					&& suffix.bytes().all(|byte| matches!(byte, b'0'..=b'9' | b'a'..=b'f'))
			})
		})
		.filter(|name| !keep.contains(name))
		.collect::<Vec<_>>();

	stale.sort();

	stale
}

#[cfg(test)]
mod tests {
	use std::collections::HashSet;

	use super::{collection_name, stale_collections};

	const OLD: &str = "0f3a9c1d2b7e44556677889900aabbccddeeff00112233445566778899aabbcc";
	const NEW: &str = "9b1e2f3a4c5d66778899aabbccddeeff00112233445566778899aabbccddeeff";

	#[test]
	fn snapshots_get_distinct_collections() {
		assert_eq!(collection_name("assay_catalog", OLD), "assay_catalog_0f3a9c1d2b7e");
		assert_eq!(collection_name("assay_catalog", NEW), "assay_catalog_9b1e2f3a4c5d");
		assert_eq!(collection_name("assay_catalog", "abc"), "assay_catalog_abc");
	}

	#[test]
	fn pruning_keeps_the_live_and_previous_snapshots() {
		let keep = [OLD, NEW]
			.into_iter()
			.map(|fingerprint| collection_name("assay_catalog", fingerprint))
			.collect::<HashSet<_>>();
		let names = [
			"assay_catalog_0f3a9c1d2b7e",
			"assay_catalog_9b1e2f3a4c5d",
			"assay_catalog_123456abcdef",
			"assay_catalog_000000000000",
			"assay_catalog",
			"assay_catalog_backup",
			"assay_catalog_ABCDEF123456",
			"other_123456abcdef",
		]
		.map(str::to_string);
		let stale = stale_collections("assay_catalog", names, &keep);

		assert_eq!(stale, vec!["assay_catalog_000000000000", "assay_catalog_123456abcdef"]);
	}
}
