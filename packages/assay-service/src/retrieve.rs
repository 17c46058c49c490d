use std::{collections::HashSet, sync::Arc};

use assay_catalog::{CatalogSnapshot, memory};
use assay_domain::{balance::BalanceCandidate, catalog::CatalogItem};

use crate::{AssayService, Error, Result};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Candidate {
	pub ordinal: usize,
	pub score: f32,
}

/// Retrieval output bound to the snapshot it was computed against.
#[derive(Clone, Debug)]
pub struct CandidateSet {
	pub snapshot: Arc<CatalogSnapshot>,
	pub candidates: Vec<Candidate>,
}
impl CandidateSet {
	pub fn len(&self) -> usize {
		self.candidates.len()
	}

	pub fn is_empty(&self) -> bool {
		self.candidates.is_empty()
	}

	pub fn item(&self, candidate: &Candidate) -> Option<&CatalogItem> {
		self.snapshot.get(candidate.ordinal)
	}

	pub fn iter(&self) -> impl Iterator<Item = (&Candidate, &CatalogItem)> {
		self.candidates
			.iter()
			.filter_map(|candidate| self.item(candidate).map(|item| (candidate, item)))
	}

	pub fn balance_view(&self) -> Vec<BalanceCandidate> {
		self.iter()
			.map(|(candidate, item)| BalanceCandidate {
				score: candidate.score,
				technical: item.is_technical(),
				soft_skill: item.is_soft_skill(),
			})
			.collect()
	}
}

impl AssayService {
	/// Returns up to `k` candidates (default `retrieval.top_k`) by descending similarity.
	pub async fn retrieve(&self, query: &str, k: Option<u32>) -> Result<CandidateSet> {
		let query = validate_query(query)?;
		let k = resolve_top_k(k, self.cfg.retrieval.top_k)?;

		self.retrieve_validated(query, k).await
	}

	pub(crate) async fn retrieve_validated(&self, query: &str, k: usize) -> Result<CandidateSet> {
		let Some(snapshot) = self.catalog.current() else {
			return Err(Error::RetrievalUnavailable {
				message: "Catalog is not loaded.".to_string(),
			});
		};
		let texts = vec![query.to_string()];
		let vector = self
			.providers
			.embedding
			.embed(&self.cfg.providers.embedding, &texts)
			.await
			.map_err(|err| Error::RetrievalUnavailable {
				message: format!("Embedding failed: {err}"),
			})?
			.into_iter()
			.next()
			.ok_or_else(|| Error::RetrievalUnavailable {
				message: "Embedding provider returned no vector.".to_string(),
			})?;

		if vector.len() != snapshot.dimension() {
			return Err(Error::RetrievalUnavailable {
				message: format!(
					"Query embedding has {} dimensions; the catalog uses {}.",
					vector.len(),
					snapshot.dimension()
				),
			});
		}

		let k = k.min(snapshot.len());
		let mut hits = self.index.nearest(&snapshot, &vector, k).await.map_err(|err| {
			Error::RetrievalUnavailable { message: format!("Vector search failed: {err}") }
		})?;

		hits.sort_by(memory::compare_hits);

		let mut seen = HashSet::with_capacity(hits.len());
		let candidates = hits
			.into_iter()
			.filter(|hit| hit.ordinal < snapshot.len() && seen.insert(hit.ordinal))
			.take(k)
			.map(|hit| Candidate { ordinal: hit.ordinal, score: hit.score })
			.collect();

		Ok(CandidateSet { snapshot, candidates })
	}
}

/// Trims the query and rejects blank input.
pub fn validate_query(query: &str) -> Result<&str> {
	let trimmed = query.trim();

	if trimmed.is_empty() {
		return Err(Error::InvalidQuery { message: "query must be non-empty.".to_string() });
	}

	Ok(trimmed)
}

pub(crate) fn resolve_top_k(requested: Option<u32>, default: u32) -> Result<usize> {
	match requested {
		Some(0) =>
			Err(Error::InvalidRequest { message: "top_k must be greater than zero.".to_string() }),
		Some(k) => Ok(k as usize),
		None => Ok(default as usize),
	}
}

/// Like [`resolve_top_k`], but an override must leave room for `min_results` candidates so a
/// healthy corpus can always fill the minimum.
pub(crate) fn resolve_recommend_top_k(
	requested: Option<u32>,
	default: u32,
	min_results: u32,
) -> Result<usize> {
	let k = resolve_top_k(requested, default)?;

	if requested.is_some() && k < min_results as usize {
		return Err(Error::InvalidRequest {
			message: format!("top_k must be at least recommend.min_results ({min_results})."),
		});
	}

	Ok(k)
}
