use std::cmp::Ordering;

use crate::{CatalogSnapshot, Error, Hit, Result};

/// Exhaustive cosine search over the snapshot. Results are ordered by descending score with
/// ties broken by corpus order; `k` is capped at the corpus size.
pub fn nearest(snapshot: &CatalogSnapshot, vector: &[f32], k: usize) -> Result<Vec<Hit>> {
	if vector.len() != snapshot.dimension() {
		return Err(Error::Dimension { expected: snapshot.dimension(), found: vector.len() });
	}

	let query_norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
	let mut hits = snapshot
		.items()
		.iter()
		.enumerate()
		.map(|(ordinal, item)| {
			let denom = query_norm * snapshot.norm(ordinal);
			let score = if denom > 0.0 {
				item.embedding.iter().zip(vector).map(|(lhs, rhs)| lhs * rhs).sum::<f32>() / denom
			} else {
				0.0
			};

			Hit { ordinal, score }
		})
		.collect::<Vec<_>>();

	hits.sort_by(compare_hits);
	hits.truncate(k.min(snapshot.len()));

	Ok(hits)
}

pub fn compare_hits(lhs: &Hit, rhs: &Hit) -> Ordering {
	rhs.score.total_cmp(&lhs.score).then_with(|| lhs.ordinal.cmp(&rhs.ordinal))
}
