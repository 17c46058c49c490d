use std::{collections::BTreeSet, time::Instant};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
	AssayService, CandidateSet, RefinementSource, Result,
	retrieve::{self, Candidate},
};
use assay_domain::{balance::RefineState, classify::Classification, test_type::TestType};

#[derive(Clone, Debug, Deserialize)]
pub struct RecommendRequest {
	pub query: String,
	#[serde(default)]
	pub top_k: Option<u32>,
}

#[derive(Clone, Debug, Serialize)]
pub struct RecommendResponse {
	pub request_id: Uuid,
	pub items: Vec<RecommendedItem>,
	pub classification: Classification,
	pub intent_summary: Option<String>,
	pub state: RefineState,
	pub refinement: RefinementReport,
	/// Present when the catalog could not supply `min_results` candidates.
	pub shortfall: Option<Shortfall>,
	pub candidate_count: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct RecommendedItem {
	pub identifier: String,
	pub name: String,
	pub description: String,
	pub duration_minutes: Option<u32>,
	pub adaptive_support: bool,
	pub remote_support: bool,
	pub test_types: BTreeSet<TestType>,
	pub score: f32,
}

#[derive(Clone, Debug, Serialize)]
pub struct RefinementReport {
	pub source: RefinementSource,
	pub degraded: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub reason: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Shortfall {
	pub available: usize,
	pub required: usize,
}

impl AssayService {
	pub async fn recommend(&self, req: RecommendRequest) -> Result<RecommendResponse> {
		let started = Instant::now();
		let request_id = Uuid::new_v4();
		let query = retrieve::validate_query(&req.query)?;
		let k = retrieve::resolve_recommend_top_k(
			req.top_k,
			self.cfg.retrieval.top_k,
			self.cfg.recommend.min_results,
		)?;
		let classification = self.classifier().classify(query);
		let candidates = self.retrieve_validated(query, k).await?;
		let outcome = self.refine(query, &candidates, &classification).await;
		let items = outcome
			.indices
			.iter()
			.filter_map(|&idx| candidates.candidates.get(idx))
			.filter_map(|candidate| recommended_item(&candidates, candidate))
			.collect::<Vec<_>>();
		let shortfall = outcome.shortfall.then_some(Shortfall {
			available: candidates.len(),
			required: self.policy().min_results,
		});

		self.stats.record_request();

		if let Some(shortfall) = shortfall {
			self.stats.record_shortfall();

			tracing::warn!(
				request_id = %request_id,
				available = shortfall.available,
				required = shortfall.required,
				"Insufficient corpus for the minimum result count."
			);
		}

		tracing::info!(
			request_id = %request_id,
			state = outcome.state.as_str(),
			items = items.len(),
			candidates = candidates.len(),
			source = ?outcome.source,
			degraded = outcome.degraded.is_some(),
			latency_ms = started.elapsed().as_millis() as u64,
			"Recommendation served."
		);

		Ok(RecommendResponse {
			request_id,
			items,
			intent_summary: classification.intent_summary(),
			classification,
			state: outcome.state,
			refinement: RefinementReport {
				source: outcome.source,
				degraded: outcome.degraded.is_some(),
				reason: outcome.degraded.as_ref().map(|reason| reason.to_string()),
			},
			shortfall,
			candidate_count: candidates.len(),
		})
	}
}

fn recommended_item(
	candidates: &CandidateSet,
	candidate: &Candidate,
) -> Option<RecommendedItem> {
	let item = candidates.item(candidate)?;

	Some(RecommendedItem {
		identifier: item.identifier.clone(),
		name: item.name.clone(),
		description: item.description.clone(),
		duration_minutes: item.duration_minutes,
		adaptive_support: item.adaptive_support,
		remote_support: item.remote_support,
		test_types: item.test_types.clone(),
		score: candidate.score,
	})
}
