use std::{fmt, time::Duration};

use serde::Serialize;
use serde_json::Value;

use crate::{AssayService, CandidateSet, Error, Result};
use assay_domain::{
	balance::{self, BalanceCandidate, ProposalRejection, RefineState},
	classify::Classification,
	test_type::{TagGroup, TestType},
};

const DESCRIPTION_PREVIEW_CHARS: usize = 200;

#[derive(Clone, Debug, Serialize)]
pub struct ProposalCandidate {
	/// 1-based, as shown to the model.
	pub id: u64,
	pub name: String,
	pub description: String,
	pub test_types: Vec<String>,
	pub duration_minutes: Option<u32>,
	pub adaptive_support: bool,
	pub remote_support: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct ProposalConstraints {
	pub min_results: usize,
	pub max_results: usize,
	pub per_group_min: usize,
	pub wants_technical: bool,
	pub wants_soft_skill: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct ProposalRequest {
	pub query: String,
	pub candidates: Vec<ProposalCandidate>,
	pub constraints: ProposalConstraints,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefinementSource {
	Heuristic,
	Generative,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DegradeReason {
	Timeout,
	Provider { message: String },
	Rejected(ProposalRejection),
}
impl DegradeReason {
	pub fn code(&self) -> &'static str {
		match self {
			Self::Timeout => "timeout",
			Self::Provider { .. } => "provider_error",
			Self::Rejected(_) => "rejected",
		}
	}
}
impl fmt::Display for DegradeReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Timeout => f.write_str("Generative refinement timed out."),
			Self::Provider { message } => write!(f, "Generative refinement failed: {message}"),
			Self::Rejected(rejection) => write!(f, "Generative proposal rejected: {rejection}"),
		}
	}
}

#[derive(Clone, Debug)]
pub struct RefinementOutcome {
	pub state: RefineState,
	/// Positions into the candidate set, in output order.
	pub indices: Vec<usize>,
	pub source: RefinementSource,
	pub degraded: Option<DegradeReason>,
	pub shortfall: bool,
}

impl AssayService {
	/// Selects the final ordered subset. Never fails: any generative problem falls back to the
	/// heuristic selection computed up front.
	pub async fn refine(
		&self,
		query: &str,
		candidates: &CandidateSet,
		classification: &Classification,
	) -> RefinementOutcome {
		let view = candidates.balance_view();
		let policy = self.policy();
		let state = RefineState::resolve(classification, &view, policy);
		let heuristic = balance::select(&view, state, policy, policy.max_results);
		let mut outcome = RefinementOutcome {
			state,
			indices: heuristic.indices,
			source: RefinementSource::Heuristic,
			degraded: None,
			shortfall: heuristic.shortfall,
		};

		if !self.cfg.providers.refiner.enabled || view.is_empty() {
			self.stats.record_heuristic_only();

			return outcome;
		}

		let window = self.cfg.recommend.generative_window as usize;
		let pool = balance::select(&view, state, policy, window).indices;
		let request = self.proposal_request(query, candidates, &pool, classification);

		match self.run_proposal(&request, &view, &pool, classification).await {
			Ok(indices) => {
				self.stats.record_generative_accepted();

				outcome.indices = indices;
				outcome.source = RefinementSource::Generative;
			},
			Err(reason) => {
				self.stats.record_generative_degraded();

				tracing::warn!(
					reason = reason.code(),
					detail = %reason,
					state = state.as_str(),
					"Generative refinement degraded. Using heuristic selection."
				);

				outcome.degraded = Some(reason);
			},
		}

		outcome
	}

	async fn run_proposal(
		&self,
		request: &ProposalRequest,
		view: &[BalanceCandidate],
		pool: &[usize],
		classification: &Classification,
	) -> Result<Vec<usize>, DegradeReason> {
		let cfg = &self.cfg.providers.refiner;
		let timeout = Duration::from_millis(cfg.timeout_ms);
		let ids = match tokio::time::timeout(timeout, self.providers.refiner.propose(cfg, request))
			.await
		{
			Err(_) => return Err(DegradeReason::Timeout),
			Ok(Err(err)) => return Err(DegradeReason::Provider { message: err.to_string() }),
			Ok(Ok(ids)) => ids,
		};
		let pool_view = pool.iter().map(|&idx| view[idx]).collect::<Vec<_>>();
		let accepted =
			balance::validate_proposal(&ids, &pool_view, classification, self.policy())
				.map_err(DegradeReason::Rejected)?;

		Ok(accepted.into_iter().map(|position| pool[position]).collect())
	}

	fn proposal_request(
		&self,
		query: &str,
		candidates: &CandidateSet,
		pool: &[usize],
		classification: &Classification,
	) -> ProposalRequest {
		let policy = self.policy();
		let items = pool
			.iter()
			.filter_map(|&idx| candidates.candidates.get(idx))
			.filter_map(|candidate| candidates.item(candidate))
			.enumerate()
			.map(|(position, item)| ProposalCandidate {
				id: position as u64 + 1,
				name: item.name.clone(),
				description: preview(&item.description),
				test_types: item.test_types.iter().map(|t| t.label().to_string()).collect(),
				duration_minutes: item.duration_minutes,
				adaptive_support: item.adaptive_support,
				remote_support: item.remote_support,
			})
			.collect();

		ProposalRequest {
			query: query.to_string(),
			candidates: items,
			constraints: ProposalConstraints {
				min_results: policy.min_results.min(pool.len()),
				max_results: policy.max_results,
				per_group_min: policy.per_group_min(),
				wants_technical: classification.wants_technical,
				wants_soft_skill: classification.wants_soft_skill,
			},
		}
	}
}

/// Chat messages for a generative proposal. The model answers with a JSON array of ids.
pub fn proposal_messages(request: &ProposalRequest) -> Vec<Value> {
	let constraints = &request.constraints;
	let mut rules = vec![format!(
		"Select between {} and {} assessments that best match the hiring query, ordered from most to least relevant.",
		constraints.min_results, constraints.max_results
	)];

	if constraints.wants_technical && constraints.wants_soft_skill {
		rules.push(format!(
			"The query asks for both technical and soft skills. Include at least {n} assessments of type {technical} and at least {n} of type {soft}.",
			n = constraints.per_group_min,
			technical = group_labels(TagGroup::Technical),
			soft = group_labels(TagGroup::SoftSkill),
		));
	} else if constraints.wants_technical {
		rules.push(format!(
			"The query is technical. Prefer assessments of type {}.",
			group_labels(TagGroup::Technical)
		));
	} else if constraints.wants_soft_skill {
		rules.push(format!(
			"The query is about soft skills. Prefer assessments of type {}.",
			group_labels(TagGroup::SoftSkill)
		));
	}

	rules.push("Use only ids from the candidate list and never repeat an id.".to_string());
	rules.push("Return only a JSON array of ids, for example [3, 1, 7]. No explanations.".to_string());

	let system = format!(
		"You are an assessment recommendation expert.\n{}",
		rules
			.iter()
			.enumerate()
			.map(|(idx, rule)| format!("{}. {rule}", idx + 1))
			.collect::<Vec<_>>()
			.join("\n")
	);
	let user = serde_json::json!({
		"query": request.query,
		"candidates": request.candidates,
	});

	vec![
		serde_json::json!({ "role": "system", "content": system }),
		serde_json::json!({ "role": "user", "content": user.to_string() }),
	]
}

/// Accepts `[1, 2]`, `["1", "2"]`, `[{"id": 1}]` or an object wrapping such an array under
/// `ids`, `selected_ids` or `recommendations`.
pub fn parse_proposal_ids(value: &Value) -> Result<Vec<u64>> {
	let array = match value {
		Value::Array(array) => array,
		Value::Object(object) => ["ids", "selected_ids", "recommendations"]
			.iter()
			.find_map(|key| object.get(*key).and_then(Value::as_array))
			.ok_or_else(|| Error::Provider {
				message: "Refiner response has no id array.".to_string(),
			})?,
		_ =>
			return Err(Error::Provider {
				message: "Refiner response must be a JSON array.".to_string(),
			}),
	};

	array
		.iter()
		.map(|entry| {
			let id = match entry {
				Value::Object(object) => object.get("id").unwrap_or(entry),
				_ => entry,
			};

			id.as_u64()
				.or_else(|| id.as_str().and_then(|text| text.trim().parse().ok()))
				.ok_or_else(|| Error::Provider {
					message: format!("Refiner returned a non-integer id {id}."),
				})
		})
		.collect()
}

fn group_labels(group: TagGroup) -> String {
	TestType::ALL
		.into_iter()
		.filter(|test_type| test_type.group() == Some(group))
		.map(|test_type| format!("'{}'", test_type.label()))
		.collect::<Vec<_>>()
		.join(" or ")
}

fn preview(description: &str) -> String {
	match description.char_indices().nth(DESCRIPTION_PREVIEW_CHARS) {
		Some((cut, _)) => format!("{}...", &description[..cut]),
		None => description.to_string(),
	}
}
