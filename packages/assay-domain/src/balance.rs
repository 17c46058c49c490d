use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{classify::Classification, test_type::TagGroup};

#[derive(Debug, thiserror::Error)]
#[error("Unknown backfill policy {0:?}.")]
pub struct UnknownBackfillPolicy(pub String);

#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProposalRejection {
	#[error("Proposal references unknown candidate id {id}.")]
	UnknownId { id: u64 },
	#[error("Proposal repeats candidate id {id}.")]
	Duplicate { id: u64 },
	#[error("Proposal has {count} items; expected between {min} and {max}.")]
	Count { count: usize, min: usize, max: usize },
	#[error("Proposal has {found} {group:?} items; at least {required} are required.")]
	Unbalanced { group: TagGroup, found: usize, required: usize },
}

/// How remaining slots are filled once the preferred groups run out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackfillPolicy {
	#[default]
	GlobalSimilarity,
	/// Round-robin across technical, soft-skill and untagged buckets.
	CategoryProportion,
}
impl BackfillPolicy {
	pub fn parse(raw: &str) -> Result<Self, UnknownBackfillPolicy> {
		match raw.trim().to_lowercase().as_str() {
			"global_similarity" => Ok(Self::GlobalSimilarity),
			"category_proportion" => Ok(Self::CategoryProportion),
			_ => Err(UnknownBackfillPolicy(raw.to_string())),
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Self::GlobalSimilarity => "global_similarity",
			Self::CategoryProportion => "category_proportion",
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BalancePolicy {
	pub min_results: usize,
	pub max_results: usize,
	pub backfill: BackfillPolicy,
}
impl BalancePolicy {
	pub fn from_config(cfg: &assay_config::Recommend) -> Result<Self, UnknownBackfillPolicy> {
		Ok(Self {
			min_results: cfg.min_results as usize,
			max_results: cfg.max_results as usize,
			backfill: BackfillPolicy::parse(&cfg.backfill)?,
		})
	}

	pub fn per_group_min(&self) -> usize {
		self.min_results.div_ceil(2)
	}
}
impl Default for BalancePolicy {
	fn default() -> Self {
		Self { min_results: 5, max_results: 10, backfill: BackfillPolicy::GlobalSimilarity }
	}
}

/// The balance-relevant view of one retrieved candidate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BalanceCandidate {
	pub score: f32,
	pub technical: bool,
	pub soft_skill: bool,
}
impl BalanceCandidate {
	pub fn in_group(&self, group: TagGroup) -> bool {
		match group {
			TagGroup::Technical => self.technical,
			TagGroup::SoftSkill => self.soft_skill,
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefineState {
	Neutral,
	TechnicalEmphasis,
	SoftSkillEmphasis,
	Balanced,
}
impl RefineState {
	pub fn resolve(
		classification: &Classification,
		candidates: &[BalanceCandidate],
		policy: &BalancePolicy,
	) -> Self {
		match (classification.wants_technical, classification.wants_soft_skill) {
			(false, false) => Self::Neutral,
			(true, false) => Self::TechnicalEmphasis,
			(false, true) => Self::SoftSkillEmphasis,
			(true, true) => {
				let top = &candidates[..candidates.len().min(policy.max_results)];
				let need = policy.per_group_min();

				if group_count(top, TagGroup::Technical) >= need
					&& group_count(top, TagGroup::SoftSkill) >= need
				{
					Self::Neutral
				} else {
					Self::Balanced
				}
			},
		}
	}

	pub fn preferred_group(self) -> Option<TagGroup> {
		match self {
			Self::TechnicalEmphasis => Some(TagGroup::Technical),
			Self::SoftSkillEmphasis => Some(TagGroup::SoftSkill),
			Self::Neutral | Self::Balanced => None,
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Neutral => "neutral",
			Self::TechnicalEmphasis => "technical_emphasis",
			Self::SoftSkillEmphasis => "soft_skill_emphasis",
			Self::Balanced => "balanced",
		}
	}
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selection {
	/// Positions into the candidate list, in output order.
	pub indices: Vec<usize>,
	/// Fewer candidates than `min_results` were available.
	pub shortfall: bool,
}

/// Picks at most `cap` positions. `cap` is `max_results` for a final answer and the
/// generative window when building the pool offered to the generative step. `candidates` are in
/// retrieval order (descending similarity, ties by corpus order) and the result indexes into it.
pub fn select(
	candidates: &[BalanceCandidate],
	state: RefineState,
	policy: &BalancePolicy,
	cap: usize,
) -> Selection {
	let cap = cap.max(policy.min_results);
	let floor = policy.min_results.min(candidates.len());
	let indices = match state {
		RefineState::Neutral => (0..candidates.len().min(cap)).collect(),
		RefineState::TechnicalEmphasis =>
			select_emphasis(candidates, TagGroup::Technical, policy, cap),
		RefineState::SoftSkillEmphasis =>
			select_emphasis(candidates, TagGroup::SoftSkill, policy, cap),
		RefineState::Balanced => select_balanced(candidates, policy, cap),
	};

	debug_assert!(indices.len() >= floor && indices.len() <= cap);

	Selection { indices, shortfall: candidates.len() < policy.min_results }
}

/// Checks a generative proposal of 1-based pool ids and returns 0-based pool positions.
///
/// The balance rule follows the query intent rather than the resolved state, so a mixed
/// query that resolved to `Neutral` still requires both groups.
pub fn validate_proposal(
	proposal: &[u64],
	pool: &[BalanceCandidate],
	classification: &Classification,
	policy: &BalancePolicy,
) -> Result<Vec<usize>, ProposalRejection> {
	let mut seen = HashSet::with_capacity(proposal.len());
	let mut out = Vec::with_capacity(proposal.len());

	for &id in proposal {
		if id == 0 || id > pool.len() as u64 {
			return Err(ProposalRejection::UnknownId { id });
		}
		if !seen.insert(id) {
			return Err(ProposalRejection::Duplicate { id });
		}

		out.push((id - 1) as usize);
	}

	let min = policy.min_results.min(pool.len());
	let max = policy.max_results;

	if out.len() < min || out.len() > max {
		return Err(ProposalRejection::Count { count: out.len(), min, max });
	}

	let chosen = out.iter().map(|&idx| pool[idx]).collect::<Vec<_>>();
	let mut required_groups = Vec::with_capacity(2);

	if classification.wants_technical {
		required_groups.push(TagGroup::Technical);
	}
	if classification.wants_soft_skill {
		required_groups.push(TagGroup::SoftSkill);
	}

	for group in required_groups {
		let required = policy.per_group_min().min(group_count(pool, group));
		let found = group_count(&chosen, group);

		if found < required {
			return Err(ProposalRejection::Unbalanced { group, found, required });
		}
	}

	Ok(out)
}

fn select_emphasis(
	candidates: &[BalanceCandidate],
	group: TagGroup,
	policy: &BalancePolicy,
	cap: usize,
) -> Vec<usize> {
	let floor = policy.min_results.min(candidates.len());
	let mut chosen = candidates
		.iter()
		.enumerate()
		.filter(|(_, candidate)| candidate.in_group(group))
		.map(|(idx, _)| idx)
		.take(cap)
		.collect::<Vec<_>>();

	if chosen.len() < floor {
		let taken = chosen.iter().copied().collect::<HashSet<_>>();
		let missing = floor - chosen.len();

		chosen.extend(backfill_order(candidates, &taken, policy.backfill).into_iter().take(missing));
	}

	chosen
}

fn select_balanced(
	candidates: &[BalanceCandidate],
	policy: &BalancePolicy,
	cap: usize,
) -> Vec<usize> {
	let need = policy.per_group_min();
	let mut taken = HashSet::new();
	let technical = reserve(candidates, TagGroup::Technical, need, &mut taken);
	let soft_skill = reserve(candidates, TagGroup::SoftSkill, need, &mut taken);
	let technical_first = match (technical.first(), soft_skill.first()) {
		(Some(tech), Some(soft)) => tech < soft,
		(Some(_), None) => true,
		_ => false,
	};
	let (lead, follow) =
		if technical_first { (technical, soft_skill) } else { (soft_skill, technical) };
	let mut chosen = interleave(&lead, &follow);

	chosen.truncate(cap);

	let taken = chosen.iter().copied().collect::<HashSet<_>>();
	let room = cap.saturating_sub(chosen.len());

	chosen.extend(backfill_order(candidates, &taken, policy.backfill).into_iter().take(room));

	chosen
}

/// Takes group members in similarity order until `need` of the chosen items carry the group.
/// Items reserved for an earlier group count toward this one when they carry both tags.
fn reserve(
	candidates: &[BalanceCandidate],
	group: TagGroup,
	need: usize,
	taken: &mut HashSet<usize>,
) -> Vec<usize> {
	let mut have = taken.iter().filter(|&&idx| candidates[idx].in_group(group)).count();
	let mut out = Vec::new();

	for (idx, candidate) in candidates.iter().enumerate() {
		if have >= need {
			break;
		}
		if !candidate.in_group(group) || taken.contains(&idx) {
			continue;
		}

		taken.insert(idx);
		out.push(idx);

		have += 1;
	}

	out
}

fn interleave(lead: &[usize], follow: &[usize]) -> Vec<usize> {
	let mut out = Vec::with_capacity(lead.len() + follow.len());
	let mut lead = lead.iter();
	let mut follow = follow.iter();

	loop {
		let next_lead = lead.next();
		let next_follow = follow.next();

		if next_lead.is_none() && next_follow.is_none() {
			break;
		}

		out.extend(next_lead);
		out.extend(next_follow);
	}

	out
}

fn backfill_order(
	candidates: &[BalanceCandidate],
	taken: &HashSet<usize>,
	policy: BackfillPolicy,
) -> Vec<usize> {
	let remaining = (0..candidates.len()).filter(|idx| !taken.contains(idx));

	match policy {
		BackfillPolicy::GlobalSimilarity => remaining.collect(),
		BackfillPolicy::CategoryProportion => {
			let mut buckets: [Vec<usize>; 3] = Default::default();

			for idx in remaining {
				let candidate = &candidates[idx];
				let bucket = if candidate.technical {
					0
				} else if candidate.soft_skill {
					1
				} else {
					2
				};

				buckets[bucket].push(idx);
			}

			let mut cursors = [0_usize; 3];
			let mut out = Vec::new();

			loop {
				let mut round = buckets
					.iter()
					.zip(cursors.iter())
					.filter_map(|(bucket, &cursor)| bucket.get(cursor).copied())
					.collect::<Vec<_>>();

				if round.is_empty() {
					break;
				}

				round.sort_unstable();

				for (bucket, cursor) in buckets.iter().zip(cursors.iter_mut()) {
					if *cursor < bucket.len() {
						*cursor += 1;
					}
				}

				out.extend(round);
			}

			out
		},
	}
}

fn group_count(candidates: &[BalanceCandidate], group: TagGroup) -> usize {
	candidates.iter().filter(|candidate| candidate.in_group(group)).count()
}
