use assay_config::Recommend;
use assay_domain::{
	balance::{
		BackfillPolicy, BalanceCandidate, BalancePolicy, ProposalRejection, RefineState, select,
		validate_proposal,
	},
	classify::Classification,
	test_type::TagGroup,
};

/// One candidate per character, in descending similarity: `T` technical, `S` soft skill,
/// `B` both, anything else untagged.
fn candidates(layout: &str) -> Vec<BalanceCandidate> {
	layout
		.chars()
		.enumerate()
		.map(|(idx, tag)| BalanceCandidate {
			score: 1.0 - idx as f32 * 0.01,
			technical: matches!(tag, 'T' | 'B'),
			soft_skill: matches!(tag, 'S' | 'B'),
		})
		.collect()
}

fn intent(wants_technical: bool, wants_soft_skill: bool) -> Classification {
	Classification { wants_technical, wants_soft_skill, ..Default::default() }
}

fn policy() -> BalancePolicy {
	BalancePolicy::default()
}

#[test]
fn policy_reads_recommend_defaults() {
	let policy = BalancePolicy::from_config(&Recommend::default()).expect("Default policy.");

	assert_eq!(policy, BalancePolicy::default());
	assert_eq!(policy.per_group_min(), 3);
	assert!(BackfillPolicy::parse("round_robin").is_err());
	assert_eq!(
		BackfillPolicy::parse(" Category_Proportion ").expect("Known policy."),
		BackfillPolicy::CategoryProportion
	);
}

#[test]
fn resolve_follows_the_classification_flags() {
	let pool = candidates("TTTTTTTTSSNN");

	assert_eq!(RefineState::resolve(&intent(false, false), &pool, &policy()), RefineState::Neutral);
	assert_eq!(
		RefineState::resolve(&intent(true, false), &pool, &policy()),
		RefineState::TechnicalEmphasis
	);
	assert_eq!(
		RefineState::resolve(&intent(false, true), &pool, &policy()),
		RefineState::SoftSkillEmphasis
	);
	assert_eq!(RefineState::resolve(&intent(true, true), &pool, &policy()), RefineState::Balanced);
}

#[test]
fn mixed_intent_over_a_well_mixed_top_list_is_neutral() {
	let pool = candidates("TSTSTSNNNNNN");

	assert_eq!(RefineState::resolve(&intent(true, true), &pool, &policy()), RefineState::Neutral);
}

#[test]
fn neutral_takes_the_top_max_results() {
	let pool = candidates("NNNNNNNNNNNN");
	let selection = select(&pool, RefineState::Neutral, &policy(), 10);

	assert_eq!(selection.indices, (0..10).collect::<Vec<_>>());
	assert!(!selection.shortfall);
}

#[test]
fn technical_emphasis_keeps_preferred_items_first_then_backfills_to_min() {
	let pool = candidates("NNTNTNNTNNNN");
	let selection = select(&pool, RefineState::TechnicalEmphasis, &policy(), 10);

	assert_eq!(selection.indices, vec![2, 4, 7, 0, 1]);
}

#[test]
fn technical_emphasis_with_enough_preferred_items_skips_backfill() {
	let pool = candidates("TNTTNTTNTTTTTT");
	let selection = select(&pool, RefineState::TechnicalEmphasis, &policy(), 10);

	assert_eq!(selection.indices, vec![0, 2, 3, 5, 6, 8, 9, 10, 11, 12]);
	assert!(selection.indices.iter().all(|&idx| pool[idx].technical));
}

#[test]
fn soft_skill_emphasis_is_symmetric() {
	let pool = candidates("TTSTTSTTSTTT");
	let selection = select(&pool, RefineState::SoftSkillEmphasis, &policy(), 10);

	assert_eq!(selection.indices, vec![2, 5, 8, 0, 1]);
}

#[test]
fn balanced_reserves_each_group_interleaved_then_fills_by_similarity() {
	let pool = candidates("TTTTTTTTSSNN");
	let selection = select(&pool, RefineState::Balanced, &policy(), 10);

	assert_eq!(selection.indices, vec![0, 8, 1, 9, 2, 3, 4, 5, 6, 7]);
}

#[test]
fn balanced_leads_with_the_group_holding_the_best_candidate() {
	let pool = candidates("NSSSTNNNTNTN");
	let selection = select(&pool, RefineState::Balanced, &policy(), 10);

	assert_eq!(&selection.indices[..6], &[1, 4, 2, 8, 3, 10]);
	assert_eq!(selection.indices.len(), 10);
}

#[test]
fn balanced_meets_the_per_group_minimum_for_the_final_answer() {
	let pool = candidates("TTTTTTTTTTTTTTTTTTTTSSSSS");
	let selection = select(&pool, RefineState::Balanced, &policy(), 10);
	let soft = selection.indices.iter().filter(|&&idx| pool[idx].soft_skill).count();
	let technical = selection.indices.iter().filter(|&&idx| pool[idx].technical).count();

	assert_eq!(selection.indices.len(), 10);
	assert!(soft >= 3);
	assert!(technical >= 3);
}

#[test]
fn category_proportion_backfill_rotates_through_buckets() {
	let pool = candidates("TNNSNN");
	let policy = BalancePolicy { backfill: BackfillPolicy::CategoryProportion, ..policy() };
	let selection = select(&pool, RefineState::TechnicalEmphasis, &policy, 10);

	assert_eq!(selection.indices, vec![0, 1, 3, 2, 4]);
}

#[test]
fn small_pools_return_everything_and_flag_the_shortfall() {
	let pool = candidates("TSN");

	for state in [
		RefineState::Neutral,
		RefineState::TechnicalEmphasis,
		RefineState::SoftSkillEmphasis,
		RefineState::Balanced,
	] {
		let selection = select(&pool, state, &policy(), 10);
		let mut sorted = selection.indices.clone();

		sorted.sort_unstable();

		assert_eq!(sorted, vec![0, 1, 2], "state {state:?}");
		assert!(selection.shortfall);
	}
}

#[test]
fn selection_is_deterministic() {
	let pool = candidates("NSBTTNSNTTSNBNNTS");

	for state in [RefineState::Balanced, RefineState::SoftSkillEmphasis] {
		assert_eq!(select(&pool, state, &policy(), 10), select(&pool, state, &policy(), 10));
	}
}

#[test]
fn generative_window_widens_the_pool() {
	let pool = candidates("NNNNNNNNNNNNNNNNNNNNNNNNN");
	let selection = select(&pool, RefineState::Neutral, &policy(), 20);

	assert_eq!(selection.indices.len(), 20);
}

#[test]
fn proposals_with_unknown_or_repeated_ids_are_rejected() {
	let pool = candidates("TTTTTSSSSS");
	let neutral = intent(false, false);

	assert_eq!(
		validate_proposal(&[0, 1, 2, 3, 4], &pool, &neutral, &policy()),
		Err(ProposalRejection::UnknownId { id: 0 })
	);
	assert_eq!(
		validate_proposal(&[1, 2, 3, 4, 11], &pool, &neutral, &policy()),
		Err(ProposalRejection::UnknownId { id: 11 })
	);
	assert_eq!(
		validate_proposal(&[1, 2, 2, 3, 4], &pool, &neutral, &policy()),
		Err(ProposalRejection::Duplicate { id: 2 })
	);
}

#[test]
fn proposals_outside_the_count_bounds_are_rejected() {
	let pool = candidates("NNNNNNNNNNNN");
	let neutral = intent(false, false);

	assert_eq!(
		validate_proposal(&[1, 2, 3], &pool, &neutral, &policy()),
		Err(ProposalRejection::Count { count: 3, min: 5, max: 10 })
	);
	assert_eq!(
		validate_proposal(&(1..=11).collect::<Vec<u64>>(), &pool, &neutral, &policy()),
		Err(ProposalRejection::Count { count: 11, min: 5, max: 10 })
	);
}

#[test]
fn mixed_intent_proposals_must_cover_both_groups() {
	let pool = candidates("TTTTTTSSSS");
	let mixed = intent(true, true);

	assert_eq!(
		validate_proposal(&[1, 2, 3, 4, 5, 7], &pool, &mixed, &policy()),
		Err(ProposalRejection::Unbalanced { group: TagGroup::SoftSkill, found: 1, required: 3 })
	);
	assert_eq!(
		validate_proposal(&[7, 1, 8, 2, 9, 3], &pool, &mixed, &policy()),
		Ok(vec![6, 0, 7, 1, 8, 2])
	);
}

#[test]
fn emphasis_proposals_need_preferred_items_only_when_available() {
	let technical = intent(true, false);
	let rich = candidates("TTTTTNNNNN");
	let sparse = candidates("TNNNNNNNNN");

	assert!(matches!(
		validate_proposal(&[1, 6, 7, 8, 9], &rich, &technical, &policy()),
		Err(ProposalRejection::Unbalanced { group: TagGroup::Technical, found: 1, required: 3 })
	));
	assert_eq!(
		validate_proposal(&[1, 6, 7, 8, 9], &sparse, &technical, &policy()),
		Ok(vec![0, 5, 6, 7, 8])
	);
}

#[test]
fn small_pools_accept_proposals_using_every_candidate() {
	let pool = candidates("TSN");

	assert_eq!(
		validate_proposal(&[3, 1, 2], &pool, &intent(true, true), &policy()),
		Ok(vec![2, 0, 1])
	);
}
