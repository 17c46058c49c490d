use std::{
	collections::HashSet,
	sync::Arc,
	time::{Duration, Instant},
};

use assay_config::Config;
use assay_domain::{balance::RefineState, catalog::CatalogItem};
use assay_service::{
	AssayService, Error, ProposalRequest, Providers, RecommendRequest, RecommendResponse,
	RefineProvider, RefinementSource, VectorIndex,
};
use assay_testkit::{
	FailingEmbedder, FailingIndex, FnRefiner, SlowRefiner, SpyEmbedder, StaticCatalog,
	TEST_VECTOR_DIM, VersionedIndex, catalog_item, failing_refiner, fixture_catalog,
	generative_config, scripted_refiner, service_with, test_config,
};

const TECHNICAL_QUERY: &str = "Java developer with strong SQL skills";
const MIXED_QUERY: &str = "Java developer with excellent team communication and leadership";
const GENERAL_QUERY: &str = "Graduate analyst for a retail bank";

async fn build(
	cfg: Config,
	refiner: Arc<dyn RefineProvider>,
	items: Vec<CatalogItem>,
) -> (AssayService, Arc<SpyEmbedder>) {
	let embedder = Arc::new(SpyEmbedder::new(TEST_VECTOR_DIM));
	let providers = Providers::new(embedder.clone(), refiner);
	let service = service_with(cfg, providers, items).await.expect("Failed to build service.");

	(service, embedder)
}

async fn heuristic_service() -> AssayService {
	build(test_config(), Arc::new(failing_refiner()), fixture_catalog()).await.0
}

async fn recommend(service: &AssayService, query: &str) -> RecommendResponse {
	service
		.recommend(RecommendRequest { query: query.to_string(), top_k: None })
		.await
		.expect("Recommendation failed.")
}

fn identifiers(response: &RecommendResponse) -> Vec<String> {
	response.items.iter().map(|item| item.identifier.clone()).collect()
}

fn technical_count(response: &RecommendResponse) -> usize {
	response
		.items
		.iter()
		.filter(|item| item.test_types.iter().any(|t| t.code() == 'K' || t.code() == 'S'))
		.count()
}

fn soft_skill_count(response: &RecommendResponse) -> usize {
	response
		.items
		.iter()
		.filter(|item| item.test_types.iter().any(|t| matches!(t.code(), 'P' | 'B' | 'C' | 'D')))
		.count()
}

#[tokio::test]
async fn recommendations_stay_within_bounds_without_duplicates() {
	let service = heuristic_service().await;

	for query in [TECHNICAL_QUERY, MIXED_QUERY, GENERAL_QUERY, "leadership", "sql"] {
		let response = recommend(&service, query).await;
		let ids = identifiers(&response);
		let unique = ids.iter().collect::<HashSet<_>>();

		assert!((5..=10).contains(&ids.len()), "query {query:?} returned {} items", ids.len());
		assert_eq!(unique.len(), ids.len(), "query {query:?} returned duplicates");
		assert!(response.shortfall.is_none());
	}
}

#[tokio::test]
async fn technical_query_keeps_technical_items() {
	let service = heuristic_service().await;
	let response = recommend(&service, TECHNICAL_QUERY).await;

	assert!(response.classification.wants_technical);
	assert!(!response.classification.wants_soft_skill);
	assert_eq!(response.state, RefineState::TechnicalEmphasis);
	assert!(technical_count(&response) >= 3);
}

#[tokio::test]
async fn mixed_query_covers_both_groups() {
	let service = heuristic_service().await;
	let response = recommend(&service, MIXED_QUERY).await;

	assert!(response.classification.wants_technical);
	assert!(response.classification.wants_soft_skill);
	assert!(matches!(response.state, RefineState::Balanced | RefineState::Neutral));
	assert!(technical_count(&response) >= 3);
	assert!(soft_skill_count(&response) >= 3);
	assert!(response.intent_summary.as_deref().is_some_and(|summary| summary.contains("soft skill")));
}

#[tokio::test]
async fn identical_queries_return_identical_results() {
	let service = heuristic_service().await;

	for query in [TECHNICAL_QUERY, MIXED_QUERY, GENERAL_QUERY] {
		let first = recommend(&service, query).await;
		let second = recommend(&service, query).await;
		let scores = |response: &RecommendResponse| {
			response.items.iter().map(|item| item.score).collect::<Vec<_>>()
		};

		assert_eq!(identifiers(&first), identifiers(&second));
		assert_eq!(scores(&first), scores(&second));
		assert_ne!(first.request_id, second.request_id);
	}
}

#[tokio::test]
async fn blank_query_fails_before_embedding() {
	let (service, embedder) =
		build(test_config(), Arc::new(failing_refiner()), fixture_catalog()).await;
	let baseline = embedder.calls();

	for query in ["", "   ", "\n\t"] {
		let err = service
			.recommend(RecommendRequest { query: query.to_string(), top_k: None })
			.await
			.expect_err("Expected invalid query.");

		assert!(matches!(err, Error::InvalidQuery { .. }));
	}

	assert!(matches!(service.retrieve("  ", None).await, Err(Error::InvalidQuery { .. })));
	assert_eq!(embedder.calls(), baseline);

	recommend(&service, TECHNICAL_QUERY).await;

	assert_eq!(embedder.calls(), baseline + 1);
}

#[tokio::test]
async fn retrieval_is_ordered_by_similarity() {
	let service = heuristic_service().await;
	let candidates = service.retrieve(MIXED_QUERY, None).await.expect("Retrieval failed.");

	assert_eq!(candidates.len(), 25);
	assert!(candidates.candidates.windows(2).all(|pair| pair[0].score >= pair[1].score));
	assert!(
		candidates
			.candidates
			.windows(2)
			.filter(|pair| pair[0].score == pair[1].score)
			.all(|pair| pair[0].ordinal < pair[1].ordinal)
	);
}

#[tokio::test]
async fn top_k_is_capped_at_corpus_size_and_must_be_positive() {
	let service = heuristic_service().await;
	let candidates = service.retrieve(TECHNICAL_QUERY, Some(500)).await.expect("Retrieval failed.");

	assert_eq!(candidates.len(), fixture_catalog().len());

	let err = service
		.recommend(RecommendRequest { query: TECHNICAL_QUERY.to_string(), top_k: Some(0) })
		.await
		.expect_err("Expected invalid request.");

	assert!(matches!(err, Error::InvalidRequest { .. }));
}

#[tokio::test]
async fn top_k_below_min_results_is_rejected_on_a_healthy_corpus() {
	let (service, embedder) =
		build(test_config(), Arc::new(failing_refiner()), fixture_catalog()).await;
	let baseline = embedder.calls();
	let err = service
		.recommend(RecommendRequest { query: TECHNICAL_QUERY.to_string(), top_k: Some(2) })
		.await
		.expect_err("Expected invalid request.");

	assert!(matches!(err, Error::InvalidRequest { .. }));
	assert_eq!(embedder.calls(), baseline);
	assert_eq!(service.stats().shortfalls, 0);

	let response = service
		.recommend(RecommendRequest { query: TECHNICAL_QUERY.to_string(), top_k: Some(5) })
		.await
		.expect("Recommendation failed.");

	assert_eq!(response.items.len(), 5);
	assert!(response.shortfall.is_none());
}

#[tokio::test]
async fn small_corpus_returns_everything_and_reports_shortfall() {
	let items = vec![
		catalog_item("java", "Java", "Java programming.", "K"),
		catalog_item("opq", "OPQ", "Personality at work.", "P"),
		catalog_item("numerical", "Numerical", "Numerical reasoning.", "A"),
	];
	let (service, _) = build(test_config(), Arc::new(failing_refiner()), items).await;
	let response = recommend(&service, MIXED_QUERY).await;
	let shortfall = response.shortfall.expect("Expected a shortfall.");

	assert_eq!(response.items.len(), 3);
	assert_eq!((shortfall.available, shortfall.required), (3, 5));
	assert_eq!(service.stats().shortfalls, 1);
}

#[tokio::test]
async fn missing_catalog_is_retrieval_unavailable() {
	let service = AssayService::with_providers(
		test_config(),
		Providers::new(Arc::new(SpyEmbedder::new(TEST_VECTOR_DIM)), Arc::new(failing_refiner())),
	)
	.expect("Failed to build service.");
	let err = service
		.recommend(RecommendRequest { query: TECHNICAL_QUERY.to_string(), top_k: None })
		.await
		.expect_err("Expected retrieval failure.");

	assert!(matches!(err, Error::RetrievalUnavailable { .. }));
}

#[tokio::test]
async fn embedder_failure_is_retrieval_unavailable() {
	let (mut service, _) =
		build(test_config(), Arc::new(failing_refiner()), fixture_catalog()).await;

	service.providers.embedding = Arc::new(FailingEmbedder);

	let err = service
		.recommend(RecommendRequest { query: TECHNICAL_QUERY.to_string(), top_k: None })
		.await
		.expect_err("Expected retrieval failure.");

	assert!(matches!(err, Error::RetrievalUnavailable { .. }));
}

#[tokio::test]
async fn unreachable_index_is_retrieval_unavailable() {
	let (service, _) = build(test_config(), Arc::new(failing_refiner()), fixture_catalog()).await;
	let service = service.with_index(Arc::new(FailingIndex));
	let err = service
		.recommend(RecommendRequest { query: TECHNICAL_QUERY.to_string(), top_k: None })
		.await
		.expect_err("Expected retrieval failure.");

	assert!(
		matches!(&err, Error::RetrievalUnavailable { message } if message.contains("Vector search"))
	);
}

#[tokio::test]
async fn query_dimension_mismatch_is_retrieval_unavailable() {
	let (mut service, _) =
		build(test_config(), Arc::new(failing_refiner()), fixture_catalog()).await;

	service.providers.embedding = Arc::new(SpyEmbedder::new(TEST_VECTOR_DIM / 2));

	let err = service
		.retrieve(TECHNICAL_QUERY, None)
		.await
		.expect_err("Expected retrieval failure.");

	assert!(
		matches!(&err, Error::RetrievalUnavailable { message } if message.contains("dimensions"))
	);
}

#[tokio::test]
async fn accepted_proposals_set_the_final_order() {
	let refiner = Arc::new(FnRefiner::new(|request: &ProposalRequest| {
		let mut ids = request
			.candidates
			.iter()
			.filter(|candidate| {
				candidate.test_types.iter().any(|t| t == "Knowledge & Skills" || t == "Simulations")
			})
			.map(|candidate| candidate.id)
			.take(6)
			.collect::<Vec<_>>();

		ids.reverse();

		Ok(ids)
	}));
	let (service, _) = build(generative_config(), refiner.clone(), fixture_catalog()).await;
	let response = recommend(&service, TECHNICAL_QUERY).await;

	assert_eq!(refiner.calls(), 1);
	assert_eq!(response.refinement.source, RefinementSource::Generative);
	assert!(!response.refinement.degraded);
	assert_eq!(response.items.len(), 6);
	assert_eq!(technical_count(&response), 6);
	assert!(response.items.windows(2).all(|pair| pair[0].score <= pair[1].score));
	assert_eq!(service.stats().generative_accepted, 1);
}

#[tokio::test]
async fn failing_generative_step_falls_back_to_the_heuristic_result() {
	let baseline = heuristic_service().await;

	for query in [TECHNICAL_QUERY, MIXED_QUERY, GENERAL_QUERY] {
		let (service, _) =
			build(generative_config(), Arc::new(failing_refiner()), fixture_catalog()).await;
		let degraded = recommend(&service, query).await;
		let expected = recommend(&baseline, query).await;

		assert_eq!(degraded.refinement.source, RefinementSource::Heuristic);
		assert!(degraded.refinement.degraded);
		assert_eq!(identifiers(&degraded), identifiers(&expected));
		assert_eq!(service.stats().generative_degraded, 1);
	}
}

#[tokio::test]
async fn slow_generative_step_times_out_within_budget() {
	let refiner = Arc::new(SlowRefiner { delay: Duration::from_secs(5) });
	let (service, _) = build(generative_config(), refiner, fixture_catalog()).await;
	let started = Instant::now();
	let response = recommend(&service, MIXED_QUERY).await;

	assert!(started.elapsed() < Duration::from_secs(2));
	assert!(response.refinement.degraded);
	assert!(response.refinement.reason.as_deref().is_some_and(|reason| reason.contains("timed out")));
	assert!(technical_count(&response) >= 3);
	assert!(soft_skill_count(&response) >= 3);
}

#[tokio::test]
async fn malformed_proposals_are_rejected() {
	for ids in [vec![1, 1, 2, 3, 4], vec![1, 2], vec![1, 2, 3, 4, 99], (1..=11).collect()] {
		let (service, _) =
			build(generative_config(), Arc::new(scripted_refiner(ids.clone())), fixture_catalog())
				.await;
		let response = recommend(&service, GENERAL_QUERY).await;

		assert!(response.refinement.degraded, "ids {ids:?} should be rejected");
		assert_eq!(response.refinement.source, RefinementSource::Heuristic);
		assert!((5..=10).contains(&response.items.len()));
	}
}

#[tokio::test]
async fn unbalanced_proposals_for_mixed_queries_are_rejected() {
	let refiner = Arc::new(FnRefiner::new(|request: &ProposalRequest| {
		Ok(request
			.candidates
			.iter()
			.filter(|candidate| {
				candidate.test_types.iter().all(|t| t == "Knowledge & Skills" || t == "Simulations")
			})
			.map(|candidate| candidate.id)
			.take(6)
			.collect::<Vec<_>>())
	}));
	let (service, _) = build(generative_config(), refiner, fixture_catalog()).await;
	let response = recommend(&service, MIXED_QUERY).await;

	assert!(response.refinement.degraded);
	assert!(response.refinement.reason.as_deref().is_some_and(|reason| reason.contains("rejected")));
	assert!(soft_skill_count(&response) >= 3);
}

#[tokio::test]
async fn disabled_generative_step_is_never_called() {
	let refiner = Arc::new(scripted_refiner(vec![1, 2, 3, 4, 5]));
	let (service, _) = build(test_config(), refiner.clone(), fixture_catalog()).await;
	let response = recommend(&service, TECHNICAL_QUERY).await;

	assert_eq!(refiner.calls(), 0);
	assert_eq!(response.refinement.source, RefinementSource::Heuristic);
	assert!(!response.refinement.degraded);
	assert_eq!(service.stats().heuristic_only, 1);
	assert_eq!(service.stats().requests, 1);
}

#[tokio::test]
async fn reload_swaps_snapshots_without_touching_held_ones() {
	let source = Arc::new(StaticCatalog::new(fixture_catalog()));
	let service = AssayService::with_providers(
		test_config(),
		Providers::new(Arc::new(SpyEmbedder::new(TEST_VECTOR_DIM)), Arc::new(failing_refiner())),
	)
	.expect("Failed to build service.")
	.with_source(source.clone());
	let first = service.reload_catalog().await.expect("First reload failed.");

	assert_eq!(first.item_count, fixture_catalog().len());
	assert_eq!(first.embedded_count, first.item_count);
	assert!(first.previous_fingerprint.is_none());

	let held = service.retrieve(TECHNICAL_QUERY, None).await.expect("Retrieval failed.");

	source.replace(fixture_catalog().into_iter().take(12).collect());

	let second = service.reload_catalog().await.expect("Second reload failed.");

	assert_eq!(second.item_count, 12);
	assert_eq!(second.previous_fingerprint.as_deref(), Some(first.fingerprint.as_str()));
	assert_ne!(second.fingerprint, first.fingerprint);
	assert_eq!(held.snapshot.len(), fixture_catalog().len());
	assert_eq!(service.catalog.current().map(|snapshot| snapshot.len()), Some(12));
}

#[tokio::test]
async fn held_snapshots_stay_queryable_after_a_reload() {
	let source = Arc::new(StaticCatalog::new(fixture_catalog()));
	let index = Arc::new(VersionedIndex::default());
	let service = AssayService::with_providers(
		test_config(),
		Providers::new(Arc::new(SpyEmbedder::new(TEST_VECTOR_DIM)), Arc::new(failing_refiner())),
	)
	.expect("Failed to build service.")
	.with_index(index.clone())
	.with_source(source.clone());
	let first = service.reload_catalog().await.expect("First reload failed.");
	let held = service.retrieve(TECHNICAL_QUERY, None).await.expect("Retrieval failed.");

	source.replace(fixture_catalog().into_iter().take(12).collect());

	let second = service.reload_catalog().await.expect("Second reload failed.");
	let vector = held.snapshot.get(0).map(|item| item.embedding.clone()).expect("Empty snapshot.");
	let hits = service
		.index
		.nearest(&held.snapshot, &vector, 5)
		.await
		.expect("Held snapshot must stay queryable.");

	assert_eq!(hits.len(), 5);
	assert!(index.is_live(&first.fingerprint));
	assert!(index.is_live(&second.fingerprint));

	source.replace(fixture_catalog().into_iter().take(8).collect());

	let third = service.reload_catalog().await.expect("Third reload failed.");

	assert!(!index.is_live(&first.fingerprint));
	assert!(index.is_live(&second.fingerprint));
	assert_eq!(
		index.events(),
		vec![
			format!("sync {}", first.fingerprint),
			format!("prune {}", first.fingerprint),
			format!("sync {}", second.fingerprint),
			format!("prune {}", second.fingerprint),
			format!("sync {}", third.fingerprint),
			format!("prune {}", third.fingerprint),
		]
	);
}

#[tokio::test]
async fn concurrent_reloads_install_one_at_a_time() {
	let index = Arc::new(VersionedIndex::default());
	let (service, _) = build(test_config(), Arc::new(failing_refiner()), fixture_catalog()).await;
	let service = service.with_index(index.clone());
	let (left, right) = tokio::join!(
		service.install_catalog(fixture_catalog().into_iter().take(10).collect()),
		service.install_catalog(fixture_catalog().into_iter().take(14).collect()),
	);
	let (left, right) = (left.expect("Install failed."), right.expect("Install failed."));
	let events = index.events();

	assert_eq!(events.len(), 4);
	assert!(events.chunks(2).all(|pair| pair[0].replace("sync", "prune") == pair[1]));

	let current = service.catalog.current().map(|snapshot| snapshot.fingerprint().to_string());
	let last = if events[3].ends_with(&left.fingerprint) { &left } else { &right };

	assert_eq!(current.as_deref(), Some(last.fingerprint.as_str()));
}

#[tokio::test]
async fn reload_without_a_source_is_a_catalog_error() {
	let service = heuristic_service().await;

	assert!(matches!(service.reload_catalog().await, Err(Error::Catalog { .. })));
}

#[tokio::test]
async fn invalid_catalogs_keep_the_previous_snapshot() {
	let service = heuristic_service().await;
	let before = service.catalog.current().map(|snapshot| snapshot.fingerprint().to_string());
	let mut wrong_dim = catalog_item("java", "Java", "Java programming.", "K");

	wrong_dim.embedding = vec![1.0, 0.0, 0.0];

	let mut duplicate = fixture_catalog();

	duplicate.push(catalog_item("core-java", "Core Java again", "Duplicate.", "K"));

	for items in [vec![wrong_dim], duplicate] {
		assert!(matches!(service.install_catalog(items).await, Err(Error::Catalog { .. })));
	}

	assert_eq!(
		service.catalog.current().map(|snapshot| snapshot.fingerprint().to_string()),
		before
	);
}
