use std::{
	collections::HashSet,
	fs,
	path::{Path, PathBuf},
	time::Instant,
};

use clap::Parser;
use color_eyre::eyre;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use assay_service::{AssayService, RecommendRequest, RecommendResponse, RefinementSource};

#[derive(Debug, Parser)]
#[command(
	version = assay_cli::VERSION,
	rename_all = "kebab",
	styles = assay_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	#[arg(long, short = 'd', value_name = "FILE")]
	pub dataset: PathBuf,
	/// Overrides `retrieval.top_k` for every query.
	#[arg(long, value_name = "N")]
	pub top_k: Option<u32>,
	#[arg(long, value_name = "N", default_value_t = 1)]
	pub runs_per_query: u32,
}

#[derive(Debug, Deserialize)]
pub struct EvalDataset {
	pub name: Option<String>,
	pub queries: Vec<EvalQuery>,
}

#[derive(Debug, Deserialize)]
pub struct EvalQuery {
	pub id: Option<String>,
	pub query: String,
	/// Catalog identifiers judged relevant.
	pub expected: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct EvalOutput {
	pub dataset: EvalDatasetInfo,
	pub settings: EvalSettings,
	pub summary: EvalSummary,
	pub queries: Vec<QueryReport>,
}

#[derive(Debug, Serialize)]
pub struct EvalDatasetInfo {
	pub name: String,
	pub query_count: usize,
}

#[derive(Debug, Serialize)]
pub struct EvalSettings {
	pub config_path: String,
	pub top_k: u32,
	pub min_results: u32,
	pub max_results: u32,
	pub generative_refinement: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub runs_per_query: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct EvalSummary {
	pub avg_recall_at_k: f64,
	pub avg_precision_at_k: f64,
	pub mean_rr: f64,
	pub mean_ndcg: f64,
	pub latency_ms_p50: f64,
	pub latency_ms_p95: f64,
	/// Queries whose result count fell outside the bounds without a reported shortfall.
	pub count_violations: usize,
	pub shortfalls: usize,
	pub degraded_queries: usize,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub stability: Option<StabilitySummary>,
}

#[derive(Debug, Serialize)]
pub struct StabilitySummary {
	pub runs_per_query: u32,
	pub avg_positional_churn: f64,
	pub avg_set_churn: f64,
}

#[derive(Debug, Serialize)]
pub struct QueryReport {
	pub id: String,
	pub query: String,
	pub state: String,
	pub refinement_source: RefinementSource,
	pub degraded: bool,
	pub expected_count: usize,
	pub retrieved_count: usize,
	pub relevant_count: usize,
	pub recall_at_k: f64,
	pub precision_at_k: f64,
	pub rr: f64,
	pub ndcg: f64,
	pub latency_ms: f64,
	pub count_violation: bool,
	pub shortfall: bool,
	pub expected: Vec<String>,
	pub retrieved: Vec<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub stability: Option<QueryStability>,
}

#[derive(Clone, Copy, Debug, Serialize)]
pub struct QueryStability {
	pub runs_per_query: u32,
	pub positional_churn: f64,
	pub set_churn: f64,
}

struct Metrics {
	recall_at_k: f64,
	precision_at_k: f64,
	rr: f64,
	ndcg: f64,
	relevant_count: usize,
}

struct QueryRuns {
	first: RecommendResponse,
	latency_ms: f64,
	any_degraded: bool,
	stability: Option<QueryStability>,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = assay_config::load(&args.config)?;
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

	let dataset = load_dataset(&args.dataset)?;
	let service = AssayService::new(config)?;
	let report = service.reload_catalog().await?;

	tracing::info!(
		items = report.item_count,
		fingerprint = %report.fingerprint,
		queries = dataset.queries.len(),
		"Evaluation catalog loaded."
	);

	let output = evaluate(&service, &args.config, &dataset, args.top_k, args.runs_per_query).await?;
	let json = serde_json::to_string_pretty(&output)?;

	println!("{json}");

	Ok(())
}

pub fn load_dataset(path: &Path) -> color_eyre::Result<EvalDataset> {
	let raw = fs::read_to_string(path)?;
	let dataset: EvalDataset = serde_json::from_str(&raw)?;

	if dataset.queries.is_empty() {
		return Err(eyre::eyre!("Dataset must include at least one query."));
	}

	for (index, query) in dataset.queries.iter().enumerate() {
		if query.expected.is_empty() {
			return Err(eyre::eyre!(
				"Query at index {index} must include at least one expected identifier."
			));
		}
	}

	Ok(dataset)
}

/// Runs every dataset query against `service` and scores the recommendations.
pub async fn evaluate(
	service: &AssayService,
	config_path: &Path,
	dataset: &EvalDataset,
	top_k: Option<u32>,
	runs_per_query: u32,
) -> color_eyre::Result<EvalOutput> {
	let runs_per_query = runs_per_query.max(1);
	let recommend = &service.cfg.recommend;
	let (min_results, max_results) = (recommend.min_results as usize, recommend.max_results as usize);
	let mut reports = Vec::with_capacity(dataset.queries.len());
	let mut latencies_ms = Vec::with_capacity(dataset.queries.len());

	for (index, query) in dataset.queries.iter().enumerate() {
		let request = RecommendRequest { query: query.query.clone(), top_k };
		let runs = run_query_n_times(service, request, runs_per_query, max_results).await?;
		let retrieved = unique_ids(runs.first.items.iter().map(|item| normalize_id(&item.identifier)));
		let expected = unique_ids(query.expected.iter().map(|id| normalize_id(id)));
		let expected_set = expected.iter().cloned().collect::<HashSet<_>>();
		let metrics = compute_metrics(&retrieved, &expected_set);
		let shortfall = runs.first.shortfall.is_some();
		let count_violation =
			!shortfall && !(min_results..=max_results).contains(&runs.first.items.len());

		if count_violation {
			tracing::warn!(
				query_id = query.id.as_deref().unwrap_or("unnamed"),
				count = runs.first.items.len(),
				"Recommendation count outside bounds."
			);
		}

		latencies_ms.push(runs.latency_ms);
		reports.push(QueryReport {
			id: query.id.clone().unwrap_or_else(|| format!("query-{index}")),
			query: query.query.clone(),
			state: runs.first.state.as_str().to_string(),
			refinement_source: runs.first.refinement.source,
			degraded: runs.any_degraded,
			expected_count: expected.len(),
			retrieved_count: retrieved.len(),
			relevant_count: metrics.relevant_count,
			recall_at_k: metrics.recall_at_k,
			precision_at_k: metrics.precision_at_k,
			rr: metrics.rr,
			ndcg: metrics.ndcg,
			latency_ms: runs.latency_ms,
			count_violation,
			shortfall,
			expected,
			retrieved,
			stability: runs.stability,
		});
	}

	let mut summary = summarize(&reports, &latencies_ms);
	let stability = reports.iter().filter_map(|report| report.stability).collect::<Vec<_>>();

	if !stability.is_empty() {
		let count = stability.len() as f64;

		summary.stability = Some(StabilitySummary {
			runs_per_query,
			avg_positional_churn: stability.iter().map(|s| s.positional_churn).sum::<f64>() / count,
			avg_set_churn: stability.iter().map(|s| s.set_churn).sum::<f64>() / count,
		});
	}

	Ok(EvalOutput {
		dataset: EvalDatasetInfo {
			name: dataset.name.clone().unwrap_or_else(|| "eval".to_string()),
			query_count: reports.len(),
		},
		settings: EvalSettings {
			config_path: config_path.display().to_string(),
			top_k: top_k.unwrap_or(service.cfg.retrieval.top_k),
			min_results: recommend.min_results,
			max_results: recommend.max_results,
			generative_refinement: service.cfg.providers.refiner.enabled,
			runs_per_query: (runs_per_query > 1).then_some(runs_per_query),
		},
		summary,
		queries: reports,
	})
}

async fn run_query_n_times(
	service: &AssayService,
	request: RecommendRequest,
	runs: u32,
	k: usize,
) -> color_eyre::Result<QueryRuns> {
	let mut first: Option<(RecommendResponse, Vec<String>)> = None;
	let mut latency_total_ms = 0.0_f64;
	let mut any_degraded = false;
	let mut positional_sum = 0.0_f64;
	let mut set_sum = 0.0_f64;
	let mut churn_count = 0_u32;

	for _ in 0..runs {
		let start = Instant::now();
		let response = service.recommend(request.clone()).await?;

		latency_total_ms += start.elapsed().as_secs_f64() * 1_000.0;
		any_degraded |= response.refinement.degraded;

		let ids = response.items.iter().map(|item| item.identifier.clone()).collect::<Vec<_>>();

		match &first {
			None => first = Some((response, ids)),
			Some((_, baseline)) => {
				let (positional, set) = churn_against_baseline(baseline, &ids, k);

				positional_sum += positional;
				set_sum += set;
				churn_count += 1;
			},
		}
	}

	let (first, _) = first.ok_or_else(|| eyre::eyre!("No recommendations were collected."))?;
	let stability = (churn_count > 0).then(|| QueryStability {
		runs_per_query: runs,
		positional_churn: positional_sum / churn_count as f64,
		set_churn: set_sum / churn_count as f64,
	});

	Ok(QueryRuns { first, latency_ms: latency_total_ms / runs as f64, any_degraded, stability })
}

fn normalize_id(id: &str) -> String {
	id.trim().trim_end_matches('/').to_string()
}

fn churn_against_baseline(baseline: &[String], other: &[String], k: usize) -> (f64, f64) {
	let k = k.max(1);
	let positional_diff = (0..k).filter(|&idx| baseline.get(idx) != other.get(idx)).count();
	let base_set = baseline.iter().take(k).collect::<HashSet<_>>();
	let other_set = other.iter().take(k).collect::<HashSet<_>>();
	let union = base_set.union(&other_set).count();
	let overlap = base_set.intersection(&other_set).count();
	let set_churn = if union == 0 { 0.0 } else { 1.0 - overlap as f64 / union as f64 };

	(positional_diff as f64 / k as f64, set_churn)
}

fn unique_ids<I>(iter: I) -> Vec<String>
where
	I: Iterator<Item = String>,
{
	let mut seen = HashSet::new();
	let mut out = Vec::new();

	for id in iter {
		if seen.insert(id.clone()) {
			out.push(id);
		}
	}

	out
}

fn compute_metrics(retrieved: &[String], expected: &HashSet<String>) -> Metrics {
	let mut relevant_count = 0_usize;
	let mut dcg = 0.0_f64;
	let mut first_hit = None;

	for (idx, id) in retrieved.iter().enumerate() {
		if expected.contains(id) {
			let rank = idx + 1;

			relevant_count += 1;
			dcg += 1.0 / (rank as f64 + 1.0).log2();
			first_hit.get_or_insert(rank);
		}
	}

	let idcg = (1..=expected.len().min(retrieved.len()))
		.map(|rank| 1.0 / (rank as f64 + 1.0).log2())
		.sum::<f64>();
	let rr = first_hit.map_or(0.0, |rank| 1.0 / rank as f64);
	let ndcg = if idcg > 0.0 { dcg / idcg } else { 0.0 };
	let precision_at_k =
		if retrieved.is_empty() { 0.0 } else { relevant_count as f64 / retrieved.len() as f64 };
	let recall_at_k =
		if expected.is_empty() { 0.0 } else { relevant_count as f64 / expected.len() as f64 };

	Metrics { recall_at_k, precision_at_k, rr, ndcg, relevant_count }
}

fn summarize(reports: &[QueryReport], latencies_ms: &[f64]) -> EvalSummary {
	let count = reports.len().max(1) as f64;
	let mut sorted = latencies_ms.to_vec();

	sorted.sort_by(f64::total_cmp);

	EvalSummary {
		avg_recall_at_k: reports.iter().map(|r| r.recall_at_k).sum::<f64>() / count,
		avg_precision_at_k: reports.iter().map(|r| r.precision_at_k).sum::<f64>() / count,
		mean_rr: reports.iter().map(|r| r.rr).sum::<f64>() / count,
		mean_ndcg: reports.iter().map(|r| r.ndcg).sum::<f64>() / count,
		latency_ms_p50: percentile(&sorted, 0.50),
		latency_ms_p95: percentile(&sorted, 0.95),
		count_violations: reports.iter().filter(|r| r.count_violation).count(),
		shortfalls: reports.iter().filter(|r| r.shortfall).count(),
		degraded_queries: reports.iter().filter(|r| r.degraded).count(),
		stability: None,
	}
}

/// Linear interpolation over pre-sorted values.
fn percentile(values: &[f64], percentile: f64) -> f64 {
	if values.is_empty() {
		return 0.0;
	}

	let pos = percentile.clamp(0.0, 1.0) * (values.len() as f64 - 1.0);
	let lower = pos.floor() as usize;
	let upper = pos.ceil() as usize;

	if lower == upper {
		values[lower]
	} else {
		let weight = pos - lower as f64;

		values[lower] * (1.0 - weight) + values[upper] * weight
	}
}
