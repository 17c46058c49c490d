use std::{
	collections::{BTreeSet, HashSet},
	sync::{
		Arc, Mutex,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};

use assay_catalog::{CatalogSnapshot, Hit};
use assay_config::{
	Catalog, Classifier, Config, EmbeddingProviderConfig, Index, Providers as ProviderSettings,
	Recommend, RefinerProviderConfig, Retrieval, Service,
};
use assay_domain::{catalog::CatalogItem, test_type::TestType};
use assay_providers::hashing::HashingEmbedder;
use assay_service::{
	AssayService, BoxFuture, CatalogSource, EmbeddingProvider, Error, ProposalRequest, Providers,
	RefineProvider, Result, VectorIndex,
};

pub const TEST_VECTOR_DIM: u32 = 256;

/// Memory index, local hashing embedder, generative refinement disabled.
pub fn test_config() -> Config {
	Config {
		service: Service {
			http_bind: "127.0.0.1:0".to_string(),
			admin_bind: "127.0.0.1:0".to_string(),
			log_level: "info".to_string(),
		},
		catalog: Catalog { path: None, reload_on_start: false },
		index: Index { backend: "memory".to_string(), vector_dim: TEST_VECTOR_DIM, qdrant: None },
		providers: ProviderSettings {
			embedding: EmbeddingProviderConfig {
				provider_id: "local".to_string(),
				api_base: String::new(),
				api_key: String::new(),
				path: "/v1/embeddings".to_string(),
				model: "hash-v1".to_string(),
				dimensions: TEST_VECTOR_DIM,
				timeout_ms: 1_000,
				default_headers: serde_json::Map::new(),
			},
			refiner: RefinerProviderConfig {
				enabled: false,
				provider_id: "test".to_string(),
				api_base: "http://127.0.0.1:9".to_string(),
				api_key: "test-key".to_string(),
				path: "/v1/chat/completions".to_string(),
				model: "m".to_string(),
				temperature: 0.0,
				timeout_ms: 200,
				default_headers: serde_json::Map::new(),
			},
		},
		retrieval: Retrieval::default(),
		recommend: Recommend::default(),
		classifier: Classifier::default(),
	}
}

/// Same as [`test_config`] with generative refinement switched on.
pub fn generative_config() -> Config {
	let mut cfg = test_config();

	cfg.providers.refiner.enabled = true;

	cfg
}

pub fn catalog_item(slug: &str, name: &str, description: &str, codes: &str) -> CatalogItem {
	let test_types = codes.chars().filter_map(TestType::from_code).collect::<BTreeSet<_>>();

	CatalogItem {
		identifier: format!("https://catalog.test/{slug}"),
		name: name.to_string(),
		description: description.to_string(),
		duration_minutes: Some(10 + (slug.len() as u32 % 4) * 10),
		adaptive_support: codes.contains('A'),
		remote_support: true,
		test_types,
		embedding: Vec::new(),
	}
}

/// A small assessment catalog with technical, soft-skill and general entries. Items carry no
/// vectors, so installing it exercises ingestion-time embedding.
pub fn fixture_catalog() -> Vec<CatalogItem> {
	[
		("core-java", "Core Java (Entry Level)", "Multiple-choice test of Java programming fundamentals, classes and collections.", "K"),
		("java-8", "Java 8 (New)", "Measures knowledge of Java 8 features such as streams and lambdas for developers.", "K"),
		("sql-server", "SQL Server", "Tests SQL query writing, joins and database design knowledge.", "K"),
		("python", "Python (New)", "Measures Python programming skill for software developers.", "K"),
		("javascript", "JavaScript (New)", "Knowledge of JavaScript language features for front end developers.", "K"),
		("dotnet", ".NET Framework 4.5", "Assesses .NET framework and C# development knowledge.", "K"),
		("automata", "Automata - Fix (New)", "Coding simulation where candidates fix bugs in Java or Python code.", "S"),
		("automata-sql", "Automata - SQL (New)", "Hands-on SQL coding simulation against a live database.", "S"),
		("data-warehousing", "Data Warehousing Concepts", "Knowledge of data warehousing, ETL and analytics concepts.", "K"),
		("selenium", "Selenium (New)", "Measures knowledge of Selenium test automation for software engineers.", "K"),
		("linux", "Linux Programming (General)", "Tests Linux shell and systems programming knowledge.", "K"),
		("agile-software", "Agile Software Development", "Knowledge of agile practices for software engineering teams.", "K"),
		("opq32r", "Occupational Personality Questionnaire OPQ32r", "Personality questionnaire describing behavioral style at work, including leadership and teamwork.", "P"),
		("leadership-report", "Enterprise Leadership Report", "Leadership potential report built on personality and behavior at work.", "P"),
		("motivation", "Motivation Questionnaire MQM5", "Measures what motivates and energizes people at work.", "P"),
		("teamwork-sjt", "Teamwork Situational Judgement", "Situational judgement scenarios about collaboration and teamwork.", "B"),
		("communication", "Business Communication (adaptive)", "Measures written and verbal communication skills in business settings.", "KP"),
		("customer-service", "Customer Service Phone Simulation", "Simulated customer calls assessing empathy, communication and service skills.", "BS"),
		("manager-360", "Manager 360 Feedback", "Multi-rater feedback on management and leadership behaviors.", "D"),
		("competency-ucf", "Universal Competency Framework Report", "Competency-based report on interpersonal and leadership behaviors.", "C"),
		("sales-personality", "Sales Interview Guide", "Structured interview guide on persuasion, influence and relationship building.", "P"),
		("verify-numerical", "Verify - Numerical Ability", "Numerical reasoning test using tables and graphs.", "A"),
		("verify-verbal", "Verify - Verbal Ability", "Verbal reasoning test of reading comprehension and logic.", "A"),
		("verify-inductive", "Verify - Inductive Reasoning", "Abstract pattern reasoning for graduate roles.", "A"),
		("general-ability", "General Ability Screen", "Short cognitive screen covering numerical, verbal and inductive ability.", "A"),
		("in-tray", "Global In-Tray Exercise", "Assessment centre in-tray exercise for prioritisation and planning.", "E"),
		("bank-admin", "Bank Administrative Assistant", "Pre-packaged solution for bank administrative roles with ability and personality.", "ABP"),
		("entry-level-sales", "Entry Level Sales Solution", "Pre-packaged sales solution covering ability, behavior and sales knowledge.", "ABKP"),
	]
	.into_iter()
	.map(|(slug, name, description, codes)| catalog_item(slug, name, description, codes))
	.collect()
}

/// Builds a service over `items` with the given providers and installs the catalog.
pub async fn service_with(
	cfg: Config,
	providers: Providers,
	items: Vec<CatalogItem>,
) -> Result<AssayService> {
	let service = AssayService::with_providers(cfg, providers)?;

	service.install_catalog(items).await?;

	Ok(service)
}

/// Hashing embedder that counts calls.
pub struct SpyEmbedder {
	embedder: HashingEmbedder,
	calls: Arc<AtomicUsize>,
}
impl SpyEmbedder {
	pub fn new(dimensions: u32) -> Self {
		Self {
			embedder: HashingEmbedder::new(dimensions as usize),
			calls: Arc::new(AtomicUsize::new(0)),
		}
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}
impl EmbeddingProvider for SpyEmbedder {
	fn embed<'a>(
		&'a self,
		_cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		self.calls.fetch_add(1, Ordering::SeqCst);

		let vectors = self.embedder.embed_all(texts);

		Box::pin(async move { Ok(vectors) })
	}
}

pub struct FailingEmbedder;
impl EmbeddingProvider for FailingEmbedder {
	fn embed<'a>(
		&'a self,
		_cfg: &'a EmbeddingProviderConfig,
		_texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		Box::pin(async {
			Err(Error::Provider { message: "Embedding endpoint unreachable.".to_string() })
		})
	}
}

/// Answers every proposal with `pick(request)` and records the requests it saw.
pub struct FnRefiner<F> {
	pick: F,
	calls: Arc<AtomicUsize>,
}
impl<F> FnRefiner<F>
where
	F: Fn(&ProposalRequest) -> Result<Vec<u64>> + Send + Sync,
{
	pub fn new(pick: F) -> Self {
		Self { pick, calls: Arc::new(AtomicUsize::new(0)) }
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}
impl<F> RefineProvider for FnRefiner<F>
where
	F: Fn(&ProposalRequest) -> Result<Vec<u64>> + Send + Sync,
{
	fn propose<'a>(
		&'a self,
		_cfg: &'a RefinerProviderConfig,
		request: &'a ProposalRequest,
	) -> BoxFuture<'a, Result<Vec<u64>>> {
		self.calls.fetch_add(1, Ordering::SeqCst);

		let picked = (self.pick)(request);

		Box::pin(async move { picked })
	}
}

/// Always answers with the same ids.
pub fn scripted_refiner(
	ids: Vec<u64>,
) -> FnRefiner<impl Fn(&ProposalRequest) -> Result<Vec<u64>> + Send + Sync> {
	FnRefiner::new(move |_| Ok(ids.clone()))
}

/// Always fails as if the provider quota was exhausted.
pub fn failing_refiner()
-> FnRefiner<impl Fn(&ProposalRequest) -> Result<Vec<u64>> + Send + Sync> {
	FnRefiner::new(|_| Err(Error::Provider { message: "Quota exceeded.".to_string() }))
}

/// Sleeps for `delay` before answering with the first `max_results` ids in order.
pub struct SlowRefiner {
	pub delay: Duration,
}
impl RefineProvider for SlowRefiner {
	fn propose<'a>(
		&'a self,
		_cfg: &'a RefinerProviderConfig,
		request: &'a ProposalRequest,
	) -> BoxFuture<'a, Result<Vec<u64>>> {
		Box::pin(async move {
			tokio::time::sleep(self.delay).await;

			Ok((1..=request.constraints.max_results.min(request.candidates.len()) as u64).collect())
		})
	}
}

/// In-memory catalog source whose contents can be replaced between reloads.
pub struct StaticCatalog {
	items: Mutex<Vec<CatalogItem>>,
}
impl StaticCatalog {
	pub fn new(items: Vec<CatalogItem>) -> Self {
		Self { items: Mutex::new(items) }
	}

	pub fn replace(&self, items: Vec<CatalogItem>) {
		*self.items.lock().unwrap_or_else(|err| err.into_inner()) = items;
	}
}
impl CatalogSource for StaticCatalog {
	fn load_corpus(&self) -> BoxFuture<'_, Result<Vec<CatalogItem>>> {
		let items = self.items.lock().unwrap_or_else(|err| err.into_inner()).clone();

		Box::pin(async move { Ok(items) })
	}
}

/// Index whose backend is unreachable. Syncs succeed so a catalog can still be installed.
pub struct FailingIndex;
impl VectorIndex for FailingIndex {
	fn nearest<'a>(
		&'a self,
		_snapshot: &'a CatalogSnapshot,
		_vector: &'a [f32],
		_k: usize,
	) -> BoxFuture<'a, Result<Vec<Hit>>> {
		Box::pin(async {
			Err(Error::Provider { message: "Vector index connection refused.".to_string() })
		})
	}

	fn sync<'a>(&'a self, _snapshot: &'a CatalogSnapshot) -> BoxFuture<'a, Result<()>> {
		Box::pin(async { Ok(()) })
	}
}

/// Keeps index data per snapshot fingerprint like a remote index would. Queries only succeed for
/// snapshots that were synced and not yet pruned. Every sync and prune call is recorded.
#[derive(Default)]
pub struct VersionedIndex {
	live: Mutex<HashSet<String>>,
	events: Mutex<Vec<String>>,
}
impl VersionedIndex {
	pub fn events(&self) -> Vec<String> {
		self.events.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}

	pub fn is_live(&self, fingerprint: &str) -> bool {
		self.live.lock().unwrap_or_else(|err| err.into_inner()).contains(fingerprint)
	}

	fn record(&self, event: String) {
		self.events.lock().unwrap_or_else(|err| err.into_inner()).push(event);
	}
}
impl VectorIndex for VersionedIndex {
	fn nearest<'a>(
		&'a self,
		snapshot: &'a CatalogSnapshot,
		vector: &'a [f32],
		k: usize,
	) -> BoxFuture<'a, Result<Vec<Hit>>> {
		Box::pin(async move {
			if !self.is_live(snapshot.fingerprint()) {
				return Err(Error::Provider {
					message: format!("No index data for snapshot {}.", snapshot.fingerprint()),
				});
			}

			Ok(assay_catalog::memory::nearest(snapshot, vector, k)?)
		})
	}

	fn sync<'a>(&'a self, snapshot: &'a CatalogSnapshot) -> BoxFuture<'a, Result<()>> {
		let fingerprint = snapshot.fingerprint().to_string();

		self.live.lock().unwrap_or_else(|err| err.into_inner()).insert(fingerprint.clone());
		self.record(format!("sync {fingerprint}"));

		Box::pin(async { Ok(()) })
	}

	fn prune<'a>(
		&'a self,
		current: &'a CatalogSnapshot,
		previous: Option<&'a CatalogSnapshot>,
	) -> BoxFuture<'a, Result<()>> {
		let keep = [Some(current), previous]
			.into_iter()
			.flatten()
			.map(|snapshot| snapshot.fingerprint().to_string())
			.collect::<HashSet<_>>();

		self.live.lock().unwrap_or_else(|err| err.into_inner()).retain(|fp| keep.contains(fp));
		self.record(format!("prune {}", current.fingerprint()));

		Box::pin(async { Ok(()) })
	}
}
