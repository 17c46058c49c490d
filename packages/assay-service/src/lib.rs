pub mod catalog;
pub mod recommend;
pub mod refine;
pub mod retrieve;
pub mod stats;

mod error;

pub use catalog::ReloadReport;
pub use error::{Error, Result};
pub use recommend::{
	RecommendRequest, RecommendResponse, RecommendedItem, RefinementReport, Shortfall,
};
pub use refine::{
	DegradeReason, ProposalCandidate, ProposalConstraints, ProposalRequest, RefinementOutcome,
	RefinementSource,
};
pub use retrieve::{Candidate, CandidateSet};
pub use stats::{RefinementStats, StatsSnapshot};

use std::{future::Future, pin::Pin, sync::Arc};

use tokio::sync::Mutex;

use assay_catalog::{CatalogSnapshot, CatalogStore, FileCatalog, Hit, qdrant::QdrantIndex};
use assay_config::{Config, EmbeddingProviderConfig, RefinerProviderConfig};
use assay_domain::{balance::BalancePolicy, catalog::CatalogItem, classify::KeywordClassifier};
use assay_providers::{embedding, hashing::HashingEmbedder, refiner};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>>;
}

/// Generative refinement. Returns the chosen 1-based candidate ids in output order.
pub trait RefineProvider
where
	Self: Send + Sync,
{
	fn propose<'a>(
		&'a self,
		cfg: &'a RefinerProviderConfig,
		request: &'a ProposalRequest,
	) -> BoxFuture<'a, Result<Vec<u64>>>;
}

pub trait VectorIndex
where
	Self: Send + Sync,
{
	fn nearest<'a>(
		&'a self,
		snapshot: &'a CatalogSnapshot,
		vector: &'a [f32],
		k: usize,
	) -> BoxFuture<'a, Result<Vec<Hit>>>;

	/// Called with a freshly built snapshot before it is installed. Must not disturb queries
	/// against snapshots that are already installed.
	fn sync<'a>(&'a self, snapshot: &'a CatalogSnapshot) -> BoxFuture<'a, Result<()>>;

	/// Called after `current` replaced `previous`. Index data for any older snapshot may go.
	fn prune<'a>(
		&'a self,
		_current: &'a CatalogSnapshot,
		_previous: Option<&'a CatalogSnapshot>,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async { Ok(()) })
	}
}

pub trait CatalogSource
where
	Self: Send + Sync,
{
	fn load_corpus(&self) -> BoxFuture<'_, Result<Vec<CatalogItem>>>;
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub refiner: Arc<dyn RefineProvider>,
}
impl Providers {
	pub fn new(embedding: Arc<dyn EmbeddingProvider>, refiner: Arc<dyn RefineProvider>) -> Self {
		Self { embedding, refiner }
	}
}
impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(DefaultProviders);

		Self { embedding: provider.clone(), refiner: provider }
	}
}

/// Exhaustive in-process index over the current snapshot.
pub struct MemoryIndex;
impl VectorIndex for MemoryIndex {
	fn nearest<'a>(
		&'a self,
		snapshot: &'a CatalogSnapshot,
		vector: &'a [f32],
		k: usize,
	) -> BoxFuture<'a, Result<Vec<Hit>>> {
		Box::pin(async move { Ok(assay_catalog::memory::nearest(snapshot, vector, k)?) })
	}

	fn sync<'a>(&'a self, _snapshot: &'a CatalogSnapshot) -> BoxFuture<'a, Result<()>> {
		Box::pin(async { Ok(()) })
	}
}

impl VectorIndex for QdrantIndex {
	fn nearest<'a>(
		&'a self,
		snapshot: &'a CatalogSnapshot,
		vector: &'a [f32],
		k: usize,
	) -> BoxFuture<'a, Result<Vec<Hit>>> {
		Box::pin(async move { Ok(QdrantIndex::nearest(self, snapshot, vector, k).await?) })
	}

	fn sync<'a>(&'a self, snapshot: &'a CatalogSnapshot) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move { Ok(QdrantIndex::sync(self, snapshot).await?) })
	}

	fn prune<'a>(
		&'a self,
		current: &'a CatalogSnapshot,
		previous: Option<&'a CatalogSnapshot>,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let keep = [Some(current), previous]
				.into_iter()
				.flatten()
				.map(CatalogSnapshot::fingerprint)
				.collect::<Vec<_>>();

			QdrantIndex::prune(self, &keep).await?;

			Ok(())
		})
	}
}

impl CatalogSource for FileCatalog {
	fn load_corpus(&self) -> BoxFuture<'_, Result<Vec<CatalogItem>>> {
		Box::pin(async move { Ok(FileCatalog::load_corpus(self)?) })
	}
}

pub struct AssayService {
	pub cfg: Config,
	pub catalog: CatalogStore,
	pub index: Arc<dyn VectorIndex>,
	pub source: Option<Arc<dyn CatalogSource>>,
	pub providers: Providers,
	reload_lock: Mutex<()>,
	classifier: KeywordClassifier,
	policy: BalancePolicy,
	stats: RefinementStats,
}
impl AssayService {
	pub fn new(cfg: Config) -> Result<Self> {
		Self::with_providers(cfg, Providers::default())
	}

	/// Builds the service with the index and catalog source named in `cfg`. No catalog is
	/// loaded until [`AssayService::reload_catalog`] or [`AssayService::install_catalog`] runs.
	pub fn with_providers(cfg: Config, providers: Providers) -> Result<Self> {
		let classifier = KeywordClassifier::from_config(&cfg.classifier)
			.map_err(|err| Error::Config { message: err.to_string() })?;
		let policy = BalancePolicy::from_config(&cfg.recommend)
			.map_err(|err| Error::Config { message: err.to_string() })?;
		let index: Arc<dyn VectorIndex> = match (cfg.index.backend.as_str(), &cfg.index.qdrant) {
			("qdrant", Some(qdrant)) => Arc::new(QdrantIndex::new(qdrant)?),
			("memory", _) => Arc::new(MemoryIndex),
			(backend, _) =>
				return Err(Error::Config {
					message: format!("Index backend {backend:?} is not usable."),
				}),
		};
		let source = cfg
			.catalog
			.path
			.as_ref()
			.map(|path| Arc::new(FileCatalog::new(path)) as Arc<dyn CatalogSource>);

		Ok(Self {
			cfg,
			catalog: CatalogStore::default(),
			index,
			source,
			providers,
			reload_lock: Mutex::new(()),
			classifier,
			policy,
			stats: RefinementStats::default(),
		})
	}

	pub fn with_index(mut self, index: Arc<dyn VectorIndex>) -> Self {
		self.index = index;

		self
	}

	pub fn with_source(mut self, source: Arc<dyn CatalogSource>) -> Self {
		self.source = Some(source);

		self
	}

	pub fn classifier(&self) -> &KeywordClassifier {
		&self.classifier
	}

	pub fn policy(&self) -> &BalancePolicy {
		&self.policy
	}

	pub fn stats(&self) -> StatsSnapshot {
		self.stats.snapshot()
	}
}

struct DefaultProviders;
impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		Box::pin(async move {
			if cfg.is_local() {
				return Ok(HashingEmbedder::new(cfg.dimensions as usize).embed_all(texts));
			}

			Ok(embedding::embed(cfg, texts).await?)
		})
	}
}
impl RefineProvider for DefaultProviders {
	fn propose<'a>(
		&'a self,
		cfg: &'a RefinerProviderConfig,
		request: &'a ProposalRequest,
	) -> BoxFuture<'a, Result<Vec<u64>>> {
		Box::pin(async move {
			let messages = refine::proposal_messages(request);
			let content = refiner::complete(cfg, &messages).await?;

			refine::parse_proposal_ids(&content)
		})
	}
}
