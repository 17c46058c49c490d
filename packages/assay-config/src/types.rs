use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	#[serde(default)]
	pub catalog: Catalog,
	pub index: Index,
	pub providers: Providers,
	#[serde(default)]
	pub retrieval: Retrieval,
	#[serde(default)]
	pub recommend: Recommend,
	#[serde(default)]
	pub classifier: Classifier,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub admin_bind: String,
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Catalog {
	/// JSON array or JSONL file. `None` means the catalog is pushed in by the host.
	pub path: Option<String>,
	pub reload_on_start: bool,
}
impl Default for Catalog {
	fn default() -> Self {
		Self { path: None, reload_on_start: true }
	}
}

#[derive(Debug, Deserialize)]
pub struct Index {
	pub backend: String,
	pub vector_dim: u32,
	pub qdrant: Option<Qdrant>,
}

#[derive(Debug, Deserialize)]
pub struct Qdrant {
	pub url: String,
	pub collection: String,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub refiner: RefinerProviderConfig,
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	/// `local` selects the in-process hashing embedder; anything else is an OpenAI-compatible API.
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	pub default_headers: Map<String, Value>,
}
impl EmbeddingProviderConfig {
	pub fn is_local(&self) -> bool {
		self.provider_id == LOCAL_PROVIDER_ID
	}
}

#[derive(Debug, Deserialize)]
pub struct RefinerProviderConfig {
	pub enabled: bool,
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	pub timeout_ms: u64,
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Retrieval {
	pub top_k: u32,
}
impl Default for Retrieval {
	fn default() -> Self {
		Self { top_k: 25 }
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Recommend {
	pub min_results: u32,
	pub max_results: u32,
	pub backfill: String,
	/// Number of balance-filtered candidates offered to the generative refiner.
	pub generative_window: u32,
}
impl Default for Recommend {
	fn default() -> Self {
		Self {
			min_results: 5,
			max_results: 10,
			backfill: "global_similarity".to_string(),
			generative_window: 20,
		}
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Classifier {
	/// A trailing `*` turns a keyword into a stem that matches any word it starts.
	pub technical_keywords: Vec<String>,
	pub soft_skill_keywords: Vec<String>,
}
impl Default for Classifier {
	fn default() -> Self {
		Self {
			technical_keywords: to_strings(DEFAULT_TECHNICAL_KEYWORDS),
			soft_skill_keywords: to_strings(DEFAULT_SOFT_SKILL_KEYWORDS),
		}
	}
}

pub const LOCAL_PROVIDER_ID: &str = "local";

pub const DEFAULT_TECHNICAL_KEYWORDS: &[&str] = &[
	"java",
	"python",
	"sql",
	"javascript",
	"typescript",
	"c++",
	"c#",
	".net",
	"golang",
	"rust",
	"ruby",
	"php",
	"kotlin",
	"swift",
	"scala",
	"html",
	"css",
	"react",
	"angular",
	"node.js",
	"programm*",
	"developer*",
	"software",
	"engineer*",
	"coding",
	"coder*",
	"technical",
	"technolog*",
	"data",
	"database*",
	"analytics",
	"machine learning",
	"devops",
	"cloud",
	"aws",
	"azure",
	"linux",
	"selenium",
	"automation",
	"algorithm*",
	"backend",
	"frontend",
	"full stack",
	"full-stack",
	"api",
	"apis",
	"spreadsheet*",
	"statistic*",
];

pub const DEFAULT_SOFT_SKILL_KEYWORDS: &[&str] = &[
	"leader*",
	"communicat*",
	"teamwork",
	"team",
	"teams",
	"collaborat*",
	"interpersonal",
	"soft skill*",
	"personality",
	"behavio*",
	"emotional intelligence",
	"empathy",
	"motivat*",
	"negotiat*",
	"customer service",
	"management",
	"manager*",
	"stakeholder*",
	"presentation*",
	"attitude",
	"integrity",
	"culture fit",
	"cultural fit",
	"adaptab*",
	"resilien*",
	"coach*",
	"mentor*",
	"influenc*",
	"persuas*",
	"conflict resolution",
	"relationship*",
];

fn to_strings(values: &[&str]) -> Vec<String> {
	values.iter().map(|value| value.to_string()).collect()
}
