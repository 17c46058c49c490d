mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Catalog, Classifier, Config, DEFAULT_SOFT_SKILL_KEYWORDS, DEFAULT_TECHNICAL_KEYWORDS,
	EmbeddingProviderConfig, Index, LOCAL_PROVIDER_ID, Providers, Qdrant, Recommend,
	RefinerProviderConfig, Retrieval, Service,
};

use std::{collections::HashSet, fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.http_bind must be non-empty.".to_string(),
		});
	}
	if cfg.service.admin_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.admin_bind must be non-empty.".to_string(),
		});
	}

	match cfg.index.backend.as_str() {
		"memory" => {},
		"qdrant" => {
			let Some(qdrant) = cfg.index.qdrant.as_ref() else {
				return Err(Error::Validation {
					message: "index.qdrant must be set when index.backend is qdrant.".to_string(),
				});
			};

			if qdrant.url.trim().is_empty() || qdrant.collection.trim().is_empty() {
				return Err(Error::Validation {
					message: "index.qdrant.url and index.qdrant.collection must be non-empty."
						.to_string(),
				});
			}
		},
		_ => {
			return Err(Error::Validation {
				message: "index.backend must be one of memory or qdrant.".to_string(),
			});
		},
	}

	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions != cfg.index.vector_dim {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must match index.vector_dim.".to_string(),
		});
	}
	if !cfg.providers.embedding.is_local() {
		if cfg.providers.embedding.api_key.trim().is_empty() {
			return Err(Error::Validation {
				message: "Provider embedding api_key must be non-empty.".to_string(),
			});
		}
		if cfg.providers.embedding.timeout_ms == 0 {
			return Err(Error::Validation {
				message: "providers.embedding.timeout_ms must be greater than zero.".to_string(),
			});
		}
	}

	let refiner = &cfg.providers.refiner;

	if refiner.enabled {
		if refiner.api_key.trim().is_empty() {
			return Err(Error::Validation {
				message: "Provider refiner api_key must be non-empty.".to_string(),
			});
		}
		if refiner.timeout_ms == 0 {
			return Err(Error::Validation {
				message: "providers.refiner.timeout_ms must be greater than zero.".to_string(),
			});
		}
		if !refiner.temperature.is_finite() || refiner.temperature < 0.0 {
			return Err(Error::Validation {
				message: "providers.refiner.temperature must be a finite number of zero or greater."
					.to_string(),
			});
		}
	}

	if cfg.retrieval.top_k == 0 {
		return Err(Error::Validation {
			message: "retrieval.top_k must be greater than zero.".to_string(),
		});
	}
	if cfg.recommend.min_results == 0 {
		return Err(Error::Validation {
			message: "recommend.min_results must be greater than zero.".to_string(),
		});
	}
	if cfg.recommend.max_results < cfg.recommend.min_results {
		return Err(Error::Validation {
			message: "recommend.max_results must be at least recommend.min_results.".to_string(),
		});
	}
	if cfg.recommend.max_results < cfg.recommend.min_results.div_ceil(2) * 2 {
		return Err(Error::Validation {
			message: format!(
				"recommend.max_results must be at least {} so a balanced list holds ceil(recommend.min_results / 2) items per group.",
				cfg.recommend.min_results.div_ceil(2) * 2
			),
		});
	}
	if cfg.retrieval.top_k < cfg.recommend.min_results {
		return Err(Error::Validation {
			message: "retrieval.top_k must be at least recommend.min_results.".to_string(),
		});
	}
	if cfg.recommend.generative_window < cfg.recommend.max_results {
		return Err(Error::Validation {
			message: "recommend.generative_window must be at least recommend.max_results."
				.to_string(),
		});
	}
	if !matches!(cfg.recommend.backfill.as_str(), "global_similarity" | "category_proportion") {
		return Err(Error::Validation {
			message: "recommend.backfill must be one of global_similarity or category_proportion."
				.to_string(),
		});
	}

	for (label, keywords) in [
		("classifier.technical_keywords", &cfg.classifier.technical_keywords),
		("classifier.soft_skill_keywords", &cfg.classifier.soft_skill_keywords),
	] {
		if keywords.is_empty() {
			return Err(Error::Validation { message: format!("{label} must be non-empty.") });
		}
		if keywords.iter().any(|keyword| keyword.trim_end_matches('*').is_empty()) {
			return Err(Error::Validation {
				message: format!("{label} must not contain a bare wildcard."),
			});
		}
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if cfg.catalog.path.as_deref().map(|path| path.trim().is_empty()).unwrap_or(false) {
		cfg.catalog.path = None;
	}

	cfg.index.backend = cfg.index.backend.trim().to_lowercase();
	cfg.recommend.backfill = cfg.recommend.backfill.trim().to_lowercase();

	normalize_keywords(&mut cfg.classifier.technical_keywords);
	normalize_keywords(&mut cfg.classifier.soft_skill_keywords);
}

fn normalize_keywords(keywords: &mut Vec<String>) {
	let mut seen = HashSet::new();
	let normalized = keywords
		.iter()
		.map(|keyword| keyword.trim().to_lowercase())
		.filter(|keyword| !keyword.is_empty())
		.filter(|keyword| seen.insert(keyword.clone()))
		.collect();

	*keywords = normalized;
}
