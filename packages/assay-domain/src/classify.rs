use regex::Regex;
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
	#[error("Keyword list for {axis} is empty.")]
	EmptyKeywords { axis: &'static str },
	#[error("Keyword pattern for {axis} failed to compile.")]
	Pattern {
		axis: &'static str,
		#[source]
		source: regex::Error,
	},
}

/// Intent signals derived from the raw query text. Never persisted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
	pub wants_technical: bool,
	pub wants_soft_skill: bool,
	pub technical_terms: Vec<String>,
	pub soft_skill_terms: Vec<String>,
}
impl Classification {
	pub fn is_neutral(&self) -> bool {
		!self.wants_technical && !self.wants_soft_skill
	}

	pub fn intent_summary(&self) -> Option<String> {
		let mut parts = Vec::new();

		if self.wants_technical {
			parts.push(format!("technical ({})", self.technical_terms.join(", ")));
		}
		if self.wants_soft_skill {
			parts.push(format!("soft skill ({})", self.soft_skill_terms.join(", ")));
		}
		if parts.is_empty() {
			return None;
		}

		Some(parts.join(" + "))
	}
}

/// Lexical keyword classifier. One compiled pattern per axis.
#[derive(Clone, Debug)]
pub struct KeywordClassifier {
	technical: Regex,
	soft_skill: Regex,
}
impl KeywordClassifier {
	pub fn new<S>(technical: &[S], soft_skill: &[S]) -> Result<Self, ClassifierError>
	where
		S: AsRef<str>,
	{
		Ok(Self {
			technical: compile_axis("technical", technical)?,
			soft_skill: compile_axis("soft_skill", soft_skill)?,
		})
	}

	pub fn from_config(cfg: &assay_config::Classifier) -> Result<Self, ClassifierError> {
		Self::new(cfg.technical_keywords.as_slice(), cfg.soft_skill_keywords.as_slice())
	}

	pub fn classify(&self, query: &str) -> Classification {
		let normalized = normalize_query(query);

		if normalized.is_empty() {
			return Classification::default();
		}

		let technical_terms = matched_terms(&self.technical, &normalized);
		let soft_skill_terms = matched_terms(&self.soft_skill, &normalized);

		Classification {
			wants_technical: !technical_terms.is_empty(),
			wants_soft_skill: !soft_skill_terms.is_empty(),
			technical_terms,
			soft_skill_terms,
		}
	}
}

/// NFKC, lowercase, whitespace collapsed.
pub fn normalize_query(query: &str) -> String {
	let folded: String = query.nfkc().flat_map(char::to_lowercase).collect();

	folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn compile_axis<S>(axis: &'static str, keywords: &[S]) -> Result<Regex, ClassifierError>
where
	S: AsRef<str>,
{
	let mut alternatives = keywords
		.iter()
		.map(|keyword| keyword.as_ref().trim().to_lowercase())
		.filter(|keyword| !keyword.trim_end_matches('*').is_empty())
		.collect::<Vec<_>>();

	if alternatives.is_empty() {
		return Err(ClassifierError::EmptyKeywords { axis });
	}

	// Longest first so `javascript` wins over `java` at the same position.
	alternatives.sort_by(|lhs, rhs| rhs.len().cmp(&lhs.len()).then_with(|| lhs.cmp(rhs)));
	alternatives.dedup();

	let pattern = alternatives.iter().map(|keyword| keyword_pattern(keyword)).collect::<Vec<_>>();
	let pattern = format!("(?:{})", pattern.join("|"));

	Regex::new(&pattern).map_err(|source| ClassifierError::Pattern { axis, source })
}

fn keyword_pattern(keyword: &str) -> String {
	let (body, stem) = match keyword.strip_suffix('*') {
		Some(body) => (body, true),
		None => (keyword, false),
	};
	let escaped = body.split_whitespace().map(regex::escape).collect::<Vec<_>>().join(r"\s+");
	let starts_word = body.chars().next().map(is_word_char).unwrap_or(false);
	let ends_word = body.chars().last().map(is_word_char).unwrap_or(false);
	let lead = if starts_word { r"\b" } else { "" };
	let tail = match (stem, ends_word) {
		(true, _) => r"\w*",
		(false, true) => r"\b",
		(false, false) => "",
	};

	format!("{lead}{escaped}{tail}")
}

fn is_word_char(ch: char) -> bool {
	ch.is_alphanumeric() || ch == '_'
}

fn matched_terms(pattern: &Regex, text: &str) -> Vec<String> {
	let mut out: Vec<String> = Vec::new();

	for found in pattern.find_iter(text) {
		let term = found.as_str().split_whitespace().collect::<Vec<_>>().join(" ");

		if !out.contains(&term) {
			out.push(term);
		}
	}

	out
}
