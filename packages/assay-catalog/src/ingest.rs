use std::{
	collections::BTreeSet,
	fs,
	path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::{Error, Result};
use assay_domain::{catalog::CatalogItem, test_type::TestType};

/// Catalog file on disk: a JSON array or JSON Lines file of loosely shaped records.
#[derive(Clone, Debug)]
pub struct FileCatalog {
	path: PathBuf,
}
impl FileCatalog {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Reads every record in file order. Order is preserved because it breaks similarity ties.
	pub fn load_corpus(&self) -> Result<Vec<CatalogItem>> {
		let raw = fs::read_to_string(&self.path)
			.map_err(|err| Error::ReadCatalog { path: self.path.clone(), source: err })?;

		parse_corpus(&raw)
	}
}

pub fn parse_corpus(raw: &str) -> Result<Vec<CatalogItem>> {
	let records = if raw.trim_start().starts_with('[') {
		serde_json::from_str::<Vec<RawRecord>>(raw)
			.map_err(|err| Error::ParseRecord { line: err.line(), source: err })?
	} else {
		let mut records = Vec::new();

		for (idx, line) in raw.lines().enumerate() {
			if line.trim().is_empty() {
				continue;
			}

			let record = serde_json::from_str::<RawRecord>(line)
				.map_err(|err| Error::ParseRecord { line: idx + 1, source: err })?;

			records.push(record);
		}

		records
	};

	records.into_iter().map(RawRecord::into_item).collect()
}

#[derive(Debug, Deserialize)]
struct RawRecord {
	#[serde(alias = "url")]
	identifier: String,
	name: String,
	#[serde(default)]
	description: String,
	#[serde(default, alias = "duration_minutes")]
	duration: Option<RawDuration>,
	#[serde(default)]
	adaptive_support: Option<RawFlag>,
	#[serde(default)]
	remote_support: Option<RawFlag>,
	#[serde(alias = "test_types")]
	test_type: RawTestTypes,
	#[serde(default)]
	embedding: Vec<f32>,
}
impl RawRecord {
	fn into_item(self) -> Result<CatalogItem> {
		let identifier = self.identifier.trim().to_string();

		if identifier.is_empty() {
			return Err(Error::InvalidRecord {
				message: format!("Record {:?} has an empty identifier.", self.name),
			});
		}

		let duration_minutes = match self.duration {
			Some(duration) => duration.minutes(&identifier)?,
			None => None,
		};
		let adaptive_support = flag(self.adaptive_support, &identifier, "adaptive_support")?;
		let remote_support = flag(self.remote_support, &identifier, "remote_support")?;
		let test_types = self.test_type.parse(&identifier)?;

		Ok(CatalogItem {
			identifier,
			name: self.name.trim().to_string(),
			description: self.description.trim().to_string(),
			duration_minutes,
			adaptive_support,
			remote_support,
			test_types,
			embedding: self.embedding,
		})
	}
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawDuration {
	Minutes(u64),
	Text(String),
}
impl RawDuration {
	/// Text durations take the first number they contain; text without one is unknown.
	fn minutes(self, identifier: &str) -> Result<Option<u32>> {
		let minutes = match self {
			Self::Minutes(minutes) => minutes,
			Self::Text(text) => {
				let digits = text
					.chars()
					.skip_while(|ch| !ch.is_ascii_digit())
					.take_while(|ch| ch.is_ascii_digit())
					.collect::<String>();

				if digits.is_empty() {
					return Ok(None);
				}

				digits.parse::<u64>().map_err(|_| Error::InvalidRecord {
					message: format!("Record {identifier:?} has an unreadable duration {text:?}."),
				})?
			},
		};

		u32::try_from(minutes).map(Some).map_err(|_| Error::InvalidRecord {
			message: format!("Record {identifier:?} has an out-of-range duration."),
		})
	}
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawFlag {
	Bool(bool),
	Text(String),
}

fn flag(raw: Option<RawFlag>, identifier: &str, field: &str) -> Result<bool> {
	match raw {
		None => Ok(false),
		Some(RawFlag::Bool(value)) => Ok(value),
		Some(RawFlag::Text(text)) => match text.trim().to_lowercase().as_str() {
			"yes" | "y" | "true" | "1" => Ok(true),
			"no" | "n" | "false" | "0" | "" => Ok(false),
			_ => Err(Error::InvalidRecord {
				message: format!("Record {identifier:?} has an unreadable {field} {text:?}."),
			}),
		},
	}
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTestTypes {
	List(Vec<String>),
	Text(String),
}
impl RawTestTypes {
	/// Lists hold labels or codes. Text is `|`/`,` separated labels, one label, or a run of
	/// letter codes such as `ABKP`.
	fn parse(self, identifier: &str) -> Result<BTreeSet<TestType>> {
		let entries = match self {
			Self::List(entries) => entries,
			Self::Text(text) if text.contains(['|', ',']) =>
				text.split(['|', ',']).map(str::to_string).collect(),
			Self::Text(text) => vec![text],
		};
		let mut out = BTreeSet::new();

		for entry in entries.iter().map(|entry| entry.trim()).filter(|entry| !entry.is_empty()) {
			if let Some(test_type) = TestType::parse(entry) {
				out.insert(test_type);

				continue;
			}

			let codes = TestType::parse_codes(entry).map_err(|code| Error::InvalidRecord {
				message: format!("Record {identifier:?} has unknown test type {code:?} in {entry:?}."),
			})?;

			out.extend(codes);
		}

		Ok(out)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn duration_text_takes_the_first_number() {
		assert_eq!(RawDuration::Text("30 minutes".to_string()).minutes("x").ok(), Some(Some(30)));
		assert_eq!(
			RawDuration::Text("Approximate Completion Time in minutes = 45".to_string())
				.minutes("x")
				.ok(),
			Some(Some(45))
		);
		assert_eq!(RawDuration::Text("Not specified".to_string()).minutes("x").ok(), Some(None));
	}

	#[test]
	fn flags_accept_yes_no_text() {
		assert!(flag(Some(RawFlag::Text("Yes".to_string())), "x", "remote_support").is_ok_and(|v| v));
		assert!(flag(Some(RawFlag::Text(" no ".to_string())), "x", "remote_support").is_ok_and(|v| !v));
		assert!(flag(Some(RawFlag::Text("maybe".to_string())), "x", "remote_support").is_err());
		assert!(flag(None, "x", "remote_support").is_ok_and(|v| !v));
	}

	#[test]
	fn test_types_accept_labels_and_codes() {
		let piped = RawTestTypes::Text("Knowledge & Skills|Personality & Behavior".to_string())
			.parse("x")
			.expect("Failed to parse piped labels.");
		let codes = RawTestTypes::Text("ABKP".to_string()).parse("x").expect("Failed to parse codes.");
		let list = RawTestTypes::List(vec!["K".to_string(), "Simulations".to_string()])
			.parse("x")
			.expect("Failed to parse list.");

		assert_eq!(
			piped,
			BTreeSet::from([TestType::KnowledgeSkills, TestType::PersonalityBehavior])
		);
		assert_eq!(codes.len(), 4);
		assert_eq!(list, BTreeSet::from([TestType::KnowledgeSkills, TestType::Simulations]));
		assert!(RawTestTypes::Text("KQ".to_string()).parse("x").is_err());
	}
}
