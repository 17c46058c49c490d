use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::test_type::{TagGroup, TestType};

/// A recommendable catalog entry. Immutable once ingested.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
	pub identifier: String,
	pub name: String,
	pub description: String,
	pub duration_minutes: Option<u32>,
	pub adaptive_support: bool,
	pub remote_support: bool,
	pub test_types: BTreeSet<TestType>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub embedding: Vec<f32>,
}
impl CatalogItem {
	pub fn in_group(&self, group: TagGroup) -> bool {
		self.test_types.iter().any(|test_type| test_type.group() == Some(group))
	}

	pub fn is_technical(&self) -> bool {
		self.in_group(TagGroup::Technical)
	}

	pub fn is_soft_skill(&self) -> bool {
		self.in_group(TagGroup::SoftSkill)
	}

	/// Text handed to the embedder at ingestion time.
	pub fn document_text(&self) -> String {
		let test_types =
			self.test_types.iter().map(|test_type| test_type.label()).collect::<Vec<_>>().join(", ");
		let duration = self
			.duration_minutes
			.map(|minutes| format!("{minutes} minutes"))
			.unwrap_or_else(|| "Not specified".to_string());

		format!(
			"Assessment: {name}\nDescription: {description}\nTest Types: {test_types}\nDuration: {duration}\nAdaptive Support: {adaptive}\nRemote Support: {remote}",
			name = self.name.trim(),
			description = self.description.trim(),
			adaptive = yes_no(self.adaptive_support),
			remote = yes_no(self.remote_support),
		)
	}
}

fn yes_no(value: bool) -> &'static str {
	if value { "Yes" } else { "No" }
}
