use std::{collections::BTreeSet, fmt};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Catalog test categories, keyed by the single-letter codes used in the published catalog.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TestType {
	AbilityAptitude,
	BiodataSituationalJudgement,
	Competencies,
	Development360,
	AssessmentExercises,
	KnowledgeSkills,
	PersonalityBehavior,
	Simulations,
}
impl TestType {
	pub const ALL: [Self; 8] = [
		Self::AbilityAptitude,
		Self::BiodataSituationalJudgement,
		Self::Competencies,
		Self::Development360,
		Self::AssessmentExercises,
		Self::KnowledgeSkills,
		Self::PersonalityBehavior,
		Self::Simulations,
	];

	pub fn code(self) -> char {
		match self {
			Self::AbilityAptitude => 'A',
			Self::BiodataSituationalJudgement => 'B',
			Self::Competencies => 'C',
			Self::Development360 => 'D',
			Self::AssessmentExercises => 'E',
			Self::KnowledgeSkills => 'K',
			Self::PersonalityBehavior => 'P',
			Self::Simulations => 'S',
		}
	}

	pub fn label(self) -> &'static str {
		match self {
			Self::AbilityAptitude => "Ability & Aptitude",
			Self::BiodataSituationalJudgement => "Biodata & Situational Judgement",
			Self::Competencies => "Competencies",
			Self::Development360 => "Development & 360",
			Self::AssessmentExercises => "Assessment Exercises",
			Self::KnowledgeSkills => "Knowledge & Skills",
			Self::PersonalityBehavior => "Personality & Behavior",
			Self::Simulations => "Simulations",
		}
	}

	pub fn from_code(code: char) -> Option<Self> {
		let upper = code.to_ascii_uppercase();

		Self::ALL.into_iter().find(|test_type| test_type.code() == upper)
	}

	/// Accepts a single-letter code, the display label, or a compact spelling such as
	/// `Knowledge&Skills` or `knowledge_skills`.
	pub fn parse(raw: &str) -> Option<Self> {
		let trimmed = raw.trim();
		let mut chars = trimmed.chars();

		if let (Some(code), None) = (chars.next(), chars.next()) {
			return Self::from_code(code);
		}

		let key = compact_key(trimmed);

		Self::ALL.into_iter().find(|test_type| {
			compact_key(test_type.label()) == key || legacy_alias(*test_type, &key)
		})
	}

	/// Expands a multi-letter catalog code (`ABKP`) into its categories. Codes are uppercase;
	/// the first lowercase or unknown character is returned as the error so callers can report
	/// the offending input.
	pub fn parse_codes(raw: &str) -> Result<BTreeSet<Self>, char> {
		let mut out = BTreeSet::new();

		for code in raw.chars().filter(|ch| ch.is_ascii_alphanumeric()) {
			if !code.is_ascii_uppercase() {
				return Err(code);
			}

			out.insert(Self::from_code(code).ok_or(code)?);
		}

		Ok(out)
	}

	pub fn group(self) -> Option<TagGroup> {
		match self {
			Self::KnowledgeSkills | Self::Simulations => Some(TagGroup::Technical),
			Self::PersonalityBehavior
			| Self::BiodataSituationalJudgement
			| Self::Competencies
			| Self::Development360 => Some(TagGroup::SoftSkill),
			Self::AbilityAptitude | Self::AssessmentExercises => None,
		}
	}
}
impl fmt::Display for TestType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.label())
	}
}
impl Serialize for TestType {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(self.label())
	}
}
impl<'de> Deserialize<'de> for TestType {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let raw = String::deserialize(deserializer)?;

		Self::parse(&raw)
			.ok_or_else(|| serde::de::Error::custom(format!("Unknown test type {raw:?}.")))
	}
}

/// The two category groups that query intent is balanced across.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagGroup {
	Technical,
	SoftSkill,
}

fn compact_key(raw: &str) -> String {
	raw.chars()
		.filter(|ch| ch.is_alphanumeric())
		.flat_map(char::to_lowercase)
		.collect::<String>()
		.replace("and", "")
}

fn legacy_alias(test_type: TestType, key: &str) -> bool {
	match test_type {
		TestType::PersonalityBehavior => matches!(key, "personalitybehaviour" | "personality"),
		TestType::KnowledgeSkills => matches!(key, "knowledge" | "skills"),
		TestType::AbilityAptitude => matches!(key, "ability" | "aptitude" | "cognitive"),
		TestType::BiodataSituationalJudgement =>
			matches!(key, "biodatasituationaljudgment" | "situationaljudgement"),
		_ => false,
	}
}
