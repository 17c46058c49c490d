use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::{Error, Result};

const ATTEMPTS: usize = 2;

/// Sends a chat completion and returns the message content parsed as JSON.
///
/// Transport and HTTP status errors fail immediately; unparsable content is retried once.
pub async fn complete(
	cfg: &assay_config::RefinerProviderConfig,
	messages: &[Value],
) -> Result<Value> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let mut last_err = None;

	for _ in 0..ATTEMPTS {
		let body = serde_json::json!({
			"model": cfg.model,
			"temperature": cfg.temperature,
			"messages": messages,
		});
		let res = client
			.post(&url)
			.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
			.json(&body)
			.send()
			.await?;
		let json: Value = res.error_for_status()?.json().await?;

		match parse_completion_json(json) {
			Ok(parsed) => return Ok(parsed),
			Err(err) => last_err = Some(err),
		}
	}

	Err(last_err.unwrap_or_else(|| Error::InvalidResponse {
		message: "Refiner response is not valid JSON.".to_string(),
	}))
}

fn parse_completion_json(json: Value) -> Result<Value> {
	let Some(content) = json
		.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|msg| msg.get("content"))
		.and_then(|c| c.as_str())
	else {
		return Err(Error::InvalidResponse {
			message: "Refiner response is missing message content.".to_string(),
		});
	};
	let content = strip_code_fence(content);
	let parsed = match serde_json::from_str::<Value>(content) {
		Ok(parsed) => parsed,
		Err(_) => embedded_array(content).ok_or_else(|| Error::InvalidResponse {
			message: "Refiner content is not valid JSON.".to_string(),
		})?,
	};

	if !parsed.is_object() && !parsed.is_array() {
		return Err(Error::InvalidResponse {
			message: "Refiner content must be a JSON object or array.".to_string(),
		});
	}

	Ok(parsed)
}

fn strip_code_fence(content: &str) -> &str {
	let trimmed = content.trim();
	let Some(rest) = trimmed.strip_prefix("```") else {
		return trimmed;
	};
	let rest = rest.strip_prefix("json").unwrap_or(rest);

	rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Models sometimes wrap the answer in prose; take the outermost bracketed span.
fn embedded_array(content: &str) -> Option<Value> {
	let start = content.find('[')?;
	let end = content.rfind(']')?;

	if end <= start {
		return None;
	}

	serde_json::from_str(&content[start..=end]).ok()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn completion(content: &str) -> Value {
		serde_json::json!({
			"choices": [
				{ "message": { "content": content } }
			]
		})
	}

	#[test]
	fn parses_choice_content_array() {
		let parsed = parse_completion_json(completion("[3, 1, 2]")).expect("parse failed");

		assert_eq!(parsed, serde_json::json!([3, 1, 2]));
	}

	#[test]
	fn strips_markdown_fences() {
		let parsed = parse_completion_json(completion("```json\n{\"ids\": [1]}\n```"))
			.expect("parse failed");

		assert_eq!(parsed["ids"], serde_json::json!([1]));
	}

	#[test]
	fn extracts_an_array_wrapped_in_prose() {
		let parsed =
			parse_completion_json(completion("My picks are [2, 1, 5] based on relevance."))
				.expect("parse failed");

		assert_eq!(parsed, serde_json::json!([2, 1, 5]));
	}

	#[test]
	fn rejects_prose_and_scalars() {
		assert!(parse_completion_json(completion("Here are my picks.")).is_err());
		assert!(parse_completion_json(completion("42")).is_err());
		assert!(parse_completion_json(serde_json::json!({ "ids": [1] })).is_err());
	}
}
