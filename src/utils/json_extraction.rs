//! JSON extraction for judge responses.
//!
//! Judges are asked for a bare JSON object but routinely wrap it in
//! markdown fences or surround it with commentary. Strategies, in order:
//! 1. Direct JSON (content starts with '{')
//! 2. JSON in a ```json fenced block
//! 3. JSON in a generic fenced block
//! 4. First balanced `{...}` anywhere in the content
//!
//! # Example
//!
//! ```
//! use promptsmith::utils::json_extraction::extract_json_object;
//!
//! let response = "Here is my verdict: {\"clarity\": 8} Hope it helps.";
//! assert_eq!(extract_json_object(response).as_deref(), Some("{\"clarity\": 8}"));
//! ```

use regex::Regex;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Why a response could not be turned into the expected JSON value.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum JsonExtractionError {
    #[error("No JSON object found in response. Content starts with: '{content_preview}'")]
    NotFound { content_preview: String },

    #[error("JSON object did not match the expected shape: {0}")]
    Invalid(String),
}

/// Finds the index of the '}' closing the object that starts at `s[0]`.
///
/// String literals and escape sequences are skipped so braces inside
/// quoted text do not count.
pub fn find_matching_brace(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }

    None
}

/// Returns the first balanced object starting at or after the first '{'.
fn balanced_object(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let end = find_matching_brace(&s[start..])?;
    Some(&s[start..=start + end])
}

fn from_fenced_block(content: &str, pattern: &str) -> Option<String> {
    let re = Regex::new(pattern).ok()?;
    let found = re
        .captures_iter(content)
        .filter_map(|caps| caps.get(1))
        .find_map(|m| balanced_object(m.as_str().trim()))
        .map(str::to_string);
    found
}

/// Extracts the first JSON object from an LLM response.
pub fn extract_json_object(content: &str) -> Option<String> {
    let trimmed = content.trim();

    if trimmed.starts_with('{') {
        if let Some(end) = find_matching_brace(trimmed) {
            return Some(trimmed[..=end].to_string());
        }
    }

    from_fenced_block(trimmed, r"```json\s*\n?([\s\S]*?)\n?```")
        .or_else(|| from_fenced_block(trimmed, r"```(?:\w+)?\s*\n?([\s\S]*?)\n?```"))
        .or_else(|| balanced_object(trimmed).map(str::to_string))
}

/// Extracts and deserializes a JSON object from an LLM response.
///
/// # Errors
///
/// `NotFound` when no object is present, `Invalid` when the object does
/// not deserialize into `T`.
pub fn parse_json_object<T: DeserializeOwned>(content: &str) -> Result<T, JsonExtractionError> {
    let json = extract_json_object(content).ok_or_else(|| {
        let preview: String = content.trim().chars().take(50).collect();
        JsonExtractionError::NotFound {
            content_preview: preview,
        }
    })?;

    serde_json::from_str(&json).map_err(|e| JsonExtractionError::Invalid(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Verdict {
        clarity: u8,
    }

    #[test]
    fn test_direct_json() {
        assert_eq!(
            extract_json_object("  {\"clarity\": 7}  ").as_deref(),
            Some("{\"clarity\": 7}")
        );
    }

    #[test]
    fn test_json_code_block() {
        let content = "Sure.\n```json\n{\"clarity\": 9}\n```\nDone.";
        assert_eq!(
            extract_json_object(content).as_deref(),
            Some("{\"clarity\": 9}")
        );
    }

    #[test]
    fn test_generic_code_block() {
        let content = "```\n{\"clarity\": 4}\n```";
        assert_eq!(
            extract_json_object(content).as_deref(),
            Some("{\"clarity\": 4}")
        );
    }

    #[test]
    fn test_embedded_object_with_braces_in_strings() {
        let content = r#"Verdict: {"reasoning": "uses {placeholders}", "clarity": 5} end"#;
        assert_eq!(
            extract_json_object(content).as_deref(),
            Some(r#"{"reasoning": "uses {placeholders}", "clarity": 5}"#)
        );
    }

    #[test]
    fn test_fenced_block_with_surrounding_prose() {
        let content = "Here you go:\n```json\nnote {\"clarity\": 3} trailing\n```";
        assert_eq!(
            from_fenced_block(content, r"```json\s*\n?([\s\S]*?)\n?```").as_deref(),
            Some("{\"clarity\": 3}")
        );
        assert_eq!(from_fenced_block("no fences", r"```([\s\S]*?)```"), None);
    }

    #[test]
    fn test_no_json() {
        assert_eq!(extract_json_object("not json"), None);
        assert_eq!(extract_json_object("{ unterminated"), None);
        assert_eq!(find_matching_brace("}{"), None);
    }

    #[test]
    fn test_parse_json_object() {
        let verdict: Verdict = parse_json_object("```json\n{\"clarity\": 8}\n```").expect("valid");
        assert_eq!(verdict, Verdict { clarity: 8 });

        let err = parse_json_object::<Verdict>("not json").expect_err("no object");
        assert!(matches!(err, JsonExtractionError::NotFound { .. }));

        let err = parse_json_object::<Verdict>("{\"other\": 1}").expect_err("wrong shape");
        assert!(matches!(err, JsonExtractionError::Invalid(_)));
    }
}
