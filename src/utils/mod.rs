//! Shared utility functions for promptsmith.

pub mod json_extraction;

pub use json_extraction::{
    extract_json_object, find_matching_brace, parse_json_object, JsonExtractionError,
};

/// Truncates `text` to at most `max_chars` characters, appending "..." when cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}
