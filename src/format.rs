//! Rendering of ranked hits into a single response string.
//!
//! ```text
//! Found 3 result(s) for your query:
//!
//! 1. <excerpt>
//!    (Relevance: 0.87)
//!
//! 2. <excerpt>
//!    (Relevance: 0.54)
//! ```
//!
//! At most [`MAX_DISPLAYED_HITS`] hits are shown, in provider order.
//! Identifier lookups get longer excerpts since the matching passage is
//! usually a full claim record.

use crate::enhance::is_identifier_query;
use crate::models::{FormattedResponse, Query, RetrievalHit};

pub const MAX_DISPLAYED_HITS: usize = 5;
pub const IDENTIFIER_EXCERPT_CHARS: usize = 400;
pub const DEFAULT_EXCERPT_CHARS: usize = 200;
const ELLIPSIS: &str = "...";

/// Message used when both searches came back empty.
pub fn not_found_message(raw_query: &str) -> String {
    format!(
        "I couldn't find any information about '{}' in the knowledge base. \
         Please check if the claim ID exists or try rephrasing your question.",
        raw_query
    )
}

/// Excerpt length for `raw_query`.
pub fn excerpt_len(raw_query: &str) -> usize {
    if is_identifier_query(raw_query) {
        IDENTIFIER_EXCERPT_CHARS
    } else {
        DEFAULT_EXCERPT_CHARS
    }
}

/// Render `hits` for `query`. Deterministic; no side effects.
///
/// Hits with empty content are skipped but keep their rank number. The
/// count line reports every hit the provider returned.
pub fn format_response(query: &Query, hits: &[RetrievalHit]) -> FormattedResponse {
    if hits.is_empty() {
        return FormattedResponse {
            text: not_found_message(query.raw()),
        };
    }

    let limit = excerpt_len(query.raw());
    let mut text = format!("Found {} result(s) for your query:\n\n", hits.len());

    for (i, hit) in hits.iter().take(MAX_DISPLAYED_HITS).enumerate() {
        if hit.content.is_empty() {
            continue;
        }
        text.push_str(&format!("{}. {}\n", i + 1, truncate(&hit.content, limit)));
        text.push_str(&format!("   (Relevance: {:.2})\n\n", hit.relevance()));
    }

    FormattedResponse {
        text: text.trim_end().to_string(),
    }
}

/// Cut `content` to `max_chars` characters, appending an ellipsis only if
/// something was removed.
fn truncate(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}{}", &content[..byte_idx], ELLIPSIS),
        None => content.to_string(),
    }
}
