//! Identifier-aware query rewriting.
//!
//! Queries that look like a claim/ticket/reference lookup are prefixed with
//! `"claim ID "` so the keyword half of hybrid search anchors on the
//! identifier field. Everything else passes through unchanged.

use crate::models::Query;

/// Keywords that mark a query as an identifier lookup (matched as
/// case-insensitive substrings).
pub const IDENTIFIER_KEYWORDS: [&str; 5] = ["claim", "id", "number", "reference", "ticket"];

/// Prefix prepended to identifier lookups.
pub const IDENTIFIER_PREFIX: &str = "claim ID ";

/// Returns true if `raw` mentions one of [`IDENTIFIER_KEYWORDS`].
///
/// A bare number such as `"1234"` carries no keyword and is searched as-is.
pub fn is_identifier_query(raw: &str) -> bool {
    let lowered = raw.to_lowercase();
    IDENTIFIER_KEYWORDS.iter().any(|k| lowered.contains(k))
}

/// Rewrite `raw` into a [`Query`]. Pure; never fails.
pub fn enhance(raw: &str) -> Query {
    if is_identifier_query(raw) {
        Query::rewritten(raw, format!("{}{}", IDENTIFIER_PREFIX, raw))
    } else {
        Query::plain(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_queries_are_prefixed() {
        for raw in [
            "what is a claim?",
            "CLAIM status",
            "my Ticket is open",
            "Reference R-77",
            "policy number 12",
            "the ID please",
        ] {
            let q = enhance(raw);
            assert_eq!(q.enhanced(), format!("claim ID {}", raw), "query: {raw}");
            assert_eq!(q.raw(), raw);
            assert!(q.is_identifier_lookup());
        }
    }

    #[test]
    fn test_plain_queries_pass_through() {
        for raw in ["how do I file an appeal?", "deductible amount", ""] {
            let q = enhance(raw);
            assert_eq!(q.enhanced(), raw);
            assert!(!q.is_identifier_lookup());
        }
    }

    #[test]
    fn test_bare_number_is_unchanged() {
        assert!(!IDENTIFIER_KEYWORDS.iter().any(|k| "1234".contains(k)));
        let q = enhance("1234");
        assert_eq!(q.enhanced(), "1234");
        assert_eq!(q.raw(), "1234");
        assert!(!q.is_identifier_lookup());
        assert!(!is_identifier_query(" 3456 "));
    }

    #[test]
    fn test_enhanced_contains_raw() {
        let q = enhance("Ticket #9");
        assert!(q.enhanced().contains(q.raw()));
        assert!(q.enhanced().starts_with(IDENTIFIER_PREFIX));
    }

    #[test]
    fn test_substring_match_is_loose() {
        // "id" inside another word still counts
        assert!(is_identifier_query("did it rain"));
    }
}
