//! Core data models used throughout the knowledge bridge.
//!
//! These types represent the queries, search hits, and tool-call payloads
//! that flow through the retrieval pipeline:
//!
//! ```text
//! ToolCallRequest → Query → Vec<RetrievalHit> → FormattedResponse → ToolCallResult
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A search query as typed by the user, plus its enhanced form.
///
/// `enhanced` is only set for identifier lookups (see [`crate::enhance`]),
/// and then always contains `raw` with the canonical prefix prepended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    raw: String,
    enhanced: Option<String>,
}

impl Query {
    /// A query that was not rewritten.
    pub fn plain(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            enhanced: None,
        }
    }

    /// A query rewritten for identifier lookup.
    pub(crate) fn rewritten(raw: impl Into<String>, enhanced: String) -> Self {
        Self {
            raw: raw.into(),
            enhanced: Some(enhanced),
        }
    }

    /// The original, user-supplied text.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The text sent to the primary (hybrid) search.
    ///
    /// Falls back to [`raw`](Query::raw) when no rewrite was applied.
    pub fn enhanced(&self) -> &str {
        self.enhanced.as_deref().unwrap_or(&self.raw)
    }

    /// Whether the query was recognised as an identifier lookup.
    pub fn is_identifier_lookup(&self) -> bool {
        self.enhanced.is_some()
    }
}

/// Search mode requested from the knowledge base.
///
/// `Hybrid` is always attempted before `Semantic` for the same request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SearchStrategy {
    /// Keyword + semantic similarity ranking.
    Hybrid,
    /// Embedding similarity only.
    Semantic,
}

impl SearchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchStrategy::Hybrid => "HYBRID",
            SearchStrategy::Semantic => "SEMANTIC",
        }
    }
}

impl fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single passage returned by the knowledge base.
///
/// The score is the provider's own ranking signal and is treated as an
/// opaque ordering key, not validated against `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RetrievalHit {
    pub content: String,
    pub score: Option<f64>,
    pub source_uri: Option<String>,
}

impl RetrievalHit {
    pub fn new(content: impl Into<String>, score: f64) -> Self {
        Self {
            content: content.into(),
            score: Some(score),
            source_uri: None,
        }
    }

    pub fn with_source(mut self, uri: impl Into<String>) -> Self {
        self.source_uri = Some(uri.into());
        self
    }

    /// Relevance score, `0.0` when the provider omitted it.
    pub fn relevance(&self) -> f64 {
        self.score.unwrap_or(0.0)
    }

    pub fn source_display(&self) -> &str {
        self.source_uri.as_deref().unwrap_or("Unknown source")
    }
}

/// Final human-readable text handed back to the conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedResponse {
    pub text: String,
}

/// Arguments of a `search_knowledge_base` invocation.
///
/// `query` is the only recognised argument; everything else is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCallRequest {
    pub query: Option<String>,
}

impl ToolCallRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
        }
    }

    /// Build a request from a loosely typed argument map.
    ///
    /// Agents sometimes send claim numbers as JSON numbers, so numeric
    /// values are accepted and stringified. Any other type counts as absent.
    pub fn from_arguments(arguments: &Value) -> Self {
        let query = match arguments.get("query") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        Self { query }
    }

    /// The query text, or `None` if absent or empty. Whitespace is passed
    /// through to the search untouched.
    pub fn query_text(&self) -> Option<&str> {
        self.query.as_deref().filter(|q| !q.is_empty())
    }
}

/// The answer to a tool invocation. Always produced, even on failure.
///
/// Serialized untagged so each variant matches the callback payload shape
/// the conversational engine expects.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ToolCallResult {
    Success {
        query: String,
        response: String,
        timestamp: String,
        knowledge_base_id: String,
    },
    Failure {
        error: String,
        response: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        query: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        knowledge_base_id: Option<String>,
    },
}

impl ToolCallResult {
    /// The user-facing text, regardless of outcome.
    pub fn response(&self) -> &str {
        match self {
            ToolCallResult::Success { response, .. } | ToolCallResult::Failure { response, .. } => {
                response
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ToolCallResult::Success { .. })
    }

    /// The failure label, if any.
    pub fn error(&self) -> Option<&str> {
        match self {
            ToolCallResult::Failure { error, .. } => Some(error),
            ToolCallResult::Success { .. } => None,
        }
    }
}
