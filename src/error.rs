//! Error taxonomy.
//!
//! Three layers, from the wire outward:
//!
//! | Type | Raised by | Meaning |
//! |------|-----------|---------|
//! | [`SearchClientError`] | [`KnowledgeBaseClient`](crate::retrieval::KnowledgeBaseClient) | provider-native failure |
//! | [`RetrievalError`] | [`Retriever`](crate::retrieval::Retriever) | external service failure or cancellation |
//! | [`BridgeError`] | [`KnowledgeBaseBridge`](crate::bridge::KnowledgeBaseBridge) | anything that stops a tool call |
//!
//! None of these cross the bridge boundary. The bridge logs the cause and
//! answers with [`BridgeError::user_message`], which never embeds the
//! underlying error text.

use thiserror::Error;

use crate::models::SearchStrategy;

/// Failures of a single request to the external search index.
#[derive(Debug, Error)]
pub enum SearchClientError {
    /// Transport failure (connect, timeout, TLS, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with a non-success status.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// HTTP 429.
    #[error("Request throttled: {0}")]
    Throttled(String),

    /// HTTP 401/403, or credentials could not be used.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The response body was not the expected JSON.
    #[error("Malformed response: {0}")]
    Decode(String),
}

/// Failures of the two-stage retrieval.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// A search call failed; the provider error is kept as the source.
    #[error("external search service error during {strategy} search: {cause}")]
    ExternalService {
        strategy: SearchStrategy,
        #[source]
        cause: SearchClientError,
    },

    /// The caller cancelled before retrieval completed.
    #[error("retrieval cancelled")]
    Cancelled,
}

/// Everything that can stop a tool call from producing a formatted answer.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("No query provided")]
    MissingQuery,

    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error("unexpected error: {0}")]
    Unexpected(String),
}

/// Guidance returned when no query was supplied.
pub const MISSING_QUERY_GUIDANCE: &str =
    "Please provide a question or claim ID to search the knowledge base.";

impl BridgeError {
    /// Fixed label placed in the `error` field of a failed result.
    pub fn label(&self) -> &'static str {
        match self {
            BridgeError::MissingQuery => "No query provided",
            BridgeError::Retrieval(RetrievalError::ExternalService { .. }) => {
                "Knowledge base search failed"
            }
            BridgeError::Retrieval(RetrievalError::Cancelled) => "Request cancelled",
            BridgeError::Unexpected(_) => "Unexpected error",
        }
    }

    /// User-facing text for this failure.
    pub fn user_message(&self, query: &str) -> String {
        match self {
            BridgeError::MissingQuery => MISSING_QUERY_GUIDANCE.to_string(),
            BridgeError::Retrieval(RetrievalError::ExternalService { .. }) => format!(
                "I encountered an error while searching for '{}'. Please try again or contact support if the issue persists.",
                query
            ),
            BridgeError::Retrieval(RetrievalError::Cancelled) | BridgeError::Unexpected(_) => {
                "I'm sorry, something went wrong while processing your request.".to_string()
            }
        }
    }
}
