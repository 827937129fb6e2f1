//! Function-call bridge between a conversational engine and the retriever.
//!
//! The bridge is the only seam the engine sees. It takes a
//! [`ToolCallRequest`], drives enhance → retrieve → format, and always
//! answers with a [`ToolCallResult`]; no error escapes.
//!
//! # Per-call flow
//!
//! ```text
//! Start ──(no query)──────────────────────────────▶ Failure{MissingQuery}
//!   │
//!   ▼
//! Enhancing → Retrieving ──(ExternalService)──────▶ Failure{query, apology}
//!                 │      ──(cancelled / panic)────▶ Failure{query, generic}
//!                 ▼
//!             Formatting ─────────────────────────▶ Success{query, response}
//! ```
//!
//! "No results" is reported as a success whose response text says so.
//! The outcome is logged so operators can still tell the cases apart.
//!
//! # Cancellation
//!
//! The pipeline runs on its own task under a child of the caller's
//! [`CancellationToken`]. Dropping the bridge future (the host tore the call
//! down) cancels that child token, which drops any in-flight search request.

use std::sync::Arc;

use chrono::Local;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::enhance::enhance;
use crate::error::{BridgeError, RetrievalError};
use crate::format::format_response;
use crate::models::{FormattedResponse, ToolCallRequest, ToolCallResult};
use crate::retrieval::Retriever;

/// Exposes a [`Retriever`] as a single callable tool.
///
/// Holds no per-call state; concurrent calls run as independent retrieval
/// sequences sharing only the read-only retriever.
#[derive(Clone)]
pub struct KnowledgeBaseBridge {
    retriever: Arc<Retriever>,
}

impl KnowledgeBaseBridge {
    pub fn new(retriever: Arc<Retriever>) -> Self {
        Self { retriever }
    }

    pub fn knowledge_base_id(&self) -> &str {
        self.retriever.knowledge_base_id()
    }

    /// Handle one tool invocation.
    pub async fn handle(&self, request: ToolCallRequest) -> ToolCallResult {
        self.handle_cancellable(request, CancellationToken::new())
            .await
    }

    /// Handle one tool invocation, aborting retrieval when `cancel` fires.
    pub async fn handle_cancellable(
        &self,
        request: ToolCallRequest,
        cancel: CancellationToken,
    ) -> ToolCallResult {
        let query = match request.query_text() {
            Some(q) => q.to_string(),
            None => {
                warn!("search_knowledge_base called without a query");
                return ToolCallResult::Failure {
                    error: BridgeError::MissingQuery.label().to_string(),
                    response: BridgeError::MissingQuery.user_message(""),
                    query: None,
                    timestamp: None,
                    knowledge_base_id: None,
                };
            }
        };

        let span = info_span!(
            "search_knowledge_base",
            call_id = %Uuid::new_v4(),
            query = %query
        );

        async {
            info!(knowledge_base_id = %self.knowledge_base_id(), "Searching knowledge base");
            match self.run_pipeline(&query, cancel).await {
                Ok(formatted) => ToolCallResult::Success {
                    query: query.clone(),
                    response: formatted.text,
                    timestamp: now_timestamp(),
                    knowledge_base_id: self.knowledge_base_id().to_string(),
                },
                Err(e) => {
                    error!(error = %e, kind = e.label(), "Knowledge base search failed");
                    info!(outcome = "failed", "Tool call finished");
                    ToolCallResult::Failure {
                        error: e.label().to_string(),
                        response: e.user_message(&query),
                        query: Some(query.clone()),
                        timestamp: Some(now_timestamp()),
                        knowledge_base_id: Some(self.knowledge_base_id().to_string()),
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Enhance, retrieve and format on a dedicated task.
    ///
    /// A panic anywhere in the pipeline surfaces as a join error and is
    /// reported as [`BridgeError::Unexpected`].
    async fn run_pipeline(
        &self,
        raw: &str,
        cancel: CancellationToken,
    ) -> Result<FormattedResponse, BridgeError> {
        let call_token = cancel.child_token();
        let guard = call_token.clone().drop_guard();

        let retriever = self.retriever.clone();
        let raw = raw.to_string();
        let task = tokio::spawn(
            async move {
                let query = enhance(&raw);
                let hits = retriever.retrieve(&query, &call_token).await?;
                let outcome = if hits.is_empty() { "not_found" } else { "found" };
                info!(outcome, hits = hits.len(), "Tool call finished");
                Ok::<_, RetrievalError>(format_response(&query, &hits))
            }
            .in_current_span(),
        );

        let joined = task.await;
        guard.disarm();

        match joined {
            Ok(result) => result.map_err(BridgeError::from),
            Err(join_err) => Err(BridgeError::Unexpected(join_err.to_string())),
        }
    }
}

fn now_timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SearchClientError;
    use crate::models::{RetrievalHit, SearchStrategy};
    use crate::retrieval::testing::{hits, FakeClient, Reply};
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn bridge(client: Arc<FakeClient>) -> KnowledgeBaseBridge {
        KnowledgeBaseBridge::new(Arc::new(Retriever::new(client, "STFZ4NQBSR", 10)))
    }

    #[tokio::test]
    async fn test_missing_query_issues_no_calls() {
        let client = FakeClient::new(vec![Reply::Hits(hits(1))]);
        let b = bridge(client.clone());

        let result = b
            .handle(ToolCallRequest::from_arguments(&serde_json::json!({})))
            .await;

        assert_eq!(result.error(), Some("No query provided"));
        assert!(result.response().contains("Please provide a question"));
        assert!(client.calls().is_empty());

        let result = b.handle(ToolCallRequest::new("")).await;
        assert_eq!(result.error(), Some("No query provided"));
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_whitespace_query_is_searched() {
        let client = FakeClient::new(vec![Reply::Hits(hits(1))]);
        let b = bridge(client.clone());

        let result = b.handle(ToolCallRequest::new("   ")).await;

        assert!(result.is_success());
        assert_eq!(
            client.calls(),
            vec![("   ".to_string(), SearchStrategy::Hybrid, 10)]
        );
    }

    #[tokio::test]
    async fn test_identifier_lookup_end_to_end() {
        let long = "claim 1234 approved ".repeat(40);
        let client = FakeClient::new(vec![Reply::Hits(vec![
            RetrievalHit::new(long.clone(), 0.93),
            RetrievalHit::new(long.clone(), 0.81),
            RetrievalHit::new("short note", 0.4),
        ])]);
        let b = bridge(client.clone());

        let result = b.handle(ToolCallRequest::new("claim 1234")).await;

        match &result {
            ToolCallResult::Success {
                query,
                response,
                knowledge_base_id,
                timestamp,
            } => {
                assert_eq!(query, "claim 1234");
                assert_eq!(knowledge_base_id, "STFZ4NQBSR");
                assert_eq!(timestamp.len(), "2024-01-01 00:00:00".len());
                assert!(response.contains("Found 3 result(s)"));
                let entries: Vec<&str> = response
                    .lines()
                    .filter(|l| l.starts_with(|c: char| c.is_ascii_digit()))
                    .collect();
                assert_eq!(entries.len(), 3);
                // "N. " prefix + 400 chars + "..."
                assert_eq!(entries[0].chars().count(), 3 + 400 + 3);
                assert_eq!(entries[2], "3. short note");
            }
            other => panic!("expected success, got {other:?}"),
        }
        assert_eq!(
            client.calls(),
            vec![("claim ID claim 1234".to_string(), SearchStrategy::Hybrid, 10)]
        );
    }

    #[tokio::test]
    async fn test_bare_number_searched_unchanged() {
        let long = "claim 1234 approved ".repeat(40);
        let client = FakeClient::new(vec![Reply::Hits(vec![RetrievalHit::new(long, 0.93)])]);
        let b = bridge(client.clone());

        let result = b.handle(ToolCallRequest::new("1234")).await;

        assert!(result.is_success());
        let entry = result
            .response()
            .lines()
            .find(|l| l.starts_with("1. "))
            .unwrap();
        // No keyword, so the default excerpt length applies.
        assert_eq!(entry.chars().count(), 3 + 200 + 3);
        assert_eq!(
            client.calls(),
            vec![("1234".to_string(), SearchStrategy::Hybrid, 10)]
        );
    }

    #[tokio::test]
    async fn test_fallback_then_not_found() {
        let client = FakeClient::new(vec![Reply::Hits(vec![]), Reply::Hits(vec![])]);
        let b = bridge(client.clone());

        let result = b.handle(ToolCallRequest::new("what is a claim?")).await;

        assert!(result.is_success());
        assert!(result.response().contains("couldn't find any information"));
        assert!(result.response().contains("'what is a claim?'"));
        let calls = client.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].0, "what is a claim?");
        assert_eq!(calls[1].1, SearchStrategy::Semantic);
    }

    #[tokio::test]
    async fn test_transport_error_does_not_leak() {
        let client = FakeClient::new(vec![Reply::Fail(SearchClientError::Api {
            status: 503,
            message: "ServiceUnavailableException: internal shard 7 offline".into(),
        })]);
        let b = bridge(client.clone());

        let result = b.handle(ToolCallRequest::new("1234")).await;

        match &result {
            ToolCallResult::Failure {
                error,
                response,
                query,
                knowledge_base_id,
                timestamp,
            } => {
                assert_eq!(error, "Knowledge base search failed");
                assert!(response.contains("'1234'"));
                assert!(!response.contains("shard"));
                assert!(!response.contains("ServiceUnavailable"));
                assert_eq!(query.as_deref(), Some("1234"));
                assert_eq!(knowledge_base_id.as_deref(), Some("STFZ4NQBSR"));
                assert!(timestamp.is_some());
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(client.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_panic_becomes_unexpected_failure() {
        let client = FakeClient::new(vec![Reply::Panic]);
        let b = bridge(client);

        let result = b.handle(ToolCallRequest::new("policy")).await;

        assert_eq!(result.error(), Some("Unexpected error"));
        assert!(!result.response().contains("exploded"));
    }

    #[tokio::test]
    async fn test_cancel_token_yields_failure() {
        let client = FakeClient::new(vec![Reply::Hang]);
        let b = bridge(client.clone());
        let token = CancellationToken::new();

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let result = b
            .handle_cancellable(ToolCallRequest::new("1234"), token)
            .await;
        assert_eq!(result.error(), Some("Request cancelled"));
        assert!(client.dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_dropping_call_cancels_search() {
        let client = FakeClient::new(vec![Reply::Hang]);
        let b = bridge(client.clone());
        let token = CancellationToken::new();

        let timed_out = tokio::time::timeout(
            Duration::from_millis(50),
            b.handle_cancellable(ToolCallRequest::new("1234"), token.clone()),
        )
        .await;
        assert!(timed_out.is_err());

        for _ in 0..50 {
            if client.dropped.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(client.dropped.load(Ordering::SeqCst));
        // Only the per-call child token is cancelled.
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn test_concurrent_calls_are_independent() {
        let client = FakeClient::new(vec![Reply::Hits(hits(1)), Reply::Hits(hits(2))]);
        let b = bridge(client.clone());

        let (a, c) = tokio::join!(
            b.handle(ToolCallRequest::new("ticket 1")),
            b.handle(ToolCallRequest::new("ticket 2"))
        );

        assert!(a.is_success());
        assert!(c.is_success());
        assert_eq!(client.calls().len(), 2);
    }
}
