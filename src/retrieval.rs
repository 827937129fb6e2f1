//! Two-stage retrieval against an external knowledge base.
//!
//! # Strategy
//!
//! 1. Search with the enhanced query text using [`SearchStrategy::Hybrid`].
//! 2. If and only if step 1 returned zero hits, search once more with the
//!    *raw* query text using [`SearchStrategy::Semantic`].
//!
//! Enhancement can over-narrow ambiguous queries; the fallback retries the
//! user's own words with similarity-only ranking. The two calls are strictly
//! sequential. Provider failures are not retried.
//!
//! The outbound seam is the [`KnowledgeBaseClient`] trait. The production
//! implementation lives in [`crate::bedrock`]; tests inject fakes.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::{RetrievalError, SearchClientError};
use crate::models::{Query, RetrievalHit, SearchStrategy};

/// Inputs for one search call against the knowledge base.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrieveRequest<'a> {
    pub knowledge_base_id: &'a str,
    pub text: &'a str,
    pub strategy: SearchStrategy,
    pub max_results: u32,
}

/// An already-authenticated client for the external search index.
///
/// Implementations return hits in provider relevance order (descending).
/// They are shared read-only across concurrent calls.
#[async_trait]
pub trait KnowledgeBaseClient: Send + Sync {
    async fn retrieve(
        &self,
        request: &RetrieveRequest<'_>,
    ) -> Result<Vec<RetrievalHit>, SearchClientError>;
}

/// Runs the hybrid-then-semantic retrieval sequence for one knowledge base.
pub struct Retriever {
    client: Arc<dyn KnowledgeBaseClient>,
    knowledge_base_id: String,
    max_results: u32,
}

impl Retriever {
    pub fn new(
        client: Arc<dyn KnowledgeBaseClient>,
        knowledge_base_id: impl Into<String>,
        max_results: u32,
    ) -> Self {
        Self {
            client,
            knowledge_base_id: knowledge_base_id.into(),
            max_results,
        }
    }

    pub fn knowledge_base_id(&self) -> &str {
        &self.knowledge_base_id
    }

    pub fn max_results(&self) -> u32 {
        self.max_results
    }

    /// Retrieve hits for `query`, falling back to semantic search on an
    /// empty hybrid result.
    ///
    /// # Errors
    ///
    /// [`RetrievalError::ExternalService`] if either call fails, or
    /// [`RetrievalError::Cancelled`] if `cancel` fires first. An in-flight
    /// call is dropped on cancellation.
    pub async fn retrieve(
        &self,
        query: &Query,
        cancel: &CancellationToken,
    ) -> Result<Vec<RetrievalHit>, RetrievalError> {
        info!(
            knowledge_base_id = %self.knowledge_base_id,
            query = %query.enhanced(),
            "Querying knowledge base"
        );

        let hits = self
            .search_once(query.enhanced(), SearchStrategy::Hybrid, cancel)
            .await?;
        if !hits.is_empty() {
            return Ok(hits);
        }

        info!(
            query = %query.raw(),
            "No hybrid results, retrying with semantic search on the original query"
        );
        self.search_once(query.raw(), SearchStrategy::Semantic, cancel)
            .await
    }

    async fn search_once(
        &self,
        text: &str,
        strategy: SearchStrategy,
        cancel: &CancellationToken,
    ) -> Result<Vec<RetrievalHit>, RetrievalError> {
        let request = RetrieveRequest {
            knowledge_base_id: &self.knowledge_base_id,
            text,
            strategy,
            max_results: self.max_results,
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetrievalError::Cancelled),
            outcome = self.client.retrieve(&request) => outcome,
        };

        match outcome {
            Ok(hits) => {
                debug!(%strategy, hits = hits.len(), "Search completed");
                for (rank, hit) in hits.iter().enumerate() {
                    debug!(
                        rank = rank + 1,
                        score = hit.relevance(),
                        source = hit.source_display(),
                        "Retrieved passage"
                    );
                }
                Ok(hits)
            }
            Err(cause) => {
                error!(%strategy, error = %cause, "Knowledge base search failed");
                Err(RetrievalError::ExternalService { strategy, cause })
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted fake client shared by retrieval and bridge tests.

    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use super::{KnowledgeBaseClient, RetrieveRequest};
    use crate::error::SearchClientError;
    use crate::models::{RetrievalHit, SearchStrategy};

    /// One scripted reaction to a `retrieve` call.
    pub enum Reply {
        Hits(Vec<RetrievalHit>),
        Fail(SearchClientError),
        /// Never completes; flags `dropped` once the call is abandoned.
        Hang,
        Panic,
    }

    /// Records every call and replays scripted replies in order.
    /// Once the script runs out, answers with zero hits.
    pub struct FakeClient {
        replies: Mutex<VecDeque<Reply>>,
        calls: Mutex<Vec<(String, SearchStrategy, u32)>>,
        pub dropped: Arc<AtomicBool>,
    }

    impl FakeClient {
        pub fn new(replies: Vec<Reply>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(Vec::new()),
                dropped: Arc::new(AtomicBool::new(false)),
            })
        }

        pub fn calls(&self) -> Vec<(String, SearchStrategy, u32)> {
            self.calls.lock().unwrap().clone()
        }
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl KnowledgeBaseClient for FakeClient {
        async fn retrieve(
            &self,
            request: &RetrieveRequest<'_>,
        ) -> Result<Vec<RetrievalHit>, SearchClientError> {
            self.calls.lock().unwrap().push((
                request.text.to_string(),
                request.strategy,
                request.max_results,
            ));
            let reply = self.replies.lock().unwrap().pop_front();
            match reply {
                Some(Reply::Hits(hits)) => Ok(hits),
                Some(Reply::Fail(e)) => Err(e),
                Some(Reply::Hang) => {
                    let _flag = DropFlag(self.dropped.clone());
                    std::future::pending::<()>().await;
                    Ok(Vec::new())
                }
                Some(Reply::Panic) => panic!("fake client exploded"),
                None => Ok(Vec::new()),
            }
        }
    }

    pub fn hits(n: usize) -> Vec<RetrievalHit> {
        (0..n)
            .map(|i| RetrievalHit::new(format!("passage {}", i + 1), 0.9 - i as f64 * 0.1))
            .collect()
    }
}
