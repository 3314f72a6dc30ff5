//! The search backend contract every ontology source implements.

use std::sync::Arc;

use async_trait::async_trait;
use ontolink_core::{OntologyBinding, SearchCandidate};
use thiserror::Error;

/// A search backend could not answer. "No match" is never an error; it is an
/// empty candidate list.
#[derive(Error, Debug)]
pub enum SearchError {
    #[cfg(feature = "http")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("search backend unavailable: {0}")]
    Unavailable(String),
}

impl SearchError {
    /// HTTP 429 from the backend.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::Server { status: 429, .. })
    }
}

/// Lexical search over one ontology.
///
/// Implementations must be idempotent: the same `(ontology, term)` against an
/// unchanged backend yields the same candidates in the same order.
#[async_trait]
pub trait OntologySearch: Send + Sync {
    async fn search(
        &self,
        ontology: &OntologyBinding,
        term: &str,
    ) -> Result<Vec<SearchCandidate>, SearchError>;
}

#[async_trait]
impl<T: OntologySearch + ?Sized> OntologySearch for Arc<T> {
    async fn search(
        &self,
        ontology: &OntologyBinding,
        term: &str,
    ) -> Result<Vec<SearchCandidate>, SearchError> {
        (**self).search(ontology, term).await
    }
}
