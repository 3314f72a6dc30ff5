//! Ontology search backends: the `OntologySearch` contract, an OLS4 HTTP
//! client (feature `http`), an in-memory vocabulary and a result cache.

pub mod backend;
pub mod cache;
pub mod vocabulary;

#[cfg(feature = "http")]
pub mod ols;

pub use backend::{OntologySearch, SearchError};
pub use cache::{CacheStats, CachedSearch};
pub use vocabulary::{Vocabulary, VocabularyError, VocabularyTerm};

#[cfg(feature = "http")]
pub use ols::{DEFAULT_OLS_URL, OlsClient};
