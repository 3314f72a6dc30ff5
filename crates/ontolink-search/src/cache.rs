//! In-process memoisation of search results.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use ontolink_core::{OntologyBinding, SearchCandidate};
use tokio::sync::Mutex;
use tracing::debug;

use crate::backend::{OntologySearch, SearchError};

/// Wraps a backend and remembers successful answers keyed by
/// `(ontology prefix, term)`. Errors pass through uncached.
pub struct CachedSearch<S> {
    inner: S,
    entries: Mutex<HashMap<(String, String), Vec<SearchCandidate>>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

/// Cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub entries: usize,
}

impl<S: OntologySearch> CachedSearch<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            entries: Mutex::new(HashMap::new()),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.lock().await.len(),
        }
    }
}

#[async_trait]
impl<S: OntologySearch> OntologySearch for CachedSearch<S> {
    async fn search(
        &self,
        ontology: &OntologyBinding,
        term: &str,
    ) -> Result<Vec<SearchCandidate>, SearchError> {
        let key = (ontology.prefix().to_string(), term.to_string());
        if let Some(hit) = self.entries.lock().await.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(ontology = ontology.ols_id(), term, "search cache hit");
            return Ok(hit.clone());
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        // Lock released across the backend call; concurrent misses on the
        // same key both query and the last writer wins with an equal value.
        let candidates = self.inner.search(ontology, term).await?;
        self.entries.lock().await.insert(key, candidates.clone());
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    struct Counting {
        calls: AtomicUsize,
        fail: AtomicBool,
    }

    impl Counting {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl OntologySearch for Counting {
        async fn search(
            &self,
            _ontology: &OntologyBinding,
            term: &str,
        ) -> Result<Vec<SearchCandidate>, SearchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(SearchError::Unavailable("down".into()));
            }
            Ok(vec![SearchCandidate::new("CL:0000160", term)])
        }
    }

    #[tokio::test]
    async fn repeated_queries_hit_cache() {
        let cache = CachedSearch::new(Counting::new());
        let cl = OntologyBinding::cell_ontology();

        let first = cache.search(&cl, "goblet cell").await.unwrap();
        let second = cache.search(&cl, "goblet cell").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.inner().calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            cache.stats().await,
            CacheStats {
                hits: 1,
                misses: 1,
                entries: 1
            }
        );
    }

    #[tokio::test]
    async fn keyed_by_ontology() {
        let cache = CachedSearch::new(Counting::new());
        cache.search(&OntologyBinding::cell_ontology(), "colon").await.unwrap();
        cache.search(&OntologyBinding::uberon(), "colon").await.unwrap();
        assert_eq!(cache.inner().calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn errors_not_cached() {
        let cache = CachedSearch::new(Counting::new());
        let cl = OntologyBinding::cell_ontology();

        cache.inner().fail.store(true, Ordering::SeqCst);
        assert!(cache.search(&cl, "goblet cell").await.is_err());

        cache.inner().fail.store(false, Ordering::SeqCst);
        let hits = cache.search(&cl, "goblet cell").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(cache.inner().calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.stats().await.entries, 1);
    }
}
