//! In-memory vocabulary backend for offline runs and fixtures.
//!
//! Matching is by whole lowercase token runs over each term's label and
//! synonyms. Results are ranked:
//!
//! 1. exact label/synonym match
//! 2. label/synonym found inside the query (longer names first)
//! 3. query found inside a label/synonym (shorter names first)
//!
//! Ties break on id, so identical queries always return identical lists.

use std::path::Path;

use async_trait::async_trait;
use ontolink_core::{OntologyBinding, SearchCandidate};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::backend::{OntologySearch, SearchError};

const DEFAULT_MAX_RESULTS: usize = 10;

#[derive(Error, Debug)]
pub enum VocabularyError {
    #[error("read vocabulary {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("parse vocabulary {path}: {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },
    #[error("vocabulary term {0:?} has an empty id or label")]
    EmptyTerm(String),
}

/// One vocabulary entry as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularyTerm {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub synonyms: Vec<String>,
}

struct IndexedTerm {
    term: VocabularyTerm,
    /// Tokenised label followed by tokenised synonyms.
    names: Vec<Vec<String>>,
}

/// A fixed list of ontology terms answering searches from memory.
pub struct Vocabulary {
    terms: Vec<IndexedTerm>,
    max_results: usize,
}

impl Vocabulary {
    pub fn from_terms(terms: Vec<VocabularyTerm>) -> Result<Self, VocabularyError> {
        let mut indexed = Vec::with_capacity(terms.len());
        for term in terms {
            if term.id.trim().is_empty() || term.label.trim().is_empty() {
                return Err(VocabularyError::EmptyTerm(term.id));
            }
            let names = std::iter::once(&term.label)
                .chain(term.synonyms.iter())
                .map(|n| tokens(n))
                .filter(|t| !t.is_empty())
                .collect();
            indexed.push(IndexedTerm { term, names });
        }
        Ok(Self {
            terms: indexed,
            max_results: DEFAULT_MAX_RESULTS,
        })
    }

    /// Terms from `(id, label)` pairs, no synonyms.
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Result<Self, VocabularyError> {
        Self::from_terms(
            pairs
                .iter()
                .map(|(id, label)| VocabularyTerm {
                    id: id.to_string(),
                    label: label.to_string(),
                    synonyms: Vec::new(),
                })
                .collect(),
        )
    }

    /// Load a JSON array of `{"id", "label", "synonyms"}` objects.
    pub fn load(path: &Path) -> Result<Self, VocabularyError> {
        let raw = std::fs::read_to_string(path).map_err(|source| VocabularyError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let terms: Vec<VocabularyTerm> =
            serde_json::from_str(&raw).map_err(|source| VocabularyError::Json {
                path: path.display().to_string(),
                source,
            })?;
        let vocab = Self::from_terms(terms)?;
        info!(path = %path.display(), terms = vocab.len(), "loaded vocabulary");
        Ok(vocab)
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results.max(1);
        self
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Ranked matches for `term` among entries owned by `ontology`.
    pub fn lookup(&self, ontology: &OntologyBinding, term: &str) -> Vec<SearchCandidate> {
        let query = tokens(term);
        if query.is_empty() {
            return Vec::new();
        }

        let mut ranked: Vec<((u8, usize), &VocabularyTerm)> = self
            .terms
            .iter()
            .filter(|t| ontology.owns(&t.term.id))
            .filter_map(|t| {
                t.names
                    .iter()
                    .filter_map(|name| rank(&query, name))
                    .min()
                    .map(|r| (r, &t.term))
            })
            .collect();

        ranked.sort_by(|(ra, ta), (rb, tb)| ra.cmp(rb).then_with(|| ta.id.cmp(&tb.id)));
        ranked
            .into_iter()
            .take(self.max_results)
            .map(|(_, t)| SearchCandidate::new(&t.id, &t.label))
            .collect()
    }
}

#[async_trait]
impl OntologySearch for Vocabulary {
    async fn search(
        &self,
        ontology: &OntologyBinding,
        term: &str,
    ) -> Result<Vec<SearchCandidate>, SearchError> {
        let hits = self.lookup(ontology, term);
        debug!(ontology = ontology.ols_id(), term, count = hits.len(), "vocabulary search");
        Ok(hits)
    }
}

// ── Matching helpers ──

fn tokens(s: &str) -> Vec<String> {
    s.split(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | '(' | ')' | '/'))
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

/// Lower is better; `None` means no match.
fn rank(query: &[String], name: &[String]) -> Option<(u8, usize)> {
    if query == name {
        Some((0, 0))
    } else if contains_run(query, name) {
        Some((1, usize::MAX - name.len()))
    } else if contains_run(name, query) {
        Some((2, name.len()))
    } else {
        None
    }
}

/// True when `needle` appears as a contiguous run inside `haystack`.
fn contains_run(haystack: &[String], needle: &[String]) -> bool {
    !needle.is_empty()
        && needle.len() <= haystack.len()
        && haystack.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn cells() -> Vocabulary {
        Vocabulary::from_terms(vec![
            VocabularyTerm {
                id: "CL:0000160".into(),
                label: "goblet cell".into(),
                synonyms: vec!["mucous cell".into()],
            },
            VocabularyTerm {
                id: "CL:1000320".into(),
                label: "large intestine goblet cell".into(),
                synonyms: vec![],
            },
            VocabularyTerm {
                id: "CL:0000000".into(),
                label: "cell".into(),
                synonyms: vec![],
            },
            VocabularyTerm {
                id: "UBERON:0001155".into(),
                label: "colon".into(),
                synonyms: vec![],
            },
        ])
        .unwrap()
    }

    fn ids(hits: &[SearchCandidate]) -> Vec<&str> {
        hits.iter().map(|c| c.id.as_str()).collect()
    }

    #[test]
    fn exact_match_first() {
        let hits = cells().lookup(&OntologyBinding::cell_ontology(), "Goblet Cell");
        assert_eq!(ids(&hits), vec!["CL:0000160", "CL:0000000", "CL:1000320"]);
    }

    #[test]
    fn longer_contained_names_first() {
        let hits = cells().lookup(&OntologyBinding::cell_ontology(), "colon goblet cell");
        assert_eq!(ids(&hits), vec!["CL:0000160", "CL:0000000"]);
    }

    #[test]
    fn plural_does_not_match_singular_label() {
        let hits = cells().lookup(&OntologyBinding::cell_ontology(), "Colon goblet cells");
        assert!(hits.is_empty());
    }

    #[test]
    fn synonyms_match() {
        let hits = cells().lookup(&OntologyBinding::cell_ontology(), "mucous cell");
        assert_eq!(hits[0], SearchCandidate::new("CL:0000160", "goblet cell"));
    }

    #[test]
    fn other_ontologies_ignored() {
        let hits = cells().lookup(&OntologyBinding::uberon(), "colon");
        assert_eq!(ids(&hits), vec!["UBERON:0001155"]);
        assert!(cells().lookup(&OntologyBinding::cell_ontology(), "colon").is_empty());
    }

    #[test]
    fn max_results_caps_hits() {
        let vocab = cells().with_max_results(1);
        let hits = vocab.lookup(&OntologyBinding::cell_ontology(), "goblet cell");
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn empty_terms_rejected() {
        assert!(matches!(
            Vocabulary::from_pairs(&[("CL:1", " ")]),
            Err(VocabularyError::EmptyTerm(_))
        ));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"id": "UBERON:0001876", "label": "amygdala"}},
                {{"id": "UBERON:0002728", "label": "entorhinal cortex", "synonyms": ["area entorhinalis"]}}]"#
        )
        .unwrap();

        let vocab = Vocabulary::load(file.path()).unwrap();
        assert_eq!(vocab.len(), 2);
        let hits = vocab.lookup(&OntologyBinding::uberon(), "area entorhinalis");
        assert_eq!(ids(&hits), vec!["UBERON:0002728"]);
    }

    #[tokio::test]
    async fn search_is_idempotent() {
        let vocab = cells();
        let cl = OntologyBinding::cell_ontology();
        let first = vocab.search(&cl, "goblet cell").await.unwrap();
        let second = vocab.search(&cl, "goblet cell").await.unwrap();
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }
}
