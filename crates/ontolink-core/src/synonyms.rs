//! Synonym groups used to reformulate ontology queries.
//!
//! Each group is a set of interchangeable phrases ("colon", "large
//! intestine"). A phrase may appear in several groups. Matching is by whole
//! lowercase token runs, so "colon" never matches inside "colonic".

use std::collections::HashSet;
use std::path::Path;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SynonymError {
    #[error("read synonym file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("parse synonym file {path}: {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },
}

/// Groups shipped with the crate: anatomical adjectives, cell-type synonyms.
const BUILTIN: &[&[&str]] = &[
    &["colon", "large intestine"],
    &["colonic", "colon"],
    &["intestinal", "intestine"],
    &["intestine", "gut", "bowel"],
    &["small intestine", "small bowel"],
    &["gastric", "stomach"],
    &["hepatic", "liver"],
    &["renal", "kidney"],
    &["cardiac", "heart"],
    &["pulmonary", "lung"],
    &["cerebral", "brain"],
    &["cutaneous", "skin"],
    &["mucus-producing", "mucous", "goblet"],
    &["neuron", "nerve cell", "neurone"],
    &["neuronal", "neural"],
    &["red blood cell", "erythrocyte"],
    &["white blood cell", "leukocyte"],
    &["platelet", "thrombocyte"],
    &["t cell", "t lymphocyte"],
    &["b cell", "b lymphocyte"],
    &["nk cell", "natural killer cell"],
    &["epithelial cell", "epitheliocyte"],
    &["muscle cell", "myocyte"],
    &["fat cell", "adipocyte"],
    &["liver cell", "hepatocyte"],
    &["bone cell", "osteocyte"],
    &["stem cell", "progenitor cell"],
];

/// Interchangeable phrase groups, stored lowercase and tokenised.
#[derive(Debug, Clone, Default)]
pub struct SynonymTable {
    groups: Vec<Vec<Vec<String>>>,
}

/// Summary statistics for a SynonymTable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynonymSummary {
    pub groups: usize,
    pub phrases: usize,
    pub distinct_phrases: usize,
}

/// A phrase from `group` found at `start..start + len` in a token list.
#[derive(Debug, Clone, Copy)]
struct Match {
    group: usize,
    member: usize,
    start: usize,
    len: usize,
}

impl SynonymTable {
    /// Build from raw groups. Phrases are trimmed and lowercased; empty phrases
    /// and groups with fewer than two distinct phrases are dropped.
    pub fn from_groups(groups: Vec<Vec<String>>) -> Self {
        let mut out = Vec::with_capacity(groups.len());
        for group in groups {
            let mut seen = HashSet::new();
            let phrases: Vec<Vec<String>> = group
                .iter()
                .map(|p| tokens(p))
                .filter(|t| !t.is_empty() && seen.insert(t.clone()))
                .collect();
            if phrases.len() >= 2 {
                out.push(phrases);
            }
        }
        Self { groups: out }
    }

    /// The built-in anatomy and cell-type groups.
    pub fn builtin() -> Self {
        Self::from_groups(
            BUILTIN
                .iter()
                .map(|g| g.iter().map(|s| s.to_string()).collect())
                .collect(),
        )
    }

    /// Load groups from a JSON file shaped `[["colon", "large intestine"], ...]`.
    pub fn load(path: &Path) -> Result<Self, SynonymError> {
        let raw = std::fs::read_to_string(path).map_err(|source| SynonymError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let groups: Vec<Vec<String>> =
            serde_json::from_str(&raw).map_err(|source| SynonymError::Json {
                path: path.display().to_string(),
                source,
            })?;
        Ok(Self::from_groups(groups))
    }

    /// Append another table's groups after this one's.
    pub fn extend(&mut self, other: SynonymTable) {
        self.groups.extend(other.groups);
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn summary(&self) -> SynonymSummary {
        let distinct: HashSet<&Vec<String>> = self.groups.iter().flatten().collect();
        SynonymSummary {
            groups: self.groups.len(),
            phrases: self.groups.iter().map(Vec::len).sum(),
            distinct_phrases: distinct.len(),
        }
    }

    /// Variants of `term` with synonyms substituted.
    ///
    /// First every single substitution, in order of position in the term and
    /// then group order; then, when two or more non-overlapping phrases
    /// matched, one variant substituting all of them at once. Words outside a
    /// matched phrase keep their original spelling. `term` itself is never
    /// returned.
    pub fn variants(&self, term: &str) -> Vec<String> {
        let original: Vec<&str> = term.split_whitespace().collect();
        let lower: Vec<String> = original.iter().map(|w| w.to_lowercase()).collect();

        let mut matches = self.find_matches(&lower);
        matches.sort_by_key(|m| (m.start, m.group));

        let mut out = Vec::new();
        let mut seen = HashSet::new();
        seen.insert(lower.join(" "));

        let mut push = |candidate: String, out: &mut Vec<String>| {
            if seen.insert(candidate.to_lowercase()) {
                out.push(candidate);
            }
        };

        for m in &matches {
            for (alt_idx, alt) in self.groups[m.group].iter().enumerate() {
                if alt_idx == m.member {
                    continue;
                }
                push(substitute(&original, &[(*m, alt)]), &mut out);
            }
        }

        let combined = non_overlapping(&matches);
        if combined.len() >= 2 {
            let replacements: Vec<(Match, &Vec<String>)> = combined
                .iter()
                .map(|m| {
                    let alt_idx = if m.member == 0 { 1 } else { 0 };
                    (*m, &self.groups[m.group][alt_idx])
                })
                .collect();
            push(substitute(&original, &replacements), &mut out);
        }

        out
    }

    fn find_matches(&self, lower: &[String]) -> Vec<Match> {
        let mut matches = Vec::new();
        for (group, phrases) in self.groups.iter().enumerate() {
            for (member, phrase) in phrases.iter().enumerate() {
                let len = phrase.len();
                if len == 0 || len > lower.len() {
                    continue;
                }
                for start in 0..=lower.len() - len {
                    if lower[start..start + len] == phrase[..] {
                        matches.push(Match {
                            group,
                            member,
                            start,
                            len,
                        });
                    }
                }
            }
        }
        matches
    }
}

// ── Helpers ──

fn tokens(phrase: &str) -> Vec<String> {
    phrase.split_whitespace().map(|w| w.to_lowercase()).collect()
}

/// Longest-first, then leftmost, greedy selection of disjoint matches,
/// returned in position order.
fn non_overlapping(matches: &[Match]) -> Vec<Match> {
    let mut by_len: Vec<Match> = matches.to_vec();
    by_len.sort_by_key(|m| (std::cmp::Reverse(m.len), m.start));

    let mut taken: Vec<Match> = Vec::new();
    for m in by_len {
        let overlaps = taken
            .iter()
            .any(|t| m.start < t.start + t.len && t.start < m.start + m.len);
        if !overlaps {
            taken.push(m);
        }
    }
    taken.sort_by_key(|m| m.start);
    taken
}

/// Rebuild `original` with each matched span replaced by its alternative.
/// `replacements` must be disjoint.
fn substitute(original: &[&str], replacements: &[(Match, &Vec<String>)]) -> String {
    let mut out: Vec<String> = Vec::with_capacity(original.len());
    let mut i = 0;
    while i < original.len() {
        if let Some((m, alt)) = replacements.iter().find(|(m, _)| m.start == i) {
            out.extend(alt.iter().cloned());
            i += m.len;
        } else {
            out.push(original[i].to_string());
            i += 1;
        }
    }
    out.join(" ")
}
