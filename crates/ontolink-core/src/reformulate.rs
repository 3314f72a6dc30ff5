//! Query reformulation for spans whose verbatim search found nothing usable.
//!
//! A span is retried in a fixed order:
//!
//! 1. `Primary`: the span exactly as written
//! 2. `Singular`: plural morphology stripped ("goblet cells" -> "goblet cell")
//! 3. `Synonym`: terms swapped for common synonyms ("colon" -> "large intestine")
//! 4. `Inversion`: "X Y" <-> "Y of X" ("colon goblet cell" -> "goblet cell of colon")
//!
//! Steps 3 and 4 start from the singular form when step 2 produced one.
//! Reformulation only changes the query; the recorded span never changes.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;

use crate::synonyms::SynonymTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReformulationStep {
    Primary,
    Singular,
    Synonym,
    Inversion,
}

impl ReformulationStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Singular => "singular",
            Self::Synonym => "synonym",
            Self::Inversion => "inversion",
        }
    }
}

impl fmt::Display for ReformulationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One search to run for a span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub step: ReformulationStep,
    pub text: String,
}

impl Query {
    fn new(step: ReformulationStep, text: impl Into<String>) -> Self {
        Self {
            step,
            text: text.into(),
        }
    }
}

/// Ordered queries for `span`, at most `max_attempts` of them (at least one).
///
/// Queries equal (ignoring case) to an earlier one are dropped.
pub fn plan(span: &str, synonyms: &SynonymTable, max_attempts: usize) -> Vec<Query> {
    let span = normalize_space(span);
    let mut queries = vec![Query::new(ReformulationStep::Primary, span.clone())];

    let singular = singularize(&span);
    let base = singular.clone().unwrap_or_else(|| span.clone());
    if let Some(s) = singular {
        queries.push(Query::new(ReformulationStep::Singular, s));
    }
    for variant in synonyms.variants(&base) {
        queries.push(Query::new(ReformulationStep::Synonym, variant));
    }
    for inverted in invert_phrase(&base) {
        queries.push(Query::new(ReformulationStep::Inversion, inverted));
    }

    let mut seen = HashSet::new();
    queries.retain(|q| seen.insert(q.text.to_lowercase()));
    queries.truncate(max_attempts.max(1));
    queries
}

/// Irregular plurals common in anatomy and cell biology.
const IRREGULAR: &[(&str, &str)] = &[
    ("alveoli", "alveolus"),
    ("apices", "apex"),
    ("atria", "atrium"),
    ("bronchi", "bronchus"),
    ("cilia", "cilium"),
    ("cortices", "cortex"),
    ("epithelia", "epithelium"),
    ("feet", "foot"),
    ("flagella", "flagellum"),
    ("ganglia", "ganglion"),
    ("glomeruli", "glomerulus"),
    ("matrices", "matrix"),
    ("mitochondria", "mitochondrion"),
    ("nuclei", "nucleus"),
    ("septa", "septum"),
    ("teeth", "tooth"),
    ("testes", "testis"),
    ("vertices", "vertex"),
    ("villi", "villus"),
];

/// Eponyms found in cell and anatomy names. Never inflected.
const EPONYMS: &[&str] = &[
    "betz",
    "bowman",
    "brunner",
    "cajal",
    "hassall",
    "henle",
    "kupffer",
    "langerhans",
    "leydig",
    "lieberkuhn",
    "meissner",
    "merkel",
    "pacini",
    "paneth",
    "peyer",
    "purkinje",
    "schwann",
    "sertoli",
];

/// Strip plural morphology from the head noun of each `of`-separated segment.
///
/// Returns `None` when nothing changed. Case does not matter ("Goblet Cells"
/// -> "Goblet Cell"); known eponyms like "Langerhans" and possessives are left
/// alone, and acronym plurals drop their trailing `s` ("GCs" -> "GC").
pub fn singularize(term: &str) -> Option<String> {
    let mut words: Vec<String> = term.split_whitespace().map(str::to_string).collect();
    if words.is_empty() {
        return None;
    }

    // Head noun = last word before each "of" and the final word.
    let mut heads: Vec<usize> = words
        .iter()
        .enumerate()
        .filter(|(i, w)| *i > 0 && w.eq_ignore_ascii_case("of"))
        .map(|(i, _)| i - 1)
        .collect();
    heads.push(words.len() - 1);

    let mut changed = false;
    for i in heads {
        if is_eponym(&words[i]) {
            continue;
        }
        if let Some(s) = singularize_word(&words[i]) {
            words[i] = s;
            changed = true;
        }
    }

    changed.then(|| words.join(" "))
}

/// Singular form of one word, or `None` if it does not look plural.
pub fn singularize_word(word: &str) -> Option<String> {
    if !word.is_ascii() || word.contains('\'') {
        return None;
    }
    // Hyphenated compounds inflect on the last part.
    if let Some((head, tail)) = word.rsplit_once('-') {
        return singularize_word(tail).map(|t| format!("{head}-{t}"));
    }

    if is_acronym_plural(word) {
        return Some(word[..word.len() - 1].to_string());
    }

    let lower = word.to_ascii_lowercase();
    if let Some((_, singular)) = IRREGULAR.iter().find(|(plural, _)| *plural == lower) {
        return Some(match_case(word, singular));
    }

    if lower.len() < 4 {
        return None;
    }
    if ["ss", "us", "is"].iter().any(|s| lower.ends_with(s)) {
        return None;
    }

    if lower.ends_with("ies") && lower.len() > 4 {
        let y = if is_upper(word) { "Y" } else { "y" };
        return Some(format!("{}{y}", &word[..word.len() - 3]));
    }

    let strip = if ["sses", "ches", "shes", "xes"]
        .iter()
        .any(|s| lower.ends_with(s))
    {
        2
    } else if lower.ends_with("ae") || lower.ends_with('s') {
        1
    } else {
        return None;
    };

    Some(word[..word.len() - strip].to_string())
}

/// Swap between "X Y" and "Y of X".
///
/// A span containing `of` yields the single compact form ("goblet cell of
/// colon" -> "colon goblet cell", a leading article on the structure is
/// dropped). Otherwise every split point is tried, leftmost first, so
/// "colon goblet cell" yields "goblet cell of colon" then "cell of colon goblet".
pub fn invert_phrase(term: &str) -> Vec<String> {
    let words: Vec<&str> = term.split_whitespace().collect();
    let n = words.len();
    if n < 2 {
        return Vec::new();
    }

    if let Some(k) = words
        .iter()
        .position(|w| w.eq_ignore_ascii_case("of"))
        .filter(|&k| k > 0 && k + 1 < n)
    {
        let concept = &words[..k];
        let mut structure = &words[k + 1..];
        if structure.len() > 1 && is_article(structure[0]) {
            structure = &structure[1..];
        }
        return vec![format!("{} {}", structure.join(" "), concept.join(" "))];
    }

    (1..n)
        .map(|i| format!("{} of {}", words[i..].join(" "), words[..i].join(" ")))
        .collect()
}

// ── Helpers ──

fn normalize_space(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_article(w: &str) -> bool {
    ["the", "a", "an"].iter().any(|a| w.eq_ignore_ascii_case(a))
}

fn is_upper(w: &str) -> bool {
    w.chars().any(|c| c.is_ascii_alphabetic()) && !w.chars().any(|c| c.is_ascii_lowercase())
}

fn is_eponym(w: &str) -> bool {
    let lower = w.to_ascii_lowercase();
    let stem = lower.strip_suffix("'s").unwrap_or(&lower);
    EPONYMS.contains(&stem)
}

/// "GCs", "NKs": uppercase letters followed by a lowercase `s`.
fn is_acronym_plural(w: &str) -> bool {
    w.len() >= 3
        && w.ends_with('s')
        && w[..w.len() - 1].chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        && w.chars().next().is_some_and(|c| c.is_ascii_uppercase())
}

/// Give `replacement` the capitalisation pattern of `original`.
fn match_case(original: &str, replacement: &str) -> String {
    if is_upper(original) {
        replacement.to_ascii_uppercase()
    } else if original.chars().next().is_some_and(|c| c.is_ascii_uppercase()) {
        let mut out = replacement.to_string();
        out[..1].make_ascii_uppercase();
        out
    } else {
        replacement.to_string()
    }
}
