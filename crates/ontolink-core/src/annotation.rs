//! Annotation schema shared by the orchestrator, the search backends and the CLI.
//!
//! A [`TextAnnotation`] links one span of input text to at most one ontology
//! term. The id/label pair is all-or-nothing: an annotation is either fully
//! resolved or carries neither field.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("annotation text is empty")]
    EmptyText,
    #[error("annotation {text:?} has an ontology id but no label")]
    IdWithoutLabel { text: String },
    #[error("annotation {text:?} has an ontology label but no id")]
    LabelWithoutId { text: String },
    #[error("malformed annotation document: {0}")]
    Malformed(String),
}

/// One (id, label) hit returned by an ontology search.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchCandidate {
    pub id: String,
    pub label: String,
}

impl SearchCandidate {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

/// A span of input text and the ontology term it mentions, if one was found.
///
/// Fields are private so the id/label co-presence invariant holds for every
/// value that exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextAnnotation {
    text: String,
    ontology_id: Option<String>,
    ontology_label: Option<String>,
}

impl TextAnnotation {
    /// Validating constructor.
    pub fn new(
        text: impl Into<String>,
        ontology_id: Option<String>,
        ontology_label: Option<String>,
    ) -> Result<Self, SchemaError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(SchemaError::EmptyText);
        }
        match (&ontology_id, &ontology_label) {
            (Some(_), None) => return Err(SchemaError::IdWithoutLabel { text }),
            (None, Some(_)) => return Err(SchemaError::LabelWithoutId { text }),
            _ => {}
        }
        Ok(Self {
            text,
            ontology_id,
            ontology_label,
        })
    }

    /// A span with no ontology term (the fallback form).
    pub fn unresolved(text: impl Into<String>) -> Result<Self, SchemaError> {
        Self::new(text, None, None)
    }

    pub fn resolved(
        text: impl Into<String>,
        candidate: &SearchCandidate,
    ) -> Result<Self, SchemaError> {
        Self::new(
            text,
            Some(candidate.id.clone()),
            Some(candidate.label.clone()),
        )
    }

    /// Same span, linked to `candidate`.
    pub fn with_resolution(&self, candidate: &SearchCandidate) -> Self {
        Self {
            text: self.text.clone(),
            ontology_id: Some(candidate.id.clone()),
            ontology_label: Some(candidate.label.clone()),
        }
    }

    /// Same span, with any ontology term dropped.
    pub fn without_resolution(&self) -> Self {
        Self {
            text: self.text.clone(),
            ontology_id: None,
            ontology_label: None,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn ontology_id(&self) -> Option<&str> {
        self.ontology_id.as_deref()
    }

    pub fn ontology_label(&self) -> Option<&str> {
        self.ontology_label.as_deref()
    }

    pub fn is_resolved(&self) -> bool {
        self.ontology_id.is_some()
    }

    /// The linked term as a candidate, if resolved.
    pub fn candidate(&self) -> Option<SearchCandidate> {
        match (&self.ontology_id, &self.ontology_label) {
            (Some(id), Some(label)) => Some(SearchCandidate::new(id, label)),
            _ => None,
        }
    }
}

/// Renders as `<text> ==> <id> <label>`; id and label are empty when unresolved.
impl fmt::Display for TextAnnotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ==> {} {}",
            self.text,
            self.ontology_id.as_deref().unwrap_or_default(),
            self.ontology_label.as_deref().unwrap_or_default()
        )
    }
}

/// The terminal artifact of one invocation: annotations in the order the
/// spans were identified.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnotationResult {
    annotations: Vec<TextAnnotation>,
}

impl AnnotationResult {
    pub fn new(annotations: Vec<TextAnnotation>) -> Self {
        Self { annotations }
    }

    pub fn annotations(&self) -> &[TextAnnotation] {
        &self.annotations
    }

    pub fn iter(&self) -> impl Iterator<Item = &TextAnnotation> {
        self.annotations.iter()
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    pub fn resolved_count(&self) -> usize {
        self.annotations.iter().filter(|a| a.is_resolved()).count()
    }

    pub fn unresolved_count(&self) -> usize {
        self.len() - self.resolved_count()
    }

    pub fn into_annotations(self) -> Vec<TextAnnotation> {
        self.annotations
    }
}

impl FromIterator<TextAnnotation> for AnnotationResult {
    fn from_iter<I: IntoIterator<Item = TextAnnotation>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
