use ontolink_core::SchemaError;
use thiserror::Error;

use crate::reasoner::ReasonerError;

/// Why an invocation produced no result.
///
/// Running out of turns is not here: spans left over when the budget is spent
/// come back unresolved in a successful result.
#[derive(Error, Debug)]
pub enum AnnotateError {
    #[error("ontology backend unavailable: all {failures} searches failed")]
    BackendUnavailable { failures: usize },

    #[error("reasoner output violates the annotation schema: {0}")]
    SchemaViolation(String),

    /// `limit` is set when the configured input limit was hit, unset when
    /// the reasoner itself refused the input.
    #[error("input of {chars} characters is too large{}", limit_note(.limit))]
    InputTooLarge { chars: usize, limit: Option<usize> },

    #[error("reasoner failed: {0}")]
    Reasoner(#[source] ReasonerError),
}

fn limit_note(limit: &Option<usize>) -> String {
    limit.map_or_else(String::new, |l| format!(" (limit {l})"))
}

impl From<SchemaError> for AnnotateError {
    fn from(e: SchemaError) -> Self {
        Self::SchemaViolation(e.to_string())
    }
}
