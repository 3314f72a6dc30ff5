//! Tools the reasoner may call, and the ontology search tool itself.

use std::sync::Arc;

use async_trait::async_trait;
use ontolink_core::{OntologyBinding, SearchCandidate};
use ontolink_search::{OntologySearch, SearchError};
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("unknown tool {0:?}")]
    Unknown(String),
    #[error("invalid arguments for {tool}: {reason}")]
    InvalidArgs { tool: String, reason: String },
    #[error(transparent)]
    Search(#[from] SearchError),
}

/// What the reasoner sees of a tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema of the `args` object accepted by [`Tool::invoke`].
    fn input_schema(&self) -> Value;

    async fn invoke(&self, args: Value) -> Result<Value, ToolError>;

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

/// Tools offered to the reasoner, dispatched by name.
#[derive(Default, Clone)]
pub struct ToolCatalog {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool. A tool with the same name replaces the earlier one.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.retain(|t| t.name() != tool.name());
        self.tools.push(tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.spec()).collect()
    }

    pub async fn invoke(&self, name: &str, args: Value) -> Result<Value, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::Unknown(name.to_string()))?;
        tool.invoke(args).await
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

// ── Ontology search tool ──

/// One search backend bound to one ontology, exposed as `search_<ontology>`.
///
/// No retries and no state: a backend error is returned as is.
pub struct SearchTool {
    backend: Arc<dyn OntologySearch>,
    binding: OntologyBinding,
    name: String,
    description: String,
    max_candidates: usize,
}

impl SearchTool {
    pub fn new(backend: Arc<dyn OntologySearch>, binding: OntologyBinding) -> Self {
        let description = format!(
            "Search the {name} for a {kind}. Returns a list of {{id, label}} matches, best first. \
             Synonyms in the ontology may be incomplete: if a concept is not found, try \
             singular forms, synonymous terms, and the forms 'X Y' / 'Y of X'.",
            name = binding.name(),
            kind = binding.concept_kind(),
        );
        Self {
            name: binding.tool_name(),
            backend,
            binding,
            description,
            max_candidates: usize::MAX,
        }
    }

    /// Keep at most `n` candidates per search.
    pub fn with_max_candidates(mut self, n: usize) -> Self {
        self.max_candidates = n.max(1);
        self
    }

    pub fn binding(&self) -> &OntologyBinding {
        &self.binding
    }

    pub async fn search(&self, term: &str) -> Result<Vec<SearchCandidate>, SearchError> {
        match self.backend.search(&self.binding, term).await {
            Ok(mut candidates) => {
                candidates.truncate(self.max_candidates);
                debug!(
                    tool = %self.name,
                    term,
                    labels = ?candidates.iter().map(|c| c.label.as_str()).collect::<Vec<_>>(),
                    "search"
                );
                Ok(candidates)
            }
            Err(e) => {
                warn!(tool = %self.name, term, error = %e, "search backend error");
                Err(e)
            }
        }
    }
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["term"],
            "properties": {
                "term": { "type": "string", "description": "the term to search for" }
            }
        })
    }

    async fn invoke(&self, args: Value) -> Result<Value, ToolError> {
        let term = args
            .get("term")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ToolError::InvalidArgs {
                tool: self.name.clone(),
                reason: "`term` must be a non-empty string".into(),
            })?;
        let candidates = self.search(term).await?;
        Ok(json!(candidates))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ontolink_search::Vocabulary;

    fn tool() -> SearchTool {
        let vocab = Vocabulary::from_pairs(&[
            ("CL:0000160", "goblet cell"),
            ("CL:1000320", "large intestine goblet cell"),
            ("CL:0000000", "cell"),
        ])
        .unwrap();
        SearchTool::new(Arc::new(vocab), OntologyBinding::cell_ontology())
    }

    #[test]
    fn spec_uses_binding_name() {
        let spec = tool().spec();
        assert_eq!(spec.name, "search_cl");
        assert!(spec.description.contains("Cell Ontology"));
        assert_eq!(spec.input_schema["required"], json!(["term"]));
    }

    #[tokio::test]
    async fn invoke_returns_id_label_pairs() {
        let out = tool().invoke(json!({ "term": "goblet cell" })).await.unwrap();
        assert_eq!(out[0], json!({ "id": "CL:0000160", "label": "goblet cell" }));
        assert_eq!(out.as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn max_candidates_truncates() {
        let tool = tool().with_max_candidates(1);
        assert_eq!(tool.search("goblet cell").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn no_match_is_empty_list() {
        let out = tool().invoke(json!({ "term": "amygdala" })).await.unwrap();
        assert_eq!(out, json!([]));
    }

    #[tokio::test]
    async fn bad_args_rejected() {
        let err = tool().invoke(json!({ "query": "x" })).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArgs { .. }));
    }

    #[tokio::test]
    async fn catalog_dispatches_by_name() {
        let mut catalog = ToolCatalog::new();
        catalog.register(Arc::new(tool()));
        catalog.register(Arc::new(tool()));
        assert_eq!(catalog.len(), 1);

        let out = catalog
            .invoke("search_cl", json!({ "term": "cell" }))
            .await
            .unwrap();
        assert_eq!(out[0]["id"], "CL:0000000");

        assert!(matches!(
            catalog.invoke("search_go", json!({})).await,
            Err(ToolError::Unknown(_))
        ));
    }
}
