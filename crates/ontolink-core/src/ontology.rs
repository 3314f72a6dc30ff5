//! Ontology bindings: which controlled vocabulary one invocation annotates against.
//!
//! A binding fixes the CURIE prefix, the search tool name exposed to the
//! reasoner, and the field names used when an [`AnnotationResult`] is written
//! to or read from JSON (`cl_id`/`cl_label` for the Cell Ontology).

use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::annotation::{AnnotationResult, SchemaError, TextAnnotation};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown ontology {0:?} (expected one of: cl, uberon)")]
pub struct UnknownOntology(pub String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OntologyBinding {
    prefix: String,
    ols_id: String,
    name: String,
    concept_kind: String,
}

impl OntologyBinding {
    /// Cell Ontology (CL): cell types.
    pub fn cell_ontology() -> Self {
        Self::custom("CL", "Cell Ontology", "cell type")
    }

    /// Uberon: anatomical structures.
    pub fn uberon() -> Self {
        Self::custom("UBERON", "Uberon multi-species anatomy ontology", "anatomical structure")
    }

    /// Any OBO-style ontology. The OLS id and field names derive from the
    /// lowercased prefix.
    pub fn custom(
        prefix: impl Into<String>,
        name: impl Into<String>,
        concept_kind: impl Into<String>,
    ) -> Self {
        let prefix = prefix.into().trim().to_ascii_uppercase();
        Self {
            ols_id: prefix.to_ascii_lowercase(),
            prefix,
            name: name.into(),
            concept_kind: concept_kind.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Ontology id as used by OLS (`cl`, `uberon`).
    pub fn ols_id(&self) -> &str {
        &self.ols_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// What a span of this ontology refers to, e.g. "cell type".
    pub fn concept_kind(&self) -> &str {
        &self.concept_kind
    }

    pub fn tool_name(&self) -> String {
        format!("search_{}", self.ols_id)
    }

    pub fn id_field(&self) -> String {
        format!("{}_id", self.ols_id)
    }

    pub fn label_field(&self) -> String {
        format!("{}_label", self.ols_id)
    }

    /// True when `id` is a CURIE in this ontology (`CL:0000160` for CL).
    pub fn owns(&self, id: &str) -> bool {
        id.split_once(':')
            .is_some_and(|(prefix, local)| prefix.eq_ignore_ascii_case(&self.prefix) && !local.is_empty())
    }

    /// JSON Schema of the annotation document the reasoner must produce.
    pub fn result_schema(&self) -> Value {
        let mut properties = Map::new();
        properties.insert(
            "text".into(),
            json!({
                "type": "string",
                "description": format!("verbatim span of the input mentioning a {}", self.concept_kind),
            }),
        );
        properties.insert(
            self.id_field(),
            json!({
                "type": ["string", "null"],
                "description": format!("{} identifier, e.g. {}:0000000; null if not found", self.prefix, self.prefix),
            }),
        );
        properties.insert(
            self.label_field(),
            json!({
                "type": ["string", "null"],
                "description": format!("{} label of the identifier; null if not found", self.prefix),
            }),
        );

        json!({
            "type": "object",
            "required": ["annotations"],
            "properties": {
                "annotations": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["text"],
                        "properties": Value::Object(properties),
                    }
                }
            }
        })
    }

    /// Write a result using this binding's field names.
    pub fn to_json(&self, result: &AnnotationResult) -> Value {
        let annotations: Vec<Value> = result
            .iter()
            .map(|ann| {
                let mut obj = Map::new();
                obj.insert("text".into(), Value::String(ann.text().to_string()));
                obj.insert(self.id_field(), opt_string(ann.ontology_id()));
                obj.insert(self.label_field(), opt_string(ann.ontology_label()));
                Value::Object(obj)
            })
            .collect();
        json!({ "annotations": annotations })
    }

    /// Parse and validate an annotation document written with this binding's
    /// field names.
    ///
    /// Blank id/label strings are read as absent; anything else that does not
    /// fit the schema is a [`SchemaError`].
    pub fn parse_result(&self, doc: &Value) -> Result<AnnotationResult, SchemaError> {
        let items = doc
            .get("annotations")
            .ok_or_else(|| SchemaError::Malformed("missing required field `annotations`".into()))?
            .as_array()
            .ok_or_else(|| SchemaError::Malformed("`annotations` is not an array".into()))?;

        let id_field = self.id_field();
        let label_field = self.label_field();
        let mut annotations = Vec::with_capacity(items.len());

        for (i, item) in items.iter().enumerate() {
            let obj = item
                .as_object()
                .ok_or_else(|| SchemaError::Malformed(format!("annotation {i} is not an object")))?;
            let text = match obj.get("text") {
                Some(Value::String(s)) => s.clone(),
                Some(_) => {
                    return Err(SchemaError::Malformed(format!(
                        "annotation {i}: `text` is not a string"
                    )));
                }
                None => {
                    return Err(SchemaError::Malformed(format!(
                        "annotation {i}: missing required field `text`"
                    )));
                }
            };
            let id = optional_field(obj, &id_field, i)?;
            let label = optional_field(obj, &label_field, i)?;
            annotations.push(TextAnnotation::new(text, id, label)?);
        }

        Ok(AnnotationResult::new(annotations))
    }
}

impl Default for OntologyBinding {
    fn default() -> Self {
        Self::cell_ontology()
    }
}

impl fmt::Display for OntologyBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.prefix)
    }
}

impl FromStr for OntologyBinding {
    type Err = UnknownOntology;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cl" | "cell" | "cell-ontology" => Ok(Self::cell_ontology()),
            "uberon" | "anatomy" => Ok(Self::uberon()),
            _ => Err(UnknownOntology(s.to_string())),
        }
    }
}

fn opt_string(v: Option<&str>) -> Value {
    v.map_or(Value::Null, |s| Value::String(s.to_string()))
}

fn optional_field(
    obj: &Map<String, Value>,
    field: &str,
    index: usize,
) -> Result<Option<String>, SchemaError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(other) => Err(SchemaError::Malformed(format!(
            "annotation {index}: `{field}` must be a string or null, got {other}"
        ))),
    }
}
