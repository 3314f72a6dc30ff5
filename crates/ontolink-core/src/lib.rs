//! Core types for ontology annotation: the annotation schema, ontology
//! bindings, and the query reformulation policy.

pub mod annotation;
pub mod ontology;
pub mod reformulate;
pub mod synonyms;

pub use annotation::{AnnotationResult, SchemaError, SearchCandidate, TextAnnotation};
pub use ontology::{OntologyBinding, UnknownOntology};
pub use reformulate::{Query, ReformulationStep};
pub use synonyms::{SynonymError, SynonymSummary, SynonymTable};
