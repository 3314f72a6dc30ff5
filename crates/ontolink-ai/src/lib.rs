//! Tool-augmented ontology annotation: a reasoner proposes concept mentions,
//! an ontology search tool finds candidate terms, and the orchestrator
//! reformulates queries until each mention is resolved or falls back.

pub mod error;
pub mod orchestrator;
pub mod prompt;
pub mod reasoner;
pub mod tool;

#[cfg(feature = "openai")]
pub mod openai;

pub use error::AnnotateError;
pub use orchestrator::{
    Annotated, Answer, Orchestrator, OrchestratorConfig, ResolutionStatus, RunReport, SpanOutcome,
    annotate,
};
pub use reasoner::{
    Phase, Reasoner, ReasonerError, ReasoningReply, ReasoningRequest, ToolCall, ToolExchange,
};
pub use tool::{SearchTool, Tool, ToolCatalog, ToolError, ToolSpec};

#[cfg(feature = "openai")]
pub use openai::{OpenAiReasoner, ReasonerConfig};
