//! The boundary to the language-reasoning engine.
//!
//! The orchestrator never talks to a model directly. It sends a
//! [`ReasoningRequest`] and gets back either tool calls to execute or a final
//! JSON document, and repeats with a growing transcript until the reply is
//! final or the turn budget runs out.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::tool::ToolSpec;

#[derive(Error, Debug)]
pub enum ReasonerError {
    #[cfg(feature = "openai")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("input too large for the reasoner: {0}")]
    InputTooLarge(String),
    #[error("malformed reasoner output: {0}")]
    MalformedOutput(String),
    #[error("reasoner not configured: {0}")]
    NotConfigured(String),
}

/// Which question the orchestrator is asking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Find every concept mention in the input.
    Propose,
    /// Pick the candidate, if any, that denotes a span.
    Judge,
    /// Answer a free-form question about the ontology.
    Ask,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Propose => "propose",
            Self::Judge => "judge",
            Self::Ask => "ask",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub args: Value,
}

/// A tool call and what came back, `{"error": ..}` on failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolExchange {
    pub call: ToolCall,
    pub result: Value,
}

#[derive(Debug, Clone)]
pub struct ReasoningRequest {
    pub phase: Phase,
    pub instruction: String,
    pub input: String,
    /// Empty when no tool may be called this turn.
    pub tools: Vec<ToolSpec>,
    pub output_schema: Value,
    pub transcript: Vec<ToolExchange>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReasoningReply {
    ToolCalls(Vec<ToolCall>),
    Final(Value),
}

#[async_trait]
pub trait Reasoner: Send + Sync {
    async fn respond(&self, request: &ReasoningRequest) -> Result<ReasoningReply, ReasonerError>;
}
