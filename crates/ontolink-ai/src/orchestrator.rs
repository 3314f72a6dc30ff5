//! The resolution loop.
//!
//! One invocation runs, strictly in sequence:
//!
//! 1. **Propose**: the reasoner lists every concept mention as an annotation,
//!    calling the search tool as it likes.
//! 2. **Ground**: a proposed id survives only if a search in this invocation
//!    returned exactly that (id, label) pair.
//! 3. **Search**: every other span is searched verbatim, then reformulated
//!    (singular, synonyms, inversion) until a candidate is accepted or the
//!    span's attempts run out.
//! 4. **Judge**: each non-empty search is shown to the reasoner, which names
//!    the matching candidate or none.
//! 5. **Fallback**: spans with no accepted candidate are emitted unresolved.
//!
//! Every reasoner round-trip costs one turn of the budget; searches are free.
//! When the budget runs out, remaining spans fall back and the invocation
//! still succeeds.

use std::collections::HashSet;
use std::sync::Arc;

use ontolink_core::reformulate;
use ontolink_core::{
    AnnotationResult, OntologyBinding, Query, ReformulationStep, SearchCandidate, SynonymTable,
    TextAnnotation,
};
use ontolink_search::OntologySearch;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::error::AnnotateError;
use crate::prompt;
use crate::reasoner::{
    Phase, Reasoner, ReasonerError, ReasoningReply, ReasoningRequest, ToolCall, ToolExchange,
};
use crate::tool::{SearchTool, Tool, ToolCatalog, ToolError};

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Reasoner round-trips allowed per invocation. 0 is treated as 1.
    pub turn_budget: usize,
    /// Searches per span, the verbatim one included.
    pub max_attempts_per_span: usize,
    /// Candidates kept from each search.
    pub max_candidates: usize,
    pub max_input_chars: usize,
    /// Fail with [`AnnotateError::BackendUnavailable`] when every search failed.
    pub fail_on_backend_outage: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            turn_budget: 24,
            max_attempts_per_span: 8,
            max_candidates: 10,
            max_input_chars: 100_000,
            fail_on_backend_outage: false,
        }
    }
}

/// How a span ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStatus {
    /// Proposed with an id that an earlier search returned.
    Grounded,
    /// A search candidate was accepted.
    Resolved,
    /// Every attempt ran without an accepted candidate.
    Unresolved,
    /// The turn budget ran out before the span was settled.
    BudgetExhausted,
}

impl ResolutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Grounded => "grounded",
            Self::Resolved => "resolved",
            Self::Unresolved => "unresolved",
            Self::BudgetExhausted => "budget_exhausted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpanOutcome {
    pub text: String,
    pub status: ResolutionStatus,
    /// Searches run for this span by the orchestrator.
    pub attempts: usize,
    pub accepted_query: Option<String>,
    pub accepted_step: Option<ReformulationStep>,
}

impl SpanOutcome {
    fn settled(text: String, status: ResolutionStatus, attempts: usize) -> Self {
        Self {
            text,
            status,
            attempts,
            accepted_query: None,
            accepted_step: None,
        }
    }
}

/// Bookkeeping for one invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub ontology: String,
    pub turn_budget: usize,
    pub turns_used: usize,
    pub budget_exhausted: bool,
    /// The budget ran out before the reasoner listed any spans, so an empty
    /// result says nothing about the text.
    pub proposal_exhausted: bool,
    /// Searches run, by the orchestrator and by reasoner tool calls.
    pub searches: usize,
    pub backend_failures: usize,
    pub spans: Vec<SpanOutcome>,
}

impl RunReport {
    /// At least one search ran and none of them reached the backend.
    pub fn backend_outage(&self) -> bool {
        self.searches > 0 && self.backend_failures == self.searches
    }

    pub fn count(&self, status: ResolutionStatus) -> usize {
        self.spans.iter().filter(|s| s.status == status).count()
    }
}

#[derive(Debug, Clone)]
pub struct Annotated {
    pub result: AnnotationResult,
    pub report: RunReport,
}

/// Reply to a free-form question about the ontology.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    /// `None` when the turn budget ran out before the reasoner answered.
    pub text: Option<String>,
    pub turns_used: usize,
    pub searches: usize,
    pub backend_failures: usize,
}

/// Drives the reasoner and the search tool for one ontology.
///
/// Holds no per-invocation state: every [`Orchestrator::annotate`] call starts
/// with a fresh turn budget.
pub struct Orchestrator {
    reasoner: Arc<dyn Reasoner>,
    tool: Arc<SearchTool>,
    catalog: ToolCatalog,
    synonyms: SynonymTable,
    config: OrchestratorConfig,
}

struct Session {
    budget: usize,
    turns_used: usize,
    exhausted: bool,
    chars: usize,
    searches: usize,
    backend_failures: usize,
    /// Every (id, label) any search returned so far.
    seen: HashSet<SearchCandidate>,
}

impl Session {
    fn new(turn_budget: usize, chars: usize) -> Self {
        Self {
            budget: turn_budget.max(1),
            turns_used: 0,
            exhausted: false,
            chars,
            searches: 0,
            backend_failures: 0,
            seen: HashSet::new(),
        }
    }

    fn remaining(&self) -> usize {
        self.budget.saturating_sub(self.turns_used)
    }

    fn exhaust(&mut self, phase: Phase) {
        if !self.exhausted {
            warn!(
                phase = phase.as_str(),
                turns_used = self.turns_used,
                "turn budget exhausted"
            );
        }
        self.exhausted = true;
    }

    fn record_hits(&mut self, candidates: &[SearchCandidate]) {
        self.searches += 1;
        self.seen.extend(candidates.iter().cloned());
    }

    fn record_failure(&mut self) {
        self.searches += 1;
        self.backend_failures += 1;
    }
}

enum Verdict {
    Accept(SearchCandidate),
    Decline,
    OutOfTurns,
}

impl Orchestrator {
    pub fn new(
        reasoner: Arc<dyn Reasoner>,
        backend: Arc<dyn OntologySearch>,
        binding: OntologyBinding,
        config: OrchestratorConfig,
    ) -> Self {
        let tool =
            Arc::new(SearchTool::new(backend, binding).with_max_candidates(config.max_candidates));
        let mut catalog = ToolCatalog::new();
        catalog.register(tool.clone());
        Self {
            reasoner,
            tool,
            catalog,
            synonyms: SynonymTable::builtin(),
            config,
        }
    }

    /// Replace the built-in synonym table.
    pub fn with_synonyms(mut self, synonyms: SynonymTable) -> Self {
        self.synonyms = synonyms;
        self
    }

    pub fn binding(&self) -> &OntologyBinding {
        self.tool.binding()
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub async fn annotate(&self, text: &str) -> Result<Annotated, AnnotateError> {
        let chars = text.chars().count();
        if chars > self.config.max_input_chars {
            return Err(AnnotateError::InputTooLarge {
                chars,
                limit: Some(self.config.max_input_chars),
            });
        }

        let mut session = Session::new(self.config.turn_budget, chars);
        info!(
            ontology = self.binding().prefix(),
            chars,
            turn_budget = session.budget,
            "annotating"
        );

        let mut annotations = Vec::new();
        let mut spans = Vec::new();
        let mut proposal_exhausted = false;
        if !text.trim().is_empty() {
            match self.propose(&mut session, text).await? {
                Some(proposed) => {
                    for annotation in proposed.into_annotations() {
                        let (annotation, outcome) = self.resolve(&mut session, annotation).await?;
                        annotations.push(annotation);
                        spans.push(outcome);
                    }
                }
                None => {
                    warn!(
                        turns_used = session.turns_used,
                        "turn budget ran out before any spans were proposed"
                    );
                    proposal_exhausted = true;
                }
            }
        }

        let report = RunReport {
            ontology: self.binding().prefix().to_string(),
            turn_budget: session.budget,
            turns_used: session.turns_used,
            budget_exhausted: session.exhausted,
            proposal_exhausted,
            searches: session.searches,
            backend_failures: session.backend_failures,
            spans,
        };
        let result = AnnotationResult::new(annotations);
        info!(
            spans = result.len(),
            resolved = result.resolved_count(),
            turns_used = report.turns_used,
            searches = report.searches,
            backend_failures = report.backend_failures,
            budget_exhausted = report.budget_exhausted,
            "annotation complete"
        );

        if self.config.fail_on_backend_outage && report.backend_outage() {
            return Err(AnnotateError::BackendUnavailable {
                failures: report.backend_failures,
            });
        }
        Ok(Annotated { result, report })
    }

    /// Answer `question` with the search tool at the reasoner's disposal.
    ///
    /// Shares the turn budget and tool handling of [`Orchestrator::annotate`]
    /// but runs a single exchange with free-text output.
    pub async fn ask(&self, question: &str) -> Result<Answer, AnnotateError> {
        let chars = question.chars().count();
        if chars > self.config.max_input_chars {
            return Err(AnnotateError::InputTooLarge {
                chars,
                limit: Some(self.config.max_input_chars),
            });
        }

        let mut session = Session::new(self.config.turn_budget, chars);
        let binding = self.binding();
        let request = ReasoningRequest {
            phase: Phase::Ask,
            instruction: prompt::ask_instruction(binding),
            input: question.to_string(),
            tools: self.catalog.specs(),
            output_schema: prompt::answer_schema(),
            transcript: Vec::new(),
        };
        let text = match self.converse(&mut session, request).await? {
            Some(reply) => Some(answer_text(&reply)?),
            None => None,
        };
        info!(
            ontology = binding.prefix(),
            answered = text.is_some(),
            turns_used = session.turns_used,
            searches = session.searches,
            "question answered"
        );
        Ok(Answer {
            text,
            turns_used: session.turns_used,
            searches: session.searches,
            backend_failures: session.backend_failures,
        })
    }

    // ── Phases ──

    async fn propose(
        &self,
        session: &mut Session,
        text: &str,
    ) -> Result<Option<AnnotationResult>, AnnotateError> {
        let binding = self.binding();
        let request = ReasoningRequest {
            phase: Phase::Propose,
            instruction: prompt::propose_instruction(binding),
            input: prompt::propose_input(text),
            tools: self.catalog.specs(),
            output_schema: binding.result_schema(),
            transcript: Vec::new(),
        };
        let Some(doc) = self.converse(session, request).await? else {
            return Ok(None);
        };
        let proposed = binding.parse_result(&doc)?;
        debug!(spans = proposed.len(), "spans proposed");
        Ok(Some(proposed))
    }

    async fn resolve(
        &self,
        session: &mut Session,
        proposed: TextAnnotation,
    ) -> Result<(TextAnnotation, SpanOutcome), AnnotateError> {
        let text = proposed.text().to_string();
        if let Some(candidate) = proposed.candidate() {
            if session.seen.contains(&candidate) {
                debug!(span = %text, id = %candidate.id, "span grounded by earlier search");
                let outcome = SpanOutcome::settled(text, ResolutionStatus::Grounded, 0);
                return Ok((proposed, outcome));
            }
            warn!(span = %text, id = %candidate.id, "discarding id no search returned");
        }
        let span = proposed.without_resolution();

        let mut attempts = 0;
        for query in reformulate::plan(&text, &self.synonyms, self.config.max_attempts_per_span) {
            // Nothing found now could be judged.
            if session.remaining() == 0 {
                session.exhaust(Phase::Judge);
                break;
            }
            attempts += 1;
            let candidates = self.search(session, &query.text).await;
            if candidates.is_empty() {
                continue;
            }
            match self.judge(session, &text, &query, &candidates).await? {
                Verdict::Accept(candidate) => {
                    info!(span = %text, id = %candidate.id, step = %query.step, "span resolved");
                    let outcome = SpanOutcome {
                        text,
                        status: ResolutionStatus::Resolved,
                        attempts,
                        accepted_query: Some(query.text),
                        accepted_step: Some(query.step),
                    };
                    return Ok((span.with_resolution(&candidate), outcome));
                }
                Verdict::Decline => {}
                Verdict::OutOfTurns => break,
            }
        }

        let status = if session.exhausted {
            ResolutionStatus::BudgetExhausted
        } else {
            ResolutionStatus::Unresolved
        };
        debug!(span = %text, attempts, status = status.as_str(), "span not resolved");
        Ok((span, SpanOutcome::settled(text, status, attempts)))
    }

    async fn judge(
        &self,
        session: &mut Session,
        span: &str,
        query: &Query,
        candidates: &[SearchCandidate],
    ) -> Result<Verdict, AnnotateError> {
        let binding = self.binding();
        let request = ReasoningRequest {
            phase: Phase::Judge,
            instruction: prompt::judge_instruction(binding),
            input: prompt::judge_input(span, query, candidates),
            tools: Vec::new(),
            output_schema: prompt::judge_schema(),
            transcript: Vec::new(),
        };
        let Some(reply) = self.converse(session, request).await? else {
            return Ok(Verdict::OutOfTurns);
        };

        let Some(id) = accepted_id(&reply)? else {
            debug!(span = %span, query = %query.text, "candidates declined");
            return Ok(Verdict::Decline);
        };
        match candidates.iter().find(|c| c.id == id) {
            Some(candidate) => Ok(Verdict::Accept(candidate.clone())),
            None => {
                warn!(span = %span, id = %id, "accepted id was not among the candidates");
                Ok(Verdict::Decline)
            }
        }
    }

    // ── Reasoner and tool plumbing ──

    /// Run one exchange until the reasoner gives a final answer, executing its
    /// tool calls in between. `None` when the budget ran out first.
    async fn converse(
        &self,
        session: &mut Session,
        mut request: ReasoningRequest,
    ) -> Result<Option<Value>, AnnotateError> {
        let tools = std::mem::take(&mut request.tools);
        loop {
            if session.remaining() == 0 {
                session.exhaust(request.phase);
                return Ok(None);
            }
            // On the last turn the reasoner has to answer.
            let withheld = session.remaining() == 1 && !tools.is_empty();
            request.tools = if withheld { Vec::new() } else { tools.clone() };

            session.turns_used += 1;
            let chars = session.chars;
            let reply = self
                .reasoner
                .respond(&request)
                .await
                .map_err(|e| reasoner_failure(e, chars))?;

            let calls = match reply {
                ReasoningReply::Final(doc) => return Ok(Some(doc)),
                ReasoningReply::ToolCalls(calls) => calls,
            };
            if withheld {
                session.exhaust(request.phase);
                return Ok(None);
            }
            if tools.is_empty() {
                return Err(AnnotateError::SchemaViolation(format!(
                    "reasoner requested tools in the {} phase, where none are offered",
                    request.phase.as_str()
                )));
            }
            for call in calls {
                let result = self.dispatch(session, &call).await;
                request.transcript.push(ToolExchange { call, result });
            }
        }
    }

    async fn dispatch(&self, session: &mut Session, call: &ToolCall) -> Value {
        debug!(tool = %call.name, args = %call.args, "tool call");
        let result = self.catalog.invoke(&call.name, call.args.clone()).await;

        if call.name == self.tool.name() {
            match &result {
                Ok(value) => {
                    let candidates: Vec<SearchCandidate> =
                        serde_json::from_value(value.clone()).unwrap_or_default();
                    session.record_hits(&candidates);
                }
                Err(ToolError::Search(_)) => session.record_failure(),
                Err(_) => {}
            }
        }

        result.unwrap_or_else(|e| {
            warn!(tool = %call.name, error = %e, "tool call failed");
            json!({ "error": e.to_string() })
        })
    }

    /// A backend error counts as an empty answer.
    async fn search(&self, session: &mut Session, term: &str) -> Vec<SearchCandidate> {
        match self.tool.search(term).await {
            Ok(candidates) => {
                session.record_hits(&candidates);
                candidates
            }
            Err(_) => {
                session.record_failure();
                Vec::new()
            }
        }
    }
}

fn reasoner_failure(err: ReasonerError, chars: usize) -> AnnotateError {
    match err {
        ReasonerError::InputTooLarge(detail) => {
            warn!(chars, detail = %detail, "reasoner rejected input as too large");
            AnnotateError::InputTooLarge { chars, limit: None }
        }
        ReasonerError::MalformedOutput(msg) => AnnotateError::SchemaViolation(msg),
        other => AnnotateError::Reasoner(other),
    }
}

/// The `accepted_id` of a judgement: `None` for null or blank.
fn accepted_id(reply: &Value) -> Result<Option<String>, AnnotateError> {
    match reply.get("accepted_id") {
        None => Err(AnnotateError::SchemaViolation(
            "judgement is missing `accepted_id`".into(),
        )),
        Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(other) => Err(AnnotateError::SchemaViolation(format!(
            "`accepted_id` must be a string or null, got {other}"
        ))),
    }
}

fn answer_text(reply: &Value) -> Result<String, AnnotateError> {
    reply
        .get("answer")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .ok_or_else(|| AnnotateError::SchemaViolation("answer must have a string `answer`".into()))
}

/// Annotate `text` once with a default configuration and the given budget.
pub async fn annotate(
    reasoner: Arc<dyn Reasoner>,
    backend: Arc<dyn OntologySearch>,
    text: &str,
    binding: OntologyBinding,
    turn_budget: usize,
) -> Result<AnnotationResult, AnnotateError> {
    let config = OrchestratorConfig {
        turn_budget,
        ..OrchestratorConfig::default()
    };
    let annotated = Orchestrator::new(reasoner, backend, binding, config)
        .annotate(text)
        .await?;
    Ok(annotated.result)
}
