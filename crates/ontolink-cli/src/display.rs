//! Plain-text and JSON rendering of annotation results.

use ontolink_ai::{Annotated, ResolutionStatus, RunReport};
use ontolink_core::{AnnotationResult, OntologyBinding, SearchCandidate};
use serde_json::{Value, json};

/// `## Result:` followed by one `<text> ==> <id> <label>` line per annotation.
pub fn render_result(result: &AnnotationResult) -> String {
    let mut out = String::from("## Result:\n");
    for annotation in result.iter() {
        out.push_str(&format!("  {annotation}\n"));
    }
    out
}

/// One-line summary of a run, for stderr.
pub fn render_summary(report: &RunReport) -> String {
    let mut line = format!(
        "{resolved}/{spans} spans resolved ({ontology}), {turns}/{budget} turns, {searches} searches",
        resolved = report.count(ResolutionStatus::Resolved)
            + report.count(ResolutionStatus::Grounded),
        spans = report.spans.len(),
        ontology = report.ontology,
        turns = report.turns_used,
        budget = report.turn_budget,
        searches = report.searches,
    );
    if report.backend_failures > 0 {
        line.push_str(&format!(", {} backend failures", report.backend_failures));
    }
    if report.proposal_exhausted {
        line.push_str(", turn budget exhausted before any spans were proposed");
    } else if report.budget_exhausted {
        line.push_str(", turn budget exhausted");
    }
    line
}

/// The binding-named annotation document plus the input and run report.
pub fn annotated_json(binding: &OntologyBinding, input: &str, annotated: &Annotated) -> Value {
    let mut doc = binding.to_json(&annotated.result);
    doc["input"] = Value::String(input.to_string());
    doc["report"] = json!(annotated.report);
    doc
}

pub fn render_candidates(term: &str, candidates: &[SearchCandidate]) -> String {
    let mut out = format!("## Query: {term} -> {} candidates\n", candidates.len());
    for c in candidates {
        out.push_str(&format!("  {} {}\n", c.id, c.label));
    }
    out
}
