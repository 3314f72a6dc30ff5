//! Instructions sent to the reasoner.

use ontolink_core::{OntologyBinding, Query, SearchCandidate};
use serde_json::{Value, json};

/// System instruction for span proposal.
pub fn propose_instruction(binding: &OntologyBinding) -> String {
    format!(
        "You will be provided with text, often a table where each row describes a {kind}.\n\
         Your goal is to map every span of the text that mentions a {kind} to a term from the {name}.\n\
         \n\
         Return one annotation per mention, in the order the mentions appear. Be sure to include all \
         spans mentioning a {kind}, even abbreviations, and copy each span verbatim into `text`.\n\
         Set `{id}` and `{label}` only to an identifier and label returned by the `{tool}` tool; \
         if you cannot find one, still return the annotation with both fields null.\n\
         \n\
         Before giving up on a span, convert plurals to singular and search again; try \
         substituting terms in the span with common synonyms; and try converting between the \
         forms 'X Y' and 'Y of X', where X is a tissue or anatomical structure and Y is a {kind}.\n\
         \n\
         Respond ONLY with a JSON object. No markdown fences, no explanation:\n\
         {{\"annotations\": [{{\"text\": \"...\", \"{id}\": \"{prefix}:...\" or null, \"{label}\": \"...\" or null}}]}}",
        kind = binding.concept_kind(),
        name = binding.name(),
        id = binding.id_field(),
        label = binding.label_field(),
        tool = binding.tool_name(),
        prefix = binding.prefix(),
    )
}

pub fn propose_input(text: &str) -> String {
    format!("Text to annotate:\n{text}")
}

/// System instruction for judging one search's candidates.
pub fn judge_instruction(binding: &OntologyBinding) -> String {
    format!(
        "You are an expert ontology curator for the {name}.\n\
         \n\
         Given a span of text that mentions a {kind} and the candidates an ontology search \
         returned for it, decide whether one candidate denotes the same {kind} as the span. \
         A candidate for a broader or unrelated concept is not a match.\n\
         \n\
         Respond ONLY with a JSON object:\n\
         {{\"accepted_id\": \"the id of the matching candidate\" or null}}",
        name = binding.name(),
        kind = binding.concept_kind(),
    )
}

pub fn judge_input(span: &str, query: &Query, candidates: &[SearchCandidate]) -> String {
    let listing: Vec<String> = candidates
        .iter()
        .map(|c| format!("- {} {}", c.id, c.label))
        .collect();
    format!(
        "Span: {span}\n\
         Searched for: {query} ({step})\n\
         \n\
         Candidates:\n\
         {listing}",
        query = query.text,
        step = query.step,
        listing = listing.join("\n"),
    )
}

pub fn judge_schema() -> Value {
    json!({
        "type": "object",
        "required": ["accepted_id"],
        "properties": {
            "accepted_id": { "type": ["string", "null"] }
        }
    })
}

/// System instruction for free-form questions.
pub fn ask_instruction(binding: &OntologyBinding) -> String {
    format!(
        "You are an expert ontology curator. Use the `{tool}` tool to search the {name} \
         and answer the user's question.\n\
         \n\
         Search takes synonyms into account, but they may be incomplete, so if you cannot find \
         a concept of interest, search again using related or synonymous terms. For a composite \
         term, search on the sub-terms to learn the terminology the ontology uses. Cite \
         identifiers exactly as the tool returned them.\n\
         \n\
         Respond ONLY with a JSON object:\n\
         {{\"answer\": \"...\"}}",
        tool = binding.tool_name(),
        name = binding.name(),
    )
}

pub fn answer_schema() -> Value {
    json!({
        "type": "object",
        "required": ["answer"],
        "properties": {
            "answer": { "type": "string" }
        }
    })
}
