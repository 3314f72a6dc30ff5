//! Reasoner backed by an OpenAI-compatible chat-completions API.
//!
//! Tool calls use the `tools` / `tool_calls` function-calling protocol; final
//! answers are requested in JSON mode and parsed from the message content.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::reasoner::{Reasoner, ReasonerError, ReasoningReply, ReasoningRequest, ToolCall};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o";

#[derive(Debug, Clone)]
pub struct ReasonerConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_tokens: Option<u32>,
}

impl Default for ReasonerConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            timeout_secs: 120,
            max_tokens: None,
        }
    }
}

impl ReasonerConfig {
    /// Defaults overridden by `OPENAI_API_KEY`, `OPENAI_BASE_URL` and
    /// `ONTOLINK_MODEL`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();
        Self {
            api_key: get("OPENAI_API_KEY"),
            base_url: get("OPENAI_BASE_URL").unwrap_or(defaults.base_url),
            model: get("ONTOLINK_MODEL").unwrap_or(defaults.model),
            ..defaults
        }
    }
}

pub struct OpenAiReasoner {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: Option<u32>,
}

// ── Wire types ──

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Value>,
    temperature: f32,
    response_format: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Deserialize)]
struct WireFunction {
    name: String,
    arguments: String,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

impl OpenAiReasoner {
    pub fn new(config: ReasonerConfig) -> Result<Self, ReasonerError> {
        let api_key = config
            .api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ReasonerError::NotConfigured("OPENAI_API_KEY is not set".into()))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model,
            max_tokens: config.max_tokens,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_messages(request: &ReasoningRequest) -> Vec<Value> {
        let system = format!(
            "{}\n\nThe JSON object must conform to this JSON Schema:\n{}",
            request.instruction, request.output_schema
        );
        let mut messages = vec![
            json!({ "role": "system", "content": system }),
            json!({ "role": "user", "content": request.input }),
        ];
        for exchange in &request.transcript {
            messages.push(json!({
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": exchange.call.id,
                    "type": "function",
                    "function": {
                        "name": exchange.call.name,
                        "arguments": exchange.call.args.to_string(),
                    }
                }]
            }));
            messages.push(json!({
                "role": "tool",
                "tool_call_id": exchange.call.id,
                "content": exchange.result.to_string(),
            }));
        }
        messages
    }
}

#[async_trait]
impl Reasoner for OpenAiReasoner {
    async fn respond(&self, request: &ReasoningRequest) -> Result<ReasoningReply, ReasonerError> {
        let tools = request
            .tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.input_schema,
                    }
                })
            })
            .collect();
        let body = ChatRequest {
            model: &self.model,
            messages: Self::build_messages(request),
            temperature: 0.0,
            response_format: json!({ "type": "json_object" }),
            tools,
            max_tokens: self.max_tokens,
        };

        let url = format!("{}/chat/completions", self.base_url);
        debug!(
            url = %url,
            phase = request.phase.as_str(),
            transcript = request.transcript.len(),
            "chat completion"
        );
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            if status.as_u16() == 413 || body.contains("context_length_exceeded") {
                return Err(ReasonerError::InputTooLarge(body));
            }
            return Err(ReasonerError::Server {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = resp.json().await?;
        if let Some(usage) = &parsed.usage {
            info!(
                model = %self.model,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "chat usage"
            );
        }
        let message = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ReasonerError::MalformedOutput("no choices in response".into()))?
            .message;
        into_reply(message)
    }
}

fn into_reply(message: ChatMessage) -> Result<ReasoningReply, ReasonerError> {
    if !message.tool_calls.is_empty() {
        let calls = message
            .tool_calls
            .into_iter()
            .map(|c| {
                let args = serde_json::from_str(&c.function.arguments).map_err(|e| {
                    ReasonerError::MalformedOutput(format!(
                        "tool call {} arguments: {e}",
                        c.function.name
                    ))
                })?;
                Ok(ToolCall {
                    id: c.id,
                    name: c.function.name,
                    args,
                })
            })
            .collect::<Result<Vec<_>, ReasonerError>>()?;
        return Ok(ReasoningReply::ToolCalls(calls));
    }

    let content = message
        .content
        .ok_or_else(|| ReasonerError::MalformedOutput("empty message".into()))?;
    let doc = serde_json::from_str(strip_fences(&content)).map_err(|e| {
        ReasonerError::MalformedOutput(format!(
            "{e}; raw: {}",
            content.chars().take(200).collect::<String>()
        ))
    })?;
    Ok(ReasoningReply::Final(doc))
}

/// Drop a surrounding ```json fence, which some models add despite JSON mode.
fn strip_fences(content: &str) -> &str {
    let trimmed = content.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .map_or(trimmed, str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reasoner::{Phase, ToolExchange};
    use crate::tool::ToolSpec;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn reasoner(server: &MockServer) -> OpenAiReasoner {
        OpenAiReasoner::new(ReasonerConfig {
            base_url: format!("{}/v1/", server.uri()),
            api_key: Some("test-key".into()),
            ..ReasonerConfig::default()
        })
        .unwrap()
    }

    fn request() -> ReasoningRequest {
        ReasoningRequest {
            phase: Phase::Propose,
            instruction: "Annotate. Respond with JSON.".into(),
            input: "Colon goblet cells".into(),
            tools: vec![ToolSpec {
                name: "search_cl".into(),
                description: "Search the Cell Ontology".into(),
                input_schema: json!({ "type": "object" }),
            }],
            output_schema: json!({ "type": "object" }),
            transcript: vec![ToolExchange {
                call: ToolCall {
                    id: "call_1".into(),
                    name: "search_cl".into(),
                    args: json!({ "term": "goblet cell" }),
                },
                result: json!([{ "id": "CL:0000160", "label": "goblet cell" }]),
            }],
        }
    }

    fn content_reply(content: &str) -> Value {
        json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }],
            "usage": { "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15 }
        })
    }

    #[test]
    fn config_from_lookup() {
        let config = ReasonerConfig::from_lookup(|key| match key {
            "OPENAI_API_KEY" => Some("sk-test".into()),
            "ONTOLINK_MODEL" => Some("gpt-4o-mini".into()),
            "OPENAI_BASE_URL" => Some("  ".into()),
            _ => None,
        });
        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn missing_key_not_configured() {
        let err = OpenAiReasoner::new(ReasonerConfig::default()).err().unwrap();
        assert!(matches!(err, ReasonerError::NotConfigured(_)));
    }

    #[test]
    fn fences_stripped() {
        assert_eq!(strip_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_fences(" {\"a\": 1} "), "{\"a\": 1}");
    }

    #[tokio::test]
    async fn final_answer_parsed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(json!({
                "model": DEFAULT_MODEL,
                "temperature": 0.0,
                "response_format": { "type": "json_object" },
                "tools": [{ "type": "function", "function": { "name": "search_cl" } }]
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(content_reply(r#"{"annotations": [{"text": "Colon goblet cells"}]}"#)),
            )
            .mount(&server)
            .await;

        let reply = reasoner(&server).respond(&request()).await.unwrap();
        assert_eq!(
            reply,
            ReasoningReply::Final(json!({ "annotations": [{ "text": "Colon goblet cells" }] }))
        );
    }

    #[test]
    fn transcript_becomes_tool_messages() {
        let messages = OpenAiReasoner::build_messages(&request());
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[2]["tool_calls"][0]["function"]["name"], "search_cl");
        assert_eq!(messages[3]["role"], "tool");
        assert_eq!(messages[3]["tool_call_id"], "call_1");
    }

    #[tokio::test]
    async fn tool_calls_mapped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": {
                        "role": "assistant",
                        "content": null,
                        "tool_calls": [{
                            "id": "call_2",
                            "type": "function",
                            "function": { "name": "search_cl", "arguments": "{\"term\": \"colon goblet cell\"}" }
                        }]
                    }
                }]
            })))
            .mount(&server)
            .await;

        let reply = reasoner(&server).respond(&request()).await.unwrap();
        assert_eq!(
            reply,
            ReasoningReply::ToolCalls(vec![ToolCall {
                id: "call_2".into(),
                name: "search_cl".into(),
                args: json!({ "term": "colon goblet cell" }),
            }])
        );
    }

    #[tokio::test]
    async fn non_json_content_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(content_reply("Sure! Here you go.")))
            .mount(&server)
            .await;

        let err = reasoner(&server).respond(&request()).await.unwrap_err();
        assert!(matches!(err, ReasonerError::MalformedOutput(_)));
    }

    #[tokio::test]
    async fn context_length_is_input_too_large() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": { "code": "context_length_exceeded", "message": "too long" }
            })))
            .mount(&server)
            .await;

        let err = reasoner(&server).respond(&request()).await.unwrap_err();
        assert!(matches!(err, ReasonerError::InputTooLarge(_)));
    }

    #[tokio::test]
    async fn server_error_surfaces_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = reasoner(&server).respond(&request()).await.unwrap_err();
        assert!(matches!(err, ReasonerError::Server { status: 503, .. }));
    }
}
