//! Gemini API client
//!
//! Streams `streamGenerateContent` over SSE. The first meaningful chunk
//! decides the shape of the answer: a function call becomes a tool
//! selection, text becomes a text stream fed by a background task.
//! Uses a long-lived reqwest::Client for connection pooling.

use super::{LanguageModel, ModelRequest, ModelResponse, TextChunk, ToolDeclaration};
use crate::config::LlmConfig;
use crate::error::ChatError;
use crate::models::{HistoryEntry, Role, ToolCall};
use crate::Result;
use async_trait::async_trait;
use futures::{future, stream, Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Reusable Gemini client (connection-pooled)
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    /// Longest wait for the response head or for any single body chunk
    idle_timeout: Duration,
}

impl GeminiClient {
    pub fn new(config: &LlmConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .connect_timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            idle_timeout: timeout,
        })
    }

    // The key travels in a header so it never shows up in URLs or errors
    fn stream_url(&self) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model
        )
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn respond(&self, request: &ModelRequest) -> Result<ModelResponse> {
        if self.api_key.is_empty() {
            return Err(ChatError::LlmError(
                "GEMINI_API_KEY not configured".to_string(),
            ));
        }

        let body = build_request(request);

        info!(
            model = %self.model,
            history_len = request.history.len(),
            tools = request.tools.len(),
            "Calling Gemini API"
        );

        let send = self
            .client
            .post(self.stream_url())
            .header(API_KEY_HEADER, &self.api_key)
            .header("Accept", "text/event-stream")
            .json(&body)
            .send();

        let response = match timeout(self.idle_timeout, send).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                let e = e.without_url();
                error!("Gemini API request failed: {}", e);
                return Err(ChatError::LlmError(format!("Gemini API error: {}", e)));
            }
            Err(_) => {
                error!(timeout_ms = self.idle_timeout.as_millis() as u64, "Gemini API did not answer");
                return Err(ChatError::LlmError("Gemini API timed out".to_string()));
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!(status = %status, "Gemini API error response: {}", error_text);
            return Err(ChatError::LlmError(format!(
                "Gemini API error ({}): {}",
                status, error_text
            )));
        }

        let (tx, rx) = mpsc::channel::<Result<StreamEvent>>(64);
        let idle_timeout = self.idle_timeout;

        // Read the SSE byte stream and forward parsed events
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut decoder = SseDecoder::default();

            loop {
                let bytes = match timeout(idle_timeout, byte_stream.next()).await {
                    Ok(Some(Ok(bytes))) => bytes,
                    Ok(None) => break,
                    Ok(Some(Err(e))) => {
                        let message = format!("Gemini stream interrupted: {}", e.without_url());
                        let _ = tx.send(Err(ChatError::LlmError(message))).await;
                        return;
                    }
                    Err(_) => {
                        warn!("Gemini stream stalled");
                        let _ = tx
                            .send(Err(ChatError::LlmError("Gemini stream stalled".to_string())))
                            .await;
                        return;
                    }
                };

                for payload in decoder.push(&bytes) {
                    if !forward_payload(payload, &tx).await {
                        return;
                    }
                }
            }

            if let Some(payload) = decoder.finish() {
                forward_payload(payload, &tx).await;
            }
        });

        split_response(ReceiverStream::new(rx)).await
    }
}

/// Parse one SSE payload and forward its events. Returns false once the
/// receiver is gone.
async fn forward_payload(payload: Result<String>, tx: &mpsc::Sender<Result<StreamEvent>>) -> bool {
    let events = match payload.and_then(|payload| parse_payload(&payload)) {
        Ok(events) => events,
        Err(e) => vec![Err(e)],
    };

    for event in events {
        if tx.send(event).await.is_err() {
            return false;
        }
    }
    true
}

/// A decoded piece of a streamed Gemini answer
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum StreamEvent {
    Text(String),
    FunctionCall(ToolCall),
}

fn parse_payload(payload: &str) -> Result<Vec<Result<StreamEvent>>> {
    let response: GeminiResponse = serde_json::from_str(payload).map_err(|e| {
        error!("Failed to parse Gemini stream chunk: {}", e);
        ChatError::LlmError(format!("Gemini parse error: {}", e))
    })?;

    if let Some(err) = response.error {
        return Err(ChatError::LlmError(format!("Gemini API error: {}", err.message)));
    }

    let Some(candidate) = response.candidates.into_iter().next() else {
        return Ok(Vec::new());
    };

    if let Some(reason) = candidate.finish_reason.as_deref() {
        debug!(finish_reason = %reason, "Gemini candidate finished");
    }

    let parts = candidate.content.map(|c| c.parts).unwrap_or_default();

    Ok(parts
        .into_iter()
        .filter_map(|part| {
            if let Some(call) = part.function_call {
                Some(Ok(StreamEvent::FunctionCall(ToolCall {
                    name: call.name,
                    arguments: call.args,
                })))
            } else {
                part.text.map(|text| Ok(StreamEvent::Text(text)))
            }
        })
        .collect())
}

/// Decide between a tool selection and a text answer from the first
/// meaningful event, then hand the rest of the text over as a stream.
pub(crate) async fn split_response<S>(mut events: S) -> Result<ModelResponse>
where
    S: Stream<Item = Result<StreamEvent>> + Send + Unpin + 'static,
{
    loop {
        match events.next().await {
            None => {
                return Err(ChatError::LlmError(
                    "No response from Gemini API".to_string(),
                ))
            }
            Some(Err(e)) => return Err(e),
            Some(Ok(StreamEvent::FunctionCall(call))) => {
                info!(tool_name = %call.name, "Gemini selected a tool");
                return Ok(ModelResponse::ToolCall(call));
            }
            Some(Ok(StreamEvent::Text(text))) if text.is_empty() => continue,
            Some(Ok(StreamEvent::Text(text))) => {
                let head = stream::once(future::ready(Ok(TextChunk::Delta(text))));
                let rest = events.filter_map(|event| {
                    future::ready(match event {
                        Ok(StreamEvent::Text(text)) => Some(Ok(TextChunk::Delta(text))),
                        Ok(StreamEvent::FunctionCall(call)) => {
                            warn!(tool_name = %call.name, "Ignoring tool call after text started");
                            None
                        }
                        Err(e) => Some(Err(e)),
                    })
                });
                let done = stream::once(future::ready(Ok(TextChunk::Done)));

                return Ok(ModelResponse::Text(head.chain(rest).chain(done).boxed()));
            }
        }
    }
}

/// Incremental `data:` line extractor for a server-sent event stream.
///
/// Network chunks can end in the middle of a multi-byte character, so
/// bytes are buffered and only complete lines are decoded.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<Result<String>> {
        self.buffer.extend_from_slice(bytes);

        let mut payloads = Vec::new();
        while let Some(line_end) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=line_end).collect();
            if let Some(payload) = decode_line(&line[..line_end]) {
                payloads.push(payload);
            }
        }
        payloads
    }

    /// Flush a trailing line that never got its newline
    pub(crate) fn finish(&mut self) -> Option<Result<String>> {
        let line = std::mem::take(&mut self.buffer);
        decode_line(&line)
    }
}

fn decode_line(line: &[u8]) -> Option<Result<String>> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    match std::str::from_utf8(line) {
        Ok(text) => data_payload(text).map(Ok),
        Err(e) => Some(Err(ChatError::LlmError(format!(
            "Gemini stream is not valid UTF-8: {}",
            e
        )))),
    }
}

fn data_payload(line: &str) -> Option<String> {
    let data = line.strip_prefix("data:")?.trim();
    if data.is_empty() || data == "[DONE]" {
        None
    } else {
        Some(data.to_string())
    }
}

fn build_request(request: &ModelRequest) -> GeminiRequest {
    let contents = request.history.iter().map(history_content).collect();

    let tools = if request.tools.is_empty() {
        Vec::new()
    } else {
        vec![ToolSet {
            function_declarations: request.tools.iter().map(function_declaration).collect(),
        }]
    };

    GeminiRequest {
        contents,
        generation_config: GenerationConfig {
            temperature: 0.3,
            top_p: 0.9,
            top_k: 40,
            max_output_tokens: 1024,
        },
        system_instruction: SystemInstruction {
            parts: vec![Part::text(request.system_prompt.clone())],
        },
        tools,
    }
}

fn history_content(entry: &HistoryEntry) -> Content {
    let role = match entry.role {
        Role::User => "user",
        Role::Assistant => "model",
    };

    Content {
        role: Some(role.to_string()),
        parts: vec![Part::text(entry.content.clone())],
    }
}

fn function_declaration(tool: &ToolDeclaration) -> FunctionDeclaration {
    FunctionDeclaration {
        name: tool.name.clone(),
        description: tool.description.clone(),
        parameters: gemini_schema(&tool.parameters),
    }
}

/// Gemini's schema dialect spells types in upper case (`OBJECT`, `STRING`)
fn gemini_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| {
                    let converted = match (key.as_str(), value) {
                        ("type", Value::String(kind)) => Value::String(kind.to_uppercase()),
                        _ => gemini_schema(value),
                    };
                    (key.clone(), converted)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(gemini_schema).collect()),
        other => other.clone(),
    }
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    system_instruction: SystemInstruction,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolSet>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
}

impl Part {
    fn text(text: String) -> Self {
        Self {
            text: Some(text),
            function_call: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: i32,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct ToolSet {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct FunctionDeclaration {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    error: Option<GeminiErrorBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    #[serde(default)]
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::SYSTEM_PROMPT;
    use serde_json::json;

    fn text_event(text: &str) -> Result<StreamEvent> {
        Ok(StreamEvent::Text(text.to_string()))
    }

    #[test]
    fn test_request_serialization() {
        let request = ModelRequest {
            system_prompt: SYSTEM_PROMPT.to_string(),
            history: vec![
                HistoryEntry::user("hi"),
                HistoryEntry::assistant("Hello!"),
                HistoryEntry::user("What is the price of bitcoin?"),
            ],
            tools: vec![ToolDeclaration {
                name: "showCryptoDetail".to_string(),
                description: "Look up one coin".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": { "query": { "type": "string", "description": "name" } },
                    "required": ["query"]
                }),
            }],
        };

        let json = serde_json::to_value(build_request(&request)).unwrap();
        assert_eq!(json["contents"].as_array().unwrap().len(), 3);
        assert_eq!(json["contents"][1]["role"], "model");
        assert_eq!(json["contents"][2]["parts"][0]["text"], "What is the price of bitcoin?");
        assert!(json["system_instruction"]["parts"][0]["text"]
            .as_str()
            .unwrap()
            .contains("listTopCryptos"));

        let declaration = &json["tools"][0]["function_declarations"][0];
        assert_eq!(declaration["name"], "showCryptoDetail");
        assert_eq!(declaration["parameters"]["type"], "OBJECT");
        assert_eq!(declaration["parameters"]["properties"]["query"]["type"], "STRING");
        assert_eq!(declaration["parameters"]["required"][0], "query");
    }

    fn decoded(payloads: Vec<Result<String>>) -> Vec<String> {
        payloads.into_iter().map(|p| p.unwrap()).collect()
    }

    #[test]
    fn test_sse_decoder_handles_split_lines() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: {\"a\":").is_empty());
        let payloads = decoded(decoder.push(b"1}\r\n\r\ndata: {\"b\":2}\n\n: comment\n"));
        assert_eq!(payloads, vec!["{\"a\":1}".to_string(), "{\"b\":2}".to_string()]);

        assert!(decoder.push(b"data: {\"c\":3}").is_empty());
        assert_eq!(decoder.finish().unwrap().unwrap(), "{\"c\":3}");
    }

    #[test]
    fn test_sse_decoder_keeps_character_split_across_chunks() {
        let line = "data: {\"t\":\"precio: 1€\"}\n".as_bytes();
        let euro_start = line.iter().position(|b| *b == 0xE2).unwrap();

        let mut decoder = SseDecoder::default();
        assert!(decoder.push(&line[..euro_start + 1]).is_empty());
        let payloads = decoded(decoder.push(&line[euro_start + 1..]));

        assert_eq!(payloads, vec!["{\"t\":\"precio: 1€\"}".to_string()]);
    }

    #[test]
    fn test_sse_decoder_reports_invalid_utf8() {
        let mut decoder = SseDecoder::default();
        let payloads = decoder.push(b"data: \xff\xfe\n");
        assert_eq!(payloads.len(), 1);
        assert!(matches!(&payloads[0], Err(ChatError::LlmError(m)) if m.contains("UTF-8")));
    }

    #[test]
    fn test_parse_payload_text_and_function_call() {
        let events = parse_payload(
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Hel"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_ref().unwrap(), &StreamEvent::Text("Hel".into()));

        let events = parse_payload(
            r#"{"candidates":[{"content":{"parts":[{"functionCall":{"name":"listTopCryptos","args":{"currency":"usd"}}}]},"finishReason":"STOP"}]}"#,
        )
        .unwrap();
        match events[0].as_ref().unwrap() {
            StreamEvent::FunctionCall(call) => {
                assert_eq!(call.name, "listTopCryptos");
                assert_eq!(call.arguments["currency"], "usd");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_parse_payload_error_body() {
        let result = parse_payload(r#"{"error":{"code":429,"message":"quota"}}"#);
        assert!(matches!(result, Err(ChatError::LlmError(m)) if m.contains("quota")));
    }

    #[tokio::test]
    async fn test_split_text_stream_ends_with_done() {
        let events = stream::iter(vec![text_event(""), text_event("Hel"), text_event("lo")]);
        let response = split_response(events).await.unwrap();

        let ModelResponse::Text(chunks) = response else {
            panic!("expected text");
        };
        let chunks: Vec<TextChunk> = chunks.map(|c| c.unwrap()).collect().await;
        assert_eq!(
            chunks,
            vec![
                TextChunk::Delta("Hel".into()),
                TextChunk::Delta("lo".into()),
                TextChunk::Done
            ]
        );
    }

    #[tokio::test]
    async fn test_split_function_call_first() {
        let events = stream::iter(vec![Ok(StreamEvent::FunctionCall(ToolCall {
            name: "showCryptoDetail".into(),
            arguments: json!({ "query": "bitcoin" }),
        }))]);

        match split_response(events).await.unwrap() {
            ModelResponse::ToolCall(call) => assert_eq!(call.name, "showCryptoDetail"),
            other => panic!("expected tool call, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_split_empty_stream_is_error() {
        let events = stream::iter(Vec::<Result<StreamEvent>>::new());
        assert!(matches!(split_response(events).await, Err(ChatError::LlmError(_))));
    }

    async fn serve(router: axum::Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/v1beta", addr)
    }

    fn client_for(base_url: String, timeout: Duration) -> GeminiClient {
        let config = LlmConfig {
            api_key: "secret-key".to_string(),
            model: "gemini-test".to_string(),
            base_url,
        };
        GeminiClient::new(&config, timeout).unwrap()
    }

    fn hello_request() -> ModelRequest {
        ModelRequest {
            system_prompt: SYSTEM_PROMPT.to_string(),
            history: vec![HistoryEntry::user("hola")],
            tools: vec![],
        }
    }

    const TEXT_CHUNK: &str =
        "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hola €\"}]}}]}\n\n";

    #[tokio::test]
    async fn test_api_key_sent_as_header_not_query() {
        let router = axum::Router::new().fallback(
            |headers: axum::http::HeaderMap, uri: axum::http::Uri| async move {
                let key = headers
                    .get(API_KEY_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                let query = uri.query().unwrap_or_default().to_string();
                if key == "secret-key" && !query.contains("key=") {
                    (axum::http::StatusCode::OK, TEXT_CHUNK.to_string())
                } else {
                    (axum::http::StatusCode::FORBIDDEN, format!("key={} query={}", key, query))
                }
            },
        );
        let client = client_for(serve(router).await, Duration::from_secs(5));

        let ModelResponse::Text(chunks) = client.respond(&hello_request()).await.unwrap() else {
            panic!("expected text");
        };
        let chunks: Vec<TextChunk> = chunks.map(|c| c.unwrap()).collect().await;
        assert_eq!(chunks, vec![TextChunk::Delta("Hola €".into()), TextChunk::Done]);
    }

    #[tokio::test]
    async fn test_error_text_does_not_carry_api_key() {
        // Nothing listens on port 9, so the request itself fails
        let client = client_for("http://127.0.0.1:9/v1beta".to_string(), Duration::from_secs(2));

        let error_msg = client.respond(&hello_request()).await.unwrap_err().to_string();
        assert!(!error_msg.contains("secret-key"));
    }

    #[tokio::test]
    async fn test_stalled_stream_fails_after_idle_timeout() {
        let router = axum::Router::new().fallback(|| async {
            let first = stream::once(future::ready(Ok::<_, std::convert::Infallible>(
                TEXT_CHUNK.to_string(),
            )));
            axum::body::Body::from_stream(first.chain(stream::pending()))
        });
        let client = client_for(serve(router).await, Duration::from_millis(300));

        let ModelResponse::Text(chunks) = client.respond(&hello_request()).await.unwrap() else {
            panic!("expected text");
        };
        let chunks: Vec<Result<TextChunk>> = chunks.collect().await;

        assert_eq!(chunks[0].as_ref().unwrap(), &TextChunk::Delta("Hola €".into()));
        assert!(chunks
            .iter()
            .any(|c| matches!(c, Err(ChatError::LlmError(m)) if m.contains("stalled"))));
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let config = LlmConfig {
            api_key: String::new(),
            model: "gemini-2.0-flash".to_string(),
            base_url: "http://127.0.0.1:9".to_string(),
        };
        let client = GeminiClient::new(&config, Duration::from_secs(1)).unwrap();
        let request = ModelRequest {
            system_prompt: SYSTEM_PROMPT.to_string(),
            history: vec![HistoryEntry::user("hi")],
            tools: vec![],
        };

        let error_msg = client.respond(&request).await.unwrap_err().to_string();
        assert!(error_msg.to_lowercase().contains("not configured"));
    }
}
