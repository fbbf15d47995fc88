//! Anthropic Messages API gateway.
//!
//! Features:
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System prompt as top-level field
//! - Native tool use with `tool_use` / `tool_result` content blocks
//! - Streaming via SSE, decoded into [`Segment`]s

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tollgate_config::AppConfig;
use tollgate_core::error::GatewayError;
use tollgate_core::gateway::{GatewayRequest, ModelGateway, Segment, SegmentStream, ToolSchema, Usage};
use tollgate_core::message::{Message, Role};
use tracing::{debug, trace, warn};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Streaming gateway over Anthropic's native Messages API.
pub struct AnthropicGateway {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicGateway {
    pub fn new(api_key: impl Into<String>) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| GatewayError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            name: "anthropic".into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            client,
        })
    }

    /// Build from application config. Fails if no API key is available.
    pub fn from_config(config: &AppConfig) -> Result<Self, GatewayError> {
        let key = config.api_key.clone().ok_or_else(|| {
            GatewayError::NotConfigured(
                "no API key; set TOLLGATE_API_KEY or ANTHROPIC_API_KEY".into(),
            )
        })?;
        Ok(Self::new(key)?.with_base_url(&config.api_url))
    }

    /// Use a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Convert history to Anthropic content-block messages.
    ///
    /// Consecutive tool results are grouped into one user message, which is
    /// what the API expects after an assistant turn with several `tool_use`
    /// blocks.
    fn to_api_messages(messages: &[Message]) -> Vec<AnthropicMessage> {
        let mut result: Vec<AnthropicMessage> = Vec::new();

        for msg in messages {
            match msg.role {
                Role::User => {
                    result.push(AnthropicMessage {
                        role: "user".into(),
                        content: AnthropicContent::Text(msg.content.clone()),
                    });
                }
                Role::Assistant => {
                    if msg.tool_calls.is_empty() {
                        // The API rejects empty text blocks.
                        if msg.content.is_empty() {
                            continue;
                        }
                        result.push(AnthropicMessage {
                            role: "assistant".into(),
                            content: AnthropicContent::Text(msg.content.clone()),
                        });
                    } else {
                        let mut blocks: Vec<ContentBlock> = Vec::new();
                        if !msg.content.is_empty() {
                            blocks.push(ContentBlock::Text {
                                text: msg.content.clone(),
                            });
                        }
                        for tc in &msg.tool_calls {
                            blocks.push(ContentBlock::ToolUse {
                                id: tc.id.clone(),
                                name: tc.name.clone(),
                                input: tc.arguments.clone(),
                            });
                        }
                        result.push(AnthropicMessage {
                            role: "assistant".into(),
                            content: AnthropicContent::Blocks(blocks),
                        });
                    }
                }
                Role::Tool => {
                    let block = ContentBlock::ToolResult {
                        tool_use_id: msg.tool_call_id.clone().unwrap_or_default(),
                        content: msg.content.clone(),
                        is_error: msg.is_error,
                    };
                    let follows_results = matches!(
                        result.last(),
                        Some(AnthropicMessage {
                            role,
                            content: AnthropicContent::Blocks(blocks),
                        }) if role == "user"
                            && blocks
                                .iter()
                                .all(|b| matches!(b, ContentBlock::ToolResult { .. }))
                    );
                    match result.last_mut() {
                        Some(AnthropicMessage {
                            content: AnthropicContent::Blocks(blocks),
                            ..
                        }) if follows_results => blocks.push(block),
                        _ => result.push(AnthropicMessage {
                            role: "user".into(),
                            content: AnthropicContent::Blocks(vec![block]),
                        }),
                    }
                }
            }
        }

        result
    }

    fn to_api_tools(tools: &[ToolSchema]) -> Vec<AnthropicTool> {
        tools
            .iter()
            .map(|t| AnthropicTool {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.parameters.clone(),
            })
            .collect()
    }

    fn request_body(request: &GatewayRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "stream": true,
        });

        if !request.system_prompt.is_empty() {
            body["system"] = serde_json::json!(request.system_prompt);
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        body
    }
}

#[async_trait]
impl ModelGateway for AnthropicGateway {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, request: GatewayRequest) -> Result<SegmentStream, GatewayError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = Self::request_body(&request);

        debug!(
            gateway = "anthropic",
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Sending streaming request"
        );

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout(e.to_string())
                } else {
                    GatewayError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();

        if status == 429 {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(5);
            return Err(GatewayError::RateLimited { retry_after_secs });
        }
        if status == 401 || status == 403 {
            return Err(GatewayError::AuthenticationFailed(
                "Invalid Anthropic API key".into(),
            ));
        }
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Anthropic API error");
            return Err(GatewayError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let (tx, rx) = mpsc::channel(64);

        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut decoder = SseDecoder::default();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(GatewayError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                let segments = match decoder.push_bytes(&bytes) {
                    Ok(segments) => segments,
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                };

                for segment in segments {
                    // Receiver gone: the loop aborted this call.
                    if tx.send(Ok(segment)).await.is_err() {
                        return;
                    }
                }
                if decoder.is_finished() {
                    return;
                }
            }

            if let Err(e) = decoder.finish() {
                warn!(error = %e, "Anthropic stream truncated");
                let _ = tx.send(Err(e)).await;
            }
        });

        Ok(rx)
    }
}

/// Incremental decoder for the Messages API event stream.
#[derive(Default)]
struct SseDecoder {
    /// Trailing bytes of an incomplete UTF-8 sequence
    pending: Vec<u8>,
    buffer: String,
    tool: Option<PendingToolUse>,
    usage: Usage,
    finished: bool,
}

struct PendingToolUse {
    id: String,
    name: String,
    partial_json: String,
}

impl PendingToolUse {
    fn into_segment(self) -> Segment {
        let arguments = if self.partial_json.trim().is_empty() {
            serde_json::json!({})
        } else {
            serde_json::from_str(&self.partial_json).unwrap_or_else(|e| {
                warn!(tool = %self.name, error = %e, "Tool input is not valid JSON");
                serde_json::Value::String(self.partial_json.clone())
            })
        };
        Segment::invocation(self.id, self.name, arguments)
    }
}

impl SseDecoder {
    fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feed raw bytes; a multi-byte character split across chunks is held back.
    fn push_bytes(&mut self, bytes: &[u8]) -> Result<Vec<Segment>, GatewayError> {
        self.pending.extend_from_slice(bytes);
        let mut text = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(s) => {
                    text.push_str(s);
                    self.pending.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    text.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        // Invalid bytes can never complete: replace them and move on.
                        Some(bad) => {
                            warn!(bytes = bad, "Replacing invalid UTF-8 in Anthropic stream");
                            text.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + bad);
                        }
                        // Incomplete sequence: keep it for the next chunk.
                        None => {
                            self.pending.drain(..valid);
                            break;
                        }
                    }
                }
            }
        }
        self.push(&text)
    }

    /// Feed raw stream text; returns the segments completed by it.
    fn push(&mut self, chunk: &str) -> Result<Vec<Segment>, GatewayError> {
        self.buffer.push_str(chunk);
        let mut out = Vec::new();

        while let Some(line_end) = self.buffer.find('\n') {
            let line = self.buffer[..line_end].trim_end_matches('\r').to_string();
            self.buffer.drain(..=line_end);

            if self.finished {
                continue;
            }
            // Event names are repeated in the payload's `type`.
            if line.is_empty() || line.starts_with(':') || line.starts_with("event:") {
                continue;
            }
            if let Some(data) = line.strip_prefix("data:") {
                self.handle_data(data.trim(), &mut out)?;
            }
        }

        Ok(out)
    }

    /// Check the stream at end of body. A successful response always ends
    /// with `message_stop`; anything else was cut short.
    fn finish(&mut self) -> Result<(), GatewayError> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.tool = None;
        Err(GatewayError::StreamInterrupted(
            "response ended before message_stop".into(),
        ))
    }

    fn done(&self) -> Segment {
        Segment::Done {
            usage: Some(self.usage),
        }
    }

    fn handle_data(&mut self, data: &str, out: &mut Vec<Segment>) -> Result<(), GatewayError> {
        if data.is_empty() {
            return Ok(());
        }

        let event: serde_json::Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => {
                trace!(error = %e, data = %data, "Ignoring unparseable Anthropic SSE");
                return Ok(());
            }
        };

        match event["type"].as_str().unwrap_or("") {
            "message_start" => {
                if let Some(input) = event["message"]["usage"]["input_tokens"].as_u64() {
                    self.usage.prompt_tokens = u32::try_from(input).unwrap_or(u32::MAX);
                    self.usage.total_tokens =
                        self.usage.prompt_tokens.saturating_add(self.usage.completion_tokens);
                }
            }
            "content_block_start" => {
                let block = &event["content_block"];
                if block["type"].as_str() == Some("tool_use") {
                    if let Some(previous) = self.tool.take() {
                        out.push(previous.into_segment());
                    }
                    self.tool = Some(PendingToolUse {
                        id: block["id"].as_str().unwrap_or("").to_string(),
                        name: block["name"].as_str().unwrap_or("").to_string(),
                        partial_json: String::new(),
                    });
                }
            }
            "content_block_delta" => {
                let delta = &event["delta"];
                match delta["type"].as_str().unwrap_or("") {
                    "text_delta" => {
                        if let Some(text) = delta["text"].as_str() {
                            if !text.is_empty() {
                                out.push(Segment::text(text));
                            }
                        }
                    }
                    "input_json_delta" => {
                        if let (Some(tool), Some(partial)) =
                            (self.tool.as_mut(), delta["partial_json"].as_str())
                        {
                            tool.partial_json.push_str(partial);
                        }
                    }
                    _ => {}
                }
            }
            "content_block_stop" => {
                if let Some(tool) = self.tool.take() {
                    out.push(tool.into_segment());
                }
            }
            "message_delta" => {
                if let Some(output) = event["usage"]["output_tokens"].as_u64() {
                    self.usage.completion_tokens = u32::try_from(output).unwrap_or(u32::MAX);
                    self.usage.total_tokens =
                        self.usage.prompt_tokens.saturating_add(self.usage.completion_tokens);
                }
            }
            "message_stop" => {
                if let Some(tool) = self.tool.take() {
                    out.push(tool.into_segment());
                }
                out.push(self.done());
                self.finished = true;
            }
            "error" => {
                let message = event["error"]["message"]
                    .as_str()
                    .unwrap_or("unknown stream error")
                    .to_string();
                return Err(match event["error"]["type"].as_str() {
                    Some("overloaded_error") | Some("rate_limit_error") => {
                        GatewayError::RateLimited { retry_after_secs: 5 }
                    }
                    _ => GatewayError::StreamInterrupted(message),
                });
            }
            _ => {}
        }
        Ok(())
    }
}

// --- Anthropic API types ---

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicMessage {
    role: String,
    content: AnthropicContent,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum AnthropicContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tollgate_core::message::MessageToolCall;
    use tollgate_core::tool::ToolResult;

    #[test]
    fn constructor_with_base_url() {
        let gateway = AnthropicGateway::new("sk-ant-test")
            .unwrap()
            .with_base_url("https://custom.proxy.com/");
        assert_eq!(gateway.name(), "anthropic");
        assert_eq!(gateway.base_url, "https://custom.proxy.com");
    }

    #[test]
    fn from_config_requires_key() {
        let config = AppConfig::default();
        assert!(matches!(
            AnthropicGateway::from_config(&config),
            Err(GatewayError::NotConfigured(_))
        ));

        let config = AppConfig {
            api_key: Some("sk-ant-test".into()),
            ..AppConfig::default()
        };
        let gateway = AnthropicGateway::from_config(&config).unwrap();
        assert_eq!(gateway.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn message_conversion_with_tool_calls() {
        let msg = Message::assistant_with_calls(
            "Let me look",
            vec![MessageToolCall {
                id: "toolu_123".into(),
                name: "read_file".into(),
                arguments: serde_json::json!({"path": "notes.txt"}),
            }],
        );

        let api_msgs = AnthropicGateway::to_api_messages(&[msg]);
        assert_eq!(api_msgs.len(), 1);
        assert_eq!(api_msgs[0].role, "assistant");

        match &api_msgs[0].content {
            AnthropicContent::Blocks(blocks) => {
                assert_eq!(blocks.len(), 2);
                match &blocks[1] {
                    ContentBlock::ToolUse { id, input, .. } => {
                        assert_eq!(id, "toolu_123");
                        assert_eq!(input["path"], "notes.txt");
                    }
                    _ => panic!("Expected tool_use block"),
                }
            }
            _ => panic!("Expected blocks content"),
        }
    }

    #[test]
    fn consecutive_tool_results_are_grouped() {
        let messages = vec![
            Message::user("go"),
            Message::tool_result("a", &ToolResult::ok(serde_json::json!({"ok": true}))),
            Message::tool_result("b", &ToolResult::failure("denied")),
        ];
        let api_msgs = AnthropicGateway::to_api_messages(&messages);
        assert_eq!(api_msgs.len(), 2);
        assert_eq!(api_msgs[1].role, "user");

        let json = serde_json::to_value(&api_msgs[1]).unwrap();
        let blocks = json["content"].as_array().unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0]["tool_use_id"], "a");
        assert!(blocks[0].get("is_error").is_none());
        assert_eq!(blocks[1]["tool_use_id"], "b");
        assert_eq!(blocks[1]["is_error"], true);
        assert_eq!(blocks[1]["content"], r#"{"error":"denied"}"#);
    }

    #[test]
    fn empty_assistant_text_is_skipped() {
        let messages = vec![
            Message::user("delete it"),
            Message::assistant(""),
            Message::user("never mind"),
        ];
        let api_msgs = AnthropicGateway::to_api_messages(&messages);
        assert_eq!(api_msgs.len(), 2);
        assert!(api_msgs.iter().all(|m| m.role == "user"));
    }

    #[test]
    fn request_body_shape() {
        let request = GatewayRequest {
            model: "claude-sonnet-4-5".into(),
            system_prompt: "Be brief".into(),
            messages: vec![Message::user("hi")],
            tools: vec![ToolSchema {
                name: "get_current_datetime".into(),
                description: "Now".into(),
                parameters: serde_json::json!({"type": "object", "properties": {}}),
            }],
            max_tokens: None,
        };
        let body = AnthropicGateway::request_body(&request);
        assert_eq!(body["system"], "Be brief");
        assert_eq!(body["stream"], true);
        assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);
        assert_eq!(body["tools"][0]["input_schema"]["type"], "object");
    }

    const TOOL_STREAM: &str = concat!(
        "event: message_start\n",
        "data: {\"type\":\"message_start\",\"message\":{\"usage\":{\"input_tokens\":12}}}\n\n",
        "event: content_block_start\n",
        "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n",
        "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Deleting \"}}\n\n",
        "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"now.\"}}\n\n",
        "data: {\"type\":\"content_block_stop\",\"index\":0}\n\n",
        "data: {\"type\":\"content_block_start\",\"index\":1,\"content_block\":{\"type\":\"tool_use\",\"id\":\"toolu_1\",\"name\":\"delete_file\",\"input\":{}}}\n\n",
        "data: {\"type\":\"content_block_delta\",\"index\":1,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"{\\\"path\\\": \"}}\n\n",
        "data: {\"type\":\"content_block_delta\",\"index\":1,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"\\\"a.txt\\\"}\"}}\n\n",
        "data: {\"type\":\"content_block_stop\",\"index\":1}\n\n",
        "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"tool_use\"},\"usage\":{\"output_tokens\":30}}\n\n",
        "event: message_stop\n",
        "data: {\"type\":\"message_stop\"}\n\n",
    );

    #[test]
    fn decodes_text_and_tool_use_in_order() {
        let mut decoder = SseDecoder::default();
        let segments = decoder.push(TOOL_STREAM).unwrap();
        assert!(decoder.is_finished());
        assert_eq!(
            segments,
            vec![
                Segment::text("Deleting "),
                Segment::text("now."),
                Segment::invocation("toolu_1", "delete_file", serde_json::json!({"path": "a.txt"})),
                Segment::Done {
                    usage: Some(Usage {
                        prompt_tokens: 12,
                        completion_tokens: 30,
                        total_tokens: 42,
                    })
                },
            ]
        );
        assert!(decoder.finish().is_ok());
    }

    #[test]
    fn decodes_across_arbitrary_chunk_boundaries() {
        let mut decoder = SseDecoder::default();
        let mut segments = Vec::new();
        for chunk in TOOL_STREAM.as_bytes().chunks(7) {
            segments.extend(decoder.push(std::str::from_utf8(chunk).unwrap()).unwrap());
        }
        assert_eq!(segments.len(), 4);
        assert!(matches!(segments.last(), Some(Segment::Done { .. })));
    }

    #[test]
    fn multibyte_text_split_across_chunks() {
        let line = "data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"caf\u{e9}\"}}\n";
        let bytes = line.as_bytes();
        let split = line.find('\u{e9}').unwrap() + 1;
        let mut decoder = SseDecoder::default();
        assert!(decoder.push_bytes(&bytes[..split]).unwrap().is_empty());
        let segments = decoder.push_bytes(&bytes[split..]).unwrap();
        assert_eq!(segments, vec![Segment::text("caf\u{e9}")]);
    }

    #[test]
    fn tool_use_without_input_gets_empty_object() {
        let mut decoder = SseDecoder::default();
        let segments = decoder
            .push(concat!(
                "data: {\"type\":\"content_block_start\",\"content_block\":{\"type\":\"tool_use\",\"id\":\"t\",\"name\":\"get_current_datetime\"}}\n",
                "data: {\"type\":\"content_block_stop\"}\n",
            ))
            .unwrap();
        assert_eq!(
            segments,
            vec![Segment::invocation("t", "get_current_datetime", serde_json::json!({}))]
        );
    }

    #[test]
    fn body_ending_before_message_stop_is_interrupted() {
        let mut decoder = SseDecoder::default();
        let segments = decoder
            .push("data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"Half an ans\"}}\n")
            .unwrap();
        assert_eq!(segments, vec![Segment::text("Half an ans")]);
        let err = decoder.finish().unwrap_err();
        assert!(matches!(err, GatewayError::StreamInterrupted(_)));
        assert!(decoder.finish().is_ok());
    }

    #[test]
    fn invalid_utf8_is_replaced_and_decoding_continues() {
        let mut decoder = SseDecoder::default();
        let mut bad = b": keep-alive \xFF\n".to_vec();
        bad.extend_from_slice(b"data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"a\xFFb\"}}\n");
        let segments = decoder.push_bytes(&bad).unwrap();
        assert_eq!(segments, vec![Segment::text("a\u{fffd}b")]);
        assert!(decoder.pending.is_empty());

        let segments = decoder
            .push_bytes(b"data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"after\"}}\n")
            .unwrap();
        assert_eq!(segments, vec![Segment::text("after")]);
    }

    #[test]
    fn oversized_token_counts_saturate() {
        let mut decoder = SseDecoder::default();
        decoder
            .push(concat!(
                "data: {\"type\":\"message_start\",\"message\":{\"usage\":{\"input_tokens\":5000000000}}}\n",
                "data: {\"type\":\"message_delta\",\"usage\":{\"output_tokens\":7}}\n",
            ))
            .unwrap();
        assert_eq!(decoder.usage.prompt_tokens, u32::MAX);
        assert_eq!(decoder.usage.total_tokens, u32::MAX);
    }

    #[test]
    fn error_event_aborts_stream() {
        let mut decoder = SseDecoder::default();
        let err = decoder
            .push("data: {\"type\":\"error\",\"error\":{\"type\":\"api_error\",\"message\":\"boom\"}}\n")
            .unwrap_err();
        assert!(matches!(err, GatewayError::StreamInterrupted(m) if m == "boom"));
    }
}
