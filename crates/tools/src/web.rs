//! `fetch_url`: HTTP GET with a bounded body.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tollgate_core::error::ToolError;
use tollgate_core::tool::{HandlerResult, Tool, ToolContext, ToolResult};
use tracing::debug;

/// Default cap on returned body text, in bytes.
pub const DEFAULT_MAX_BODY_BYTES: usize = 20_000;

pub struct FetchUrlTool {
    client: reqwest::Client,
    max_body_bytes: usize,
}

impl FetchUrlTool {
    pub fn new() -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("tollgate/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "fetch_url".into(),
                reason: format!("cannot build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        })
    }

    pub fn with_max_body_bytes(mut self, max: usize) -> Self {
        self.max_body_bytes = max.max(1);
        self
    }

    fn failed(&self, reason: impl Into<String>) -> ToolError {
        ToolError::ExecutionFailed {
            tool_name: self.name().to_string(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Tool for FetchUrlTool {
    fn name(&self) -> &str {
        "fetch_url"
    }

    fn description(&self) -> &str {
        "Fetch a web page or API response with an HTTP GET request. Returns the status, \
         content type, and the (possibly truncated) body text."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "description": "http:// or https:// URL" }
            },
            "required": ["url"],
            "additionalProperties": false
        })
    }

    fn category(&self) -> &str {
        "web"
    }

    async fn execute(&self, arguments: Value, _context: Option<ToolContext>) -> HandlerResult {
        let url = arguments["url"].as_str().unwrap_or_default().trim();
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ToolError::InvalidArguments {
                tool_name: self.name().to_string(),
                reason: "URL must start with http:// or https://".into(),
            });
        }

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.failed(format!("request failed: {e}")))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let mut body: Vec<u8> = Vec::new();
        let mut truncated = false;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| self.failed(format!("reading body failed: {e}")))?
        {
            let room = self.max_body_bytes - body.len();
            if chunk.len() > room {
                body.extend_from_slice(&chunk[..room]);
                truncated = true;
                break;
            }
            body.extend_from_slice(&chunk);
        }

        debug!(url, status = status.as_u16(), bytes = body.len(), truncated, "Fetched URL");

        if !status.is_success() {
            return Err(self.failed(format!("HTTP {}", status.as_u16())));
        }

        Ok(ToolResult::ok(json!({
            "url": url,
            "status": status.as_u16(),
            "content_type": content_type,
            "body": String::from_utf8_lossy(&body),
            "truncated": truncated,
        })))
    }
}
