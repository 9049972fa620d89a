//! LLM integration for the coach
//!
//! Thin client for the Claude Messages API with tool use. The coach loop in
//! `coach.rs` drives the conversation; this module only speaks the wire format.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// ---------------------------------------------------------------------------
/// Configuration
/// ---------------------------------------------------------------------------

const CLAUDE_API_BASE: &str = "https://api.anthropic.com";
const CLAUDE_MODEL: &str = "claude-sonnet-4-20250514";
const API_VERSION: &str = "2023-06-01";

pub const API_KEY_VAR: &str = "ANTHROPIC_API_KEY";
pub const MODEL_VAR: &str = "COACH_MODEL";
pub const BASE_URL_VAR: &str = "ANTHROPIC_BASE_URL";

/// ---------------------------------------------------------------------------
/// Error Types
/// ---------------------------------------------------------------------------

#[derive(Error, Debug, Serialize)]
pub enum LlmError {
  #[error("API key not configured")]
  MissingApiKey,

  #[error("Request failed: {0}")]
  Request(String),

  #[error("API error: {0}")]
  Api(String),

  #[error("Parse error: {0}")]
  Parse(String),
}

/// ---------------------------------------------------------------------------
/// Claude API Types
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  User,
  Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
  Text {
    text: String,
  },
  ToolUse {
    id: String,
    name: String,
    #[serde(default)]
    input: Value,
  },
  ToolResult {
    tool_use_id: String,
    content: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    is_error: bool,
  },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
  pub role: Role,
  pub content: Vec<ContentBlock>,
}

impl Message {
  pub fn user_text(text: impl Into<String>) -> Self {
    Self {
      role: Role::User,
      content: vec![ContentBlock::Text { text: text.into() }],
    }
  }

  pub fn assistant_text(text: impl Into<String>) -> Self {
    Self {
      role: Role::Assistant,
      content: vec![ContentBlock::Text { text: text.into() }],
    }
  }
}

/// Tool advertised to the model; `input_schema` is a JSON Schema object
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
  pub name: String,
  pub description: String,
  pub input_schema: Value,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
  model: &'a str,
  max_tokens: u32,
  system: &'a str,
  messages: &'a [Message],
  #[serde(skip_serializing_if = "<[_]>::is_empty")]
  tools: &'a [ToolDefinition],
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessagesResponse {
  pub content: Vec<ContentBlock>,
  #[serde(default)]
  pub stop_reason: Option<String>,
  #[serde(default)]
  pub usage: Usage,
}

impl MessagesResponse {
  /// All text blocks joined with newlines
  pub fn text(&self) -> String {
    self
      .content
      .iter()
      .filter_map(|block| match block {
        ContentBlock::Text { text } => Some(text.as_str()),
        _ => None,
      })
      .collect::<Vec<_>>()
      .join("\n")
  }

  /// (id, name, input) for each tool call in order
  pub fn tool_calls(&self) -> Vec<(&str, &str, &Value)> {
    self
      .content
      .iter()
      .filter_map(|block| match block {
        ContentBlock::ToolUse { id, name, input } => Some((id.as_str(), name.as_str(), input)),
        _ => None,
      })
      .collect()
  }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Usage {
  pub input_tokens: u32,
  pub output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ClaudeErrorResponse {
  error: ClaudeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ClaudeErrorDetail {
  message: String,
}

/// ---------------------------------------------------------------------------
/// Claude Client
/// ---------------------------------------------------------------------------

pub struct ClaudeClient {
  client: Client,
  api_key: String,
  base_url: String,
  model: String,
}

impl ClaudeClient {
  pub fn new(api_key: impl Into<String>) -> Self {
    Self {
      client: Client::new(),
      api_key: api_key.into(),
      base_url: CLAUDE_API_BASE.to_string(),
      model: CLAUDE_MODEL.to_string(),
    }
  }

  /// Create a new Claude client, loading API key (and optional model) from environment
  pub fn from_env() -> Result<Self, LlmError> {
    let api_key = std::env::var(API_KEY_VAR)
      .ok()
      .filter(|k| !k.trim().is_empty())
      .ok_or(LlmError::MissingApiKey)?;

    let mut client = Self::new(api_key);
    if let Ok(model) = std::env::var(MODEL_VAR) {
      if !model.trim().is_empty() {
        client.model = model;
      }
    }
    if let Ok(base) = std::env::var(BASE_URL_VAR) {
      if !base.trim().is_empty() {
        client.base_url = base.trim_end_matches('/').to_string();
      }
    }
    Ok(client)
  }

  pub fn with_base_url(mut self, base_url: &str) -> Self {
    self.base_url = base_url.trim_end_matches('/').to_string();
    self
  }

  pub fn model(&self) -> &str {
    &self.model
  }

  /// One Messages API call
  pub async fn create_message(
    &self,
    system_prompt: &str,
    messages: &[Message],
    tools: &[ToolDefinition],
    max_tokens: u32,
  ) -> Result<MessagesResponse, LlmError> {
    let request = MessagesRequest {
      model: &self.model,
      max_tokens,
      system: system_prompt,
      messages,
      tools,
    };

    let response = self
      .client
      .post(format!("{}/v1/messages", self.base_url))
      .header("x-api-key", &self.api_key)
      .header("anthropic-version", API_VERSION)
      .header("content-type", "application/json")
      .json(&request)
      .send()
      .await
      .map_err(|e| LlmError::Request(e.to_string()))?;

    let status = response.status();
    let body = response
      .text()
      .await
      .map_err(|e| LlmError::Request(e.to_string()))?;

    if !status.is_success() {
      if let Ok(error_resp) = serde_json::from_str::<ClaudeErrorResponse>(&body) {
        return Err(LlmError::Api(error_resp.error.message));
      }
      return Err(LlmError::Api(format!("HTTP {}: {}", status, body)));
    }

    let parsed: MessagesResponse =
      serde_json::from_str(&body).map_err(|e| LlmError::Parse(e.to_string()))?;

    tracing::debug!(
      stop_reason = ?parsed.stop_reason,
      input_tokens = parsed.usage.input_tokens,
      output_tokens = parsed.usage.output_tokens,
      "Claude response"
    );

    Ok(parsed)
  }
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use serial_test::serial;

  #[test]
  fn test_content_blocks_wire_format() {
    let result = ContentBlock::ToolResult {
      tool_use_id: "toolu_1".into(),
      content: "ok".into(),
      is_error: false,
    };
    let value = serde_json::to_value(&result).unwrap();
    assert_eq!(value, json!({"type": "tool_result", "tool_use_id": "toolu_1", "content": "ok"}));

    let parsed: ContentBlock = serde_json::from_value(json!({
      "type": "tool_use", "id": "toolu_2", "name": "weekly_review", "input": {}
    }))
    .unwrap();
    assert!(matches!(parsed, ContentBlock::ToolUse { ref name, .. } if name == "weekly_review"));
  }

  #[test]
  #[serial]
  fn test_from_env_requires_key() {
    temp_env::with_vars([(API_KEY_VAR, None::<&str>)], || {
      assert!(matches!(ClaudeClient::from_env(), Err(LlmError::MissingApiKey)));
    });
    temp_env::with_vars(
      [(API_KEY_VAR, Some("sk-test")), (MODEL_VAR, Some("claude-test"))],
      || {
        let client = ClaudeClient::from_env().unwrap();
        assert_eq!(client.model(), "claude-test");
      },
    );
  }

  #[tokio::test]
  async fn test_create_message_parses_tool_use() {
    let mut server = mockito::Server::new_async().await;
    let m = server
      .mock("POST", "/v1/messages")
      .match_header("x-api-key", "sk-test")
      .match_header("anthropic-version", API_VERSION)
      .with_status(200)
      .with_body(
        json!({
          "content": [
            {"type": "text", "text": "Checking your log."},
            {"type": "tool_use", "id": "toolu_1", "name": "get_recent_workouts", "input": {"days_back": 7}}
          ],
          "stop_reason": "tool_use",
          "usage": {"input_tokens": 10, "output_tokens": 5}
        })
        .to_string(),
      )
      .create_async()
      .await;

    let client = ClaudeClient::new("sk-test").with_base_url(&server.url());
    let response = client
      .create_message("system", &[Message::user_text("hi")], &[], 256)
      .await
      .unwrap();

    assert_eq!(response.text(), "Checking your log.");
    let calls = response.tool_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1, "get_recent_workouts");
    assert_eq!(calls[0].2["days_back"], 7);
    m.assert_async().await;
  }

  #[tokio::test]
  async fn test_api_error_message_surfaced() {
    let mut server = mockito::Server::new_async().await;
    let _m = server
      .mock("POST", "/v1/messages")
      .with_status(529)
      .with_body(r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#)
      .create_async()
      .await;

    let client = ClaudeClient::new("sk-test").with_base_url(&server.url());
    let err = client
      .create_message("system", &[Message::user_text("hi")], &[], 256)
      .await
      .unwrap_err();
    assert!(matches!(err, LlmError::Api(ref m) if m == "Overloaded"));
  }
}
