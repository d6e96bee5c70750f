//! Minimal OpenAI-compatible chat client for worksheet generation.
//!
//! We only call chat.completions and ask for a JSON object, then run the
//! reply through `parse_ai_json` since models still wrap JSON in fences.
//! Calls are instrumented and log model names, latencies and reply sizes (not contents).
//!
//! NOTE: We never log the API key or the prompts.

use std::time::{Duration, Instant};

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, instrument};

use crate::util::parse_ai_json;

#[derive(Debug, Error)]
pub enum LlmError {
  #[error("request failed: {0}")]
  Http(#[from] reqwest::Error),
  #[error("AI HTTP {status}: {message}")]
  Status { status: u16, message: String },
  #[error("model reply is not JSON")]
  Parse,
  #[error("model returned an empty reply")]
  EmptyReply,
}

#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub model: String,
}

impl OpenAI {
  /// Construct the client if we find OPENAI_API_KEY; otherwise return None.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty())?;
    let base_url =
      std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());
    let timeout = std::env::var("OPENAI_TIMEOUT_SECS")
      .ok()
      .and_then(|s| s.parse::<u64>().ok())
      .unwrap_or(60);

    match Self::new(api_key, base_url, model, Duration::from_secs(timeout)) {
      Ok(c) => Some(c),
      Err(e) => {
        error!(target: "worksheet_backend", error = %e, "Failed to build HTTP client for the AI service");
        None
      }
    }
  }

  pub fn new(api_key: String, base_url: String, model: String, timeout: Duration) -> Result<Self, LlmError> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    let base_url = base_url.trim_end_matches('/').to_string();
    Ok(Self { client, api_key, base_url, model })
  }

  /// JSON-object chat completion returning the parsed reply.
  #[instrument(level = "info", skip(self, system, user), fields(model = %self.model, prompt_len = user.len()))]
  pub async fn chat_json(&self, system: &str, user: &str, temperature: f32) -> Result<serde_json::Value, LlmError> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: self.model.clone(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: system.into() },
        ChatMessageReq { role: "user".into(), content: user.into() },
      ],
      temperature,
      response_format: Some(ResponseFormat { r#type: "json_object".into() }),
    };

    let start = Instant::now();
    let res = self.client.post(&url)
      .header(USER_AGENT, "worksheet-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req).send().await?;

    if !res.status().is_success() {
      let status = res.status().as_u16();
      let body = res.text().await.unwrap_or_default();
      let message = extract_openai_error(&body).unwrap_or(body);
      error!(target: "generation", status, elapsed = ?start.elapsed(), "AI call rejected");
      return Err(LlmError::Status { status, message });
    }

    let body: ChatCompletionResponse = res.json().await?;
    if let Some(usage) = &body.usage {
      info!(target: "generation", prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "AI usage");
    }
    let text = body.choices.into_iter().next()
      .and_then(|c| c.message.content)
      .unwrap_or_default();
    info!(target: "generation", elapsed = ?start.elapsed(), reply_len = text.len(), "AI reply received");

    if text.trim().is_empty() {
      return Err(LlmError::EmptyReply);
    }
    parse_ai_json(&text).ok_or(LlmError::Parse)
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  response_format: Option<ResponseFormat>,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }
#[derive(Serialize)]
struct ResponseFormat { #[serde(rename = "type")] r#type: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Try to extract a clean error message from an OpenAI-style error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}
