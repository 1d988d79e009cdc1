//! LLM-backed decision agent.
//!
//! Implements `DecisionAgent` over the Anthropic Messages API. Handles
//! prompt construction, strict-JSON action extraction, retry with
//! exponential backoff, and fallback to the conservative default when
//! the model answers outside the legal-action list.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::snapshot::GameSnapshot;
use crate::types::{Action, ActionKind};

use super::{default_action, DecisionAgent};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Maximum retries on rate limit / server errors.
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (ms).
const BASE_BACKOFF_MS: u64 = 1000;

const SYSTEM_PROMPT: &str = "You are a participant in a turn-based property-trading board game. \
You are given the full game state as JSON and a numbered list of legal actions. \
Pick exactly one legal action and respond with a single JSON object — no prose.";

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    #[serde(default)]
    content_type: String,
    #[serde(default)]
    text: Option<String>,
}

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

pub struct LlmAgent {
    name: String,
    http: Client,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl LlmAgent {
    pub fn new(
        name: &str,
        api_key: String,
        model: Option<String>,
        max_tokens: Option<u32>,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .context("Failed to build LLM HTTP client")?;

        Ok(Self {
            name: name.to_string(),
            http,
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_tokens: max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        })
    }

    /// Build the user prompt: state JSON, numbered legal actions, and
    /// the strict response format.
    fn build_prompt(snapshot: &GameSnapshot, legal_actions: &[ActionKind]) -> String {
        let state_json = serde_json::to_string_pretty(snapshot)
            .unwrap_or_else(|_| "{}".to_string());

        let mut prompt = String::new();
        prompt.push_str("Current game state:\n```json\n");
        prompt.push_str(&state_json);
        prompt.push_str("\n```\n\nYour legal actions:\n");
        for (i, action) in legal_actions.iter().enumerate() {
            prompt.push_str(&format!("{}. {}\n", i + 1, action.as_str()));
        }
        prompt.push_str(
            "\nRespond with a single JSON object:\n\
             - key \"action\": the exact name of one action from the list above\n\
             - key \"params\": an object with that action's parameters, or {} if none\n\n\
             Example: {\"action\": \"buy_property\", \"params\": {\"property\": 12}}\n\
             Example: {\"action\": \"roll_dice\", \"params\": {}}\n",
        );
        prompt
    }

    /// Pull the first JSON object out of a model response that may be
    /// wrapped in code fences or surrounding prose.
    fn extract_json(response: &str) -> Option<serde_json::Value> {
        let cleaned = response
            .replace("```json", "")
            .replace("```", "");
        let start = cleaned.find('{')?;
        let end = cleaned.rfind('}')?;
        if end < start {
            return None;
        }
        serde_json::from_str(&cleaned[start..=end]).ok()
    }

    /// Turn a parsed response into a legal action, if possible.
    fn parse_action(value: &serde_json::Value, legal_actions: &[ActionKind]) -> Option<Action> {
        let name = value.get("action")?.as_str()?;
        let empty = serde_json::json!({});
        let params = value.get("params").unwrap_or(&empty);
        let action = Action::from_wire(name, params).ok()?;
        if legal_actions.contains(&action.kind()) {
            Some(action)
        } else {
            None
        }
    }

    /// Send a messages request with retry + backoff, returning the
    /// concatenated text content.
    async fn call_api(&self, user_message: &str) -> Result<String> {
        let request = MessagesRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            messages: vec![Message {
                role: "user".to_string(),
                content: user_message.to_string(),
            }],
            system: Some(SYSTEM_PROMPT.to_string()),
        };

        let mut last_error = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = BASE_BACKOFF_MS * 2u64.pow(attempt - 1);
                debug!(attempt, delay_ms = delay, "Retrying LLM API call");
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            }

            let resp = self
                .http
                .post(API_URL)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", API_VERSION)
                .header("content-type", "application/json")
                .json(&request)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let body: MessagesResponse = response
                            .json()
                            .await
                            .context("Failed to parse LLM response")?;
                        let text = body
                            .content
                            .iter()
                            .filter(|b| b.content_type == "text")
                            .filter_map(|b| b.text.as_deref())
                            .collect::<Vec<_>>()
                            .join("");
                        return Ok(text);
                    }

                    // Retryable: 429 (rate limit) and server errors.
                    if status.as_u16() == 429 || status.as_u16() >= 500 {
                        let error_text = response.text().await.unwrap_or_default();
                        warn!(status = %status, attempt, error = %error_text, "Retryable LLM API error");
                        last_error = Some(format!("HTTP {status}: {error_text}"));
                        continue;
                    }

                    let error_text = response.text().await.unwrap_or_default();
                    anyhow::bail!("LLM API error {status}: {error_text}");
                }
                Err(e) => {
                    warn!(attempt, error = %e, "LLM request failed");
                    last_error = Some(format!("Request error: {e}"));
                }
            }
        }

        anyhow::bail!(
            "LLM API failed after {MAX_RETRIES} retries: {}",
            last_error.unwrap_or_else(|| "unknown".to_string())
        )
    }
}

#[async_trait]
impl DecisionAgent for LlmAgent {
    async fn decide(
        &self,
        snapshot: &GameSnapshot,
        legal_actions: &[ActionKind],
    ) -> Result<Action> {
        if legal_actions.is_empty() {
            anyhow::bail!("no legal actions to choose from");
        }

        let prompt = Self::build_prompt(snapshot, legal_actions);

        match self.call_api(&prompt).await {
            Ok(text) => {
                if let Some(action) = Self::extract_json(&text)
                    .and_then(|v| Self::parse_action(&v, legal_actions))
                {
                    debug!(agent = %self.name, action = %action, "LLM chose action");
                    return Ok(action);
                }
                warn!(
                    agent = %self.name,
                    response = %text,
                    "LLM answered outside the legal list — using default"
                );
                Ok(default_action(snapshot, legal_actions))
            }
            Err(e) => {
                warn!(agent = %self.name, error = %e, "LLM call failed — using default");
                Ok(default_action(snapshot, legal_actions))
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
