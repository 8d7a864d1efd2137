/*
 * Warden - Sandboxed Tool-Calling Agent
 * File Path: src/llm.rs
 * Responsibility: Conversation types and the Gemini generateContent boundary
 */

use crate::error::AgentError;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-001";
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

static POOLED_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .user_agent(concat!("warden/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Model,
    Tool,
}

impl MessageRole {
    /// Gemini only knows `user` and `model`; function responses travel in a user turn.
    fn gemini_role(self) -> &'static str {
        match self {
            MessageRole::User | MessageRole::Tool => "user",
            MessageRole::Model => "model",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Message {
    pub role: MessageRole,
    pub parts: Vec<MultimodalPart>,
}

impl Message {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            parts: vec![MultimodalPart::text(text)],
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub args: Value,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FunctionResponse {
    pub name: String,
    pub response: Value,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MultimodalPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_response: Option<FunctionResponse>,
    /// Opaque token newer models attach to parts; it must be echoed back unchanged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thought_signature: Option<String>,
}

impl MultimodalPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn function_call(name: impl Into<String>, args: Value) -> Self {
        Self {
            function_call: Some(FunctionCall {
                name: name.into(),
                args,
            }),
            ..Default::default()
        }
    }

    pub fn function_response(name: impl Into<String>, response: Value) -> Self {
        Self {
            function_response: Some(FunctionResponse {
                name: name.into(),
                response,
            }),
            ..Default::default()
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: u64,
    #[serde(default)]
    pub candidates_token_count: u64,
}

/// One model turn, already split into answer text and requested calls.
#[derive(Debug, Clone, Default)]
pub struct ModelResponse {
    /// Raw parts, appended to history verbatim.
    pub parts: Vec<MultimodalPart>,
    /// Concatenated text parts; `None` when the turn carried no text at all.
    pub text: Option<String>,
    pub calls: Vec<FunctionCall>,
    pub usage: Option<UsageMetadata>,
}

impl ModelResponse {
    pub fn from_parts(parts: Vec<MultimodalPart>, usage: Option<UsageMetadata>) -> Self {
        let mut text: Option<String> = None;
        let mut calls = Vec::new();
        for part in &parts {
            if let Some(chunk) = part.text.as_deref() {
                text.get_or_insert_with(String::new).push_str(chunk);
            }
            if let Some(call) = part.function_call.as_ref() {
                calls.push(call.clone());
            }
        }
        Self {
            parts,
            text,
            calls,
            usage,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ModelRequest<'a> {
    pub system_prompt: &'a str,
    pub history: &'a [Message],
    /// `functionDeclarations` array sent with every request.
    pub tools: &'a Value,
}

/// The opaque request/response boundary the agent loop talks to.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn generate(&self, request: ModelRequest<'_>) -> Result<ModelResponse, AgentError>;
}

#[derive(Debug, Clone)]
pub struct GeminiClient {
    api_key: String,
    model: String,
    temperature: Option<f32>,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            temperature: None,
            base_url: GEMINI_BASE_URL.to_string(),
        }
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ModelClient for GeminiClient {
    async fn generate(&self, request: ModelRequest<'_>) -> Result<ModelResponse, AgentError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let payload = build_payload(&request, self.temperature);
        debug!(model = %self.model, messages = request.history.len(), "calling Gemini");

        let response = POOLED_CLIENT
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            return Err(AgentError::Upstream(format!(
                "Gemini API error (model: {}, status: {}): {}",
                self.model, status, error_text
            )));
        }

        let res_json: Value = response.json().await?;
        parse_response(&res_json)
    }
}

pub fn build_payload(request: &ModelRequest<'_>, temperature: Option<f32>) -> Value {
    let contents: Vec<Value> = request
        .history
        .iter()
        .map(|msg| {
            json!({
                "role": msg.role.gemini_role(),
                "parts": msg.parts
            })
        })
        .collect();

    let mut payload = json!({
        "systemInstruction": {
            "parts": [{ "text": request.system_prompt }]
        },
        "contents": contents,
        "tools": [{ "functionDeclarations": request.tools }]
    });

    if let Some(t) = temperature {
        payload["generationConfig"] = json!({ "temperature": t });
    }

    payload
}

/// Decode a generateContent body. Only the first candidate is used.
pub fn parse_response(res_json: &Value) -> Result<ModelResponse, AgentError> {
    let candidate = res_json["candidates"].get(0).ok_or_else(|| {
        let feedback = res_json
            .get("promptFeedback")
            .map(Value::to_string)
            .unwrap_or_else(|| "none".to_string());
        AgentError::ResponseShape(format!("no candidates in response (prompt feedback: {})", feedback))
    })?;

    let Some(content) = candidate.get("content") else {
        let reason = candidate["finishReason"].as_str().unwrap_or("UNKNOWN");
        return Err(AgentError::ResponseShape(format!(
            "candidate has no content (finish reason: {})",
            reason
        )));
    };

    let parts: Vec<MultimodalPart> = match content.get("parts") {
        Some(raw) => serde_json::from_value(raw.clone())
            .map_err(|e| AgentError::ResponseShape(format!("invalid content parts: {}", e)))?,
        None => Vec::new(),
    };

    for call in parts.iter().filter_map(|p| p.function_call.as_ref()) {
        if !(call.args.is_object() || call.args.is_null()) {
            return Err(AgentError::ResponseShape(format!(
                "arguments for `{}` are not an object: {}",
                call.name, call.args
            )));
        }
    }

    let usage = match res_json.get("usageMetadata") {
        Some(raw) => Some(
            serde_json::from_value(raw.clone())
                .map_err(|e| AgentError::ResponseShape(format!("invalid usage metadata: {}", e)))?,
        ),
        None => None,
    };

    Ok(ModelResponse::from_parts(parts, usage))
}
