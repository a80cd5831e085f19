//! Google Gemini API Client
//!
//! API key mode against the Google AI Studio endpoint:
//! `POST {base}/models/{model}:generateContent?key={API_KEY}`
//!
//! The message log maps onto Gemini contents as follows:
//!
//! | history entry | role | part |
//! |---------------|------|------|
//! | user | `user` | `text` |
//! | model text | `model` | `text` |
//! | model function call | `model` | `functionCall` |
//! | function result | `function` | `functionResponse {name, response: {name, content}}` |

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use um_core::{AssistantSettings, ChatMessage, FunctionCall, ToolDefinition};

use crate::error::CompletionError;
use crate::provider::{CompletionRequest, CompletionResponse, CompletionService};

/// Google AI Studio (API key mode)
pub const GOOGLE_AI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const DEFAULT_MAX_RETRIES: u32 = 5;

// =============================================================================
// DATA STRUCTURES
// =============================================================================

#[derive(Debug, Serialize)]
pub(crate) struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiInstruction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<GeminiTool>>,
}

#[derive(Debug, Serialize)]
struct GeminiTool {
    #[serde(rename = "functionDeclarations")]
    function_declarations: Vec<GeminiFunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct GeminiFunctionDeclaration {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct GeminiInstruction {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    role: &'static str,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Default, Serialize)]
struct GeminiPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(rename = "functionCall", skip_serializing_if = "Option::is_none")]
    function_call: Option<GeminiFunctionCall>,
    #[serde(rename = "functionResponse", skip_serializing_if = "Option::is_none")]
    function_response: Option<GeminiFunctionResponse>,
}

impl GeminiPart {
    fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiFunctionCall {
    name: String,
    #[serde(default)]
    args: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct GeminiFunctionResponse {
    name: String,
    response: GeminiFunctionResponseBody,
}

#[derive(Debug, Serialize)]
struct GeminiFunctionResponseBody {
    name: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContentResponse>,
}

#[derive(Debug, Deserialize)]
struct GeminiContentResponse {
    #[serde(default)]
    parts: Vec<GeminiPartResponse>,
}

#[derive(Debug, Deserialize)]
struct GeminiPartResponse {
    text: Option<String>,
    #[serde(rename = "functionCall")]
    function_call: Option<GeminiFunctionCall>,
}

// =============================================================================
// REQUEST / RESPONSE MAPPING
// =============================================================================

fn to_content(message: &ChatMessage) -> GeminiContent {
    let part = match message {
        ChatMessage::User { text } | ChatMessage::ModelText { text } => GeminiPart::text(text),
        ChatMessage::ModelFunctionCall { name, arguments } => GeminiPart {
            function_call: Some(GeminiFunctionCall {
                name: name.clone(),
                args: arguments.clone(),
            }),
            ..Default::default()
        },
        ChatMessage::FunctionResult { name, result, .. } => GeminiPart {
            function_response: Some(GeminiFunctionResponse {
                name: name.clone(),
                response: GeminiFunctionResponseBody {
                    name: name.clone(),
                    content: result.clone(),
                },
            }),
            ..Default::default()
        },
    };
    GeminiContent {
        role: message.role(),
        parts: vec![part],
    }
}

fn to_tools(tools: &[ToolDefinition]) -> Option<Vec<GeminiTool>> {
    if tools.is_empty() {
        return None;
    }
    let function_declarations = tools
        .iter()
        .map(|t| GeminiFunctionDeclaration {
            name: t.name.clone(),
            description: t.description.clone(),
            parameters: t.parameters.clone(),
        })
        .collect();
    Some(vec![GeminiTool {
        function_declarations,
    }])
}

/// Build the request body. The per-request system message wins over the configured one.
pub(crate) fn build_request(request: &CompletionRequest, default_system: Option<&str>) -> GeminiRequest {
    let system = request
        .system_message
        .as_deref()
        .or(default_system)
        .filter(|s| !s.is_empty());

    GeminiRequest {
        contents: request.history.iter().map(to_content).collect(),
        system_instruction: system.map(|text| GeminiInstruction {
            parts: vec![GeminiPart::text(text)],
        }),
        tools: request.tools.as_deref().and_then(to_tools),
    }
}

/// Pick the first function call and the first text part of the first candidate.
pub(crate) fn parse_response(raw_body: &str) -> Result<CompletionResponse, CompletionError> {
    let result: GeminiResponse = serde_json::from_str(raw_body).map_err(|e| {
        let preview: String = raw_body.chars().take(1000).collect();
        tracing::error!("Failed to parse Gemini response: {}", e);
        debug!("Raw response: {}", preview);
        CompletionError::Malformed(format!("Failed to parse Gemini response: {}", e))
    })?;

    let parts = result
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts)
        .unwrap_or_default();

    if parts.is_empty() {
        return Err(CompletionError::no_content());
    }

    let mut text = None;
    let mut function_call = None;
    for part in parts {
        if text.is_none() {
            text = part.text.filter(|t| !t.is_empty());
        }
        if function_call.is_none() {
            function_call = part
                .function_call
                .map(|fc| FunctionCall::new(fc.name, normalize_args(fc.args)));
        }
    }

    if function_call.is_none() && text.is_none() {
        return Err(CompletionError::no_text());
    }

    Ok(CompletionResponse {
        text,
        function_call,
    })
}

fn normalize_args(args: serde_json::Value) -> serde_json::Value {
    if args.is_null() {
        serde_json::json!({})
    } else {
        args
    }
}

// =============================================================================
// CLIENT IMPLEMENTATION
// =============================================================================

/// Google Gemini Client (API key mode)
pub struct GeminiClient {
    client: Client,
    api_key: Option<String>,
    model: String,
    /// Base API URL
    api_url: String,
    system_message: Option<String>,
    max_retries: u32,
}

impl GeminiClient {
    /// Create a new Gemini client with API key
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .unwrap_or_default(),
            api_key: Some(api_key.into()).filter(|k: &String| !k.is_empty()),
            model: model.into(),
            api_url: GOOGLE_AI_BASE_URL.to_string(),
            system_message: None,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Create from assistant settings.
    ///
    /// A missing API key is not an error here; every request fails with
    /// [`CompletionError::MissingCredential`] until one is configured.
    pub fn from_settings(settings: &AssistantSettings) -> Self {
        let client = Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .unwrap_or_default();

        if settings.api_key.is_some() {
            info!("Gemini API key mode (model={})", settings.model);
        } else {
            warn!("No Gemini API key configured (set GEMINI_API_KEY or GOOGLE_API_KEY)");
        }

        Self {
            client,
            api_key: settings.api_key.clone().filter(|k| !k.is_empty()),
            model: settings.model.clone(),
            api_url: GOOGLE_AI_BASE_URL.to_string(),
            system_message: Some(settings.system_message.clone()),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Create with custom endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.api_url = endpoint.into();
        self
    }

    pub fn with_system_message(mut self, message: impl Into<String>) -> Self {
        self.system_message = Some(message.into());
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Get the current API URL
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn build_url(&self, api_key: &str) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.api_url, self.model, api_key
        )
    }
}

#[async_trait]
impl CompletionService for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, CompletionError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(CompletionError::MissingCredential)?;

        let url = self.build_url(api_key);
        let gemini_request = build_request(&request, self.system_message.as_deref());

        info!(
            "Gemini generateContent: model={}, history={}, tools={}",
            self.model,
            request.history.len(),
            request.tools.as_ref().map(|t| t.len()).unwrap_or(0)
        );
        debug!("Gemini request to: {}", url.split('?').next().unwrap_or(&url));

        // Retry with exponential backoff for rate limiting (429) errors
        let mut retry_count = 0;

        loop {
            let response = self
                .client
                .post(&url)
                .json(&gemini_request)
                .send()
                .await
                .map_err(|e| {
                    let e = e.without_url();
                    tracing::error!("Gemini HTTP request failed: {}", e);
                    CompletionError::Request(e.to_string())
                })?;

            let status = response.status();

            if status.as_u16() == 429 && retry_count < self.max_retries {
                let delay_secs = 1u64 << retry_count;
                warn!(
                    "Gemini API rate limit (429), retrying in {}s (attempt {}/{})",
                    delay_secs,
                    retry_count + 1,
                    self.max_retries
                );
                tokio::time::sleep(Duration::from_secs(delay_secs)).await;
                retry_count += 1;
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                tracing::error!("Gemini API error {}: {}", status, body);
                return Err(CompletionError::Http {
                    status: status.as_u16(),
                    body,
                });
            }

            let raw_body = response.text().await?;
            let parsed = parse_response(&raw_body)?;

            if let Some(fc) = &parsed.function_call {
                info!("Gemini returned function call: {}", fc.name);
                debug!("  Function call: {}({})", fc.name, fc.arguments);
            }

            return Ok(parsed);
        }
    }
}
