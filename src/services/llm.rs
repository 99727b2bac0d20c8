use crate::core::config::{Config, GeminiConfig, OpenAIConfig};
use crate::core::story::TextProvider;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OPENAI_TEXT_MODEL: &str = "gpt-4o-mini";
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const GEMINI_TEXT_MODEL: &str = "gemini-1.5-flash";

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    pub max_output_tokens: u32,
    pub temperature: f32,
}

/// A single text-generation backend. Any error means "unavailable, try the next one".
#[async_trait]
pub trait TextBackend: Send + Sync + Debug {
    fn provider(&self) -> TextProvider;
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

/// Builds every text backend that has credentials in the config.
pub fn create_text_backends(config: &Config) -> Vec<Arc<dyn TextBackend>> {
    let mut backends: Vec<Arc<dyn TextBackend>> = Vec::new();
    if let Some(cfg) = config.text.openai.as_ref().filter(|c| !c.api_key.trim().is_empty()) {
        backends.push(Arc::new(OpenAIClient::new(cfg)));
    }
    if let Some(cfg) = config.text.gemini.as_ref().filter(|c| !c.api_key.trim().is_empty()) {
        backends.push(Arc::new(GeminiClient::new(cfg)));
    }
    info!(
        "Text backends configured: [{}]",
        backends.iter().map(|b| b.provider().to_string()).collect::<Vec<_>>().join(", ")
    );
    backends
}

// --- OpenAI ---

#[derive(Debug)]
pub struct OpenAIClient {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAIClient {
    pub fn new(config: &OpenAIConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            model: config.model.clone().unwrap_or_else(|| OPENAI_TEXT_MODEL.to_string()),
            base_url: config
                .base_url
                .as_deref()
                .unwrap_or(OPENAI_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessageResponse,
}

#[derive(Deserialize)]
struct OpenAIMessageResponse {
    content: Option<String>,
}

#[async_trait]
impl TextBackend for OpenAIClient {
    fn provider(&self) -> TextProvider {
        TextProvider::OpenAi
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);

        let request_body = OpenAIRequest {
            model: self.model.clone(),
            messages: vec![
                OpenAIMessage { role: "system".to_string(), content: request.system.clone() },
                OpenAIMessage { role: "user".to_string(), content: request.prompt.clone() },
            ],
            max_tokens: request.max_output_tokens,
            temperature: request.temperature,
        };

        debug!("OpenAI completion with model {} (max_tokens={})", self.model, request.max_output_tokens);
        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request_body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp.text().await?;
            return Err(anyhow!("OpenAI API error ({}): {}", status, error_text));
        }

        let result: OpenAIResponse = resp.json().await?;
        if let Some(choice) = result.choices.first() {
            if let Some(content) = &choice.message.content {
                if !content.trim().is_empty() {
                    return Ok(content.trim().to_string());
                }
            }
        }

        Err(anyhow!("OpenAI response empty or missing content"))
    }
}

// --- Gemini ---

#[derive(Debug)]
pub struct GeminiClient {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(config: &GeminiConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            model: config.model.clone().unwrap_or_else(|| GEMINI_TEXT_MODEL.to_string()),
            base_url: config
                .base_url
                .as_deref()
                .unwrap_or(GEMINI_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiSystemInstruction>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
struct GeminiSystemInstruction {
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    error: Option<GeminiError>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContentResponse>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct GeminiContentResponse {
    #[serde(default)]
    parts: Vec<GeminiPartResponse>,
}

#[derive(Deserialize)]
struct GeminiPartResponse {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize, Debug)]
struct GeminiError {
    message: String,
}

#[async_trait]
impl TextBackend for GeminiClient {
    fn provider(&self) -> TextProvider {
        TextProvider::Gemini
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let request_body = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts: vec![GeminiPart { text: request.prompt.clone() }],
            }],
            system_instruction: Some(GeminiSystemInstruction {
                parts: vec![GeminiPart { text: request.system.clone() }],
            }),
            generation_config: GeminiGenerationConfig {
                max_output_tokens: request.max_output_tokens,
                temperature: request.temperature,
            },
        };

        debug!("Gemini completion with model {}", self.model);
        let resp = self.client.post(&url).json(&request_body).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp.text().await?;
            return Err(anyhow!("Gemini API error ({}): {}", status, error_text));
        }

        let response_text = resp.text().await?;
        let result: GeminiResponse = match serde_json::from_str(&response_text) {
            Ok(r) => r,
            Err(e) => return Err(anyhow!("Failed to parse Gemini response: {}. Body: {}", e, response_text)),
        };

        extract_gemini_text(result)
    }
}

fn extract_gemini_text(result: GeminiResponse) -> Result<String> {
    if let Some(err) = result.error {
        return Err(anyhow!("Gemini API returned error: {}", err.message));
    }

    let Some(first) = result.candidates.as_ref().and_then(|c| c.first()) else {
        return Err(anyhow!("Gemini response contained no candidates"));
    };

    let text = first
        .content
        .as_ref()
        .map(|content| {
            content
                .parts
                .iter()
                .filter_map(|p| p.text.as_deref())
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        let reason = first.finish_reason.as_deref().unwrap_or("UNKNOWN");
        return Err(anyhow!("Gemini response empty. Finish reason: {}", reason));
    }
    Ok(text.trim().to_string())
}
