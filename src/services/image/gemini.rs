use super::{ImageBackend, ImageError, ImageSize, RenderedImage};
use crate::core::config::GeminiConfig;
use crate::core::story::ImageProvider;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use log::debug;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const GEMINI_IMAGE_MODEL: &str = "gemini-2.0-flash-preview-image-generation";

/// Finish reasons that mean the model refused the prompt.
const POLICY_FINISH_REASONS: &[&str] =
    &["SAFETY", "IMAGE_SAFETY", "PROHIBITED_CONTENT", "BLOCKLIST", "SPII"];

#[derive(Debug)]
pub struct GeminiImageClient {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl GeminiImageClient {
    pub fn new(config: &GeminiConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            model: config.model.clone().unwrap_or_else(|| GEMINI_IMAGE_MODEL.to_string()),
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
struct GeminiImageRequest {
    contents: Vec<GeminiContent>,
    generation_config: GeminiImageConfig,
}

#[derive(Serialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiTextPart>,
}

#[derive(Serialize)]
struct GeminiTextPart {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiImageConfig {
    response_modalities: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiImageResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponsePart {
    inline_data: Option<InlineData>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

fn classify_error(status: StatusCode, body: &str) -> ImageError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return ImageError::RateLimited;
    }
    ImageError::Other(format!("Gemini image API error ({}): {}", status, body))
}

fn extract_image(response: GeminiImageResponse) -> Result<RenderedImage, ImageError> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(ImageError::PolicyRejected(format!("prompt blocked: {}", reason)));
    }

    let mut finish_reason = None;
    for candidate in response.candidates {
        let inline = candidate
            .content
            .into_iter()
            .flat_map(|c| c.parts)
            .find_map(|p| p.inline_data);
        if let Some(inline) = inline {
            let bytes = general_purpose::STANDARD
                .decode(inline.data.trim())
                .map_err(|e| ImageError::Other(format!("Invalid base64 image data: {}", e)))?;
            return Ok(RenderedImage { bytes, mime_type: inline.mime_type });
        }
        finish_reason = finish_reason.or(candidate.finish_reason);
    }

    match finish_reason {
        Some(reason) if POLICY_FINISH_REASONS.contains(&reason.as_str()) => {
            Err(ImageError::PolicyRejected(format!("generation stopped: {}", reason)))
        }
        Some(reason) => Err(ImageError::Other(format!("no image returned (finish reason {})", reason))),
        None => Err(ImageError::Other("no image returned".to_string())),
    }
}

#[async_trait]
impl ImageBackend for GeminiImageClient {
    fn provider(&self) -> ImageProvider {
        ImageProvider::Gemini
    }

    // Gemini picks its own output dimensions; size is only logged.
    async fn render(&self, prompt: &str, size: ImageSize) -> Result<RenderedImage, ImageError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let body = GeminiImageRequest {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts: vec![GeminiTextPart { text: prompt.to_string() }],
            }],
            generation_config: GeminiImageConfig {
                response_modalities: vec!["TEXT".to_string(), "IMAGE".to_string()],
            },
        };

        debug!("Gemini image request with model {} (requested {})", self.model, size);
        let resp = self.client.post(&url).json(&body).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let error_text = resp.text().await?;
            return Err(classify_error(status, &error_text));
        }

        let response_text = resp.text().await?;
        let parsed: GeminiImageResponse = serde_json::from_str(&response_text)
            .map_err(|e| ImageError::Other(format!("Failed to parse Gemini response: {}", e)))?;
        extract_image(parsed)
    }
}
