use super::{ImageBackend, ImageError, ImageSize, RenderedImage};
use crate::core::config::OpenAIConfig;
use crate::core::story::ImageProvider;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use log::debug;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DALLE_MODEL: &str = "dall-e-3";

#[derive(Debug)]
pub struct DalleClient {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl DalleClient {
    pub fn new(config: &OpenAIConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            model: config.model.clone().unwrap_or_else(|| DALLE_MODEL.to_string()),
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
struct DalleRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u32,
    size: String,
    response_format: &'a str,
}

#[derive(Deserialize)]
struct DalleResponse {
    #[serde(default)]
    data: Vec<DalleImage>,
}

#[derive(Deserialize)]
struct DalleImage {
    b64_json: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIErrorEnvelope {
    error: OpenAIErrorBody,
}

#[derive(Deserialize)]
struct OpenAIErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

/// Maps a non-success response to the failure kind the illustrator acts on.
/// An exhausted quota also comes back as 429 but waiting will not help.
fn classify_error(status: StatusCode, body: &str) -> ImageError {
    let parsed = serde_json::from_str::<OpenAIErrorEnvelope>(body).ok().map(|e| e.error);
    let code = parsed
        .as_ref()
        .and_then(|e| e.code.as_deref().or(e.kind.as_deref()))
        .unwrap_or_default()
        .to_string();
    let message = parsed.map(|e| e.message).unwrap_or_else(|| body.to_string());

    if code == "content_policy_violation" || message.contains("safety system") {
        return ImageError::PolicyRejected(message);
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        if code == "insufficient_quota" {
            return ImageError::Other(format!("quota exhausted: {}", message));
        }
        return ImageError::RateLimited;
    }
    ImageError::Other(format!("DALL-E API error ({}): {}", status, message))
}

#[async_trait]
impl ImageBackend for DalleClient {
    fn provider(&self) -> ImageProvider {
        ImageProvider::Dalle
    }

    async fn render(&self, prompt: &str, size: ImageSize) -> Result<RenderedImage, ImageError> {
        let url = format!("{}/images/generations", self.base_url);
        let body = DalleRequest {
            model: &self.model,
            prompt,
            n: 1,
            size: size.to_string(),
            response_format: "b64_json",
        };

        debug!("DALL-E request with model {} at {}", self.model, size);
        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let error_text = resp.text().await?;
            return Err(classify_error(status, &error_text));
        }

        let result: DalleResponse = resp
            .json()
            .await
            .map_err(|e| ImageError::Other(format!("Failed to parse DALL-E response: {}", e)))?;
        let encoded = result
            .data
            .into_iter()
            .find_map(|d| d.b64_json)
            .ok_or_else(|| ImageError::Other("DALL-E response contained no image".to_string()))?;
        let bytes = general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| ImageError::Other(format!("Invalid base64 image data: {}", e)))?;

        Ok(RenderedImage { bytes, mime_type: "image/png".to_string() })
    }
}
