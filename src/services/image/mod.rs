use crate::core::config::Config;
use crate::core::story::ImageProvider;
use async_trait::async_trait;
use log::info;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};
use std::sync::Arc;
use thiserror::Error;

pub mod dalle;
pub mod gemini;
pub mod rate_limit;

/// Failure kinds the illustrator branches on.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("image provider rate limit reached")]
    RateLimited,
    #[error("prompt rejected by content policy: {0}")]
    PolicyRejected(String),
    #[error("image generation failed: {0}")]
    Other(String),
}

impl From<reqwest::Error> for ImageError {
    fn from(e: reqwest::Error) -> Self {
        ImageError::Other(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl Default for ImageSize {
    fn default() -> Self {
        Self { width: 1024, height: 1024 }
    }
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl TryFrom<String> for ImageSize {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let (w, h) = value
            .split_once('x')
            .ok_or_else(|| format!("image size must look like 1024x1024, got {:?}", value))?;
        let width = w.trim().parse::<u32>().map_err(|e| format!("bad width {:?}: {}", w, e))?;
        let height = h.trim().parse::<u32>().map_err(|e| format!("bad height {:?}: {}", h, e))?;
        if width == 0 || height == 0 {
            return Err(format!("image size must be non-zero, got {:?}", value));
        }
        Ok(Self { width, height })
    }
}

impl From<ImageSize> for String {
    fn from(size: ImageSize) -> Self {
        size.to_string()
    }
}

#[async_trait]
pub trait ImageBackend: Send + Sync + Debug {
    fn provider(&self) -> ImageProvider;
    async fn render(&self, prompt: &str, size: ImageSize) -> Result<RenderedImage, ImageError>;
}

/// Builds every image backend that has credentials in the config.
pub fn create_image_backends(config: &Config) -> Vec<Arc<dyn ImageBackend>> {
    let mut backends: Vec<Arc<dyn ImageBackend>> = Vec::new();
    if let Some(cfg) = config.image.dalle.as_ref().filter(|c| !c.api_key.trim().is_empty()) {
        backends.push(Arc::new(dalle::DalleClient::new(cfg)));
    }
    if let Some(cfg) = config.image.gemini.as_ref().filter(|c| !c.api_key.trim().is_empty()) {
        backends.push(Arc::new(gemini::GeminiImageClient::new(cfg)));
    }
    info!(
        "Image backends configured: [{}]",
        backends.iter().map(|b| b.provider().to_string()).collect::<Vec<_>>().join(", ")
    );
    backends
}
