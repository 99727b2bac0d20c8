//! Per-page illustration with rate limiting, recovery and placeholder fallback.

use crate::core::story::{GenerationRequest, ImageArtifact, ImageProvider, Section};
use crate::services::image::rate_limit::{RateLimiter, RATE_LIMIT_COOLDOWN};
use crate::services::image::{ImageBackend, ImageError, ImageSize, RenderedImage};
use crate::utils::placeholder;
use log::{info, warn};
use std::sync::Arc;
use tokio::time::sleep;

/// Substituted when a backend rejects a scene on content-policy grounds.
pub const SAFE_FALLBACK_PROMPT: &str =
    "A peaceful meadow with rolling green hills, a smiling sun, fluffy white clouds and colourful flowers";

const STYLE_PREFIX: &str =
    "Whimsical children's storybook illustration in soft watercolour style, bright friendly colours, gentle rounded shapes.";
const CONTENT_RULES: &str =
    "Do not include any text, letters, words, numbers, captions or signs anywhere in the image.";

/// Adds the fixed art style and the no-lettering rule to a scene prompt.
pub fn enhance_prompt(scene: &str) -> String {
    format!("{} {} {}", STYLE_PREFIX, scene.trim(), CONTENT_RULES)
}

/// Scene prompt for one page of a story.
pub fn page_prompt(request: &GenerationRequest, section: &Section) -> String {
    let character = match request.attributes.describe() {
        Some(attrs) => format!("{} ({})", request.character_type, attrs),
        None => request.character_type.clone(),
    };
    format!(
        "Children's book illustration: A character named {}, who is a {}, in the setting of {}, with the scene: {}",
        request.character_name, character, request.setting, section.text
    )
}

pub struct ImageOrchestrator {
    backends: Vec<Arc<dyn ImageBackend>>,
    limiter: Arc<RateLimiter>,
    size: ImageSize,
}

impl ImageOrchestrator {
    pub fn new(backends: Vec<Arc<dyn ImageBackend>>, limiter: Arc<RateLimiter>, size: ImageSize) -> Self {
        Self { backends, limiter, size }
    }

    /// Always yields an artifact; a placeholder when every backend is exhausted.
    pub async fn generate_for_prompt(&self, prompt: &str, preferred: ImageProvider) -> ImageArtifact {
        for backend in self.provider_order(preferred) {
            match self.render_with_recovery(backend.as_ref(), prompt).await {
                Ok(image) => {
                    info!("Illustration rendered by {}", backend.provider());
                    return ImageArtifact::generated(image.bytes, &image.mime_type, backend.provider());
                }
                Err(e) => warn!("Image backend {} failed: {}", backend.provider(), e),
            }
        }

        warn!("No image backend produced an illustration, substituting placeholder");
        placeholder::render(prompt)
    }

    /// Preferred backend first, then the other one. One hop at most.
    fn provider_order(&self, preferred: ImageProvider) -> Vec<&Arc<dyn ImageBackend>> {
        [preferred, preferred.other()]
            .into_iter()
            .filter_map(|p| self.backends.iter().find(|b| b.provider() == p))
            .collect()
    }

    async fn render_with_recovery(
        &self,
        backend: &dyn ImageBackend,
        prompt: &str,
    ) -> Result<RenderedImage, ImageError> {
        match self.dispatch(backend, prompt).await {
            Err(ImageError::RateLimited) => {
                warn!(
                    "{} rate limited, cooling down for {}s",
                    backend.provider(),
                    RATE_LIMIT_COOLDOWN.as_secs()
                );
                sleep(RATE_LIMIT_COOLDOWN).await;
                self.dispatch(backend, prompt).await
            }
            Err(ImageError::PolicyRejected(reason)) => {
                warn!("{} rejected the scene ({}), retrying with a safe prompt", backend.provider(), reason);
                self.dispatch(backend, SAFE_FALLBACK_PROMPT).await
            }
            other => other,
        }
    }

    async fn dispatch(&self, backend: &dyn ImageBackend, prompt: &str) -> Result<RenderedImage, ImageError> {
        self.limiter.acquire(backend.provider()).await;
        backend.render(&enhance_prompt(prompt), self.size).await
    }
}
