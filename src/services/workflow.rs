use crate::core::config::Config;
use crate::core::error::RequestError;
use crate::core::story::{GenerationRequest, StoryArtifact, StoryPage};
use crate::services::illustrator::{page_prompt, ImageOrchestrator};
use crate::services::image::rate_limit::RateLimiter;
use crate::services::image::ImageBackend;
use crate::services::llm::TextBackend;
use crate::services::sound_effects::find_sound_effects;
use crate::services::text::TextOrchestrator;
use crate::utils::text::split_sections;
use chrono::Utc;
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::sync::Arc;

/// Runs one request end to end: text, pagination, illustration, assembly.
pub struct StoryGenerator {
    text: TextOrchestrator,
    images: ImageOrchestrator,
    words_per_section: usize,
    concurrency: usize,
}

impl StoryGenerator {
    pub fn new(
        config: &Config,
        text_backends: Vec<Arc<dyn TextBackend>>,
        image_backends: Vec<Arc<dyn ImageBackend>>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            text: TextOrchestrator::new(text_backends, &config.story.language),
            images: ImageOrchestrator::new(image_backends, limiter, config.image.size),
            words_per_section: config.story.words_per_section.max(1),
            concurrency: config.image.concurrency.max(1),
        }
    }

    /// Only an invalid request is an error. Provider failures degrade into
    /// sentinel text and placeholder images instead.
    pub async fn generate_story(&self, request: &GenerationRequest) -> Result<StoryArtifact, RequestError> {
        request.validate()?;
        let title = request.title();
        println!("Writing \"{}\"...", title);

        let text = self.text.generate(request).await;
        if text.is_failure() {
            warn!("Story text generation failed, continuing with the failure notice");
        }

        let sections = split_sections(&text.text, self.words_per_section);
        info!("Story split into {} pages of up to {} words", sections.len(), self.words_per_section);

        let pb = ProgressBar::new(sections.len() as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} pages ({eta})")
        {
            pb.set_style(style.progress_chars("#>-"));
        }

        let images = &self.images;
        let pages: Vec<StoryPage> = futures_util::stream::iter(sections)
            .map(|section| {
                let pb = pb.clone();
                async move {
                    let prompt = page_prompt(request, &section);
                    let image = images.generate_for_prompt(&prompt, request.image_provider).await;
                    pb.inc(1);
                    StoryPage { section, image, audio: None }
                }
            })
            .buffered(self.concurrency)
            .collect()
            .await;
        pb.finish_with_message("Illustrations complete");

        let artifact = StoryArtifact {
            title,
            request: request.clone(),
            sound_effects: find_sound_effects(&text.text),
            text,
            pages,
            created_at: Utc::now(),
        };

        let placeholders = artifact.placeholder_count();
        if placeholders > 0 {
            warn!("{} of {} pages use placeholder images", placeholders, artifact.pages.len());
        }
        info!("Story \"{}\" assembled with {} pages", artifact.title, artifact.pages.len());
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::story::{CharacterAttributes, ImageProvider, Provenance, TextProvider, TextStatus};
    use crate::services::image::{ImageError, ImageSize, RenderedImage};
    use crate::services::llm::CompletionRequest;
    use crate::services::text::FAILURE_MESSAGE;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct FixedTextBackend {
        provider: TextProvider,
        reply: Option<String>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TextBackend for FixedTextBackend {
        fn provider(&self) -> TextProvider {
            self.provider
        }

        async fn complete(&self, _request: &CompletionRequest) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.clone().ok_or_else(|| anyhow!("backend offline"))
        }
    }

    #[derive(Debug)]
    struct FixedImageBackend {
        provider: ImageProvider,
        succeed: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ImageBackend for FixedImageBackend {
        fn provider(&self) -> ImageProvider {
            self.provider
        }

        async fn render(&self, _prompt: &str, _size: ImageSize) -> Result<RenderedImage, ImageError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.succeed {
                Ok(RenderedImage { bytes: vec![1, 2, 3], mime_type: "image/png".to_string() })
            } else {
                Err(ImageError::Other("offline".to_string()))
            }
        }
    }

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("word{}", i)).collect::<Vec<_>>().join(" ")
    }

    fn mila() -> GenerationRequest {
        GenerationRequest {
            character_name: "Mila".to_string(),
            character_type: "scientist".to_string(),
            attributes: CharacterAttributes::default(),
            setting: "space station".to_string(),
            theme: "discovery".to_string(),
            target_word_count: 200,
            text_provider: TextProvider::OpenAi,
            image_provider: ImageProvider::Dalle,
        }
    }

    fn text_backend(provider: TextProvider, reply: Option<String>) -> Arc<FixedTextBackend> {
        Arc::new(FixedTextBackend { provider, reply, calls: AtomicUsize::new(0) })
    }

    fn image_backend(provider: ImageProvider, succeed: bool) -> Arc<FixedImageBackend> {
        Arc::new(FixedImageBackend { provider, succeed, calls: AtomicUsize::new(0) })
    }

    fn generator(
        text: Vec<Arc<FixedTextBackend>>,
        images: Vec<Arc<FixedImageBackend>>,
    ) -> StoryGenerator {
        let config = Config::parse("unattended: true\n").unwrap();
        StoryGenerator::new(
            &config,
            text.into_iter().map(|b| b as Arc<dyn TextBackend>).collect(),
            images.into_iter().map(|b| b as Arc<dyn ImageBackend>).collect(),
            Arc::new(RateLimiter::new()),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_mila_end_to_end() {
        let openai = text_backend(TextProvider::OpenAi, Some(words(210)));
        let gemini = text_backend(TextProvider::Gemini, Some(words(300)));
        let dalle = image_backend(ImageProvider::Dalle, true);
        let story = generator(vec![openai.clone(), gemini.clone()], vec![dalle.clone()])
            .generate_story(&mila())
            .await
            .unwrap();

        // 210 is under the band for adjusted target 280; the equally short retry loses the tie.
        assert_eq!(openai.calls.load(Ordering::SeqCst), 2);
        assert_eq!(gemini.calls.load(Ordering::SeqCst), 0);
        assert_eq!(story.text.word_count, 210);
        assert_eq!(story.text.adjusted_target, 280);
        assert_eq!(story.text.status, TextStatus::Retried);

        let lengths: Vec<usize> = story.pages.iter().map(|p| p.section.word_count).collect();
        assert_eq!(lengths, vec![50, 50, 50, 50, 10]);
        assert_eq!(dalle.calls.load(Ordering::SeqCst), 5);
        assert!(story.pages.iter().all(|p| p.image.provenance == Provenance::Generated));
        assert_eq!(story.title, "Mila and the Space Station");
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_request_invokes_no_provider() {
        let openai = text_backend(TextProvider::OpenAi, Some(words(280)));
        let dalle = image_backend(ImageProvider::Dalle, true);
        let mut request = mila();
        request.setting = "  ".to_string();

        let err = generator(vec![openai.clone()], vec![dalle.clone()])
            .generate_story(&request)
            .await
            .unwrap_err();
        assert!(matches!(err, RequestError::MissingField("setting")));
        assert_eq!(openai.calls.load(Ordering::SeqCst), 0);
        assert_eq!(dalle.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_total_failure_still_yields_artifact() {
        let openai = text_backend(TextProvider::OpenAi, None);
        let dalle = image_backend(ImageProvider::Dalle, false);
        let story = generator(vec![openai], vec![dalle])
            .generate_story(&mila())
            .await
            .unwrap();

        assert!(story.text.is_failure());
        assert_eq!(story.text.text, FAILURE_MESSAGE);
        assert!(!story.pages.is_empty());
        assert_eq!(story.placeholder_count(), story.pages.len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sound_effects_attached() {
        let text = format!("{} the dog barked at the door", words(270));
        let openai = text_backend(TextProvider::OpenAi, Some(text));
        let story = generator(vec![openai], Vec::new()).generate_story(&mila()).await.unwrap();

        let keys: Vec<&str> = story.sound_effects.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["dog", "door"]);
    }
}
