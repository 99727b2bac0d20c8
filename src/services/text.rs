//! Length-constrained story text generation across the configured text backends.

use crate::core::story::{GenerationRequest, StoryText, TextProvider, TextStatus};
use crate::services::llm::{CompletionRequest, TextBackend};
use crate::utils::text::{count_words, strip_meta, truncate_words};
use anyhow::{anyhow, Result};
use log::{error, info, warn};
use std::sync::Arc;

/// Generators under-deliver against the requested length, so the prompt asks
/// for 140% of the caller's target.
pub const TARGET_MULTIPLIER_PERCENT: usize = 140;
/// Accepted band around the adjusted target, in percent.
pub const LOWER_BAND_PERCENT: usize = 80;
pub const UPPER_BAND_PERCENT: usize = 120;

pub const STANDARD_TEMPERATURE: f32 = 0.7;
pub const STRICT_TEMPERATURE: f32 = 0.3;
const MAX_OUTPUT_TOKENS: u32 = 4000;
const TOKENS_PER_WORD: u32 = 10;

pub const FAILURE_MESSAGE: &str =
    "We could not write this story right now. Please try again in a little while.";

const SYSTEM_PROMPT: &str = "You are a children's story writer who follows word-count constraints exactly. \
You only ever return the story itself.";

/// `ceil(target × 1.4)`
pub fn adjusted_target(target_word_count: u32) -> usize {
    (target_word_count as usize)
        .saturating_mul(TARGET_MULTIPLIER_PERCENT)
        .div_ceil(100)
}

/// `min(4000, adjusted × 10)`, saturating for very large targets.
fn token_hint(adjusted: usize) -> u32 {
    let hint = adjusted
        .saturating_mul(TOKENS_PER_WORD as usize)
        .min(MAX_OUTPUT_TOKENS as usize);
    hint as u32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthVerdict {
    TooShort,
    WithinBand,
    TooLong,
}

pub fn assess(word_count: usize, adjusted: usize) -> LengthVerdict {
    let scaled = word_count.saturating_mul(100);
    if scaled > adjusted.saturating_mul(UPPER_BAND_PERCENT) {
        LengthVerdict::TooLong
    } else if scaled < adjusted.saturating_mul(LOWER_BAND_PERCENT) {
        LengthVerdict::TooShort
    } else {
        LengthVerdict::WithinBand
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strictness {
    Standard,
    Strict,
}

#[derive(Debug, Clone)]
struct Draft {
    text: String,
    word_count: usize,
    provider: TextProvider,
}

impl Draft {
    fn distance(&self, adjusted: usize) -> usize {
        self.word_count.abs_diff(adjusted)
    }

    fn truncated(self, adjusted: usize) -> Self {
        let text = truncate_words(&self.text, adjusted);
        Self {
            word_count: count_words(&text),
            text,
            provider: self.provider,
        }
    }
}

/// Progress of one `generate` call. The only transition out of `Retried` is
/// `Resolved`, so a second retry cannot be expressed.
enum Stage {
    Attempted(Draft),
    Retried { original: Draft, retry: Draft },
    Resolved(Draft, TextStatus),
}

pub struct TextOrchestrator {
    backends: Vec<Arc<dyn TextBackend>>,
    language: String,
}

impl TextOrchestrator {
    pub fn new(backends: Vec<Arc<dyn TextBackend>>, language: &str) -> Self {
        Self {
            backends,
            language: language.to_string(),
        }
    }

    /// Produces story text near the adjusted target. Never fails: when every
    /// backend errors the result carries `FAILURE_MESSAGE` and `TextStatus::Failed`.
    pub async fn generate(&self, request: &GenerationRequest) -> StoryText {
        let adjusted = adjusted_target(request.target_word_count);
        info!(
            "Generating story text: target {} words, adjusted target {}",
            request.target_word_count, adjusted
        );

        let first = match self.complete_with_fallback(request, adjusted, Strictness::Standard).await {
            Ok(draft) => draft,
            Err(e) => {
                error!("All text backends failed: {:#}", e);
                return failure(adjusted);
            }
        };

        let mut stage = Stage::Attempted(first);
        loop {
            stage = match stage {
                Stage::Attempted(draft) => match assess(draft.word_count, adjusted) {
                    LengthVerdict::WithinBand => Stage::Resolved(draft, TextStatus::Accepted),
                    LengthVerdict::TooLong => {
                        warn!("Story has {} words, truncating to {}", draft.word_count, adjusted);
                        Stage::Resolved(draft.truncated(adjusted), TextStatus::Truncated)
                    }
                    LengthVerdict::TooShort => {
                        warn!(
                            "Story has {} words (band starts at {}), retrying once with a stricter prompt",
                            draft.word_count,
                            adjusted.saturating_mul(LOWER_BAND_PERCENT).div_ceil(100)
                        );
                        match self.complete_with_fallback(request, adjusted, Strictness::Strict).await {
                            Ok(retry) => Stage::Retried { original: draft, retry },
                            Err(e) => {
                                warn!("Stricter retry failed, keeping first draft: {:#}", e);
                                Stage::Resolved(draft, TextStatus::Retried)
                            }
                        }
                    }
                },
                Stage::Retried { original, retry } => {
                    let best = if retry.distance(adjusted) < original.distance(adjusted) {
                        info!("Keeping retry ({} words) over first draft ({} words)", retry.word_count, original.word_count);
                        retry
                    } else {
                        info!("Keeping first draft ({} words) over retry ({} words)", original.word_count, retry.word_count);
                        original
                    };
                    if assess(best.word_count, adjusted) == LengthVerdict::TooLong {
                        Stage::Resolved(best.truncated(adjusted), TextStatus::Truncated)
                    } else {
                        Stage::Resolved(best, TextStatus::Retried)
                    }
                }
                Stage::Resolved(draft, status) => {
                    info!("Story text resolved: {} words from {} ({:?})", draft.word_count, draft.provider, status);
                    return StoryText {
                        text: draft.text,
                        word_count: draft.word_count,
                        adjusted_target: adjusted,
                        provider: Some(draft.provider),
                        status,
                    };
                }
            };
        }
    }

    /// Preferred backend first, then the rest in configuration order.
    fn provider_order(&self, preferred: TextProvider) -> Vec<&Arc<dyn TextBackend>> {
        let mut ordered: Vec<&Arc<dyn TextBackend>> =
            self.backends.iter().filter(|b| b.provider() == preferred).collect();
        ordered.extend(self.backends.iter().filter(|b| b.provider() != preferred));
        ordered
    }

    async fn complete_with_fallback(
        &self,
        request: &GenerationRequest,
        adjusted: usize,
        strictness: Strictness,
    ) -> Result<Draft> {
        let completion = CompletionRequest {
            system: SYSTEM_PROMPT.to_string(),
            prompt: build_prompt(request, &self.language, adjusted, strictness),
            max_output_tokens: token_hint(adjusted),
            temperature: match strictness {
                Strictness::Standard => STANDARD_TEMPERATURE,
                Strictness::Strict => STRICT_TEMPERATURE,
            },
        };

        let mut last_error = None;
        for backend in self.provider_order(request.text_provider) {
            match backend.complete(&completion).await {
                Ok(raw) => {
                    let text = strip_meta(&raw);
                    let word_count = count_words(&text);
                    if word_count == 0 {
                        warn!("{} returned an empty story, trying next backend", backend.provider());
                        last_error = Some(anyhow!("{} returned an empty story", backend.provider()));
                        continue;
                    }
                    return Ok(Draft {
                        text,
                        word_count,
                        provider: backend.provider(),
                    });
                }
                Err(e) => {
                    warn!("Text backend {} failed: {:#}", backend.provider(), e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow!("No text backend configured")))
    }
}

fn failure(adjusted: usize) -> StoryText {
    StoryText {
        text: FAILURE_MESSAGE.to_string(),
        word_count: count_words(FAILURE_MESSAGE),
        adjusted_target: adjusted,
        provider: None,
        status: TextStatus::Failed,
    }
}

fn build_prompt(
    request: &GenerationRequest,
    language: &str,
    adjusted: usize,
    strictness: Strictness,
) -> String {
    let character = match request.attributes.describe() {
        Some(attrs) => format!("{}, a {} ({})", request.character_name, request.character_type, attrs),
        None => format!("{}, a {}", request.character_name, request.character_type),
    };

    let opening = match strictness {
        Strictness::Standard => format!(
            "Write a children's story of exactly {} words in {}.",
            adjusted, language
        ),
        Strictness::Strict => format!(
            "TASK: Write a children's story in {} that contains EXACTLY {} words.",
            language, adjusted
        ),
    };

    let mut prompt = format!(
        "{}\n\
        \nThe story must have these features:\
        \n- Main character: {}\
        \n- Setting: {}\
        \n- Theme: {}\
        \n- Educational and child-friendly, using simple language that children aged 7-10 understand\
        \n\nRules:\
        \n- Return only the story text.\
        \n- Do not add a title.\
        \n- Do not state the word count anywhere in the text (no sentences like \"This story has {} words\").\
        \n- Do not add notes, explanations or any other commentary.",
        opening, character, request.setting, request.theme, adjusted
    );

    if strictness == Strictness::Strict {
        prompt.push_str(&format!(
            "\n\nIMPORTANT:\
            \n- The story must contain EXACTLY {} words, not one more and not one less.\
            \n- Verify the word count three times before answering.",
            adjusted
        ));
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::story::{CharacterAttributes, ImageProvider};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ")
    }

    /// Backend that replays a fixed script of responses and records every request.
    #[derive(Debug)]
    struct ScriptedBackend {
        provider: TextProvider,
        script: Mutex<VecDeque<Result<String, String>>>,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedBackend {
        fn new(provider: TextProvider, script: Vec<Result<String, String>>) -> Arc<Self> {
            Arc::new(Self {
                provider,
                script: Mutex::new(script.into()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }

        fn requests(&self) -> Vec<CompletionRequest> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TextBackend for ScriptedBackend {
        fn provider(&self) -> TextProvider {
            self.provider
        }

        async fn complete(&self, request: &CompletionRequest) -> Result<String> {
            self.seen.lock().unwrap().push(request.clone());
            match self.script.lock().unwrap().pop_front() {
                Some(Ok(text)) => Ok(text),
                Some(Err(msg)) => Err(anyhow!(msg)),
                None => Err(anyhow!("script exhausted")),
            }
        }
    }

    fn request(target: u32) -> GenerationRequest {
        GenerationRequest {
            character_name: "Mila".to_string(),
            character_type: "scientist".to_string(),
            attributes: CharacterAttributes::default(),
            setting: "space station".to_string(),
            theme: "discovery".to_string(),
            target_word_count: target,
            text_provider: TextProvider::OpenAi,
            image_provider: ImageProvider::Dalle,
        }
    }

    fn orchestrator(backends: Vec<Arc<dyn TextBackend>>) -> TextOrchestrator {
        TextOrchestrator::new(backends, "English")
    }

    #[test]
    fn test_adjusted_target() {
        assert_eq!(adjusted_target(200), 280);
        assert_eq!(adjusted_target(500), 700);
        assert_eq!(adjusted_target(7), 10);
        assert_eq!(adjusted_target(1), 2);
    }

    #[test]
    fn test_band_boundaries() {
        assert_eq!(assess(224, 280), LengthVerdict::WithinBand);
        assert_eq!(assess(336, 280), LengthVerdict::WithinBand);
        assert_eq!(assess(223, 280), LengthVerdict::TooShort);
        assert_eq!(assess(337, 280), LengthVerdict::TooLong);
    }

    #[tokio::test]
    async fn test_within_band_accepted_unmodified() {
        let a = ScriptedBackend::new(TextProvider::OpenAi, vec![Ok(words(300))]);
        let story = orchestrator(vec![a.clone()]).generate(&request(200)).await;

        assert_eq!(story.status, TextStatus::Accepted);
        assert_eq!(story.word_count, 300);
        assert_eq!(story.adjusted_target, 280);
        assert_eq!(story.provider, Some(TextProvider::OpenAi));
        assert_eq!(a.calls(), 1);
    }

    #[tokio::test]
    async fn test_overlong_text_truncated_to_adjusted_target() {
        let a = ScriptedBackend::new(TextProvider::OpenAi, vec![Ok(words(400))]);
        let story = orchestrator(vec![a.clone()]).generate(&request(200)).await;

        assert_eq!(story.status, TextStatus::Truncated);
        assert_eq!(story.word_count, 280);
        assert!(count_words(&story.text) <= story.adjusted_target);
        assert_eq!(a.calls(), 1);
    }

    #[tokio::test]
    async fn test_short_text_retried_exactly_once() {
        let a = ScriptedBackend::new(
            TextProvider::OpenAi,
            vec![Ok(words(100)), Ok(words(100)), Ok(words(100))],
        );
        let story = orchestrator(vec![a.clone()]).generate(&request(200)).await;

        assert_eq!(a.calls(), 2);
        assert_eq!(story.status, TextStatus::Retried);
        assert_eq!(story.word_count, 100);

        let requests = a.requests();
        assert_eq!(requests[0].temperature, STANDARD_TEMPERATURE);
        assert_eq!(requests[1].temperature, STRICT_TEMPERATURE);
        assert!(!requests[0].prompt.contains("three times"));
        assert!(requests[1].prompt.contains("three times"));
    }

    #[tokio::test]
    async fn test_retry_kept_when_closer() {
        let a = ScriptedBackend::new(TextProvider::OpenAi, vec![Ok(words(100)), Ok(words(250))]);
        let story = orchestrator(vec![a.clone()]).generate(&request(200)).await;

        assert_eq!(story.word_count, 250);
        assert_eq!(story.status, TextStatus::Retried);
    }

    #[tokio::test]
    async fn test_retry_tie_keeps_original() {
        // both 80 words away from 280
        let a = ScriptedBackend::new(TextProvider::OpenAi, vec![Ok(words(200)), Ok(words(360))]);
        let story = orchestrator(vec![a.clone()]).generate(&request(200)).await;

        assert_eq!(story.word_count, 200);
        assert_eq!(story.status, TextStatus::Retried);
    }

    #[tokio::test]
    async fn test_overlong_retry_is_capped() {
        let a = ScriptedBackend::new(TextProvider::OpenAi, vec![Ok(words(50)), Ok(words(400))]);
        let story = orchestrator(vec![a.clone()]).generate(&request(200)).await;

        assert_eq!(story.status, TextStatus::Truncated);
        assert_eq!(story.word_count, 280);
    }

    #[tokio::test]
    async fn test_retry_failure_keeps_first_draft() {
        let a = ScriptedBackend::new(TextProvider::OpenAi, vec![Ok(words(100)), Err("down".to_string())]);
        let story = orchestrator(vec![a.clone()]).generate(&request(200)).await;

        assert_eq!(a.calls(), 2);
        assert_eq!(story.word_count, 100);
        assert!(!story.is_failure());
    }

    #[tokio::test]
    async fn test_falls_back_to_second_provider() {
        let a = ScriptedBackend::new(TextProvider::OpenAi, vec![Err("503".to_string())]);
        let b = ScriptedBackend::new(TextProvider::Gemini, vec![Ok(words(280))]);
        let story = orchestrator(vec![a.clone(), b.clone()]).generate(&request(200)).await;

        assert_eq!(story.provider, Some(TextProvider::Gemini));
        assert_eq!(story.status, TextStatus::Accepted);
        assert_eq!(a.calls(), 1);
        assert_eq!(b.calls(), 1);
    }

    #[tokio::test]
    async fn test_preferred_provider_called_first() {
        let a = ScriptedBackend::new(TextProvider::OpenAi, vec![Ok(words(280))]);
        let b = ScriptedBackend::new(TextProvider::Gemini, vec![Ok(words(280))]);
        let mut req = request(200);
        req.text_provider = TextProvider::Gemini;
        let story = orchestrator(vec![a.clone(), b.clone()]).generate(&req).await;

        assert_eq!(story.provider, Some(TextProvider::Gemini));
        assert_eq!(a.calls(), 0);
        assert_eq!(b.calls(), 1);
    }

    #[tokio::test]
    async fn test_empty_response_is_unusable() {
        let a = ScriptedBackend::new(TextProvider::OpenAi, vec![Ok("Word count: 0".to_string())]);
        let b = ScriptedBackend::new(TextProvider::Gemini, vec![Ok(words(280))]);
        let story = orchestrator(vec![a.clone(), b.clone()]).generate(&request(200)).await;

        assert_eq!(story.provider, Some(TextProvider::Gemini));
    }

    #[tokio::test]
    async fn test_total_failure_returns_sentinel() {
        let a = ScriptedBackend::new(TextProvider::OpenAi, vec![Err("401".to_string())]);
        let b = ScriptedBackend::new(TextProvider::Gemini, vec![Err("429".to_string())]);
        let story = orchestrator(vec![a, b]).generate(&request(200)).await;

        assert!(story.is_failure());
        assert_eq!(story.text, FAILURE_MESSAGE);
        assert_eq!(story.provider, None);
        assert_eq!(story.word_count, count_words(FAILURE_MESSAGE));
    }

    #[tokio::test]
    async fn test_single_backend_failure_returns_sentinel() {
        let a = ScriptedBackend::new(TextProvider::OpenAi, vec![Err("timeout".to_string())]);
        let story = orchestrator(vec![a]).generate(&request(200)).await;
        assert!(story.is_failure());

        let story = orchestrator(vec![]).generate(&request(200)).await;
        assert!(story.is_failure());
    }

    #[tokio::test]
    async fn test_meta_noise_removed_from_result() {
        let noisy = format!("Mila's Big Day:\n\n{}\n\nWord count: 280", words(280));
        let a = ScriptedBackend::new(TextProvider::OpenAi, vec![Ok(noisy)]);
        let story = orchestrator(vec![a]).generate(&request(200)).await;

        assert_eq!(story.word_count, 280);
        assert!(!story.text.contains("Word count"));
        assert!(!story.text.contains("Big Day"));
    }

    #[tokio::test]
    async fn test_prompt_contents() {
        let a = ScriptedBackend::new(TextProvider::OpenAi, vec![Ok(words(700))]);
        let mut req = request(500);
        req.attributes.hair_color = Some("red".to_string());
        orchestrator(vec![a.clone()]).generate(&req).await;

        let sent = &a.requests()[0];
        assert_eq!(sent.max_output_tokens, 4000);
        assert!(sent.prompt.contains("exactly 700 words"));
        assert!(sent.prompt.contains("Mila, a scientist (red hair)"));
        assert!(sent.prompt.contains("Setting: space station"));
        assert!(sent.prompt.contains("Theme: discovery"));
        assert!(sent.prompt.contains("Do not add a title."));
        assert!(sent.prompt.contains("Do not state the word count"));
    }

    #[test]
    fn test_token_hint_saturates() {
        assert_eq!(token_hint(0), 0);
        assert_eq!(token_hint(70), 700);
        assert_eq!(token_hint(400), 4000);
        assert_eq!(token_hint(usize::MAX), 4000);
        assert_eq!(adjusted_target(u32::MAX), (u32::MAX as usize * 140).div_ceil(100));
    }

    #[tokio::test]
    async fn test_huge_target_does_not_overflow() {
        let a = ScriptedBackend::new(TextProvider::OpenAi, vec![Ok(words(70))]);
        let story = orchestrator(vec![a.clone()]).generate(&request(1_000_000_000)).await;

        assert_eq!(story.adjusted_target, 1_400_000_000);
        assert_eq!(story.status, TextStatus::Retried);
        assert_eq!(story.word_count, 70);
        assert!(a.requests().iter().all(|r| r.max_output_tokens == 4000));
    }

    #[tokio::test]
    async fn test_word_count_matches_returned_text() {
        let noisy = format!("Mila's Adventure:\n\nChapter One:\n{}", words(280));
        let a = ScriptedBackend::new(TextProvider::OpenAi, vec![Ok(noisy)]);
        let story = orchestrator(vec![a]).generate(&request(200)).await;

        assert_eq!(story.status, TextStatus::Accepted);
        assert_eq!(story.word_count, story.text.split_whitespace().count());
        assert!(!story.text.contains("Chapter One"));
    }

    #[tokio::test]
    async fn test_token_hint_scales_with_small_targets() {
        let a = ScriptedBackend::new(TextProvider::OpenAi, vec![Ok(words(70))]);
        orchestrator(vec![a.clone()]).generate(&request(50)).await;
        assert_eq!(a.requests()[0].max_output_tokens, 700);
    }
}
