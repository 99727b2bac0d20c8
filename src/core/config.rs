use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::core::story::{GenerationRequest, ImageProvider, TextProvider};
use crate::services::image::ImageSize;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_output")]
    pub output_folder: String,

    #[serde(default = "default_library")]
    pub library_folder: String,

    #[serde(default)]
    pub unattended: bool,

    /// Request used as-is in unattended mode, and as prompt defaults otherwise.
    #[serde(default)]
    pub request: Option<GenerationRequest>,

    #[serde(default)]
    pub story: StoryConfig,

    #[serde(default)]
    pub text: TextConfig,

    #[serde(default)]
    pub image: ImageConfig,

    #[serde(default)]
    pub narration: NarrationConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StoryConfig {
    #[serde(default = "default_words_per_section")]
    pub words_per_section: usize,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_word_count")]
    pub default_word_count: u32,
}

impl Default for StoryConfig {
    fn default() -> Self {
        Self {
            words_per_section: default_words_per_section(),
            language: default_language(),
            default_word_count: default_word_count(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct TextConfig {
    #[serde(default)]
    pub provider: TextProvider,
    pub openai: Option<OpenAIConfig>,
    pub gemini: Option<GeminiConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ImageConfig {
    #[serde(default)]
    pub provider: ImageProvider,
    #[serde(default)]
    pub size: ImageSize,
    #[serde(default = "default_image_concurrency")]
    pub concurrency: usize,
    pub dalle: Option<OpenAIConfig>,
    pub gemini: Option<GeminiConfig>,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            provider: ImageProvider::default(),
            size: ImageSize::default(),
            concurrency: default_image_concurrency(),
            dalle: None,
            gemini: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct OpenAIConfig {
    #[serde(default)]
    pub api_key: String,
    pub model: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct GeminiConfig {
    #[serde(default)]
    pub api_key: String,
    pub model: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NarrationConfig {
    #[serde(default = "default_narration_enabled")]
    pub enabled: bool,
    #[serde(default = "default_voice")]
    pub voice: String,
}

impl Default for NarrationConfig {
    fn default() -> Self {
        Self {
            enabled: default_narration_enabled(),
            voice: default_voice(),
        }
    }
}

fn default_output() -> String {
    "output".to_string()
}
fn default_library() -> String {
    "library".to_string()
}
fn default_words_per_section() -> usize {
    50
}
fn default_language() -> String {
    "English".to_string()
}
fn default_word_count() -> u32 {
    500
}
fn default_image_concurrency() -> usize {
    1
}
fn default_narration_enabled() -> bool {
    true
}
fn default_voice() -> String {
    "en-US-AnaNeural".to_string()
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Path::new("config.yml");
        if !path.exists() {
            anyhow::bail!("config.yml not found. Please create one.");
        }

        let content = fs::read_to_string(path).context("Failed to read config.yml")?;
        let mut config = Self::parse(&content)?;
        config.apply_env_keys();
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        serde_yaml_ng::from_str(content).context("Failed to parse config.yml")
    }

    pub fn save(&self) -> Result<()> {
        let content = serde_yaml_ng::to_string(self)?;
        fs::write("config.yml", content).context("Failed to write config.yml")?;
        Ok(())
    }

    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.output_folder)?;
        fs::create_dir_all(&self.library_folder)?;
        Ok(())
    }

    /// Fills empty API keys from `OPENAI_API_KEY` / `GOOGLE_API_KEY`.
    pub fn apply_env_keys(&mut self) {
        self.apply_keys(
            std::env::var("OPENAI_API_KEY").ok(),
            std::env::var("GOOGLE_API_KEY").ok(),
        );
    }

    fn apply_keys(&mut self, openai: Option<String>, google: Option<String>) {
        if let Some(key) = openai.filter(|k| !k.trim().is_empty()) {
            fill_key(&mut self.text.openai.get_or_insert_with(Default::default).api_key, &key);
            fill_key(&mut self.image.dalle.get_or_insert_with(Default::default).api_key, &key);
        }
        if let Some(key) = google.filter(|k| !k.trim().is_empty()) {
            fill_key(&mut self.text.gemini.get_or_insert_with(Default::default).api_key, &key);
            fill_key(&mut self.image.gemini.get_or_insert_with(Default::default).api_key, &key);
        }
    }
}

fn fill_key(slot: &mut String, key: &str) {
    if slot.trim().is_empty() {
        *slot = key.to_string();
    }
}
