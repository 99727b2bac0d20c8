//! Story data model shared by the orchestrators, the library and the exporters.

use crate::core::error::RequestError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum TextProvider {
    #[default]
    OpenAi,
    Gemini,
}

impl TextProvider {
    pub fn other(self) -> Self {
        match self {
            TextProvider::OpenAi => TextProvider::Gemini,
            TextProvider::Gemini => TextProvider::OpenAi,
        }
    }
}

impl fmt::Display for TextProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextProvider::OpenAi => write!(f, "openai"),
            TextProvider::Gemini => write!(f, "gemini"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ImageProvider {
    #[default]
    Dalle,
    Gemini,
}

impl ImageProvider {
    pub fn other(self) -> Self {
        match self {
            ImageProvider::Dalle => ImageProvider::Gemini,
            ImageProvider::Gemini => ImageProvider::Dalle,
        }
    }
}

impl fmt::Display for ImageProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageProvider::Dalle => write!(f, "dalle"),
            ImageProvider::Gemini => write!(f, "gemini"),
        }
    }
}

/// Optional free-text physical description of the main character.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct CharacterAttributes {
    pub age: Option<String>,
    pub gender: Option<String>,
    pub hair_color: Option<String>,
    pub hair_type: Option<String>,
    pub skin_color: Option<String>,
}

impl CharacterAttributes {
    /// Comma separated description, e.g. "7 years old, girl, curly red hair".
    pub fn describe(&self) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(age) = non_blank(&self.age) {
            parts.push(format!("{} years old", age));
        }
        if let Some(gender) = non_blank(&self.gender) {
            parts.push(gender.to_string());
        }
        match (non_blank(&self.hair_type), non_blank(&self.hair_color)) {
            (Some(kind), Some(color)) => parts.push(format!("{} {} hair", kind, color)),
            (Some(kind), None) => parts.push(format!("{} hair", kind)),
            (None, Some(color)) => parts.push(format!("{} hair", color)),
            (None, None) => {}
        }
        if let Some(skin) = non_blank(&self.skin_color) {
            parts.push(format!("{} skin", skin));
        }

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(", "))
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GenerationRequest {
    pub character_name: String,
    pub character_type: String,
    #[serde(default)]
    pub attributes: CharacterAttributes,
    pub setting: String,
    pub theme: String,
    pub target_word_count: u32,
    #[serde(default)]
    pub text_provider: TextProvider,
    #[serde(default)]
    pub image_provider: ImageProvider,
}

impl GenerationRequest {
    pub fn validate(&self) -> Result<(), RequestError> {
        let required = [
            ("character_name", &self.character_name),
            ("character_type", &self.character_type),
            ("setting", &self.setting),
            ("theme", &self.theme),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(RequestError::MissingField(field));
            }
        }
        if self.target_word_count == 0 {
            return Err(RequestError::InvalidWordCount);
        }
        Ok(())
    }

    /// "Mila and the Space Station"
    pub fn title(&self) -> String {
        let setting = self
            .setting
            .split_whitespace()
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ");
        format!("{} and the {}", self.character_name.trim(), setting)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TextStatus {
    /// First attempt landed inside the tolerance band.
    Accepted,
    /// Over-long output cut down to the adjusted target.
    Truncated,
    /// A stricter second attempt was made; the closer of the two was kept.
    Retried,
    /// Every provider failed; `text` holds a user-facing message.
    Failed,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StoryText {
    pub text: String,
    pub word_count: usize,
    pub adjusted_target: usize,
    pub provider: Option<TextProvider>,
    pub status: TextStatus,
}

impl StoryText {
    pub fn is_failure(&self) -> bool {
        self.status == TextStatus::Failed
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Section {
    pub index: usize,
    pub text: String,
    pub word_count: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Generated,
    Placeholder,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ImageArtifact {
    #[serde(with = "base64_bytes")]
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub provenance: Provenance,
    pub provider: Option<ImageProvider>,
}

impl ImageArtifact {
    pub fn generated(bytes: Vec<u8>, mime_type: &str, provider: ImageProvider) -> Self {
        Self {
            bytes,
            mime_type: mime_type.to_string(),
            provenance: Provenance::Generated,
            provider: Some(provider),
        }
    }

    pub fn placeholder(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            mime_type: "image/png".to_string(),
            provenance: Provenance::Placeholder,
            provider: None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.provenance == Provenance::Placeholder
    }

    pub fn extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/jpeg" => "jpg",
            "image/webp" => "webp",
            _ => "png",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StoryPage {
    pub section: Section,
    pub image: ImageArtifact,
    #[serde(default)]
    pub audio: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SoundEffect {
    pub file: String,
    pub description: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StoryArtifact {
    pub title: String,
    pub request: GenerationRequest,
    pub text: StoryText,
    pub pages: Vec<StoryPage>,
    #[serde(default)]
    pub sound_effects: BTreeMap<String, SoundEffect>,
    pub created_at: DateTime<Utc>,
}

impl StoryArtifact {
    pub fn placeholder_count(&self) -> usize {
        self.pages.iter().filter(|p| p.image.is_placeholder()).count()
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64.decode(encoded.as_bytes()).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> GenerationRequest {
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

    #[test]
    fn test_validate_rejects_blank_fields() {
        assert!(request().validate().is_ok());

        let mut req = request();
        req.setting = "   ".to_string();
        assert_eq!(req.validate(), Err(RequestError::MissingField("setting")));

        let mut req = request();
        req.character_name.clear();
        assert_eq!(req.validate(), Err(RequestError::MissingField("character_name")));

        let mut req = request();
        req.target_word_count = 0;
        assert_eq!(req.validate(), Err(RequestError::InvalidWordCount));
    }

    #[test]
    fn test_title_from_name_and_setting() {
        assert_eq!(request().title(), "Mila and the Space Station");
    }

    #[test]
    fn test_describe_attributes() {
        let attrs = CharacterAttributes {
            age: Some("7".to_string()),
            gender: Some("girl".to_string()),
            hair_color: Some("red".to_string()),
            hair_type: Some("curly".to_string()),
            skin_color: None,
        };
        assert_eq!(attrs.describe().as_deref(), Some("7 years old, girl, curly red hair"));
        assert_eq!(CharacterAttributes::default().describe(), None);
    }

    #[test]
    fn test_image_bytes_serialize_as_base64() {
        let artifact = ImageArtifact::placeholder(vec![1, 2, 3]);
        let json = serde_json::to_string(&artifact).unwrap();
        assert!(json.contains("\"AQID\""));
        let back: ImageArtifact = serde_json::from_str(&json).unwrap();
        assert_eq!(back, artifact);
    }

    #[test]
    fn test_request_provider_defaults() {
        let yaml = "character_name: Mila\ncharacter_type: cat\nsetting: forest\ntheme: friendship\ntarget_word_count: 100\n";
        let req: GenerationRequest = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(req.text_provider, TextProvider::OpenAi);
        assert_eq!(req.image_provider, ImageProvider::Dalle);
        assert_eq!(req.attributes, CharacterAttributes::default());
    }
}
