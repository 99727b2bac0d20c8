//! Saved stories on top of a `Storage` backend.
//!
//! Keys: `{id}/story.json` plus `{id}/page_NNN.mp3` for narration.

use crate::core::io::Storage;
use crate::core::story::StoryArtifact;
use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

const RECORD_FILE: &str = "story.json";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SavedStory {
    pub id: String,
    pub saved_at: DateTime<Utc>,
    #[serde(default)]
    pub favorite: bool,
    pub story: StoryArtifact,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StorySummary {
    pub id: String,
    pub title: String,
    pub saved_at: DateTime<Utc>,
    pub favorite: bool,
    pub page_count: usize,
    pub word_count: usize,
}

#[derive(Debug, Clone, Default)]
pub struct StoryFilter {
    pub favorites_only: bool,
    /// Case-insensitive match against title and story text.
    pub query: Option<String>,
}

impl StoryFilter {
    fn matches(&self, saved: &SavedStory) -> bool {
        if self.favorites_only && !saved.favorite {
            return false;
        }
        match self.query.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            Some(query) => {
                let query = query.to_lowercase();
                saved.story.title.to_lowercase().contains(&query)
                    || saved.story.text.text.to_lowercase().contains(&query)
            }
            None => true,
        }
    }
}

pub struct StoryLibrary {
    storage: Arc<dyn Storage>,
}

impl StoryLibrary {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub async fn save(&self, story: StoryArtifact) -> Result<String> {
        self.insert(story, Utc::now()).await
    }

    async fn insert(&self, story: StoryArtifact, saved_at: DateTime<Utc>) -> Result<String> {
        let saved = SavedStory {
            id: Uuid::new_v4().to_string(),
            saved_at,
            favorite: false,
            story,
        };
        self.write_record(&saved).await?;
        info!("Saved story \"{}\" as {}", saved.story.title, saved.id);
        Ok(saved.id)
    }

    pub async fn load(&self, id: &str) -> Result<SavedStory> {
        let key = record_key(id)?;
        if !self.storage.exists(&key).await? {
            bail!("Story {} not found", id);
        }
        let content = self.storage.read(&key).await?;
        serde_json::from_slice(&content).with_context(|| format!("Failed to parse story record {}", key))
    }

    /// Matching stories, newest first. Unreadable records are skipped.
    pub async fn list(&self, filter: &StoryFilter) -> Result<Vec<StorySummary>> {
        let mut stories = Vec::new();
        for id in self.storage.list("").await? {
            if Uuid::parse_str(&id).is_err() {
                continue;
            }
            match self.load(&id).await {
                Ok(saved) if filter.matches(&saved) => stories.push(saved),
                Ok(_) => {}
                Err(e) => warn!("Skipping unreadable story {}: {:#}", id, e),
            }
        }

        stories.sort_by(|a, b| b.saved_at.cmp(&a.saved_at).then_with(|| a.id.cmp(&b.id)));
        Ok(stories
            .into_iter()
            .map(|s| StorySummary {
                page_count: s.story.pages.len(),
                word_count: s.story.text.word_count,
                title: s.story.title,
                id: s.id,
                saved_at: s.saved_at,
                favorite: s.favorite,
            })
            .collect())
    }

    pub async fn set_favorite(&self, id: &str, favorite: bool) -> Result<()> {
        let mut saved = self.load(id).await?;
        saved.favorite = favorite;
        self.write_record(&saved).await
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        let key = story_key(id)?;
        if !self.storage.exists(&key).await? {
            bail!("Story {} not found", id);
        }
        self.storage.delete(&key).await?;
        info!("Deleted story {}", id);
        Ok(())
    }

    /// Stores narration for one page and records its storage key on the page.
    pub async fn save_narration(&self, id: &str, page: usize, audio: &[u8]) -> Result<String> {
        let mut saved = self.load(id).await?;
        let page_count = saved.story.pages.len();
        let target = saved
            .story
            .pages
            .get_mut(page)
            .ok_or_else(|| anyhow!("Story {} has {} pages, no page {}", id, page_count, page))?;

        let audio_key = format!("{}/page_{:03}.mp3", story_key(id)?, page + 1);
        self.storage.write(&audio_key, audio).await?;
        target.audio = Some(audio_key.clone());
        self.write_record(&saved).await?;
        Ok(audio_key)
    }

    async fn write_record(&self, saved: &SavedStory) -> Result<()> {
        let content = serde_json::to_string_pretty(saved)?;
        self.storage.write(&record_key(&saved.id)?, content.as_bytes()).await
    }
}

/// Only canonical UUIDs name stories, so ids never reach other keys.
fn story_key(id: &str) -> Result<String> {
    let uuid = Uuid::parse_str(id).map_err(|_| anyhow!("Invalid story id: {}", id))?;
    Ok(uuid.hyphenated().to_string())
}

fn record_key(id: &str) -> Result<String> {
    Ok(format!("{}/{}", story_key(id)?, RECORD_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::io::NativeStorage;
    use crate::core::story::{
        CharacterAttributes, GenerationRequest, ImageArtifact, ImageProvider, Section, StoryPage, StoryText,
        TextProvider, TextStatus,
    };
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    fn story(title: &str, text: &str) -> StoryArtifact {
        StoryArtifact {
            title: title.to_string(),
            request: GenerationRequest {
                character_name: "Mila".to_string(),
                character_type: "scientist".to_string(),
                attributes: CharacterAttributes::default(),
                setting: "space station".to_string(),
                theme: "discovery".to_string(),
                target_word_count: 200,
                text_provider: TextProvider::OpenAi,
                image_provider: ImageProvider::Dalle,
            },
            text: StoryText {
                text: text.to_string(),
                word_count: text.split_whitespace().count(),
                adjusted_target: 280,
                provider: Some(TextProvider::OpenAi),
                status: TextStatus::Accepted,
            },
            pages: vec![StoryPage {
                section: Section { index: 0, text: text.to_string(), word_count: text.split_whitespace().count() },
                image: ImageArtifact::generated(vec![0, 159, 146, 150], "image/png", ImageProvider::Dalle),
                audio: None,
            }],
            sound_effects: BTreeMap::new(),
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    fn library(dir: &tempfile::TempDir) -> StoryLibrary {
        StoryLibrary::new(Arc::new(NativeStorage::new(dir.path().join("library"))))
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let library = library(&dir);
        let original = story("Mila and the Space Station", "Mila floated past the window.");

        let id = library.save(original.clone()).await.unwrap();
        let loaded = library.load(&id).await.unwrap();
        assert_eq!(loaded.id, id);
        assert!(!loaded.favorite);
        assert_eq!(loaded.story, original);
    }

    #[tokio::test]
    async fn test_list_newest_first_with_filters() {
        let dir = tempfile::tempdir().unwrap();
        let library = library(&dir);
        let older = library
            .insert(story("Leo and the Jungle", "A lion roared."), Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
            .await
            .unwrap();
        let newer = library
            .insert(story("Mila and the Moon", "Mila waved."), Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap())
            .await
            .unwrap();

        let all = library.list(&StoryFilter::default()).await.unwrap();
        assert_eq!(all.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(), vec![newer.as_str(), older.as_str()]);
        assert_eq!(all[0].page_count, 1);

        let query = StoryFilter { query: Some("LION".to_string()), ..Default::default() };
        let found = library.list(&query).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, older);

        library.set_favorite(&newer, true).await.unwrap();
        let favorites = library.list(&StoryFilter { favorites_only: true, query: None }).await.unwrap();
        assert_eq!(favorites.len(), 1);
        assert!(favorites[0].favorite);
        assert_eq!(favorites[0].title, "Mila and the Moon");
    }

    #[tokio::test]
    async fn test_list_empty_library() {
        let dir = tempfile::tempdir().unwrap();
        assert!(library(&dir).list(&StoryFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete() {
        let dir = tempfile::tempdir().unwrap();
        let library = library(&dir);
        let id = library.save(story("A", "b c")).await.unwrap();

        library.delete(&id).await.unwrap();
        assert!(library.load(&id).await.is_err());
        assert!(library.delete(&id).await.is_err());
    }

    #[tokio::test]
    async fn test_rejects_path_like_ids() {
        let dir = tempfile::tempdir().unwrap();
        let library = library(&dir);
        assert!(library.load("../secrets").await.is_err());
        assert!(library.delete("..").await.is_err());
    }

    #[tokio::test]
    async fn test_save_narration() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(NativeStorage::new(dir.path()));
        let library = StoryLibrary::new(storage.clone());
        let id = library.save(story("A", "b c")).await.unwrap();

        let key = library.save_narration(&id, 0, b"mp3").await.unwrap();
        assert_eq!(key, format!("{}/page_001.mp3", id));
        assert_eq!(storage.read(&key).await.unwrap(), b"mp3");
        assert_eq!(std::fs::read(dir.path().join(&id).join("page_001.mp3")).unwrap(), b"mp3");
        assert_eq!(library.load(&id).await.unwrap().story.pages[0].audio.as_deref(), Some(key.as_str()));

        assert!(library.save_narration(&id, 5, b"mp3").await.is_err());
    }

    #[tokio::test]
    async fn test_list_skips_foreign_entries() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(NativeStorage::new(dir.path()));
        let library = StoryLibrary::new(storage.clone());
        let id = library.save(story("A", "b c")).await.unwrap();

        storage.write("notes/story.json", b"{}").await.unwrap();
        storage.write("README.txt", b"hi").await.unwrap();
        storage.write(&format!("{}/story.json", uuid::Uuid::new_v4()), b"not json").await.unwrap();

        let all = library.list(&StoryFilter::default()).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, id);
    }
}
