use anyhow::Result;
use async_trait::async_trait;

pub mod edge;

/// Speech synthesis for page narration.
#[async_trait]
pub trait Narrator: Send + Sync {
    /// Returns encoded audio (mp3) for `text`.
    async fn speak(&self, text: &str) -> Result<Vec<u8>>;
}
