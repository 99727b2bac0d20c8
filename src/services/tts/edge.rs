use super::Narrator;
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use html_escape::encode_text;
use log::debug;

const OUTPUT_FORMAT: &str = "audio-24khz-48kbitrate-mono-mp3";

pub struct EdgeNarrator {
    voice: String,
}

impl EdgeNarrator {
    pub fn new(voice: &str) -> Self {
        Self { voice: voice.to_string() }
    }

    fn ssml(&self, text: &str) -> String {
        let lang = self.voice.splitn(3, '-').take(2).collect::<Vec<_>>().join("-");
        format!(
            "<speak version='1.0' xmlns='http://www.w3.org/2001/10/synthesis' xml:lang='{}'><voice name='{}'>{}</voice></speak>",
            lang,
            self.voice,
            encode_text(text)
        )
    }
}

#[async_trait]
impl Narrator for EdgeNarrator {
    async fn speak(&self, text: &str) -> Result<Vec<u8>> {
        if text.trim().is_empty() {
            bail!("Nothing to narrate");
        }
        let ssml = self.ssml(text);
        debug!("Edge TTS request with voice {}", self.voice);

        tokio::task::spawn_blocking(move || {
            edge_tts::request_audio(&ssml, OUTPUT_FORMAT).map_err(|e| anyhow!("Edge TTS crate error: {:?}", e))
        })
        .await?
    }
}
