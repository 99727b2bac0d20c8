pub mod export;
pub mod illustrator;
pub mod image;
pub mod library;
pub mod llm;
pub mod setup;
pub mod sound_effects;
pub mod text;
pub mod tts;
pub mod workflow;
