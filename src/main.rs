use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use log::warn;
use std::sync::Arc;
use talebook::core::config::Config;
use talebook::core::io::{NativeStorage, Storage};
use talebook::core::story::StoryArtifact;
use talebook::services::export::{DocumentExporter, EpubExporter};
use talebook::services::image::create_image_backends;
use talebook::services::image::rate_limit::RateLimiter;
use talebook::services::library::StoryLibrary;
use talebook::services::llm::create_text_backends;
use talebook::services::setup;
use talebook::services::tts::edge::EdgeNarrator;
use talebook::services::tts::Narrator;
use talebook::services::workflow::StoryGenerator;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    dotenvy::dotenv().ok();

    let config = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            eprintln!("Please ensure 'config.yml' exists; API keys may also come from .env.");
            return Err(e);
        }
    };
    config.ensure_directories()?;

    let request = setup::run_setup(&config)?;

    let text_backends = create_text_backends(&config);
    if text_backends.is_empty() {
        warn!("No text backend has an API key; the story will contain only a failure notice");
    }
    let image_backends = create_image_backends(&config);
    if image_backends.is_empty() {
        warn!("No image backend has an API key; every page will use a placeholder");
    }

    let limiter = Arc::new(RateLimiter::new());
    let generator = StoryGenerator::new(&config, text_backends, image_backends, limiter);
    let story = generator.generate_story(&request).await?;

    let library = StoryLibrary::new(Arc::new(NativeStorage::new(&config.library_folder)));
    let id = library.save(story.clone()).await?;
    println!("Saved \"{}\" to the library as {}", story.title, id);

    if config.narration.enabled && !story.text.is_failure() {
        narrate(&library, &id, &story, &EdgeNarrator::new(&config.narration.voice)).await?;
    }

    let exporter = EpubExporter;
    let document = exporter.export(&story)?;
    let file_name = format!("{}.{}", file_stem(&story.title), exporter.extension());
    let output = NativeStorage::new(&config.output_folder);
    output.write(&file_name, &document).await?;

    println!(
        "Story complete: {} pages ({} placeholder images), exported to {}",
        story.pages.len(),
        story.placeholder_count(),
        output.resolve(&file_name)?.display()
    );
    Ok(())
}

/// Narration is best effort; a failed page is logged and skipped.
async fn narrate(library: &StoryLibrary, id: &str, story: &StoryArtifact, narrator: &dyn Narrator) -> Result<()> {
    let pb = ProgressBar::new(story.pages.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} narrated ({eta})")?
            .progress_chars("#>-"),
    );

    for (i, page) in story.pages.iter().enumerate() {
        match narrator.speak(&page.section.text).await {
            Ok(audio) => {
                library.save_narration(id, i, &audio).await?;
            }
            Err(e) => warn!("Narration failed for page {}: {:#}", i + 1, e),
        }
        pb.inc(1);
    }
    pb.finish_with_message("Narration complete");
    Ok(())
}

fn file_stem(title: &str) -> String {
    let stem: String = title
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    let stem = stem.trim_matches('_').to_string();
    if stem.is_empty() {
        "story".to_string()
    } else {
        stem
    }
}
