use crate::core::story::SoundEffect;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

struct CatalogueEntry {
    keyword: &'static str,
    pattern: Regex,
    file: &'static str,
    description: &'static str,
}

fn entry(keyword: &'static str, pattern: &str, file: &'static str, description: &'static str) -> CatalogueEntry {
    CatalogueEntry {
        keyword,
        pattern: Regex::new(&format!(r"(?i)\b(?:{})\b", pattern)).expect("static regex"),
        file,
        description,
    }
}

static CATALOGUE: LazyLock<Vec<CatalogueEntry>> = LazyLock::new(|| {
    vec![
        entry("lion", r"lions?", "lion_roar.mp3", "Lion roar"),
        entry("cat", r"cats?|kittens?", "cat_meow.mp3", "Cat meow"),
        entry("dog", r"dogs?|pupp(?:y|ies)", "dog_bark.mp3", "Dog bark"),
        entry("bird", r"birds?", "bird_chirp.mp3", "Bird chirp"),
        entry("water", r"water|splash(?:es|ed|ing)?", "water_splash.mp3", "Water splash"),
        entry("door", r"doors?", "door_knock.mp3", "Door knock"),
        entry("laugh", r"laugh(?:s|ed|ing|ter)?", "laugh.mp3", "Laughter"),
        entry("cry", r"cr(?:y|ies|ied|ying)", "cry.mp3", "Crying"),
        entry("thunder", r"thunder(?:s|ed|ing|storms?)?", "thunder.mp3", "Thunder"),
    ]
});

/// Sound effects whose keyword appears in the story, keyed by keyword.
pub fn find_sound_effects(text: &str) -> BTreeMap<String, SoundEffect> {
    CATALOGUE
        .iter()
        .filter(|e| e.pattern.is_match(text))
        .map(|e| {
            (
                e.keyword.to_string(),
                SoundEffect { file: e.file.to_string(), description: e.description.to_string() },
            )
        })
        .collect()
}
