use crate::core::config::Config;
use crate::core::story::{CharacterAttributes, GenerationRequest, ImageProvider, TextProvider};
use anyhow::{anyhow, Result};
use inquire::{CustomType, Select, Text};

/// Collects the story request: from `config.request` when unattended,
/// otherwise interactively with the configured request as defaults.
pub fn run_setup(config: &Config) -> Result<GenerationRequest> {
    if config.unattended {
        let request = config
            .request
            .clone()
            .ok_or_else(|| anyhow!("unattended mode needs a `request` section in config.yml"))?;
        request.validate()?;
        return Ok(request);
    }

    let defaults = config.request.clone();

    let character_name = ask_required("Character name:", &field(&defaults, |r| &r.character_name))?;
    let character_type = ask_required("What kind of character is it?", &field(&defaults, |r| &r.character_type))?;

    let attrs = defaults.as_ref().map(|r| r.attributes.clone()).unwrap_or_default();
    let attributes = CharacterAttributes {
        age: ask_optional("Age (optional):", attrs.age.as_deref())?,
        gender: ask_optional("Gender (optional):", attrs.gender.as_deref())?,
        hair_color: ask_optional("Hair colour (optional):", attrs.hair_color.as_deref())?,
        hair_type: ask_optional("Hair type (optional):", attrs.hair_type.as_deref())?,
        skin_color: ask_optional("Skin colour (optional):", attrs.skin_color.as_deref())?,
    };

    let setting = ask_required("Where does the story take place?", &field(&defaults, |r| &r.setting))?;
    let theme = ask_required("Theme:", &field(&defaults, |r| &r.theme))?;

    let word_default = defaults
        .as_ref()
        .map(|r| r.target_word_count)
        .unwrap_or(config.story.default_word_count)
        .max(1);
    let target_word_count = CustomType::<u32>::new("Target word count:")
        .with_default(word_default)
        .with_error_message("Please enter a positive whole number")
        .prompt()?;

    let text_provider = select_provider(
        "Text provider:",
        vec![TextProvider::OpenAi, TextProvider::Gemini],
        defaults.as_ref().map(|r| r.text_provider).unwrap_or(config.text.provider),
    )?;
    let image_provider = select_provider(
        "Image provider:",
        vec![ImageProvider::Dalle, ImageProvider::Gemini],
        defaults.as_ref().map(|r| r.image_provider).unwrap_or(config.image.provider),
    )?;

    let request = GenerationRequest {
        character_name,
        character_type,
        attributes,
        setting,
        theme,
        target_word_count,
        text_provider,
        image_provider,
    };
    request.validate()?;
    Ok(request)
}

fn field(defaults: &Option<GenerationRequest>, pick: impl Fn(&GenerationRequest) -> &String) -> String {
    defaults.as_ref().map(|r| pick(r).clone()).unwrap_or_default()
}

fn ask_required(prompt: &str, default: &str) -> Result<String> {
    loop {
        let mut question = Text::new(prompt);
        if !default.is_empty() {
            question = question.with_default(default);
        }
        let answer = question.prompt()?;
        if let Some(value) = non_empty(&answer) {
            return Ok(value);
        }
        println!("This field is required.");
    }
}

fn ask_optional(prompt: &str, default: Option<&str>) -> Result<Option<String>> {
    let mut question = Text::new(prompt);
    if let Some(default) = default {
        question = question.with_default(default);
    }
    Ok(non_empty(&question.prompt()?))
}

fn select_provider<T: std::fmt::Display + PartialEq + Copy>(prompt: &str, options: Vec<T>, current: T) -> Result<T> {
    let start = options.iter().position(|p| *p == current).unwrap_or(0);
    Ok(Select::new(prompt, options).with_starting_cursor(start).prompt()?)
}

fn non_empty(answer: &str) -> Option<String> {
    let trimmed = answer.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
