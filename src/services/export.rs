use crate::core::story::StoryArtifact;
use anyhow::{anyhow, Result};
use epub_builder::{EpubBuilder, EpubContent, ReferenceType, ZipLibrary};
use html_escape::encode_text;
use std::io::Cursor;

/// Turns a finished story into a downloadable document.
pub trait DocumentExporter {
    fn export(&self, story: &StoryArtifact) -> Result<Vec<u8>>;
    fn extension(&self) -> &'static str;
}

const STYLESHEET: &str = "body { font-family: serif; margin: 1em; } \
img { display: block; max-width: 100%; margin: 0 auto 1em auto; } \
p { font-size: 1.3em; line-height: 1.5; } \
h1 { text-align: center; }";

/// EPUB with a title page and one page per section.
#[derive(Debug, Default)]
pub struct EpubExporter;

fn xhtml(title: &str, body: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
<html xmlns=\"http://www.w3.org/1999/xhtml\">\n\
<head><title>{}</title><link rel=\"stylesheet\" type=\"text/css\" href=\"stylesheet.css\"/></head>\n\
<body>\n{}\n</body>\n</html>\n",
        encode_text(title),
        body
    )
}

impl DocumentExporter for EpubExporter {
    fn export(&self, story: &StoryArtifact) -> Result<Vec<u8>> {
        let mut builder = EpubBuilder::new(ZipLibrary::new().map_err(|e| anyhow!("EPUB zip error: {}", e))?)
            .map_err(|e| anyhow!("EPUB builder error: {}", e))?;

        builder
            .metadata("title", story.title.as_str())
            .map_err(|e| anyhow!("EPUB metadata error: {}", e))?;
        builder
            .metadata("author", story.request.character_name.as_str())
            .map_err(|e| anyhow!("EPUB metadata error: {}", e))?;
        builder
            .stylesheet(STYLESHEET.as_bytes())
            .map_err(|e| anyhow!("EPUB stylesheet error: {}", e))?;

        let cover = xhtml(
            &story.title,
            &format!(
                "<h1>{}</h1>\n<p>A story about {} in the {}.</p>",
                encode_text(&story.title),
                encode_text(&story.request.character_name),
                encode_text(&story.request.setting)
            ),
        );
        builder
            .add_content(
                EpubContent::new("title.xhtml", cover.as_bytes())
                    .title(story.title.as_str())
                    .reftype(ReferenceType::TitlePage),
            )
            .map_err(|e| anyhow!("EPUB content error: {}", e))?;

        for (i, page) in story.pages.iter().enumerate() {
            let number = i + 1;
            let image_name = format!("images/page_{:03}.{}", number, page.image.extension());
            builder
                .add_resource(&image_name, Cursor::new(page.image.bytes.clone()), page.image.mime_type.as_str())
                .map_err(|e| anyhow!("EPUB image error: {}", e))?;

            let body = format!(
                "<img src=\"{}\" alt=\"Illustration for page {}\"/>\n<p>{}</p>",
                image_name,
                number,
                encode_text(&page.section.text)
            );
            let page_title = format!("Page {}", number);
            let content = xhtml(&page_title, &body);
            let mut entry = EpubContent::new(format!("page_{:03}.xhtml", number), content.as_bytes()).title(page_title);
            if i == 0 {
                entry = entry.reftype(ReferenceType::Text);
            }
            builder.add_content(entry).map_err(|e| anyhow!("EPUB content error: {}", e))?;
        }

        let mut out = Vec::new();
        builder
            .generate(&mut out)
            .map_err(|e| anyhow!("EPUB generation error: {}", e))?;
        Ok(out)
    }

    fn extension(&self) -> &'static str {
        "epub"
    }
}
