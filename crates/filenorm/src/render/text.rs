use std::path::Path;

use crate::error::RenderError;
use crate::render::{RenderedDocument, Renderer};

const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "markdown", "csv", "log"];

/// Renders plain-text sources: decodes UTF-8 (lossily), normalizes line
/// endings and ends the output with exactly one newline.
pub struct TextRenderer;

impl TextRenderer {
    pub fn new() -> Self {
        Self
    }

    pub fn supports(filename: &str) -> bool {
        Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|ext| TEXT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
    }
}

impl Default for TextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for TextRenderer {
    fn render(&self, bytes: &[u8], filename: &str) -> Result<RenderedDocument, RenderError> {
        if !Self::supports(filename) {
            let extension = Path::new(filename)
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| format!(".{}", e.to_ascii_lowercase()))
                .unwrap_or_default();
            return Err(RenderError::UnsupportedFormat(extension));
        }

        let text = String::from_utf8_lossy(bytes).replace("\r\n", "\n");
        let trimmed = text.trim_end();
        Ok(RenderedDocument::text_only(format!("{}\n", trimmed)))
    }
}
