pub mod text;

pub use text::TextRenderer;

use crate::error::RenderError;

/// A binary artifact extracted during rendering (e.g. an embedded image).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    /// Path relative to the rendered output's directory, referenced by the text.
    pub path: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Normalized output of a render.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RenderedDocument {
    pub text: String,
    pub assets: Vec<Asset>,
}

impl RenderedDocument {
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            assets: Vec::new(),
        }
    }
}

/// Converts source bytes into normalized text.
///
/// Implementations must be safe to call repeatedly on identical input; a job
/// may be rendered more than once after a crash or a racing re-enqueue.
pub trait Renderer: Send + Sync {
    fn render(&self, bytes: &[u8], filename: &str) -> Result<RenderedDocument, RenderError>;
}

impl<F> Renderer for F
where
    F: Fn(&[u8], &str) -> Result<RenderedDocument, RenderError> + Send + Sync,
{
    fn render(&self, bytes: &[u8], filename: &str) -> Result<RenderedDocument, RenderError> {
        self(bytes, filename)
    }
}
