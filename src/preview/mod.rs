//! Isolated HTML preview.
//!
//! The renderer keeps its own debounce, independent of the editor's, and
//! writes into a [`RenderSurface`]. Surface failures are logged and dropped.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, error};

use crate::debounce::Debouncer;

pub const DEFAULT_DEBOUNCE_MS: u64 = 150;

pub const PLACEHOLDER: &str = "<p>Preview will appear here...</p>";
pub const EMPTY_CONTENT: &str = "<p><em>No content to preview</em></p>";

const CONTENT_OPEN: &str = "<div id=\"content\">";
const CONTENT_CLOSE: &str = "</div>\n</body>";

const BASE_STYLE: &str = "body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; line-height: 1.6; margin: 16px; color: #333; }
h1, h2, h3, h4, h5, h6 { margin-top: 0; margin-bottom: 16px; }
p, ul, ol { margin-bottom: 16px; }
ul, ol { padding-left: 24px; }
blockquote { margin: 16px 0; padding: 8px 16px; border-left: 4px solid #ddd; background: #f9f9f9; }
code { background: #f4f4f4; padding: 2px 4px; border-radius: 3px; font-family: 'Monaco', 'Consolas', monospace; }
pre { background: #f4f4f4; padding: 12px; border-radius: 4px; overflow-x: auto; }
img { max-width: 100%; height: auto; }
a { color: #0066cc; text-decoration: none; }";

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("preview surface is detached")]
    Detached,
    #[error("failed to write preview {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Where rendered HTML ends up.
pub trait RenderSurface {
    /// Replace the children of the `#content` slot.
    ///
    /// # Errors
    /// Returns an error if the isolated document cannot be reached.
    fn replace_content(&mut self, html: &str) -> Result<(), RenderError>;

    fn set_visible(&mut self, _visible: bool) {}
}

/// A standalone HTML page with a `#content` slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewDocument {
    head: String,
    body: String,
}

impl Default for PreviewDocument {
    fn default() -> Self {
        Self {
            head: format!(
                "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"UTF-8\">\n\
                 <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n\
                 <title>HTML Preview</title>\n<style>\n{BASE_STYLE}\n</style>\n</head>\n<body>\n"
            ),
            body: PLACEHOLDER.to_string(),
        }
    }
}

impl PreviewDocument {
    /// Current children of the content slot.
    pub fn content(&self) -> &str {
        &self.body
    }

    pub fn to_html(&self) -> String {
        format!(
            "{}{CONTENT_OPEN}\n{}\n{CONTENT_CLOSE}\n</html>\n",
            self.head, self.body
        )
    }
}

impl RenderSurface for PreviewDocument {
    fn replace_content(&mut self, html: &str) -> Result<(), RenderError> {
        html.clone_into(&mut self.body);
        Ok(())
    }
}

/// Keeps a [`PreviewDocument`] mirrored to a file on disk.
#[derive(Debug)]
pub struct FileSurface {
    path: PathBuf,
    document: PreviewDocument,
    visible: bool,
}

impl FileSurface {
    /// Create the surface and write the placeholder page.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, RenderError> {
        let surface = Self {
            path: path.into(),
            document: PreviewDocument::default(),
            visible: true,
        };
        surface.flush()?;
        Ok(surface)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub const fn document(&self) -> &PreviewDocument {
        &self.document
    }

    fn flush(&self) -> Result<(), RenderError> {
        if !self.visible {
            return Ok(());
        }
        std::fs::write(&self.path, self.document.to_html()).map_err(|source| RenderError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

impl RenderSurface for FileSurface {
    fn replace_content(&mut self, html: &str) -> Result<(), RenderError> {
        self.document.replace_content(html)?;
        self.flush()
    }

    fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
        if let Err(err) = self.flush() {
            error!(error = %err, "failed to refresh preview file");
        }
    }
}

pub struct PreviewRenderer<S: RenderSurface = PreviewDocument> {
    surface: Option<S>,
    pending: Debouncer<String>,
    visible: bool,
}

impl<S: RenderSurface> std::fmt::Debug for PreviewRenderer<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewRenderer")
            .field("attached", &self.surface.is_some())
            .field("pending", &self.pending.is_pending())
            .field("visible", &self.visible)
            .finish()
    }
}

impl<S: RenderSurface> PreviewRenderer<S> {
    pub const fn new(surface: S, debounce_ms: u64) -> Self {
        Self {
            surface: Some(surface),
            pending: Debouncer::new(debounce_ms),
            visible: true,
        }
    }

    /// A renderer with nowhere to draw; updates are accepted and dropped.
    pub const fn detached(debounce_ms: u64) -> Self {
        Self {
            surface: None,
            pending: Debouncer::new(debounce_ms),
            visible: true,
        }
    }

    pub const fn surface(&self) -> Option<&S> {
        self.surface.as_ref()
    }

    /// Schedule a render of `html`, replacing any pending one.
    pub fn update_content(&mut self, html: impl Into<String>, now_ms: u64) {
        if self.surface.is_none() {
            return;
        }
        self.pending.queue(html.into(), now_ms);
    }

    /// Render the pending update once due. Returns `true` if it rendered.
    pub fn tick(&mut self, now_ms: u64) -> bool {
        let Some(html) = self.pending.take_ready(now_ms) else {
            return false;
        };
        let Some(surface) = self.surface.as_mut() else {
            return false;
        };
        let body = if html.is_empty() { EMPTY_CONTENT } else { html.as_str() };
        let _scope = crate::perf::scope("preview.render");
        match surface.replace_content(body) {
            Ok(()) => {
                debug!(len = body.len(), "preview rendered");
                crate::perf::log_event("preview.render", format!("len={}", body.len()));
                true
            }
            Err(err) => {
                error!(error = %err, "failed to update preview");
                false
            }
        }
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.pending.due_at()
    }

    pub fn toggle(&mut self) -> bool {
        self.set_visible(!self.visible);
        self.visible
    }

    pub fn show(&mut self) {
        self.set_visible(true);
    }

    pub fn hide(&mut self) {
        self.set_visible(false);
    }

    pub const fn is_shown(&self) -> bool {
        self.visible
    }

    fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
        if let Some(surface) = self.surface.as_mut() {
            surface.set_visible(visible);
        }
    }
}
