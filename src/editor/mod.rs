//! Editor surface for the side panel.
//!
//! Hosts an [`EditorWidget`], filters out no-op change events and debounces
//! the rest before handing the HTML to a single registered listener (the
//! preview, in the panel).

mod buffer;

pub use buffer::{HtmlBuffer, WidgetConfig};

use tracing::{debug, info};

use crate::debounce::Debouncer;
use crate::gateway::{self, StorageGateway};
use crate::protocol::{CellSelection, ResetResult, SaveResult};

pub const DEFAULT_DEBOUNCE_MS: u64 = 150;

/// Body used when an empty cell is imported.
pub const EMPTY_CELL_BODY: &str = "<p>Edit this content and save it back to your workflow.</p>";

/// Formatting actions offered by the widget toolbar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WidgetCommand {
    Bold,
    Italic,
    Underline,
    Strikethrough,
    Heading1,
    Heading2,
    Paragraph,
    Quote,
    OrderedList,
    UnorderedList,
    Code,
    Line,
    Link(String),
    Image(String),
    InsertText(String),
}

impl WidgetCommand {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Bold => "bold",
            Self::Italic => "italic",
            Self::Underline => "underline",
            Self::Strikethrough => "strikethrough",
            Self::Heading1 => "heading1",
            Self::Heading2 => "heading2",
            Self::Paragraph => "paragraph",
            Self::Quote => "quote",
            Self::OrderedList => "olist",
            Self::UnorderedList => "ulist",
            Self::Code => "code",
            Self::Line => "line",
            Self::Link(_) => "link",
            Self::Image(_) => "image",
            Self::InsertText(_) => "insertText",
        }
    }
}

/// The rich-text widget behind the surface.
pub trait EditorWidget {
    fn exec(&mut self, command: &WidgetCommand);
    fn html(&self) -> String;
    fn set_html(&mut self, html: &str);
}

pub type ChangeListener = Box<dyn FnMut(&str) + Send>;

pub struct EditorSurface<W: EditorWidget = HtmlBuffer> {
    widget: W,
    last_seen: String,
    pending: Debouncer<String>,
    listener: Option<ChangeListener>,
}

impl<W: EditorWidget> std::fmt::Debug for EditorSurface<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditorSurface")
            .field("last_seen_len", &self.last_seen.len())
            .field("pending", &self.pending.is_pending())
            .field("has_listener", &self.listener.is_some())
            .finish_non_exhaustive()
    }
}

impl<W: EditorWidget> EditorSurface<W> {
    pub fn new(widget: W, debounce_ms: u64) -> Self {
        let last_seen = widget.html();
        Self {
            widget,
            last_seen,
            pending: Debouncer::new(debounce_ms),
            listener: None,
        }
    }

    pub const fn widget(&self) -> &W {
        &self.widget
    }

    /// Register the change listener, replacing any previous one.
    pub fn on_change(&mut self, listener: impl FnMut(&str) + Send + 'static) {
        self.listener = Some(Box::new(listener));
    }

    /// Feed a change event from the widget. Returns `false` for a no-op.
    pub fn handle_change(&mut self, html: String, now_ms: u64) -> bool {
        if html == self.last_seen {
            return false;
        }
        self.last_seen.clone_from(&html);
        self.pending.queue(html, now_ms);
        true
    }

    /// Deliver the pending change if its quiet interval has passed.
    pub fn tick(&mut self, now_ms: u64) -> bool {
        let Some(html) = self.pending.take_ready(now_ms) else {
            return false;
        };
        if let Some(listener) = self.listener.as_mut() {
            listener(&html);
        }
        true
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.pending.due_at()
    }

    pub fn content(&self) -> String {
        self.widget.html()
    }

    /// Replace the whole document. Listeners see it like any other change.
    pub fn set_content(&mut self, html: &str, now_ms: u64) {
        self.widget.set_html(html);
        let current = self.widget.html();
        self.handle_change(current, now_ms);
    }

    /// Run a toolbar command; the widget reports the result as a change.
    pub fn exec(&mut self, command: &WidgetCommand, now_ms: u64) {
        debug!(command = command.name(), "editor command");
        self.widget.exec(command);
        let current = self.widget.html();
        self.handle_change(current, now_ms);
    }

    /// Pull saved content into the editor. Empty stored content leaves the
    /// editor as it is.
    ///
    /// # Errors
    /// Returns the gateway failure unchanged.
    pub fn load(&mut self, gateway: &mut StorageGateway, now_ms: u64) -> gateway::Result<bool> {
        let record = gateway.load()?;
        if record.content.is_empty() {
            return Ok(false);
        }
        self.set_content(&record.content, now_ms);
        info!("content loaded from storage");
        Ok(true)
    }

    /// # Errors
    /// Returns the gateway failure unchanged.
    pub fn save(&self, gateway: &mut StorageGateway) -> gateway::Result<SaveResult> {
        let result = gateway.save(&self.content())?;
        info!(timestamp = result.timestamp, "content saved");
        Ok(result)
    }

    /// Restore the backup and show it.
    ///
    /// # Errors
    /// Returns the gateway failure unchanged.
    pub fn reset(&mut self, gateway: &mut StorageGateway, now_ms: u64) -> gateway::Result<ResetResult> {
        let result = gateway.reset()?;
        if !result.content.is_empty() {
            self.set_content(&result.content, now_ms);
            info!("content reset to backup");
        }
        Ok(result)
    }

    /// Put a cell's text into the editor.
    pub fn load_cell(&mut self, cell: &CellSelection, now_ms: u64) {
        let html = cell_html(cell);
        self.set_content(&html, now_ms);
    }
}

/// Editor markup for a cell: plain text becomes a paragraph, markup is kept
/// as is, and an empty cell gets a titled template.
pub fn cell_html(cell: &CellSelection) -> String {
    let content = cell.content.as_str();
    if content.is_empty() {
        let label = cell.label().unwrap_or("Unknown");
        return format!("<h3>Cell {label}</h3>\n{EMPTY_CELL_BODY}");
    }
    if content.contains('<') {
        content.to_string()
    } else {
        format!("<p>{content}</p>")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Bounds, CellCoordinates};
    use std::sync::{Arc, Mutex};

    fn surface() -> (EditorSurface, Arc<Mutex<Vec<String>>>) {
        let mut surface = EditorSurface::new(HtmlBuffer::default(), DEFAULT_DEBOUNCE_MS);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        surface.on_change(move |html| sink.lock().unwrap().push(html.to_string()));
        (surface, seen)
    }

    fn cell(content: &str, label: Option<&str>) -> CellSelection {
        CellSelection {
            content: content.to_string(),
            coordinates: label.map(|l| CellCoordinates {
                row: 1,
                col: 1,
                label: l.to_string(),
            }),
            bounds: Bounds::default(),
            timestamp: 0,
            source_url: String::new(),
            tab_id: None,
        }
    }

    #[test]
    fn test_ten_edits_in_fifty_ms_fire_once_with_final_state() {
        let (mut surface, seen) = surface();
        for i in 0..10_u64 {
            surface.handle_change(format!("<p>{i}</p>"), i * 5);
        }
        assert!(!surface.tick(45 + 149));
        assert!(surface.tick(45 + 150));
        assert_eq!(*seen.lock().unwrap(), vec!["<p>9</p>".to_string()]);
        assert!(!surface.tick(10_000));
    }

    #[test]
    fn test_identical_change_is_suppressed() {
        let (mut surface, seen) = surface();
        assert!(surface.handle_change("<p>a</p>".to_string(), 0));
        surface.tick(150);
        assert!(!surface.handle_change("<p>a</p>".to_string(), 200));
        assert_eq!(surface.next_deadline(), None);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_initial_content_counts_as_seen() {
        let mut surface = EditorSurface::new(HtmlBuffer::from_html("<p>x</p>"), 150);
        assert!(!surface.handle_change("<p>x</p>".to_string(), 0));
    }

    #[test]
    fn test_single_listener_is_replaced() {
        let (mut surface, first) = surface();
        let second = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&second);
        surface.on_change(move |_| *counter.lock().unwrap() += 1);
        surface.handle_change("<p>b</p>".to_string(), 0);
        surface.tick(150);
        assert!(first.lock().unwrap().is_empty());
        assert_eq!(*second.lock().unwrap(), 1);
    }

    #[test]
    fn test_exec_fires_change() {
        let (mut surface, seen) = surface();
        surface.exec(&WidgetCommand::InsertText("hi".to_string()), 0);
        surface.exec(&WidgetCommand::Line, 10);
        surface.tick(160);
        assert_eq!(*seen.lock().unwrap(), vec!["<p>hi<hr></p>".to_string()]);
        assert_eq!(surface.content(), "<p>hi<hr></p>");
    }

    #[test]
    fn test_cell_html_variants() {
        assert_eq!(cell_html(&cell("42", Some("B2"))), "<p>42</p>");
        assert_eq!(cell_html(&cell("<b>x</b>", None)), "<b>x</b>");
        assert_eq!(
            cell_html(&cell("", Some("C3"))),
            format!("<h3>Cell C3</h3>\n{EMPTY_CELL_BODY}")
        );
        assert!(cell_html(&cell("", None)).starts_with("<h3>Cell Unknown</h3>"));
    }

    #[test]
    fn test_load_cell_reaches_listener() {
        let (mut surface, seen) = surface();
        surface.load_cell(&cell("hello", Some("A1")), 0);
        assert_eq!(surface.content(), "<p>hello</p>");
        surface.tick(150);
        assert_eq!(*seen.lock().unwrap(), vec!["<p>hello</p>".to_string()]);
    }

    #[test]
    fn test_detached_gateway_fails_fast() {
        let clock = crate::clock::ManualClock::new(0);
        let mut gateway = StorageGateway::detached(Arc::new(clock));
        let (mut surface, _) = surface();
        let err = surface.save(&mut gateway).unwrap_err();
        assert_eq!(err.to_string(), "Not in extension context");
        assert!(surface.load(&mut gateway, 0).is_err());
        assert!(surface.reset(&mut gateway, 0).is_err());
    }
}
