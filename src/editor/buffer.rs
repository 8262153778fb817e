use std::ops::Range;

use ropey::Rope;

use super::{EditorWidget, WidgetCommand};

/// Options passed when the widget is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetConfig {
    /// Block tag used for plain paragraphs.
    pub paragraph_separator: String,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            paragraph_separator: "p".to_string(),
        }
    }
}

/// An HTML document backed by a rope, with a cursor and an optional
/// selection. Positions are char indices into the markup.
pub struct HtmlBuffer {
    rope: Rope,
    cursor: usize,
    anchor: Option<usize>,
    config: WidgetConfig,
    dirty: bool,
}

impl HtmlBuffer {
    /// Create an empty buffer.
    pub fn init(config: WidgetConfig) -> Self {
        Self {
            rope: Rope::new(),
            cursor: 0,
            anchor: None,
            config,
            dirty: false,
        }
    }

    /// Create a buffer holding `html`, cursor at the end.
    pub fn from_html(html: &str) -> Self {
        let mut buf = Self::init(WidgetConfig::default());
        buf.replace_all(html);
        buf
    }

    pub const fn config(&self) -> &WidgetConfig {
        &self.config
    }

    pub const fn cursor(&self) -> usize {
        self.cursor
    }

    /// Whether the buffer has been edited since creation or last save.
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Mark the buffer as clean (e.g., after saving).
    pub const fn mark_clean(&mut self) {
        self.dirty = false;
    }

    pub fn len_chars(&self) -> usize {
        self.rope.len_chars()
    }

    pub fn is_empty(&self) -> bool {
        self.rope.len_chars() == 0
    }

    /// Selected char range, if non-empty.
    pub fn selection(&self) -> Option<Range<usize>> {
        let anchor = self.anchor?;
        let range = anchor.min(self.cursor)..anchor.max(self.cursor);
        (!range.is_empty()).then_some(range)
    }

    pub fn selected_text(&self) -> Option<String> {
        self.selection().map(|r| self.rope.slice(r).to_string())
    }

    /// Select `range`, clamped to the buffer. The cursor ends up at its end.
    pub fn select(&mut self, range: Range<usize>) {
        let len = self.len_chars();
        self.anchor = Some(range.start.min(len));
        self.cursor = range.end.min(len);
    }

    pub fn select_all(&mut self) {
        self.select(0..self.len_chars());
    }

    /// Place the cursor, dropping any selection.
    pub fn move_to(&mut self, char_idx: usize) {
        self.anchor = None;
        self.cursor = char_idx.min(self.len_chars());
    }

    pub fn move_to_end(&mut self) {
        self.move_to(self.len_chars());
    }

    /// Insert raw markup, replacing the selection.
    pub fn insert_str(&mut self, s: &str) {
        self.delete_selection();
        if s.is_empty() {
            return;
        }
        self.rope.insert(self.cursor, s);
        self.cursor += s.chars().count();
        self.dirty = true;
    }

    /// Remove the selected range. Returns `true` if anything was removed.
    pub fn delete_selection(&mut self) -> bool {
        let Some(range) = self.selection() else {
            self.anchor = None;
            return false;
        };
        self.rope.remove(range.clone());
        self.cursor = range.start;
        self.anchor = None;
        self.dirty = true;
        true
    }

    /// Insert user text, escaped. Text typed into an empty document starts a
    /// paragraph.
    pub fn insert_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let escaped = escape_text(text);
        if self.is_empty() {
            let tag = self.config.paragraph_separator.clone();
            self.insert_str(&format!("<{tag}>{escaped}</{tag}>"));
            self.cursor -= tag.chars().count() + 3;
        } else {
            self.insert_str(&escaped);
        }
    }

    /// Wrap the selection in an inline element. With no selection, an empty
    /// element is inserted and the cursor placed inside it.
    fn wrap_inline(&mut self, tag: &str, attrs: &str) {
        let open = format!("<{tag}{attrs}>");
        let close = format!("</{tag}>");
        match self.selection() {
            Some(range) => self.wrap_range(range, &open, &close),
            None => {
                self.insert_str(&format!("{open}{close}"));
                self.cursor -= close.chars().count();
            }
        }
    }

    /// Wrap the selection, or the cursor's line, in a block element.
    fn format_block(&mut self, open: &str, close: &str) {
        let range = self.selection().unwrap_or_else(|| self.current_line());
        self.wrap_range(range, open, close);
    }

    fn wrap_range(&mut self, range: Range<usize>, open: &str, close: &str) {
        let open_len = open.chars().count();
        self.rope.insert(range.end, close);
        self.rope.insert(range.start, open);
        self.anchor = Some(range.start + open_len);
        self.cursor = range.end + open_len;
        self.dirty = true;
    }

    /// Char range of the cursor's line, without its line break.
    fn current_line(&self) -> Range<usize> {
        let line_idx = self.rope.char_to_line(self.cursor);
        let start = self.rope.line_to_char(line_idx);
        let line = self.rope.line(line_idx);
        let len = line.len_chars();
        let mut trailing = 0;
        if len > 0 && line.char(len - 1) == '\n' {
            trailing = 1;
            if len > 1 && line.char(len - 2) == '\r' {
                trailing = 2;
            }
        } else if len > 0 && line.char(len - 1) == '\r' {
            trailing = 1;
        }
        start..start + len - trailing
    }

    fn replace_all(&mut self, html: &str) {
        self.rope = Rope::from_str(html);
        self.anchor = None;
        self.cursor = self.rope.len_chars();
    }
}

impl EditorWidget for HtmlBuffer {
    fn exec(&mut self, command: &WidgetCommand) {
        match command {
            WidgetCommand::Bold => self.wrap_inline("b", ""),
            WidgetCommand::Italic => self.wrap_inline("i", ""),
            WidgetCommand::Underline => self.wrap_inline("u", ""),
            WidgetCommand::Strikethrough => self.wrap_inline("strike", ""),
            WidgetCommand::Heading1 => self.format_block("<h1>", "</h1>"),
            WidgetCommand::Heading2 => self.format_block("<h2>", "</h2>"),
            WidgetCommand::Paragraph => {
                let tag = self.config.paragraph_separator.clone();
                self.format_block(&format!("<{tag}>"), &format!("</{tag}>"));
            }
            WidgetCommand::Quote => self.format_block("<blockquote>", "</blockquote>"),
            WidgetCommand::OrderedList => self.format_block("<ol><li>", "</li></ol>"),
            WidgetCommand::UnorderedList => self.format_block("<ul><li>", "</li></ul>"),
            WidgetCommand::Code => self.format_block("<pre>", "</pre>"),
            WidgetCommand::Line => self.insert_str("<hr>"),
            WidgetCommand::Link(url) => {
                self.wrap_inline("a", &format!(" href=\"{}\"", escape_attr(url)));
            }
            WidgetCommand::Image(url) => {
                self.insert_str(&format!("<img src=\"{}\">", escape_attr(url)));
            }
            WidgetCommand::InsertText(text) => self.insert_text(text),
        }
    }

    fn html(&self) -> String {
        self.rope.to_string()
    }

    fn set_html(&mut self, html: &str) {
        self.replace_all(html);
    }
}

impl Default for HtmlBuffer {
    fn default() -> Self {
        Self::init(WidgetConfig::default())
    }
}

impl std::fmt::Debug for HtmlBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HtmlBuffer")
            .field(
                "rope",
                &format_args!("Rope({} chars)", self.rope.len_chars()),
            )
            .field("cursor", &self.cursor)
            .field("selection", &self.selection())
            .field("dirty", &self.dirty)
            .finish()
    }
}

fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

fn escape_attr(value: &str) -> String {
    escape_text(value).replace('"', "&quot;")
}
