use crate::protocol::CellSelection;

/// How long a toast stays on screen.
pub const TOAST_DURATION_MS: u64 = 3000;

/// How long a completed action's status stays before going back to `Ready`.
pub const STATUS_RESET_MS: u64 = 2000;

const CELL_PREVIEW_CHARS: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub id: u64,
    pub level: ToastLevel,
    pub message: String,
    pub expires_at: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Info,
    Loading,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub text: String,
    pub kind: StatusKind,
}

impl Status {
    pub fn ready() -> Self {
        Self {
            text: "Ready".to_string(),
            kind: StatusKind::Success,
        }
    }
}

/// A panel operation that reports progress through the status indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Saving,
    Reset,
    LoadingCell,
}

impl Action {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Saving => "Saving",
            Self::Reset => "Reset",
            Self::LoadingCell => "Loading cell",
        }
    }

    pub(super) const fn success_message(self) -> Option<&'static str> {
        match self {
            Self::Saving => Some("Content saved successfully"),
            Self::Reset => Some("Content reset to last saved version"),
            Self::LoadingCell => None,
        }
    }

    pub(super) const fn failure_message(self) -> &'static str {
        match self {
            Self::Saving => "Failed to save content",
            Self::Reset => "Failed to reset content",
            Self::LoadingCell => "Failed to load cell",
        }
    }
}

/// Work requested by [`super::update`] and carried out by the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Run(Action),
    SyncPreview,
}

/// What the panel shows about the spreadsheet's current cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellInfo {
    pub label: String,
    pub preview: String,
}

/// The complete panel state.
#[derive(Debug, Clone)]
pub struct Model {
    pub status: Status,
    status_reset_at: Option<u64>,
    toasts: Vec<Toast>,
    next_toast_id: u64,
    pub current_cell: Option<CellSelection>,
    pub preview_visible: bool,
    /// Set by the first reset request; the second one performs it.
    pub reset_confirmed: bool,
    effects: Vec<Effect>,
}

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}

impl Model {
    pub fn new() -> Self {
        Self {
            status: Status::ready(),
            status_reset_at: None,
            toasts: Vec::new(),
            next_toast_id: 1,
            current_cell: None,
            preview_visible: true,
            reset_confirmed: false,
            effects: Vec::new(),
        }
    }

    pub fn toasts(&self) -> &[Toast] {
        &self.toasts
    }

    pub fn show_toast(&mut self, level: ToastLevel, message: impl Into<String>, now_ms: u64) -> u64 {
        let id = self.next_toast_id;
        self.next_toast_id += 1;
        self.toasts.push(Toast {
            id,
            level,
            message: message.into(),
            expires_at: now_ms.saturating_add(TOAST_DURATION_MS),
        });
        id
    }

    pub fn dismiss_toast(&mut self, id: u64) -> bool {
        let before = self.toasts.len();
        self.toasts.retain(|toast| toast.id != id);
        self.toasts.len() != before
    }

    pub(super) fn expire_toasts(&mut self, now_ms: u64) -> bool {
        let before = self.toasts.len();
        self.toasts.retain(|toast| toast.expires_at > now_ms);
        self.toasts.len() != before
    }

    pub fn set_status(&mut self, text: impl Into<String>, kind: StatusKind) {
        self.status = Status {
            text: text.into(),
            kind,
        };
        self.status_reset_at = None;
    }

    pub(super) fn begin_action(&mut self, action: Action) {
        self.set_status(format!("{}...", action.label()), StatusKind::Loading);
    }

    pub(super) fn finish_action(&mut self, action: Action, now_ms: u64) {
        self.set_status(format!("{} complete", action.label()), StatusKind::Success);
        self.status_reset_at = Some(now_ms.saturating_add(STATUS_RESET_MS));
    }

    pub(super) fn fail_action(&mut self, action: Action) {
        self.set_status(format!("{} failed", action.label()), StatusKind::Error);
    }

    pub(super) fn reset_status_if_due(&mut self, now_ms: u64) -> bool {
        if self.status_reset_at.is_some_and(|at| now_ms >= at) {
            self.status = Status::ready();
            self.status_reset_at = None;
            return true;
        }
        false
    }

    /// Earliest time a toast expires or the status reverts.
    pub fn next_deadline(&self) -> Option<u64> {
        self.toasts
            .iter()
            .map(|toast| toast.expires_at)
            .chain(self.status_reset_at)
            .min()
    }

    pub(super) fn push_effect(&mut self, effect: Effect) {
        self.effects.push(effect);
    }

    pub(super) fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    pub fn cell_info(&self) -> CellInfo {
        cell_info(self.current_cell.as_ref())
    }
}

pub fn cell_info(cell: Option<&CellSelection>) -> CellInfo {
    let Some(cell) = cell.filter(|c| c.coordinates.is_some()) else {
        return CellInfo {
            label: "None".to_string(),
            preview: String::new(),
        };
    };
    let label = cell
        .label()
        .filter(|l| !l.is_empty())
        .unwrap_or("Unknown")
        .to_string();
    let preview = if cell.content.is_empty() {
        "(empty)".to_string()
    } else if cell.content.chars().count() > CELL_PREVIEW_CHARS {
        let head: String = cell.content.chars().take(CELL_PREVIEW_CHARS).collect();
        format!("\"{head}...\"")
    } else {
        format!("\"{}\"", cell.content)
    };
    CellInfo { label, preview }
}
