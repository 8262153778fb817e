use tracing::debug;

use crate::app::model::{Action, Effect, Model, ToastLevel};
use crate::protocol::CellSelection;

pub const NO_CELL_SELECTED: &str = "No cell selected in Google Sheets";
pub const RESET_CONFIRM: &str =
    "Reset to last saved version? This will lose any unsaved changes. Reset again to confirm.";

/// Everything that can happen to the panel.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    // Actions
    /// Save the editor content
    Save,
    /// Restore the backup (asks for confirmation first)
    Reset,
    /// Import the current cell into the editor
    LoadCell,
    /// Show or hide the preview
    TogglePreview,

    // Router broadcasts
    /// The spreadsheet selection changed
    CellSelectionUpdate(CellSelection),
    /// A browser-level shortcut was pressed
    KeyboardCommand(String),

    /// Time passed
    Tick,
}

impl Message {
    /// Panel action for a browser keyboard command name.
    pub fn from_command(command: &str) -> Option<Self> {
        match command {
            "save-content" => Some(Self::Save),
            "reset-content" => Some(Self::Reset),
            _ => None,
        }
    }
}

/// Pure state transition. Work that needs the editor, the preview or the
/// router is queued on the model as an [`Effect`].
pub fn update(mut model: Model, msg: Message, now_ms: u64) -> Model {
    // Any other user action cancels a pending reset confirmation.
    if !matches!(
        msg,
        Message::Reset
            | Message::Tick
            | Message::CellSelectionUpdate(_)
            | Message::KeyboardCommand(_)
    ) {
        model.reset_confirmed = false;
    }

    match msg {
        Message::Save => model.push_effect(Effect::Run(Action::Saving)),
        Message::Reset => {
            if model.reset_confirmed {
                model.reset_confirmed = false;
                model.push_effect(Effect::Run(Action::Reset));
            } else {
                model.reset_confirmed = true;
                model.show_toast(ToastLevel::Warning, RESET_CONFIRM, now_ms);
            }
        }
        Message::LoadCell => {
            if model.current_cell.is_some() {
                model.push_effect(Effect::Run(Action::LoadingCell));
            } else {
                model.show_toast(ToastLevel::Error, NO_CELL_SELECTED, now_ms);
            }
        }
        Message::TogglePreview => {
            model.preview_visible = !model.preview_visible;
            model.push_effect(Effect::SyncPreview);
        }
        Message::CellSelectionUpdate(selection) => {
            debug!(label = ?selection.label(), "cell selection update");
            model.current_cell = Some(selection);
        }
        Message::KeyboardCommand(command) => match Message::from_command(&command) {
            Some(action) => return update(model, action, now_ms),
            None => debug!(%command, "ignoring unknown keyboard command"),
        },
        Message::Tick => {
            model.expire_toasts(now_ms);
            model.reset_status_if_due(now_ms);
        }
    }
    model
}
