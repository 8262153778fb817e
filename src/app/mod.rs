//! Side panel application.
//!
//! This module implements The Elm Architecture (TEA):
//! - [`Model`]: The complete panel state
//! - [`Message`]: All possible events and actions
//! - [`update`]: Pure function for state transitions
//! - [`Panel`]: Owns the editor, preview and gateway and runs side effects

mod effects;
mod input;
mod model;
mod update;

pub use input::{KeyChord, key_message};
pub use model::{
    Action, CellInfo, Effect, Model, STATUS_RESET_MS, Status, StatusKind, TOAST_DURATION_MS,
    Toast, ToastLevel, cell_info,
};
pub use update::{Message, NO_CELL_SELECTED, RESET_CONFIRM, update};

use std::sync::mpsc::{self, Receiver};

use crate::editor::{EditorSurface, HtmlBuffer, WidgetCommand};
use crate::gateway::StorageGateway;
use crate::preview::{PreviewDocument, PreviewRenderer, RenderSurface};
use crate::protocol::Broadcast;

/// The UI context: editor, preview and the panel's link to the router.
pub struct Panel<S: RenderSurface = PreviewDocument> {
    model: Model,
    editor: EditorSurface<HtmlBuffer>,
    preview: PreviewRenderer<S>,
    gateway: StorageGateway,
    events: Option<Receiver<Broadcast>>,
    changes: Receiver<String>,
}

impl<S: RenderSurface> std::fmt::Debug for Panel<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Panel")
            .field("model", &self.model)
            .field("editor", &self.editor)
            .field("preview", &self.preview)
            .field("gateway", &self.gateway)
            .finish_non_exhaustive()
    }
}

impl<S: RenderSurface> Panel<S> {
    /// Wire the editor's change listener to the preview.
    pub fn new(
        mut editor: EditorSurface<HtmlBuffer>,
        preview: PreviewRenderer<S>,
        gateway: StorageGateway,
        events: Option<Receiver<Broadcast>>,
    ) -> Self {
        let (tx, changes) = mpsc::channel();
        editor.on_change(move |html| {
            let _ = tx.send(html.to_string());
        });
        Self {
            model: Model::new(),
            editor,
            preview,
            gateway,
            events,
            changes,
        }
    }

    pub const fn model(&self) -> &Model {
        &self.model
    }

    pub const fn editor(&self) -> &EditorSurface<HtmlBuffer> {
        &self.editor
    }

    pub const fn preview(&self) -> &PreviewRenderer<S> {
        &self.preview
    }

    pub const fn gateway(&self) -> &StorageGateway {
        &self.gateway
    }

    /// Run a message through [`update`] and carry out what it queued.
    pub fn dispatch(&mut self, msg: Message, now_ms: u64) {
        let model = std::mem::take(&mut self.model);
        self.model = update(model, msg, now_ms);
        for effect in self.model.take_effects() {
            self.run_effect(effect, now_ms);
        }
    }

    /// Returns `true` if the chord is a panel shortcut.
    pub fn handle_key(&mut self, chord: KeyChord, now_ms: u64) -> bool {
        match key_message(chord) {
            Some(msg) => {
                self.dispatch(msg, now_ms);
                true
            }
            None => false,
        }
    }

    /// Toolbar command on the editor.
    pub fn exec(&mut self, command: &WidgetCommand, now_ms: u64) {
        self.editor.exec(command, now_ms);
    }

    /// Drain router broadcasts and advance every timer. Returns `true` if
    /// anything visible changed.
    pub fn pump(&mut self, now_ms: u64) -> bool {
        let mut changed = false;
        while let Some(broadcast) = self.events.as_ref().and_then(|rx| rx.try_recv().ok()) {
            let msg = match broadcast {
                Broadcast::CellSelectionUpdate { data } => Message::CellSelectionUpdate(data),
                Broadcast::KeyboardCommand { command, .. } => Message::KeyboardCommand(command),
            };
            self.dispatch(msg, now_ms);
            changed = true;
        }

        changed |= self.editor.tick(now_ms);
        while let Ok(html) = self.changes.try_recv() {
            self.preview.update_content(html, now_ms);
        }
        changed |= self.preview.tick(now_ms);

        let toasts = self.model.toasts().len();
        let status = self.model.status.clone();
        self.dispatch(Message::Tick, now_ms);
        changed || toasts != self.model.toasts().len() || status != self.model.status
    }

    /// Earliest time [`Self::pump`] has timed work to do.
    pub fn next_deadline(&self) -> Option<u64> {
        [
            self.editor.next_deadline(),
            self.preview.next_deadline(),
            self.model.next_deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }
}
