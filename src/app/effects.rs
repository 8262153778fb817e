use tracing::{error, info, warn};

use crate::app::model::{Action, Effect, StatusKind, ToastLevel};
use crate::app::{Message, Panel, NO_CELL_SELECTED};
use crate::gateway::GatewayError;
use crate::preview::RenderSurface;

impl<S: RenderSurface> Panel<S> {
    /// Load saved content and the router's current cell.
    pub fn init(&mut self, now_ms: u64) {
        let _scope = crate::perf::scope("panel.init");
        self.model.set_status("Loading editor...", StatusKind::Loading);

        if let Err(err) = self.editor.load(&mut self.gateway, now_ms) {
            warn!(error = %err, "failed to load content");
            self.model
                .show_toast(ToastLevel::Error, "Failed to load saved content", now_ms);
        }

        match self.gateway.current_cell() {
            Ok(Some(cell)) => self.dispatch(Message::CellSelectionUpdate(cell), now_ms),
            Ok(None) => {}
            Err(err) => warn!(error = %err, "failed to load current cell selection"),
        }

        self.model.set_status("Ready", StatusKind::Success);
        info!("side panel ready");
    }

    pub(super) fn run_effect(&mut self, effect: Effect, now_ms: u64) {
        match effect {
            Effect::Run(action) => self.run_action(action, now_ms),
            Effect::SyncPreview => {
                if self.model.preview_visible {
                    self.preview.show();
                } else {
                    self.preview.hide();
                }
            }
        }
    }

    /// Status goes `{Action}...`, then `{Action} complete` or
    /// `{Action} failed` with an error toast.
    fn run_action(&mut self, action: Action, now_ms: u64) {
        self.model.begin_action(action);
        crate::perf::log_event("panel.action", action.label());

        let result = match action {
            Action::Saving => self.editor.save(&mut self.gateway).map(|_| ()),
            Action::Reset => self.editor.reset(&mut self.gateway, now_ms).map(|_| ()),
            Action::LoadingCell => match self.model.current_cell.clone() {
                Some(cell) => {
                    self.editor.load_cell(&cell, now_ms);
                    Ok(())
                }
                None => Err(GatewayError::Rejected(NO_CELL_SELECTED.to_string())),
            },
        };

        match result {
            Ok(()) => {
                self.model.finish_action(action, now_ms);
                if let Some(message) = action.success_message() {
                    self.model.show_toast(ToastLevel::Success, message, now_ms);
                }
            }
            Err(err) => {
                error!(action = action.label(), error = %err, "panel action failed");
                self.model.fail_action(action);
                self.model.show_toast(
                    ToastLevel::Error,
                    format!("{}: {err}", action.failure_message()),
                    now_ms,
                );
            }
        }
    }
}
