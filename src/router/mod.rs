//! Background message router.
//!
//! The single dispatch point of the system. Panel requests (save, load,
//! reset, current cell) get exactly one [`Response`]; page events (detector
//! ready, cell selected) update [`RouterState`] and are rebroadcast to the
//! panel through the [`Bus`]. Unknown messages are logged and dropped.

mod bus;
pub mod runtime;

pub use bus::Bus;
pub use runtime::{BackgroundContext, Body, Envelope, RouterHandle, TransportError, spawn};

use std::collections::BTreeMap;

use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::clock::SharedClock;
use crate::config::BackupPolicy;
use crate::protocol::{
    Broadcast, CellSelection, ContentRecord, DetectorReady, Origin, ProtocolError, Request,
    ResetResult, Response, SaveResult,
};
use crate::store::{self, Items, KeyValueStore, StoreError, keys};

/// Content written on first install.
pub const DEFAULT_TEMPLATE: &str = "<h1>Welcome to Sheetpad</h1>
<p>Start editing your HTML content here. Your changes are kept in local storage.</p>
<ul>
  <li>Use <strong>Ctrl+S</strong> to save</li>
  <li>Use <strong>Ctrl+R</strong> to reset</li>
  <li>See live preview on the right</li>
</ul>";

/// Badge shown on a tab once its page observer reports in.
pub const READY_BADGE: &str = "📊";

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallReason {
    Install,
    Update,
    BrowserUpdate,
}

/// How a message was disposed of.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// A request/response message got its single reply.
    Responded(Response),
    /// State changed and a derived event went out to `delivered` listeners.
    Rebroadcast { delivered: usize },
    /// State changed; nothing to tell listeners.
    Updated,
    /// Unknown or undecodable message, or an event with nowhere to go.
    Ignored,
}

/// Process-wide router state, passed explicitly into every handler.
#[derive(Debug, Clone, Default)]
pub struct RouterState {
    /// Most recent selection from any tab; last writer wins.
    pub current_selection: Option<CellSelection>,
    pub badges: BTreeMap<u32, String>,
}

pub struct Router {
    store: Box<dyn KeyValueStore>,
    bus: Bus,
    clock: SharedClock,
    backup_policy: BackupPolicy,
    state: RouterState,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("backup_policy", &self.backup_policy)
            .field("state", &self.state)
            .field("subscribers", &self.bus.subscriber_count())
            .finish_non_exhaustive()
    }
}

impl Router {
    pub fn new(store: impl KeyValueStore + 'static, clock: SharedClock) -> Self {
        Self {
            store: Box::new(store),
            bus: Bus::new(),
            clock,
            backup_policy: BackupPolicy::default(),
            state: RouterState::default(),
        }
    }

    pub const fn with_backup_policy(mut self, policy: BackupPolicy) -> Self {
        self.backup_policy = policy;
        self
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub const fn state(&self) -> &RouterState {
        &self.state
    }

    pub fn current_selection(&self) -> Option<&CellSelection> {
        self.state.current_selection.as_ref()
    }

    pub fn badge(&self, tab_id: u32) -> Option<&str> {
        self.state.badges.get(&tab_id).map(String::as_str)
    }

    /// Dispatch one typed request.
    pub fn handle(&mut self, request: Request, origin: &Origin) -> Outcome {
        let kind = request.kind();
        debug!(kind, tab = ?origin.tab_id, "router received message");
        crate::perf::log_event("router.dispatch", format!("kind={kind} tab={:?}", origin.tab_id));

        match request {
            Request::SaveContent { content } => respond(
                kind,
                save_content(
                    self.store.as_mut(),
                    self.clock.now_ms(),
                    self.backup_policy,
                    content,
                ),
            ),
            Request::LoadContent => respond(kind, load_content(self.store.as_ref())),
            Request::ResetContent => respond(kind, reset_content(self.store.as_mut())),
            Request::GetCurrentCell => {
                Outcome::Responded(Response::ok(self.state.current_selection.as_ref()))
            }
            Request::SheetsDetectorReady { data } => {
                detector_ready(&mut self.state, origin, &data);
                Outcome::Updated
            }
            Request::CellSelected { data } => {
                let delivered = cell_selected(
                    &mut self.state,
                    self.store.as_mut(),
                    &self.bus,
                    self.clock.now_ms(),
                    origin,
                    data,
                );
                Outcome::Rebroadcast { delivered }
            }
        }
    }

    /// Dispatch a raw wire message. Unknown messages are dropped. A malformed
    /// request of a kind that expects a reply is answered with an error;
    /// other malformed messages are dropped.
    pub fn handle_json(&mut self, raw: &str, origin: &Origin) -> Outcome {
        match Request::from_json(raw) {
            Ok(request) => self.handle(request, origin),
            Err(ProtocolError::UnknownType(kind)) => {
                warn!(kind = %kind, "unknown message type");
                Outcome::Ignored
            }
            Err(err) if err.expects_reply() => {
                warn!(error = %err, "rejecting malformed request");
                Outcome::Responded(Response::err(err.to_string()))
            }
            Err(err) => {
                warn!(error = %err, "dropping undecodable message");
                Outcome::Ignored
            }
        }
    }

    /// Seed the default template on first install.
    pub fn on_installed(&mut self, reason: InstallReason) -> Outcome {
        info!(?reason, "extension installed");
        if reason != InstallReason::Install {
            return Outcome::Ignored;
        }
        let mut items = Items::new();
        items.insert(keys::EDITOR_CONTENT.to_string(), json!(DEFAULT_TEMPLATE));
        items.insert(keys::EDITOR_BACKUP.to_string(), json!(DEFAULT_TEMPLATE));
        items.insert(keys::LAST_SAVED.to_string(), json!(self.clock.now_ms()));
        match self.store.set(items) {
            Ok(()) => {
                info!("default content initialized");
                Outcome::Updated
            }
            Err(err) => {
                warn!(error = %err, "failed to initialize default content");
                Outcome::Ignored
            }
        }
    }

    /// Forward a browser keyboard command to the panel of the active tab.
    pub fn on_command(&mut self, command: &str, active_tab: Option<u32>) -> Outcome {
        let Some(tab_id) = active_tab else {
            debug!(command, "no active tab for command");
            return Outcome::Ignored;
        };
        let delivered = self.bus.publish(&Broadcast::KeyboardCommand {
            command: command.to_string(),
            tab_id,
        });
        Outcome::Rebroadcast { delivered }
    }

    /// Reload the mirrored selection written by a previous session.
    ///
    /// # Errors
    /// Returns an error if the store cannot be read.
    pub fn restore_selection(&mut self) -> Result<bool, StoreError> {
        let items = self.store.get(&[keys::CURRENT_CELL_SELECTION])?;
        let restored = items
            .get(keys::CURRENT_CELL_SELECTION)
            .filter(|value| !value.is_null())
            .cloned()
            .and_then(|value| serde_json::from_value::<CellSelection>(value).ok());
        let found = restored.is_some();
        if found {
            self.state.current_selection = restored;
        }
        Ok(found)
    }
}

fn respond<T: serde::Serialize>(kind: &str, result: Result<T, StoreError>) -> Outcome {
    match result {
        Ok(value) => Outcome::Responded(Response::ok(value)),
        Err(err) => {
            warn!(kind, error = %err, "storage operation failed");
            Outcome::Responded(Response::err(err.to_string()))
        }
    }
}

fn save_content(
    store: &mut dyn KeyValueStore,
    now_ms: u64,
    policy: BackupPolicy,
    content: String,
) -> Result<SaveResult, StoreError> {
    let backup = match policy {
        BackupPolicy::Mirror => content.clone(),
        BackupPolicy::Previous => {
            let current = store.get(&[keys::EDITOR_CONTENT])?;
            store::string_or_empty(&current, keys::EDITOR_CONTENT)
        }
    };
    let mut items = Items::new();
    items.insert(keys::EDITOR_CONTENT.to_string(), Value::String(content));
    items.insert(keys::EDITOR_BACKUP.to_string(), Value::String(backup));
    items.insert(keys::LAST_SAVED.to_string(), json!(now_ms));
    store.set(items)?;
    debug!(timestamp = now_ms, "content saved");
    Ok(SaveResult { timestamp: now_ms })
}

fn load_content(store: &dyn KeyValueStore) -> Result<ContentRecord, StoreError> {
    let items = store.get(&[keys::EDITOR_CONTENT, keys::EDITOR_BACKUP, keys::LAST_SAVED])?;
    Ok(ContentRecord {
        content: store::string_or_empty(&items, keys::EDITOR_CONTENT),
        backup: store::string_or_empty(&items, keys::EDITOR_BACKUP),
        last_saved: store::timestamp(&items, keys::LAST_SAVED),
    })
}

fn reset_content(store: &mut dyn KeyValueStore) -> Result<ResetResult, StoreError> {
    let items = store.get(&[keys::EDITOR_BACKUP])?;
    let content = store::string_or_empty(&items, keys::EDITOR_BACKUP);
    let mut update = Items::new();
    update.insert(
        keys::EDITOR_CONTENT.to_string(),
        Value::String(content.clone()),
    );
    store.set(update)?;
    debug!("content reset to backup");
    Ok(ResetResult { content })
}

fn detector_ready(state: &mut RouterState, origin: &Origin, data: &DetectorReady) {
    info!(tab = ?origin.tab_id, url = %data.url, "sheets detector ready");
    if let Some(tab_id) = origin.tab_id {
        state.badges.insert(tab_id, READY_BADGE.to_string());
    }
}

fn cell_selected(
    state: &mut RouterState,
    store: &mut dyn KeyValueStore,
    bus: &Bus,
    now_ms: u64,
    origin: &Origin,
    mut selection: CellSelection,
) -> usize {
    selection.tab_id = origin.tab_id;
    selection.timestamp = now_ms;
    debug!(label = ?selection.label(), tab = ?origin.tab_id, "cell selected");

    if let (Some(tab_id), Some(label)) = (origin.tab_id, selection.label()) {
        state.badges.insert(tab_id, label.to_string());
    }

    match serde_json::to_value(&selection) {
        Ok(mirror) => {
            let mut items = Items::new();
            items.insert(keys::CURRENT_CELL_SELECTION.to_string(), mirror);
            items.insert(keys::LAST_CELL_UPDATE.to_string(), json!(now_ms));
            if let Err(err) = store.set(items) {
                warn!(error = %err, "failed to mirror cell selection");
            }
        }
        Err(err) => warn!(error = %err, "failed to encode cell selection"),
    }

    let event = Broadcast::CellSelectionUpdate {
        data: selection.clone(),
    };
    state.current_selection = Some(selection);

    let delivered = bus.publish(&event);
    if delivered == 0 {
        debug!("no panel listening for selection update");
    }
    delivered
}

#[cfg(test)]
mod tests;
