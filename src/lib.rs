// Only allow lints that are either transitive-dependency noise or
// genuinely opinionated style choices that don't indicate real issues.
#![allow(
    // Transitive dependency version mismatches we can't control
    clippy::multiple_crate_versions,
    // module_name_repetitions is pure style preference (e.g. editor::EditorSurface)
    clippy::module_name_repetitions
)]

//! # Sheetpad
//!
//! A rich HTML side-panel editor that pulls content from the selected
//! Google Sheets cell.
//!
//! Sheetpad runs as three cooperating contexts:
//! - **Background router**: owns persistence and the current cell
//! - **Cell observer**: watches a spreadsheet page for the selected cell
//! - **Side panel**: editor, live preview, toasts and status
//!
//! They only talk through typed messages; the router runs on its own
//! thread and fans broadcasts out to every subscribed panel.
//!
//! ## Architecture
//!
//! The panel uses The Elm Architecture (TEA) pattern:
//! - **Model**: Panel state
//! - **Message**: Events and actions
//! - **Update**: Pure state transitions
//! - **Panel**: Side effects against the editor, preview and router
//!
//! ## Modules
//!
//! - [`protocol`]: Message envelopes and wire types
//! - [`router`]: Background context, storage handlers and broadcasts
//! - [`store`]: Key-value persistence
//! - [`gateway`]: Request/reply client used by the panel
//! - [`observer`]: Selected-cell detection
//! - [`editor`]: HTML editing surface
//! - [`preview`]: Debounced preview rendering
//! - [`app`]: Side panel state and orchestration
//! - [`watcher`]: Page snapshot watching

pub mod app;
pub mod clock;
pub mod config;
pub mod debounce;
pub mod editor;
pub mod gateway;
pub mod observer;
pub mod perf;
pub mod preview;
pub mod protocol;
pub mod router;
pub mod store;
pub mod watcher;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::app::{Message, Model, Panel};
    pub use crate::gateway::StorageGateway;
    pub use crate::observer::CellObserver;
    pub use crate::protocol::CellSelection;
    pub use crate::router::Router;
}
