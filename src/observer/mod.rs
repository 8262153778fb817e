//! Spreadsheet cell observer.
//!
//! Runs against a host page (anything implementing [`GridPage`]). It waits
//! until the page shows a grid, then turns page activity into debounced
//! evaluations. Each evaluation looks for the selected cell and reports it
//! only when its label or text differs from the last one reported.
//!
//! Time is passed in as `now_ms` on every call; the observer never sleeps.

pub mod label;
pub mod selector;
pub mod snapshot;

use std::sync::LazyLock;

use tracing::{debug, info};

use crate::config::Settings;
use crate::debounce::Debouncer;
use crate::protocol::{Bounds, CellCoordinates, CellSelection, DetectorReady, Request};

pub use selector::{Selector, SelectorError};
pub use snapshot::{PageSnapshot, SnapshotElement};

/// Where the selected cell is looked for, most specific first.
pub const CELL_SELECTORS: [&str; 4] = [
    r#"[role="gridcell"][aria-selected="true"]"#,
    r#"[role="gridcell"][tabindex="0"]"#,
    r#".waffle-cell[tabindex="0"]"#,
    ".waffle-cell.selected",
];

/// Any of these on the page means a grid is present.
pub const GRID_MARKERS: [&str; 2] = [r#"[role="grid"]"#, ".waffle-cell"];

/// Attribute mutations that can move the selection.
pub const WATCHED_ATTRIBUTES: [&str; 3] = ["class", "aria-selected", "tabindex"];

/// Delay between activation and the first evaluation.
pub const INITIAL_SCAN_DELAY_MS: u64 = 500;

static CELL_SELECTOR_LIST: LazyLock<Vec<Selector>> = LazyLock::new(|| parse_all(&CELL_SELECTORS));
static GRID_MARKER_LIST: LazyLock<Vec<Selector>> = LazyLock::new(|| parse_all(&GRID_MARKERS));
static GRID: LazyLock<Vec<Selector>> = LazyLock::new(|| parse_all(&[GRID_MARKERS[0]]));
static ROW_COL: LazyLock<Vec<Selector>> = LazyLock::new(|| parse_all(&["[data-row][data-col]"]));

fn parse_all(sources: &[&str]) -> Vec<Selector> {
    sources
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .collect()
}

/// The host document, read-only.
pub trait GridPage {
    type Element: CellElement;

    fn url(&self) -> String;

    /// First element in document order matching `selector`.
    fn query(&self, selector: &Selector) -> Option<Self::Element>;

    /// The focused element, if any.
    fn active_element(&self) -> Option<Self::Element>;
}

pub trait CellElement {
    fn attribute(&self, name: &str) -> Option<String>;
    fn has_class(&self, class: &str) -> bool;
    fn text_content(&self) -> String;
    fn bounds(&self) -> Bounds;

    /// Nearest ancestor-or-self matching `selector`.
    fn closest(&self, selector: &Selector) -> Option<Self>
    where
        Self: Sized;
}

/// Page activity the observer listens to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageEvent {
    Click,
    KeyDown,
    FocusIn,
    /// Nodes added or removed anywhere under the body.
    ChildList,
    /// An attribute changed on some node.
    Attribute(String),
}

impl PageEvent {
    pub fn triggers_detection(&self) -> bool {
        match self {
            Self::Click | Self::KeyDown | Self::FocusIn | Self::ChildList => true,
            Self::Attribute(name) => WATCHED_ATTRIBUTES.contains(&name.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObserverEvent {
    /// Grid found; sent exactly once.
    Ready { url: String },
    CellSelected(CellSelection),
    /// The page never showed a grid within the probe budget.
    GaveUp { attempts: u32 },
}

impl ObserverEvent {
    /// The router message for this event, if it has one.
    pub fn into_request(self) -> Option<Request> {
        match self {
            Self::Ready { url } => Some(Request::SheetsDetectorReady {
                data: DetectorReady { url },
            }),
            Self::CellSelected(data) => Some(Request::CellSelected { data }),
            Self::GaveUp { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Probing { attempts: u32, next_probe_at: u64 },
    Active,
    GaveUp,
    Destroyed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserverConfig {
    pub debounce_ms: u64,
    pub probe_interval_ms: u64,
    pub probe_attempts: u32,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for ObserverConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            debounce_ms: settings.debounce_ms(),
            probe_interval_ms: u64::try_from(settings.probe_interval.as_millis())
                .unwrap_or(u64::MAX),
            probe_attempts: settings.probe_attempts.max(1),
        }
    }
}

pub struct CellObserver<P: GridPage> {
    page: P,
    config: ObserverConfig,
    phase: Phase,
    current: Option<CellSelection>,
    detect: Debouncer<()>,
    initial_scan_at: Option<u64>,
}

impl<P: GridPage> std::fmt::Debug for CellObserver<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CellObserver")
            .field("phase", &self.phase)
            .field("current", &self.current.as_ref().and_then(CellSelection::label))
            .field("pending", &self.detect.is_pending())
            .finish_non_exhaustive()
    }
}

impl<P: GridPage> CellObserver<P> {
    pub const fn new(page: P, config: ObserverConfig) -> Self {
        Self {
            page,
            config,
            phase: Phase::Idle,
            current: None,
            detect: Debouncer::new(config.debounce_ms),
            initial_scan_at: None,
        }
    }

    pub const fn page(&self) -> &P {
        &self.page
    }

    /// Swap in a fresh view of the host page (e.g. a reloaded snapshot).
    pub fn replace_page(&mut self, page: P) {
        self.page = page;
    }

    pub const fn phase(&self) -> Phase {
        self.phase
    }

    pub const fn is_active(&self) -> bool {
        matches!(self.phase, Phase::Active)
    }

    /// Last selection reported.
    pub const fn current_selection(&self) -> Option<&CellSelection> {
        self.current.as_ref()
    }

    /// Begin probing for a grid. Only the first call has any effect.
    pub fn start(&mut self, now_ms: u64) -> Vec<ObserverEvent> {
        if self.phase != Phase::Idle {
            return Vec::new();
        }
        debug!("cell observer probing for grid");
        self.phase = Phase::Probing {
            attempts: 0,
            next_probe_at: now_ms,
        };
        self.tick(now_ms)
    }

    /// Record page activity. Ignored until active and for unwatched attributes.
    pub fn notify(&mut self, event: &PageEvent, now_ms: u64) {
        if self.is_active() && event.triggers_detection() {
            self.detect.queue((), now_ms);
        }
    }

    /// Advance probing and timers, returning whatever became due.
    pub fn tick(&mut self, now_ms: u64) -> Vec<ObserverEvent> {
        let mut events = Vec::new();
        match self.phase {
            Phase::Probing {
                attempts,
                next_probe_at,
            } if now_ms >= next_probe_at => {
                let attempts = attempts + 1;
                if self.page_has_grid() {
                    self.phase = Phase::Active;
                    self.initial_scan_at = Some(now_ms.saturating_add(INITIAL_SCAN_DELAY_MS));
                    let url = self.page.url();
                    info!(%url, attempts, "grid detected, cell observer active");
                    events.push(ObserverEvent::Ready { url });
                } else if attempts >= self.config.probe_attempts {
                    self.phase = Phase::GaveUp;
                    info!(attempts, "no grid found, cell observer giving up");
                    events.push(ObserverEvent::GaveUp { attempts });
                } else {
                    self.phase = Phase::Probing {
                        attempts,
                        next_probe_at: now_ms.saturating_add(self.config.probe_interval_ms),
                    };
                }
            }
            Phase::Active => {
                if self.initial_scan_at.is_some_and(|at| now_ms >= at) {
                    self.initial_scan_at = None;
                    self.detect.queue((), now_ms);
                }
                if self.detect.take_ready(now_ms).is_some() {
                    if let Some(selection) = self.evaluate(now_ms) {
                        events.push(ObserverEvent::CellSelected(selection));
                    }
                }
            }
            _ => {}
        }
        events
    }

    /// Earliest time at which [`Self::tick`] has work to do.
    pub fn next_deadline(&self) -> Option<u64> {
        match self.phase {
            Phase::Probing { next_probe_at, .. } => Some(next_probe_at),
            Phase::Active => match (self.initial_scan_at, self.detect.due_at()) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            },
            _ => None,
        }
    }

    /// Stop observing. No event is emitted afterwards.
    pub fn destroy(&mut self) {
        self.phase = Phase::Destroyed;
        self.detect.cancel();
        self.initial_scan_at = None;
    }

    fn page_has_grid(&self) -> bool {
        GRID_MARKER_LIST
            .iter()
            .any(|marker| self.page.query(marker).is_some())
    }

    fn evaluate(&mut self, now_ms: u64) -> Option<CellSelection> {
        let found = find_selected_cell(&self.page, now_ms)?;
        let changed = self
            .current
            .as_ref()
            .is_none_or(|previous| !previous.same_cell_and_text(&found));
        if !changed {
            return None;
        }
        debug!(label = ?found.label(), "cell selection changed");
        crate::perf::log_event(
            "observer.emit",
            format!("label={:?} len={}", found.label(), found.content.len()),
        );
        self.current = Some(found.clone());
        Some(found)
    }
}

/// Locate the selected cell: priority selectors first, then focus.
pub fn find_selected_cell<P: GridPage>(page: &P, now_ms: u64) -> Option<CellSelection> {
    let element = CELL_SELECTOR_LIST
        .iter()
        .filter_map(|selector| page.query(selector))
        .find(is_cell_element)
        .or_else(|| page.active_element().filter(is_cell_element))?;
    Some(extract_selection(&element, page.url(), now_ms))
}

pub fn is_cell_element<E: CellElement>(element: &E) -> bool {
    element.attribute("role").as_deref() == Some("gridcell")
        || element.has_class("waffle-cell")
        || element.has_class("cell")
        || (element.attribute("data-row").is_some() && element.attribute("data-col").is_some())
        || GRID.iter().any(|grid| element.closest(grid).is_some())
}

fn extract_selection<E: CellElement>(element: &E, url: String, now_ms: u64) -> CellSelection {
    CellSelection {
        content: element.text_content().trim().to_string(),
        coordinates: coordinates_of(element),
        bounds: element.bounds(),
        timestamp: now_ms,
        source_url: url,
        tab_id: None,
    }
}

/// Row/column of a cell, from its own attributes or the nearest ancestor
/// carrying both `data-row` and `data-col`.
pub fn coordinates_of<E: CellElement>(element: &E) -> Option<CellCoordinates> {
    let row = non_empty(element, "data-row").or_else(|| non_empty(element, "aria-rowindex"));
    let col = non_empty(element, "data-col").or_else(|| non_empty(element, "aria-colindex"));

    if row.is_none() || col.is_none() {
        let from_ancestor = ROW_COL
            .iter()
            .find_map(|sel| element.closest(sel))
            .and_then(|parent| {
                let row = non_empty(&parent, "data-row")?;
                let col = non_empty(&parent, "data-col")?;
                coordinates(&row, &col)
            });
        if from_ancestor.is_some() {
            return from_ancestor;
        }
    }

    coordinates(&row?, &col?)
}

fn non_empty<E: CellElement>(element: &E, name: &str) -> Option<String> {
    element.attribute(name).filter(|v| !v.is_empty())
}

fn coordinates(row: &str, col: &str) -> Option<CellCoordinates> {
    let row = parse_leading_int(row)?;
    let col = parse_leading_int(col)?;
    Some(CellCoordinates {
        row,
        col,
        label: label::a1(row, col),
    })
}

/// Leading decimal digits after optional whitespace, like `parseInt(s, 10)`
/// restricted to non-negative values.
fn parse_leading_int(raw: &str) -> Option<u32> {
    let trimmed = raw.trim_start();
    let trimmed = trimmed.strip_prefix('+').unwrap_or(trimmed);
    let digits: &str = &trimmed[..trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len())];
    digits.parse().ok()
}
