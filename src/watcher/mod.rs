//! Page snapshot watching.
//!
//! A rewritten snapshot file stands in for a DOM mutation: the session loop
//! reloads the page and reports a structural change to the cell observer,
//! which does its own debouncing.
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::observer::PageEvent;

/// Watches one snapshot file.
pub struct SnapshotWatcher {
    _watcher: RecommendedWatcher,
    rx: Receiver<notify::Result<Event>>,
    watch_dir: PathBuf,
    snapshot: PathBuf,
    file_name: Option<OsString>,
}

impl std::fmt::Debug for SnapshotWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotWatcher")
            .field("snapshot", &self.snapshot)
            .finish_non_exhaustive()
    }
}

impl SnapshotWatcher {
    /// # Errors
    /// Returns an error if the directory holding `path` cannot be watched.
    pub fn new(path: impl AsRef<Path>) -> notify::Result<Self> {
        // OS events carry canonical paths.
        let snapshot = path
            .as_ref()
            .canonicalize()
            .unwrap_or_else(|_| path.as_ref().to_path_buf());
        let file_name = snapshot.file_name().map(std::ffi::OsStr::to_os_string);
        let watch_dir = parent_dir(&snapshot);

        let (tx, rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })?;
        watcher.watch(&watch_dir, RecursiveMode::NonRecursive)?;

        Ok(Self {
            _watcher: watcher,
            rx,
            watch_dir,
            snapshot,
            file_name,
        })
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot
    }

    /// Drain pending file events; `true` if the snapshot was touched.
    pub fn take_changed(&mut self) -> bool {
        let mut changed = false;
        while let Ok(event) = self.rx.try_recv() {
            match event {
                Ok(ev) if self.is_relevant(&ev) => changed = true,
                Ok(_) => {}
                Err(err) => crate::perf::log_event("watcher.error", err.to_string()),
            }
        }
        if changed {
            crate::perf::log_event("watcher.change", self.snapshot.display().to_string());
        }
        changed
    }

    /// The observer event a snapshot change stands for.
    pub fn poll(&mut self) -> Option<PageEvent> {
        self.take_changed().then_some(PageEvent::ChildList)
    }

    fn is_relevant(&self, event: &Event) -> bool {
        if matches!(event.kind, EventKind::Access(_)) {
            return false;
        }
        event.paths.iter().any(|path| {
            path == &self.watch_dir
                || path == &self.snapshot
                || self
                    .file_name
                    .as_ref()
                    .is_some_and(|name| path.file_name().is_some_and(|f| f == name))
        })
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};
    use tempfile::tempdir;

    fn event(kind: EventKind, path: PathBuf) -> Event {
        Event {
            kind,
            paths: vec![path],
            attrs: notify::event::EventAttributes::new(),
        }
    }

    #[test]
    fn test_relevance_by_path_and_kind() {
        let dir = tempdir().unwrap();
        let canonical_dir = dir.path().canonicalize().unwrap();
        let path = canonical_dir.join("page.json");
        std::fs::write(&path, "{}").unwrap();
        let watcher = SnapshotWatcher::new(&path).unwrap();

        assert!(watcher.is_relevant(&event(EventKind::Any, canonical_dir.clone())));
        assert!(watcher.is_relevant(&event(EventKind::Any, path.clone())));
        assert!(!watcher.is_relevant(&event(EventKind::Any, canonical_dir.join("other.json"))));
        assert!(!watcher.is_relevant(&event(
            EventKind::Access(notify::event::AccessKind::Any),
            path
        )));
    }

    #[test]
    fn test_parent_of_bare_file_is_dot() {
        assert_eq!(parent_dir(Path::new("page.json")), PathBuf::from("."));
    }

    #[test]
    fn test_rewrite_is_reported_as_structural_change() {
        let dir = tempdir().unwrap();
        let path = dir.path().canonicalize().unwrap().join("page.json");
        std::fs::write(&path, "{\"url\": \"a\"}").unwrap();
        let mut watcher = SnapshotWatcher::new(&path).unwrap();
        std::thread::sleep(Duration::from_millis(300));

        std::fs::write(&path, "{\"url\": \"b\"}").unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut seen = None;
        while Instant::now() < deadline && seen.is_none() {
            seen = watcher.poll();
            std::thread::sleep(Duration::from_millis(50));
        }
        assert_eq!(seen, Some(PageEvent::ChildList));
    }
}
