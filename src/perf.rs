//! Timing scopes and an optional protocol debug log.
//!
//! The debug log is a plain text file with one timestamped line per event
//! (`router.dispatch`, `observer.emit`, `preview.render`, ...). It is off
//! unless a path is configured.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{LazyLock, Mutex, PoisonError};
use std::time::Instant;

static ENABLED: AtomicBool = AtomicBool::new(false);
static DEBUG_LOG: LazyLock<Mutex<DebugLog>> = LazyLock::new(|| Mutex::new(DebugLog::new()));

#[derive(Debug)]
pub struct Scope {
    name: &'static str,
    start: Instant,
}

impl Drop for Scope {
    fn drop(&mut self) {
        if !is_enabled() {
            return;
        }
        let elapsed_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        tracing::info!(scope = self.name, elapsed_ms, "perf");
        log_event("perf", format!("{} {elapsed_ms:.2} ms", self.name));
    }
}

#[derive(Debug)]
struct DebugLog {
    start: Instant,
    writer: Option<BufWriter<File>>,
}

impl DebugLog {
    fn new() -> Self {
        Self {
            start: Instant::now(),
            writer: None,
        }
    }
}

pub fn set_enabled(enabled: bool) {
    ENABLED.store(enabled, Ordering::Relaxed);
}

pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

pub fn scope(name: &'static str) -> Scope {
    Scope {
        name,
        start: Instant::now(),
    }
}

/// Start (or with `None`, stop) writing debug events to `path`.
///
/// # Errors
/// Returns an error if the log file cannot be created.
pub fn set_debug_log_path(path: Option<&Path>) -> std::io::Result<()> {
    let mut log = DEBUG_LOG.lock().unwrap_or_else(PoisonError::into_inner);
    match path {
        Some(path) => {
            let mut writer = BufWriter::new(File::create(path)?);
            writeln!(writer, "sheetpad debug log start")?;
            writer.flush()?;
            log.start = Instant::now();
            log.writer = Some(writer);
        }
        None => log.writer = None,
    }
    Ok(())
}

pub fn is_debug_log_enabled() -> bool {
    DEBUG_LOG
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .writer
        .is_some()
}

pub fn log_event(name: &str, detail: impl AsRef<str>) {
    let mut log = DEBUG_LOG.lock().unwrap_or_else(PoisonError::into_inner);
    let elapsed_ms = log.start.elapsed().as_secs_f64() * 1000.0;
    let Some(writer) = log.writer.as_mut() else {
        return;
    };
    let _ = writeln!(writer, "[{elapsed_ms:>10.3} ms] {name}: {}", detail.as_ref());
    let _ = writer.flush();
}
