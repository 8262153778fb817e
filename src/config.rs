use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};

/// What the backup slot holds after a save.
#[derive(clap::ValueEnum, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum BackupPolicy {
    /// Backup mirrors the content just saved.
    #[default]
    Mirror,
    /// Backup keeps the content that was live before the save.
    Previous,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConfigFlags {
    pub store: Option<PathBuf>,
    pub debounce_ms: Option<u64>,
    pub reply_timeout_ms: Option<u64>,
    pub probe_interval_ms: Option<u64>,
    pub probe_attempts: Option<u32>,
    pub backup: Option<BackupPolicy>,
    pub restore_cell: bool,
    pub perf: bool,
    pub render_debug_log: Option<PathBuf>,
}

impl ConfigFlags {
    pub fn union(&self, other: &Self) -> Self {
        Self {
            store: other.store.clone().or_else(|| self.store.clone()),
            debounce_ms: other.debounce_ms.or(self.debounce_ms),
            reply_timeout_ms: other.reply_timeout_ms.or(self.reply_timeout_ms),
            probe_interval_ms: other.probe_interval_ms.or(self.probe_interval_ms),
            probe_attempts: other.probe_attempts.or(self.probe_attempts),
            backup: other.backup.or(self.backup),
            restore_cell: self.restore_cell || other.restore_cell,
            perf: self.perf || other.perf,
            render_debug_log: other
                .render_debug_log
                .clone()
                .or_else(|| self.render_debug_log.clone()),
        }
    }
}

/// Effective runtime settings after defaults are applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub store_path: PathBuf,
    pub debounce: Duration,
    pub reply_timeout: Duration,
    pub probe_interval: Duration,
    pub probe_attempts: u32,
    pub backup: BackupPolicy,
    pub restore_cell: bool,
}

impl Settings {
    pub const DEFAULT_DEBOUNCE_MS: u64 = 150;
    pub const DEFAULT_REPLY_TIMEOUT_MS: u64 = 5_000;
    pub const DEFAULT_PROBE_INTERVAL_MS: u64 = 1_000;
    pub const DEFAULT_PROBE_ATTEMPTS: u32 = 120;

    pub fn from_flags(flags: &ConfigFlags) -> Self {
        Self {
            store_path: flags.store.clone().unwrap_or_else(default_store_path),
            debounce: Duration::from_millis(flags.debounce_ms.unwrap_or(Self::DEFAULT_DEBOUNCE_MS)),
            reply_timeout: Duration::from_millis(
                flags
                    .reply_timeout_ms
                    .unwrap_or(Self::DEFAULT_REPLY_TIMEOUT_MS),
            ),
            probe_interval: Duration::from_millis(
                flags
                    .probe_interval_ms
                    .unwrap_or(Self::DEFAULT_PROBE_INTERVAL_MS),
            ),
            probe_attempts: flags.probe_attempts.unwrap_or(Self::DEFAULT_PROBE_ATTEMPTS),
            backup: flags.backup.unwrap_or_default(),
            restore_cell: flags.restore_cell,
        }
    }

    pub fn debounce_ms(&self) -> u64 {
        u64::try_from(self.debounce.as_millis()).unwrap_or(u64::MAX)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_flags(&ConfigFlags::default())
    }
}

fn app_dir(base: impl Into<PathBuf>) -> PathBuf {
    base.into().join("sheetpad")
}

fn platform_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return Some(app_dir(appdata));
        }
    }

    #[cfg(target_os = "macos")]
    {
        if let Some(home) = std::env::var_os("HOME") {
            return Some(app_dir(
                PathBuf::from(home)
                    .join("Library")
                    .join("Application Support"),
            ));
        }
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
            return Some(app_dir(xdg));
        }
        if let Some(home) = std::env::var_os("HOME") {
            return Some(app_dir(PathBuf::from(home).join(".config")));
        }
    }

    None
}

pub fn global_config_path() -> PathBuf {
    platform_dir().map_or_else(local_override_path, |dir| dir.join("config"))
}

pub fn default_store_path() -> PathBuf {
    platform_dir().map_or_else(
        || PathBuf::from(".sheetpad-store.json"),
        |dir| dir.join("store.json"),
    )
}

pub fn local_override_path() -> PathBuf {
    PathBuf::from(".sheetpadrc")
}

pub fn load_config_flags(path: &Path) -> Result<ConfigFlags> {
    if !path.exists() {
        return Ok(ConfigFlags::default());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let tokens = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .flat_map(|line| line.split_whitespace().map(ToOwned::to_owned))
        .collect::<Vec<_>>();
    Ok(parse_flag_tokens(&tokens))
}

pub fn save_config_flags(path: &Path, flags: &ConfigFlags) -> Result<()> {
    let mut lines = Vec::new();
    lines.push("# sheetpad defaults (saved with --save)".to_string());
    if let Some(store) = &flags.store {
        lines.push(format!("--store {}", store.display()));
    }
    if let Some(ms) = flags.debounce_ms {
        lines.push(format!("--debounce-ms {ms}"));
    }
    if let Some(ms) = flags.reply_timeout_ms {
        lines.push(format!("--reply-timeout-ms {ms}"));
    }
    if let Some(ms) = flags.probe_interval_ms {
        lines.push(format!("--probe-interval-ms {ms}"));
    }
    if let Some(attempts) = flags.probe_attempts {
        lines.push(format!("--probe-attempts {attempts}"));
    }
    if let Some(backup) = flags.backup {
        let backup_str = match backup {
            BackupPolicy::Mirror => "mirror",
            BackupPolicy::Previous => "previous",
        };
        lines.push(format!("--backup {backup_str}"));
    }
    if flags.restore_cell {
        lines.push("--restore-cell".to_string());
    }
    if flags.perf {
        lines.push("--perf".to_string());
    }
    if let Some(path) = &flags.render_debug_log {
        lines.push(format!("--render-debug-log {}", path.display()));
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config dir {}", parent.display()))?;
    }
    fs::write(path, format!("{}\n", lines.join("\n")))
        .with_context(|| format!("Failed to write config {}", path.display()))
}

pub fn clear_config_flags(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_file(path).with_context(|| format!("Failed to remove {}", path.display()))?;
    }
    Ok(())
}

/// Pull known flags out of a token stream, skipping anything else
/// (subcommands, positional arguments, unknown flags).
pub fn parse_flag_tokens(tokens: &[String]) -> ConfigFlags {
    let mut flags = ConfigFlags::default();
    let mut i = 0;
    while i < tokens.len() {
        let token = tokens[i].as_str();
        let (name, inline) = match token.split_once('=') {
            Some((name, value)) if name.starts_with("--") => (name, Some(value.to_string())),
            _ => (token, None),
        };
        let takes_value = matches!(
            name,
            "--store"
                | "--debounce-ms"
                | "--reply-timeout-ms"
                | "--probe-interval-ms"
                | "--probe-attempts"
                | "--backup"
                | "--render-debug-log"
        );
        let value = if takes_value && inline.is_none() {
            let next = tokens.get(i + 1).cloned();
            if next.is_some() {
                i += 1;
            }
            next
        } else {
            inline
        };

        match name {
            "--restore-cell" => flags.restore_cell = true,
            "--perf" => flags.perf = true,
            "--store" => flags.store = value.map(PathBuf::from),
            "--debounce-ms" => flags.debounce_ms = value.and_then(|v| v.parse().ok()),
            "--reply-timeout-ms" => flags.reply_timeout_ms = value.and_then(|v| v.parse().ok()),
            "--probe-interval-ms" => flags.probe_interval_ms = value.and_then(|v| v.parse().ok()),
            "--probe-attempts" => flags.probe_attempts = value.and_then(|v| v.parse().ok()),
            "--backup" => flags.backup = value.as_deref().and_then(parse_backup),
            "--render-debug-log" => flags.render_debug_log = value.map(PathBuf::from),
            _ => {}
        }
        i += 1;
    }
    flags
}

fn parse_backup(s: &str) -> Option<BackupPolicy> {
    match s {
        "mirror" => Some(BackupPolicy::Mirror),
        "previous" => Some(BackupPolicy::Previous),
        _ => None,
    }
}
