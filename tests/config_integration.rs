use std::path::PathBuf;
use std::time::Duration;

use sheetpad::config::{BackupPolicy, ConfigFlags, Settings, load_config_flags, parse_flag_tokens};
use sheetpad::observer::ObserverConfig;

#[test]
fn test_config_file_parsing_ignores_comments_and_blank_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".sheetpadrc");
    let content = r"
# comment
--restore-cell

--backup previous

--render-debug-log=render.log
";
    std::fs::write(&path, content).unwrap();

    let flags = load_config_flags(&path).unwrap();
    assert!(flags.restore_cell);
    assert_eq!(flags.backup, Some(BackupPolicy::Previous));
    assert_eq!(flags.render_debug_log, Some(PathBuf::from("render.log")));
}

#[test]
fn test_missing_config_file_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let flags = load_config_flags(&dir.path().join("absent")).unwrap();
    assert_eq!(flags, ConfigFlags::default());
}

#[test]
fn test_cli_flags_override_file_flags() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".sheetpadrc");
    let content = "--restore-cell\n--debounce-ms 300\n--render-debug-log file.log\n";
    std::fs::write(&path, content).unwrap();

    let file_flags = load_config_flags(&path).unwrap();
    let cli_args = vec![
        "sheetpad".to_string(),
        "--debounce-ms".to_string(),
        "80".to_string(),
        "--perf".to_string(),
        "load".to_string(),
    ];
    let cli_flags = parse_flag_tokens(&cli_args);

    let effective = file_flags.union(&cli_flags);
    assert!(effective.restore_cell, "file flags should remain enabled");
    assert!(effective.perf, "cli flags should be applied");
    assert_eq!(effective.debounce_ms, Some(80), "cli should override debounce");
    assert_eq!(
        effective.render_debug_log,
        Some(PathBuf::from("file.log")),
        "file config should be preserved when CLI does not override"
    );
}

#[test]
fn test_parse_flag_tokens_handles_equals_syntax() {
    let args = vec![
        "sheetpad".to_string(),
        "--backup=mirror".to_string(),
        "--probe-attempts=7".to_string(),
    ];
    let flags = parse_flag_tokens(&args);
    assert_eq!(flags.backup, Some(BackupPolicy::Mirror));
    assert_eq!(flags.probe_attempts, Some(7));
}

#[test]
fn test_effective_settings_feed_the_observer() {
    let flags = ConfigFlags {
        debounce_ms: Some(40),
        probe_interval_ms: Some(200),
        probe_attempts: Some(0),
        ..ConfigFlags::default()
    };
    let settings = Settings::from_flags(&flags);
    assert_eq!(settings.reply_timeout, Duration::from_millis(5_000));

    let observer = ObserverConfig::from(&settings);
    assert_eq!(observer.debounce_ms, 40);
    assert_eq!(observer.probe_interval_ms, 200);
    assert_eq!(observer.probe_attempts, 1, "at least one probe always runs");
}
