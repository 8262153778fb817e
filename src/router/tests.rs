use std::sync::Arc;

use serde_json::{Value, json};

use super::*;
use crate::clock::ManualClock;
use crate::protocol::{Bounds, CellCoordinates, SAVE_CONTENT};
use crate::store::MemoryStore;

fn router_at(now_ms: u64) -> (Router, ManualClock) {
    let clock = ManualClock::new(now_ms);
    (Router::new(MemoryStore::new(), Arc::new(clock.clone())), clock)
}

fn result_of(outcome: Outcome) -> Value {
    match outcome {
        Outcome::Responded(Response {
            success: true,
            result: Some(result),
            ..
        }) => result,
        other => panic!("expected successful response, got {other:?}"),
    }
}

fn save(router: &mut Router, content: &str) -> Value {
    result_of(router.handle(
        Request::SaveContent {
            content: content.to_string(),
        },
        &Origin::panel(),
    ))
}

fn load(router: &mut Router) -> ContentRecord {
    serde_json::from_value(result_of(
        router.handle(Request::LoadContent, &Origin::panel()),
    ))
    .unwrap()
}

fn reset(router: &mut Router) -> ResetResult {
    serde_json::from_value(result_of(
        router.handle(Request::ResetContent, &Origin::panel()),
    ))
    .unwrap()
}

fn selection(label: &str, content: &str) -> CellSelection {
    CellSelection {
        content: content.to_string(),
        coordinates: Some(CellCoordinates {
            row: 1,
            col: 1,
            label: label.to_string(),
        }),
        bounds: Bounds::default(),
        timestamp: 0,
        source_url: "https://docs.google.com/spreadsheets/d/abc".to_string(),
        tab_id: None,
    }
}

#[test]
fn test_load_before_anything_returns_empty_defaults() {
    let (mut router, _) = router_at(5);
    let record = load(&mut router);
    assert_eq!(record.content, "");
    assert_eq!(record.backup, "");
    assert_eq!(record.last_saved, None);
}

#[test]
fn test_save_then_load_returns_content_and_mirrored_backup() {
    let (mut router, _) = router_at(1_234);
    let saved = save(&mut router, "<p>x</p>");
    assert_eq!(saved, json!({"timestamp": 1_234}));

    let record = load(&mut router);
    assert_eq!(record.content, "<p>x</p>");
    assert_eq!(record.backup, "<p>x</p>");
    assert_eq!(record.last_saved, Some(1_234));
}

#[test]
fn test_mirror_policy_reset_yields_latest_save() {
    let (mut router, _) = router_at(1);
    save(&mut router, "<p>one</p>");
    save(&mut router, "<p>two</p>");
    assert_eq!(reset(&mut router).content, "<p>two</p>");
}

#[test]
fn test_previous_policy_reset_yields_prior_save() {
    let (router, _) = router_at(1);
    let mut router = router.with_backup_policy(BackupPolicy::Previous);
    save(&mut router, "<p>one</p>");
    save(&mut router, "<p>two</p>");

    let record = load(&mut router);
    assert_eq!(record.content, "<p>two</p>");
    assert_eq!(record.backup, "<p>one</p>");
    assert_eq!(reset(&mut router).content, "<p>one</p>");
}

#[test]
fn test_reset_does_not_touch_backup_or_timestamp() {
    let (mut router, clock) = router_at(10);
    save(&mut router, "<p>saved</p>");
    clock.advance(500);
    reset(&mut router);
    let record = load(&mut router);
    assert_eq!(record.backup, "<p>saved</p>");
    assert_eq!(record.last_saved, Some(10));
}

#[test]
fn test_install_seeds_default_template() {
    let (mut router, _) = router_at(77);
    assert_eq!(router.on_installed(InstallReason::Install), Outcome::Updated);
    let record = load(&mut router);
    assert_eq!(record.content, DEFAULT_TEMPLATE);
    assert_eq!(record.backup, DEFAULT_TEMPLATE);
    assert_eq!(record.last_saved, Some(77));
}

#[test]
fn test_update_install_reason_leaves_store_alone() {
    let (mut router, _) = router_at(77);
    save(&mut router, "<p>mine</p>");
    assert_eq!(router.on_installed(InstallReason::Update), Outcome::Ignored);
    assert_eq!(load(&mut router).content, "<p>mine</p>");
}

#[test]
fn test_get_current_cell_before_detection_is_null() {
    let (mut router, _) = router_at(1);
    let outcome = router.handle(Request::GetCurrentCell, &Origin::panel());
    assert_eq!(
        outcome,
        Outcome::Responded(Response {
            success: true,
            result: Some(Value::Null),
            error: None,
        })
    );
}

#[test]
fn test_cell_selected_stamps_state_badge_and_mirror() {
    let (mut router, _) = router_at(9_000);
    let updates = router.bus().subscribe();
    let outcome = router.handle(
        Request::CellSelected {
            data: selection("B2", "hi"),
        },
        &Origin::tab(3, "https://docs.google.com/spreadsheets/d/abc"),
    );
    assert_eq!(outcome, Outcome::Rebroadcast { delivered: 1 });

    let current = router.current_selection().cloned().unwrap();
    assert_eq!(current.tab_id, Some(3));
    assert_eq!(current.timestamp, 9_000);
    assert_eq!(router.badge(3), Some("B2"));

    match updates.try_recv().unwrap() {
        Broadcast::CellSelectionUpdate { data } => assert_eq!(data, current),
        other => panic!("unexpected {other:?}"),
    }

    let got = result_of(router.handle(Request::GetCurrentCell, &Origin::panel()));
    assert_eq!(got["a1"], Value::Null);
    assert_eq!(got["coordinates"]["a1"], json!("B2"));
    assert_eq!(got["tabId"], json!(3));
}

#[test]
fn test_cell_selected_without_listener_is_swallowed() {
    let (mut router, _) = router_at(1);
    let outcome = router.handle(
        Request::CellSelected {
            data: selection("A1", ""),
        },
        &Origin::tab(1, "u"),
    );
    assert_eq!(outcome, Outcome::Rebroadcast { delivered: 0 });
    assert!(router.current_selection().is_some());
}

#[test]
fn test_latest_selection_wins_across_tabs() {
    let (mut router, _) = router_at(1);
    router.handle(
        Request::CellSelected {
            data: selection("A1", "first"),
        },
        &Origin::tab(1, "u1"),
    );
    router.handle(
        Request::CellSelected {
            data: selection("C9", "second"),
        },
        &Origin::tab(2, "u2"),
    );
    let current = router.current_selection().unwrap();
    assert_eq!(current.label(), Some("C9"));
    assert_eq!(current.tab_id, Some(2));
    assert_eq!(router.badge(1), Some("A1"));
}

#[test]
fn test_detector_ready_sets_badge() {
    let (mut router, _) = router_at(1);
    let outcome = router.handle(
        Request::SheetsDetectorReady {
            data: DetectorReady {
                url: "https://docs.google.com/spreadsheets/d/abc".to_string(),
            },
        },
        &Origin::tab(8, "https://docs.google.com/spreadsheets/d/abc"),
    );
    assert_eq!(outcome, Outcome::Updated);
    assert_eq!(router.badge(8), Some(READY_BADGE));
}

#[test]
fn test_unknown_and_malformed_json_are_ignored() {
    let (mut router, _) = router_at(1);
    assert_eq!(
        router.handle_json(r#"{"type":"DELETE_EVERYTHING"}"#, &Origin::panel()),
        Outcome::Ignored
    );
    assert_eq!(
        router.handle_json("not json", &Origin::panel()),
        Outcome::Ignored
    );
    assert_eq!(
        router.handle_json(r#"{"content":"no type"}"#, &Origin::panel()),
        Outcome::Ignored
    );
    assert_eq!(
        router.handle_json(r#"{"type":"CELL_SELECTED"}"#, &Origin::panel()),
        Outcome::Ignored
    );
    // Still serving afterwards.
    assert_eq!(load(&mut router).content, "");
}

#[test]
fn test_save_without_content_stores_empty_editor() {
    let (mut router, _) = router_at(9);
    save(&mut router, "<p>old</p>");
    result_of(router.handle_json(r#"{"type":"SAVE_CONTENT"}"#, &Origin::panel()));
    let record = load(&mut router);
    assert_eq!(record.content, "");
    assert_eq!(record.last_saved, Some(9));
}

#[test]
fn test_malformed_request_expecting_reply_gets_error() {
    let (mut router, _) = router_at(9);
    save(&mut router, "<p>kept</p>");
    for raw in [
        r#"{"type":"SAVE_CONTENT","content":null}"#,
        r#"{"type":"SAVE_CONTENT","content":42}"#,
    ] {
        match router.handle_json(raw, &Origin::panel()) {
            Outcome::Responded(Response {
                success: false,
                result: None,
                error: Some(error),
            }) => assert!(error.contains(SAVE_CONTENT), "{error}"),
            other => panic!("expected error response for {raw}, got {other:?}"),
        }
    }
    assert_eq!(load(&mut router).content, "<p>kept</p>");
}

#[test]
fn test_json_requests_dispatch_like_typed_ones() {
    let (mut router, _) = router_at(3);
    let outcome = router.handle_json(
        r#"{"type":"SAVE_CONTENT","content":"<b>wire</b>"}"#,
        &Origin::panel(),
    );
    assert_eq!(result_of(outcome), json!({"timestamp": 3}));
    assert_eq!(load(&mut router).content, "<b>wire</b>");
}

#[test]
fn test_command_requires_active_tab() {
    let (mut router, _) = router_at(1);
    let updates = router.bus().subscribe();
    assert_eq!(router.on_command("save-content", None), Outcome::Ignored);
    assert_eq!(
        router.on_command("save-content", Some(5)),
        Outcome::Rebroadcast { delivered: 1 }
    );
    assert_eq!(
        updates.try_recv().unwrap(),
        Broadcast::KeyboardCommand {
            command: "save-content".to_string(),
            tab_id: 5,
        }
    );
}

#[test]
fn test_restore_selection_reads_mirror() {
    let clock = ManualClock::new(50);
    let mut store = MemoryStore::new();
    {
        let mut first = Router::new(store.clone(), Arc::new(clock.clone()));
        first.handle(
            Request::CellSelected {
                data: selection("D4", "kept"),
            },
            &Origin::tab(2, "u"),
        );
        let mirror = first
            .store
            .get(&[keys::CURRENT_CELL_SELECTION, keys::LAST_CELL_UPDATE])
            .unwrap();
        assert_eq!(mirror[keys::LAST_CELL_UPDATE], json!(50));
        store.set(mirror).unwrap();
    }

    let mut second = Router::new(store, Arc::new(clock));
    assert!(second.restore_selection().unwrap());
    assert_eq!(second.current_selection().unwrap().content, "kept");
}

#[test]
fn test_restore_selection_with_empty_store_finds_nothing() {
    let (mut router, _) = router_at(1);
    assert!(!router.restore_selection().unwrap());
    assert!(router.current_selection().is_none());
}
