//! Typed messages exchanged between the panel, the page observer and the
//! background router.
//!
//! On the wire every message is a JSON object tagged by `type`, using the
//! SCREAMING_SNAKE_CASE names below. Inbound requests are a closed set;
//! anything else is reported as [`ProtocolError::UnknownType`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const SAVE_CONTENT: &str = "SAVE_CONTENT";
pub const LOAD_CONTENT: &str = "LOAD_CONTENT";
pub const RESET_CONTENT: &str = "RESET_CONTENT";
pub const SHEETS_DETECTOR_READY: &str = "SHEETS_DETECTOR_READY";
pub const CELL_SELECTED: &str = "CELL_SELECTED";
pub const GET_CURRENT_CELL: &str = "GET_CURRENT_CELL";
pub const CELL_SELECTION_UPDATE: &str = "CELL_SELECTION_UPDATE";
pub const KEYBOARD_COMMAND: &str = "KEYBOARD_COMMAND";

const REQUEST_TYPES: [&str; 6] = [
    SAVE_CONTENT,
    LOAD_CONTENT,
    RESET_CONTENT,
    SHEETS_DETECTOR_READY,
    CELL_SELECTED,
    GET_CURRENT_CELL,
];

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("message has no type tag")]
    MissingType,
    #[error("unknown message type: {0}")]
    UnknownType(String),
    #[error("malformed {kind} message: {source}")]
    Malformed {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("message is not valid JSON: {0}")]
    NotJson(#[source] serde_json::Error),
}

impl ProtocolError {
    /// Whether the undecodable message was a request whose sender waits for
    /// a [`Response`].
    pub fn expects_reply(&self) -> bool {
        matches!(self, Self::Malformed { kind, .. } if kind_expects_reply(kind))
    }
}

/// Whether a request tagged `kind` is answered with a [`Response`], even
/// when its payload fails to decode.
pub fn kind_expects_reply(kind: &str) -> bool {
    matches!(kind, SAVE_CONTENT | LOAD_CONTENT | RESET_CONTENT | GET_CURRENT_CELL)
}

/// Messages sent to the router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    /// An empty editor is sent without `content`.
    SaveContent {
        #[serde(default)]
        content: String,
    },
    LoadContent,
    ResetContent,
    SheetsDetectorReady { data: DetectorReady },
    CellSelected { data: CellSelection },
    GetCurrentCell,
}

impl Request {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::SaveContent { .. } => SAVE_CONTENT,
            Self::LoadContent => LOAD_CONTENT,
            Self::ResetContent => RESET_CONTENT,
            Self::SheetsDetectorReady { .. } => SHEETS_DETECTOR_READY,
            Self::CellSelected { .. } => CELL_SELECTED,
            Self::GetCurrentCell => GET_CURRENT_CELL,
        }
    }

    /// Whether the sender expects exactly one [`Response`].
    pub fn expects_reply(&self) -> bool {
        kind_expects_reply(self.kind())
    }

    /// Decode a raw wire message.
    ///
    /// # Errors
    /// Returns [`ProtocolError::UnknownType`] for tags outside the request set,
    /// and a decode error when the payload does not fit the tagged variant.
    pub fn from_json(raw: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(raw).map_err(ProtocolError::NotJson)?;
        Self::from_value(value)
    }

    /// Decode an already-parsed wire message.
    ///
    /// # Errors
    /// See [`Request::from_json`].
    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingType)?
            .to_string();
        if !REQUEST_TYPES.contains(&kind.as_str()) {
            return Err(ProtocolError::UnknownType(kind));
        }
        serde_json::from_value(value).map_err(|source| ProtocolError::Malformed { kind, source })
    }
}

/// Events the router pushes to whoever is listening.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Broadcast {
    CellSelectionUpdate {
        data: CellSelection,
    },
    KeyboardCommand {
        command: String,
        #[serde(rename = "tabId")]
        tab_id: u32,
    },
}

/// Reply to a request: `{success: true, result}` or `{success: false, error}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn ok(result: impl Serialize) -> Self {
        match serde_json::to_value(result) {
            Ok(value) => Self {
                success: true,
                result: Some(value),
                error: None,
            },
            Err(err) => Self::err(format!("failed to encode result: {err}")),
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(message.into()),
        }
    }
}

/// Who sent a message. Page scripts carry their tab.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Origin {
    pub tab_id: Option<u32>,
    pub url: Option<String>,
}

impl Origin {
    pub const fn panel() -> Self {
        Self {
            tab_id: None,
            url: None,
        }
    }

    pub fn tab(tab_id: u32, url: impl Into<String>) -> Self {
        Self {
            tab_id: Some(tab_id),
            url: Some(url.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectorReady {
    pub url: String,
}

/// Normalized spreadsheet cell position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellCoordinates {
    pub row: u32,
    pub col: u32,
    /// A1-style reference, e.g. `AA12`.
    #[serde(rename = "a1", alias = "label")]
    pub label: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellSelection {
    pub content: String,
    pub coordinates: Option<CellCoordinates>,
    #[serde(default)]
    pub bounds: Bounds,
    pub timestamp: u64,
    #[serde(rename = "url", alias = "sourceUrl", default)]
    pub source_url: String,
    #[serde(rename = "tabId", default, skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<u32>,
}

impl CellSelection {
    pub fn label(&self) -> Option<&str> {
        self.coordinates.as_ref().map(|c| c.label.as_str())
    }

    /// Value equality on what a user can see: label and text.
    pub fn same_cell_and_text(&self, other: &Self) -> bool {
        self.label() == other.label() && self.content == other.content
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveResult {
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentRecord {
    pub content: String,
    pub backup: String,
    pub last_saved: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetResult {
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_selection() -> CellSelection {
        CellSelection {
            content: "42".to_string(),
            coordinates: Some(CellCoordinates {
                row: 3,
                col: 27,
                label: "AA3".to_string(),
            }),
            bounds: Bounds {
                x: 1.0,
                y: 2.0,
                width: 100.0,
                height: 20.0,
            },
            timestamp: 10,
            source_url: "https://docs.google.com/spreadsheets/d/x".to_string(),
            tab_id: None,
        }
    }

    #[test]
    fn test_save_request_wire_shape() {
        let req = Request::SaveContent {
            content: "<p>x</p>".to_string(),
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value, json!({"type": "SAVE_CONTENT", "content": "<p>x</p>"}));
        assert!(req.expects_reply());
    }

    #[test]
    fn test_unit_requests_decode_without_payload() {
        assert_eq!(
            Request::from_json(r#"{"type":"LOAD_CONTENT"}"#).unwrap(),
            Request::LoadContent
        );
        assert_eq!(
            Request::from_json(r#"{"type":"GET_CURRENT_CELL"}"#).unwrap(),
            Request::GetCurrentCell
        );
    }

    #[test]
    fn test_cell_selected_uses_a1_field() {
        let raw = json!({
            "type": "CELL_SELECTED",
            "data": {
                "content": "42",
                "coordinates": {"row": 3, "col": 27, "a1": "AA3"},
                "bounds": {"x": 1.0, "y": 2.0, "width": 100.0, "height": 20.0},
                "timestamp": 10,
                "url": "https://docs.google.com/spreadsheets/d/x"
            }
        });
        let req = Request::from_value(raw).unwrap();
        assert_eq!(
            req,
            Request::CellSelected {
                data: sample_selection()
            }
        );
        assert!(!req.expects_reply());
    }

    #[test]
    fn test_unknown_type_is_reported_not_malformed() {
        let err = Request::from_json(r#"{"type":"PING","data":{}}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownType(ref t) if t == "PING"));
    }

    #[test]
    fn test_types_are_case_sensitive() {
        let err = Request::from_json(r#"{"type":"save_content","content":""}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownType(_)));
    }

    #[test]
    fn test_save_without_content_saves_empty_editor() {
        assert_eq!(
            Request::from_json(r#"{"type":"SAVE_CONTENT"}"#).unwrap(),
            Request::SaveContent {
                content: String::new()
            }
        );
        let err = Request::from_json(r#"{"type":"SAVE_CONTENT","content":null}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed { ref kind, .. } if kind == SAVE_CONTENT));
    }

    #[test]
    fn test_missing_payload_is_malformed() {
        let err = Request::from_json(r#"{"type":"CELL_SELECTED"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed { ref kind, .. } if kind == CELL_SELECTED));
        assert!(!kind_expects_reply(CELL_SELECTED));
        assert!(kind_expects_reply(GET_CURRENT_CELL));
        assert!(!kind_expects_reply("PING"));
    }

    #[test]
    fn test_keyboard_command_broadcast_uses_tab_id() {
        let event = Broadcast::KeyboardCommand {
            command: "save-content".to_string(),
            tab_id: 9,
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "KEYBOARD_COMMAND", "command": "save-content", "tabId": 9})
        );
    }

    #[test]
    fn test_response_shapes() {
        let ok = serde_json::to_value(Response::ok(SaveResult { timestamp: 5 })).unwrap();
        assert_eq!(ok, json!({"success": true, "result": {"timestamp": 5}}));
        let err = serde_json::to_value(Response::err("boom")).unwrap();
        assert_eq!(err, json!({"success": false, "error": "boom"}));
    }

    #[test]
    fn test_content_record_camel_case() {
        let record = ContentRecord {
            content: "a".to_string(),
            backup: "b".to_string(),
            last_saved: None,
        };
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({"content": "a", "backup": "b", "lastSaved": null})
        );
    }

    #[test]
    fn test_same_cell_and_text_ignores_position_and_time() {
        let a = sample_selection();
        let mut b = sample_selection();
        b.timestamp = 99;
        b.bounds.x = 500.0;
        assert!(a.same_cell_and_text(&b));
        b.content = "43".to_string();
        assert!(!a.same_cell_and_text(&b));
    }
}
