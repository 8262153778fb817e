//! The small CSS subset the cell observer needs: compound selectors made
//! of `.class`, `[attr]` and `[attr="value"]` parts.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use super::CellElement;

static PART_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^(?:\[([A-Za-z][\w-]*)(?:="([^"]*)")?\]|\.([A-Za-z_][\w-]*))"#)
        .expect("valid selector part regex")
});

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unsupported selector {selector:?} at byte {offset}")]
pub struct SelectorError {
    pub selector: String,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Class(String),
    Attribute { name: String, value: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    source: String,
    parts: Vec<Part>,
}

impl Selector {
    /// # Errors
    /// Returns an error for empty input or syntax outside the supported subset.
    pub fn parse(source: &str) -> Result<Self, SelectorError> {
        let trimmed = source.trim();
        let mut parts = Vec::new();
        let mut offset = 0;
        while offset < trimmed.len() {
            let caps = PART_RE
                .captures(&trimmed[offset..])
                .ok_or_else(|| SelectorError {
                    selector: source.to_string(),
                    offset,
                })?;
            let whole = caps.get(0).map_or(0, |m| m.end());
            if let Some(class) = caps.get(3) {
                parts.push(Part::Class(class.as_str().to_string()));
            } else if let Some(name) = caps.get(1) {
                parts.push(Part::Attribute {
                    name: name.as_str().to_string(),
                    value: caps.get(2).map(|v| v.as_str().to_string()),
                });
            }
            offset += whole;
        }
        if parts.is_empty() {
            return Err(SelectorError {
                selector: source.to_string(),
                offset: 0,
            });
        }
        Ok(Self {
            source: trimmed.to_string(),
            parts,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches<E: CellElement + ?Sized>(&self, element: &E) -> bool {
        self.parts.iter().all(|part| match part {
            Part::Class(class) => element.has_class(class),
            Part::Attribute { name, value: None } => element.attribute(name).is_some(),
            Part::Attribute {
                name,
                value: Some(expected),
            } => element.attribute(name).as_deref() == Some(expected.as_str()),
        })
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
