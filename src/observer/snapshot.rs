//! Serialized grid pages.
//!
//! A [`PageSnapshot`] is what a page script would capture of the host
//! document: the candidate cell elements with their attributes, classes,
//! text, geometry and ancestor chain, plus which element has focus.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::selector::Selector;
use super::{CellElement, GridPage};
use crate::protocol::Bounds;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotElement {
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub bounds: Bounds,
    /// Nearest ancestor first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ancestors: Vec<SnapshotElement>,
}

impl SnapshotElement {
    pub fn with_attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    pub fn with_class(mut self, class: &str) -> Self {
        self.classes.push(class.to_string());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_ancestor(mut self, ancestor: Self) -> Self {
        self.ancestors.push(ancestor);
        self
    }

    /// The ancestor at `idx`, carrying the rest of the chain above it.
    fn ancestor_at(&self, idx: usize) -> Self {
        Self {
            ancestors: self.ancestors[idx + 1..].to_vec(),
            ..self.ancestors[idx].clone()
        }
    }

    /// First match among the ancestors (outermost first) and then the
    /// element itself.
    fn first_in_document_order(&self, selector: &Selector) -> Option<Self> {
        (0..self.ancestors.len())
            .rev()
            .find(|&idx| selector.matches(&self.ancestors[idx]))
            .map(|idx| self.ancestor_at(idx))
            .or_else(|| selector.matches(self).then(|| self.clone()))
    }
}

impl CellElement for SnapshotElement {
    fn attribute(&self, name: &str) -> Option<String> {
        self.attributes.get(name).cloned()
    }

    fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    fn text_content(&self) -> String {
        self.text.clone()
    }

    fn bounds(&self) -> Bounds {
        self.bounds
    }

    fn closest(&self, selector: &Selector) -> Option<Self> {
        if selector.matches(self) {
            return Some(self.clone());
        }
        self.ancestors
            .iter()
            .position(|ancestor| selector.matches(ancestor))
            .map(|idx| self.ancestor_at(idx))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub url: String,
    #[serde(default)]
    pub elements: Vec<SnapshotElement>,
    /// Index into `elements` of the focused element.
    #[serde(default)]
    pub focused: Option<usize>,
}

impl PageSnapshot {
    /// # Errors
    /// Returns an error if the file cannot be read or is not a snapshot.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read page snapshot {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Invalid page snapshot {}", path.display()))
    }
}

impl GridPage for PageSnapshot {
    type Element = SnapshotElement;

    fn url(&self) -> String {
        self.url.clone()
    }

    fn query(&self, selector: &Selector) -> Option<SnapshotElement> {
        self.elements
            .iter()
            .find_map(|el| el.first_in_document_order(selector))
    }

    fn active_element(&self) -> Option<SnapshotElement> {
        self.focused.and_then(|idx| self.elements.get(idx)).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closest_walks_ancestors_nearest_first() {
        let grid = SnapshotElement::default().with_attr("role", "grid");
        let row = SnapshotElement::default()
            .with_attr("data-row", "4")
            .with_attr("data-col", "2");
        let cell = SnapshotElement::default()
            .with_class("cell")
            .with_ancestor(row.clone())
            .with_ancestor(grid.clone());

        let row_col = Selector::parse("[data-row][data-col]").unwrap();
        let found = cell.closest(&row_col).unwrap();
        assert_eq!(found.attribute("data-row").as_deref(), Some("4"));
        assert_eq!(found.ancestors, vec![grid]);

        let in_grid = Selector::parse(r#"[role="grid"]"#).unwrap();
        assert!(cell.closest(&in_grid).is_some());
        assert!(row.closest(&in_grid).is_none());
    }

    #[test]
    fn test_snapshot_json_defaults() {
        let snapshot: PageSnapshot = serde_json::from_str(
            r#"{"url": "https://sheet", "elements": [{"classes": ["waffle-cell"], "text": " 7 "}], "focused": 0}"#,
        )
        .unwrap();
        let active = snapshot.active_element().unwrap();
        assert!(active.has_class("waffle-cell"));
        assert_eq!(active.text_content(), " 7 ");
        assert_eq!(active.bounds(), Bounds::default());
    }

    #[test]
    fn test_query_returns_first_match_in_document_order() {
        let snapshot = PageSnapshot {
            url: "u".to_string(),
            elements: vec![
                SnapshotElement::default().with_class("cell").with_text("first"),
                SnapshotElement::default().with_class("cell").with_text("second"),
            ],
            focused: None,
        };
        let sel = Selector::parse(".cell").unwrap();
        assert_eq!(snapshot.query(&sel).unwrap().text, "first");
        assert!(snapshot.active_element().is_none());
    }

    #[test]
    fn test_query_finds_grid_carried_only_as_ancestor() {
        let grid = SnapshotElement::default()
            .with_attr("role", "grid")
            .with_class("waffle");
        let body = SnapshotElement::default().with_class("body");
        let cell = SnapshotElement::default()
            .with_attr("role", "gridcell")
            .with_ancestor(grid.clone())
            .with_ancestor(body.clone());
        let snapshot = PageSnapshot {
            url: "u".to_string(),
            elements: vec![cell],
            focused: None,
        };

        let found = snapshot
            .query(&Selector::parse(r#"[role="grid"]"#).unwrap())
            .unwrap();
        assert!(found.has_class("waffle"));
        assert_eq!(found.ancestors, vec![body.clone()]);

        // The outermost matching ancestor comes first.
        let outer = snapshot.query(&Selector::parse("[role]").unwrap()).unwrap();
        assert!(outer.has_class("waffle"));
        assert!(snapshot.query(&Selector::parse(".missing").unwrap()).is_none());
    }
}
