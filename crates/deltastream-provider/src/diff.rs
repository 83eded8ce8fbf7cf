//! Diff model: which changed fields update in place and which force
//! replacement.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// How a changed property is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffKind {
    /// Applied by Update
    Update,
    /// Requires delete + create
    Replace,
}

impl std::fmt::Display for DiffKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiffKind::Update => write!(f, "update"),
            DiffKind::Replace => write!(f, "replace"),
        }
    }
}

/// Result of comparing prior state with new inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffResponse {
    pub has_changes: bool,
    /// Property path to change kind
    pub detailed_diff: BTreeMap<String, DiffKind>,
    /// Delete the old resource before creating its replacement
    pub delete_before_replace: bool,
}

impl DiffResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, property: &str) -> &mut Self {
        self.record(property, DiffKind::Update)
    }

    pub fn replace(&mut self, property: &str) -> &mut Self {
        self.record(property, DiffKind::Replace)
    }

    fn record(&mut self, property: &str, kind: DiffKind) -> &mut Self {
        // Replace wins over Update for the same property.
        let entry = self
            .detailed_diff
            .entry(property.to_string())
            .or_insert(kind);
        if kind == DiffKind::Replace {
            *entry = DiffKind::Replace;
        }
        self.has_changes = true;
        self
    }

    pub fn delete_before_replace(mut self, value: bool) -> Self {
        self.delete_before_replace = value;
        self
    }

    pub fn requires_replace(&self) -> bool {
        self.detailed_diff.values().any(|k| *k == DiffKind::Replace)
    }

    pub fn kind_of(&self, property: &str) -> Option<DiffKind> {
        self.detailed_diff.get(property).copied()
    }
}

/// Owner drift: set where it was unset, or changed to a different value.
/// Clearing a previously set owner is not a change.
pub fn owner_changed(prior: Option<&str>, new: Option<&str>) -> bool {
    match (prior, new) {
        (None, Some(_)) => true,
        (Some(a), Some(b)) => a != b,
        _ => false,
    }
}

/// Order-insensitive comparison of declared relation lists.
pub fn same_set(a: &[String], b: &[String]) -> bool {
    let a: BTreeSet<&str> = a.iter().map(|s| s.trim()).collect();
    let b: BTreeSet<&str> = b.iter().map(|s| s.trim()).collect();
    a == b
}
