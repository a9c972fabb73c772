//! Client-Side Table Filtering
//!
//! Multi-field equality filters over an in-memory dataset, plus the
//! distinct-value option lists used to populate selection controls.
//!
//! # Semantics
//!
//! - Constraints combine with AND.
//! - A field with no selected value (absent or empty) constrains nothing.
//! - Values compare by their display text, so `5` and `"5"` are equal.
//! - Option lists keep first-seen order and drop duplicates.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap, HashSet};

// =============================================================================
// Record Access
// =============================================================================

/// A row whose fields can be read by name.
pub trait Record {
    /// Text value of a field, or `None` if absent or null.
    fn field(&self, name: &str) -> Option<Cow<'_, str>>;
}

impl Record for serde_json::Value {
    fn field(&self, name: &str) -> Option<Cow<'_, str>> {
        match self.get(name)? {
            Self::Null => None,
            Self::String(text) => Some(Cow::Borrowed(text.as_str())),
            Self::Bool(flag) => Some(Cow::Owned(flag.to_string())),
            Self::Number(number) => Some(Cow::Owned(number.to_string())),
            nested => Some(Cow::Owned(nested.to_string())),
        }
    }
}

impl Record for HashMap<String, String> {
    fn field(&self, name: &str) -> Option<Cow<'_, str>> {
        self.get(name).map(|v| Cow::Borrowed(v.as_str()))
    }
}

impl Record for BTreeMap<String, String> {
    fn field(&self, name: &str) -> Option<Cow<'_, str>> {
        self.get(name).map(|v| Cow::Borrowed(v.as_str()))
    }
}

// =============================================================================
// Filter Set
// =============================================================================

/// A single field constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Selection {
    field: String,
    value: Option<String>,
}

/// Field → selected value mapping.
///
/// Each table instance owns its own `FilterSet`; nothing here is shared.
///
/// # Example
///
/// ```rust
/// use dashboard_sync::domain::filter::FilterSet;
/// use serde_json::json;
///
/// let rows = vec![
///     json!({"symbol": "AAPL", "side": "BUY"}),
///     json!({"symbol": "MSFT", "side": "BUY"}),
///     json!({"symbol": "AAPL", "side": "SELL"}),
/// ];
///
/// let filters = FilterSet::new().with("symbol", "AAPL").with("side", "SELL");
/// let matched = filters.apply(&rows);
/// assert_eq!(matched.len(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSet {
    selections: Vec<Selection>,
}

impl FilterSet {
    /// Create an empty filter set (matches everything).
    #[must_use]
    pub const fn new() -> Self {
        Self {
            selections: Vec::new(),
        }
    }

    /// Create a filter set declaring the given fields, all unselected.
    #[must_use]
    pub fn for_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            selections: fields
                .into_iter()
                .map(|field| Selection {
                    field: field.into(),
                    value: None,
                })
                .collect(),
        }
    }

    /// Builder form of [`FilterSet::set`].
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(field, Some(value.into()));
        self
    }

    /// Select a value for a field, replacing any previous selection.
    ///
    /// `None` or an empty string clears the constraint but keeps the field
    /// declared.
    pub fn set(&mut self, field: impl Into<String>, value: Option<String>) {
        let field = field.into();
        let value = value.filter(|v| !v.is_empty());

        if let Some(existing) = self.selections.iter_mut().find(|s| s.field == field) {
            existing.value = value;
        } else {
            self.selections.push(Selection { field, value });
        }
    }

    /// Clear the selection for a field.
    pub fn clear(&mut self, field: &str) {
        for selection in self.selections.iter_mut().filter(|s| s.field == field) {
            selection.value = None;
        }
    }

    /// Clear every selection.
    pub fn clear_all(&mut self) {
        for selection in &mut self.selections {
            selection.value = None;
        }
    }

    /// The selected value for a field, if any.
    #[must_use]
    pub fn selected(&self, field: &str) -> Option<&str> {
        self.selections
            .iter()
            .find(|s| s.field == field)
            .and_then(|s| s.value.as_deref())
    }

    /// Declared field names in declaration order (duplicates removed).
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        let mut seen = HashSet::new();
        self.selections
            .iter()
            .map(|s| s.field.as_str())
            .filter(move |field| seen.insert(*field))
    }

    /// True when no field has a selected value.
    #[must_use]
    pub fn is_unconstrained(&self) -> bool {
        self.selections.iter().all(|s| s.value.is_none())
    }

    /// Combine two filter sets with AND semantics.
    ///
    /// Unlike [`FilterSet::set`], a field constrained by both sides keeps
    /// both constraints, so conflicting values match nothing.
    #[must_use]
    pub fn and(&self, other: &Self) -> Self {
        let mut selections = self.selections.clone();
        selections.extend(other.selections.iter().cloned());
        Self { selections }
    }

    /// Check whether a row satisfies every constraint.
    pub fn matches<R: Record + ?Sized>(&self, row: &R) -> bool {
        self.selections.iter().all(|selection| {
            selection
                .value
                .as_deref()
                .is_none_or(|wanted| row.field(&selection.field).as_deref() == Some(wanted))
        })
    }

    /// Borrow the matching rows, preserving order.
    pub fn apply<'a, R: Record>(&self, rows: &'a [R]) -> Vec<&'a R> {
        rows.iter().filter(|row| self.matches(*row)).collect()
    }

    /// Build one option list per declared field.
    pub fn option_sets<R: Record>(&self, rows: &[R]) -> Vec<(String, Vec<String>)> {
        self.fields()
            .map(|field| (field.to_string(), distinct_options(rows, field)))
            .collect()
    }
}

// =============================================================================
// Free Functions
// =============================================================================

/// Filter a dataset, returning owned copies of the matching rows.
///
/// An unconstrained filter returns the dataset unchanged.
pub fn filter<R: Record + Clone>(rows: &[R], filters: &FilterSet) -> Vec<R> {
    if filters.is_unconstrained() {
        return rows.to_vec();
    }
    rows.iter()
        .filter(|row| filters.matches(*row))
        .cloned()
        .collect()
}

/// Distinct non-empty values of a field, in first-seen order.
pub fn distinct_options<R: Record>(rows: &[R], field: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut options = Vec::new();

    for row in rows {
        if let Some(value) = row.field(field)
            && !value.is_empty()
            && seen.insert(value.to_string())
        {
            options.push(value.into_owned());
        }
    }

    options
}

// =============================================================================
// Tests
// =============================================================================
