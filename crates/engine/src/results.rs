//! Per-object result cache
//!
//! Rows fetched for an alias are kept until the object is dropped or the
//! entry is destroyed, so counting, paging and re-reads within one request
//! do not query again. Every cached row carries empty `checkbox` and
//! `tools` cells for the list system columns.

use dataobjects_core::Row;
use dataobjects_model::{CHECKBOX_FIELD, TOOLS_FIELD};
use indexmap::IndexMap;
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultStack {
    stacks: IndexMap<String, Vec<Row>>,
    primary: Option<String>,
}

impl ResultStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache rows under `alias`; the first alias cached becomes primary
    pub fn add(&mut self, alias: impl Into<String>, rows: Vec<Row>) {
        let alias = alias.into();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.insert(CHECKBOX_FIELD.to_string(), Value::String(String::new()));
                row.insert(TOOLS_FIELD.to_string(), Value::String(String::new()));
                row
            })
            .collect();
        if self.primary.is_none() {
            self.primary = Some(alias.clone());
        }
        self.stacks.insert(alias, rows);
    }

    pub fn get(&self, alias: &str) -> Option<&[Row]> {
        self.stacks.get(alias).map(Vec::as_slice)
    }

    pub fn has_results(&self, alias: &str) -> bool {
        self.stacks.contains_key(alias)
    }

    pub fn which_primary(&self) -> Option<&str> {
        self.primary.as_deref()
    }

    /// Rows of the primary alias
    pub fn primary_rows(&self) -> Option<&[Row]> {
        self.primary.as_deref().and_then(|alias| self.get(alias))
    }

    /// Drop one alias; dropping the primary clears the primary mark
    pub fn destroy(&mut self, alias: &str) -> Option<Vec<Row>> {
        if self.primary.as_deref() == Some(alias) {
            self.primary = None;
        }
        self.stacks.shift_remove(alias)
    }

    pub fn clear(&mut self) {
        self.stacks.clear();
        self.primary = None;
    }

    pub fn is_empty(&self) -> bool {
        self.stacks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn rows() -> Vec<Row> {
        vec![json!({"id": 1}).as_object().cloned().unwrap_or_default()]
    }

    #[test]
    fn test_rows_gain_system_cells() {
        let mut stack = ResultStack::new();
        stack.add("users", rows());
        let row = &stack.primary_rows().unwrap()[0];
        assert_eq!(row[CHECKBOX_FIELD], json!(""));
        assert_eq!(row[TOOLS_FIELD], json!(""));
        assert_eq!(row["id"], json!(1));
    }

    #[test]
    fn test_first_alias_is_primary_until_destroyed() {
        let mut stack = ResultStack::new();
        stack.add("users", rows());
        stack.add("teams", rows());
        assert_eq!(stack.which_primary(), Some("users"));

        stack.destroy("users");
        assert_eq!(stack.which_primary(), None);
        assert!(stack.has_results("teams"));
        assert!(stack.primary_rows().is_none());
    }
}
