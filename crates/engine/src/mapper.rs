//! # Result Mapper
//!
//! Shapes raw rows into flat, field-keyed records using the field
//! registry: one output key per field in registry order, values resolved
//! through each field's source mapping and formatted by field type.

use dataobjects_core::{ObjectKind, Row, path};
use dataobjects_model::{FieldDescriptor, FieldRegistry, SourceRef};
use heck::{ToLowerCamelCase, ToSnakeCase};
use indexmap::IndexMap;
use serde_json::Value;

use crate::format::format_cell;

/// Value of a field the raw row does not carry
pub const MISSING_VALUE: &str = "nicht gesetzt (0)";

/// Row identifier key of list output
pub const ROW_ID_KEY: &str = "DT_RowId";

/// Maps raw rows for one object
#[derive(Debug, Clone, Copy)]
pub struct RowMapper<'a> {
    registry: &'a FieldRegistry,
    primary_key: &'a str,
    /// Column search values applied to the query, by field ID
    filters: Option<&'a IndexMap<String, String>>,
}

impl<'a> RowMapper<'a> {
    pub fn new(registry: &'a FieldRegistry, primary_key: &'a str) -> Self {
        Self {
            registry,
            primary_key,
            filters: None,
        }
    }

    /// Narrow to-many relation cells to the items a column search matched
    pub fn with_filters(mut self, filters: &'a IndexMap<String, String>) -> Self {
        self.filters = Some(filters);
        self
    }

    /// Map one raw row
    pub fn map(&self, raw: &Row) -> Row {
        let mut output = Row::new();
        if self.registry.kind() == ObjectKind::List {
            output.insert(
                ROW_ID_KEY.to_string(),
                raw.get(self.primary_key).cloned().unwrap_or(Value::Null),
            );
        }
        for field in self.registry.iter() {
            output.insert(field.id.clone(), self.field_value(field, raw));
        }
        output
    }

    pub fn map_all(&self, rows: &[Row]) -> Vec<Value> {
        rows.iter().map(|row| Value::Object(self.map(row))).collect()
    }

    fn field_value(&self, field: &FieldDescriptor, raw: &Row) -> Value {
        if field.system_field || field.field_type.is_blank_column() {
            return Value::String(String::new());
        }

        if field.has_render_output() {
            let value = raw.get(&field.id).cloned().unwrap_or(Value::Null);
            return match field.option(&path::display(&value)) {
                Some(option) => Value::String(option.text.clone()),
                None => value,
            };
        }

        let value = match field.sources() {
            [] => raw
                .get(&field.id)
                .cloned()
                .unwrap_or_else(|| Value::String(MISSING_VALUE.to_string())),
            [single] if !single.is_separator() => self.source_value(field, single, raw),
            sources => {
                let mut text = String::new();
                for source in sources {
                    match source {
                        SourceRef::Separator(_) => text.push(' '),
                        other => text.push_str(&path::display(&self.source_value(field, other, raw))),
                    }
                }
                Value::String(text)
            }
        };
        format_cell(value, &field.field_type, self.registry.kind())
    }

    fn source_value(&self, field: &FieldDescriptor, source: &SourceRef, raw: &Row) -> Value {
        match source {
            SourceRef::Separator(_) => Value::String(" ".to_string()),
            SourceRef::Column(column) | SourceRef::Aliased { column, .. } => {
                raw.get(column).cloned().unwrap_or(Value::Null)
            }
            SourceRef::Relation {
                relation, column, ..
            } => {
                let nested = raw
                    .get(relation)
                    .or_else(|| raw.get(&relation.to_lower_camel_case()))
                    .or_else(|| raw.get(&relation.to_snake_case()));
                match nested {
                    Some(Value::Object(record)) => record.get(column).cloned().unwrap_or(Value::Null),
                    Some(Value::Array(items)) => self.join_items(field, items, column),
                    _ => Value::Null,
                }
            }
        }
    }

    /// `column` of each related item, joined with `", "`
    fn join_items(&self, field: &FieldDescriptor, items: &[Value], column: &str) -> Value {
        let values: Vec<String> = items
            .iter()
            .filter_map(|item| item.get(column))
            .filter(|v| !v.is_null())
            .map(path::display)
            .collect();
        let filter = self
            .filters
            .and_then(|filters| filters.get(&field.id))
            .map(|f| f.to_lowercase());
        let selected: Vec<&String> = match &filter {
            Some(filter) => {
                let matched: Vec<&String> = values
                    .iter()
                    .filter(|v| filter.split('|').any(|f| !f.is_empty() && v.to_lowercase().contains(f)))
                    .collect();
                if matched.is_empty() {
                    values.iter().collect()
                } else {
                    matched
                }
            }
            None => values.iter().collect(),
        };
        Value::String(
            selected
                .into_iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(", "),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataobjects_core::{FieldType, PropertyAccess};
    use dataobjects_model::{OutputSpec, RenderFunctionRef, RenderOptions, RenderOutput, normalize_options};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap_or_default()
    }

    fn registry(kind: ObjectKind) -> FieldRegistry {
        let mut registry = FieldRegistry::for_kind("users", kind);
        registry.get_or_insert("name");
        registry
            .get_or_insert("full_name")
            .set_property(
                "fieldSource",
                json!(["users:first_name", " ", "users:last_name"]),
            )
            .unwrap();
        registry
            .get_or_insert("team")
            .set_property("fieldSource", json!([["users", "team", "title"]]))
            .unwrap();
        registry
            .get_or_insert("roles")
            .set_property("fieldSource", json!([["users", "userRoles", "label"]]))
            .unwrap();
        registry
            .get_or_insert("born")
            .set_field_type(FieldType::Date);
        registry
    }

    fn raw() -> Row {
        row(json!({
            "id": 7,
            "name": "Ann",
            "first_name": "Ann",
            "last_name": "Lee",
            "team": {"title": "Red"},
            "user_roles": [{"label": "admin"}, {"label": "editor"}],
            "born": "1990-12-01"
        }))
    }

    #[test]
    fn test_list_row_shape() {
        let registry = registry(ObjectKind::List);
        let mapped = RowMapper::new(&registry, "id").map(&raw());
        assert_eq!(
            Value::Object(mapped),
            json!({
                "DT_RowId": 7,
                "checkbox": "",
                "tools": "",
                "name": "Ann",
                "full_name": "Ann Lee",
                "team": "Red",
                "roles": "admin, editor",
                "born": "01.12.1990"
            })
        );
    }

    #[test]
    fn test_form_row_has_no_row_id_and_missing_placeholder() {
        let registry = registry(ObjectKind::Form);
        let mut input = raw();
        input.remove("name");
        let mapped = RowMapper::new(&registry, "id").map(&input);
        assert!(!mapped.contains_key(ROW_ID_KEY));
        assert_eq!(mapped["name"], json!(MISSING_VALUE));
    }

    #[test]
    fn test_single_source_passes_arrays_through() {
        let mut registry = FieldRegistry::for_kind("users", ObjectKind::List);
        registry
            .get_or_insert("tags")
            .set_property("fieldSource", json!([["users", "tags"]]))
            .unwrap();
        let input = row(json!({"id": 1, "tags": [{"id": 1, "name": "a"}]}));
        let mapped = RowMapper::new(&registry, "id").map(&input);
        assert_eq!(mapped["tags"], json!([{"id": 1, "name": "a"}]));
    }

    #[test]
    fn test_render_output_uses_option_text() {
        let mut registry = FieldRegistry::for_kind("users", ObjectKind::List);
        let field = registry.get_or_insert("team_id");
        field.set_render_options(Some(RenderOptions {
            render_function: Some(RenderFunctionRef::new("Teams", "all")),
            render_output: RenderOutput {
                output: Some(OutputSpec::Column("title".into())),
                ..RenderOutput::default()
            },
        }));
        field.options = Some(normalize_options(&json!({"1": "Red"})).unwrap());

        let mapper = RowMapper::new(&registry, "id");
        assert_eq!(mapper.map(&row(json!({"team_id": 1})))["team_id"], json!("Red"));
        assert_eq!(mapper.map(&row(json!({"team_id": 9})))["team_id"], json!(9));
    }

    #[test]
    fn test_filters_narrow_to_many_cells() {
        let registry = registry(ObjectKind::List);
        let filters: IndexMap<String, String> = [("roles".to_string(), "edit".to_string())].into();
        let mapped = RowMapper::new(&registry, "id").with_filters(&filters).map(&raw());
        assert_eq!(mapped["roles"], json!("editor"));
    }
}
