//! Config Resolver
//!
//! Merges an object's stored configuration with caller overrides into a
//! [`NormalizedConfig`], then builds the [`FieldRegistry`] from the
//! `fieldConfigs` maps and the per-field `fields` overrides.
//!
//! Category handling:
//!
//! - `objectProperties`, `listProperties`/`formProperties` and
//!   `dataTableProperties` start from their built-in templates; known keys
//!   from the merged config replace the defaults, unknown keys are ignored.
//! - `fieldConfigs`, `dataSource`, `fields` and `menu` are carried through
//!   verbatim and interpreted by their consumers.

use dataobjects_core::{EngineResult, ObjectKind, PropertyAccess, path};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::field::FieldDescriptor;
use crate::properties::{BagKind, ObjectProperties, PropertyBag};
use crate::registry::FieldRegistry;

/// Top-level configuration categories
pub const CATEGORIES: &[&str] = &[
    "objectProperties",
    "listProperties",
    "formProperties",
    "dataTableProperties",
    "fieldConfigs",
    "dataSource",
    "fields",
    "menu",
];

/// `fieldConfigs` maps in application order, paired with the field
/// property each one assigns
const FIELD_CONFIG_ORDER: &[(&str, FieldTarget)] = &[
    ("fieldSources", FieldTarget::Key("fieldSource")),
    ("hidden", FieldTarget::Hidden),
    ("hiddenView", FieldTarget::Key("fieldHiddenInView")),
    ("ignoreFields", FieldTarget::Key("ignoreField")),
    ("writeable", FieldTarget::Writeable),
    ("fieldReadOnly", FieldTarget::Key("fieldReadOnly")),
    ("fieldTypes", FieldTarget::Key("fieldType")),
    ("fieldContentTypes", FieldTarget::Key("fieldContentType")),
    ("fieldOptions", FieldTarget::Key("fieldOptions")),
    ("fieldRenderOptions", FieldTarget::Key("fieldRenderOptions")),
    ("fieldFunctions", FieldTarget::Key("fieldFunctions")),
    ("required", FieldTarget::Key("fieldRequired")),
    ("fieldSearchable", FieldTarget::Key("fieldSearchable")),
    ("fieldFilter", FieldTarget::Key("fieldFilter")),
    ("fieldWidths", FieldTarget::Key("fieldColumnWidth")),
    ("fieldLinks", FieldTarget::Key("fieldLink")),
    ("fieldSortable", FieldTarget::Key("fieldSortable")),
    ("sortAssign", FieldTarget::Key("fieldSortAssign")),
    ("searchAssign", FieldTarget::Key("fieldSearchAssign")),
    ("fieldEditable", FieldTarget::Key("fieldEditable")),
    ("fieldDescription", FieldTarget::Key("fieldDescription")),
    ("fieldMinLength", FieldTarget::Key("minLength")),
    ("fieldMaxLength", FieldTarget::Key("maxLength")),
    ("fieldMinValue", FieldTarget::Key("minValue")),
    ("fieldMaxValue", FieldTarget::Key("maxValue")),
    ("fieldMinWidth", FieldTarget::Key("fieldMinWidth")),
    ("fieldMaxWidth", FieldTarget::Key("fieldMaxWidth")),
    ("fieldPattern", FieldTarget::Key("fieldPattern")),
    (
        "fieldRequireSpecialCharacters",
        FieldTarget::Key("requireSpecialCharacters"),
    ),
    (
        "fieldDefinedSpecialCharacters",
        FieldTarget::Key("definedSpecialCharacters"),
    ),
    ("fieldRequireNumber", FieldTarget::Key("requireNumber")),
    ("fieldRequireUpperCase", FieldTarget::Key("requireUpperCase")),
    ("fieldRequireLowerCase", FieldTarget::Key("requireLowerCase")),
    ("fieldAllowNull", FieldTarget::Key("allowNull")),
    ("grouping", FieldTarget::Grouping),
];

#[derive(Debug, Clone, Copy)]
enum FieldTarget {
    /// Assign one field property
    Key(&'static str),
    /// `fieldHiddenInList` or `fieldHiddenInForm`, per variant
    Hidden,
    /// `writeable`, with `fieldReadOnly` as its negation
    Writeable,
    /// Field `grouping`; also switches the object's grouping on
    Grouping,
}

/// Result of merging stored configuration with overrides
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedConfig {
    pub object: ObjectProperties,
    /// `listProperties` or `formProperties`
    pub properties: PropertyBag,
    /// `dataTableProperties`, lists only
    pub data_table: Option<PropertyBag>,
    pub field_configs: Value,
    pub data_source: Value,
    pub fields: Value,
    pub menu: Value,
}

impl NormalizedConfig {
    /// Kind of object this configuration describes
    pub fn kind(&self) -> ObjectKind {
        self.object.object_type
    }

    /// Build the field registry from `fieldConfigs` and `fields`.
    ///
    /// A `grouping` assignment also switches the object's `grouping`
    /// property on.
    pub fn build_registry(&mut self) -> EngineResult<FieldRegistry> {
        let kind = self.kind();
        let mut registry = FieldRegistry::for_kind(&self.object.object_id, kind);

        for (field_id, label) in field_names(&self.field_configs) {
            let field = registry.get_or_insert(&field_id);
            if let Some(label) = label {
                field.name = label;
            }
            if self.apply_field_configs(field)? {
                self.properties.set_property("grouping", json!(true))?;
            }
        }

        apply_field_overrides(&mut registry, &self.fields)?;

        debug!(
            object_id = %self.object.object_id,
            fields = registry.len(),
            "Built field registry"
        );
        Ok(registry)
    }

    /// Apply every `fieldConfigs.*` entry for one field, in the fixed
    /// order. Returns whether a grouping was assigned.
    fn apply_field_configs(&self, field: &mut FieldDescriptor) -> EngineResult<bool> {
        let mut grouped = false;
        for (config_key, target) in FIELD_CONFIG_ORDER {
            let Some(value) = field_config_entry(&self.field_configs, config_key, &field.id)
            else {
                continue;
            };
            match target {
                FieldTarget::Key(key) => {
                    field.apply(key, value)?;
                }
                FieldTarget::Hidden => {
                    let key = match field.kind() {
                        ObjectKind::List => "fieldHiddenInList",
                        ObjectKind::Form => "fieldHiddenInForm",
                    };
                    field.apply(key, value)?;
                }
                FieldTarget::Writeable => {
                    let writeable = path::truthy(&value);
                    field.apply("writeable", json!(writeable))?;
                    field.apply("fieldReadOnly", json!(!writeable))?;
                }
                FieldTarget::Grouping => {
                    grouped |= !value.is_null();
                    field.apply("grouping", value)?;
                }
            }
        }
        Ok(grouped)
    }
}

/// Merge `overrides` over `stored` and normalize the result.
///
/// Overrides win key by key at every depth; arrays are replaced.
pub fn resolve(
    kind: ObjectKind,
    object_id: &str,
    stored: &Value,
    overrides: &Value,
) -> EngineResult<NormalizedConfig> {
    let mut merged = match stored {
        Value::Object(_) => stored.clone(),
        _ => Value::Object(Map::new()),
    };
    path::merge(&mut merged, overrides);

    let mut object = ObjectProperties::new(object_id, kind);
    if let Some(Value::Object(values)) = merged.get("objectProperties") {
        let mut values = values.clone();
        values.remove("objectID");
        values.remove("objectType");
        object.merge_known(&values)?;
    }

    let bag_kind = match kind {
        ObjectKind::List => BagKind::List,
        ObjectKind::Form => BagKind::Form,
    };
    let properties = merged_bag(bag_kind, &merged)?;
    let data_table = match kind {
        ObjectKind::List => Some(merged_bag(BagKind::DataTable, &merged)?),
        ObjectKind::Form => None,
    };

    let verbatim = |key: &str| merged.get(key).cloned().unwrap_or(Value::Null);

    debug!(object_id, kind = %kind, "Resolved object configuration");

    Ok(NormalizedConfig {
        object,
        properties,
        data_table,
        field_configs: verbatim("fieldConfigs"),
        data_source: verbatim("dataSource"),
        fields: verbatim("fields"),
        menu: verbatim("menu"),
    })
}

fn merged_bag(kind: BagKind, merged: &Value) -> EngineResult<PropertyBag> {
    let mut bag = PropertyBag::new(kind);
    if let Some(Value::Object(values)) = merged.get(kind.category()) {
        let applied = bag.merge_known(values)?;
        if applied.len() < values.len() {
            debug!(
                category = kind.category(),
                ignored = values.len() - applied.len(),
                "Ignored unknown property keys"
            );
        }
    }
    Ok(bag)
}

/// Field IDs from `fieldConfigs.names`, with their labels.
///
/// `names` is either `{fieldID: label}` or a list of IDs.
fn field_names(field_configs: &Value) -> Vec<(String, Option<String>)> {
    match field_configs.get("names") {
        Some(Value::Object(names)) => names
            .iter()
            .map(|(id, label)| {
                let label = match label {
                    Value::Null => None,
                    other => Some(path::display(other)),
                };
                (id.clone(), label)
            })
            .collect(),
        Some(Value::Array(ids)) => ids
            .iter()
            .filter_map(Value::as_str)
            .map(|id| (id.to_string(), None))
            .collect(),
        _ => Vec::new(),
    }
}

/// The entry of `fieldConfigs.<config_key>` for one field.
///
/// Maps are keyed by field ID; lists (like `required`) name the fields
/// the flag applies to.
fn field_config_entry(field_configs: &Value, config_key: &str, field_id: &str) -> Option<Value> {
    match field_configs.get(config_key)? {
        Value::Object(map) => map.get(field_id).cloned(),
        Value::Array(ids) => ids
            .iter()
            .any(|id| id.as_str() == Some(field_id))
            .then_some(Value::Bool(true)),
        _ => None,
    }
}

/// Apply `fields.<fieldID>.<property>` overrides.
///
/// Unknown fields and properties the variant does not carry are skipped.
fn apply_field_overrides(registry: &mut FieldRegistry, fields: &Value) -> EngineResult<()> {
    let Value::Object(fields) = fields else {
        return Ok(());
    };
    for (field_id, properties) in fields {
        let Ok(field) = registry.get_mut(field_id) else {
            debug!(field_id = %field_id, "Override names an unknown field, skipped");
            continue;
        };
        let Value::Object(properties) = properties else {
            continue;
        };
        for (key, value) in properties {
            if !field.apply(key, value.clone())? {
                debug!(field_id = %field_id, property = %key, "Unknown field property, skipped");
            }
        }
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{CHECKBOX_FIELD, FieldOption, TOOLS_FIELD};
    use dataobjects_core::{ContentType, FieldType};
    use pretty_assertions::assert_eq;

    fn stored() -> Value {
        json!({
            "objectProperties": {"objectName": "Users"},
            "listProperties": {"primaryKey": "user_id", "pageSize": 10},
            "dataTableProperties": {"listLength": 25},
            "fieldConfigs": {
                "names": {"name": "Name", "email": "E-Mail", "role": "Role", "group": "Group"},
                "fieldSources": {"group": "users:group:title"},
                "fieldTypes": {"role": "select"},
                "fieldOptions": {"role": {"1": "Admin", "2": "Editor"}},
                "fieldSortable": {"name": true, "email": true},
                "fieldWidths": {"email": "200px"},
                "required": ["email"]
            },
            "dataSource": {"stacks": {"users": {"table": "users"}}},
            "menu": {}
        })
    }

    #[test]
    fn test_resolve_merges_categories() {
        let overrides = json!({"listProperties": {"searching": true}});
        let config = resolve(ObjectKind::List, "users", &stored(), &overrides).unwrap();

        assert_eq!(config.object.object_name.as_deref(), Some("Users"));
        assert_eq!(config.properties.primary_key(), "user_id");
        assert_eq!(config.properties.get("searching"), Some(&json!(true)));
        assert_eq!(config.properties.get("pageSize"), None);
        assert_eq!(config.properties.get("fixedHeader"), Some(&json!(true)));
        assert_eq!(
            config.data_table.as_ref().unwrap().list_length(),
            Some(25)
        );
        assert_eq!(config.data_source["stacks"]["users"]["table"], json!("users"));
    }

    #[test]
    fn test_object_identity_is_fixed() {
        let overrides = json!({"objectProperties": {"objectID": "other", "objectType": "form"}});
        let config = resolve(ObjectKind::List, "users", &stored(), &overrides).unwrap();
        assert_eq!(config.object.object_id, "users");
        assert_eq!(config.kind(), ObjectKind::List);
    }

    #[test]
    fn test_build_registry_order_and_properties() {
        let mut config = resolve(ObjectKind::List, "users", &stored(), &Value::Null).unwrap();
        let registry = config.build_registry().unwrap();

        assert_eq!(
            registry.index(),
            vec![CHECKBOX_FIELD, TOOLS_FIELD, "name", "email", "role", "group"]
        );
        let email = registry.get("email").unwrap();
        assert_eq!(email.name, "E-Mail");
        assert!(email.is_sortable());
        assert_eq!(email.get_property("fieldColumnWidth"), Some(json!("200px")));

        let role = registry.get("role").unwrap();
        assert_eq!(role.field_type, FieldType::Select);
        // explicit options replace the seeded boolean set
        assert_eq!(role.options.as_ref().unwrap().len(), 2);
        assert_eq!(role.option("1"), Some(&FieldOption::new(1, "Admin")));

        let group = registry.get("group").unwrap();
        assert!(group.has_relation_source());
    }

    #[test]
    fn test_required_list_applies_to_forms() {
        let mut config = resolve(ObjectKind::Form, "user", &stored(), &Value::Null).unwrap();
        let registry = config.build_registry().unwrap();
        assert_eq!(
            registry.field_property("email", "fieldRequired").unwrap(),
            json!(true)
        );
        assert_eq!(
            registry.field_property("name", "fieldRequired").unwrap(),
            json!(false)
        );
        // list-only settings are ignored on form fields
        assert!(!registry.get("name").unwrap().is_sortable());
    }

    #[test]
    fn test_field_type_override_is_isolated() {
        let mut before = resolve(ObjectKind::List, "users", &stored(), &Value::Null).unwrap();
        let before = before.build_registry().unwrap();

        let overrides = json!({"fieldConfigs": {"fieldTypes": {"email": "select"}}});
        let mut after = resolve(ObjectKind::List, "users", &stored(), &overrides).unwrap();
        let after = after.build_registry().unwrap();

        for id in before.index() {
            if id == "email" {
                continue;
            }
            assert_eq!(before.get(&id).unwrap(), after.get(&id).unwrap(), "{id}");
        }

        let email = after.get("email").unwrap();
        assert_eq!(email.field_type, FieldType::Select);
        assert_eq!(email.content_type, ContentType::Bool);
        assert_eq!(email.options.as_ref().unwrap().len(), 2);
    }

    #[test]
    fn test_field_overrides_win_and_unknowns_are_ignored() {
        let overrides = json!({
            "fields": {
                "email": {"fieldWidth": "x", "fieldColumnWidth": "300px", "fieldName": "Mail"},
                "missing": {"fieldName": "Nope"}
            }
        });
        let mut config = resolve(ObjectKind::List, "users", &stored(), &overrides).unwrap();
        let registry = config.build_registry().unwrap();

        let email = registry.get("email").unwrap();
        assert_eq!(email.name, "Mail");
        assert_eq!(email.get_property("fieldColumnWidth"), Some(json!("300px")));
        assert!(!registry.contains("missing"));
    }

    #[test]
    fn test_writeable_sets_read_only() {
        let overrides = json!({"fieldConfigs": {"writeable": {"email": false}}});
        let mut config = resolve(ObjectKind::Form, "user", &stored(), &overrides).unwrap();
        let registry = config.build_registry().unwrap();

        let email = registry.get("email").unwrap();
        assert_eq!(email.get_property("writeable"), Some(json!(false)));
        assert_eq!(email.get_property("fieldReadOnly"), Some(json!(true)));
        assert!(email.skipped_on_save());
    }

    #[test]
    fn test_grouping_switches_object_grouping() {
        let overrides = json!({"fieldConfigs": {"grouping": {"name": "Person"}}});
        let mut config = resolve(ObjectKind::Form, "user", &stored(), &overrides).unwrap();
        assert_eq!(config.properties.get("grouping"), Some(&json!(false)));

        let registry = config.build_registry().unwrap();
        assert_eq!(config.properties.get("grouping"), Some(&json!(true)));
        assert_eq!(
            registry.field_property("name", "grouping").unwrap(),
            json!("Person")
        );
    }

    #[test]
    fn test_round_trip_of_configured_values() {
        let mut config = resolve(ObjectKind::List, "users", &stored(), &Value::Null).unwrap();
        let registry = config.build_registry().unwrap();

        assert_eq!(
            registry.field_property("group", "fieldSource").unwrap(),
            json!([["users", "group", "title"]])
        );
        assert_eq!(
            registry.field_property("role", "fieldType").unwrap(),
            json!("select")
        );
        assert_eq!(config.properties.get_property("primaryKey"), Some(json!("user_id")));
        assert_eq!(config.object.get_property("objectName"), Some(json!("Users")));
    }

    #[test]
    fn test_bad_value_shape_fails() {
        let overrides = json!({"fieldConfigs": {"fieldSortable": {"name": "sometimes"}}});
        let mut config = resolve(ObjectKind::List, "users", &stored(), &overrides).unwrap();
        assert!(config.build_registry().unwrap_err().is_configuration());
    }
}
