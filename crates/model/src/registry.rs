//! Ordered field registry of an object
//!
//! Insertion order is display order. List registries start with the two
//! system columns; they are injected by [`FieldRegistry::for_kind`] and
//! cannot be removed through [`FieldRegistry::destroy`].

use dataobjects_core::{EngineError, EngineResult, ObjectKind, PropertyAccess};
use indexmap::IndexMap;
use serde_json::Value;

use crate::field::FieldDescriptor;

/// Ordered mapping `fieldID -> FieldDescriptor`
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRegistry {
    object_id: String,
    kind: ObjectKind,
    fields: IndexMap<String, FieldDescriptor>,
}

impl FieldRegistry {
    /// Create an empty registry for `object_id`, with the system columns
    /// when `kind` is a list
    pub fn for_kind(object_id: impl Into<String>, kind: ObjectKind) -> Self {
        let mut registry = Self {
            object_id: object_id.into(),
            kind,
            fields: IndexMap::new(),
        };
        if kind == ObjectKind::List {
            for field in [
                FieldDescriptor::checkbox_column(),
                FieldDescriptor::tools_column(),
            ] {
                registry.fields.insert(field.id.clone(), field);
            }
        }
        registry
    }

    /// Owning object's ID
    pub fn object_id(&self) -> &str {
        &self.object_id
    }

    /// Kind of field this registry holds
    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    /// Field IDs in insertion order
    pub fn index(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }

    /// Inverse of [`index`](Self::index): `fieldID -> position`
    pub fn index_swapped(&self) -> IndexMap<String, usize> {
        swap_index(&self.index())
    }

    /// Get a field, failing with `FieldNotFound` for unknown IDs
    pub fn get(&self, field_id: &str) -> EngineResult<&FieldDescriptor> {
        self.fields
            .get(field_id)
            .ok_or_else(|| EngineError::field_not_found(&self.object_id, field_id))
    }

    /// Mutable variant of [`get`](Self::get)
    pub fn get_mut(&mut self, field_id: &str) -> EngineResult<&mut FieldDescriptor> {
        let object_id = &self.object_id;
        self.fields
            .get_mut(field_id)
            .ok_or_else(|| EngineError::field_not_found(object_id, field_id))
    }

    /// Get a field or create one of this registry's kind at the end
    pub fn get_or_insert(&mut self, field_id: &str) -> &mut FieldDescriptor {
        let kind = self.kind;
        self.fields
            .entry(field_id.to_string())
            .or_insert_with(|| FieldDescriptor::new(field_id, kind))
    }

    /// Insert or replace a field under `field_id`; the stored field takes
    /// that ID
    pub fn set(&mut self, field_id: impl Into<String>, mut field: FieldDescriptor) {
        let field_id = field_id.into();
        field.id = field_id.clone();
        self.fields.insert(field_id, field);
    }

    /// Whether a field is registered
    pub fn contains(&self, field_id: &str) -> bool {
        self.fields.contains_key(field_id)
    }

    /// Remove a user field, keeping the order of the others.
    ///
    /// System columns stay; removing one fails.
    pub fn destroy(&mut self, field_id: &str) -> EngineResult<FieldDescriptor> {
        if self.get(field_id)?.system_field {
            return Err(EngineError::configuration(format!(
                "System field '{field_id}' cannot be removed"
            )));
        }
        self.fields
            .shift_remove(field_id)
            .ok_or_else(|| EngineError::field_not_found(&self.object_id, field_id))
    }

    /// One property of every field, `fieldID -> value` (null where the
    /// variant lacks the property)
    pub fn properties(&self, key: &str) -> IndexMap<String, Value> {
        self.fields
            .iter()
            .map(|(id, field)| (id.clone(), field.get_property(key).unwrap_or(Value::Null)))
            .collect()
    }

    /// Read one property of one field
    pub fn field_property(&self, field_id: &str, key: &str) -> EngineResult<Value> {
        let field = self.get(field_id)?;
        field.get_path(key).ok_or_else(|| {
            EngineError::invalid_property(field.container_name(), key, "unknown key")
        })
    }

    /// Assign one property of one field
    pub fn set_field_property(
        &mut self,
        field_id: &str,
        key: &str,
        value: Value,
    ) -> EngineResult<()> {
        self.get_mut(field_id)?.set_property(key, value)
    }

    /// Iterate fields in order
    pub fn iter(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.values()
    }

    /// Iterate fields mutably in order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut FieldDescriptor> {
        self.fields.values_mut()
    }

    /// Iterate user fields (no system columns)
    pub fn user_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.values().filter(|f| !f.system_field)
    }

    /// Number of fields including system columns
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the registry holds no fields at all
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Every field as its property map, in order
    pub fn to_maps(&self) -> IndexMap<String, serde_json::Map<String, Value>> {
        self.fields
            .iter()
            .map(|(id, field)| (id.clone(), field.to_map()))
            .collect()
    }
}

/// Swap a position-indexed list into `value -> position`
pub fn swap_index(index: &[String]) -> IndexMap<String, usize> {
    index
        .iter()
        .enumerate()
        .map(|(position, id)| (id.clone(), position))
        .collect()
}

/// Swap a `value -> position` map back into the position-indexed list
pub fn unswap_index(swapped: &IndexMap<String, usize>) -> Vec<String> {
    let mut entries: Vec<(&String, &usize)> = swapped.iter().collect();
    entries.sort_by_key(|(_, position)| **position);
    entries.into_iter().map(|(id, _)| id.clone()).collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{CHECKBOX_FIELD, TOOLS_FIELD};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn registry() -> FieldRegistry {
        let mut registry = FieldRegistry::for_kind("users", ObjectKind::List);
        for id in ["name", "email", "created_at"] {
            registry.get_or_insert(id);
        }
        registry
    }

    #[test]
    fn test_list_registry_starts_with_system_fields() {
        let registry = registry();
        assert_eq!(
            registry.index(),
            vec![CHECKBOX_FIELD, TOOLS_FIELD, "name", "email", "created_at"]
        );
        assert_eq!(registry.user_fields().count(), 3);
    }

    #[test]
    fn test_form_registry_has_no_system_fields() {
        let registry = FieldRegistry::for_kind("user", ObjectKind::Form);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_index_swap_is_inverse() {
        let registry = registry();
        let index = registry.index();
        let swapped = registry.index_swapped();

        for (position, id) in index.iter().enumerate() {
            assert_eq!(swapped[id], position);
        }
        assert_eq!(unswap_index(&swapped), index);
        assert_eq!(swap_index(&unswap_index(&swapped)), swapped);
    }

    #[test]
    fn test_get_unknown_field_fails() {
        let registry = registry();
        let err = registry.get("emial").unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(
            err.to_string(),
            "Field 'emial' not found in object 'users'"
        );
    }

    #[test]
    fn test_set_replaces_in_place() {
        let mut registry = registry();
        registry.set("email", FieldDescriptor::list("ignored").with_name("E-Mail"));
        assert_eq!(registry.get("email").unwrap().name, "E-Mail");
        assert_eq!(registry.get("email").unwrap().id, "email");
        assert_eq!(registry.index_swapped()["email"], 3);
    }

    #[test]
    fn test_destroy_keeps_order_and_system_fields() {
        let mut registry = registry();
        registry.destroy("email").unwrap();
        assert_eq!(
            registry.index(),
            vec![CHECKBOX_FIELD, TOOLS_FIELD, "name", "created_at"]
        );
        assert!(registry.destroy(CHECKBOX_FIELD).is_err());
        assert!(registry.destroy("email").unwrap_err().is_not_found());
    }

    #[test]
    fn test_properties_and_field_property() {
        let mut registry = registry();
        registry
            .set_field_property("name", "fieldSortable", json!(true))
            .unwrap();

        let sortable = registry.properties("fieldSortable");
        assert_eq!(sortable["name"], json!(true));
        assert_eq!(sortable["email"], json!(false));

        assert_eq!(
            registry.field_property("checkbox", "fieldRenderOptions.renderOutput.text").unwrap(),
            json!("name")
        );
        assert!(registry.field_property("name", "nope").is_err());
    }
}
