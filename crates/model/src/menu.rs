//! Object menus
//!
//! A [`MenuStack`] holds the named menu items of one object. Items are
//! filtered at read time against the caller's permissions.

use dataobjects_core::{EngineError, EngineResult};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

// ============================================================================
// Permissions
// ============================================================================

/// Permission checks of the authenticated user
pub trait UserPermissions {
    /// Whether the user holds a single permission
    fn can(&self, permission: &str) -> bool;

    /// Whether the user satisfies a whole permission set
    fn has_permission(&self, permissions: &[String]) -> bool {
        permissions.iter().all(|p| self.can(p))
    }
}

/// A user with a fixed set of granted permissions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticUser {
    pub granted: BTreeSet<String>,
}

impl StaticUser {
    pub fn new<I, S>(granted: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            granted: granted.into_iter().map(Into::into).collect(),
        }
    }
}

impl UserPermissions for StaticUser {
    fn can(&self, permission: &str) -> bool {
        self.granted.contains(permission)
    }
}

/// Declared permission requirement of a menu item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Permissions {
    /// The user must hold the whole set
    List(Vec<String>),
    /// Each `can(permission)` must equal the expected flag
    Checks(IndexMap<String, bool>),
}

impl Default for Permissions {
    fn default() -> Self {
        Permissions::List(Vec::new())
    }
}

impl Permissions {
    pub fn is_empty(&self) -> bool {
        match self {
            Permissions::List(list) => list.is_empty(),
            Permissions::Checks(checks) => checks.is_empty(),
        }
    }

    /// Whether `user` passes. Without a user every `can` is false.
    pub fn allows(&self, user: Option<&dyn UserPermissions>) -> bool {
        if self.is_empty() {
            return true;
        }
        match self {
            Permissions::List(list) => user.is_some_and(|u| u.has_permission(list)),
            Permissions::Checks(checks) => checks.iter().all(|(permission, expected)| {
                user.is_some_and(|u| u.can(permission)) == *expected
            }),
        }
    }
}

// ============================================================================
// MenuItem
// ============================================================================

/// One menu entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuItem {
    #[serde(default = "generated_name")]
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default = "default_icon_type")]
    pub icon_type: String,
    #[serde(default = "default_link")]
    pub link: String,
    #[serde(default = "default_type", rename = "type")]
    pub item_type: String,
    #[serde(default = "default_target")]
    pub target: String,
    #[serde(default = "default_identifier")]
    pub identifier: String,
    #[serde(default)]
    pub class: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default, rename = "permission")]
    pub permissions: Permissions,
    #[serde(default)]
    pub conditions: Vec<Value>,
    #[serde(default)]
    pub parent: String,
    #[serde(default)]
    pub order: String,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub in_list: bool,
    #[serde(default)]
    pub in_form: bool,
    #[serde(default)]
    pub in_row: bool,
    #[serde(default)]
    pub sort_order: i64,
}

fn generated_name() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn default_icon_type() -> String {
    "bi".to_string()
}

fn default_link() -> String {
    "#".to_string()
}

fn default_type() -> String {
    "link".to_string()
}

fn default_target() -> String {
    "_blank".to_string()
}

fn default_identifier() -> String {
    "id".to_string()
}

impl Default for MenuItem {
    fn default() -> Self {
        Self {
            name: generated_name(),
            label: String::new(),
            icon: String::new(),
            icon_type: default_icon_type(),
            link: default_link(),
            item_type: default_type(),
            target: default_target(),
            identifier: default_identifier(),
            class: String::new(),
            roles: Vec::new(),
            permissions: Permissions::default(),
            conditions: Vec::new(),
            parent: String::new(),
            order: String::new(),
            hidden: false,
            active: false,
            in_list: false,
            in_form: false,
            in_row: false,
            sort_order: 0,
        }
    }
}

impl MenuItem {
    /// Parse an item configuration
    pub fn from_config(config: &Value) -> EngineResult<Self> {
        let config = match config {
            Value::Null => Value::Object(serde_json::Map::new()),
            other => other.clone(),
        };
        serde_json::from_value(config)
            .map_err(|e| EngineError::invalid_property("menu", "item", e.to_string()))
    }
}

// ============================================================================
// MenuStack
// ============================================================================

/// A menu item under its stack name
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MenuEntry {
    pub name: String,
    #[serde(rename = "basket")]
    pub item: MenuItem,
}

/// Ordered menu entries of an object
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct MenuStack {
    entries: Vec<MenuEntry>,
}

impl MenuStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a `menu` configuration: `{name: item}` or a list of items
    /// (each named by its own `name`)
    pub fn from_config(config: &Value) -> EngineResult<Self> {
        let mut stack = Self::new();
        match config {
            Value::Object(map) => {
                for (name, item) in map {
                    stack.add(name.clone(), MenuItem::from_config(item)?);
                }
            }
            Value::Array(items) => {
                for item in items {
                    let item = MenuItem::from_config(item)?;
                    stack.add(item.name.clone(), item);
                }
            }
            _ => {}
        }
        Ok(stack)
    }

    /// Append an entry
    pub fn add(&mut self, name: impl Into<String>, item: MenuItem) -> &mut Self {
        self.entries.push(MenuEntry {
            name: name.into(),
            item,
        });
        self
    }

    /// First item stored under `name`
    pub fn get(&self, name: &str) -> Option<&MenuItem> {
        self.entries
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| &entry.item)
    }

    /// Remove every entry named `name`
    pub fn remove(&mut self, name: &str) -> &mut Self {
        self.entries.retain(|entry| entry.name != name);
        self
    }

    /// All entries, unfiltered
    pub fn entries(&self) -> &[MenuEntry] {
        &self.entries
    }

    /// Entries whose permission requirement `user` passes
    pub fn visible(&self, user: Option<&dyn UserPermissions>) -> Vec<&MenuEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.item.permissions.allows(user))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn stack() -> MenuStack {
        MenuStack::from_config(&json!({
            "edit": {"label": "Edit", "link": "/users/{id}", "inRow": true},
            "delete": {"label": "Delete", "permission": ["users.delete"]},
            "audit": {"label": "Audit", "permission": {"users.audit": true, "guest": false}}
        }))
        .unwrap()
    }

    #[test]
    fn test_item_defaults() {
        let item = MenuItem::from_config(&json!({"label": "Edit"})).unwrap();
        assert_eq!(item.icon_type, "bi");
        assert_eq!(item.item_type, "link");
        assert_eq!(item.target, "_blank");
        assert_eq!(item.identifier, "id");
        assert!(uuid::Uuid::parse_str(&item.name).is_ok());
    }

    #[test]
    fn test_visible_without_user() {
        let stack = stack();
        let names: Vec<&str> = stack.visible(None).iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["edit"]);
    }

    #[test]
    fn test_visible_with_permissions() {
        let stack = stack();
        let admin = StaticUser::new(["users.delete", "users.audit"]);
        assert_eq!(stack.visible(Some(&admin)).len(), 3);

        let guest = StaticUser::new(["users.audit", "guest"]);
        let names: Vec<&str> = stack
            .visible(Some(&guest))
            .iter()
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(names, vec!["edit"]);
    }

    #[test]
    fn test_get_and_remove() {
        let mut stack = stack();
        assert!(stack.get("edit").unwrap().in_row);
        stack.remove("edit");
        assert!(stack.get("edit").is_none());
        assert_eq!(stack.len(), 2);
    }
}
