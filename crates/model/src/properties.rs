//! Object-level property containers
//!
//! [`ObjectProperties`] identifies an object. The list, form and data-table
//! settings live in [`PropertyBag`]s: fixed key sets seeded from built-in
//! templates, overridable key by key from configuration.

use dataobjects_core::{
    EngineError, EngineResult, ObjectKind, PropertyAccess, SortDirection, property_value,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

// ============================================================================
// ObjectProperties
// ============================================================================

/// Identity of a list or form object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectProperties {
    /// Unique within a context, immutable after creation
    #[serde(rename = "objectID")]
    pub object_id: String,
    pub object_name: Option<String>,
    pub object_type: ObjectKind,
    #[serde(rename = "configRequestURI")]
    pub config_request_uri: Option<String>,
}

impl ObjectProperties {
    pub fn new(object_id: impl Into<String>, object_type: ObjectKind) -> Self {
        Self {
            object_id: object_id.into(),
            object_name: None,
            object_type,
            config_request_uri: None,
        }
    }
}

impl PropertyAccess for ObjectProperties {
    fn container_name(&self) -> String {
        "objectProperties".to_string()
    }

    fn property_keys(&self) -> Vec<&'static str> {
        vec!["objectID", "objectName", "objectType", "configRequestURI"]
    }

    fn get_property(&self, key: &str) -> Option<Value> {
        match key {
            "objectID" => Some(json!(self.object_id)),
            "objectName" => Some(json!(self.object_name)),
            "objectType" => Some(json!(self.object_type)),
            "configRequestURI" => Some(json!(self.config_request_uri)),
            _ => None,
        }
    }

    fn set_property(&mut self, key: &str, value: Value) -> EngineResult<()> {
        match key {
            "objectName" => self.object_name = property_value("objectProperties", key, value)?,
            "configRequestURI" => {
                self.config_request_uri = property_value("objectProperties", key, value)?
            }
            "objectID" | "objectType" => {
                let current = self.get_property(key).unwrap_or(Value::Null);
                if current != value {
                    return Err(EngineError::invalid_property(
                        "objectProperties",
                        key,
                        "is fixed when the object is built",
                    ));
                }
            }
            _ => {
                return Err(EngineError::invalid_property(
                    "objectProperties",
                    key,
                    "unknown key",
                ));
            }
        }
        Ok(())
    }
}

// ============================================================================
// PropertyBag
// ============================================================================

/// Which template a bag was created from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BagKind {
    List,
    Form,
    DataTable,
}

impl BagKind {
    /// Configuration category of this bag
    pub fn category(&self) -> &'static str {
        match self {
            BagKind::List => "listProperties",
            BagKind::Form => "formProperties",
            BagKind::DataTable => "dataTableProperties",
        }
    }

    /// Built-in template
    pub fn defaults(&self) -> Value {
        match self {
            BagKind::List => json!({
                "primaryKey": "id",
                "identifier": "id",
                "selectKey": "id",
                "dataRequestURI": null,
                "orderCellsTop": true,
                "fixedHeader": true,
                "searching": false,
                "fieldSearch": false,
                "fieldSearchBar": false,
                "processing": true,
                "deferRender": true,
                "sorting": [["id", "asc"]],
                "grouping": false,
                "writable": false,
                "filter": null,
                "filterKey": null,
            }),
            BagKind::DataTable => json!({
                "columnSum": false,
                "rowSum": false,
                "grouping": false,
                "listLength": 50,
                "listStart": 0,
                "lengthMenu": [
                    [5, 10, 25, 50, 100, 250, 500, -1],
                    [5, 10, 25, 50, 100, 250, 500, "Alle"]
                ],
                "scrollCollapse": false,
                "selectable": false,
                "serverSide": true,
                "showTableInformation": true,
                "sortable": false,
                "searchable": false,
                "filterable": false,
                "csvExportLoaded": false,
                "csvExportAll": false,
            }),
            BagKind::Form => json!({
                "dataRequestURI": null,
                "primaryKey": "id",
                "identifier": "id",
                "writable": false,
                "viewMode": "view",
                "dialogHandler": "inCard",
                "postUrl": null,
                "postAction": null,
                "grouping": false,
            }),
        }
    }
}

/// A key-value property container with a fixed set of keys
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyBag {
    #[serde(skip)]
    kind: BagKind,
    #[serde(flatten)]
    values: IndexMap<String, Value>,
}

impl PropertyBag {
    /// Create a bag holding the template defaults
    pub fn new(kind: BagKind) -> Self {
        let values = match kind.defaults() {
            Value::Object(map) => map.into_iter().collect(),
            _ => IndexMap::new(),
        };
        Self { kind, values }
    }

    /// List properties with defaults
    pub fn list() -> Self {
        Self::new(BagKind::List)
    }

    /// Form properties with defaults
    pub fn form() -> Self {
        Self::new(BagKind::Form)
    }

    /// Data-table properties with defaults
    pub fn data_table() -> Self {
        Self::new(BagKind::DataTable)
    }

    /// Template this bag was created from
    pub fn kind(&self) -> BagKind {
        self.kind
    }

    /// Borrow a value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Read a string value, `None` for null or non-strings
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    /// Read a flag
    pub fn get_bool(&self, key: &str) -> bool {
        self.values
            .get(key)
            .is_some_and(dataobjects_core::path::truthy)
    }

    // ------------------------------------------------------------------
    // Typed accessors
    // ------------------------------------------------------------------

    /// `primaryKey`, defaulting to `id`
    pub fn primary_key(&self) -> &str {
        self.get_str("primaryKey").unwrap_or("id")
    }

    /// Mandatory filter as `(key, value)` when both are set
    pub fn filter(&self) -> Option<(&str, &Value)> {
        let key = self.get_str("filterKey").filter(|k| !k.is_empty())?;
        let value = self.values.get("filter").filter(|v| !v.is_null())?;
        Some((key, value))
    }

    /// Set the mandatory filter
    pub fn set_filter(&mut self, value: Value, key: Option<&str>) {
        self.values.insert("filter".to_string(), value);
        if let Some(key) = key {
            self.values
                .insert("filterKey".to_string(), Value::String(key.to_string()));
        }
    }

    /// Raw `listLength`; `None` when it is unset or null
    pub fn configured_list_length(&self) -> Option<i64> {
        self.values.get("listLength").and_then(Value::as_i64)
    }

    /// Default page length (`listLength`); `None` means no limit
    pub fn list_length(&self) -> Option<usize> {
        match self.configured_list_length() {
            Some(n) if n < 0 => None,
            Some(n) => Some(n as usize),
            None => Some(50),
        }
    }

    /// Columns to sum (`columnSum`): `false` or a list of column names
    pub fn sum_columns(&self) -> Vec<String> {
        match self.values.get("columnSum") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
            Some(Value::String(column)) => vec![column.clone()],
            _ => Vec::new(),
        }
    }

    /// Configured default sorting (`sorting`): `[[column, dir], ...]`
    pub fn sorting(&self) -> Vec<(String, SortDirection)> {
        let Some(Value::Array(entries)) = self.values.get("sorting") else {
            return Vec::new();
        };
        entries
            .iter()
            .filter_map(|entry| {
                let pair = entry.as_array()?;
                let column = pair.first()?.as_str()?.to_string();
                let direction = pair
                    .get(1)
                    .and_then(Value::as_str)
                    .map(SortDirection::parse_lenient)
                    .unwrap_or_default();
                Some((column, direction))
            })
            .collect()
    }

    /// Whether the form asks its host to reload after posting
    pub fn reload(&self) -> bool {
        self.get_str("postAction") == Some("reload")
    }

    /// Toggle `postAction = reload`
    pub fn set_reload(&mut self, reload: bool) {
        let action = if reload {
            Value::String("reload".to_string())
        } else {
            Value::Null
        };
        self.values.insert("postAction".to_string(), action);
    }
}

impl PropertyAccess for PropertyBag {
    fn container_name(&self) -> String {
        self.kind.category().to_string()
    }

    fn property_keys(&self) -> Vec<&'static str> {
        template_keys(self.kind).to_vec()
    }

    fn has_property(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    fn get_property(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }

    fn set_property(&mut self, key: &str, value: Value) -> EngineResult<()> {
        match self.values.get_mut(key) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(EngineError::invalid_property(
                self.kind.category(),
                key,
                "unknown key",
            )),
        }
    }

    fn to_map(&self) -> serde_json::Map<String, Value> {
        self.values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Template keys in output order.
fn template_keys(kind: BagKind) -> &'static [&'static str] {
    const LIST: &[&str] = &[
        "primaryKey",
        "identifier",
        "selectKey",
        "dataRequestURI",
        "orderCellsTop",
        "fixedHeader",
        "searching",
        "fieldSearch",
        "fieldSearchBar",
        "processing",
        "deferRender",
        "sorting",
        "grouping",
        "writable",
        "filter",
        "filterKey",
    ];
    const DATA_TABLE: &[&str] = &[
        "columnSum",
        "rowSum",
        "grouping",
        "listLength",
        "listStart",
        "lengthMenu",
        "scrollCollapse",
        "selectable",
        "serverSide",
        "showTableInformation",
        "sortable",
        "searchable",
        "filterable",
        "csvExportLoaded",
        "csvExportAll",
    ];
    const FORM: &[&str] = &[
        "dataRequestURI",
        "primaryKey",
        "identifier",
        "writable",
        "viewMode",
        "dialogHandler",
        "postUrl",
        "postAction",
        "grouping",
    ];
    match kind {
        BagKind::List => LIST,
        BagKind::DataTable => DATA_TABLE,
        BagKind::Form => FORM,
    }
}

// ============================================================================
// Tests
// ============================================================================
