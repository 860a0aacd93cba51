//! Field descriptors for list and form objects
//!
//! A [`FieldDescriptor`] carries everything the engine needs to know about
//! one column or input: typing, the source mapping that says where its
//! value lives, static or computed options, and the variant-specific
//! behaviour flags. List and form fields share the common part and differ
//! in their [`FieldVariant`].

use dataobjects_core::{
    ContentType, EngineError, EngineResult, FieldType, ObjectKind, PropertyAccess, Validatable,
    property_value,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::validation::RuleSet;

/// Identifier of the injected selection column on list objects
pub const CHECKBOX_FIELD: &str = "checkbox";

/// Identifier of the injected row-tools column on list objects
pub const TOOLS_FIELD: &str = "tools";

// ============================================================================
// Source Mapping
// ============================================================================

/// One entry of a field's source mapping (`fieldSource`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum SourceRef {
    /// A literal `" "` or `"<br>"` inserted between concatenated values
    Separator(String),
    /// A same-named column of the raw row
    Column(String),
    /// `[alias, column]`: a column of the named data source
    Aliased { alias: String, column: String },
    /// `[alias, relation, column]`: a column inside a related record
    Relation {
        alias: String,
        relation: String,
        column: String,
    },
}

impl SourceRef {
    /// Parse one source entry: a string (split on `:`) or an array of one
    /// to three strings.
    pub fn parse(value: &Value) -> EngineResult<Self> {
        let parts: Vec<String> = match value {
            Value::String(s) if is_separator(s) => return Ok(SourceRef::Separator(s.clone())),
            Value::String(s) => s.split(':').map(str::to_string).collect(),
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    other => Err(EngineError::configuration(format!(
                        "field source parts must be strings, got {other}"
                    ))),
                })
                .collect::<EngineResult<_>>()?,
            other => {
                return Err(EngineError::configuration(format!(
                    "unsupported field source {other}"
                )));
            }
        };
        Self::from_parts(parts)
    }

    fn from_parts(mut parts: Vec<String>) -> EngineResult<Self> {
        match parts.len() {
            1 => {
                let part = parts.remove(0);
                if is_separator(&part) {
                    Ok(SourceRef::Separator(part))
                } else {
                    Ok(SourceRef::Column(part))
                }
            }
            2 => {
                let column = parts.remove(1);
                let alias = parts.remove(0);
                Ok(SourceRef::Aliased { alias, column })
            }
            3 => {
                let column = parts.remove(2);
                let relation = parts.remove(1);
                let alias = parts.remove(0);
                Ok(SourceRef::Relation {
                    alias,
                    relation,
                    column,
                })
            }
            n => Err(EngineError::configuration(format!(
                "field source must have 1 to 3 parts, got {n}"
            ))),
        }
    }

    /// Parse a whole `fieldSource` value: a single string source, or a list
    /// whose entries are each a source.
    pub fn parse_list(value: &Value) -> EngineResult<Option<Vec<SourceRef>>> {
        match value {
            Value::Null => Ok(None),
            Value::String(s) if s.is_empty() => Ok(None),
            Value::String(_) => Ok(Some(vec![Self::parse(value)?])),
            Value::Array(items) if items.is_empty() => Ok(None),
            Value::Array(items) => items
                .iter()
                .map(Self::parse)
                .collect::<EngineResult<Vec<_>>>()
                .map(Some),
            other => Err(EngineError::configuration(format!(
                "unsupported field source {other}"
            ))),
        }
    }

    /// Data source alias, if the entry names one (`" "` aliases mean none)
    pub fn alias(&self) -> Option<&str> {
        match self {
            SourceRef::Aliased { alias, .. } | SourceRef::Relation { alias, .. } => {
                let alias = alias.trim();
                (!alias.is_empty()).then_some(alias)
            }
            _ => None,
        }
    }

    /// Column this entry reads, ignoring relations
    pub fn direct_column(&self) -> Option<&str> {
        match self {
            SourceRef::Column(column) | SourceRef::Aliased { column, .. } => Some(column),
            _ => None,
        }
    }

    /// Whether this entry is a separator token
    pub fn is_separator(&self) -> bool {
        matches!(self, SourceRef::Separator(_))
    }
}

fn is_separator(s: &str) -> bool {
    s == " " || s == "<br>"
}

impl TryFrom<Value> for SourceRef {
    type Error = EngineError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        SourceRef::parse(&value)
    }
}

impl From<SourceRef> for Value {
    fn from(source: SourceRef) -> Self {
        match source {
            SourceRef::Separator(s) => Value::String(s),
            SourceRef::Column(c) => json!([c]),
            SourceRef::Aliased { alias, column } => json!([alias, column]),
            SourceRef::Relation {
                alias,
                relation,
                column,
            } => json!([alias, relation, column]),
        }
    }
}

// ============================================================================
// Options
// ============================================================================

/// One selectable option of a select, radio or checkbox field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldOption {
    pub value: Value,
    pub text: String,
    pub identifier: Value,
}

impl FieldOption {
    /// Create an option whose value and identifier are the same
    pub fn new(value: impl Into<Value>, text: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            identifier: value.clone(),
            value,
            text: text.into(),
        }
    }
}

/// Options keyed by the string form of their value, in configuration order
pub type FieldOptions = IndexMap<String, FieldOption>;

/// The boolean option set seeded by `select`/`multiselect`
pub fn boolean_options() -> FieldOptions {
    let mut options = FieldOptions::new();
    options.insert("0".to_string(), FieldOption::new(0, "Nein"));
    options.insert("1".to_string(), FieldOption::new(1, "Ja"));
    options
}

/// Normalize a configured option map into `{value, text, identifier}`
/// triples.
///
/// Accepts an object (`key -> text` or `key -> {value, text, identifier}`)
/// or an array (the index is the key). Numeric keys become numeric values.
pub fn normalize_options(value: &Value) -> EngineResult<FieldOptions> {
    let entries: Vec<(String, &Value)> = match value {
        Value::Null => return Ok(FieldOptions::new()),
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        other => {
            return Err(EngineError::configuration(format!(
                "field options must be a map or list, got {other}"
            )));
        }
    };

    let mut options = FieldOptions::new();
    for (key, entry) in entries {
        let option = match entry {
            Value::Object(map) => {
                let value = map.get("value").cloned().unwrap_or_else(|| key_value(&key));
                FieldOption {
                    identifier: map.get("identifier").cloned().unwrap_or_else(|| value.clone()),
                    text: map
                        .get("text")
                        .map(dataobjects_core::path::display)
                        .unwrap_or_default(),
                    value,
                }
            }
            scalar => FieldOption::new(key_value(&key), dataobjects_core::path::display(scalar)),
        };
        options.insert(key, option);
    }
    Ok(options)
}

fn key_value(key: &str) -> Value {
    key.parse::<i64>()
        .map(Value::from)
        .unwrap_or_else(|_| Value::String(key.to_string()))
}

// ============================================================================
// Render Options
// ============================================================================

/// Reference to a registered render function: `"Module::method"` or
/// `["Module", "method"]`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct RenderFunctionRef {
    pub module: String,
    pub function: String,
}

impl RenderFunctionRef {
    pub fn new(module: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            function: function.into(),
        }
    }

    /// Registry key, `Module::method`
    pub fn key(&self) -> String {
        format!("{}::{}", self.module, self.function)
    }
}

impl TryFrom<Value> for RenderFunctionRef {
    type Error = EngineError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match &value {
            Value::String(s) => match s.split_once("::") {
                Some((module, function)) => Ok(Self::new(module, function)),
                None => Err(EngineError::configuration(format!(
                    "render function '{s}' must be 'Module::method'"
                ))),
            },
            Value::Array(items) => match items.as_slice() {
                [Value::String(module), Value::String(function)] => {
                    Ok(Self::new(module.as_str(), function.as_str()))
                }
                _ => Err(EngineError::configuration(format!(
                    "render function {value} must be [module, method]"
                ))),
            },
            other => Err(EngineError::configuration(format!(
                "unsupported render function reference {other}"
            ))),
        }
    }
}

impl From<RenderFunctionRef> for Value {
    fn from(r: RenderFunctionRef) -> Self {
        json!([r.module, r.function])
    }
}

/// Display column(s) of a computed option
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutputSpec {
    Column(String),
    /// Concatenated as-is; empty entries insert a space
    Columns(Vec<String>),
}

/// Shape of the rows produced by a render function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderOutput {
    #[serde(default = "default_key")]
    pub value: String,
    #[serde(default = "default_key")]
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputSpec>,
}

fn default_key() -> String {
    "id".to_string()
}

impl Default for RenderOutput {
    fn default() -> Self {
        Self {
            value: default_key(),
            identifier: default_key(),
            text: None,
            output: None,
        }
    }
}

/// Computed-option configuration (`fieldRenderOptions`)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderOptions {
    #[serde(default)]
    pub render_function: Option<RenderFunctionRef>,
    #[serde(default)]
    pub render_output: RenderOutput,
}

impl RenderOptions {
    /// The shape forced onto checkbox fields
    pub fn checkbox() -> Self {
        Self {
            render_function: None,
            render_output: RenderOutput {
                text: Some("name".to_string()),
                ..RenderOutput::default()
            },
        }
    }
}

// ============================================================================
// Variant Properties
// ============================================================================

/// Properties only list fields carry
#[derive(Debug, Clone, PartialEq)]
pub struct ListFieldProps {
    pub hidden_in_list: bool,
    pub sortable: bool,
    pub sort_order: dataobjects_core::SortDirection,
    pub sort_assign: Option<String>,
    pub searchable: bool,
    pub search_assign: Option<String>,
    pub filterable: bool,
    pub filter: Option<Value>,
    pub editable: bool,
    pub column_width: String,
    pub link: Option<Value>,
    pub grouping: Option<Value>,
    pub column_sum: bool,
    pub row_sum: bool,
}

impl Default for ListFieldProps {
    fn default() -> Self {
        Self {
            hidden_in_list: false,
            sortable: false,
            sort_order: dataobjects_core::SortDirection::Asc,
            sort_assign: None,
            searchable: false,
            search_assign: None,
            filterable: false,
            filter: None,
            editable: false,
            column_width: "auto".to_string(),
            link: None,
            grouping: None,
            column_sum: false,
            row_sum: false,
        }
    }
}

/// Properties only form fields carry
#[derive(Debug, Clone, PartialEq)]
pub struct FormFieldProps {
    pub hidden_in_form: bool,
    pub hidden_in_view: bool,
    pub description: String,
    pub tooltip: Option<String>,
    pub required: bool,
    pub read_only: bool,
    pub placeholder: Option<String>,
    pub writeable: bool,
    pub ignore_field: bool,
    pub default_value: Option<Value>,
    pub pattern: Option<String>,
    pub autocomplete: String,
    pub min_width: Option<Value>,
    pub max_width: Option<Value>,
    pub grouping: Option<Value>,
    pub rules: RuleSet,
}

impl Default for FormFieldProps {
    fn default() -> Self {
        Self {
            hidden_in_form: false,
            hidden_in_view: false,
            description: String::new(),
            tooltip: None,
            required: false,
            read_only: false,
            placeholder: None,
            writeable: true,
            ignore_field: false,
            default_value: None,
            pattern: None,
            autocomplete: "off".to_string(),
            min_width: None,
            max_width: None,
            grouping: None,
            rules: RuleSet::default(),
        }
    }
}

/// Variant part of a field descriptor
#[derive(Debug, Clone, PartialEq)]
pub enum FieldVariant {
    List(ListFieldProps),
    Form(FormFieldProps),
}

// ============================================================================
// FieldDescriptor
// ============================================================================

const COMMON_KEYS: &[&str] = &[
    "fieldID",
    "fieldName",
    "fieldType",
    "fieldContentType",
    "fieldSubType",
    "fieldAssocObjectID",
    "systemField",
    "fieldSource",
    "fieldFunctions",
    "fieldOptions",
    "fieldRenderOptions",
];

const LIST_KEYS: &[&str] = &[
    "fieldHiddenInList",
    "fieldSortable",
    "fieldSortOrder",
    "fieldSortAssign",
    "fieldSearchable",
    "fieldSearchAssign",
    "fieldFilterable",
    "fieldFilter",
    "fieldEditable",
    "fieldColumnWidth",
    "fieldLink",
    "grouping",
    "columnSum",
    "rowSum",
];

const FORM_KEYS: &[&str] = &[
    "fieldHiddenInForm",
    "fieldHiddenInView",
    "fieldDescription",
    "fieldTooltip",
    "fieldRequired",
    "fieldReadOnly",
    "placeholder",
    "writeable",
    "ignoreField",
    "defaultValue",
    "fieldPattern",
    "autocomplete",
    "fieldMinWidth",
    "fieldMaxWidth",
    "grouping",
    "allowNull",
    "minLength",
    "maxLength",
    "minValue",
    "maxValue",
    "requireUpperCase",
    "requireLowerCase",
    "requireNumber",
    "requireSpecialCharacters",
    "definedSpecialCharacters",
    "minScore",
];

/// One field of a list or form object
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    /// Unique identifier within the object's registry
    pub id: String,

    /// Display label
    pub name: String,

    /// Built-in column (checkbox/tools)
    pub system_field: bool,

    /// Object the field links to, if any
    pub assoc_object_id: Option<String>,

    pub field_type: FieldType,
    pub content_type: ContentType,
    pub sub_type: Option<String>,

    /// Where the value lives; `None` means the same-named column
    pub source: Option<Vec<SourceRef>>,

    pub functions: Option<Value>,

    /// Static options; `None` until configured or seeded
    pub options: Option<FieldOptions>,

    pub render_options: Option<RenderOptions>,

    pub variant: FieldVariant,
}

impl FieldDescriptor {
    /// Create a field of the variant matching `kind`
    pub fn new(id: impl Into<String>, kind: ObjectKind) -> Self {
        let id = id.into();
        let variant = match kind {
            ObjectKind::List => FieldVariant::List(ListFieldProps::default()),
            ObjectKind::Form => FieldVariant::Form(FormFieldProps::default()),
        };
        Self {
            name: id.clone(),
            id,
            system_field: false,
            assoc_object_id: None,
            field_type: FieldType::Text,
            content_type: ContentType::Text,
            sub_type: None,
            source: None,
            functions: None,
            options: None,
            render_options: None,
            variant,
        }
    }

    /// Create a list field
    pub fn list(id: impl Into<String>) -> Self {
        Self::new(id, ObjectKind::List)
    }

    /// Create a form field
    pub fn form(id: impl Into<String>) -> Self {
        Self::new(id, ObjectKind::Form)
    }

    /// The selection column injected first into every list
    pub fn checkbox_column() -> Self {
        let mut field = Self::list(CHECKBOX_FIELD);
        field.name = "#".to_string();
        field.system_field = true;
        field.set_field_type(FieldType::Checkbox);
        if let FieldVariant::List(props) = &mut field.variant {
            props.hidden_in_list = true;
            props.column_width = "10px".to_string();
        }
        field
    }

    /// The row-tools column injected second into every list
    pub fn tools_column() -> Self {
        let mut field = Self::list(TOOLS_FIELD);
        field.name = "::".to_string();
        field.system_field = true;
        field.set_field_type(FieldType::Tools);
        if let FieldVariant::List(props) = &mut field.variant {
            props.column_width = "10px".to_string();
        }
        field
    }

    // ------------------------------------------------------------------
    // Builder methods
    // ------------------------------------------------------------------

    /// Set the display label
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the type, applying its cascading defaults
    pub fn with_type(mut self, field_type: FieldType) -> Self {
        self.set_field_type(field_type);
        self
    }

    /// Set the source mapping
    pub fn with_source(mut self, source: Vec<SourceRef>) -> Self {
        self.source = Some(source);
        self
    }

    /// Set static options
    pub fn with_options(mut self, options: FieldOptions) -> Self {
        self.options = Some(options);
        self
    }

    // ------------------------------------------------------------------
    // Cascading setters
    // ------------------------------------------------------------------

    /// Assign `fieldType`, applying the implied defaults:
    ///
    /// - `password` stores `text` with content type `password`
    /// - `select`/`multiselect` without options seeds Nein/Ja and `bool`
    /// - `checkbox` forces content type `checkbox` and the checkbox render shape
    /// - `color` forces content type `color`
    pub fn set_field_type(&mut self, field_type: FieldType) {
        match field_type {
            FieldType::Password => {
                self.field_type = FieldType::Text;
                self.content_type = ContentType::Password;
            }
            FieldType::Select | FieldType::Multiselect => {
                self.field_type = field_type;
                if self.options.is_none() {
                    self.options = Some(boolean_options());
                    self.content_type = ContentType::Bool;
                }
            }
            FieldType::Checkbox => {
                self.field_type = FieldType::Checkbox;
                self.content_type = ContentType::Checkbox;
                self.render_options = Some(RenderOptions::checkbox());
            }
            FieldType::Color => {
                self.field_type = FieldType::Color;
                self.content_type = ContentType::Color;
            }
            other => self.field_type = other,
        }
    }

    /// Assign `fieldRenderOptions`.
    ///
    /// Computed options turn the field into a select (unless it already is
    /// one) with content type `options` and an empty static option set.
    pub fn set_render_options(&mut self, render_options: Option<RenderOptions>) {
        if render_options.is_some() {
            if !self.field_type.is_select() {
                self.field_type = FieldType::Select;
            }
            self.content_type = ContentType::Options;
            self.options = Some(FieldOptions::new());
        }
        self.render_options = render_options;
    }

    // ------------------------------------------------------------------
    // Variant access
    // ------------------------------------------------------------------

    /// Kind of object this field belongs to
    pub fn kind(&self) -> ObjectKind {
        match self.variant {
            FieldVariant::List(_) => ObjectKind::List,
            FieldVariant::Form(_) => ObjectKind::Form,
        }
    }

    /// List-only properties
    pub fn list_props(&self) -> Option<&ListFieldProps> {
        match &self.variant {
            FieldVariant::List(props) => Some(props),
            FieldVariant::Form(_) => None,
        }
    }

    /// Form-only properties
    pub fn form_props(&self) -> Option<&FormFieldProps> {
        match &self.variant {
            FieldVariant::Form(props) => Some(props),
            FieldVariant::List(_) => None,
        }
    }

    /// Mutable form-only properties
    pub fn form_props_mut(&mut self) -> Option<&mut FormFieldProps> {
        match &mut self.variant {
            FieldVariant::Form(props) => Some(props),
            FieldVariant::List(_) => None,
        }
    }

    /// Validation rule set, for form fields
    pub fn rules(&self) -> Option<&RuleSet> {
        self.form_props().map(|props| &props.rules)
    }

    // ------------------------------------------------------------------
    // Utility methods
    // ------------------------------------------------------------------

    /// Source entries, empty when the field maps to its own column
    pub fn sources(&self) -> &[SourceRef] {
        self.source.as_deref().unwrap_or(&[])
    }

    /// Whether any source entry goes through a relation
    pub fn has_relation_source(&self) -> bool {
        self.sources()
            .iter()
            .any(|s| matches!(s, SourceRef::Relation { .. }))
    }

    /// Look up a static option by the string form of its key
    pub fn option(&self, key: &str) -> Option<&FieldOption> {
        self.options.as_ref().and_then(|options| options.get(key))
    }

    /// Whether `renderOutput.output` is configured
    pub fn has_render_output(&self) -> bool {
        self.render_options
            .as_ref()
            .is_some_and(|r| r.render_output.output.is_some())
    }

    pub fn is_sortable(&self) -> bool {
        self.list_props().is_some_and(|p| p.sortable)
    }

    pub fn is_searchable(&self) -> bool {
        self.list_props().is_some_and(|p| p.searchable)
    }

    pub fn is_editable(&self) -> bool {
        self.list_props().is_some_and(|p| p.editable)
    }

    /// Column used when ordering by this field
    pub fn sort_column(&self) -> &str {
        self.list_props()
            .and_then(|p| p.sort_assign.as_deref())
            .unwrap_or(&self.id)
    }

    /// Whether a form save skips this field
    pub fn skipped_on_save(&self) -> bool {
        self.system_field
            || self
                .form_props()
                .is_some_and(|p| p.hidden_in_form || p.ignore_field || !p.writeable)
    }

    /// Name of the variant-specific keys
    fn variant_keys(&self) -> &'static [&'static str] {
        match self.variant {
            FieldVariant::List(_) => LIST_KEYS,
            FieldVariant::Form(_) => FORM_KEYS,
        }
    }

    /// Assign a property if this variant knows it.
    ///
    /// Returns `Ok(false)` for keys that belong to the other variant, so
    /// configuration maps can be applied to both kinds uniformly.
    pub fn apply(&mut self, key: &str, value: Value) -> EngineResult<bool> {
        if !self.has_property(key) {
            return Ok(false);
        }
        self.set_property(key, value)?;
        Ok(true)
    }
}

impl PropertyAccess for FieldDescriptor {
    fn container_name(&self) -> String {
        format!("field '{}'", self.id)
    }

    fn property_keys(&self) -> Vec<&'static str> {
        COMMON_KEYS
            .iter()
            .chain(self.variant_keys().iter())
            .copied()
            .collect()
    }

    fn get_property(&self, key: &str) -> Option<Value> {
        let common = match key {
            "fieldID" => Some(json!(self.id)),
            "fieldName" => Some(json!(self.name)),
            "fieldType" => Some(json!(self.field_type)),
            "fieldContentType" => Some(json!(self.content_type)),
            "fieldSubType" => Some(json!(self.sub_type)),
            "fieldAssocObjectID" => Some(json!(self.assoc_object_id)),
            "systemField" => Some(json!(self.system_field)),
            "fieldSource" => Some(json!(self.source)),
            "fieldFunctions" => Some(self.functions.clone().unwrap_or(Value::Null)),
            "fieldOptions" => Some(json!(self.options)),
            "fieldRenderOptions" => Some(json!(self.render_options)),
            _ => None,
        };
        if common.is_some() {
            return common;
        }

        match &self.variant {
            FieldVariant::List(p) => match key {
                "fieldHiddenInList" => Some(json!(p.hidden_in_list)),
                "fieldSortable" => Some(json!(p.sortable)),
                "fieldSortOrder" => Some(json!(p.sort_order)),
                "fieldSortAssign" => Some(json!(p.sort_assign)),
                "fieldSearchable" => Some(json!(p.searchable)),
                "fieldSearchAssign" => Some(json!(p.search_assign)),
                "fieldFilterable" => Some(json!(p.filterable)),
                "fieldFilter" => Some(p.filter.clone().unwrap_or(Value::Null)),
                "fieldEditable" => Some(json!(p.editable)),
                "fieldColumnWidth" => Some(json!(p.column_width)),
                "fieldLink" => Some(p.link.clone().unwrap_or(Value::Null)),
                "grouping" => Some(p.grouping.clone().unwrap_or(Value::Null)),
                "columnSum" => Some(json!(p.column_sum)),
                "rowSum" => Some(json!(p.row_sum)),
                _ => None,
            },
            FieldVariant::Form(p) => match key {
                "fieldHiddenInForm" => Some(json!(p.hidden_in_form)),
                "fieldHiddenInView" => Some(json!(p.hidden_in_view)),
                "fieldDescription" => Some(json!(p.description)),
                "fieldTooltip" => Some(json!(p.tooltip)),
                "fieldRequired" => Some(json!(p.required)),
                "fieldReadOnly" => Some(json!(p.read_only)),
                "placeholder" => Some(json!(p.placeholder)),
                "writeable" => Some(json!(p.writeable)),
                "ignoreField" => Some(json!(p.ignore_field)),
                "defaultValue" => Some(p.default_value.clone().unwrap_or(Value::Null)),
                "fieldPattern" => Some(json!(p.pattern)),
                "autocomplete" => Some(json!(p.autocomplete)),
                "fieldMinWidth" => Some(p.min_width.clone().unwrap_or(Value::Null)),
                "fieldMaxWidth" => Some(p.max_width.clone().unwrap_or(Value::Null)),
                "grouping" => Some(p.grouping.clone().unwrap_or(Value::Null)),
                other => p.rules.get(other),
            },
        }
    }

    fn set_property(&mut self, key: &str, value: Value) -> EngineResult<()> {
        let container = self.container_name();
        let container = container.as_str();
        match key {
            "fieldID" => self.id = property_value(container, key, value)?,
            "fieldName" => self.name = property_value(container, key, value)?,
            "fieldType" => {
                let field_type: FieldType = property_value(container, key, value)?;
                self.set_field_type(field_type);
            }
            "fieldContentType" => self.content_type = property_value(container, key, value)?,
            "fieldSubType" => self.sub_type = property_value(container, key, value)?,
            "fieldAssocObjectID" => self.assoc_object_id = property_value(container, key, value)?,
            "systemField" => self.system_field = property_value(container, key, value)?,
            "fieldSource" => self.source = SourceRef::parse_list(&value)?,
            "fieldFunctions" => self.functions = non_null(value),
            "fieldOptions" => {
                self.options = match value {
                    Value::Null => None,
                    other => Some(normalize_options(&other)?),
                }
            }
            "fieldRenderOptions" => {
                let render_options: Option<RenderOptions> =
                    property_value(container, key, value)?;
                self.set_render_options(render_options);
            }
            _ => match &mut self.variant {
                FieldVariant::List(p) => match key {
                    "fieldHiddenInList" => p.hidden_in_list = property_value(container, key, value)?,
                    "fieldSortable" => p.sortable = property_value(container, key, value)?,
                    "fieldSortOrder" => p.sort_order = property_value(container, key, value)?,
                    "fieldSortAssign" => p.sort_assign = property_value(container, key, value)?,
                    "fieldSearchable" => p.searchable = property_value(container, key, value)?,
                    "fieldSearchAssign" => p.search_assign = property_value(container, key, value)?,
                    "fieldFilterable" => p.filterable = property_value(container, key, value)?,
                    "fieldFilter" => p.filter = non_null(value),
                    "fieldEditable" => p.editable = property_value(container, key, value)?,
                    "fieldColumnWidth" => p.column_width = property_value(container, key, value)?,
                    "fieldLink" => p.link = non_null(value),
                    "grouping" => p.grouping = non_null(value),
                    "columnSum" => p.column_sum = property_value(container, key, value)?,
                    "rowSum" => p.row_sum = property_value(container, key, value)?,
                    _ => {
                        return Err(EngineError::invalid_property(
                            container,
                            key,
                            "not a list field property",
                        ));
                    }
                },
                FieldVariant::Form(p) => match key {
                    "fieldHiddenInForm" => p.hidden_in_form = property_value(container, key, value)?,
                    "fieldHiddenInView" => p.hidden_in_view = property_value(container, key, value)?,
                    "fieldDescription" => p.description = property_value(container, key, value)?,
                    "fieldTooltip" => p.tooltip = property_value(container, key, value)?,
                    "fieldRequired" => p.required = property_value(container, key, value)?,
                    "fieldReadOnly" => p.read_only = property_value(container, key, value)?,
                    "placeholder" => p.placeholder = property_value(container, key, value)?,
                    "writeable" => p.writeable = property_value(container, key, value)?,
                    "ignoreField" => p.ignore_field = property_value(container, key, value)?,
                    "defaultValue" => p.default_value = non_null(value),
                    "fieldPattern" => p.pattern = property_value(container, key, value)?,
                    "autocomplete" => p.autocomplete = property_value(container, key, value)?,
                    "fieldMinWidth" => p.min_width = non_null(value),
                    "fieldMaxWidth" => p.max_width = non_null(value),
                    "grouping" => p.grouping = non_null(value),
                    other => {
                        if !p.rules.set(other, value)? {
                            return Err(EngineError::invalid_property(
                                container,
                                key,
                                "not a form field property",
                            ));
                        }
                    }
                },
            },
        }
        Ok(())
    }
}

fn non_null(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        other => Some(other),
    }
}

impl Validatable for FieldDescriptor {
    fn validate(&self) -> EngineResult<()> {
        if self.id.trim().is_empty() {
            return Err(EngineError::configuration("Field ID cannot be empty"));
        }
        for source in self.sources() {
            if let SourceRef::Relation {
                relation, column, ..
            } = source
                && (relation.is_empty() || column.is_empty())
            {
                return Err(EngineError::configuration(format!(
                    "Field '{}' has an incomplete relation source",
                    self.id
                )));
            }
        }
        if let Some(render) = &self.render_options
            && render.render_output.value.is_empty()
        {
            return Err(EngineError::configuration(format!(
                "Field '{}' render output needs a value column",
                self.id
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
