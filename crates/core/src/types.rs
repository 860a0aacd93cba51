//! Core types used throughout DataObjects
//!
//! The enums here are shared by the property model, the field registry and
//! the query engine. Field and content types accept arbitrary strings from
//! configuration and keep the unknown ones verbatim.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::EngineError;

/// A raw or mapped result row: column name to value, insertion ordered.
pub type Row = serde_json::Map<String, serde_json::Value>;

// ============================================================================
// Object Kinds
// ============================================================================

/// The two kinds of presentation objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    /// A paged, searchable table
    List,
    /// A single-record form
    Form,
}

impl ObjectKind {
    /// Configuration key of this kind (`list` / `form`)
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::List => "list",
            ObjectKind::Form => "form",
        }
    }

    /// Name of the kind-specific property category
    pub fn properties_key(&self) -> &'static str {
        match self {
            ObjectKind::List => "listProperties",
            ObjectKind::Form => "formProperties",
        }
    }

    /// Get all object kinds
    pub fn all() -> &'static [ObjectKind] {
        &[ObjectKind::List, ObjectKind::Form]
    }
}

impl FromStr for ObjectKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "list" => Ok(ObjectKind::List),
            "form" => Ok(ObjectKind::Form),
            other => Err(EngineError::UnknownObjectType(other.to_string())),
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Field Types
// ============================================================================

/// Presentation type of a field (`fieldType`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldType {
    #[default]
    Text,
    Textarea,
    Select,
    Multiselect,
    Checkbox,
    Radio,
    Date,
    DateTime,
    Time,
    File,
    Color,
    Password,
    Tools,
    Int,
    Filesize,
    Boolean,
    /// Any type string not known to the engine
    Other(String),
}

impl FieldType {
    /// Configuration spelling of this type
    pub fn as_str(&self) -> &str {
        match self {
            FieldType::Text => "text",
            FieldType::Textarea => "textarea",
            FieldType::Select => "select",
            FieldType::Multiselect => "multiselect",
            FieldType::Checkbox => "checkbox",
            FieldType::Radio => "radio",
            FieldType::Date => "date",
            FieldType::DateTime => "datetime",
            FieldType::Time => "time",
            FieldType::File => "file",
            FieldType::Color => "color",
            FieldType::Password => "password",
            FieldType::Tools => "tools",
            FieldType::Int => "int",
            FieldType::Filesize => "filesize",
            FieldType::Boolean => "boolean",
            FieldType::Other(s) => s,
        }
    }

    /// `select` or `multiselect`
    pub fn is_select(&self) -> bool {
        matches!(self, FieldType::Select | FieldType::Multiselect)
    }

    /// Date, time or datetime
    pub fn is_temporal(&self) -> bool {
        matches!(self, FieldType::Date | FieldType::DateTime | FieldType::Time)
    }

    /// Types whose mapped value is always the empty string
    pub fn is_blank_column(&self) -> bool {
        matches!(self, FieldType::Checkbox | FieldType::Tools)
    }
}

impl From<String> for FieldType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "text" => FieldType::Text,
            "textarea" => FieldType::Textarea,
            "select" => FieldType::Select,
            "multiselect" => FieldType::Multiselect,
            "checkbox" => FieldType::Checkbox,
            "radio" => FieldType::Radio,
            "date" => FieldType::Date,
            "datetime" => FieldType::DateTime,
            "time" => FieldType::Time,
            "file" => FieldType::File,
            "color" => FieldType::Color,
            "password" => FieldType::Password,
            "tools" => FieldType::Tools,
            "int" => FieldType::Int,
            "filesize" => FieldType::Filesize,
            "boolean" => FieldType::Boolean,
            _ => FieldType::Other(s),
        }
    }
}

impl From<&str> for FieldType {
    fn from(s: &str) -> Self {
        FieldType::from(s.to_string())
    }
}

impl From<FieldType> for String {
    fn from(t: FieldType) -> Self {
        t.as_str().to_string()
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Semantic refinement of a field type (`fieldContentType`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ContentType {
    #[default]
    Text,
    Textarea,
    Bool,
    Options,
    Password,
    Filesize,
    Checkbox,
    Color,
    Other(String),
}

impl ContentType {
    /// Configuration spelling of this content type
    pub fn as_str(&self) -> &str {
        match self {
            ContentType::Text => "text",
            ContentType::Textarea => "textarea",
            ContentType::Bool => "bool",
            ContentType::Options => "options",
            ContentType::Password => "password",
            ContentType::Filesize => "filesize",
            ContentType::Checkbox => "checkbox",
            ContentType::Color => "color",
            ContentType::Other(s) => s,
        }
    }

    /// Content types whose values must be members of the field's options
    pub fn is_enumerated(&self) -> bool {
        matches!(self, ContentType::Bool | ContentType::Options)
    }
}

impl From<String> for ContentType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "text" => ContentType::Text,
            "textarea" => ContentType::Textarea,
            "bool" => ContentType::Bool,
            "options" => ContentType::Options,
            "password" => ContentType::Password,
            "filesize" => ContentType::Filesize,
            "checkbox" => ContentType::Checkbox,
            "color" => ContentType::Color,
            _ => ContentType::Other(s),
        }
    }
}

impl From<&str> for ContentType {
    fn from(s: &str) -> Self {
        ContentType::from(s.to_string())
    }
}

impl From<ContentType> for String {
    fn from(t: ContentType) -> Self {
        t.as_str().to_string()
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Sorting
// ============================================================================

/// Sort direction of an ordering clause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    /// SQL keyword
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }

    /// Parse leniently: anything other than `desc` (any case) is ascending.
    pub fn parse_lenient(s: &str) -> Self {
        if s.eq_ignore_ascii_case("desc") {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        }
    }
}

impl std::fmt::Display for SortDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SortDirection::Asc => write!(f, "asc"),
            SortDirection::Desc => write!(f, "desc"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    // ObjectKind tests

    #[test]
    fn test_object_kind_parse() {
        assert_eq!("list".parse::<ObjectKind>().unwrap(), ObjectKind::List);
        assert_eq!("form".parse::<ObjectKind>().unwrap(), ObjectKind::Form);

        let err = "grid".parse::<ObjectKind>().unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_object_kind_properties_key() {
        assert_eq!(ObjectKind::List.properties_key(), "listProperties");
        assert_eq!(ObjectKind::Form.properties_key(), "formProperties");
        assert_eq!(ObjectKind::all().len(), 2);
    }

    // FieldType tests

    #[test]
    fn test_field_type_from_string() {
        assert_eq!(FieldType::from("datetime"), FieldType::DateTime);
        assert_eq!(FieldType::from("select"), FieldType::Select);
        assert_eq!(
            FieldType::from("email"),
            FieldType::Other("email".to_string())
        );
        assert_eq!(FieldType::Other("email".to_string()).as_str(), "email");
    }

    #[test]
    fn test_field_type_serde() {
        let json = serde_json::to_string(&FieldType::Multiselect).unwrap();
        assert_eq!(json, "\"multiselect\"");

        let parsed: FieldType = serde_json::from_str("\"time\"").unwrap();
        assert_eq!(parsed, FieldType::Time);
    }

    #[test]
    fn test_field_type_classifiers() {
        assert!(FieldType::Multiselect.is_select());
        assert!(!FieldType::Radio.is_select());
        assert!(FieldType::Time.is_temporal());
        assert!(FieldType::Tools.is_blank_column());
    }

    // ContentType tests

    #[test]
    fn test_content_type_enumerated() {
        assert!(ContentType::Bool.is_enumerated());
        assert!(ContentType::Options.is_enumerated());
        assert!(!ContentType::Password.is_enumerated());
        assert_eq!(ContentType::from("bool"), ContentType::Bool);
    }

    // SortDirection tests

    #[test]
    fn test_sort_direction_lenient() {
        assert_eq!(SortDirection::parse_lenient("DESC"), SortDirection::Desc);
        assert_eq!(SortDirection::parse_lenient("asc"), SortDirection::Asc);
        assert_eq!(SortDirection::parse_lenient("sideways"), SortDirection::Asc);
        assert_eq!(SortDirection::Desc.as_sql(), "DESC");
    }
}
