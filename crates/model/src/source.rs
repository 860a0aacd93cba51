//! Source Descriptor
//!
//! The `dataSource` configuration names one or more stacks (data
//! providers) by alias. Each stack is a model, a relation path, a scope
//! chain or a plain table, plus the select/where/join/with/order settings
//! applied to every query against it. One alias is primary: the first
//! configured, unless `primaryStack` says otherwise.

use dataobjects_core::{EngineError, EngineResult, SortDirection, Validatable};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;

/// Page size used when a stack configures no limit
pub const FALLBACK_LIMIT: u64 = 25;

/// Scope-chain names that would trigger a fetch; they are skipped
const TERMINAL_SCOPES: &[&str] = &[
    "all", "get", "first", "find", "pluck", "count", "max", "min", "avg", "sum",
];

/// Accessor that starts a path at the authenticated user
pub const CURRENT_USER: &str = "Auth::user()";

// ============================================================================
// Stack settings
// ============================================================================

/// `{column, operator, value}` condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhereSpec {
    pub column: String,
    #[serde(default = "default_operator")]
    pub operator: String,
    #[serde(default)]
    pub value: Value,
}

fn default_operator() -> String {
    "=".to_string()
}

/// Join flavour of a configured join
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinType {
    #[default]
    Inner,
    Left,
}

/// `{table, first, operator, second, type}` join
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinSpec {
    pub table: String,
    pub first: String,
    #[serde(default = "default_operator")]
    pub operator: String,
    pub second: String,
    #[serde(default, rename = "type")]
    pub join_type: JoinType,
}

/// `{column, direction}` ordering
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSpec {
    pub column: String,
    #[serde(default)]
    pub direction: SortDirection,
}

/// Settings of one data source stack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackSpec {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub source_type: Option<String>,
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    #[serde(default)]
    pub select: Vec<String>,
    #[serde(default, rename = "where")]
    pub conditions: Vec<WhereSpec>,
    #[serde(default)]
    pub joins: Vec<JoinSpec>,
    #[serde(default)]
    pub group: Vec<String>,
    #[serde(default)]
    pub having: Vec<WhereSpec>,
    /// Eager-loaded relations, with an optional column projection
    #[serde(default, deserialize_with = "deserialize_with")]
    pub with: IndexMap<String, Option<Vec<String>>>,
    #[serde(default)]
    pub order: Vec<OrderSpec>,
    #[serde(default = "default_limit")]
    pub limit: Option<u64>,
}

fn default_primary_key() -> String {
    "id".to_string()
}

fn default_limit() -> Option<u64> {
    Some(100)
}

/// `with` is either a list of relation names or `relation -> [columns]`
fn deserialize_with<'de, D>(deserializer: D) -> Result<IndexMap<String, Option<Vec<String>>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let mut with = IndexMap::new();
    match value {
        Value::Null => {}
        Value::Array(items) => {
            for item in items {
                if let Value::String(relation) = item {
                    with.insert(relation, None);
                }
            }
        }
        Value::Object(map) => {
            for (relation, columns) in map {
                let columns = match columns {
                    Value::Array(items) => Some(
                        items
                            .into_iter()
                            .filter_map(|c| c.as_str().map(str::to_string))
                            .collect(),
                    ),
                    _ => None,
                };
                with.insert(relation, columns);
            }
        }
        Value::String(relation) => {
            with.insert(relation, None);
        }
        other => {
            return Err(serde::de::Error::custom(format!(
                "unsupported `with` value {other}"
            )));
        }
    }
    Ok(with)
}

impl Default for StackSpec {
    fn default() -> Self {
        Self {
            model: None,
            table: None,
            source_type: None,
            primary_key: default_primary_key(),
            select: Vec::new(),
            conditions: Vec::new(),
            joins: Vec::new(),
            group: Vec::new(),
            having: Vec::new(),
            with: IndexMap::new(),
            order: Vec::new(),
            limit: default_limit(),
        }
    }
}

impl StackSpec {
    /// A stack reading a plain table
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            ..Self::default()
        }
    }

    /// A stack reading a model (name, relation path or scope chain)
    pub fn model(model: impl Into<String>) -> Self {
        Self {
            model: Some(model.into()),
            ..Self::default()
        }
    }

    /// What this stack reads from.
    ///
    /// A model wins over a table; a bare `sourceType` means rows are
    /// supplied by the caller.
    pub fn target(&self, alias: &str) -> EngineResult<SourceTarget> {
        if let Some(model) = self.model.as_deref().filter(|m| !m.trim().is_empty()) {
            return ModelPath::parse(model).map(SourceTarget::Model);
        }
        if let Some(table) = self.table.as_deref().filter(|t| !t.trim().is_empty()) {
            return Ok(SourceTarget::Table(table.to_string()));
        }
        if self.source_type.is_some() {
            return Ok(SourceTarget::Manual);
        }
        Err(EngineError::MissingSource(alias.to_string()))
    }
}

// ============================================================================
// Model paths
// ============================================================================

/// Where a relation path starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathBase {
    /// A registered model or service
    Model(String),
    /// The authenticated user
    CurrentUser,
}

/// Kind of one relation path step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    /// `name()`: a zero-argument method (usually a relation)
    Call,
    /// `name`: an attribute or loaded relation
    Attr,
}

/// One step of a relation path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSegment {
    pub kind: SegmentKind,
    pub name: String,
}

impl std::fmt::Display for PathSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            SegmentKind::Call => write!(f, "{}()", self.name),
            SegmentKind::Attr => write!(f, "{}", self.name),
        }
    }
}

/// A pre-parsed `model` string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelPath {
    /// `User`
    Model(String),
    /// `Base->relation()->attr` or `Auth::user()->relation()`
    Relation {
        raw: String,
        base: PathBase,
        segments: Vec<PathSegment>,
    },
    /// `Model::scope()::other()`, fetch terminals removed
    Scopes { model: String, scopes: Vec<String> },
}

impl ModelPath {
    /// Parse a `model` string
    pub fn parse(raw: &str) -> EngineResult<Self> {
        let raw = raw.trim();
        if raw.contains("->") {
            return Self::parse_relation(raw);
        }
        if raw.contains("::") {
            let mut parts = raw.split("::").map(str::trim);
            let model = parts.next().unwrap_or_default().to_string();
            let scopes = parts
                .map(|scope| scope.trim_end_matches("()").to_string())
                .filter(|scope| !scope.is_empty() && !TERMINAL_SCOPES.contains(&scope.as_str()))
                .collect();
            return Ok(ModelPath::Scopes { model, scopes });
        }
        Ok(ModelPath::Model(raw.to_string()))
    }

    fn parse_relation(raw: &str) -> EngineResult<Self> {
        let mut parts = raw.split("->").map(str::trim);
        let base = match parts.next() {
            Some(CURRENT_USER) => PathBase::CurrentUser,
            Some(name) if !name.is_empty() && !name.contains('(') => {
                PathBase::Model(name.to_string())
            }
            Some(name) => {
                return Err(EngineError::resolution(
                    raw,
                    name,
                    format!("first segment must be a model name or '{CURRENT_USER}'"),
                ));
            }
            None => return Err(EngineError::resolution(raw, "", "empty path")),
        };

        let segments = parts
            .map(|part| {
                if part.is_empty() {
                    return Err(EngineError::resolution(raw, part, "empty segment"));
                }
                Ok(match part.strip_suffix("()") {
                    Some(name) => PathSegment {
                        kind: SegmentKind::Call,
                        name: name.to_string(),
                    },
                    None => PathSegment {
                        kind: SegmentKind::Attr,
                        name: part.to_string(),
                    },
                })
            })
            .collect::<EngineResult<Vec<_>>>()?;

        Ok(ModelPath::Relation {
            raw: raw.to_string(),
            base,
            segments,
        })
    }
}

/// Resolved reading target of a stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceTarget {
    Model(ModelPath),
    Table(String),
    /// Rows are handed to the object directly
    Manual,
}

// ============================================================================
// SourceDescriptor
// ============================================================================

/// Named data source stacks and the primary alias
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SourceDescriptor {
    stacks: IndexMap<String, StackSpec>,
    primary: Option<String>,
}

impl SourceDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a `dataSource` configuration:
    /// `{stacks: {alias: {..}}, primaryStack?: alias}`
    pub fn read_config(config: &Value) -> EngineResult<Self> {
        let mut descriptor = Self::new();
        if let Some(Value::Object(stacks)) = config.get("stacks") {
            for (alias, spec) in stacks {
                let spec: StackSpec = serde_json::from_value(spec.clone()).map_err(|e| {
                    EngineError::invalid_property(format!("dataSource '{alias}'"), "stacks", e.to_string())
                })?;
                descriptor.add_source(alias.clone(), spec);
            }
        }
        if let Some(primary) = config.get("primaryStack").and_then(Value::as_str) {
            descriptor.set_primary(primary);
        }
        debug!(
            stacks = descriptor.stacks.len(),
            primary = descriptor.primary.as_deref().unwrap_or(""),
            "Read data source configuration"
        );
        Ok(descriptor)
    }

    /// Add or replace a stack; the first one added becomes primary
    pub fn add_source(&mut self, alias: impl Into<String>, spec: StackSpec) -> &mut Self {
        let alias = alias.into();
        if self.primary.is_none() && self.stacks.is_empty() {
            self.primary = Some(alias.clone());
        }
        self.stacks.insert(alias, spec);
        self
    }

    /// Remove a stack; removing the primary leaves no primary
    pub fn remove_source(&mut self, alias: &str) -> Option<StackSpec> {
        if self.primary.as_deref() == Some(alias) {
            self.primary = None;
        }
        self.stacks.shift_remove(alias)
    }

    pub fn set_primary(&mut self, alias: impl Into<String>) {
        self.primary = Some(alias.into());
    }

    /// Alias of the primary stack
    pub fn which_primary(&self) -> Option<&str> {
        self.primary.as_deref()
    }

    /// The primary stack with its alias
    pub fn primary(&self) -> Option<(&str, &StackSpec)> {
        let alias = self.primary.as_deref()?;
        self.stacks.get(alias).map(|spec| (alias, spec))
    }

    pub fn get(&self, alias: &str) -> Option<&StackSpec> {
        self.stacks.get(alias)
    }

    /// Row limit of a stack (the primary when `alias` is `None`)
    pub fn which_limit(&self, alias: Option<&str>) -> u64 {
        alias
            .or(self.primary.as_deref())
            .and_then(|alias| self.stacks.get(alias))
            .and_then(|spec| spec.limit)
            .unwrap_or(FALLBACK_LIMIT)
    }

    pub fn has_sources(&self) -> bool {
        !self.stacks.is_empty()
    }

    /// Stacks in configuration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &StackSpec)> {
        self.stacks.iter().map(|(alias, spec)| (alias.as_str(), spec))
    }
}

impl Validatable for SourceDescriptor {
    fn validate(&self) -> EngineResult<()> {
        for (alias, spec) in &self.stacks {
            spec.target(alias)?;
        }
        if let Some(primary) = &self.primary
            && !self.stacks.contains_key(primary)
        {
            return Err(EngineError::configuration(format!(
                "primaryStack '{primary}' is not a configured stack"
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_read_config_defaults() {
        let descriptor = SourceDescriptor::read_config(&json!({
            "stacks": {
                "users": {"model": "User", "with": {"group": ["id", "title"]}},
                "logs": {"table": "logs", "limit": null}
            }
        }))
        .unwrap();

        assert_eq!(descriptor.which_primary(), Some("users"));
        let (alias, users) = descriptor.primary().unwrap();
        assert_eq!(alias, "users");
        assert_eq!(users.primary_key, "id");
        assert_eq!(users.limit, Some(100));
        assert!(users.order.is_empty());
        assert_eq!(
            users.with.get("group"),
            Some(&Some(vec!["id".to_string(), "title".to_string()]))
        );

        assert_eq!(descriptor.which_limit(None), 100);
        assert_eq!(descriptor.which_limit(Some("logs")), FALLBACK_LIMIT);
        assert_eq!(descriptor.which_limit(Some("missing")), FALLBACK_LIMIT);
        assert!(descriptor.is_valid());
    }

    #[test]
    fn test_primary_stack_override() {
        let descriptor = SourceDescriptor::read_config(&json!({
            "stacks": {"a": {"table": "a"}, "b": {"table": "b"}},
            "primaryStack": "b"
        }))
        .unwrap();
        assert_eq!(descriptor.which_primary(), Some("b"));
    }

    #[test]
    fn test_remove_primary() {
        let mut descriptor = SourceDescriptor::new();
        descriptor.add_source("a", StackSpec::table("a"));
        descriptor.add_source("b", StackSpec::table("b"));
        assert_eq!(descriptor.which_primary(), Some("a"));

        descriptor.remove_source("a");
        assert_eq!(descriptor.which_primary(), None);
        assert!(descriptor.primary().is_none());
        assert!(descriptor.has_sources());
    }

    #[test]
    fn test_where_and_with_list() {
        let spec: StackSpec = serde_json::from_value(json!({
            "table": "users",
            "where": [{"column": "active", "value": 1}],
            "with": ["group", "roles"],
            "order": [{"column": "name", "direction": "desc"}]
        }))
        .unwrap();
        assert_eq!(spec.conditions[0].operator, "=");
        assert_eq!(spec.with.len(), 2);
        assert_eq!(spec.with["roles"], None);
        assert_eq!(spec.order[0].direction, SortDirection::Desc);
    }

    #[test]
    fn test_missing_source() {
        let descriptor = SourceDescriptor::read_config(&json!({"stacks": {"users": {}}})).unwrap();
        let err = descriptor.validate().unwrap_err();
        assert!(err.is_configuration());
        assert!(matches!(err, EngineError::MissingSource(alias) if alias == "users"));
    }

    #[test]
    fn test_source_type_is_manual() {
        let spec: StackSpec = serde_json::from_value(json!({"sourceType": "manual"})).unwrap();
        assert_eq!(spec.target("rows").unwrap(), SourceTarget::Manual);
    }

    #[test]
    fn test_parse_relation_path() {
        let path = ModelPath::parse("Auth::user()->groups()->owner").unwrap();
        let ModelPath::Relation { base, segments, .. } = path else {
            panic!("expected relation path");
        };
        assert_eq!(base, PathBase::CurrentUser);
        assert_eq!(
            segments,
            vec![
                PathSegment {
                    kind: SegmentKind::Call,
                    name: "groups".to_string()
                },
                PathSegment {
                    kind: SegmentKind::Attr,
                    name: "owner".to_string()
                },
            ]
        );
        assert_eq!(segments[0].to_string(), "groups()");
    }

    #[test]
    fn test_parse_bad_relation_path() {
        let err = ModelPath::parse("helper()->groups()").unwrap_err();
        assert!(err.is_resolution());
        assert!(ModelPath::parse("User->->name").unwrap_err().is_resolution());
    }

    #[test]
    fn test_parse_scope_chain_skips_terminals() {
        assert_eq!(
            ModelPath::parse("User::active()::get()").unwrap(),
            ModelPath::Scopes {
                model: "User".to_string(),
                scopes: vec!["active".to_string()]
            }
        );
        assert_eq!(
            ModelPath::parse("User").unwrap(),
            ModelPath::Model("User".to_string())
        );
    }
}
