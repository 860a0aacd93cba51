//! # In-memory Query Engine
//!
//! Executes query plans against tables held in memory. Loaded from a JSON
//! fixture:
//!
//! ```json
//! {
//!   "tables": { "users": [ { "id": 1, "name": "Ann" } ] },
//!   "models": { "User": { "table": "users", "relations": { .. } } },
//!   "scopes": { "User": { "active": [ { "column": "active", "value": 1 } ] } },
//!   "currentUser": { "model": "User", "id": 1, "permissions": ["users.edit"] }
//! }
//! ```
//!
//! Rows are matched the way a loosely typed SQL backend compares them:
//! `1` equals `"1"`, `LIKE` is case-insensitive and `NULL` matches no
//! comparison.

use dataobjects_core::{EngineError, EngineResult, Persistable, Row, SortDirection, path};
use dataobjects_model::{StaticUser, WhereSpec};
use heck::ToSnakeCase;
use indexmap::IndexMap;
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use tracing::debug;

use crate::query::{
    CompareOp, Condition, JoinKind, ModelInfo, NATURAL_PAD_WIDTH, OrderKey, Query, QueryEngine,
    RelationInfo, RelationKind,
};
use crate::resolve::CurrentUser;

// ============================================================================
// Fixture
// ============================================================================

/// Authenticated user named by a fixture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserFixture {
    pub model: String,
    pub id: Value,
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// Serialized form of a [`MemoryEngine`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryFixture {
    #[serde(default)]
    pub tables: IndexMap<String, Vec<Row>>,
    #[serde(default)]
    pub models: IndexMap<String, ModelInfo>,
    #[serde(default)]
    pub scopes: IndexMap<String, IndexMap<String, Vec<WhereSpec>>>,
    #[serde(default)]
    pub current_user: Option<UserFixture>,
}

impl Persistable for MemoryFixture {}

// ============================================================================
// MemoryEngine
// ============================================================================

type Tables = IndexMap<String, Vec<Row>>;

#[derive(Debug, Clone, Default)]
pub struct MemoryEngine {
    tables: Tables,
    models: IndexMap<String, ModelInfo>,
    scopes: IndexMap<String, IndexMap<String, Condition>>,
    snapshot: Option<Tables>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a fixture; model names default to their keys
    pub fn from_fixture(fixture: &MemoryFixture) -> EngineResult<Self> {
        let mut engine = Self {
            tables: fixture.tables.clone(),
            ..Self::default()
        };
        for (name, model) in &fixture.models {
            let mut model = model.clone();
            if model.name.is_empty() {
                model.name = name.clone();
            }
            engine.models.insert(name.clone(), model);
        }
        for (model, scopes) in &fixture.scopes {
            for (scope, specs) in scopes {
                let conditions = specs
                    .iter()
                    .map(Condition::from_spec)
                    .collect::<EngineResult<Vec<_>>>()?;
                engine.add_scope(model, scope, Condition::All(conditions));
            }
        }
        debug!(
            tables = engine.tables.len(),
            models = engine.models.len(),
            "Loaded in-memory data source"
        );
        Ok(engine)
    }

    /// Add or replace a table
    pub fn with_table(mut self, name: impl Into<String>, rows: Vec<Row>) -> Self {
        self.tables.insert(name.into(), rows);
        self
    }

    /// Register a model under its name
    pub fn with_model(mut self, model: ModelInfo) -> Self {
        self.models.insert(model.name.clone(), model);
        self
    }

    pub fn add_scope(&mut self, model: &str, scope: &str, condition: Condition) {
        self.scopes
            .entry(model.to_string())
            .or_default()
            .insert(scope.to_string(), condition);
    }

    /// Rows of a table as currently stored
    pub fn rows(&self, table: &str) -> &[Row] {
        self.tables.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Resolve a fixture's current user against the stored rows
    pub fn current_user(&self, user: &UserFixture) -> EngineResult<CurrentUser> {
        let model = self
            .models
            .get(&user.model)
            .ok_or_else(|| EngineError::UnknownModel(user.model.clone()))?;
        let record = self
            .find(&Query::model(model), &user.id)?
            .ok_or_else(|| EngineError::RecordNotFound {
                source_name: model.table.clone(),
                id: path::display(&user.id),
            })?;
        Ok(CurrentUser {
            model: user.model.clone(),
            record,
            permissions: StaticUser::new(user.permissions.iter().cloned()),
        })
    }

    fn table_rows(&self, table: &str) -> EngineResult<&Vec<Row>> {
        self.tables
            .get(table)
            .ok_or_else(|| EngineError::data_source(format!("table '{table}' does not exist")))
    }

    fn model_info(&self, name: &str) -> EngineResult<&ModelInfo> {
        self.models
            .get(name)
            .ok_or_else(|| EngineError::UnknownModel(name.to_string()))
    }

    // ------------------------------------------------------------------
    // Evaluation
    // ------------------------------------------------------------------

    /// Joined, filtered, grouped and ordered rows (optionally paged),
    /// before projection
    fn select_rows(&self, query: &Query) -> EngineResult<Vec<Row>> {
        let model = query.model.as_deref().map(|m| self.model_info(m)).transpose()?;

        let mut rows: Vec<Row> = self
            .table_rows(&query.table)?
            .iter()
            .map(|row| working_row(&query.table, row))
            .collect();

        for join in &query.joins {
            let others = self.table_rows(&join.table)?;
            let mut joined = Vec::with_capacity(rows.len());
            for row in rows {
                let mut matched = false;
                for other in others {
                    let mut combined = row.clone();
                    qualify_into(&mut combined, join.name(), other);
                    if loose_eq(combined.get(&join.first), combined.get(&join.second)) {
                        joined.push(combined);
                        matched = true;
                    }
                }
                if !matched && join.kind == JoinKind::Left {
                    joined.push(row);
                }
            }
            rows = joined;
        }

        let mut filtered = Vec::with_capacity(rows.len());
        for row in rows {
            if self.matches_all(&row, &query.conditions, model)? {
                filtered.push(row);
            }
        }
        let mut rows = filtered;

        if !query.group.is_empty() {
            let mut groups: IndexMap<Vec<String>, Row> = IndexMap::new();
            for row in rows {
                let key = query
                    .group
                    .iter()
                    .map(|c| row.get(c).map(path::display).unwrap_or_default())
                    .collect();
                groups.entry(key).or_insert(row);
            }
            rows = Vec::with_capacity(groups.len());
            for row in groups.into_values() {
                if self.matches_all(&row, &query.having, model)? {
                    rows.push(row);
                }
            }
        }

        if !query.order.is_empty() {
            rows.sort_by(|a, b| compare_rows(a, b, &query.order));
        }

        let skip = query.skip.unwrap_or(0) as usize;
        let rows = rows.into_iter().skip(skip);
        Ok(match query.take {
            Some(take) => rows.take(take as usize).collect(),
            None => rows.collect(),
        })
    }

    fn matches_all(
        &self,
        row: &Row,
        conditions: &[Condition],
        model: Option<&ModelInfo>,
    ) -> EngineResult<bool> {
        for condition in conditions {
            if !self.matches(row, condition, model)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn matches(
        &self,
        row: &Row,
        condition: &Condition,
        model: Option<&ModelInfo>,
    ) -> EngineResult<bool> {
        Ok(match condition {
            Condition::Compare { column, op, value } => compare(row.get(column), *op, value)?,
            Condition::In { column, values } => {
                values.iter().any(|v| loose_eq(row.get(column), Some(v)))
            }
            Condition::IsNull { column } => row.get(column).is_none_or(Value::is_null),
            Condition::Has {
                relation,
                condition,
            } => {
                let model = model.ok_or_else(|| {
                    EngineError::query(format!(
                        "relation condition '{relation}' needs a model-backed query"
                    ))
                })?;
                let info = model.relation(relation).ok_or_else(|| {
                    EngineError::query(format!(
                        "relation '{relation}' is not defined on model '{}'",
                        model.name
                    ))
                })?;
                let related = self.model_info(&info.related)?;
                let mut found = false;
                for candidate in self.related_rows(info, row)? {
                    let candidate = working_row(&related.table, &candidate);
                    let ok = match condition {
                        Some(condition) => self.matches(&candidate, condition, Some(related))?,
                        None => true,
                    };
                    if ok {
                        found = true;
                        break;
                    }
                }
                found
            }
            Condition::All(conditions) => self.matches_all(row, conditions, model)?,
            Condition::Any(conditions) => {
                let mut any = false;
                for condition in conditions {
                    if self.matches(row, condition, model)? {
                        any = true;
                        break;
                    }
                }
                any
            }
        })
    }

    /// Records related to `row` through `relation`
    fn related_rows(&self, relation: &RelationInfo, row: &Row) -> EngineResult<Vec<Row>> {
        let related = self.model_info(&relation.related)?;
        let candidates = self.table_rows(&related.table)?;
        let rows = match relation.kind {
            RelationKind::BelongsTo => {
                let key = row.get(&relation.foreign_key);
                candidates
                    .iter()
                    .filter(|r| loose_eq(r.get(&relation.owner_key), key))
                    .cloned()
                    .collect()
            }
            RelationKind::HasOne | RelationKind::HasMany => {
                let key = row.get(&relation.owner_key);
                let mut rows: Vec<Row> = candidates
                    .iter()
                    .filter(|r| loose_eq(r.get(&relation.foreign_key), key))
                    .cloned()
                    .collect();
                if relation.kind == RelationKind::HasOne {
                    rows.truncate(1);
                }
                rows
            }
            RelationKind::BelongsToMany => {
                let pivot = relation.pivot.as_ref().ok_or_else(|| {
                    EngineError::query(format!(
                        "many-to-many relation to '{}' has no pivot table",
                        relation.related
                    ))
                })?;
                let key = row.get(&relation.owner_key);
                let ids: Vec<&Value> = self
                    .table_rows(&pivot.table)?
                    .iter()
                    .filter(|p| loose_eq(p.get(&pivot.foreign_pivot_key), key))
                    .filter_map(|p| p.get(&pivot.related_pivot_key))
                    .collect();
                candidates
                    .iter()
                    .filter(|r| ids.iter().any(|id| loose_eq(r.get(&related.primary_key), Some(id))))
                    .cloned()
                    .collect()
            }
        };
        Ok(rows)
    }

    /// Attach eager-loaded relations under their snake_case keys
    fn load_relations(&self, query: &Query, source: &Row, target: &mut Row) -> EngineResult<()> {
        if query.eager.is_empty() {
            return Ok(());
        }
        let model_name = query.model.as_deref().ok_or_else(|| {
            EngineError::query("eager loading needs a model-backed query".to_string())
        })?;
        let model = self.model_info(model_name)?;
        for eager in &query.eager {
            let relation = model.relation(&eager.relation).ok_or_else(|| {
                EngineError::query(format!(
                    "relation '{}' is not defined on model '{}'",
                    eager.relation, model.name
                ))
            })?;
            let related: Vec<Value> = self
                .related_rows(relation, source)?
                .into_iter()
                .map(|row| Value::Object(project_columns(row, eager.columns.as_deref())))
                .collect();
            let value = if relation.kind.is_to_one() {
                related.into_iter().next().unwrap_or(Value::Null)
            } else {
                Value::Array(related)
            };
            target.insert(eager.relation.to_snake_case(), value);
        }
        Ok(())
    }
}

impl QueryEngine for MemoryEngine {
    fn model(&self, name: &str) -> Option<ModelInfo> {
        self.models.get(name).cloned()
    }

    fn scope(&self, model: &str, scope: &str) -> Option<Condition> {
        self.scopes.get(model).and_then(|s| s.get(scope)).cloned()
    }

    fn count(&self, query: &Query) -> EngineResult<u64> {
        Ok(self.select_rows(&query.for_count())?.len() as u64)
    }

    fn sum(&self, query: &Query, column: &str) -> EngineResult<f64> {
        Ok(self
            .select_rows(&query.for_count())?
            .iter()
            .filter_map(|row| row.get(column).and_then(as_number))
            .sum())
    }

    fn get(&self, query: &Query) -> EngineResult<Vec<Row>> {
        let rows = self.select_rows(query)?;
        let mut output = Vec::with_capacity(rows.len());
        for row in rows {
            let mut projected = project(&query.table, &row, &query.select);
            self.load_relations(query, &row, &mut projected)?;
            output.push(projected);
        }
        debug!(table = %query.table, rows = output.len(), "Executed in-memory query");
        Ok(output)
    }

    fn create(&mut self, table: &str, primary_key: &str, mut attributes: Row) -> EngineResult<Row> {
        let rows = self.tables.entry(table.to_string()).or_default();
        if attributes.get(primary_key).is_none_or(Value::is_null) {
            let next = rows
                .iter()
                .filter_map(|row| row.get(primary_key).and_then(Value::as_i64))
                .max()
                .unwrap_or(0)
                + 1;
            attributes.insert(primary_key.to_string(), Value::from(next));
        }
        rows.push(attributes.clone());
        debug!(table, "Created record");
        Ok(attributes)
    }

    fn update(&mut self, query: &Query, attributes: &Row) -> EngineResult<u64> {
        let model = query.model.as_deref().map(|m| self.model_info(m)).transpose()?;
        let mut targets = Vec::new();
        for (index, row) in self.table_rows(&query.table)?.iter().enumerate() {
            if self.matches_all(&working_row(&query.table, row), &query.conditions, model)? {
                targets.push(index);
            }
        }
        let rows = self
            .tables
            .get_mut(&query.table)
            .ok_or_else(|| EngineError::internal("table vanished during update"))?;
        for index in &targets {
            for (key, value) in attributes {
                rows[*index].insert(key.clone(), value.clone());
            }
        }
        debug!(table = %query.table, rows = targets.len(), "Updated records");
        Ok(targets.len() as u64)
    }

    fn begin(&mut self) -> EngineResult<()> {
        if self.snapshot.is_some() {
            return Err(EngineError::query("a transaction is already open"));
        }
        self.snapshot = Some(self.tables.clone());
        Ok(())
    }

    fn commit(&mut self) -> EngineResult<()> {
        self.snapshot
            .take()
            .map(|_| ())
            .ok_or_else(|| EngineError::query("no open transaction to commit"))
    }

    fn rollback(&mut self) -> EngineResult<()> {
        let snapshot = self
            .snapshot
            .take()
            .ok_or_else(|| EngineError::query("no open transaction to roll back"))?;
        self.tables = snapshot;
        Ok(())
    }
}

// ============================================================================
// Row helpers
// ============================================================================

/// A stored row with its columns both bare and `table.`-qualified
fn working_row(table: &str, row: &Row) -> Row {
    let mut working = row.clone();
    qualify_into(&mut working, table, row);
    working
}

fn qualify_into(target: &mut Row, name: &str, row: &Row) {
    for (key, value) in row {
        target.insert(format!("{name}.{key}"), value.clone());
    }
}

/// Apply a select list; bare columns of the base table when empty
fn project(table: &str, row: &Row, select: &[String]) -> Row {
    let bare = || {
        row.iter()
            .filter(|(key, _)| !key.contains('.'))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<Row>()
    };
    if select.is_empty() {
        return bare();
    }
    let mut projected = Row::new();
    for column in select {
        if column == "*" || *column == format!("{table}.*") {
            projected.extend(bare());
        } else if let Some(name) = column.strip_suffix(".*") {
            let prefix = format!("{name}.");
            for (key, value) in row {
                if let Some(bare_key) = key.strip_prefix(&prefix) {
                    projected.insert(bare_key.to_string(), value.clone());
                }
            }
        } else {
            let name = column.rsplit('.').next().unwrap_or(column);
            projected.insert(name.to_string(), row.get(column).cloned().unwrap_or(Value::Null));
        }
    }
    projected
}

fn project_columns(row: Row, columns: Option<&[String]>) -> Row {
    match columns {
        Some(columns) if !columns.is_empty() => row
            .into_iter()
            .filter(|(key, _)| columns.iter().any(|c| c == key))
            .collect(),
        _ => row,
    }
}

// ============================================================================
// Value comparison
// ============================================================================

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// SQL-style loose equality; `NULL` equals nothing
fn loose_eq(a: Option<&Value>, b: Option<&Value>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) if !a.is_null() && !b.is_null() => {
            match (as_number(a), as_number(b)) {
                (Some(x), Some(y)) => x == y,
                _ => path::display(a) == path::display(b),
            }
        }
        _ => false,
    }
}

/// Order of two cells; `NULL` first, numbers numerically, else by text
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => {
            if a.is_number() || b.is_number() {
                if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
                    return x.partial_cmp(&y).unwrap_or(Ordering::Equal);
                }
            }
            path::display(a).cmp(&path::display(b))
        }
    }
}

fn compare(cell: Option<&Value>, op: CompareOp, value: &Value) -> EngineResult<bool> {
    if cell.is_none_or(Value::is_null) || value.is_null() {
        return Ok(false);
    }
    Ok(match op {
        CompareOp::Eq => loose_eq(cell, Some(value)),
        CompareOp::NotEq => !loose_eq(cell, Some(value)),
        CompareOp::Lt => compare_values(cell, Some(value)) == Ordering::Less,
        CompareOp::Lte => compare_values(cell, Some(value)) != Ordering::Greater,
        CompareOp::Gt => compare_values(cell, Some(value)) == Ordering::Greater,
        CompareOp::Gte => compare_values(cell, Some(value)) != Ordering::Less,
        CompareOp::Like => {
            let text = cell.map(path::display).unwrap_or_default();
            like(&text, &path::display(value))?
        }
    })
}

/// Case-insensitive `LIKE` with `%` and `_` wildcards
fn like(text: &str, pattern: &str) -> EngineResult<bool> {
    let mut expr = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '%' => expr.push_str(".*"),
            '_' => expr.push('.'),
            other => expr.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    expr.push('$');
    let regex = RegexBuilder::new(&expr)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .map_err(|e| EngineError::query(format!("invalid LIKE pattern '{pattern}': {e}")))?;
    Ok(regex.is_match(text))
}

/// Sort key of natural ordering; `None` for blank cells
pub fn natural_key(value: Option<&Value>) -> Option<String> {
    let value = value?;
    if path::is_blank(value) {
        return None;
    }
    let text = path::display(value);
    if !text.is_empty() && text.chars().all(|c| c.is_ascii_digit()) {
        Some(format!("{text:0>width$}", width = NATURAL_PAD_WIDTH))
    } else {
        Some(text)
    }
}

fn directed(ordering: Ordering, direction: SortDirection) -> Ordering {
    match direction {
        SortDirection::Asc => ordering,
        SortDirection::Desc => ordering.reverse(),
    }
}

fn compare_rows(a: &Row, b: &Row, order: &[OrderKey]) -> Ordering {
    for key in order {
        let ordering = match key {
            OrderKey::Column { column, direction } => {
                directed(compare_values(a.get(column), b.get(column)), *direction)
            }
            OrderKey::Natural { column, direction } => {
                match (natural_key(a.get(column)), natural_key(b.get(column))) {
                    (None, None) => Ordering::Equal,
                    // blanks last in both directions
                    (None, Some(_)) => Ordering::Greater,
                    (Some(_), None) => Ordering::Less,
                    (Some(x), Some(y)) => directed(x.cmp(&y), *direction),
                }
            }
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::query::Join;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => panic!("row fixture must be an object"),
        }
    }

    pub(crate) fn fixture() -> MemoryEngine {
        let fixture: MemoryFixture = serde_json::from_value(json!({
            "tables": {
                "users": [
                    {"id": 1, "name": "Ann", "team_id": 1, "active": 1, "code": "10"},
                    {"id": 2, "name": "bob", "team_id": 2, "active": 0, "code": "2"},
                    {"id": 3, "name": "Cleo", "team_id": 1, "active": 1, "code": ""},
                    {"id": 4, "name": "Dan", "team_id": null, "active": 1, "code": "abc"}
                ],
                "teams": [
                    {"id": 1, "title": "Red"},
                    {"id": 2, "title": "Blue"}
                ],
                "roles": [
                    {"id": 1, "label": "admin"},
                    {"id": 2, "label": "editor"}
                ],
                "role_user": [
                    {"user_id": 1, "role_id": 1},
                    {"user_id": 1, "role_id": 2},
                    {"user_id": 2, "role_id": 2}
                ]
            },
            "models": {
                "User": {
                    "table": "users",
                    "relations": {
                        "team": {"kind": "belongsTo", "related": "Team", "foreignKey": "team_id"},
                        "roles": {
                            "kind": "belongsToMany",
                            "related": "Role",
                            "pivot": {"table": "role_user", "foreignPivotKey": "user_id", "relatedPivotKey": "role_id"}
                        }
                    }
                },
                "Team": {
                    "table": "teams",
                    "relations": {"members": {"kind": "hasMany", "related": "User", "foreignKey": "team_id"}}
                },
                "Role": {"table": "roles"}
            },
            "scopes": {"User": {"active": [{"column": "active", "value": 1}]}}
        }))
        .unwrap();
        MemoryEngine::from_fixture(&fixture).unwrap()
    }

    fn users() -> Query {
        Query::model(&fixture().model("User").unwrap())
    }

    fn names(rows: &[Row]) -> Vec<String> {
        rows.iter().map(|r| path::display(&r["name"])).collect()
    }

    #[test]
    fn test_like_is_case_insensitive() {
        let engine = fixture();
        let rows = engine.get(&users().filter(Condition::contains("name", "B"))).unwrap();
        assert_eq!(names(&rows), vec!["bob"]);
        assert!(like("a.b", "a.b").unwrap());
        assert!(!like("axb", "a.b").unwrap());
    }

    #[test]
    fn test_loose_equality_and_in() {
        let engine = fixture();
        let rows = engine
            .get(&users().where_in("id", vec![json!("1"), json!(3)]))
            .unwrap();
        assert_eq!(names(&rows), vec!["Ann", "Cleo"]);
        assert_eq!(engine.count(&users().where_null("team_id")).unwrap(), 1);
    }

    #[test]
    fn test_natural_order_puts_blanks_last() {
        let engine = fixture();
        let asc = engine
            .get(&users().order_by_natural("code", SortDirection::Asc))
            .unwrap();
        let codes: Vec<String> = asc.iter().map(|r| path::display(&r["code"])).collect();
        assert_eq!(codes, vec!["2", "10", "abc", ""]);

        let desc = engine
            .get(&users().order_by_natural("code", SortDirection::Desc))
            .unwrap();
        let codes: Vec<String> = desc.iter().map(|r| path::display(&r["code"])).collect();
        assert_eq!(codes, vec!["abc", "10", "2", ""]);
    }

    #[test]
    fn test_relation_conditions() {
        let engine = fixture();
        let editors = users().where_has("roles", Some(Condition::eq("label", "editor")));
        assert_eq!(names(&engine.get(&editors).unwrap()), vec!["Ann", "bob"]);

        let red = users().where_has("team", Some(Condition::contains("title", "red")));
        assert_eq!(names(&engine.get(&red).unwrap()), vec!["Ann", "Cleo"]);
    }

    #[test]
    fn test_left_join_keeps_unmatched_rows() {
        let engine = fixture();
        let query = users()
            .join(Join {
                kind: JoinKind::Left,
                table: "teams".into(),
                alias: Some("teams_x".into()),
                first: "users.team_id".into(),
                second: "teams_x.id".into(),
            })
            .order_by("teams_x.title", SortDirection::Asc);
        let rows = engine.get(&query).unwrap();
        assert_eq!(names(&rows), vec!["Dan", "bob", "Ann", "Cleo"]);
        assert_eq!(rows[0]["team_id"], Value::Null);
    }

    #[test]
    fn test_eager_loading_with_projection() {
        let engine = fixture();
        let rows = engine
            .get(
                &users()
                    .where_eq("id", 1)
                    .with("team", Some(vec!["title".into()]))
                    .with("roles", None),
            )
            .unwrap();
        assert_eq!(rows[0]["team"], json!({"title": "Red"}));
        assert_eq!(rows[0]["roles"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_paging_sum_and_select() {
        let engine = fixture();
        let query = users().order_by("id", SortDirection::Desc).skip(1).take(2);
        assert_eq!(names(&engine.get(&query).unwrap()), vec!["Cleo", "bob"]);
        assert_eq!(engine.count(&query).unwrap(), 4);
        assert_eq!(engine.sum(&users(), "active").unwrap(), 3.0);

        let mut select = users().where_eq("id", 2);
        select.select = vec!["users.name".into()];
        assert_eq!(engine.get(&select).unwrap(), vec![row(json!({"name": "bob"}))]);
    }

    #[test]
    fn test_scopes_and_unknown_table() {
        let engine = fixture();
        let active = engine.scope("User", "active").unwrap();
        assert_eq!(engine.count(&users().filter(active)).unwrap(), 3);
        assert!(engine.get(&Query::table("nope")).unwrap_err().is_data_source());
    }

    #[test]
    fn test_create_update_and_rollback() {
        let mut engine = fixture();
        engine.begin().unwrap();
        let created = engine
            .create("teams", "id", row(json!({"title": "Green"})))
            .unwrap();
        assert_eq!(created["id"], json!(3));
        let changed = engine
            .update(&Query::table("teams").where_eq("id", 1), &row(json!({"title": "Crimson"})))
            .unwrap();
        assert_eq!(changed, 1);
        engine.rollback().unwrap();
        assert_eq!(engine.rows("teams").len(), 2);
        assert_eq!(engine.rows("teams")[0]["title"], json!("Red"));
        assert!(engine.commit().is_err());
    }

    #[test]
    fn test_current_user_from_fixture() {
        let engine = fixture();
        let user = engine
            .current_user(&UserFixture {
                model: "User".into(),
                id: json!(2),
                permissions: vec!["users.edit".into()],
            })
            .unwrap();
        assert_eq!(user.record["name"], json!("bob"));
        assert!(
            engine
                .current_user(&UserFixture {
                    model: "User".into(),
                    id: json!(99),
                    permissions: vec![],
                })
                .unwrap_err()
                .is_not_found()
        );
    }

    #[test]
    fn test_pivot_relation_requires_pivot() {
        let engine = fixture().with_model(ModelInfo::new("Broken", "users").with_relation(
            "roles",
            RelationInfo {
                kind: RelationKind::BelongsToMany,
                related: "Role".into(),
                foreign_key: String::new(),
                owner_key: "id".into(),
                pivot: None,
            },
        ));
        let query = Query::model(&engine.model("Broken").unwrap()).where_has("roles", None);
        assert!(engine.get(&query).is_err());
    }

    #[test]
    fn test_fixture_loads_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("fixture.json");
        std::fs::write(
            &path,
            r#"{"tables": {"teams": [{"id": 1, "title": "Red"}]}, "models": {"Team": {"table": "teams"}}}"#,
        )
        .unwrap();

        let fixture = MemoryFixture::load_from_file(&path).unwrap();
        let engine = MemoryEngine::from_fixture(&fixture).unwrap();
        assert_eq!(engine.model("Team").unwrap().name, "Team");
        assert_eq!(engine.rows("teams").len(), 1);
        assert!(MemoryFixture::load_from_file(&dir.path().join("missing.json")).is_err());
    }
}
