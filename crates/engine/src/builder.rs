//! # Query Builder
//!
//! Runs one page request of a list object: the primary stack is resolved
//! into a query, the mandatory filter, column searches, global search and
//! ordering are layered on from the field registry, and the page is read,
//! cached and mapped.
//!
//! Query failures never escape [`PageBuilder::fetch_page`]; they come back
//! as a [`PageResult`] in the error state so the caller always gets a
//! well-shaped response.

use dataobjects_core::{EngineError, EngineResult, Row, SortDirection};
use dataobjects_model::{FieldDescriptor, FieldRegistry, PropertyBag, SourceDescriptor, SourceRef, StackSpec};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::mapper::RowMapper;
use crate::query::{Condition, Join, JoinKind, ModelInfo, Query, QueryEngine, RelationKind};
use crate::resolve::{CurrentUser, SourceHandle, resolve_stack};
use crate::results::ResultStack;

/// Search value meaning "no filter"
pub const SEARCH_ALL: &str = "_all";

/// Search value matching empty cells
pub const SEARCH_NULL: &str = "null";

// ============================================================================
// Request / Response
// ============================================================================

/// `{value}` search term of a request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchValue {
    pub value: String,
}

/// One requested column; `data` is the field ID
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnRequest {
    pub data: String,
    pub search: Option<SearchValue>,
}

/// One requested ordering; `column` indexes `columns`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderRequest {
    pub column: usize,
    pub dir: String,
}

/// Page request parameters of a list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageRequest {
    pub draw: u64,
    pub start: Option<u64>,
    /// Page length; `-1` returns every filtered row
    pub length: Option<i64>,
    pub search: Option<SearchValue>,
    pub columns: Vec<ColumnRequest>,
    pub order: Vec<OrderRequest>,
}

impl PageRequest {
    /// A request for one page, no search or ordering
    pub fn page(start: u64, length: i64) -> Self {
        Self {
            start: Some(start),
            length: Some(length),
            ..Self::default()
        }
    }

    /// Add a column search
    pub fn search_column(mut self, field_id: impl Into<String>, value: impl Into<String>) -> Self {
        self.columns.push(ColumnRequest {
            data: field_id.into(),
            search: Some(SearchValue {
                value: value.into(),
            }),
        });
        self
    }

    /// Set the global search term
    pub fn search_all(mut self, value: impl Into<String>) -> Self {
        self.search = Some(SearchValue {
            value: value.into(),
        });
        self
    }

    /// Order by a field, adding its column entry when missing
    pub fn order_by(mut self, field_id: &str, dir: &str) -> Self {
        let column = match self.columns.iter().position(|c| c.data == field_id) {
            Some(position) => position,
            None => {
                self.columns.push(ColumnRequest {
                    data: field_id.to_string(),
                    search: None,
                });
                self.columns.len() - 1
            }
        };
        self.order.push(OrderRequest {
            column,
            dir: dir.to_string(),
        });
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageState {
    #[default]
    Success,
    Error,
}

/// One page of mapped rows
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResult {
    #[serde(rename = "objectID")]
    pub object_id: String,
    pub draw: u64,
    pub data: Vec<Value>,
    pub records_total: u64,
    pub records_filtered: u64,
    pub record_sums: IndexMap<String, f64>,
    pub state: PageState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trace: Vec<String>,
}

impl PageResult {
    /// Empty result in the error state
    pub fn from_error(object_id: impl Into<String>, draw: u64, error: &EngineError) -> Self {
        Self {
            object_id: object_id.into(),
            draw,
            state: PageState::Error,
            message: Some(error.to_string()),
            trace: error.trace(),
            ..Self::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.state == PageState::Success
    }
}

// ============================================================================
// PageBuilder
// ============================================================================

/// Everything a page request reads from a list object
#[derive(Clone, Copy)]
pub struct PageBuilder<'a> {
    pub engine: &'a dyn QueryEngine,
    pub registry: &'a FieldRegistry,
    pub source: &'a SourceDescriptor,
    /// `listProperties`
    pub properties: &'a PropertyBag,
    /// `dataTableProperties`
    pub data_table: Option<&'a PropertyBag>,
    pub user: Option<&'a CurrentUser>,
}

/// Where a field's search and sort terms point
#[derive(Debug, Clone, PartialEq)]
enum FieldTarget {
    Column(String),
    Relation { relation: String, column: String },
}

impl<'a> PageBuilder<'a> {
    /// Run one page request, caching the raw rows in `results`
    pub fn fetch_page(&self, request: &PageRequest, results: &mut ResultStack) -> PageResult {
        match self.try_fetch_page(request, results) {
            Ok(page) => page,
            Err(err) => {
                warn!(object_id = %self.registry.object_id(), error = %err, "Page request failed");
                PageResult::from_error(self.registry.object_id(), request.draw, &err)
            }
        }
    }

    fn try_fetch_page(&self, request: &PageRequest, results: &mut ResultStack) -> EngineResult<PageResult> {
        let Some((alias, spec)) = self.source.primary() else {
            return self.manual_page(request, results);
        };
        let Some(handle) = resolve_stack(alias, spec, self.engine, self.user)? else {
            return self.manual_page(request, results);
        };

        let mut query = self.base_query(&handle, spec)?;
        let records_total = self.engine.count(&query)?;
        let record_sums = self.sums(&query)?;

        let mut applied = IndexMap::new();
        for column in &request.columns {
            let Some(value) = column.search.as_ref().and_then(|s| search_term(&s.value)) else {
                continue;
            };
            let field = self.registry.get(&column.data)?;
            if field.system_field {
                continue;
            }
            let condition = self.search_condition(&query, field, &value);
            query = query.filter(condition);
            applied.insert(field.id.clone(), value);
        }

        let global = request.search.as_ref().and_then(|s| search_term(&s.value));
        if let Some(term) = &global {
            query = self.global_search(query, term);
        }

        query = self.apply_order(query, request, spec)?;

        let records_filtered = if applied.is_empty() && global.is_none() {
            records_total
        } else {
            self.engine.count(&query)?
        };

        query = query.skip(request.start.unwrap_or(0));
        if let Some(take) = self.page_length(request) {
            query = query.take(take);
        }

        let rows = self.engine.get(&query)?;
        debug!(
            object_id = %self.registry.object_id(),
            alias,
            total = records_total,
            filtered = records_filtered,
            rows = rows.len(),
            "Fetched page"
        );
        results.add(alias, rows);

        let mapper = RowMapper::new(self.registry, self.properties.primary_key()).with_filters(&applied);
        Ok(PageResult {
            object_id: self.registry.object_id().to_string(),
            draw: request.draw,
            data: mapper.map_all(results.get(alias).unwrap_or_default()),
            records_total,
            records_filtered,
            record_sums,
            state: PageState::Success,
            message: None,
            trace: Vec::new(),
        })
    }

    /// Page rows handed to the object directly
    fn manual_page(&self, request: &PageRequest, results: &ResultStack) -> EngineResult<PageResult> {
        let Some(rows) = results.primary_rows() else {
            return Err(EngineError::data_source("no data source configured"));
        };
        let start = request.start.unwrap_or(0) as usize;
        let page: Vec<Row> = match self.page_length(request) {
            Some(take) => rows.iter().skip(start).take(take as usize).cloned().collect(),
            None => rows.iter().skip(start).cloned().collect(),
        };
        let mapper = RowMapper::new(self.registry, self.properties.primary_key());
        Ok(PageResult {
            object_id: self.registry.object_id().to_string(),
            draw: request.draw,
            data: mapper.map_all(&page),
            records_total: rows.len() as u64,
            records_filtered: rows.len() as u64,
            record_sums: IndexMap::new(),
            state: PageState::Success,
            message: Some("data loaded manually".to_string()),
            trace: Vec::new(),
        })
    }

    /// The stack's configured query plus the mandatory filter
    pub fn base_query(&self, handle: &SourceHandle, spec: &StackSpec) -> EngineResult<Query> {
        let mut query = handle.query();
        query.select = spec.select.clone();
        for condition in &spec.conditions {
            query = query.filter(Condition::from_spec(condition)?);
        }
        for join in &spec.joins {
            if join.operator.trim() != "=" {
                return Err(EngineError::query(format!(
                    "unsupported join operator '{}' on '{}'",
                    join.operator, join.table
                )));
            }
            query = query.join(Join {
                kind: match join.join_type {
                    dataobjects_model::JoinType::Inner => JoinKind::Inner,
                    dataobjects_model::JoinType::Left => JoinKind::Left,
                },
                table: join.table.clone(),
                alias: None,
                first: join.first.clone(),
                second: join.second.clone(),
            });
        }
        query.group = spec.group.clone();
        for condition in &spec.having {
            query.having.push(Condition::from_spec(condition)?);
        }
        for (relation, columns) in &spec.with {
            query = query.with(relation.clone(), columns.clone());
        }
        query = self.eager_relation_sources(query);

        if let Some((key, value)) = self.properties.filter() {
            let column = qualify(&query, key);
            query = match value {
                Value::Array(values) => query.where_in(column, values.clone()),
                other => query.where_eq(column, other.clone()),
            };
        }
        Ok(query)
    }

    /// Eager-load every relation a field source reads through
    fn eager_relation_sources(&self, mut query: Query) -> Query {
        let Some(model) = self.query_model(&query) else {
            return query;
        };
        for field in self.registry.user_fields() {
            for source in field.sources() {
                let SourceRef::Relation { relation, .. } = source else {
                    continue;
                };
                let Some((name, _)) = model.find_relation(relation) else {
                    continue;
                };
                if !query.eager.iter().any(|e| e.relation == name) {
                    query = query.with(name.to_string(), None);
                }
            }
        }
        query
    }

    fn sums(&self, query: &Query) -> EngineResult<IndexMap<String, f64>> {
        let mut columns: Vec<String> = self
            .data_table
            .map(PropertyBag::sum_columns)
            .unwrap_or_default();
        for field in self.registry.user_fields() {
            if field.list_props().is_some_and(|p| p.column_sum) && !columns.contains(&field.id) {
                columns.push(field.id.clone());
            }
        }
        let mut sums = IndexMap::new();
        for column in columns {
            let target = match self.registry.get(&column) {
                Ok(field) => match field_target(field) {
                    FieldTarget::Column(c) => c,
                    FieldTarget::Relation { .. } => continue,
                },
                Err(_) => column.clone(),
            };
            let sum = self.engine.sum(query, &qualify(query, &target))?;
            sums.insert(column, sum);
        }
        Ok(sums)
    }

    /// Match condition of one field against one search value, OR'd over
    /// every source of the field
    fn search_condition(&self, query: &Query, field: &FieldDescriptor, value: &str) -> Condition {
        let mut targets = field_targets(field);
        if targets.is_empty() {
            targets.push(FieldTarget::Column(field.id.clone()));
        }
        let mut alternatives: Vec<Condition> = targets
            .into_iter()
            .map(|target| self.target_condition(query, field, target, value))
            .collect();
        if alternatives.len() == 1 {
            alternatives.remove(0)
        } else {
            Condition::Any(alternatives)
        }
    }

    fn target_condition(&self, query: &Query, field: &FieldDescriptor, target: FieldTarget, value: &str) -> Condition {
        match target {
            FieldTarget::Column(column) => match_condition(field, &qualify(query, &column), value),
            FieldTarget::Relation { relation, column } => {
                let relation = self
                    .query_model(query)
                    .and_then(|model| model.find_relation(&relation).map(|(name, _)| name.to_string()))
                    .unwrap_or(relation);
                Condition::has(relation, Some(match_condition(field, &column, value)))
            }
        }
    }

    /// OR every space-separated token over every source of every field with
    /// a configured source
    fn global_search(&self, query: Query, term: &str) -> Query {
        let mut alternatives = Vec::new();
        for token in term.split_whitespace() {
            for field in self.registry.user_fields() {
                for target in field_targets(field) {
                    alternatives.push(self.target_condition(&query, field, target, token));
                }
            }
        }
        query.any_of(alternatives)
    }

    fn apply_order(&self, mut query: Query, request: &PageRequest, spec: &StackSpec) -> EngineResult<Query> {
        let index = self.registry.index();
        let mut ordered = false;
        for order in &request.order {
            let field_id = request
                .columns
                .get(order.column)
                .map(|c| c.data.as_str())
                .or_else(|| index.get(order.column).map(String::as_str))
                .ok_or_else(|| EngineError::query(format!("order column {} is out of range", order.column)))?;
            let field = self.registry.get(field_id)?;
            if field.system_field {
                continue;
            }
            query = self.order_by_field(query, field, SortDirection::parse_lenient(&order.dir))?;
            ordered = true;
        }

        if !ordered {
            for (column, direction) in self.properties.sorting() {
                let column = qualify(&query, &column);
                query = query.order_by_natural(column, direction);
            }
        }
        for order in &spec.order {
            let column = qualify(&query, &order.column);
            query = query.order_by(column, order.direction);
        }
        Ok(query)
    }

    /// Order by a field; relation sources join the related table under a
    /// fresh alias
    fn order_by_field(&self, query: Query, field: &FieldDescriptor, direction: SortDirection) -> EngineResult<Query> {
        let has_sort_assign = field.list_props().is_some_and(|p| p.sort_assign.is_some());
        let (relation, column) = match field_target(field) {
            FieldTarget::Relation { relation, column } if !has_sort_assign => (relation, column),
            FieldTarget::Column(column) if !has_sort_assign => {
                let column = qualify(&query, &column);
                return Ok(query.order_by_natural(column, direction));
            }
            _ => {
                let column = qualify(&query, field.sort_column());
                return Ok(query.order_by_natural(column, direction));
            }
        };

        let model = self.query_model(&query).ok_or_else(|| {
            EngineError::data_source(format!(
                "ordering by '{}' needs a model-backed source",
                field.id
            ))
        })?;
        let (name, info) = model.find_relation(&relation).ok_or_else(|| {
            EngineError::data_source(format!(
                "relation '{relation}' is not defined on model '{}'",
                model.name
            ))
        })?;
        let related = self
            .engine
            .model(&info.related)
            .ok_or_else(|| EngineError::UnknownModel(info.related.clone()))?;

        let alias = format!("{}_{}", related.table, &Uuid::new_v4().simple().to_string()[..8]);
        let (first, second) = match info.kind {
            RelationKind::BelongsTo => (
                format!("{}.{}", query.table, info.foreign_key),
                format!("{alias}.{}", info.owner_key),
            ),
            RelationKind::HasOne => (
                format!("{}.{}", query.table, info.owner_key),
                format!("{alias}.{}", info.foreign_key),
            ),
            RelationKind::HasMany | RelationKind::BelongsToMany => {
                return Err(EngineError::data_source(format!(
                    "cannot order by to-many relation '{name}'"
                )));
            }
        };
        debug!(field = %field.id, relation = name, alias = %alias, "Joined relation for ordering");
        Ok(query
            .join(Join {
                kind: JoinKind::Left,
                table: related.table.clone(),
                alias: Some(alias.clone()),
                first,
                second,
            })
            .order_by_natural(format!("{alias}.{column}"), direction))
    }

    fn page_length(&self, request: &PageRequest) -> Option<u64> {
        match request.length {
            Some(length) if length < 0 => None,
            Some(length) => Some(length as u64),
            None => match self.data_table.unwrap_or(self.properties).configured_list_length() {
                Some(length) if length < 0 => None,
                Some(length) => Some(length as u64),
                None => Some(self.source.which_limit(None)),
            },
        }
    }

    fn query_model(&self, query: &Query) -> Option<ModelInfo> {
        query.model.as_deref().and_then(|name| self.engine.model(name))
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Strip anchors and backslashes; `None` when nothing is left to match
fn search_term(raw: &str) -> Option<String> {
    let cleaned: String = raw.chars().filter(|c| !matches!(c, '^' | '$' | '\\')).collect();
    (!cleaned.trim().is_empty() && cleaned != SEARCH_ALL).then_some(cleaned)
}

/// Columns and relations a field is searched on, one per non-separator
/// source; empty when the field has no source
fn field_targets(field: &FieldDescriptor) -> Vec<FieldTarget> {
    if let Some(assign) = field.list_props().and_then(|p| p.search_assign.as_deref()) {
        return vec![FieldTarget::Column(assign.to_string())];
    }
    field
        .sources()
        .iter()
        .filter(|s| !s.is_separator())
        .map(|source| match source {
            SourceRef::Relation {
                relation, column, ..
            } => FieldTarget::Relation {
                relation: relation.clone(),
                column: column.clone(),
            },
            other => FieldTarget::Column(other.direct_column().unwrap_or(&field.id).to_string()),
        })
        .collect()
}

/// Column or relation a field is sorted and summed on
fn field_target(field: &FieldDescriptor) -> FieldTarget {
    field_targets(field)
        .into_iter()
        .next()
        .unwrap_or_else(|| FieldTarget::Column(field.id.clone()))
}

/// `IS NULL` for the null token, set membership for selects, substring
/// match otherwise
fn match_condition(field: &FieldDescriptor, column: &str, value: &str) -> Condition {
    if value == SEARCH_NULL {
        return Condition::is_null(column);
    }
    if field.field_type.is_select() {
        let members = value
            .split('|')
            .filter(|member| !member.is_empty())
            .map(|member| Value::String(member.to_string()))
            .collect();
        return Condition::is_in(column, members);
    }
    Condition::contains(column, value)
}

/// Qualify a bare column with the query's base table
pub(crate) fn qualify(query: &Query, column: &str) -> String {
    if column.contains('.') {
        column.to_string()
    } else {
        format!("{}.{column}", query.table)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryEngine;
    use crate::memory::tests::fixture;
    use dataobjects_core::{FieldType, ObjectKind, PropertyAccess};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    struct Fixture {
        engine: MemoryEngine,
        registry: FieldRegistry,
        source: SourceDescriptor,
        properties: PropertyBag,
        data_table: PropertyBag,
    }

    impl Fixture {
        fn users() -> Self {
            let mut registry = FieldRegistry::for_kind("users", ObjectKind::List);
            registry.get_or_insert("name");
            registry.get_or_insert("code");
            registry
                .get_or_insert("active")
                .set_field_type(FieldType::Select);
            registry
                .get_or_insert("team")
                .set_property("fieldSource", json!([["users", "team", "title"]]))
                .unwrap();
            let mut source = SourceDescriptor::new();
            source.add_source("users", StackSpec::model("User"));
            Self {
                engine: fixture(),
                registry,
                source,
                properties: PropertyBag::list(),
                data_table: PropertyBag::data_table(),
            }
        }

        fn builder(&self) -> PageBuilder<'_> {
            PageBuilder {
                engine: &self.engine,
                registry: &self.registry,
                source: &self.source,
                properties: &self.properties,
                data_table: Some(&self.data_table),
                user: None,
            }
        }

        fn fetch(&self, request: &PageRequest) -> PageResult {
            self.builder().fetch_page(request, &mut ResultStack::new())
        }
    }

    fn column(page: &PageResult, field: &str) -> Vec<Value> {
        page.data.iter().map(|row| row[field].clone()).collect()
    }

    #[test]
    fn test_default_page_maps_rows() {
        let fixture = Fixture::users();
        let mut results = ResultStack::new();
        let page = fixture.builder().fetch_page(&PageRequest::default(), &mut results);

        assert!(page.is_success(), "{page:?}");
        assert_eq!(page.records_total, 4);
        assert_eq!(page.records_filtered, 4);
        assert_eq!(column(&page, "name"), vec![json!("Ann"), json!("bob"), json!("Cleo"), json!("Dan")]);
        assert_eq!(column(&page, "team"), vec![json!("Red"), json!("Blue"), json!("Red"), Value::Null]);
        assert_eq!(page.data[0]["DT_RowId"], json!(1));
        assert_eq!(results.which_primary(), Some("users"));
    }

    #[test]
    fn test_select_search_uses_set_membership() {
        let fixture = Fixture::users();
        let builder = fixture.builder();
        let field = fixture.registry.get("active").unwrap();
        let query = Query::table("users");
        assert_eq!(
            builder.search_condition(&query, field, "a||b"),
            Condition::is_in("users.active", vec![json!("a"), json!("b")])
        );
        assert_eq!(
            builder.search_condition(&query, field, SEARCH_NULL),
            Condition::is_null("users.active")
        );
    }

    #[test]
    fn test_column_search_filters_and_recounts() {
        let fixture = Fixture::users();
        let page = fixture.fetch(&PageRequest::default().search_column("name", "^an$"));
        assert_eq!(page.records_total, 4);
        assert_eq!(page.records_filtered, 2);
        assert_eq!(column(&page, "name"), vec![json!("Ann"), json!("Dan")]);

        let page = fixture.fetch(&PageRequest::default().search_column("active", "0|"));
        assert_eq!(column(&page, "name"), vec![json!("bob")]);

        let page = fixture.fetch(&PageRequest::default().search_column("name", SEARCH_ALL));
        assert_eq!(page.records_filtered, 4);
    }

    #[test]
    fn test_relation_search_is_existential() {
        let fixture = Fixture::users();
        let page = fixture.fetch(&PageRequest::default().search_column("team", "blu"));
        assert_eq!(column(&page, "name"), vec![json!("bob")]);
    }

    #[test]
    fn test_global_search_ors_tokens() {
        let mut fixture = Fixture::users();
        fixture
            .registry
            .get_or_insert("name")
            .set_property("fieldSource", json!("users:name"))
            .unwrap();
        let page = fixture.fetch(&PageRequest::default().search_all("cleo blue"));
        assert_eq!(page.records_filtered, 2);
        assert_eq!(column(&page, "name"), vec![json!("bob"), json!("Cleo")]);
    }

    #[test]
    fn test_natural_ordering_puts_blanks_last() {
        let fixture = Fixture::users();
        let page = fixture.fetch(&PageRequest::default().order_by("code", "asc"));
        assert_eq!(column(&page, "code"), vec![json!("2"), json!("10"), json!("abc"), json!("")]);
    }

    #[test]
    fn test_relation_ordering_joins_related_table() {
        let fixture = Fixture::users();
        let page = fixture.fetch(&PageRequest::default().order_by("team", "asc"));
        assert!(page.is_success(), "{page:?}");
        assert_eq!(column(&page, "name"), vec![json!("bob"), json!("Ann"), json!("Cleo"), json!("Dan")]);
    }

    #[test]
    fn test_mandatory_filter_scopes_total() {
        let mut fixture = Fixture::users();
        fixture.properties.set_filter(json!(1), Some("team_id"));
        let page = fixture.fetch(&PageRequest::default());
        assert_eq!(page.records_total, 2);

        fixture.properties.set_filter(json!([1, 2]), Some("team_id"));
        assert_eq!(fixture.fetch(&PageRequest::default()).records_total, 3);
    }

    #[test]
    fn test_paging_and_unlimited_length() {
        let fixture = Fixture::users();
        let page = fixture.fetch(&PageRequest::page(1, 2));
        assert_eq!(column(&page, "name"), vec![json!("bob"), json!("Cleo")]);
        assert_eq!(page.records_total, 4);

        let page = fixture.fetch(&PageRequest::page(0, -1));
        assert_eq!(page.data.len(), 4);
    }

    #[test]
    fn test_column_sums() {
        let mut fixture = Fixture::users();
        fixture.data_table.set_property("columnSum", json!(["active"])).unwrap();
        let page = fixture.fetch(&PageRequest::default());
        assert_eq!(page.record_sums.get("active"), Some(&3.0));
    }

    #[test]
    fn test_missing_source_is_error_state() {
        let mut fixture = Fixture::users();
        fixture.source = SourceDescriptor::new();
        let page = fixture.fetch(&PageRequest {
            draw: 3,
            ..PageRequest::default()
        });
        assert_eq!(page.state, PageState::Error);
        assert_eq!(page.draw, 3);
        assert_eq!(page.records_total, 0);
        assert!(page.data.is_empty());
    }

    #[test]
    fn test_query_failure_is_error_state() {
        let mut fixture = Fixture::users();
        fixture.source = SourceDescriptor::new();
        fixture.source.add_source("users", StackSpec::table("nope"));
        let page = fixture.fetch(&PageRequest::default());
        assert_eq!(page.state, PageState::Error);
        assert!(page.message.is_some());
    }

    #[test]
    fn test_manual_rows_are_paged_in_memory() {
        let mut fixture = Fixture::users();
        fixture.source = SourceDescriptor::new();
        let mut results = ResultStack::new();
        results.add(
            "manual",
            (1..=3)
                .map(|id| json!({"id": id, "name": format!("row {id}")}).as_object().cloned().unwrap())
                .collect(),
        );
        let page = fixture.builder().fetch_page(&PageRequest::page(1, 1), &mut results);
        assert_eq!(page.message.as_deref(), Some("data loaded manually"));
        assert_eq!(page.records_total, 3);
        assert_eq!(column(&page, "name"), vec![json!("row 2")]);
    }

    #[test]
    fn test_hundred_rows_first_page() {
        let rows: Vec<Row> = (1..=100)
            .map(|id| json!({"id": id, "name": format!("user {id}")}).as_object().cloned().unwrap())
            .collect();
        let mut fixture = Fixture::users();
        fixture.engine = MemoryEngine::new().with_table("people", rows);
        fixture.registry = FieldRegistry::for_kind("people", ObjectKind::List);
        fixture.registry.get_or_insert("name");
        fixture.source = SourceDescriptor::new();
        fixture.source.add_source("people", StackSpec::table("people"));

        let page = fixture.fetch(&PageRequest::page(0, 25));
        assert_eq!(page.records_total, 100);
        assert_eq!(page.records_filtered, 100);
        assert_eq!(page.data.len(), 25);
        assert_eq!(page.data[0]["name"], json!("user 1"));
    }

    fn people() -> Fixture {
        let rows = vec![
            json!({"id": 1, "first_name": "Ann", "last_name": "Lee", "city": "Köln"}),
            json!({"id": 2, "first_name": "Bob", "last_name": "Kay", "city": "Bonn"}),
        ];
        let mut fixture = Fixture::users();
        fixture.engine = MemoryEngine::new().with_table(
            "people",
            rows.into_iter().map(|row| row.as_object().cloned().unwrap()).collect(),
        );
        fixture.registry = FieldRegistry::for_kind("people", ObjectKind::List);
        fixture
            .registry
            .get_or_insert("full_name")
            .set_property("fieldSource", json!(["people:first_name", " ", "people:last_name"]))
            .unwrap();
        fixture
            .registry
            .get_or_insert("first_name")
            .set_property("fieldSearchable", json!(true))
            .unwrap();
        fixture
            .registry
            .get_or_insert("city")
            .set_property("fieldSource", json!("people:city"))
            .unwrap();
        fixture.registry.get_or_insert("note");
        fixture.source = SourceDescriptor::new();
        fixture.source.add_source("people", StackSpec::table("people"));
        fixture
    }

    #[test]
    fn test_column_search_matches_any_source() {
        let fixture = people();
        let page = fixture.fetch(&PageRequest::default().search_column("full_name", "Lee"));
        assert_eq!(page.records_filtered, 1);
        assert_eq!(column(&page, "full_name"), vec![json!("Ann Lee")]);

        let page = fixture.fetch(&PageRequest::default().search_column("full_name", "bob"));
        assert_eq!(column(&page, "full_name"), vec![json!("Bob Kay")]);
    }

    #[test]
    fn test_global_search_covers_every_sourced_field() {
        let fixture = people();
        let page = fixture.fetch(&PageRequest::default().search_all("Kay"));
        assert_eq!(page.records_filtered, 1);
        assert_eq!(column(&page, "full_name"), vec![json!("Bob Kay")]);

        let page = fixture.fetch(&PageRequest::default().search_all("Bonn"));
        assert!(page.is_success(), "{page:?}");
        assert_eq!(column(&page, "city"), vec![json!("Bonn")]);
    }

    #[test]
    fn test_global_search_skips_fields_without_source() {
        let fixture = people();
        let builder = fixture.builder();
        let mut query = builder.global_search(Query::table("people"), "x");
        let Condition::Any(alternatives) = query.conditions.remove(0) else {
            panic!("expected an OR group");
        };
        assert_eq!(
            alternatives,
            vec![
                Condition::contains("people.first_name", "x"),
                Condition::contains("people.last_name", "x"),
                Condition::contains("people.city", "x"),
            ]
        );
    }

    #[test]
    fn test_search_term_keeps_whitespace() {
        assert_eq!(search_term(" Lee"), Some(" Lee".to_string()));
        assert_eq!(search_term("^\\$"), None);
        assert_eq!(search_term("  "), None);
        assert_eq!(search_term(SEARCH_ALL), None);
    }

    #[test]
    fn test_default_length_falls_back_to_stack_limit() {
        let rows: Vec<Row> = (1..=200)
            .map(|id| json!({"id": id}).as_object().cloned().unwrap())
            .collect();
        let mut fixture = Fixture::users();
        fixture.engine = MemoryEngine::new().with_table("people", rows);
        fixture.registry = FieldRegistry::for_kind("people", ObjectKind::List);
        fixture.registry.get_or_insert("id");
        fixture.source = SourceDescriptor::new();
        let mut stack = StackSpec::table("people");
        stack.limit = Some(10);
        fixture.source.add_source("people", stack);
        fixture.data_table.set_property("listLength", Value::Null).unwrap();

        let page = fixture.fetch(&PageRequest::default());
        assert_eq!(page.records_total, 200);
        assert_eq!(page.data.len(), 10);

        fixture.source = SourceDescriptor::new();
        fixture.source.add_source(
            "people",
            StackSpec {
                limit: None,
                ..StackSpec::table("people")
            },
        );
        assert_eq!(fixture.fetch(&PageRequest::default()).data.len(), 25);

        fixture.data_table.set_property("listLength", json!(40)).unwrap();
        assert_eq!(fixture.fetch(&PageRequest::default()).data.len(), 40);
    }

    #[test]
    fn test_request_deserializes_from_wire_shape() {
        let request: PageRequest = serde_json::from_value(json!({
            "draw": 2,
            "start": 10,
            "length": 25,
            "search": {"value": "x"},
            "columns": [{"data": "name", "search": {"value": ""}}],
            "order": [{"column": 0, "dir": "desc"}]
        }))
        .unwrap();
        assert_eq!(request.length, Some(25));
        assert_eq!(request.columns[0].data, "name");
        assert_eq!(request.order[0].dir, "desc");
    }
}
