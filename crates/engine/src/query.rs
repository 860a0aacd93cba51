//! # Query Plan
//!
//! A [`Query`] is the backend-neutral description of one read against a
//! data source: base table, conditions, joins, ordering and paging. The
//! query builder assembles it from the field registry and the request;
//! a [`QueryEngine`] executes it.
//!
//! Relation metadata ([`ModelInfo`], [`RelationInfo`]) is what the engine
//! exposes so callers can tell to-one from to-many relations and find the
//! join keys of each kind.

use dataobjects_core::{EngineError, EngineResult, Row, SortDirection};
use dataobjects_model::WhereSpec;
use heck::{ToLowerCamelCase, ToSnakeCase};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Relation metadata
// ============================================================================

/// Kind of a model relation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelationKind {
    BelongsTo,
    HasOne,
    HasMany,
    BelongsToMany,
}

impl RelationKind {
    /// Whether the relation yields at most one record
    pub fn is_to_one(&self) -> bool {
        matches!(self, RelationKind::BelongsTo | RelationKind::HasOne)
    }
}

/// Intermediate table of a many-to-many relation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PivotInfo {
    pub table: String,
    /// Pivot column holding the parent's key
    pub foreign_pivot_key: String,
    /// Pivot column holding the related record's key
    pub related_pivot_key: String,
}

/// One relation of a model.
///
/// Key meaning by kind:
///
/// - `belongsTo`: `parent[foreign_key] = related[owner_key]`
/// - `hasOne` / `hasMany`: `related[foreign_key] = parent[owner_key]`
/// - `belongsToMany`: `pivot[foreign_pivot_key] = parent[owner_key]` and
///   `pivot[related_pivot_key] = related[primary key]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationInfo {
    pub kind: RelationKind,
    /// Name of the related model
    pub related: String,
    #[serde(default)]
    pub foreign_key: String,
    #[serde(default = "default_key")]
    pub owner_key: String,
    #[serde(default)]
    pub pivot: Option<PivotInfo>,
}

/// A model known to the query engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    #[serde(default)]
    pub name: String,
    pub table: String,
    #[serde(default = "default_key")]
    pub primary_key: String,
    #[serde(default)]
    pub relations: IndexMap<String, RelationInfo>,
}

fn default_key() -> String {
    "id".to_string()
}

impl ModelInfo {
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            primary_key: default_key(),
            relations: IndexMap::new(),
        }
    }

    /// Add a relation
    pub fn with_relation(mut self, name: impl Into<String>, relation: RelationInfo) -> Self {
        self.relations.insert(name.into(), relation);
        self
    }

    pub fn relation(&self, name: &str) -> Option<&RelationInfo> {
        self.relations.get(name)
    }

    /// Look a relation up by name, then by its camelCase and snake_case
    /// spellings. Returns the defined name with the relation.
    pub fn find_relation(&self, name: &str) -> Option<(&str, &RelationInfo)> {
        [
            name.to_string(),
            name.to_lower_camel_case(),
            name.to_snake_case(),
        ]
        .iter()
        .find_map(|candidate| self.relations.get_key_value(candidate.as_str()))
        .map(|(key, relation)| (key.as_str(), relation))
    }
}

// ============================================================================
// Conditions
// ============================================================================

/// Comparison operator of a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    /// Case-insensitive pattern match with `%` and `_` wildcards
    Like,
}

impl CompareOp {
    /// Parse the configuration spelling of an operator
    pub fn parse(op: &str) -> EngineResult<Self> {
        match op.trim().to_ascii_lowercase().as_str() {
            "=" | "==" => Ok(CompareOp::Eq),
            "!=" | "<>" => Ok(CompareOp::NotEq),
            "<" => Ok(CompareOp::Lt),
            "<=" => Ok(CompareOp::Lte),
            ">" => Ok(CompareOp::Gt),
            ">=" => Ok(CompareOp::Gte),
            "like" => Ok(CompareOp::Like),
            other => Err(EngineError::query(format!("unsupported operator '{other}'"))),
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "!=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
            CompareOp::Like => "LIKE",
        }
    }
}

/// A filter over rows
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Compare {
        column: String,
        op: CompareOp,
        value: Value,
    },
    In {
        column: String,
        values: Vec<Value>,
    },
    IsNull {
        column: String,
    },
    /// At least one related record exists (and matches `condition`)
    Has {
        relation: String,
        condition: Option<Box<Condition>>,
    },
    All(Vec<Condition>),
    Any(Vec<Condition>),
}

impl Condition {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Compare {
            column: column.into(),
            op: CompareOp::Eq,
            value: value.into(),
        }
    }

    /// `column LIKE %needle%`
    pub fn contains(column: impl Into<String>, needle: &str) -> Self {
        Condition::Compare {
            column: column.into(),
            op: CompareOp::Like,
            value: Value::String(format!("%{needle}%")),
        }
    }

    pub fn is_in(column: impl Into<String>, values: Vec<Value>) -> Self {
        Condition::In {
            column: column.into(),
            values,
        }
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Condition::IsNull {
            column: column.into(),
        }
    }

    pub fn has(relation: impl Into<String>, condition: Option<Condition>) -> Self {
        Condition::Has {
            relation: relation.into(),
            condition: condition.map(Box::new),
        }
    }

    /// Convert a configured `{column, operator, value}` entry
    pub fn from_spec(spec: &WhereSpec) -> EngineResult<Self> {
        Ok(Condition::Compare {
            column: spec.column.clone(),
            op: CompareOp::parse(&spec.operator)?,
            value: spec.value.clone(),
        })
    }
}

// ============================================================================
// Joins, ordering, eager loading
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

/// `JOIN table [AS alias] ON first = second`
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub table: String,
    pub alias: Option<String>,
    pub first: String,
    pub second: String,
}

impl Join {
    /// Name the joined rows are qualified with
    pub fn name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderKey {
    /// Plain column order
    Column {
        column: String,
        direction: SortDirection,
    },
    /// Blank values last, digit-only strings compared zero-padded
    Natural {
        column: String,
        direction: SortDirection,
    },
}

/// Width digit-only values are padded to for natural ordering
pub const NATURAL_PAD_WIDTH: usize = 10;

/// Relation loaded alongside each row
#[derive(Debug, Clone, PartialEq)]
pub struct EagerLoad {
    pub relation: String,
    /// Columns of the related rows to keep, all when `None`
    pub columns: Option<Vec<String>>,
}

// ============================================================================
// Query
// ============================================================================

/// One read against a table or model
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub table: String,
    /// Model the table belongs to; needed for relation conditions
    pub model: Option<String>,
    pub primary_key: String,
    pub select: Vec<String>,
    /// AND-combined
    pub conditions: Vec<Condition>,
    pub joins: Vec<Join>,
    pub group: Vec<String>,
    pub having: Vec<Condition>,
    pub eager: Vec<EagerLoad>,
    pub order: Vec<OrderKey>,
    pub skip: Option<u64>,
    pub take: Option<u64>,
}

impl Query {
    /// Query a plain table
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            model: None,
            primary_key: default_key(),
            select: Vec::new(),
            conditions: Vec::new(),
            joins: Vec::new(),
            group: Vec::new(),
            having: Vec::new(),
            eager: Vec::new(),
            order: Vec::new(),
            skip: None,
            take: None,
        }
    }

    /// Query a model's table
    pub fn model(model: &ModelInfo) -> Self {
        Self {
            model: Some(model.name.clone()),
            primary_key: model.primary_key.clone(),
            ..Self::table(model.table.clone())
        }
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn where_eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Condition::eq(column, value))
    }

    pub fn where_in(self, column: impl Into<String>, values: Vec<Value>) -> Self {
        self.filter(Condition::is_in(column, values))
    }

    pub fn where_null(self, column: impl Into<String>) -> Self {
        self.filter(Condition::is_null(column))
    }

    pub fn where_has(self, relation: impl Into<String>, condition: Option<Condition>) -> Self {
        self.filter(Condition::has(relation, condition))
    }

    /// OR-combine `conditions` into one AND-ed term; nothing when empty
    pub fn any_of(self, conditions: Vec<Condition>) -> Self {
        if conditions.is_empty() {
            self
        } else {
            self.filter(Condition::Any(conditions))
        }
    }

    pub fn join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, direction: SortDirection) -> Self {
        self.order.push(OrderKey::Column {
            column: column.into(),
            direction,
        });
        self
    }

    pub fn order_by_natural(mut self, column: impl Into<String>, direction: SortDirection) -> Self {
        self.order.push(OrderKey::Natural {
            column: column.into(),
            direction,
        });
        self
    }

    pub fn with(mut self, relation: impl Into<String>, columns: Option<Vec<String>>) -> Self {
        self.eager.push(EagerLoad {
            relation: relation.into(),
            columns,
        });
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn take(mut self, take: u64) -> Self {
        self.take = Some(take);
        self
    }

    /// The same query without ordering and paging, as counted
    pub fn for_count(&self) -> Self {
        Self {
            order: Vec::new(),
            skip: None,
            take: None,
            eager: Vec::new(),
            ..self.clone()
        }
    }
}

// ============================================================================
// QueryEngine
// ============================================================================

/// The external data source a query plan runs against
pub trait QueryEngine {
    /// Model metadata by name
    fn model(&self, name: &str) -> Option<ModelInfo>;

    /// Condition of a named query scope of `model`
    fn scope(&self, model: &str, scope: &str) -> Option<Condition>;

    /// Number of rows the query matches, ignoring paging
    fn count(&self, query: &Query) -> EngineResult<u64>;

    /// Sum of one column over the matched rows
    fn sum(&self, query: &Query, column: &str) -> EngineResult<f64>;

    /// Execute and return the rows
    fn get(&self, query: &Query) -> EngineResult<Vec<Row>>;

    /// One record by primary key
    fn find(&self, query: &Query, id: &Value) -> EngineResult<Option<Row>> {
        let query = Query {
            skip: None,
            take: Some(1),
            ..query.clone()
        }
        .where_eq(query.primary_key.clone(), id.clone());
        Ok(self.get(&query)?.into_iter().next())
    }

    /// Insert a record and return it as stored
    fn create(&mut self, table: &str, primary_key: &str, attributes: Row) -> EngineResult<Row>;

    /// Assign `attributes` on every matched row; returns the number changed
    fn update(&mut self, query: &Query, attributes: &Row) -> EngineResult<u64>;

    fn begin(&mut self) -> EngineResult<()>;
    fn commit(&mut self) -> EngineResult<()>;
    fn rollback(&mut self) -> EngineResult<()>;
}
