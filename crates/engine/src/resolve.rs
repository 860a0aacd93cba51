//! # Source Resolution
//!
//! Turns a stack's [`SourceTarget`] into a [`SourceHandle`]: the table,
//! model and constraints every query against that stack starts from.
//!
//! Relation paths are interpreted one segment at a time against the
//! engine's model metadata. The cursor moves between a model, a single
//! record, a constrained query and a plain value; each step either moves
//! it or fails with a `Resolution` error naming the segment.

use dataobjects_core::{EngineError, EngineResult, Row, path};
use dataobjects_model::{
    ModelPath, PathBase, PathSegment, SegmentKind, SourceTarget, StackSpec, StaticUser,
    UserPermissions, source::CURRENT_USER,
};
use serde_json::Value;
use tracing::debug;

use crate::query::{Condition, ModelInfo, Query, QueryEngine, RelationInfo, RelationKind};

// ============================================================================
// CurrentUser
// ============================================================================

/// The authenticated user: a record of a model plus granted permissions
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentUser {
    pub model: String,
    pub record: Row,
    pub permissions: StaticUser,
}

impl UserPermissions for CurrentUser {
    fn can(&self, permission: &str) -> bool {
        self.permissions.can(permission)
    }
}

// ============================================================================
// SourceHandle
// ============================================================================

/// Queryable starting point of a stack
#[derive(Debug, Clone, PartialEq)]
pub struct SourceHandle {
    pub model: Option<String>,
    pub table: String,
    pub primary_key: String,
    /// Conditions fixed by the path (relation keys, scopes)
    pub constraints: Vec<Condition>,
}

impl SourceHandle {
    /// Handle over a plain table
    pub fn table(table: impl Into<String>, primary_key: impl Into<String>) -> Self {
        Self {
            model: None,
            table: table.into(),
            primary_key: primary_key.into(),
            constraints: Vec::new(),
        }
    }

    /// Unconstrained handle over a model
    pub fn model(model: &ModelInfo) -> Self {
        Self {
            model: Some(model.name.clone()),
            table: model.table.clone(),
            primary_key: model.primary_key.clone(),
            constraints: Vec::new(),
        }
    }

    fn constrain(mut self, condition: Condition) -> Self {
        self.constraints.push(condition);
        self
    }

    /// A fresh query carrying the handle's constraints
    pub fn query(&self) -> Query {
        let mut query = Query::table(self.table.clone());
        query.model = self.model.clone();
        query.primary_key = self.primary_key.clone();
        query.conditions = self.constraints.clone();
        query
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// Resolve a stack into a handle; `None` for manually supplied rows
pub fn resolve_stack(
    alias: &str,
    spec: &StackSpec,
    engine: &dyn QueryEngine,
    user: Option<&CurrentUser>,
) -> EngineResult<Option<SourceHandle>> {
    let handle = match spec.target(alias)? {
        SourceTarget::Manual => None,
        SourceTarget::Table(table) => Some(SourceHandle::table(table, spec.primary_key.clone())),
        SourceTarget::Model(path) => Some(resolve_path(&path, engine, user)?),
    };
    debug!(
        alias,
        table = handle.as_ref().map(|h| h.table.as_str()).unwrap_or("-"),
        "Resolved data source"
    );
    Ok(handle)
}

/// Resolve a parsed `model` string
pub fn resolve_path(
    path: &ModelPath,
    engine: &dyn QueryEngine,
    user: Option<&CurrentUser>,
) -> EngineResult<SourceHandle> {
    match path {
        ModelPath::Model(name) => Ok(SourceHandle::model(&lookup_model(engine, name, name)?)),
        ModelPath::Scopes { model, scopes } => {
            let raw = format!("{model}::{}", scopes.join("::"));
            let info = lookup_model(engine, &raw, model)?;
            let mut handle = SourceHandle::model(&info);
            for scope in scopes {
                let condition = engine.scope(&info.name, scope).ok_or_else(|| {
                    EngineError::resolution(&raw, scope.as_str(), "scope does not exist")
                })?;
                handle = handle.constrain(condition);
            }
            Ok(handle)
        }
        ModelPath::Relation {
            raw,
            base,
            segments,
        } => {
            let walker = PathWalker { raw, engine };
            let mut cursor = walker.start(base, user)?;
            for segment in segments {
                cursor = walker.step(cursor, segment)?;
            }
            walker.finish(cursor)
        }
    }
}

fn lookup_model(engine: &dyn QueryEngine, raw: &str, name: &str) -> EngineResult<ModelInfo> {
    engine
        .model(name)
        .ok_or_else(|| EngineError::resolution(raw, name, "unknown model or service"))
}

/// Where the walk currently stands
#[derive(Debug)]
enum Cursor {
    Model(ModelInfo),
    Record(ModelInfo, Row),
    Query(ModelInfo, SourceHandle),
    Value(Value),
}

struct PathWalker<'a> {
    raw: &'a str,
    engine: &'a dyn QueryEngine,
}

impl PathWalker<'_> {
    fn fail(&self, segment: impl Into<String>, message: impl Into<String>) -> EngineError {
        EngineError::resolution(self.raw, segment, message)
    }

    fn start(&self, base: &PathBase, user: Option<&CurrentUser>) -> EngineResult<Cursor> {
        match base {
            PathBase::Model(name) => Ok(Cursor::Model(lookup_model(self.engine, self.raw, name)?)),
            PathBase::CurrentUser => {
                let user = user.ok_or_else(|| self.fail(CURRENT_USER, "no authenticated user"))?;
                let info = lookup_model(self.engine, self.raw, &user.model)?;
                Ok(Cursor::Record(info, user.record.clone()))
            }
        }
    }

    fn step(&self, cursor: Cursor, segment: &PathSegment) -> EngineResult<Cursor> {
        let name = segment.name.as_str();
        match (cursor, segment.kind) {
            (Cursor::Model(info), SegmentKind::Call) => {
                let scope = self
                    .engine
                    .scope(&info.name, name)
                    .ok_or_else(|| self.fail(segment.to_string(), "method does not exist"))?;
                let handle = SourceHandle::model(&info).constrain(scope);
                Ok(Cursor::Query(info, handle))
            }
            (Cursor::Record(info, row), kind) => match info.relation(name) {
                Some(relation) => {
                    let (related, handle) = self.related(&info, relation, &row, segment)?;
                    if kind == SegmentKind::Attr && relation.kind.is_to_one() {
                        let record = self
                            .engine
                            .get(&handle.query().take(1))?
                            .into_iter()
                            .next()
                            .ok_or_else(|| self.fail(segment.to_string(), "related record is missing"))?;
                        Ok(Cursor::Record(related, record))
                    } else {
                        Ok(Cursor::Query(related, handle))
                    }
                }
                None if kind == SegmentKind::Attr => row
                    .get(name)
                    .cloned()
                    .map(Cursor::Value)
                    .ok_or_else(|| self.fail(segment.to_string(), "attribute does not exist")),
                None => Err(self.fail(segment.to_string(), "method does not exist")),
            },
            (Cursor::Query(info, handle), SegmentKind::Call) => {
                let scope = self
                    .engine
                    .scope(&info.name, name)
                    .ok_or_else(|| self.fail(segment.to_string(), "method does not exist"))?;
                Ok(Cursor::Query(info, handle.constrain(scope)))
            }
            (Cursor::Model(_) | Cursor::Query(..), SegmentKind::Attr) => Err(self.fail(
                segment.to_string(),
                "attribute access needs a single record",
            )),
            (Cursor::Value(_), _) => Err(self.fail(
                segment.to_string(),
                "cannot continue past a plain value",
            )),
        }
    }

    /// Handle over the records related to `row`
    fn related(
        &self,
        info: &ModelInfo,
        relation: &RelationInfo,
        row: &Row,
        segment: &PathSegment,
    ) -> EngineResult<(ModelInfo, SourceHandle)> {
        let related = lookup_model(self.engine, self.raw, &relation.related)?;
        let key = |column: &str| {
            row.get(column)
                .cloned()
                .ok_or_else(|| self.fail(segment.to_string(), format!("'{}' has no column '{column}'", info.name)))
        };
        let condition = match relation.kind {
            RelationKind::BelongsTo => {
                Condition::eq(relation.owner_key.clone(), key(&relation.foreign_key)?)
            }
            RelationKind::HasOne | RelationKind::HasMany => {
                Condition::eq(relation.foreign_key.clone(), key(&relation.owner_key)?)
            }
            RelationKind::BelongsToMany => {
                let pivot = relation
                    .pivot
                    .as_ref()
                    .ok_or_else(|| self.fail(segment.to_string(), "relation has no pivot table"))?;
                let owner = key(&relation.owner_key)?;
                let ids = self
                    .engine
                    .get(&Query::table(pivot.table.clone()).where_eq(pivot.foreign_pivot_key.clone(), owner))?
                    .into_iter()
                    .filter_map(|mut p| p.remove(&pivot.related_pivot_key))
                    .collect();
                Condition::is_in(related.primary_key.clone(), ids)
            }
        };
        let handle = SourceHandle::model(&related).constrain(condition);
        Ok((related, handle))
    }

    fn finish(&self, cursor: Cursor) -> EngineResult<SourceHandle> {
        match cursor {
            Cursor::Model(info) => Ok(SourceHandle::model(&info)),
            Cursor::Query(_, handle) => Ok(handle),
            Cursor::Record(info, row) => {
                let id = row.get(&info.primary_key).cloned().ok_or_else(|| {
                    self.fail(info.name.as_str(), "record has no primary key value")
                })?;
                Ok(SourceHandle::model(&info).constrain(Condition::eq(info.primary_key.clone(), id)))
            }
            Cursor::Value(value) => Err(self.fail(
                path::display(&value),
                "path ends in a value, not a queryable source",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::tests::fixture;
    use dataobjects_model::ModelPath;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn user(id: i64) -> CurrentUser {
        let engine = fixture();
        let record = engine
            .find(&Query::model(&engine.model("User").unwrap()), &json!(id))
            .unwrap()
            .unwrap();
        CurrentUser {
            model: "User".into(),
            record,
            permissions: StaticUser::default(),
        }
    }

    fn resolve(raw: &str, user: Option<&CurrentUser>) -> EngineResult<SourceHandle> {
        resolve_path(&ModelPath::parse(raw).unwrap(), &fixture(), user)
    }

    fn names(handle: &SourceHandle) -> Vec<String> {
        fixture()
            .get(&handle.query())
            .unwrap()
            .iter()
            .map(|r| path::display(&r["name"]))
            .collect()
    }

    #[test]
    fn test_plain_model_and_table() {
        let handle = resolve("User", None).unwrap();
        assert_eq!(handle.table, "users");
        assert!(handle.constraints.is_empty());

        let handle = resolve_stack("t", &StackSpec::table("teams"), &fixture(), None)
            .unwrap()
            .unwrap();
        assert_eq!(handle.table, "teams");
        assert_eq!(handle.model, None);
    }

    #[test]
    fn test_scope_chain() {
        let handle = resolve("User::active()::get()", None).unwrap();
        assert_eq!(handle.constraints.len(), 1);
        assert_eq!(names(&handle), vec!["Ann", "Cleo", "Dan"]);

        let err = resolve("User::archived()", None).unwrap_err();
        assert!(err.is_resolution());
    }

    #[test]
    fn test_current_user_relation_path() {
        let ann = user(1);
        let handle = resolve("Auth::user()->roles()", Some(&ann)).unwrap();
        assert_eq!(handle.table, "roles");
        let labels: Vec<Value> = fixture()
            .get(&handle.query())
            .unwrap()
            .into_iter()
            .map(|r| r["label"].clone())
            .collect();
        assert_eq!(labels, vec![json!("admin"), json!("editor")]);

        let err = resolve("Auth::user()->roles()", None).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot resolve 'Auth::user()' in path 'Auth::user()->roles()': no authenticated user"
        );
    }

    #[test]
    fn test_to_one_attribute_then_to_many_call() {
        let ann = user(1);
        let handle = resolve("Auth::user()->team->members()", Some(&ann)).unwrap();
        assert_eq!(names(&handle), vec!["Ann", "Cleo"]);

        let handle = resolve("Auth::user()->team", Some(&ann)).unwrap();
        assert_eq!(handle.table, "teams");
        assert_eq!(fixture().count(&handle.query()).unwrap(), 1);
    }

    #[test]
    fn test_missing_segments_name_the_segment() {
        let ann = user(1);
        let err = resolve("Auth::user()->friends()", Some(&ann)).unwrap_err();
        match err {
            EngineError::Resolution { segment, .. } => assert_eq!(segment, "friends()"),
            other => panic!("unexpected error {other}"),
        }

        let err = resolve("Auth::user()->name", Some(&ann)).unwrap_err();
        assert!(err.to_string().contains("path ends in a value"));

        let err = resolve("Auth::user()->nickname", Some(&ann)).unwrap_err();
        assert!(err.to_string().contains("attribute does not exist"));

        let err = resolve("Ghost->team()", None).unwrap_err();
        assert!(err.is_resolution());
    }
}
