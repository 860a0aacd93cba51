//! SQL rendering of query plans
//!
//! Renders a [`Query`] to a `?`-parameterised statement for a MySQL-style
//! backend. Relation conditions become `EXISTS` subqueries built from the
//! engine's relation metadata.

use dataobjects_core::{EngineError, EngineResult, SortDirection};
use serde_json::Value;

use crate::query::{
    Condition, JoinKind, ModelInfo, NATURAL_PAD_WIDTH, OrderKey, Query, QueryEngine, RelationKind,
};

/// A statement and its positional bindings
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub sql: String,
    pub bindings: Vec<Value>,
}

/// `SELECT ...` for the rows of `query`
pub fn select(query: &Query, engine: &dyn QueryEngine) -> EngineResult<SqlStatement> {
    let mut bindings = Vec::new();
    let columns = if query.select.is_empty() {
        format!("{}.*", quote(&query.table))
    } else {
        query
            .select
            .iter()
            .map(|c| quote(c))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let mut sql = format!("SELECT {columns} FROM {}", quote(&query.table));
    push_body(&mut sql, &mut bindings, query, engine)?;

    if !query.order.is_empty() {
        let keys: Vec<String> = query.order.iter().map(order_key).collect();
        sql.push_str(&format!(" ORDER BY {}", keys.join(", ")));
    }
    if let Some(take) = query.take {
        sql.push_str(&format!(" LIMIT {take}"));
    }
    if let Some(skip) = query.skip.filter(|s| *s > 0) {
        if query.take.is_none() {
            sql.push_str(" LIMIT 18446744073709551615");
        }
        sql.push_str(&format!(" OFFSET {skip}"));
    }
    Ok(SqlStatement { sql, bindings })
}

/// `SELECT COUNT(*)` over the rows of `query`, ignoring order and paging
pub fn count(query: &Query, engine: &dyn QueryEngine) -> EngineResult<SqlStatement> {
    aggregate(query, engine, "COUNT(*)")
}

/// `SELECT SUM(column)` over the rows of `query`
pub fn sum(query: &Query, column: &str, engine: &dyn QueryEngine) -> EngineResult<SqlStatement> {
    aggregate(query, engine, &format!("SUM({})", quote(column)))
}

fn aggregate(query: &Query, engine: &dyn QueryEngine, expr: &str) -> EngineResult<SqlStatement> {
    let mut bindings = Vec::new();
    let mut sql = format!("SELECT {expr} AS aggregate FROM {}", quote(&query.table));
    push_body(&mut sql, &mut bindings, query, engine)?;
    Ok(SqlStatement { sql, bindings })
}

/// Joins, `WHERE`, `GROUP BY` and `HAVING`
fn push_body(
    sql: &mut String,
    bindings: &mut Vec<Value>,
    query: &Query,
    engine: &dyn QueryEngine,
) -> EngineResult<()> {
    for join in &query.joins {
        let keyword = match join.kind {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
        };
        let table = match &join.alias {
            Some(alias) => format!("{} AS {}", quote(&join.table), quote(alias)),
            None => quote(&join.table),
        };
        sql.push_str(&format!(
            " {keyword} {table} ON {} = {}",
            quote(&join.first),
            quote(&join.second)
        ));
    }

    let model = query.model.as_deref().and_then(|m| engine.model(m));
    if !query.conditions.is_empty() {
        let clause = render_all(&query.conditions, &query.table, model.as_ref(), engine, bindings)?;
        sql.push_str(&format!(" WHERE {clause}"));
    }
    if !query.group.is_empty() {
        let group: Vec<String> = query.group.iter().map(|c| quote(c)).collect();
        sql.push_str(&format!(" GROUP BY {}", group.join(", ")));
    }
    if !query.having.is_empty() {
        let clause = render_all(&query.having, &query.table, model.as_ref(), engine, bindings)?;
        sql.push_str(&format!(" HAVING {clause}"));
    }
    Ok(())
}

fn render_all(
    conditions: &[Condition],
    table: &str,
    model: Option<&ModelInfo>,
    engine: &dyn QueryEngine,
    bindings: &mut Vec<Value>,
) -> EngineResult<String> {
    let parts = conditions
        .iter()
        .map(|c| render(c, table, model, engine, bindings))
        .collect::<EngineResult<Vec<_>>>()?;
    Ok(parts.join(" AND "))
}

fn render(
    condition: &Condition,
    table: &str,
    model: Option<&ModelInfo>,
    engine: &dyn QueryEngine,
    bindings: &mut Vec<Value>,
) -> EngineResult<String> {
    Ok(match condition {
        Condition::Compare { column, op, value } => {
            bindings.push(value.clone());
            format!("{} {} ?", quote(column), op.as_sql())
        }
        Condition::In { values, .. } if values.is_empty() => "0 = 1".to_string(),
        Condition::In { column, values } => {
            bindings.extend(values.iter().cloned());
            let marks = vec!["?"; values.len()].join(", ");
            format!("{} IN ({marks})", quote(column))
        }
        Condition::IsNull { column } => format!("{} IS NULL", quote(column)),
        Condition::All(conditions) if conditions.is_empty() => "1 = 1".to_string(),
        Condition::All(conditions) => {
            format!("({})", render_all(conditions, table, model, engine, bindings)?)
        }
        Condition::Any(conditions) if conditions.is_empty() => "0 = 1".to_string(),
        Condition::Any(conditions) => {
            let parts = conditions
                .iter()
                .map(|c| render(c, table, model, engine, bindings))
                .collect::<EngineResult<Vec<_>>>()?;
            format!("({})", parts.join(" OR "))
        }
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
            let related = engine
                .model(&info.related)
                .ok_or_else(|| EngineError::UnknownModel(info.related.clone()))?;
            let rt = &related.table;

            let (from, link) = match info.kind {
                RelationKind::BelongsTo => (
                    quote(rt),
                    format!(
                        "{} = {}",
                        quote(&format!("{rt}.{}", info.owner_key)),
                        quote(&format!("{table}.{}", info.foreign_key))
                    ),
                ),
                RelationKind::HasOne | RelationKind::HasMany => (
                    quote(rt),
                    format!(
                        "{} = {}",
                        quote(&format!("{rt}.{}", info.foreign_key)),
                        quote(&format!("{table}.{}", info.owner_key))
                    ),
                ),
                RelationKind::BelongsToMany => {
                    let pivot = info.pivot.as_ref().ok_or_else(|| {
                        EngineError::query(format!(
                            "many-to-many relation '{relation}' has no pivot table"
                        ))
                    })?;
                    let pt = &pivot.table;
                    (
                        format!(
                            "{} INNER JOIN {} ON {} = {}",
                            quote(rt),
                            quote(pt),
                            quote(&format!("{pt}.{}", pivot.related_pivot_key)),
                            quote(&format!("{rt}.{}", related.primary_key))
                        ),
                        format!(
                            "{} = {}",
                            quote(&format!("{pt}.{}", pivot.foreign_pivot_key)),
                            quote(&format!("{table}.{}", info.owner_key))
                        ),
                    )
                }
            };
            let mut sql = format!("EXISTS (SELECT * FROM {from} WHERE {link}");
            if let Some(inner) = condition {
                let inner = render(inner, rt, Some(&related), engine, bindings)?;
                sql.push_str(&format!(" AND {inner}"));
            }
            sql.push(')');
            sql
        }
    })
}

fn order_key(key: &OrderKey) -> String {
    match key {
        OrderKey::Column { column, direction } => format!("{} {}", quote(column), direction.as_sql()),
        OrderKey::Natural { column, direction } => natural_order(column, *direction),
    }
}

/// Blank values last, digit-only values zero-padded, others by text
pub fn natural_order(column: &str, direction: SortDirection) -> String {
    let col = quote(column);
    format!(
        "CASE WHEN {col} IS NULL OR {col} = '' THEN 1 ELSE 0 END, \
         CASE WHEN {col} REGEXP '^[0-9]+$' THEN LPAD({col}, {NATURAL_PAD_WIDTH}, '0') ELSE {col} END {}",
        direction.as_sql()
    )
}

/// Backtick-quote an identifier, segment by segment
fn quote(identifier: &str) -> String {
    identifier
        .split('.')
        .map(|part| {
            if part == "*" {
                part.to_string()
            } else {
                format!("`{}`", part.replace('`', "``"))
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::tests::fixture;
    use crate::query::{Condition, Join};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_select_with_search_and_paging() {
        let engine = fixture();
        let query = Query::model(&engine.model("User").unwrap())
            .where_eq("team_id", 1)
            .any_of(vec![
                Condition::contains("name", "an"),
                Condition::is_in("active", vec![json!("1"), json!("0")]),
            ])
            .order_by("name", SortDirection::Desc)
            .skip(25)
            .take(25);

        let statement = select(&query, &engine).unwrap();
        assert_eq!(
            statement.sql,
            "SELECT `users`.* FROM `users` WHERE `team_id` = ? AND (`name` LIKE ? OR `active` IN (?, ?)) \
             ORDER BY `name` DESC LIMIT 25 OFFSET 25"
        );
        assert_eq!(
            statement.bindings,
            vec![json!(1), json!("%an%"), json!("1"), json!("0")]
        );
    }

    #[test]
    fn test_exists_subqueries() {
        let engine = fixture();
        let query = Query::model(&engine.model("User").unwrap())
            .where_has("roles", Some(Condition::is_in("label", vec![json!("admin")])))
            .where_has("team", None);
        let statement = count(&query, &engine).unwrap();
        assert_eq!(
            statement.sql,
            "SELECT COUNT(*) AS aggregate FROM `users` WHERE \
             EXISTS (SELECT * FROM `roles` INNER JOIN `role_user` ON `role_user`.`role_id` = `roles`.`id` \
             WHERE `role_user`.`user_id` = `users`.`id` AND `label` IN (?)) AND \
             EXISTS (SELECT * FROM `teams` WHERE `teams`.`id` = `users`.`team_id`)"
        );
    }

    #[test]
    fn test_natural_order_and_join() {
        let engine = fixture();
        let query = Query::model(&engine.model("User").unwrap())
            .join(Join {
                kind: JoinKind::Left,
                table: "teams".into(),
                alias: Some("teams_ab12cd34".into()),
                first: "users.team_id".into(),
                second: "teams_ab12cd34.id".into(),
            })
            .order_by_natural("teams_ab12cd34.title", SortDirection::Asc);
        let statement = select(&query, &engine).unwrap();
        assert!(statement.sql.contains(
            "LEFT JOIN `teams` AS `teams_ab12cd34` ON `users`.`team_id` = `teams_ab12cd34`.`id`"
        ));
        assert!(statement.sql.ends_with(
            "ORDER BY CASE WHEN `teams_ab12cd34`.`title` IS NULL OR `teams_ab12cd34`.`title` = '' THEN 1 ELSE 0 END, \
             CASE WHEN `teams_ab12cd34`.`title` REGEXP '^[0-9]+$' THEN LPAD(`teams_ab12cd34`.`title`, 10, '0') \
             ELSE `teams_ab12cd34`.`title` END ASC"
        ));
    }

    #[test]
    fn test_empty_in_and_sum() {
        let engine = fixture();
        let query = Query::table("teams").where_in("id", vec![]);
        assert_eq!(
            sum(&query, "id", &engine).unwrap().sql,
            "SELECT SUM(`id`) AS aggregate FROM `teams` WHERE 0 = 1"
        );
    }
}
