//! # Form Save
//!
//! Validates a submitted payload field by field and writes it back. Every
//! writable field either targets a column of the form's own record or a
//! column of a related record, grouped by relation name.
//!
//! Validation failures never abort the pass; they accumulate in a
//! [`ValidationReport`] and a report with any message means nothing is
//! written. The writes themselves run in one transaction.

use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHasher};
use dataobjects_core::{ContentType, EngineError, EngineResult, FieldType, Row, path};
use dataobjects_model::{FieldDescriptor, FieldRegistry, PasswordVerdict, SourceRef, ValidationReport, check_password};
use indexmap::IndexMap;
use rand::rngs::OsRng;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::format::{parse_temporal, storage_format};
use crate::query::{ModelInfo, Query, QueryEngine, RelationKind};
use crate::resolve::SourceHandle;

// ============================================================================
// Input coercion
// ============================================================================

/// Validate and coerce one submitted value.
///
/// `Ok(None)` means the field is left untouched (an empty password on a
/// field that allows null). `Err` carries the field message.
pub fn validate_field_input(field: &FieldDescriptor, raw: &Value) -> Result<Option<Value>, String> {
    let props = field.form_props();
    let blank = path::is_blank(raw);

    if blank && props.is_some_and(|p| p.required) {
        return Err(format!("Field '{}' is required", field.name));
    }

    if field.content_type == ContentType::Password
        && matches!(field.field_type, FieldType::Text | FieldType::Textarea)
    {
        return password_input(field, raw);
    }

    let value = match &field.field_type {
        FieldType::Select | FieldType::Radio => {
            if blank {
                Value::Null
            } else {
                select_member(field, raw)?
            }
        }
        FieldType::Multiselect => match raw {
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| select_member(field, item))
                    .collect::<Result<_, _>>()?,
            ),
            _ if blank => Value::Array(Vec::new()),
            other => Value::Array(vec![select_member(field, other)?]),
        },
        FieldType::Int => {
            if blank {
                Value::Null
            } else {
                let number = as_integer(raw)
                    .ok_or_else(|| format!("Field '{}' must be a whole number", field.name))?;
                if let Some(rules) = field.rules() {
                    rules
                        .check_range(number as f64)
                        .map_err(|reason| format!("Field '{}' {reason}", field.name))?;
                }
                Value::from(number)
            }
        }
        FieldType::Date | FieldType::DateTime | FieldType::Time => {
            if blank {
                Value::Null
            } else {
                let format = storage_format(&field.field_type).unwrap_or("%Y-%m-%d");
                let parsed = parse_temporal(&path::display(raw))
                    .ok_or_else(|| format!("Field '{}' is not a valid date", field.name))?;
                Value::String(parsed.format(format).to_string())
            }
        }
        FieldType::Boolean | FieldType::Checkbox => Value::from(u8::from(path::truthy(raw))),
        _ => text_input(field, raw)?,
    };
    Ok(Some(value))
}

/// The option a select value names; integer-keyed options also match
/// numeric spellings like `"01"`
fn select_member(field: &FieldDescriptor, raw: &Value) -> Result<Value, String> {
    let key = path::display(raw);
    let found = field.option(&key).or_else(|| {
        let number = as_integer(raw)?;
        field.option(&number.to_string())
    });
    match found {
        Some(option) => Ok(option.value.clone()),
        None => Err(format!("Selected value in field '{}' is invalid", field.name)),
    }
}

fn text_input(field: &FieldDescriptor, raw: &Value) -> Result<Value, String> {
    if path::is_blank(raw) {
        let allow_null = field.rules().is_none_or(|r| r.allow_null);
        return Ok(if allow_null { Value::Null } else { Value::String(String::new()) });
    }
    let text = path::display(raw);
    if let Some(rules) = field.rules() {
        let length = text.chars().count();
        if let Some(min) = rules.min_length
            && length < min
        {
            return Err(format!("Field '{}' must be at least {min} characters long", field.name));
        }
        if let Some(max) = rules.max_length
            && length > max
        {
            return Err(format!("Field '{}' must be at most {max} characters long", field.name));
        }
    }
    if let Some(pattern) = field.form_props().and_then(|p| p.pattern.as_deref()).filter(|p| !p.is_empty()) {
        let regex = Regex::new(&format!("^(?:{pattern})$"))
            .map_err(|e| format!("Field '{}' has an invalid pattern: {e}", field.name))?;
        if !regex.is_match(&text) {
            return Err(format!("Field '{}' does not match the expected format", field.name));
        }
    }
    Ok(raw.clone())
}

fn password_input(field: &FieldDescriptor, raw: &Value) -> Result<Option<Value>, String> {
    let rules = field.rules().cloned().unwrap_or_default();
    let password = raw.as_str();
    match check_password(&rules, password) {
        PasswordVerdict::Empty => Ok(None),
        PasswordVerdict::Failed { reason, .. } => Err(format!("Password {reason}")),
        PasswordVerdict::Passed { score } => {
            debug!(field = %field.id, score, "Password accepted");
            hash_password(password.unwrap_or_default())
                .map(|hash| Some(Value::String(hash)))
                .map_err(|e| format!("Field '{}' could not be stored: {e}", field.name))
        }
    }
}

/// Argon2 PHC string of `password` with a random salt
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

// ============================================================================
// Write targets
// ============================================================================

/// Validated payload, split by write target
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SavePlan {
    /// Columns of the form's own record
    pub direct: Row,
    /// `relation -> columns` of related records
    pub relations: IndexMap<String, Row>,
    pub report: ValidationReport,
}

impl SavePlan {
    /// Validate `payload` against the writable fields of `registry`.
    ///
    /// Fields absent from the payload are not touched.
    pub fn build(registry: &FieldRegistry, payload: &Row) -> Self {
        let mut plan = Self::default();
        for field in registry.user_fields() {
            if field.skipped_on_save() {
                continue;
            }
            let Some(raw) = payload.get(&field.id) else {
                continue;
            };
            let value = match validate_field_input(field, raw) {
                Ok(Some(value)) => value,
                Ok(None) => continue,
                Err(message) => {
                    plan.report.add_field_error(&field.id, message);
                    continue;
                }
            };
            let targets: Vec<&SourceRef> = field.sources().iter().filter(|s| !s.is_separator()).collect();
            match targets.as_slice() {
                [] => {
                    plan.direct.insert(field.id.clone(), value);
                }
                [SourceRef::Relation {
                    relation, column, ..
                }] => {
                    plan.relations
                        .entry(relation.clone())
                        .or_default()
                        .insert(column.clone(), value);
                }
                [single] => {
                    let column = single.direct_column().unwrap_or(&field.id);
                    plan.direct.insert(column.to_string(), value);
                }
                _ => debug!(field = %field.id, "Field concatenates several sources, not written"),
            }
        }
        plan
    }

    pub fn is_empty(&self) -> bool {
        self.direct.is_empty() && self.relations.is_empty()
    }
}

/// Outcome of a save
#[derive(Debug, Clone, PartialEq)]
pub struct SaveResult {
    pub report: ValidationReport,
    /// The stored record, when anything was written
    pub record: Option<Row>,
}

impl SaveResult {
    pub fn success(&self) -> bool {
        self.report.is_valid() && self.record.is_some()
    }
}

// ============================================================================
// FormSaver
// ============================================================================

/// Writes validated form input through a query engine
pub struct FormSaver<'a> {
    pub engine: &'a mut dyn QueryEngine,
    pub registry: &'a FieldRegistry,
    pub handle: &'a SourceHandle,
}

impl<'a> FormSaver<'a> {
    /// Validate `payload` and write it to the record `data_set_id` names,
    /// creating the record when there is none.
    ///
    /// Validation failures come back in the report with nothing written;
    /// engine failures roll the transaction back and are returned.
    pub fn save(&mut self, data_set_id: Option<&Value>, payload: &Row) -> EngineResult<SaveResult> {
        let plan = SavePlan::build(self.registry, payload);
        if !plan.report.is_valid() {
            info!(
                object_id = %self.registry.object_id(),
                errors = plan.report.error_messages.len(),
                "Form input rejected"
            );
            return Ok(SaveResult {
                report: plan.report,
                record: None,
            });
        }

        self.engine.begin()?;
        match self.write(data_set_id, &plan) {
            Ok(record) => {
                self.engine.commit()?;
                info!(object_id = %self.registry.object_id(), table = %self.handle.table, "Saved form");
                Ok(SaveResult {
                    report: plan.report,
                    record: Some(record),
                })
            }
            Err(err) => {
                if let Err(rollback) = self.engine.rollback() {
                    warn!(error = %rollback, "Rollback failed");
                }
                Err(err)
            }
        }
    }

    fn write(&mut self, data_set_id: Option<&Value>, plan: &SavePlan) -> EngineResult<Row> {
        let pk = self.handle.primary_key.clone();
        let existing = match data_set_id.filter(|id| !path::is_blank(id)) {
            Some(id) => self.engine.find(&self.handle.query(), id)?,
            None => None,
        };

        let mut record = match existing {
            Some(mut record) => {
                if !plan.direct.is_empty() {
                    let id = record.get(&pk).cloned().unwrap_or(Value::Null);
                    self.engine
                        .update(&self.handle.query().where_eq(pk.clone(), id), &plan.direct)?;
                }
                record.extend(plan.direct.clone());
                record
            }
            None => self
                .engine
                .create(&self.handle.table, &pk, plan.direct.clone())?,
        };

        if plan.relations.is_empty() {
            return Ok(record);
        }
        let model = self.owner_model()?;
        for (relation, columns) in &plan.relations {
            self.write_relation(&model, relation, columns, &mut record)?;
        }
        Ok(record)
    }

    fn owner_model(&self) -> EngineResult<ModelInfo> {
        let name = self.handle.model.as_deref().ok_or_else(|| {
            EngineError::data_source(format!(
                "relation fields of '{}' need a model-backed source",
                self.registry.object_id()
            ))
        })?;
        self.engine
            .model(name)
            .ok_or_else(|| EngineError::UnknownModel(name.to_string()))
    }

    /// Fetch-or-create the related record and assign `columns`
    fn write_relation(
        &mut self,
        owner: &ModelInfo,
        relation: &str,
        columns: &Row,
        record: &mut Row,
    ) -> EngineResult<()> {
        let (name, info) = owner.find_relation(relation).ok_or_else(|| {
            EngineError::data_source(format!(
                "relation '{relation}' is not defined on model '{}'",
                owner.name
            ))
        })?;
        let related = self
            .engine
            .model(&info.related)
            .ok_or_else(|| EngineError::UnknownModel(info.related.clone()))?;

        match info.kind {
            RelationKind::HasOne | RelationKind::HasMany => {
                let owner_value = record.get(&info.owner_key).cloned().unwrap_or(Value::Null);
                let scope = Query::model(&related)
                    .where_eq(info.foreign_key.clone(), owner_value.clone())
                    .take(1);
                match self.engine.get(&scope)?.into_iter().next() {
                    Some(existing) => {
                        let id = existing.get(&related.primary_key).cloned().unwrap_or(Value::Null);
                        self.engine
                            .update(&Query::model(&related).where_eq(related.primary_key.clone(), id), columns)?;
                    }
                    None => {
                        let mut attributes = columns.clone();
                        attributes.insert(info.foreign_key.clone(), owner_value);
                        self.engine.create(&related.table, &related.primary_key, attributes)?;
                    }
                }
            }
            RelationKind::BelongsTo => {
                let key = record.get(&info.foreign_key).cloned().unwrap_or(Value::Null);
                if key.is_null() {
                    let created = self
                        .engine
                        .create(&related.table, &related.primary_key, columns.clone())?;
                    let new_key = created.get(&info.owner_key).cloned().unwrap_or(Value::Null);
                    let pk = self.handle.primary_key.clone();
                    let id = record.get(&pk).cloned().unwrap_or(Value::Null);
                    let mut link = Row::new();
                    link.insert(info.foreign_key.clone(), new_key.clone());
                    self.engine.update(&self.handle.query().where_eq(pk, id), &link)?;
                    record.insert(info.foreign_key.clone(), new_key);
                } else {
                    self.engine
                        .update(&Query::model(&related).where_eq(info.owner_key.clone(), key), columns)?;
                }
            }
            RelationKind::BelongsToMany => {
                return Err(EngineError::data_source(format!(
                    "cannot write through many-to-many relation '{name}'"
                )));
            }
        }
        debug!(relation = name, columns = columns.len(), "Saved related record");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
