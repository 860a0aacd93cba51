//! # Data Objects
//!
//! A built list or form object: identity, property bags, field registry,
//! data sources, menu, cached results and messages. Both kinds share one
//! struct; what only one kind carries lives in [`ObjectState`].
//!
//! Query operations borrow the engine per call, so one engine can serve
//! every object of a context.

use dataobjects_core::{
    EngineError, EngineResult, ObjectKind, PropertyAccess, Row, Validatable, path,
};
use dataobjects_model::{
    FieldRegistry, MenuStack, NormalizedConfig, ObjectProperties, PropertyBag, SourceDescriptor,
    SourceRef, StackSpec, UserPermissions, ValidationReport,
};
use serde_json::Value;
use tracing::{debug, info};

use crate::builder::{PageBuilder, PageRequest, PageResult, qualify};
use crate::mapper::RowMapper;
use crate::query::QueryEngine;
use crate::render::RenderRegistry;
use crate::resolve::{CurrentUser, SourceHandle, resolve_stack};
use crate::results::ResultStack;
use crate::save::{FormSaver, SaveResult};

/// Result alias of rows handed to an object directly
pub const MANUAL_ALIAS: &str = "manual";

/// Kind-specific object state
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectState {
    List,
    Form {
        /// Primary key of the record the form edits
        data_set_id: Option<Value>,
    },
}

#[derive(Debug, Clone)]
pub struct DataObject {
    pub object: ObjectProperties,
    /// `listProperties` or `formProperties`
    pub properties: PropertyBag,
    /// `dataTableProperties`, lists only
    pub data_table: Option<PropertyBag>,
    pub registry: FieldRegistry,
    pub source: SourceDescriptor,
    pub menu: MenuStack,
    results: ResultStack,
    messages: ValidationReport,
    state: ObjectState,
}

impl DataObject {
    /// Build an object from resolved configuration.
    ///
    /// Render functions run against `context`; a stack naming neither a
    /// model, a table nor a source type fails here.
    pub fn from_config(
        mut config: NormalizedConfig,
        renderers: &RenderRegistry,
        context: &Row,
    ) -> EngineResult<Self> {
        let mut registry = config.build_registry()?;
        renderers.process(&mut registry, context)?;

        let source = SourceDescriptor::read_config(&config.data_source)?;
        source.validate()?;
        let menu = MenuStack::from_config(&config.menu)?;

        let state = match config.kind() {
            ObjectKind::List => ObjectState::List,
            ObjectKind::Form => ObjectState::Form { data_set_id: None },
        };

        Ok(Self {
            object: config.object,
            properties: config.properties,
            data_table: config.data_table,
            registry,
            source,
            menu,
            results: ResultStack::new(),
            messages: ValidationReport::new(),
            state,
        })
    }

    pub fn object_id(&self) -> &str {
        &self.object.object_id
    }

    pub fn kind(&self) -> ObjectKind {
        self.object.object_type
    }

    pub fn state(&self) -> &ObjectState {
        &self.state
    }

    pub fn results(&self) -> &ResultStack {
        &self.results
    }

    // ------------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------------

    /// Dotted-path read across `objectProperties`, the kind's bag and
    /// `dataTableProperties`, in that order
    pub fn object_property(&self, key: &str) -> Option<Value> {
        self.object
            .get_path(key)
            .or_else(|| self.properties.get_path(key))
            .or_else(|| self.data_table.as_ref().and_then(|bag| bag.get_path(key)))
    }

    /// Assign a property in whichever container knows `key`
    pub fn set_object_property(&mut self, key: &str, value: Value) -> EngineResult<()> {
        if matches!(key, "objectID" | "objectType") {
            return Err(EngineError::invalid_property(
                self.object.container_name(),
                key,
                "fixed after creation",
            ));
        }
        if self.object.has_property(key) {
            return self.object.set_property(key, value);
        }
        if self.properties.has_property(key) {
            return self.properties.set_property(key, value);
        }
        match self.data_table.as_mut() {
            Some(bag) if bag.has_property(key) => bag.set_property(key, value),
            _ => Err(EngineError::invalid_property(
                self.properties.container_name(),
                key,
                "unknown key",
            )),
        }
    }

    pub fn field_property(&self, field_id: &str, key: &str) -> EngineResult<Value> {
        self.registry.field_property(field_id, key)
    }

    pub fn set_field_property(&mut self, field_id: &str, key: &str, value: Value) -> EngineResult<()> {
        self.registry.set_field_property(field_id, key, value)
    }

    /// Everything a presentation layer needs to draw the object
    pub fn descriptor(&self, user: Option<&dyn UserPermissions>) -> EngineResult<Value> {
        let mut descriptor = serde_json::Map::new();
        descriptor.insert("objectProperties".into(), Value::Object(self.object.to_map()));
        descriptor.insert(
            self.kind().properties_key().into(),
            Value::Object(self.properties.to_map()),
        );
        if let Some(bag) = &self.data_table {
            descriptor.insert("dataTableProperties".into(), Value::Object(bag.to_map()));
        }
        descriptor.insert("menu".into(), serde_json::to_value(self.menu.visible(user))?);
        descriptor.insert("fields".into(), serde_json::to_value(self.registry.to_maps())?);
        Ok(Value::Object(descriptor))
    }

    // ------------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------------

    /// Attach a message to a field
    pub fn set_message(&mut self, field_id: &str, message: impl Into<String>) -> EngineResult<()> {
        self.registry.get(field_id)?;
        self.messages
            .field_messages
            .entry(field_id.to_string())
            .or_default()
            .push(message.into());
        Ok(())
    }

    pub fn messages(&self, field_id: &str) -> &[String] {
        self.messages.messages_for(field_id)
    }

    pub fn set_error_message(&mut self, message: impl Into<String>) {
        self.messages.add_error(message);
    }

    pub fn error_messages(&self) -> &[String] {
        &self.messages.error_messages
    }

    // ------------------------------------------------------------------------
    // Sources
    // ------------------------------------------------------------------------

    /// The primary stack and its resolved handle
    fn primary_handle(
        &self,
        engine: &dyn QueryEngine,
        user: Option<&CurrentUser>,
    ) -> EngineResult<(&str, &StackSpec, SourceHandle)> {
        let (alias, spec) = self.source.primary().ok_or_else(|| {
            EngineError::data_source(format!("object '{}' has no data source", self.object_id()))
        })?;
        let handle = resolve_stack(alias, spec, engine, user)?.ok_or_else(|| {
            EngineError::data_source(format!("data source '{alias}' is supplied manually"))
        })?;
        Ok((alias, spec, handle))
    }

    fn page_builder<'a>(
        &'a self,
        engine: &'a dyn QueryEngine,
        user: Option<&'a CurrentUser>,
    ) -> PageBuilder<'a> {
        PageBuilder {
            engine,
            registry: &self.registry,
            source: &self.source,
            properties: &self.properties,
            data_table: self.data_table.as_ref(),
            user,
        }
    }

    /// Records of the primary source after the mandatory filter
    pub fn count(&self, engine: &dyn QueryEngine, user: Option<&CurrentUser>) -> EngineResult<u64> {
        let (_, spec, handle) = self.primary_handle(engine, user)?;
        let query = self.page_builder(engine, user).base_query(&handle, spec)?;
        engine.count(&query)
    }

    // ------------------------------------------------------------------------
    // Lists
    // ------------------------------------------------------------------------

    fn require_kind(&self, kind: ObjectKind, operation: &str) -> EngineResult<()> {
        if self.kind() == kind {
            Ok(())
        } else {
            Err(EngineError::configuration(format!(
                "{operation} needs a {kind} object, '{}' is a {}",
                self.object_id(),
                self.kind()
            )))
        }
    }

    /// Replace the cached rows with rows supplied by the caller
    pub fn set_results(&mut self, rows: Vec<Row>) {
        self.results.clear();
        self.results.add(MANUAL_ALIAS, rows);
    }

    /// Run one page request. Failures come back as an error page.
    pub fn fetch_page(
        &mut self,
        engine: &dyn QueryEngine,
        user: Option<&CurrentUser>,
        request: &PageRequest,
    ) -> PageResult {
        if let Err(err) = self.require_kind(ObjectKind::List, "fetching a page") {
            return PageResult::from_error(self.object_id(), request.draw, &err);
        }
        let builder = PageBuilder {
            engine,
            registry: &self.registry,
            source: &self.source,
            properties: &self.properties,
            data_table: self.data_table.as_ref(),
            user,
        };
        builder.fetch_page(request, &mut self.results)
    }

    /// Write one editable cell of the row `row_id`, inside the mandatory
    /// filter. Returns whether a row changed.
    pub fn update_cell(
        &mut self,
        engine: &mut dyn QueryEngine,
        user: Option<&CurrentUser>,
        row_id: &Value,
        field_id: &str,
        value: Value,
    ) -> EngineResult<bool> {
        self.require_kind(ObjectKind::List, "updating a cell")?;
        let field = self.registry.get(field_id)?;
        if !field.is_editable() {
            return Err(EngineError::validation(field_id, "field is not editable"));
        }
        let column = match field.sources() {
            [] => field.id.clone(),
            [SourceRef::Column(column)] | [SourceRef::Aliased { column, .. }] => column.clone(),
            _ => {
                return Err(EngineError::validation(
                    field_id,
                    "only fields over a single column can be edited inline",
                ));
            }
        };

        let (_, _, handle) = self.primary_handle(&*engine, user)?;
        let mut query = handle.query();
        if let Some((key, filter)) = self.properties.filter() {
            let key = qualify(&query, key);
            query = match filter {
                Value::Array(values) => query.where_in(key, values.clone()),
                other => query.where_eq(key, other.clone()),
            };
        }
        let pk = qualify(&query, &handle.primary_key);
        query = query.where_eq(pk, row_id.clone());

        let mut attributes = Row::new();
        attributes.insert(column, value);
        let changed = engine.update(&query, &attributes)?;
        if changed > 0 {
            self.results.clear();
        }
        info!(object_id = %self.object_id(), field = field_id, changed, "Updated cell");
        Ok(changed > 0)
    }

    // ------------------------------------------------------------------------
    // Forms
    // ------------------------------------------------------------------------

    pub fn data_set_id(&self) -> Option<&Value> {
        match &self.state {
            ObjectState::Form { data_set_id } => data_set_id.as_ref(),
            ObjectState::List => None,
        }
    }

    /// Point the form at another record. A different id drops the cached
    /// primary rows.
    pub fn set_data_set_id(&mut self, id: Option<Value>) -> EngineResult<()> {
        let ObjectState::Form { data_set_id } = &mut self.state else {
            return Err(EngineError::configuration(format!(
                "'{}' is a list, only forms have a data set id",
                self.object.object_id
            )));
        };
        if *data_set_id != id {
            *data_set_id = id;
            if let Some(alias) = self.results.which_primary().map(str::to_string) {
                self.results.destroy(&alias);
                debug!(object_id = %self.object.object_id, alias, "Dropped cached data set");
            }
        }
        Ok(())
    }

    /// Field values of the current record, or the defaults when the form
    /// has no data set id
    pub fn fetch_data_set(
        &mut self,
        engine: &dyn QueryEngine,
        user: Option<&CurrentUser>,
    ) -> EngineResult<Row> {
        self.require_kind(ObjectKind::Form, "fetching a data set")?;
        let Some(id) = self.data_set_id().cloned() else {
            return Ok(self.default_values());
        };

        if self.results.primary_rows().is_none_or(|rows| rows.is_empty()) {
            let (alias, row) = {
                let (alias, spec, handle) = self.primary_handle(engine, user)?;
                let query = self.page_builder(engine, user).base_query(&handle, spec)?;
                let row = engine.find(&query, &id)?.ok_or_else(|| EngineError::RecordNotFound {
                    source_name: alias.to_string(),
                    id: path::display(&id),
                })?;
                (alias.to_string(), row)
            };
            debug!(object_id = %self.object_id(), alias, "Fetched data set");
            self.results.add(alias, vec![row]);
        }

        let raw = self
            .current_row()
            .ok_or_else(|| EngineError::internal("data set vanished from the result stack"))?;
        Ok(RowMapper::new(&self.registry, self.properties.primary_key()).map(raw))
    }

    fn current_row(&self) -> Option<&Row> {
        self.results.primary_rows().and_then(|rows| rows.first())
    }

    /// `defaultValue` of every user field
    pub fn default_values(&self) -> Row {
        self.registry
            .user_fields()
            .map(|field| {
                let value = field
                    .form_props()
                    .and_then(|props| props.default_value.clone())
                    .unwrap_or(Value::Null);
                (field.id.clone(), value)
            })
            .collect()
    }

    /// Mapped value of one field in the fetched record, or its default
    pub fn field_value(&self, field_id: &str) -> EngineResult<Value> {
        let field = self.registry.get(field_id)?;
        let value = match self.current_row() {
            Some(raw) => RowMapper::new(&self.registry, self.properties.primary_key())
                .map(raw)
                .remove(field_id)
                .unwrap_or(Value::Null),
            None => field
                .form_props()
                .and_then(|props| props.default_value.clone())
                .unwrap_or(Value::Null),
        };
        Ok(value)
    }

    pub fn set_field_default_value(&mut self, field_id: &str, value: Value) -> EngineResult<()> {
        self.registry.set_field_property(field_id, "defaultValue", value)
    }

    /// Whether the form asks to be reloaded after saving
    pub fn reload(&self) -> bool {
        self.properties.reload()
    }

    pub fn set_reload(&mut self, reload: bool) {
        self.properties.set_reload(reload);
    }

    /// Validate and store `payload`.
    ///
    /// A successful save points the form at the stored record; validation
    /// messages are kept on the object either way.
    pub fn save(
        &mut self,
        engine: &mut dyn QueryEngine,
        user: Option<&CurrentUser>,
        payload: &Row,
    ) -> EngineResult<SaveResult> {
        self.require_kind(ObjectKind::Form, "saving")?;
        self.messages = ValidationReport::new();
        let handle = self.primary_handle(&*engine, user)?.2;
        let data_set_id = self.data_set_id().cloned();

        let result = FormSaver {
            engine,
            registry: &self.registry,
            handle: &handle,
        }
        .save(data_set_id.as_ref(), payload)?;

        if let Some(record) = &result.record {
            let id = record.get(&handle.primary_key).cloned();
            self.results.clear();
            self.set_data_set_id(id)?;
        }
        self.messages.merge(result.report.clone());
        Ok(result)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::memory::MemoryEngine;
    use crate::memory::tests::fixture;
    use dataobjects_model::{StaticUser, resolve};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    pub(crate) fn list_config() -> Value {
        json!({
            "objectProperties": {"objectName": "Users"},
            "fieldConfigs": {
                "names": {"name": "Name", "code": "Code", "team": "Team"},
                "fieldSources": {"team": "users:team:title"},
                "fieldEditable": {"name": true}
            },
            "dataSource": {"stacks": {"users": {"model": "User"}}},
            "menu": {
                "edit": {"label": "Edit", "inRow": true},
                "delete": {"label": "Delete", "permission": ["users.delete"]}
            }
        })
    }

    pub(crate) fn form_config() -> Value {
        json!({
            "fieldConfigs": {
                "names": {"name": "Name", "team": "Team"},
                "fieldSources": {"team": "users:team:title"},
                "required": ["name"]
            },
            "dataSource": {"stacks": {"users": {"model": "User"}}}
        })
    }

    fn build(kind: ObjectKind, id: &str, config: &Value) -> DataObject {
        let config = resolve(kind, id, config, &Value::Null).unwrap();
        DataObject::from_config(config, &RenderRegistry::new(), &Row::new()).unwrap()
    }

    fn payload(value: Value) -> Row {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_list_page_through_object() {
        let engine = fixture();
        let mut object = build(ObjectKind::List, "users", &list_config());
        let page = object.fetch_page(&engine, None, &PageRequest::default());

        assert!(page.is_success(), "{page:?}");
        let names: Vec<Value> = page.data.iter().map(|row| row["name"].clone()).collect();
        assert_eq!(names, vec![json!("Ann"), json!("bob"), json!("Cleo"), json!("Dan")]);
        assert_eq!(object.results().which_primary(), Some("users"));
        assert_eq!(object.count(&engine, None).unwrap(), 4);
    }

    #[test]
    fn test_property_round_trip() {
        let mut object = build(ObjectKind::List, "users", &list_config());
        assert_eq!(object.object_property("objectName"), Some(json!("Users")));
        assert_eq!(object.field_property("name", "fieldName").unwrap(), json!("Name"));

        object.set_object_property("objectName", json!("People")).unwrap();
        object.set_object_property("listLength", json!(10)).unwrap();
        assert_eq!(object.object_property("objectName"), Some(json!("People")));
        assert_eq!(object.object_property("listLength"), Some(json!(10)));
        assert!(object.set_object_property("objectID", json!("other")).is_err());
        assert!(object.set_object_property("noSuchKey", json!(1)).is_err());
    }

    #[test]
    fn test_descriptor_filters_menu() {
        let object = build(ObjectKind::List, "users", &list_config());
        let descriptor = object.descriptor(None).unwrap();
        assert_eq!(descriptor["objectProperties"]["objectID"], json!("users"));
        assert!(descriptor.get("listProperties").is_some());
        assert!(descriptor.get("dataTableProperties").is_some());
        assert_eq!(descriptor["menu"].as_array().map(Vec::len), Some(1));
        assert_eq!(descriptor["fields"]["name"]["fieldName"], json!("Name"));

        let admin = StaticUser::new(["users.delete"]);
        let descriptor = object.descriptor(Some(&admin)).unwrap();
        assert_eq!(descriptor["menu"].as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn test_update_cell_respects_editable_and_filter() {
        let mut engine = fixture();
        let mut object = build(ObjectKind::List, "users", &list_config());

        assert!(object
            .update_cell(&mut engine, None, &json!(2), "name", json!("Bob"))
            .unwrap());
        assert_eq!(engine.rows("users")[1]["name"], json!("Bob"));

        let err = object
            .update_cell(&mut engine, None, &json!(2), "code", json!("x"))
            .unwrap_err();
        assert!(err.is_validation());

        object.properties.set_filter(json!(1), Some("team_id"));
        assert!(!object
            .update_cell(&mut engine, None, &json!(2), "name", json!("Robert"))
            .unwrap());
        assert_eq!(engine.rows("users")[1]["name"], json!("Bob"));
    }

    #[test]
    fn test_manual_results_page() {
        let engine = MemoryEngine::new();
        let mut config = list_config();
        config["dataSource"] = json!({});
        let mut object = build(ObjectKind::List, "manual", &config);
        object.set_results(vec![payload(json!({"id": 9, "name": "Zed"}))]);

        let page = object.fetch_page(&engine, None, &PageRequest::default());
        assert!(page.is_success(), "{page:?}");
        assert_eq!(page.data[0]["name"], json!("Zed"));
        assert_eq!(page.message.as_deref(), Some("data loaded manually"));
    }

    #[test]
    fn test_form_defaults_without_data_set() {
        let engine = fixture();
        let mut object = build(ObjectKind::Form, "user", &form_config());
        object.set_field_default_value("name", json!("New user")).unwrap();

        let values = object.fetch_data_set(&engine, None).unwrap();
        assert_eq!(values["name"], json!("New user"));
        assert_eq!(values["team"], Value::Null);
        assert_eq!(object.field_value("name").unwrap(), json!("New user"));
        assert!(object.field_value("missing").unwrap_err().is_not_found());
    }

    #[test]
    fn test_changing_data_set_id_invalidates_cache() {
        let mut engine = fixture();
        let mut object = build(ObjectKind::Form, "user", &form_config());
        object.set_data_set_id(Some(json!(1))).unwrap();

        let values = object.fetch_data_set(&engine, None).unwrap();
        assert_eq!(values["name"], json!("Ann"));
        assert_eq!(values["team"], json!("Red"));

        let mut rename = Row::new();
        rename.insert("name".into(), json!("Anne"));
        engine
            .update(&crate::query::Query::table("users").where_eq("id", json!(1)), &rename)
            .unwrap();

        // same id, served from the result stack
        object.set_data_set_id(Some(json!(1))).unwrap();
        assert_eq!(object.fetch_data_set(&engine, None).unwrap()["name"], json!("Ann"));

        object.set_data_set_id(Some(json!(2))).unwrap();
        assert!(!object.results().has_results("users"));
        assert_eq!(object.fetch_data_set(&engine, None).unwrap()["name"], json!("bob"));

        object.set_data_set_id(Some(json!(1))).unwrap();
        assert_eq!(object.fetch_data_set(&engine, None).unwrap()["name"], json!("Anne"));
    }

    #[test]
    fn test_missing_record_is_not_found() {
        let engine = fixture();
        let mut object = build(ObjectKind::Form, "user", &form_config());
        object.set_data_set_id(Some(json!(99))).unwrap();
        assert!(object.fetch_data_set(&engine, None).unwrap_err().is_not_found());
    }

    #[test]
    fn test_form_save_points_at_new_record() {
        let mut engine = fixture();
        let mut object = build(ObjectKind::Form, "user", &form_config());

        let result = object
            .save(&mut engine, None, &payload(json!({"name": "Eve"})))
            .unwrap();
        assert!(result.success());
        assert_eq!(object.data_set_id(), Some(&json!(5)));
        assert_eq!(object.fetch_data_set(&engine, None).unwrap()["name"], json!("Eve"));
    }

    #[test]
    fn test_form_save_keeps_messages() {
        let mut engine = fixture();
        let mut object = build(ObjectKind::Form, "user", &form_config());

        let result = object
            .save(&mut engine, None, &payload(json!({"name": ""})))
            .unwrap();
        assert!(!result.success());
        assert_eq!(object.messages("name"), &["Field 'Name' is required".to_string()]);
        assert_eq!(object.error_messages().len(), 1);
        assert_eq!(engine.rows("users").len(), 4);
    }

    #[test]
    fn test_each_save_starts_with_fresh_messages() {
        let mut engine = fixture();
        let mut object = build(ObjectKind::Form, "user", &form_config());

        object.save(&mut engine, None, &payload(json!({"name": ""}))).unwrap();
        assert_eq!(object.error_messages().len(), 1);

        let result = object
            .save(&mut engine, None, &payload(json!({"name": "Eve"})))
            .unwrap();
        assert!(result.success());
        assert!(object.messages("name").is_empty());
        assert!(object.error_messages().is_empty());
    }

    #[test]
    fn test_kind_checks() {
        let engine = fixture();
        let mut list = build(ObjectKind::List, "users", &list_config());
        assert!(list.set_data_set_id(Some(json!(1))).is_err());

        let mut form = build(ObjectKind::Form, "user", &form_config());
        let page = form.fetch_page(&engine, None, &PageRequest::default());
        assert!(!page.is_success());
        assert!(form.set_message("name", "check spelling").is_ok());
        assert_eq!(form.messages("name"), &["check spelling".to_string()]);
        assert!(form.set_message("nope", "x").is_err());
    }
}
