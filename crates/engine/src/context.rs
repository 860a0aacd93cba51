//! # Object Context
//!
//! The `ObjectContext` owns everything one request works with:
//!
//! - the configuration store objects are built from
//! - the query engine every object reads and writes through
//! - the render function registry and its context row
//! - the current user, if any
//! - the objects built so far, keyed by object ID
//!
//! Callers create one context per request and pass it by reference;
//! nothing is shared between contexts.

use dataobjects_core::{EngineError, EngineResult, ObjectKind, Row};
use dataobjects_model::{ConfigStore, UserPermissions, resolve};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::builder::{PageRequest, PageResult};
use crate::object::DataObject;
use crate::query::QueryEngine;
use crate::render::RenderRegistry;
use crate::resolve::CurrentUser;

// ============================================================================
// SaveOutcome
// ============================================================================

/// What a save reports back to the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveOutcome {
    pub success: bool,
    /// Field values of the stored record
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_values: Option<Row>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_messages: Option<Vec<String>>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub field_messages: IndexMap<String, Vec<String>>,
}

impl SaveOutcome {
    fn failed(messages: Vec<String>, field_messages: IndexMap<String, Vec<String>>) -> Self {
        Self {
            success: false,
            field_values: None,
            error_messages: Some(messages),
            field_messages,
        }
    }
}

// ============================================================================
// ObjectContext
// ============================================================================

/// Per-request registry of built objects and their collaborators
pub struct ObjectContext<S, E> {
    // ── collaborators ────────────────────────────────────────────────────
    store: S,
    engine: E,
    renderers: RenderRegistry,

    // ── request state ────────────────────────────────────────────────────
    /// Row handed to render functions
    render_context: Row,
    user: Option<CurrentUser>,

    // ── objects ──────────────────────────────────────────────────────────
    objects: IndexMap<String, DataObject>,
}

impl<S: ConfigStore, E: QueryEngine> ObjectContext<S, E> {
    pub fn new(store: S, engine: E) -> Self {
        Self {
            store,
            engine,
            renderers: RenderRegistry::new(),
            render_context: Row::new(),
            user: None,
            objects: IndexMap::new(),
        }
    }

    pub fn with_renderers(mut self, renderers: RenderRegistry) -> Self {
        self.renderers = renderers;
        self
    }

    pub fn with_render_context(mut self, context: Row) -> Self {
        self.render_context = context;
        self
    }

    pub fn with_user(mut self, user: CurrentUser) -> Self {
        self.user = Some(user);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn user(&self) -> Option<&CurrentUser> {
        self.user.as_ref()
    }

    // ------------------------------------------------------------------------
    // Building
    // ------------------------------------------------------------------------

    /// Build `object_id` of `object_type` from stored configuration plus
    /// `overrides`, replacing an object of the same ID.
    ///
    /// An object with no stored configuration builds from `overrides`
    /// alone; with neither it is not found.
    pub fn build_object(
        &mut self,
        object_type: &str,
        object_id: &str,
        overrides: &Value,
    ) -> EngineResult<&mut DataObject> {
        let kind: ObjectKind = object_type.parse()?;
        let stored = match self.store.get(kind, object_id) {
            Some(stored) => stored,
            None if !overrides.is_null() => Value::Null,
            None => {
                return Err(EngineError::ObjectNotFound(format!("{kind}.{object_id}")));
            }
        };

        let config = resolve(kind, object_id, &stored, overrides)?;
        let object = DataObject::from_config(config, &self.renderers, &self.render_context)?;
        info!(
            object_id,
            kind = %kind,
            fields = object.registry.len(),
            sources = object.source.iter().count(),
            "Built object"
        );

        if self.objects.insert(object_id.to_string(), object).is_some() {
            debug!(object_id, "Replaced existing object");
        }
        self.object_mut(object_id)
    }

    pub fn object(&self, object_id: &str) -> EngineResult<&DataObject> {
        self.objects
            .get(object_id)
            .ok_or_else(|| EngineError::ObjectNotFound(object_id.to_string()))
    }

    pub fn object_mut(&mut self, object_id: &str) -> EngineResult<&mut DataObject> {
        self.objects
            .get_mut(object_id)
            .ok_or_else(|| EngineError::ObjectNotFound(object_id.to_string()))
    }

    /// Drop a built object. Returns whether it existed.
    pub fn destroy_object(&mut self, object_id: &str) -> bool {
        let removed = self.objects.shift_remove(object_id).is_some();
        if removed {
            info!(object_id, "Destroyed object");
        }
        removed
    }

    /// Built objects and their kinds, in build order
    pub fn show_objects(&self) -> IndexMap<String, ObjectKind> {
        self.objects
            .iter()
            .map(|(id, object)| (id.clone(), object.kind()))
            .collect()
    }

    // ------------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------------

    /// Properties, visible menu and fields of a built object
    pub fn get_object_descriptor(&self, object_id: &str) -> EngineResult<Value> {
        let user = self.user.as_ref().map(|u| u as &dyn UserPermissions);
        self.object(object_id)?.descriptor(user)
    }

    /// One page of a list object
    pub fn fetch_results(&mut self, object_id: &str, request: &PageRequest) -> EngineResult<PageResult> {
        let object = self
            .objects
            .get_mut(object_id)
            .ok_or_else(|| EngineError::ObjectNotFound(object_id.to_string()))?;
        Ok(object.fetch_page(&self.engine, self.user.as_ref(), request))
    }

    /// Field values of one record of a form object
    pub fn fetch_data_set(&mut self, object_id: &str, data_set_id: Option<Value>) -> EngineResult<Row> {
        let object = self
            .objects
            .get_mut(object_id)
            .ok_or_else(|| EngineError::ObjectNotFound(object_id.to_string()))?;
        object.set_data_set_id(data_set_id)?;
        object.fetch_data_set(&self.engine, self.user.as_ref())
    }

    /// Validate and store a form payload.
    ///
    /// Validation messages and storage failures are reported in the
    /// outcome; only configuration problems are returned as errors.
    pub fn save_entry(
        &mut self,
        object_id: &str,
        data_set_id: Option<Value>,
        payload: &Row,
    ) -> EngineResult<SaveOutcome> {
        let object = self
            .objects
            .get_mut(object_id)
            .ok_or_else(|| EngineError::ObjectNotFound(object_id.to_string()))?;
        object.set_data_set_id(data_set_id)?;

        let user = self.user.as_ref();
        let result = match object.save(&mut self.engine, user, payload) {
            Ok(result) => result,
            Err(err) if err.is_data_source() || err.is_not_found() => {
                warn!(object_id, error = %err, "Save failed");
                return Ok(SaveOutcome::failed(err.trace(), IndexMap::new()));
            }
            Err(err) => return Err(err),
        };

        if !result.success() {
            return Ok(SaveOutcome::failed(
                result.report.error_messages,
                result.report.field_messages,
            ));
        }
        let field_values = object.fetch_data_set(&self.engine, user)?;
        Ok(SaveOutcome {
            success: true,
            field_values: Some(field_values),
            error_messages: None,
            field_messages: IndexMap::new(),
        })
    }

    /// Record count of a built object's primary source
    pub fn count(&self, object_id: &str) -> EngineResult<u64> {
        self.object(object_id)?.count(&self.engine, self.user.as_ref())
    }
}
