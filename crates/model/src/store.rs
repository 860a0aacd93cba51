//! Configuration store
//!
//! Object configurations are looked up by `"<type>.<objectID>"`. The
//! in-memory store loads them from a single JSON/TOML document shaped
//! `{ "list": { "<id>": {..} }, "form": { "<id>": {..} } }`, or from a
//! directory laid out as `<dir>/<type>/<objectID>.json|.toml`.

use dataobjects_core::{EngineError, EngineResult, ObjectKind};
use indexmap::IndexMap;
use serde_json::Value;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Read-only access to stored object configurations
pub trait ConfigStore {
    /// Configuration of one object, `None` when not configured
    fn get(&self, kind: ObjectKind, object_id: &str) -> Option<Value>;

    /// Every configured object, in load order
    fn objects(&self) -> Vec<(ObjectKind, String)>;
}

/// Store key of an object configuration
pub fn store_key(kind: ObjectKind, object_id: &str) -> String {
    format!("{}.{}", kind.as_str(), object_id)
}

/// Configurations held in memory
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryConfigStore {
    objects: IndexMap<String, (ObjectKind, String, Value)>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace one configuration
    pub fn insert(&mut self, kind: ObjectKind, object_id: impl Into<String>, config: Value) {
        let object_id = object_id.into();
        self.objects
            .insert(store_key(kind, &object_id), (kind, object_id, config));
    }

    /// Build from a `{type: {id: config}}` tree
    pub fn from_value(tree: &Value) -> EngineResult<Self> {
        let Value::Object(kinds) = tree else {
            return Err(EngineError::configuration(
                "configuration root must be a map of object types",
            ));
        };
        let mut store = Self::new();
        for (kind, objects) in kinds {
            let kind: ObjectKind = kind.parse()?;
            let Value::Object(objects) = objects else {
                return Err(EngineError::configuration(format!(
                    "'{kind}' must map object IDs to configurations"
                )));
            };
            for (object_id, config) in objects {
                store.insert(kind, object_id.clone(), config.clone());
            }
        }
        Ok(store)
    }

    /// Load a single JSON or TOML document (by extension)
    pub fn load_file(path: impl AsRef<Path>) -> EngineResult<Self> {
        let tree = read_document(path.as_ref())?;
        let store = Self::from_value(&tree)?;
        debug!(path = %path.as_ref().display(), objects = store.len(), "Loaded configuration file");
        Ok(store)
    }

    /// Load every `<type>/<objectID>.json|.toml` below `dir`
    pub fn load_dir(dir: impl AsRef<Path>) -> EngineResult<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(EngineError::FileRead {
                path: dir.to_path_buf(),
                message: "not a directory".to_string(),
            });
        }

        let mut store = Self::new();
        let mut entries: Vec<_> = WalkDir::new(dir)
            .min_depth(2)
            .max_depth(2)
            .into_iter()
            .collect::<Result<_, _>>()
            .map_err(|e| EngineError::FileRead {
                path: dir.to_path_buf(),
                message: e.to_string(),
            })?;
        entries.sort_by(|a, b| a.path().cmp(b.path()));

        for entry in entries {
            let path = entry.path();
            if !entry.file_type().is_file() || !is_document(path) {
                continue;
            }
            let kind_name = path
                .parent()
                .and_then(Path::file_name)
                .and_then(|n| n.to_str())
                .unwrap_or_default();
            let Ok(kind) = kind_name.parse::<ObjectKind>() else {
                warn!(path = %path.display(), "Skipping configuration outside list/ or form/");
                continue;
            };
            let Some(object_id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            store.insert(kind, object_id, read_document(path)?);
        }

        debug!(path = %dir.display(), objects = store.len(), "Loaded configuration directory");
        Ok(store)
    }

    /// Load a file or a directory
    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        if path.is_dir() {
            Self::load_dir(path)
        } else {
            Self::load_file(path)
        }
    }

    /// Write the store as one JSON document
    pub fn save_file(&self, path: impl AsRef<Path>) -> EngineResult<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(&self.to_value())?;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;
        Ok(())
    }

    /// The `{type: {id: config}}` tree
    pub fn to_value(&self) -> Value {
        let mut tree = serde_json::Map::new();
        for (kind, object_id, config) in self.objects.values() {
            let objects = tree
                .entry(kind.as_str())
                .or_insert_with(|| Value::Object(serde_json::Map::new()));
            if let Value::Object(objects) = objects {
                objects.insert(object_id.clone(), config.clone());
            }
        }
        Value::Object(tree)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl ConfigStore for MemoryConfigStore {
    fn get(&self, kind: ObjectKind, object_id: &str) -> Option<Value> {
        self.objects
            .get(&store_key(kind, object_id))
            .map(|(_, _, config)| config.clone())
    }

    fn objects(&self) -> Vec<(ObjectKind, String)> {
        self.objects
            .values()
            .map(|(kind, id, _)| (*kind, id.clone()))
            .collect()
    }
}

fn is_document(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("json") | Some("toml")
    )
}

/// Parse a JSON or TOML file into a value
fn read_document(path: &Path) -> EngineResult<Value> {
    let text = std::fs::read_to_string(path).map_err(|e| EngineError::FileRead {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let parsed = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => toml::from_str::<Value>(&text).map_err(EngineError::from),
        _ => serde_json::from_str::<Value>(&text).map_err(EngineError::from),
    };
    parsed.map_err(|e| EngineError::FileRead {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

// ============================================================================
// Tests
// ============================================================================
