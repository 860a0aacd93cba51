//! Core traits for DataObjects
//!
//! Property containers, field descriptors and source specs share a small
//! set of capabilities: validation, by-name property access and JSON
//! persistence.

use crate::error::{EngineError, EngineResult};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

// ============================================================================
// Validatable Trait
// ============================================================================

/// Trait for types that can be validated
///
/// Types implementing this trait can check their internal consistency
/// and return validation errors if the state is invalid.
///
/// # Example
///
/// ```rust,ignore
/// use dataobjects_core::{Validatable, EngineResult, EngineError};
///
/// struct Stack {
///     table: Option<String>,
/// }
///
/// impl Validatable for Stack {
///     fn validate(&self) -> EngineResult<()> {
///         if self.table.is_none() {
///             return Err(EngineError::configuration("table is required"));
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait Validatable {
    /// Validate the current state of the object
    ///
    /// Returns `Ok(())` if valid, or an `EngineError` describing the problem.
    fn validate(&self) -> EngineResult<()>;

    /// Check if the object is valid without returning error details
    fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Get all validation errors (for types that can have multiple errors)
    fn validation_errors(&self) -> Vec<String> {
        match self.validate() {
            Ok(()) => vec![],
            Err(e) => vec![e.to_string()],
        }
    }
}

// ============================================================================
// PropertyAccess Trait
// ============================================================================

/// By-name access to a container with a fixed set of known keys.
///
/// Property bags and field descriptors are typed internally; this trait is
/// the string-keyed surface used by configuration merging, field-level
/// overrides and descriptor output.
pub trait PropertyAccess {
    /// Name used in error messages (`listProperties`, `field 'email'`, ...)
    fn container_name(&self) -> String;

    /// The keys this container knows, in output order
    fn property_keys(&self) -> Vec<&'static str>;

    /// Current value of a known key, `None` for unknown keys
    fn get_property(&self, key: &str) -> Option<Value>;

    /// Assign a known key.
    ///
    /// Unknown keys and values of the wrong shape fail with
    /// [`EngineError::InvalidProperty`].
    fn set_property(&mut self, key: &str, value: Value) -> EngineResult<()>;

    /// Whether `key` is one of [`property_keys`](Self::property_keys)
    fn has_property(&self, key: &str) -> bool {
        self.property_keys().iter().any(|k| *k == key)
    }

    /// Dotted-path read: the first segment names the property, the rest
    /// walks into its value.
    fn get_path(&self, path: &str) -> Option<Value> {
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, rest),
            None => (path, ""),
        };
        let value = self.get_property(head)?;
        crate::path::lookup(&value, rest).cloned()
    }

    /// Assign every known key present in `values`, ignoring the rest.
    ///
    /// Returns the keys that were applied.
    fn merge_known(
        &mut self,
        values: &serde_json::Map<String, Value>,
    ) -> EngineResult<Vec<String>> {
        let mut applied = Vec::new();
        for (key, value) in values {
            if self.has_property(key) {
                self.set_property(key, value.clone())?;
                applied.push(key.clone());
            }
        }
        Ok(applied)
    }

    /// Snapshot of every known key
    fn to_map(&self) -> serde_json::Map<String, Value> {
        self.property_keys()
            .into_iter()
            .filter_map(|key| self.get_property(key).map(|v| (key.to_string(), v)))
            .collect()
    }
}

/// Convert a configuration value into a typed property, mapping the serde
/// failure to [`EngineError::InvalidProperty`].
pub fn property_value<T: DeserializeOwned>(
    container: &str,
    key: &str,
    value: Value,
) -> EngineResult<T> {
    serde_json::from_value(value)
        .map_err(|e| EngineError::invalid_property(container, key, e.to_string()))
}

// ============================================================================
// Persistable Trait
// ============================================================================

/// Trait for types that can be saved to and loaded from JSON files
///
/// Fixtures and object descriptors implement this trait so the CLI can
/// read and print them.
pub trait Persistable: Serialize + DeserializeOwned + Sized {
    /// Save to a JSON string
    fn to_json(&self) -> EngineResult<String> {
        serde_json::to_string_pretty(self).map_err(Into::into)
    }

    /// Load from a JSON string
    fn from_json(json: &str) -> EngineResult<Self> {
        serde_json::from_str(json).map_err(Into::into)
    }

    /// Load from a file
    fn load_from_file(path: &std::path::Path) -> EngineResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| EngineError::FileRead {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_json(&json)
    }
}

// ============================================================================
// Tests
// ============================================================================
