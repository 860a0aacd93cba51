//! # DataObjects Core
//!
//! Core types, traits, and error handling for DataObjects.
//!
//! This crate provides the foundational building blocks shared by the
//! model and engine crates, including:
//!
//! - **Types**: `ObjectKind`, `FieldType`, `ContentType`, `SortDirection`
//! - **Traits**: `Validatable`, `PropertyAccess`, `Persistable`
//! - **Paths**: optional-returning dotted-path lookup and config merging
//! - **Errors**: Unified error handling with `EngineError` and `EngineResult`
//!

pub mod error;
pub mod path;
pub mod traits;
pub mod types;

// Re-export commonly used items at crate root
pub use error::{EngineError, EngineResult, ResultExt};
pub use traits::{Persistable, PropertyAccess, Validatable, property_value};
pub use types::{ContentType, FieldType, ObjectKind, Row, SortDirection};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
