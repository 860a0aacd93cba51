//! # DataObjects Model
//!
//! The configuration side of DataObjects: everything that is decided when
//! an object is built, before any data is read.
//!
//! ## Core Concepts
//!
//! - **Property bags**: object, list, form and data-table settings with
//!   built-in templates
//! - **FieldDescriptor**: one list column or form input, with its source
//!   mapping, options and validation rules
//! - **FieldRegistry**: the ordered fields of one object
//! - **Config Resolver**: stored configuration + overrides into a
//!   normalized configuration and registry
//! - **SourceDescriptor**: the named data source stacks and the primary one
//! - **MenuStack**: permission-filtered menu entries
//! - **ConfigStore**: where object configurations come from
//!

// Module declarations
pub mod config;
pub mod field;
pub mod menu;
pub mod properties;
pub mod registry;
pub mod source;
pub mod store;
pub mod validation;

// Re-export commonly used types at crate root
pub use config::{NormalizedConfig, resolve};
pub use field::{
    CHECKBOX_FIELD, FieldDescriptor, FieldOption, FieldOptions, FieldVariant, FormFieldProps,
    ListFieldProps, OutputSpec, RenderFunctionRef, RenderOptions, RenderOutput, SourceRef,
    TOOLS_FIELD, boolean_options, normalize_options,
};
pub use menu::{MenuEntry, MenuItem, MenuStack, Permissions, StaticUser, UserPermissions};
pub use properties::{BagKind, ObjectProperties, PropertyBag};
pub use registry::{FieldRegistry, swap_index, unswap_index};
pub use source::{
    JoinSpec, JoinType, ModelPath, OrderSpec, PathBase, PathSegment, SegmentKind,
    SourceDescriptor, SourceTarget, StackSpec, WhereSpec,
};
pub use store::{ConfigStore, MemoryConfigStore, store_key};
pub use validation::{PasswordVerdict, RuleSet, ValidationReport, check_password};

// Re-export core types that are commonly used with the model
pub use dataobjects_core::{
    ContentType, EngineError, EngineResult, FieldType, ObjectKind, PropertyAccess, Row,
    SortDirection, Validatable,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// Prelude Module
// ============================================================================

/// Convenient re-exports for common usage
pub mod prelude {
    pub use crate::{
        // Re-exported from core
        ContentType,
        EngineError,
        EngineResult,
        FieldType,
        ObjectKind,
        PropertyAccess,
        Row,
        SortDirection,
        // Model types
        FieldDescriptor,
        FieldRegistry,
        MenuStack,
        NormalizedConfig,
        PropertyBag,
        SourceDescriptor,
        SourceRef,
        StackSpec,
        // Configuration
        ConfigStore,
        MemoryConfigStore,
        resolve,
    };
}
