//! # DataObjects Engine
//!
//! The runtime side of DataObjects: turning a built object and a request
//! into a query, running it, and shaping what comes back.
//!
//! ## Features
//!
//! - **Query plans**: an engine-neutral [`Query`] and the [`QueryEngine`]
//!   interface a relational backend implements
//! - **SQL rendering**: parameterised SQL for a query plan
//! - **In-memory engine**: a [`MemoryEngine`] over JSON fixtures
//! - **Source resolution**: stacks and relation paths into queryable handles
//! - **Page building**: column search, global search, sorting, sums and
//!   paging for list objects
//! - **Result mapping**: raw rows into flat, formatted field values
//! - **Form saving**: input coercion, password rules and transactional
//!   writes through relations
//! - **Object context**: the per-request registry of built objects
//!

// ============================================================================
// Modules
// ============================================================================

pub mod builder;
pub mod context;
pub mod format;
pub mod mapper;
pub mod memory;
pub mod object;
pub mod query;
pub mod render;
pub mod resolve;
pub mod results;
pub mod save;
pub mod sql;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::{
    ColumnRequest, OrderRequest, PageBuilder, PageRequest, PageResult, PageState, SearchValue,
};
pub use context::{ObjectContext, SaveOutcome};
pub use format::{format_cell, human_filesize, parse_temporal};
pub use mapper::{MISSING_VALUE, ROW_ID_KEY, RowMapper};
pub use memory::{MemoryEngine, MemoryFixture, UserFixture};
pub use object::{DataObject, ObjectState};
pub use query::{
    CompareOp, Condition, EagerLoad, Join, JoinKind, ModelInfo, OrderKey, PivotInfo, Query,
    QueryEngine, RelationInfo, RelationKind,
};
pub use render::{RenderFn, RenderRegistry};
pub use resolve::{CurrentUser, SourceHandle, resolve_path, resolve_stack};
pub use results::ResultStack;
pub use save::{FormSaver, SavePlan, SaveResult, validate_field_input};
pub use sql::SqlStatement;

/// Commonly used types for consumers of the engine
pub mod prelude {
    pub use crate::{
        CurrentUser, DataObject, MemoryEngine, ObjectContext, PageRequest, PageResult, Query,
        QueryEngine, RenderRegistry,
    };
    pub use dataobjects_model::prelude::*;
}
