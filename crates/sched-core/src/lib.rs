//! sched-core: Core library for importing project schedules
//!
//! This library provides functionality to:
//! - Read typed fields from tabular rows or tagged-document entries
//! - Reconcile activity ids when independently numbered sources are merged
//! - Order parent-referencing entries so parents come first
//! - Build code definitions with their hierarchical values
//! - Drive one import session from raw records to a finished container

pub mod code_tree;
pub mod config;
pub mod error;
pub mod hierarchy;
pub mod model;
pub mod reconciler;
pub mod record;
pub mod session;
pub mod state;
pub mod value;

pub use code_tree::{CodeColumns, CodeDefinition, CodeKind, CodeTree, CodeTreeBuilder, CodeValue};
pub use config::ImportConfig;
pub use error::{Error, Result};
pub use hierarchy::{sort_entries, sort_hierarchy, HierarchyEntry};
pub use model::{
    AttributeDefinition, DeferredAttribute, Entity, EntityKind, ProjectContainer, Relation,
};
pub use reconciler::IdentifierReconciler;
pub use record::{DecodePolicy, FieldIndex, MapRow, Record, Table};
pub use session::{ImportResult, ImportSession};
pub use state::{DeferredAttributes, FieldMap, FieldMapping, ReaderState};
pub use value::{DataType, FieldValue, FromField};
