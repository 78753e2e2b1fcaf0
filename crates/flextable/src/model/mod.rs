//! Model System - Base and flexible model traits
//!
//! - `attributes`: attribute descriptors, classification and table layout
//! - `metadata`: per-type caches and database bindings
//! - `set_table`: base trait with item access and persistence helpers
//! - `flex_data`: validated JSON map of undeclared attributes
//! - `flex_table`: flexible-attribute extension of the base trait

pub mod attributes;
pub mod flex_data;
pub mod flex_table;
pub mod metadata;
pub mod set_table;

// Re-export main types and traits for convenience
pub use attributes::{AttrKeys, AttrKind, Attribute, ColumnDef, ColumnSchema, ColumnType, TableSchema};
pub use flex_data::{validate_key, FlexData, FLEX_DATA};
pub use flex_table::FlexTable;
pub use set_table::{decode_attr, AttrMap, ModelDisplay, SetTable};
