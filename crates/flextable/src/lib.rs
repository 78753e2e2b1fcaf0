//! # flextable: flexible JSON attributes for relational models
//!
//! Models get strongly-typed declared columns plus an open-ended `flex_data`
//! map, presented as one flat namespace through key-based access.
//!
//! - [`SetTable`]: create/update/delete, `to_dict`, `repr` and key-based
//!   access for any mapped model
//! - [`FlexTable`]: routes undeclared keys into the `flex_data` JSON column
//! - [`Database`]: the session handle models are bound to, with nested
//!   transactions over in-memory or PostgreSQL sessions

pub mod backends;
pub mod database;
pub mod error;
pub mod logging;
pub mod model;
pub mod transactions;

// Re-export core traits and types
pub use backends::{DatabaseBackendType, MemorySession, PostgresSession, Row, Savepoint, Session};
pub use database::{BoxFuture, Database, DatabaseConfig};
pub use error::{FlexError, FlexResult, ResultExt};
pub use logging::{init_logging, LoggingConfig};
pub use model::*;
pub use serde_json::Value;
