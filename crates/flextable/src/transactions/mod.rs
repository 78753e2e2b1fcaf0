//! Transaction Management
//!
//! Savepoint bookkeeping used by the session backends for nested
//! transactions.

pub mod savepoints;

pub use savepoints::SavepointManager;
