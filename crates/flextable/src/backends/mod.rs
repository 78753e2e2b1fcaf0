//! Session Backends
//!
//! This module provides the session abstraction models persist through and
//! its two implementations: an in-process store and PostgreSQL via sqlx.

pub mod core;
pub mod memory;
pub mod postgres;

// Re-export core traits and types
pub use core::*;
pub use memory::MemorySession;
pub use postgres::PostgresSession;

/// Database backend type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseBackendType {
    Memory,
    PostgreSQL,
}

impl DatabaseBackendType {
    /// Detect the backend from a database URL scheme
    pub fn from_url(url: &str) -> Option<Self> {
        if url.starts_with("postgresql://") || url.starts_with("postgres://") {
            Some(DatabaseBackendType::PostgreSQL)
        } else if url.starts_with("memory://") {
            Some(DatabaseBackendType::Memory)
        } else {
            None
        }
    }
}

impl std::fmt::Display for DatabaseBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseBackendType::Memory => write!(f, "memory"),
            DatabaseBackendType::PostgreSQL => write!(f, "postgresql"),
        }
    }
}
