//! Database Handle - Session ownership, nested transactions and configuration
//!
//! A [`Database`] is the handle models are bound to. It owns one session
//! behind an async mutex; every nested transaction holds the lock for its
//! whole scope so savepoints from concurrent callers never interleave.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::backends::{DatabaseBackendType, MemorySession, PostgresSession, Session};
use crate::error::{FlexError, FlexResult};
use crate::model::SetTable;

/// Boxed future returned by closures run inside a nested transaction
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Database connection configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// `memory://`, `postgres://...` or `postgresql://...`
    pub url: String,
    /// Seconds to wait for a backend connection
    pub acquire_timeout: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "memory://".to_string(),
            acquire_timeout: 30,
        }
    }
}

impl DatabaseConfig {
    pub fn new<S: Into<String>>(url: S) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Load configuration from environment variables
    ///
    /// The URL comes from `TEST_DATABASE_URL`, then `DATABASE_URL`, falling
    /// back to `memory://`. `FLEXTABLE_ACQUIRE_TIMEOUT` sets the timeout.
    pub fn from_env() -> FlexResult<Self> {
        let url = std::env::var("TEST_DATABASE_URL")
            .or_else(|_| std::env::var("DATABASE_URL"))
            .unwrap_or_else(|_| "memory://".to_string());

        let acquire_timeout = match std::env::var("FLEXTABLE_ACQUIRE_TIMEOUT") {
            Ok(raw) => raw.parse::<u64>().map_err(|_| {
                FlexError::Configuration(format!(
                    "FLEXTABLE_ACQUIRE_TIMEOUT must be a whole number of seconds, got '{}'",
                    raw
                ))
            })?,
            Err(_) => 30,
        };

        let config = Self { url, acquire_timeout };
        config.validate()?;
        Ok(config)
    }

    pub fn with_acquire_timeout(mut self, seconds: u64) -> Self {
        self.acquire_timeout = seconds;
        self
    }

    pub fn backend_type(&self) -> FlexResult<DatabaseBackendType> {
        DatabaseBackendType::from_url(&self.url).ok_or_else(|| {
            FlexError::Configuration(format!(
                "Unable to detect database backend from URL: {}",
                self.url
            ))
        })
    }

    /// Validate the configuration
    pub fn validate(&self) -> FlexResult<()> {
        if self.url.trim().is_empty() {
            return Err(FlexError::Configuration("Database URL is empty".to_string()));
        }
        if self.acquire_timeout == 0 {
            return Err(FlexError::Configuration(
                "acquire_timeout must be greater than zero".to_string(),
            ));
        }

        if self.backend_type()? == DatabaseBackendType::PostgreSQL {
            let parsed = url::Url::parse(&self.url)
                .map_err(|e| FlexError::Configuration(format!("Invalid database URL: {}", e)))?;
            if parsed.host_str().map_or(true, str::is_empty) {
                return Err(FlexError::Configuration(
                    "Missing host in database URL".to_string(),
                ));
            }
            if parsed.path().trim_start_matches('/').is_empty() {
                return Err(FlexError::Configuration(
                    "Missing database name in URL".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Shared handle to a database session
#[derive(Clone)]
pub struct Database {
    session: Arc<Mutex<Box<dyn Session>>>,
    backend: &'static str,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").field("backend", &self.backend).finish()
    }
}

impl Database {
    /// Wrap an already open session
    pub fn new<S: Session + 'static>(session: S) -> Self {
        let backend = session.backend_name();
        Self {
            session: Arc::new(Mutex::new(Box::new(session))),
            backend,
        }
    }

    /// Handle over a fresh in-memory session
    pub fn memory() -> Self {
        Self::new(MemorySession::new())
    }

    /// Open a session for the configured backend
    pub async fn connect(config: &DatabaseConfig) -> FlexResult<Self> {
        config.validate()?;
        match config.backend_type()? {
            DatabaseBackendType::Memory => Ok(Self::memory()),
            DatabaseBackendType::PostgreSQL => {
                let timeout = Duration::from_secs(config.acquire_timeout);
                let session = PostgresSession::connect(&config.url, timeout).await?;
                debug!("Connected PostgreSQL session");
                Ok(Self::new(session))
            }
        }
    }

    pub fn backend(&self) -> &'static str {
        self.backend
    }

    /// Lock the session for direct use
    pub async fn session(&self) -> MutexGuard<'_, Box<dyn Session>> {
        self.session.lock().await
    }

    /// Run `f` inside a nested transaction
    ///
    /// The savepoint is released when `f` succeeds and rolled back when it
    /// fails; the error from `f` is returned unchanged.
    pub async fn nested<T, F>(&self, f: F) -> FlexResult<T>
    where
        F: for<'s> FnOnce(&'s mut dyn Session) -> BoxFuture<'s, FlexResult<T>>,
    {
        let mut session = self.session.lock().await;
        let savepoint = session.begin_nested().await?;
        debug!(backend = self.backend, savepoint = savepoint.name(), "nested transaction started");

        match f(&mut **session).await {
            Ok(value) => {
                session.release(&savepoint).await?;
                debug!(backend = self.backend, savepoint = savepoint.name(), "nested transaction released");
                Ok(value)
            }
            Err(err) => {
                warn!(
                    backend = self.backend,
                    savepoint = savepoint.name(),
                    "rolling back nested transaction: {}",
                    err
                );
                if let Err(rollback_err) = session.rollback_to(&savepoint).await {
                    warn!("Failed to roll back to savepoint {}: {}", savepoint.name(), rollback_err);
                }
                Err(err)
            }
        }
    }

    pub async fn commit(&self) -> FlexResult<()> {
        self.session.lock().await.commit().await
    }

    pub async fn rollback(&self) -> FlexResult<()> {
        self.session.lock().await.rollback().await
    }

    /// Create the table backing model `M`
    pub async fn create_table<M: SetTable>(&self) -> FlexResult<()> {
        let schema = M::table_schema();
        self.session.lock().await.create_table(&schema).await
    }

    /// Drop the table backing model `M`
    pub async fn drop_table<M: SetTable>(&self) -> FlexResult<()> {
        let schema = M::table_schema();
        self.session.lock().await.drop_table(&schema).await
    }
}
