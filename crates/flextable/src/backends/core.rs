//! Core Session Traits
//!
//! A [`Session`] is the unit-of-work handle models persist through. It owns
//! one outer transaction and supports nested transactions via named
//! savepoints. Backends work on [`Row`] values: column name to JSON value.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::FlexResult;
use crate::model::TableSchema;

/// Column values of a single stored row
pub type Row = Map<String, Value>;

/// Handle to an open nested transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Savepoint {
    name: String,
}

impl Savepoint {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Abstract database session
#[async_trait]
pub trait Session: Send + Sync {
    /// Open a nested transaction
    async fn begin_nested(&mut self) -> FlexResult<Savepoint>;

    /// Keep the work done since the savepoint was opened
    async fn release(&mut self, savepoint: &Savepoint) -> FlexResult<()>;

    /// Discard the work done since the savepoint was opened
    async fn rollback_to(&mut self, savepoint: &Savepoint) -> FlexResult<()>;

    /// Commit the outer transaction and start a new one
    async fn commit(&mut self) -> FlexResult<()>;

    /// Roll back the outer transaction and start a new one
    async fn rollback(&mut self) -> FlexResult<()>;

    async fn create_table(&mut self, schema: &TableSchema) -> FlexResult<()>;

    async fn drop_table(&mut self, schema: &TableSchema) -> FlexResult<()>;

    /// Insert a row, returning it as stored (generated keys and defaults applied)
    async fn insert(&mut self, schema: &TableSchema, row: Row) -> FlexResult<Row>;

    /// Insert or replace a row by primary key, returning it as stored
    async fn merge(&mut self, schema: &TableSchema, row: Row) -> FlexResult<Row>;

    /// Delete the row with the given primary key, returning the affected count
    async fn delete(&mut self, schema: &TableSchema, primary_key: &Value) -> FlexResult<u64>;

    /// Rows whose `column` equals `value`
    async fn filter_by(
        &mut self,
        schema: &TableSchema,
        column: &str,
        value: &Value,
    ) -> FlexResult<Vec<Row>>;

    /// Number of rows whose `column` equals `value`
    async fn count_by(
        &mut self,
        schema: &TableSchema,
        column: &str,
        value: &Value,
    ) -> FlexResult<u64> {
        Ok(self.filter_by(schema, column, value).await?.len() as u64)
    }

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}
