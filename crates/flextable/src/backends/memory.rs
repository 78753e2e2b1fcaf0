//! In-Memory Session
//!
//! Process-local tables with PostgreSQL-like behavior for the operations the
//! model traits need: serial primary keys, column defaults, `NOT NULL` and
//! `UNIQUE` constraints, savepoints and an outer transaction. Sequences are
//! not rolled back, matching PostgreSQL.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::core::{Row, Savepoint, Session};
use crate::error::{FlexError, FlexResult};
use crate::model::{ColumnType, TableSchema};
use crate::transactions::SavepointManager;

#[derive(Debug, Clone)]
struct MemoryTable {
    schema: TableSchema,
    rows: Vec<Row>,
}

type Tables = BTreeMap<String, MemoryTable>;

/// Session backed by in-process tables
#[derive(Debug, Default)]
pub struct MemorySession {
    tables: Tables,
    committed: Tables,
    snapshots: Vec<Tables>,
    savepoints: SavepointManager,
    sequences: HashMap<String, i64>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows currently visible in a table
    pub fn row_count(&self, table: &str) -> usize {
        self.tables.get(table).map(|t| t.rows.len()).unwrap_or(0)
    }

    pub fn savepoint_depth(&self) -> usize {
        self.savepoints.depth()
    }

    fn table(&self, name: &str) -> FlexResult<&MemoryTable> {
        self.tables
            .get(name)
            .ok_or_else(|| FlexError::Storage(format!("relation \"{}\" does not exist", name)))
    }

    fn table_mut(&mut self, name: &str) -> FlexResult<&mut MemoryTable> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| FlexError::Storage(format!("relation \"{}\" does not exist", name)))
    }

    fn next_serial(&mut self, table: &str, column: &str) -> i64 {
        let counter = self
            .sequences
            .entry(format!("{}_{}_seq", table, column))
            .or_insert(0);
        *counter += 1;
        *counter
    }

    /// Apply defaults and serial keys (inserts only), then check types and `NOT NULL`
    fn prepare_row(&mut self, schema: &TableSchema, mut row: Row, inserting: bool) -> FlexResult<Row> {
        let table = self.table(&schema.name)?;
        if let Some(unknown) = row.keys().find(|k| table.schema.column(k).is_none()) {
            return Err(FlexError::Storage(format!(
                "column \"{}\" of relation \"{}\" does not exist",
                unknown, schema.name
            )));
        }

        let columns = table.schema.columns.clone();
        let mut prepared = Row::new();
        for column in &columns {
            let mut value = row.remove(&column.name).unwrap_or(Value::Null);

            if inserting && value.is_null() {
                if let Some(default) = &column.def.default {
                    value = default.clone();
                } else if column.def.primary_key
                    && matches!(column.def.column_type, ColumnType::Integer | ColumnType::BigInt)
                {
                    value = Value::from(self.next_serial(&schema.name, &column.name));
                }
            }

            if !column.def.column_type.accepts(&value) {
                return Err(FlexError::Storage(format!(
                    "invalid input for column \"{}\" of type {}: {}",
                    column.name,
                    column.def.column_type.as_sql(),
                    value
                )));
            }

            if value.is_null() && !column.def.nullable {
                return Err(FlexError::Storage(format!(
                    "null value in column \"{}\" of relation \"{}\" violates not-null constraint",
                    column.name, schema.name
                )));
            }

            prepared.insert(column.name.clone(), value);
        }

        Ok(prepared)
    }

    /// Check primary key and unique columns against rows other than `skip`
    fn check_unique(table: &MemoryTable, row: &Row, skip: Option<usize>) -> FlexResult<()> {
        for column in &table.schema.columns {
            if !(column.def.unique || column.def.primary_key) {
                continue;
            }
            let value = match row.get(&column.name) {
                Some(v) if !v.is_null() => v,
                _ => continue,
            };
            let clash = table
                .rows
                .iter()
                .enumerate()
                .any(|(i, existing)| Some(i) != skip && existing.get(&column.name) == Some(value));
            if clash {
                return Err(FlexError::Storage(format!(
                    "duplicate key value violates unique constraint \"{}_{}_key\": ({})=({})",
                    table.schema.name, column.name, column.name, value
                )));
            }
        }
        Ok(())
    }

    fn primary_key_name(schema: &TableSchema) -> FlexResult<String> {
        schema
            .primary_key()
            .map(|c| c.name.clone())
            .ok_or_else(|| FlexError::Storage(format!("relation \"{}\" has no primary key", schema.name)))
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn begin_nested(&mut self) -> FlexResult<Savepoint> {
        let savepoint = self.savepoints.push();
        self.snapshots.push(self.tables.clone());
        debug!("SAVEPOINT {}", savepoint.name());
        Ok(savepoint)
    }

    async fn release(&mut self, savepoint: &Savepoint) -> FlexResult<()> {
        let depth = self.savepoints.pop(savepoint)?;
        self.snapshots.truncate(depth);
        debug!("RELEASE SAVEPOINT {}", savepoint.name());
        Ok(())
    }

    async fn rollback_to(&mut self, savepoint: &Savepoint) -> FlexResult<()> {
        let depth = self.savepoints.pop(savepoint)?;
        if let Some(snapshot) = self.snapshots.get(depth).cloned() {
            self.tables = snapshot;
        }
        self.snapshots.truncate(depth);
        debug!("ROLLBACK TO SAVEPOINT {}", savepoint.name());
        Ok(())
    }

    async fn commit(&mut self) -> FlexResult<()> {
        self.committed = self.tables.clone();
        self.snapshots.clear();
        self.savepoints.clear();
        Ok(())
    }

    async fn rollback(&mut self) -> FlexResult<()> {
        self.tables = self.committed.clone();
        self.snapshots.clear();
        self.savepoints.clear();
        Ok(())
    }

    async fn create_table(&mut self, schema: &TableSchema) -> FlexResult<()> {
        self.tables
            .entry(schema.name.clone())
            .or_insert_with(|| MemoryTable {
                schema: schema.clone(),
                rows: Vec::new(),
            });
        Ok(())
    }

    async fn drop_table(&mut self, schema: &TableSchema) -> FlexResult<()> {
        self.tables.remove(&schema.name);
        Ok(())
    }

    async fn insert(&mut self, schema: &TableSchema, row: Row) -> FlexResult<Row> {
        let prepared = self.prepare_row(schema, row, true)?;
        let table = self.table_mut(&schema.name)?;
        Self::check_unique(table, &prepared, None)?;
        table.rows.push(prepared.clone());
        Ok(prepared)
    }

    async fn merge(&mut self, schema: &TableSchema, row: Row) -> FlexResult<Row> {
        let pk_name = Self::primary_key_name(schema)?;
        let pk = row.get(&pk_name).cloned().unwrap_or(Value::Null);
        if pk.is_null() {
            return self.insert(schema, row).await;
        }

        let position = self
            .table(&schema.name)?
            .rows
            .iter()
            .position(|r| r.get(&pk_name) == Some(&pk));

        match position {
            Some(index) => {
                let prepared = self.prepare_row(schema, row, false)?;
                let table = self.table_mut(&schema.name)?;
                Self::check_unique(table, &prepared, Some(index))?;
                table.rows[index] = prepared.clone();
                Ok(prepared)
            }
            None => self.insert(schema, row).await,
        }
    }

    async fn delete(&mut self, schema: &TableSchema, primary_key: &Value) -> FlexResult<u64> {
        let pk_name = Self::primary_key_name(schema)?;
        let table = self.table_mut(&schema.name)?;
        let before = table.rows.len();
        table.rows.retain(|r| r.get(&pk_name) != Some(primary_key));
        Ok((before - table.rows.len()) as u64)
    }

    async fn filter_by(
        &mut self,
        schema: &TableSchema,
        column: &str,
        value: &Value,
    ) -> FlexResult<Vec<Row>> {
        let table = self.table(&schema.name)?;
        if table.schema.column(column).is_none() {
            return Err(FlexError::Storage(format!(
                "column \"{}\" does not exist",
                column
            )));
        }
        Ok(table
            .rows
            .iter()
            .filter(|r| r.get(column) == Some(value))
            .cloned()
            .collect())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
