//! PostgreSQL Session
//!
//! A single sqlx connection kept inside an open transaction, the way an ORM
//! session holds one. Nested transactions map to `SAVEPOINT`s. Row values
//! travel as JSONB: writes go through `jsonb_populate_record` so PostgreSQL
//! does the per-column casting, reads come back through `to_jsonb`.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{Connection, PgConnection};
use tracing::debug;

use super::core::{Row, Savepoint, Session};
use crate::error::{FlexError, FlexResult};
use crate::model::attributes::quote_ident;
use crate::model::TableSchema;
use crate::transactions::SavepointManager;

/// Session backed by one PostgreSQL connection
pub struct PostgresSession {
    conn: PgConnection,
    savepoints: SavepointManager,
}

impl PostgresSession {
    /// Connect and open the outer transaction
    pub async fn connect(database_url: &str, timeout: Duration) -> FlexResult<Self> {
        let conn = tokio::time::timeout(timeout, PgConnection::connect(database_url))
            .await
            .map_err(|_| {
                FlexError::Connection(format!(
                    "Timed out after {}s connecting to PostgreSQL",
                    timeout.as_secs()
                ))
            })?
            .map_err(|e| FlexError::Connection(format!("Failed to connect to PostgreSQL: {}", e)))?;

        let mut session = Self {
            conn,
            savepoints: SavepointManager::new(),
        };
        session.execute("BEGIN").await?;
        Ok(session)
    }

    async fn execute(&mut self, sql: &str) -> FlexResult<u64> {
        debug!("{}", sql);
        let result = sqlx::query(sql)
            .execute(&mut self.conn)
            .await
            .map_err(|e| FlexError::Storage(format!("Query execution failed: {}", e)))?;
        Ok(result.rows_affected())
    }

    async fn fetch_rows(&mut self, sql: &str, param: Value) -> FlexResult<Vec<Row>> {
        debug!("{}", sql);
        let values: Vec<Json<Value>> = sqlx::query_scalar(sql)
            .bind(Json(param))
            .fetch_all(&mut self.conn)
            .await
            .map_err(|e| FlexError::Storage(format!("Query fetch failed: {}", e)))?;

        values
            .into_iter()
            .map(|Json(value)| match value {
                Value::Object(row) => Ok(row),
                other => Err(FlexError::Storage(format!("Expected a row object, got {}", other))),
            })
            .collect()
    }

    async fn fetch_row(&mut self, sql: &str, param: Value) -> FlexResult<Row> {
        self.fetch_rows(sql, param)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| FlexError::Storage("Statement returned no row".to_string()))
    }

    fn primary_key_name(schema: &TableSchema) -> FlexResult<&str> {
        schema
            .primary_key()
            .map(|c| c.name.as_str())
            .ok_or_else(|| FlexError::Storage(format!("relation \"{}\" has no primary key", schema.name)))
    }

    fn check_column(schema: &TableSchema, column: &str) -> FlexResult<()> {
        match schema.column(column) {
            Some(_) => Ok(()),
            None => Err(FlexError::Storage(format!("column \"{}\" does not exist", column))),
        }
    }

    /// Insert statement over the non-null columns of `row`
    fn insert_sql(schema: &TableSchema, row: &Row) -> FlexResult<String> {
        let table = quote_ident(&schema.name);
        let mut columns = Vec::new();
        for (name, value) in row {
            Self::check_column(schema, name)?;
            if !value.is_null() {
                columns.push(quote_ident(name));
            }
        }

        if columns.is_empty() {
            return Ok(format!(
                "INSERT INTO {} AS t DEFAULT VALUES RETURNING to_jsonb(t)",
                table
            ));
        }

        let column_list = columns.join(", ");
        Ok(format!(
            "INSERT INTO {table} AS t ({cols}) SELECT {cols} FROM jsonb_populate_record(NULL::{table}, $1) RETURNING to_jsonb(t)",
            table = table,
            cols = column_list
        ))
    }

    /// Upsert by primary key
    ///
    /// Defaults apply only to the insert half; on conflict every column takes
    /// the row's value, nulls included.
    fn merge_sql(schema: &TableSchema, row: &Row, pk_name: &str) -> FlexResult<String> {
        let insert = Self::insert_sql(schema, row)?;
        let table = quote_ident(&schema.name);
        let pk = quote_ident(pk_name);
        let mut assignments: Vec<String> = row
            .keys()
            .filter(|k| k.as_str() != pk_name)
            .map(|k| {
                format!(
                    "{col} = (jsonb_populate_record(NULL::{table}, $1)).{col}",
                    col = quote_ident(k),
                    table = table
                )
            })
            .collect();

        // DO NOTHING would return no row on conflict
        if assignments.is_empty() {
            assignments.push(format!("{pk} = EXCLUDED.{pk}", pk = pk));
        }

        Ok(insert.replacen(
            " RETURNING",
            &format!(" ON CONFLICT ({}) DO UPDATE SET {} RETURNING", pk, assignments.join(", ")),
            1,
        ))
    }
}

#[async_trait]
impl Session for PostgresSession {
    async fn begin_nested(&mut self) -> FlexResult<Savepoint> {
        let savepoint = self.savepoints.push();
        self.execute(&format!("SAVEPOINT {}", savepoint.name())).await?;
        Ok(savepoint)
    }

    async fn release(&mut self, savepoint: &Savepoint) -> FlexResult<()> {
        self.savepoints.pop(savepoint)?;
        self.execute(&format!("RELEASE SAVEPOINT {}", savepoint.name())).await?;
        Ok(())
    }

    async fn rollback_to(&mut self, savepoint: &Savepoint) -> FlexResult<()> {
        self.savepoints.pop(savepoint)?;
        // ROLLBACK TO keeps the savepoint open; release it to mirror the stack
        self.execute(&format!("ROLLBACK TO SAVEPOINT {}", savepoint.name())).await?;
        self.execute(&format!("RELEASE SAVEPOINT {}", savepoint.name())).await?;
        Ok(())
    }

    async fn commit(&mut self) -> FlexResult<()> {
        self.execute("COMMIT").await?;
        self.savepoints.clear();
        self.execute("BEGIN").await?;
        Ok(())
    }

    async fn rollback(&mut self) -> FlexResult<()> {
        self.execute("ROLLBACK").await?;
        self.savepoints.clear();
        self.execute("BEGIN").await?;
        Ok(())
    }

    async fn create_table(&mut self, schema: &TableSchema) -> FlexResult<()> {
        self.execute(&schema.create_sql()).await?;
        Ok(())
    }

    async fn drop_table(&mut self, schema: &TableSchema) -> FlexResult<()> {
        self.execute(&schema.drop_sql()).await?;
        Ok(())
    }

    async fn insert(&mut self, schema: &TableSchema, row: Row) -> FlexResult<Row> {
        let sql = Self::insert_sql(schema, &row)?;
        self.fetch_row(&sql, Value::Object(row)).await
    }

    async fn merge(&mut self, schema: &TableSchema, row: Row) -> FlexResult<Row> {
        let pk_name = Self::primary_key_name(schema)?.to_string();
        if row.get(&pk_name).map_or(true, Value::is_null) {
            return self.insert(schema, row).await;
        }

        let sql = Self::merge_sql(schema, &row, &pk_name)?;
        self.fetch_row(&sql, Value::Object(row)).await
    }

    async fn delete(&mut self, schema: &TableSchema, primary_key: &Value) -> FlexResult<u64> {
        let pk_name = Self::primary_key_name(schema)?;
        let table = quote_ident(&schema.name);
        let column = quote_ident(pk_name);
        let sql = format!(
            "DELETE FROM {table} WHERE {column} = (jsonb_populate_record(NULL::{table}, $1)).{column}",
            table = table,
            column = column
        );

        let mut param = Row::new();
        param.insert(pk_name.to_string(), primary_key.clone());

        debug!("{}", sql);
        let result = sqlx::query(&sql)
            .bind(Json(Value::Object(param)))
            .execute(&mut self.conn)
            .await
            .map_err(|e| FlexError::Storage(format!("Query execution failed: {}", e)))?;
        Ok(result.rows_affected())
    }

    async fn filter_by(
        &mut self,
        schema: &TableSchema,
        column: &str,
        value: &Value,
    ) -> FlexResult<Vec<Row>> {
        Self::check_column(schema, column)?;
        let table = quote_ident(&schema.name);
        let quoted = quote_ident(column);
        let sql = format!(
            "SELECT to_jsonb(t) FROM {table} t WHERE t.{column} = (jsonb_populate_record(NULL::{table}, $1)).{column}",
            table = table,
            column = quoted
        );

        let mut param = Row::new();
        param.insert(column.to_string(), value.clone());
        self.fetch_rows(&sql, Value::Object(param)).await
    }

    async fn count_by(
        &mut self,
        schema: &TableSchema,
        column: &str,
        value: &Value,
    ) -> FlexResult<u64> {
        Self::check_column(schema, column)?;
        let table = quote_ident(&schema.name);
        let quoted = quote_ident(column);
        let sql = format!(
            "SELECT COUNT(*) FROM {table} t WHERE t.{column} = (jsonb_populate_record(NULL::{table}, $1)).{column}",
            table = table,
            column = quoted
        );

        let mut param = Row::new();
        param.insert(column.to_string(), value.clone());

        debug!("{}", sql);
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(Json(Value::Object(param)))
            .fetch_one(&mut self.conn)
            .await
            .map_err(|e| FlexError::Storage(format!("Query fetch failed: {}", e)))?;
        Ok(count.max(0) as u64)
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
