//! Attribute Metadata - Column, relationship and hybrid descriptors
//!
//! Models describe their column-like attributes with [`Attribute`] values.
//! From those descriptors the crate derives the attribute classification
//! ([`AttrKeys`]) and the storage layout ([`TableSchema`]) handed to sessions.

use chrono::{DateTime, NaiveDateTime};
use serde_json::Value;

/// Storage type of a declared column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    BigInt,
    Text,
    Boolean,
    Float,
    Json,
    Timestamp,
}

impl ColumnType {
    /// PostgreSQL type name used in generated DDL
    pub fn as_sql(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::BigInt => "BIGINT",
            ColumnType::Text => "TEXT",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Float => "DOUBLE PRECISION",
            ColumnType::Json => "JSONB",
            ColumnType::Timestamp => "TIMESTAMPTZ",
        }
    }

    /// Check whether a JSON value can be stored in a column of this type
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (ColumnType::Integer | ColumnType::BigInt, Value::Number(n)) => n.is_i64(),
            (ColumnType::Float, Value::Number(_)) => true,
            (ColumnType::Text, Value::String(_)) => true,
            (ColumnType::Timestamp, Value::String(s)) => parse_timestamp(s).is_some(),
            (ColumnType::Boolean, Value::Bool(_)) => true,
            (ColumnType::Json, _) => true,
            _ => false,
        }
    }
}

/// RFC 3339 timestamps, or naive `YYYY-MM-DD HH:MM:SS[.f]` as PostgreSQL renders them
fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.naive_utc())
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
}

/// Column definition for a declared attribute
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub column_type: ColumnType,
    pub primary_key: bool,
    pub unique: bool,
    pub nullable: bool,
    pub default: Option<Value>,
}

/// Kind of a column-like attribute
#[derive(Debug, Clone, PartialEq)]
pub enum AttrKind {
    /// Actual column on the underlying table
    Column(ColumnDef),
    /// Attribute loaded from related rows
    Relationship,
    /// Computed attribute derived from other attributes
    Hybrid,
}

/// A column-like attribute declared on a model
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub key: &'static str,
    pub kind: AttrKind,
}

impl Attribute {
    /// Declare a nullable, non-unique column
    pub fn column(key: &'static str, column_type: ColumnType) -> Self {
        Self {
            key,
            kind: AttrKind::Column(ColumnDef {
                column_type,
                primary_key: false,
                unique: false,
                nullable: true,
                default: None,
            }),
        }
    }

    /// Declare a relationship attribute
    pub fn relationship(key: &'static str) -> Self {
        Self {
            key,
            kind: AttrKind::Relationship,
        }
    }

    /// Declare a hybrid (computed) attribute
    pub fn hybrid(key: &'static str) -> Self {
        Self {
            key,
            kind: AttrKind::Hybrid,
        }
    }

    /// Mark the column as the primary key. Primary keys are never nullable.
    pub fn primary_key(mut self) -> Self {
        if let AttrKind::Column(def) = &mut self.kind {
            def.primary_key = true;
            def.nullable = false;
        }
        self
    }

    pub fn unique(mut self) -> Self {
        if let AttrKind::Column(def) = &mut self.kind {
            def.unique = true;
        }
        self
    }

    pub fn not_null(mut self) -> Self {
        if let AttrKind::Column(def) = &mut self.kind {
            def.nullable = false;
        }
        self
    }

    /// Value stored when an insert leaves the column null
    pub fn default_value(mut self, value: Value) -> Self {
        if let AttrKind::Column(def) = &mut self.kind {
            def.default = Some(value);
        }
        self
    }

    pub fn column_def(&self) -> Option<&ColumnDef> {
        match &self.kind {
            AttrKind::Column(def) => Some(def),
            _ => None,
        }
    }

    pub fn is_column(&self) -> bool {
        matches!(self.kind, AttrKind::Column(_))
    }

    pub fn is_relationship(&self) -> bool {
        matches!(self.kind, AttrKind::Relationship)
    }

    pub fn is_hybrid(&self) -> bool {
        matches!(self.kind, AttrKind::Hybrid)
    }
}

/// Attribute keys of a model, grouped by how they behave
///
/// * `columns`:       actual columns on the underlying table
/// * `relationships`: attributes loaded from related rows
/// * `hybrids`:       computed attributes
/// * `primaries`:     columns followed by hybrids
/// * `all`:           relationships followed by primaries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrKeys {
    pub all: Vec<String>,
    pub columns: Vec<String>,
    pub hybrids: Vec<String>,
    pub primaries: Vec<String>,
    pub relationships: Vec<String>,
}

impl AttrKeys {
    pub fn classify(attributes: &[Attribute]) -> Self {
        let keys_where = |pred: fn(&Attribute) -> bool| -> Vec<String> {
            attributes
                .iter()
                .filter(|a| pred(a))
                .map(|a| a.key.to_string())
                .collect()
        };

        let columns = keys_where(Attribute::is_column);
        let hybrids = keys_where(Attribute::is_hybrid);
        let relationships = keys_where(Attribute::is_relationship);

        let primaries: Vec<String> = columns.iter().chain(hybrids.iter()).cloned().collect();
        let all: Vec<String> = relationships.iter().chain(primaries.iter()).cloned().collect();

        Self {
            all,
            columns,
            hybrids,
            primaries,
            relationships,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.all.iter().any(|k| k == key)
    }
}

/// A stored column: name plus definition
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSchema {
    pub name: String,
    pub def: ColumnDef,
}

/// Storage layout of a model's table
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    pub fn new(name: &str, attributes: &[Attribute]) -> Self {
        let columns = attributes
            .iter()
            .filter_map(|a| {
                a.column_def().map(|def| ColumnSchema {
                    name: a.key.to_string(),
                    def: def.clone(),
                })
            })
            .collect();

        Self {
            name: name.to_string(),
            columns,
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// First primary key column, if the table declares one
    pub fn primary_key(&self) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.def.primary_key)
    }

    pub fn primary_keys(&self) -> Vec<&ColumnSchema> {
        self.columns.iter().filter(|c| c.def.primary_key).collect()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// `CREATE TABLE IF NOT EXISTS` statement for PostgreSQL
    pub fn create_sql(&self) -> String {
        let columns: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                let is_serial = c.def.primary_key
                    && matches!(c.def.column_type, ColumnType::Integer | ColumnType::BigInt);

                let mut sql = if is_serial {
                    let serial = match c.def.column_type {
                        ColumnType::BigInt => "BIGSERIAL",
                        _ => "SERIAL",
                    };
                    format!("{} {}", quote_ident(&c.name), serial)
                } else {
                    format!("{} {}", quote_ident(&c.name), c.def.column_type.as_sql())
                };

                if c.def.primary_key {
                    sql.push_str(" PRIMARY KEY");
                } else {
                    if c.def.unique {
                        sql.push_str(" UNIQUE");
                    }
                    if !c.def.nullable {
                        sql.push_str(" NOT NULL");
                    }
                }
                if let Some(default) = &c.def.default {
                    sql.push_str(&format!(" DEFAULT {}", sql_literal(default)));
                }
                sql
            })
            .collect();

        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_ident(&self.name),
            columns.join(", ")
        )
    }

    /// `DROP TABLE IF EXISTS` statement for PostgreSQL
    pub fn drop_sql(&self) -> String {
        format!("DROP TABLE IF EXISTS {}", quote_ident(&self.name))
    }
}

/// Quote an identifier for PostgreSQL
pub(crate) fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn sql_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => b.to_string().to_uppercase(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Array(_) | Value::Object(_) => format!("'{}'", value.to_string().replace('\'', "''")),
    }
}
