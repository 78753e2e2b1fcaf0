//! Test models and a shared in-memory database

#![allow(dead_code)]

use flextable::{
    decode_attr, flex_table_items, Attribute, ColumnType, Database, FlexData, FlexError, FlexResult,
    FlexTable, SetTable,
};
use once_cell::sync::Lazy;
use serde_json::{json, Value};

/// Plain model: id, name, description
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DummySet {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub description: Option<String>,
}

impl SetTable for DummySet {
    fn table_name() -> &'static str {
        "dummy_set"
    }

    fn attributes() -> Vec<Attribute> {
        vec![
            Attribute::column("id", ColumnType::Integer).primary_key(),
            Attribute::column("name", ColumnType::Text).unique().not_null(),
            Attribute::column("description", ColumnType::Text),
        ]
    }

    fn get_attr(&self, key: &str) -> Option<Value> {
        match key {
            "id" => Some(json!(self.id)),
            "name" => Some(json!(self.name)),
            "description" => Some(json!(self.description)),
            _ => None,
        }
    }

    fn set_attr(&mut self, key: &str, value: Value) -> FlexResult<()> {
        let model = Self::model_name();
        match key {
            "id" => self.id = decode_attr(model, key, value)?,
            "name" => self.name = decode_attr(model, key, value)?,
            "description" => self.description = decode_attr(model, key, value)?,
            _ => return Err(unknown(model, key)),
        }
        Ok(())
    }
}

/// Same columns as `DummySet` plus flex data
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DummyFlex {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub flex_data: FlexData,
}

impl DummyFlex {
    pub fn named(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            ..Default::default()
        }
    }
}

impl SetTable for DummyFlex {
    fn table_name() -> &'static str {
        "dummy_flex"
    }

    fn attributes() -> Vec<Attribute> {
        vec![
            Attribute::column("id", ColumnType::Integer).primary_key(),
            Attribute::column("name", ColumnType::Text).unique().not_null(),
            Attribute::column("description", ColumnType::Text),
            Self::flex_attribute(),
        ]
    }

    fn get_attr(&self, key: &str) -> Option<Value> {
        match key {
            "id" => Some(json!(self.id)),
            "name" => Some(json!(self.name)),
            "description" => Some(json!(self.description)),
            _ => None,
        }
    }

    fn set_attr(&mut self, key: &str, value: Value) -> FlexResult<()> {
        let model = Self::model_name();
        match key {
            "id" => self.id = decode_attr(model, key, value)?,
            "name" => self.name = decode_attr(model, key, value)?,
            "description" => self.description = decode_attr(model, key, value)?,
            _ => return Err(unknown(model, key)),
        }
        Ok(())
    }

    flex_table_items!();
}

impl FlexTable for DummyFlex {
    fn flex_data(&self) -> &FlexData {
        &self.flex_data
    }

    fn set_flex_data(&mut self, data: FlexData) {
        self.flex_data = data;
    }
}

/// Model with a relationship and a hybrid attribute
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Gadget {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub parts: Vec<String>,
}

impl SetTable for Gadget {
    fn table_name() -> &'static str {
        "gadgets"
    }

    fn attributes() -> Vec<Attribute> {
        vec![
            Attribute::column("id", ColumnType::Integer).primary_key(),
            Attribute::column("name", ColumnType::Text).not_null(),
            Attribute::relationship("parts"),
            Attribute::hybrid("label"),
        ]
    }

    fn get_attr(&self, key: &str) -> Option<Value> {
        match key {
            "id" => Some(json!(self.id)),
            "name" => Some(json!(self.name)),
            "parts" => Some(json!(self.parts)),
            "label" => Some(json!(self.name.as_ref().map(|n| n.to_uppercase()))),
            _ => None,
        }
    }

    fn set_attr(&mut self, key: &str, value: Value) -> FlexResult<()> {
        let model = Self::model_name();
        match key {
            "id" => self.id = decode_attr(model, key, value)?,
            "name" => self.name = decode_attr(model, key, value)?,
            "parts" => self.parts = decode_attr(model, key, value)?,
            "label" => {
                return Err(FlexError::Validation(format!("{}.label is read-only", model)));
            }
            _ => return Err(unknown(model, key)),
        }
        Ok(())
    }
}

/// Model with a nullable column that has a default
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Note {
    pub id: Option<i64>,
    pub status: Option<String>,
}

impl SetTable for Note {
    fn table_name() -> &'static str {
        "notes"
    }

    fn attributes() -> Vec<Attribute> {
        vec![
            Attribute::column("id", ColumnType::Integer).primary_key(),
            Attribute::column("status", ColumnType::Text).default_value(json!("draft")),
        ]
    }

    fn get_attr(&self, key: &str) -> Option<Value> {
        match key {
            "id" => Some(json!(self.id)),
            "status" => Some(json!(self.status)),
            _ => None,
        }
    }

    fn set_attr(&mut self, key: &str, value: Value) -> FlexResult<()> {
        let model = Self::model_name();
        match key {
            "id" => self.id = decode_attr(model, key, value)?,
            "status" => self.status = decode_attr(model, key, value)?,
            _ => return Err(unknown(model, key)),
        }
        Ok(())
    }
}

/// Model that is never bound to a database
#[derive(Debug, Default)]
pub struct Orphan {
    pub id: Option<i64>,
}

impl SetTable for Orphan {
    fn table_name() -> &'static str {
        "orphans"
    }

    fn attributes() -> Vec<Attribute> {
        vec![Attribute::column("id", ColumnType::Integer).primary_key()]
    }

    fn get_attr(&self, key: &str) -> Option<Value> {
        match key {
            "id" => Some(json!(self.id)),
            _ => None,
        }
    }

    fn set_attr(&mut self, key: &str, value: Value) -> FlexResult<()> {
        match key {
            "id" => self.id = decode_attr(Self::model_name(), key, value)?,
            _ => return Err(unknown(Self::model_name(), key)),
        }
        Ok(())
    }
}

fn unknown(model: &str, key: &str) -> FlexError {
    FlexError::UnknownAttribute {
        model: model.to_string(),
        key: key.to_string(),
    }
}

static DATABASE: Lazy<Database> = Lazy::new(|| {
    let db = Database::memory();
    DummySet::bind_db(db.clone());
    DummyFlex::bind_db(db.clone());
    Note::bind_db(db.clone());
    db
});

/// Shared database with the dummy tables created and bound
pub async fn setup() -> Database {
    let db = DATABASE.clone();
    db.create_table::<DummySet>().await.expect("create dummy_set");
    db.create_table::<DummyFlex>().await.expect("create dummy_flex");
    db.create_table::<Note>().await.expect("create notes");
    db
}

/// Name unique across tests sharing the database
pub fn unique_name(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4())
}
