//! Set Table - Base model trait with key-based access and persistence
//!
//! A model implements four methods describing its attributes; everything
//! else (item access, dictionary conversion, repr, create/update/delete and
//! simple queries) is provided. Persistence goes through the [`Database`]
//! bound to the model type with [`SetTable::bind_db`].

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::attributes::{AttrKeys, Attribute, TableSchema};
use super::metadata;
use crate::backends::Row;
use crate::database::Database;
use crate::error::{FlexError, FlexResult, ResultExt};

/// Flat attribute dictionary of a model instance
pub type AttrMap = Map<String, Value>;

/// Base trait for mapped models
#[allow(async_fn_in_trait)]
pub trait SetTable: Default + fmt::Debug + Send + Sync + 'static {
    /// Table name for this model
    fn table_name() -> &'static str;

    /// Column-like attributes declared by this model
    fn attributes() -> Vec<Attribute>;

    /// Current value of a declared attribute, `None` if the key is not declared
    fn get_attr(&self, key: &str) -> Option<Value>;

    /// Assign a declared attribute
    fn set_attr(&mut self, key: &str, value: Value) -> FlexResult<()>;

    /// Name used in messages and `repr`
    fn model_name() -> &'static str {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }

    fn bind_db(db: Database) {
        metadata::bind::<Self>(db);
    }

    /// The bound database, or a configuration error naming the bind call
    fn check_db() -> FlexResult<Database> {
        metadata::bound::<Self>().ok_or_else(|| {
            FlexError::Configuration(format!(
                "db is not bound. you must call {}::bind_db() first",
                Self::model_name()
            ))
        })
    }

    /// Attribute keys grouped by kind, computed once per type
    fn col_attr_keys() -> Arc<AttrKeys> {
        metadata::metadata::<Self>().attr_keys.clone()
    }

    fn table_schema() -> Arc<TableSchema> {
        metadata::metadata::<Self>().table.clone()
    }

    /// Value of the first primary key column (`null` when unsaved)
    fn primary_key_value(&self) -> Value {
        Self::table_schema()
            .primary_key()
            .and_then(|c| self.get_attr(&c.name))
            .unwrap_or(Value::Null)
    }

    fn get_item(&self, key: &str) -> FlexResult<Value> {
        self.get_attr(key).ok_or_else(|| unknown_attribute::<Self>(key))
    }

    /// Assign an attribute by key
    ///
    /// This only changes the instance; use [`SetTable::update`] to persist.
    fn set_item(&mut self, key: &str, value: Value) -> FlexResult<()> {
        if !Self::col_attr_keys().contains(key) {
            return Err(unknown_attribute::<Self>(key));
        }
        self.set_attr(key, value)
    }

    fn to_dict(&self) -> FlexResult<AttrMap> {
        Ok(Self::col_attr_keys()
            .all
            .iter()
            .map(|k| (k.clone(), self.get_attr(k).unwrap_or(Value::Null)))
            .collect())
    }

    /// `Model (name:pk)`; the `name:` part only for models with a name attribute
    fn repr(&self) -> String {
        let schema = Self::table_schema();
        let pk_string = schema
            .primary_keys()
            .iter()
            .map(|c| render(&self.get_attr(&c.name).unwrap_or(Value::Null)))
            .collect::<Vec<_>>()
            .join(",");

        let name_string = match self.get_attr("name") {
            Some(name) => format!("{}:", render(&name)),
            None => String::new(),
        };

        format!("{} ({}{})", Self::model_name(), name_string, pk_string)
    }

    /// Multi-line rendering: repr followed by sorted attributes
    fn display(&self) -> ModelDisplay<'_, Self> {
        ModelDisplay { model: self }
    }

    /// Column values for storage
    fn to_row(&self) -> FlexResult<Row> {
        Self::table_schema()
            .columns
            .iter()
            .map(|c| -> FlexResult<(String, Value)> { Ok((c.name.clone(), self.get_item(&c.name)?)) })
            .collect()
    }

    /// Apply a stored row to this instance
    fn load_row(&mut self, row: Row) -> FlexResult<()> {
        for (key, value) in row {
            self.set_item(&key, value)?;
        }
        Ok(())
    }

    fn from_row(row: Row) -> FlexResult<Self> {
        let mut instance = Self::default();
        instance.load_row(row)?;
        Ok(instance)
    }

    /// Build an instance from `attrs` and insert it in a nested transaction
    async fn create<I, K>(attrs: I) -> FlexResult<Self>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let db = Self::check_db()?;
        let attrs = collect_attrs(attrs);

        let result: FlexResult<Self> = async {
            let mut instance = Self::default();
            for (key, value) in &attrs {
                instance.set_item(key, value.clone())?;
            }

            let row = instance.to_row()?;
            let schema = Self::table_schema();
            let stored = db
                .nested(move |session| Box::pin(async move { session.insert(&schema, row).await }))
                .await?;
            instance.load_row(stored)?;
            Ok(instance)
        }
        .await;

        let instance = result.within(|| {
            format!(
                "Couldn't create instance of {} with attrs {}",
                Self::model_name(),
                describe_attrs(&attrs)
            )
        })?;
        debug!(model = Self::model_name(), "created {}", instance.repr());
        Ok(instance)
    }

    /// Assign `attrs` and merge the instance in a nested transaction
    async fn update<I, K>(&mut self, attrs: I) -> FlexResult<&mut Self>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let db = Self::check_db()?;
        let attrs = collect_attrs(attrs);
        let context = format!(
            "Couldn't update instance {} with attrs {}",
            self.repr(),
            describe_attrs(&attrs)
        );

        let result: FlexResult<()> = async {
            for (key, value) in &attrs {
                self.set_item(key, value.clone())?;
            }

            let row = self.to_row()?;
            let schema = Self::table_schema();
            let stored = db
                .nested(move |session| Box::pin(async move { session.merge(&schema, row).await }))
                .await?;
            self.load_row(stored)
        }
        .await;

        result.within(|| context)?;
        debug!(model = Self::model_name(), "updated {}", self.repr());
        Ok(self)
    }

    /// Delete the instance's row in a nested transaction
    async fn delete(self) -> FlexResult<()> {
        let db = Self::check_db()?;
        let repr = self.repr();

        let result: FlexResult<u64> = async {
            let pk = self.primary_key_value();
            if pk.is_null() {
                return Err(FlexError::Storage(format!("Instance {} is not persisted", repr)));
            }

            let schema = Self::table_schema();
            db.nested(move |session| Box::pin(async move { session.delete(&schema, &pk).await }))
                .await
        }
        .await;

        let deleted = result.within(|| format!("Couldn't delete instance {}", repr))?;
        if deleted == 0 {
            warn!(model = Self::model_name(), "delete of {} matched no rows", repr);
        } else {
            debug!(model = Self::model_name(), "deleted {}", repr);
        }
        Ok(())
    }

    /// Fetch one instance by primary key
    async fn find(primary_key: Value) -> FlexResult<Option<Self>> {
        let schema = Self::table_schema();
        let pk_name = schema
            .primary_key()
            .map(|c| c.name.clone())
            .ok_or_else(|| {
                FlexError::Configuration(format!("{} declares no primary key", Self::model_name()))
            })?;

        Ok(Self::filter_by(&pk_name, primary_key).await?.into_iter().next())
    }

    /// Instances whose `column` equals `value`
    async fn filter_by(column: &str, value: Value) -> FlexResult<Vec<Self>> {
        let db = Self::check_db()?;
        let schema = Self::table_schema();
        let rows = db.session().await.filter_by(&schema, column, &value).await?;
        rows.into_iter().map(Self::from_row).collect()
    }

    /// Number of rows whose `column` equals `value`
    async fn count_by(column: &str, value: Value) -> FlexResult<u64> {
        let db = Self::check_db()?;
        let schema = Self::table_schema();
        let count = db.session().await.count_by(&schema, column, &value).await?;
        Ok(count)
    }
}

/// Decode an attribute value into its field type
pub fn decode_attr<T: DeserializeOwned>(model: &str, key: &str, value: Value) -> FlexResult<T> {
    serde_json::from_value(value)
        .map_err(|e| FlexError::Validation(format!("Invalid value for {}.{}: {}", model, key, e)))
}

/// Renders a model the way `SetTable::display` describes
pub struct ModelDisplay<'a, M: SetTable> {
    model: &'a M,
}

impl<M: SetTable> fmt::Display for ModelDisplay<'_, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.model.repr())?;
        match self.model.to_dict() {
            Ok(dict) => {
                let mut keys: Vec<&String> = dict.keys().collect();
                keys.sort();
                for key in keys {
                    write!(f, "\n    {}: {}", key, dict[key.as_str()])?;
                }
                Ok(())
            }
            Err(err) => write!(f, " <{}>", err),
        }
    }
}

fn unknown_attribute<M: SetTable>(key: &str) -> FlexError {
    FlexError::UnknownAttribute {
        model: M::model_name().to_string(),
        key: key.to_string(),
    }
}

fn collect_attrs<I, K>(attrs: I) -> Vec<(String, Value)>
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    attrs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

fn describe_attrs(attrs: &[(String, Value)]) -> String {
    let map: AttrMap = attrs.iter().cloned().collect();
    Value::Object(map).to_string()
}

/// Strings render bare, everything else as JSON
fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
