//! Flex Table - Models with an open-ended JSON attribute bag
//!
//! Keys declared on the model route to the model's own attributes; any
//! other key lands in the `flex_data` column. Wire the flex behavior into a
//! model's [`SetTable`] impl with [`flex_table_items!`](crate::flex_table_items):
//!
//! ```ignore
//! impl SetTable for Widget {
//!     // table_name, attributes (including Self::flex_attribute()), get_attr, set_attr
//!     flextable::flex_table_items!();
//! }
//!
//! impl FlexTable for Widget {
//!     fn flex_data(&self) -> &FlexData { &self.flex_data }
//!     fn set_flex_data(&mut self, data: FlexData) { self.flex_data = data; }
//! }
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::{json, Value};

use super::attributes::{Attribute, ColumnType};
use super::flex_data::{FlexData, FLEX_DATA};
use super::metadata;
use super::set_table::{AttrMap, SetTable};
use crate::error::{FlexError, FlexResult};

/// Flexible-attribute extension of [`SetTable`]
pub trait FlexTable: SetTable {
    fn flex_data(&self) -> &FlexData;

    /// Replace the whole flex map
    fn set_flex_data(&mut self, data: FlexData);

    /// Declaration of the flex column, to include in `attributes()`
    fn flex_attribute() -> Attribute {
        Attribute::column(FLEX_DATA, ColumnType::Json)
            .not_null()
            .default_value(json!({}))
    }

    /// Declared attribute keys other than `flex_data`
    fn base_keys() -> Arc<BTreeSet<String>> {
        metadata::metadata::<Self>().base_keys.clone()
    }

    fn flex_keys(&self) -> Vec<String> {
        self.flex_data().keys().map(str::to_string).collect()
    }

    fn is_base_key(key: &str) -> bool {
        key == FLEX_DATA || Self::base_keys().contains(key)
    }

    /// Flex entries are not stored when null, so absent keys read as `null`
    fn flex_get_item(&self, key: &str) -> FlexResult<Value> {
        if key == FLEX_DATA {
            return Ok(self.flex_data().to_value());
        }
        if Self::is_base_key(key) {
            return self.get_attr(key).ok_or_else(|| FlexError::UnknownAttribute {
                model: Self::model_name().to_string(),
                key: key.to_string(),
            });
        }
        Ok(self.flex_data().get(key).cloned().unwrap_or(Value::Null))
    }

    /// Assign a declared attribute or a flex entry
    ///
    /// Flex entries go into a new map that replaces the old one. A null
    /// value for a flex key is ignored after the key is validated.
    fn flex_set_item(&mut self, key: &str, value: Value) -> FlexResult<()> {
        if key == FLEX_DATA {
            let data = FlexData::from_value(value)?;
            self.set_flex_data(data);
            return Ok(());
        }
        if Self::is_base_key(key) {
            return self.set_attr(key, value);
        }

        let updated = self.flex_data().with_entry(key, value)?;
        self.set_flex_data(updated);
        Ok(())
    }

    /// Declared values merged with flex entries; overlapping keys are an error
    fn flex_to_dict(&self) -> FlexResult<AttrMap> {
        let mut dict: AttrMap = Self::base_keys()
            .iter()
            .map(|k| (k.clone(), self.get_attr(k).unwrap_or(Value::Null)))
            .collect();

        let overlaps: Vec<&str> = self
            .flex_data()
            .keys()
            .filter(|k| dict.contains_key(*k))
            .collect();
        if !overlaps.is_empty() {
            return Err(FlexError::Conflict(format!(
                "For {}, there were conflicts between base and flex attributes on keys {:?}. \
                 Issue must be fixed by logging directly into the database and resolving the \
                 conflict manually",
                self.repr(),
                overlaps
            )));
        }

        for (key, value) in self.flex_data().iter() {
            dict.insert(key.to_string(), value.clone());
        }
        Ok(dict)
    }
}

/// Route `get_item`, `set_item` and `to_dict` of a [`SetTable`] impl through
/// the [`FlexTable`] behavior. Invoke inside the `impl SetTable` block.
#[macro_export]
macro_rules! flex_table_items {
    () => {
        fn get_item(&self, key: &str) -> $crate::FlexResult<$crate::Value> {
            <Self as $crate::FlexTable>::flex_get_item(self, key)
        }

        fn set_item(&mut self, key: &str, value: $crate::Value) -> $crate::FlexResult<()> {
            <Self as $crate::FlexTable>::flex_set_item(self, key, value)
        }

        fn to_dict(&self) -> $crate::FlexResult<$crate::AttrMap> {
            <Self as $crate::FlexTable>::flex_to_dict(self)
        }
    };
}
