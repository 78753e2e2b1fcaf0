//! Model Metadata - Per-type caches and database bindings
//!
//! Attribute classification and table layout are computed the first time a
//! model type asks for them and kept for the lifetime of the process.
//! Database handles are bound per model type.

use std::any::TypeId;
use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use tracing::debug;

use super::attributes::{AttrKeys, TableSchema};
use super::flex_data::FLEX_DATA;
use super::set_table::SetTable;
use crate::database::Database;

/// Cached description of a model type
#[derive(Debug)]
pub struct ModelMeta {
    pub attr_keys: Arc<AttrKeys>,
    pub table: Arc<TableSchema>,
    /// All attribute keys except the flex column
    pub base_keys: Arc<BTreeSet<String>>,
}

impl ModelMeta {
    fn build<M: SetTable>() -> Self {
        let attributes = M::attributes();
        let attr_keys = AttrKeys::classify(&attributes);
        let base_keys = attr_keys
            .all
            .iter()
            .filter(|k| k.as_str() != FLEX_DATA)
            .cloned()
            .collect();

        Self {
            table: Arc::new(TableSchema::new(M::table_name(), &attributes)),
            attr_keys: Arc::new(attr_keys),
            base_keys: Arc::new(base_keys),
        }
    }
}

static METADATA: Lazy<DashMap<TypeId, Arc<ModelMeta>>> = Lazy::new(DashMap::new);

static BINDINGS: Lazy<DashMap<TypeId, Database>> = Lazy::new(DashMap::new);

/// Metadata for `M`, computed on first use
pub fn metadata<M: SetTable>() -> Arc<ModelMeta> {
    let type_id = TypeId::of::<M>();
    if let Some(meta) = METADATA.get(&type_id) {
        return meta.value().clone();
    }

    // The entry lock is held while building so attributes() runs once per type
    METADATA
        .entry(type_id)
        .or_insert_with(|| {
            debug!(model = M::model_name(), "classifying model attributes");
            Arc::new(ModelMeta::build::<M>())
        })
        .value()
        .clone()
}

/// Bind `db` to model `M`, replacing any earlier binding
pub fn bind<M: SetTable>(db: Database) {
    debug!(model = M::model_name(), backend = db.backend(), "database bound");
    BINDINGS.insert(TypeId::of::<M>(), db);
}

/// Database bound to model `M`, if any
pub fn bound<M: SetTable>() -> Option<Database> {
    BINDINGS.get(&TypeId::of::<M>()).map(|db| db.value().clone())
}
