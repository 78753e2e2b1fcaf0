mod common;

use std::sync::atomic::{AtomicUsize, Ordering};

use common::{setup, unique_name, DummySet, Gadget, Note, Orphan};
use flextable::{
    decode_attr, Attribute, ColumnType, FlexError, FlexResult, SetTable, Value,
};
use serde_json::json;

#[tokio::test]
async fn test_create_set() {
    setup().await;
    let name = unique_name("dummy");

    let instance = DummySet::create([("name", json!(name)), ("description", json!("whatever"))])
        .await
        .unwrap();

    assert_eq!(instance.name.as_deref(), Some(name.as_str()));
    assert_eq!(instance.description.as_deref(), Some("whatever"));
    assert!(instance.id.is_some());
}

#[tokio::test]
async fn test_create_then_to_dict_reproduces_attrs() {
    setup().await;
    let name = unique_name("dummy");

    let instance = DummySet::create([("name", json!(name)), ("description", json!("whatever"))])
        .await
        .unwrap();
    let dict = instance.to_dict().unwrap();

    assert_eq!(dict["name"], json!(name));
    assert_eq!(dict["description"], json!("whatever"));
    assert_eq!(dict["id"], json!(instance.id));
    assert_eq!(dict.len(), 3);
}

#[tokio::test]
async fn test_update_set() {
    setup().await;
    let name = unique_name("dummy");

    let mut instance = DummySet::create([("name", json!(name))]).await.unwrap();
    instance.update([("description", json!("whatever"))]).await.unwrap();

    assert_eq!(instance.name.as_deref(), Some(name.as_str()));
    assert_eq!(instance.description.as_deref(), Some("whatever"));

    let stored = DummySet::find(json!(instance.id)).await.unwrap().unwrap();
    assert_eq!(stored, instance);
}

#[tokio::test]
async fn test_delete_set() {
    setup().await;
    let name = unique_name("dummy");

    let instance = DummySet::create([("name", json!(name))]).await.unwrap();
    assert_eq!(DummySet::count_by("name", json!(name)).await.unwrap(), 1);

    instance.delete().await.unwrap();
    assert_eq!(DummySet::count_by("name", json!(name)).await.unwrap(), 0);
}

#[tokio::test]
async fn test_filter_by_returns_matching_instances() {
    setup().await;
    let name = unique_name("dummy");
    let created = DummySet::create([("name", json!(name))]).await.unwrap();

    let found = DummySet::filter_by("name", json!(name)).await.unwrap();
    assert_eq!(found, vec![created]);

    let missing = DummySet::filter_by("name", json!(unique_name("absent"))).await.unwrap();
    assert!(missing.is_empty());
}

#[tokio::test]
async fn test_unbound_model_requires_bind_call() {
    let err = Orphan::create(Vec::<(String, Value)>::new()).await.unwrap_err();
    assert!(err.is_configuration());
    assert!(err.to_string().contains("Orphan::bind_db()"));

    let err = Orphan::default().delete().await.unwrap_err();
    assert!(err.to_string().contains("you must call Orphan::bind_db() first"));

    let err = Orphan::count_by("id", json!(1)).await.unwrap_err();
    assert!(err.is_configuration());
}

#[tokio::test]
async fn test_duplicate_create_wraps_storage_error() {
    setup().await;
    let name = unique_name("dummy");
    DummySet::create([("name", json!(name))]).await.unwrap();

    let err = DummySet::create([("name", json!(name))]).await.unwrap_err();

    assert!(err.is_storage());
    let message = err.to_string();
    assert!(message.starts_with("Couldn't create instance of DummySet with attrs"));
    assert!(message.contains(&name));
    assert!(message.contains("duplicate key value"));
    assert_eq!(DummySet::count_by("name", json!(name)).await.unwrap(), 1);
}

#[tokio::test]
async fn test_failed_update_leaves_stored_row() {
    setup().await;
    let first = unique_name("first");
    let second = unique_name("second");
    DummySet::create([("name", json!(first))]).await.unwrap();
    let mut other = DummySet::create([("name", json!(second))]).await.unwrap();

    let err = other.update([("name", json!(first))]).await.unwrap_err();
    assert!(err.is_storage());
    assert!(err
        .to_string()
        .starts_with(&format!("Couldn't update instance DummySet ({}:", second)));

    let stored = DummySet::find(json!(other.id)).await.unwrap().unwrap();
    assert_eq!(stored.name.as_deref(), Some(second.as_str()));
}

#[tokio::test]
async fn test_update_can_clear_defaulted_column() {
    setup().await;

    let defaulted = Note::create(Vec::<(String, Value)>::new()).await.unwrap();
    assert_eq!(defaulted.status.as_deref(), Some("draft"));

    let mut note = Note::create([("status", json!("published"))]).await.unwrap();
    assert_eq!(note.status.as_deref(), Some("published"));

    note.update([("status", Value::Null)]).await.unwrap();
    assert_eq!(note.status, None);

    let stored = Note::find(json!(note.id)).await.unwrap().unwrap();
    assert_eq!(stored.status, None);
}

#[tokio::test]
async fn test_unknown_attribute_on_plain_model() {
    setup().await;

    let mut instance = DummySet::default();
    match instance.set_item("foo", json!("bar")) {
        Err(FlexError::UnknownAttribute { model, key }) => {
            assert_eq!(model, "DummySet");
            assert_eq!(key, "foo");
        }
        other => panic!("Expected unknown attribute error, got {:?}", other),
    }
    assert!(instance.get_item("foo").is_err());

    let err = DummySet::create([("name", json!(unique_name("dummy"))), ("foo", json!("bar"))])
        .await
        .unwrap_err();
    assert!(matches!(err.root(), FlexError::UnknownAttribute { .. }));
}

#[tokio::test]
async fn test_wrong_value_type_is_validation_error() {
    let mut instance = DummySet::default();
    let err = instance.set_item("name", json!(42)).unwrap_err();
    assert!(err.is_validation());
    assert!(err.to_string().contains("DummySet.name"));
}

#[tokio::test]
async fn test_delete_unsaved_instance_fails() {
    setup().await;
    let err = DummySet::default().delete().await.unwrap_err();
    assert!(err.to_string().starts_with("Couldn't delete instance DummySet (null:null)"));
    assert!(err.to_string().contains("is not persisted"));
}

#[test]
fn test_repr_and_display() {
    let instance = DummySet {
        id: Some(3),
        name: Some("dummy".to_string()),
        description: None,
    };

    assert_eq!(instance.repr(), "DummySet (dummy:3)");
    assert_eq!(
        instance.display().to_string(),
        "DummySet (dummy:3):\n    description: null\n    id: 3\n    name: \"dummy\""
    );

    let orphan = Orphan { id: Some(7) };
    assert_eq!(orphan.repr(), "Orphan (7)");
}

#[test]
fn test_col_attr_keys_for_mixed_model() {
    let keys = Gadget::col_attr_keys();

    assert_eq!(keys.columns, vec!["id", "name"]);
    assert_eq!(keys.relationships, vec!["parts"]);
    assert_eq!(keys.hybrids, vec!["label"]);
    assert_eq!(keys.primaries, vec!["id", "name", "label"]);
    assert_eq!(keys.all, vec!["parts", "id", "name", "label"]);

    let schema = Gadget::table_schema();
    assert_eq!(schema.column_names(), vec!["id", "name"]);
}

#[test]
fn test_to_dict_includes_relationships_and_hybrids() {
    let mut gadget = Gadget::default();
    gadget.set_item("name", json!("widget")).unwrap();
    gadget.set_item("parts", json!(["bolt", "nut"])).unwrap();

    let dict = gadget.to_dict().unwrap();
    assert_eq!(dict["label"], json!("WIDGET"));
    assert_eq!(dict["parts"], json!(["bolt", "nut"]));
    assert_eq!(dict["id"], Value::Null);

    assert!(gadget.set_item("label", json!("x")).unwrap_err().is_validation());
    assert_eq!(gadget.get_item("label").unwrap(), json!("WIDGET"));
}

static CLASSIFICATIONS: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug, Default)]
struct Counted {
    id: Option<i64>,
}

impl SetTable for Counted {
    fn table_name() -> &'static str {
        "counted"
    }

    fn attributes() -> Vec<Attribute> {
        CLASSIFICATIONS.fetch_add(1, Ordering::SeqCst);
        vec![Attribute::column("id", ColumnType::BigInt).primary_key()]
    }

    fn get_attr(&self, key: &str) -> Option<Value> {
        (key == "id").then(|| json!(self.id))
    }

    fn set_attr(&mut self, key: &str, value: Value) -> FlexResult<()> {
        self.id = decode_attr(Self::model_name(), key, value)?;
        Ok(())
    }
}

#[test]
fn test_attribute_classification_is_cached() {
    for _ in 0..5 {
        assert_eq!(Counted::col_attr_keys().all, vec!["id"]);
        assert_eq!(Counted::table_schema().name, "counted");
    }
    let instance = Counted { id: Some(1) };
    assert_eq!(instance.to_dict().unwrap()["id"], json!(1));

    assert_eq!(CLASSIFICATIONS.load(Ordering::SeqCst), 1);
}
