/// Find-or-create tests
///
/// At-most-once creation across mappers sharing one store
/// Run with: cargo test --test find_or_create_tests
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use tuplemapper::{
    DataType, Entity, Field, FindOrCreateOutcome, FindOrCreateProcedure, IndexDefinition,
    InMemoryClient, Key, Mapper, MapperConfig, Params, Plugin, Result, Schema, SequencePlugin,
    Space, Value,
};

fn schema() -> Arc<Schema> {
    let tag = Space::new(520, "tag")
        .field(Field::new("id", DataType::Unsigned))
        .field(Field::new("label", DataType::String))
        .field(Field::new("uses", DataType::Unsigned))
        .with_index(IndexDefinition::new("primary", &["id"]))
        .unwrap()
        .with_index(IndexDefinition::new("label", &["label"]).unique(true))
        .unwrap();
    Arc::new(Schema::new().with_space(tag).unwrap())
}

#[derive(Default)]
struct Counting {
    created: Arc<AtomicUsize>,
}

impl Plugin for Counting {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn before_create(&self, entity: &mut Entity, _space: &Space) -> Result<()> {
        self.created.fetch_add(1, Ordering::SeqCst);
        entity.set("uses", 1u64);
        Ok(())
    }
}

#[test]
fn test_concurrent_callers_insert_once() {
    let schema = schema();
    let client = Arc::new(InMemoryClient::new(schema.clone()));
    let created = Arc::new(AtomicUsize::new(0));
    let callers = 8;
    let barrier = Arc::new(Barrier::new(callers));

    let handles: Vec<_> = (0..callers)
        .map(|_| {
            let schema = schema.clone();
            let client = client.clone();
            let created = created.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let mut mapper = Mapper::new(client.clone(), schema);
                mapper.add_plugin(SequencePlugin::new(client)).unwrap();
                mapper.add_plugin(Counting { created }).unwrap();

                barrier.wait();
                let tag = mapper.find_or_create("tag", Params::by("label", "rust")).unwrap();
                tag.get("id").clone()
            })
        })
        .collect();

    let ids: Vec<Value> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(ids.iter().all(|id| *id == ids[0]));

    assert_eq!(client.stats().inserts, 1);
    assert_eq!(created.load(Ordering::SeqCst), 1);

    let stored = client.tuples(520).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0][1], Value::from("rust"));
    assert_eq!(stored[0][2], Value::Unsigned(1));
}

#[test]
fn test_created_record_gets_create_hooks_once() {
    let schema = schema();
    let client = Arc::new(InMemoryClient::new(schema.clone()));
    let counting = Counting::default();
    let created = counting.created.clone();

    let mut mapper = Mapper::new(client.clone(), schema);
    mapper.add_plugin(counting).unwrap();

    let first = mapper.find_or_create("tag", Params::by("label", "rust")).unwrap();
    let second = mapper.find_or_create("tag", Params::by("label", "rust")).unwrap();
    assert_eq!(first.get("id"), second.get("id"));
    assert_eq!(second.get("uses"), &Value::Unsigned(1));
    assert_eq!(created.load(Ordering::SeqCst), 1);
    assert_eq!(client.stats().inserts, 1);
    assert_eq!(client.stats().updates, 1);
}

#[test]
fn test_local_fallback_without_procedure() {
    let schema = schema();
    let client = Arc::new(InMemoryClient::new(schema.clone()));
    let config = MapperConfig::new().find_or_create_procedure(false);
    let mut mapper = Mapper::with_config(client.clone(), schema, config).unwrap();
    mapper.add_plugin(SequencePlugin::new(client.clone())).unwrap();

    let tag = mapper.find_or_create("tag", Params::by("label", "go")).unwrap();
    assert_eq!(tag.get("id"), &Value::Unsigned(1));
    mapper.find_or_create("tag", Params::by("label", "go")).unwrap();
    assert_eq!(client.stats().inserts, 1);
}

/// Claims to have found a record that does not exist.
struct Forgetful;

impl FindOrCreateProcedure for Forgetful {
    fn execute(&self, _space: &Space, _params: &Params) -> Result<FindOrCreateOutcome> {
        Ok(FindOrCreateOutcome {
            created: false,
            key: Key::from(99u64),
        })
    }
}

#[test]
fn test_ineffective_procedure_falls_back_to_create() {
    let schema = schema();
    let client = Arc::new(InMemoryClient::new(schema.clone()));
    let mut mapper = Mapper::new(client.clone(), schema);
    mapper.add_plugin(SequencePlugin::new(client.clone())).unwrap();
    mapper.set_procedure(Arc::new(Forgetful));

    let tag = mapper.find_or_create("tag", Params::by("label", "zig")).unwrap();
    assert_eq!(tag.get("label"), &Value::from("zig"));
    assert_eq!(client.stats().inserts, 1);
}
