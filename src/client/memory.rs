use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use log::debug;
use regex::Regex;

use super::{IteratorType, Operator, StorageClient, UpdateOp};
use crate::core::{MapperError, Result, Tuple, Value};
use crate::schema::{MetadataProvider, Space};

/// Round trips served by an [`InMemoryClient`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientStats {
    pub selects: u64,
    pub inserts: u64,
    pub updates: u64,
    pub deletes: u64,
    pub truncates: u64,
}

#[derive(Default)]
struct Counters {
    selects: AtomicU64,
    inserts: AtomicU64,
    updates: AtomicU64,
    deletes: AtomicU64,
    truncates: AtomicU64,
}

#[derive(Default)]
struct Store {
    spaces: HashMap<u32, Vec<Tuple>>,
    sequences: HashMap<String, u64>,
}

impl Store {
    fn insert(&mut self, space: &Space, tuple: Tuple) -> Result<Tuple> {
        let tuples = self.spaces.entry(space.id()).or_default();
        check_unique(space, tuples, &tuple, None)?;
        tuples.push(tuple.clone());
        Ok(tuple)
    }

    fn position(&self, space: &Space, key: &[Value]) -> Result<Option<usize>> {
        let primary = space.primary_index()?;
        Ok(self.spaces.get(&space.id()).and_then(|tuples| {
            tuples
                .iter()
                .position(|t| primary.key_of_tuple(t).parts() == key)
        }))
    }

    fn select(&self, space: &Space, index_id: u32, values: &[Value], iterator: IteratorType) -> Result<Vec<Tuple>> {
        let index = space.index(index_id).ok_or_else(|| {
            MapperError::Storage(format!("No index #{} in space '{}'", index_id, space.name()))
        })?;
        let tuples = self.spaces.get(&space.id()).map(Vec::as_slice).unwrap_or_default();

        Ok(tuples
            .iter()
            .filter(|t| iterator == IteratorType::All || index.matches_prefix(t, values))
            .cloned()
            .collect())
    }
}

fn check_unique(space: &Space, tuples: &[Tuple], tuple: &[Value], skip: Option<usize>) -> Result<()> {
    for index in space.indexes().iter().filter(|i| i.unique) {
        let key = index.key_of_tuple(tuple);
        let clash = tuples
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != skip)
            .any(|(_, existing)| index.key_of_tuple(existing) == key);
        if clash {
            return Err(MapperError::DuplicateKey {
                space: space.name().to_string(),
                key: key.to_string(),
            });
        }
    }
    Ok(())
}

fn apply_operation(tuple: &mut Tuple, operation: &UpdateOp) -> Result<()> {
    if tuple.len() <= operation.field {
        tuple.resize(operation.field + 1, Value::Null);
    }
    let current = &tuple[operation.field];

    let next = match operation.operator {
        Operator::Assign => operation.value.clone(),
        Operator::Add | Operator::Subtract => {
            let add = operation.operator == Operator::Add;
            match (current, &operation.value) {
                (Value::Unsigned(a), Value::Unsigned(b)) => {
                    let result = if add { a.checked_add(*b) } else { a.checked_sub(*b) };
                    Value::Unsigned(result.ok_or_else(|| {
                        MapperError::Storage(format!("unsigned overflow in field {}", operation.field))
                    })?)
                }
                (Value::Integer(a), Value::Integer(b)) => {
                    let result = if add { a.checked_add(*b) } else { a.checked_sub(*b) };
                    Value::Integer(result.ok_or_else(|| {
                        MapperError::Storage(format!("integer overflow in field {}", operation.field))
                    })?)
                }
                (a, b) => match (a.as_f64(), b.as_f64()) {
                    (Some(a), Some(b)) => Value::Float(if add { a + b } else { a - b }),
                    _ => {
                        return Err(MapperError::TypeMismatch(format!(
                            "cannot apply '{}' to {} and {}",
                            operation.operator,
                            a.type_name(),
                            b.type_name()
                        )));
                    }
                },
            }
        }
    };

    tuple[operation.field] = next;
    Ok(())
}

/// Process-local tuple store speaking the [`StorageClient`] protocol.
///
/// All spaces live behind one lock, so `find_or_insert` and `sequence_next`
/// are atomic with respect to every other call.
pub struct InMemoryClient {
    metadata: Arc<dyn MetadataProvider>,
    store: Mutex<Store>,
    counters: Counters,
}

impl InMemoryClient {
    pub fn new(metadata: Arc<dyn MetadataProvider>) -> Self {
        Self {
            metadata,
            store: Mutex::new(Store::default()),
            counters: Counters::default(),
        }
    }

    pub fn stats(&self) -> ClientStats {
        ClientStats {
            selects: self.counters.selects.load(Ordering::Relaxed),
            inserts: self.counters.inserts.load(Ordering::Relaxed),
            updates: self.counters.updates.load(Ordering::Relaxed),
            deletes: self.counters.deletes.load(Ordering::Relaxed),
            truncates: self.counters.truncates.load(Ordering::Relaxed),
        }
    }

    /// Every tuple stored in a space, in insertion order.
    pub fn tuples(&self, space_id: u32) -> Result<Vec<Tuple>> {
        let store = self.store.lock()?;
        Ok(store.spaces.get(&space_id).cloned().unwrap_or_default())
    }

    fn space(&self, space_id: u32) -> Result<Arc<Space>> {
        self.metadata.space_by_id(space_id)
    }
}

impl StorageClient for InMemoryClient {
    fn select(&self, space_id: u32, index_id: u32, values: &[Value], iterator: IteratorType) -> Result<Vec<Tuple>> {
        let space = self.space(space_id)?;
        self.counters.selects.fetch_add(1, Ordering::Relaxed);
        debug!("select {}#{} {:?} {:?}", space.name(), index_id, values, iterator);

        let store = self.store.lock()?;
        store.select(&space, index_id, values, iterator)
    }

    fn insert(&self, space_id: u32, tuple: Tuple) -> Result<Tuple> {
        let space = self.space(space_id)?;
        self.counters.inserts.fetch_add(1, Ordering::Relaxed);
        debug!("insert {} {:?}", space.name(), tuple);

        let mut store = self.store.lock()?;
        store.insert(&space, tuple)
    }

    fn update(&self, space_id: u32, key: &[Value], operations: &[UpdateOp]) -> Result<Vec<Tuple>> {
        let space = self.space(space_id)?;
        self.counters.updates.fetch_add(1, Ordering::Relaxed);
        debug!("update {} {:?} {:?}", space.name(), key, operations);

        let mut store = self.store.lock()?;
        let Some(position) = store.position(&space, key)? else {
            return Ok(Vec::new());
        };

        let tuples = store.spaces.entry(space_id).or_default();
        let mut updated = tuples[position].clone();
        for operation in operations {
            apply_operation(&mut updated, operation)?;
        }
        if space.primary_index()?.key_of_tuple(&updated).parts() != key {
            return Err(MapperError::Storage(format!(
                "attempt to modify the primary key of a tuple in '{}'",
                space.name()
            )));
        }
        check_unique(&space, tuples, &updated, Some(position))?;
        tuples[position] = updated.clone();
        Ok(vec![updated])
    }

    fn delete(&self, space_id: u32, key: &[Value]) -> Result<Vec<Tuple>> {
        let space = self.space(space_id)?;
        self.counters.deletes.fetch_add(1, Ordering::Relaxed);
        debug!("delete {} {:?}", space.name(), key);

        let mut store = self.store.lock()?;
        let Some(position) = store.position(&space, key)? else {
            return Ok(Vec::new());
        };
        let removed = store.spaces.entry(space_id).or_default().remove(position);
        Ok(vec![removed])
    }

    fn truncate(&self, space_id: u32) -> Result<()> {
        let space = self.space(space_id)?;
        self.counters.truncates.fetch_add(1, Ordering::Relaxed);
        debug!("truncate {}", space.name());

        let mut store = self.store.lock()?;
        store.spaces.remove(&space_id);
        Ok(())
    }

    fn evaluate(&self, statement: &str) -> Result<Vec<Value>> {
        let truncate = Regex::new(r"^\s*box\.space\[(\d+)\]:truncate\(\)\s*$")
            .map_err(|e| MapperError::Parse(e.to_string()))?;

        if let Some(captures) = truncate.captures(statement) {
            let space_id = captures[1]
                .parse::<u32>()
                .map_err(|e| MapperError::Parse(e.to_string()))?;
            self.truncate(space_id)?;
            return Ok(Vec::new());
        }

        Err(MapperError::UnsupportedOperation(format!(
            "cannot evaluate '{}' in memory",
            statement
        )))
    }

    fn find_or_insert(&self, space_id: u32, index_id: u32, values: &[Value], tuple: Tuple) -> Result<(bool, Tuple)> {
        let space = self.space(space_id)?;
        self.counters.selects.fetch_add(1, Ordering::Relaxed);

        let mut store = self.store.lock()?;
        let iterator = if values.is_empty() {
            IteratorType::All
        } else {
            IteratorType::Eq
        };
        if let Some(found) = store.select(&space, index_id, values, iterator)?.into_iter().next() {
            debug!("find_or_insert {} found {:?}", space.name(), found);
            return Ok((false, found));
        }

        self.counters.inserts.fetch_add(1, Ordering::Relaxed);
        debug!("find_or_insert {} inserts {:?}", space.name(), tuple);
        Ok((true, store.insert(&space, tuple)?))
    }

    fn sequence_next(&self, name: &str) -> Result<u64> {
        let mut store = self.store.lock()?;
        let counter = store.sequences.entry(name.to_string()).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DataType;
    use crate::schema::{Field, IndexDefinition, Schema};

    fn client() -> InMemoryClient {
        let space = Space::new(600, "counter")
            .field(Field::new("id", DataType::Unsigned))
            .field(Field::new("name", DataType::String))
            .field(Field::new("hits", DataType::Unsigned))
            .with_index(IndexDefinition::new("primary", &["id"]))
            .unwrap()
            .with_index(IndexDefinition::new("name", &["name"]).unique(true))
            .unwrap();
        InMemoryClient::new(Arc::new(Schema::new().with_space(space).unwrap()))
    }

    fn row(id: u64, name: &str, hits: u64) -> Tuple {
        vec![Value::Unsigned(id), Value::from(name), Value::Unsigned(hits)]
    }

    #[test]
    fn test_insert_and_select() {
        let client = client();
        client.insert(600, row(1, "a", 0)).unwrap();
        client.insert(600, row(2, "b", 0)).unwrap();

        let found = client.select(600, 1, &[Value::from("b")], IteratorType::Eq).unwrap();
        assert_eq!(found, vec![row(2, "b", 0)]);
        assert_eq!(client.select(600, 0, &[], IteratorType::All).unwrap().len(), 2);
        assert_eq!(client.stats().inserts, 2);
    }

    #[test]
    fn test_unique_indexes_enforced() {
        let client = client();
        client.insert(600, row(1, "a", 0)).unwrap();
        assert!(matches!(
            client.insert(600, row(1, "z", 0)),
            Err(MapperError::DuplicateKey { .. })
        ));
        assert!(client.insert(600, row(2, "a", 0)).is_err());
    }

    #[test]
    fn test_update_operations() {
        let client = client();
        client.insert(600, row(1, "a", 5)).unwrap();
        let ops = [
            UpdateOp { operator: Operator::Add, field: 2, value: Value::Unsigned(3) },
            UpdateOp::assign(1, Value::from("b")),
        ];
        let updated = client.update(600, &[Value::Unsigned(1)], &ops).unwrap();
        assert_eq!(updated, vec![row(1, "b", 8)]);

        assert!(client.update(600, &[Value::Unsigned(9)], &ops).unwrap().is_empty());
    }

    #[test]
    fn test_arithmetic_overflow_is_an_error() {
        let client = client();
        client
            .insert(600, vec![Value::Unsigned(1), Value::from("a"), Value::Integer(i64::MAX)])
            .unwrap();

        let add = [UpdateOp { operator: Operator::Add, field: 2, value: Value::Integer(1) }];
        assert!(matches!(
            client.update(600, &[Value::Unsigned(1)], &add),
            Err(MapperError::Storage(_))
        ));

        let sub = [UpdateOp { operator: Operator::Subtract, field: 2, value: Value::Integer(-1) }];
        assert!(client.update(600, &[Value::Unsigned(1)], &sub).is_err());
        assert_eq!(client.tuples(600).unwrap()[0][2], Value::Integer(i64::MAX));
    }

    #[test]
    fn test_update_keeps_primary_key() {
        let client = client();
        client.insert(600, row(1, "a", 0)).unwrap();
        let ops = [UpdateOp::assign(0, Value::Unsigned(2))];
        assert!(matches!(
            client.update(600, &[Value::Unsigned(1)], &ops),
            Err(MapperError::Storage(_))
        ));
        assert_eq!(client.tuples(600).unwrap(), vec![row(1, "a", 0)]);
    }

    #[test]
    fn test_delete_and_truncate() {
        let client = client();
        client.insert(600, row(1, "a", 0)).unwrap();
        client.insert(600, row(2, "b", 0)).unwrap();

        assert_eq!(client.delete(600, &[Value::Unsigned(1)]).unwrap().len(), 1);
        assert!(client.delete(600, &[Value::Unsigned(1)]).unwrap().is_empty());

        client.evaluate("box.space[600]:truncate()").unwrap();
        assert!(client.tuples(600).unwrap().is_empty());
        assert!(client.evaluate("os.exit()").is_err());
    }

    #[test]
    fn test_find_or_insert_inserts_once() {
        let client = client();
        let (created, _) = client.find_or_insert(600, 1, &[Value::from("a")], row(1, "a", 0)).unwrap();
        assert!(created);
        let (created, tuple) = client.find_or_insert(600, 1, &[Value::from("a")], row(2, "a", 0)).unwrap();
        assert!(!created);
        assert_eq!(tuple, row(1, "a", 0));
        assert_eq!(client.stats().inserts, 1);
    }

    #[test]
    fn test_sequences() {
        let client = client();
        assert_eq!(client.sequence_next("counter").unwrap(), 1);
        assert_eq!(client.sequence_next("counter").unwrap(), 2);
        assert_eq!(client.sequence_next("other").unwrap(), 1);
    }
}
