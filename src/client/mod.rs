pub mod memory;

use std::fmt;

use crate::core::{MapperError, Result, Tuple, Value};

pub use memory::{ClientStats, InMemoryClient};

/// Select iterator mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IteratorType {
    /// Tuples whose leading index parts equal the given values.
    #[default]
    Eq,
    /// Every tuple of the index; required for hash indexes without a key.
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Assign,
    Add,
    Subtract,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Assign => "=",
            Self::Add => "+",
            Self::Subtract => "-",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One positional update operation as sent over the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOp {
    pub operator: Operator,
    pub field: usize,
    pub value: Value,
}

impl UpdateOp {
    pub fn assign(field: usize, value: Value) -> Self {
        Self {
            operator: Operator::Assign,
            field,
            value,
        }
    }
}

/// Synchronous request/response access to a tuple store.
///
/// Every call blocks until the store answers. Spaces are addressed by id,
/// keys are primary index values in part order.
pub trait StorageClient: Send + Sync {
    fn select(
        &self,
        space_id: u32,
        index_id: u32,
        values: &[Value],
        iterator: IteratorType,
    ) -> Result<Vec<Tuple>>;

    /// Stores a new tuple and returns it as stored.
    fn insert(&self, space_id: u32, tuple: Tuple) -> Result<Tuple>;

    /// Applies operations to the tuple with the given primary key and returns
    /// the updated tuple, or nothing when no tuple matched.
    fn update(&self, space_id: u32, key: &[Value], operations: &[UpdateOp]) -> Result<Vec<Tuple>>;

    /// Deletes by primary key, returning the removed tuple if there was one.
    fn delete(&self, space_id: u32, key: &[Value]) -> Result<Vec<Tuple>>;

    fn truncate(&self, space_id: u32) -> Result<()>;

    /// Runs a raw statement on the store.
    fn evaluate(&self, statement: &str) -> Result<Vec<Value>>;

    /// Returns the first tuple matching `values` on the index, inserting
    /// `tuple` when there is none. The flag is true when an insert happened.
    ///
    /// Stores that can run this atomically must override it; the default is
    /// a plain select followed by an insert.
    fn find_or_insert(
        &self,
        space_id: u32,
        index_id: u32,
        values: &[Value],
        tuple: Tuple,
    ) -> Result<(bool, Tuple)> {
        let iterator = if values.is_empty() {
            IteratorType::All
        } else {
            IteratorType::Eq
        };
        if let Some(found) = self
            .select(space_id, index_id, values, iterator)?
            .into_iter()
            .next()
        {
            return Ok((false, found));
        }
        Ok((true, self.insert(space_id, tuple)?))
    }

    /// Next value of a named store-side counter.
    fn sequence_next(&self, name: &str) -> Result<u64> {
        Err(MapperError::UnsupportedOperation(format!(
            "sequence '{}' is not available on this client",
            name
        )))
    }
}
