use crate::core::{Key, Params, Result, Value};
use crate::entity::Entity;
use crate::schema::Space;

/// Rewrites a bare primary key into a named filter.
///
/// A single scalar (or one-element list) becomes `{primary_field: value}`
/// when the primary index has exactly one part and coercing the value to
/// that part's type leaves it unchanged. Anything else is returned as is.
pub fn normalize(space: &Space, params: Params) -> Params {
    match params {
        Params::Scalar(value) => match named_primary(space, &value) {
            Some(named) => named,
            None => Params::Scalar(value),
        },
        Params::List(values) if values.len() == 1 => match named_primary(space, &values[0]) {
            Some(named) => named,
            None => Params::List(values),
        },
        other => other,
    }
}

fn named_primary(space: &Space, value: &Value) -> Option<Params> {
    let primary = space.primary_index().ok()?;
    let [part] = primary.parts.as_slice() else {
        return None;
    };

    let coerced = part.data_type.coerce(value).ok()?;
    (coerced == *value).then(|| Params::by(space.format()[part.field].name.clone(), coerced))
}

/// Identity key of an entity, read from its primary index fields by name.
///
/// Values are coerced to the part types so that an entity and the tuple it
/// is stored as resolve to the same key.
pub fn key_of_entity(space: &Space, entity: &Entity) -> Result<Key> {
    let primary = space.primary_index()?;
    Ok(Key::new(
        primary
            .parts
            .iter()
            .map(|part| {
                let value = entity.get(&space.format()[part.field].name);
                part.data_type.coerce(value).unwrap_or_else(|_| value.clone())
            })
            .collect(),
    ))
}

/// Identity key of a stored tuple, read by position.
pub fn key_of_tuple(space: &Space, tuple: &[Value]) -> Result<Key> {
    space.tuple_key(tuple)
}
