use crate::client::UpdateOp;
use crate::core::{Result, Tuple, Value};
use crate::entity::Entity;
use crate::schema::Space;

/// Marks every format field the entity lacks as explicitly `null`.
pub fn complete_fields(space: &Space, entity: &mut Entity) {
    for field in space.format() {
        if !entity.has(&field.name) {
            entity.set(field.name.clone(), Value::Null);
        }
    }
}

/// Builds the full tuple for an entity and writes the coerced values back.
///
/// Per field: coerce, then replace `null` by the declared default, or by the
/// type default when the field is not nullable.
pub fn build_tuple(space: &Space, entity: &mut Entity) -> Result<Tuple> {
    let mut tuple = Vec::with_capacity(space.format().len());

    for field in space.format() {
        let mut value = field.data_type.coerce(entity.get(&field.name))?;
        if value.is_null() {
            if let Some(default) = &field.default {
                value = field.data_type.coerce(default)?;
            } else if !field.nullable {
                value = field.data_type.default_value();
            }
        }

        entity.set(field.name.clone(), value.clone());
        tuple.push(value);
    }

    Ok(tuple)
}

/// Copies tuple positions into named fields; missing positions read as `null`.
pub fn hydrate_fields(space: &Space, entity: &mut Entity, tuple: &[Value]) {
    for (position, field) in space.format().iter().enumerate() {
        entity.set(
            field.name.clone(),
            tuple.get(position).cloned().unwrap_or(Value::Null),
        );
    }
}

/// Assignments for every position where `current` differs from `original`.
pub fn diff(original: &[Value], current: &[Value]) -> Vec<UpdateOp> {
    current
        .iter()
        .enumerate()
        .filter(|(position, value)| original.get(*position) != Some(*value))
        .map(|(position, value)| UpdateOp::assign(position, value.clone()))
        .collect()
}

/// Primary key values taken from a snapshot by position.
pub fn primary_values(space: &Space, snapshot: &[Value]) -> Result<Vec<Value>> {
    Ok(space.primary_index()?.key_of_tuple(snapshot).into_parts())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Operator;
    use crate::core::DataType;
    use crate::schema::{Field, IndexDefinition};
    use proptest::prelude::*;

    fn space() -> Space {
        Space::new(1, "article")
            .field(Field::new("id", DataType::Unsigned))
            .field(Field::new("title", DataType::String).with_default("draft"))
            .field(Field::new("views", DataType::Unsigned))
            .field(Field::new("note", DataType::String).nullable())
            .with_index(IndexDefinition::new("primary", &["id"]))
            .unwrap()
    }

    #[test]
    fn test_build_tuple_applies_defaults_and_coercion() {
        let space = space();
        let mut entity = Entity::new();
        entity.set("id", "12");

        let tuple = build_tuple(&space, &mut entity).unwrap();
        assert_eq!(
            tuple,
            vec![Value::Unsigned(12), Value::from("draft"), Value::Unsigned(0), Value::Null]
        );
        assert_eq!(entity.get("id"), &Value::Unsigned(12));
        assert_eq!(entity.get("title"), &Value::from("draft"));
    }

    #[test]
    fn test_build_tuple_rejects_bad_values() {
        let space = space();
        let mut entity = Entity::new();
        entity.set("views", "many");
        assert!(build_tuple(&space, &mut entity).is_err());
    }

    #[test]
    fn test_hydrate_then_build_round_trips() {
        let space = space();
        let tuple = vec![
            Value::Unsigned(3),
            Value::from("hello"),
            Value::Unsigned(10),
            Value::Null,
        ];
        let mut entity = Entity::new();
        hydrate_fields(&space, &mut entity, &tuple);
        assert_eq!(build_tuple(&space, &mut entity).unwrap(), tuple);
    }

    #[test]
    fn test_round_trip_for_every_type() {
        let space = Space::new(2, "sample")
            .field(Field::new("id", DataType::Unsigned))
            .field(Field::new("delta", DataType::Integer))
            .field(Field::new("ratio", DataType::Number))
            .field(Field::new("label", DataType::String))
            .field(Field::new("active", DataType::Boolean))
            .field(Field::new("tags", DataType::Array))
            .field(Field::new("extra", DataType::Any))
            .field(Field::new("note", DataType::String).nullable())
            .with_index(IndexDefinition::new("primary", &["id"]))
            .unwrap();

        let stored = vec![
            Value::Integer(4),
            Value::Unsigned(5),
            Value::Unsigned(3),
            Value::Unsigned(12),
            Value::Unsigned(1),
            Value::Array(vec![Value::from("a")]),
            Value::Unsigned(7),
            Value::Null,
        ];
        let coerced = space.coerce_tuple(&stored).unwrap();
        assert_eq!(
            coerced,
            vec![
                Value::Unsigned(4),
                Value::Integer(5),
                Value::Float(3.0),
                Value::from("12"),
                Value::Boolean(true),
                Value::Array(vec![Value::from("a")]),
                Value::Unsigned(7),
                Value::Null,
            ]
        );
        assert_eq!(space.coerce_tuple(&coerced).unwrap(), coerced);

        let mut entity = Entity::new();
        hydrate_fields(&space, &mut entity, &coerced);
        let rebuilt = build_tuple(&space, &mut entity).unwrap();
        assert_eq!(rebuilt, coerced);
        assert!(diff(&coerced, &rebuilt).is_empty());
    }

    #[test]
    fn test_diff_reports_changed_and_missing_positions() {
        let original = vec![Value::Unsigned(1), Value::from("a")];
        let current = vec![Value::Unsigned(1), Value::from("b"), Value::Unsigned(0)];
        let ops = diff(&original, &current);

        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].operator, Operator::Assign);
        assert_eq!((ops[0].field, ops[0].value.clone()), (1, Value::from("b")));
        assert_eq!((ops[1].field, ops[1].value.clone()), (2, Value::Unsigned(0)));
    }

    #[test]
    fn test_diff_of_identical_tuples_is_empty() {
        let tuple = vec![Value::Unsigned(1), Value::Null];
        assert!(diff(&tuple, &tuple).is_empty());
    }

    #[test]
    fn test_primary_values_come_from_snapshot() {
        let snapshot = vec![Value::Unsigned(9), Value::from("x"), Value::Unsigned(0), Value::Null];
        assert_eq!(primary_values(&space(), &snapshot).unwrap(), vec![Value::Unsigned(9)]);
    }

    proptest! {
        #[test]
        fn prop_diff_touches_exactly_the_changed_positions(
            original in prop::collection::vec(0u64..4, 1..12),
            flips in prop::collection::vec(any::<bool>(), 12),
        ) {
            let original: Vec<Value> = original.into_iter().map(Value::Unsigned).collect();
            let current: Vec<Value> = original
                .iter()
                .zip(&flips)
                .map(|(value, flip)| match (value, flip) {
                    (Value::Unsigned(u), true) => Value::Unsigned(u + 10),
                    (v, _) => v.clone(),
                })
                .collect();

            let touched: Vec<usize> = diff(&original, &current).iter().map(|op| op.field).collect();
            let expected: Vec<usize> = (0..original.len()).filter(|i| flips[*i]).collect();
            prop_assert_eq!(touched, expected);
        }
    }
}
