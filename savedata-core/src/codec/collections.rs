/*!
Flatten and unflatten for the engine-native containers.

- Map: `{<map>: [[key, value], ...]}`
- Set: `{<set>: [member, ...]}`
- DefaultMap: `{<default-map>: [[key, value], ...], <default-map-value>: literal}`,
  or `<default-map-factory>: "name"` in place of the literal.
*/

use std::collections::BTreeMap;

use crate::copy::{Copier, CopyMode, TraversalPath};
use crate::value::{Brand, DefaultMap, DefaultSource, Key, Map, Set, Table, Value};
use crate::{Result, SaveDataError};

pub(crate) fn copy_map(copier: &Copier<'_>, map: &Map, path: &TraversalPath<'_>) -> Result<Map> {
    map.iter()
        .map(|(key, value)| -> Result<(Key, Value)> {
            Ok((key.clone(), copier.copy(value, &path.key(key))?))
        })
        .collect()
}

pub(crate) fn copy_default_map(
    copier: &Copier<'_>,
    map: &DefaultMap,
    path: &TraversalPath<'_>,
) -> Result<DefaultMap> {
    let default = match map.default_source() {
        DefaultSource::Literal(value) => {
            DefaultSource::Literal(Box::new(value.copy_primitive().unwrap_or(Value::Nil)))
        }
        DefaultSource::Factory(factory) => DefaultSource::Factory(factory.clone()),
    };
    let entries = copy_pairs(copier, map.iter(), path)?;
    Ok(DefaultMap::from_parts(default, entries))
}

pub(crate) fn flatten_map(copier: &Copier<'_>, map: &Map, path: &TraversalPath<'_>) -> Result<Table> {
    let mut table = Table::new();
    table.insert(Brand::Map, pairs_to_sequence(copier, map.iter(), path)?);
    Ok(table)
}

pub(crate) fn flatten_set(set: &Set, path: &TraversalPath<'_>) -> Result<Table> {
    let members = set
        .iter()
        .map(|member| key_to_value(member, path))
        .collect::<Result<Vec<_>>>()?;

    let mut table = Table::new();
    table.insert(Brand::Set, members);
    Ok(table)
}

pub(crate) fn flatten_default_map(
    copier: &Copier<'_>,
    map: &DefaultMap,
    path: &TraversalPath<'_>,
) -> Result<Table> {
    let mut table = Table::new();
    table.insert(Brand::DefaultMap, pairs_to_sequence(copier, map.iter(), path)?);

    match map.default_source() {
        DefaultSource::Literal(value) => {
            table.insert(
                Brand::DefaultMapValue,
                value.copy_primitive().unwrap_or(Value::Nil),
            );
        }
        DefaultSource::Factory(factory) => {
            if copier.registry().factory(factory.name()).is_none() {
                return Err(SaveDataError::UnknownFactory {
                    name: factory.name().to_string(),
                    path: path.to_string(),
                });
            }
            table.insert(Brand::DefaultMapFactory, factory.name());
        }
    }
    Ok(table)
}

pub(crate) fn unflatten_map(copier: &Copier<'_>, table: &Table, path: &TraversalPath<'_>) -> Result<Map> {
    let entries = sequence_to_pairs(copier, Brand::Map, table, path)?;
    Ok(entries.into_iter().collect())
}

pub(crate) fn unflatten_set(table: &Table, path: &TraversalPath<'_>) -> Result<Set> {
    let payload = payload(table, Brand::Set, path)?;
    let members = sequence_items(payload).ok_or_else(|| {
        SaveDataError::malformed(Brand::Set, path.to_string(), "members must be a sequence")
    })?;

    members
        .into_iter()
        .enumerate()
        .map(|(i, member)| {
            Key::from_value(member).ok_or_else(|| {
                SaveDataError::malformed(
                    Brand::Set,
                    path.index(i + 1).to_string(),
                    format!("member of type {} cannot be a set key", member.type_name()),
                )
            })
        })
        .collect()
}

pub(crate) fn unflatten_default_map(
    copier: &Copier<'_>,
    table: &Table,
    path: &TraversalPath<'_>,
) -> Result<DefaultMap> {
    let default = if let Some(literal) = table.get(Brand::DefaultMapValue) {
        if !literal.is_primitive() || literal.is_nil() {
            return Err(SaveDataError::malformed(
                Brand::DefaultMap,
                path.to_string(),
                format!("default value must be a non-nil primitive, got {}", literal.type_name()),
            ));
        }
        DefaultSource::Literal(Box::new(literal.copy_primitive().unwrap_or(Value::Nil)))
    } else if let Some(name) = table.get(Brand::DefaultMapFactory) {
        let name = name.as_str().ok_or_else(|| {
            SaveDataError::malformed(
                Brand::DefaultMap,
                path.to_string(),
                "factory reference must be a string",
            )
        })?;
        let factory = copier.registry().factory(name).ok_or_else(|| {
            SaveDataError::UnknownFactory {
                name: name.to_string(),
                path: path.to_string(),
            }
        })?;
        DefaultSource::Factory(factory.clone())
    } else {
        return Err(SaveDataError::missing_field(
            Brand::DefaultMap,
            Brand::DefaultMapValue.tag(),
            path.to_string(),
        ));
    };

    let entries = sequence_to_pairs(copier, Brand::DefaultMap, table, path)?;
    Ok(DefaultMap::from_parts(default, entries))
}

fn copy_pairs<'v>(
    copier: &Copier<'_>,
    entries: impl Iterator<Item = (&'v Key, &'v Value)>,
    path: &TraversalPath<'_>,
) -> Result<BTreeMap<Key, Value>> {
    entries
        .map(|(key, value)| -> Result<(Key, Value)> {
            Ok((key.clone(), copier.copy(value, &path.key(key))?))
        })
        .collect()
}

fn pairs_to_sequence<'v>(
    copier: &Copier<'_>,
    entries: impl Iterator<Item = (&'v Key, &'v Value)>,
    path: &TraversalPath<'_>,
) -> Result<Value> {
    debug_assert_eq!(copier.mode(), CopyMode::Serialize);

    let pairs = entries
        .map(|(key, value)| -> Result<Value> {
            let key_value = key_to_value(key, path)?;
            let value = copier.copy(value, &path.key(key))?;
            Ok(Value::Array(vec![key_value, value]))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Value::Array(pairs))
}

fn sequence_to_pairs(
    copier: &Copier<'_>,
    brand: Brand,
    table: &Table,
    path: &TraversalPath<'_>,
) -> Result<BTreeMap<Key, Value>> {
    let payload = payload(table, brand, path)?;
    let pairs = sequence_items(payload).ok_or_else(|| {
        SaveDataError::malformed(brand, path.to_string(), "entries must be a sequence of pairs")
    })?;

    let mut entries = BTreeMap::new();
    for (i, pair) in pairs.into_iter().enumerate() {
        let pair_path = path.index(i + 1);
        let (key, value) = match sequence_items(pair).as_deref() {
            Some([key, value]) => (*key, *value),
            _ => {
                return Err(SaveDataError::malformed(
                    brand,
                    pair_path.to_string(),
                    "entry must be a [key, value] pair",
                ))
            }
        };
        let key = Key::from_value(key).ok_or_else(|| {
            SaveDataError::malformed(
                brand,
                pair_path.to_string(),
                format!("key of type {} is not a primitive", key.type_name()),
            )
        })?;
        let value = copier.copy(value, &path.key(&key))?;
        entries.insert(key, value);
    }
    Ok(entries)
}

fn payload<'t>(table: &'t Table, brand: Brand, path: &TraversalPath<'_>) -> Result<&'t Value> {
    table
        .get(brand)
        .ok_or_else(|| SaveDataError::missing_field(brand, brand.tag(), path.to_string()))
}

/// Items of an array, or of a table shaped like one.
///
/// Text codecs without a native array type hand sequences back as
/// `{1: a, 2: b}` tables, and an empty sequence may come back as `{}`.
fn sequence_items(value: &Value) -> Option<Vec<&Value>> {
    match value {
        Value::Array(items) => Some(items.iter().collect()),
        Value::Table(table) if table.is_empty() => Some(Vec::new()),
        Value::Table(table) if crate::introspect::is_sequence(table) => {
            Some(table.iter().map(|(_, value)| value).collect())
        }
        _ => None,
    }
}

fn key_to_value(key: &Key, path: &TraversalPath<'_>) -> Result<Value> {
    key.to_value().ok_or_else(|| SaveDataError::InvalidKey {
        path: path.to_string(),
        reason: format!("brand \"{key}\" cannot be used as a container key"),
    })
}
