/*!
Generic codec for library-defined value classes.

A [`ClassRecord`] has a stable, finite field list. It flattens to those fields
plus a class brand carrying its discriminator, and is rebuilt by allocating a
blank instance and assigning every field back.
*/

use std::marker::PhantomData;

use crate::codec::ObjectCodec;
use crate::copy::TraversalPath;
use crate::value::{Brand, HostObject, Table, Value};
use crate::{Result, SaveDataError};

/// A value class the generic fallback codec can flatten and rebuild.
///
/// ```
/// use savedata_core::codec::ClassRecord;
/// use savedata_core::{host_object, Result, SaveDataError, Value};
///
/// #[derive(Debug, Default, PartialEq)]
/// struct Checkpoint {
///     stage: i64,
///     name: String,
/// }
///
/// host_object!(Checkpoint, Checkpoint::CLASS_NAME);
///
/// impl ClassRecord for Checkpoint {
///     const CLASS_NAME: &'static str = "Checkpoint";
///     const FIELDS: &'static [&'static str] = &["stage", "name"];
///
///     fn field(&self, name: &str) -> Option<Value> {
///         match name {
///             "stage" => Some(Value::Int(self.stage)),
///             "name" => Some(Value::from(self.name.as_str())),
///             _ => None,
///         }
///     }
///
///     fn assign_field(&mut self, name: &str, value: Value) -> Result<()> {
///         match (name, value) {
///             ("stage", Value::Int(stage)) => self.stage = stage,
///             ("name", Value::Str(text)) => self.name = text,
///             (name, value) => {
///                 return Err(SaveDataError::validation(format!(
///                     "cannot assign {} to {name}",
///                     value.type_name()
///                 )))
///             }
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait ClassRecord: HostObject + Default {
    const CLASS_NAME: &'static str;
    const FIELDS: &'static [&'static str];

    /// Current value of `name`, for every name in [`ClassRecord::FIELDS`].
    fn field(&self, name: &str) -> Option<Value>;

    fn assign_field(&mut self, name: &str, value: Value) -> Result<()>;
}

/// [`ObjectCodec`] for any [`ClassRecord`].
pub struct ClassCodec<T> {
    _record: PhantomData<fn() -> T>,
}

impl<T: ClassRecord> ClassCodec<T> {
    pub fn new() -> Self {
        Self {
            _record: PhantomData,
        }
    }
}

impl<T: ClassRecord> Default for ClassCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ClassRecord> ObjectCodec for ClassCodec<T> {
    fn class_name(&self) -> &str {
        T::CLASS_NAME
    }

    fn brand(&self) -> Brand {
        Brand::Class
    }

    fn is_instance(&self, object: &dyn HostObject) -> bool {
        object.as_any().is::<T>()
    }

    fn fields(&self, object: &dyn HostObject, path: &TraversalPath<'_>) -> Result<Table> {
        let record = object
            .as_any()
            .downcast_ref::<T>()
            .ok_or_else(|| SaveDataError::unsupported(object.class_name(), path.to_string()))?;

        let mut fields = Table::new();
        for name in T::FIELDS {
            if let Some(value) = record.field(name) {
                fields.insert(*name, value);
            }
        }
        Ok(fields)
    }

    fn from_fields(&self, mut fields: Table, path: &TraversalPath<'_>) -> Result<Box<dyn HostObject>> {
        let mut record = T::default();
        for name in T::FIELDS {
            let value = fields
                .remove(*name)
                .ok_or_else(|| SaveDataError::missing_field(Brand::Class, *name, path.to_string()))?;
            record.assign_field(name, value).map_err(|err| {
                SaveDataError::malformed(Brand::Class, path.to_string(), err.to_string())
            })?;
        }
        Ok(Box::new(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CodecRegistry;
    use crate::copy::{deep_copy, CopyMode};
    use crate::value::Map;
    use crate::{host_object, table};

    #[derive(Debug, Default, PartialEq)]
    struct Loadout {
        slot: i64,
        label: String,
        charged: bool,
    }

    host_object!(Loadout, Loadout::CLASS_NAME);

    impl ClassRecord for Loadout {
        const CLASS_NAME: &'static str = "Loadout";
        const FIELDS: &'static [&'static str] = &["slot", "label", "charged"];

        fn field(&self, name: &str) -> Option<Value> {
            match name {
                "slot" => Some(Value::Int(self.slot)),
                "label" => Some(Value::from(self.label.as_str())),
                "charged" => Some(Value::Bool(self.charged)),
                _ => None,
            }
        }

        fn assign_field(&mut self, name: &str, value: Value) -> Result<()> {
            match (name, value) {
                ("slot", Value::Int(slot)) => self.slot = slot,
                ("label", Value::Str(label)) => self.label = label,
                ("charged", Value::Bool(charged)) => self.charged = charged,
                (name, value) => {
                    return Err(SaveDataError::validation(format!(
                        "cannot assign {} to {name}",
                        value.type_name()
                    )))
                }
            }
            Ok(())
        }
    }

    fn registry() -> CodecRegistry {
        let mut registry = CodecRegistry::new();
        registry.register_class::<Loadout>().unwrap();
        registry
    }

    #[test]
    fn test_class_serializes_with_discriminator() {
        let registry = registry();
        let loadout = Loadout {
            slot: 2,
            label: "primary".to_string(),
            charged: true,
        };

        let serialized = deep_copy(&Value::object(loadout), CopyMode::Serialize, &registry).unwrap();
        let table = serialized.as_table().unwrap();
        assert_eq!(table.get(Brand::Class), Some(&Value::from("Loadout")));
        assert_eq!(table.get("slot"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_class_round_trip_inside_map() {
        let registry = registry();
        let mut map = Map::new();
        map.insert(
            "current",
            Value::object(Loadout {
                slot: 1,
                label: "sidearm".to_string(),
                charged: false,
            }),
        );
        let value = Value::Map(map);

        let serialized = deep_copy(&value, CopyMode::Serialize, &registry).unwrap();
        let restored = deep_copy(&serialized, CopyMode::Deserialize, &registry).unwrap();
        assert_eq!(restored, value);

        let codec = ClassCodec::<Loadout>::new();
        let before = value.as_map().unwrap().get("current").unwrap().as_object().unwrap();
        let after = restored.as_map().unwrap().get("current").unwrap().as_object().unwrap();
        assert!(codec.equals(before, after));
    }

    #[test]
    fn test_missing_class_field() {
        let registry = registry();
        let data = Value::Table(table! {
            Brand::Class => "Loadout",
            "slot" => 1,
            "label" => "x",
        });

        let err = deep_copy(&data, CopyMode::Deserialize, &registry).unwrap_err();
        match err {
            SaveDataError::MissingBrandField { brand, field, .. } => {
                assert_eq!(brand, Brand::Class);
                assert_eq!(field, "charged");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_wrong_field_type_is_malformed() {
        let registry = registry();
        let data = Value::Table(table! {
            Brand::Class => "Loadout",
            "slot" => "one",
            "label" => "x",
            "charged" => false,
        });

        let err = deep_copy(&data, CopyMode::Deserialize, &registry).unwrap_err();
        assert!(matches!(err, SaveDataError::MalformedBrand { brand: Brand::Class, .. }));
    }

    #[test]
    fn test_class_name_collision_rejected() {
        let mut registry = registry();
        assert!(registry.register_class::<Loadout>().is_err());
    }
}
