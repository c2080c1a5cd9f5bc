/*!
Per-type codecs for values the copy engine cannot traverse structurally.

This module defines the codec abstraction (port) for opaque host objects and the
registry the copy engine consults. Live containers (Map, Set, DefaultMap) are
engine-native and handled by [`collections`]; everything behind
[`HostObject`](crate::value::HostObject) goes through an [`ObjectCodec`] looked
up by class name or, when deserializing, by brand.
*/

pub mod class;
pub mod collections;
pub mod rng;
pub mod vector;

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::copy::{CopyMode, TraversalPath};
use crate::value::{Brand, Factory, HostObject, Table, Value};
use crate::{Result, SaveDataError};

pub use class::{ClassCodec, ClassRecord};
pub use rng::{Rng, RngCodec};
pub use vector::{Vector, VectorCodec};

/// Flatten/unflatten/equals triple for one opaque value type.
///
/// Implementations only deal with their own fields. The engine recursively
/// copies whatever [`ObjectCodec::fields`] returns and adds the brand keys, so
/// a codec never sees brands or serialized nested values.
pub trait ObjectCodec {
    /// Class discriminator, matched against [`HostObject::class_name`].
    fn class_name(&self) -> &str;

    /// Brand written on the flattened table. One of `Class`, `Rng`, `Vector`.
    fn brand(&self) -> Brand;

    /// Live-value predicate used by NONE and SERIALIZE.
    fn is_instance(&self, object: &dyn HostObject) -> bool {
        object.class_name() == self.class_name()
    }

    /// The essential reconstructible fields of `object`.
    fn fields(&self, object: &dyn HostObject, path: &TraversalPath<'_>) -> Result<Table>;

    /// Rebuilds an instance from fields produced by [`ObjectCodec::fields`].
    fn from_fields(&self, fields: Table, path: &TraversalPath<'_>) -> Result<Box<dyn HostObject>>;

    fn equals(&self, a: &dyn HostObject, b: &dyn HostObject) -> bool {
        a.object_eq(b)
    }
}

/// Open registry of object codecs and default-map factories.
pub struct CodecRegistry {
    by_class: BTreeMap<String, Rc<dyn ObjectCodec>>,
    by_brand: BTreeMap<Brand, Rc<dyn ObjectCodec>>,
    factories: BTreeMap<String, Factory>,
}

impl CodecRegistry {
    /// Creates a registry with the RNG and Vector codecs installed.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.install(Rc::new(RngCodec));
        registry.install(Rc::new(VectorCodec));
        registry
    }

    /// Creates a registry with no codecs at all.
    pub fn empty() -> Self {
        Self {
            by_class: BTreeMap::new(),
            by_brand: BTreeMap::new(),
            factories: BTreeMap::new(),
        }
    }

    /// Registers a codec. Fails if its brand is not an object brand or the
    /// class name is already taken.
    pub fn register_codec<C: ObjectCodec + 'static>(&mut self, codec: C) -> Result<()> {
        let brand = codec.brand();
        if !matches!(brand, Brand::Class | Brand::Rng | Brand::Vector) {
            return Err(SaveDataError::validation(format!(
                "Brand \"{brand}\" is reserved for engine-native containers"
            )));
        }
        if self.by_class.contains_key(codec.class_name()) {
            return Err(SaveDataError::validation(format!(
                "A codec is already registered for class \"{}\"",
                codec.class_name()
            )));
        }
        if brand != Brand::Class && self.by_brand.contains_key(&brand) {
            return Err(SaveDataError::validation(format!(
                "A codec is already registered for brand \"{brand}\""
            )));
        }

        self.install(Rc::new(codec));
        Ok(())
    }

    /// Registers the generic class fallback codec for `T`.
    pub fn register_class<T: ClassRecord>(&mut self) -> Result<()> {
        self.register_codec(ClassCodec::<T>::new())
    }

    /// Registers a default-map factory so it can cross the text boundary by name.
    /// A factory registered under an existing name replaces it.
    pub fn register_factory(&mut self, factory: Factory) {
        tracing::debug!(factory = factory.name(), "Registered default-map factory");
        self.factories.insert(factory.name().to_string(), factory);
    }

    pub fn factory(&self, name: &str) -> Option<&Factory> {
        self.factories.get(name)
    }

    pub fn codec_for_object(&self, object: &dyn HostObject) -> Option<&dyn ObjectCodec> {
        self.by_class
            .get(object.class_name())
            .filter(|codec| codec.is_instance(object))
            .map(|codec| codec.as_ref())
    }

    pub fn codec_for_class(&self, class_name: &str) -> Option<&dyn ObjectCodec> {
        self.by_class
            .get(class_name)
            .filter(|codec| codec.brand() == Brand::Class)
            .map(|codec| codec.as_ref())
    }

    pub fn codec_for_brand(&self, brand: Brand) -> Option<&dyn ObjectCodec> {
        self.by_brand.get(&brand).map(|codec| codec.as_ref())
    }

    /// Codec-aware equality for two values; objects compare through their codec.
    pub fn values_equal(&self, a: &Value, b: &Value) -> bool {
        match (a.as_object(), b.as_object()) {
            (Some(left), Some(right)) => match self.codec_for_object(left) {
                Some(codec) => codec.is_instance(right) && codec.equals(left, right),
                None => a == b,
            },
            _ => a == b,
        }
    }

    pub fn deep_copy(&self, value: &Value, mode: CopyMode) -> Result<Value> {
        crate::copy::deep_copy(value, mode, self)
    }

    fn install(&mut self, codec: Rc<dyn ObjectCodec>) {
        if codec.brand() != Brand::Class {
            self.by_brand.insert(codec.brand(), Rc::clone(&codec));
        }
        self.by_class.insert(codec.class_name().to_string(), codec);
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("classes", &self.by_class.keys().collect::<Vec<_>>())
            .field("factories", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Looks up a required field, failing with the brand and path when absent.
pub fn require_field<'t>(
    fields: &'t Table,
    brand: Brand,
    name: &str,
    path: &TraversalPath<'_>,
) -> Result<&'t Value> {
    fields
        .get(name)
        .ok_or_else(|| SaveDataError::missing_field(brand, name, path.to_string()))
}

pub fn require_int(fields: &Table, brand: Brand, name: &str, path: &TraversalPath<'_>) -> Result<i64> {
    let value = require_field(fields, brand, name, path)?;
    value.as_int().ok_or_else(|| {
        SaveDataError::malformed(
            brand,
            path.to_string(),
            format!("field \"{name}\" must be an integer, got {}", value.type_name()),
        )
    })
}

pub fn require_f64(fields: &Table, brand: Brand, name: &str, path: &TraversalPath<'_>) -> Result<f64> {
    let value = require_field(fields, brand, name, path)?;
    value.as_f64().ok_or_else(|| {
        SaveDataError::malformed(
            brand,
            path.to_string(),
            format!("field \"{name}\" must be a number, got {}", value.type_name()),
        )
    })
}
