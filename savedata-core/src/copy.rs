/*!
The three-mode deep-copy engine.

- [`CopyMode::None`] produces an independent copy with the same concrete types.
- [`CopyMode::Serialize`] produces a brand-tagged plain tree with no live
  containers or objects left.
- [`CopyMode::Deserialize`] reconstructs live values from such a tree.

Every recursive step extends a [`TraversalPath`], which is only rendered when an
error or a trace line needs it.
*/

use std::collections::BTreeMap;
use std::fmt;

use tracing::trace;

use crate::codec::{collections, CodecRegistry, ObjectCodec};
use crate::introspect::{self, Shape};
use crate::value::{Brand, HostObject, Key, Table, Value};
use crate::{Result, SaveDataError};

/// Which transformation [`deep_copy`] applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyMode {
    None,
    Serialize,
    Deserialize,
}

/// Location of the value being copied, as a stack-allocated linked list.
#[derive(Debug, Clone, Copy)]
pub struct TraversalPath<'a> {
    parent: Option<&'a TraversalPath<'a>>,
    segment: Segment<'a>,
}

#[derive(Debug, Clone, Copy)]
enum Segment<'a> {
    Root(&'a str),
    Key(&'a Key),
    Index(usize),
    Label(&'static str),
}

impl<'a> TraversalPath<'a> {
    pub fn root(name: &'a str) -> Self {
        Self {
            parent: None,
            segment: Segment::Root(name),
        }
    }

    pub fn key<'b>(&'b self, key: &'b Key) -> TraversalPath<'b> {
        TraversalPath {
            parent: Some(self),
            segment: Segment::Key(key),
        }
    }

    /// A 1-based sequence position.
    pub fn index<'b>(&'b self, position: usize) -> TraversalPath<'b> {
        TraversalPath {
            parent: Some(self),
            segment: Segment::Index(position),
        }
    }

    pub fn label<'b>(&'b self, label: &'static str) -> TraversalPath<'b> {
        TraversalPath {
            parent: Some(self),
            segment: Segment::Label(label),
        }
    }
}

impl fmt::Display for TraversalPath<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut segments = Vec::new();
        let mut current = Some(self);
        while let Some(path) = current {
            segments.push(path.segment);
            current = path.parent;
        }

        let mut first = true;
        for segment in segments.iter().rev() {
            if matches!(segment, Segment::Root(name) if name.is_empty()) {
                continue;
            }
            if !first {
                f.write_str(" > ")?;
            }
            first = false;
            match segment {
                Segment::Root(name) => f.write_str(name)?,
                Segment::Key(key) => write!(f, "{key}")?,
                Segment::Index(position) => write!(f, "[{position}]")?,
                Segment::Label(label) => f.write_str(label)?,
            }
        }
        if first {
            f.write_str("<root>")?;
        }
        Ok(())
    }
}

/// Copies `value` in the given mode.
pub fn deep_copy(value: &Value, mode: CopyMode, registry: &CodecRegistry) -> Result<Value> {
    Copier::new(mode, registry).copy(value, &TraversalPath::root(""))
}

/// Copies a table that must stay a table, such as a scope root.
///
/// `root` names the start of the traversal path in errors.
pub fn deep_copy_table(table: &Table, mode: CopyMode, registry: &CodecRegistry, root: &str) -> Result<Table> {
    Copier::new(mode, registry).copy_root(table, root)
}

/// The traversal itself. Holds the mode and codec registry for one copy.
pub(crate) struct Copier<'r> {
    mode: CopyMode,
    registry: &'r CodecRegistry,
    trace_traversal: bool,
}

impl<'r> Copier<'r> {
    pub(crate) fn new(mode: CopyMode, registry: &'r CodecRegistry) -> Self {
        Self {
            mode,
            registry,
            trace_traversal: false,
        }
    }

    pub(crate) fn with_tracing(mut self, enabled: bool) -> Self {
        self.trace_traversal = enabled;
        self
    }

    pub(crate) fn mode(&self) -> CopyMode {
        self.mode
    }

    pub(crate) fn registry(&self) -> &'r CodecRegistry {
        self.registry
    }

    pub(crate) fn copy_root(&self, table: &Table, root: &str) -> Result<Table> {
        let path = TraversalPath::root(root);
        match self.copy_table(table, &path)? {
            Value::Table(copied) => Ok(copied),
            other => Err(SaveDataError::invalid_format(format!(
                "Expected a table at \"{path}\" but the data describes a {}",
                other.type_name()
            ))),
        }
    }

    pub(crate) fn copy(&self, value: &Value, path: &TraversalPath<'_>) -> Result<Value> {
        if self.trace_traversal {
            trace!(path = %path, kind = value.type_name(), mode = ?self.mode, "Copying value");
        }

        match value {
            Value::Nil => Ok(Value::Nil),
            Value::Bool(b) => Ok(Value::Bool(*b)),
            Value::Int(n) => Ok(Value::Int(*n)),
            Value::Float(f) => Ok(Value::Float(*f)),
            Value::Str(s) => Ok(Value::Str(s.clone())),
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| self.copy(item, &path.index(i + 1)))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            Value::Table(table) => self.copy_table(table, path),
            Value::Map(map) => match self.mode {
                CopyMode::None => collections::copy_map(self, map, path).map(Value::Map),
                CopyMode::Serialize => collections::flatten_map(self, map, path).map(Value::Table),
                CopyMode::Deserialize => Err(self.unexpected_live(value, path)),
            },
            Value::Set(set) => match self.mode {
                CopyMode::None => Ok(Value::Set(set.clone())),
                CopyMode::Serialize => collections::flatten_set(set, path).map(Value::Table),
                CopyMode::Deserialize => Err(self.unexpected_live(value, path)),
            },
            Value::DefaultMap(map) => match self.mode {
                CopyMode::None => collections::copy_default_map(self, map, path).map(Value::DefaultMap),
                CopyMode::Serialize => {
                    collections::flatten_default_map(self, map, path).map(Value::Table)
                }
                CopyMode::Deserialize => Err(self.unexpected_live(value, path)),
            },
            Value::Object(object) => match self.mode {
                CopyMode::Deserialize => Err(self.unexpected_live(value, path)),
                _ => self.copy_object(object.as_ref(), path),
            },
        }
    }

    fn copy_table(&self, table: &Table, path: &TraversalPath<'_>) -> Result<Value> {
        match self.mode {
            CopyMode::None => self.copy_entries(table, path).map(Value::Table),
            CopyMode::Serialize => {
                if let Some(brand) = table.brands().next() {
                    return Err(SaveDataError::InvalidKey {
                        path: path.to_string(),
                        reason: format!("brand \"{brand}\" is reserved for serialized data"),
                    });
                }
                let mut copied = self.copy_entries(table, path)?;
                if matches!(introspect::classify(&copied), Shape::Sequence | Shape::NumberKeyed) {
                    copied.insert(Brand::NumberKeyedObject, "");
                }
                Ok(Value::Table(copied))
            }
            CopyMode::Deserialize => match introspect::classify(table) {
                Shape::Branded(brand) => self.reconstruct(brand, table, path),
                _ => self.plain_table(table, path).map(Value::Table),
            },
        }
    }

    fn copy_entries(&self, table: &Table, path: &TraversalPath<'_>) -> Result<Table> {
        table
            .iter()
            .map(|(key, value)| -> Result<(Key, Value)> {
                Ok((key.clone(), self.copy(value, &path.key(key))?))
            })
            .collect()
    }

    /// Deserializes an unbranded table, undoing number-keyed coercion.
    fn plain_table(&self, table: &Table, path: &TraversalPath<'_>) -> Result<Table> {
        for brand in [Brand::DefaultMapValue, Brand::DefaultMapFactory] {
            if table.has_brand(brand) {
                return Err(SaveDataError::malformed(
                    brand,
                    path.to_string(),
                    "marker present without a default-map brand",
                ));
            }
        }

        let number_keyed = table.has_brand(Brand::NumberKeyedObject);
        let mut entries = BTreeMap::new();
        for (key, value) in table.iter() {
            if key.is_brand() {
                continue;
            }
            let restored = match key {
                Key::Str(s) if number_keyed => match s.parse::<i64>() {
                    Ok(n) => Key::Int(n),
                    Err(_) => {
                        return Err(SaveDataError::malformed(
                            Brand::NumberKeyedObject,
                            path.to_string(),
                            format!("key \"{s}\" is not an integer"),
                        ))
                    }
                },
                other => other.clone(),
            };
            entries.insert(restored, self.copy(value, &path.key(key))?);
        }
        Ok(entries.into_iter().collect())
    }

    fn reconstruct(&self, brand: Brand, table: &Table, path: &TraversalPath<'_>) -> Result<Value> {
        match brand {
            Brand::DefaultMap => {
                collections::unflatten_default_map(self, table, path).map(Value::DefaultMap)
            }
            Brand::Map => collections::unflatten_map(self, table, path).map(Value::Map),
            Brand::Set => collections::unflatten_set(table, path).map(Value::Set),
            Brand::Class => {
                let name = match table.get(Brand::Class) {
                    Some(Value::Str(name)) if !name.is_empty() => name.as_str(),
                    _ => {
                        return Err(SaveDataError::malformed(
                            Brand::Class,
                            path.to_string(),
                            "class discriminator must be a non-empty string",
                        ))
                    }
                };
                let codec = self.registry.codec_for_class(name).ok_or_else(|| {
                    SaveDataError::UnknownClass {
                        name: name.to_string(),
                        path: path.to_string(),
                    }
                })?;
                self.object_from_table(codec, table, path)
            }
            Brand::Rng | Brand::Vector => {
                let codec = self.registry.codec_for_brand(brand).ok_or_else(|| {
                    SaveDataError::malformed(brand, path.to_string(), "no codec is registered for this brand")
                })?;
                self.object_from_table(codec, table, path)
            }
            Brand::DefaultMapValue | Brand::DefaultMapFactory | Brand::NumberKeyedObject => {
                Err(SaveDataError::malformed(brand, path.to_string(), "not a primary brand"))
            }
        }
    }

    fn object_from_table(
        &self,
        codec: &dyn ObjectCodec,
        table: &Table,
        path: &TraversalPath<'_>,
    ) -> Result<Value> {
        let mut fields = Table::new();
        for (key, value) in table.iter().filter(|(key, _)| !key.is_brand()) {
            fields.insert(key, self.copy(value, &path.key(key))?);
        }
        codec.from_fields(fields, path).map(Value::Object)
    }

    fn copy_object(&self, object: &dyn HostObject, path: &TraversalPath<'_>) -> Result<Value> {
        let codec = self
            .registry
            .codec_for_object(object)
            .ok_or_else(|| SaveDataError::unsupported(object.class_name(), path.to_string()))?;

        let raw = codec.fields(object, path)?;
        let mut fields = Table::new();
        for (key, value) in raw.iter() {
            fields.insert(key, self.copy(value, &path.key(key))?);
        }

        match self.mode {
            CopyMode::Serialize => {
                let discriminator = match codec.brand() {
                    Brand::Class => codec.class_name().to_string(),
                    _ => String::new(),
                };
                fields.insert(codec.brand(), discriminator);
                Ok(Value::Table(fields))
            }
            _ => codec.from_fields(fields, path).map(Value::Object),
        }
    }

    fn unexpected_live(&self, value: &Value, path: &TraversalPath<'_>) -> SaveDataError {
        SaveDataError::UnexpectedLiveValue {
            type_name: value.type_name().to_string(),
            path: path.to_string(),
        }
    }
}
