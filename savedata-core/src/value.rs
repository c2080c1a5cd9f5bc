/*!
The dynamically-typed value model and the brand vocabulary.

A [`Value`] is either a primitive, an ordered sequence, a plain associative
[`Table`], one of the live container types ([`Map`], [`Set`], [`DefaultMap`]),
or an opaque host object behind the [`HostObject`] trait.

Brands are a dedicated [`Key`] variant rather than reserved strings, so a table
produced by user code can never be mistaken for a branded one. Only the text
codec boundary renders brands as strings.
*/

use std::any::Any;
use std::collections::{btree_map, btree_set, BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

use crate::{Result, SaveDataError};

/// Sentinel marking the true semantic type of a flattened table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Brand {
    DefaultMap,
    /// Carries the literal default value of a serialized default map.
    DefaultMapValue,
    /// Carries the registered factory name of a serialized default map.
    DefaultMapFactory,
    Map,
    Set,
    Class,
    NumberKeyedObject,
    Vector,
    Rng,
}

impl Brand {
    pub const ALL: [Brand; 9] = [
        Brand::DefaultMap,
        Brand::DefaultMapValue,
        Brand::DefaultMapFactory,
        Brand::Map,
        Brand::Set,
        Brand::Class,
        Brand::NumberKeyedObject,
        Brand::Vector,
        Brand::Rng,
    ];

    /// Brands that name a reconstructible type, in dispatch priority order.
    pub const PRIMARY: [Brand; 6] = [
        Brand::DefaultMap,
        Brand::Map,
        Brand::Set,
        Brand::Class,
        Brand::Rng,
        Brand::Vector,
    ];

    /// Textual tag used at the text codec boundary.
    pub fn tag(self) -> &'static str {
        match self {
            Brand::DefaultMap => "default-map",
            Brand::DefaultMapValue => "default-map-value",
            Brand::DefaultMapFactory => "default-map-factory",
            Brand::Map => "map",
            Brand::Set => "set",
            Brand::Class => "class",
            Brand::NumberKeyedObject => "number-keyed-object",
            Brand::Vector => "vector",
            Brand::Rng => "rng",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Brand> {
        Self::ALL.iter().copied().find(|brand| brand.tag() == tag)
    }

    pub fn is_primary(self) -> bool {
        Self::PRIMARY.contains(&self)
    }
}

impl fmt::Display for Brand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A table, map, or set key.
///
/// Ordering is total (`Bool < Int < Str < Brand`) so containers iterate
/// deterministically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Key {
    Bool(bool),
    Int(i64),
    Str(String),
    Brand(Brand),
}

impl Key {
    pub fn is_brand(&self) -> bool {
        matches!(self, Key::Brand(_))
    }

    pub fn as_brand(&self) -> Option<Brand> {
        match self {
            Key::Brand(brand) => Some(*brand),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Key::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Key::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// The key as a primitive value. Brand keys have no value form.
    pub fn to_value(&self) -> Option<Value> {
        match self {
            Key::Bool(b) => Some(Value::Bool(*b)),
            Key::Int(n) => Some(Value::Int(*n)),
            Key::Str(s) => Some(Value::Str(s.clone())),
            Key::Brand(_) => None,
        }
    }

    /// Converts a primitive value into a key. Integral floats become integer keys.
    pub fn from_value(value: &Value) -> Option<Key> {
        match value {
            Value::Bool(b) => Some(Key::Bool(*b)),
            Value::Int(n) => Some(Key::Int(*n)),
            Value::Float(f) => integral_float(*f).map(Key::Int),
            Value::Str(s) => Some(Key::Str(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Bool(b) => write!(f, "{b}"),
            Key::Int(n) => write!(f, "{n}"),
            Key::Str(s) => f.write_str(s),
            Key::Brand(brand) => write!(f, "<{brand}>"),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Str(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Str(s)
    }
}

impl From<&Key> for Key {
    fn from(key: &Key) -> Self {
        key.clone()
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Key::Int(n)
    }
}

impl From<i32> for Key {
    fn from(n: i32) -> Self {
        Key::Int(i64::from(n))
    }
}

impl From<u32> for Key {
    fn from(n: u32) -> Self {
        Key::Int(i64::from(n))
    }
}

impl From<bool> for Key {
    fn from(b: bool) -> Self {
        Key::Bool(b)
    }
}

impl From<Brand> for Key {
    fn from(brand: Brand) -> Self {
        Key::Brand(brand)
    }
}

/// An opaque class instance whose internals are only reachable through its codec.
///
/// Implement it with the [`host_object!`](crate::host_object) macro.
pub trait HostObject: Any + fmt::Debug {
    /// Class discriminator used to find the object's codec.
    fn class_name(&self) -> &str;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn object_eq(&self, other: &dyn HostObject) -> bool;
}

/// Implements [`HostObject`] for a `PartialEq + Debug` type.
#[macro_export]
macro_rules! host_object {
    ($ty:ty, $name:expr) => {
        impl $crate::value::HostObject for $ty {
            fn class_name(&self) -> &str {
                $name
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
                self
            }

            fn object_eq(&self, other: &dyn $crate::value::HostObject) -> bool {
                other
                    .as_any()
                    .downcast_ref::<$ty>()
                    .map_or(false, |other| other == self)
            }
        }
    };
}

/// Builds a [`Table`] from `key => value` pairs.
#[macro_export]
macro_rules! table {
    () => {
        $crate::value::Table::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut table = $crate::value::Table::new();
        $( table.insert($key, $value); )+
        table
    }};
}

macro_rules! keyed_entries {
    ($ty:ident) => {
        impl $ty {
            pub fn len(&self) -> usize {
                self.entries.len()
            }

            pub fn is_empty(&self) -> bool {
                self.entries.is_empty()
            }

            pub fn get<K: Into<Key>>(&self, key: K) -> Option<&Value> {
                self.entries.get(&key.into())
            }

            pub fn get_mut<K: Into<Key>>(&mut self, key: K) -> Option<&mut Value> {
                self.entries.get_mut(&key.into())
            }

            pub fn insert<K: Into<Key>, V: Into<Value>>(&mut self, key: K, value: V) -> Option<Value> {
                self.entries.insert(key.into(), value.into())
            }

            pub fn remove<K: Into<Key>>(&mut self, key: K) -> Option<Value> {
                self.entries.remove(&key.into())
            }

            pub fn contains_key<K: Into<Key>>(&self, key: K) -> bool {
                self.entries.contains_key(&key.into())
            }

            pub fn iter(&self) -> btree_map::Iter<'_, Key, Value> {
                self.entries.iter()
            }

            pub fn iter_mut(&mut self) -> btree_map::IterMut<'_, Key, Value> {
                self.entries.iter_mut()
            }

            pub fn keys(&self) -> btree_map::Keys<'_, Key, Value> {
                self.entries.keys()
            }

            pub fn clear(&mut self) {
                self.entries.clear();
            }
        }

        impl<'a> IntoIterator for &'a $ty {
            type Item = (&'a Key, &'a Value);
            type IntoIter = btree_map::Iter<'a, Key, Value>;

            fn into_iter(self) -> Self::IntoIter {
                self.entries.iter()
            }
        }

        impl IntoIterator for $ty {
            type Item = (Key, Value);
            type IntoIter = btree_map::IntoIter<Key, Value>;

            fn into_iter(self) -> Self::IntoIter {
                self.entries.into_iter()
            }
        }
    };
}

/// Plain associative table with primitive (or brand) keys.
#[derive(Debug, Default, PartialEq)]
pub struct Table {
    entries: BTreeMap<Key, Value>,
}

keyed_entries!(Table);

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_brand(&self, brand: Brand) -> bool {
        self.entries.contains_key(&Key::Brand(brand))
    }

    /// Brands present on this table, in key order.
    pub fn brands(&self) -> impl Iterator<Item = Brand> + '_ {
        self.entries.keys().filter_map(Key::as_brand)
    }

    /// Number of entries that are not brands.
    pub fn data_len(&self) -> usize {
        self.entries.keys().filter(|key| !key.is_brand()).count()
    }
}

impl FromIterator<(Key, Value)> for Table {
    fn from_iter<I: IntoIterator<Item = (Key, Value)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Live ordered map container.
#[derive(Debug, Default, PartialEq)]
pub struct Map {
    entries: BTreeMap<Key, Value>,
}

keyed_entries!(Map);

impl Map {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FromIterator<(Key, Value)> for Map {
    fn from_iter<I: IntoIterator<Item = (Key, Value)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Live set container.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Set {
    members: BTreeSet<Key>,
}

impl Set {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<K: Into<Key>>(&mut self, member: K) -> bool {
        self.members.insert(member.into())
    }

    pub fn contains<K: Into<Key>>(&self, member: K) -> bool {
        self.members.contains(&member.into())
    }

    pub fn remove<K: Into<Key>>(&mut self, member: K) -> bool {
        self.members.remove(&member.into())
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn iter(&self) -> btree_set::Iter<'_, Key> {
        self.members.iter()
    }

    pub fn clear(&mut self) {
        self.members.clear();
    }
}

impl FromIterator<Key> for Set {
    fn from_iter<I: IntoIterator<Item = Key>>(iter: I) -> Self {
        Self {
            members: iter.into_iter().collect(),
        }
    }
}

/// A named function producing fresh default values for a [`DefaultMap`].
///
/// Functions have no identity across processes, so a factory crosses the text
/// boundary by name only and must be registered with the
/// [`CodecRegistry`](crate::codec::CodecRegistry) to be restored.
#[derive(Clone)]
pub struct Factory {
    name: Rc<str>,
    build: Rc<dyn Fn() -> Value>,
}

impl Factory {
    pub fn new<N: Into<String>, F: Fn() -> Value + 'static>(name: N, build: F) -> Self {
        Self {
            name: Rc::from(name.into()),
            build: Rc::new(build),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn build(&self) -> Value {
        (self.build)()
    }
}

impl fmt::Debug for Factory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Factory")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Factory {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

/// Where a [`DefaultMap`] gets values for missing keys.
#[derive(Debug, PartialEq)]
pub enum DefaultSource {
    Literal(Box<Value>),
    Factory(Factory),
}

impl DefaultSource {
    fn produce(&self) -> Value {
        match self {
            DefaultSource::Literal(value) => value.copy_primitive().unwrap_or(Value::Nil),
            DefaultSource::Factory(factory) => factory.build(),
        }
    }
}

/// Map that materializes a default value for missing keys on demand.
#[derive(Debug, PartialEq)]
pub struct DefaultMap {
    entries: BTreeMap<Key, Value>,
    default: DefaultSource,
}

keyed_entries!(DefaultMap);

impl DefaultMap {
    /// Creates a default map with a literal default.
    ///
    /// The literal must be a non-nil primitive; containers would be shared
    /// between keys, so use [`DefaultMap::with_factory`] for them instead.
    pub fn with_default<V: Into<Value>>(default: V) -> Result<Self> {
        let default = default.into();
        if !default.is_primitive() || default.is_nil() {
            return Err(SaveDataError::validation(format!(
                "A DefaultMap literal default must be a non-nil primitive, got: {}. Use a factory for containers.",
                default.type_name()
            )));
        }

        Ok(Self {
            entries: BTreeMap::new(),
            default: DefaultSource::Literal(Box::new(default)),
        })
    }

    pub fn with_factory(factory: Factory) -> Self {
        Self {
            entries: BTreeMap::new(),
            default: DefaultSource::Factory(factory),
        }
    }

    pub(crate) fn from_parts(default: DefaultSource, entries: BTreeMap<Key, Value>) -> Self {
        Self { entries, default }
    }

    pub fn default_source(&self) -> &DefaultSource {
        &self.default
    }

    /// A fresh default value, without inserting it.
    pub fn default_value(&self) -> Value {
        self.default.produce()
    }

    /// Returns the value for `key`, inserting the default first if it is missing.
    pub fn get_or_insert_default<K: Into<Key>>(&mut self, key: K) -> &mut Value {
        let default = &self.default;
        self.entries
            .entry(key.into())
            .or_insert_with(|| default.produce())
    }

    /// Replaces every entry while keeping this map's own default source.
    pub fn replace_entries<I: IntoIterator<Item = (Key, Value)>>(&mut self, entries: I) {
        self.entries = entries.into_iter().collect();
    }
}

/// The integer an integral float represents, if it fits in an `i64`.
fn integral_float(f: f64) -> Option<i64> {
    // 2^63 is exact in f64; `as` would saturate past it.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if f.is_finite() && f.fract() == 0.0 && (-LIMIT..LIMIT).contains(&f) {
        Some(f as i64)
    } else {
        None
    }
}

/// A dynamically-typed value.
#[derive(Debug)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(Vec<Value>),
    Table(Table),
    Map(Map),
    Set(Set),
    DefaultMap(DefaultMap),
    Object(Box<dyn HostObject>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *a as f64 == *b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Table(a), Value::Table(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Set(a), Value::Set(b)) => a == b,
            (Value::DefaultMap(a), Value::DefaultMap(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => {
                a.class_name() == b.class_name() && a.object_eq(b.as_ref())
            }
            _ => false,
        }
    }
}

impl Value {
    pub fn object<T: HostObject>(object: T) -> Self {
        Value::Object(Box::new(object))
    }

    /// Human-readable type name used in error messages.
    pub fn type_name(&self) -> &str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Int(_) | Value::Float(_) => "number",
            Value::Str(_) => "string",
            Value::Array(_) => "array",
            Value::Table(_) => "table",
            Value::Map(_) => "Map",
            Value::Set(_) => "Set",
            Value::DefaultMap(_) => "DefaultMap",
            Value::Object(object) => object.class_name(),
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Value::Nil | Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Str(_)
        )
    }

    /// Copies a primitive by value; `None` for anything with substructure.
    pub fn copy_primitive(&self) -> Option<Value> {
        match self {
            Value::Nil => Some(Value::Nil),
            Value::Bool(b) => Some(Value::Bool(*b)),
            Value::Int(n) => Some(Value::Int(*n)),
            Value::Float(f) => Some(Value::Float(*f)),
            Value::Str(s) => Some(Value::Str(s.clone())),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Float(f) => integral_float(*f),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&Table> {
        match self {
            Value::Table(table) => Some(table),
            _ => None,
        }
    }

    pub fn as_table_mut(&mut self) -> Option<&mut Table> {
        match self {
            Value::Table(table) => Some(table),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut Map> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&Set> {
        match self {
            Value::Set(set) => Some(set),
            _ => None,
        }
    }

    pub fn as_set_mut(&mut self) -> Option<&mut Set> {
        match self {
            Value::Set(set) => Some(set),
            _ => None,
        }
    }

    pub fn as_default_map(&self) -> Option<&DefaultMap> {
        match self {
            Value::DefaultMap(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_default_map_mut(&mut self) -> Option<&mut DefaultMap> {
        match self {
            Value::DefaultMap(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&dyn HostObject> {
        match self {
            Value::Object(object) => Some(object.as_ref()),
            _ => None,
        }
    }

    pub fn downcast_ref<T: HostObject>(&self) -> Option<&T> {
        self.as_object()
            .and_then(|object| object.as_any().downcast_ref::<T>())
    }

    pub fn downcast_mut<T: HostObject>(&mut self) -> Option<&mut T> {
        match self {
            Value::Object(object) => object.as_any_mut().downcast_mut::<T>(),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<Table> for Value {
    fn from(table: Table) -> Self {
        Value::Table(table)
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Value::Map(map)
    }
}

impl From<Set> for Value {
    fn from(set: Set) -> Self {
        Value::Set(set)
    }
}

impl From<DefaultMap> for Value {
    fn from(map: DefaultMap) -> Self {
        Value::DefaultMap(map)
    }
}
