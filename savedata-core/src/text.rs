/*!
The text codec boundary.

This is the only place where brands become strings. Keys are encoded so that
every [`Key`] variant survives JSON's string-only object keys:

| key                 | text                                  |
|---------------------|---------------------------------------|
| brand               | `@tag`                                |
| integer             | `#42` (plain `42` in number-keyed tables) |
| boolean             | `?true` / `?false`                    |
| string              | itself, or `~` + itself when it starts with `@ # ? ~` |
*/

use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Number, Value as Json};
use tracing::warn;

use crate::copy::TraversalPath;
use crate::metadata::SaveMetadata;
use crate::value::{Brand, Key, Table, Value};
use crate::{Result, SaveDataError};

const BRAND_SIGIL: char = '@';
const INT_SIGIL: char = '#';
const BOOL_SIGIL: char = '?';
const ESCAPE_SIGIL: char = '~';

/// Converts serialized tables to text and back.
///
/// `decode` never fails: unreadable input becomes an empty table and a logged
/// diagnostic, so a corrupted save degrades to fresh defaults.
pub trait TextCodec {
    fn encode(&self, table: &Table) -> Result<String>;

    fn decode(&self, text: &str) -> Table;

    fn name(&self) -> &str;
}

/// JSON text codec writing a hashed envelope around the payload.
#[derive(Debug, Clone, Default)]
pub struct JsonCodec {
    pretty: bool,
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    #[serde(flatten)]
    metadata: SaveMetadata,
    data: Json,
}

impl JsonCodec {
    pub const NAME: &'static str = "json";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn pretty() -> Self {
        Self { pretty: true }
    }

    /// Strict decode: returns the envelope metadata or the reason the text is unusable.
    ///
    /// A bare JSON object without an envelope is accepted as legacy data and
    /// gets synthesized metadata.
    pub fn inspect(&self, text: &str) -> Result<(SaveMetadata, Table)> {
        let json: Json = serde_json::from_str(text)?;
        let is_envelope = json
            .as_object()
            .map_or(false, |object| object.contains_key("format_version") && object.contains_key("data"));

        if is_envelope {
            let envelope: Envelope = serde_json::from_value(json)?;
            if !envelope.metadata.is_compatible() {
                return Err(SaveDataError::invalid_format(format!(
                    "save format version {} is not supported",
                    envelope.metadata.format_version
                )));
            }
            let canonical = serde_json::to_string(&envelope.data)?;
            envelope.metadata.verify_integrity(canonical.as_bytes())?;
            let table = object_to_table(&envelope.data, &TraversalPath::root("data"))?;
            Ok((envelope.metadata, table))
        } else {
            let canonical = serde_json::to_string(&json)?;
            let table = object_to_table(&json, &TraversalPath::root(""))?;
            let metadata = SaveMetadata::new("legacy-json")
                .with_content_hash(canonical.as_bytes())
                .with_feature_count(table.data_len());
            Ok((metadata, table))
        }
    }

    /// The bare `data` JSON for a serialized table, without an envelope.
    pub fn to_json(&self, table: &Table) -> Result<Json> {
        table_to_json(table, &TraversalPath::root(""))
    }
}

impl TextCodec for JsonCodec {
    fn encode(&self, table: &Table) -> Result<String> {
        let data = table_to_json(table, &TraversalPath::root(""))?;
        let canonical = serde_json::to_string(&data)?;
        let envelope = Envelope {
            metadata: SaveMetadata::new(Self::NAME)
                .with_content_hash(canonical.as_bytes())
                .with_feature_count(table.data_len()),
            data,
        };

        let text = if self.pretty {
            serde_json::to_string_pretty(&envelope)?
        } else {
            serde_json::to_string(&envelope)?
        };
        Ok(text)
    }

    fn decode(&self, text: &str) -> Table {
        match self.inspect(text) {
            Ok((_, table)) => table,
            Err(err) => {
                warn!(error = %err, bytes = text.len(), "Discarding unreadable save data");
                crate::observability::record_decode_failure();
                Table::new()
            }
        }
    }

    fn name(&self) -> &str {
        Self::NAME
    }
}

fn value_to_json(value: &Value, path: &TraversalPath<'_>) -> Result<Json> {
    match value {
        Value::Nil => Ok(Json::Null),
        Value::Bool(b) => Ok(Json::Bool(*b)),
        Value::Int(n) => Ok(Json::Number(Number::from(*n))),
        Value::Float(f) => Number::from_f64(*f).map(Json::Number).ok_or_else(|| {
            SaveDataError::invalid_format(format!("non-finite number {f} at \"{path}\""))
        }),
        Value::Str(s) => Ok(Json::String(s.clone())),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| value_to_json(item, &path.index(i + 1)))
            .collect::<Result<Vec<_>>>()
            .map(Json::Array),
        Value::Table(table) => table_to_json(table, path),
        live => Err(SaveDataError::invalid_format(format!(
            "live {} at \"{path}\" must be serialized before encoding",
            live.type_name()
        ))),
    }
}

fn table_to_json(table: &Table, path: &TraversalPath<'_>) -> Result<Json> {
    let plain_digits = table.has_brand(Brand::NumberKeyedObject)
        && table
            .keys()
            .all(|key| matches!(key, Key::Int(_) | Key::Brand(_)));

    let mut object = JsonMap::new();
    for (key, value) in table.iter() {
        let encoded = encode_key(key, plain_digits);
        let value = value_to_json(value, &path.key(key))?;
        if object.insert(encoded, value).is_some() {
            return Err(SaveDataError::InvalidKey {
                path: path.to_string(),
                reason: format!("key \"{key}\" collides with another key once encoded"),
            });
        }
    }
    Ok(Json::Object(object))
}

fn json_to_value(json: &Json, path: &TraversalPath<'_>) -> Result<Value> {
    match json {
        Json::Null => Ok(Value::Nil),
        Json::Bool(b) => Ok(Value::Bool(*b)),
        Json::Number(n) => Ok(match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        }),
        Json::String(s) => Ok(Value::Str(s.clone())),
        Json::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| json_to_value(item, &path.index(i + 1)))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        Json::Object(_) => object_to_table(json, path).map(Value::Table),
    }
}

fn object_to_table(json: &Json, path: &TraversalPath<'_>) -> Result<Table> {
    let object = json.as_object().ok_or_else(|| {
        SaveDataError::invalid_format(format!("expected an object at \"{path}\""))
    })?;
    let number_keyed = object.contains_key(&encode_key(&Key::Brand(Brand::NumberKeyedObject), false));

    let mut table = Table::new();
    for (text, value) in object {
        let key = decode_key(text, number_keyed, path)?;
        let value = json_to_value(value, &path.key(&key))?;
        table.insert(key, value);
    }
    Ok(table)
}

fn encode_key(key: &Key, plain_digits: bool) -> String {
    match key {
        Key::Brand(brand) => format!("{BRAND_SIGIL}{}", brand.tag()),
        Key::Int(n) if plain_digits => n.to_string(),
        Key::Int(n) => format!("{INT_SIGIL}{n}"),
        Key::Bool(b) => format!("{BOOL_SIGIL}{b}"),
        Key::Str(s) if s.starts_with(&[BRAND_SIGIL, INT_SIGIL, BOOL_SIGIL, ESCAPE_SIGIL][..]) => {
            format!("{ESCAPE_SIGIL}{s}")
        }
        Key::Str(s) => s.clone(),
    }
}

fn decode_key(text: &str, number_keyed: bool, path: &TraversalPath<'_>) -> Result<Key> {
    let invalid = |reason: String| SaveDataError::InvalidKey {
        path: path.to_string(),
        reason,
    };

    if let Some(tag) = text.strip_prefix(BRAND_SIGIL) {
        return Brand::from_tag(tag)
            .map(Key::Brand)
            .ok_or_else(|| invalid(format!("unknown brand tag \"{tag}\"")));
    }
    if let Some(digits) = text.strip_prefix(INT_SIGIL) {
        return digits
            .parse::<i64>()
            .map(Key::Int)
            .map_err(|_| invalid(format!("\"{text}\" is not an integer key")));
    }
    if let Some(flag) = text.strip_prefix(BOOL_SIGIL) {
        return match flag {
            "true" => Ok(Key::Bool(true)),
            "false" => Ok(Key::Bool(false)),
            _ => Err(invalid(format!("\"{text}\" is not a boolean key"))),
        };
    }
    if let Some(escaped) = text.strip_prefix(ESCAPE_SIGIL) {
        return Ok(Key::Str(escaped.to_string()));
    }
    if number_keyed {
        if let Ok(n) = text.parse::<i64>() {
            return Ok(Key::Int(n));
        }
    }
    Ok(Key::Str(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table;

    #[test]
    fn test_decode_garbage_returns_empty_table() {
        let codec = JsonCodec::new();
        assert!(codec.decode("{not json").is_empty());
        assert!(codec.decode("").is_empty());
        assert!(codec.decode("[1, 2, 3]").is_empty());
    }

    #[test]
    fn test_key_types_survive_round_trip() {
        let codec = JsonCodec::new();
        let table = table! {
            "data" => table! {
                1 => "number",
                "1" => "string",
                true => "flag",
                "@map" => "looks like a brand",
                "#7" => "looks like a number",
                "~tilde" => "escaped",
            },
        };

        let text = codec.encode(&table).unwrap();
        let decoded = codec.decode(&text);
        assert_eq!(decoded, table);

        let inner = decoded.get("data").unwrap().as_table().unwrap();
        assert_eq!(inner.brands().count(), 0);
        assert_eq!(inner.get(1), Some(&Value::from("number")));
        assert_eq!(inner.get("1"), Some(&Value::from("string")));
    }

    #[test]
    fn test_number_keyed_tables_use_plain_digits() {
        let table = table! { Brand::NumberKeyedObject => "", 3 => "a", 10 => "b" };
        let json = table_to_json(&table, &TraversalPath::root("")).unwrap();
        let object = json.as_object().unwrap();

        assert!(object.contains_key("3"));
        assert!(object.contains_key("@number-keyed-object"));

        let back = object_to_table(&json, &TraversalPath::root("")).unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn test_floats_stay_floats() {
        let codec = JsonCodec::new();
        let table = table! { "ratio" => 5.0, "count" => 5 };
        let decoded = codec.decode(&codec.encode(&table).unwrap());

        assert!(matches!(decoded.get("ratio"), Some(Value::Float(_))));
        assert!(matches!(decoded.get("count"), Some(Value::Int(5))));
    }

    #[test]
    fn test_floats_keep_every_bit_and_the_hash_still_verifies() {
        let codec = JsonCodec::new();
        let speeds = [
            907.3038322028689,
            481.83792520110524,
            1.0715660391465826e-75,
            0.1 + 0.2,
            -0.0,
            f64::MAX,
            f64::MIN_POSITIVE,
        ];
        for speed in speeds {
            let table = table! { "hp" => table! { "speed" => speed, "max" => 5 } };
            let text = codec.encode(&table).unwrap();

            let (_, decoded) = codec.inspect(&text).unwrap();
            let hp = decoded.get("hp").unwrap().as_table().unwrap();
            match hp.get("speed") {
                Some(Value::Float(f)) => assert_eq!(f.to_bits(), speed.to_bits(), "speed {speed}"),
                other => panic!("unexpected speed for {speed}: {other:?}"),
            }
            assert_eq!(hp.get("max"), Some(&Value::Int(5)));
        }
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let codec = JsonCodec::new();
        let text = codec.encode(&table! { "hp" => table! { "max" => 5 } }).unwrap();
        let tampered = text.replace("\"max\":5", "\"max\":99");
        assert_ne!(text, tampered);

        assert!(matches!(
            codec.inspect(&tampered),
            Err(SaveDataError::IntegrityCheckFailed { .. })
        ));
        assert!(codec.decode(&tampered).is_empty());
    }

    #[test]
    fn test_legacy_bare_object_is_accepted() {
        let codec = JsonCodec::new();
        let (metadata, table) = codec.inspect(r#"{"hp": {"persistent": {"max": 4}}}"#).unwrap();

        assert_eq!(metadata.codec, "legacy-json");
        assert_eq!(metadata.feature_count, 1);
        let hp = table.get("hp").unwrap().as_table().unwrap();
        let persistent = hp.get("persistent").unwrap().as_table().unwrap();
        assert_eq!(persistent.get("max"), Some(&Value::Int(4)));
    }

    #[test]
    fn test_unknown_brand_tag_is_rejected() {
        let codec = JsonCodec::new();
        assert!(codec.inspect(r#"{"x": {"@mystery": ""}}"#).is_err());
        assert!(codec.decode(r#"{"x": {"@mystery": ""}}"#).is_empty());
    }

    #[test]
    fn test_live_values_and_non_finite_numbers_do_not_encode() {
        let codec = JsonCodec::new();
        let live = table! { "set" => crate::value::Set::new() };
        assert!(matches!(codec.encode(&live), Err(SaveDataError::InvalidFormat(_))));

        let nan = table! { "nan" => f64::NAN };
        assert!(matches!(codec.encode(&nan), Err(SaveDataError::InvalidFormat(_))));
    }

    #[test]
    fn test_pretty_output_decodes_identically() {
        let table = table! { "a" => vec![Value::Int(1), Value::Int(2)] };
        let pretty = JsonCodec::pretty().encode(&table).unwrap();
        assert!(pretty.contains('\n'));
        assert_eq!(JsonCodec::new().decode(&pretty), table);
    }

    #[test]
    fn test_envelope_metadata() {
        let codec = JsonCodec::new();
        let text = codec
            .encode(&table! { "a" => table!{}, "b" => table!{} })
            .unwrap();
        let (metadata, _) = codec.inspect(&text).unwrap();

        assert_eq!(metadata.codec, "json");
        assert_eq!(metadata.feature_count, 2);
        assert!(metadata.validate().is_ok());
    }
}
