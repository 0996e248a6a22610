//! Avro codec built on the `apache-avro` crate
//!
//! A codec is built from one schema definition and converts between three
//! forms of a record:
//!
//! - **binary**: the Avro datum carried after the Confluent header
//! - **native**: [`apache_avro::types::Value`]
//! - **text**: Avro JSON encoding
//!
//! The text form follows the Avro JSON encoding rules rather than a "plain"
//! JSON rendering. Records keep schema field order, non-null union values are
//! wrapped in a single-key object naming the branch (`{"string": "x"}`), and
//! `bytes`/`fixed` become strings whose code points are the byte values.
//! Map keys are written in ascending order so repeated runs produce
//! identical text.
//!
//! # Example
//!
//! ```rust
//! use avroma::avro::AvroCodec;
//! use avroma::SchemaDefinition;
//!
//! let schema = SchemaDefinition::from(r#"
//!     {"type": "record", "name": "User", "fields": [
//!         {"name": "id", "type": "long"},
//!         {"name": "email", "type": ["null", "string"], "default": null}
//!     ]}
//! "#);
//! let codec = AvroCodec::new(&schema)?;
//!
//! let bytes = codec.encode_binary(&serde_json::json!({"id": 7, "email": {"string": "a@b.c"}}))?;
//! let native = codec.decode_binary(&bytes)?;
//! assert_eq!(codec.encode_text(&native)?, r#"{"id":7,"email":{"string":"a@b.c"}}"#);
//! # Ok::<(), avroma::avro::AvroError>(())
//! ```

use crate::types::SchemaDefinition;
use apache_avro::{
    from_avro_datum, to_avro_datum, types::Value as AvroValue, BigDecimal, Schema,
};
use serde_json::{Map as JsonMap, Number, Value as JsonValue};
use std::collections::HashMap;
use std::io::Cursor;
use thiserror::Error;

/// Errors from building or using a codec
#[derive(Debug, Error)]
pub enum AvroError {
    #[error("Schema parse error: {0}")]
    SchemaParse(String),

    #[error("Deserialization error: {0}")]
    Decode(String),

    #[error("Serialization error: {0}")]
    Encode(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

pub type AvroResult<T> = Result<T, AvroError>;

/// Codec for one writer schema
#[derive(Debug, Clone)]
pub struct AvroCodec {
    schema: Schema,
    /// Named types by full name, for resolving `Schema::Ref`
    names: HashMap<String, Schema>,
}

impl AvroCodec {
    /// Parse `definition` and build a codec from it
    pub fn new(definition: &SchemaDefinition) -> AvroResult<Self> {
        let schema = Schema::parse_str(definition.as_str())
            .map_err(|e| AvroError::SchemaParse(e.to_string()))?;
        Ok(Self::from_schema(schema))
    }

    pub fn from_schema(schema: Schema) -> Self {
        let mut names = HashMap::new();
        collect_names(&schema, &mut names);
        Self { schema, names }
    }

    /// Full name of the top-level type, for named types
    pub fn fullname(&self) -> Option<String> {
        match &self.schema {
            Schema::Record(r) => Some(r.name.fullname(None)),
            Schema::Enum(e) => Some(e.name.fullname(None)),
            Schema::Fixed(f) => Some(f.name.fullname(None)),
            _ => None,
        }
    }

    /// Decode an Avro datum into its native form
    pub fn decode_binary(&self, data: &[u8]) -> AvroResult<AvroValue> {
        let mut cursor = Cursor::new(data);
        from_avro_datum(&self.schema, &mut cursor, None)
            .map_err(|e| AvroError::Decode(e.to_string()))
    }

    /// Render a native value as Avro JSON text
    pub fn encode_text(&self, value: &AvroValue) -> AvroResult<String> {
        let json = self.to_json(value, &self.schema)?;
        serde_json::to_string(&json).map_err(|e| AvroError::Encode(e.to_string()))
    }

    /// Encode a JSON document (Avro JSON encoding, or plain JSON where it is
    /// unambiguous) as an Avro datum
    pub fn encode_binary(&self, json: &JsonValue) -> AvroResult<Vec<u8>> {
        let value = self.from_json(json, &self.schema)?;
        to_avro_datum(&self.schema, value).map_err(|e| AvroError::Encode(e.to_string()))
    }

    fn resolve<'a>(&'a self, schema: &'a Schema) -> AvroResult<&'a Schema> {
        match schema {
            Schema::Ref { name } => {
                let fullname = name.fullname(None);
                self.names
                    .get(&fullname)
                    .ok_or_else(|| AvroError::Encode(format!("Unknown named type: {}", fullname)))
            }
            other => Ok(other),
        }
    }

    fn to_json(&self, value: &AvroValue, schema: &Schema) -> AvroResult<JsonValue> {
        let schema = self.resolve(schema)?;
        match (value, schema) {
            (AvroValue::Union(idx, inner), Schema::Union(union)) => {
                let variant = union.variants().get(*idx as usize).ok_or_else(|| {
                    AvroError::Encode(format!("Union branch {} out of range", idx))
                })?;
                if matches!(**inner, AvroValue::Null) {
                    return Ok(JsonValue::Null);
                }
                let mut obj = JsonMap::with_capacity(1);
                obj.insert(self.branch_name(variant)?, self.to_json(inner, variant)?);
                Ok(JsonValue::Object(obj))
            }

            (AvroValue::Record(fields), Schema::Record(record)) => {
                let mut obj = JsonMap::with_capacity(fields.len());
                for (name, field_value) in fields {
                    let field = record
                        .lookup
                        .get(name)
                        .and_then(|&pos| record.fields.get(pos))
                        .ok_or_else(|| {
                            AvroError::Encode(format!(
                                "Field {} not in record {}",
                                name,
                                record.name.fullname(None)
                            ))
                        })?;
                    obj.insert(name.clone(), self.to_json(field_value, &field.schema)?);
                }
                Ok(JsonValue::Object(obj))
            }

            (AvroValue::Array(items), Schema::Array(array)) => items
                .iter()
                .map(|item| self.to_json(item, &array.items))
                .collect::<AvroResult<Vec<_>>>()
                .map(JsonValue::Array),

            (AvroValue::Map(entries), Schema::Map(map)) => {
                let mut keys: Vec<&String> = entries.keys().collect();
                keys.sort();
                let mut obj = JsonMap::with_capacity(keys.len());
                for key in keys {
                    obj.insert(key.clone(), self.to_json(&entries[key], &map.types)?);
                }
                Ok(JsonValue::Object(obj))
            }

            (AvroValue::Null, _) => Ok(JsonValue::Null),
            (AvroValue::Boolean(b), _) => Ok(JsonValue::Bool(*b)),
            (AvroValue::Int(i), _) | (AvroValue::Date(i), _) | (AvroValue::TimeMillis(i), _) => {
                Ok(JsonValue::from(*i))
            }
            (AvroValue::Long(l), _)
            | (AvroValue::TimeMicros(l), _)
            | (AvroValue::TimestampMillis(l), _)
            | (AvroValue::TimestampMicros(l), _)
            | (AvroValue::LocalTimestampMillis(l), _)
            | (AvroValue::LocalTimestampMicros(l), _) => Ok(JsonValue::from(*l)),
            (AvroValue::Float(f), _) => float_number(*f),
            (AvroValue::Double(d), _) => finite_number(*d),
            (AvroValue::String(s), _) => Ok(JsonValue::String(s.clone())),
            (AvroValue::Bytes(bytes), _) | (AvroValue::Fixed(_, bytes), _) => {
                Ok(JsonValue::String(bytes_to_code_points(bytes)))
            }
            // Logical types over bytes/fixed render as their underlying bytes
            (AvroValue::Decimal(decimal), _) => {
                let bytes = Vec::<u8>::try_from(decimal)
                    .map_err(|e| AvroError::Encode(e.to_string()))?;
                Ok(JsonValue::String(bytes_to_code_points(&bytes)))
            }
            (AvroValue::BigDecimal(decimal), _) => {
                let bytes = big_decimal_bytes(decimal)?;
                Ok(JsonValue::String(bytes_to_code_points(&bytes)))
            }
            (AvroValue::Duration(duration), _) => {
                let bytes: [u8; 12] = (*duration).into();
                Ok(JsonValue::String(bytes_to_code_points(&bytes)))
            }
            (AvroValue::Enum(_, symbol), _) => Ok(JsonValue::String(symbol.clone())),
            (AvroValue::Uuid(uuid), _) => Ok(JsonValue::String(uuid.to_string())),

            (AvroValue::Union(..), _)
            | (AvroValue::Record(_), _)
            | (AvroValue::Array(_), _)
            | (AvroValue::Map(_), _) => Err(AvroError::Encode(format!(
                "Value does not match schema type {}",
                type_name(schema)
            ))),

            // nanosecond timestamps
            (other, _) => {
                JsonValue::try_from(other.clone()).map_err(|e| AvroError::Encode(e.to_string()))
            }
        }
    }

    /// Name used to tag a union branch in Avro JSON
    fn branch_name(&self, variant: &Schema) -> AvroResult<String> {
        Ok(type_name(self.resolve(variant)?))
    }

    fn from_json(&self, json: &JsonValue, schema: &Schema) -> AvroResult<AvroValue> {
        let schema = self.resolve(schema)?;
        match (schema, json) {
            (Schema::Null, JsonValue::Null) => Ok(AvroValue::Null),
            (Schema::Boolean, JsonValue::Bool(b)) => Ok(AvroValue::Boolean(*b)),
            (Schema::Int, JsonValue::Number(n)) => Ok(AvroValue::Int(as_i32(n)?)),
            (Schema::Date, JsonValue::Number(n)) => Ok(AvroValue::Date(as_i32(n)?)),
            (Schema::TimeMillis, JsonValue::Number(n)) => Ok(AvroValue::TimeMillis(as_i32(n)?)),
            (Schema::Long, JsonValue::Number(n)) => Ok(AvroValue::Long(as_i64(n)?)),
            (Schema::TimeMicros, JsonValue::Number(n)) => Ok(AvroValue::TimeMicros(as_i64(n)?)),
            (Schema::TimestampMillis, JsonValue::Number(n)) => {
                Ok(AvroValue::TimestampMillis(as_i64(n)?))
            }
            (Schema::TimestampMicros, JsonValue::Number(n)) => {
                Ok(AvroValue::TimestampMicros(as_i64(n)?))
            }
            (Schema::Float, JsonValue::Number(n)) => Ok(AvroValue::Float(as_f64(n)? as f32)),
            (Schema::Double, JsonValue::Number(n)) => Ok(AvroValue::Double(as_f64(n)?)),
            (Schema::String, JsonValue::String(s)) => Ok(AvroValue::String(s.clone())),
            (Schema::Bytes, JsonValue::String(s)) => Ok(AvroValue::Bytes(code_points_to_bytes(s)?)),

            (Schema::Fixed(fixed), JsonValue::String(s)) => {
                let bytes = code_points_to_bytes(s)?;
                if bytes.len() != fixed.size {
                    return Err(AvroError::InvalidValue(format!(
                        "Fixed size mismatch: expected {}, got {}",
                        fixed.size,
                        bytes.len()
                    )));
                }
                Ok(AvroValue::Fixed(fixed.size, bytes))
            }

            (Schema::Enum(enum_schema), JsonValue::String(s)) => enum_schema
                .symbols
                .iter()
                .position(|sym| sym == s)
                .map(|pos| AvroValue::Enum(pos as u32, s.clone()))
                .ok_or_else(|| AvroError::InvalidValue(format!("Invalid enum symbol: {}", s))),

            (Schema::Array(array), JsonValue::Array(items)) => items
                .iter()
                .map(|item| self.from_json(item, &array.items))
                .collect::<AvroResult<Vec<_>>>()
                .map(AvroValue::Array),

            (Schema::Map(map), JsonValue::Object(obj)) => {
                let mut out = HashMap::with_capacity(obj.len());
                for (k, v) in obj {
                    out.insert(k.clone(), self.from_json(v, &map.types)?);
                }
                Ok(AvroValue::Map(out))
            }

            (Schema::Record(record), JsonValue::Object(obj)) => {
                let mut fields = Vec::with_capacity(record.fields.len());
                for field in &record.fields {
                    let value = match (obj.get(&field.name), &field.default) {
                        (Some(v), _) => self.from_json(v, &field.schema)?,
                        (None, Some(default)) => self.from_json(default, &field.schema)?,
                        (None, None) => {
                            return Err(AvroError::InvalidValue(format!(
                                "Missing required field: {}",
                                field.name
                            )))
                        }
                    };
                    fields.push((field.name.clone(), value));
                }
                Ok(AvroValue::Record(fields))
            }

            (Schema::Union(union), json) => {
                let variants = union.variants();

                // Tagged form: {"<branch>": value}
                if let JsonValue::Object(obj) = json {
                    if obj.len() == 1 {
                        if let Some((tag, inner)) = obj.iter().next() {
                            for (idx, variant) in variants.iter().enumerate() {
                                if self.branch_name(variant)? == *tag {
                                    let v = self.from_json(inner, variant)?;
                                    return Ok(AvroValue::Union(idx as u32, Box::new(v)));
                                }
                            }
                        }
                    }
                }

                // Untagged: first branch that accepts the value
                for (idx, variant) in variants.iter().enumerate() {
                    if let Ok(v) = self.from_json(json, variant) {
                        return Ok(AvroValue::Union(idx as u32, Box::new(v)));
                    }
                }
                Err(AvroError::InvalidValue(format!(
                    "No matching union variant for: {}",
                    json
                )))
            }

            (schema, json) => Err(AvroError::InvalidValue(format!(
                "Expected {}, got {}",
                type_name(schema),
                json
            ))),
        }
    }
}

/// Avro type name of a schema; full name for named types
fn type_name(schema: &Schema) -> String {
    match schema {
        Schema::Null => "null".into(),
        Schema::Boolean => "boolean".into(),
        Schema::Int => "int".into(),
        Schema::Long => "long".into(),
        Schema::Float => "float".into(),
        Schema::Double => "double".into(),
        Schema::Bytes => "bytes".into(),
        Schema::String => "string".into(),
        Schema::Array(_) => "array".into(),
        Schema::Map(_) => "map".into(),
        Schema::Union(_) => "union".into(),
        Schema::Record(r) => r.name.fullname(None),
        Schema::Enum(e) => e.name.fullname(None),
        Schema::Fixed(f) => f.name.fullname(None),
        Schema::Ref { name } => name.fullname(None),
        Schema::Uuid => "string".into(),
        Schema::Date | Schema::TimeMillis => "int".into(),
        Schema::TimeMicros | Schema::TimestampMillis | Schema::TimestampMicros => "long".into(),
        // remaining logical types: tag with the underlying type from the schema JSON
        other => underlying_type_name(other),
    }
}

fn underlying_type_name(schema: &Schema) -> String {
    let json = serde_json::to_value(schema).unwrap_or(JsonValue::Null);
    match &json {
        JsonValue::String(s) => s.clone(),
        JsonValue::Object(obj) => match obj.get("type").and_then(JsonValue::as_str) {
            Some(kind @ ("record" | "enum" | "fixed")) => {
                let namespace = obj.get("namespace").and_then(JsonValue::as_str);
                match (namespace, obj.get("name").and_then(JsonValue::as_str)) {
                    (Some(ns), Some(name)) => format!("{}.{}", ns, name),
                    (None, Some(name)) => name.to_string(),
                    _ => kind.to_string(),
                }
            }
            Some(kind) => kind.to_string(),
            None => "unknown".into(),
        },
        _ => "unknown".into(),
    }
}

fn collect_names(schema: &Schema, names: &mut HashMap<String, Schema>) {
    match schema {
        Schema::Record(record) => {
            names.insert(record.name.fullname(None), schema.clone());
            for field in &record.fields {
                collect_names(&field.schema, names);
            }
        }
        Schema::Enum(e) => {
            names.insert(e.name.fullname(None), schema.clone());
        }
        Schema::Fixed(f) => {
            names.insert(f.name.fullname(None), schema.clone());
        }
        Schema::Array(array) => collect_names(&array.items, names),
        Schema::Map(map) => collect_names(&map.types, names),
        Schema::Union(union) => {
            for variant in union.variants() {
                collect_names(variant, names);
            }
        }
        _ => {}
    }
}

fn finite_number(f: f64) -> AvroResult<JsonValue> {
    Number::from_f64(f)
        .map(JsonValue::Number)
        .ok_or_else(|| AvroError::Encode(format!("Non-finite float {} has no JSON form", f)))
}

/// Avro `float` as the shortest decimal that round-trips through f32
fn float_number(f: f32) -> AvroResult<JsonValue> {
    let widened = f
        .to_string()
        .parse::<f64>()
        .map_err(|e| AvroError::Encode(e.to_string()))?;
    finite_number(widened)
}

/// Content of a `big-decimal` bytes value: unscaled integer bytes, then scale
fn big_decimal_bytes(decimal: &BigDecimal) -> AvroResult<Vec<u8>> {
    // The datum is length-prefixed bytes; reading it back as `bytes` strips the prefix
    let datum = to_avro_datum(&Schema::BigDecimal, AvroValue::BigDecimal(decimal.clone()))
        .map_err(|e| AvroError::Encode(e.to_string()))?;
    match from_avro_datum(&Schema::Bytes, &mut Cursor::new(datum), None) {
        Ok(AvroValue::Bytes(bytes)) => Ok(bytes),
        Ok(other) => Err(AvroError::Encode(format!(
            "Unexpected big-decimal layout: {:?}",
            other
        ))),
        Err(e) => Err(AvroError::Encode(e.to_string())),
    }
}

fn bytes_to_code_points(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

fn code_points_to_bytes(s: &str) -> AvroResult<Vec<u8>> {
    s.chars()
        .map(|c| {
            u8::try_from(u32::from(c)).map_err(|_| {
                AvroError::InvalidValue(format!("Code point U+{:04X} is not a byte", u32::from(c)))
            })
        })
        .collect()
}

fn as_i32(n: &Number) -> AvroResult<i32> {
    let i = as_i64(n)?;
    i32::try_from(i).map_err(|_| AvroError::InvalidValue(format!("Value {} out of i32 range", i)))
}

fn as_i64(n: &Number) -> AvroResult<i64> {
    n.as_i64()
        .ok_or_else(|| AvroError::InvalidValue(format!("Expected integer, got {}", n)))
}

fn as_f64(n: &Number) -> AvroResult<f64> {
    n.as_f64()
        .ok_or_else(|| AvroError::InvalidValue(format!("Expected number, got {}", n)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn codec(schema: &str) -> AvroCodec {
        AvroCodec::new(&SchemaDefinition::from(schema)).unwrap()
    }

    fn text_of(codec: &AvroCodec, json: &JsonValue) -> String {
        let bytes = codec.encode_binary(json).unwrap();
        let native = codec.decode_binary(&bytes).unwrap();
        codec.encode_text(&native).unwrap()
    }

    #[test]
    fn test_malformed_schema() {
        let err = AvroCodec::new(&SchemaDefinition::from("{not a schema")).unwrap_err();
        assert!(matches!(err, AvroError::SchemaParse(_)));

        let err = AvroCodec::new(&SchemaDefinition::from(r#"{"type": "recordz"}"#)).unwrap_err();
        assert!(matches!(err, AvroError::SchemaParse(_)));
    }

    #[test]
    fn test_primitive() {
        let codec = codec(r#""long""#);
        // zig-zag varint: 3 -> 0x06
        let native = codec.decode_binary(&[0x06]).unwrap();
        assert_eq!(native, AvroValue::Long(3));
        assert_eq!(codec.encode_text(&native).unwrap(), "3");
    }

    #[test]
    fn test_record_keeps_field_order() {
        let codec = codec(
            r#"{"type": "record", "name": "User", "namespace": "com.example", "fields": [
                {"name": "zeta", "type": "string"},
                {"name": "alpha", "type": "int"}
            ]}"#,
        );
        assert_eq!(codec.fullname().as_deref(), Some("com.example.User"));
        assert_eq!(
            text_of(&codec, &json!({"alpha": 1, "zeta": "z"})),
            r#"{"zeta":"z","alpha":1}"#
        );
    }

    #[test]
    fn test_union_branches_are_tagged() {
        let codec = codec(
            r#"{"type": "record", "name": "User", "fields": [
                {"name": "email", "type": ["null", "string"], "default": null},
                {"name": "score", "type": ["null", "int", "double"]}
            ]}"#,
        );
        assert_eq!(
            text_of(&codec, &json!({"email": {"string": "a@b.c"}, "score": {"double": 1.5}})),
            r#"{"email":{"string":"a@b.c"},"score":{"double":1.5}}"#
        );
        assert_eq!(
            text_of(&codec, &json!({"score": null})),
            r#"{"email":null,"score":null}"#
        );
    }

    #[test]
    fn test_named_union_branch_uses_fullname() {
        let codec = codec(
            r#"{"type": "record", "name": "Envelope", "namespace": "ns", "fields": [
                {"name": "body", "type": ["null", {"type": "record", "name": "Body", "fields": [
                    {"name": "n", "type": "int"}
                ]}]},
                {"name": "copy", "type": ["null", "Body"]}
            ]}"#,
        );
        assert_eq!(
            text_of(&codec, &json!({"body": {"ns.Body": {"n": 1}}, "copy": {"ns.Body": {"n": 2}}})),
            r#"{"body":{"ns.Body":{"n":1}},"copy":{"ns.Body":{"n":2}}}"#
        );
    }

    #[test]
    fn test_bytes_and_fixed_as_code_points() {
        let codec = codec(
            r#"{"type": "record", "name": "Blob", "fields": [
                {"name": "data", "type": "bytes"},
                {"name": "tag", "type": {"type": "fixed", "name": "Tag", "size": 2}}
            ]}"#,
        );
        let native = AvroValue::Record(vec![
            ("data".into(), AvroValue::Bytes(vec![0x00, 0x41, 0xFF])),
            ("tag".into(), AvroValue::Fixed(2, vec![0x01, 0x02])),
        ]);
        let text = codec.encode_text(&native).unwrap();
        let parsed: JsonValue = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["data"], json!("\u{0000}A\u{00FF}"));
        assert_eq!(parsed["tag"], json!("\u{0001}\u{0002}"));
    }

    #[test]
    fn test_enum_array_map() {
        let codec = codec(
            r#"{"type": "record", "name": "Order", "fields": [
                {"name": "status", "type": {"type": "enum", "name": "Status", "symbols": ["NEW", "DONE"]}},
                {"name": "items", "type": {"type": "array", "items": "string"}},
                {"name": "attrs", "type": {"type": "map", "values": "long"}}
            ]}"#,
        );
        assert_eq!(
            text_of(
                &codec,
                &json!({"status": "DONE", "items": ["a", "b"], "attrs": {"z": 1, "a": 2, "m": 3}})
            ),
            r#"{"status":"DONE","items":["a","b"],"attrs":{"a":2,"m":3,"z":1}}"#
        );
    }

    #[test]
    fn test_text_is_stable_across_runs() {
        let codec = codec(r#"{"type": "map", "values": "int"}"#);
        let bytes = codec
            .encode_binary(&json!({"k1": 1, "k2": 2, "k3": 3, "k4": 4, "k5": 5}))
            .unwrap();
        let first = codec.encode_text(&codec.decode_binary(&bytes).unwrap()).unwrap();
        for _ in 0..10 {
            let again = codec.encode_text(&codec.decode_binary(&bytes).unwrap()).unwrap();
            assert_eq!(first, again);
        }
    }

    #[test]
    fn test_truncated_body_fails_decode() {
        let codec = codec(
            r#"{"type": "record", "name": "User", "fields": [
                {"name": "name", "type": "string"}
            ]}"#,
        );
        // string length 10, only 2 bytes follow
        let err = codec.decode_binary(&[0x14, b'a', b'b']).unwrap_err();
        assert!(matches!(err, AvroError::Decode(_)));
    }

    #[test]
    fn test_non_finite_float_fails_encode() {
        let codec = codec(r#""double""#);
        let err = codec.encode_text(&AvroValue::Double(f64::NAN)).unwrap_err();
        assert!(matches!(err, AvroError::Encode(_)));
    }

    #[test]
    fn test_mismatched_value_fails_encode() {
        let codec = codec(r#"{"type": "array", "items": "int"}"#);
        let err = codec
            .encode_text(&AvroValue::Record(vec![("x".into(), AvroValue::Int(1))]))
            .unwrap_err();
        assert!(matches!(err, AvroError::Encode(_)));
    }

    #[test]
    fn test_float_uses_shortest_form() {
        let codec = codec(r#""float""#);
        let native = codec.decode_binary(&1.1f32.to_le_bytes()).unwrap();
        assert_eq!(codec.encode_text(&native).unwrap(), "1.1");

        let codec = codec_with_field(r#"["null", "float"]"#);
        assert_eq!(
            codec
                .encode_text(&AvroValue::Record(vec![(
                    "v".into(),
                    AvroValue::Union(1, Box::new(AvroValue::Float(0.1)))
                )]))
                .unwrap(),
            r#"{"v":{"float":0.1}}"#
        );
    }

    fn codec_with_field(field_type: &str) -> AvroCodec {
        codec(&format!(
            r#"{{"type": "record", "name": "R", "fields": [{{"name": "v", "type": {}}}]}}"#,
            field_type
        ))
    }

    #[test]
    fn test_decimal_as_code_points() {
        let codec = codec(r#"{"type": "bytes", "logicalType": "decimal", "precision": 4, "scale": 2}"#);
        let native = codec.decode_binary(&[0x04, 0x01, 0x02]).unwrap();
        assert!(matches!(native, AvroValue::Decimal(_)));
        assert_eq!(codec.encode_text(&native).unwrap(), r#""""#);
    }

    #[test]
    fn test_decimal_in_union_is_tagged_bytes() {
        let codec = codec_with_field(
            r#"["null", {"type": "bytes", "logicalType": "decimal", "precision": 4, "scale": 2}]"#,
        );
        let native = AvroValue::Record(vec![(
            "v".into(),
            AvroValue::Union(1, Box::new(AvroValue::Decimal(vec![0x01, 0x02].into()))),
        )]);
        let parsed: JsonValue =
            serde_json::from_str(&codec.encode_text(&native).unwrap()).unwrap();
        assert_eq!(parsed, json!({"v": {"bytes": "\u{0001}\u{0002}"}}));
    }

    #[test]
    fn test_duration_as_code_points() {
        let codec = codec(
            r#"{"type": "fixed", "name": "Span", "size": 12, "logicalType": "duration"}"#,
        );
        let body = [1, 0, 0, 0, 2, 0, 0, 0, 3, 0, 0, 0];
        let native = codec.decode_binary(&body).unwrap();
        assert!(matches!(native, AvroValue::Duration(_)));

        let parsed: JsonValue =
            serde_json::from_str(&codec.encode_text(&native).unwrap()).unwrap();
        assert_eq!(parsed, JsonValue::String(bytes_to_code_points(&body)));
    }

    #[test]
    fn test_big_decimal_as_code_points() {
        let codec = codec(r#"{"type": "bytes", "logicalType": "big-decimal"}"#);
        let decimal: BigDecimal = "1.5".parse().unwrap();
        let text = codec
            .encode_text(&AvroValue::BigDecimal(decimal))
            .unwrap();
        // unscaled 15 as bytes [0x0F] (length 1 -> 0x02), then scale 1 -> 0x02
        let parsed: JsonValue = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, json!("\u{0002}\u{000F}\u{0002}"));
    }

    #[test]
    fn test_missing_field_uses_default() {
        let codec = codec(
            r#"{"type": "record", "name": "User", "fields": [
                {"name": "id", "type": "long"},
                {"name": "active", "type": "boolean", "default": true}
            ]}"#,
        );
        assert_eq!(text_of(&codec, &json!({"id": 1})), r#"{"id":1,"active":true}"#);
        assert!(matches!(
            codec.encode_binary(&json!({"active": false})),
            Err(AvroError::InvalidValue(_))
        ));
    }
}
