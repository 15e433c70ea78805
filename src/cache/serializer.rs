//! Value Serializer Module
//!
//! A `serde::Serializer` that builds [`Value`] directly from any `Serialize`
//! impl. Going through a JSON tree would flatten NaN and infinities to
//! `null`; here they are seen and rejected.
//!
//! Maps land in a `BTreeMap`, so a `HashMap` fingerprints the same whatever
//! its iteration order. Sequences keep the order they are serialized in: a
//! `HashSet` is indistinguishable from a `Vec` at this level, so callers
//! must pass sets as `BTreeSet` or a sorted `Vec`.

use std::collections::BTreeMap;

use serde::ser::{self, Impossible, Serialize};

use crate::cache::key::Value;
use crate::error::{CacheError, Result};

/// How strictly a serialized shape is held to the argument model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Every shape must map onto `Value` exactly.
    Argument,
    /// Only non-finite floats are fatal; the payload encoder handles the rest.
    Payload,
}

/// Converts `value` into the argument model.
pub(crate) fn to_value<T: Serialize + ?Sized>(value: &T) -> Result<Value> {
    value.serialize(ValueSerializer {
        mode: Mode::Argument,
    })
}

/// Fails if `value` contains a float with no faithful JSON encoding.
pub(crate) fn check_payload<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    value
        .serialize(ValueSerializer {
            mode: Mode::Payload,
        })
        .map(drop)
}

fn float(v: f64) -> Result<Value> {
    if v.is_finite() {
        Ok(Value::Float(v))
    } else {
        Err(CacheError::Encoding(format!(
            "non-finite float {} has no canonical encoding",
            v
        )))
    }
}

fn wide_int<I: TryInto<i64> + std::fmt::Display + Copy>(v: I, mode: Mode) -> Result<Value> {
    match v.try_into() {
        Ok(n) => Ok(Value::Int(n)),
        // JSON carries it fine; only its shape is being checked
        Err(_) if mode == Mode::Payload => Ok(Value::Null),
        Err(_) => Err(CacheError::Encoding(format!(
            "integer {} does not fit in i64",
            v
        ))),
    }
}

fn tagged(variant: &'static str, inner: Value) -> Value {
    let mut map = BTreeMap::new();
    map.insert(variant.to_string(), inner);
    Value::Map(map)
}

// == Value Serializer ==
struct ValueSerializer {
    mode: Mode,
}

impl ser::Serializer for ValueSerializer {
    type Ok = Value;
    type Error = CacheError;

    type SerializeSeq = SeqBuilder;
    type SerializeTuple = SeqBuilder;
    type SerializeTupleStruct = SeqBuilder;
    type SerializeTupleVariant = VariantBuilder<SeqBuilder>;
    type SerializeMap = MapBuilder;
    type SerializeStruct = MapBuilder;
    type SerializeStructVariant = VariantBuilder<MapBuilder>;

    fn serialize_bool(self, v: bool) -> Result<Value> {
        Ok(Value::Bool(v))
    }

    fn serialize_i8(self, v: i8) -> Result<Value> {
        Ok(Value::Int(i64::from(v)))
    }

    fn serialize_i16(self, v: i16) -> Result<Value> {
        Ok(Value::Int(i64::from(v)))
    }

    fn serialize_i32(self, v: i32) -> Result<Value> {
        Ok(Value::Int(i64::from(v)))
    }

    fn serialize_i64(self, v: i64) -> Result<Value> {
        Ok(Value::Int(v))
    }

    fn serialize_i128(self, v: i128) -> Result<Value> {
        wide_int(v, self.mode)
    }

    fn serialize_u8(self, v: u8) -> Result<Value> {
        Ok(Value::Int(i64::from(v)))
    }

    fn serialize_u16(self, v: u16) -> Result<Value> {
        Ok(Value::Int(i64::from(v)))
    }

    fn serialize_u32(self, v: u32) -> Result<Value> {
        Ok(Value::Int(i64::from(v)))
    }

    fn serialize_u64(self, v: u64) -> Result<Value> {
        wide_int(v, self.mode)
    }

    fn serialize_u128(self, v: u128) -> Result<Value> {
        wide_int(v, self.mode)
    }

    fn serialize_f32(self, v: f32) -> Result<Value> {
        float(f64::from(v))
    }

    fn serialize_f64(self, v: f64) -> Result<Value> {
        float(v)
    }

    fn serialize_char(self, v: char) -> Result<Value> {
        Ok(Value::Str(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> Result<Value> {
        Ok(Value::Str(v.to_string()))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Value> {
        Ok(Value::List(
            v.iter().map(|b| Value::Int(i64::from(*b))).collect(),
        ))
    }

    fn serialize_none(self) -> Result<Value> {
        Ok(Value::Null)
    }

    fn serialize_some<T>(self, value: &T) -> Result<Value>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Value> {
        Ok(Value::Null)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Value> {
        Ok(Value::Null)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<Value> {
        Ok(Value::Str(variant.to_string()))
    }

    fn serialize_newtype_struct<T>(self, _name: &'static str, value: &T) -> Result<Value>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T>(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<Value>
    where
        T: ?Sized + Serialize,
    {
        Ok(tagged(variant, value.serialize(self)?))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SeqBuilder> {
        Ok(SeqBuilder {
            mode: self.mode,
            items: Vec::with_capacity(len.unwrap_or(0)),
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<SeqBuilder> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(self, _name: &'static str, len: usize) -> Result<SeqBuilder> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<VariantBuilder<SeqBuilder>> {
        Ok(VariantBuilder {
            variant,
            inner: self.serialize_seq(Some(len))?,
        })
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<MapBuilder> {
        Ok(MapBuilder::new(self.mode))
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<MapBuilder> {
        Ok(MapBuilder::new(self.mode))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<VariantBuilder<MapBuilder>> {
        Ok(VariantBuilder {
            variant,
            inner: MapBuilder::new(self.mode),
        })
    }
}

// == Compound Builders ==
struct SeqBuilder {
    mode: Mode,
    items: Vec<Value>,
}

impl ser::SerializeSeq for SeqBuilder {
    type Ok = Value;
    type Error = CacheError;

    fn serialize_element<T>(&mut self, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        self.items
            .push(value.serialize(ValueSerializer { mode: self.mode })?);
        Ok(())
    }

    fn end(self) -> Result<Value> {
        Ok(Value::List(self.items))
    }
}

impl ser::SerializeTuple for SeqBuilder {
    type Ok = Value;
    type Error = CacheError;

    fn serialize_element<T>(&mut self, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Value> {
        ser::SerializeSeq::end(self)
    }
}

impl ser::SerializeTupleStruct for SeqBuilder {
    type Ok = Value;
    type Error = CacheError;

    fn serialize_field<T>(&mut self, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Value> {
        ser::SerializeSeq::end(self)
    }
}

struct MapBuilder {
    mode: Mode,
    entries: BTreeMap<String, Value>,
    pending_key: Option<String>,
}

impl MapBuilder {
    fn new(mode: Mode) -> Self {
        Self {
            mode,
            entries: BTreeMap::new(),
            pending_key: None,
        }
    }
}

impl ser::SerializeMap for MapBuilder {
    type Ok = Value;
    type Error = CacheError;

    fn serialize_key<T>(&mut self, key: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        let key = match self.mode {
            Mode::Argument => key.serialize(MapKeySerializer)?,
            Mode::Payload => {
                // keys still get the float check; entries are only counted
                key.serialize(ValueSerializer { mode: self.mode })?;
                self.entries.len().to_string()
            }
        };
        self.pending_key = Some(key);
        Ok(())
    }

    fn serialize_value<T>(&mut self, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        let key = self.pending_key.take().ok_or_else(|| {
            CacheError::Encoding("map value serialized before its key".to_string())
        })?;
        self.entries
            .insert(key, value.serialize(ValueSerializer { mode: self.mode })?);
        Ok(())
    }

    fn end(self) -> Result<Value> {
        Ok(Value::Map(self.entries))
    }
}

impl ser::SerializeStruct for MapBuilder {
    type Ok = Value;
    type Error = CacheError;

    fn serialize_field<T>(&mut self, key: &'static str, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        self.entries.insert(
            key.to_string(),
            value.serialize(ValueSerializer { mode: self.mode })?,
        );
        Ok(())
    }

    fn end(self) -> Result<Value> {
        Ok(Value::Map(self.entries))
    }
}

/// Collects an enum variant's fields, then wraps them as `{variant: fields}`.
struct VariantBuilder<B> {
    variant: &'static str,
    inner: B,
}

impl ser::SerializeTupleVariant for VariantBuilder<SeqBuilder> {
    type Ok = Value;
    type Error = CacheError;

    fn serialize_field<T>(&mut self, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        ser::SerializeSeq::serialize_element(&mut self.inner, value)
    }

    fn end(self) -> Result<Value> {
        Ok(tagged(self.variant, ser::SerializeSeq::end(self.inner)?))
    }
}

impl ser::SerializeStructVariant for VariantBuilder<MapBuilder> {
    type Ok = Value;
    type Error = CacheError;

    fn serialize_field<T>(&mut self, key: &'static str, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        ser::SerializeStruct::serialize_field(&mut self.inner, key, value)
    }

    fn end(self) -> Result<Value> {
        Ok(tagged(self.variant, ser::SerializeStruct::end(self.inner)?))
    }
}

// == Map Keys ==
/// Accepts strings, chars, integers and unit variants as map keys.
struct MapKeySerializer;

fn bad_key(kind: &str) -> CacheError {
    CacheError::Encoding(format!("map key must be a string, got {}", kind))
}

impl ser::Serializer for MapKeySerializer {
    type Ok = String;
    type Error = CacheError;

    type SerializeSeq = Impossible<String, CacheError>;
    type SerializeTuple = Impossible<String, CacheError>;
    type SerializeTupleStruct = Impossible<String, CacheError>;
    type SerializeTupleVariant = Impossible<String, CacheError>;
    type SerializeMap = Impossible<String, CacheError>;
    type SerializeStruct = Impossible<String, CacheError>;
    type SerializeStructVariant = Impossible<String, CacheError>;

    fn serialize_bool(self, _v: bool) -> Result<String> {
        Err(bad_key("bool"))
    }

    fn serialize_i8(self, v: i8) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_i16(self, v: i16) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_i32(self, v: i32) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_i64(self, v: i64) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_i128(self, v: i128) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_u8(self, v: u8) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_u16(self, v: u16) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_u32(self, v: u32) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_u64(self, v: u64) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_u128(self, v: u128) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_f32(self, _v: f32) -> Result<String> {
        Err(bad_key("float"))
    }

    fn serialize_f64(self, _v: f64) -> Result<String> {
        Err(bad_key("float"))
    }

    fn serialize_char(self, v: char) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_str(self, v: &str) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_bytes(self, _v: &[u8]) -> Result<String> {
        Err(bad_key("bytes"))
    }

    fn serialize_none(self) -> Result<String> {
        Err(bad_key("none"))
    }

    fn serialize_some<T>(self, _value: &T) -> Result<String>
    where
        T: ?Sized + Serialize,
    {
        Err(bad_key("option"))
    }

    fn serialize_unit(self) -> Result<String> {
        Err(bad_key("unit"))
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<String> {
        Err(bad_key("unit struct"))
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<String> {
        Ok(variant.to_string())
    }

    fn serialize_newtype_struct<T>(self, _name: &'static str, value: &T) -> Result<String>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<String>
    where
        T: ?Sized + Serialize,
    {
        Err(bad_key("enum"))
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq> {
        Err(bad_key("sequence"))
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple> {
        Err(bad_key("tuple"))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct> {
        Err(bad_key("tuple struct"))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant> {
        Err(bad_key("enum"))
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap> {
        Err(bad_key("map"))
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<Self::SerializeStruct> {
        Err(bad_key("struct"))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant> {
        Err(bad_key("enum"))
    }
}
