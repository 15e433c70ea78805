//! Fingerprint Module
//!
//! Derives a stable, fixed-length cache key from call arguments.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::cache::serializer;
use crate::error::{CacheError, Result};

/// Prefix hashed ahead of every encoding so a format change yields new keys.
const FINGERPRINT_DOMAIN: &[u8] = b"disk_memo/args/v1\0";

/// Length of a rendered key in hex characters.
pub const KEY_HEX_LEN: usize = 64;

// == Value ==
/// The closed set of argument values the fingerprint can encode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Converts any serde-serializable value into a `Value`.
    ///
    /// Fails for non-finite floats, maps keyed by anything but strings,
    /// integers or unit variants, and integers outside `i64`. Map entries are
    /// sorted by key; sequence order is kept, so sets must be passed as a
    /// `BTreeSet` or sorted `Vec`, never a `HashSet`.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        serializer::to_value(value)
    }

    /// Rejects values with no canonical encoding (non-finite floats).
    fn ensure_encodable(&self) -> Result<()> {
        match self {
            Value::Float(f) if !f.is_finite() => Err(CacheError::Encoding(format!(
                "non-finite float {} has no canonical encoding",
                f
            ))),
            Value::List(items) => items.iter().try_for_each(Value::ensure_encodable),
            Value::Map(map) => map.values().try_for_each(Value::ensure_encodable),
            _ => Ok(()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

macro_rules! int_into_value {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::Int(i64::from(v))
            }
        })*
    };
}

int_into_value!(i8, i16, i32, i64, u8, u16, u32);

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> From<BTreeMap<String, T>> for Value {
    fn from(v: BTreeMap<String, T>) -> Self {
        Value::Map(v.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

// == Args ==
/// Positional and keyword arguments of a single call.
///
/// Keyword arguments live in a `BTreeMap`, so their order of insertion never
/// reaches the encoding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Args {
    pub positional: Vec<Value>,
    pub keyword: BTreeMap<String, Value>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds from already-collected parts. A repeated keyword keeps its last value.
    pub fn from_parts<I, K>(positional: Vec<Value>, keyword: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self {
            positional,
            keyword: keyword.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Appends a positional argument.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Sets a keyword argument.
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.keyword.insert(name.into(), value.into());
        self
    }

    /// Positional argument at `index`, if any.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.positional.get(index)
    }

    /// Keyword argument named `name`, if any.
    pub fn get_kw(&self, name: &str) -> Option<&Value> {
        self.keyword.get(name)
    }

    fn ensure_encodable(&self) -> Result<()> {
        self.positional
            .iter()
            .chain(self.keyword.values())
            .try_for_each(Value::ensure_encodable)
    }

    fn canonical_bytes(&self) -> Result<Vec<u8>> {
        self.ensure_encodable()?;
        Ok(serde_json::to_vec(&(&self.positional, &self.keyword))?)
    }
}

// == Cache Key ==
/// A 64-character lowercase hex SHA-256 digest identifying one call.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Accepts only well-formed keys, e.g. when reading file names back.
    pub fn parse(s: &str) -> Option<Self> {
        let well_formed = s.len() == KEY_HEX_LEN
            && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        well_formed.then(|| CacheKey(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// == Fingerprint ==
/// Derives the cache key for `args`.
pub fn fingerprint(args: &Args) -> Result<CacheKey> {
    digest(None, args)
}

/// Derives the cache key for `args` within a named operation's key space.
pub fn fingerprint_namespaced(namespace: &str, args: &Args) -> Result<CacheKey> {
    digest(Some(namespace), args)
}

fn digest(namespace: Option<&str>, args: &Args) -> Result<CacheKey> {
    let encoded = args.canonical_bytes()?;

    let mut hasher = Sha256::new();
    hasher.update(FINGERPRINT_DOMAIN);
    if let Some(ns) = namespace {
        hasher.update(b"ns");
        hasher.update((ns.len() as u64).to_le_bytes());
        hasher.update(ns.as_bytes());
    }
    hasher.update(&encoded);

    Ok(CacheKey(hex::encode(hasher.finalize())))
}
