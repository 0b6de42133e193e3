//! `Value` — a dynamic, dotted-path attribute map.
//!
//! This is the STREST equivalent of the original `dynmap.DynMap`: an open
//! map of string keys to loosely-typed values that every wire format
//! (JSON, binary, URL form) can serialize losslessly. Nested maps are
//! reachable either as a literal key (`"a.b.c"` as one map entry) or, when
//! no literal entry exists, by walking the dot-separated path through
//! sub-maps (see [`Value::get`]).
#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]
#![deny(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt;

mod convert;
mod error;
mod urlencode;

pub use error::TypesError;

/// A dynamically typed value, the STREST analogue of the original
/// `interface{}`-valued `DynMap`.
#[derive(Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Bytes(Vec<u8>),
    Map(DynMap),
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            Value::List(l) => l.fmt(f),
            Value::Map(m) => m.fmt(f),
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

/// An open map of string keys to [`Value`]s, the STREST equivalent of the
/// original `DynMap`. Backed by a `BTreeMap` so JSON round-trips produce a
/// deterministic key order, which the test suite relies on for stable
/// fixture comparisons (the wire format itself does not require ordering).
#[derive(Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct DynMap {
    inner: BTreeMap<String, Value>,
}

impl fmt::Debug for DynMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.inner.iter()).finish()
    }
}

impl DynMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.inner.iter()
    }

    /// Unconditional insert at a literal key (no dot-path interpretation).
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.inner.insert(key.into(), value.into());
    }

    /// Insert honoring the dot operator: `put_dotted("a.b", v)` builds
    /// `{a: {b: v}}`. Errors if an existing non-map value occupies an
    /// intermediate path segment.
    pub fn put_dotted(&mut self, key: &str, value: impl Into<Value>) -> Result<(), TypesError> {
        let parts: Vec<&str> = key.split('.').collect();
        if parts.len() == 1 {
            self.put(key, value);
            return Ok(());
        }
        let mut cursor = &mut self.inner;
        for part in &parts[..parts.len() - 1] {
            let entry = cursor
                .entry((*part).to_string())
                .or_insert_with(|| Value::Map(DynMap::new()));
            match entry {
                Value::Map(m) => cursor = &mut m.inner,
                _ => {
                    return Err(TypesError::NotAMap {
                        key: (*part).to_string(),
                    });
                }
            }
        }
        cursor.insert(parts[parts.len() - 1].to_string(), value.into());
        Ok(())
    }

    /// Insert only if no value is currently reachable at `key` (literal
    /// lookup only, does not honor the dot operator — matches the
    /// original's `PutIfAbsent`).
    pub fn put_if_absent(&mut self, key: impl Into<String>, value: impl Into<Value>) -> bool {
        let key = key.into();
        if self.inner.contains_key(&key) {
            return false;
        }
        self.inner.insert(key, value.into());
        true
    }

    pub fn exists(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Gets or creates a nested map at a literal key, replacing whatever
    /// non-map value was there. Used by the URL-form decoder to build
    /// bracket-nested structures one segment at a time.
    pub(crate) fn ensure_map(&mut self, key: &str) -> &mut DynMap {
        let entry = self.inner.entry(key.to_string()).or_insert_with(|| Value::Map(DynMap::new()));
        if !matches!(entry, Value::Map(_)) {
            *entry = Value::Map(DynMap::new());
        }
        match entry {
            Value::Map(m) => m,
            _ => unreachable!(),
        }
    }

    /// Reads a value, honoring the dot operator. The literal key is tried
    /// first; only if absent is the key split on `.` and traversed through
    /// sub-maps. This mirrors the original `DynMap.Get`, whose literal-key
    /// lookup takes priority over the dotted-path interpretation.
    pub fn get(&self, key: &str) -> Option<&Value> {
        if let Some(v) = self.inner.get(key) {
            return Some(v);
        }
        let parts: Vec<&str> = key.split('.').collect();
        if parts.len() == 1 {
            return None;
        }
        let mut current = self.inner.get(parts[0])?;
        for part in &parts[1..] {
            match current {
                Value::Map(m) => current = m.inner.get(*part)?,
                _ => return None,
            }
        }
        Some(current)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.get(key)? {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn get_string_or_default<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get_str(key).unwrap_or(default)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            Value::Int(i) => Some(*i),
            Value::Float(f) => Some(*f as i64),
            Value::Str(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn get_int(&self, key: &str) -> Option<i32> {
        self.get_i64(key).map(|v| v as i32)
    }

    pub fn must_int(&self, key: &str, default: i32) -> i32 {
        self.get_int(key).unwrap_or(default)
    }

    pub fn get_dynmap(&self, key: &str) -> Option<&DynMap> {
        match self.get(key)? {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn get_int_slice(&self, key: &str) -> Option<Vec<i64>> {
        match self.get(key)? {
            Value::List(items) => items
                .iter()
                .map(|v| match v {
                    Value::Int(i) => Some(*i),
                    Value::Float(f) => Some(*f as i64),
                    _ => None,
                })
                .collect(),
            _ => None,
        }
    }

    pub fn get_dynmap_slice(&self, key: &str) -> Option<Vec<&DynMap>> {
        match self.get(key)? {
            Value::List(items) => items
                .iter()
                .map(|v| match v {
                    Value::Map(m) => Some(m),
                    _ => None,
                })
                .collect(),
            _ => None,
        }
    }

    /// Copies every entry from `other` into `self` at the top level.
    pub fn put_all(&mut self, other: &DynMap) {
        for (k, v) in other.inner.iter() {
            self.inner.insert(k.clone(), v.clone());
        }
    }

    /// Encodes this map as a URL query string in Rails-style bracket
    /// notation (`a[b][c]=v`), matching the original `DynMap.URLEncode`.
    pub fn url_encode(&self) -> String {
        urlencode::encode(self)
    }

    /// Decodes a URL query string or `application/x-www-form-urlencoded`
    /// body into a `DynMap`, the inverse of `url_encode`.
    pub fn url_decode(input: &str) -> DynMap {
        urlencode::decode(input)
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

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<DynMap> for Value {
    fn from(v: DynMap) -> Self {
        Value::Map(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}
