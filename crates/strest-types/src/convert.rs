//! Lossy stringification used by [`crate::DynMap::url_encode`], matching the
//! original `dynmap.ToString`.

use crate::Value;

pub(crate) fn to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Str(s) => s.clone(),
        Value::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
        Value::List(_) | Value::Map(_) => String::new(),
    }
}
