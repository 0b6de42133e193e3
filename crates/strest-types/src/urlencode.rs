//! Rails-style bracket-notation URL encoding: `put("a", {"b": 1})` encodes
//! as `a[b]=1`; lists repeat the key (`a=1&a=2`). Ported from the original
//! `DynMap.urlEncode`, with a decoder for the inverse direction (query
//! strings and `application/x-www-form-urlencoded` bodies), matching the
//! shape of the original's `req.ParseForm` + `DynMap.UnmarshalURLValues`.

use crate::{convert, DynMap, Value};

pub(crate) fn encode(map: &DynMap) -> String {
    let mut pairs: Vec<(String, String)> = Vec::new();
    for (key, value) in map.iter() {
        collect(&mut pairs, key, value);
    }
    pairs
        .into_iter()
        .map(|(k, v)| format!("{}={}", percent_encode(&k), percent_encode(&v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn collect(pairs: &mut Vec<(String, String)>, key: &str, value: &Value) {
    match value {
        Value::Map(m) => {
            for (k, v) in m.iter() {
                collect(pairs, &format!("{key}[{k}]"), v);
            }
        }
        Value::List(items) => {
            for item in items {
                collect(pairs, key, item);
            }
        }
        other => pairs.push((key.to_string(), convert::to_string(other))),
    }
}

/// Decodes a query string or `application/x-www-form-urlencoded` body into
/// a `DynMap`. Bracket notation (`a[b][c]=v`) nests into sub-maps; a key
/// repeated without brackets (`tag=a&tag=b`) accumulates into a list.
pub(crate) fn decode(input: &str) -> DynMap {
    let mut map = DynMap::new();
    for pair in input.split('&') {
        if pair.is_empty() {
            continue;
        }
        let mut halves = pair.splitn(2, '=');
        let raw_key = halves.next().unwrap_or("");
        let raw_value = halves.next().unwrap_or("");
        let key = percent_decode(raw_key);
        if key.is_empty() {
            continue;
        }
        let value = percent_decode(raw_value);
        put_path(&mut map, &key, value);
    }
    map
}

/// Splits `a[b][c]` into `["a", "b", "c"]`; a bracket-free key is a single
/// segment.
fn split_brackets(key: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    for c in key.chars() {
        match c {
            '[' | ']' => {
                if !current.is_empty() {
                    segments.push(std::mem::take(&mut current));
                }
            }
            other => current.push(other),
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

fn put_path(map: &mut DynMap, key: &str, value: String) {
    let segments = split_brackets(key);
    let Some((last, ancestors)) = segments.split_last() else {
        return;
    };
    let mut cursor = map;
    for segment in ancestors {
        cursor = cursor.ensure_map(segment);
    }
    accumulate(cursor, last, value);
}

/// Inserts `value` at `key`, turning a second insert at the same key into a
/// list rather than overwriting the first (mirrors form-encoded repeated
/// keys such as `tag=a&tag=b`).
fn accumulate(map: &mut DynMap, key: &str, value: String) {
    match map.get(key).cloned() {
        Some(Value::List(mut items)) => {
            items.push(Value::Str(value));
            map.put(key, items);
        }
        Some(existing) => map.put(key, vec![existing, Value::Str(value)]),
        None => map.put(key, value),
    }
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    None => {
                        out.push(bytes[i]);
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_map_uses_bracket_notation() {
        let mut outer = DynMap::new();
        let mut inner = DynMap::new();
        inner.put("json", 8009i64);
        outer.put("ports", inner);
        assert_eq!(encode(&outer), "ports%5Bjson%5D=8009");
    }

    #[test]
    fn list_repeats_key() {
        let mut m = DynMap::new();
        m.put("tag", vec!["a", "b"]);
        let encoded = encode(&m);
        assert!(encoded.contains("tag=a"));
        assert!(encoded.contains("tag=b"));
    }

    #[test]
    fn decode_flat_pairs() {
        let m = decode("name=bob&age=9");
        assert_eq!(m.get_str("name"), Some("bob"));
        assert_eq!(m.get_str("age"), Some("9"));
    }

    #[test]
    fn decode_bracket_notation_nests() {
        let m = decode("ports%5Bjson%5D=8009");
        assert_eq!(m.get_dynmap("ports").and_then(|p| p.get_str("json")), Some("8009"));
    }

    #[test]
    fn decode_repeated_key_becomes_list() {
        let m = decode("tag=a&tag=b&tag=c");
        let tags = m.get_int_slice("tag");
        assert!(tags.is_none());
        match m.get("tag") {
            Some(Value::List(items)) => assert_eq!(items.len(), 3),
            other => panic!("expected a list, got {other:?}"),
        }
    }

    #[test]
    fn decode_handles_percent_and_plus_escapes() {
        let m = decode("q=hello+world&sym=%26");
        assert_eq!(m.get_str("q"), Some("hello world"));
        assert_eq!(m.get_str("sym"), Some("&"));
    }

    #[test]
    fn decode_is_inverse_of_encode_for_nested_map() {
        let mut outer = DynMap::new();
        let mut inner = DynMap::new();
        inner.put("json", 8009i64);
        outer.put("ports", inner);
        let decoded = decode(&encode(&outer));
        assert_eq!(decoded.get_dynmap("ports").and_then(|p| p.get_str("json")), Some("8009"));
    }
}
