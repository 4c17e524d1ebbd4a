//! Dotted-path read/write access into a JSON-like document encoded as bytes.
//!
//! Reads into a document that is not an object/array at a given prefix return
//! [`Accessed::Missing`] rather than failing. Writes create intermediate
//! objects for any missing prefix. The sentinel `-1` as the final path
//! segment means "append a new array element" (creating the array if it does
//! not already exist).
use serde_json::Value;

/// Result of a [`get`] lookup. Never errors; a path into a document that does
/// not resolve to a value reports [`Accessed::Missing`].
#[derive(Debug, Clone, PartialEq)]
pub enum Accessed {
    /// The path resolved to this value.
    Present(Value),
    /// The path does not exist in the document.
    Missing,
}

impl Accessed {
    /// Returns `true` if the path resolved to a value.
    pub fn exists(&self) -> bool {
        matches!(self, Accessed::Present(_))
    }

    /// Renders the accessed value as a string the way the source's `.String()`
    /// accessor does: strings are returned verbatim (no surrounding quotes),
    /// every other JSON type is rendered via its JSON text form, and a
    /// missing value renders as the empty string.
    pub fn render_string(&self) -> String {
        match self {
            Accessed::Present(Value::String(s)) => s.clone(),
            Accessed::Present(v) => v.to_string(),
            Accessed::Missing => String::new(),
        }
    }

    /// Returns the underlying [`Value`], or `Value::Null` if missing.
    pub fn into_value(self) -> Value {
        match self {
            Accessed::Present(v) => v,
            Accessed::Missing => Value::Null,
        }
    }

    /// Borrow the underlying value, if present.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Accessed::Present(v) => Some(v),
            Accessed::Missing => None,
        }
    }
}

const APPEND_INDEX: &str = "-1";

fn split_path(path: &str) -> Vec<&str> {
    if path.is_empty() {
        Vec::new()
    } else {
        path.split('.').collect()
    }
}

/// Parses `data` as JSON (treating empty input as `null`) and reads `path`
/// out of it. Array segments are numeric indices; a non-existent prefix (or
/// a prefix that isn't an object/array) simply reports [`Accessed::Missing`].
pub fn get(data: &[u8], path: &str) -> Accessed {
    let root: Value = if data.is_empty() {
        Value::Null
    } else {
        match serde_json::from_slice(data) {
            Ok(v) => v,
            Err(_) => return Accessed::Missing,
        }
    };

    get_in_value(&root, path)
}

/// Same as [`get`] but operates directly on an in-memory [`Value`], which the
/// raw-payload leaf transforms use to stage array-building through a scratch
/// document before replacing the message payload wholesale.
pub fn get_in_value(root: &Value, path: &str) -> Accessed {
    if path.is_empty() {
        return Accessed::Present(root.clone());
    }

    let mut current = root;
    for segment in split_path(path) {
        match current {
            Value::Object(map) => match map.get(segment) {
                Some(v) => current = v,
                None => return Accessed::Missing,
            },
            Value::Array(items) => match segment.parse::<usize>() {
                Ok(idx) => match items.get(idx) {
                    Some(v) => current = v,
                    None => return Accessed::Missing,
                },
                Err(_) => return Accessed::Missing,
            },
            _ => return Accessed::Missing,
        }
    }

    Accessed::Present(current.clone())
}

/// Parses `data` as JSON (treating empty input as `{}`), writes `value` at
/// `path`, and returns the re-serialized document. A final segment of `-1`
/// appends to the array at the path's prefix, creating it if absent.
pub fn set(data: &[u8], path: &str, value: Value) -> serde_json::Result<Vec<u8>> {
    let mut root: Value = if data.is_empty() {
        Value::Object(serde_json::Map::new())
    } else {
        serde_json::from_slice(data).unwrap_or_else(|_| Value::Object(serde_json::Map::new()))
    };

    set_in_value(&mut root, path, value);
    serde_json::to_vec(&root)
}

/// Same as [`set`] but mutates an in-memory [`Value`] directly.
pub fn set_in_value(root: &mut Value, path: &str, value: Value) {
    let segments = split_path(path);
    if segments.is_empty() {
        *root = value;
        return;
    }
    set_recursive(root, &segments, value);
}

fn set_recursive(current: &mut Value, segments: &[&str], value: Value) {
    let (head, rest) = (segments[0], &segments[1..]);

    if rest.is_empty() {
        set_leaf(current, head, value);
        return;
    }

    let child = navigate_or_create(current, head, rest[0]);
    set_recursive(child, rest, value);
}

/// Sets the final path segment on `current`, which must already have been
/// coerced into an object or array by the caller.
fn set_leaf(current: &mut Value, segment: &str, value: Value) {
    if segment == APPEND_INDEX {
        ensure_array(current).push(value);
        return;
    }

    if let Ok(idx) = segment.parse::<usize>() {
        let arr = ensure_array(current);
        grow_array(arr, idx);
        arr[idx] = value;
        return;
    }

    ensure_object(current).insert(segment.to_string(), value);
}

/// Descends into `current[segment]`, creating an object or array at that key
/// (based on whether the *next* segment looks numeric) if it is missing or
/// of the wrong shape.
fn navigate_or_create<'a>(current: &'a mut Value, segment: &str, next_segment: &str) -> &'a mut Value {
    let next_is_index = next_segment == APPEND_INDEX || next_segment.parse::<usize>().is_ok();

    if segment == APPEND_INDEX {
        let arr = ensure_array(current);
        arr.push(if next_is_index {
            Value::Array(Vec::new())
        } else {
            Value::Object(serde_json::Map::new())
        });
        let last = arr.len() - 1;
        return &mut arr[last];
    }

    if let Ok(idx) = segment.parse::<usize>() {
        let arr = ensure_array(current);
        grow_array(arr, idx);
        if !matches!(arr[idx], Value::Object(_) | Value::Array(_)) {
            arr[idx] = if next_is_index {
                Value::Array(Vec::new())
            } else {
                Value::Object(serde_json::Map::new())
            };
        }
        return &mut arr[idx];
    }

    let obj = ensure_object(current);
    let entry = obj.entry(segment.to_string()).or_insert_with(|| {
        if next_is_index {
            Value::Array(Vec::new())
        } else {
            Value::Object(serde_json::Map::new())
        }
    });
    if !matches!(entry, Value::Object(_) | Value::Array(_)) {
        *entry = if next_is_index {
            Value::Array(Vec::new())
        } else {
            Value::Object(serde_json::Map::new())
        };
    }
    entry
}

fn ensure_object(v: &mut Value) -> &mut serde_json::Map<String, Value> {
    if !matches!(v, Value::Object(_)) {
        *v = Value::Object(serde_json::Map::new());
    }
    match v {
        Value::Object(m) => m,
        _ => unreachable!(),
    }
}

fn ensure_array(v: &mut Value) -> &mut Vec<Value> {
    if !matches!(v, Value::Array(_)) {
        *v = Value::Array(Vec::new());
    }
    match v {
        Value::Array(a) => a,
        _ => unreachable!(),
    }
}

fn grow_array(arr: &mut Vec<Value>, idx: usize) {
    while arr.len() <= idx {
        arr.push(Value::Null);
    }
}

/// Deletes the value at `path`, if present. A no-op for missing paths.
pub fn delete(data: &[u8], path: &str) -> serde_json::Result<Vec<u8>> {
    let mut root: Value = if data.is_empty() {
        return Ok(data.to_vec());
    } else {
        serde_json::from_slice(data)?
    };

    let segments = split_path(path);
    if let Some((last, prefix)) = segments.split_last() {
        if let Accessed::Present(mut parent) =
            get_in_value(&root, &prefix.join("."))
        {
            match &mut parent {
                Value::Object(map) => {
                    map.remove(*last);
                }
                Value::Array(items) => {
                    if let Ok(idx) = last.parse::<usize>() {
                        if idx < items.len() {
                            items.remove(idx);
                        }
                    }
                }
                _ => {}
            }
            set_in_value(&mut root, &prefix.join("."), parent);
        }
    }

    serde_json::to_vec(&root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn get_missing_path_never_fails() {
        let data = br#"{"a":1}"#;
        assert_eq!(get(data, "b.c.d"), Accessed::Missing);
    }

    #[test]
    fn get_nested_object() {
        let data = br#"{"a":{"b":42}}"#;
        assert_eq!(get(data, "a.b"), Accessed::Present(json!(42)));
    }

    #[test]
    fn get_array_index() {
        let data = br#"{"a":[1,2,3]}"#;
        assert_eq!(get(data, "a.1"), Accessed::Present(json!(2)));
    }

    #[test]
    fn set_creates_intermediate_objects() {
        let out = set(b"{}", "a.b.c", json!(1)).unwrap();
        let v: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(v, json!({"a":{"b":{"c":1}}}));
    }

    #[test]
    fn set_append_creates_array() {
        let mut buf = Vec::new();
        for item in ["1", "22", "333"] {
            buf = set(&buf, "key.-1", json!(item)).unwrap();
        }
        let v: Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(v, json!({"key": ["1", "22", "333"]}));
    }

    #[test]
    fn set_same_field_in_place_leaves_siblings() {
        let out = set(br#"{"a":1,"b":2}"#, "a", json!(99)).unwrap();
        let v: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(v, json!({"a":99,"b":2}));
    }

    #[test]
    fn render_string_unwraps_json_strings() {
        assert_eq!(
            Accessed::Present(json!("hello")).render_string(),
            "hello"
        );
        assert_eq!(Accessed::Present(json!(42)).render_string(), "42");
        assert_eq!(Accessed::Missing.render_string(), "");
    }

    #[test]
    fn delete_removes_object_key() {
        let out = delete(br#"{"a":1,"b":2}"#, "a").unwrap();
        let v: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(v, json!({"b":2}));
    }
}
