//! Node metadata.
//!
//! Keys are colon-qualified strings: `osm:*` mirrors source feature tags,
//! `ddd:*` drives engine behavior. Keys starting with `_` are transient and,
//! like `uv` and `osm:feature`, never exported.

use std::collections::BTreeMap;

use crate::node::Node;

/// A metadata value.
#[derive(Debug, Clone)]
pub enum MetaValue {
    /// Explicit null.
    Null,
    /// Boolean.
    Bool(bool),
    /// Number.
    Number(f64),
    /// String.
    String(String),
    /// Ordered list.
    List(Vec<MetaValue>),
    /// String-keyed map.
    Map(BTreeMap<String, MetaValue>),
    /// Reference to another node.
    Node(Node),
}

/// Metadata map of a node.
pub type Metadata = BTreeMap<String, MetaValue>;

/// Keys that never leave the process.
const NEVER_EXPORTED: [&str; 2] = ["uv", "osm:feature"];

/// True for keys written by exporters.
pub fn is_exported_key(key: &str) -> bool {
    !key.starts_with('_') && !NEVER_EXPORTED.contains(&key)
}

impl PartialEq for MetaValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (MetaValue::Null, MetaValue::Null) => true,
            (MetaValue::Bool(a), MetaValue::Bool(b)) => a == b,
            (MetaValue::Number(a), MetaValue::Number(b)) => a == b,
            (MetaValue::String(a), MetaValue::String(b)) => a == b,
            (MetaValue::List(a), MetaValue::List(b)) => a == b,
            (MetaValue::Map(a), MetaValue::Map(b)) => a == b,
            (MetaValue::Node(a), MetaValue::Node(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl MetaValue {
    /// String content, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetaValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric content; numeric strings are parsed.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetaValue::Number(n) => Some(*n),
            MetaValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Boolean content; `"yes"`/`"no"` and `"true"`/`"false"` strings are accepted.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetaValue::Bool(b) => Some(*b),
            MetaValue::String(s) => match s.as_str() {
                "true" | "yes" => Some(true),
                "false" | "no" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Referenced node, if this is a node reference.
    pub fn as_node(&self) -> Option<&Node> {
        match self {
            MetaValue::Node(n) => Some(n),
            _ => None,
        }
    }

    /// Converts to JSON. Node references become their slash path.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            MetaValue::Null => Value::Null,
            MetaValue::Bool(b) => Value::Bool(*b),
            MetaValue::Number(n) => number_json(*n),
            MetaValue::String(s) => Value::String(s.clone()),
            MetaValue::List(l) => Value::Array(l.iter().map(MetaValue::to_json).collect()),
            MetaValue::Map(m) => {
                Value::Object(m.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
            }
            MetaValue::Node(n) => Value::String(n.path()),
        }
    }

    /// Converts from JSON.
    pub fn from_json(value: &serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => MetaValue::Null,
            Value::Bool(b) => MetaValue::Bool(*b),
            Value::Number(n) => MetaValue::Number(n.as_f64().unwrap_or(0.0)),
            Value::String(s) => MetaValue::String(s.clone()),
            Value::Array(a) => MetaValue::List(a.iter().map(MetaValue::from_json).collect()),
            Value::Object(o) => MetaValue::Map(
                o.iter()
                    .map(|(k, v)| (k.clone(), MetaValue::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Text used by regex filters and SVG attributes.
    ///
    /// Strings are returned raw, integral numbers without a fraction.
    pub fn to_text(&self) -> String {
        match self {
            MetaValue::String(s) => s.clone(),
            MetaValue::Node(n) => n.path(),
            other => other.to_json().to_string(),
        }
    }
}

/// Integral values are written as JSON integers.
fn number_json(n: f64) -> serde_json::Value {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map_or(serde_json::Value::Null, serde_json::Value::Number)
    }
}

impl From<bool> for MetaValue {
    fn from(b: bool) -> Self {
        MetaValue::Bool(b)
    }
}

impl From<f64> for MetaValue {
    fn from(n: f64) -> Self {
        MetaValue::Number(n)
    }
}

impl From<i64> for MetaValue {
    fn from(n: i64) -> Self {
        MetaValue::Number(n as f64)
    }
}

impl From<i32> for MetaValue {
    fn from(n: i32) -> Self {
        MetaValue::Number(f64::from(n))
    }
}

impl From<usize> for MetaValue {
    fn from(n: usize) -> Self {
        MetaValue::Number(n as f64)
    }
}

impl From<&str> for MetaValue {
    fn from(s: &str) -> Self {
        MetaValue::String(s.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(s: String) -> Self {
        MetaValue::String(s)
    }
}

impl From<Node> for MetaValue {
    fn from(n: Node) -> Self {
        MetaValue::Node(n)
    }
}

impl From<Vec<MetaValue>> for MetaValue {
    fn from(l: Vec<MetaValue>) -> Self {
        MetaValue::List(l)
    }
}

/// Typed access to metadata keys.
pub trait MetadataExt {
    /// String value of `key`.
    fn get_str(&self, key: &str) -> Option<&str>;
    /// Numeric value of `key`.
    fn get_f64(&self, key: &str) -> Option<f64>;
    /// Boolean value of `key`.
    fn get_bool(&self, key: &str) -> Option<bool>;
    /// `ddd:layer`.
    fn layer(&self) -> Option<&str> {
        self.get_str("ddd:layer")
    }
    /// `ddd:height`.
    fn height(&self) -> Option<f64> {
        self.get_f64("ddd:height")
    }
    /// `ddd:area:type`.
    fn area_type(&self) -> Option<&str> {
        self.get_str("ddd:area:type")
    }
    /// `ddd:material`.
    fn material_key(&self) -> Option<&str> {
        self.get_str("ddd:material")
    }
    /// Entries kept by exporters, as JSON.
    fn exported(&self) -> serde_json::Map<String, serde_json::Value>;
}

impl MetadataExt for Metadata {
    fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(MetaValue::as_str)
    }

    fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(MetaValue::as_f64)
    }

    fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(MetaValue::as_bool)
    }

    fn exported(&self) -> serde_json::Map<String, serde_json::Value> {
        self.iter()
            .filter(|(k, _)| is_exported_key(k))
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_accessors() {
        let mut m = Metadata::new();
        m.insert("ddd:height".into(), "12.5".into());
        m.insert("ddd:area:type".into(), "park".into());
        m.insert("ddd:ignore".into(), "yes".into());
        assert_eq!(m.height(), Some(12.5));
        assert_eq!(m.area_type(), Some("park"));
        assert_eq!(m.get_bool("ddd:ignore"), Some(true));
        assert_eq!(m.layer(), None);
    }

    #[test]
    fn test_export_filter() {
        let mut m = Metadata::new();
        m.insert("osm:building".into(), "yes".into());
        m.insert("_extrusion_last_offset".into(), 2.0.into());
        m.insert("uv".into(), MetaValue::Null);
        m.insert("osm:feature".into(), MetaValue::Null);
        let out = m.exported();
        assert_eq!(out.len(), 1);
        assert_eq!(out["osm:building"], "yes");
    }

    #[test]
    fn test_text_form() {
        assert_eq!(MetaValue::from(3.0).to_text(), "3");
        assert_eq!(MetaValue::from(2.5).to_text(), "2.5");
        assert_eq!(MetaValue::from("abc").to_text(), "abc");
        assert_eq!(MetaValue::from(true).to_text(), "true");
    }

    #[test]
    fn test_json_conversion() {
        let json = serde_json::json!({"a": [1, "x", null], "b": {"c": false}});
        let v = MetaValue::from_json(&json);
        assert_eq!(v.to_json(), json);
    }
}
