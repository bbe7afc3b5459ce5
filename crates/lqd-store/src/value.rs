//! Runtime cell values and coercions.
//!
//! Upstream payloads arrive as liberal JSON; every conversion here is total
//! and idempotent, returning the type's zero value on failure. This is a
//! compatibility requirement, not defensive coding: upstream cores send
//! booleans for ints, numbers for strings and the occasional scalar `0`
//! where a list belongs.

use std::collections::HashMap;

use serde_json::Value as Json;
use tracing::warn;

use lqd_common::LIST_SEP;
use lqd_schema::DataType;

/// One `(host, service)` pair of a servicegroup member list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceMember {
    /// Host name.
    pub host: String,
    /// Service description.
    pub service: String,
}

/// A typed cell value, used for virtual-column results and raw value
/// extraction.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// String value.
    Str(String),
    /// List of strings.
    StrList(Vec<String>),
    /// Integer value (covers both int and int64 columns).
    Int(i64),
    /// Float value.
    Float(f64),
    /// List of integers.
    IntList(Vec<i64>),
    /// String-to-string map.
    Hash(HashMap<String, String>),
    /// List of `(host, service)` pairs.
    Members(Vec<ServiceMember>),
    /// Arbitrary values, carried verbatim.
    List(Vec<Json>),
}

/// Returns the empty placeholder for the given column type: string `""`,
/// numeric `-1`, empty list, empty map.
#[must_use]
pub fn empty_value(data_type: DataType) -> Value {
    match data_type {
        DataType::String | DataType::LargeString => Value::Str(String::new()),
        DataType::Int | DataType::Int64 => Value::Int(-1),
        DataType::Float => Value::Float(-1.0),
        DataType::StringList => Value::StrList(Vec::new()),
        DataType::Int64List => Value::IntList(Vec::new()),
        DataType::HashMap | DataType::CustomVar => Value::Hash(HashMap::new()),
        DataType::ServiceMemberList => Value::Members(Vec::new()),
        DataType::InterfaceList => Value::List(Vec::new()),
    }
}

impl Value {
    /// Converts a raw JSON value into the closest typed cell.
    #[must_use]
    pub fn from_json(value: &Json) -> Value {
        match value {
            Json::String(s) => Value::Str(s.clone()),
            Json::Bool(b) => Value::Int(i64::from(*b)),
            Json::Number(n) => match n.as_i64() {
                Some(v) => Value::Int(v),
                None => Value::Float(n.as_f64().unwrap_or(0.0)),
            },
            Json::Array(items) => Value::List(items.clone()),
            Json::Object(_) => Value::Hash(json_to_hashmap(value)),
            Json::Null => Value::Str(String::new()),
        }
    }

    /// Coerces this value to the declared data type of a column, the way
    /// virtual resolver results are normalized.
    #[must_use]
    pub fn cast_to(self, data_type: DataType) -> Value {
        match data_type {
            DataType::String | DataType::LargeString => Value::Str(self.into_display_string()),
            DataType::Int | DataType::Int64 => Value::Int(self.as_i64()),
            DataType::Float => Value::Float(self.as_f64()),
            DataType::StringList => match self {
                Value::StrList(_) => self,
                _ => Value::StrList(Vec::new()),
            },
            DataType::Int64List => match self {
                Value::IntList(_) => self,
                _ => Value::IntList(Vec::new()),
            },
            DataType::HashMap | DataType::CustomVar => match self {
                Value::Hash(_) => self,
                _ => Value::Hash(HashMap::new()),
            },
            DataType::ServiceMemberList => match self {
                Value::Members(_) => self,
                _ => Value::Members(Vec::new()),
            },
            DataType::InterfaceList => match self {
                Value::List(_) => self,
                Value::IntList(list) => {
                    Value::List(list.into_iter().map(Json::from).collect())
                }
                Value::StrList(list) => {
                    Value::List(list.into_iter().map(Json::from).collect())
                }
                _ => Value::List(Vec::new()),
            },
        }
    }

    /// Numeric view of this value; strings parse or count as 0.
    #[must_use]
    pub fn as_f64(&self) -> f64 {
        match self {
            Value::Int(v) => *v as f64,
            Value::Float(v) => *v,
            Value::Str(s) => s.parse().unwrap_or(0.0),
            _ => 0.0,
        }
    }

    /// Integer view of this value.
    #[must_use]
    pub fn as_i64(&self) -> i64 {
        match self {
            Value::Int(v) => *v,
            Value::Float(v) => *v as i64,
            Value::Str(s) => s.parse().unwrap_or(0),
            _ => 0,
        }
    }

    /// Renders this value as a scalar string; lists join with the NUL
    /// separator.
    #[must_use]
    pub fn into_display_string(self) -> String {
        match self {
            Value::Str(s) => s,
            Value::Int(v) => v.to_string(),
            Value::Float(v) => v.to_string(),
            Value::StrList(list) => join_list(list.iter().map(String::as_str)),
            Value::IntList(list) => join_list(list.iter().map(|v| v.to_string())),
            Value::Hash(map) => {
                let mut pairs: Vec<String> =
                    map.into_iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                pairs.sort();
                pairs.join(LIST_SEP)
            }
            Value::Members(members) => join_list(
                members
                    .iter()
                    .map(|m| format!("{}|{}", m.host, m.service)),
            ),
            Value::List(list) => join_list(list.iter().map(json_display)),
        }
    }

    /// Renders this value as a JSON cell.
    #[must_use]
    pub fn into_json(self) -> Json {
        match self {
            Value::Str(s) => Json::String(s),
            Value::Int(v) => Json::from(v),
            Value::Float(v) => number_to_json(v),
            Value::StrList(list) => Json::Array(list.into_iter().map(Json::String).collect()),
            Value::IntList(list) => Json::Array(list.into_iter().map(Json::from).collect()),
            Value::Hash(map) => Json::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Json::String(v)))
                    .collect(),
            ),
            Value::Members(members) => Json::Array(
                members
                    .into_iter()
                    .map(|m| Json::Array(vec![Json::String(m.host), Json::String(m.service)]))
                    .collect(),
            ),
            Value::List(list) => Json::Array(list),
        }
    }
}

/// Renders a float as a JSON number the way the wire format expects:
/// integral values lose their fraction (`1`, not `1.0`).
#[must_use]
pub fn number_to_json(value: f64) -> Json {
    if value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 {
        Json::from(value as i64)
    } else {
        Json::from(value)
    }
}

/// Joins rendered list elements with the NUL separator.
fn join_list<I, S>(items: I) -> String
where
    I: Iterator<Item = S>,
    S: AsRef<str>,
{
    let mut joined = String::new();
    for item in items {
        joined.push_str(item.as_ref());
        joined.push_str(LIST_SEP);
    }
    joined
}

fn json_display(value: &Json) -> String {
    match value {
        Json::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// Coercions from raw upstream JSON cells. Each mirrors the liberal typing
// of the wire format and never fails.

/// Converts a raw cell to a float.
#[must_use]
pub fn json_to_float(value: &Json) -> f64 {
    match value {
        Json::Number(n) => n.as_f64().unwrap_or(0.0),
        Json::Bool(true) => 1.0,
        Json::Bool(false) => 0.0,
        Json::String(s) => s.parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Converts a raw cell to a 64-bit integer.
#[must_use]
pub fn json_to_int64(value: &Json) -> i64 {
    match value {
        Json::Number(n) => n
            .as_i64()
            .unwrap_or_else(|| n.as_f64().unwrap_or(0.0) as i64),
        Json::Bool(true) => 1,
        Json::Bool(false) => 0,
        Json::String(s) => s.parse().unwrap_or(0),
        _ => 0,
    }
}

/// Converts a raw cell to a 32-bit integer.
#[must_use]
pub fn json_to_int(value: &Json) -> i32 {
    json_to_int64(value) as i32
}

/// Converts a raw cell to a string without interning; used for ephemeral
/// rendering.
#[must_use]
pub fn json_to_string(value: &Json) -> String {
    match value {
        Json::String(s) => s.clone(),
        Json::Null => String::new(),
        Json::Number(n) => n.to_string(),
        Json::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Converts a raw cell to a string list. Icinga 2 sends a scalar `0` for
/// empty lists, which must coerce to the empty list.
#[must_use]
pub fn json_to_string_list(value: &Json) -> Vec<String> {
    match value {
        Json::Array(items) => items.iter().map(json_to_string).collect(),
        Json::Number(n) if n.as_f64() == Some(0.0) => Vec::new(),
        Json::Number(_) => vec![json_to_string(value)],
        Json::Null => Vec::new(),
        other => {
            warn!("unsupported string list value: {}", other);
            Vec::new()
        }
    }
}

/// Converts a raw cell to an integer list.
#[must_use]
pub fn json_to_int64_list(value: &Json) -> Vec<i64> {
    match value {
        Json::Array(items) => items.iter().map(json_to_int64).collect(),
        Json::Null => Vec::new(),
        Json::Number(n) if n.as_f64() == Some(0.0) => Vec::new(),
        other => {
            warn!("unsupported int list value: {}", other);
            Vec::new()
        }
    }
}

/// Converts a raw cell to a hash map. Accepts both objects and lists of
/// `[key, value]` pairs.
#[must_use]
pub fn json_to_hashmap(value: &Json) -> HashMap<String, String> {
    match value {
        Json::Object(map) => map
            .iter()
            .map(|(k, v)| {
                let v = match v {
                    Json::String(s) => s.clone(),
                    _ => String::new(),
                };
                (k.clone(), v)
            })
            .collect(),
        Json::Array(pairs) => {
            let mut map = HashMap::new();
            for pair in pairs {
                if let Json::Array(kv) = pair {
                    if kv.len() == 2 {
                        map.insert(json_to_string(&kv[0]), json_to_string(&kv[1]));
                    }
                }
            }
            map
        }
        Json::Null => HashMap::new(),
        other => {
            warn!("unsupported hashmap value: {}", other);
            HashMap::new()
        }
    }
}

/// Converts a raw cell to a service member list.
#[must_use]
pub fn json_to_members(value: &Json) -> Vec<ServiceMember> {
    match value {
        Json::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Json::Array(pair) if pair.len() == 2 => Some(ServiceMember {
                    host: json_to_string(&pair[0]),
                    service: json_to_string(&pair[1]),
                }),
                _ => None,
            })
            .collect(),
        Json::Null => Vec::new(),
        other => {
            warn!("unsupported service member list value: {}", other);
            Vec::new()
        }
    }
}

/// Converts a raw cell to a verbatim value list.
#[must_use]
pub fn json_to_interface_list(value: &Json) -> Vec<Json> {
    match value {
        Json::Array(items) => items.clone(),
        Json::Null => Vec::new(),
        other => {
            warn!("unsupported interface list value: {}", other);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_float_coercion_is_total() {
        assert_eq!(json_to_float(&json!(1.5)), 1.5);
        assert_eq!(json_to_float(&json!(true)), 1.0);
        assert_eq!(json_to_float(&json!("2.5")), 2.5);
        assert_eq!(json_to_float(&json!("not a number")), 0.0);
        assert_eq!(json_to_float(&json!([1, 2])), 0.0);
        assert_eq!(json_to_float(&Json::Null), 0.0);
    }

    #[test]
    fn test_int_coercion() {
        assert_eq!(json_to_int64(&json!(42)), 42);
        assert_eq!(json_to_int64(&json!(42.9)), 42);
        assert_eq!(json_to_int64(&json!(false)), 0);
        assert_eq!(json_to_int64(&json!("17")), 17);
        assert_eq!(json_to_int64(&json!("17.5")), 0);
    }

    #[test]
    fn test_scalar_zero_becomes_empty_list() {
        assert!(json_to_string_list(&json!(0)).is_empty());
        assert_eq!(json_to_string_list(&json!(5)), vec!["5".to_string()]);
        assert_eq!(
            json_to_string_list(&json!(["a", "b"])),
            vec!["a".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn test_hashmap_from_pairs_and_object() {
        let from_pairs = json_to_hashmap(&json!([["TAGS", "prod"], ["SITE", "a"]]));
        assert_eq!(from_pairs.get("TAGS").map(String::as_str), Some("prod"));
        let from_object = json_to_hashmap(&json!({"TAGS": "prod"}));
        assert_eq!(from_object.get("TAGS").map(String::as_str), Some("prod"));
    }

    #[test]
    fn test_empty_values() {
        assert_eq!(empty_value(DataType::String), Value::Str(String::new()));
        assert_eq!(empty_value(DataType::Int), Value::Int(-1));
        assert_eq!(empty_value(DataType::Float), Value::Float(-1.0));
        assert_eq!(empty_value(DataType::StringList), Value::StrList(Vec::new()));
    }

    #[test]
    fn test_cast_is_idempotent() {
        let v = Value::Str("5".into()).cast_to(DataType::Int);
        assert_eq!(v, Value::Int(5));
        assert_eq!(v.clone().cast_to(DataType::Int), v);

        let v = Value::Int(3).cast_to(DataType::String);
        assert_eq!(v, Value::Str("3".into()));
    }

    #[test]
    fn test_members_round_trip() {
        let members = json_to_members(&json!([["h1", "svc1"], ["h2", "svc2"]]));
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].host, "h1");
        let rendered = Value::Members(members).into_json();
        assert_eq!(rendered, json!([["h1", "svc1"], ["h2", "svc2"]]));
    }
}
