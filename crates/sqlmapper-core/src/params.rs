//! Named parameter sets supplied to a render.

use crate::Result;
use crate::error::{Error, TypeError};
use crate::value::Value;
use serde::Serialize;
use std::collections::BTreeMap;

/// A set of named parameters.
///
/// Names are top-level keys; nested objects are stored as [`Value::Json`]
/// and reached with dotted paths (`user.name`), sequences as
/// [`Value::Array`] (`ids.0` addresses an element).
///
/// # Example
///
/// ```
/// use sqlmapper_core::{Params, Value};
///
/// let params = Params::new().with("name", "bob").with("ids", vec![1_i64, 2]);
/// assert_eq!(params.get("name"), Some(&Value::Text("bob".into())));
/// assert_eq!(params.resolve("ids.1"), Some(Value::BigInt(2)));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    values: BTreeMap<String, Value>,
}

impl Params {
    /// Create an empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter, builder style.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Add or replace a parameter.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    /// Get a top-level parameter.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Check whether a top-level parameter is present.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate parameters in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Resolve a dotted path such as `user.address.city` or `ids.0`.
    pub fn resolve(&self, path: &str) -> Option<Value> {
        let mut segments = path.split('.');
        let root = self.values.get(segments.next()?)?;
        descend(root, segments)
    }

    /// Build a parameter set from a JSON object.
    pub fn from_json(json: serde_json::Value) -> Result<Self> {
        match json {
            serde_json::Value::Object(map) => Ok(Self {
                values: map
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            }),
            other => Err(Error::Type(TypeError {
                expected: "object",
                actual: json_type_name(&other).to_string(),
                column: None,
            })),
        }
    }

    /// Build a parameter set from any serializable struct or map.
    ///
    /// Each top-level field becomes a parameter.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Self::from_json(serde_json::to_value(value)?)
    }
}

/// Follow the remaining path segments below `root`.
///
/// Numeric segments index into sequences, other segments select object fields.
pub fn descend<'a>(root: &Value, segments: impl IntoIterator<Item = &'a str>) -> Option<Value> {
    let mut current = root.clone();
    for segment in segments {
        current = match segment.parse::<usize>() {
            Ok(index) => current
                .element(index)
                .or_else(|| current.field(segment))?,
            Err(_) => current.field(segment)?,
        };
    }
    Some(current)
}

fn json_type_name(json: &serde_json::Value) -> &'static str {
    match json {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
