//! Input / output payload of a task.
//!
//! A flat, ordered map from string keys to scalar or scalar-array values.
//! Size is bounded: unbounded payload growth is a misuse, the store is not a
//! blob store.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Default upper bound for the JSON-encoded size of a [`Data`] payload.
pub const MAX_DATA_BYTES: usize = 10 * 1024;

/// Stored as plain JSON so payloads decode straight into typed work.
///
/// Floats must be finite (JSON has no NaN/inf). An empty array carries no
/// element type and reads back as `BoolArray`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    BoolArray(Vec<bool>),
    IntArray(Vec<i64>),
    FloatArray(Vec<f64>),
    StringArray(Vec<String>),
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    fn is_finite(&self) -> bool {
        match self {
            Value::Float(f) => f.is_finite(),
            Value::FloatArray(fs) => fs.iter().all(|f| f.is_finite()),
            _ => true,
        }
    }
}

macro_rules! impl_value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::$variant(v.into())
            }
        })*
    };
}

impl_value_from! {
    bool => Bool,
    i64 => Int,
    i32 => Int,
    u32 => Int,
    f64 => Float,
    String => String,
    &str => String,
    Vec<bool> => BoolArray,
    Vec<i64> => IntArray,
    Vec<f64> => FloatArray,
    Vec<String> => StringArray,
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum DataError {
    #[error("data payload is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },

    #[error("data value for key '{0}' is not a finite number")]
    NonFinite(String),

    #[error("data value for key '{0}' is not a scalar or scalar array")]
    UnsupportedValue(String),

    #[error("data must be a flat object, got {0}")]
    NotAnObject(String),
}

/// Immutable key/value payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Data(BTreeMap<String, Value>);

impl Data {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builder() -> DataBuilder {
        DataBuilder::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// JSON-encoded size in bytes.
    pub fn encoded_len(&self) -> usize {
        serde_json::to_vec(&self.0).map(|v| v.len()).unwrap_or(usize::MAX)
    }

    /// Reject non-finite floats and payloads over `limit` bytes.
    pub fn check(&self, limit: usize) -> Result<(), DataError> {
        if let Some((key, _)) = self.0.iter().find(|(_, v)| !v.is_finite()) {
            return Err(DataError::NonFinite(key.clone()));
        }
        let size = self.encoded_len();
        if size > limit {
            return Err(DataError::TooLarge { size, limit });
        }
        Ok(())
    }

    /// Convert a flat JSON object into `Data`.
    pub fn from_json(value: serde_json::Value) -> Result<Self, DataError> {
        let serde_json::Value::Object(map) = value else {
            return Err(DataError::NotAnObject(json_kind(&value).to_string()));
        };
        let mut out = BTreeMap::new();
        for (key, v) in map {
            let converted: Value = serde_json::from_value(v)
                .map_err(|_| DataError::UnsupportedValue(key.clone()))?;
            out.insert(key, converted);
        }
        Ok(Self(out))
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.0).unwrap_or(serde_json::Value::Null)
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[derive(Debug, Default)]
pub struct DataBuilder {
    values: BTreeMap<String, Value>,
}

impl DataBuilder {
    pub fn put(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn put_all(mut self, data: &Data) -> Self {
        for (k, v) in data.iter() {
            self.values.insert(k.to_string(), v.clone());
        }
        self
    }

    /// Build, enforcing [`MAX_DATA_BYTES`].
    pub fn build(self) -> Result<Data, DataError> {
        self.build_with_limit(MAX_DATA_BYTES)
    }

    pub fn build_with_limit(self, limit: usize) -> Result<Data, DataError> {
        let data = Data(self.values);
        data.check(limit)?;
        Ok(data)
    }
}
