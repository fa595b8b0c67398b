//! Cache key definitions.
//!
//! A key is `<query name>:<params>` where params is a JSON object whose
//! members are emitted in sorted order, so two parameter records with the
//! same contents always produce the same key.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Dashboard queries whose results are cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    DashboardStats,
    OrdersList,
    TopClients,
}

impl QueryKind {
    pub const ALL: [QueryKind; 3] = [
        QueryKind::DashboardStats,
        QueryKind::OrdersList,
        QueryKind::TopClients,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            QueryKind::DashboardStats => "dashboard_stats",
            QueryKind::OrdersList => "orders_list",
            QueryKind::TopClients => "top_clients",
        }
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single scalar query parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl ParamValue {
    fn to_json(&self) -> Value {
        match self {
            ParamValue::Text(value) => Value::String(value.clone()),
            ParamValue::Int(value) => Value::from(*value),
            // Non-finite floats become `null`, mirroring JSON serialization.
            ParamValue::Float(value) => Value::from(*value),
            ParamValue::Bool(value) => Value::Bool(*value),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

macro_rules! int_param {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for ParamValue {
                fn from(value: $ty) -> Self {
                    ParamValue::Int(i64::from(value))
                }
            }
        )*
    };
}

int_param!(i8, i16, i32, i64, u8, u16, u32);

/// Flat parameter record for a cached query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams {
    values: BTreeMap<String, ParamValue>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Add the parameter only when present; absent values are omitted.
    pub fn with_opt<V: Into<ParamValue>>(self, name: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(value) => self.with(name, value),
            None => self,
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn canonical(&self) -> String {
        let members: Vec<String> = self
            .values
            .iter()
            .map(|(name, value)| format!("{}:{}", Value::String(name.clone()), value.to_json()))
            .collect();
        format!("{{{}}}", members.join(","))
    }
}

/// Deterministic cache key shared by the write and invalidation paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Build a key from a query name and its parameters.
    pub fn build(name: &str, params: &QueryParams) -> Self {
        Self(format!("{name}:{}", params.canonical()))
    }

    pub fn for_query(kind: QueryKind, params: &QueryParams) -> Self {
        Self::build(kind.as_str(), params)
    }

    /// Wrap a key read back from storage.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the query this key was derived from.
    pub fn query_name(&self) -> &str {
        self.0.split_once(':').map_or(self.0.as_str(), |(name, _)| name)
    }

    pub fn belongs_to(&self, kind: QueryKind) -> bool {
        self.query_name() == kind.as_str()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
