//! Data models for the aggregator.
//!
//! This module contains the source configuration stored in the registry,
//! the per-call request context, and the payload shapes exchanged with
//! sources and returned to callers.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::error::FetchError;

/// Query parameters, keyed by name.
pub type Params = BTreeMap<String, String>;

/// A static query parameter value stored with a source.
///
/// Written as a JSON string or a JSON array of strings. Numbers and
/// booleans are accepted on read and kept in their textual form; `null`
/// reads as an empty string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Scalar(String),
    List(Vec<String>),
}

impl<'de> Deserialize<'de> for ParamValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::Array(items) => items
                .into_iter()
                .map(scalar_text)
                .collect::<Option<Vec<_>>>()
                .map(ParamValue::List)
                .ok_or_else(|| {
                    D::Error::custom("list elements must be strings, numbers or booleans")
                }),
            other => scalar_text(other)
                .map(ParamValue::Scalar)
                .ok_or_else(|| D::Error::custom("expected a string, number, boolean or list")),
        }
    }
}

fn scalar_text(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some(String::new()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

impl ParamValue {
    /// Render the value for an outgoing query string.
    ///
    /// List elements are joined with `,`.
    pub fn to_query_value(&self) -> String {
        match self {
            ParamValue::Scalar(value) => value.clone(),
            ParamValue::List(values) => values.join(","),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_query_value())
    }
}

/// Configuration of one registered source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Absolute http/https URL without a query component.
    pub url: String,

    /// Static parameters sent on every request.
    #[serde(default)]
    pub querystring: Option<BTreeMap<String, ParamValue>>,

    /// Inbound parameter name -> outgoing parameter name.
    #[serde(default)]
    pub request_params: Option<BTreeMap<String, String>>,
}

impl SourceConfig {
    /// Create a config with no static parameters and no remapping.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            querystring: None,
            request_params: None,
        }
    }
}

#[cfg(test)]
impl SourceConfig {
    pub fn with_static_param(mut self, key: impl Into<String>, value: ParamValue) -> Self {
        self.querystring
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value);
        self
    }

    pub fn with_remap(mut self, inbound: impl Into<String>, outgoing: impl Into<String>) -> Self {
        self.request_params
            .get_or_insert_with(BTreeMap::new)
            .insert(inbound.into(), outgoing.into());
        self
    }
}

/// Inbound parameters plus caller identity for one aggregation call.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub params: Params,
    pub caller: String,
}

impl RequestContext {
    pub fn new(params: Params, caller: impl Into<String>) -> Self {
        Self {
            params,
            caller: caller.into(),
        }
    }
}

/// A single overlay tag returned by a source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub icon: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_color: Option<u32>,
}

#[cfg(test)]
impl Tag {
    /// A tag carrying only an icon.
    pub fn icon(icon: impl Into<String>) -> Self {
        Self {
            icon: icon.into(),
            color: None,
            tooltip: None,
            text: None,
            text_color: None,
        }
    }
}

/// A numeric score returned by a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

#[cfg(test)]
impl Score {
    pub fn new(value: f64) -> Self {
        Self { value, mode: None }
    }
}

/// Decoded body of a successful source response. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(default)]
    pub tags: Option<Vec<Tag>>,
    #[serde(default)]
    pub score: Option<Score>,
}

/// Merged answer of every successful source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompositeResult {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<Score>,
}

#[cfg(test)]
impl CompositeResult {
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.score.is_none()
    }
}

/// Normalized result of fetching one source.
#[derive(Debug)]
pub enum FetchOutcome {
    Success {
        source: String,
        elapsed: Duration,
        payload: Payload,
    },
    Failure {
        source: String,
        cause: FetchError,
    },
}

impl FetchOutcome {
    #[cfg(test)]
    pub fn source(&self) -> &str {
        match self {
            FetchOutcome::Success { source, .. } | FetchOutcome::Failure { source, .. } => source,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Success { .. })
    }
}
