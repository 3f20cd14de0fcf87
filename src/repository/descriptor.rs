use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Where a package version can be cloned from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub url: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Commit id
    pub reference: String,
}

impl Source {
    pub fn git(url: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind: "git".to_string(),
            reference: reference.into(),
        }
    }
}

/// Package metadata for one version.
///
/// Wraps the JSON object read from the repository. Field order and unknown
/// fields survive a decode/encode cycle; only `version` and `source` are
/// ever written by the mirror.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Descriptor(Map<String, Value>);

impl Descriptor {
    /// Parse a descriptor file. The document must be a JSON object.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(bytes).context("Failed to parse descriptor")?;
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => anyhow::bail!("descriptor is not a JSON object: {}", kind_of(&other)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Set a field, replacing any previous value in place
    pub fn set(&mut self, key: &str, value: Value) {
        self.0.insert(key.to_string(), value);
    }

    pub fn set_version(&mut self, version: &str) {
        self.set("version", Value::String(version.to_string()));
    }

    pub fn set_source(&mut self, source: &Source) {
        let mut map = Map::new();
        map.insert("url".to_string(), Value::String(source.url.clone()));
        map.insert("type".to_string(), Value::String(source.kind.clone()));
        map.insert("reference".to_string(), Value::String(source.reference.clone()));
        self.set("source", Value::Object(map));
    }

    /// The injected source, if present and well formed
    pub fn source(&self) -> Option<Source> {
        self.get("source")
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    pub fn version(&self) -> Option<&str> {
        self.get("version").and_then(Value::as_str)
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
