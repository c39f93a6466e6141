//! Environment documents returned by the config server.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// The deserialized response for `{name}/{profile}[/{label}]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEnvironment {
    /// Application name the server resolved.
    #[serde(default)]
    pub name: String,

    /// Active profiles, in order.
    #[serde(default)]
    pub profiles: Vec<String>,

    /// Resolved label.
    #[serde(default)]
    pub label: Option<String>,

    /// Opaque version, typically a commit id.
    #[serde(default)]
    pub version: Option<String>,

    /// Opaque backend state.
    #[serde(default)]
    pub state: Option<String>,

    /// Property sources; earlier entries take precedence.
    #[serde(default)]
    pub property_sources: Vec<PropertySource>,
}

/// A named bag of flat key/value pairs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertySource {
    /// Provenance of the values (e.g. a file in a git repository).
    pub name: String,

    /// Flat keys to scalar values. Numbers and booleans are kept as text.
    #[serde(default, deserialize_with = "deserialize_scalars")]
    pub source: BTreeMap<String, String>,
}

impl RemoteEnvironment {
    /// Parses a response body.
    pub fn from_json(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }

    /// Names of the property sources, in precedence order.
    pub fn source_names(&self) -> Vec<String> {
        self.property_sources.iter().map(|s| s.name.clone()).collect()
    }
}

fn deserialize_scalars<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, serde_json::Value>> = Option::deserialize(deserializer)?;

    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(key, value)| {
            let text = match value {
                serde_json::Value::String(s) => s,
                serde_json::Value::Null => String::new(),
                other => other.to_string(),
            };
            (key, text)
        })
        .collect())
}
