//! Flattened attribute maps and layered, most-specific-wins lookup.
//!
//! Nested YAML mappings become dotted keys (`python.user`). A resource's
//! attributes are resolved once, at load time, from an ordered list of
//! layers: resource, then recipe, then role defaults.

use super::types::yaml_value_to_string;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Resolved `key -> value` attributes handed to the executor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(IndexMap<String, String>);

impl Attributes {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: &str, value: &str) {
        self.0.insert(key.to_string(), value.to_string());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Entries below `prefix.` with the prefix stripped (e.g. `environment.`).
    pub fn with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = (&'a str, &'a str)> {
        self.iter().filter_map(move |(k, v)| {
            k.strip_prefix(prefix)
                .and_then(|rest| rest.strip_prefix('.'))
                .map(|rest| (rest, v))
        })
    }
}

impl FromIterator<(String, String)> for Attributes {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Flatten raw YAML attributes into dotted keys.
pub fn flatten(raw: &IndexMap<String, serde_yaml_ng::Value>) -> Attributes {
    let mut out = IndexMap::new();
    for (key, value) in raw {
        flatten_into(key, value, &mut out);
    }
    Attributes(out)
}

fn flatten_into(prefix: &str, value: &serde_yaml_ng::Value, out: &mut IndexMap<String, String>) {
    match value {
        serde_yaml_ng::Value::Mapping(map) => {
            for (k, v) in map {
                let key = format!("{}.{}", prefix, yaml_value_to_string(k));
                flatten_into(&key, v, out);
            }
        }
        other => {
            out.insert(prefix.to_string(), yaml_value_to_string(other));
        }
    }
}

/// Ordered attribute layers, most specific first.
#[derive(Debug, Clone, Default)]
pub struct AttributeLayers {
    layers: Vec<Attributes>,
}

impl AttributeLayers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a layer less specific than every layer already present.
    pub fn push_fallback(&mut self, layer: Attributes) {
        self.layers.push(layer);
    }

    /// Add a layer more specific than every layer already present.
    pub fn push_override(&mut self, layer: Attributes) {
        self.layers.insert(0, layer);
    }

    /// First match, searching from the most specific layer.
    pub fn lookup(&self, key: &str) -> Option<&str> {
        self.layers.iter().find_map(|layer| layer.get(key))
    }

    /// Collapse into one attribute set. Keys keep the order in which the
    /// least specific layer introduced them.
    pub fn merged(&self) -> Attributes {
        let mut out: IndexMap<String, String> = IndexMap::new();
        for layer in self.layers.iter().rev() {
            for (k, v) in layer.iter() {
                out.insert(k.to_string(), v.to_string());
            }
        }
        Attributes(out)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}
