//! Thing and property description types.

use crate::config::AddressConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Description of one property of a thing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PropertyDescription {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    /// Type, unit, title and any other property metadata.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Externally-visible description of a thing.
///
/// Only `id`, `href` and the property `href`s are interpreted; actions,
/// events, titles and other metadata round-trip through `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ThingDescription {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, PropertyDescription>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ThingDescription {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Add a property with no metadata.
    pub fn with_property(mut self, name: impl Into<String>) -> Self {
        self.properties
            .insert(name.into(), PropertyDescription::default());
        self
    }

    /// Set a top-level metadata field such as `title` or `@type`.
    pub fn with_field(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Rewrite the thing `href` and every property `href` from `addresses`.
    pub fn annotate(&mut self, addresses: &AddressConfig) {
        self.href = Some(addresses.thing_href(&self.id));
        for (name, property) in self.properties.iter_mut() {
            property.href = Some(addresses.property_href(&self.id, name));
        }
    }

    /// Annotated copy, leaving `self` untouched.
    pub fn annotated(&self, addresses: &AddressConfig) -> Self {
        let mut copy = self.clone();
        copy.annotate(addresses);
        copy
    }
}
