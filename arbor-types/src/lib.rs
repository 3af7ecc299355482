//! Shared types for arbor
//!
//! This crate provides common types used across the arbor ecosystem:
//! view and component identifiers, the render-environment key parts
//! (locale, render-kit id, resource-library contracts), and the
//! `StateValue` model used by component property bags and saved state.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// View identifier (the logical page, e.g. `/staticPage.xhtml`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ViewId(pub String);

impl ViewId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Component identifier, unique among siblings
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentId(pub String);

impl ComponentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ComponentId {
    fn from(id: &str) -> Self {
        ComponentId(id.to_string())
    }
}

impl From<String> for ComponentId {
    fn from(id: String) -> Self {
        ComponentId(id)
    }
}

/// Resolved locale of a rendered view (e.g. `en`, `de_AT`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locale(pub String);

impl Locale {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Render-kit identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RenderKitId(pub String);

impl RenderKitId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Token distinguishing structurally different variants of the same
/// logical view id produced by conditional template inclusion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FaceletStateToken(pub String);

impl FaceletStateToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Key into a component's property bag
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PropertyKey(pub String);

impl PropertyKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PropertyKey {
    fn from(key: &str) -> Self {
        PropertyKey(key.to_string())
    }
}

/// A property value in a component's state bag.
///
/// This is the value model the delta state helper records and replays.
/// List and map values get dedicated delta operations so mutations can
/// be saved without copying the whole container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StateValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<StateValue>),
    Map(BTreeMap<String, StateValue>),
}

impl StateValue {
    /// Returns the list contents, if this value is a list.
    pub fn as_list(&self) -> Option<&Vec<StateValue>> {
        match self {
            StateValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the map contents, if this value is a map.
    pub fn as_map(&self) -> Option<&BTreeMap<String, StateValue>> {
        match self {
            StateValue::Map(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            StateValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for StateValue {
    fn from(v: bool) -> Self {
        StateValue::Bool(v)
    }
}

impl From<i64> for StateValue {
    fn from(v: i64) -> Self {
        StateValue::Int(v)
    }
}

impl From<&str> for StateValue {
    fn from(v: &str) -> Self {
        StateValue::Text(v.to_string())
    }
}

impl From<String> for StateValue {
    fn from(v: String) -> Self {
        StateValue::Text(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_id_roundtrip() {
        let id = ViewId::new("/staticPage.xhtml");
        assert_eq!(id.as_str(), "/staticPage.xhtml");
        assert_eq!(id.to_string(), "/staticPage.xhtml");
    }

    #[test]
    fn test_state_value_accessors() {
        let list = StateValue::List(vec![StateValue::from(1), StateValue::from(2)]);
        assert_eq!(list.as_list().map(|l| l.len()), Some(2));
        assert!(list.as_map().is_none());

        let text = StateValue::from("hello");
        assert_eq!(text.as_text(), Some("hello"));
    }

    #[test]
    fn test_state_value_serde() {
        let mut entries = BTreeMap::new();
        entries.insert("style".to_string(), StateValue::from("bold"));
        let value = StateValue::Map(entries);

        let json = serde_json::to_string(&value).unwrap();
        let back: StateValue = serde_json::from_str(&json).unwrap();
        assert_eq!(value, back);
    }
}
