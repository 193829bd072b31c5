use crate::{property::PropertyDef, types::RequiredPolicy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

///
/// EventDef
///
/// Definition of one directed relationship type. An event name may be
/// overloaded across endpoint pairs; the dispatch key is always
/// (name, left, right).
///

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct EventDef {
    pub name: String,
    pub title: String,

    pub left: String,
    pub right: String,

    #[serde(default)]
    pub required: RequiredPolicy,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub props: BTreeMap<String, PropertyDef>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<String>,
}

impl EventDef {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        title: impl Into<String>,
        left: impl Into<String>,
        right: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            left: left.into(),
            right: right.into(),
            required: RequiredPolicy::None,
            props: BTreeMap::new(),
            indexes: Vec::new(),
        }
    }

    #[must_use]
    pub const fn required(mut self, policy: RequiredPolicy) -> Self {
        self.required = policy;
        self
    }

    #[must_use]
    pub fn prop(mut self, ident: impl Into<String>, def: PropertyDef) -> Self {
        self.props.insert(ident.into(), def);
        self
    }

    #[must_use]
    pub fn get(&self, ident: &str) -> Option<&PropertyDef> {
        self.props.get(ident)
    }

    /// Dispatch key for lookup and mapping tables.
    #[must_use]
    pub fn key(&self) -> (String, String, String) {
        (self.name.clone(), self.left.clone(), self.right.clone())
    }

    /// True when `node` occupies one of this event's endpoints.
    #[must_use]
    pub fn touches(&self, node: &str) -> bool {
        self.left == node || self.right == node
    }
}
