use crate::property::PropertyDef;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

///
/// NodeDef
///
/// Definition of one node type. `unique_index` entries are property
/// names, or chain references denoting a derived redundancy column;
/// together they determine the content fingerprint.
///

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct NodeDef {
    pub name: String,
    pub title: String,

    pub props: BTreeMap<String, PropertyDef>,

    /// Properties shown when naming an instance in messages.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub display: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unique_index: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<String>,
}

impl NodeDef {
    #[must_use]
    pub fn new(name: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            props: BTreeMap::new(),
            display: Vec::new(),
            unique_index: Vec::new(),
            indexes: Vec::new(),
        }
    }

    #[must_use]
    pub fn prop(mut self, ident: impl Into<String>, def: PropertyDef) -> Self {
        self.props.insert(ident.into(), def);
        self
    }

    #[must_use]
    pub fn unique(mut self, entry: impl Into<String>) -> Self {
        self.unique_index.push(entry.into());
        self
    }

    #[must_use]
    pub fn display_prop(mut self, ident: impl Into<String>) -> Self {
        self.display.push(ident.into());
        self
    }

    #[must_use]
    pub fn get(&self, ident: &str) -> Option<&PropertyDef> {
        self.props.get(ident)
    }

    #[must_use]
    pub fn has_unique_index(&self) -> bool {
        !self.unique_index.is_empty()
    }
}
