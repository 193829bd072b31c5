use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

///
/// MappedTable
///
/// Runtime field<->column lookup for one table. The two directions are
/// kept as synchronized maps; inserts go through `insert` so the
/// mapping stays invertible.
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct MappedTable {
    pub table: String,
    pub seq: String,
    columns: BTreeMap<String, String>,
    fields: BTreeMap<String, String>,
}

impl MappedTable {
    #[must_use]
    pub fn new(table: impl Into<String>, seq: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            seq: seq.into(),
            columns: BTreeMap::new(),
            fields: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, field: impl Into<String>, column: impl Into<String>) {
        let field = field.into();
        let column = column.into();
        self.columns.insert(field.clone(), column.clone());
        self.fields.insert(column, field);
    }

    #[must_use]
    pub fn column(&self, field: &str) -> Option<&str> {
        self.columns.get(field).map(String::as_str)
    }

    #[must_use]
    pub fn field(&self, column: &str) -> Option<&str> {
        self.fields.get(column).map(String::as_str)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &String)> {
        self.columns.iter()
    }
}

///
/// RdbMapping
///
/// Reverse lookup from type definitions to their tables:
/// `nodeType -> table`, `(eventType, left, right) -> table`.
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct RdbMapping {
    nodes: BTreeMap<String, MappedTable>,
    events: BTreeMap<(String, String, String), MappedTable>,
}

impl RdbMapping {
    pub fn insert_node(&mut self, node: impl Into<String>, mapped: MappedTable) {
        self.nodes.insert(node.into(), mapped);
    }

    pub fn insert_event(&mut self, key: (String, String, String), mapped: MappedTable) {
        self.events.insert(key, mapped);
    }

    #[must_use]
    pub fn node_table(&self, node: &str) -> Option<&MappedTable> {
        self.nodes.get(node)
    }

    #[must_use]
    pub fn event_table(&self, name: &str, left: &str, right: &str) -> Option<&MappedTable> {
        self.events
            .get(&(name.to_string(), left.to_string(), right.to_string()))
    }
}
