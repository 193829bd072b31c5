use super::{EventEntity, NodeEntity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

///
/// DataSet
///
/// The working batch: node and event entities keyed by logical id.
/// Identity rewrite is the one place the batch's internal consistency
/// is actively maintained — when a node's temporary id is replaced by
/// its persisted id, every event referencing the old id is rewritten
/// in lockstep.
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct DataSet {
    nodes: BTreeMap<String, NodeEntity>,
    events: BTreeMap<String, EventEntity>,
}

impl DataSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node under its current id, replacing any previous
    /// entry with the same id.
    pub fn put_node(&mut self, node: NodeEntity) {
        self.nodes.insert(node.id.clone(), node);
    }

    pub fn put_event(&mut self, event: EventEntity) {
        self.events.insert(event.id.clone(), event);
    }

    #[must_use]
    pub fn node(&self, id: &str) -> Option<&NodeEntity> {
        self.nodes.get(id)
    }

    #[must_use]
    pub fn event(&self, id: &str) -> Option<&EventEntity> {
        self.events.get(id)
    }

    pub fn remove_node(&mut self, id: &str) -> Option<NodeEntity> {
        self.nodes.remove(id)
    }

    pub fn remove_event(&mut self, id: &str) -> Option<EventEntity> {
        self.events.remove(id)
    }

    /// Replace a node's id and rewrite every event endpoint that
    /// referenced the old id.
    pub fn update_node_id(&mut self, old_id: &str, new_id: &str) {
        if old_id == new_id {
            return;
        }
        if let Some(mut node) = self.nodes.remove(old_id) {
            node.id = new_id.to_string();
            self.nodes.insert(new_id.to_string(), node);
        }
        for event in self.events.values_mut() {
            if event.left_id == old_id {
                event.left_id = new_id.to_string();
            }
            if event.right_id == old_id {
                event.right_id = new_id.to_string();
            }
        }
    }

    /// Every event touching the given node id.
    pub fn events_of<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a EventEntity> {
        self.events.values().filter(move |e| e.touches(node_id))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeEntity> {
        self.nodes.values()
    }

    pub fn events(&self) -> impl Iterator<Item = &EventEntity> {
        self.events.values()
    }

    pub fn node_ids(&self) -> Vec<String> {
        self.nodes.keys().cloned().collect()
    }

    pub fn event_ids(&self) -> Vec<String> {
        self.events.keys().cloned().collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.events.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len() + self.events.len()
    }
}
