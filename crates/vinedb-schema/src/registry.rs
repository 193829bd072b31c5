use crate::{
    DefinitionError, event::EventDef, is_system, node::NodeDef, property::ChainRef,
    property::PropertyDef, types::BaseType,
};
use std::collections::BTreeMap;

/// Builtin node attribute idents, in column order.
pub const NODE_ATTRS: [&str; 5] = ["__id", "__uuid", "__sd", "__createTime", "__updateTime"];

/// Extra builtin attribute idents present on every event.
pub const EVENT_ATTRS: [&str; 4] = ["__left", "__leftSd", "__right", "__rightSd"];

///
/// Registry
///
/// Immutable type-definition snapshot. Built once, validated once, and
/// injected by reference into every component; no global lookups.
///

#[derive(Clone, Debug)]
pub struct Registry {
    nodes: BTreeMap<String, NodeDef>,
    events: BTreeMap<(String, String, String), EventDef>,
    node_attrs: BTreeMap<String, PropertyDef>,
    event_attrs: BTreeMap<String, PropertyDef>,
}

impl Registry {
    pub fn new(nodes: Vec<NodeDef>, events: Vec<EventDef>) -> Result<Self, DefinitionError> {
        let mut node_map = BTreeMap::new();
        for node in nodes {
            let name = node.name.clone();
            if node_map.insert(name.clone(), node).is_some() {
                return Err(DefinitionError::DuplicateNode { name });
            }
        }

        let mut event_map = BTreeMap::new();
        for event in events {
            for endpoint in [&event.left, &event.right] {
                if !is_system(endpoint) && !node_map.contains_key(endpoint) {
                    return Err(DefinitionError::UndefinedEndpoint {
                        event: event.name.clone(),
                        node: endpoint.clone(),
                    });
                }
            }
            let key = event.key();
            if event_map.insert(key.clone(), event).is_some() {
                let (name, left, right) = key;
                return Err(DefinitionError::DuplicateEvent { name, left, right });
            }
        }

        let registry = Self {
            nodes: node_map,
            events: event_map,
            node_attrs: builtin_node_attrs(),
            event_attrs: builtin_event_attrs(),
        };
        registry.check_index_sets()?;

        Ok(registry)
    }

    // Index sets may only name declared properties, except for chain
    // references, which are resolved at save time.
    fn check_index_sets(&self) -> Result<(), DefinitionError> {
        for node in self.nodes.values() {
            for entry in node.unique_index.iter().chain(node.indexes.iter()) {
                if ChainRef::parse(entry).is_some() {
                    continue;
                }
                if !node.props.contains_key(entry) && !self.node_attrs.contains_key(entry) {
                    return Err(DefinitionError::UnknownIndexProperty {
                        def: node.name.clone(),
                        property: entry.clone(),
                    });
                }
            }
        }
        for event in self.events.values() {
            for entry in &event.indexes {
                if !event.props.contains_key(entry) && !self.event_attrs.contains_key(entry) {
                    return Err(DefinitionError::UnknownIndexProperty {
                        def: event.name.clone(),
                        property: entry.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn node(&self, name: &str) -> Option<&NodeDef> {
        self.nodes.get(name)
    }

    #[must_use]
    pub fn event(&self, name: &str, left: &str, right: &str) -> Option<&EventDef> {
        self.events
            .get(&(name.to_string(), left.to_string(), right.to_string()))
    }

    /// Every overload of an event name, regardless of endpoint pair.
    pub fn events_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a EventDef> {
        self.events.values().filter(move |e| e.name == name)
    }

    /// Every event definition with `node` on either endpoint.
    pub fn events_touching<'a>(&'a self, node: &'a str) -> impl Iterator<Item = &'a EventDef> {
        self.events.values().filter(move |e| e.touches(node))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeDef> {
        self.nodes.values()
    }

    pub fn events(&self) -> impl Iterator<Item = &EventDef> {
        self.events.values()
    }

    #[must_use]
    pub const fn node_attrs(&self) -> &BTreeMap<String, PropertyDef> {
        &self.node_attrs
    }

    #[must_use]
    pub const fn event_attrs(&self) -> &BTreeMap<String, PropertyDef> {
        &self.event_attrs
    }

    /// Builtin attribute definition shared by every node and event.
    #[must_use]
    pub fn attr(&self, ident: &str) -> Option<&PropertyDef> {
        self.event_attrs
            .get(ident)
            .or_else(|| self.node_attrs.get(ident))
    }
}

fn builtin_node_attrs() -> BTreeMap<String, PropertyDef> {
    let mut attrs = BTreeMap::new();
    attrs.insert(
        "__id".to_string(),
        PropertyDef::new("id", BaseType::String).required().upper(50),
    );
    attrs.insert(
        "__uuid".to_string(),
        PropertyDef::new("uuid", BaseType::String).required().upper(64),
    );
    attrs.insert(
        "__sd".to_string(),
        PropertyDef::new("sd", BaseType::String).required().upper(100),
    );
    attrs.insert(
        "__createTime".to_string(),
        PropertyDef::new("create time", BaseType::Datetime).required(),
    );
    attrs.insert(
        "__updateTime".to_string(),
        PropertyDef::new("update time", BaseType::Datetime).required(),
    );
    attrs
}

fn builtin_event_attrs() -> BTreeMap<String, PropertyDef> {
    let mut attrs = builtin_node_attrs();
    attrs.insert(
        "__left".to_string(),
        PropertyDef::new("left id", BaseType::String).required().upper(50),
    );
    attrs.insert(
        "__leftSd".to_string(),
        PropertyDef::new("left sd", BaseType::String).required().upper(100),
    );
    attrs.insert(
        "__right".to_string(),
        PropertyDef::new("right id", BaseType::String).required().upper(50),
    );
    attrs.insert(
        "__rightSd".to_string(),
        PropertyDef::new("right sd", BaseType::String).required().upper(100),
    );
    attrs
}
