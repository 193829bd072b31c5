pub mod event;
pub mod node;
pub mod property;
pub mod registry;
pub mod types;

/// Definition names starting with this marker belong to the internal
/// namespace and are excluded from relational schema generation.
pub const SYSTEM_NAMESPACE_MARKER: char = '$';

/// Attribute idents carry this prefix to keep them apart from
/// user-declared properties.
pub const ATTR_MARKER: &str = "__";

use thiserror::Error as ThisError;

///
/// Prelude
///

pub mod prelude {
    pub use crate::{
        event::EventDef,
        node::NodeDef,
        property::{ChainRef, DefaultValue, PropertyDef, RuleGroup, ValidRule},
        registry::Registry,
        types::{BaseType, RequiredPolicy, Value},
    };
    pub use serde::{Deserialize, Serialize};
}

/// True when a definition name lives in the internal namespace.
#[must_use]
pub fn is_system(name: &str) -> bool {
    name.starts_with(SYSTEM_NAMESPACE_MARKER)
}

///
/// DefinitionError
///
/// Raised while building a [`registry::Registry`] snapshot from raw
/// definitions. Nothing downstream runs against a registry that failed
/// to build.
///

#[derive(Debug, ThisError)]
pub enum DefinitionError {
    #[error("duplicate node definition: {name}")]
    DuplicateNode { name: String },

    #[error("duplicate event definition: {name} ({left} -> {right})")]
    DuplicateEvent {
        name: String,
        left: String,
        right: String,
    },

    #[error("event {event} references undefined node type: {node}")]
    UndefinedEndpoint { event: String, node: String },

    #[error("{def} declares unknown property in index set: {property}")]
    UnknownIndexProperty { def: String, property: String },

    #[error("{def}.{property}: lower bound type does not match {base}")]
    BoundTypeMismatch {
        def: String,
        property: String,
        base: String,
    },
}
