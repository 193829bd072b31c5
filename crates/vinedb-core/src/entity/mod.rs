mod dataset;

pub use dataset::DataSet;

use crate::{TRANSIENT_MARKER, hash};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};
use ulid::Ulid;
use vinedb_schema::node::NodeDef;
use vinedb_schema::types::Value;

///
/// Operate
///
/// Pending operation verb. Events accept only Create/Update/Delete;
/// the executor rejects the rest for them.
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Operate {
    Create,
    Update,
    Delete,
    Query,
    Match,
    CreateOrUpdate,
}

impl Operate {
    #[must_use]
    pub const fn valid_for_event(self) -> bool {
        matches!(self, Self::Create | Self::Update | Self::Delete)
    }
}

impl fmt::Display for Operate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Query => "query",
            Self::Match => "match",
            Self::CreateOrUpdate => "createOrUpdate",
        };
        write!(f, "{label}")
    }
}

///
/// SyncLock
///
/// Optimistic-concurrency gate for updates: the row is only written
/// when `property` still holds `value`.
///

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SyncLock {
    pub property: String,
    pub value: Value,
}

///
/// NodeEntity
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct NodeEntity {
    pub sd: String,
    pub id: String,
    pub uuid: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_time: Option<i64>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub props: BTreeMap<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operate: Option<Operate>,

    /// Force-delete marker; propagated to cascaded counterparts.
    #[serde(default)]
    pub enforce: bool,

    /// Caller supplied the id; do not replace it on create.
    #[serde(default)]
    pub original_id: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_lock: Option<SyncLock>,
}

impl NodeEntity {
    #[must_use]
    pub fn new(sd: impl Into<String>) -> Self {
        Self {
            sd: sd.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn prop(mut self, ident: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.insert(ident.into(), value.into());
        self
    }

    #[must_use]
    pub fn operate(mut self, verb: Operate) -> Self {
        self.operate = Some(verb);
        self
    }

    #[must_use]
    pub fn get(&self, ident: &str) -> Option<&Value> {
        self.props.get(ident)
    }

    /// Populated, non-transient property idents.
    pub fn populated(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.props
            .iter()
            .filter(|(k, v)| !is_transient(k) && !v.is_null())
    }

    /// Drop every transient (`$`-prefixed) property. Done after
    /// persistence so the caller-visible entity is clean.
    pub fn strip_transients(&mut self) {
        self.props.retain(|k, _| !is_transient(k));
    }

    /// Recompute the content fingerprint. Defs with a unique-index set
    /// hash the ordered unique values, so equal unique content yields
    /// an equal uuid; defs without one get a random, time-ordered id.
    pub fn regenerate_uuid(&mut self, def: &NodeDef) {
        self.uuid = if def.has_unique_index() {
            let mut input = self.sd.clone();
            for entry in &def.unique_index {
                input.push('\u{1f}');
                let key = vinedb_schema::property::ChainRef::parse(entry)
                    .map_or_else(|| entry.clone(), |r| r.redundancy_property());
                if let Some(value) = self.props.get(&key) {
                    input.push_str(&value.canonical());
                }
            }
            hash::hex32(&input)
        } else {
            let millis = crate::convert::now_millis().max(0) as u64;
            let entropy = u128::from(xxhash_rust::xxh3::xxh3_64(
                format!("{}\u{1f}{}", self.sd, self.id).as_bytes(),
            ));
            Ulid::from_parts(millis, entropy).to_string()
        };
    }

    /// Display-property values for messages, falling back to the id.
    #[must_use]
    pub fn display(&self, def: &NodeDef) -> String {
        let shown: Vec<String> = def
            .display
            .iter()
            .filter_map(|p| self.props.get(p))
            .map(ToString::to_string)
            .collect();
        if shown.is_empty() {
            self.id.clone()
        } else {
            shown.join(" ")
        }
    }
}

///
/// EventEntity
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventEntity {
    pub sd: String,
    pub id: String,
    pub uuid: String,

    pub left_id: String,
    pub left_sd: String,
    pub right_id: String,
    pub right_sd: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_time: Option<i64>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub props: BTreeMap<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operate: Option<Operate>,

    #[serde(default)]
    pub enforce: bool,
}

impl EventEntity {
    #[must_use]
    pub fn new(
        sd: impl Into<String>,
        left: (impl Into<String>, impl Into<String>),
        right: (impl Into<String>, impl Into<String>),
    ) -> Self {
        Self {
            sd: sd.into(),
            left_sd: left.0.into(),
            left_id: left.1.into(),
            right_sd: right.0.into(),
            right_id: right.1.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn operate(mut self, verb: Operate) -> Self {
        self.operate = Some(verb);
        self
    }

    #[must_use]
    pub fn get(&self, ident: &str) -> Option<&Value> {
        self.props.get(ident)
    }

    /// Dispatch key of the defining event type.
    #[must_use]
    pub fn def_key(&self) -> (String, String, String) {
        (self.sd.clone(), self.left_sd.clone(), self.right_sd.clone())
    }

    #[must_use]
    pub fn touches(&self, node_id: &str) -> bool {
        self.left_id == node_id || self.right_id == node_id
    }

    pub fn strip_transients(&mut self) {
        self.props.retain(|k, _| !is_transient(k));
    }
}

/// Transient properties travel with the entity but are never persisted.
#[must_use]
pub fn is_transient(ident: &str) -> bool {
    ident.starts_with(TRANSIENT_MARKER)
}
