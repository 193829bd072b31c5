use crate::error::QueryError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use vinedb_schema::types::Value;

///
/// Comparator
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Comparator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
}

///
/// Param
///
/// One column-level filter condition, already translated from the
/// caller's property name.
///

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Param {
    pub column: String,
    pub cmp: Comparator,
    pub value: Value,
}

///
/// AliasMap
///
/// Column-alias <-> column-name mapping for one fragment. Two
/// synchronized one-directional maps; inserts are checked so the
/// mapping is guaranteed invertible.
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct AliasMap {
    by_alias: BTreeMap<String, String>,
    by_column: BTreeMap<String, String>,
}

impl AliasMap {
    pub fn insert(&mut self, alias: impl Into<String>, column: impl Into<String>) -> Result<(), QueryError> {
        let alias = alias.into();
        let column = column.into();
        if self.by_column.contains_key(&column) {
            return Err(QueryError::AliasNotInjective { column });
        }
        self.by_column.insert(column.clone(), alias.clone());
        self.by_alias.insert(alias, column);
        Ok(())
    }

    #[must_use]
    pub fn column(&self, alias: &str) -> Option<&str> {
        self.by_alias.get(alias).map(String::as_str)
    }

    #[must_use]
    pub fn alias(&self, column: &str) -> Option<&str> {
        self.by_column.get(column).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.by_alias.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_alias.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_alias.is_empty()
    }
}

///
/// Join
///
/// Inner join of this fragment onto an earlier fragment in the plan.
/// `on` pairs are (own column, target column).
///

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Join {
    pub target_alias: String,
    pub on: Vec<(String, String)>,
}

///
/// ExistsFilter
///
/// A gating condition on a parent fragment expressed via matching rows
/// in a child table, without projecting the child's columns. Children
/// nest, mirroring the chain the filter was compiled from.
///

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ExistsFilter {
    pub table: String,
    pub alias: String,
    /// (own column, outer alias, outer column)
    pub on: Vec<(String, String, String)>,
    pub params: Vec<Param>,
    pub children: Vec<ExistsFilter>,
}

///
/// FragmentKind
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum FragmentKind {
    Node,
    Event { left: String, right: String },
}

///
/// Fragment
///
/// One table's contribution to a compiled plan: alias, projected
/// columns, join wiring, filter params, and exists subtrees.
///

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Fragment {
    pub label: String,
    pub sd: String,
    pub kind: FragmentKind,

    pub table: String,
    pub alias: String,
    pub columns: AliasMap,
    /// Whether the caller asked for this fragment's rows back. An
    /// unprojected fragment still joins and filters but only its id
    /// travels in the result rows.
    pub projected: bool,

    /// Synthetic aliases used solely for join wiring and row identity.
    pub id_alias: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left_alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right_alias: Option<String>,

    pub params: Vec<Param>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join: Option<Join>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exists: Vec<ExistsFilter>,
}

///
/// Order / Page
///

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Order {
    /// Caller-visible property the order was requested on.
    pub property: String,
    pub column: String,
    /// Column alias the order key is rewritten back to.
    pub alias: String,
    pub desc: bool,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct Page {
    pub number: u64,
    pub size: u64,
}

///
/// QueryPlan
///
/// Complete compiled plan, handed as data (never text) to the SQL
/// execution collaborator.
///

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct QueryPlan {
    pub fragments: Vec<Fragment>,
    /// Index of the main fragment.
    pub main: usize,
    pub only_main: bool,
    pub orders: Vec<Order>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<Page>,
    /// Row-lock variant for read-then-write callers.
    pub lock: bool,
}

impl QueryPlan {
    /// Count plan: the main fragment with its params and exists
    /// filters, joins dropped.
    #[must_use]
    pub fn count_plan(&self) -> Self {
        let mut main = self.fragments[self.main].clone();
        main.join = None;
        Self {
            fragments: vec![main],
            main: 0,
            only_main: true,
            orders: Vec::new(),
            page: None,
            lock: false,
        }
    }

    #[must_use]
    pub fn main_fragment(&self) -> &Fragment {
        &self.fragments[self.main]
    }
}
