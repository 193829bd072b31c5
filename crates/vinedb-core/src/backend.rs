use crate::{
    error::BackendError,
    query::fragment::{Fragment, QueryPlan},
    schema::table::Table,
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, io::Read};
use vinedb_schema::types::Value;

/// A result row: column alias -> value, exactly as projected by the
/// plan's fragments.
pub type Row = BTreeMap<String, Value>;

///
/// FileRef
///
/// One entry of the per-call file array. Binary property values index
/// into this array; the stream itself is opened lazily by the storage
/// side.
///

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct FileRef {
    pub name: String,
    pub path: String,
    pub size: u64,
}

///
/// ColumnValue
///
/// One assembled parameter value: a plain value, or a stream reference
/// substituted for a binary payload.
///

#[derive(Clone, Debug, Deserialize, Serialize)]
pub enum ColumnValue {
    Value(Value),
    Stream(FileRef),
}

///
/// InsertParam / UpdateParam
///

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct InsertParam {
    pub table: String,
    pub seq: String,
    pub values: Vec<(String, ColumnValue)>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct UpdateParam {
    pub table: String,
    pub id_column: String,
    pub id: String,
    pub values: Vec<(String, ColumnValue)>,
    /// Optimistic-concurrency gate: only write while this column still
    /// holds this value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock: Option<(String, Value)>,
}

///
/// SqlExecutor
///
/// The SQL execution collaborator. Receives plans and parameters as
/// data, never text, and runs inside the caller's open transaction.
///

pub trait SqlExecutor {
    fn insert(&mut self, param: &InsertParam) -> Result<u64, BackendError>;

    fn update(&mut self, param: &UpdateParam) -> Result<u64, BackendError>;

    /// Delete rows matching every (column, value) pair.
    fn delete(&mut self, table: &str, matches: &[(String, Value)]) -> Result<u64, BackendError>;

    fn delete_all(&mut self, table: &str) -> Result<u64, BackendError>;

    fn query(&mut self, plan: &QueryPlan) -> Result<Vec<Row>, BackendError>;

    /// Row count over a single-fragment plan (params and exists
    /// filters included, joins excluded).
    fn count(&mut self, fragment: &Fragment) -> Result<u64, BackendError>;

    /// Read one large-object column of one row.
    fn read_blob(
        &mut self,
        table: &str,
        column: &str,
        id_column: &str,
        id: &str,
    ) -> Result<Option<Vec<u8>>, BackendError>;
}

///
/// DdlTemplater
///
/// Dialect DDL rendering; provisioning path only, never on the data
/// path.
///

pub trait DdlTemplater {
    fn render(&self, tables: &[Table], emit_sequences: bool) -> Result<String, BackendError>;
}

///
/// BinaryStreamProvider
///
/// Opens the content stream behind a file reference during
/// insert/update parameter binding.
///

pub trait BinaryStreamProvider {
    fn open(&mut self, file: &FileRef) -> Result<(Box<dyn Read>, u64), BackendError>;
}
