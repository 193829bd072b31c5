pub mod backend;
pub mod convert;
pub mod entity;
pub mod error;
pub mod hash;
pub mod id;
pub mod query;
pub mod save;
pub mod schema;
pub mod store;
pub mod validate;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::Error;

//
// Consts
//

/// Default column length for bounded strings.
pub const DEFAULT_STRING_LENGTH: i64 = 50;

/// Strings bounded at or above this length (or unbounded) become
/// large-object text columns.
pub const LARGE_STRING_LENGTH: i64 = 4000;

/// Shared sequence names. Row identity comes from the allocator; the
/// sequences exist for provisioning parity only.
pub const SEQ_NODE: &str = "SEQ_NODE";
pub const SEQ_EVENT: &str = "SEQ_EVENT";

/// Transient property marker; such properties are never persisted.
pub const TRANSIENT_MARKER: char = '$';

///
/// Prelude
///

pub mod prelude {
    pub use crate::{
        backend::{BinaryStreamProvider, DdlTemplater, FileRef, Row, SqlExecutor},
        convert::RdbConvert,
        entity::{DataSet, EventEntity, NodeEntity, Operate},
        error::Error,
        id::{AreaProvider, IdAllocator},
        query::{
            Comparator, LabelParam, MainSpec, Page, QueryCompiler, QueryRequest, QueryResult,
        },
        save::{ChangeListener, SaveExecutor, SaveOptions, SaveResult},
        schema::{NameStrategy, NamingConfig, PrefixNaming, RdbMapping, SchemaCompiler},
        store::GraphStore,
        validate::Validator,
    };
    pub use vinedb_schema::prelude::*;
}
