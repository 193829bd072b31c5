use thiserror::Error as ThisError;
use vinedb_schema::DefinitionError;

///
/// Error
///
/// Top-level error for the runtime surface. Every failure propagates
/// synchronously; commit and rollback belong to the caller's
/// transaction, never to this crate.
///

#[derive(Debug, ThisError)]
pub enum Error {
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Convert(#[from] ConvertError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Save(#[from] SaveError),

    #[error(transparent)]
    Id(#[from] IdError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

///
/// SchemaError
///
/// Fatal at schema-compilation time; a failed compile produces no
/// descriptors at all.
///

#[derive(Debug, ThisError)]
pub enum SchemaError {
    #[error("identifier [{name}] is too long after abbreviation")]
    NameTooLong { name: String },

    #[error("{kind} name [{original}|{shortened}] repeats after abbreviation")]
    NameCollision {
        kind: &'static str,
        original: String,
        shortened: String,
    },

    #[error("undefined node type: {name}")]
    UndefinedNode { name: String },

    #[error("undefined event type: {name} ({left} -> {right})")]
    UndefinedEvent {
        name: String,
        left: String,
        right: String,
    },

    #[error("{def} has no column for property: {property}")]
    UnknownProperty { def: String, property: String },
}

///
/// QueryError
///
/// Fatal at chain-compilation time; no partial plan is ever returned.
///

#[derive(Debug, ThisError)]
pub enum QueryError {
    #[error("chain [{chain}] is malformed: {reason}")]
    BadChain { chain: String, reason: String },

    #[error("undefined type in chain: {name}")]
    UndefinedType { name: String },

    #[error("label {label} is ambiguous: bound to {first} and {second}")]
    AmbiguousLabel {
        label: String,
        first: String,
        second: String,
    },

    #[error("main label {label} does not appear in any chain")]
    MainLabelNotFound { label: String },

    #[error("label {label} has no property: {property}")]
    UnknownProperty { label: String, property: String },

    #[error("alias map is not invertible: column {column} already aliased")]
    AliasNotInjective { column: String },
}

///
/// ConvertError
///

#[derive(Debug, ThisError)]
pub enum ConvertError {
    #[error("{def}.{property}: expected {expected}, got {actual}")]
    TypeMismatch {
        def: String,
        property: String,
        expected: String,
        actual: String,
    },

    #[error("{def} has no column for field: {field}")]
    UnknownField { def: String, field: String },

    #[error("no mapping for type: {def}")]
    UnmappedType { def: String },

    #[error("binary property {property} references missing file index {index}")]
    MissingFile { property: String, index: u64 },

    #[error("cannot decode timestamp: {detail}")]
    Timestamp { detail: String },
}

///
/// ValidationError
///
/// Aborts the triggering operation, surfaced with definition and
/// property titles so callers can render it directly.
///

#[derive(Debug, ThisError)]
pub enum ValidationError {
    #[error("[{def}] {property} is required")]
    Required { def: String, property: String },

    #[error("[{def}] {property} is out of range: {detail}")]
    Range {
        def: String,
        property: String,
        detail: String,
    },

    #[error("[{def}] {property} expects {expected}, got {actual}")]
    Type {
        def: String,
        property: String,
        expected: String,
        actual: String,
    },

    #[error("[{def}] {property} failed validation: {}", messages.join("; "))]
    Rule {
        def: String,
        property: String,
        messages: Vec<String>,
    },

    #[error("[{def}] duplicate record: {display}")]
    Unique { def: String, display: String },

    #[error("[{def}] record not found: {id}")]
    Missing { def: String, id: String },

    #[error("invalid id: {id}")]
    BadId { id: String },

    #[error("uniqueness/existence probe failed: {detail}")]
    Probe { detail: String },

    #[error("undefined type: {name}")]
    UndefinedType { name: String },
}

///
/// SaveError
///
/// Batch-level orchestration failures. `Cascade` and `Unsatisfiable`
/// abort the whole batch before or mid-way with zero net effect once
/// the caller rolls back.
///

#[derive(Debug, ThisError)]
pub enum SaveError {
    #[error("delete would orphan required counterparts: {}", affected.join(", "))]
    Cascade { affected: Vec<String> },

    #[error("save batch is unsatisfiable: {waiting} of {attempted} entities made no progress")]
    Unsatisfiable { waiting: usize, attempted: usize },

    #[error("operation {verb} is not valid for {kind}")]
    UnsupportedVerb { verb: String, kind: &'static str },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Convert(#[from] ConvertError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Id(#[from] IdError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

// Save orchestration runs sub-queries through the top-level surface;
// their failures fold back into the batch error.
impl From<Error> for SaveError {
    fn from(err: Error) -> Self {
        match err {
            Error::Validation(e) => Self::Validation(e),
            Error::Convert(e) => Self::Convert(e),
            Error::Query(e) => Self::Query(e),
            Error::Id(e) => Self::Id(e),
            Error::Backend(e) => Self::Backend(e),
            Error::Save(e) => e,
            other => Self::Backend(BackendError::new(other.to_string())),
        }
    }
}

///
/// IdError
///

#[derive(Debug, ThisError)]
pub enum IdError {
    #[error("id area space exhausted at {area}")]
    AreaExhausted { area: u64 },

    #[error("area provider failed: {detail}")]
    Provider { detail: String },
}

///
/// BackendError
///
/// Surfaced by `SqlExecutor` implementations; the engine never
/// inspects the message, it only propagates it.
///

#[derive(Debug, ThisError)]
#[error("backend: {message}")]
pub struct BackendError {
    pub message: String,
}

impl BackendError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
