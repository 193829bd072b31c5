use serde::{Deserialize, Serialize};

///
/// ColumnType
///
/// Native column kinds the DDL templater understands. Dialect spelling
/// belongs to the templater, not here.
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ColumnType {
    VarChar,
    Number,
    Float,
    Boolean,
    Datetime,
    Clob,
    Blob,
}

///
/// Column
///

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Column {
    /// Source field: attribute ident, property ident, or redundancy
    /// property name.
    pub field: String,
    pub name: String,
    pub ty: ColumnType,

    pub key: bool,
    pub nullable: bool,
    pub unique: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<i64>,

    /// Hash-named index, present when the source property is indexed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_name: Option<String>,
}

impl Column {
    #[must_use]
    pub fn new(field: impl Into<String>, name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            field: field.into(),
            name: name.into(),
            ty,
            key: false,
            nullable: true,
            unique: false,
            length: None,
            index_name: None,
        }
    }
}

///
/// TableKind
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum TableKind {
    Node,
    Event,
}

///
/// Table
///
/// One derived table descriptor. `index_name` is the unique index over
/// the fingerprint column; per-column indexes live on the columns.
///

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Table {
    pub kind: TableKind,
    /// Source definition name (node name, or event dispatch key
    /// rendered as `name(left->right)`).
    pub source: String,
    pub comment: String,

    pub name: String,
    pub pk_name: String,
    pub seq_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_name: Option<String>,

    pub columns: Vec<Column>,
}

impl Table {
    #[must_use]
    pub fn column(&self, field: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.field == field)
    }
}
