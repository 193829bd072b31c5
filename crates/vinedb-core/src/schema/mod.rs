pub mod compiler;
pub mod mapping;
pub mod naming;
pub mod table;


pub use compiler::SchemaCompiler;
pub use mapping::{MappedTable, RdbMapping};
pub use naming::{NameStrategy, NamingConfig, PrefixNaming, camel_to_underline, shorten};
pub use table::{Column, ColumnType, Table, TableKind};
