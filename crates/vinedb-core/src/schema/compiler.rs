use crate::{
    DEFAULT_STRING_LENGTH, LARGE_STRING_LENGTH, SEQ_EVENT, SEQ_NODE,
    error::SchemaError,
    hash,
    schema::{
        mapping::{MappedTable, RdbMapping},
        naming::NameStrategy,
        table::{Column, ColumnType, Table, TableKind},
    },
};
use vinedb_schema::{
    event::EventDef,
    is_system,
    node::NodeDef,
    property::{ChainRef, PropertyDef},
    registry::Registry,
    types::BaseType,
};

///
/// SchemaCompiler
///
/// Derives table descriptors and the runtime field<->column mapping
/// from the definition snapshot. Definitions in the internal namespace
/// are skipped. Compilation is deterministic: the same snapshot always
/// yields the same names.
///

pub struct SchemaCompiler<'a, S: NameStrategy> {
    registry: &'a Registry,
    naming: S,
}

impl<'a, S: NameStrategy> SchemaCompiler<'a, S> {
    pub const fn new(registry: &'a Registry, naming: S) -> Self {
        Self { registry, naming }
    }

    /// Full descriptor list, length-checked and collision-checked.
    pub fn compile(&self) -> Result<Vec<Table>, SchemaError> {
        let mut tables = Vec::new();

        for node in self.registry.nodes() {
            if is_system(&node.name) {
                continue;
            }
            tables.push(self.node_table(node));
        }
        for event in self.registry.events() {
            if is_system(&event.name) || is_system(&event.left) || is_system(&event.right) {
                continue;
            }
            tables.push(self.event_table(event));
        }

        self.naming.check_names(&mut tables)?;

        Ok(tables)
    }

    /// Runtime mapping only; DDL text is the templating collaborator's
    /// business and never touches the data path.
    pub fn generate_mapping(&self) -> Result<RdbMapping, SchemaError> {
        let tables = self.compile()?;
        let mut mapping = RdbMapping::default();

        for table in tables {
            let mut mapped = MappedTable::new(&table.name, &table.seq_name);
            for column in &table.columns {
                mapped.insert(&column.field, &column.name);
            }
            match table.kind {
                TableKind::Node => mapping.insert_node(table.source, mapped),
                TableKind::Event => {
                    if let Some(key) = parse_event_source(&table.source) {
                        mapping.insert_event(key, mapped);
                    }
                }
            }
        }

        Ok(mapping)
    }

    fn node_table(&self, node: &NodeDef) -> Table {
        let name = self.naming.node_table(&node.name);
        let mut columns = self.attr_columns(self.registry.node_attrs());

        for (ident, prop) in &node.props {
            columns.push(self.prop_column(&name, ident, prop, node));
        }
        if let Some(column) = self.redundancy_column(&name, node) {
            columns.push(column);
        }

        Table {
            kind: TableKind::Node,
            source: node.name.clone(),
            comment: node.title.clone(),
            pk_name: self.naming.node_pk(&node.name),
            index_name: Some(self.naming.index_of_table(&name)),
            seq_name: SEQ_NODE.to_string(),
            name,
            columns,
        }
    }

    fn event_table(&self, event: &EventDef) -> Table {
        let name = self
            .naming
            .event_table(&event.name, &event.left, &event.right);
        let mut columns = self.attr_columns(self.registry.event_attrs());

        for (ident, prop) in &event.props {
            let mut column = Column::new(
                ident,
                self.naming.prop_column(ident),
                column_type(prop),
            );
            column.nullable = !prop.required;
            column.length = string_length(prop);
            if prop.indexed || event.indexes.contains(ident) {
                column.index_name = Some(index_name(&self.naming, &name, &column.name));
            }
            columns.push(column);
        }

        Table {
            kind: TableKind::Event,
            source: event_source(event),
            comment: event.title.clone(),
            pk_name: self.naming.event_pk(&event.name, &event.left, &event.right),
            index_name: Some(self.naming.index_of_table(&name)),
            seq_name: SEQ_EVENT.to_string(),
            name,
            columns,
        }
    }

    fn attr_columns(
        &self,
        attrs: &std::collections::BTreeMap<String, PropertyDef>,
    ) -> Vec<Column> {
        let mut columns = Vec::with_capacity(attrs.len());
        for (ident, attr) in attrs {
            let mut column = Column::new(
                ident,
                self.naming.attr_column(ident),
                column_type(attr),
            );
            column.nullable = !attr.required;
            column.length = string_length(attr);
            match ident.as_str() {
                "__id" => {
                    column.key = true;
                    column.nullable = false;
                }
                "__uuid" => {
                    column.unique = true;
                }
                _ => {}
            }
            columns.push(column);
        }
        columns
    }

    fn prop_column(&self, table: &str, ident: &str, prop: &PropertyDef, node: &NodeDef) -> Column {
        let mut column = Column::new(ident, self.naming.prop_column(ident), column_type(prop));
        column.nullable = !prop.required;
        column.length = string_length(prop);
        if prop.indexed || node.indexes.contains(&ident.to_string()) {
            column.index_name = Some(index_name(&self.naming, table, &column.name));
        }
        column
    }

    /// A unique-index chain entry yields one synthetic denormalized
    /// column: a required numeric foreign key resolved at save time.
    fn redundancy_column(&self, table: &str, node: &NodeDef) -> Option<Column> {
        let chain = node
            .unique_index
            .iter()
            .find_map(|entry| ChainRef::parse(entry))?;
        let field = chain.redundancy_property();
        let mut column = Column::new(
            &field,
            self.naming.redundancy_prop_column(&field),
            ColumnType::Number,
        );
        column.nullable = false;
        column.index_name = Some(index_name(&self.naming, table, &column.name));
        Some(column)
    }
}

/// Index names are a fixed-length hash of table+column so their length
/// never depends on the source names.
fn index_name<S: NameStrategy>(naming: &S, table: &str, column: &str) -> String {
    naming.index_of_table(&hash::hex16(&format!("{table}/{column}")))
}

fn column_type(prop: &PropertyDef) -> ColumnType {
    match prop.base {
        BaseType::Integer => ColumnType::Number,
        BaseType::Float => ColumnType::Float,
        BaseType::Boolean => ColumnType::Boolean,
        BaseType::Datetime => ColumnType::Datetime,
        BaseType::Binary => ColumnType::Blob,
        BaseType::String => {
            if string_is_unbounded(prop) || prop.max_length().is_some_and(|n| n >= LARGE_STRING_LENGTH)
            {
                ColumnType::Clob
            } else {
                ColumnType::VarChar
            }
        }
    }
}

/// An explicit `-1` upper bound means unbounded text.
fn string_is_unbounded(prop: &PropertyDef) -> bool {
    matches!(prop.upper, Some(vinedb_schema::types::Value::Integer(n)) if n < 0)
}

/// Bounded strings carry a length; large and unbounded ones become
/// Clob and carry none. Absent bounds fall back to the default length.
fn string_length(prop: &PropertyDef) -> Option<i64> {
    if prop.base != BaseType::String || string_is_unbounded(prop) {
        return None;
    }
    match prop.max_length() {
        Some(n) if n < LARGE_STRING_LENGTH => Some(n),
        Some(_) => None,
        None => Some(DEFAULT_STRING_LENGTH),
    }
}

fn event_source(event: &EventDef) -> String {
    format!("{}({}->{})", event.name, event.left, event.right)
}

fn parse_event_source(source: &str) -> Option<(String, String, String)> {
    let open = source.find('(')?;
    let arrow = source.find("->")?;
    let close = source.rfind(')')?;
    Some((
        source[..open].to_string(),
        source[open + 1..arrow].to_string(),
        source[arrow + 2..close].to_string(),
    ))
}
