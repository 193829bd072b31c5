use crate::{
    backend::{DdlTemplater, SqlExecutor},
    convert::{RdbConvert, TimestampConvert},
    entity::{DataSet, EventEntity, NodeEntity},
    error::{ConvertError, Error, ValidationError},
    id::{AreaProvider, IdAllocator},
    query::{Comparator, LabelParam, QueryCompiler, QueryRequest, QueryResult, run},
    save::{ChangeListener, SaveExecutor, SaveOptions, SaveResult},
    schema::{NameStrategy, RdbMapping, SchemaCompiler},
};
use vinedb_schema::{registry::Registry, types::Value};

///
/// GraphStore
///
/// The storage facade: wires the registry, mapping, id allocator and
/// SQL backend together behind typed entry points. Every mutation runs
/// inside the caller's open transaction; the store never begins,
/// commits or rolls one back.
///

pub struct GraphStore<'a, A: AreaProvider, E: SqlExecutor> {
    convert: RdbConvert<'a>,
    allocator: IdAllocator<A>,
    backend: E,
    listeners: Vec<Box<dyn ChangeListener>>,
}

impl<'a, A: AreaProvider, E: SqlExecutor> GraphStore<'a, A, E> {
    pub fn new(registry: &'a Registry, mapping: &'a RdbMapping, areas: A, backend: E) -> Self {
        Self {
            convert: RdbConvert::new(registry, mapping),
            allocator: IdAllocator::new(areas),
            backend,
            listeners: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: Box<dyn TimestampConvert>) -> Self {
        self.convert = self.convert.with_timestamp(timestamp);
        self
    }

    pub fn add_listener(&mut self, listener: Box<dyn ChangeListener>) {
        self.listeners.push(listener);
    }

    #[must_use]
    pub const fn convert(&self) -> &RdbConvert<'a> {
        &self.convert
    }

    #[must_use]
    pub const fn backend(&self) -> &E {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut E {
        &mut self.backend
    }

    // ─────────────────────────────────────────────────────────────
    // persistence
    // ─────────────────────────────────────────────────────────────

    pub fn save_data(
        &mut self,
        data: DataSet,
        options: &SaveOptions,
    ) -> Result<SaveResult, Error> {
        let result = SaveExecutor::new(
            &self.convert,
            &mut self.allocator,
            &mut self.backend,
            &mut self.listeners,
        )
        .save(data, options)?;
        Ok(result)
    }

    /// Persist a single node; a missing id gets a transient one so the
    /// result carries the allocated id back.
    pub fn save_node(
        &mut self,
        mut node: NodeEntity,
        options: &SaveOptions,
    ) -> Result<SaveResult, Error> {
        if node.id.is_empty() {
            node.id = self.allocator.temp();
        }
        let mut data = DataSet::new();
        data.put_node(node);
        self.save_data(data, options)
    }

    pub fn save_event(
        &mut self,
        mut event: EventEntity,
        options: &SaveOptions,
    ) -> Result<SaveResult, Error> {
        if event.id.is_empty() {
            event.id = self.allocator.temp();
        }
        let mut data = DataSet::new();
        data.put_event(event);
        self.save_data(data, options)
    }

    // ─────────────────────────────────────────────────────────────
    // retrieval
    // ─────────────────────────────────────────────────────────────

    pub fn query_data(&mut self, request: &QueryRequest) -> Result<QueryResult, Error> {
        let plan = QueryCompiler::new(&self.convert).compile(request)?;
        run(&self.convert, &plan, &mut self.backend)
    }

    pub fn get_node_by_id(&mut self, sd: &str, id: &str) -> Result<Option<NodeEntity>, Error> {
        self.find_one(sd, "__id", Value::from(id))
    }

    pub fn get_node_by_uuid(&mut self, sd: &str, uuid: &str) -> Result<Option<NodeEntity>, Error> {
        self.find_one(sd, "__uuid", Value::from(uuid))
    }

    /// Load the stored counterpart of an in-memory entity: by its
    /// content fingerprint when `use_unique_key`, otherwise by every
    /// populated property.
    pub fn load_node_by_entity(
        &mut self,
        node: &NodeEntity,
        use_unique_key: bool,
    ) -> Result<Option<NodeEntity>, Error> {
        if use_unique_key {
            let def = self
                .convert
                .registry()
                .node(&node.sd)
                .ok_or_else(|| ValidationError::UndefinedType {
                    name: node.sd.clone(),
                })?;
            let mut probe = node.clone();
            probe.regenerate_uuid(def);
            return self.find_one(&node.sd, "__uuid", Value::from(probe.uuid));
        }

        let mut request = QueryRequest::chain(format!("N:{}", node.sd));
        for (ident, value) in node.populated() {
            request = request.param(
                "N",
                LabelParam {
                    property: ident.clone(),
                    cmp: Comparator::Eq,
                    value: value.clone(),
                },
            );
        }
        let plan = QueryCompiler::new(&self.convert).compile(&request)?;
        let result = run(&self.convert, &plan, &mut self.backend)?;
        Ok(result.nodes.into_iter().next())
    }

    fn find_one(
        &mut self,
        sd: &str,
        property: &str,
        value: Value,
    ) -> Result<Option<NodeEntity>, Error> {
        let request = QueryRequest::chain(format!("N:{sd}")).param(
            "N",
            LabelParam {
                property: property.to_string(),
                cmp: Comparator::Eq,
                value,
            },
        );
        let plan = QueryCompiler::new(&self.convert).compile(&request)?;
        let result = run(&self.convert, &plan, &mut self.backend)?;
        Ok(result.nodes.into_iter().next())
    }

    // ─────────────────────────────────────────────────────────────
    // direct row surgery
    // ─────────────────────────────────────────────────────────────

    /// Remove the event rows linking two specific nodes, bypassing
    /// required-policy checks. The caller owns the consequences.
    pub fn unlink(
        &mut self,
        event: &str,
        left: (&str, &str),
        right: (&str, &str),
    ) -> Result<u64, Error> {
        if self
            .convert
            .registry()
            .event(event, left.0, right.0)
            .is_none()
        {
            return Err(ValidationError::UndefinedType {
                name: format!("{event}({}->{})", left.0, right.0),
            }
            .into());
        }
        let mapped = self
            .convert
            .mapping()
            .event_table(event, left.0, right.0)
            .ok_or_else(|| ConvertError::UnmappedType {
                def: event.to_string(),
            })?;
        let left_column = self.convert.column_of(mapped, event, "__left")?;
        let right_column = self.convert.column_of(mapped, event, "__right")?;
        let removed = self.backend.delete(
            &mapped.table,
            &[
                (left_column, Value::from(left.1)),
                (right_column, Value::from(right.1)),
            ],
        )?;
        Ok(removed)
    }

    /// Truncate a node type: every row of its table, plus every event
    /// table with the type on either endpoint.
    pub fn clear_node(&mut self, sd: &str) -> Result<u64, Error> {
        let mapped = self
            .convert
            .mapping()
            .node_table(sd)
            .ok_or_else(|| ConvertError::UnmappedType { def: sd.to_string() })?;

        let mut removed = 0;
        let tables: Vec<String> = self
            .convert
            .registry()
            .events_touching(sd)
            .filter_map(|def| {
                self.convert
                    .mapping()
                    .event_table(&def.name, &def.left, &def.right)
                    .map(|m| m.table.clone())
            })
            .collect();
        for table in tables {
            removed += self.backend.delete_all(&table)?;
        }
        removed += self.backend.delete_all(&mapped.table)?;
        Ok(removed)
    }

    // ─────────────────────────────────────────────────────────────
    // binary and provisioning
    // ─────────────────────────────────────────────────────────────

    /// Read one binary property of the node with the given fingerprint.
    pub fn binary_stream(
        &mut self,
        sd: &str,
        property: &str,
        uuid: &str,
    ) -> Result<Option<Vec<u8>>, Error> {
        let mapped = self
            .convert
            .mapping()
            .node_table(sd)
            .ok_or_else(|| ConvertError::UnmappedType { def: sd.to_string() })?;
        let column = self.convert.column_of(mapped, sd, property)?;
        let uuid_column = self.convert.column_of(mapped, sd, "__uuid")?;
        let blob = self
            .backend
            .read_blob(&mapped.table, &column, &uuid_column, uuid)?;
        Ok(blob)
    }

    /// Render provisioning DDL through a dialect templater.
    pub fn render_ddl<S: NameStrategy, D: DdlTemplater>(
        &self,
        naming: S,
        templater: &D,
        emit_sequences: bool,
    ) -> Result<String, Error> {
        let tables = SchemaCompiler::new(self.convert.registry(), naming).compile()?;
        let rendered = templater.render(&tables, emit_sequences)?;
        Ok(rendered)
    }
}
