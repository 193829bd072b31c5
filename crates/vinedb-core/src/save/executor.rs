use crate::{
    backend::{FileRef, SqlExecutor},
    convert::{RdbConvert, now_millis},
    entity::{DataSet, EventEntity, NodeEntity, Operate},
    error::{ConvertError, SaveError, ValidationError},
    id::{self, AreaProvider, IdAllocator},
    query::{
        Comparator, LabelParam, QueryCompiler, QueryRequest,
        chain::{self, Direction},
        run,
    },
    save::{ChangeListener, SaveOptions, SaveResult},
    validate::Validator,
};
use std::collections::BTreeSet;
use ulid::Ulid;
use vinedb_schema::{
    event::EventDef,
    node::NodeDef,
    property::{ChainRef, DefaultValue},
    types::Value,
};
use xxhash_rust::xxh3::xxh3_64;

// worklist order within one fixpoint pass
const fn rank(verb: Operate) -> u8 {
    match verb {
        Operate::Query => 0,
        Operate::Match => 1,
        Operate::CreateOrUpdate => 2,
        Operate::Update => 3,
        Operate::Create => 4,
        Operate::Delete => 5,
    }
}

enum Hook {
    Create,
    Created,
    Update,
    Updated,
    Delete,
    Deleted,
    Query,
}

/// Outcome of resolving one entity's cross-batch references.
enum Source {
    Ready(String, String),
    Waiting,
    Absent,
}

///
/// SaveExecutor
///
/// Persists one heterogeneous batch: classify by verb, abort early on
/// cascade conflicts, then resolve cross-entity references in a
/// fixpoint loop where every pass must make strict progress. Runs
/// entirely inside the caller's open transaction; any error propagates
/// so the caller rolls back.
///

pub struct SaveExecutor<'a, A: AreaProvider, E: SqlExecutor> {
    convert: &'a RdbConvert<'a>,
    allocator: &'a mut IdAllocator<A>,
    backend: &'a mut E,
    listeners: &'a mut [Box<dyn ChangeListener>],
    debug: bool,
}

impl<'a, A: AreaProvider, E: SqlExecutor> SaveExecutor<'a, A, E> {
    pub fn new(
        convert: &'a RdbConvert<'a>,
        allocator: &'a mut IdAllocator<A>,
        backend: &'a mut E,
        listeners: &'a mut [Box<dyn ChangeListener>],
    ) -> Self {
        Self {
            convert,
            allocator,
            backend,
            listeners,
            debug: false,
        }
    }

    #[must_use]
    pub const fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    fn debug_log(&self, s: &str) {
        if self.debug {
            println!("[debug] save: {s}");
        }
    }

    pub fn save(&mut self, data: DataSet, options: &SaveOptions) -> Result<SaveResult, SaveError> {
        let mut data = data;
        self.debug_log(&format!("batch of {} entities", data.len()));
        for listener in self.listeners.iter_mut() {
            listener.on_save(&data)?;
        }
        self.cascade_notice(&data, options)?;

        let mut result = SaveResult::default();
        let mut done = BTreeSet::new();

        let mut pending: Vec<String> = data
            .node_ids()
            .into_iter()
            .filter(|id| self.node_verb(data.node(id), options).is_some())
            .collect();

        while !pending.is_empty() {
            let mut ordered: Vec<(u8, String)> = pending
                .iter()
                .filter_map(|id| {
                    self.node_verb(data.node(id), options)
                        .map(|v| (rank(v), id.clone()))
                })
                .collect();
            ordered.sort();
            let attempted = ordered.len();
            if attempted == 0 {
                break;
            }

            let mut waiting = Vec::new();
            for (_, node_id) in ordered {
                if done.contains(&node_id) {
                    continue;
                }
                let Some(node) = data.node(&node_id).cloned() else {
                    continue;
                };
                let Some(verb) = self.node_verb(Some(&node), options) else {
                    continue;
                };
                let fills = if verb == Operate::Delete {
                    Some(Vec::new())
                } else {
                    self.resolve_fills(&node, &data)?
                };
                let Some(fills) = fills else {
                    waiting.push(node_id);
                    continue;
                };

                match verb {
                    Operate::Create => {
                        self.create_node(node, fills, &options.files, &mut data, &mut result, &mut done)?;
                    }
                    Operate::Update => {
                        self.update_node(node, fills, &options.files, &mut data, &mut result)?;
                    }
                    Operate::Delete => {
                        self.delete_node(node, &mut data, &mut result, &mut done)?;
                    }
                    Operate::Query => self.query_node(node, &mut data)?,
                    Operate::Match => self.match_node(node, fills, &mut data)?,
                    Operate::CreateOrUpdate => {
                        self.create_or_update_node(
                            node,
                            fills,
                            &options.files,
                            &mut data,
                            &mut result,
                            &mut done,
                        )?;
                    }
                }
            }

            if waiting.is_empty() {
                break;
            }
            // every pass must strictly shrink the waiting set
            if waiting.len() >= attempted {
                return Err(SaveError::Unsatisfiable {
                    waiting: waiting.len(),
                    attempted,
                });
            }
            self.debug_log(&format!("{} of {attempted} re-queued", waiting.len()));
            pending = waiting;
        }

        self.process_events(options, &mut data, &mut result, &mut done)?;

        result.data = data;
        Ok(result)
    }

    fn node_verb(&self, node: Option<&NodeEntity>, options: &SaveOptions) -> Option<Operate> {
        node?.operate.or(options.default_operate)
    }

    fn node_def(&self, sd: &str) -> Result<&'a NodeDef, SaveError> {
        self.convert
            .registry()
            .node(sd)
            .ok_or_else(|| ValidationError::UndefinedType {
                name: sd.to_string(),
            })
            .map_err(SaveError::from)
    }

    fn fire(&mut self, hook: &Hook, node: &NodeEntity, data: &DataSet) -> Result<(), SaveError> {
        for listener in self.listeners.iter_mut() {
            match hook {
                Hook::Create => listener.on_create(node, data)?,
                Hook::Created => listener.on_created(node, data)?,
                Hook::Update => listener.on_update(node, data)?,
                Hook::Updated => listener.on_updated(node, data)?,
                Hook::Delete => listener.on_delete(node, data)?,
                Hook::Deleted => listener.on_deleted(node, data)?,
                Hook::Query => listener.on_query(node, data)?,
            }
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────
    // cascade notice
    // ─────────────────────────────────────────────────────────────

    /// Before any mutation: every non-forced delete that would orphan
    /// live required counterparts aborts the batch, aggregated over
    /// the transitive closure of affected types.
    fn cascade_notice(&mut self, data: &DataSet, options: &SaveOptions) -> Result<(), SaveError> {
        let deletes: Vec<NodeEntity> = data
            .nodes()
            .filter(|n| self.node_verb(Some(n), options) == Some(Operate::Delete) && !n.enforce)
            .cloned()
            .collect();

        let mut affected = BTreeSet::new();
        let mut visited = BTreeSet::new();
        for node in deletes {
            self.collect_orphans(&node.sd, &node.id, &mut affected, &mut visited)?;
        }

        if affected.is_empty() {
            Ok(())
        } else {
            Err(SaveError::Cascade {
                affected: affected.into_iter().collect(),
            })
        }
    }

    fn collect_orphans(
        &mut self,
        sd: &str,
        node_id: &str,
        affected: &mut BTreeSet<String>,
        visited: &mut BTreeSet<String>,
    ) -> Result<(), SaveError> {
        let defs: Vec<EventDef> = self
            .convert
            .registry()
            .events_touching(sd)
            .cloned()
            .collect();

        for def in &defs {
            for on_left in [true, false] {
                // the opposite endpoint is the dependent one
                let (side, counterpart_required) = if on_left {
                    (&def.left, def.required.right_required())
                } else {
                    (&def.right, def.required.left_required())
                };
                if side != sd || !counterpart_required {
                    continue;
                }
                for counterpart in self.linked_counterparts(def, node_id, on_left)? {
                    if visited.insert(counterpart.id.clone()) {
                        affected.insert(self.type_title(&counterpart.sd));
                        self.collect_orphans(
                            &counterpart.sd,
                            &counterpart.id,
                            affected,
                            visited,
                        )?;
                    }
                }
            }
        }
        Ok(())
    }

    fn type_title(&self, sd: &str) -> String {
        self.convert
            .registry()
            .node(sd)
            .map_or_else(|| sd.to_string(), |d| d.title.clone())
    }

    // ─────────────────────────────────────────────────────────────
    // reference resolution
    // ─────────────────────────────────────────────────────────────

    /// Values this entity needs from other batch entities: the
    /// denormalized redundancy column and chain-reference defaults.
    /// `None` means a source entity is still unpersisted and the
    /// entity must wait a pass.
    fn resolve_fills(
        &mut self,
        node: &NodeEntity,
        data: &DataSet,
    ) -> Result<Option<Vec<(String, Value)>>, SaveError> {
        let def = self.node_def(&node.sd)?;
        let mut fills = Vec::new();

        if let Some(chain_ref) = def.unique_index.iter().find_map(|e| ChainRef::parse(e)) {
            let ident = chain_ref.redundancy_property();
            if !node.props.contains_key(&ident) {
                match self.chain_source(node, &chain_ref.chain, data)? {
                    Source::Ready(source_id, _) => {
                        if let Some(numeric) = id::numeric(&source_id) {
                            fills.push((ident, Value::Integer(numeric)));
                        }
                    }
                    Source::Waiting => return Ok(None),
                    Source::Absent => {}
                }
            }
        }

        for (ident, prop) in &def.props {
            if node.props.get(ident).is_some_and(|v| !v.is_null()) {
                continue;
            }
            let Some(DefaultValue::ChainRef(chain_ref)) = &prop.default else {
                continue;
            };
            match self.chain_source(node, &chain_ref.chain, data)? {
                Source::Ready(source_id, source_sd) => {
                    if let Some(value) =
                        self.source_value(&source_id, &source_sd, &chain_ref.property, data)?
                    {
                        fills.push((ident.clone(), value));
                    }
                }
                Source::Waiting => return Ok(None),
                Source::Absent => {}
            }
        }

        Ok(Some(fills))
    }

    /// Walk one chain hop through the batch's events to the entity the
    /// reference points at.
    fn chain_source(
        &self,
        node: &NodeEntity,
        chain_text: &str,
        data: &DataSet,
    ) -> Result<Source, SaveError> {
        let parsed = chain::parse(chain_text)?;
        let Some(hop) = parsed.hops.first() else {
            return Ok(Source::Absent);
        };

        for event in data.events() {
            if event.sd != hop.event.name || event.operate == Some(Operate::Delete) {
                continue;
            }
            let source = match hop.direction {
                Direction::Forward
                    if event.left_id == node.id
                        && event.left_sd == node.sd
                        && event.right_sd == hop.to.name =>
                {
                    (event.right_id.clone(), event.right_sd.clone())
                }
                Direction::Backward
                    if event.right_id == node.id
                        && event.right_sd == node.sd
                        && event.left_sd == hop.to.name =>
                {
                    (event.left_id.clone(), event.left_sd.clone())
                }
                _ => continue,
            };
            return Ok(if id::effective(&source.0) {
                Source::Ready(source.0, source.1)
            } else {
                Source::Waiting
            });
        }

        Ok(Source::Absent)
    }

    /// Referenced property value, from the batch first, then storage.
    fn source_value(
        &mut self,
        source_id: &str,
        source_sd: &str,
        property: &str,
        data: &DataSet,
    ) -> Result<Option<Value>, SaveError> {
        if property == "__id" {
            return Ok(Some(Value::from(source_id)));
        }
        if let Some(node) = data.node(source_id) {
            if property == "__uuid" {
                return Ok(Some(Value::from(node.uuid.clone())));
            }
            if let Some(value) = node.get(property) {
                return Ok(Some(value.clone()));
            }
        }
        let loaded = self.load_node(source_sd, source_id)?;
        Ok(loaded.and_then(|n| match property {
            "__uuid" => Some(Value::from(n.uuid)),
            _ => n.get(property).cloned(),
        }))
    }

    // ─────────────────────────────────────────────────────────────
    // sub-queries
    // ─────────────────────────────────────────────────────────────

    fn load_node(&mut self, sd: &str, node_id: &str) -> Result<Option<NodeEntity>, SaveError> {
        self.find_one(sd, "__id", Value::from(node_id))
    }

    fn find_by_uuid(&mut self, sd: &str, uuid: &str) -> Result<Option<NodeEntity>, SaveError> {
        self.find_one(sd, "__uuid", Value::from(uuid))
    }

    fn find_one(
        &mut self,
        sd: &str,
        property: &str,
        value: Value,
    ) -> Result<Option<NodeEntity>, SaveError> {
        let req = QueryRequest::chain(format!("N:{sd}")).param(
            "N",
            LabelParam {
                property: property.to_string(),
                cmp: Comparator::Eq,
                value,
            },
        );
        let plan = QueryCompiler::new(self.convert).compile(&req)?;
        let result = run(self.convert, &plan, self.backend)?;
        Ok(result.nodes.into_iter().next())
    }

    /// Nodes currently linked to `node_id` on the opposite side of the
    /// given event definition.
    fn linked_counterparts(
        &mut self,
        def: &EventDef,
        node_id: &str,
        node_on_left: bool,
    ) -> Result<Vec<NodeEntity>, SaveError> {
        let chain_text = if node_on_left {
            format!("C:{}<{}-S:{}", def.right, def.name, def.left)
        } else {
            format!("C:{}-{}>S:{}", def.left, def.name, def.right)
        };
        let mut req = QueryRequest::chain(chain_text).param(
            "S",
            LabelParam {
                property: "__id".to_string(),
                cmp: Comparator::Eq,
                value: Value::from(node_id),
            },
        );
        req.returns = Some(std::iter::once("C".to_string()).collect());

        let plan = QueryCompiler::new(self.convert).compile(&req)?;
        let result = run(self.convert, &plan, self.backend)?;
        Ok(result.nodes)
    }

    // ─────────────────────────────────────────────────────────────
    // node verbs
    // ─────────────────────────────────────────────────────────────

    fn create_node(
        &mut self,
        mut node: NodeEntity,
        fills: Vec<(String, Value)>,
        files: &[FileRef],
        data: &mut DataSet,
        result: &mut SaveResult,
        done: &mut BTreeSet<String>,
    ) -> Result<(), SaveError> {
        self.fire(&Hook::Create, &node, data)?;

        let old_id = node.id.clone();
        if !node.original_id || !id::effective(&node.id) {
            node.id = self.allocator.next()?;
        }
        for (ident, value) in fills {
            node.props.insert(ident, value);
        }

        let now = now_millis();
        node.create_time = Some(now);
        node.update_time = Some(now);
        let def = self.node_def(&node.sd)?;
        node.regenerate_uuid(def);

        Validator::new(self.convert).validate_node(Operate::Create, &node, self.backend)?;
        let param = self.convert.node_insert_param(&node, files)?;
        self.backend.insert(&param)?;

        node.strip_transients();
        data.update_node_id(&old_id, &node.id);
        data.put_node(node.clone());
        done.insert(node.id.clone());
        result.created += 1;
        self.debug_log(&format!("created {} {}", node.sd, node.id));

        self.fire(&Hook::Created, &node, data)
    }

    fn update_node(
        &mut self,
        mut node: NodeEntity,
        fills: Vec<(String, Value)>,
        files: &[FileRef],
        data: &mut DataSet,
        result: &mut SaveResult,
    ) -> Result<(), SaveError> {
        self.fire(&Hook::Update, &node, data)?;

        for (ident, value) in fills {
            node.props.insert(ident, value);
        }
        node.update_time = Some(now_millis());
        let def = self.node_def(&node.sd)?;
        node.regenerate_uuid(def);

        Validator::new(self.convert).validate_node(Operate::Update, &node, self.backend)?;
        let param = self.convert.node_update_param(&node, files)?;
        self.backend.update(&param)?;

        node.strip_transients();
        node.operate = Some(Operate::Update);
        data.put_node(node.clone());
        result.updated += 1;

        self.fire(&Hook::Updated, &node, data)
    }

    /// Load by every populated property and sync the stored entity
    /// back into the batch.
    fn query_node(&mut self, node: NodeEntity, data: &mut DataSet) -> Result<(), SaveError> {
        let def = self.node_def(&node.sd)?;
        let mut req = QueryRequest::chain(format!("N:{}", node.sd));
        for (ident, value) in node.populated() {
            req = req.param(
                "N",
                LabelParam {
                    property: ident.clone(),
                    cmp: Comparator::Eq,
                    value: value.clone(),
                },
            );
        }
        let plan = QueryCompiler::new(self.convert).compile(&req)?;
        let found = run(self.convert, &plan, self.backend)?
            .nodes
            .into_iter()
            .next()
            .ok_or_else(|| ValidationError::Missing {
                def: def.title.clone(),
                id: node.display(def),
            })?;
        self.sync_loaded(&node, found, Operate::Query, data)
    }

    /// Load by unique-index content only; non-key properties on the
    /// incoming entity pass through untouched.
    fn match_node(
        &mut self,
        node: NodeEntity,
        fills: Vec<(String, Value)>,
        data: &mut DataSet,
    ) -> Result<(), SaveError> {
        let def = self.node_def(&node.sd)?;
        let mut probe = node.clone();
        for (ident, value) in fills {
            probe.props.insert(ident, value);
        }
        probe.regenerate_uuid(def);

        let found = self
            .find_by_uuid(&node.sd, &probe.uuid)?
            .ok_or_else(|| ValidationError::Missing {
                def: def.title.clone(),
                id: node.display(def),
            })?;
        self.sync_loaded(&node, found, Operate::Match, data)
    }

    fn create_or_update_node(
        &mut self,
        node: NodeEntity,
        fills: Vec<(String, Value)>,
        files: &[FileRef],
        data: &mut DataSet,
        result: &mut SaveResult,
        done: &mut BTreeSet<String>,
    ) -> Result<(), SaveError> {
        let def = self.node_def(&node.sd)?;
        if !def.has_unique_index() {
            return self.create_node(node, fills, files, data, result, done);
        }

        let mut probe = node.clone();
        for (ident, value) in &fills {
            probe.props.insert(ident.clone(), value.clone());
        }
        probe.regenerate_uuid(def);

        match self.find_by_uuid(&node.sd, &probe.uuid)? {
            Some(found) => {
                data.update_node_id(&node.id, &found.id);
                let mut patch = node;
                patch.id = found.id;
                self.update_node(patch, fills, files, data, result)
            }
            None => self.create_node(node, fills, files, data, result, done),
        }
    }

    fn sync_loaded(
        &mut self,
        original: &NodeEntity,
        loaded: NodeEntity,
        verb: Operate,
        data: &mut DataSet,
    ) -> Result<(), SaveError> {
        data.update_node_id(&original.id, &loaded.id);
        let mut synced = loaded;
        synced.operate = Some(verb);
        data.put_node(synced.clone());
        self.fire(&Hook::Query, &synced, data)
    }

    // ─────────────────────────────────────────────────────────────
    // node delete
    // ─────────────────────────────────────────────────────────────

    fn delete_node(
        &mut self,
        mut node: NodeEntity,
        data: &mut DataSet,
        result: &mut SaveResult,
        done: &mut BTreeSet<String>,
    ) -> Result<(), SaveError> {
        if !done.insert(node.id.clone()) {
            return Ok(());
        }
        self.fire(&Hook::Delete, &node, data)?;
        Validator::new(self.convert).validate_node(Operate::Delete, &node, self.backend)?;

        let defs: Vec<EventDef> = self
            .convert
            .registry()
            .events_touching(&node.sd)
            .cloned()
            .collect();

        for def in &defs {
            for on_left in [true, false] {
                let (side, counterpart_required) = if on_left {
                    (&def.left, def.required.right_required())
                } else {
                    (&def.right, def.required.left_required())
                };
                if side != &node.sd {
                    continue;
                }

                if counterpart_required {
                    let counterparts = self.linked_counterparts(def, &node.id, on_left)?;
                    if !counterparts.is_empty() {
                        if !node.enforce {
                            let affected: BTreeSet<String> = counterparts
                                .iter()
                                .map(|c| format!("{} ({})", self.type_title(&c.sd), def.title))
                                .collect();
                            return Err(SaveError::Cascade {
                                affected: affected.into_iter().collect(),
                            });
                        }
                        self.delete_event_rows(def, &node.id, on_left)?;
                        for mut counterpart in counterparts {
                            counterpart.enforce = true;
                            counterpart.operate = Some(Operate::Delete);
                            self.delete_node(counterpart, data, result, done)?;
                        }
                        continue;
                    }
                }
                self.delete_event_rows(def, &node.id, on_left)?;
            }
        }

        let mapped = self
            .convert
            .mapping()
            .node_table(&node.sd)
            .ok_or_else(|| ConvertError::UnmappedType {
                def: node.sd.clone(),
            })?;
        let id_column = self.convert.column_of(mapped, &node.sd, "__id")?;
        self.backend
            .delete(&mapped.table, &[(id_column, Value::from(node.id.clone()))])?;

        node.operate = Some(Operate::Delete);
        node.strip_transients();
        data.put_node(node.clone());
        result.deleted += 1;
        self.debug_log(&format!("deleted {} {}", node.sd, node.id));

        self.fire(&Hook::Deleted, &node, data)
    }

    fn delete_event_rows(
        &mut self,
        def: &EventDef,
        node_id: &str,
        on_left: bool,
    ) -> Result<u64, SaveError> {
        let mapped = self
            .convert
            .mapping()
            .event_table(&def.name, &def.left, &def.right)
            .ok_or_else(|| ConvertError::UnmappedType {
                def: def.name.clone(),
            })?;
        let endpoint = if on_left { "__left" } else { "__right" };
        let column = self.convert.column_of(mapped, &def.name, endpoint)?;
        let deleted = self
            .backend
            .delete(&mapped.table, &[(column, Value::from(node_id))])?;
        Ok(deleted)
    }

    // ─────────────────────────────────────────────────────────────
    // event verbs
    // ─────────────────────────────────────────────────────────────

    fn process_events(
        &mut self,
        options: &SaveOptions,
        data: &mut DataSet,
        result: &mut SaveResult,
        done: &mut BTreeSet<String>,
    ) -> Result<(), SaveError> {
        let mut ordered: Vec<(u8, Operate, String)> = Vec::new();
        for event_id in data.event_ids() {
            let Some(event) = data.event(&event_id) else {
                continue;
            };
            let verb = match event.operate {
                Some(verb) if verb.valid_for_event() => verb,
                Some(verb) => {
                    return Err(SaveError::UnsupportedVerb {
                        verb: verb.to_string(),
                        kind: "event",
                    });
                }
                None => match options.default_operate {
                    Some(verb) if verb.valid_for_event() => verb,
                    _ => continue,
                },
            };
            ordered.push((rank(verb), verb, event_id));
        }
        ordered.sort_by(|a, b| (a.0, &a.2).cmp(&(b.0, &b.2)));

        for (_, verb, event_id) in ordered {
            let Some(event) = data.event(&event_id).cloned() else {
                continue;
            };
            match verb {
                Operate::Update => self.update_event(event, &options.files, data, result)?,
                Operate::Delete => self.delete_event(event, data, result, done)?,
                _ => self.create_event(event, &options.files, data, result)?,
            }
        }
        Ok(())
    }

    fn create_event(
        &mut self,
        mut event: EventEntity,
        files: &[FileRef],
        data: &mut DataSet,
        result: &mut SaveResult,
    ) -> Result<(), SaveError> {
        for endpoint in [&event.left_id, &event.right_id] {
            if !id::effective(endpoint) {
                return Err(ValidationError::BadId {
                    id: endpoint.clone(),
                }
                .into());
            }
        }

        let old_id = event.id.clone();
        if !id::effective(&event.id) {
            event.id = self.allocator.next()?;
        }
        let now = now_millis();
        event.create_time = Some(now);
        event.update_time = Some(now);
        event.uuid = fresh_uuid(&event.sd, &event.id);

        Validator::new(self.convert).validate_event(Operate::Create, &event, self.backend)?;
        let param = self.convert.event_insert_param(&event, files)?;
        self.backend.insert(&param)?;

        event.strip_transients();
        event.operate = Some(Operate::Create);
        data.remove_event(&old_id);
        data.put_event(event);
        result.created += 1;
        Ok(())
    }

    fn update_event(
        &mut self,
        mut event: EventEntity,
        files: &[FileRef],
        data: &mut DataSet,
        result: &mut SaveResult,
    ) -> Result<(), SaveError> {
        event.update_time = Some(now_millis());
        Validator::new(self.convert).validate_event(Operate::Update, &event, self.backend)?;
        let param = self.convert.event_update_param(&event, files)?;
        self.backend.update(&param)?;

        event.strip_transients();
        event.operate = Some(Operate::Update);
        data.put_event(event);
        result.updated += 1;
        Ok(())
    }

    /// Deleting an event that a required policy depends on: a
    /// same-batch replacement makes it an implicit replace; otherwise
    /// the orphaned endpoint is cascade-deleted under force, or the
    /// batch aborts.
    fn delete_event(
        &mut self,
        mut event: EventEntity,
        data: &mut DataSet,
        result: &mut SaveResult,
        done: &mut BTreeSet<String>,
    ) -> Result<(), SaveError> {
        let def = self
            .convert
            .registry()
            .event(&event.sd, &event.left_sd, &event.right_sd)
            .ok_or_else(|| ValidationError::UndefinedType {
                name: event.sd.clone(),
            })?
            .clone();
        Validator::new(self.convert).validate_event(Operate::Delete, &event, self.backend)?;

        // a required endpoint cannot outlive this event
        let mut orphans: Vec<(String, String)> = Vec::new();
        let dependents = [
            (def.required.left_required(), true),
            (def.required.right_required(), false),
        ];
        for (required, dependent_on_left) in dependents {
            if !required {
                continue;
            }
            let (dependent_sd, dependent_id) = if dependent_on_left {
                (&event.left_sd, &event.left_id)
            } else {
                (&event.right_sd, &event.right_id)
            };

            let replaced = data.events().any(|e| {
                e.id != event.id
                    && e.operate == Some(Operate::Create)
                    && e.def_key() == event.def_key()
                    && if dependent_on_left {
                        e.left_id == event.left_id
                    } else {
                        e.right_id == event.right_id
                    }
            });
            if replaced {
                continue;
            }
            if !event.enforce {
                return Err(SaveError::Cascade {
                    affected: vec![format!("{} ({})", self.type_title(dependent_sd), def.title)],
                });
            }
            orphans.push((dependent_sd.clone(), dependent_id.clone()));
        }

        let mapped = self
            .convert
            .mapping()
            .event_table(&event.sd, &event.left_sd, &event.right_sd)
            .ok_or_else(|| ConvertError::UnmappedType {
                def: event.sd.clone(),
            })?;
        let id_column = self.convert.column_of(mapped, &event.sd, "__id")?;
        self.backend
            .delete(&mapped.table, &[(id_column, Value::from(event.id.clone()))])?;

        event.operate = Some(Operate::Delete);
        data.put_event(event);
        result.deleted += 1;

        for (orphan_sd, orphan_id) in orphans {
            let orphan = match data.node(&orphan_id) {
                Some(node) => Some(node.clone()),
                None => self.load_node(&orphan_sd, &orphan_id)?,
            };
            if let Some(mut orphan) = orphan {
                orphan.enforce = true;
                orphan.operate = Some(Operate::Delete);
                self.delete_node(orphan, data, result, done)?;
            }
        }
        Ok(())
    }
}

/// Random, time-ordered fingerprint for entities without unique
/// content.
fn fresh_uuid(sd: &str, entity_id: &str) -> String {
    let millis = now_millis().max(0) as u64;
    let entropy = u128::from(xxh3_64(format!("{sd}\u{1f}{entity_id}").as_bytes()));
    Ulid::from_parts(millis, entropy).to_string()
}
