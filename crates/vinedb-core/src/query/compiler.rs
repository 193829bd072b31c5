use crate::{
    convert::RdbConvert,
    error::QueryError,
    query::{
        chain::{self, Direction},
        fragment::{
            AliasMap, Comparator, ExistsFilter, Fragment, FragmentKind, Join, Order, Page, Param,
            QueryPlan,
        },
    },
    schema::mapping::MappedTable,
};
use std::collections::{BTreeMap, BTreeSet};
use vinedb_schema::types::{BaseType, Value};

///
/// LabelParam
///
/// One property filter attached to a chain label.
///

#[derive(Clone, Debug)]
pub struct LabelParam {
    pub property: String,
    pub cmp: Comparator,
    pub value: Value,
}

///
/// OrderSpec / MainSpec
///

#[derive(Clone, Debug)]
pub struct OrderSpec {
    pub property: String,
    pub desc: bool,
}

#[derive(Clone, Debug, Default)]
pub struct MainSpec {
    pub label: String,
    pub orders: Vec<OrderSpec>,
    pub page: Option<Page>,
}

///
/// QueryRequest
///

#[derive(Clone, Debug, Default)]
pub struct QueryRequest {
    pub chains: Vec<String>,
    pub params: BTreeMap<String, Vec<LabelParam>>,
    /// Drives ordering and paging; must name a chain label.
    pub main: Option<MainSpec>,
    /// Labels to project fully; absent means all.
    pub returns: Option<BTreeSet<String>>,
    /// Suppress all non-main joins at fetch time.
    pub only_main: bool,
    /// Row-lock variant for read-then-write callers.
    pub lock: bool,
}

impl QueryRequest {
    #[must_use]
    pub fn chain(chain: impl Into<String>) -> Self {
        Self {
            chains: vec![chain.into()],
            ..Self::default()
        }
    }

    #[must_use]
    pub fn param(mut self, label: impl Into<String>, param: LabelParam) -> Self {
        self.params.entry(label.into()).or_default().push(param);
        self
    }
}

// one parsed, label-resolved hop
#[derive(Clone, Debug)]
struct Edge {
    event_label: String,
    event_name: String,
    from: String,
    to: String,
    forward: bool,
}

impl Edge {
    fn signature(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.event_label, self.event_name, self.forward, self.to
        )
    }
}

///
/// QueryCompiler
///
/// Translates chain expressions plus per-label filters into a
/// join/exists fragment plan. Compilation is all-or-nothing: any
/// undefined type, ambiguous label, or missing main label fails with
/// no partial plan.
///

pub struct QueryCompiler<'a> {
    convert: &'a RdbConvert<'a>,
    debug: bool,
}

impl<'a> QueryCompiler<'a> {
    #[must_use]
    pub const fn new(convert: &'a RdbConvert<'a>) -> Self {
        Self {
            convert,
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
            println!("[debug] query: {s}");
        }
    }

    pub fn compile(&self, req: &QueryRequest) -> Result<QueryPlan, QueryError> {
        let mut state = Compile {
            convert: self.convert,
            req,
            bindings: BTreeMap::new(),
            event_bindings: BTreeMap::new(),
            edges: Vec::new(),
            heads: Vec::new(),
            visited: BTreeSet::new(),
            fragments: Vec::new(),
            label_fragment: BTreeMap::new(),
            table_counter: 0,
            column_counter: 0,
            exists_counter: 0,
        };

        state.resolve(req)?;

        // start from the main label, or the first chain head when no
        // paging/sorting is requested
        let start = match &req.main {
            Some(main) => {
                if !state.bindings.contains_key(&main.label) {
                    return Err(QueryError::MainLabelNotFound {
                        label: main.label.clone(),
                    });
                }
                main.label.clone()
            }
            None => state
                .heads
                .first()
                .cloned()
                .ok_or_else(|| QueryError::BadChain {
                    chain: String::new(),
                    reason: "no chains given".to_string(),
                })?,
        };

        state.build_node(&start)?;
        state.expand(&start)?;

        // disconnected chains each contribute their own fragment tree
        for head in state.heads.clone() {
            if !state.label_fragment.contains_key(&head) {
                state.build_node(&head)?;
                state.expand(&head)?;
            }
        }

        let main_index = state.label_fragment.get(&start).copied().unwrap_or(0);
        let orders = state.build_orders(main_index)?;
        self.debug_log(&format!(
            "compiled {} fragments, main {main_index}",
            state.fragments.len()
        ));

        Ok(QueryPlan {
            fragments: state.fragments,
            main: main_index,
            only_main: req.only_main,
            orders,
            page: req.main.as_ref().and_then(|m| m.page),
            lock: req.lock,
        })
    }
}

struct Compile<'a> {
    convert: &'a RdbConvert<'a>,
    req: &'a QueryRequest,
    /// node label -> node type
    bindings: BTreeMap<String, String>,
    /// event label -> event name
    event_bindings: BTreeMap<String, String>,
    edges: Vec<Edge>,
    heads: Vec<String>,
    /// (node label, hop signature) pairs already consumed; guards
    /// schema cycles within one compile call
    visited: BTreeSet<(String, String)>,
    fragments: Vec<Fragment>,
    label_fragment: BTreeMap<String, usize>,
    table_counter: usize,
    column_counter: usize,
    exists_counter: usize,
}

impl Compile<'_> {
    // ─────────────────────────────────────────────────────────────
    // label resolution
    // ─────────────────────────────────────────────────────────────

    fn resolve(&mut self, req: &QueryRequest) -> Result<(), QueryError> {
        let mut chains = Vec::new();
        for raw in &req.chains {
            chains.push(chain::parse(raw)?);
        }

        // first pass: bind labels whose token names are node types
        for parsed in &chains {
            for token in std::iter::once(&parsed.head)
                .chain(parsed.hops.iter().map(|h| &h.to))
            {
                if self.convert.registry().node(&token.name).is_some() {
                    self.bind_node(&token.label, &token.name)?;
                }
            }
        }
        // second pass: remaining tokens must be reuses of bound labels
        for parsed in &chains {
            for token in std::iter::once(&parsed.head)
                .chain(parsed.hops.iter().map(|h| &h.to))
            {
                if self.convert.registry().node(&token.name).is_none()
                    && !self.bindings.contains_key(&token.label)
                {
                    return Err(QueryError::UndefinedType {
                        name: token.name.clone(),
                    });
                }
            }
        }

        for parsed in &chains {
            self.heads.push(parsed.head.label.clone());
            let mut from = parsed.head.label.clone();
            for hop in &parsed.hops {
                self.bind_event(&hop.event.label, &hop.event.name)?;
                let edge = Edge {
                    event_label: hop.event.label.clone(),
                    event_name: hop.event.name.clone(),
                    from: from.clone(),
                    to: hop.to.label.clone(),
                    forward: hop.direction == Direction::Forward,
                };
                self.check_event_defined(&edge)?;
                self.edges.push(edge);
                from = hop.to.label.clone();
            }
        }

        Ok(())
    }

    fn bind_node(&mut self, label: &str, name: &str) -> Result<(), QueryError> {
        if let Some(existing) = self.bindings.get(label) {
            if existing != name {
                return Err(QueryError::AmbiguousLabel {
                    label: label.to_string(),
                    first: existing.clone(),
                    second: name.to_string(),
                });
            }
        } else {
            self.bindings.insert(label.to_string(), name.to_string());
        }
        Ok(())
    }

    fn bind_event(&mut self, label: &str, name: &str) -> Result<(), QueryError> {
        if let Some(existing) = self.event_bindings.get(label) {
            if existing != name {
                return Err(QueryError::AmbiguousLabel {
                    label: label.to_string(),
                    first: existing.clone(),
                    second: name.to_string(),
                });
            }
        } else {
            self.event_bindings
                .insert(label.to_string(), name.to_string());
        }
        Ok(())
    }

    fn endpoint_types(&self, edge: &Edge) -> (String, String) {
        let from_type = self.bindings[&edge.from].clone();
        let to_type = self.bindings[&edge.to].clone();
        if edge.forward {
            (from_type, to_type)
        } else {
            (to_type, from_type)
        }
    }

    fn check_event_defined(&self, edge: &Edge) -> Result<(), QueryError> {
        let (left, right) = self.endpoint_types(edge);
        if self
            .convert
            .registry()
            .event(&edge.event_name, &left, &right)
            .is_none()
        {
            return Err(QueryError::UndefinedType {
                name: format!("{}({left}->{right})", edge.event_name),
            });
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────
    // fragment construction
    // ─────────────────────────────────────────────────────────────

    fn next_table_alias(&mut self) -> String {
        let alias = format!("T_{}", self.table_counter);
        self.table_counter += 1;
        alias
    }

    fn next_column_alias(&mut self) -> String {
        let alias = format!("C_{}", self.column_counter);
        self.column_counter += 1;
        alias
    }

    fn next_exists_alias(&mut self) -> String {
        let alias = format!("X_{}", self.exists_counter);
        self.exists_counter += 1;
        alias
    }

    fn projected(&self, label: &str) -> bool {
        self.req
            .returns
            .as_ref()
            .is_none_or(|labels| labels.contains(label))
    }

    fn build_node(&mut self, label: &str) -> Result<usize, QueryError> {
        if let Some(&index) = self.label_fragment.get(label) {
            return Ok(index);
        }
        let sd = self.bindings[label].clone();
        let def = self
            .convert
            .registry()
            .node(&sd)
            .ok_or_else(|| QueryError::UndefinedType { name: sd.clone() })?
            .clone();
        let mapped = self
            .convert
            .mapping()
            .node_table(&sd)
            .ok_or_else(|| QueryError::UndefinedType { name: sd.clone() })?
            .clone();

        let alias = self.next_table_alias();
        let mut columns = AliasMap::default();
        let mut id_alias = String::new();

        // id is always projected for join wiring and row identity
        for (field, column) in mapped.fields() {
            let binary = def
                .get(field)
                .is_some_and(|p| p.base == BaseType::Binary);
            let wanted = field == "__id" || (self.projected(label) && !binary);
            if !wanted {
                continue;
            }
            let column_alias = self.next_column_alias();
            if field == "__id" {
                id_alias = column_alias.clone();
            }
            columns.insert(column_alias, column.clone())?;
        }

        let params = self.label_params(label, &sd, &mapped, None)?;
        let index = self.fragments.len();
        let projected = self.projected(label);
        self.fragments.push(Fragment {
            label: label.to_string(),
            sd,
            kind: FragmentKind::Node,
            table: mapped.table.clone(),
            alias,
            columns,
            projected,
            id_alias,
            left_alias: None,
            right_alias: None,
            params,
            join: None,
            exists: Vec::new(),
        });
        self.label_fragment.insert(label.to_string(), index);
        Ok(index)
    }

    fn build_event(&mut self, edge: &Edge) -> Result<usize, QueryError> {
        let (left, right) = self.endpoint_types(edge);
        let def = self
            .convert
            .registry()
            .event(&edge.event_name, &left, &right)
            .ok_or_else(|| QueryError::UndefinedType {
                name: edge.event_name.clone(),
            })?
            .clone();
        let mapped = self
            .convert
            .mapping()
            .event_table(&edge.event_name, &left, &right)
            .ok_or_else(|| QueryError::UndefinedType {
                name: edge.event_name.clone(),
            })?
            .clone();

        let alias = self.next_table_alias();
        let mut columns = AliasMap::default();
        let mut id_alias = String::new();
        let mut left_alias = None;
        let mut right_alias = None;

        for (field, column) in mapped.fields() {
            let binary = def
                .get(field)
                .is_some_and(|p| p.base == BaseType::Binary);
            let wiring = matches!(field.as_str(), "__id" | "__left" | "__right");
            let wanted = wiring || (self.projected(&edge.event_label) && !binary);
            if !wanted {
                continue;
            }
            let column_alias = self.next_column_alias();
            match field.as_str() {
                "__id" => id_alias = column_alias.clone(),
                "__left" => left_alias = Some(column_alias.clone()),
                "__right" => right_alias = Some(column_alias.clone()),
                _ => {}
            }
            columns.insert(column_alias, column.clone())?;
        }

        let params = self.label_params(&edge.event_label, &edge.event_name, &mapped, Some(&def))?;
        let index = self.fragments.len();
        let projected = self.projected(&edge.event_label);
        self.fragments.push(Fragment {
            label: edge.event_label.clone(),
            sd: edge.event_name.clone(),
            kind: FragmentKind::Event { left, right },
            table: mapped.table.clone(),
            alias,
            columns,
            projected,
            id_alias,
            left_alias,
            right_alias,
            params,
            join: None,
            exists: Vec::new(),
        });
        Ok(index)
    }

    /// Translate caller property filters into column params. Binary
    /// properties are silently dropped from filtering.
    fn label_params(
        &self,
        label: &str,
        sd: &str,
        mapped: &MappedTable,
        event_def: Option<&vinedb_schema::event::EventDef>,
    ) -> Result<Vec<Param>, QueryError> {
        let Some(label_params) = self.req.params.get(label) else {
            return Ok(Vec::new());
        };
        let mut params = Vec::new();
        for lp in label_params {
            let prop = event_def
                .and_then(|d| d.get(&lp.property))
                .or_else(|| {
                    self.convert
                        .registry()
                        .node(sd)
                        .and_then(|d| d.get(&lp.property))
                })
                .or_else(|| self.convert.registry().attr(&lp.property))
                .ok_or_else(|| QueryError::UnknownProperty {
                    label: label.to_string(),
                    property: lp.property.clone(),
                })?;
            if prop.base == BaseType::Binary {
                continue;
            }
            let column = mapped
                .column(&lp.property)
                .ok_or_else(|| QueryError::UnknownProperty {
                    label: label.to_string(),
                    property: lp.property.clone(),
                })?
                .to_string();
            let value = self
                .convert
                .coerce(sd, &lp.property, prop, &lp.value)
                .map_err(|_| QueryError::UnknownProperty {
                    label: label.to_string(),
                    property: lp.property.clone(),
                })?;
            params.push(Param {
                column,
                cmp: lp.cmp,
                value,
            });
        }
        Ok(params)
    }

    // ─────────────────────────────────────────────────────────────
    // traversal
    // ─────────────────────────────────────────────────────────────

    /// Depth-first expansion: every unvisited hop touching `label`
    /// emits an event fragment joined to the current node, the newly
    /// reached node joined to the event, and an exists filter gating
    /// the current fragment through the hop.
    fn expand(&mut self, label: &str) -> Result<(), QueryError> {
        let current = self.label_fragment[label];

        for i in 0..self.edges.len() {
            let edge = self.edges[i].clone();
            let (near, far, edge_out) = if edge.from == label {
                (edge.from.clone(), edge.to.clone(), edge.clone())
            } else if edge.to == label {
                // walk the hop from its far end; direction flips
                let flipped = Edge {
                    event_label: edge.event_label.clone(),
                    event_name: edge.event_name.clone(),
                    from: edge.to.clone(),
                    to: edge.from.clone(),
                    forward: !edge.forward,
                };
                (edge.to.clone(), edge.from.clone(), flipped)
            } else {
                continue;
            };

            let key = (near.clone(), edge_out.signature());
            let reverse = (
                far.clone(),
                Edge {
                    event_label: edge_out.event_label.clone(),
                    event_name: edge_out.event_name.clone(),
                    from: far.clone(),
                    to: near.clone(),
                    forward: !edge_out.forward,
                }
                .signature(),
            );
            if self.visited.contains(&key) {
                continue;
            }
            self.visited.insert(key);
            self.visited.insert(reverse);

            let event_index = self.build_event(&edge_out)?;
            // wire the event onto the current node fragment
            let (near_col, far_col) = if edge_out.forward {
                ("__left", "__right")
            } else {
                ("__right", "__left")
            };
            let event_near = self.event_column(event_index, near_col)?;
            let event_far = self.event_column(event_index, far_col)?;
            let current_id = self.id_column(current);
            let current_alias = self.fragments[current].alias.clone();
            self.fragments[event_index].join = Some(Join {
                target_alias: current_alias.clone(),
                on: vec![(event_near.clone(), current_id.clone())],
            });

            // the reached node joins onto the event
            let child_index = self.build_node(&far)?;
            if self.fragments[child_index].join.is_none() && child_index != current {
                let child_id = self.id_column(child_index);
                self.fragments[child_index].join = Some(Join {
                    target_alias: self.fragments[event_index].alias.clone(),
                    on: vec![(child_id, event_far.clone())],
                });
            }

            self.expand(&far)?;

            // gate the current fragment through the hop without
            // projecting the child's columns
            let child_exists = self.fragments[child_index].exists.clone();
            let child_alias = self.next_exists_alias();
            let event_alias = self.next_exists_alias();
            let child_filter = ExistsFilter {
                table: self.fragments[child_index].table.clone(),
                alias: child_alias,
                on: vec![(
                    self.id_column(child_index),
                    event_alias.clone(),
                    event_far.clone(),
                )],
                params: self.fragments[child_index].params.clone(),
                children: child_exists,
            };
            let event_filter = ExistsFilter {
                table: self.fragments[event_index].table.clone(),
                alias: event_alias,
                on: vec![(event_near, current_alias.clone(), current_id.clone())],
                params: self.fragments[event_index].params.clone(),
                children: vec![child_filter],
            };
            self.fragments[current].exists.push(event_filter);
        }

        Ok(())
    }

    fn id_column(&self, index: usize) -> String {
        let fragment = &self.fragments[index];
        fragment
            .columns
            .column(&fragment.id_alias)
            .unwrap_or_default()
            .to_string()
    }

    fn event_column(&self, index: usize, field: &str) -> Result<String, QueryError> {
        let fragment = &self.fragments[index];
        let alias = match field {
            "__left" => fragment.left_alias.as_deref(),
            "__right" => fragment.right_alias.as_deref(),
            _ => Some(fragment.id_alias.as_str()),
        };
        alias
            .and_then(|a| fragment.columns.column(a))
            .map(ToString::to_string)
            .ok_or_else(|| QueryError::BadChain {
                chain: fragment.sd.clone(),
                reason: format!("event fragment missing {field} column"),
            })
    }

    fn build_orders(&mut self, main_index: usize) -> Result<Vec<Order>, QueryError> {
        let Some(main) = &self.req.main else {
            return Ok(Vec::new());
        };
        let mut orders = Vec::new();
        let main_fragment = &self.fragments[main_index];
        let sd = main_fragment.sd.clone();
        let mapped = self
            .convert
            .mapping()
            .node_table(&sd)
            .ok_or_else(|| QueryError::UndefinedType { name: sd.clone() })?;

        for spec in &main.orders {
            let column = mapped
                .column(&spec.property)
                .ok_or_else(|| QueryError::UnknownProperty {
                    label: main.label.clone(),
                    property: spec.property.clone(),
                })?
                .to_string();
            // rewrite the order key back to the projected alias
            let alias = main_fragment
                .columns
                .alias(&column)
                .ok_or_else(|| QueryError::UnknownProperty {
                    label: main.label.clone(),
                    property: spec.property.clone(),
                })?
                .to_string();
            orders.push(Order {
                property: spec.property.clone(),
                column,
                alias,
                desc: spec.desc,
            });
        }
        Ok(orders)
    }
}
