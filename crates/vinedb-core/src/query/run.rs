use crate::{
    backend::{Row, SqlExecutor},
    convert::RdbConvert,
    entity::{EventEntity, NodeEntity},
    error::{ConvertError, Error},
    query::fragment::{Fragment, FragmentKind, QueryPlan},
};
use std::collections::{BTreeMap, BTreeSet};
use vinedb_schema::types::Value;

///
/// QuerySize
///
/// Paging bookkeeping: total matching main rows and the number on the
/// returned page.
///

#[derive(Clone, Copy, Debug, Default)]
pub struct QuerySize {
    pub count: u64,
    pub current: u64,
}

///
/// QueryResult
///
/// Decoded entities demultiplexed per fragment: main-label nodes in
/// `nodes`, other node labels in `others`, event rows in `events`.
/// Duplicates from join fan-out are collapsed by id.
///

#[derive(Debug, Default)]
pub struct QueryResult {
    pub nodes: Vec<NodeEntity>,
    pub others: BTreeMap<String, Vec<NodeEntity>>,
    pub events: Vec<EventEntity>,
    pub size: Option<QuerySize>,
}

impl QueryResult {
    #[must_use]
    pub fn first(&self) -> Option<&NodeEntity> {
        self.nodes.first()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.others.is_empty() && self.events.is_empty()
    }
}

/// Execute a compiled plan: count first when paged, skip the fetch
/// entirely on zero, then demultiplex result rows back into entities.
pub fn run<E: SqlExecutor>(
    convert: &RdbConvert<'_>,
    plan: &QueryPlan,
    backend: &mut E,
) -> Result<QueryResult, Error> {
    let mut size = None;
    if plan.page.is_some() {
        let count_plan = plan.count_plan();
        let count = backend.count(count_plan.main_fragment())?;
        if count == 0 {
            return Ok(QueryResult {
                size: Some(QuerySize { count: 0, current: 0 }),
                ..QueryResult::default()
            });
        }
        size = Some(QuerySize { count, current: 0 });
    }

    // only_main drops every joined fragment before the fetch; the
    // main fragment's params and exists filters still apply
    let effective;
    let plan = if plan.only_main {
        let mut main = plan.fragments[plan.main].clone();
        main.join = None;
        effective = QueryPlan {
            fragments: vec![main],
            main: 0,
            only_main: true,
            orders: plan.orders.clone(),
            page: plan.page,
            lock: plan.lock,
        };
        &effective
    } else {
        plan
    };

    let rows = backend.query(plan)?;
    let mut result = QueryResult {
        size,
        ..QueryResult::default()
    };
    let mut seen: BTreeSet<(usize, String)> = BTreeSet::new();

    for row in &rows {
        for (index, fragment) in plan.fragments.iter().enumerate() {
            if !fragment.projected {
                continue;
            }
            let Some(id) = row_id(row, fragment) else {
                continue;
            };
            if !seen.insert((index, id)) {
                continue;
            }
            decode(convert, fragment, row, index == plan.main, &mut result)?;
        }
    }

    if let Some(size) = &mut result.size {
        size.current = result.nodes.len() as u64;
    }
    Ok(result)
}

fn row_id(row: &Row, fragment: &Fragment) -> Option<String> {
    row.get(&fragment.id_alias)
        .filter(|v| !v.is_null())
        .and_then(Value::as_text)
        .map(ToString::to_string)
}

fn decode(
    convert: &RdbConvert<'_>,
    fragment: &Fragment,
    row: &Row,
    main: bool,
    result: &mut QueryResult,
) -> Result<(), Error> {
    let fields = row_fields(convert, fragment, row)?;
    match &fragment.kind {
        FragmentKind::Node => {
            let node = convert.fields_to_node(&fragment.sd, &fields)?;
            if main {
                result.nodes.push(node);
            } else {
                result
                    .others
                    .entry(fragment.label.clone())
                    .or_default()
                    .push(node);
            }
        }
        FragmentKind::Event { left, right } => {
            let event = convert.fields_to_event(&fragment.sd, left, right, &fields)?;
            result.events.push(event);
        }
    }
    Ok(())
}

/// Strip the row back from column aliases to field names through the
/// fragment's alias map and the table's field map.
fn row_fields(
    convert: &RdbConvert<'_>,
    fragment: &Fragment,
    row: &Row,
) -> Result<BTreeMap<String, Value>, Error> {
    let mapped = match &fragment.kind {
        FragmentKind::Node => convert.mapping().node_table(&fragment.sd),
        FragmentKind::Event { left, right } => {
            convert.mapping().event_table(&fragment.sd, left, right)
        }
    }
    .ok_or_else(|| ConvertError::UnmappedType {
        def: fragment.sd.clone(),
    })?;

    let mut fields = BTreeMap::new();
    for (alias, column) in fragment.columns.iter() {
        if let Some(value) = row.get(alias)
            && let Some(field) = mapped.field(column)
        {
            fields.insert(field.to_string(), value.clone());
        }
    }
    Ok(fields)
}
