//! Shared fixtures: a small social schema plus an in-memory SQL
//! executor good enough to evaluate compiled plans in tests.

use crate::{
    backend::{ColumnValue, FileRef, InsertParam, Row, SqlExecutor, UpdateParam},
    convert::compare_values,
    error::{BackendError, IdError},
    id::AreaProvider,
    query::fragment::{Comparator, ExistsFilter, Fragment, Param, QueryPlan},
    schema::{PrefixNaming, RdbMapping, SchemaCompiler},
};
use std::collections::BTreeMap;
use vinedb_schema::{
    event::EventDef,
    node::NodeDef,
    property::{PropertyDef, RuleGroup, RuleKind, ValidRule},
    registry::Registry,
    types::{BaseType, RequiredPolicy, Value},
};

/// Physical row: column name -> value.
pub type PhysicalRow = BTreeMap<String, Value>;

pub const ID_COLUMN: &str = "A_ID";

/// Fixture schema:
/// - `User` with a unique indexed nickname, bounded age, rule-checked
///   email.
/// - `UserGroup` with a unique name.
/// - `HAVE` (UserGroup -> User), group membership, nothing required.
/// - `OWN` (User -> Badge), a badge must always have its owner.
/// - `Badge` whose unique index includes a chain reference to the
///   owning user, yielding a redundancy column.
pub fn fixture_registry() -> Registry {
    let user = NodeDef::new("User", "User")
        .prop(
            "nickname",
            PropertyDef::new("nickname", BaseType::String)
                .required()
                .indexed(),
        )
        .prop(
            "email",
            PropertyDef::new("email", BaseType::String).rule_group(RuleGroup::new(vec![
                ValidRule::new(RuleKind::Contains("@".into()), "email must contain @"),
                ValidRule::new(RuleKind::MinLength(3), "email too short"),
            ])),
        )
        .prop(
            "age",
            PropertyDef::new("age", BaseType::Integer).bounds(0, 200),
        )
        .unique("nickname")
        .display_prop("nickname");

    let group = NodeDef::new("UserGroup", "User group")
        .prop("name", PropertyDef::new("name", BaseType::String).required())
        .unique("name")
        .display_prop("name");

    let badge = NodeDef::new("Badge", "Badge")
        .prop("title", PropertyDef::new("title", BaseType::String).required())
        .unique("title")
        .unique("Badge<OWN-User.__id")
        .display_prop("title");

    let have = EventDef::new("HAVE", "group membership", "UserGroup", "User");
    let own = EventDef::new("OWN", "badge ownership", "User", "Badge")
        .required(RequiredPolicy::Right);

    Registry::new(vec![user, group, badge], vec![have, own]).unwrap()
}

pub fn fixture_mapping(registry: &Registry) -> RdbMapping {
    SchemaCompiler::new(registry, PrefixNaming::default())
        .generate_mapping()
        .unwrap()
}

///
/// SeqAreas
///

pub struct SeqAreas(pub u64);

impl AreaProvider for SeqAreas {
    fn next_area(&mut self) -> Result<u64, IdError> {
        self.0 += 1;
        Ok(self.0)
    }
}

///
/// MemoryBackend
///
/// Evaluates compiled plans against in-memory tables with nested-loop
/// joins and recursive exists checks. Keys rows by the id column of
/// the default naming scheme.
///

#[derive(Debug, Default)]
pub struct MemoryBackend {
    pub tables: BTreeMap<String, Vec<PhysicalRow>>,
    pub insert_count: u64,
    pub update_count: u64,
    pub delete_count: u64,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self, table: &str) -> &[PhysicalRow] {
        self.tables.get(table).map_or(&[], Vec::as_slice)
    }

    pub fn row_by_id(&self, table: &str, id: &str) -> Option<&PhysicalRow> {
        self.rows(table)
            .iter()
            .find(|r| r.get(ID_COLUMN).and_then(Value::as_text) == Some(id))
    }

    fn param_holds(row: &PhysicalRow, param: &Param) -> bool {
        let Some(actual) = row.get(&param.column) else {
            return false;
        };
        match param.cmp {
            Comparator::Eq => actual == &param.value,
            Comparator::Ne => actual != &param.value,
            Comparator::Lt => matches!(
                compare_values(actual, &param.value),
                Some(std::cmp::Ordering::Less)
            ),
            Comparator::Le => matches!(
                compare_values(actual, &param.value),
                Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)
            ),
            Comparator::Gt => matches!(
                compare_values(actual, &param.value),
                Some(std::cmp::Ordering::Greater)
            ),
            Comparator::Ge => matches!(
                compare_values(actual, &param.value),
                Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)
            ),
            Comparator::Like => match (actual, &param.value) {
                (Value::Text(s), Value::Text(pattern)) => like_match(s, pattern),
                _ => false,
            },
        }
    }

    fn exists_holds(&self, filter: &ExistsFilter, outer: &BTreeMap<String, &PhysicalRow>) -> bool {
        self.rows(&filter.table).iter().any(|row| {
            let anchored = filter.on.iter().all(|(own, alias, outer_col)| {
                outer
                    .get(alias)
                    .and_then(|r| r.get(outer_col))
                    .is_some_and(|v| row.get(own) == Some(v))
            });
            if !anchored {
                return false;
            }
            if !filter.params.iter().all(|p| Self::param_holds(row, p)) {
                return false;
            }
            let mut scope = outer.clone();
            scope.insert(filter.alias.clone(), row);
            filter.children.iter().all(|c| self.exists_holds(c, &scope))
        })
    }

    fn fragment_candidates<'a>(
        &'a self,
        fragment: &Fragment,
        scope: &BTreeMap<String, &'a PhysicalRow>,
    ) -> Vec<&'a PhysicalRow> {
        self.rows(&fragment.table)
            .iter()
            .filter(|row| fragment.params.iter().all(|p| Self::param_holds(row, p)))
            .filter(|row| {
                let mut inner = scope.clone();
                inner.insert(fragment.alias.clone(), row);
                fragment.exists.iter().all(|e| self.exists_holds(e, &inner))
            })
            .filter(|row| {
                fragment.join.as_ref().is_none_or(|join| {
                    join.on.iter().all(|(own, target_col)| {
                        scope
                            .get(&join.target_alias)
                            .and_then(|r| r.get(target_col))
                            .is_some_and(|v| row.get(own) == Some(v))
                    })
                })
            })
            .collect()
    }

    fn assemble<'a>(
        &'a self,
        plan: &QueryPlan,
        index: usize,
        scope: &mut BTreeMap<String, &'a PhysicalRow>,
        out: &mut Vec<Row>,
    ) {
        if index == plan.fragments.len() {
            let mut row = Row::new();
            for fragment in &plan.fragments {
                if let Some(physical) = scope.get(&fragment.alias) {
                    for (alias, column) in fragment.columns.iter() {
                        row.insert(
                            alias.clone(),
                            physical.get(column).cloned().unwrap_or(Value::Null),
                        );
                    }
                }
            }
            out.push(row);
            return;
        }
        let fragment = &plan.fragments[index];
        // clone keeps the borrow local to this depth
        let candidates = self.fragment_candidates(fragment, &scope.clone());
        for candidate in candidates {
            scope.insert(fragment.alias.clone(), candidate);
            self.assemble(plan, index + 1, scope, out);
            scope.remove(&fragment.alias);
        }
    }
}

fn like_match(s: &str, pattern: &str) -> bool {
    let inner = pattern.trim_matches('%');
    match (pattern.starts_with('%'), pattern.ends_with('%')) {
        (true, true) => s.contains(inner),
        (true, false) => s.ends_with(inner),
        (false, true) => s.starts_with(inner),
        (false, false) => s == inner,
    }
}

fn store_value(value: &ColumnValue) -> Value {
    match value {
        ColumnValue::Value(v) => v.clone(),
        ColumnValue::Stream(file) => Value::Text(format!("blob:{}", file.name)),
    }
}

impl SqlExecutor for MemoryBackend {
    fn insert(&mut self, param: &InsertParam) -> Result<u64, BackendError> {
        let mut row = PhysicalRow::new();
        for (column, value) in &param.values {
            row.insert(column.clone(), store_value(value));
        }
        self.tables.entry(param.table.clone()).or_default().push(row);
        self.insert_count += 1;
        Ok(1)
    }

    fn update(&mut self, param: &UpdateParam) -> Result<u64, BackendError> {
        let rows = self.tables.entry(param.table.clone()).or_default();
        let mut touched = 0;
        for row in rows.iter_mut() {
            if row.get(&param.id_column).and_then(Value::as_text) != Some(&param.id) {
                continue;
            }
            if let Some((column, expected)) = &param.lock
                && row.get(column) != Some(expected)
            {
                continue;
            }
            for (column, value) in &param.values {
                row.insert(column.clone(), store_value(value));
            }
            touched += 1;
        }
        self.update_count += touched;
        Ok(touched)
    }

    fn delete(&mut self, table: &str, matches: &[(String, Value)]) -> Result<u64, BackendError> {
        let rows = self.tables.entry(table.to_string()).or_default();
        let before = rows.len();
        rows.retain(|row| !matches.iter().all(|(c, v)| row.get(c) == Some(v)));
        let removed = (before - rows.len()) as u64;
        self.delete_count += removed;
        Ok(removed)
    }

    fn delete_all(&mut self, table: &str) -> Result<u64, BackendError> {
        let removed = self.tables.remove(table).map_or(0, |r| r.len() as u64);
        self.delete_count += removed;
        Ok(removed)
    }

    fn query(&mut self, plan: &QueryPlan) -> Result<Vec<Row>, BackendError> {
        let effective = if plan.only_main {
            plan.count_plan()
        } else {
            plan.clone()
        };
        let mut out = Vec::new();
        let mut scope = BTreeMap::new();
        self.assemble(&effective, 0, &mut scope, &mut out);

        // order and page on the main fragment's aliases
        for order in plan.orders.iter().rev() {
            out.sort_by(|a, b| {
                let (x, y) = (a.get(&order.alias), b.get(&order.alias));
                let ord = match (x, y) {
                    (Some(x), Some(y)) => {
                        compare_values(x, y).unwrap_or(std::cmp::Ordering::Equal)
                    }
                    _ => std::cmp::Ordering::Equal,
                };
                if order.desc { ord.reverse() } else { ord }
            });
        }
        if let Some(page) = plan.page {
            let start = ((page.number.saturating_sub(1)) * page.size) as usize;
            out = out.into_iter().skip(start).take(page.size as usize).collect();
        }

        Ok(out)
    }

    fn count(&mut self, fragment: &Fragment) -> Result<u64, BackendError> {
        let scope = BTreeMap::new();
        let mut bare = fragment.clone();
        bare.join = None;
        Ok(self.fragment_candidates(&bare, &scope).len() as u64)
    }

    fn read_blob(
        &mut self,
        table: &str,
        column: &str,
        id_column: &str,
        id: &str,
    ) -> Result<Option<Vec<u8>>, BackendError> {
        Ok(self
            .rows(table)
            .iter()
            .find(|r| r.get(id_column).and_then(Value::as_text) == Some(id))
            .and_then(|r| r.get(column))
            .and_then(Value::as_text)
            .map(|s| s.as_bytes().to_vec()))
    }
}

/// Convenience file array for binary tests.
pub fn fixture_files() -> Vec<FileRef> {
    vec![FileRef {
        name: "avatar.png".to_string(),
        path: "/tmp/avatar.png".to_string(),
        size: 4,
    }]
}
