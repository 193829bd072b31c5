
use crate::{
    backend::SqlExecutor,
    convert::{RdbConvert, compare_values},
    entity::{EventEntity, NodeEntity, Operate},
    error::ValidationError,
    id,
    query::fragment::{AliasMap, Comparator, Fragment, FragmentKind, Param},
};
use std::collections::BTreeMap;
use vinedb_schema::{
    node::NodeDef,
    property::{DefaultValue, PropertyDef},
    types::{BaseType, Value},
};

///
/// Validator
///
/// Per-verb checks ahead of persistence:
///
/// | verb   | checks |
/// |--------|--------|
/// | create | full required/range/type/rule over all properties, uniqueness against storage |
/// | update | present non-null values only, record existence, uniqueness excluding own id |
/// | delete | id well-formedness only |
/// | other  | full check, no persistence queries |
///
/// Event creation additionally requires both endpoint ids to resolve
/// to stored node rows.
///

pub struct Validator<'a> {
    convert: &'a RdbConvert<'a>,
}

impl<'a> Validator<'a> {
    #[must_use]
    pub const fn new(convert: &'a RdbConvert<'a>) -> Self {
        Self { convert }
    }

    pub fn validate_node<E: SqlExecutor>(
        &self,
        verb: Operate,
        node: &NodeEntity,
        backend: &mut E,
    ) -> Result<(), ValidationError> {
        let def = self
            .convert
            .registry()
            .node(&node.sd)
            .ok_or_else(|| ValidationError::UndefinedType { name: node.sd.clone() })?;

        match verb {
            Operate::Delete => check_id(&node.id),
            Operate::Create => {
                self.check_all_props(&def.title, &def.props, &node.props)?;
                self.check_unique(def, node, backend, None)
            }
            Operate::Update => {
                check_id(&node.id)?;
                if !exists_by_id(backend, self.convert, &node.sd, &node.id)? {
                    return Err(ValidationError::Missing {
                        def: def.title.clone(),
                        id: node.id.clone(),
                    });
                }
                self.check_present_props(&def.title, &def.props, &node.props)?;
                self.check_unique(def, node, backend, Some(&node.id))
            }
            Operate::Query | Operate::Match | Operate::CreateOrUpdate => {
                self.check_all_props(&def.title, &def.props, &node.props)
            }
        }
    }

    pub fn validate_event<E: SqlExecutor>(
        &self,
        verb: Operate,
        event: &EventEntity,
        backend: &mut E,
    ) -> Result<(), ValidationError> {
        let def = self
            .convert
            .registry()
            .event(&event.sd, &event.left_sd, &event.right_sd)
            .ok_or_else(|| ValidationError::UndefinedType {
                name: format!("{}({}->{})", event.sd, event.left_sd, event.right_sd),
            })?;

        match verb {
            Operate::Delete => check_id(&event.id),
            Operate::Create => {
                for (endpoint_sd, endpoint_id) in [
                    (&event.left_sd, &event.left_id),
                    (&event.right_sd, &event.right_id),
                ] {
                    check_id(endpoint_id)?;
                    if !exists_by_id(backend, self.convert, endpoint_sd, endpoint_id)? {
                        return Err(ValidationError::Missing {
                            def: self.node_title(endpoint_sd),
                            id: endpoint_id.clone(),
                        });
                    }
                }
                self.check_all_props(&def.title, &def.props, &event.props)
            }
            Operate::Update => {
                check_id(&event.id)?;
                self.check_present_props(&def.title, &def.props, &event.props)
            }
            Operate::Query | Operate::Match | Operate::CreateOrUpdate => {
                self.check_all_props(&def.title, &def.props, &event.props)
            }
        }
    }

    fn node_title(&self, sd: &str) -> String {
        self.convert
            .registry()
            .node(sd)
            .map_or_else(|| sd.to_string(), |d| d.title.clone())
    }

    // full matrix: required, with defaults standing in for absent
    // values before the required check
    fn check_all_props(
        &self,
        def_title: &str,
        props: &BTreeMap<String, PropertyDef>,
        values: &BTreeMap<String, Value>,
    ) -> Result<(), ValidationError> {
        for (ident, prop) in props {
            let present = values.get(ident).filter(|v| !v.is_null());
            let defaulted = match (&present, &prop.default) {
                (None, Some(DefaultValue::Literal(v))) => Some(v),
                _ => present,
            };
            match defaulted {
                Some(value) => check_value(def_title, prop, value)?,
                None if prop.required => {
                    return Err(ValidationError::Required {
                        def: def_title.to_string(),
                        property: prop.title.clone(),
                    });
                }
                None => {}
            }
        }
        Ok(())
    }

    // update matrix: only values the caller actually sent
    fn check_present_props(
        &self,
        def_title: &str,
        props: &BTreeMap<String, PropertyDef>,
        values: &BTreeMap<String, Value>,
    ) -> Result<(), ValidationError> {
        for (ident, value) in values {
            if value.is_null() || crate::entity::is_transient(ident) {
                continue;
            }
            if let Some(prop) = props.get(ident) {
                check_value(def_title, prop, value)?;
            }
        }
        Ok(())
    }

    /// Uniqueness is keyed on the content fingerprint: equal unique
    /// values hash to an equal uuid, so one indexed probe suffices.
    fn check_unique<E: SqlExecutor>(
        &self,
        def: &NodeDef,
        node: &NodeEntity,
        backend: &mut E,
        exclude_id: Option<&str>,
    ) -> Result<(), ValidationError> {
        if !def.has_unique_index() || node.uuid.is_empty() {
            return Ok(());
        }
        let mut fragment = probe_fragment(self.convert, &node.sd)
            .ok_or_else(|| ValidationError::UndefinedType { name: node.sd.clone() })?;
        fragment.params.push(Param {
            column: column(self.convert, &node.sd, "__uuid"),
            cmp: Comparator::Eq,
            value: Value::Text(node.uuid.clone()),
        });
        if let Some(id) = exclude_id {
            fragment.params.push(Param {
                column: column(self.convert, &node.sd, "__id"),
                cmp: Comparator::Ne,
                value: Value::Text(id.to_string()),
            });
        }
        let found = backend
            .count(&fragment)
            .map_err(|e| ValidationError::Probe {
                detail: e.to_string(),
            })?;
        if found > 0 {
            return Err(ValidationError::Unique {
                def: def.title.clone(),
                display: node.display(def),
            });
        }
        Ok(())
    }
}

fn check_value(
    def_title: &str,
    prop: &PropertyDef,
    value: &Value,
) -> Result<(), ValidationError> {
    check_type(def_title, prop, value)?;
    check_range(def_title, prop, value)?;
    check_rules(def_title, prop, value)
}

/// Id must be a real persisted id.
fn check_id(id: &str) -> Result<(), ValidationError> {
    if id::effective(id) {
        Ok(())
    } else {
        Err(ValidationError::BadId { id: id.to_string() })
    }
}

fn check_type(def_title: &str, prop: &PropertyDef, value: &Value) -> Result<(), ValidationError> {
    let ok = match prop.base {
        BaseType::Integer => matches!(value, Value::Integer(_)),
        BaseType::Float => matches!(value, Value::Float(_) | Value::Integer(_)),
        BaseType::Boolean => matches!(value, Value::Boolean(_)),
        BaseType::String => matches!(value, Value::Text(_)),
        BaseType::Datetime => matches!(value, Value::Datetime(_) | Value::Integer(_)),
        BaseType::Binary => matches!(value, Value::Binary(_) | Value::Integer(_)),
    };
    if ok {
        Ok(())
    } else {
        Err(ValidationError::Type {
            def: def_title.to_string(),
            property: prop.title.clone(),
            expected: prop.base.to_string(),
            actual: format!("{value:?}"),
        })
    }
}

/// Numeric and datetime values check against the bounds directly;
/// text and binary check length. An integer upper bound of `-1` means
/// unbounded and skips the check.
fn check_range(def_title: &str, prop: &PropertyDef, value: &Value) -> Result<(), ValidationError> {
    let fail = |detail: String| {
        Err(ValidationError::Range {
            def: def_title.to_string(),
            property: prop.title.clone(),
            detail,
        })
    };

    let measured = match (prop.base, value) {
        (BaseType::String, Value::Text(s)) => Value::Integer(s.chars().count() as i64),
        _ => value.clone(),
    };

    if let Some(lower) = &prop.lower
        && !unbounded(lower)
        && matches!(
            compare_values(&measured, lower),
            Some(std::cmp::Ordering::Less)
        )
    {
        return fail(format!("{measured} < {lower}"));
    }
    if let Some(upper) = &prop.upper
        && !unbounded(upper)
        && matches!(
            compare_values(&measured, upper),
            Some(std::cmp::Ordering::Greater)
        )
    {
        return fail(format!("{measured} > {upper}"));
    }
    Ok(())
}

/// OR-of-AND: the property passes if any group's conjunction holds;
/// otherwise every failing group's message is aggregated.
fn check_rules(def_title: &str, prop: &PropertyDef, value: &Value) -> Result<(), ValidationError> {
    if prop.rules.is_empty() {
        return Ok(());
    }
    let mut messages = Vec::new();
    for group in &prop.rules {
        match group.check(value) {
            Ok(()) => return Ok(()),
            Err(message) => messages.push(message.to_string()),
        }
    }
    Err(ValidationError::Rule {
        def: def_title.to_string(),
        property: prop.title.clone(),
        messages,
    })
}

const fn unbounded(bound: &Value) -> bool {
    matches!(bound, Value::Integer(n) if *n < 0)
}

/// Bare single-table probe fragment for existence/uniqueness checks.
pub(crate) fn probe_fragment(convert: &RdbConvert<'_>, sd: &str) -> Option<Fragment> {
    let mapped = convert.mapping().node_table(sd)?;
    let mut columns = AliasMap::default();
    let id_column = mapped.column("__id")?.to_string();
    columns.insert("C_0", &id_column).ok()?;
    Some(Fragment {
        label: sd.to_string(),
        sd: sd.to_string(),
        kind: FragmentKind::Node,
        table: mapped.table.clone(),
        alias: "T_0".to_string(),
        columns,
        projected: false,
        id_alias: "C_0".to_string(),
        left_alias: None,
        right_alias: None,
        params: Vec::new(),
        join: None,
        exists: Vec::new(),
    })
}

pub(crate) fn column(convert: &RdbConvert<'_>, sd: &str, field: &str) -> String {
    convert
        .mapping()
        .node_table(sd)
        .and_then(|m| m.column(field))
        .unwrap_or(field)
        .to_string()
}

fn exists_by_id<E: SqlExecutor>(
    backend: &mut E,
    convert: &RdbConvert<'_>,
    sd: &str,
    id: &str,
) -> Result<bool, ValidationError> {
    let mut fragment = probe_fragment(convert, sd)
        .ok_or_else(|| ValidationError::UndefinedType { name: sd.to_string() })?;
    fragment.params.push(Param {
        column: column(convert, sd, "__id"),
        cmp: Comparator::Eq,
        value: Value::Text(id.to_string()),
    });
    backend
        .count(&fragment)
        .map(|n| n > 0)
        .map_err(|e| ValidationError::Probe {
            detail: e.to_string(),
        })
}
