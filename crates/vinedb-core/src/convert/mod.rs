#[cfg(test)]
mod tests;

use crate::{
    backend::{ColumnValue, FileRef, InsertParam, UpdateParam},
    entity::{EventEntity, NodeEntity},
    error::ConvertError,
    schema::mapping::{MappedTable, RdbMapping},
};
use std::collections::BTreeMap;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use vinedb_schema::{
    node::NodeDef,
    property::{ChainRef, DefaultValue, PropertyDef},
    registry::Registry,
    types::{BaseType, Value},
};

/// Current wall-clock time in epoch milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

///
/// TimestampConvert
///
/// Vendor timestamp decoding seam. Drivers that hand timestamps back
/// as driver-specific text plug in here; the engine only ever sees
/// epoch milliseconds.
///

pub trait TimestampConvert {
    fn decode(&self, value: &Value) -> Result<i64, ConvertError>;

    fn encode(&self, millis: i64) -> Value {
        Value::Datetime(millis)
    }
}

///
/// EpochMillis
///
/// Default decoder: epoch-millisecond integers pass through, RFC 3339
/// text is parsed.
///

#[derive(Clone, Copy, Debug, Default)]
pub struct EpochMillis;

impl TimestampConvert for EpochMillis {
    fn decode(&self, value: &Value) -> Result<i64, ConvertError> {
        match value {
            Value::Datetime(ms) | Value::Integer(ms) => Ok(*ms),
            Value::Text(s) => OffsetDateTime::parse(s, &Rfc3339)
                .map(|t| (t.unix_timestamp_nanos() / 1_000_000) as i64)
                .map_err(|e| ConvertError::Timestamp {
                    detail: format!("{s}: {e}"),
                }),
            other => Err(ConvertError::Timestamp {
                detail: format!("unexpected value: {other:?}"),
            }),
        }
    }
}

///
/// RdbConvert
///
/// Bidirectional entity <-> row translation plus insert/update
/// parameter assembly, all through the schema's field->column map.
/// Binary properties are excluded from general projection and from
/// filters; they only appear as stream substitutions during parameter
/// binding.
///

pub struct RdbConvert<'a> {
    registry: &'a Registry,
    mapping: &'a RdbMapping,
    timestamp: Box<dyn TimestampConvert>,
}

impl<'a> RdbConvert<'a> {
    #[must_use]
    pub fn new(registry: &'a Registry, mapping: &'a RdbMapping) -> Self {
        Self {
            registry,
            mapping,
            timestamp: Box::new(EpochMillis),
        }
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: Box<dyn TimestampConvert>) -> Self {
        self.timestamp = timestamp;
        self
    }

    #[must_use]
    pub const fn registry(&self) -> &'a Registry {
        self.registry
    }

    #[must_use]
    pub const fn mapping(&self) -> &'a RdbMapping {
        self.mapping
    }

    // ─────────────────────────────────────────────────────────────
    // row -> entity
    // ─────────────────────────────────────────────────────────────

    /// Build a node entity from field-keyed values (aliases already
    /// stripped by the query runner).
    pub fn fields_to_node(
        &self,
        sd: &str,
        fields: &BTreeMap<String, Value>,
    ) -> Result<NodeEntity, ConvertError> {
        let def = self
            .registry
            .node(sd)
            .ok_or_else(|| ConvertError::UnmappedType { def: sd.to_string() })?;

        let mut node = NodeEntity::new(sd);
        node.id = text_field(fields, "__id");
        node.uuid = text_field(fields, "__uuid");
        node.create_time = self.time_field(fields, "__createTime")?;
        node.update_time = self.time_field(fields, "__updateTime")?;

        for (ident, prop) in &def.props {
            if prop.base == BaseType::Binary {
                continue;
            }
            if let Some(value) = fields.get(ident)
                && !value.is_null()
            {
                let coerced = self.coerce(sd, ident, prop, value)?;
                node.props.insert(ident.clone(), coerced);
            }
        }
        if let Some(field) = redundancy_field(def)
            && let Some(value) = fields.get(&field)
            && !value.is_null()
        {
            node.props.insert(field, value.clone());
        }

        Ok(node)
    }

    pub fn fields_to_event(
        &self,
        sd: &str,
        left_sd: &str,
        right_sd: &str,
        fields: &BTreeMap<String, Value>,
    ) -> Result<EventEntity, ConvertError> {
        let def = self
            .registry
            .event(sd, left_sd, right_sd)
            .ok_or_else(|| ConvertError::UnmappedType { def: sd.to_string() })?;

        let mut event = EventEntity::new(
            sd,
            (left_sd, text_field(fields, "__left")),
            (right_sd, text_field(fields, "__right")),
        );
        event.id = text_field(fields, "__id");
        event.uuid = text_field(fields, "__uuid");
        event.create_time = self.time_field(fields, "__createTime")?;
        event.update_time = self.time_field(fields, "__updateTime")?;

        for (ident, prop) in &def.props {
            if prop.base == BaseType::Binary {
                continue;
            }
            if let Some(value) = fields.get(ident)
                && !value.is_null()
            {
                let coerced = self.coerce(sd, ident, prop, value)?;
                event.props.insert(ident.clone(), coerced);
            }
        }

        Ok(event)
    }

    // ─────────────────────────────────────────────────────────────
    // entity -> params
    // ─────────────────────────────────────────────────────────────

    pub fn node_insert_param(
        &self,
        node: &NodeEntity,
        files: &[FileRef],
    ) -> Result<InsertParam, ConvertError> {
        let def = self
            .registry
            .node(&node.sd)
            .ok_or_else(|| ConvertError::UnmappedType { def: node.sd.clone() })?;
        let mapped = self.node_mapped(&node.sd)?;

        let mut values = self.identity_values(mapped, &node.sd, &node.id, &node.uuid)?;
        values.push((
            self.column_of(mapped, &node.sd, "__createTime")?,
            ColumnValue::Value(self.timestamp.encode(node.create_time.unwrap_or_default())),
        ));
        values.push((
            self.column_of(mapped, &node.sd, "__updateTime")?,
            ColumnValue::Value(self.timestamp.encode(node.update_time.unwrap_or_default())),
        ));

        for (ident, prop) in &def.props {
            if let Some(value) = self.prop_value(node, ident, prop, files)? {
                values.push((self.column_of(mapped, &node.sd, ident)?, value));
            }
        }
        if let Some(field) = redundancy_field(def)
            && let Some(value) = node.props.get(&field)
        {
            values.push((
                self.column_of(mapped, &node.sd, &field)?,
                ColumnValue::Value(value.clone()),
            ));
        }

        Ok(InsertParam {
            table: mapped.table.clone(),
            seq: mapped.seq.clone(),
            values,
        })
    }

    pub fn node_update_param(
        &self,
        node: &NodeEntity,
        files: &[FileRef],
    ) -> Result<UpdateParam, ConvertError> {
        let def = self
            .registry
            .node(&node.sd)
            .ok_or_else(|| ConvertError::UnmappedType { def: node.sd.clone() })?;
        let mapped = self.node_mapped(&node.sd)?;

        let mut values = vec![
            (
                self.column_of(mapped, &node.sd, "__uuid")?,
                ColumnValue::Value(Value::Text(node.uuid.clone())),
            ),
            (
                self.column_of(mapped, &node.sd, "__updateTime")?,
                ColumnValue::Value(self.timestamp.encode(node.update_time.unwrap_or_default())),
            ),
        ];

        for (ident, value) in node.populated() {
            let Some(prop) = def.get(ident) else {
                continue;
            };
            if prop.base == BaseType::Binary {
                values.push((
                    self.column_of(mapped, &node.sd, ident)?,
                    self.binary_value(ident, value, files)?,
                ));
            } else {
                values.push((
                    self.column_of(mapped, &node.sd, ident)?,
                    ColumnValue::Value(self.coerce(&node.sd, ident, prop, value)?),
                ));
            }
        }
        if let Some(field) = redundancy_field(def)
            && let Some(value) = node.props.get(&field)
        {
            values.push((
                self.column_of(mapped, &node.sd, &field)?,
                ColumnValue::Value(value.clone()),
            ));
        }

        let lock = match &node.sync_lock {
            Some(lock) => Some((
                self.column_of(mapped, &node.sd, &lock.property)?,
                lock.value.clone(),
            )),
            None => None,
        };

        Ok(UpdateParam {
            table: mapped.table.clone(),
            id_column: self.column_of(mapped, &node.sd, "__id")?,
            id: node.id.clone(),
            values,
            lock,
        })
    }

    pub fn event_insert_param(
        &self,
        event: &EventEntity,
        files: &[FileRef],
    ) -> Result<InsertParam, ConvertError> {
        let def = self
            .registry
            .event(&event.sd, &event.left_sd, &event.right_sd)
            .ok_or_else(|| ConvertError::UnmappedType { def: event.sd.clone() })?;
        let mapped = self.event_mapped(&event.sd, &event.left_sd, &event.right_sd)?;

        let mut values = self.identity_values(mapped, &event.sd, &event.id, &event.uuid)?;
        for (field, value) in [
            ("__left", &event.left_id),
            ("__leftSd", &event.left_sd),
            ("__right", &event.right_id),
            ("__rightSd", &event.right_sd),
        ] {
            values.push((
                self.column_of(mapped, &event.sd, field)?,
                ColumnValue::Value(Value::Text(value.clone())),
            ));
        }
        values.push((
            self.column_of(mapped, &event.sd, "__createTime")?,
            ColumnValue::Value(self.timestamp.encode(event.create_time.unwrap_or_default())),
        ));
        values.push((
            self.column_of(mapped, &event.sd, "__updateTime")?,
            ColumnValue::Value(self.timestamp.encode(event.update_time.unwrap_or_default())),
        ));

        for (ident, prop) in &def.props {
            let present = event.props.get(ident).filter(|v| !v.is_null());
            let value = match (present, &prop.default) {
                (Some(v), _) => Some(v.clone()),
                (None, Some(DefaultValue::Literal(v))) => Some(v.clone()),
                _ => None,
            };
            let Some(value) = value else { continue };
            if prop.base == BaseType::Binary {
                values.push((
                    self.column_of(mapped, &event.sd, ident)?,
                    self.binary_value(ident, &value, files)?,
                ));
            } else {
                values.push((
                    self.column_of(mapped, &event.sd, ident)?,
                    ColumnValue::Value(self.coerce(&event.sd, ident, prop, &value)?),
                ));
            }
        }

        Ok(InsertParam {
            table: mapped.table.clone(),
            seq: mapped.seq.clone(),
            values,
        })
    }

    pub fn event_update_param(
        &self,
        event: &EventEntity,
        files: &[FileRef],
    ) -> Result<UpdateParam, ConvertError> {
        let def = self
            .registry
            .event(&event.sd, &event.left_sd, &event.right_sd)
            .ok_or_else(|| ConvertError::UnmappedType { def: event.sd.clone() })?;
        let mapped = self.event_mapped(&event.sd, &event.left_sd, &event.right_sd)?;

        let mut values = vec![(
            self.column_of(mapped, &event.sd, "__updateTime")?,
            ColumnValue::Value(self.timestamp.encode(event.update_time.unwrap_or_default())),
        )];
        for (ident, value) in event.props.iter().filter(|(k, v)| {
            !crate::entity::is_transient(k) && !v.is_null()
        }) {
            let Some(prop) = def.get(ident) else {
                continue;
            };
            if prop.base == BaseType::Binary {
                values.push((
                    self.column_of(mapped, &event.sd, ident)?,
                    self.binary_value(ident, value, files)?,
                ));
            } else {
                values.push((
                    self.column_of(mapped, &event.sd, ident)?,
                    ColumnValue::Value(self.coerce(&event.sd, ident, prop, value)?),
                ));
            }
        }

        Ok(UpdateParam {
            table: mapped.table.clone(),
            id_column: self.column_of(mapped, &event.sd, "__id")?,
            id: event.id.clone(),
            values,
            lock: None,
        })
    }

    // ─────────────────────────────────────────────────────────────
    // coercion
    // ─────────────────────────────────────────────────────────────

    /// Per-property coercion, shared by row decoding, parameter
    /// assembly, and filter-value translation.
    pub fn coerce(
        &self,
        def: &str,
        property: &str,
        prop: &PropertyDef,
        value: &Value,
    ) -> Result<Value, ConvertError> {
        let mismatch = |actual: &Value| ConvertError::TypeMismatch {
            def: def.to_string(),
            property: property.to_string(),
            expected: prop.base.to_string(),
            actual: format!("{actual:?}"),
        };

        match (prop.base, value) {
            (BaseType::Integer, Value::Integer(_))
            | (BaseType::Float, Value::Float(_))
            | (BaseType::Boolean, Value::Boolean(_))
            | (BaseType::String, Value::Text(_))
            | (BaseType::Datetime, Value::Datetime(_))
            | (BaseType::Binary, Value::Binary(_)) => Ok(value.clone()),

            (BaseType::Float, Value::Integer(n)) => Ok(Value::Float(*n as f64)),
            // backends commonly hand booleans back as 0/1
            (BaseType::Boolean, Value::Integer(0)) => Ok(Value::Boolean(false)),
            (BaseType::Boolean, Value::Integer(1)) => Ok(Value::Boolean(true)),
            (BaseType::Binary, Value::Integer(n)) if *n >= 0 => Ok(Value::Binary(*n as u64)),
            (BaseType::Datetime, v @ (Value::Integer(_) | Value::Text(_))) => {
                Ok(Value::Datetime(self.timestamp.decode(v)?))
            }

            (_, actual) => Err(mismatch(actual)),
        }
    }

    // ─────────────────────────────────────────────────────────────
    // internals
    // ─────────────────────────────────────────────────────────────

    fn node_mapped(&self, sd: &str) -> Result<&MappedTable, ConvertError> {
        self.mapping
            .node_table(sd)
            .ok_or_else(|| ConvertError::UnmappedType { def: sd.to_string() })
    }

    fn event_mapped(
        &self,
        sd: &str,
        left: &str,
        right: &str,
    ) -> Result<&MappedTable, ConvertError> {
        self.mapping
            .event_table(sd, left, right)
            .ok_or_else(|| ConvertError::UnmappedType { def: sd.to_string() })
    }

    pub(crate) fn column_of(
        &self,
        mapped: &MappedTable,
        def: &str,
        field: &str,
    ) -> Result<String, ConvertError> {
        mapped
            .column(field)
            .map(ToString::to_string)
            .ok_or_else(|| ConvertError::UnknownField {
                def: def.to_string(),
                field: field.to_string(),
            })
    }

    fn identity_values(
        &self,
        mapped: &MappedTable,
        sd: &str,
        id: &str,
        uuid: &str,
    ) -> Result<Vec<(String, ColumnValue)>, ConvertError> {
        Ok(vec![
            (
                self.column_of(mapped, sd, "__id")?,
                ColumnValue::Value(Value::Text(id.to_string())),
            ),
            (
                self.column_of(mapped, sd, "__uuid")?,
                ColumnValue::Value(Value::Text(uuid.to_string())),
            ),
            (
                self.column_of(mapped, sd, "__sd")?,
                ColumnValue::Value(Value::Text(sd.to_string())),
            ),
        ])
    }

    /// Value for one property at insert: populated value, or literal
    /// default when absent. Chain-reference defaults are resolved by
    /// the save orchestrator before this point.
    fn prop_value(
        &self,
        node: &NodeEntity,
        ident: &str,
        prop: &PropertyDef,
        files: &[FileRef],
    ) -> Result<Option<ColumnValue>, ConvertError> {
        let present = node.props.get(ident).filter(|v| !v.is_null());
        let value = match (present, &prop.default) {
            (Some(v), _) => v.clone(),
            (None, Some(DefaultValue::Literal(v))) => v.clone(),
            _ => return Ok(None),
        };
        if prop.base == BaseType::Binary {
            return Ok(Some(self.binary_value(ident, &value, files)?));
        }
        Ok(Some(ColumnValue::Value(self.coerce(
            &node.sd, ident, prop, &value,
        )?)))
    }

    /// Binary payload: file-array index -> stream reference.
    fn binary_value(
        &self,
        property: &str,
        value: &Value,
        files: &[FileRef],
    ) -> Result<ColumnValue, ConvertError> {
        let index = match value {
            Value::Binary(ix) => *ix,
            Value::Integer(n) if *n >= 0 => *n as u64,
            other => {
                return Err(ConvertError::TypeMismatch {
                    def: String::new(),
                    property: property.to_string(),
                    expected: BaseType::Binary.to_string(),
                    actual: format!("{other:?}"),
                });
            }
        };
        let file = files
            .get(index as usize)
            .ok_or(ConvertError::MissingFile {
                property: property.to_string(),
                index,
            })?;
        Ok(ColumnValue::Stream(file.clone()))
    }

    fn time_field(
        &self,
        fields: &BTreeMap<String, Value>,
        field: &str,
    ) -> Result<Option<i64>, ConvertError> {
        match fields.get(field) {
            Some(v) if !v.is_null() => Ok(Some(self.timestamp.decode(v)?)),
            _ => Ok(None),
        }
    }
}

/// The synthetic redundancy field a def carries, if any.
#[must_use]
pub fn redundancy_field(def: &NodeDef) -> Option<String> {
    def.unique_index
        .iter()
        .find_map(|entry| ChainRef::parse(entry))
        .map(|r| r.redundancy_property())
}

/// Ordering between two values of compatible shapes; `None` when the
/// shapes cannot be compared. Used by range checks and filter
/// evaluation.
#[must_use]
pub fn compare_values(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) | (Value::Datetime(x), Value::Datetime(y)) => {
            Some(x.cmp(y))
        }
        (Value::Integer(x), Value::Datetime(y)) | (Value::Datetime(x), Value::Integer(y)) => {
            Some(x.cmp(y))
        }
        (Value::Float(x), Value::Float(y)) => x.partial_cmp(y),
        (Value::Float(x), Value::Integer(y)) => x.partial_cmp(&(*y as f64)),
        (Value::Integer(x), Value::Float(y)) => (*x as f64).partial_cmp(y),
        (Value::Text(x), Value::Text(y)) => Some(x.cmp(y)),
        (Value::Boolean(x), Value::Boolean(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn text_field(fields: &BTreeMap<String, Value>, field: &str) -> String {
    fields
        .get(field)
        .and_then(Value::as_text)
        .unwrap_or_default()
        .to_string()
}
