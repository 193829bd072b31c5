use crate::types::{BaseType, Value};
use serde::{Deserialize, Serialize};

///
/// PropertyDef
///
/// One declared property of a node or event type. Bounds follow the
/// base type (numeric range for numbers, length for text/binary); an
/// integer upper bound of `-1` means unbounded.
///

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PropertyDef {
    pub title: String,
    pub base: BaseType,
    pub required: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<DefaultValue>,

    /// OR-of-AND rule groups; the property passes if any group holds.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<RuleGroup>,

    pub indexed: bool,
}

impl PropertyDef {
    #[must_use]
    pub fn new(title: impl Into<String>, base: BaseType) -> Self {
        Self {
            title: title.into(),
            base,
            required: false,
            lower: None,
            upper: None,
            default: None,
            rules: Vec::new(),
            indexed: false,
        }
    }

    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub const fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    #[must_use]
    pub fn bounds(mut self, lower: impl Into<Value>, upper: impl Into<Value>) -> Self {
        self.lower = Some(lower.into());
        self.upper = Some(upper.into());
        self
    }

    #[must_use]
    pub fn upper(mut self, upper: impl Into<Value>) -> Self {
        self.upper = Some(upper.into());
        self
    }

    #[must_use]
    pub fn default_value(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    #[must_use]
    pub fn rule_group(mut self, group: RuleGroup) -> Self {
        self.rules.push(group);
        self
    }

    /// Declared maximum length, when the upper bound is a non-negative
    /// integer. `-1` and absent both read as unbounded.
    #[must_use]
    pub fn max_length(&self) -> Option<i64> {
        match self.upper {
            Some(Value::Integer(n)) if n >= 0 => Some(n),
            _ => None,
        }
    }
}

///
/// DefaultValue
///
/// A default is either a literal or a reference to a property on a
/// related node reached through a chain expression; the latter can only
/// be resolved once the referenced node has a persisted identity.
///

#[derive(Clone, Debug, Deserialize, Serialize)]
pub enum DefaultValue {
    Literal(Value),
    ChainRef(ChainRef),
}

///
/// ChainRef
///
/// `<chain>.<property>`, e.g. `"User-BELONG>Dept.__id"`. Also the form
/// a unique-index entry takes when it denotes a denormalized
/// redundancy column rather than a plain property.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ChainRef {
    pub chain: String,
    pub property: String,
}

impl ChainRef {
    /// Parse an index/default entry; `None` when the entry is a plain
    /// property name.
    #[must_use]
    pub fn parse(entry: &str) -> Option<Self> {
        if !entry.contains('>') && !entry.contains('<') {
            return None;
        }
        let dot = entry.rfind('.')?;
        let (chain, property) = entry.split_at(dot);
        Some(Self {
            chain: chain.to_string(),
            property: property[1..].to_string(),
        })
    }

    /// The property name the derived redundancy column is named after.
    /// `"User-BELONG>Dept.__id"` yields `"deptId"`.
    #[must_use]
    pub fn redundancy_property(&self) -> String {
        let terminal = self
            .chain
            .rsplit(['>', '-', '<'])
            .find(|s| !s.is_empty())
            .unwrap_or(&self.chain);
        let trimmed = self.property.trim_start_matches('_');
        let mut name = String::with_capacity(terminal.len() + trimmed.len());
        let mut chars = terminal.chars();
        if let Some(first) = chars.next() {
            name.extend(first.to_lowercase());
            name.push_str(chars.as_str());
        }
        let mut prop = trimmed.chars();
        if let Some(first) = prop.next() {
            name.extend(first.to_uppercase());
            name.push_str(prop.as_str());
        }
        name
    }
}

///
/// ValidRule
///
/// One atomic validation rule plus the message reported when it fails.
///

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ValidRule {
    pub kind: RuleKind,
    pub message: String,
}

impl ValidRule {
    #[must_use]
    pub fn new(kind: RuleKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Apply this rule to a value. Rules only constrain values of the
    /// shape they understand; mismatched shapes fail.
    #[must_use]
    pub fn holds(&self, value: &Value) -> bool {
        match (&self.kind, value) {
            (RuleKind::MinLength(min), Value::Text(s)) => s.chars().count() as u64 >= *min,
            (RuleKind::MaxLength(max), Value::Text(s)) => s.chars().count() as u64 <= *max,
            (RuleKind::StartsWith(p), Value::Text(s)) => s.starts_with(p.as_str()),
            (RuleKind::EndsWith(p), Value::Text(s)) => s.ends_with(p.as_str()),
            (RuleKind::Contains(p), Value::Text(s)) => s.contains(p.as_str()),
            (RuleKind::OneOf(allowed), v) => allowed.contains(v),
            _ => false,
        }
    }
}

///
/// RuleKind
///

#[derive(Clone, Debug, Deserialize, Serialize)]
pub enum RuleKind {
    MinLength(u64),
    MaxLength(u64),
    StartsWith(String),
    EndsWith(String),
    Contains(String),
    OneOf(Vec<Value>),
}

///
/// RuleGroup
///
/// A conjunction of rules. Groups on one property are alternatives:
/// the property passes if every rule of at least one group holds.
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct RuleGroup {
    pub rules: Vec<ValidRule>,
}

impl RuleGroup {
    #[must_use]
    pub fn new(rules: Vec<ValidRule>) -> Self {
        Self { rules }
    }

    /// `Ok` when every rule holds; otherwise the first failing rule's
    /// message.
    pub fn check(&self, value: &Value) -> Result<(), &str> {
        for rule in &self.rules {
            if !rule.holds(value) {
                return Err(&rule.message);
            }
        }
        Ok(())
    }
}
