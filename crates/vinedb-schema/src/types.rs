use serde::{Deserialize, Serialize};
use std::fmt;

///
/// BaseType
///
/// The storable value kinds a property may declare.
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum BaseType {
    Integer,
    Float,
    Boolean,
    String,
    Datetime,
    Binary,
}

impl fmt::Display for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Integer => "Integer",
            Self::Float => "Float",
            Self::Boolean => "Boolean",
            Self::String => "String",
            Self::Datetime => "Datetime",
            Self::Binary => "Binary",
        };
        write!(f, "{label}")
    }
}

///
/// Value
///
/// Runtime property value. `Datetime` is epoch milliseconds; `Binary`
/// is an index into the per-call file array, never raw bytes.
///

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum Value {
    Null,
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Text(String),
    Datetime(i64),
    Binary(u64),
    List(Vec<Value>),
}

impl Value {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The base type this value would satisfy, if any.
    #[must_use]
    pub const fn base_type(&self) -> Option<BaseType> {
        match self {
            Self::Integer(_) => Some(BaseType::Integer),
            Self::Float(_) => Some(BaseType::Float),
            Self::Boolean(_) => Some(BaseType::Boolean),
            Self::Text(_) => Some(BaseType::String),
            Self::Datetime(_) => Some(BaseType::Datetime),
            Self::Binary(_) => Some(BaseType::Binary),
            Self::Null | Self::List(_) => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Canonical textual form used for fingerprint input.
    #[must_use]
    pub fn canonical(&self) -> String {
        match self {
            Self::Null => "\u{0}".to_string(),
            Self::Integer(n) => n.to_string(),
            Self::Float(f) => format!("{f:?}"),
            Self::Boolean(b) => b.to_string(),
            Self::Text(s) => s.clone(),
            Self::Datetime(ms) => format!("@{ms}"),
            Self::Binary(ix) => format!("#{ix}"),
            Self::List(items) => items
                .iter()
                .map(Self::canonical)
                .collect::<Vec<_>>()
                .join("\u{1f}"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            other => write!(f, "{}", other.canonical()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

///
/// RequiredPolicy
///
/// Which endpoint(s) of an event must always have a counterpart: a
/// required endpoint cannot exist without the event, so deleting its
/// counterpart cascades onto it (or aborts without force).
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum RequiredPolicy {
    #[default]
    None,
    Left,
    Right,
    Both,
}

impl RequiredPolicy {
    #[must_use]
    pub const fn left_required(self) -> bool {
        matches!(self, Self::Left | Self::Both)
    }

    #[must_use]
    pub const fn right_required(self) -> bool {
        matches!(self, Self::Right | Self::Both)
    }

    #[must_use]
    pub const fn any(self) -> bool {
        !matches!(self, Self::None)
    }
}
