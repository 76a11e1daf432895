//! Scalar values held by the preference store.
//!
//! A preference is exactly one of five kinds. `PrefValue` is the tagged form
//! kept in memory and written to backends; `Scalar` maps plain Rust types onto
//! a kind so typed getters can reject values of another kind.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrefKind {
    Float,
    Int,
    Long,
    Bool,
    String,
}

impl PrefKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrefKind::Float => "float",
            PrefKind::Int => "int",
            PrefKind::Long => "long",
            PrefKind::Bool => "bool",
            PrefKind::String => "string",
        }
    }
}

impl fmt::Display for PrefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrefKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "float" => Ok(PrefKind::Float),
            "int" | "integer" => Ok(PrefKind::Int),
            "long" => Ok(PrefKind::Long),
            "bool" | "boolean" => Ok(PrefKind::Bool),
            "string" | "str" => Ok(PrefKind::String),
            other => Err(format!("unknown preference kind `{other}`")),
        }
    }
}

/// A single stored preference value.
///
/// Serialized with an explicit tag (`{"type":"int","value":5}`) so that
/// int/long/float survive a trip through JSON without being conflated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum PrefValue {
    Float(f32),
    Int(i32),
    Long(i64),
    Bool(bool),
    String(String),
}

impl PrefValue {
    pub fn kind(&self) -> PrefKind {
        match self {
            PrefValue::Float(_) => PrefKind::Float,
            PrefValue::Int(_) => PrefKind::Int,
            PrefValue::Long(_) => PrefKind::Long,
            PrefValue::Bool(_) => PrefKind::Bool,
            PrefValue::String(_) => PrefKind::String,
        }
    }

    /// Map an untyped JSON value onto a kind.
    ///
    /// Integers become `Int` when they fit in 32 bits and `Long` otherwise;
    /// remaining numbers become `Float`. Returns `None` for null, arrays,
    /// objects and numbers no kind can hold.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(PrefValue::Bool(*b)),
            serde_json::Value::String(s) => Some(PrefValue::String(s.clone())),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(i32::try_from(i).map(PrefValue::Int).unwrap_or(PrefValue::Long(i)))
                } else if n.is_u64() {
                    None
                } else {
                    let f = n.as_f64()? as f32;
                    f.is_finite().then_some(PrefValue::Float(f))
                }
            }
            _ => None,
        }
    }

    /// Parse textual input as the given kind.
    pub fn parse(kind: PrefKind, raw: &str) -> Result<Self, String> {
        let bad = |e: &dyn fmt::Display| format!("`{raw}` is not a valid {kind}: {e}");
        match kind {
            PrefKind::Float => raw.trim().parse().map(PrefValue::Float).map_err(|e| bad(&e)),
            PrefKind::Int => raw.trim().parse().map(PrefValue::Int).map_err(|e| bad(&e)),
            PrefKind::Long => raw.trim().parse().map(PrefValue::Long).map_err(|e| bad(&e)),
            PrefKind::Bool => raw.trim().parse().map(PrefValue::Bool).map_err(|e| bad(&e)),
            PrefKind::String => Ok(PrefValue::String(raw.to_string())),
        }
    }
}

impl fmt::Display for PrefValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrefValue::Float(v) => write!(f, "{v}"),
            PrefValue::Int(v) => write!(f, "{v}"),
            PrefValue::Long(v) => write!(f, "{v}"),
            PrefValue::Bool(v) => write!(f, "{v}"),
            PrefValue::String(v) => f.write_str(v),
        }
    }
}

/// Rust types that correspond to exactly one preference kind.
pub trait Scalar: Sized {
    const KIND: PrefKind;

    /// Extract `Self` if `value` is of this kind.
    fn from_value(value: &PrefValue) -> Option<Self>;

    fn into_value(self) -> PrefValue;
}

impl Scalar for f32 {
    const KIND: PrefKind = PrefKind::Float;

    fn from_value(value: &PrefValue) -> Option<Self> {
        match value {
            PrefValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    fn into_value(self) -> PrefValue {
        PrefValue::Float(self)
    }
}

impl Scalar for i32 {
    const KIND: PrefKind = PrefKind::Int;

    fn from_value(value: &PrefValue) -> Option<Self> {
        match value {
            PrefValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    fn into_value(self) -> PrefValue {
        PrefValue::Int(self)
    }
}

impl Scalar for i64 {
    const KIND: PrefKind = PrefKind::Long;

    fn from_value(value: &PrefValue) -> Option<Self> {
        match value {
            PrefValue::Long(v) => Some(*v),
            _ => None,
        }
    }

    fn into_value(self) -> PrefValue {
        PrefValue::Long(self)
    }
}

impl Scalar for bool {
    const KIND: PrefKind = PrefKind::Bool;

    fn from_value(value: &PrefValue) -> Option<Self> {
        match value {
            PrefValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    fn into_value(self) -> PrefValue {
        PrefValue::Bool(self)
    }
}

impl Scalar for String {
    const KIND: PrefKind = PrefKind::String;

    fn from_value(value: &PrefValue) -> Option<Self> {
        match value {
            PrefValue::String(v) => Some(v.clone()),
            _ => None,
        }
    }

    fn into_value(self) -> PrefValue {
        PrefValue::String(self)
    }
}
