use std::fmt;

use serde::Serialize;

use crate::schema::FieldKind;

/// A single decoded (or to-be-encoded) field value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    U32(u32),
    F32(f32),
}

impl Value {
    /// Wire type of this value.
    pub fn kind(&self) -> FieldKind {
        match self {
            Value::Bool(_) => FieldKind::Bool,
            Value::U32(_) => FieldKind::U32,
            Value::F32(_) => FieldKind::F32,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Value::Bool(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match *self {
            Value::U32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match *self {
            Value::F32(v) => Some(v),
            _ => None,
        }
    }

    /// The all-zero value for a field type.
    pub fn zero(kind: FieldKind) -> Self {
        match kind {
            FieldKind::Bool => Value::Bool(false),
            FieldKind::U32 => Value::U32(0),
            FieldKind::F32 => Value::F32(0.0),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::U32(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::F32(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{}", u8::from(*v)),
            Value::U32(v) => write!(f, "{v}"),
            Value::F32(v) => write!(f, "{v:.3}"),
        }
    }
}
