//! Shared wire-level types.

use std::collections::HashMap;

pub type ObjectId = u64;
pub type ReferenceTypeId = u64;
pub type MethodId = u64;
pub type FieldId = u64;
pub type FrameId = u64;
pub type ThreadId = u64;

/// Identifier byte-widths negotiated per connection via
/// `VirtualMachine.IDSizes`. Written exactly once right after the handshake
/// and read-only for the life of the connection; every id-typed or tagged
/// decode depends on it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IdSizes {
    pub field_id: usize,
    pub method_id: usize,
    pub object_id: usize,
    pub reference_type_id: usize,
    pub frame_id: usize,
}

impl Default for IdSizes {
    fn default() -> Self {
        // Modern JVMs negotiate 8-byte ids across the board.
        Self {
            field_id: 8,
            method_id: 8,
            object_id: 8,
            reference_type_id: 8,
            frame_id: 8,
        }
    }
}

/// A code location: fixed composite of type tag, class id, method id, and
/// a u64 code index.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Location {
    pub type_tag: u8,
    pub class_id: ReferenceTypeId,
    pub method_id: MethodId,
    pub index: u64,
}

/// Named fields of a decoded request, reply, group, or select alternative.
pub type Record = HashMap<String, Value>;

/// A decoded wire value. The shape mirrors the schema's `Argument` tree:
/// scalar arguments decode to scalar variants, `Repeat` to [`Value::List`],
/// `Group` and `Select` alternatives to [`Value::Record`].
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Byte(u8),
    Boolean(bool),
    Short(i16),
    Char(u16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    /// An identifier of negotiated width (object, class, method, ...).
    Id(u64),
    String(String),
    Void,
    /// A type-tagged value: one tag byte plus a tag-determined payload.
    Tagged { tag: u8, value: Box<Value> },
    /// A tagged object reference: tag byte plus objectID.
    Object { tag: u8, id: ObjectId },
    Location(Location),
    List(Vec<Value>),
    Record(Record),
    /// A uniform typed sequence: tag byte, count, then `count` values.
    Sequence { tag: u8, values: Vec<Value> },
}

impl Value {
    /// Numeric view used to match `Select` discriminants.
    pub fn as_discriminant(&self) -> Option<i64> {
        match *self {
            Value::Byte(v) => Some(v as i64),
            Value::Boolean(v) => Some(v as i64),
            Value::Short(v) => Some(v as i64),
            Value::Char(v) => Some(v as i64),
            Value::Int(v) => Some(v as i64),
            Value::Long(v) => Some(v),
            Value::Id(v) => Some(v as i64),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(record) => Some(record),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}
