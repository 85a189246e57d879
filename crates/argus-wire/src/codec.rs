//! Binary codec for the JDWP wire format.
//!
//! Two layers live here: the big-endian cursor primitives
//! ([`JdwpReader`] / [`JdwpWriter`]) plus packet framing, and the
//! schema-driven codec that walks an [`Argument`] tree to decode or encode
//! structured [`Value`]s. Field widths for identifiers are not fixed at
//! compile time; every id-typed operation takes the per-connection
//! [`IdSizes`].

use argus_spec::Argument;
use thiserror::Error;

use crate::types::{IdSizes, Location, Record, Value};

pub const HANDSHAKE: &[u8] = b"JDWP-Handshake";
pub const HEADER_LEN: usize = 11;

/// Error-code value that marks an unsolicited event packet
/// (CommandSet 64 / Command 100, `Event.Composite`).
pub const EVENT_MAGIC: u16 = 0x4064;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("buffer underflow: need {needed} bytes at {at}, have {have}")]
    Underrun {
        needed: usize,
        at: usize,
        have: usize,
    },
    #[error("invalid id size: {0}")]
    InvalidIdSize(usize),
    #[error("invalid utf-8 string: {0}")]
    InvalidUtf8(String),
    #[error("string too large to allocate ({0} bytes)")]
    StringTooLarge(usize),
    #[error("unknown primitive type name `{0}`")]
    UnknownTypeName(String),
    #[error("unknown type tag {0:#04x}")]
    UnknownTypeTag(u8),
    #[error("select `{select}` has no alternative for discriminant {value}")]
    UnknownDiscriminant { select: String, value: i64 },
    #[error("select `{select}` discriminant did not decode to a number")]
    NonNumericDiscriminant { select: String },
    #[error("untagged value `{name}` cannot be decoded without a caller-supplied tag")]
    UntaggedValue { name: String },
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("record is missing required field `{name}`")]
    MissingField { name: String },
    #[error("field `{name}` expects {expected}")]
    Shape {
        name: String,
        expected: &'static str,
    },
    #[error("unknown primitive type name `{0}`")]
    UnknownTypeName(String),
    #[error("unknown type tag {0:#04x}")]
    UnknownTypeTag(u8),
    #[error("select `{select}` has no alternative for discriminant {value}")]
    UnknownDiscriminant { select: String, value: i64 },
}

/// Byte-width class of a primitive type name: the fixed table plus the
/// negotiated identifier widths.
enum PrimitiveKind {
    Byte,
    Boolean,
    Int,
    Long,
    Id(usize),
}

fn primitive_kind(type_name: &str, sizes: &IdSizes) -> Option<PrimitiveKind> {
    let kind = match type_name {
        "byte" => PrimitiveKind::Byte,
        "boolean" | "binary" => PrimitiveKind::Boolean,
        "int" => PrimitiveKind::Int,
        "long" => PrimitiveKind::Long,
        "object" | "objectID" | "threadID" | "threadObject" | "threadGroupID"
        | "threadGroupObject" | "stringID" | "stringObject" | "classLoaderID"
        | "classLoaderObject" | "classObjectID" | "arrayID" => {
            PrimitiveKind::Id(sizes.object_id)
        }
        "referenceType" | "referenceTypeID" | "classID" | "classType" | "classObject"
        | "interfaceID" | "interfaceType" | "arrayObject" | "arrayType" | "arrayTypeID" => {
            PrimitiveKind::Id(sizes.reference_type_id)
        }
        "method" | "methodID" => PrimitiveKind::Id(sizes.method_id),
        "field" | "fieldID" => PrimitiveKind::Id(sizes.field_id),
        "frame" | "frameID" => PrimitiveKind::Id(sizes.frame_id),
        _ => return None,
    };
    Some(kind)
}

const TAG_VOID: u8 = b'V';

fn is_object_tag(tag: u8) -> bool {
    matches!(tag, b'L' | b'[' | b's' | b't' | b'g' | b'l' | b'c')
}

/// Decodes the arguments of one request, reply, group, or alternative, in
/// schema order, into a named-field record.
pub fn decode_record(
    args: &[Argument],
    sizes: &IdSizes,
    r: &mut JdwpReader<'_>,
) -> Result<Record, DecodeError> {
    let mut record = Record::with_capacity(args.len());
    for arg in args {
        let value = decode_argument(arg, sizes, r)?;
        record.insert(arg.name().to_string(), value);
    }
    Ok(record)
}

/// Encodes a record against an argument list. Exactly the schema's fields
/// are consumed, in schema order; a missing field is an error, never padded.
pub fn encode_record(
    args: &[Argument],
    record: &Record,
    sizes: &IdSizes,
    w: &mut JdwpWriter,
) -> Result<(), EncodeError> {
    for arg in args {
        let value = record.get(arg.name()).ok_or_else(|| EncodeError::MissingField {
            name: arg.name().to_string(),
        })?;
        encode_argument(arg, value, sizes, w)?;
    }
    Ok(())
}

pub fn decode_argument(
    arg: &Argument,
    sizes: &IdSizes,
    r: &mut JdwpReader<'_>,
) -> Result<Value, DecodeError> {
    match arg {
        Argument::Primitive { type_name, .. } => match primitive_kind(type_name, sizes) {
            Some(PrimitiveKind::Byte) => Ok(Value::Byte(r.read_u8()?)),
            Some(PrimitiveKind::Boolean) => Ok(Value::Boolean(r.read_bool()?)),
            Some(PrimitiveKind::Int) => Ok(Value::Int(r.read_i32()?)),
            Some(PrimitiveKind::Long) => Ok(Value::Long(r.read_i64()?)),
            Some(PrimitiveKind::Id(width)) => Ok(Value::Id(r.read_id(width)?)),
            None => Err(DecodeError::UnknownTypeName(type_name.clone())),
        },
        Argument::StringField { .. } => Ok(Value::String(r.read_string()?)),
        Argument::TaggedValue { .. } => {
            let tag = r.read_u8()?;
            let value = decode_tag_payload(tag, sizes, r)?;
            Ok(Value::Tagged {
                tag,
                value: Box::new(value),
            })
        }
        Argument::UntaggedValue { name } => Err(DecodeError::UntaggedValue { name: name.clone() }),
        Argument::TaggedObjectRef { .. } => {
            let tag = r.read_u8()?;
            let id = r.read_id(sizes.object_id)?;
            Ok(Value::Object { tag, id })
        }
        Argument::Location { .. } => Ok(Value::Location(r.read_location(sizes)?)),
        Argument::Repeat { element, .. } => {
            let count = r.read_u32()? as usize;
            let mut values = Vec::new();
            for _ in 0..count {
                values.push(decode_argument(element, sizes, r)?);
            }
            Ok(Value::List(values))
        }
        Argument::Group { fields, .. } => Ok(Value::Record(decode_record(fields, sizes, r)?)),
        Argument::Select {
            name,
            discriminant,
            alts,
        } => {
            let disc_value = decode_argument(discriminant, sizes, r)?;
            let key = disc_value
                .as_discriminant()
                .ok_or_else(|| DecodeError::NonNumericDiscriminant {
                    select: name.clone(),
                })?;
            let alt = alts
                .get(&key)
                .ok_or_else(|| DecodeError::UnknownDiscriminant {
                    select: name.clone(),
                    value: key,
                })?;
            let fields = decode_record(&alt.fields, sizes, r)?;
            let mut record = Record::with_capacity(2);
            record.insert(discriminant.name().to_string(), disc_value);
            record.insert(alt.name.clone(), Value::Record(fields));
            Ok(Value::Record(record))
        }
        Argument::TypedSequence { .. } => {
            let tag = r.read_u8()?;
            let count = r.read_u32()? as usize;
            let mut values = Vec::new();
            if is_object_tag(tag) {
                // Object-tagged sequences carry a tag byte per element; the
                // sequence tag only states the declared element type.
                for _ in 0..count {
                    let element_tag = r.read_u8()?;
                    let value = decode_tag_payload(element_tag, sizes, r)?;
                    values.push(Value::Tagged {
                        tag: element_tag,
                        value: Box::new(value),
                    });
                }
            } else {
                for _ in 0..count {
                    values.push(decode_tag_payload(tag, sizes, r)?);
                }
            }
            Ok(Value::Sequence { tag, values })
        }
    }
}

pub fn encode_argument(
    arg: &Argument,
    value: &Value,
    sizes: &IdSizes,
    w: &mut JdwpWriter,
) -> Result<(), EncodeError> {
    match arg {
        Argument::Primitive { type_name, name } => {
            let kind = primitive_kind(type_name, sizes)
                .ok_or_else(|| EncodeError::UnknownTypeName(type_name.clone()))?;
            match (kind, value) {
                (PrimitiveKind::Byte, Value::Byte(v)) => w.write_u8(*v),
                (PrimitiveKind::Boolean, Value::Boolean(v)) => w.write_bool(*v),
                (PrimitiveKind::Int, Value::Int(v)) => w.write_i32(*v),
                (PrimitiveKind::Long, Value::Long(v)) => w.write_i64(*v),
                (PrimitiveKind::Id(width), Value::Id(v)) => w.write_id(*v, width),
                (_, _) => {
                    return Err(EncodeError::Shape {
                        name: name.clone(),
                        expected: "a primitive value matching its declared type",
                    })
                }
            }
            Ok(())
        }
        Argument::StringField { name } => match value {
            Value::String(s) => {
                w.write_string(s);
                Ok(())
            }
            _ => Err(EncodeError::Shape {
                name: name.clone(),
                expected: "a string",
            }),
        },
        Argument::TaggedValue { name } => match value {
            Value::Tagged { tag, value } => {
                w.write_u8(*tag);
                encode_tag_payload(*tag, value, sizes, w, name)
            }
            _ => Err(EncodeError::Shape {
                name: name.clone(),
                expected: "a tagged value",
            }),
        },
        // The tag is not written; it comes from caller context.
        Argument::UntaggedValue { name } => match value {
            Value::Tagged { tag, value } => encode_tag_payload(*tag, value, sizes, w, name),
            _ => Err(EncodeError::Shape {
                name: name.clone(),
                expected: "a tagged value (the tag supplies the width but is not written)",
            }),
        },
        Argument::TaggedObjectRef { name } => match value {
            Value::Object { tag, id } => {
                w.write_u8(*tag);
                w.write_id(*id, sizes.object_id);
                Ok(())
            }
            _ => Err(EncodeError::Shape {
                name: name.clone(),
                expected: "a tagged object reference",
            }),
        },
        Argument::Location { name } => match value {
            Value::Location(loc) => {
                w.write_location(loc, sizes);
                Ok(())
            }
            _ => Err(EncodeError::Shape {
                name: name.clone(),
                expected: "a location",
            }),
        },
        Argument::Repeat { name, element } => match value {
            Value::List(values) => {
                w.write_u32(values.len() as u32);
                for item in values {
                    encode_argument(element, item, sizes, w)?;
                }
                Ok(())
            }
            _ => Err(EncodeError::Shape {
                name: name.clone(),
                expected: "a list",
            }),
        },
        Argument::Group { name, fields } => match value {
            Value::Record(record) => encode_record(fields, record, sizes, w),
            _ => Err(EncodeError::Shape {
                name: name.clone(),
                expected: "a record",
            }),
        },
        Argument::Select {
            name,
            discriminant,
            alts,
        } => {
            let record = value.as_record().ok_or_else(|| EncodeError::Shape {
                name: name.clone(),
                expected: "a record",
            })?;
            let disc_value =
                record
                    .get(discriminant.name())
                    .ok_or_else(|| EncodeError::MissingField {
                        name: discriminant.name().to_string(),
                    })?;
            let key = disc_value
                .as_discriminant()
                .ok_or_else(|| EncodeError::Shape {
                    name: discriminant.name().to_string(),
                    expected: "a numeric discriminant",
                })?;
            let alt = alts
                .get(&key)
                .ok_or_else(|| EncodeError::UnknownDiscriminant {
                    select: name.clone(),
                    value: key,
                })?;
            encode_argument(discriminant, disc_value, sizes, w)?;
            let fields = record
                .get(&alt.name)
                .ok_or_else(|| EncodeError::MissingField {
                    name: alt.name.clone(),
                })?
                .as_record()
                .ok_or_else(|| EncodeError::Shape {
                    name: alt.name.clone(),
                    expected: "a record of the alternative's fields",
                })?;
            encode_record(&alt.fields, fields, sizes, w)
        }
        Argument::TypedSequence { name } => match value {
            Value::Sequence { tag, values } => {
                w.write_u8(*tag);
                w.write_u32(values.len() as u32);
                for item in values {
                    if is_object_tag(*tag) {
                        let Value::Tagged {
                            tag: element_tag,
                            value,
                        } = item
                        else {
                            return Err(EncodeError::Shape {
                                name: name.clone(),
                                expected: "tagged elements in an object-tagged sequence",
                            });
                        };
                        w.write_u8(*element_tag);
                        encode_tag_payload(*element_tag, value, sizes, w, name)?;
                    } else {
                        encode_tag_payload(*tag, item, sizes, w, name)?;
                    }
                }
                Ok(())
            }
            _ => Err(EncodeError::Shape {
                name: name.clone(),
                expected: "a typed sequence",
            }),
        },
    }
}

/// Decodes the payload that follows a type tag. Object-like tags resolve to
/// an objectID-wide id; `V` carries no payload at all.
fn decode_tag_payload(
    tag: u8,
    sizes: &IdSizes,
    r: &mut JdwpReader<'_>,
) -> Result<Value, DecodeError> {
    let value = match tag {
        b'B' => Value::Byte(r.read_u8()?),
        b'Z' => Value::Boolean(r.read_bool()?),
        b'C' => Value::Char(r.read_u16()?),
        b'S' => Value::Short(r.read_i16()?),
        b'I' => Value::Int(r.read_i32()?),
        b'J' => Value::Long(r.read_i64()?),
        b'F' => Value::Float(r.read_f32()?),
        b'D' => Value::Double(r.read_f64()?),
        TAG_VOID => Value::Void,
        _ if is_object_tag(tag) => Value::Id(r.read_id(sizes.object_id)?),
        _ => return Err(DecodeError::UnknownTypeTag(tag)),
    };
    Ok(value)
}

fn encode_tag_payload(
    tag: u8,
    value: &Value,
    sizes: &IdSizes,
    w: &mut JdwpWriter,
    name: &str,
) -> Result<(), EncodeError> {
    let known = is_object_tag(tag)
        || matches!(
            tag,
            b'B' | b'Z' | b'C' | b'S' | b'I' | b'J' | b'F' | b'D' | TAG_VOID
        );
    if !known {
        return Err(EncodeError::UnknownTypeTag(tag));
    }
    match (tag, value) {
        (b'B', Value::Byte(v)) => w.write_u8(*v),
        (b'Z', Value::Boolean(v)) => w.write_bool(*v),
        (b'C', Value::Char(v)) => w.write_u16(*v),
        (b'S', Value::Short(v)) => w.write_i16(*v),
        (b'I', Value::Int(v)) => w.write_i32(*v),
        (b'J', Value::Long(v)) => w.write_i64(*v),
        (b'F', Value::Float(v)) => w.write_f32(*v),
        (b'D', Value::Double(v)) => w.write_f64(*v),
        (TAG_VOID, Value::Void) => {}
        (_, Value::Id(v)) if is_object_tag(tag) => w.write_id(*v, sizes.object_id),
        _ => {
            return Err(EncodeError::Shape {
                name: name.to_string(),
                expected: "a payload matching its type tag",
            })
        }
    }
    Ok(())
}

pub struct JdwpWriter {
    buf: Vec<u8>,
}

impl Default for JdwpWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl JdwpWriter {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_bool(&mut self, v: bool) {
        self.buf.push(if v { 1 } else { 0 });
    }

    pub fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_i16(&mut self, v: i16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_string(&mut self, s: &str) {
        // JDWP strings are length-prefixed with a u32 number of bytes.
        self.write_u32(s.len() as u32);
        self.buf.extend_from_slice(s.as_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_id(&mut self, id: u64, size: usize) {
        let be = id.to_be_bytes();
        self.buf.extend_from_slice(&be[8 - size..]);
    }

    pub fn write_location(&mut self, loc: &Location, sizes: &IdSizes) {
        self.write_u8(loc.type_tag);
        self.write_id(loc.class_id, sizes.reference_type_id);
        self.write_id(loc.method_id, sizes.method_id);
        self.write_u64(loc.index);
    }
}

pub struct JdwpReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> JdwpReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn require(&self, n: usize) -> Result<(), DecodeError> {
        let underrun = DecodeError::Underrun {
            needed: n,
            at: self.pos,
            have: self.buf.len(),
        };
        let end = match self.pos.checked_add(n) {
            Some(end) => end,
            None => return Err(underrun),
        };
        if end > self.buf.len() {
            return Err(underrun);
        }
        Ok(())
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        self.require(1)?;
        let v = self.buf[self.pos];
        self.pos += 1;
        Ok(v)
    }

    pub fn read_bool(&mut self) -> Result<bool, DecodeError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        self.require(2)?;
        let v = u16::from_be_bytes([self.buf[self.pos], self.buf[self.pos + 1]]);
        self.pos += 2;
        Ok(v)
    }

    pub fn read_i16(&mut self) -> Result<i16, DecodeError> {
        Ok(self.read_u16()? as i16)
    }

    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        self.require(4)?;
        let mut be = [0u8; 4];
        be.copy_from_slice(&self.buf[self.pos..self.pos + 4]);
        self.pos += 4;
        Ok(u32::from_be_bytes(be))
    }

    pub fn read_i32(&mut self) -> Result<i32, DecodeError> {
        Ok(self.read_u32()? as i32)
    }

    pub fn read_u64(&mut self) -> Result<u64, DecodeError> {
        self.require(8)?;
        let mut be = [0u8; 8];
        be.copy_from_slice(&self.buf[self.pos..self.pos + 8]);
        self.pos += 8;
        Ok(u64::from_be_bytes(be))
    }

    pub fn read_i64(&mut self) -> Result<i64, DecodeError> {
        Ok(self.read_u64()? as i64)
    }

    pub fn read_f32(&mut self) -> Result<f32, DecodeError> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    pub fn read_f64(&mut self) -> Result<f64, DecodeError> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    pub fn read_string(&mut self) -> Result<String, DecodeError> {
        let len = self.read_u32()? as usize;
        self.require(len)?;
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        let mut out = Vec::new();
        out.try_reserve_exact(len)
            .map_err(|_| DecodeError::StringTooLarge(len))?;
        out.extend_from_slice(bytes);
        String::from_utf8(out).map_err(|e| DecodeError::InvalidUtf8(e.to_string()))
    }

    pub fn read_id(&mut self, size: usize) -> Result<u64, DecodeError> {
        if size == 0 || size > 8 {
            return Err(DecodeError::InvalidIdSize(size));
        }
        self.require(size)?;
        let mut be = [0u8; 8];
        be[8 - size..].copy_from_slice(&self.buf[self.pos..self.pos + size]);
        self.pos += size;
        Ok(u64::from_be_bytes(be))
    }

    pub fn read_location(&mut self, sizes: &IdSizes) -> Result<Location, DecodeError> {
        Ok(Location {
            type_tag: self.read_u8()?,
            class_id: self.read_id(sizes.reference_type_id)?,
            method_id: self.read_id(sizes.method_id)?,
            index: self.read_u64()?,
        })
    }
}

/// Frames an outbound command packet: `length | id | flags(0) | set | command`.
pub fn encode_command(id: u32, command_set: u8, command: u8, payload: &[u8]) -> Vec<u8> {
    let length = (HEADER_LEN + payload.len()) as u32;
    let mut out = Vec::with_capacity(length as usize);
    out.extend_from_slice(&length.to_be_bytes());
    out.extend_from_slice(&id.to_be_bytes());
    out.push(0); // flags
    out.push(command_set);
    out.push(command);
    out.extend_from_slice(payload);
    out
}

/// Frames an inbound-style packet: `length | id | flags(0) | errorCode`.
/// With `error_code == EVENT_MAGIC` this is an event packet.
pub fn encode_reply(id: u32, error_code: u16, payload: &[u8]) -> Vec<u8> {
    let length = (HEADER_LEN + payload.len()) as u32;
    let mut out = Vec::with_capacity(length as usize);
    out.extend_from_slice(&length.to_be_bytes());
    out.extend_from_slice(&id.to_be_bytes());
    out.push(0); // flags
    out.extend_from_slice(&error_code.to_be_bytes());
    out.extend_from_slice(payload);
    out
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use argus_spec::{Alt, Argument};

    use super::*;

    fn sizes() -> IdSizes {
        IdSizes::default()
    }

    fn record(pairs: &[(&str, Value)]) -> Record {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    fn round_trip(arg: &Argument, value: Value, sizes: &IdSizes) {
        let mut w = JdwpWriter::new();
        encode_argument(arg, &value, sizes, &mut w).unwrap();
        let bytes = w.into_vec();
        let mut r = JdwpReader::new(&bytes);
        let decoded = decode_argument(arg, sizes, &mut r).unwrap();
        assert_eq!(decoded, value);
        assert_eq!(r.remaining(), 0, "decode must consume every encoded byte");
    }

    #[test]
    fn string_field_wire_shape() {
        let arg = Argument::StringField {
            name: "name".to_string(),
        };
        let mut w = JdwpWriter::new();
        encode_argument(&arg, &Value::String("A".to_string()), &sizes(), &mut w).unwrap();
        assert_eq!(w.into_vec(), [0, 0, 0, 1, 0x41]);

        let bytes = [0u8, 0, 0, 1, 0x41, 0xde, 0xad];
        let mut r = JdwpReader::new(&bytes);
        let decoded = decode_argument(&arg, &sizes(), &mut r).unwrap();
        assert_eq!(decoded, Value::String("A".to_string()));
        assert_eq!(r.position(), 5);
    }

    #[test]
    fn tagged_object_ref_wire_shape() {
        let arg = Argument::TaggedObjectRef {
            name: "object".to_string(),
        };
        let mut w = JdwpWriter::new();
        encode_argument(&arg, &Value::Object { tag: 1, id: 1 }, &sizes(), &mut w).unwrap();
        assert_eq!(w.into_vec(), [0x01, 0, 0, 0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn empty_repeat_is_four_zero_bytes() {
        let arg = Argument::Repeat {
            name: "items".to_string(),
            element: Box::new(Argument::Primitive {
                type_name: "int".to_string(),
                name: "item".to_string(),
            }),
        };
        let mut w = JdwpWriter::new();
        encode_argument(&arg, &Value::List(Vec::new()), &sizes(), &mut w).unwrap();
        assert_eq!(w.into_vec(), [0, 0, 0, 0]);

        let mut r = JdwpReader::new(&[0, 0, 0, 0]);
        assert_eq!(
            decode_argument(&arg, &sizes(), &mut r).unwrap(),
            Value::List(Vec::new())
        );
    }

    #[test]
    fn repeat_preserves_element_order() {
        let arg = Argument::Repeat {
            name: "ids".to_string(),
            element: Box::new(Argument::Primitive {
                type_name: "objectID".to_string(),
                name: "id".to_string(),
            }),
        };
        round_trip(
            &arg,
            Value::List(vec![Value::Id(3), Value::Id(1), Value::Id(2)]),
            &sizes(),
        );
    }

    #[test]
    fn boolean_decodes_any_nonzero_byte_as_true() {
        let arg = Argument::Primitive {
            type_name: "boolean".to_string(),
            name: "flag".to_string(),
        };
        let mut r = JdwpReader::new(&[0x2a]);
        assert_eq!(
            decode_argument(&arg, &sizes(), &mut r).unwrap(),
            Value::Boolean(true)
        );
    }

    #[test]
    fn id_width_follows_negotiated_sizes() {
        let arg = Argument::Primitive {
            type_name: "frameID".to_string(),
            name: "frame".to_string(),
        };
        let four = IdSizes {
            frame_id: 4,
            ..IdSizes::default()
        };
        let mut w = JdwpWriter::new();
        encode_argument(&arg, &Value::Id(0x0102_0304), &four, &mut w).unwrap();
        assert_eq!(w.into_vec(), [1, 2, 3, 4]);
    }

    #[test]
    fn unknown_type_name_is_rejected() {
        let arg = Argument::Primitive {
            type_name: "gadget".to_string(),
            name: "g".to_string(),
        };
        let mut r = JdwpReader::new(&[0; 8]);
        assert!(matches!(
            decode_argument(&arg, &sizes(), &mut r),
            Err(DecodeError::UnknownTypeName(_))
        ));
    }

    #[test]
    fn location_round_trips() {
        let arg = Argument::Location {
            name: "location".to_string(),
        };
        round_trip(
            &arg,
            Value::Location(Location {
                type_tag: 1,
                class_id: 0xcafe,
                method_id: 0xbeef,
                index: 42,
            }),
            &sizes(),
        );
    }

    #[test]
    fn tagged_value_round_trips_each_tag() {
        let arg = Argument::TaggedValue {
            name: "value".to_string(),
        };
        for value in [
            Value::Tagged {
                tag: b'I',
                value: Box::new(Value::Int(-7)),
            },
            Value::Tagged {
                tag: b'J',
                value: Box::new(Value::Long(1 << 40)),
            },
            Value::Tagged {
                tag: b'Z',
                value: Box::new(Value::Boolean(true)),
            },
            Value::Tagged {
                tag: b'D',
                value: Box::new(Value::Double(2.5)),
            },
            Value::Tagged {
                tag: b'L',
                value: Box::new(Value::Id(0x1234)),
            },
        ] {
            round_trip(&arg, value, &sizes());
        }
    }

    #[test]
    fn void_tag_has_empty_payload() {
        let arg = Argument::TaggedValue {
            name: "value".to_string(),
        };
        let mut w = JdwpWriter::new();
        encode_argument(
            &arg,
            &Value::Tagged {
                tag: b'V',
                value: Box::new(Value::Void),
            },
            &sizes(),
            &mut w,
        )
        .unwrap();
        assert_eq!(w.into_vec(), [b'V']);
    }

    #[test]
    fn unknown_type_tag_is_rejected() {
        let arg = Argument::TaggedValue {
            name: "value".to_string(),
        };
        let mut r = JdwpReader::new(&[0xff, 0, 0, 0, 0]);
        assert!(matches!(
            decode_argument(&arg, &sizes(), &mut r),
            Err(DecodeError::UnknownTypeTag(0xff))
        ));
    }

    #[test]
    fn untagged_value_encodes_payload_without_tag() {
        let arg = Argument::UntaggedValue {
            name: "value".to_string(),
        };
        let mut w = JdwpWriter::new();
        encode_argument(
            &arg,
            &Value::Tagged {
                tag: b'I',
                value: Box::new(Value::Int(5)),
            },
            &sizes(),
            &mut w,
        )
        .unwrap();
        assert_eq!(w.into_vec(), [0, 0, 0, 5]);
    }

    #[test]
    fn untagged_value_cannot_be_decoded_generically() {
        let arg = Argument::UntaggedValue {
            name: "value".to_string(),
        };
        let mut r = JdwpReader::new(&[0, 0, 0, 5]);
        assert!(matches!(
            decode_argument(&arg, &sizes(), &mut r),
            Err(DecodeError::UntaggedValue { .. })
        ));
    }

    #[test]
    fn typed_sequence_round_trips_primitives() {
        let arg = Argument::TypedSequence {
            name: "values".to_string(),
        };
        round_trip(
            &arg,
            Value::Sequence {
                tag: b'I',
                values: vec![Value::Int(1), Value::Int(2), Value::Int(3)],
            },
            &sizes(),
        );
    }

    #[test]
    fn object_tagged_sequence_carries_a_tag_per_element() {
        let arg = Argument::TypedSequence {
            name: "values".to_string(),
        };
        let value = Value::Sequence {
            tag: b'L',
            values: vec![
                Value::Tagged {
                    tag: b's',
                    value: Box::new(Value::Id(0x11)),
                },
                Value::Tagged {
                    tag: b'L',
                    value: Box::new(Value::Id(0x22)),
                },
            ],
        };
        let mut w = JdwpWriter::new();
        encode_argument(&arg, &value, &sizes(), &mut w).unwrap();
        let bytes = w.into_vec();
        // Sequence tag, count, then tag byte + 8-byte id per element.
        assert_eq!(bytes.len(), 1 + 4 + 2 * (1 + 8));
        assert_eq!(bytes[0], b'L');
        assert_eq!(bytes[5], b's');
        assert_eq!(bytes[14], b'L');

        round_trip(&arg, value, &sizes());
    }

    #[test]
    fn group_round_trips_as_record() {
        let arg = Argument::Group {
            name: "slot".to_string(),
            fields: vec![
                Argument::Primitive {
                    type_name: "int".to_string(),
                    name: "slot".to_string(),
                },
                Argument::Primitive {
                    type_name: "byte".to_string(),
                    name: "sigbyte".to_string(),
                },
            ],
        };
        round_trip(
            &arg,
            Value::Record(record(&[
                ("slot", Value::Int(3)),
                ("sigbyte", Value::Byte(b'I')),
            ])),
            &sizes(),
        );
    }

    fn event_kind_select() -> Argument {
        let mut alts = HashMap::new();
        alts.insert(
            90,
            Alt {
                name: "VMStart".to_string(),
                value: 90,
                fields: vec![Argument::Primitive {
                    type_name: "int".to_string(),
                    name: "requestID".to_string(),
                }],
            },
        );
        alts.insert(
            2,
            Alt {
                name: "Breakpoint".to_string(),
                value: 2,
                fields: vec![
                    Argument::Primitive {
                        type_name: "int".to_string(),
                        name: "requestID".to_string(),
                    },
                    Argument::Primitive {
                        type_name: "threadID".to_string(),
                        name: "thread".to_string(),
                    },
                ],
            },
        );
        Argument::Select {
            name: "eventKind".to_string(),
            discriminant: Box::new(Argument::Primitive {
                type_name: "byte".to_string(),
                name: "eventKind".to_string(),
            }),
            alts,
        }
    }

    #[test]
    fn select_decodes_the_matching_alt() {
        let arg = event_kind_select();
        let mut w = JdwpWriter::new();
        w.write_u8(2);
        w.write_i32(7);
        w.write_id(0x99, 8);
        let bytes = w.into_vec();

        let mut r = JdwpReader::new(&bytes);
        let decoded = decode_argument(&arg, &sizes(), &mut r).unwrap();
        let expected = Value::Record(record(&[
            ("eventKind", Value::Byte(2)),
            (
                "Breakpoint",
                Value::Record(record(&[
                    ("requestID", Value::Int(7)),
                    ("thread", Value::Id(0x99)),
                ])),
            ),
        ]));
        assert_eq!(decoded, expected);

        // Re-encoding reproduces the original bytes.
        let mut w = JdwpWriter::new();
        encode_argument(&arg, &decoded, &sizes(), &mut w).unwrap();
        assert_eq!(w.into_vec(), bytes);
    }

    #[test]
    fn select_rejects_unknown_discriminant() {
        let arg = event_kind_select();
        let mut r = JdwpReader::new(&[0x63]);
        assert!(matches!(
            decode_argument(&arg, &sizes(), &mut r),
            Err(DecodeError::UnknownDiscriminant { value: 0x63, .. })
        ));
    }

    #[test]
    fn encode_rejects_missing_fields() {
        let args = vec![
            Argument::StringField {
                name: "name".to_string(),
            },
            Argument::Primitive {
                type_name: "int".to_string(),
                name: "count".to_string(),
            },
        ];
        let mut w = JdwpWriter::new();
        let partial = record(&[("name", Value::String("x".to_string()))]);
        let err = encode_record(&args, &partial, &sizes(), &mut w).unwrap_err();
        assert!(matches!(err, EncodeError::MissingField { name } if name == "count"));
    }

    #[test]
    fn record_round_trips_in_schema_order() {
        let args = vec![
            Argument::StringField {
                name: "description".to_string(),
            },
            Argument::Primitive {
                type_name: "int".to_string(),
                name: "jdwpMajor".to_string(),
            },
            Argument::Primitive {
                type_name: "int".to_string(),
                name: "jdwpMinor".to_string(),
            },
        ];
        let value = record(&[
            ("description", Value::String("mock".to_string())),
            ("jdwpMajor", Value::Int(1)),
            ("jdwpMinor", Value::Int(8)),
        ]);
        let mut w = JdwpWriter::new();
        encode_record(&args, &value, &sizes(), &mut w).unwrap();
        let bytes = w.into_vec();
        let mut r = JdwpReader::new(&bytes);
        assert_eq!(decode_record(&args, &sizes(), &mut r).unwrap(), value);
    }

    #[test]
    fn string_underrun_is_a_decode_error() {
        let arg = Argument::StringField {
            name: "name".to_string(),
        };
        let mut r = JdwpReader::new(&[0, 0, 0, 9, b'x']);
        assert!(matches!(
            decode_argument(&arg, &sizes(), &mut r),
            Err(DecodeError::Underrun { .. })
        ));
    }

    #[test]
    fn command_and_reply_framing() {
        let packet = encode_command(7, 11, 1, &[0xaa, 0xbb]);
        assert_eq!(packet.len(), 13);
        assert_eq!(&packet[0..4], &[0, 0, 0, 13]);
        assert_eq!(&packet[4..8], &[0, 0, 0, 7]);
        assert_eq!(packet[8], 0);
        assert_eq!(packet[9], 11);
        assert_eq!(packet[10], 1);

        let reply = encode_reply(7, EVENT_MAGIC, &[]);
        assert_eq!(&reply[9..11], &EVENT_MAGIC.to_be_bytes());
    }
}
