//! Typed values (`Res_value`) shared by binary XML attributes and resource
//! table entries.

use crate::endianness::{push_u16, push_u32, push_u8, u32_at, u8_at};
use crate::error::Result;
use crate::resources::ResourceId;
use crate::stringpool::{LoadedStringPool, StringPoolBuilder};
use num_enum::TryFromPrimitive;
use std::convert::TryFrom;
use std::fmt;

/// Size of a serialized `Res_value`.
pub(crate) const RES_VALUE_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, Eq, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub enum DataType {
    Null = 0x00,
    Reference = 0x01,
    Attribute = 0x02,
    String = 0x03,
    Float = 0x04,
    Dimension = 0x05,
    Fraction = 0x06,
    DynamicReference = 0x07,
    DynamicAttribute = 0x08,
    IntDec = 0x10,
    IntHex = 0x11,
    IntBoolean = 0x12,
    IntColorArgb8 = 0x1c,
    IntColorRgb8 = 0x1d,
    IntColorArgb4 = 0x1e,
    IntColorRgb4 = 0x1f,
}

/// A literal value.
///
/// Dimensions, fractions and theme attribute references have no dedicated
/// variant; they surface as `Integer` holding the raw 32-bit data.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    String(String),
    Integer(i32),
    Boolean(bool),
    Float(f32),
    Color(u32),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view; decimal strings are accepted too since some tools
    /// write numeric attributes as text.
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::String(s) => f.write_str(s),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Float(v) => write!(f, "{}", v),
            Value::Color(c) => write!(f, "#{:08x}", c),
        }
    }
}

/// A value as stored in a binary resource: either usable as-is, or a
/// reference that has to be resolved against a resource table.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Literal(Value),
    Reference(ResourceId),
}

impl TypedValue {
    /// Decode a raw `(data type, data)` pair; string data indexes `strings`.
    pub fn from_raw(data_type: u8, data: u32, strings: &LoadedStringPool) -> Result<TypedValue> {
        let value = match DataType::try_from(data_type) {
            Ok(DataType::Reference) | Ok(DataType::DynamicReference) => {
                if data == 0 {
                    TypedValue::Literal(Value::Null)
                } else {
                    TypedValue::Reference(ResourceId::from(data))
                }
            }
            Ok(DataType::String) => {
                TypedValue::Literal(Value::String(strings.string_at(data as usize)?))
            }
            Ok(DataType::Null) => TypedValue::Literal(Value::Null),
            Ok(DataType::IntDec) | Ok(DataType::IntHex) => {
                TypedValue::Literal(Value::Integer(data as i32))
            }
            Ok(DataType::IntBoolean) => TypedValue::Literal(Value::Boolean(data != 0)),
            Ok(DataType::Float) => TypedValue::Literal(Value::Float(f32::from_bits(data))),
            Ok(DataType::IntColorArgb8)
            | Ok(DataType::IntColorRgb8)
            | Ok(DataType::IntColorArgb4)
            | Ok(DataType::IntColorRgb4) => TypedValue::Literal(Value::Color(data)),
            _ => TypedValue::Literal(Value::Integer(data as i32)),
        };
        Ok(value)
    }

    /// Decode the `Res_value` found at `offset` in `bytes`.
    pub(crate) fn parse(
        bytes: &[u8],
        offset: usize,
        strings: &LoadedStringPool,
    ) -> Result<TypedValue> {
        let data_type = u8_at(bytes, offset + 3)?;
        let data = u32_at(bytes, offset + 4)?;
        TypedValue::from_raw(data_type, data, strings)
    }

    /// The raw `(data type, data)` pair, interning strings into `strings`.
    pub fn to_raw(&self, strings: &mut StringPoolBuilder) -> (u8, u32) {
        match self {
            TypedValue::Reference(id) => (DataType::Reference as u8, u32::from(*id)),
            TypedValue::Literal(Value::Null) => (DataType::Null as u8, 0),
            TypedValue::Literal(Value::String(s)) => (DataType::String as u8, strings.intern(s)),
            TypedValue::Literal(Value::Integer(i)) => (DataType::IntDec as u8, *i as u32),
            TypedValue::Literal(Value::Boolean(b)) => {
                (DataType::IntBoolean as u8, if *b { 0xffff_ffff } else { 0 })
            }
            TypedValue::Literal(Value::Float(v)) => (DataType::Float as u8, v.to_bits()),
            TypedValue::Literal(Value::Color(c)) => (DataType::IntColorArgb8 as u8, *c),
        }
    }

    pub(crate) fn write(&self, buf: &mut Vec<u8>, strings: &mut StringPoolBuilder) {
        let (data_type, data) = self.to_raw(strings);
        push_u16(buf, RES_VALUE_SIZE as u16);
        push_u8(buf, 0);
        push_u8(buf, data_type);
        push_u32(buf, data);
    }

    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            TypedValue::Literal(v) => Some(v),
            TypedValue::Reference(_) => None,
        }
    }
}

impl From<Value> for TypedValue {
    fn from(value: Value) -> Self {
        TypedValue::Literal(value)
    }
}

impl From<&str> for TypedValue {
    fn from(value: &str) -> Self {
        TypedValue::Literal(Value::String(value.to_owned()))
    }
}

impl From<ResourceId> for TypedValue {
    fn from(id: ResourceId) -> Self {
        TypedValue::Reference(id)
    }
}
