//! Fixed-width primitive codec.
//!
//! A closed, exhaustive switch over the supported primitive kinds. There is
//! deliberately no fallback: a value that reaches this codec without being
//! a fixed-width primitive is a programming error, reported as a hard
//! error rather than tolerated.

use crate::error::{DeserializeError, SerializeError};
use crate::stream::{ByteReader, ByteWriter};
use crate::value::Value;

/// The supported fixed-width primitive kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prim {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Decimal,
    Char,
}

impl Prim {
    /// The wire type name of this kind.
    pub fn name(self) -> &'static str {
        match self {
            Prim::Bool => "bool",
            Prim::I8 => "i8",
            Prim::I16 => "i16",
            Prim::I32 => "i32",
            Prim::I64 => "i64",
            Prim::U8 => "u8",
            Prim::U16 => "u16",
            Prim::U32 => "u32",
            Prim::U64 => "u64",
            Prim::F32 => "f32",
            Prim::F64 => "f64",
            Prim::Decimal => "decimal",
            Prim::Char => "char",
        }
    }

    /// Resolve a wire type name to a primitive kind.
    pub fn from_name(name: &str) -> Option<Prim> {
        Some(match name {
            "bool" => Prim::Bool,
            "i8" => Prim::I8,
            "i16" => Prim::I16,
            "i32" => Prim::I32,
            "i64" => Prim::I64,
            "u8" => Prim::U8,
            "u16" => Prim::U16,
            "u32" => Prim::U32,
            "u64" => Prim::U64,
            "f32" => Prim::F32,
            "f64" => Prim::F64,
            "decimal" => Prim::Decimal,
            "char" => Prim::Char,
            _ => return None,
        })
    }
}

/// The primitive kind of a value, if it has one.
pub fn kind_of(value: &Value) -> Option<Prim> {
    Some(match value {
        Value::Bool(_) => Prim::Bool,
        Value::I8(_) => Prim::I8,
        Value::I16(_) => Prim::I16,
        Value::I32(_) => Prim::I32,
        Value::I64(_) => Prim::I64,
        Value::U8(_) => Prim::U8,
        Value::U16(_) => Prim::U16,
        Value::U32(_) => Prim::U32,
        Value::U64(_) => Prim::U64,
        Value::F32(_) => Prim::F32,
        Value::F64(_) => Prim::F64,
        Value::Decimal { .. } => Prim::Decimal,
        Value::Char(_) => Prim::Char,
        _ => return None,
    })
}

/// Encode a primitive value. Non-primitive input is a hard error.
pub fn encode(value: &Value, out: &mut ByteWriter) -> Result<(), SerializeError> {
    match value {
        Value::Bool(v) => out.write_bool(*v),
        Value::I8(v) => out.write_i8(*v),
        Value::I16(v) => out.write_i16(*v),
        Value::I32(v) => out.write_i32(*v),
        Value::I64(v) => out.write_i64(*v),
        Value::U8(v) => out.write_u8(*v),
        Value::U16(v) => out.write_u16(*v),
        Value::U32(v) => out.write_u32(*v),
        Value::U64(v) => out.write_u64(*v),
        Value::F32(v) => out.write_f32(*v),
        Value::F64(v) => out.write_f64(*v),
        Value::Decimal { mantissa, scale } => {
            out.write_i128(*mantissa);
            out.write_u8(*scale);
        }
        Value::Char(v) => out.write_u32(*v as u32),
        other => return Err(SerializeError::NotPrimitive(other.kind_name())),
    }
    Ok(())
}

/// Decode a primitive of the given kind.
pub fn decode(prim: Prim, input: &mut ByteReader<'_>) -> Result<Value, DeserializeError> {
    Ok(match prim {
        Prim::Bool => Value::Bool(input.read_bool()?),
        Prim::I8 => Value::I8(input.read_i8()?),
        Prim::I16 => Value::I16(input.read_i16()?),
        Prim::I32 => Value::I32(input.read_i32()?),
        Prim::I64 => Value::I64(input.read_i64()?),
        Prim::U8 => Value::U8(input.read_u8()?),
        Prim::U16 => Value::U16(input.read_u16()?),
        Prim::U32 => Value::U32(input.read_u32()?),
        Prim::U64 => Value::U64(input.read_u64()?),
        Prim::F32 => Value::F32(input.read_f32()?),
        Prim::F64 => Value::F64(input.read_f64()?),
        Prim::Decimal => {
            let mantissa = input.read_i128()?;
            let scale = input.read_u8()?;
            Value::Decimal { mantissa, scale }
        }
        Prim::Char => {
            let scalar = input.read_u32()?;
            let c = char::from_u32(scalar).ok_or_else(|| {
                DeserializeError::Corrupt(format!("invalid char scalar {scalar:#x}"))
            })?;
            Value::Char(c)
        }
    })
}
