//! The runtime value universe flowing through schema accessors.
//!
//! [`Value`] is what member getters produce and member setters consume.
//! Object references and containers are shared (`Rc`) so the engine can
//! observe identity on encode and patch in place on decode; records are
//! plain data with copy semantics, mirroring value types in the source
//! graph model.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::object::ObjRef;
use crate::types::TypeDesc;

/// Shared sequence container.
pub type ListRef = Rc<RefCell<Vec<Value>>>;
/// Shared associative container (insertion-ordered pairs).
pub type MapRef = Rc<RefCell<Vec<(Value, Value)>>>;

/// A dynamically typed value in a persisted object graph.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    /// Scaled decimal: `mantissa * 10^-scale`, exact to the written digits.
    Decimal { mantissa: i128, scale: u8 },
    Char(char),
    Str(String),
    /// An enumeration constant, encoded as its underlying 32-bit value.
    Enum { ty: String, raw: i32 },
    /// A reference-typed graph node (identity-preserving).
    Object(ObjRef),
    /// A shared sequence (identity-preserving, may contain itself).
    List(ListRef),
    /// A shared associative container (identity-preserving).
    Map(MapRef),
    /// A value-typed struct: plain named fields, copy semantics, no identity.
    Record {
        ty: String,
        fields: Vec<(String, Value)>,
    },
    /// A type descriptor used as data ("type-as-value" slots).
    TypeRef(TypeDesc),
    /// A reflective member handle, re-resolved by name on decode.
    Member {
        declaring: String,
        name: String,
        is_static: bool,
    },
}

impl Value {
    /// Build a shared list value.
    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    /// Build a shared map value.
    pub fn map(pairs: Vec<(Value, Value)>) -> Self {
        Value::Map(Rc::new(RefCell::new(pairs)))
    }

    /// Build a record value.
    pub fn record(ty: impl Into<String>, fields: Vec<(&str, Value)>) -> Self {
        Value::Record {
            ty: ty.into(),
            fields: fields
                .into_iter()
                .map(|(n, v)| (n.to_owned(), v))
                .collect(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of this value's kind, for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::I8(_) => "i8",
            Value::I16(_) => "i16",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::U8(_) => "u8",
            Value::U16(_) => "u16",
            Value::U32(_) => "u32",
            Value::U64(_) => "u64",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::Decimal { .. } => "decimal",
            Value::Char(_) => "char",
            Value::Str(_) => "str",
            Value::Enum { .. } => "enum",
            Value::Object(_) => "object",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Record { .. } => "record",
            Value::TypeRef(_) => "type",
            Value::Member { .. } => "member",
        }
    }

    pub fn as_object(&self) -> Option<&ObjRef> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&ListRef> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&MapRef> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::I32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Value::F32(v) => Some(*v),
            _ => None,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(v) => write!(f, "Bool({v})"),
            Value::I8(v) => write!(f, "I8({v})"),
            Value::I16(v) => write!(f, "I16({v})"),
            Value::I32(v) => write!(f, "I32({v})"),
            Value::I64(v) => write!(f, "I64({v})"),
            Value::U8(v) => write!(f, "U8({v})"),
            Value::U16(v) => write!(f, "U16({v})"),
            Value::U32(v) => write!(f, "U32({v})"),
            Value::U64(v) => write!(f, "U64({v})"),
            Value::F32(v) => write!(f, "F32({v})"),
            Value::F64(v) => write!(f, "F64({v})"),
            Value::Decimal { mantissa, scale } => {
                write!(f, "Decimal({mantissa}e-{scale})")
            }
            Value::Char(v) => write!(f, "Char({v:?})"),
            Value::Str(v) => write!(f, "Str({v:?})"),
            Value::Enum { ty, raw } => write!(f, "Enum({ty}::{raw})"),
            Value::Object(o) => write!(f, "Object({})", o.borrow().schema_name()),
            Value::List(l) => write!(f, "List(len={})", l.borrow().len()),
            Value::Map(m) => write!(f, "Map(len={})", m.borrow().len()),
            Value::Record { ty, fields } => {
                write!(f, "Record({ty}, {} fields)", fields.len())
            }
            Value::TypeRef(td) => write!(f, "TypeRef({})", td.key()),
            Value::Member {
                declaring,
                name,
                is_static,
            } => write!(f, "Member({declaring}.{name}, static={is_static})"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::I32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(v)
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

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<ObjRef> for Value {
    fn from(v: ObjRef) -> Self {
        Value::Object(v)
    }
}

/// `Option<ObjRef>` maps to null / object, the common shape for link fields.
impl From<Option<ObjRef>> for Value {
    fn from(v: Option<ObjRef>) -> Self {
        match v {
            Some(o) => Value::Object(o),
            None => Value::Null,
        }
    }
}
